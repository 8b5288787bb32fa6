//! Parse XPath-style expressions into an AST and evaluate them against named
//! input values and an optional [`Document`].
//!
//! ```
//! use std::collections::HashMap;
//! use xpathkit::{Value, run};
//!
//! let vars = HashMap::from([("x".to_string(), Value::Integer(41))]);
//! assert_eq!(run("$x + 1", &vars, None).unwrap(), Value::Integer(42));
//! ```

pub mod consts;
pub mod document;
pub mod engine;
pub mod model;
pub mod parser;
pub mod temporal;
pub mod xdm;
pub mod xml;

use std::collections::HashMap;

pub use document::{Document, NodeHandle};
pub use engine::evaluator::resolve;
pub use engine::functions::default_function_registry;
pub use engine::runtime::{
    CallCtx, DynamicContext, DynamicContextBuilder, Environment, Error, EvaluationOptions,
    FunctionRegistry, RangeEnd, Result, Variables,
};
pub use model::{NodeKind, QName};
pub use parser::ast::Expression;
pub use parser::{ParseError, parse};
pub use xdm::{Date, Duration, IntRange, Value};
pub use xml::XmlDocument;

/// Evaluate `ast` with the built-in function library and default options.
pub fn evaluate(
    ast: &Expression,
    variables: &HashMap<String, Value>,
    document: Option<&dyn Document>,
) -> Result<Value> {
    let variables = Variables::from(variables);
    let functions = FunctionRegistry::with_builtins();
    let options = EvaluationOptions::default();
    let env = Environment::new(&variables, document, &functions, &options, consts::FN_PREFIX);
    resolve(ast, env)
}

/// Evaluate `ast` against a fully configured context.
pub fn evaluate_with(ast: &Expression, ctx: &DynamicContext) -> Result<Value> {
    resolve(ast, ctx.environment())
}

/// Parse and evaluate in one go.
pub fn run(
    expr: &str,
    variables: &HashMap<String, Value>,
    document: Option<&dyn Document>,
) -> Result<Value> {
    let ast = parse(expr)?;
    evaluate(&ast, variables, document)
}
