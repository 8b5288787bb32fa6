//! Turns a path expression into the query string handed to a [`Document`].
//!
//! Predicates that do not depend on the node being tested are evaluated up
//! front and replaced by their constant; the remaining predicates keep their
//! source form with free variables replaced by constants. Values holding nodes
//! have no constant form: those variables stay symbolic and the document
//! resolves them through the environment it is queried with.
//!
//! [`Document`]: crate::document::Document

use crate::consts::FN_PREFIX;
use crate::engine::evaluator::resolve;
use crate::engine::runtime::{Environment, Error, Result};
use crate::model::QName;
use crate::parser::ast::{Binding, Expression, KeySpecifier, PathExpr, PostfixOp, Scalar};
use crate::xdm::{Duration, Value};

pub(crate) fn render_path(path: &PathExpr, env: Environment<'_>) -> Result<String> {
    let mut rendered = path.clone();
    for step in &mut rendered.steps {
        for predicate in &mut step.predicates {
            *predicate = fold_predicate(predicate, env)?;
        }
    }
    Ok(rendered.to_query_string())
}

fn fold_predicate(predicate: &Expression, env: Environment<'_>) -> Result<Expression> {
    if is_context_free(predicate, env) {
        let value = resolve(predicate, env)?;
        if !holds_node(&value) {
            return constant(&value);
        }
    }
    substitute(predicate, env, &[])
}

/// True when the expression never looks at the context item, its position,
/// a relative path or a function that reads its call site.
pub(crate) fn is_context_free(expr: &Expression, env: Environment<'_>) -> bool {
    match expr {
        Expression::ContextItem | Expression::Path(_) => false,
        Expression::FunctionCall { name, args } if args.is_empty() && is_focus_function(name) => {
            false
        }
        Expression::FunctionCall { name, .. }
            if env.functions.is_contextual(name, env.default_function_prefix) =>
        {
            false
        }
        // The step's focus comes from `base`.
        Expression::PathStep { base, .. } => is_context_free(base, env),
        _ => expr.children().into_iter().all(|child| is_context_free(child, env)),
    }
}

fn holds_node(value: &Value) -> bool {
    match value {
        Value::Node(_) => true,
        Value::Sequence(items) => items.iter().any(holds_node),
        _ => false,
    }
}

pub(crate) fn is_focus_function(name: &QName) -> bool {
    name.prefix.as_deref().is_none_or(|p| p == FN_PREFIX)
        && matches!(name.local_name.as_str(), "position" | "last")
}

fn call(local: &str, args: Vec<Expression>) -> Expression {
    Expression::FunctionCall { name: QName::prefixed(FN_PREFIX, local), args }
}

fn text(value: impl Into<String>) -> Expression {
    Expression::Literal(Scalar::String(value.into()))
}

/// An expression that evaluates back to `value`.
pub(crate) fn constant(value: &Value) -> Result<Expression> {
    Ok(match value {
        Value::Empty => Expression::Sequence(Vec::new()),
        Value::Integer(i) => Expression::Literal(Scalar::Integer(*i)),
        Value::Double(d) if d.is_finite() => Expression::Literal(Scalar::Double(*d)),
        Value::Double(_) => call("number", vec![text(value.to_string())]),
        Value::String(s) => text(s.clone()),
        Value::Boolean(b) => call(if *b { "true" } else { "false" }, Vec::new()),
        Value::Date(date) => call("date", vec![text(date.to_string())]),
        Value::Duration(d @ Duration::YearMonth { .. }) => {
            call("year-month-duration", vec![text(d.to_string())])
        }
        Value::Duration(d) => call("day-time-duration", vec![text(d.to_string())]),
        Value::QName(name) => match &name.namespace {
            Some(uri) => call("QName", vec![text(uri.clone()), text(name.to_string())]),
            None => call("QName", vec![text(name.to_string())]),
        },
        Value::Range(range) => Expression::Range {
            from: Box::new(Expression::Literal(Scalar::Integer(range.start()))),
            to: Box::new(Expression::Literal(Scalar::Integer(range.end()))),
        },
        Value::Sequence(items) => {
            Expression::Sequence(items.iter().map(constant).collect::<Result<_>>()?)
        }
        Value::Node(_) => {
            return Err(Error::Unsupported("node value inside a path predicate".to_string()));
        }
    })
}

fn substitute_all(exprs: &[Expression], env: Environment<'_>, bound: &[QName]) -> Result<Vec<Expression>> {
    exprs.iter().map(|e| substitute(e, env, bound)).collect()
}

fn boxed(expr: &Expression, env: Environment<'_>, bound: &[QName]) -> Result<Box<Expression>> {
    substitute(expr, env, bound).map(Box::new)
}

/// Rebind `bindings` in order; each binding sees the names bound before it.
fn substitute_bindings(
    bindings: &[Binding],
    env: Environment<'_>,
    bound: &[QName],
) -> Result<(Vec<Binding>, Vec<QName>)> {
    let mut scope = bound.to_vec();
    let mut out = Vec::with_capacity(bindings.len());
    for binding in bindings {
        out.push(Binding { var: binding.var.clone(), expr: substitute(&binding.expr, env, &scope)? });
        scope.push(binding.var.clone());
    }
    Ok((out, scope))
}

/// Replace free variable references with constants. Names in `bound` are
/// introduced inside the predicate and stay symbolic.
fn substitute(expr: &Expression, env: Environment<'_>, bound: &[QName]) -> Result<Expression> {
    Ok(match expr {
        Expression::VariableRef(name) if !bound.contains(name) => match env.lookup(name) {
            Some(value) if holds_node(value) => expr.clone(),
            Some(value) => constant(value)?,
            None if env.options.strict_variables => {
                return Err(Error::UnknownVariable(name.clone()));
            }
            None => Expression::Sequence(Vec::new()),
        },
        Expression::Literal(_) | Expression::VariableRef(_) | Expression::ContextItem => expr.clone(),
        Expression::FunctionCall { name, args } => {
            Expression::FunctionCall { name: name.clone(), args: substitute_all(args, env, bound)? }
        }
        Expression::UnaryOp { op, operand } => {
            Expression::UnaryOp { op: *op, operand: boxed(operand, env, bound)? }
        }
        Expression::BinaryOp { op, left, right } => Expression::BinaryOp {
            op: *op,
            left: boxed(left, env, bound)?,
            right: boxed(right, env, bound)?,
        },
        Expression::Compare { kind, op, left, comparators } => Expression::Compare {
            kind: *kind,
            op: *op,
            left: boxed(left, env, bound)?,
            comparators: substitute_all(comparators, env, bound)?,
        },
        Expression::And(items) => Expression::And(substitute_all(items, env, bound)?),
        Expression::Or(items) => Expression::Or(substitute_all(items, env, bound)?),
        Expression::If { test, then_branch, else_branch } => Expression::If {
            test: boxed(test, env, bound)?,
            then_branch: boxed(then_branch, env, bound)?,
            else_branch: boxed(else_branch, env, bound)?,
        },
        Expression::Range { from, to } => {
            Expression::Range { from: boxed(from, env, bound)?, to: boxed(to, env, bound)? }
        }
        Expression::Path(path) => {
            let mut path = path.clone();
            for step in &mut path.steps {
                step.predicates = substitute_all(&step.predicates, env, bound)?;
            }
            Expression::Path(path)
        }
        Expression::PathStep { base, step } => {
            Expression::PathStep { base: boxed(base, env, bound)?, step: boxed(step, env, bound)? }
        }
        Expression::Postfix { primary, filters } => Expression::Postfix {
            primary: boxed(primary, env, bound)?,
            filters: filters
                .iter()
                .map(|filter| {
                    Ok(match filter {
                        PostfixOp::Predicate(p) => PostfixOp::Predicate(substitute(p, env, bound)?),
                        PostfixOp::Arguments(args) => {
                            PostfixOp::Arguments(substitute_all(args, env, bound)?)
                        }
                        PostfixOp::Lookup(KeySpecifier::Expr(key)) => {
                            PostfixOp::Lookup(KeySpecifier::Expr(boxed(key, env, bound)?))
                        }
                        PostfixOp::Lookup(key) => PostfixOp::Lookup(key.clone()),
                    })
                })
                .collect::<Result<_>>()?,
        },
        Expression::Sequence(items) => Expression::Sequence(substitute_all(items, env, bound)?),
        Expression::SimpleMap(items) => Expression::SimpleMap(substitute_all(items, env, bound)?),
        Expression::SetOp { op, left, right } => Expression::SetOp {
            op: *op,
            left: boxed(left, env, bound)?,
            right: boxed(right, env, bound)?,
        },
        Expression::For { bindings, body } => {
            let (bindings, scope) = substitute_bindings(bindings, env, bound)?;
            Expression::For { bindings, body: boxed(body, env, &scope)? }
        }
        Expression::Let { bindings, body } => {
            let (bindings, scope) = substitute_bindings(bindings, env, bound)?;
            Expression::Let { bindings, body: boxed(body, env, &scope)? }
        }
        Expression::Quantified { quantifier, bindings, satisfies } => {
            let (bindings, scope) = substitute_bindings(bindings, env, bound)?;
            Expression::Quantified {
                quantifier: *quantifier,
                bindings,
                satisfies: boxed(satisfies, env, &scope)?,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::NodeHandle;
    use crate::engine::runtime::{EvaluationOptions, FunctionRegistry, Variables};
    use crate::model::NodeKind;
    use crate::parser::parse;
    use rstest::rstest;

    fn render(text: &str, variables: &Variables, options: EvaluationOptions) -> Result<String> {
        let Expression::Path(path) = parse(text)? else {
            panic!("{text} is not a path");
        };
        let registry = FunctionRegistry::with_builtins();
        let env = Environment::new(variables, None, &registry, &options, FN_PREFIX);
        render_path(&path, env)
    }

    #[rstest]
    #[case::arithmetic("//item[1 + 1]", "//item[2]")]
    #[case::boolean("//item[1 = 1]", "//item[fn:true()]")]
    #[case::date("//item[date('2020-01-01')]", "//item[fn:date(\"2020-01-01\")]")]
    #[case::sequence("//item[(1, 2)]", "//item[(1, 2)]")]
    #[case::context_dependent("//item[position() = 2]", "//item[(position() = 2)]")]
    #[case::attribute("a/@b[. = 'x']", "a/@b[(. = \"x\")]")]
    fn predicates_fold(#[case] text: &str, #[case] expected: &str) {
        let variables = Variables::new();
        assert_eq!(render(text, &variables, EvaluationOptions::default()).unwrap(), expected);
    }

    #[rstest]
    fn free_variables_become_constants() {
        let variables: Variables = [("kind", "a")].into_iter().collect();
        let rendered = render("//item[@type = $kind]", &variables, EvaluationOptions::default());
        assert_eq!(rendered.unwrap(), "//item[(@type = \"a\")]");
    }

    #[rstest]
    #[case::comparison("//item[. is $n]", "//item[(. is $n)]")]
    #[case::bare("//item[$n]", "//item[$n]")]
    #[case::mixed("//item[. << $n and @x = $k]", "//item[((. << $n) and (@x = 7))]")]
    fn node_variables_stay_symbolic(#[case] text: &str, #[case] expected: &str) {
        let mut variables = Variables::new();
        let node = NodeHandle::new(3, NodeKind::Element, Some(QName::local("item")), None);
        variables.insert("n", Value::Node(node));
        variables.insert("k", 7);
        assert_eq!(render(text, &variables, EvaluationOptions::default()).unwrap(), expected);
    }

    #[rstest]
    #[case::no_argument("//item[string() = 'x']", "//item[(string() = \"x\")]")]
    #[case::prefixed("//item[fn:string() = 'x']", "//item[(fn:string() = \"x\")]")]
    fn functions_reading_the_call_site_are_not_folded(#[case] text: &str, #[case] expected: &str) {
        let variables = Variables::new();
        assert_eq!(render(text, &variables, EvaluationOptions::default()).unwrap(), expected);
    }

    #[rstest]
    fn locally_bound_variables_stay_symbolic() {
        let variables = Variables::new();
        let rendered =
            render("//item[some $v in @x satisfies $v = 1]", &variables, EvaluationOptions::default());
        assert_eq!(rendered.unwrap(), "//item[(some $v in @x satisfies ($v = 1))]");
    }

    #[rstest]
    fn missing_variable_in_strict_mode() {
        let variables = Variables::new();
        let options = EvaluationOptions { strict_variables: true, ..EvaluationOptions::default() };
        let rendered = render("//item[@type = $missing]", &variables, options);
        assert_eq!(rendered, Err(Error::UnknownVariable(QName::local("missing"))));
    }
}
