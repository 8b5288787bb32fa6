use crate::consts::FN_PREFIX;
use crate::document::{Document, NodeHandle};
use crate::model::QName;
use crate::parser::ParseError;
use crate::xdm::Value;
use core::cmp::Ordering;
use itertools::Itertools;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

pub type Arity = usize;

/// Evaluation failure. Any error aborts the whole evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("unknown function {0}")]
    UnknownFunction(QName),
    #[error("unknown variable ${0}")]
    UnknownVariable(QName),
    #[error("path expression evaluated without a bound document")]
    NoDocumentBound,
    #[error("context item is undefined")]
    ContextItemUndefined,
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("function {name} called with {got} argument(s), expected {expected}")]
    Arity { name: QName, got: usize, expected: String },
    #[error("invalid {kind} literal: {text:?}")]
    InvalidLiteral { kind: &'static str, text: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow in {0}")]
    Overflow(&'static str),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("document query failed: {0}")]
    Document(String),
}

impl Error {
    pub(crate) fn type_mismatch(message: impl Into<String>) -> Self {
        Self::TypeMismatch(message.into())
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// The call site as a function sees it: the environment of the call and the
/// number of arguments as written (arguments arrive flattened).
#[derive(Clone, Copy)]
pub struct CallCtx<'a> {
    pub env: Environment<'a>,
    pub arity: Arity,
}

impl<'a> CallCtx<'a> {
    pub fn new(env: Environment<'a>, arity: Arity) -> Self {
        Self { env, arity }
    }

    pub fn context_item(&self) -> Result<&'a Value> {
        self.env.context_item.ok_or(Error::ContextItemUndefined)
    }

    pub fn document(&self) -> Result<&'a dyn Document> {
        self.env.document.ok_or(Error::NoDocumentBound)
    }

    /// Query the bound document. Relative paths start at the context node.
    pub fn query(&self, path: &str) -> Result<Vec<NodeHandle>> {
        self.document()?.query_with(path, self.env)
    }
}

pub type FunctionImpl = Arc<dyn Fn(&CallCtx<'_>, &[Value]) -> Result<Value> + Send + Sync>;

// (min_arity, max_arity, impl); `None` as max means variadic.
pub type FunctionOverload = (Arity, Option<Arity>, FunctionImpl);

/// Error type returned by function resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No function with the (possibly default-prefixed) name exists.
    Unknown(QName),
    /// Function exists, but not for the requested arity.
    WrongArity { name: QName, arity: Arity, available: String },
}

impl From<ResolveError> for Error {
    fn from(error: ResolveError) -> Self {
        match error {
            ResolveError::Unknown(name) => Self::UnknownFunction(name),
            ResolveError::WrongArity { name, arity, available } => {
                Self::Arity { name, got: arity, expected: available }
            }
        }
    }
}

/// Named functions keyed by `(prefix, local)` with arity ranges.
///
/// The registry is a plain value: clone it, register more entries, then share
/// it read-only through an `Arc`.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    fns: HashMap<QName, Vec<FunctionOverload>>,
    /// Names registered through [`FunctionRegistry::register_with_context`].
    contextual: HashSet<QName>,
}

fn overload_order(a: &FunctionOverload, b: &FunctionOverload) -> Ordering {
    // Higher minimum first; for equal minimums the tighter maximum wins.
    b.0.cmp(&a.0).then_with(|| match (a.1, b.1) {
        (Some(amax), Some(bmax)) => amax.cmp(&bmax),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    })
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in function library.
    pub fn with_builtins() -> Self {
        crate::engine::functions::default_function_registry()
    }

    pub fn register(&mut self, name: QName, arity: Arity, func: FunctionImpl) {
        self.register_range(name, arity, Some(arity), func);
    }

    /// Register a function with an arity range; `max_arity = None` is variadic.
    /// Overlapping ranges are allowed, the most specific one is picked.
    pub fn register_range(
        &mut self,
        name: QName,
        min_arity: Arity,
        max_arity: Option<Arity>,
        func: FunctionImpl,
    ) {
        match self.fns.entry(name) {
            Entry::Vacant(e) => {
                e.insert(vec![(min_arity, max_arity, func)]);
            }
            Entry::Occupied(mut e) => {
                e.get_mut().push((min_arity, max_arity, func));
                e.get_mut().sort_by(overload_order);
            }
        }
    }

    /// Convenience: register a plain closure with an exact arity.
    pub fn register_fn<F>(&mut self, name: impl Into<QName>, arity: Arity, f: F)
    where
        F: 'static + Send + Sync + Fn(&[Value]) -> Result<Value>,
    {
        self.register(name.into(), arity, plain(f));
    }

    /// Register a function that reads the call site: focus, document or the
    /// written arity. Calls to it are never folded into constants.
    pub fn register_with_context<F>(
        &mut self,
        name: impl Into<QName>,
        min_arity: Arity,
        max_arity: Option<Arity>,
        f: F,
    ) where
        F: 'static + Send + Sync + Fn(&CallCtx<'_>, &[Value]) -> Result<Value>,
    {
        let name = name.into();
        self.contextual.insert(name.clone());
        self.register_range(name, min_arity, max_arity, Arc::new(f));
    }

    pub fn register_range_fn<F>(
        &mut self,
        name: impl Into<QName>,
        min_arity: Arity,
        max_arity: Option<Arity>,
        f: F,
    ) where
        F: 'static + Send + Sync + Fn(&[Value]) -> Result<Value>,
    {
        self.register_range(name.into(), min_arity, max_arity, plain(f));
    }

    pub fn register_variadic<F>(&mut self, name: impl Into<QName>, min_arity: Arity, f: F)
    where
        F: 'static + Send + Sync + Fn(&[Value]) -> Result<Value>,
    {
        self.register_range(name.into(), min_arity, None, plain(f));
    }

    pub fn contains(&self, name: &QName) -> bool {
        self.fns.contains_key(name)
    }

    /// Whether a call to `name` may depend on its call site.
    pub fn is_contextual(&self, name: &QName, default_prefix: &str) -> bool {
        self.contextual.contains(name) || self.contextual.contains(&name.or_prefix(default_prefix))
    }

    /// Registered names, sorted for stable output.
    pub fn names(&self) -> Vec<&QName> {
        self.fns.keys().sorted_by_key(|name| name.to_string()).collect()
    }

    /// Resolve `name` for a call with `arity` arguments.
    ///
    /// An exact match on the name as written wins (unprefixed user functions);
    /// otherwise an unprefixed name is looked up under `default_prefix`.
    pub fn resolve(
        &self,
        name: &QName,
        arity: Arity,
        default_prefix: &str,
    ) -> Result<&FunctionImpl, ResolveError> {
        let matches = |(min, max, _): &&FunctionOverload| {
            arity >= *min && max.is_none_or(|m| arity <= m)
        };
        if let Some((_, _, f)) = self.fns.get(name).and_then(|c| c.iter().find(matches)) {
            return Ok(f);
        }
        let effective = name.or_prefix(default_prefix);
        let Some(candidates) = self.fns.get(&effective).or_else(|| self.fns.get(name)) else {
            return Err(ResolveError::Unknown(effective));
        };
        if let Some((_, _, f)) = candidates.iter().find(matches) {
            return Ok(f);
        }
        let available = candidates
            .iter()
            .map(|(min, max, _)| match max {
                Some(max) if max == min => min.to_string(),
                Some(max) => format!("{min} to {max}"),
                None => format!("{min} or more"),
            })
            .join(" or ");
        Err(ResolveError::WrongArity { name: effective, arity, available })
    }
}

fn plain<F>(f: F) -> FunctionImpl
where
    F: 'static + Send + Sync + Fn(&[Value]) -> Result<Value>,
{
    Arc::new(move |_: &CallCtx<'_>, items: &[Value]| f(items))
}

impl core::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

/// Named input values. Keys are `prefix:local` or `local`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variables {
    values: HashMap<QName, Value>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host values are normalized on the way in, so `Sequence([x])` binds `x`.
    pub fn insert(&mut self, name: impl Into<QName>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into().normalized());
    }

    pub fn get(&self, name: &QName) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<QName>, V: Into<Value>> FromIterator<(K, V)> for Variables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut variables = Self::new();
        for (name, value) in iter {
            variables.insert(name, value);
        }
        variables
    }
}

impl From<&HashMap<String, Value>> for Variables {
    fn from(map: &HashMap<String, Value>) -> Self {
        map.iter().map(|(name, value)| (name.as_str(), value.clone())).collect()
    }
}

/// Upper bound handling for `a to b`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RangeEnd {
    #[default]
    Inclusive,
    Exclusive,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationOptions {
    pub range_end: RangeEnd,
    /// Report unbound variables as `UnknownVariable` instead of yielding `Empty`.
    pub strict_variables: bool,
}

/// Everything an evaluation needs besides the expression itself.
#[derive(Clone)]
pub struct DynamicContext {
    pub variables: Variables,
    pub document: Option<Arc<dyn Document>>,
    pub functions: Arc<FunctionRegistry>,
    pub options: EvaluationOptions,
    pub default_function_prefix: String,
}

impl Default for DynamicContext {
    fn default() -> Self {
        Self {
            variables: Variables::new(),
            document: None,
            functions: Arc::new(FunctionRegistry::with_builtins()),
            options: EvaluationOptions::default(),
            default_function_prefix: FN_PREFIX.to_string(),
        }
    }
}

impl DynamicContext {
    /// The root environment for evaluating against this context.
    pub fn environment(&self) -> Environment<'_> {
        Environment::new(
            &self.variables,
            self.document.as_deref(),
            &self.functions,
            &self.options,
            &self.default_function_prefix,
        )
    }
}

#[derive(Default)]
pub struct DynamicContextBuilder {
    ctx: DynamicContext,
}

impl DynamicContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, name: impl Into<QName>, value: impl Into<Value>) -> Self {
        self.ctx.variables.insert(name, value);
        self
    }

    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.ctx.variables = variables;
        self
    }

    pub fn with_document(mut self, document: Arc<dyn Document>) -> Self {
        self.ctx.document = Some(document);
        self
    }

    pub fn with_functions(mut self, functions: Arc<FunctionRegistry>) -> Self {
        self.ctx.functions = functions;
        self
    }

    pub fn with_options(mut self, options: EvaluationOptions) -> Self {
        self.ctx.options = options;
        self
    }

    pub fn with_default_function_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.ctx.default_function_prefix = prefix.into();
        self
    }

    pub fn build(self) -> DynamicContext {
        self.ctx
    }
}

/// A variable bound by `for`, `let`, `some` or `every`, chained to the
/// bindings of enclosing scopes.
#[derive(Debug)]
pub struct Local<'a> {
    pub name: QName,
    pub value: Value,
    pub parent: Option<&'a Local<'a>>,
}

/// Evaluation environment. Cheap to copy; entering a predicate or a binding
/// scope derives a new environment that lives only for that recursive call.
#[derive(Clone, Copy)]
pub struct Environment<'a> {
    pub variables: &'a Variables,
    pub locals: Option<&'a Local<'a>>,
    pub document: Option<&'a dyn Document>,
    pub context_item: Option<&'a Value>,
    /// 1-based position and size of the context item.
    pub position: Option<(usize, usize)>,
    pub functions: &'a FunctionRegistry,
    pub options: &'a EvaluationOptions,
    pub default_function_prefix: &'a str,
}

impl<'a> Environment<'a> {
    pub fn new(
        variables: &'a Variables,
        document: Option<&'a dyn Document>,
        functions: &'a FunctionRegistry,
        options: &'a EvaluationOptions,
        default_function_prefix: &'a str,
    ) -> Self {
        Self {
            variables,
            locals: None,
            document,
            context_item: None,
            position: None,
            functions,
            options,
            default_function_prefix,
        }
    }

    pub fn with_context<'b>(
        self,
        item: &'b Value,
        position: Option<(usize, usize)>,
    ) -> Environment<'b>
    where
        'a: 'b,
    {
        let env: Environment<'b> = self;
        Environment { context_item: Some(item), position, ..env }
    }

    pub fn with_local<'b>(self, local: &'b Local<'b>) -> Environment<'b>
    where
        'a: 'b,
    {
        let env: Environment<'b> = self;
        Environment { locals: Some(local), ..env }
    }

    pub fn with_document<'b>(self, document: &'b dyn Document) -> Environment<'b>
    where
        'a: 'b,
    {
        let env: Environment<'b> = self;
        Environment { document: Some(document), ..env }
    }

    /// The context item when it is a node.
    pub fn context_node(&self) -> Option<&'a NodeHandle> {
        match self.context_item {
            Some(Value::Node(node)) => Some(node),
            _ => None,
        }
    }

    /// Locally bound names shadow input variables.
    pub fn lookup(&self, name: &QName) -> Option<&'a Value> {
        let mut scope = self.locals;
        while let Some(local) = scope {
            if &local.name == name {
                return Some(&local.value);
            }
            scope = local.parent;
        }
        self.variables.get(name)
    }

    pub fn is_local(&self, name: &QName) -> bool {
        let mut scope = self.locals;
        while let Some(local) = scope {
            if &local.name == name {
                return true;
            }
            scope = local.parent;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn constant(value: i64) -> FunctionImpl {
        plain(move |_: &[Value]| -> Result<Value> { Ok(Value::Integer(value)) })
    }

    fn call(f: &FunctionImpl) -> Result<Value> {
        let variables = Variables::new();
        let registry = FunctionRegistry::new();
        let options = EvaluationOptions::default();
        let env = Environment::new(&variables, None, &registry, &options, "fn");
        f(&CallCtx::new(env, 0), &[])
    }

    #[rstest]
    fn resolve_prefers_tighter_overload() {
        let mut registry = FunctionRegistry::new();
        registry.register_range(QName::prefixed("fn", "f"), 0, None, constant(1));
        registry.register(QName::prefixed("fn", "f"), 2, constant(2));
        let resolve = |arity| registry.resolve(&QName::local("f"), arity, "fn").map(call);
        assert_eq!(resolve(2).unwrap().unwrap(), Value::Integer(2));
        assert_eq!(resolve(5).unwrap().unwrap(), Value::Integer(1));
    }

    #[rstest]
    fn resolve_reports_unknown_and_wrong_arity() {
        let mut registry = FunctionRegistry::new();
        registry.register(QName::prefixed("fn", "g"), 1, constant(0));
        assert!(matches!(
            registry.resolve(&QName::local("nope"), 0, "fn"),
            Err(ResolveError::Unknown(name)) if name == QName::prefixed("fn", "nope")
        ));
        match registry.resolve(&QName::local("g"), 3, "fn") {
            Err(ResolveError::WrongArity { arity, available, .. }) => {
                assert_eq!(arity, 3);
                assert_eq!(available, "1");
            }
            _ => panic!("expected an arity error"),
        }
    }

    #[rstest]
    fn unprefixed_registration_wins_over_default_prefix() {
        let mut registry = FunctionRegistry::new();
        registry.register(QName::prefixed("fn", "h"), 0, constant(1));
        registry.register(QName::local("h"), 0, constant(2));
        let f = registry.resolve(&QName::local("h"), 0, "fn").unwrap();
        assert_eq!(call(f).unwrap(), Value::Integer(2));
    }

    #[rstest]
    fn locals_shadow_variables() {
        let variables: Variables = [("x", 1_i64)].into_iter().collect();
        let registry = FunctionRegistry::new();
        let options = EvaluationOptions::default();
        let env = Environment::new(&variables, None, &registry, &options, "fn");
        let local = Local { name: QName::local("x"), value: Value::Integer(2), parent: None };
        let inner = env.with_local(&local);
        assert_eq!(inner.lookup(&QName::local("x")), Some(&Value::Integer(2)));
        assert_eq!(env.lookup(&QName::local("x")), Some(&Value::Integer(1)));
        assert!(inner.is_local(&QName::local("x")));
    }

    #[rstest]
    fn context_functions_see_the_call_site() {
        let mut registry = FunctionRegistry::new();
        registry.register_with_context("focus", 0, Some(1), |ctx: &CallCtx<'_>, items: &[Value]| {
            match ctx.arity {
                0 => ctx.context_item().cloned(),
                _ => Ok(Value::from_items(items.to_vec())),
            }
        });
        assert!(registry.is_contextual(&QName::local("focus"), "fn"));
        assert!(!registry.is_contextual(&QName::local("other"), "fn"));

        let variables = Variables::new();
        let options = EvaluationOptions::default();
        let env = Environment::new(&variables, None, &registry, &options, "fn");
        let item = Value::Integer(7);
        let f = registry.resolve(&QName::local("focus"), 0, "fn").unwrap();
        assert_eq!(f(&CallCtx::new(env, 0), &[]), Err(Error::ContextItemUndefined));
        assert_eq!(f(&CallCtx::new(env.with_context(&item, Some((1, 1))), 0), &[]), Ok(item.clone()));
        assert_eq!(CallCtx::new(env, 0).query("//a").unwrap_err(), Error::NoDocumentBound);
    }
}
