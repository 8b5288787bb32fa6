//! Tree-walking evaluator.

use crate::document::NodeHandle;
use crate::engine::comparison::{general_compare, value_compare};
use crate::engine::numeric::{arithmetic, single_atomic, unary};
use crate::engine::render::{is_focus_function, render_path};
use crate::engine::runtime::{CallCtx, Environment, Error, Local, RangeEnd, Result};
use crate::model::QName;
use crate::parser::ast::{
    Binding, CompareKind, CompareOp, Expression, KeySpecifier, PathExpr, PostfixOp, Quantifier,
    Scalar, SetOp,
};
use crate::xdm::{IntRange, Value};
use itertools::Itertools;

/// Evaluate `expr` in `env`.
pub fn resolve(expr: &Expression, env: Environment<'_>) -> Result<Value> {
    match expr {
        Expression::Literal(scalar) => Ok(match scalar {
            Scalar::Integer(i) => Value::Integer(*i),
            Scalar::Double(d) => Value::Double(*d),
            Scalar::String(s) => Value::String(s.clone()),
            Scalar::Boolean(b) => Value::Boolean(*b),
        }),
        Expression::VariableRef(name) => match env.lookup(name) {
            Some(value) => Ok(value.clone()),
            None if env.options.strict_variables => Err(Error::UnknownVariable(name.clone())),
            None => Ok(Value::Empty),
        },
        Expression::ContextItem => env.context_item.cloned().ok_or(Error::ContextItemUndefined),
        Expression::FunctionCall { name, args } => call_function(name, args, env),
        Expression::UnaryOp { op, operand } => unary(*op, resolve(operand, env)?),
        Expression::BinaryOp { op, left, right } => {
            let left = resolve(left, env)?;
            let right = resolve(right, env)?;
            arithmetic(*op, left, right)
        }
        Expression::Compare { kind, op, left, comparators } => {
            compare_chain(*kind, *op, left, comparators, env)
        }
        Expression::And(operands) => {
            for operand in operands {
                if !resolve(operand, env)?.effective_boolean()? {
                    return Ok(Value::Boolean(false));
                }
            }
            Ok(Value::Boolean(true))
        }
        Expression::Or(operands) => {
            for operand in operands {
                if resolve(operand, env)?.effective_boolean()? {
                    return Ok(Value::Boolean(true));
                }
            }
            Ok(Value::Boolean(false))
        }
        Expression::If { test, then_branch, else_branch } => {
            if resolve(test, env)?.effective_boolean()? {
                resolve(then_branch, env)
            } else {
                resolve(else_branch, env)
            }
        }
        Expression::Range { from, to } => range(from, to, env),
        Expression::Path(path) => {
            let nodes = query_nodes(path, env)?;
            Ok(Value::from_items(nodes.iter().map(NodeHandle::typed_value)))
        }
        Expression::PathStep { base, step } => {
            let items = path_step(base, step, env)?;
            Ok(Value::from_items(items.into_iter().map(|item| match item {
                Value::Node(node) => node.typed_value(),
                atomic => atomic,
            })))
        }
        Expression::Postfix { primary, filters } => apply_filters(resolve(primary, env)?, filters, env),
        Expression::Sequence(items) => {
            let values = items.iter().map(|item| resolve(item, env)).collect::<Result<Vec<_>>>()?;
            Ok(Value::from_items(values))
        }
        Expression::SimpleMap(steps) => {
            let Some((first, rest)) = steps.split_first() else {
                return Ok(Value::Empty);
            };
            let mut value = resolve(first, env)?;
            for step in rest {
                let items = value.into_items();
                let size = items.len();
                let mut mapped = Vec::with_capacity(size);
                for (index, item) in items.iter().enumerate() {
                    mapped.push(resolve(step, env.with_context(item, Some((index + 1, size))))?);
                }
                value = Value::from_items(mapped);
            }
            Ok(value)
        }
        Expression::SetOp { .. } => {
            let nodes = resolve_nodes(expr, env)?;
            Ok(Value::from_items(nodes.iter().map(NodeHandle::typed_value)))
        }
        Expression::For { bindings, body } => {
            let mut results = Vec::new();
            iterate_bindings(bindings, env, &mut |scope| {
                results.push(resolve(body, scope)?);
                Ok(true)
            })?;
            Ok(Value::from_items(results))
        }
        Expression::Let { bindings, body } => let_scope(bindings, body, env),
        Expression::Quantified { quantifier, bindings, satisfies } => {
            // `some` stops at the first witness, `every` at the first counterexample.
            let wanted = *quantifier == Quantifier::Some;
            let mut witnessed = false;
            iterate_bindings(bindings, env, &mut |scope| {
                if resolve(satisfies, scope)?.effective_boolean()? == wanted {
                    witnessed = true;
                    return Ok(false);
                }
                Ok(true)
            })?;
            Ok(Value::Boolean(if wanted { witnessed } else { !witnessed }))
        }
    }
}

fn call_function(name: &QName, args: &[Expression], env: Environment<'_>) -> Result<Value> {
    if args.is_empty() && is_focus_function(name) {
        let (position, size) = env.position.ok_or(Error::ContextItemUndefined)?;
        let value = if name.local_name == "position" { position } else { size };
        return Ok(Value::Integer(i64::try_from(value).map_err(|_| Error::Overflow("position"))?));
    }
    let mut items = Vec::new();
    for arg in args {
        items.extend(resolve(arg, env)?.into_items());
    }
    let function = env.functions.resolve(name, args.len(), env.default_function_prefix)?;
    tracing::trace!(function = %name, arity = args.len(), items = items.len(), "calling function");
    function(&CallCtx::new(env, args.len()), &items)
}

fn compare_chain(
    kind: CompareKind,
    op: CompareOp,
    left: &Expression,
    comparators: &[Expression],
    env: Environment<'_>,
) -> Result<Value> {
    if kind == CompareKind::Node {
        let mut left = left;
        for right in comparators {
            match node_compare(op, left, right, env)? {
                Some(true) => left = right,
                Some(false) => return Ok(Value::Boolean(false)),
                None => return Ok(Value::Empty),
            }
        }
        return Ok(Value::Boolean(true));
    }
    let mut current = resolve(left, env)?;
    for comparator in comparators {
        let next = resolve(comparator, env)?;
        let holds = match kind {
            CompareKind::Value => match value_compare(op, current, next.clone())? {
                Some(holds) => holds,
                None => return Ok(Value::Empty),
            },
            _ => general_compare(op, current, next.clone())?,
        };
        if !holds {
            return Ok(Value::Boolean(false));
        }
        current = next;
    }
    Ok(Value::Boolean(true))
}

fn single_node(nodes: Vec<NodeHandle>) -> Result<Option<NodeHandle>> {
    let count = nodes.len();
    let mut nodes = nodes.into_iter();
    match (nodes.next(), count) {
        (None, _) => Ok(None),
        (Some(node), 1) => Ok(Some(node)),
        _ => Err(Error::type_mismatch(format!(
            "node comparison expects a single node, got {count}"
        ))),
    }
}

fn node_compare(
    op: CompareOp,
    left: &Expression,
    right: &Expression,
    env: Environment<'_>,
) -> Result<Option<bool>> {
    let left = single_node(resolve_nodes(left, env)?)?;
    let right = single_node(resolve_nodes(right, env)?)?;
    let (Some(a), Some(b)) = (left, right) else {
        return Ok(None);
    };
    match op {
        CompareOp::Is => Ok(Some(a == b)),
        CompareOp::Precedes => Ok(Some(a < b)),
        CompareOp::Follows => Ok(Some(a > b)),
        _ => Err(Error::type_mismatch("value operator used as node comparison")),
    }
}

/// Evaluate `expr` keeping node identity instead of casting to text.
pub(crate) fn resolve_nodes(expr: &Expression, env: Environment<'_>) -> Result<Vec<NodeHandle>> {
    match expr {
        Expression::Path(path) => query_nodes(path, env),
        Expression::SetOp { op, left, right } => {
            let left = resolve_nodes(left, env)?;
            let right = resolve_nodes(right, env)?;
            let combined: Vec<NodeHandle> = match op {
                SetOp::Union => left.into_iter().chain(right).collect(),
                SetOp::Intersect => left.into_iter().filter(|n| right.contains(n)).collect(),
                SetOp::Except => left.into_iter().filter(|n| !right.contains(n)).collect(),
            };
            Ok(combined.into_iter().sorted().dedup().collect())
        }
        Expression::Sequence(items) => {
            let mut nodes = Vec::new();
            for item in items {
                nodes.extend(resolve_nodes(item, env)?);
            }
            Ok(nodes)
        }
        Expression::PathStep { base, step } => expect_nodes(Value::from_items(path_step(base, step, env)?)),
        Expression::Postfix { primary, filters } => {
            let nodes = resolve_nodes(primary, env)?;
            let filtered = apply_filters(Value::from_items(nodes.into_iter().map(Value::Node)), filters, env)?;
            expect_nodes(filtered)
        }
        _ => expect_nodes(resolve(expr, env)?),
    }
}

/// Expressions whose result keeps node identity through [`resolve_nodes`].
fn selects_nodes(expr: &Expression) -> bool {
    match expr {
        Expression::Path(_) | Expression::PathStep { .. } | Expression::SetOp { .. } => true,
        Expression::Postfix { primary, .. } => selects_nodes(primary),
        _ => false,
    }
}

/// Evaluate `step` once per node of `base`. Node results come back in
/// document order without duplicates; atomic results keep their order.
fn path_step(base: &Expression, step: &Expression, env: Environment<'_>) -> Result<Vec<Value>> {
    let nodes = resolve_nodes(base, env)?;
    let size = nodes.len();
    let mut items = Vec::new();
    for (index, node) in nodes.into_iter().enumerate() {
        let item = Value::Node(node);
        let scope = env.with_context(&item, Some((index + 1, size)));
        if selects_nodes(step) {
            items.extend(resolve_nodes(step, scope)?.into_iter().map(Value::Node));
        } else {
            items.extend(resolve(step, scope)?.into_items());
        }
    }
    let node_count = items.iter().filter(|item| matches!(item, Value::Node(_))).count();
    if node_count == 0 {
        return Ok(items);
    }
    if node_count < items.len() {
        return Err(Error::type_mismatch("path step yields both nodes and atomic values"));
    }
    Ok(expect_nodes(Value::from_items(items))?.into_iter().sorted().dedup().map(Value::Node).collect())
}

fn expect_nodes(value: Value) -> Result<Vec<NodeHandle>> {
    value
        .into_items()
        .into_iter()
        .map(|item| match item {
            Value::Node(node) => Ok(node),
            other => Err(Error::type_mismatch(format!("expected a node, got {}", other.type_name()))),
        })
        .collect()
}

fn query_nodes(path: &PathExpr, env: Environment<'_>) -> Result<Vec<NodeHandle>> {
    let document = env.document.ok_or(Error::NoDocumentBound)?;
    let rendered = render_path(path, env)?;
    let nodes = document.query_with(&rendered, env)?;
    tracing::debug!(path = %rendered, matched = nodes.len(), "queried document");
    Ok(nodes)
}

fn range(from: &Expression, to: &Expression, env: Environment<'_>) -> Result<Value> {
    let start = range_bound(resolve(from, env)?)?;
    let end = range_bound(resolve(to, env)?)?;
    let (Some(start), Some(end)) = (start, end) else {
        return Ok(Value::Empty);
    };
    let end = match env.options.range_end {
        RangeEnd::Inclusive => end,
        RangeEnd::Exclusive => match end.checked_sub(1) {
            Some(end) => end,
            None => return Ok(Value::Empty),
        },
    };
    Ok(IntRange::new(start, end).into_value())
}

fn range_bound(value: Value) -> Result<Option<i64>> {
    match single_atomic(value, "range bound")? {
        None => Ok(None),
        Some(Value::Integer(i)) => Ok(Some(i)),
        Some(Value::Double(d)) if d.fract() == 0.0 && d.abs() < i64::MAX as f64 => Ok(Some(d as i64)),
        Some(Value::Node(node)) => range_bound(node.typed_value()),
        Some(other) => Err(Error::type_mismatch(format!(
            "range bounds must be integers, got {}",
            other.type_name()
        ))),
    }
}

fn apply_filters(mut value: Value, filters: &[PostfixOp], env: Environment<'_>) -> Result<Value> {
    for filter in filters {
        value = match filter {
            PostfixOp::Predicate(predicate) => filter_items(value, predicate, env)?,
            PostfixOp::Arguments(_) => {
                return Err(Error::Unsupported("dynamic function call".to_string()));
            }
            PostfixOp::Lookup(key) => lookup(value, key, env)?,
        };
    }
    Ok(value)
}

fn filter_items(value: Value, predicate: &Expression, env: Environment<'_>) -> Result<Value> {
    let items = value.into_items();
    let size = items.len();
    let mut kept = Vec::new();
    for (index, item) in items.into_iter().enumerate() {
        let position = index + 1;
        if predicate_holds(predicate, env.with_context(&item, Some((position, size))), position)? {
            kept.push(item);
        }
    }
    Ok(Value::from_items(kept))
}

/// Test one item against `predicate`; `env` carries the item as its focus.
/// A node-selecting predicate holds when it selects anything.
pub(crate) fn predicate_holds(predicate: &Expression, env: Environment<'_>, position: usize) -> Result<bool> {
    if selects_nodes(predicate) {
        return Ok(!resolve_nodes(predicate, env)?.is_empty());
    }
    let verdict = resolve(predicate, env)?;
    tracing::trace!(position, verdict = %verdict, "predicate evaluated");
    predicate_matches(&verdict, position)
}

/// A numeric predicate selects by 1-based position; anything else by its
/// effective boolean value.
fn predicate_matches(verdict: &Value, position: usize) -> Result<bool> {
    match verdict {
        Value::Integer(i) => Ok(usize::try_from(*i).is_ok_and(|p| p == position)),
        Value::Double(d) => Ok(*d == position as f64),
        other => other.effective_boolean(),
    }
}

fn lookup(value: Value, key: &KeySpecifier, env: Environment<'_>) -> Result<Value> {
    let nth = |items: &[Value], index: i64| -> Value {
        usize::try_from(index)
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(Value::Empty)
    };
    match key {
        KeySpecifier::Wildcard => Ok(value),
        KeySpecifier::Integer(index) => Ok(nth(&value.into_items(), *index)),
        KeySpecifier::Expr(expr) => {
            let items = value.into_items();
            let keys = resolve(expr, env)?.into_items();
            let mut selected = Vec::with_capacity(keys.len());
            for key in keys {
                let Value::Integer(index) = key else {
                    return Err(Error::type_mismatch(format!(
                        "lookup key must be an integer, got {}",
                        key.type_name()
                    )));
                };
                selected.push(nth(&items, index));
            }
            Ok(Value::from_items(selected))
        }
        KeySpecifier::Name(name) => {
            Err(Error::type_mismatch(format!("lookup of key {name} requires a map")))
        }
    }
}

fn iterate_bindings(
    bindings: &[Binding],
    env: Environment<'_>,
    visit: &mut dyn FnMut(Environment<'_>) -> Result<bool>,
) -> Result<bool> {
    let Some((first, rest)) = bindings.split_first() else {
        return visit(env);
    };
    for item in resolve(&first.expr, env)?.into_items() {
        let local = Local { name: first.var.clone(), value: item, parent: env.locals };
        if !iterate_bindings(rest, env.with_local(&local), visit)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn let_scope(bindings: &[Binding], body: &Expression, env: Environment<'_>) -> Result<Value> {
    let Some((first, rest)) = bindings.split_first() else {
        return resolve(body, env);
    };
    let value = resolve(&first.expr, env)?;
    let local = Local { name: first.var.clone(), value, parent: env.locals };
    let_scope(rest, body, env.with_local(&local))
}
