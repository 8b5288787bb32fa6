use crate::engine::comparison::compare_atomic;
use crate::engine::numeric::{Numeric, parse_double, to_numeric};
use crate::engine::runtime::{Error, Result};
use crate::parser::ast::CompareOp;
use crate::temporal::add_durations;
use crate::xdm::{Duration, Value};

/// Numeric view of an item; numeric text counts as a number.
fn numeric_item(item: &Value) -> Result<Numeric> {
    if let Some(number) = to_numeric(item) {
        return Ok(number);
    }
    let parsed = match item {
        Value::String(text) => parse_double(text).map(Numeric::Double),
        _ => None,
    };
    parsed.ok_or_else(|| Error::type_mismatch(format!("{} is not numeric", item.type_name())))
}

pub(super) fn fn_count(args: &[Value]) -> Result<Value> {
    let count = i64::try_from(args.len()).map_err(|_| Error::Overflow("count"))?;
    Ok(Value::Integer(count))
}

fn numeric_sum(args: &[Value]) -> Result<Numeric> {
    let mut total = Numeric::Integer(0);
    for item in args {
        total = match (total, numeric_item(item)?) {
            (Numeric::Integer(a), Numeric::Integer(b)) => {
                Numeric::Integer(a.checked_add(b).ok_or(Error::Overflow("sum"))?)
            }
            (a, b) => Numeric::Double(a.as_f64() + b.as_f64()),
        };
    }
    Ok(total)
}

pub(super) fn fn_sum(args: &[Value]) -> Result<Value> {
    if let Some(Value::Duration(first)) = args.first() {
        let mut total: Duration = *first;
        for item in &args[1..] {
            let Value::Duration(next) = item else {
                return Err(Error::type_mismatch("sum mixes durations and other values"));
            };
            total = add_durations(total, *next)?;
        }
        return Ok(Value::Duration(total));
    }
    numeric_sum(args).map(Numeric::into_value)
}

pub(super) fn fn_avg(args: &[Value]) -> Result<Value> {
    match args {
        [] => Ok(Value::Empty),
        [only] => Ok(only.clone()),
        _ => {
            let total = numeric_sum(args)?.as_f64();
            Ok(Value::Double(total / args.len() as f64))
        }
    }
}

/// Comparison key: numeric text compares as a number.
fn sort_key(item: &Value) -> Value {
    match item {
        Value::String(text) => parse_double(text).map_or_else(|| item.clone(), Value::Double),
        Value::Node(node) => sort_key(&node.typed_value()),
        _ => item.clone(),
    }
}

fn extreme(args: &[Value], wins: CompareOp) -> Result<Value> {
    let Some((first, rest)) = args.split_first() else {
        return Ok(Value::Empty);
    };
    let mut best = first;
    let mut best_key = sort_key(first);
    for item in rest {
        let key = sort_key(item);
        if compare_atomic(wins, &key, &best_key)? {
            best = item;
            best_key = key;
        }
    }
    Ok(best.clone())
}

pub(super) fn fn_min(args: &[Value]) -> Result<Value> {
    extreme(args, CompareOp::Lt)
}

pub(super) fn fn_max(args: &[Value]) -> Result<Value> {
    extreme(args, CompareOp::Gt)
}
