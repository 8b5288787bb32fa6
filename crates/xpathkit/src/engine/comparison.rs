use crate::engine::numeric::{parse_double, single_atomic, to_numeric};
use crate::engine::runtime::{Error, Result};
use crate::parser::ast::CompareOp;
use crate::xdm::{Duration, Value};
use core::cmp::Ordering;
use itertools::Itertools;

fn ordering_holds(op: CompareOp, ordering: Option<Ordering>) -> Result<bool> {
    // An unordered pair (NaN) is only ever "not equal".
    let Some(ordering) = ordering else {
        return Ok(op == CompareOp::Ne);
    };
    Ok(match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
        CompareOp::Is | CompareOp::Precedes | CompareOp::Follows => {
            return Err(Error::type_mismatch("node comparison applied to atomic values"));
        }
    })
}

fn incomparable(a: &Value, b: &Value) -> Error {
    Error::type_mismatch(format!("cannot compare {} with {}", a.type_name(), b.type_name()))
}

/// Compare two single atomic items.
pub(crate) fn compare_atomic(op: CompareOp, a: &Value, b: &Value) -> Result<bool> {
    match (a, b) {
        (Value::Node(node), other) => compare_atomic(op, &node.typed_value(), other),
        (other, Value::Node(node)) => compare_atomic(op, other, &node.typed_value()),
        (Value::String(x), Value::String(y)) => ordering_holds(op, Some(x.cmp(y))),
        (Value::Boolean(x), Value::Boolean(y)) => ordering_holds(op, Some(x.cmp(y))),
        (Value::Date(x), Value::Date(y)) => ordering_holds(op, Some(x.instant().cmp(&y.instant()))),
        (Value::Duration(x), Value::Duration(y)) => match (x, y) {
            (Duration::YearMonth { months: m }, Duration::YearMonth { months: n }) => {
                ordering_holds(op, Some(m.cmp(n)))
            }
            (Duration::DayTime(d), Duration::DayTime(e)) => ordering_holds(op, Some(d.cmp(e))),
            _ if matches!(op, CompareOp::Eq | CompareOp::Ne) => Ok(op == CompareOp::Ne),
            _ => Err(incomparable(a, b)),
        },
        (Value::QName(x), Value::QName(y)) => match op {
            CompareOp::Eq => Ok(x == y),
            CompareOp::Ne => Ok(x != y),
            _ => Err(incomparable(a, b)),
        },
        (Value::String(text), number) | (number, Value::String(text))
            if to_numeric(number).is_some() =>
        {
            // Numeric text compares as a number; keep operand order for `<`.
            let parsed = parse_double(text).ok_or_else(|| incomparable(a, b))?;
            let number = to_numeric(number).map_or(f64::NAN, |n| n.as_f64());
            let ordering = if matches!(a, Value::String(_)) {
                parsed.partial_cmp(&number)
            } else {
                number.partial_cmp(&parsed)
            };
            ordering_holds(op, ordering)
        }
        _ => match (to_numeric(a), to_numeric(b)) {
            (Some(x), Some(y)) => ordering_holds(op, x.as_f64().partial_cmp(&y.as_f64())),
            _ => Err(incomparable(a, b)),
        },
    }
}

/// Value comparison: one item per side. `None` when either side is empty.
pub(crate) fn value_compare(op: CompareOp, left: Value, right: Value) -> Result<Option<bool>> {
    let (Some(a), Some(b)) = (single_atomic(left, "left operand")?, single_atomic(right, "right operand")?)
    else {
        return Ok(None);
    };
    compare_atomic(op, &a, &b).map(Some)
}

/// General comparison: true when any pair of items satisfies `op`.
pub(crate) fn general_compare(op: CompareOp, left: Value, right: Value) -> Result<bool> {
    let (left, right) = (left.into_items(), right.into_items());
    for (a, b) in left.iter().cartesian_product(right.iter()) {
        if compare_atomic(op, a, b)? {
            return Ok(true);
        }
    }
    Ok(false)
}
