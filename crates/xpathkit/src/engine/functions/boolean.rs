use crate::engine::runtime::Result;
use crate::xdm::Value;

pub(super) fn fn_true(_args: &[Value]) -> Result<Value> {
    Ok(Value::Boolean(true))
}

pub(super) fn fn_false(_args: &[Value]) -> Result<Value> {
    Ok(Value::Boolean(false))
}

pub(super) fn fn_boolean(args: &[Value]) -> Result<Value> {
    Value::from_items(args.iter().cloned()).effective_boolean().map(Value::Boolean)
}

/// `false` as soon as any argument is the boolean `true`.
pub(super) fn fn_not(args: &[Value]) -> Result<Value> {
    let any_true = args.iter().any(|item| matches!(item, Value::Boolean(true)));
    Ok(Value::Boolean(!any_true))
}

/// Empty strings count as absent values.
pub(super) fn fn_empty(args: &[Value]) -> Result<Value> {
    let all_blank = args.iter().all(|item| matches!(item, Value::String(s) if s.is_empty()));
    Ok(Value::Boolean(all_blank))
}

pub(super) fn fn_exists(args: &[Value]) -> Result<Value> {
    Ok(Value::Boolean(!args.is_empty()))
}
