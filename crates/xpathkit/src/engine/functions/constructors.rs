use crate::engine::numeric::parse_double;
use crate::engine::runtime::{CallCtx, Error, Result};
use crate::model::QName;
use crate::temporal::{parse_date, parse_day_time_duration, parse_year_month_duration};
use crate::xdm::{Duration, Value};

fn at_most_one<'a>(args: &'a [Value], function: &str) -> Result<Option<&'a Value>> {
    match args {
        [] => Ok(None),
        [item] => Ok(Some(item)),
        _ => Err(Error::type_mismatch(format!(
            "{function} expects at most one item, got {}",
            args.len()
        ))),
    }
}

pub(super) fn fn_number(args: &[Value]) -> Result<Value> {
    let number = match at_most_one(args, "number")? {
        None => f64::NAN,
        Some(Value::Integer(i)) => *i as f64,
        Some(Value::Double(d)) => *d,
        Some(Value::Boolean(b)) => f64::from(u8::from(*b)),
        Some(item @ (Value::String(_) | Value::Node(_))) => {
            parse_double(&item.to_string()).unwrap_or(f64::NAN)
        }
        Some(_) => f64::NAN,
    };
    Ok(Value::Double(number))
}

/// `string()` without an argument converts the context item.
pub(super) fn fn_string(ctx: &CallCtx<'_>, args: &[Value]) -> Result<Value> {
    let item = match ctx.arity {
        0 => Some(ctx.context_item()?),
        _ => at_most_one(args, "string")?,
    };
    Ok(Value::String(item.map(ToString::to_string).unwrap_or_default()))
}

// An absent argument yields `false` rather than an error.

pub(super) fn fn_date(args: &[Value]) -> Result<Value> {
    match at_most_one(args, "date")? {
        None => Ok(Value::Boolean(false)),
        Some(Value::Date(date)) => Ok(Value::Date(*date)),
        Some(item) => parse_date(&item.to_string()).map(Value::Date),
    }
}

pub(super) fn fn_year_month_duration(args: &[Value]) -> Result<Value> {
    match at_most_one(args, "year-month-duration")? {
        None => Ok(Value::Boolean(false)),
        Some(Value::Duration(d @ Duration::YearMonth { .. })) => Ok(Value::Duration(*d)),
        Some(item) => parse_year_month_duration(&item.to_string()).map(Value::Duration),
    }
}

pub(super) fn fn_day_time_duration(args: &[Value]) -> Result<Value> {
    match at_most_one(args, "day-time-duration")? {
        None => Ok(Value::Boolean(false)),
        Some(Value::Duration(d @ Duration::DayTime(_))) => Ok(Value::Duration(*d)),
        Some(item) => parse_day_time_duration(&item.to_string()).map(Value::Duration),
    }
}

/// `QName(lexical)` or `QName(uri, lexical)`.
pub(super) fn fn_qname(args: &[Value]) -> Result<Value> {
    let (uri, lexical) = match args {
        [lexical] => (None, lexical),
        [uri, lexical] => (Some(uri.to_string()), lexical),
        _ => return Err(Error::type_mismatch("QName expects one or two items")),
    };
    let lexical = lexical.to_string();
    let valid = |part: &str| {
        part.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
            && part.chars().all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
    };
    let well_formed = match lexical.split_once(':') {
        Some((prefix, local)) => valid(prefix) && valid(local),
        None => valid(&lexical),
    };
    if !well_formed {
        return Err(Error::InvalidLiteral { kind: "QName", text: lexical });
    }
    let name = QName::parse(&lexical);
    Ok(Value::QName(match uri {
        Some(uri) if !uri.is_empty() => name.with_namespace(uri),
        _ => name,
    }))
}
