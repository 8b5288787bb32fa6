//! Lexical parsing and arithmetic for `xs:date` and the two duration families.

use crate::engine::runtime::{Error, Result};
use crate::parser::ast::ArithOp;
use crate::xdm::{Date, Duration, Value};
use chrono::{FixedOffset, Months, NaiveDate, TimeDelta};

fn invalid(kind: &'static str, text: &str) -> Error {
    Error::InvalidLiteral { kind, text: text.to_string() }
}

/// `YYYY-MM-DD` or `YYYYMMDD`, optionally followed by `Z` or `±HH:MM`.
pub fn parse_date(text: &str) -> Result<Date> {
    let s = text.trim();
    let (body, offset) = split_timezone(s).ok_or_else(|| invalid("date", text))?;
    let date = NaiveDate::parse_from_str(body, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(body, "%Y%m%d"))
        .map_err(|_| invalid("date", text))?;
    Ok(Date::new(date, offset))
}

fn split_timezone(s: &str) -> Option<(&str, Option<FixedOffset>)> {
    if !s.is_ascii() {
        return None;
    }
    if let Some(body) = s.strip_suffix('Z') {
        return Some((body, FixedOffset::east_opt(0)));
    }
    let bytes = s.as_bytes();
    if bytes.len() > 8 {
        let at = bytes.len() - 6;
        if matches!(bytes[at], b'+' | b'-') && bytes[at + 3] == b':' {
            let hours: i32 = s[at + 1..at + 3].parse().ok()?;
            let minutes: i32 = s[at + 4..].parse().ok()?;
            if hours > 14 || minutes > 59 {
                return None;
            }
            let secs = (hours * 3600 + minutes * 60) * if bytes[at] == b'-' { -1 } else { 1 };
            return Some((&s[..at], Some(FixedOffset::east_opt(secs)?)));
        }
    }
    Some((s, None))
}

/// Leading ASCII digits of `s` and the remainder.
fn take_digits(s: &str) -> (&str, &str) {
    let end = s.bytes().position(|b| !b.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}

fn split_sign(s: &str) -> (bool, &str) {
    match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    }
}

/// `-?P(nY)?(nM)?` with at least one component.
pub fn parse_year_month_duration(text: &str) -> Result<Duration> {
    let fail = || invalid("yearMonthDuration", text);
    let (negative, body) = split_sign(text.trim());
    let mut cur = body.strip_prefix('P').ok_or_else(fail)?;
    let mut years: i32 = 0;
    let mut months: i32 = 0;
    let mut seen_any = false;
    for designator in ['Y', 'M'] {
        let (digits, rest) = take_digits(cur);
        if digits.is_empty() {
            break;
        }
        let Some(rest) = rest.strip_prefix(designator) else {
            continue;
        };
        let n: i32 = digits.parse().map_err(|_| fail())?;
        match designator {
            'Y' => years = n,
            _ => months = n,
        }
        seen_any = true;
        cur = rest;
    }
    if !seen_any || !cur.is_empty() {
        return Err(fail());
    }
    let total = years.checked_mul(12).and_then(|y| y.checked_add(months)).ok_or_else(fail)?;
    Ok(Duration::YearMonth { months: if negative { -total } else { total } })
}

/// `-?P(nD)?(T(nH)?(nM)?(n(.n)?S)?)?` with at least one component.
/// Fractional seconds are kept to millisecond precision.
pub fn parse_day_time_duration(text: &str) -> Result<Duration> {
    let fail = || invalid("dayTimeDuration", text);
    let (negative, body) = split_sign(text.trim());
    let mut cur = body.strip_prefix('P').ok_or_else(fail)?;
    let mut total = TimeDelta::zero();
    let mut seen_any = false;

    let (digits, rest) = take_digits(cur);
    if let (false, Some(rest)) = (digits.is_empty(), rest.strip_prefix('D')) {
        let days: i64 = digits.parse().map_err(|_| fail())?;
        total += TimeDelta::try_days(days).ok_or_else(fail)?;
        seen_any = true;
        cur = rest;
    }
    if let Some(time) = cur.strip_prefix('T') {
        cur = time;
        let mut time_seen = false;
        for (designator, unit) in [('H', 3600), ('M', 60)] {
            let (digits, rest) = take_digits(cur);
            if let (false, Some(rest)) = (digits.is_empty(), rest.strip_prefix(designator)) {
                let n: i64 = digits.parse().map_err(|_| fail())?;
                let secs = n.checked_mul(unit).ok_or_else(fail)?;
                total += TimeDelta::try_seconds(secs).ok_or_else(fail)?;
                time_seen = true;
                cur = rest;
            }
        }
        let (whole, rest) = take_digits(cur);
        let (fraction, rest) = match rest.strip_prefix('.') {
            Some(after_dot) => take_digits(after_dot),
            None => ("", rest),
        };
        if let (false, Some(rest)) = (whole.is_empty(), rest.strip_prefix('S')) {
            let secs: i64 = whole.parse().map_err(|_| fail())?;
            let millis: i64 = format!("{fraction:0<3}")[..3].parse().map_err(|_| fail())?;
            total += TimeDelta::try_seconds(secs).ok_or_else(fail)?;
            total += TimeDelta::milliseconds(millis);
            time_seen = true;
            cur = rest;
        }
        // `PT` alone is not a duration.
        if !time_seen {
            return Err(fail());
        }
        seen_any = true;
    }
    if !seen_any || !cur.is_empty() {
        return Err(fail());
    }
    Ok(Duration::DayTime(if negative { -total } else { total }))
}

/// Either duration family, chosen by which designators appear.
pub fn parse_duration(text: &str) -> Result<Duration> {
    parse_year_month_duration(text).or_else(|_| parse_day_time_duration(text))
}

/// Arithmetic on dates and durations. Returns `None` when neither operand is temporal.
pub(crate) fn arithmetic(op: ArithOp, left: &Value, right: &Value) -> Option<Result<Value>> {
    let result = match (op, left, right) {
        (ArithOp::Add, Value::Date(date), Value::Duration(duration))
        | (ArithOp::Add, Value::Duration(duration), Value::Date(date)) => {
            shift_date(*date, *duration).map(Value::Date)
        }
        (ArithOp::Sub, Value::Date(date), Value::Duration(duration)) => {
            shift_date(*date, duration.negate()).map(Value::Date)
        }
        (ArithOp::Sub, Value::Date(a), Value::Date(b)) => {
            Ok(Value::Duration(Duration::DayTime(a.instant() - b.instant())))
        }
        (ArithOp::Add, Value::Duration(a), Value::Duration(b)) => add_durations(*a, *b).map(Value::Duration),
        (ArithOp::Sub, Value::Duration(a), Value::Duration(b)) => {
            add_durations(*a, b.negate()).map(Value::Duration)
        }
        (ArithOp::Mul, Value::Duration(d), factor) | (ArithOp::Mul, factor, Value::Duration(d)) => {
            match as_factor(factor) {
                Some(f) => scale(*d, f).map(Value::Duration),
                None => return mismatch(op, left, right),
            }
        }
        (ArithOp::Div, Value::Duration(d), divisor) => match as_factor(divisor) {
            Some(f) if f == 0.0 => Err(Error::DivisionByZero),
            Some(f) => scale(*d, 1.0 / f).map(Value::Duration),
            None => return mismatch(op, left, right),
        },
        (_, Value::Date(_) | Value::Duration(_), _) | (_, _, Value::Date(_) | Value::Duration(_)) => {
            return mismatch(op, left, right);
        }
        _ => return None,
    };
    Some(result)
}

fn mismatch(op: ArithOp, left: &Value, right: &Value) -> Option<Result<Value>> {
    Some(Err(Error::type_mismatch(format!(
        "cannot apply {} to {} and {}",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))))
}

fn as_factor(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Double(d) => Some(*d),
        _ => None,
    }
}

/// Sum of two durations of the same family.
pub(crate) fn add_durations(a: Duration, b: Duration) -> Result<Duration> {
    match (a, b) {
        (Duration::YearMonth { months: x }, Duration::YearMonth { months: y }) => x
            .checked_add(y)
            .map(|months| Duration::YearMonth { months })
            .ok_or(Error::Overflow("duration addition")),
        (Duration::DayTime(x), Duration::DayTime(y)) => {
            x.checked_add(&y).map(Duration::DayTime).ok_or(Error::Overflow("duration addition"))
        }
        _ => Err(Error::type_mismatch("cannot combine yearMonthDuration and dayTimeDuration")),
    }
}

fn scale(duration: Duration, factor: f64) -> Result<Duration> {
    if !factor.is_finite() {
        return Err(Error::type_mismatch("duration scaled by a non-finite number"));
    }
    match duration {
        Duration::YearMonth { months } => {
            let scaled = (f64::from(months) * factor).round();
            if scaled.abs() > f64::from(i32::MAX) {
                return Err(Error::Overflow("duration scaling"));
            }
            Ok(Duration::YearMonth { months: scaled as i32 })
        }
        Duration::DayTime(delta) => {
            let millis = (delta.num_milliseconds() as f64 * factor).round();
            if millis.abs() >= i64::MAX as f64 {
                return Err(Error::Overflow("duration scaling"));
            }
            Ok(Duration::DayTime(TimeDelta::milliseconds(millis as i64)))
        }
    }
}

fn shift_date(date: Date, duration: Duration) -> Result<Date> {
    let shifted = match duration {
        Duration::YearMonth { months } if months >= 0 => {
            date.date.checked_add_months(Months::new(months.unsigned_abs()))
        }
        Duration::YearMonth { months } => {
            date.date.checked_sub_months(Months::new(months.unsigned_abs()))
        }
        Duration::DayTime(delta) => date.date.checked_add_signed(TimeDelta::days(delta.num_days())),
    };
    shifted
        .map(|d| Date::new(d, date.offset))
        .ok_or(Error::Overflow("date arithmetic"))
}
