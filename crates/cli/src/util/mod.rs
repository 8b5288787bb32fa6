use anyhow::{Context, anyhow};
use xpathkit::Value;

pub type CliResult<T> = anyhow::Result<T>;

/// Split a `NAME=VALUE` command-line binding.
pub fn parse_variable(text: &str) -> CliResult<(String, Value)> {
    let (name, raw) =
        text.split_once('=').ok_or_else(|| anyhow!("expected NAME=VALUE, got {text:?}"))?;
    let name = name.trim().trim_start_matches('$');
    if name.is_empty() {
        return Err(anyhow!("variable binding {text:?} has no name"));
    }
    Ok((name.to_string(), parse_value(raw)))
}

/// Interpret a raw command-line value: integers, doubles and booleans are typed,
/// anything else stays a string. Quotes force a string.
pub fn parse_value(raw: &str) -> Value {
    if let Some(quoted) = raw
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .or_else(|| raw.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')))
    {
        return Value::from(quoted);
    }
    if let Ok(integer) = raw.parse::<i64>() {
        return Value::Integer(integer);
    }
    if let Ok(double) = raw.parse::<f64>()
        && raw.contains(|c: char| c.is_ascii_digit())
    {
        return Value::Double(double);
    }
    match raw {
        "true" => Value::Boolean(true),
        "false" => Value::Boolean(false),
        _ => Value::from(raw),
    }
}

/// Split a `PREFIX=URI` namespace binding.
pub fn parse_namespace(text: &str) -> CliResult<(String, String)> {
    let (prefix, uri) = text
        .split_once('=')
        .with_context(|| format!("expected PREFIX=URI, got {text:?}"))?;
    if prefix.is_empty() || uri.is_empty() {
        return Err(anyhow!("namespace binding {text:?} needs both a prefix and a URI"));
    }
    Ok((prefix.to_string(), uri.to_string()))
}
