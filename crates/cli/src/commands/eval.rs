use crate::OutputFormat;
use crate::util::{CliResult, parse_namespace, parse_variable};
use anyhow::Context;
use clap::Args;
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;
use std::fmt::Write;
use std::path::PathBuf;
use std::sync::Arc;
use xpathkit::{
    DynamicContext, DynamicContextBuilder, EvaluationOptions, RangeEnd, Value, XmlDocument,
    evaluate_with, parse,
};

#[derive(Args, Debug, Clone)]
pub struct EvalArgs {
    #[arg(value_name = "EXPRESSION")]
    pub expression: String,
    /// Bind a variable, e.g. `--var limit=10`. Repeatable.
    #[arg(long = "var", value_name = "NAME=VALUE")]
    pub variables: Vec<String>,
    /// XML file that path expressions are evaluated against.
    #[arg(long = "xml", value_name = "FILE")]
    pub xml: Option<PathBuf>,
    /// Extra namespace prefix for path name tests, e.g. `--namespace acme=urn:acme`.
    #[arg(long = "namespace", value_name = "PREFIX=URI")]
    pub namespaces: Vec<String>,
    /// Treat the upper bound of `a to b` as exclusive.
    #[arg(long)]
    pub exclusive_ranges: bool,
    /// Fail on unbound variables instead of treating them as empty.
    #[arg(long)]
    pub strict_variables: bool,
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ItemSummary {
    #[serde(rename = "type")]
    kind: &'static str,
    value: serde_json::Value,
}

#[derive(Serialize, Debug, PartialEq)]
struct EvalSummary<'a> {
    expression: &'a str,
    count: usize,
    items: &'a [ItemSummary],
}

pub fn run(args: &EvalArgs) -> CliResult<String> {
    let items = evaluate_items(args)?;
    let output = match args.format {
        OutputFormat::Text => render_eval_text(&items, true),
        OutputFormat::Json => render_eval_json(&args.expression, &items)?,
    };
    Ok(output)
}

pub(crate) fn evaluate_items(args: &EvalArgs) -> CliResult<Vec<ItemSummary>> {
    let ast = parse(&args.expression)?;
    let context = build_context(args)?;
    let value = evaluate_with(&ast, &context)
        .with_context(|| format!("evaluating {:?}", args.expression))?;
    tracing::info!(items = value.item_count(), kind = value.type_name(), "evaluated expression");
    Ok(summarize_value(value))
}

pub(crate) fn build_context(args: &EvalArgs) -> CliResult<DynamicContext> {
    let mut builder = DynamicContextBuilder::new().with_options(EvaluationOptions {
        range_end: if args.exclusive_ranges { RangeEnd::Exclusive } else { RangeEnd::Inclusive },
        strict_variables: args.strict_variables,
    });
    for binding in &args.variables {
        let (name, value) = parse_variable(binding)?;
        tracing::debug!(%name, %value, "binding variable");
        builder = builder.with_variable(name, value);
    }

    if let Some(path) = &args.xml {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut document =
            XmlDocument::parse(&text).with_context(|| format!("parsing {}", path.display()))?;
        for binding in &args.namespaces {
            let (prefix, uri) = parse_namespace(binding)?;
            document = document.with_namespace(prefix, uri);
        }
        builder = builder.with_document(Arc::new(document));
    } else if !args.namespaces.is_empty() {
        tracing::warn!("--namespace has no effect without --xml");
    }
    Ok(builder.build())
}

pub(crate) fn summarize_value(value: Value) -> Vec<ItemSummary> {
    value.into_items().into_iter().map(summarize_item).collect()
}

fn summarize_item(item: Value) -> ItemSummary {
    let kind = item.type_name();
    let value = match &item {
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Double(d) => serde_json::Number::from_f64(*d)
            .map(serde_json::Value::Number)
            .unwrap_or_else(|| serde_json::Value::String(item.to_string())),
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        _ => serde_json::Value::String(item.to_string()),
    };
    ItemSummary { kind, value }
}

fn format_item(item: &ItemSummary) -> String {
    match &item.value {
        serde_json::Value::String(text) if item.kind == "string" => {
            serde_json::to_string(text).unwrap_or_else(|_| format!("\"{text}\""))
        }
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn colorize_item(item: &ItemSummary, rendered: &str) -> String {
    match item.kind {
        "string" => rendered
            .if_supports_color(Stream::Stdout, |text| text.fg_rgb::<136, 192, 74>().to_string())
            .to_string(),
        "integer" | "double" => rendered
            .if_supports_color(Stream::Stdout, |text| text.fg_rgb::<79, 166, 255>().to_string())
            .to_string(),
        "boolean" => rendered
            .if_supports_color(Stream::Stdout, |text| text.bold().to_string())
            .to_string(),
        _ => rendered
            .if_supports_color(Stream::Stdout, |text| text.fg_rgb::<241, 149, 255>().to_string())
            .to_string(),
    }
}

fn render_eval_text(items: &[ItemSummary], styled: bool) -> String {
    if items.is_empty() {
        return if styled {
            "()".if_supports_color(Stream::Stdout, |text| text.dimmed().to_string()).to_string()
        } else {
            "()".to_owned()
        };
    }
    let mut output = String::new();
    for item in items {
        let rendered = format_item(item);
        if styled {
            let _ = writeln!(&mut output, "{}", colorize_item(item, &rendered));
        } else {
            let _ = writeln!(&mut output, "{rendered}");
        }
    }
    output.trim_end().to_owned()
}

fn render_eval_json(expression: &str, items: &[ItemSummary]) -> CliResult<String> {
    let summary = EvalSummary { expression, count: items.len(), items };
    Ok(serde_json::to_string_pretty(&summary)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn plain(args: &EvalArgs) -> CliResult<String> {
        evaluate_items(args).map(|items| render_eval_text(&items, false))
    }

    fn args(expression: &str) -> EvalArgs {
        EvalArgs {
            expression: expression.to_owned(),
            variables: Vec::new(),
            xml: None,
            namespaces: Vec::new(),
            exclusive_ranges: false,
            strict_variables: false,
            format: OutputFormat::Text,
        }
    }

    #[fixture]
    fn ledger() -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"<ledger xmlns:fx="urn:fx"><entry currency="EUR">1400</entry><entry currency="USD">12100</entry><fx:rate>1.1</fx:rate></ledger>"#
        )
        .expect("write");
        file
    }

    #[rstest]
    #[case::integer("1 + 2 * 3", "7")]
    #[case::sequence("(1, 'two', true())", "1\n\"two\"\ntrue")]
    #[case::empty("()", "()")]
    #[case::date("date('2021-01-31') + year-month-duration('P1M')", "2021-02-28")]
    fn text_output(#[case] expression: &str, #[case] expected: &str) {
        assert_eq!(plain(&args(expression)).expect("output"), expected);
    }

    #[rstest]
    fn variables_are_bound_from_arguments() {
        let mut args = args("$limit * 2 + count($tags)");
        args.variables = vec!["limit=10".into(), "tags='x'".into()];
        assert_eq!(plain(&args).expect("output"), "21");
    }

    #[rstest]
    fn strict_variables_fail_on_unbound_names() {
        let mut args = args("$missing");
        assert_eq!(plain(&args).expect("output"), "()");
        args.strict_variables = true;
        let error = run(&args).unwrap_err();
        assert!(format!("{error:#}").contains("unknown variable $missing"), "{error:#}");
    }

    #[rstest]
    fn exclusive_ranges_drop_the_upper_bound() {
        let mut args = args("count(1 to 10)");
        args.exclusive_ranges = true;
        assert_eq!(plain(&args).expect("output"), "9");
    }

    #[rstest]
    fn paths_query_the_xml_file(ledger: NamedTempFile) {
        let mut args = args("sum(//entry[@currency = $cur])");
        args.xml = Some(ledger.path().to_path_buf());
        args.variables = vec!["cur=USD".into()];
        assert_eq!(plain(&args).expect("output"), "12100");
    }

    #[rstest]
    fn namespace_bindings_reach_the_document(ledger: NamedTempFile) {
        let mut args = args("//rates:rate");
        args.xml = Some(ledger.path().to_path_buf());
        args.namespaces = vec!["rates=urn:fx".into()];
        assert_eq!(plain(&args).expect("output"), "\"1.1\"");
    }

    #[rstest]
    fn missing_files_name_the_path() {
        let mut args = args("//entry");
        args.xml = Some(PathBuf::from("/nonexistent/ledger.xml"));
        let error = run(&args).unwrap_err();
        assert!(error.to_string().contains("/nonexistent/ledger.xml"), "{error}");
    }

    #[rstest]
    fn json_output_types_each_item() {
        let mut args = args("(1, 2.5, 'x', number('nan'))");
        args.format = OutputFormat::Json;
        let output = run(&args).expect("output");
        let parsed: serde_json::Value = serde_json::from_str(&output).expect("json");
        assert_eq!(parsed["count"], 4);
        assert_eq!(parsed["items"][0]["type"], "integer");
        assert_eq!(parsed["items"][1]["value"], 2.5);
        assert_eq!(parsed["items"][2]["value"], "x");
        assert_eq!(parsed["items"][3]["value"], "NaN");
    }

    #[rstest]
    fn ranges_are_expanded_into_items() {
        let items = summarize_value(Value::from(xpathkit::IntRange::new(1, 3)));
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|item| item.kind == "integer"));
    }
}
