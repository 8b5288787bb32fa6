use crate::OutputFormat;
use crate::util::CliResult;
use clap::Args;
use serde::Serialize;
use std::fmt::Write;
use xpathkit::{Expression, parse};

#[derive(Args, Debug, Clone)]
pub struct ParseArgs {
    #[arg(value_name = "EXPRESSION")]
    pub expression: String,
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Serialize, Debug, PartialEq)]
struct ParseSummary {
    expression: String,
    canonical: String,
    tree: String,
}

pub fn run(args: &ParseArgs) -> CliResult<String> {
    let ast = parse(&args.expression)?;
    tracing::debug!(expression = %args.expression, "parsed expression");
    let summary = ParseSummary::from_ast(&args.expression, &ast);
    match args.format {
        OutputFormat::Text => Ok(render_parse_text(&summary)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&summary)?),
    }
}

impl ParseSummary {
    fn from_ast(expression: &str, ast: &Expression) -> Self {
        Self {
            expression: expression.to_owned(),
            canonical: ast.to_string(),
            tree: format!("{ast:#?}"),
        }
    }
}

fn render_parse_text(summary: &ParseSummary) -> String {
    let mut output = String::new();
    let _ = writeln!(&mut output, "{}", summary.canonical);
    let _ = writeln!(&mut output);
    let _ = writeln!(&mut output, "{}", summary.tree);
    output.trim_end().to_owned()
}
