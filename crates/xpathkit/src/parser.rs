use crate::model::QName;
use pest::Parser;
use pest::error::{ErrorVariant, InputLocation, LineColLocation};
use pest::iterators::Pair;
use thiserror::Error;

pub mod ast;

use ast::{
    ArithOp, AxisStep, Axis, Binding, CompareKind, CompareOp, Expression, KeySpecifier, KindTest,
    NameTest, NodeTest, PathExpr, PathStart, PostfixOp, Quantifier, Scalar, SetOp, Sign,
    WildcardName,
};

#[derive(pest_derive::Parser)]
#[grammar = "xpath.pest"]
pub struct XPathParser;

/// Syntax error with its location in the source text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    /// Byte offset into the input.
    pub position: usize,
    pub line: usize,
    pub column: usize,
    pub expected: Vec<String>,
    pub message: String,
}

impl ParseError {
    fn at(pair: &Pair<Rule>, message: impl Into<String>) -> Self {
        let span = pair.as_span();
        let (line, column) = span.start_pos().line_col();
        Self { position: span.start(), line, column, expected: Vec::new(), message: message.into() }
    }

    fn after(pair: &Pair<Rule>, message: impl Into<String>) -> Self {
        let span = pair.as_span();
        let (line, column) = span.end_pos().line_col();
        Self { position: span.end(), line, column, expected: Vec::new(), message: message.into() }
    }
}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(error: pest::error::Error<Rule>) -> Self {
        let position = match error.location {
            InputLocation::Pos(pos) | InputLocation::Span((pos, _)) => pos,
        };
        let (line, column) = match error.line_col {
            LineColLocation::Pos(lc) | LineColLocation::Span(lc, _) => lc,
        };
        let expected = match &error.variant {
            ErrorVariant::ParsingError { positives, .. } => {
                positives.iter().map(|rule| format!("{rule:?}")).collect()
            }
            ErrorVariant::CustomError { .. } => Vec::new(),
        };
        Self { position, line, column, expected, message: error.variant.message().into_owned() }
    }
}

type BuildResult<T> = Result<T, ParseError>;

/// One step of a path: an axis step or any other postfix expression.
enum Segment {
    Axis(AxisStep),
    Expr(Expression),
}

/// Group runs of axis steps into [`PathExpr`]s and chain everything else with
/// [`Expression::PathStep`]. Only the first run carries `start`.
fn assemble_path(start: PathStart, segments: Vec<Segment>) -> Expression {
    let mut base: Option<Expression> = None;
    let mut run = Vec::new();
    for segment in segments {
        let step = match segment {
            Segment::Axis(step) => {
                run.push(step);
                continue;
            }
            Segment::Expr(expr) => expr,
        };
        base = Some(match close_run(base.take(), core::mem::take(&mut run), start) {
            Some(head) => Expression::PathStep { base: Box::new(head), step: Box::new(step) },
            None => step,
        });
    }
    close_run(base, run, start).unwrap_or(Expression::Sequence(Vec::new()))
}

fn close_run(base: Option<Expression>, run: Vec<AxisStep>, start: PathStart) -> Option<Expression> {
    match (base, run.is_empty()) {
        (Some(base), true) => Some(base),
        (Some(base), false) => Some(Expression::PathStep {
            base: Box::new(base),
            step: Box::new(Expression::Path(PathExpr { start: PathStart::Relative, steps: run })),
        }),
        (None, false) => Some(Expression::Path(PathExpr { start, steps: run })),
        // `/` directly followed by an expression step starts from the root node.
        (None, true) if start == PathStart::Root => Some(Expression::Path(PathExpr {
            start,
            steps: vec![AxisStep::new(Axis::SelfAxis, NodeTest::Kind(KindTest::AnyKind))],
        })),
        (None, true) => None,
    }
}

/// Parse a complete expression. Trailing input is an error.
pub fn parse(text: &str) -> Result<Expression, ParseError> {
    let mut pairs = XPathParser::parse(Rule::xpath, text)?;
    let root = pairs.next().ok_or_else(|| empty_input(text))?;
    let expr = root.into_inner().next().ok_or_else(|| empty_input(text))?;
    let ast = XPathParser::build_expr(expr)?;
    tracing::debug!(input = text, ast = %ast, "parsed expression");
    Ok(ast)
}

fn empty_input(text: &str) -> ParseError {
    ParseError {
        position: text.len(),
        line: 1,
        column: 1,
        expected: vec!["expr".to_string()],
        message: "empty expression".to_string(),
    }
}

/// Fold a flat `a op b op c ...` chain into a tree: multiplicative operators
/// bind first, then additive ones; each level associates to the left.
pub fn reduce_arithmetic(first: Expression, rest: Vec<(ArithOp, Expression)>) -> Expression {
    let (head, rest) = fold_level(first, rest, 2);
    let (head, _) = fold_level(head, rest, 1);
    head
}

fn fold_level(
    first: Expression,
    rest: Vec<(ArithOp, Expression)>,
    precedence: u8,
) -> (Expression, Vec<(ArithOp, Expression)>) {
    let mut head = first;
    let mut remaining: Vec<(ArithOp, Expression)> = Vec::with_capacity(rest.len());
    for (op, operand) in rest {
        if op.precedence() != precedence {
            remaining.push((op, operand));
            continue;
        }
        match remaining.pop() {
            Some((prev, left)) => remaining.push((prev, binary(op, left, operand))),
            None => head = binary(op, head, operand),
        }
    }
    (head, remaining)
}

fn binary(op: ArithOp, left: Expression, right: Expression) -> Expression {
    Expression::BinaryOp { op, left: Box::new(left), right: Box::new(right) }
}

impl XPathParser {
    /// Walk down a pair to the first terminal token rule (e.g. `OP_PLUS`, `K_AND`).
    fn first_token_rule(pair: &Pair<Rule>) -> Rule {
        let mut current = pair.clone();
        while let Some(next) = current.clone().into_inner().next() {
            current = next;
        }
        current.as_rule()
    }

    fn build_expr(pair: Pair<Rule>) -> BuildResult<Expression> {
        match pair.as_rule() {
            Rule::expr => {
                let mut items =
                    pair.into_inner().map(Self::build_expr).collect::<BuildResult<Vec<_>>>()?;
                if items.len() == 1 {
                    Ok(items.remove(0))
                } else {
                    Ok(Expression::Sequence(items))
                }
            }
            Rule::expr_single | Rule::primary_expr | Rule::step_expr => {
                let inner = Self::single_child(&pair)?;
                Self::build_expr(inner)
            }
            Rule::for_expr => {
                let (bindings, body) = Self::build_bindings(pair)?;
                Ok(Expression::For { bindings, body: Box::new(body) })
            }
            Rule::let_expr => {
                let (bindings, body) = Self::build_bindings(pair)?;
                Ok(Expression::Let { bindings, body: Box::new(body) })
            }
            Rule::quantified_expr => {
                let quantifier = match Self::first_token_rule(&pair) {
                    Rule::K_EVERY => Quantifier::Every,
                    _ => Quantifier::Some,
                };
                let (bindings, satisfies) = Self::build_bindings(pair)?;
                Ok(Expression::Quantified { quantifier, bindings, satisfies: Box::new(satisfies) })
            }
            Rule::if_expr => {
                let mut parts = pair
                    .clone()
                    .into_inner()
                    .filter(|p| matches!(p.as_rule(), Rule::expr | Rule::expr_single));
                let mut next = || {
                    parts
                        .next()
                        .ok_or_else(|| ParseError::at(&pair, "incomplete if expression"))
                        .and_then(Self::build_expr)
                };
                let test = next()?;
                let then_branch = next()?;
                let else_branch = next()?;
                Ok(Expression::If {
                    test: Box::new(test),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                })
            }
            Rule::or_expr => Self::build_logical(pair, Expression::Or),
            Rule::and_expr => Self::build_logical(pair, Expression::And),
            Rule::comparison_expr => Self::build_comparison(pair),
            Rule::range_expr => {
                let mut inners = pair.clone().into_inner();
                let from = Self::build_next(&pair, &mut inners)?;
                match inners.next() {
                    Some(to_token) => {
                        let to = inners
                            .next()
                            .ok_or_else(|| ParseError::at(&to_token, "missing range end"))?;
                        Ok(Expression::Range {
                            from: Box::new(from),
                            to: Box::new(Self::build_expr(to)?),
                        })
                    }
                    None => Ok(from),
                }
            }
            Rule::arithmetic_expr => Self::build_arithmetic(pair),
            Rule::union_expr | Rule::intersect_except_expr => Self::build_set_chain(pair),
            Rule::unary_expr => {
                let mut signs = Vec::new();
                let mut operand = None;
                for inner in pair.clone().into_inner() {
                    match inner.as_rule() {
                        Rule::OP_MINUS => signs.push(Sign::Minus),
                        Rule::OP_PLUS => signs.push(Sign::Plus),
                        _ => operand = Some(Self::build_expr(inner)?),
                    }
                }
                let mut expr = operand.ok_or_else(|| ParseError::at(&pair, "missing operand"))?;
                for op in signs.into_iter().rev() {
                    expr = Expression::UnaryOp { op, operand: Box::new(expr) };
                }
                Ok(expr)
            }
            Rule::simple_map_expr => {
                let mut items = pair
                    .into_inner()
                    .filter(|p| p.as_rule() != Rule::OP_BANG)
                    .map(Self::build_expr)
                    .collect::<BuildResult<Vec<_>>>()?;
                if items.len() == 1 {
                    Ok(items.remove(0))
                } else {
                    Ok(Expression::SimpleMap(items))
                }
            }
            Rule::path_expr => {
                let inner = Self::single_child(&pair)?;
                match inner.as_rule() {
                    Rule::absolute_path => Self::build_absolute_path(inner),
                    _ => Self::build_relative_path(inner),
                }
            }
            Rule::postfix_expr => Self::build_postfix(pair),
            Rule::parenthesized_expr => match pair.into_inner().next() {
                Some(inner) => Self::build_expr(inner),
                None => Ok(Expression::Sequence(Vec::new())),
            },
            Rule::numeric_literal => {
                let inner = Self::single_child(&pair)?;
                Self::build_numeric(&inner).map(Expression::Literal)
            }
            Rule::string_literal => Ok(Expression::Literal(Scalar::String(unquote(&pair)))),
            Rule::var_ref => {
                let name = Self::single_child(&pair)?;
                Ok(Expression::VariableRef(QName::parse(name.as_str())))
            }
            Rule::context_item_expr => Ok(Expression::ContextItem),
            Rule::function_call => {
                let mut inners = pair.clone().into_inner();
                let name = inners.next().ok_or_else(|| ParseError::at(&pair, "missing name"))?;
                let args = match inners.next() {
                    Some(list) => Self::build_arguments(list)?,
                    None => Vec::new(),
                };
                Ok(Expression::FunctionCall { name: QName::parse(name.as_str()), args })
            }
            Rule::axis_step => {
                let step = Self::build_axis_step(pair)?;
                Ok(Expression::Path(PathExpr { start: PathStart::Relative, steps: vec![step] }))
            }
            _ => Err(ParseError::at(&pair, format!("unexpected {:?}", pair.as_rule()))),
        }
    }

    fn single_child<'i>(pair: &Pair<'i, Rule>) -> BuildResult<Pair<'i, Rule>> {
        pair.clone()
            .into_inner()
            .next()
            .ok_or_else(|| ParseError::at(pair, format!("empty {:?}", pair.as_rule())))
    }

    /// Build the next operand of `parent`; a missing one is reported where
    /// `parent` ends.
    fn build_next<'i>(
        parent: &Pair<'i, Rule>,
        inners: &mut pest::iterators::Pairs<'i, Rule>,
    ) -> BuildResult<Expression> {
        match inners.next() {
            Some(pair) => Self::build_expr(pair),
            None => Err(ParseError::after(parent, "missing operand")),
        }
    }

    fn build_numeric(pair: &Pair<Rule>) -> BuildResult<Scalar> {
        let text = pair.as_str();
        match pair.as_rule() {
            Rule::integer_literal => text
                .parse::<i64>()
                .map(Scalar::Integer)
                .map_err(|_| ParseError::at(pair, format!("integer literal out of range: {text}"))),
            _ => text
                .parse::<f64>()
                .map(Scalar::Double)
                .map_err(|_| ParseError::at(pair, format!("invalid numeric literal: {text}"))),
        }
    }

    fn build_arguments(pair: Pair<Rule>) -> BuildResult<Vec<Expression>> {
        pair.into_inner().map(Self::build_expr).collect()
    }

    fn build_bindings(pair: Pair<Rule>) -> BuildResult<(Vec<Binding>, Expression)> {
        let mut bindings = Vec::new();
        let mut body = None;
        for inner in pair.clone().into_inner() {
            match inner.as_rule() {
                Rule::in_binding | Rule::let_binding => {
                    let mut parts = inner.clone().into_inner().filter(|p| p.as_rule() != Rule::K_IN);
                    let var = parts
                        .next()
                        .ok_or_else(|| ParseError::at(&inner, "missing variable"))?;
                    let name = Self::single_child(&var)?;
                    let expr = parts
                        .next()
                        .ok_or_else(|| ParseError::at(&inner, "missing binding expression"))?;
                    bindings.push(Binding {
                        var: QName::parse(name.as_str()),
                        expr: Self::build_expr(expr)?,
                    });
                }
                Rule::expr_single => body = Some(Self::build_expr(inner)?),
                _ => {}
            }
        }
        let body = body.ok_or_else(|| ParseError::at(&pair, "missing return expression"))?;
        Ok((bindings, body))
    }

    fn build_logical(
        pair: Pair<Rule>,
        make: fn(Vec<Expression>) -> Expression,
    ) -> BuildResult<Expression> {
        let mut operands = pair
            .into_inner()
            .filter(|p| !matches!(p.as_rule(), Rule::K_AND | Rule::K_OR))
            .map(Self::build_expr)
            .collect::<BuildResult<Vec<_>>>()?;
        if operands.len() == 1 {
            Ok(operands.remove(0))
        } else {
            Ok(make(operands))
        }
    }

    fn build_comparison(pair: Pair<Rule>) -> BuildResult<Expression> {
        let mut inners = pair.clone().into_inner();
        let left = Self::build_next(&pair, &mut inners)?;
        let Some(op_token) = inners.next() else {
            return Ok(left);
        };
        let (kind, op) = match op_token.as_rule() {
            Rule::K_EQ => (CompareKind::Value, CompareOp::Eq),
            Rule::K_NE => (CompareKind::Value, CompareOp::Ne),
            Rule::K_LT => (CompareKind::Value, CompareOp::Lt),
            Rule::K_LE => (CompareKind::Value, CompareOp::Le),
            Rule::K_GT => (CompareKind::Value, CompareOp::Gt),
            Rule::K_GE => (CompareKind::Value, CompareOp::Ge),
            Rule::OP_EQ => (CompareKind::General, CompareOp::Eq),
            Rule::OP_NE => (CompareKind::General, CompareOp::Ne),
            Rule::OP_LT => (CompareKind::General, CompareOp::Lt),
            Rule::OP_LTE => (CompareKind::General, CompareOp::Le),
            Rule::OP_GT => (CompareKind::General, CompareOp::Gt),
            Rule::OP_GTE => (CompareKind::General, CompareOp::Ge),
            Rule::K_IS => (CompareKind::Node, CompareOp::Is),
            Rule::OP_PRECEDES => (CompareKind::Node, CompareOp::Precedes),
            Rule::OP_FOLLOWS => (CompareKind::Node, CompareOp::Follows),
            other => return Err(ParseError::at(&op_token, format!("unknown comparison {other:?}"))),
        };
        let right = Self::build_next(&pair, &mut inners)?;
        Ok(Expression::Compare { kind, op, left: Box::new(left), comparators: vec![right] })
    }

    fn build_arithmetic(pair: Pair<Rule>) -> BuildResult<Expression> {
        let mut inners = pair.clone().into_inner();
        let first = Self::build_next(&pair, &mut inners)?;
        let mut rest = Vec::new();
        while let Some(token) = inners.next() {
            let op = match token.as_rule() {
                Rule::OP_PLUS => ArithOp::Add,
                Rule::OP_MINUS => ArithOp::Sub,
                Rule::OP_STAR => ArithOp::Mul,
                Rule::K_DIV => ArithOp::Div,
                Rule::K_IDIV => ArithOp::IDiv,
                Rule::K_MOD => ArithOp::Mod,
                other => {
                    return Err(ParseError::at(&token, format!("unknown operator {other:?}")));
                }
            };
            rest.push((op, Self::build_next(&pair, &mut inners)?));
        }
        Ok(reduce_arithmetic(first, rest))
    }

    fn build_set_chain(pair: Pair<Rule>) -> BuildResult<Expression> {
        let mut inners = pair.clone().into_inner();
        let mut expr = Self::build_next(&pair, &mut inners)?;
        while let Some(token) = inners.next() {
            let op = match token.as_rule() {
                Rule::K_INTERSECT => SetOp::Intersect,
                Rule::K_EXCEPT => SetOp::Except,
                _ => SetOp::Union,
            };
            let right = Self::build_next(&pair, &mut inners)?;
            expr = Expression::SetOp { op, left: Box::new(expr), right: Box::new(right) };
        }
        Ok(expr)
    }

    fn build_postfix(pair: Pair<Rule>) -> BuildResult<Expression> {
        let mut inners = pair.clone().into_inner();
        let primary = Self::build_next(&pair, &mut inners)?;
        let filters = inners
            .map(|filter| match filter.as_rule() {
                Rule::predicate => {
                    Self::single_child(&filter).and_then(Self::build_expr).map(PostfixOp::Predicate)
                }
                Rule::argument_list => Self::build_arguments(filter).map(PostfixOp::Arguments),
                _ => Self::build_key(&filter).map(PostfixOp::Lookup),
            })
            .collect::<BuildResult<Vec<_>>>()?;
        if filters.is_empty() {
            return Ok(primary);
        }
        Ok(Expression::Postfix { primary: Box::new(primary), filters })
    }

    fn build_key(lookup: &Pair<Rule>) -> BuildResult<KeySpecifier> {
        let key = Self::single_child(&Self::single_child(lookup)?)?;
        match key.as_rule() {
            Rule::ncname => Ok(KeySpecifier::Name(key.as_str().to_string())),
            Rule::integer_literal => match Self::build_numeric(&key)? {
                Scalar::Integer(i) => Ok(KeySpecifier::Integer(i)),
                _ => Err(ParseError::at(&key, "invalid lookup key")),
            },
            Rule::any_name => Ok(KeySpecifier::Wildcard),
            _ => Ok(KeySpecifier::Expr(Box::new(Self::build_expr(key)?))),
        }
    }

    // ===== Paths =====

    fn build_absolute_path(pair: Pair<Rule>) -> BuildResult<Expression> {
        let mut inners = pair.clone().into_inner();
        let marker = Self::single_child(&pair)?;
        inners.next();
        let mut segments = Vec::new();
        if marker.as_rule() == Rule::OP_DSLASH {
            segments.push(Segment::Axis(AxisStep::descendant_or_self()));
        }
        match inners.next() {
            Some(relative) => segments.extend(Self::collect_steps(relative)?),
            None => return Ok(Expression::Literal(Scalar::String("/".to_string()))),
        }
        Ok(assemble_path(PathStart::Root, segments))
    }

    fn build_relative_path(pair: Pair<Rule>) -> BuildResult<Expression> {
        let mut step_pairs = pair.clone().into_inner();
        if let (Some(only), None) = (step_pairs.next(), step_pairs.next()) {
            // A lone primary (`$x`, `f()`, `(1, 2)[1]`) is not a path.
            return Self::build_expr(only);
        }
        let segments = Self::collect_steps(pair)?;
        Ok(assemble_path(PathStart::Relative, segments))
    }

    fn collect_steps(pair: Pair<Rule>) -> BuildResult<Vec<Segment>> {
        let mut segments = Vec::new();
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::OP_DSLASH => segments.push(Segment::Axis(AxisStep::descendant_or_self())),
                Rule::OP_SLASH => {}
                _ => segments.push(Self::build_step(inner)?),
            }
        }
        Ok(segments)
    }

    fn build_step(pair: Pair<Rule>) -> BuildResult<Segment> {
        let inner = Self::single_child(&pair)?;
        if inner.as_rule() == Rule::axis_step {
            return Self::build_axis_step(inner).map(Segment::Axis);
        }
        let mut parts = inner.clone().into_inner();
        let primary = parts.next().ok_or_else(|| ParseError::at(&inner, "empty step"))?;
        let is_context = Self::single_child(&primary)?.as_rule() == Rule::context_item_expr;
        // `.` and `.[p]` are `self::node()` steps.
        if is_context && parts.clone().all(|filter| filter.as_rule() == Rule::predicate) {
            let mut step = AxisStep::new(Axis::SelfAxis, NodeTest::Kind(KindTest::AnyKind));
            for filter in parts {
                step.predicates.push(Self::build_expr(Self::single_child(&filter)?)?);
            }
            return Ok(Segment::Axis(step));
        }
        Self::build_postfix(inner).map(Segment::Expr)
    }

    fn build_axis_step(pair: Pair<Rule>) -> BuildResult<AxisStep> {
        let mut inners = pair.clone().into_inner();
        let first = inners.next().ok_or_else(|| ParseError::at(&pair, "empty step"))?;
        let mut step = match first.as_rule() {
            Rule::forward_step => Self::build_forward_step(first)?,
            _ => Self::build_reverse_step(first)?,
        };
        for predicate in inners {
            step.predicates.push(Self::build_expr(Self::single_child(&predicate)?)?);
        }
        Ok(step)
    }

    fn build_forward_step(pair: Pair<Rule>) -> BuildResult<AxisStep> {
        let mut inners = pair.clone().into_inner();
        let first = inners.next().ok_or_else(|| ParseError::at(&pair, "empty step"))?;
        if first.as_rule() == Rule::abbrev_forward_step {
            let mut parts = first.clone().into_inner();
            let head = parts.next().ok_or_else(|| ParseError::at(&first, "missing node test"))?;
            if head.as_rule() == Rule::OP_AT {
                let test = parts.next().ok_or_else(|| ParseError::at(&first, "missing node test"))?;
                return Ok(AxisStep::new(Axis::Attribute, Self::build_node_test(test)?));
            }
            return Ok(AxisStep::new(Axis::Child, Self::build_node_test(head)?));
        }
        let axis = match Self::first_token_rule(&first) {
            Rule::K_CHILD => Axis::Child,
            Rule::K_DESCENDANT => Axis::Descendant,
            Rule::K_ATTRIBUTE => Axis::Attribute,
            Rule::K_SELF => Axis::SelfAxis,
            Rule::K_DESCENDANT_OR_SELF => Axis::DescendantOrSelf,
            Rule::K_FOLLOWING_SIBLING => Axis::FollowingSibling,
            Rule::K_FOLLOWING => Axis::Following,
            _ => Axis::Namespace,
        };
        let test = inners.next().ok_or_else(|| ParseError::at(&pair, "missing node test"))?;
        Ok(AxisStep::new(axis, Self::build_node_test(test)?))
    }

    fn build_reverse_step(pair: Pair<Rule>) -> BuildResult<AxisStep> {
        let mut inners = pair.clone().into_inner();
        let first = inners.next().ok_or_else(|| ParseError::at(&pair, "empty step"))?;
        if first.as_rule() == Rule::abbrev_reverse_step {
            return Ok(AxisStep::new(Axis::Parent, NodeTest::Kind(KindTest::AnyKind)));
        }
        let axis = match Self::first_token_rule(&first) {
            Rule::K_PARENT => Axis::Parent,
            Rule::K_ANCESTOR => Axis::Ancestor,
            Rule::K_ANCESTOR_OR_SELF => Axis::AncestorOrSelf,
            Rule::K_PRECEDING_SIBLING => Axis::PrecedingSibling,
            _ => Axis::Preceding,
        };
        let test = inners.next().ok_or_else(|| ParseError::at(&pair, "missing node test"))?;
        Ok(AxisStep::new(axis, Self::build_node_test(test)?))
    }

    fn build_node_test(pair: Pair<Rule>) -> BuildResult<NodeTest> {
        let inner = Self::single_child(&pair)?;
        match inner.as_rule() {
            Rule::kind_test => Self::build_kind_test(&Self::single_child(&inner)?).map(NodeTest::Kind),
            _ => Self::build_name_test(&Self::single_child(&inner)?).map(NodeTest::Name),
        }
    }

    fn build_name_test(pair: &Pair<Rule>) -> BuildResult<NameTest> {
        let text = pair.as_str();
        if pair.as_rule() == Rule::qname {
            return Ok(NameTest::QName(QName::parse(text)));
        }
        let wildcard = if text == "*" {
            WildcardName::Any
        } else if let Some(local) = text.strip_prefix("*:") {
            WildcardName::LocalWildcard(local.to_string())
        } else if let Some(prefix) = text.strip_suffix(":*") {
            WildcardName::NsWildcard(prefix.to_string())
        } else {
            return Err(ParseError::at(pair, format!("invalid wildcard {text}")));
        };
        Ok(NameTest::Wildcard(wildcard))
    }

    fn build_kind_test(pair: &Pair<Rule>) -> BuildResult<KindTest> {
        let argument = pair.clone().into_inner().next();
        let optional_name = |arg: Option<Pair<Rule>>| match arg {
            Some(name) if name.as_rule() == Rule::qname => Some(QName::parse(name.as_str())),
            _ => None,
        };
        let required_name = |arg: Option<Pair<Rule>>| {
            arg.map(|name| QName::parse(name.as_str()))
                .ok_or_else(|| ParseError::at(pair, "missing name"))
        };
        Ok(match pair.as_rule() {
            Rule::any_kind_test => KindTest::AnyKind,
            Rule::text_test => KindTest::Text,
            Rule::comment_test => KindTest::Comment,
            Rule::pi_test => KindTest::ProcessingInstruction(argument.map(|target| {
                match target.as_rule() {
                    Rule::string_literal => unquote(&target),
                    _ => target.as_str().to_string(),
                }
            })),
            Rule::element_test => KindTest::Element(optional_name(argument)),
            Rule::attribute_test => KindTest::Attribute(optional_name(argument)),
            Rule::schema_element_test => KindTest::SchemaElement(required_name(argument)?),
            Rule::schema_attribute_test => KindTest::SchemaAttribute(required_name(argument)?),
            Rule::document_test => match argument {
                Some(inner) => KindTest::Document(Some(Box::new(Self::build_kind_test(&inner)?))),
                None => KindTest::Document(None),
            },
            other => return Err(ParseError::at(pair, format!("unknown kind test {other:?}"))),
        })
    }
}

/// Literal text of a `string_literal` pair with doubled quotes collapsed.
fn unquote(pair: &Pair<Rule>) -> String {
    match pair.clone().into_inner().next() {
        Some(inner) if inner.as_rule() == Rule::dbl_string_inner => {
            inner.as_str().replace("\"\"", "\"")
        }
        Some(inner) => inner.as_str().replace("''", "'"),
        None => String::new(),
    }
}
