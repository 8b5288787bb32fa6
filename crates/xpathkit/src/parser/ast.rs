//! Expression AST. Nodes own their children; there are no parent links.
//!
//! `Display` prints an expression in a fully parenthesized form that parses
//! back to an equal tree.

use crate::model::QName;
use core::fmt;
use itertools::Itertools;

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Integer(i64),
    Double(f64),
    String(String),
    Boolean(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
}

impl ArithOp {
    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div | Self::IDiv | Self::Mod => 2,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "div",
            Self::IDiv => "idiv",
            Self::Mod => "mod",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareKind {
    Value,
    General,
    Node,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Is,
    Precedes,
    Follows,
}

impl CompareOp {
    pub fn symbol(self, kind: CompareKind) -> &'static str {
        match (kind, self) {
            (CompareKind::Value, Self::Eq) => "eq",
            (CompareKind::Value, Self::Ne) => "ne",
            (CompareKind::Value, Self::Lt) => "lt",
            (CompareKind::Value, Self::Le) => "le",
            (CompareKind::Value, Self::Gt) => "gt",
            (CompareKind::Value, Self::Ge) => "ge",
            (_, Self::Eq) => "=",
            (_, Self::Ne) => "!=",
            (_, Self::Lt) => "<",
            (_, Self::Le) => "<=",
            (_, Self::Gt) => ">",
            (_, Self::Ge) => ">=",
            (_, Self::Is) => "is",
            (_, Self::Precedes) => "<<",
            (_, Self::Follows) => ">>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Union,
    Intersect,
    Except,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Some,
    Every,
}

/// `$var in expr` (for, some, every) or `$var := expr` (let).
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub var: QName,
    pub expr: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Scalar),
    VariableRef(QName),
    ContextItem,
    FunctionCall {
        name: QName,
        args: Vec<Expression>,
    },
    UnaryOp {
        op: Sign,
        operand: Box<Expression>,
    },
    BinaryOp {
        op: ArithOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Compare {
        kind: CompareKind,
        op: CompareOp,
        left: Box<Expression>,
        comparators: Vec<Expression>,
    },
    And(Vec<Expression>),
    Or(Vec<Expression>),
    If {
        test: Box<Expression>,
        then_branch: Box<Expression>,
        else_branch: Box<Expression>,
    },
    Range {
        from: Box<Expression>,
        to: Box<Expression>,
    },
    Path(PathExpr),
    /// `base/step` where `step` is not an axis step: `(//a)/b`, `$x/b`,
    /// `//a/string()`. `step` is evaluated once per node of `base`, with
    /// that node as the context item.
    PathStep {
        base: Box<Expression>,
        step: Box<Expression>,
    },
    Postfix {
        primary: Box<Expression>,
        filters: Vec<PostfixOp>,
    },
    Sequence(Vec<Expression>),
    SimpleMap(Vec<Expression>),
    SetOp {
        op: SetOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    For {
        bindings: Vec<Binding>,
        body: Box<Expression>,
    },
    Let {
        bindings: Vec<Binding>,
        body: Box<Expression>,
    },
    Quantified {
        quantifier: Quantifier,
        bindings: Vec<Binding>,
        satisfies: Box<Expression>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PostfixOp {
    Predicate(Expression),
    Arguments(Vec<Expression>),
    Lookup(KeySpecifier),
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeySpecifier {
    Name(String),
    Integer(i64),
    Expr(Box<Expression>),
    Wildcard,
}

// ===== Paths and steps =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStart {
    Root,
    Relative,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    pub start: PathStart,
    pub steps: Vec<AxisStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    Attribute,
    SelfAxis,
    DescendantOrSelf,
    FollowingSibling,
    Following,
    Namespace,
    Parent,
    Ancestor,
    PrecedingSibling,
    Preceding,
    AncestorOrSelf,
}

impl Axis {
    pub fn name(self) -> &'static str {
        match self {
            Self::Child => "child",
            Self::Descendant => "descendant",
            Self::Attribute => "attribute",
            Self::SelfAxis => "self",
            Self::DescendantOrSelf => "descendant-or-self",
            Self::FollowingSibling => "following-sibling",
            Self::Following => "following",
            Self::Namespace => "namespace",
            Self::Parent => "parent",
            Self::Ancestor => "ancestor",
            Self::PrecedingSibling => "preceding-sibling",
            Self::Preceding => "preceding",
            Self::AncestorOrSelf => "ancestor-or-self",
        }
    }

    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Self::Parent
                | Self::Ancestor
                | Self::AncestorOrSelf
                | Self::PrecedingSibling
                | Self::Preceding
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AxisStep {
    pub axis: Axis,
    pub node_test: NodeTest,
    pub predicates: Vec<Expression>,
}

impl AxisStep {
    pub fn new(axis: Axis, node_test: NodeTest) -> Self {
        Self { axis, node_test, predicates: Vec::new() }
    }

    /// The step `//` stands for.
    pub fn descendant_or_self() -> Self {
        Self::new(Axis::DescendantOrSelf, NodeTest::Kind(KindTest::AnyKind))
    }

    fn is_abbreviated_descendant(&self) -> bool {
        self.axis == Axis::DescendantOrSelf
            && self.node_test == NodeTest::Kind(KindTest::AnyKind)
            && self.predicates.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    Name(NameTest),
    Kind(KindTest),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NameTest {
    QName(QName),
    Wildcard(WildcardName),
}

#[derive(Debug, Clone, PartialEq)]
pub enum WildcardName {
    /// `*`
    Any,
    /// `prefix:*`
    NsWildcard(String),
    /// `*:local`
    LocalWildcard(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum KindTest {
    AnyKind,
    Document(Option<Box<KindTest>>),
    Text,
    Comment,
    ProcessingInstruction(Option<String>),
    Element(Option<QName>),
    Attribute(Option<QName>),
    SchemaElement(QName),
    SchemaAttribute(QName),
}

impl PathExpr {
    /// Render the path in the syntax accepted by [`crate::parse`] and by
    /// [`crate::Document::query`] implementations.
    pub fn to_query_string(&self) -> String {
        let mut out = String::new();
        if self.start == PathStart::Root {
            out.push('/');
        }
        let last = self.steps.len().saturating_sub(1);
        for (index, step) in self.steps.iter().enumerate() {
            if index > 0 && !out.ends_with('/') {
                out.push('/');
            }
            let abbreviate = index < last
                && (index > 0 || self.start == PathStart::Root)
                && step.is_abbreviated_descendant();
            if abbreviate {
                out.push('/');
                continue;
            }
            out.push_str(&step.to_string());
        }
        out
    }
}

impl Expression {
    /// Direct subexpressions, including predicates, filters and binding domains.
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Self::Literal(_) | Self::VariableRef(_) | Self::ContextItem => Vec::new(),
            Self::FunctionCall { args, .. } => args.iter().collect(),
            Self::UnaryOp { operand, .. } => vec![operand],
            Self::BinaryOp { left, right, .. } | Self::SetOp { left, right, .. } => {
                vec![left, right]
            }
            Self::Compare { left, comparators, .. } => {
                core::iter::once(&**left).chain(comparators).collect()
            }
            Self::And(items) | Self::Or(items) | Self::Sequence(items) | Self::SimpleMap(items) => {
                items.iter().collect()
            }
            Self::If { test, then_branch, else_branch } => vec![test, then_branch, else_branch],
            Self::Range { from, to } => vec![from, to],
            Self::Path(path) => path.steps.iter().flat_map(|s| s.predicates.iter()).collect(),
            Self::PathStep { base, step } => vec![base, step],
            Self::Postfix { primary, filters } => {
                let mut out = vec![&**primary];
                for filter in filters {
                    match filter {
                        PostfixOp::Predicate(expr) => out.push(expr),
                        PostfixOp::Arguments(args) => out.extend(args),
                        PostfixOp::Lookup(KeySpecifier::Expr(expr)) => out.push(expr),
                        PostfixOp::Lookup(_) => {}
                    }
                }
                out
            }
            Self::For { bindings, body } | Self::Let { bindings, body } => {
                bindings.iter().map(|b| &b.expr).chain(core::iter::once(&**body)).collect()
            }
            Self::Quantified { bindings, satisfies, .. } => {
                bindings.iter().map(|b| &b.expr).chain(core::iter::once(&**satisfies)).collect()
            }
        }
    }

    fn is_primary(&self) -> bool {
        matches!(
            self,
            Self::Literal(_)
                | Self::VariableRef(_)
                | Self::ContextItem
                | Self::FunctionCall { .. }
                | Self::Sequence(_)
        )
    }
}

fn write_string_literal(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    write!(f, "\"{}\"", text.replace('"', "\"\""))
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // The magnitude of i64::MIN is not a valid literal.
            Self::Integer(i64::MIN) => write!(f, "({} - 1)", i64::MIN + 1),
            Self::Integer(i) if *i < 0 => write!(f, "({i})"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Double(d) if d.is_nan() => f.write_str("(0.0 div 0.0)"),
            Self::Double(d) if d.is_infinite() && *d > 0.0 => f.write_str("(1.0 div 0.0)"),
            Self::Double(d) if d.is_infinite() => f.write_str("(-1.0 div 0.0)"),
            Self::Double(d) if d.is_sign_negative() => write!(f, "({d:?})"),
            Self::Double(d) => write!(f, "{d:?}"),
            Self::String(s) => write_string_literal(f, s),
            Self::Boolean(b) => write!(f, "{b}()"),
        }
    }
}

fn write_bindings(f: &mut fmt::Formatter<'_>, bindings: &[Binding], separator: &str) -> fmt::Result {
    let rendered = bindings.iter().map(|b| format!("${} {separator} {}", b.var, b.expr)).join(", ");
    f.write_str(&rendered)
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(scalar) => write!(f, "{scalar}"),
            Self::VariableRef(name) => write!(f, "${name}"),
            Self::ContextItem => f.write_str("."),
            Self::FunctionCall { name, args } => write!(f, "{name}({})", args.iter().join(", ")),
            Self::UnaryOp { op, operand } => {
                let sign = if *op == Sign::Minus { '-' } else { '+' };
                write!(f, "{sign}({operand})")
            }
            Self::BinaryOp { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Self::Compare { kind, op, left, comparators } => {
                write!(f, "({left}")?;
                for comparator in comparators {
                    write!(f, " {} {comparator}", op.symbol(*kind))?;
                }
                f.write_str(")")
            }
            Self::And(items) => write!(f, "({})", items.iter().join(" and ")),
            Self::Or(items) => write!(f, "({})", items.iter().join(" or ")),
            Self::If { test, then_branch, else_branch } => {
                write!(f, "(if ({test}) then {then_branch} else {else_branch})")
            }
            Self::Range { from, to } => write!(f, "({from} to {to})"),
            Self::Path(path) => f.write_str(&path.to_query_string()),
            Self::PathStep { base, step } => {
                // `.` as a step parses back to `self::node()`, so it keeps its parentheses.
                let bare = |e: &Expression| e.is_primary() && !matches!(e, Self::ContextItem);
                match &**base {
                    nested @ Self::PathStep { .. } => write!(f, "{nested}")?,
                    other if bare(other) => write!(f, "{other}")?,
                    other => write!(f, "({other})")?,
                }
                if bare(step) { write!(f, "/{step}") } else { write!(f, "/({step})") }
            }
            Self::Postfix { primary, filters } => {
                if primary.is_primary() {
                    write!(f, "{primary}")?;
                } else {
                    write!(f, "({primary})")?;
                }
                for filter in filters {
                    match filter {
                        PostfixOp::Predicate(expr) => write!(f, "[{expr}]")?,
                        PostfixOp::Arguments(args) => write!(f, "({})", args.iter().join(", "))?,
                        PostfixOp::Lookup(key) => write!(f, "?{key}")?,
                    }
                }
                Ok(())
            }
            Self::Sequence(items) => write!(f, "({})", items.iter().join(", ")),
            Self::SimpleMap(items) => write!(f, "({})", items.iter().join(" ! ")),
            Self::SetOp { op, left, right } => {
                let keyword = match op {
                    SetOp::Union => "union",
                    SetOp::Intersect => "intersect",
                    SetOp::Except => "except",
                };
                write!(f, "({left} {keyword} {right})")
            }
            Self::For { bindings, body } => {
                f.write_str("(for ")?;
                write_bindings(f, bindings, "in")?;
                write!(f, " return {body})")
            }
            Self::Let { bindings, body } => {
                f.write_str("(let ")?;
                write_bindings(f, bindings, ":=")?;
                write!(f, " return {body})")
            }
            Self::Quantified { quantifier, bindings, satisfies } => {
                let keyword = if *quantifier == Quantifier::Some { "some" } else { "every" };
                write!(f, "({keyword} ")?;
                write_bindings(f, bindings, "in")?;
                write!(f, " satisfies {satisfies})")
            }
        }
    }
}

impl fmt::Display for KeySpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Expr(expr) => write!(f, "({expr})"),
            Self::Wildcard => f.write_str("*"),
        }
    }
}

impl fmt::Display for AxisStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.axis, &self.node_test) {
            (Axis::Parent, NodeTest::Kind(KindTest::AnyKind)) if self.predicates.is_empty() => {
                return f.write_str("..");
            }
            (Axis::Child, test) => write!(f, "{test}")?,
            (Axis::Attribute, test) => write!(f, "@{test}")?,
            (axis, test) => write!(f, "{}::{test}", axis.name())?,
        }
        for predicate in &self.predicates {
            write!(f, "[{predicate}]")?;
        }
        Ok(())
    }
}

impl fmt::Display for NodeTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(NameTest::QName(name)) => write!(f, "{name}"),
            Self::Name(NameTest::Wildcard(WildcardName::Any)) => f.write_str("*"),
            Self::Name(NameTest::Wildcard(WildcardName::NsWildcard(prefix))) => {
                write!(f, "{prefix}:*")
            }
            Self::Name(NameTest::Wildcard(WildcardName::LocalWildcard(local))) => {
                write!(f, "*:{local}")
            }
            Self::Kind(kind) => write!(f, "{kind}"),
        }
    }
}

impl fmt::Display for KindTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AnyKind => f.write_str("node()"),
            Self::Text => f.write_str("text()"),
            Self::Comment => f.write_str("comment()"),
            Self::ProcessingInstruction(None) => f.write_str("processing-instruction()"),
            Self::ProcessingInstruction(Some(target)) => {
                write!(f, "processing-instruction({target})")
            }
            Self::Element(None) => f.write_str("element()"),
            Self::Element(Some(name)) => write!(f, "element({name})"),
            Self::Attribute(None) => f.write_str("attribute()"),
            Self::Attribute(Some(name)) => write!(f, "attribute({name})"),
            Self::Document(None) => f.write_str("document-node()"),
            Self::Document(Some(inner)) => write!(f, "document-node({inner})"),
            Self::SchemaElement(name) => write!(f, "schema-element({name})"),
            Self::SchemaAttribute(name) => write!(f, "schema-attribute({name})"),
        }
    }
}
