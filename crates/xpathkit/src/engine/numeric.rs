use crate::engine::runtime::{Error, Result};
use crate::parser::ast::{ArithOp, Sign};
use crate::temporal;
use crate::xdm::Value;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Numeric {
    Integer(i64),
    Double(f64),
}

impl Numeric {
    pub(crate) fn as_f64(self) -> f64 {
        match self {
            Self::Integer(i) => i as f64,
            Self::Double(d) => d,
        }
    }

    pub(crate) fn into_value(self) -> Value {
        match self {
            Self::Integer(i) => Value::Integer(i),
            Self::Double(d) => Value::Double(d),
        }
    }
}

pub(crate) fn to_numeric(value: &Value) -> Option<Numeric> {
    match value {
        Value::Integer(i) => Some(Numeric::Integer(*i)),
        Value::Double(d) => Some(Numeric::Double(*d)),
        Value::Node(node) => to_numeric(&node.typed_value()),
        _ => None,
    }
}

/// XML Schema lexical form of a double: decimal or exponent notation, `INF`, `-INF`, `NaN`.
pub(crate) fn parse_double(text: &str) -> Option<f64> {
    match text.trim() {
        "INF" | "+INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        s if s.bytes().any(|b| b.is_ascii_alphabetic() && !matches!(b, b'e' | b'E')) => None,
        s => s.parse().ok(),
    }
}

/// The single item of `value`, `None` for the empty sequence.
pub(crate) fn single_atomic(value: Value, role: &str) -> Result<Option<Value>> {
    match value {
        Value::Empty => Ok(None),
        Value::Range(_) | Value::Sequence(_) => Err(Error::type_mismatch(format!(
            "{role} must be a single item, got a sequence of {}",
            value.item_count()
        ))),
        item => Ok(Some(item)),
    }
}

fn operand_mismatch(op: ArithOp, left: &Value, right: &Value) -> Error {
    Error::type_mismatch(format!(
        "cannot apply {} to {} and {}",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

/// Binary arithmetic. An empty operand yields `Empty`.
pub(crate) fn arithmetic(op: ArithOp, left: Value, right: Value) -> Result<Value> {
    let (Some(left), Some(right)) =
        (single_atomic(left, "left operand")?, single_atomic(right, "right operand")?)
    else {
        return Ok(Value::Empty);
    };
    if let Some(result) = temporal::arithmetic(op, &left, &right) {
        return result;
    }
    let (Some(a), Some(b)) = (to_numeric(&left), to_numeric(&right)) else {
        return Err(operand_mismatch(op, &left, &right));
    };
    match (a, b) {
        (Numeric::Integer(x), Numeric::Integer(y)) => integer_arithmetic(op, x, y),
        _ => double_arithmetic(op, a.as_f64(), b.as_f64()),
    }
}

fn integer_arithmetic(op: ArithOp, x: i64, y: i64) -> Result<Value> {
    let checked = match op {
        ArithOp::Add => x.checked_add(y).ok_or(Error::Overflow("addition")),
        ArithOp::Sub => x.checked_sub(y).ok_or(Error::Overflow("subtraction")),
        ArithOp::Mul => x.checked_mul(y).ok_or(Error::Overflow("multiplication")),
        ArithOp::Div if y == 0 => Err(Error::DivisionByZero),
        ArithOp::Div => return Ok(Value::Double(x as f64 / y as f64)),
        ArithOp::IDiv | ArithOp::Mod if y == 0 => Err(Error::DivisionByZero),
        ArithOp::IDiv => x.checked_div(y).ok_or(Error::Overflow("integer division")),
        ArithOp::Mod => x.checked_rem(y).ok_or(Error::Overflow("modulus")),
    };
    checked.map(Value::Integer)
}

fn double_arithmetic(op: ArithOp, x: f64, y: f64) -> Result<Value> {
    let result = match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div => x / y,
        ArithOp::Mod => x % y,
        ArithOp::IDiv => {
            if y == 0.0 {
                return Err(Error::DivisionByZero);
            }
            let quotient = (x / y).trunc();
            if !quotient.is_finite() || quotient.abs() >= i64::MAX as f64 {
                return Err(Error::Overflow("integer division"));
            }
            return Ok(Value::Integer(quotient as i64));
        }
    };
    Ok(Value::Double(result))
}

pub(crate) fn unary(op: Sign, value: Value) -> Result<Value> {
    let Some(item) = single_atomic(value, "operand")? else {
        return Ok(Value::Empty);
    };
    match (op, item) {
        (Sign::Plus, item @ (Value::Integer(_) | Value::Double(_) | Value::Duration(_))) => Ok(item),
        (Sign::Minus, Value::Integer(i)) => {
            i.checked_neg().map(Value::Integer).ok_or(Error::Overflow("negation"))
        }
        (Sign::Minus, Value::Double(d)) => Ok(Value::Double(-d)),
        (Sign::Minus, Value::Duration(d)) => Ok(Value::Duration(d.negate())),
        (_, Value::Node(node)) => unary(op, node.typed_value()),
        (_, other) => Err(Error::type_mismatch(format!(
            "unary operator applied to {}",
            other.type_name()
        ))),
    }
}
