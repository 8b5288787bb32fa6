use crate::document::NodeHandle;
use crate::engine::runtime::Error;
use crate::model::QName;
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use core::fmt;
use itertools::Itertools;

/// Calendar date with an optional timezone offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Date {
    pub date: NaiveDate,
    pub offset: Option<FixedOffset>,
}

impl Date {
    pub fn new(date: NaiveDate, offset: Option<FixedOffset>) -> Self {
        Self { date, offset }
    }

    /// Start of the day in UTC; dates without an offset are taken as UTC.
    pub fn instant(&self) -> NaiveDateTime {
        let midnight = self.date.and_time(NaiveTime::MIN);
        let shift = TimeDelta::seconds(i64::from(self.offset.map_or(0, |o| o.local_minus_utc())));
        midnight.checked_sub_signed(shift).unwrap_or(midnight)
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date.format("%Y-%m-%d"))?;
        match self.offset {
            Some(offset) if offset.local_minus_utc() == 0 => f.write_str("Z"),
            Some(offset) => {
                let secs = offset.local_minus_utc();
                let sign = if secs < 0 { '-' } else { '+' };
                let secs = secs.abs();
                write!(f, "{sign}{:02}:{:02}", secs / 3600, (secs % 3600) / 60)
            }
            None => Ok(()),
        }
    }
}

/// The two totally ordered duration families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Duration {
    YearMonth { months: i32 },
    DayTime(TimeDelta),
}

impl Duration {
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            Self::YearMonth { months } => Self::YearMonth { months: -months },
            Self::DayTime(delta) => Self::DayTime(-delta),
        }
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::YearMonth { months } => {
                let sign = if months < 0 { "-" } else { "" };
                let total = months.unsigned_abs();
                let (years, months) = (total / 12, total % 12);
                match (years, months) {
                    (0, m) => write!(f, "{sign}P{m}M"),
                    (y, 0) => write!(f, "{sign}P{y}Y"),
                    (y, m) => write!(f, "{sign}P{y}Y{m}M"),
                }
            }
            Self::DayTime(delta) => {
                let sign = if delta < TimeDelta::zero() { "-" } else { "" };
                let delta = delta.abs();
                let days = delta.num_days();
                let hours = delta.num_hours() % 24;
                let minutes = delta.num_minutes() % 60;
                let seconds = delta.num_seconds() % 60;
                let millis = delta.subsec_nanos() / 1_000_000;
                write!(f, "{sign}P")?;
                if days > 0 {
                    write!(f, "{days}D")?;
                }
                if hours == 0 && minutes == 0 && seconds == 0 && millis == 0 {
                    return if days == 0 { f.write_str("T0S") } else { Ok(()) };
                }
                f.write_str("T")?;
                if hours > 0 {
                    write!(f, "{hours}H")?;
                }
                if minutes > 0 {
                    write!(f, "{minutes}M")?;
                }
                if millis > 0 {
                    write!(f, "{seconds}.{millis:03}S")
                } else if seconds > 0 {
                    write!(f, "{seconds}S")
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Lazy integer range with an inclusive upper bound.
///
/// The range is `Copy` and only stores its bounds, so it can be iterated any
/// number of times without re-evaluating the expressions that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntRange {
    start: i64,
    end: i64,
}

impl IntRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn len(&self) -> usize {
        if self.start > self.end {
            return 0;
        }
        let span = i128::from(self.end) - i128::from(self.start) + 1;
        usize::try_from(span).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn iter(&self) -> core::ops::RangeInclusive<i64> {
        self.start..=self.end
    }

    pub fn get(&self, index: usize) -> Option<i64> {
        let offset = i64::try_from(index).ok()?;
        let value = self.start.checked_add(offset)?;
        (value <= self.end).then_some(value)
    }

    /// Empty and single-element ranges collapse to `Empty` and `Integer`.
    pub fn into_value(self) -> Value {
        match self.len() {
            0 => Value::Empty,
            1 => Value::Integer(self.start),
            _ => Value::Range(self),
        }
    }
}

impl IntoIterator for IntRange {
    type Item = i64;
    type IntoIter = core::ops::RangeInclusive<i64>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Runtime value produced by evaluation.
///
/// Sequences are always flat: a `Sequence` never contains another `Sequence`, a
/// `Range` or `Empty`, and it always holds at least two items (a single item is
/// represented by the item itself). Use [`Value::from_items`] to build one.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Empty,
    Integer(i64),
    Double(f64),
    String(String),
    Boolean(bool),
    QName(QName),
    Date(Date),
    Duration(Duration),
    Node(NodeHandle),
    Range(IntRange),
    Sequence(Vec<Value>),
}

impl Value {
    /// Concatenate values into one flat, normalized value.
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        let mut flat = Vec::new();
        for item in items {
            item.push_items(&mut flat);
        }
        match flat.len() {
            0 => Self::Empty,
            1 => flat.pop().unwrap_or(Self::Empty),
            _ => Self::Sequence(flat),
        }
    }

    /// Restore the flattening invariant on a value built by hand. Ranges stay
    /// lazy.
    pub fn normalized(self) -> Self {
        match self {
            Self::Sequence(items) => Self::from_items(items),
            Self::Range(range) => range.into_value(),
            item => item,
        }
    }

    fn push_items(self, out: &mut Vec<Value>) {
        match self {
            Self::Empty => {}
            Self::Sequence(items) => {
                for item in items {
                    item.push_items(out);
                }
            }
            Self::Range(range) => out.extend(range.iter().map(Self::Integer)),
            item => out.push(item),
        }
    }

    /// The items of this value, with ranges expanded.
    pub fn items(&self) -> Vec<Value> {
        self.clone().into_items()
    }

    pub fn into_items(self) -> Vec<Value> {
        let mut out = Vec::new();
        self.push_items(&mut out);
        out
    }

    pub fn item_count(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Range(range) => range.len(),
            Self::Sequence(items) => items.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.item_count() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Empty => "empty-sequence",
            Self::Integer(_) => "integer",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Boolean(_) => "boolean",
            Self::QName(_) => "QName",
            Self::Date(_) => "date",
            Self::Duration(Duration::YearMonth { .. }) => "yearMonthDuration",
            Self::Duration(Duration::DayTime(_)) => "dayTimeDuration",
            Self::Node(_) => "node",
            Self::Range(_) | Self::Sequence(_) => "sequence",
        }
    }

    /// Effective boolean value as used by `if`, `and`, `or` and predicates.
    pub fn effective_boolean(&self) -> Result<bool, Error> {
        match self {
            Self::Empty => Ok(false),
            Self::Boolean(b) => Ok(*b),
            Self::String(s) => Ok(!s.is_empty()),
            Self::Integer(i) => Ok(*i != 0),
            Self::Double(d) => Ok(*d != 0.0 && !d.is_nan()),
            Self::Node(_) => Ok(true),
            Self::Sequence(items) if matches!(items.first(), Some(Self::Node(_))) => Ok(true),
            Self::Range(_) | Self::Sequence(_) => Err(Error::TypeMismatch(format!(
                "effective boolean value is not defined for a sequence of {} atomic values",
                self.item_count()
            ))),
            Self::QName(_) | Self::Date(_) | Self::Duration(_) => Err(Error::TypeMismatch(
                format!("effective boolean value is not defined for {}", self.type_name()),
            )),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("()"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Double(d) if d.is_nan() => f.write_str("NaN"),
            Self::Double(d) if d.is_infinite() => {
                f.write_str(if d.is_sign_negative() { "-INF" } else { "INF" })
            }
            Self::Double(d) => write!(f, "{d}"),
            Self::String(s) => f.write_str(s),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::QName(q) => write!(f, "{q}"),
            Self::Date(d) => write!(f, "{d}"),
            Self::Duration(d) => write!(f, "{d}"),
            Self::Node(node) => f.write_str(node.text().unwrap_or_default()),
            Self::Range(range) => write!(f, "({} to {})", range.start(), range.end()),
            Self::Sequence(items) => write!(f, "({})", items.iter().join(", ")),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<QName> for Value {
    fn from(value: QName) -> Self {
        Self::QName(value)
    }
}

impl From<Date> for Value {
    fn from(value: Date) -> Self {
        Self::Date(value)
    }
}

impl From<Duration> for Value {
    fn from(value: Duration) -> Self {
        Self::Duration(value)
    }
}

impl From<IntRange> for Value {
    fn from(value: IntRange) -> Self {
        value.into_value()
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Self::from_items(values.into_iter().map(Into::into))
    }
}
