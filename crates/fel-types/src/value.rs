use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A value produced or consumed by an expression
///
/// Strings, lists and maps are reference counted so that cloning a value out of
/// a context, a constant slot or a `Var` never copies the payload. Two values
/// sharing the same allocation are *identical* (see [`Value::is_identical`]).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// Double precision float
    Float(f64),
    /// Arbitrary precision integer
    BigInt(BigInt),
    /// Arbitrary precision decimal
    Decimal(BigDecimal),
    /// Immutable string
    Str(Arc<str>),
    /// Ordered list of values
    List(Arc<Vec<Value>>),
    /// String-keyed map of values
    Map(Arc<HashMap<String, Value>>),
    /// Handle to a host type registered with the engine, e.g. `$('Math')`
    Host(Arc<str>),
}

impl Value {
    /// Create a string value
    pub fn str(s: impl AsRef<str>) -> Self {
        Self::Str(Arc::from(s.as_ref()))
    }

    /// Create a list value
    #[must_use]
    pub fn list(items: Vec<Self>) -> Self {
        Self::List(Arc::new(items))
    }

    /// Create a map value
    #[must_use]
    pub fn map(entries: HashMap<String, Self>) -> Self {
        Self::Map(Arc::new(entries))
    }

    /// Create a host type handle
    pub fn host(name: impl AsRef<str>) -> Self {
        Self::Host(Arc::from(name.as_ref()))
    }

    /// Get the type name as a string
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::BigInt(_) => "bigint",
            Self::Decimal(_) => "decimal",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Host(_) => "host",
        }
    }

    /// `true` for [`Value::Null`]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// `true` for every numeric variant
    #[must_use]
    pub const fn is_number(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_) | Self::BigInt(_) | Self::Decimal(_))
    }

    /// `true` for floating point numbers (double or decimal)
    #[must_use]
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float(_) | Self::Decimal(_))
    }

    /// `true` for integral numbers (64-bit or big)
    #[must_use]
    pub const fn is_integral(&self) -> bool {
        matches!(self, Self::Int(_) | Self::BigInt(_))
    }

    /// Boolean payload, if any
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// String payload, if any
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view of an integral value that fits in 64 bits
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::BigInt(b) => b.to_i64(),
            _ => None,
        }
    }

    /// Double view of any numeric value
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::BigInt(b) => b.to_f64(),
            Self::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    /// Arbitrary precision integer view of an integral value
    #[must_use]
    pub fn to_big_int(&self) -> Option<BigInt> {
        match self {
            Self::Int(i) => Some(BigInt::from(*i)),
            Self::BigInt(b) => Some(b.clone()),
            _ => None,
        }
    }

    /// Arbitrary precision decimal view of a numeric value.
    ///
    /// Doubles go through their shortest decimal rendering so that `0.1`
    /// becomes exactly `0.1`. Numeric strings are parsed. Non-finite doubles
    /// and other variants yield `None`.
    #[must_use]
    pub fn to_big_decimal(&self) -> Option<BigDecimal> {
        match self {
            Self::Int(i) => Some(BigDecimal::from(*i)),
            Self::BigInt(b) => Some(BigDecimal::new(b.clone(), 0)),
            Self::Decimal(d) => Some(d.clone()),
            Self::Float(f) if f.is_finite() => BigDecimal::from_str(&f.to_string()).ok(),
            Self::Str(s) => BigDecimal::from_str(s.trim()).ok(),
            _ => None,
        }
    }

    /// Reference identity.
    ///
    /// Two nulls are identical, scalars are identical when they hold the same
    /// bits, and reference counted payloads are identical only when they share
    /// an allocation. Big numbers are never identical; they compare by value.
    #[must_use]
    pub fn is_identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => Arc::ptr_eq(a, b),
            (Self::List(a), Self::List(b)) => Arc::ptr_eq(a, b),
            (Self::Map(a), Self::Map(b)) => Arc::ptr_eq(a, b),
            (Self::Host(a), Self::Host(b)) => a == b,
            _ => false,
        }
    }

    /// Render the value the way it would be written in expression text.
    ///
    /// Used by the compiler when it emits the source of a literal.
    #[must_use]
    pub fn to_literal(&self) -> String {
        match self {
            Self::Str(s) => {
                let mut out = String::with_capacity(s.len() + 2);
                out.push('"');
                for ch in s.chars() {
                    match ch {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        '\t' => out.push_str("\\t"),
                        '\r' => out.push_str("\\r"),
                        other => out.push(other),
                    }
                }
                out.push('"');
                out
            }
            Self::Host(name) => format!("$({})", Self::str(name.as_ref()).to_literal()),
            // Keep a decimal point so the literal reads back as a float
            Self::Float(f) if f.is_finite() && f.fract() == 0.0 => format!("{f:.1}"),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(fl) => write!(f, "{fl}"),
            Self::BigInt(b) => write!(f, "{b}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Map(entries) => {
                // Sorted so that output is stable across runs
                let mut sorted: Vec<_> = entries.iter().collect();
                sorted.sort_by_key(|(k, _)| *k);
                write!(f, "{{")?;
                for (i, (key, value)) in sorted.into_iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
            Self::Host(name) => write!(f, "<host {name}>"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<BigInt> for Value {
    fn from(value: BigInt) -> Self {
        Self::BigInt(value)
    }
}

impl From<BigDecimal> for Value {
    fn from(value: BigDecimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::str(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(Arc::from(value))
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::list(value)
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(value: HashMap<String, Value>) -> Self {
        Self::map(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

// -------------------------------------------------------------------------------------------------
// Conversions between `Value` and `serde_json::Value`, used by the CLI to accept
// variables on the command line and to print results as JSON.
// -------------------------------------------------------------------------------------------------

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Int(i) => Self::Number(serde_json::Number::from(*i)),
            Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Self::Null, Self::Number),
            // Big numbers keep their exact digits as strings
            Value::BigInt(b) => Self::String(b.to_string()),
            Value::Decimal(d) => Self::String(d.to_string()),
            Value::Str(s) => Self::String(s.to_string()),
            Value::List(items) => Self::Array(items.iter().map(Into::into).collect()),
            Value::Map(entries) => Self::Object(
                entries.iter().map(|(k, v)| (k.clone(), v.into())).collect(),
            ),
            Value::Host(name) => Self::String(format!("<host {name}>")),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::BigInt(BigInt::from(u))
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Self::from(s),
            serde_json::Value::Array(items) => {
                Self::list(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(entries) => {
                Self::map(entries.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}
