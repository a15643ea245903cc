use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

/// A bound parameter value, typed at runtime.
///
/// Each variant maps to the nearest native column type when the statement is
/// executed; the same enum is used for values read back out of a row so that
/// callers never touch driver types.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// JSON value, stored as its text serialization
    Json(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
    /// NULL value
    Null,
}

impl ParamValue {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let ParamValue::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let ParamValue::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let ParamValue::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(value) => Some(*value),
            // SQLite stores booleans as integers.
            ParamValue::Int(0) => Some(false),
            ParamValue::Int(1) => Some(true),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            ParamValue::Timestamp(value) => Some(*value),
            ParamValue::Text(s) => {
                if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                    return Some(dt);
                }
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok()
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let ParamValue::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

/// A single bound value plus its 1-based placeholder position.
///
/// Positions are resolved externally (named-parameter substitution is not this
/// crate's job); a `Parameter` is immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    position: usize,
    value: ParamValue,
}

impl Parameter {
    #[must_use]
    pub fn new(position: usize, value: ParamValue) -> Self {
        Self { position, value }
    }

    /// The 1-based placeholder position this value binds to.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn value(&self) -> &ParamValue {
        &self.value
    }

    #[must_use]
    pub fn into_value(self) -> ParamValue {
        self.value
    }
}

/// Whether a statement produces rows or an affected-row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// A read statement; execution yields one element per result row.
    Select,
    /// INSERT/UPDATE/DELETE; execution yields exactly one affected-row count.
    Dml,
}
