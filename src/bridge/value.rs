//! Values exchanged with the foreign runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PathMirrorError;

/// An opaque handle on an object living in the foreign runtime.
///
/// Two handles are equal exactly when they refer to the same foreign
/// object, which is what gives native proxies their identity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForeignRef(pub u64);

impl ForeignRef {
    /// Creates a new ForeignRef.
    #[inline]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying u64 value.
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ForeignRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ForeignRef({})", self.0)
    }
}

impl fmt::Display for ForeignRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// A dynamically typed argument or return value of a foreign call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Ref(ForeignRef),
    List(Vec<Value>),
}

impl Value {
    /// Short name of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Ref(_) => "object",
            Value::List(_) => "list",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn unexpected(&self, context: &str, expected: &'static str) -> PathMirrorError {
        PathMirrorError::UnexpectedValue {
            context: context.to_string(),
            expected,
            found: self.kind_name().to_string(),
        }
    }

    /// Reads a number; integers are widened to f64.
    pub fn as_f64(&self, context: &str) -> Result<f64, PathMirrorError> {
        match self {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            other => Err(other.unexpected(context, "number")),
        }
    }

    pub fn as_i64(&self, context: &str) -> Result<i64, PathMirrorError> {
        match self {
            Value::Int(v) => Ok(*v),
            other => Err(other.unexpected(context, "int")),
        }
    }

    /// Reads a boolean; null reads as false, matching unset Java flags.
    pub fn as_bool(&self, context: &str) -> Result<bool, PathMirrorError> {
        match self {
            Value::Bool(v) => Ok(*v),
            Value::Null => Ok(false),
            other => Err(other.unexpected(context, "bool")),
        }
    }

    pub fn as_str(&self, context: &str) -> Result<&str, PathMirrorError> {
        match self {
            Value::Str(v) => Ok(v),
            other => Err(other.unexpected(context, "string")),
        }
    }

    /// Reads an optional string; null maps to `None`.
    pub fn as_opt_str(&self, context: &str) -> Result<Option<&str>, PathMirrorError> {
        match self {
            Value::Null => Ok(None),
            Value::Str(v) => Ok(Some(v)),
            other => Err(other.unexpected(context, "string or null")),
        }
    }

    pub fn as_ref(&self, context: &str) -> Result<ForeignRef, PathMirrorError> {
        match self {
            Value::Ref(r) => Ok(*r),
            other => Err(other.unexpected(context, "object")),
        }
    }

    /// Reads an optional object reference; null maps to `None`.
    pub fn as_opt_ref(&self, context: &str) -> Result<Option<ForeignRef>, PathMirrorError> {
        match self {
            Value::Null => Ok(None),
            Value::Ref(r) => Ok(Some(*r)),
            other => Err(other.unexpected(context, "object or null")),
        }
    }

    pub fn as_list(&self, context: &str) -> Result<&[Value], PathMirrorError> {
        match self {
            Value::List(items) => Ok(items),
            other => Err(other.unexpected(context, "list")),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<ForeignRef> for Value {
    fn from(v: ForeignRef) -> Self {
        Value::Ref(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_widening() {
        assert_eq!(Value::Int(3).as_f64("x").unwrap(), 3.0);
        assert_eq!(Value::Float(2.5).as_f64("x").unwrap(), 2.5);
        assert!(Value::Str("3".into()).as_f64("x").is_err());
    }

    #[test]
    fn test_optional_accessors() {
        assert_eq!(Value::Null.as_opt_ref("x").unwrap(), None);
        assert_eq!(
            Value::Ref(ForeignRef(4)).as_opt_ref("x").unwrap(),
            Some(ForeignRef(4))
        );
        assert_eq!(Value::Null.as_opt_str("x").unwrap(), None);
        assert!(!Value::Null.as_bool("x").unwrap());
    }

    #[test]
    fn test_unexpected_value_names_context() {
        let err = Value::Bool(true).as_str("getImageName").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("getImageName"));
        assert!(msg.contains("bool"));
    }

    #[test]
    fn test_option_conversion() {
        let none: Option<ForeignRef> = None;
        assert_eq!(Value::from(none), Value::Null);
        assert_eq!(Value::from(Some("a")), Value::Str("a".into()));
    }
}
