use std::borrow::Cow;

use serde_json::{Map, Value as Json};

/// A value flowing through template evaluation.
///
/// Data values borrow from the decoded JSON document; literals and
/// function results own what they need.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'d> {
    /// No value at all: a missing map entry or an absent pipeline result.
    Missing,
    /// A JSON `null` or the `nil` literal.
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Cow<'d, str>),
    Seq(&'d [Json]),
    Map(&'d Map<String, Json>),
}

impl<'d> Value<'d> {
    pub fn from_json(json: &'d Json) -> Self {
        match json {
            Json::Null => Value::Nil,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::Str(Cow::Borrowed(s)),
            Json::Array(items) => Value::Seq(items),
            Json::Object(map) => Value::Map(map),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn is_nil_like(&self) -> bool {
        matches!(self, Value::Missing | Value::Nil)
    }

    /// The type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Missing => "<invalid Value>",
            Value::Nil => "interface {}",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float64",
            Value::Str(_) => "string",
            Value::Seq(_) => "[]interface {}",
            Value::Map(_) => "map[string]interface {}",
        }
    }

    /// Template truthiness: zero values and empty containers are false.
    pub fn is_true(&self) -> bool {
        match self {
            Value::Missing | Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Seq(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::Str(_))
    }
}

impl From<bool> for Value<'_> {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<String> for Value<'_> {
    fn from(s: String) -> Self {
        Value::Str(Cow::Owned(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_numbers_become_floats() {
        let doc = json!({"n": 3});
        let Value::Map(map) = Value::from_json(&doc) else {
            panic!("expected map");
        };
        assert_eq!(Value::from_json(&map["n"]), Value::Float(3.0));
    }

    #[test]
    fn truthiness_follows_zero_values() {
        let empty = json!([]);
        assert!(!Value::from_json(&empty).is_true());
        assert!(!Value::Float(0.0).is_true());
        assert!(Value::Str(Cow::Borrowed("x")).is_true());
        assert!(!Value::Missing.is_true());
    }
}
