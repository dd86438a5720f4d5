// Copyright 2024 Contributors to the pitoken project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// JSON type names, as reported back when a claim has the wrong shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
}

impl JsonType {
    pub fn of(v: &Value) -> Self {
        match v {
            Value::Null => JsonType::Null,
            Value::Bool(_) => JsonType::Boolean,
            Value::Number(_) => JsonType::Number,
            Value::String(_) => JsonType::String,
            Value::Array(_) => JsonType::Array,
            Value::Object(_) => JsonType::Object,
        }
    }
}

impl fmt::Display for JsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JsonType::Null => "null",
            JsonType::Boolean => "boolean",
            JsonType::Number => "number",
            JsonType::String => "string",
            JsonType::Array => "array",
            JsonType::Object => "object",
        };
        f.write_str(s)
    }
}

/// Why a claim could not be read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    /// absent, `null`, or an empty string
    Missing,
    TypeMismatch { expected: JsonType, found: JsonType },
}

/// A read-only view over one JSON object inside the claims
#[derive(Debug, Clone, Copy)]
pub struct Section<'a>(&'a Map<String, Value>);

impl<'a> Section<'a> {
    fn lookup(&self, key: &str) -> Result<&'a Value, FieldError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Err(FieldError::Missing),
            Some(v) => Ok(v),
        }
    }

    fn mismatch(expected: JsonType, v: &Value) -> FieldError {
        FieldError::TypeMismatch {
            expected,
            found: JsonType::of(v),
        }
    }

    pub fn object(&self, key: &str) -> Result<Section<'a>, FieldError> {
        match self.lookup(key)? {
            Value::Object(m) => Ok(Section(m)),
            v => Err(Self::mismatch(JsonType::Object, v)),
        }
    }

    pub fn str(&self, key: &str) -> Result<&'a str, FieldError> {
        match self.lookup(key)? {
            Value::String(s) if s.is_empty() => Err(FieldError::Missing),
            Value::String(s) => Ok(s.as_str()),
            v => Err(Self::mismatch(JsonType::String, v)),
        }
    }

    pub fn array(&self, key: &str) -> Result<&'a [Value], FieldError> {
        match self.lookup(key)? {
            Value::Array(a) => Ok(a.as_slice()),
            v => Err(Self::mismatch(JsonType::Array, v)),
        }
    }
}

/// The decoded token payload.  Nothing in it is trusted until a check has
/// looked at it: every access goes through [`Section`], which reports
/// absence and type mismatches separately.
#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    doc: Map<String, Value>,
}

impl Claims {
    /// Wrap an already parsed payload, which must be a JSON object
    pub fn from_value(v: Value) -> Result<Self, Error> {
        match v {
            Value::Object(doc) => Ok(Self { doc }),
            other => Err(Error::Payload(format!(
                "expecting a JSON object, got {}",
                JsonType::of(&other)
            ))),
        }
    }

    /// Parse a JSON-encoded payload
    pub fn from_json(j: &str) -> Result<Self, Error> {
        let v: Value = serde_json::from_str(j).map_err(|e| Error::Payload(e.to_string()))?;

        Self::from_value(v)
    }

    fn root(&self) -> Section<'_> {
        Section(&self.doc)
    }

    /// Look up one of the top-level sections (`requestDetails`,
    /// `deviceIntegrity`, ...)
    pub fn section(&self, name: &str) -> Result<Section<'_>, FieldError> {
        self.root().object(name)
    }

    pub fn to_json_pretty(&self) -> String {
        // a map of JSON values always serialises
        serde_json::to_string_pretty(&self.doc).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(v: Value) -> Claims {
        Claims::from_value(v).expect("claims object")
    }

    #[test]
    fn section_missing_vs_wrong_type() {
        let c = claims(json!({"requestDetails": "nope", "deviceIntegrity": null}));

        assert_eq!(
            c.section("requestDetails").unwrap_err(),
            FieldError::TypeMismatch {
                expected: JsonType::Object,
                found: JsonType::String
            }
        );
        assert_eq!(c.section("deviceIntegrity").unwrap_err(), FieldError::Missing);
        assert_eq!(c.section("appIntegrity").unwrap_err(), FieldError::Missing);
    }

    #[test]
    fn str_field() {
        let c = claims(json!({"s": {"a": "x", "b": "", "c": 3, "d": ["x"]}}));
        let s = c.section("s").unwrap();

        assert_eq!(s.str("a"), Ok("x"));
        assert_eq!(s.str("b"), Err(FieldError::Missing));
        assert_eq!(s.str("zz"), Err(FieldError::Missing));
        assert_eq!(
            s.str("c"),
            Err(FieldError::TypeMismatch {
                expected: JsonType::String,
                found: JsonType::Number
            })
        );
        assert_eq!(
            s.str("d"),
            Err(FieldError::TypeMismatch {
                expected: JsonType::String,
                found: JsonType::Array
            })
        );
    }

    #[test]
    fn empty_array_is_present() {
        let c = claims(json!({"s": {"a": []}}));

        assert_eq!(c.section("s").unwrap().array("a").unwrap().len(), 0);
    }

    #[test]
    fn non_object_payload() {
        assert!(matches!(
            Claims::from_value(json!(["a"])),
            Err(Error::Payload(_))
        ));
        assert!(matches!(Claims::from_json("{"), Err(Error::Payload(_))));
    }
}
