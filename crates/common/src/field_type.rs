use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};
use thiserror::Error;

/// Field types accepted in schema descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldTypeTag {
    Str,
    Int,
    Float,
    Bool,
    StrArray,
    IntArray,
    FloatArray,
    BoolArray,
}

impl FieldTypeTag {
    pub const ALL: [FieldTypeTag; 8] = [
        FieldTypeTag::Str,
        FieldTypeTag::Int,
        FieldTypeTag::Float,
        FieldTypeTag::Bool,
        FieldTypeTag::StrArray,
        FieldTypeTag::IntArray,
        FieldTypeTag::FloatArray,
        FieldTypeTag::BoolArray,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldTypeTag::Str => "str",
            FieldTypeTag::Int => "int",
            FieldTypeTag::Float => "float",
            FieldTypeTag::Bool => "bool",
            FieldTypeTag::StrArray => "str[]",
            FieldTypeTag::IntArray => "int[]",
            FieldTypeTag::FloatArray => "float[]",
            FieldTypeTag::BoolArray => "bool[]",
        }
    }
}

impl fmt::Display for FieldTypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown type '{0}', expected one of: {expected}", expected = expected_tags())]
pub struct UnknownFieldType(pub String);

fn expected_tags() -> String {
    FieldTypeTag::ALL
        .iter()
        .map(|tag| tag.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl FromStr for FieldTypeTag {
    type Err = UnknownFieldType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldTypeTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| UnknownFieldType(s.to_string()))
    }
}

impl Serialize for FieldTypeTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldTypeTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    String,
    Integer,
    Float,
    Boolean,
}

impl ScalarType {
    /// JSON Schema `type` keyword for this scalar.
    pub fn json_type(&self) -> &'static str {
        match self {
            ScalarType::String => "string",
            ScalarType::Integer => "integer",
            ScalarType::Float => "number",
            ScalarType::Boolean => "boolean",
        }
    }
}

/// Container type a field resolves to: a scalar, or an ordered homogeneous
/// sequence of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConcreteType {
    Scalar(ScalarType),
    Array(ScalarType),
}

impl ConcreteType {
    pub fn json_schema(&self) -> Value {
        match self {
            ConcreteType::Scalar(scalar) => json!({ "type": scalar.json_type() }),
            ConcreteType::Array(scalar) => json!({
                "type": "array",
                "items": { "type": scalar.json_type() },
            }),
        }
    }
}

impl fmt::Display for ConcreteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcreteType::Scalar(scalar) => f.write_str(scalar.json_type()),
            ConcreteType::Array(scalar) => write!(f, "array<{}>", scalar.json_type()),
        }
    }
}

pub fn resolve(tag: FieldTypeTag) -> ConcreteType {
    match tag {
        FieldTypeTag::Str => ConcreteType::Scalar(ScalarType::String),
        FieldTypeTag::Int => ConcreteType::Scalar(ScalarType::Integer),
        FieldTypeTag::Float => ConcreteType::Scalar(ScalarType::Float),
        FieldTypeTag::Bool => ConcreteType::Scalar(ScalarType::Boolean),
        FieldTypeTag::StrArray => ConcreteType::Array(ScalarType::String),
        FieldTypeTag::IntArray => ConcreteType::Array(ScalarType::Integer),
        FieldTypeTag::FloatArray => ConcreteType::Array(ScalarType::Float),
        FieldTypeTag::BoolArray => ConcreteType::Array(ScalarType::Boolean),
    }
}
