// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed flag values and their dynamic wire form.
//!
//! A feature's value type is fixed at declaration. [`FlagValue`] is the
//! bridge between that static type and [`TaggedValue`], the dynamic form
//! that crosses the JSON boundary and backs type-erased storage.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ValueKind
// ---------------------------------------------------------------------------

/// The wire-level tag of a flag value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueKind {
    /// `true` / `false`.
    Boolean,
    /// UTF-8 string.
    String,
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Double,
    /// Named constant of a host-declared enum.
    Enum,
    /// Structured payload validated against a host-declared type.
    Struct,
}

impl ValueKind {
    /// Stable wire tag, e.g. `"BOOLEAN"`.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::String => "STRING",
            Self::Int => "INT",
            Self::Double => "DOUBLE",
            Self::Enum => "ENUM",
            Self::Struct => "STRUCT",
        }
    }

    /// Parse a wire tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "BOOLEAN" => Some(Self::Boolean),
            "STRING" => Some(Self::String),
            "INT" => Some(Self::Int),
            "DOUBLE" => Some(Self::Double),
            "ENUM" => Some(Self::Enum),
            "STRUCT" => Some(Self::Struct),
            _ => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// ---------------------------------------------------------------------------
// TaggedValue
// ---------------------------------------------------------------------------

/// Dynamic, self-describing flag value — the shape that crosses the codec
/// boundary and backs type-erased configuration storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TaggedValue {
    /// `{"type": "BOOLEAN", "value": …}`
    #[serde(rename = "BOOLEAN")]
    Boolean {
        /// Payload.
        value: bool,
    },
    /// `{"type": "STRING", "value": …}`
    #[serde(rename = "STRING")]
    String {
        /// Payload.
        value: String,
    },
    /// `{"type": "INT", "value": …}`
    #[serde(rename = "INT")]
    Int {
        /// Payload.
        value: i64,
    },
    /// `{"type": "DOUBLE", "value": …}`
    #[serde(rename = "DOUBLE")]
    Double {
        /// Payload.
        value: f64,
    },
    /// `{"type": "ENUM", "enumClassName": …, "constantName": …}`
    #[serde(rename = "ENUM")]
    Enum {
        /// Declared enum type name.
        #[serde(rename = "enumClassName")]
        enum_name: String,
        /// Selected constant.
        #[serde(rename = "constantName")]
        constant: String,
    },
    /// `{"type": "STRUCT", "className": …, "fields": …}`
    #[serde(rename = "STRUCT")]
    Struct {
        /// Declared struct type name.
        #[serde(rename = "className")]
        struct_name: String,
        /// Raw field payload, validated by the declared type.
        fields: serde_json::Value,
    },
}

impl TaggedValue {
    /// The tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Boolean { .. } => ValueKind::Boolean,
            Self::String { .. } => ValueKind::String,
            Self::Int { .. } => ValueKind::Int,
            Self::Double { .. } => ValueKind::Double,
            Self::Enum { .. } => ValueKind::Enum,
            Self::Struct { .. } => ValueKind::Struct,
        }
    }
}

// ---------------------------------------------------------------------------
// FlagValue
// ---------------------------------------------------------------------------

/// Failure converting a [`TaggedValue`] into a declared flag type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    /// The tag does not match the declared kind.
    #[error("expected a {expected} value, found {found}")]
    KindMismatch {
        /// Declared kind.
        expected: ValueKind,
        /// Kind found on the wire.
        found: ValueKind,
    },

    /// An enum payload names a constant the declared enum does not have.
    #[error("unknown constant '{constant}' for enum '{enum_name}'")]
    UnknownConstant {
        /// Declared enum type name.
        enum_name: String,
        /// Unknown constant.
        constant: String,
    },

    /// An enum/struct payload names a different type than declared.
    #[error("value class '{found}' does not match declared class '{expected}'")]
    ClassMismatch {
        /// Declared type name.
        expected: String,
        /// Type name found on the wire.
        found: String,
    },

    /// Struct fields failed to decode into the declared type.
    #[error("struct fields failed to decode: {reason}")]
    BadFields {
        /// Decoder message.
        reason: String,
    },
}

/// A type usable as a feature's value.
///
/// Implemented for `bool`, `String`, `i64`, and `f64`. Hosts implement it
/// for their own enums (kind [`ValueKind::Enum`], with a stable
/// [`class_name`](FlagValue::class_name) and constant names) and structs
/// (kind [`ValueKind::Struct`], with fields typically routed through
/// `serde_json`).
pub trait FlagValue: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// The wire kind every value of this type carries.
    fn kind() -> ValueKind;

    /// Declared type name for `ENUM`/`STRUCT` payloads; `None` for scalars.
    fn class_name() -> Option<&'static str> {
        None
    }

    /// Project into the dynamic form.
    fn to_tagged(&self) -> TaggedValue;

    /// Recover from the dynamic form. Total: every failure is a
    /// [`ValueError`].
    fn from_tagged(tagged: &TaggedValue) -> Result<Self, ValueError>;
}

fn kind_mismatch<T>(expected: ValueKind, found: &TaggedValue) -> Result<T, ValueError> {
    Err(ValueError::KindMismatch {
        expected,
        found: found.kind(),
    })
}

impl FlagValue for bool {
    fn kind() -> ValueKind {
        ValueKind::Boolean
    }

    fn to_tagged(&self) -> TaggedValue {
        TaggedValue::Boolean { value: *self }
    }

    fn from_tagged(tagged: &TaggedValue) -> Result<Self, ValueError> {
        match tagged {
            TaggedValue::Boolean { value } => Ok(*value),
            other => kind_mismatch(ValueKind::Boolean, other),
        }
    }
}

impl FlagValue for String {
    fn kind() -> ValueKind {
        ValueKind::String
    }

    fn to_tagged(&self) -> TaggedValue {
        TaggedValue::String { value: self.clone() }
    }

    fn from_tagged(tagged: &TaggedValue) -> Result<Self, ValueError> {
        match tagged {
            TaggedValue::String { value } => Ok(value.clone()),
            other => kind_mismatch(ValueKind::String, other),
        }
    }
}

impl FlagValue for i64 {
    fn kind() -> ValueKind {
        ValueKind::Int
    }

    fn to_tagged(&self) -> TaggedValue {
        TaggedValue::Int { value: *self }
    }

    fn from_tagged(tagged: &TaggedValue) -> Result<Self, ValueError> {
        match tagged {
            TaggedValue::Int { value } => Ok(*value),
            other => kind_mismatch(ValueKind::Int, other),
        }
    }
}

impl FlagValue for f64 {
    fn kind() -> ValueKind {
        ValueKind::Double
    }

    fn to_tagged(&self) -> TaggedValue {
        TaggedValue::Double { value: *self }
    }

    fn from_tagged(tagged: &TaggedValue) -> Result<Self, ValueError> {
        match tagged {
            TaggedValue::Double { value } => Ok(*value),
            other => kind_mismatch(ValueKind::Double, other),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- ValueKind ------------------------------------------------------

    #[test]
    fn tags_round_trip() {
        for kind in [
            ValueKind::Boolean,
            ValueKind::String,
            ValueKind::Int,
            ValueKind::Double,
            ValueKind::Enum,
            ValueKind::Struct,
        ] {
            assert_eq!(ValueKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(ValueKind::from_tag("FLOAT"), None);
    }

    #[test]
    fn kind_serde_uses_screaming_tags() {
        assert_eq!(serde_json::to_string(&ValueKind::Boolean).unwrap(), r#""BOOLEAN""#);
        let back: ValueKind = serde_json::from_str(r#""DOUBLE""#).unwrap();
        assert_eq!(back, ValueKind::Double);
    }

    // -- TaggedValue ----------------------------------------------------

    #[test]
    fn tagged_boolean_wire_shape() {
        let v = TaggedValue::Boolean { value: true };
        assert_eq!(
            serde_json::to_value(&v).unwrap(),
            serde_json::json!({"type": "BOOLEAN", "value": true})
        );
    }

    #[test]
    fn tagged_enum_wire_shape() {
        let v = TaggedValue::Enum {
            enum_name: "Theme".into(),
            constant: "DARK".into(),
        };
        assert_eq!(
            serde_json::to_value(&v).unwrap(),
            serde_json::json!({"type": "ENUM", "enumClassName": "Theme", "constantName": "DARK"})
        );
    }

    #[test]
    fn tagged_kind_agrees_with_variant() {
        assert_eq!(TaggedValue::Int { value: 3 }.kind(), ValueKind::Int);
        assert_eq!(
            TaggedValue::Struct {
                struct_name: "Limits".into(),
                fields: serde_json::json!({})
            }
            .kind(),
            ValueKind::Struct
        );
    }

    // -- FlagValue scalar impls -----------------------------------------

    #[test]
    fn scalars_round_trip() {
        assert_eq!(bool::from_tagged(&true.to_tagged()).unwrap(), true);
        assert_eq!(
            String::from_tagged(&"dark".to_string().to_tagged()).unwrap(),
            "dark"
        );
        assert_eq!(i64::from_tagged(&42i64.to_tagged()).unwrap(), 42);
        assert_eq!(f64::from_tagged(&1.5f64.to_tagged()).unwrap(), 1.5);
    }

    #[test]
    fn kind_mismatch_is_reported() {
        let err = bool::from_tagged(&TaggedValue::Int { value: 1 }).unwrap_err();
        assert_eq!(
            err,
            ValueError::KindMismatch {
                expected: ValueKind::Boolean,
                found: ValueKind::Int
            }
        );
    }

    #[test]
    fn int_does_not_accept_double() {
        assert!(i64::from_tagged(&TaggedValue::Double { value: 1.0 }).is_err());
    }
}
