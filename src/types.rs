//! Type lattice for field tree nodes.
//!
//! A node's type is either a scalar atom, one of the decoder stand-ins (`number`, `unknown`),
//! or a message type name. Any well-formed identifier that is not a scalar keyword or a
//! stand-in names a message type: the literal `message` placeholder, a synthesized
//! `message_<k>`, or a name bound by an applied schema.

use crate::wire::WireType;
use std::fmt;

/// Placeholder type the decoder gives to every sub-message.
pub const PLACEHOLDER_MESSAGE: &str = "message";

/// Prefix of synthesized message type names (`message_1`, `message_2`, ...).
pub const SYNTHETIC_PREFIX: &str = "message_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    String,
    Bytes,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Bool,
    Float,
    Double,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
}

impl ScalarType {
    pub const ALL: [ScalarType; 15] = [
        ScalarType::String,
        ScalarType::Bytes,
        ScalarType::Int32,
        ScalarType::Int64,
        ScalarType::Uint32,
        ScalarType::Uint64,
        ScalarType::Sint32,
        ScalarType::Sint64,
        ScalarType::Bool,
        ScalarType::Float,
        ScalarType::Double,
        ScalarType::Fixed32,
        ScalarType::Fixed64,
        ScalarType::Sfixed32,
        ScalarType::Sfixed64,
    ];

    pub fn from_keyword(s: &str) -> Option<ScalarType> {
        ScalarType::ALL.iter().copied().find(|t| t.keyword() == s)
    }

    pub fn keyword(self) -> &'static str {
        match self {
            ScalarType::String => "string",
            ScalarType::Bytes => "bytes",
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::Uint32 => "uint32",
            ScalarType::Uint64 => "uint64",
            ScalarType::Sint32 => "sint32",
            ScalarType::Sint64 => "sint64",
            ScalarType::Bool => "bool",
            ScalarType::Float => "float",
            ScalarType::Double => "double",
            ScalarType::Fixed32 => "fixed32",
            ScalarType::Fixed64 => "fixed64",
            ScalarType::Sfixed32 => "sfixed32",
            ScalarType::Sfixed64 => "sfixed64",
        }
    }

    /// Wire type a value of this type is written with.
    pub fn wire_type(self) -> WireType {
        match self {
            ScalarType::String | ScalarType::Bytes => WireType::LengthDelimited,
            ScalarType::Int32
            | ScalarType::Int64
            | ScalarType::Uint32
            | ScalarType::Uint64
            | ScalarType::Sint32
            | ScalarType::Sint64
            | ScalarType::Bool => WireType::Varint,
            ScalarType::Float | ScalarType::Fixed32 | ScalarType::Sfixed32 => WireType::Fixed32,
            ScalarType::Double | ScalarType::Fixed64 | ScalarType::Sfixed64 => WireType::Fixed64,
        }
    }

    pub fn is_signed_integer(self) -> bool {
        matches!(
            self,
            ScalarType::Int32
                | ScalarType::Int64
                | ScalarType::Sint32
                | ScalarType::Sint64
                | ScalarType::Sfixed32
                | ScalarType::Sfixed64
        )
    }

    pub fn is_unsigned_integer(self) -> bool {
        matches!(
            self,
            ScalarType::Uint32 | ScalarType::Uint64 | ScalarType::Fixed32 | ScalarType::Fixed64
        )
    }

    pub fn is_integer(self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }

    pub fn is_float(self) -> bool {
        matches!(self, ScalarType::Float | ScalarType::Double)
    }

    /// Integer or floating point; `bool` and the length-delimited types are not numeric.
    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Type tag of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Scalar(ScalarType),
    /// Decoder stand-in for a varint or fixed-width number of unknown signedness.
    Number,
    /// Decoder stand-in for a field whose occurrences disagree on wire type.
    Unknown,
    /// Any message type, named by the contained identifier.
    Message(String),
}

impl FieldType {
    /// Parse a textual type tag. Returns `None` for text that is not an identifier.
    pub fn parse(s: &str) -> Option<FieldType> {
        if let Some(st) = ScalarType::from_keyword(s) {
            return Some(FieldType::Scalar(st));
        }
        match s {
            "number" => Some(FieldType::Number),
            "unknown" => Some(FieldType::Unknown),
            _ if is_identifier(s) => Some(FieldType::Message(s.to_string())),
            _ => None,
        }
    }

    pub fn placeholder_message() -> FieldType {
        FieldType::Message(PLACEHOLDER_MESSAGE.to_string())
    }

    pub fn synthetic(k: u32) -> FieldType {
        FieldType::Message(format!("{}{}", SYNTHETIC_PREFIX, k))
    }

    pub fn is_message(&self) -> bool {
        matches!(self, FieldType::Message(_))
    }

    pub fn is_scalar(&self) -> bool {
        !self.is_message()
    }

    /// The decoder's `message` placeholder.
    pub fn is_placeholder(&self) -> bool {
        matches!(self, FieldType::Message(name) if name == PLACEHOLDER_MESSAGE)
    }

    /// `k` for a synthesized `message_<k>` type.
    pub fn synthetic_index(&self) -> Option<u32> {
        match self {
            FieldType::Message(name) => name
                .strip_prefix(SYNTHETIC_PREFIX)
                .filter(|k| !k.is_empty() && k.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|k| k.parse().ok()),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<ScalarType> {
        match self {
            FieldType::Scalar(st) => Some(*st),
            _ => None,
        }
    }

    pub fn message_name(&self) -> Option<&str> {
        match self {
            FieldType::Message(name) => Some(name),
            _ => None,
        }
    }

    /// Concrete scalar type used when this type must be written or declared.
    /// Stand-ins narrow using the wire type they were decoded from.
    pub fn canonical_scalar(&self, wire: Option<WireType>) -> Option<ScalarType> {
        match self {
            FieldType::Scalar(st) => Some(*st),
            FieldType::Number => Some(match wire {
                Some(WireType::Fixed64) => ScalarType::Fixed64,
                Some(WireType::Fixed32) => ScalarType::Fixed32,
                _ => ScalarType::Int64,
            }),
            FieldType::Unknown => Some(match wire {
                Some(WireType::Varint) => ScalarType::Uint64,
                Some(WireType::Fixed64) => ScalarType::Fixed64,
                Some(WireType::Fixed32) => ScalarType::Fixed32,
                _ => ScalarType::Bytes,
            }),
            FieldType::Message(_) => None,
        }
    }

    /// Wire type of a node of this type; messages are length-delimited.
    pub fn wire_type(&self, wire: Option<WireType>) -> WireType {
        match self.canonical_scalar(wire) {
            Some(st) => st.wire_type(),
            None => WireType::LengthDelimited,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Scalar(st) => st.keyword(),
            FieldType::Number => "number",
            FieldType::Unknown => "unknown",
            FieldType::Message(name) => name,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
