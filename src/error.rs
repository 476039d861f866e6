//! Error types for decoding, encoding, schema handling and tree checks.

use thiserror::Error;

/// Malformed wire payload at the top level of a decode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unexpected end of input at byte {offset} while reading {context}")]
    UnexpectedEof { offset: usize, context: &'static str },

    #[error("varint at byte {offset} is longer than 10 bytes")]
    VarintTooLong { offset: usize },

    #[error("varint at byte {offset} overflows 64 bits")]
    VarintOverflow { offset: usize },

    #[error("unsupported wire type {wire_type} at byte {offset}")]
    UnsupportedWireType { wire_type: u8, offset: usize },

    #[error("invalid field number {field_num} at byte {offset}")]
    InvalidFieldNumber { field_num: u64, offset: usize },

    #[error("length {len} at byte {offset} overruns the {remaining} remaining bytes")]
    LengthOverrun {
        offset: usize,
        len: u64,
        remaining: usize,
    },
}

/// A tree that cannot be serialized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("field {path}: value {value:?} is not a valid {field_type}")]
    InvalidValue {
        path: String,
        field_type: String,
        value: String,
    },

    #[error("invariant violated: {0}")]
    Invariant(#[from] TreeInvariantError),

    #[error("synthesized schema does not resolve: {0}")]
    Plan(#[from] SchemaParseError),
}

/// Textual schema that does not parse or does not resolve.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaParseError {
    #[error("schema syntax error at {line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("unsupported syntax {0:?} (expected \"proto2\" or \"proto3\")")]
    UnsupportedSyntax(String),

    #[error("duplicate message {0}")]
    DuplicateMessage(String),

    #[error("message {message}: field number {number} declared twice")]
    DuplicateFieldNumber { message: String, number: u32 },

    #[error("message {message}: field {field} has invalid number {number}")]
    InvalidFieldNumber {
        message: String,
        field: String,
        number: u64,
    },

    #[error("message {message}: unknown type {type_name}")]
    UnresolvedType { message: String, type_name: String },

    #[error("schema declares no message")]
    NoMessage,

    #[error("schema declares no message named {0}")]
    UnknownMessage(String),
}

/// A parsed schema that cannot be projected onto a tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaApplyError {
    #[error(transparent)]
    Parse(#[from] SchemaParseError),

    #[error("missing required field `{name}` in {message}")]
    MissingRequired { message: String, name: String },

    #[error("field {path} ({field}): declared {declared} is incompatible with decoded {found}")]
    IncompatibleType {
        path: String,
        field: String,
        declared: String,
        found: String,
    },

    #[error("cannot re-encode field: {0}")]
    Encode(#[from] EncodeError),
}

/// Broken tree structure; indicates a bug in whatever mutated the tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeInvariantError {
    #[error("root has field number {found}, expected 0")]
    RootFieldNumber { found: u32 },

    #[error("field {path} has field number 0")]
    ZeroFieldNumber { path: String },

    #[error("scalar field {path} has children")]
    ScalarWithChildren { path: String },

    #[error("message field {path} carries a scalar value")]
    MessageWithValue { path: String },

    #[error("message {path}: siblings with field number {field_num} mix types {first} and {second}")]
    MixedSiblingTypes {
        path: String,
        field_num: u32,
        first: String,
        second: String,
    },

    #[error("message type {type_name}: field number {field_num} is {first} in one instance and {second} in another")]
    ShapeConflict {
        type_name: String,
        field_num: u32,
        first: String,
        second: String,
    },
}

/// Projection requested without a tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    #[error("no tree to project")]
    NullInput,
}

/// Any error the crate can return.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("decode: {0}")]
    Decode(#[from] DecodeError),
    #[error("encode: {0}")]
    Encode(#[from] EncodeError),
    #[error("schema: {0}")]
    SchemaParse(#[from] SchemaParseError),
    #[error("apply schema: {0}")]
    SchemaApply(#[from] SchemaApplyError),
    #[error("tree: {0}")]
    TreeInvariant(#[from] TreeInvariantError),
    #[error("projection: {0}")]
    Projection(#[from] ProjectionError),
}
