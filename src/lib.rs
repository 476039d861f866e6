//! # protoedit: editable field trees for protobuf wire-format payloads
//!
//! Decode an arbitrary protobuf payload without a schema, inspect and edit it as a tree of
//! named, typed fields, project a textual schema onto it, emit a schema that describes it,
//! and encode it back to bytes.
//!
//! ## Pipeline
//!
//! - **Decode** ([`decode`]): tag/value records become a [`Node`] tree. Varints 0/1 are
//!   inferred as `bool`, other numbers as `number`; length-delimited payloads become
//!   sub-messages when they parse cleanly, otherwise `string` or `bytes`.
//! - **Apply** ([`apply_schema`]): a proto2/proto3 schema renames and retypes matched
//!   fields, reinterpreting raw wire values (an `int32` of `-1` decoded as `18446744073709551615`
//!   comes back as `-1`).
//! - **Edit** ([`Editor`]): validated value, type and name edits; lossy type changes and
//!   changes that reach other instances of a message type ask for confirmation first.
//! - **Emit** ([`emit_schema`]): a `syntax = "proto2";` schema describing the tree.
//! - **Encode** ([`encode`]): non-packed records in tree order.
//! - **JSON** ([`to_json`]): a name-keyed view for display and export.
//!
//! ## Example
//!
//! ```
//! use protoedit::{apply_schema, decode, encode};
//!
//! // field 1: varint 150, field 2: "hi"
//! let bytes = [0x08, 0x96, 0x01, 0x12, 0x02, b'h', b'i'];
//! let mut root = decode(&bytes).unwrap();
//! apply_schema(&mut root, "message M { optional int32 id = 1; optional string tag = 2; }").unwrap();
//! assert_eq!(root.children[0].name, "id");
//! assert_eq!(encode(&root).unwrap(), bytes);
//! ```

pub mod apply;
pub mod ast;
pub mod codec;
pub mod dump;
pub mod edit;
pub mod emit;
pub mod error;
pub mod json;
pub mod parser;
pub mod rules;
pub mod tree;
pub mod types;
pub mod value;
pub mod wire;

pub use apply::{apply_resolved, apply_schema, apply_schema_as};
pub use ast::{ResolvedSchema, Schema};
pub use codec::{decode, decode_with, encode, wire_equivalent, DecodeOptions};
pub use edit::{Answer, ConfirmHost, EditOutcome, Editor, EditorSettings, Prompt};
pub use emit::{emit_schema, normalize_message_types};
pub use error::{
    DecodeError, EncodeError, Error, ProjectionError, SchemaApplyError, SchemaParseError, TreeInvariantError,
};
pub use json::{to_json, to_json_string};
pub use parser::{parse, parse_resolved};
pub use tree::{Node, NodePath};
pub use types::{FieldType, ScalarType};
pub use value::Value;
