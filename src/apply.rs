//! Project a textual schema onto a decoded tree.
//!
//! Declared fields rename and retype the nodes they match by field number; undeclared nodes
//! keep their inferred names and types. Values are reinterpreted from their raw wire form, so
//! a varint decoded as `number` can become `sint64` or `bool` without losing information.

use crate::ast::{FieldKind, Label, ResolvedField, ResolvedSchema};
use crate::codec::{self, leaf_to_wire, value_from_wire};
use crate::error::{SchemaApplyError, SchemaParseError};
use crate::parser;
use crate::tree::{Node, NodePath};
use crate::types::{FieldType, ScalarType};
use crate::value::Value;
use crate::wire::{WireType, WireValue};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// Apply `source` to `root`, projecting its root message (the first top-level message that
/// no field refers to). On error `root` is left untouched.
pub fn apply_schema(root: &mut Node, source: &str) -> Result<(), SchemaApplyError> {
    let schema = parser::parse_resolved(source)?;
    let message = schema.root_message().ok_or(SchemaParseError::NoMessage)?;
    apply_resolved(root, &schema, message)
}

/// Apply `source` to `root`, projecting the message named `message`.
pub fn apply_schema_as(root: &mut Node, source: &str, message: &str) -> Result<(), SchemaApplyError> {
    let schema = parser::parse_resolved(source)?;
    let index = schema
        .get_message(message)
        .ok_or_else(|| SchemaParseError::UnknownMessage(message.to_string()))?;
    apply_resolved(root, &schema, index)
}

/// Project message `message` of an already resolved schema onto `root`.
pub fn apply_resolved(root: &mut Node, schema: &ResolvedSchema, message: usize) -> Result<(), SchemaApplyError> {
    let mut projected = root.clone();
    let mut ctx = Projection { schema, matched: 0 };
    ctx.project_message(&mut projected, &NodePath::root(), message)?;

    // Instances of one declared type must agree on their undeclared fields too.
    let mut by_type: Vec<Vec<NodePath>> = Vec::new();
    let mut slot: HashMap<String, usize> = HashMap::new();
    for (path, node) in projected.preorder() {
        if path.is_root() || !node.is_message() || node.field_type.is_placeholder() {
            continue;
        }
        match slot.get(node.field_type.as_str()) {
            Some(&i) => by_type[i].push(path),
            None => {
                slot.insert(node.field_type.as_str().to_string(), by_type.len());
                by_type.push(vec![path]);
            }
        }
    }
    for paths in by_type {
        codec::harmonize(&mut projected, paths)?;
    }

    debug!(
        message = %schema.message(message).full_name,
        matched = ctx.matched,
        "applied schema"
    );
    *root = projected;
    Ok(())
}

struct Projection<'a> {
    schema: &'a ResolvedSchema,
    matched: usize,
}

impl Projection<'_> {
    fn project_message(&mut self, node: &mut Node, path: &NodePath, message: usize) -> Result<(), SchemaApplyError> {
        let schema = self.schema;
        let msg = schema.message(message);
        let present: HashSet<u32> = node.children.iter().map(|c| c.field_num).collect();
        for field in &msg.fields {
            if field.label == Label::Required && !present.contains(&field.number) {
                return Err(SchemaApplyError::MissingRequired {
                    message: msg.full_name.clone(),
                    name: field.name.clone(),
                });
            }
        }
        for (i, child) in node.children.iter_mut().enumerate() {
            if let Some(field) = msg.field(child.field_num) {
                self.project_field(child, &path.child(i), field)?;
            }
        }
        Ok(())
    }

    fn project_field(&mut self, node: &mut Node, path: &NodePath, field: &ResolvedField) -> Result<(), SchemaApplyError> {
        self.matched += 1;
        node.name = field.name.clone();
        node.is_repeated = field.label == Label::Repeated;
        // Instances of an `unknown` field disagree on wire type; no single declaration fits them.
        if node.field_type == FieldType::Unknown {
            return Ok(());
        }
        let incompatible = |node: &Node, declared: &str| SchemaApplyError::IncompatibleType {
            path: path.to_string(),
            field: field.name.clone(),
            declared: declared.to_string(),
            found: node.field_type.to_string(),
        };

        match field.kind {
            FieldKind::Message(m) => {
                let tag = self.type_tag(m);
                if !node.is_message() {
                    let payload = match leaf_to_wire(node, path)? {
                        Some(WireValue::Len(bytes)) => bytes,
                        None if node.field_type.wire_type(node.wire) == WireType::LengthDelimited => Vec::new(),
                        _ => return Err(incompatible(node, &tag)),
                    };
                    let decoded = codec::decode(&payload).map_err(|_| incompatible(node, &tag))?;
                    trace!(%path, children = decoded.children.len(), "decoded declared sub-message");
                    node.children = decoded.children;
                    node.value = Value::Null;
                    node.wire = Some(WireType::LengthDelimited);
                }
                node.field_type = FieldType::Message(tag);
                self.project_message(node, path, m)
            }
            FieldKind::Scalar(_) | FieldKind::Enum => {
                let st = field.kind.scalar().unwrap_or(ScalarType::Int32);
                if node.is_message() {
                    if st.wire_type() != WireType::LengthDelimited {
                        return Err(incompatible(node, st.keyword()));
                    }
                    let payload = codec::encode_children(&node.children, path)?;
                    node.value = value_from_wire(st, &WireValue::Len(payload))
                        .ok_or_else(|| incompatible(node, st.keyword()))?;
                    node.children.clear();
                } else {
                    if node.field_type.wire_type(node.wire) != st.wire_type() {
                        return Err(incompatible(node, st.keyword()));
                    }
                    if let Some(w) = leaf_to_wire(node, path)? {
                        node.value = value_from_wire(st, &w).ok_or_else(|| incompatible(node, st.keyword()))?;
                    }
                }
                node.field_type = FieldType::Scalar(st);
                node.wire = Some(st.wire_type());
                Ok(())
            }
        }
    }

    /// Type tag for a declared message: its simple name, or the underscored full name when
    /// the simple name is declared more than once.
    fn type_tag(&self, index: usize) -> String {
        let msg = self.schema.message(index);
        let clashes = self.schema.messages.iter().filter(|m| m.name == msg.name).count() > 1;
        if clashes {
            msg.full_name.replace('.', "_")
        } else {
            msg.name.clone()
        }
    }
}
