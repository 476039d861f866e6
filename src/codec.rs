//! Schemaless decode and plan-checked encode of wire-format payloads.
//!
//! Decoding infers a type for every record from its wire type alone; length-delimited payloads
//! that parse cleanly as records become sub-messages. Encoding writes each node under its own
//! type after checking the tree against the schema the emitter synthesizes for it.

use crate::ast::{FieldKind, ResolvedSchema};
use crate::emit;
use crate::error::{DecodeError, EncodeError};
use crate::tree::{Node, NodePath};
use crate::types::{FieldType, ScalarType, PLACEHOLDER_MESSAGE};
use crate::value::{escape_bytes, unescape_bytes, Value};
use crate::wire::{self, Reader, WireType, WireValue};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Decoder knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Varints 0 and 1 decode as `bool`.
    pub infer_bool: bool,
    /// Length-delimited payloads nested deeper than this stay strings.
    pub max_depth: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            infer_bool: true,
            max_depth: 64,
        }
    }
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn infer_bool(mut self, on: bool) -> Self {
        self.infer_bool = on;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

/// Decode a payload with default options.
pub fn decode(bytes: &[u8]) -> Result<Node, DecodeError> {
    decode_with(bytes, &DecodeOptions::default())
}

pub fn decode_with(bytes: &[u8], opts: &DecodeOptions) -> Result<Node, DecodeError> {
    let mut root = Node::root();
    root.children = decode_fields(bytes, opts, 0)?;
    // Freshly decoded values always re-encode, so this only fails on a bug.
    if let Err(e) = harmonize(&mut root, vec![NodePath::root()]) {
        warn!(error = %e, "could not harmonize decoded field groups");
    }
    debug!(bytes = bytes.len(), nodes = root.node_count(), "decoded payload");
    Ok(root)
}

fn decode_fields(data: &[u8], opts: &DecodeOptions, depth: usize) -> Result<Vec<Node>, DecodeError> {
    let mut reader = Reader::new(data);
    let mut children = Vec::new();
    while !reader.is_empty() {
        let (field_num, wire) = reader.read_tag()?;
        let value = reader.read_value(wire)?;
        children.push(decode_record(field_num, value, opts, depth));
    }
    let mut counts: HashMap<u32, usize> = HashMap::new();
    for child in &children {
        *counts.entry(child.field_num).or_default() += 1;
    }
    for child in &mut children {
        child.is_repeated = counts.get(&child.field_num).is_some_and(|&n| n > 1);
    }
    Ok(children)
}

fn decode_record(field_num: u32, value: WireValue, opts: &DecodeOptions, depth: usize) -> Node {
    match value {
        WireValue::Varint(v) if opts.infer_bool && v <= 1 => {
            Node::scalar(field_num, ScalarType::Bool, Value::Bool(v == 1)).with_wire(WireType::Varint)
        }
        WireValue::Varint(v) => number(field_num, v, WireType::Varint),
        WireValue::Fixed64(v) => number(field_num, v, WireType::Fixed64),
        WireValue::Fixed32(v) => number(field_num, v as u64, WireType::Fixed32),
        WireValue::Len(payload) => {
            if !payload.is_empty() && depth < opts.max_depth {
                match decode_fields(&payload, opts, depth + 1) {
                    Ok(children) => {
                        return Node::message(field_num, PLACEHOLDER_MESSAGE, children)
                            .with_wire(WireType::LengthDelimited);
                    }
                    Err(e) => trace!(field_num, depth, error = %e, "payload is not a sub-message"),
                }
            }
            let node = match String::from_utf8(payload) {
                Ok(s) => Node::scalar(field_num, ScalarType::String, Value::Text(s)),
                Err(e) => Node::scalar(
                    field_num,
                    ScalarType::Bytes,
                    Value::Text(escape_bytes(e.as_bytes())),
                ),
            };
            node.with_wire(WireType::LengthDelimited)
        }
    }
}

fn number(field_num: u32, raw: u64, wire: WireType) -> Node {
    Node::leaf(field_num, FieldType::Number, Value::Text(raw.to_string())).with_wire(wire)
}

/// How a field group whose members disagree on type is made uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Unify {
    /// Booleans mixed with varint numbers: all become `number`.
    Number,
    /// Anything else: all become `unknown`, keeping their raw wire value as text.
    Unknown,
}

/// Decide how to make a field group uniform; `None` when it already is.
pub(crate) fn unify_decision(group: &[&Node]) -> Option<Unify> {
    let first = group.first()?;
    let class = |n: &Node| n.field_type.wire_type(n.wire);
    if group
        .iter()
        .all(|n| n.field_type == first.field_type && class(n) == class(first))
    {
        return None;
    }
    let varint_number = |n: &Node| match n.field_type {
        FieldType::Scalar(ScalarType::Bool) => true,
        FieldType::Number => class(n) == WireType::Varint,
        _ => false,
    };
    if group.iter().all(|n| varint_number(n)) {
        Some(Unify::Number)
    } else {
        Some(Unify::Unknown)
    }
}

pub(crate) fn apply_unify(node: &mut Node, how: Unify, path: &NodePath) -> Result<(), EncodeError> {
    match how {
        Unify::Number => {
            if let Some(bit) = node.value.as_bool() {
                node.value = Value::text(if bit { "1" } else { "0" });
            }
            node.field_type = FieldType::Number;
            node.wire = Some(WireType::Varint);
        }
        Unify::Unknown => {
            if node.field_type == FieldType::Unknown {
                return Ok(());
            }
            let wire = if node.is_message() {
                Some(WireValue::Len(encode_children(&node.children, path)?))
            } else {
                leaf_to_wire(node, path)?
            };
            node.wire = Some(node.field_type.wire_type(node.wire));
            node.field_type = FieldType::Unknown;
            node.children.clear();
            node.value = match wire {
                Some(w) => raw_text(&w),
                None => Value::Null,
            };
        }
    }
    Ok(())
}

/// Text an `unknown` node stores for a raw wire value.
fn raw_text(w: &WireValue) -> Value {
    Value::Text(match w {
        WireValue::Varint(v) | WireValue::Fixed64(v) => v.to_string(),
        WireValue::Fixed32(v) => v.to_string(),
        WireValue::Len(bytes) => escape_bytes(bytes),
    })
}

/// Make every field group uniform, top-down.
///
/// A group is all children with one field number across the given message nodes; the message
/// members of a group form the next level's nodes. This matches how the emitter merges
/// instances into one message declaration.
pub(crate) fn harmonize(root: &mut Node, parents: Vec<NodePath>) -> Result<(), EncodeError> {
    let mut groups: Vec<(u32, Vec<NodePath>)> = Vec::new();
    let mut slot: HashMap<u32, usize> = HashMap::new();
    for parent in &parents {
        let Some(node) = root.get(parent) else { continue };
        for (i, child) in node.children.iter().enumerate() {
            let path = parent.child(i);
            match slot.get(&child.field_num) {
                Some(&g) => groups[g].1.push(path),
                None => {
                    slot.insert(child.field_num, groups.len());
                    groups.push((child.field_num, vec![path]));
                }
            }
        }
    }
    for (field_num, paths) in groups {
        let decision = {
            let nodes: Vec<&Node> = paths.iter().filter_map(|p| root.get(p)).collect();
            unify_decision(&nodes)
        };
        if let Some(how) = decision {
            trace!(field_num, members = paths.len(), ?how, "unifying field group");
            for path in &paths {
                if let Some(node) = root.get_mut(path) {
                    apply_unify(node, how, path)?;
                }
            }
        }
        let messages: Vec<NodePath> = paths
            .into_iter()
            .filter(|p| root.get(p).is_some_and(Node::is_message))
            .collect();
        if !messages.is_empty() {
            harmonize(root, messages)?;
        }
    }
    Ok(())
}

/// Serialize a tree. Fails on invariant violations and on leaf text that does not parse
/// under the leaf's type. Leaves without a value are not written.
pub fn encode(root: &Node) -> Result<Vec<u8>, EncodeError> {
    root.check_invariants()?;
    let plan = emit::synthesize(root);
    let resolved = ResolvedSchema::resolve(plan.schema)?;
    let root_index = resolved.get_message(emit::ROOT_MESSAGE);
    let mut out = Vec::new();
    write_children(
        &root.children,
        &NodePath::root(),
        root_index.map(|i| (&resolved, i)),
        &mut out,
    )?;
    debug!(bytes = out.len(), nodes = root.node_count(), "encoded tree");
    Ok(out)
}

/// Encode a message body without consulting a plan.
pub(crate) fn encode_children(children: &[Node], base: &NodePath) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    write_children(children, base, None, &mut out)?;
    Ok(out)
}

fn write_children(
    children: &[Node],
    base: &NodePath,
    plan: Option<(&ResolvedSchema, usize)>,
    out: &mut Vec<u8>,
) -> Result<(), EncodeError> {
    for (i, child) in children.iter().enumerate() {
        let path = base.child(i);
        let declared = plan.and_then(|(schema, msg)| {
            schema
                .message(msg)
                .field(child.field_num)
                .map(|f| (schema, f.kind))
        });
        if let Some((_, kind)) = declared {
            check_plan(child, kind, &path);
        }
        if child.is_message() {
            let nested = match declared {
                Some((schema, FieldKind::Message(m))) => Some((schema, m)),
                _ => None,
            };
            let mut body = Vec::new();
            write_children(&child.children, &path, nested, &mut body)?;
            wire::write_record(out, child.field_num, &WireValue::Len(body));
        } else if let Some(value) = leaf_to_wire(child, &path)? {
            wire::write_record(out, child.field_num, &value);
        }
    }
    Ok(())
}

fn check_plan(node: &Node, kind: FieldKind, path: &NodePath) {
    if node.field_type == FieldType::Unknown {
        return;
    }
    let declared = match kind.scalar() {
        Some(st) => st.wire_type(),
        None => WireType::LengthDelimited,
    };
    let found = node.field_type.wire_type(node.wire);
    if declared != found {
        warn!(%path, field_type = %node.field_type, ?declared, ?found, "field disagrees with synthesized plan");
    }
}

/// Wire value of a scalar node; `None` when it has no value.
pub(crate) fn leaf_to_wire(node: &Node, path: &NodePath) -> Result<Option<WireValue>, EncodeError> {
    let text = match &node.value {
        Value::Null => return Ok(None),
        Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
        Value::Text(s) => s.clone(),
    };
    let invalid = || EncodeError::InvalidValue {
        path: path.to_string(),
        field_type: node.field_type.to_string(),
        value: text.clone(),
    };
    let value = match &node.field_type {
        FieldType::Scalar(st) => scalar_to_wire(*st, &text),
        FieldType::Number => parse_number(&text).and_then(|v| match node.wire {
            Some(WireType::Fixed64) => Some(WireValue::Fixed64(v)),
            Some(WireType::Fixed32) => u32::try_from(v).ok().map(WireValue::Fixed32),
            _ => Some(WireValue::Varint(v)),
        }),
        FieldType::Unknown => match node.wire {
            Some(WireType::Varint) => text.parse().ok().map(WireValue::Varint),
            Some(WireType::Fixed64) => text.parse().ok().map(WireValue::Fixed64),
            Some(WireType::Fixed32) => text.parse().ok().map(WireValue::Fixed32),
            _ => unescape_bytes(&text).map(WireValue::Len),
        },
        FieldType::Message(_) => None,
    };
    value.map(Some).ok_or_else(invalid)
}

/// A `number` accepts any signed or unsigned 64-bit decimal; negatives wrap to two's complement.
fn parse_number(text: &str) -> Option<u64> {
    text.parse::<u64>()
        .ok()
        .or_else(|| text.parse::<i64>().ok().map(|v| v as u64))
}

/// Parse `text` under `st` into the value written on the wire.
pub fn scalar_to_wire(st: ScalarType, text: &str) -> Option<WireValue> {
    use ScalarType::*;
    Some(match st {
        String => WireValue::Len(text.as_bytes().to_vec()),
        Bytes => WireValue::Len(unescape_bytes(text)?),
        Int32 => WireValue::Varint(text.parse::<i32>().ok()? as i64 as u64),
        Int64 => WireValue::Varint(text.parse::<i64>().ok()? as u64),
        Uint32 => WireValue::Varint(text.parse::<u32>().ok()? as u64),
        Uint64 => WireValue::Varint(text.parse::<u64>().ok()?),
        Sint32 => WireValue::Varint(wire::zigzag_encode(text.parse::<i32>().ok()? as i64)),
        Sint64 => WireValue::Varint(wire::zigzag_encode(text.parse::<i64>().ok()?)),
        Bool => WireValue::Varint(match text {
            "1" | "true" => 1,
            "0" | "false" => 0,
            _ => return None,
        }),
        Float => WireValue::Fixed32(text.parse::<f32>().ok()?.to_bits()),
        Double => WireValue::Fixed64(text.parse::<f64>().ok()?.to_bits()),
        Fixed32 => WireValue::Fixed32(text.parse::<u32>().ok()?),
        Fixed64 => WireValue::Fixed64(text.parse::<u64>().ok()?),
        Sfixed32 => WireValue::Fixed32(text.parse::<i32>().ok()? as u32),
        Sfixed64 => WireValue::Fixed64(text.parse::<i64>().ok()? as u64),
    })
}

/// Reinterpret a raw wire value under `st`; `None` when the wire class does not fit.
pub fn value_from_wire(st: ScalarType, w: &WireValue) -> Option<Value> {
    use ScalarType::*;
    let text = match (st, w) {
        (Bool, WireValue::Varint(v)) => return Some(Value::Bool(*v != 0)),
        (Int32, WireValue::Varint(v)) => (*v as i32).to_string(),
        (Int64, WireValue::Varint(v)) => (*v as i64).to_string(),
        (Uint32, WireValue::Varint(v)) => (*v as u32).to_string(),
        (Uint64, WireValue::Varint(v)) => v.to_string(),
        (Sint32, WireValue::Varint(v)) => (wire::zigzag_decode(*v) as i32).to_string(),
        (Sint64, WireValue::Varint(v)) => wire::zigzag_decode(*v).to_string(),
        (Double, WireValue::Fixed64(v)) => f64::from_bits(*v).to_string(),
        (Fixed64, WireValue::Fixed64(v)) => v.to_string(),
        (Sfixed64, WireValue::Fixed64(v)) => (*v as i64).to_string(),
        (Float, WireValue::Fixed32(v)) => f32::from_bits(*v).to_string(),
        (Fixed32, WireValue::Fixed32(v)) => v.to_string(),
        (Sfixed32, WireValue::Fixed32(v)) => (*v as i32).to_string(),
        (String, WireValue::Len(b)) => std::str::from_utf8(b).ok()?.to_string(),
        (Bytes, WireValue::Len(b)) => escape_bytes(b),
        _ => return None,
    };
    Some(Value::Text(text))
}

/// True when two subtrees carry the same labels and would be written as the same records.
/// Type tags are ignored, so a `number` and the `int64` it was narrowed to compare equal.
pub fn wire_equivalent(a: &Node, b: &Node) -> bool {
    if a.field_num != b.field_num || a.label() != b.label() || a.is_message() != b.is_message() {
        return false;
    }
    if a.is_message() {
        return a.children.len() == b.children.len()
            && a.children.iter().zip(&b.children).all(|(x, y)| wire_equivalent(x, y));
    }
    let path = NodePath::root();
    match (leaf_to_wire(a, &path), leaf_to_wire(b, &path)) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}
