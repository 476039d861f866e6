//! Name-keyed JSON view of a field tree.
//!
//! Keys are node labels in sibling order. Siblings sharing a label collapse into one array at
//! the position of the first of them. Numbers stay in their stored text form, so 64-bit values
//! survive JSON consumers that read numbers as doubles.

use crate::error::ProjectionError;
use crate::tree::Node;
use crate::value::Value;
use serde_json::{Map, Value as Json};
use std::collections::HashMap;

/// Project `root` to a JSON value. `None` is the only failure.
pub fn to_json(root: Option<&Node>) -> Result<Json, ProjectionError> {
    let root = root.ok_or(ProjectionError::NullInput)?;
    Ok(node_json(root))
}

/// Render the projection as UTF-8 text.
pub fn to_json_string(root: Option<&Node>, pretty: bool) -> Result<String, ProjectionError> {
    let json = to_json(root)?;
    Ok(if pretty { format!("{:#}", json) } else { json.to_string() })
}

fn node_json(node: &Node) -> Json {
    if node.is_message() {
        Json::Object(object(&node.children))
    } else {
        scalar_json(&node.value)
    }
}

fn scalar_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Text(s) => Json::String(s.clone()),
    }
}

fn object(children: &[Node]) -> Map<String, Json> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for child in children {
        *counts.entry(child.label().into_owned()).or_default() += 1;
    }
    let mut map = Map::new();
    for child in children {
        let label = child.label().into_owned();
        let value = node_json(child);
        let as_array = counts.get(&label).copied().unwrap_or(0) > 1 || child.is_repeated;
        match map.get_mut(&label) {
            Some(Json::Array(items)) => items.push(value),
            Some(slot) => *slot = value,
            None if as_array => {
                map.insert(label, Json::Array(vec![value]));
            }
            None => {
                map.insert(label, value);
            }
        }
    }
    map
}
