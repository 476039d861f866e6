//! The field tree: nodes, addressing and structural invariants.
//!
//! Every node owns its children outright; copying a subtree under another parent is a
//! deep clone. Nodes are addressed by [`NodePath`], the child indices leading from the root.

use crate::error::TreeInvariantError;
use crate::types::{FieldType, ScalarType};
use crate::value::Value;
use crate::wire::WireType;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

/// Name of the root node.
pub const ROOT_NAME: &str = "root";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Human label; empty means "use `field_<N>`".
    pub name: String,
    pub field_type: FieldType,
    /// Wire tag; 0 only on the root.
    pub field_num: u32,
    /// Present on scalar nodes only.
    pub value: Value,
    /// Emitter hint; cardinality comes from sibling multiplicity.
    pub is_repeated: bool,
    pub children: Vec<Node>,
    /// Wire type the decoder read this node from.
    pub wire: Option<WireType>,
}

impl Node {
    /// Empty document.
    pub fn root() -> Node {
        Node {
            name: ROOT_NAME.to_string(),
            field_type: FieldType::placeholder_message(),
            field_num: 0,
            value: Value::Null,
            is_repeated: false,
            children: Vec::new(),
            wire: None,
        }
    }

    pub fn leaf(field_num: u32, field_type: FieldType, value: Value) -> Node {
        Node {
            name: String::new(),
            field_type,
            field_num,
            value,
            is_repeated: false,
            children: Vec::new(),
            wire: None,
        }
    }

    pub fn scalar(field_num: u32, scalar: ScalarType, value: Value) -> Node {
        Node::leaf(field_num, FieldType::Scalar(scalar), value)
    }

    pub fn message(field_num: u32, type_name: &str, children: Vec<Node>) -> Node {
        Node {
            name: String::new(),
            field_type: FieldType::Message(type_name.to_string()),
            field_num,
            value: Value::Null,
            is_repeated: false,
            children,
            wire: None,
        }
    }

    pub fn named(mut self, name: &str) -> Node {
        self.name = name.to_string();
        self
    }

    pub fn with_wire(mut self, wire: WireType) -> Node {
        self.wire = Some(wire);
        self
    }

    /// `name`, or `field_<N>` when the name is empty.
    pub fn label(&self) -> Cow<'_, str> {
        if self.name.is_empty() {
            Cow::Owned(format!("field_{}", self.field_num))
        } else {
            Cow::Borrowed(&self.name)
        }
    }

    pub fn is_message(&self) -> bool {
        self.field_type.is_message()
    }

    pub fn get(&self, path: &NodePath) -> Option<&Node> {
        let mut node = self;
        for &i in path.indices() {
            node = node.children.get(i)?;
        }
        Some(node)
    }

    pub fn get_mut(&mut self, path: &NodePath) -> Option<&mut Node> {
        let mut node = self;
        for &i in path.indices() {
            node = node.children.get_mut(i)?;
        }
        Some(node)
    }

    /// All nodes in depth-first preorder, starting with `self` at the empty path.
    pub fn preorder(&self) -> Vec<(NodePath, &Node)> {
        let mut out = Vec::new();
        let mut path = Vec::new();
        collect_preorder(self, &mut path, &mut out);
        out
    }

    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Node::node_count).sum::<usize>()
    }

    /// Largest `k` among `message_<k>` types in this subtree (0 when none).
    pub fn max_synthetic_index(&self) -> u32 {
        let own = self.field_type.synthetic_index().unwrap_or(0);
        self.children
            .iter()
            .map(Node::max_synthetic_index)
            .fold(own, u32::max)
    }

    /// Check the structural invariants of a tree rooted at `self`.
    ///
    /// Same-named message types are checked for conflicting child types on the field numbers
    /// they share; a field present in one instance and absent in another is not a conflict.
    pub fn check_invariants(&self) -> Result<(), TreeInvariantError> {
        if self.field_num != 0 {
            return Err(TreeInvariantError::RootFieldNumber { found: self.field_num });
        }
        let mut shapes: HashMap<&str, HashMap<u32, &FieldType>> = HashMap::new();
        for (path, node) in self.preorder() {
            if !path.is_root() && node.field_num == 0 {
                return Err(TreeInvariantError::ZeroFieldNumber { path: path.to_string() });
            }
            if !node.is_message() {
                if !node.children.is_empty() {
                    return Err(TreeInvariantError::ScalarWithChildren { path: path.to_string() });
                }
                continue;
            }
            if !node.value.is_null() {
                return Err(TreeInvariantError::MessageWithValue { path: path.to_string() });
            }
            let mut seen: HashMap<u32, &FieldType> = HashMap::new();
            for child in &node.children {
                let first = *seen.entry(child.field_num).or_insert(&child.field_type);
                if first != &child.field_type {
                    return Err(TreeInvariantError::MixedSiblingTypes {
                        path: path.to_string(),
                        field_num: child.field_num,
                        first: first.to_string(),
                        second: child.field_type.to_string(),
                    });
                }
            }
            if node.field_type.is_placeholder() || node.children.is_empty() {
                continue;
            }
            let type_name = node.field_type.as_str();
            let shape = shapes.entry(type_name).or_default();
            for (field_num, field_type) in seen {
                let first = *shape.entry(field_num).or_insert(field_type);
                if first != field_type {
                    return Err(TreeInvariantError::ShapeConflict {
                        type_name: type_name.to_string(),
                        field_num,
                        first: first.to_string(),
                        second: field_type.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn collect_preorder<'a>(node: &'a Node, path: &mut Vec<usize>, out: &mut Vec<(NodePath, &'a Node)>) {
    out.push((NodePath(path.clone()), node));
    for (i, child) in node.children.iter().enumerate() {
        path.push(i);
        collect_preorder(child, path, out);
        path.pop();
    }
}

/// Child indices from the root to a node; empty for the root itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn root() -> NodePath {
        NodePath(Vec::new())
    }

    pub fn new(indices: Vec<usize>) -> NodePath {
        NodePath(indices)
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn child(&self, index: usize) -> NodePath {
        let mut indices = self.0.clone();
        indices.push(index);
        NodePath(indices)
    }

    pub fn parent(&self) -> Option<NodePath> {
        let (_, rest) = self.0.split_last()?;
        Some(NodePath(rest.to_vec()))
    }

    pub fn last(&self) -> Option<usize> {
        self.0.last().copied()
    }

    /// True when `self` is `other` or lies inside it.
    pub fn starts_with(&self, other: &NodePath) -> bool {
        self.0.starts_with(&other.0)
    }
}

impl From<Vec<usize>> for NodePath {
    fn from(indices: Vec<usize>) -> Self {
        NodePath(indices)
    }
}

impl From<&[usize]> for NodePath {
    fn from(indices: &[usize]) -> Self {
        NodePath(indices.to_vec())
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for i in &self.0 {
            write!(f, "/{}", i)?;
        }
        Ok(())
    }
}
