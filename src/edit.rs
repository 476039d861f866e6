//! Edit engine: validated, invariant-preserving mutations of a field tree.
//!
//! Edits that would lose data or touch other nodes suspend with a [`Prompt`]; the host answers
//! with [`Editor::respond`]. Until the answer arrives the tree is untouched, and a declined
//! prompt leaves it as it was.

use crate::codec::scalar_to_wire;
use crate::error::TreeInvariantError;
use crate::rules;
use crate::tree::{Node, NodePath};
use crate::types::{is_identifier, FieldType};
use crate::value::Value;
use crate::wire::MAX_FIELD_NUMBER;
use std::fmt;
use tracing::{debug, warn};

/// "Don't ask again" latches. Share one value between editors for process-wide behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EditorSettings {
    /// Apply value-clearing type changes and drift suggestions without asking.
    pub skip_type_change_confirm: bool,
    /// Synchronize other instances of a message type without asking.
    pub skip_propagation_confirm: bool,
}

/// A question the host must answer before an edit proceeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    /// The change clears the node's value or children.
    TypeChange {
        path: NodePath,
        old_type: FieldType,
        new_type: FieldType,
    },
    /// `text` is not valid for `current_type` but fits `suggested_type`.
    TypeDrift {
        path: NodePath,
        current_type: FieldType,
        suggested_type: FieldType,
        text: String,
    },
    /// `count` fields in other instances of the parent's message type change too.
    Propagation {
        path: NodePath,
        new_type: FieldType,
        count: usize,
    },
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prompt::TypeChange { old_type, new_type, .. } => {
                write!(f, "change type from {} to {}? the current value will be cleared", old_type, new_type)
            }
            Prompt::TypeDrift {
                current_type,
                suggested_type,
                text,
                ..
            } => write!(f, "{:?} is not a valid {}; change type to {}?", text, current_type, suggested_type),
            Prompt::Propagation { count, new_type, .. } => {
                write!(f, "synchronize {} other field(s) to {}?", count, new_type)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Answer {
    pub confirmed: bool,
    pub dont_ask_again: bool,
}

impl Answer {
    pub fn yes() -> Self {
        Answer {
            confirmed: true,
            dont_ask_again: false,
        }
    }

    pub fn no() -> Self {
        Answer::default()
    }

    /// Confirm and set the latch for this kind of prompt.
    pub fn always() -> Self {
        Answer {
            confirmed: true,
            dont_ask_again: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    Unchanged,
    Rejected { reason: String },
    Confirm(Prompt),
}

/// Answers prompts inline for hosts that can block on the user.
pub trait ConfirmHost {
    fn confirm(&mut self, prompt: &Prompt) -> Answer;
}

impl<F: FnMut(&Prompt) -> Answer> ConfirmHost for F {
    fn confirm(&mut self, prompt: &Prompt) -> Answer {
        self(prompt)
    }
}

/// A pending type change: the node, its effective new type and every other node it drags along.
#[derive(Debug, Clone)]
struct TypePlan {
    path: NodePath,
    new_type: FieldType,
    /// Value stored on the primary node instead of the usual conversion (drift).
    value: Option<Value>,
    /// Same field number under the same parent; always follow.
    siblings: Vec<NodePath>,
    /// Same field number in other instances of the parent message.
    others: Vec<NodePath>,
    /// Targets keep their text when it is still a valid value of the new type.
    keep_text: bool,
}

#[derive(Debug, Clone)]
enum Stage {
    TypeChange(TypePlan),
    Drift(TypePlan),
    Propagation(TypePlan),
}

#[derive(Debug, Clone)]
pub struct Editor {
    root: Node,
    pub settings: EditorSettings,
    pending: Option<(Prompt, Stage)>,
}

impl Editor {
    pub fn new(root: Node) -> Self {
        Self::with_settings(root, EditorSettings::default())
    }

    pub fn with_settings(root: Node, settings: EditorSettings) -> Self {
        Editor {
            root,
            settings,
            pending: None,
        }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn into_root(self) -> Node {
        self.root
    }

    pub fn node(&self, path: &NodePath) -> Option<&Node> {
        self.root.get(path)
    }

    pub fn pending(&self) -> Option<&Prompt> {
        self.pending.as_ref().map(|(p, _)| p)
    }

    /// Drop a pending prompt; the tree stays as it was.
    pub fn cancel(&mut self) {
        if let Some((prompt, _)) = self.pending.take() {
            debug!(%prompt, "prompt cancelled");
        }
    }

    pub fn check_invariants(&self) -> Result<(), TreeInvariantError> {
        self.root.check_invariants()
    }

    /// Store `text` as the value of the scalar at `path`.
    pub fn set_value(&mut self, path: &NodePath, text: &str) -> EditOutcome {
        self.cancel();
        let Some(node) = self.root.get(path) else {
            return reject(path, "no field at this path");
        };
        if node.is_message() {
            return EditOutcome::Unchanged;
        }
        if rules::accepts(&node.field_type, text) {
            let value = rules::value_from_text(&node.field_type, text);
            if value == node.value {
                return EditOutcome::Unchanged;
            }
            return self.commit(|root| {
                if let Some(n) = root.get_mut(path) {
                    n.value = value;
                }
            });
        }
        let Some(suggested) = rules::drift(&node.field_type, text) else {
            return reject(path, &format!("{:?} is not a valid {}", text, node.field_type));
        };
        let prompt = Prompt::TypeDrift {
            path: path.clone(),
            current_type: node.field_type.clone(),
            suggested_type: suggested.clone(),
            text: text.to_string(),
        };
        let mut plan = self.plan(path, suggested);
        plan.value = Some(rules::value_from_text(&plan.new_type, text));
        plan.keep_text = true;
        if self.settings.skip_type_change_confirm {
            return self.propagate(plan);
        }
        self.suspend(prompt, Stage::Drift(plan))
    }

    /// Parse `type_name` and change the type of the node at `path`.
    pub fn set_type_str(&mut self, path: &NodePath, type_name: &str) -> EditOutcome {
        match FieldType::parse(type_name) {
            Some(t) => self.set_type(path, t),
            None => {
                self.cancel();
                reject(path, &format!("{:?} is not a type", type_name))
            }
        }
    }

    pub fn set_type(&mut self, path: &NodePath, new_type: FieldType) -> EditOutcome {
        self.cancel();
        if path.is_root() {
            return reject(path, "the root message type is fixed");
        }
        let Some(node) = self.root.get(path) else {
            return reject(path, "no field at this path");
        };
        if node.field_type == new_type {
            return EditOutcome::Unchanged;
        }
        let old_type = node.field_type.clone();
        let needs_prompt = if new_type.is_message() {
            false
        } else if node.is_message() {
            true
        } else {
            !rules::is_seamless(&node.field_type, &new_type, &node.value)
        };
        let plan = self.plan(path, new_type);
        if needs_prompt && !self.settings.skip_type_change_confirm {
            let prompt = Prompt::TypeChange {
                path: path.clone(),
                old_type,
                new_type: plan.new_type.clone(),
            };
            return self.suspend(prompt, Stage::TypeChange(plan));
        }
        self.propagate(plan)
    }

    /// Set a node's label. Empty text resets it to the synthetic `field_<N>`.
    pub fn rename(&mut self, path: &NodePath, text: &str) -> EditOutcome {
        self.cancel();
        if path.is_root() {
            return reject(path, "the root cannot be renamed");
        }
        let Some(node) = self.root.get(path) else {
            return reject(path, "no field at this path");
        };
        if !text.is_empty() && !is_identifier(text) {
            return reject(path, &format!("{:?} is not a valid field name", text));
        }
        if node.name == text {
            return EditOutcome::Unchanged;
        }
        let field_num = node.field_num;
        let label = if text.is_empty() {
            format!("field_{}", field_num)
        } else {
            text.to_string()
        };
        let Some(parent_path) = path.parent() else {
            return reject(path, "no field at this path");
        };
        // Every instance of the field carries one name, unique within its message.
        let mut parents = instances_of(&self.root, &parent_path);
        parents.push(parent_path);
        let mut targets = Vec::new();
        for p in &parents {
            let Some(parent) = self.root.get(p) else { continue };
            for (i, c) in parent.children.iter().enumerate() {
                if c.field_num == field_num {
                    targets.push(p.child(i));
                } else if *c.label() == *label {
                    return reject(path, &format!("{} already names field {}", label, c.field_num));
                }
            }
        }
        debug!(%path, name = %label, fields = targets.len(), "renaming field");
        let name = text.to_string();
        self.commit(|root| {
            for p in &targets {
                if let Some(n) = root.get_mut(p) {
                    n.name = name.clone();
                }
            }
        })
    }

    /// Answer the pending prompt.
    pub fn respond(&mut self, answer: Answer) -> EditOutcome {
        let Some((prompt, stage)) = self.pending.take() else {
            return EditOutcome::Unchanged;
        };
        if !answer.confirmed {
            debug!(%prompt, "prompt declined");
            return match stage {
                Stage::Drift(plan) => reject(&plan.path, "type change declined"),
                _ => EditOutcome::Unchanged,
            };
        }
        if answer.dont_ask_again {
            match stage {
                Stage::Propagation(_) => self.settings.skip_propagation_confirm = true,
                _ => self.settings.skip_type_change_confirm = true,
            }
        }
        match stage {
            Stage::TypeChange(plan) => self.propagate(plan),
            Stage::Drift(plan) => match self.first_cleared(&plan) {
                Some((lossy, old_type)) if !self.settings.skip_type_change_confirm => {
                    let prompt = Prompt::TypeChange {
                        path: lossy,
                        old_type,
                        new_type: plan.new_type.clone(),
                    };
                    self.suspend(prompt, Stage::TypeChange(plan))
                }
                _ => self.propagate(plan),
            },
            Stage::Propagation(plan) => self.apply_plan(plan),
        }
    }

    /// [`Editor::set_type`], answering prompts through `host`.
    pub fn set_type_with(&mut self, path: &NodePath, new_type: FieldType, host: &mut dyn ConfirmHost) -> EditOutcome {
        let outcome = self.set_type(path, new_type);
        self.drive(outcome, host)
    }

    /// [`Editor::set_value`], answering prompts through `host`.
    pub fn set_value_with(&mut self, path: &NodePath, text: &str, host: &mut dyn ConfirmHost) -> EditOutcome {
        let outcome = self.set_value(path, text);
        self.drive(outcome, host)
    }

    fn drive(&mut self, mut outcome: EditOutcome, host: &mut dyn ConfirmHost) -> EditOutcome {
        while let EditOutcome::Confirm(prompt) = &outcome {
            let answer = host.confirm(prompt);
            outcome = self.respond(answer);
        }
        outcome
    }

    /// Add an empty field under the message at `parent`. Returns the new node's path, or
    /// `None` when the parent is not a message, the number is out of range, or the type
    /// conflicts with existing fields of that number.
    pub fn add_field(&mut self, parent: &NodePath, field_num: u32, field_type: FieldType) -> Option<NodePath> {
        self.cancel();
        if field_num == 0 || field_num > MAX_FIELD_NUMBER {
            return None;
        }
        let parent_node = self.root.get(parent).filter(|n| n.is_message())?;
        if parent_node
            .children
            .iter()
            .any(|c| c.field_num == field_num && c.field_type != field_type)
        {
            return None;
        }
        let index = parent_node
            .children
            .iter()
            .rposition(|c| c.field_num == field_num)
            .map(|i| i + 1)
            .unwrap_or(parent_node.children.len());
        let children = if field_type.is_message() {
            template_children(&self.root, &field_type, None).unwrap_or_default()
        } else {
            Vec::new()
        };
        let value = if field_type.is_message() {
            Value::Null
        } else {
            rules::value_from_text(&field_type, "")
        };
        let name = std::iter::once(parent.clone())
            .chain(instances_of(&self.root, parent))
            .find_map(|p| {
                let n = self.root.get(&p)?;
                n.children.iter().find(|c| c.field_num == field_num).map(|c| c.name.clone())
            })
            .unwrap_or_default();
        let mut node = Node::leaf(field_num, field_type, value).named(&name);
        node.children = children;
        node.wire = Some(node.field_type.wire_type(None));
        let path = parent.child(index);
        match self.commit(|root| {
            if let Some(p) = root.get_mut(parent) {
                p.children.insert(index, node);
                let repeated = p.children.iter().filter(|c| c.field_num == field_num).count() > 1;
                for c in p.children.iter_mut().filter(|c| c.field_num == field_num) {
                    c.is_repeated |= repeated;
                }
            }
        }) {
            EditOutcome::Applied => Some(path),
            _ => None,
        }
    }

    /// Remove the field at `path` together with its subtree.
    pub fn remove_field(&mut self, path: &NodePath) -> bool {
        self.cancel();
        let (Some(parent), Some(index)) = (path.parent(), path.last()) else {
            return false;
        };
        if !self.root.get(&parent).is_some_and(|p| index < p.children.len()) {
            return false;
        }
        let outcome = self.commit(|root| {
            if let Some(p) = root.get_mut(&parent) {
                let field_num = p.children.remove(index).field_num;
                let left = p.children.iter().filter(|c| c.field_num == field_num).count();
                if left == 1 {
                    for c in p.children.iter_mut().filter(|c| c.field_num == field_num) {
                        c.is_repeated = false;
                    }
                }
            }
        });
        debug!(%path, ?outcome, "removing field");
        outcome == EditOutcome::Applied
    }

    fn suspend(&mut self, prompt: Prompt, stage: Stage) -> EditOutcome {
        self.pending = Some((prompt.clone(), stage));
        EditOutcome::Confirm(prompt)
    }

    /// Work out the effective type and the nodes a type change reaches.
    fn plan(&self, path: &NodePath, requested: FieldType) -> TypePlan {
        let node = self.root.get(path);
        let field_num = node.map(|n| n.field_num).unwrap_or(0);
        let new_type = match node {
            Some(n)
                if requested.is_message()
                    && !requested.is_placeholder()
                    && n.children.is_empty()
                    && !type_exists_elsewhere(&self.root, &requested, path) =>
            {
                FieldType::synthetic(self.root.max_synthetic_index() + 1)
            }
            _ => requested,
        };

        let mut siblings = Vec::new();
        let mut others = Vec::new();
        if let Some(parent_path) = path.parent() {
            if let Some(parent) = self.root.get(&parent_path) {
                for (i, c) in parent.children.iter().enumerate() {
                    let p = parent_path.child(i);
                    if c.field_num == field_num && p != *path && c.field_type != new_type {
                        siblings.push(p);
                    }
                }
                for p in instances_of(&self.root, &parent_path) {
                    let Some(n) = self.root.get(&p) else { continue };
                    for (i, c) in n.children.iter().enumerate() {
                        if c.field_num == field_num && c.field_type != new_type {
                            others.push(p.child(i));
                        }
                    }
                }
            }
        }
        TypePlan {
            path: path.clone(),
            new_type,
            value: None,
            siblings,
            others,
            keep_text: false,
        }
    }

    /// First node other than the edited one whose value the plan would clear.
    fn first_cleared(&self, plan: &TypePlan) -> Option<(NodePath, FieldType)> {
        plan.siblings.iter().chain(&plan.others).find_map(|p| {
            let n = self.root.get(p)?;
            let cleared = if plan.new_type.is_message() {
                false
            } else if n.is_message() {
                true
            } else {
                !rules::is_seamless(&n.field_type, &plan.new_type, &n.value)
                    && !(plan.keep_text && text_survives(&plan.new_type, &n.value))
            };
            cleared.then(|| (p.clone(), n.field_type.clone()))
        })
    }

    fn propagate(&mut self, plan: TypePlan) -> EditOutcome {
        if plan.others.is_empty() || self.settings.skip_propagation_confirm {
            return self.apply_plan(plan);
        }
        let prompt = Prompt::Propagation {
            path: plan.path.clone(),
            new_type: plan.new_type.clone(),
            count: plan.others.len(),
        };
        self.suspend(prompt, Stage::Propagation(plan))
    }

    fn apply_plan(&mut self, plan: TypePlan) -> EditOutcome {
        debug!(
            path = %plan.path,
            new_type = %plan.new_type,
            siblings = plan.siblings.len(),
            others = plan.others.len(),
            "changing field type"
        );
        self.commit(|root| {
            retype(root, &plan.path, &plan.new_type, plan.keep_text);
            if let Some(value) = plan.value {
                if let Some(n) = root.get_mut(&plan.path) {
                    n.value = value;
                }
            }
            for p in plan.siblings.iter().chain(&plan.others) {
                retype(root, p, &plan.new_type, plan.keep_text);
            }
        })
    }

    /// Apply `edit` to a copy; keep it unless it breaks an invariant the tree satisfied.
    fn commit<F: FnOnce(&mut Node)>(&mut self, edit: F) -> EditOutcome {
        let was_sound = self.root.check_invariants().is_ok();
        let mut next = self.root.clone();
        edit(&mut next);
        if was_sound {
            if let Err(e) = next.check_invariants() {
                warn!(error = %e, "edit rejected");
                return EditOutcome::Rejected { reason: e.to_string() };
            }
        }
        self.root = next;
        EditOutcome::Applied
    }
}

fn reject(path: &NodePath, reason: &str) -> EditOutcome {
    warn!(%path, reason, "edit rejected");
    EditOutcome::Rejected {
        reason: reason.to_string(),
    }
}

/// Message nodes other than `parent` that must declare the same fields: reached from the root
/// through the same field numbers, or carrying the same named message type.
fn instances_of(root: &Node, parent: &NodePath) -> Vec<NodePath> {
    let Some(node) = root.get(parent) else {
        return Vec::new();
    };
    if parent.is_root() {
        return Vec::new();
    }
    let numbers = number_path(root, parent);
    let named = !node.field_type.is_placeholder();
    root.preorder()
        .into_iter()
        .filter(|(p, n)| {
            p != parent
                && n.is_message()
                && ((named && n.field_type == node.field_type) || number_path(root, p) == numbers)
        })
        .map(|(p, _)| p)
        .collect()
}

/// Field numbers on the way from the root to `path`.
fn number_path(root: &Node, path: &NodePath) -> Option<Vec<u32>> {
    let mut node = root;
    let mut numbers = Vec::with_capacity(path.depth());
    for &i in path.indices() {
        node = node.children.get(i)?;
        numbers.push(node.field_num);
    }
    Some(numbers)
}

/// True when the value's text is a complete value of `new_type`.
fn text_survives(new_type: &FieldType, value: &Value) -> bool {
    let FieldType::Scalar(st) = new_type else {
        return false;
    };
    let text = value.edit_text();
    !value.is_null() && rules::accepts(new_type, &text) && scalar_to_wire(*st, &text).is_some()
}

fn type_exists_elsewhere(root: &Node, field_type: &FieldType, except: &NodePath) -> bool {
    root.preorder()
        .into_iter()
        .any(|(p, n)| p != *except && n.field_type == *field_type)
}

/// Children of the first other node of `field_type`, preferring one that has any.
fn template_children(root: &Node, field_type: &FieldType, except: Option<&NodePath>) -> Option<Vec<Node>> {
    let candidates: Vec<&Node> = root
        .preorder()
        .into_iter()
        .filter(|(p, n)| Some(p) != except && n.field_type == *field_type)
        .map(|(_, n)| n)
        .collect();
    candidates
        .iter()
        .find(|n| !n.children.is_empty())
        .or(candidates.first())
        .map(|n| n.children.clone())
}

/// Change one node's type, converting or clearing its value and importing message children.
/// With `keep_text`, a value whose text is valid under the new type is kept.
fn retype(root: &mut Node, path: &NodePath, new_type: &FieldType, keep_text: bool) {
    let template = if new_type.is_message() && !new_type.is_placeholder() {
        template_children(root, new_type, Some(path))
    } else {
        None
    };
    let Some(node) = root.get_mut(path) else { return };
    if node.field_type == *new_type {
        return;
    }
    if new_type.is_message() {
        if node.children.is_empty() {
            node.children = template.unwrap_or_default();
        }
        node.value = Value::Null;
    } else if node.is_message() {
        node.children.clear();
        node.value = Value::Null;
    } else if rules::is_seamless(&node.field_type, new_type, &node.value) {
        node.value = rules::convert_seamless(new_type, &node.value);
    } else if keep_text && text_survives(new_type, &node.value) {
        node.value = rules::value_from_text(new_type, &node.value.edit_text());
    } else {
        node.value = Value::Null;
    }
    node.wire = Some(new_type.wire_type(node.wire));
    node.field_type = new_type.clone();
}
