//! Abstract Syntax Tree for the textual schema dialect.

use crate::error::SchemaParseError;
use crate::types::ScalarType;
use crate::wire::MAX_FIELD_NUMBER;
use std::collections::{HashMap, HashSet};

/// Root schema definition: syntax, package and top-level messages/enums.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub syntax: Syntax,
    pub package: Option<String>,
    pub messages: Vec<MessageDecl>,
    pub enums: Vec<EnumDecl>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Syntax {
    #[default]
    Proto2,
    Proto3,
}

impl Syntax {
    pub fn as_str(self) -> &'static str {
        match self {
            Syntax::Proto2 => "proto2",
            Syntax::Proto3 => "proto3",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDecl {
    pub name: String,
    pub fields: Vec<FieldDecl>,
    pub nested: Vec<MessageDecl>,
    pub enums: Vec<EnumDecl>,
}

impl MessageDecl {
    pub fn new(name: &str) -> Self {
        MessageDecl {
            name: name.to_string(),
            fields: Vec::new(),
            nested: Vec::new(),
            enums: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub label: Label,
    /// Type as written: a scalar keyword or a (possibly dotted) message/enum reference.
    pub type_name: String,
    pub name: String,
    pub number: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Optional,
    Required,
    Repeated,
    /// proto3 field without a label.
    Implicit,
}

impl Label {
    pub fn keyword(self) -> Option<&'static str> {
        match self {
            Label::Optional => Some("optional"),
            Label::Required => Some("required"),
            Label::Repeated => Some("repeated"),
            Label::Implicit => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDecl {
    pub name: String,
    pub values: Vec<(String, i64)>,
}

/// Resolved type of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar(ScalarType),
    /// Index into [`ResolvedSchema::messages`].
    Message(usize),
    /// Enum reference, carried as `int32`.
    Enum,
}

impl FieldKind {
    /// Scalar type a value of this kind takes; `None` for messages.
    pub fn scalar(self) -> Option<ScalarType> {
        match self {
            FieldKind::Scalar(st) => Some(st),
            FieldKind::Enum => Some(ScalarType::Int32),
            FieldKind::Message(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedField {
    pub label: Label,
    pub name: String,
    pub number: u32,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMessage {
    /// Dotted name without package, e.g. `Outer.Inner`.
    pub full_name: String,
    /// Last component of `full_name`.
    pub name: String,
    pub fields: Vec<ResolvedField>,
    by_number: HashMap<u32, usize>,
}

impl ResolvedMessage {
    pub fn field(&self, number: u32) -> Option<&ResolvedField> {
        self.by_number.get(&number).map(|&i| &self.fields[i])
    }
}

/// Resolved schema: messages flattened and field types bound to scalars, messages or enums.
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    pub schema: Schema,
    pub messages: Vec<ResolvedMessage>,
    pub messages_by_name: HashMap<String, usize>,
}

impl ResolvedSchema {
    pub fn resolve(schema: Schema) -> Result<Self, SchemaParseError> {
        let mut flat: Vec<(String, &MessageDecl)> = Vec::new();
        let mut enums: Vec<String> = Vec::new();
        for e in &schema.enums {
            enums.push(e.name.clone());
        }
        for m in &schema.messages {
            flatten(m, "", &mut flat, &mut enums);
        }

        let mut messages_by_name = HashMap::new();
        for (i, (full_name, _)) in flat.iter().enumerate() {
            if messages_by_name.insert(full_name.clone(), i).is_some() {
                return Err(SchemaParseError::DuplicateMessage(full_name.clone()));
            }
        }

        let mut messages = Vec::with_capacity(flat.len());
        for (full_name, decl) in &flat {
            let mut fields: Vec<ResolvedField> = Vec::with_capacity(decl.fields.len());
            let mut by_number: HashMap<u32, usize> = HashMap::with_capacity(decl.fields.len());
            for f in &decl.fields {
                if f.number == 0 || f.number > MAX_FIELD_NUMBER as u64 {
                    return Err(SchemaParseError::InvalidFieldNumber {
                        message: full_name.clone(),
                        field: f.name.clone(),
                        number: f.number,
                    });
                }
                let number = f.number as u32;
                if by_number.insert(number, fields.len()).is_some() {
                    return Err(SchemaParseError::DuplicateFieldNumber {
                        message: full_name.clone(),
                        number,
                    });
                }
                let kind = resolve_type(
                    &f.type_name,
                    full_name,
                    schema.package.as_deref(),
                    &messages_by_name,
                    &enums,
                )
                .ok_or_else(|| SchemaParseError::UnresolvedType {
                    message: full_name.clone(),
                    type_name: f.type_name.clone(),
                })?;
                fields.push(ResolvedField {
                    label: f.label,
                    name: f.name.clone(),
                    number,
                    kind,
                });
            }
            messages.push(ResolvedMessage {
                full_name: full_name.clone(),
                name: decl.name.clone(),
                fields,
                by_number,
            });
        }

        Ok(ResolvedSchema {
            schema,
            messages,
            messages_by_name,
        })
    }

    /// Look a message up by full name, or by simple name when that is unambiguous.
    pub fn get_message(&self, name: &str) -> Option<usize> {
        let name = name.trim_start_matches('.');
        let name = match self.schema.package.as_deref() {
            Some(pkg) => name.strip_prefix(pkg).and_then(|r| r.strip_prefix('.')).unwrap_or(name),
            None => name,
        };
        if let Some(&i) = self.messages_by_name.get(name) {
            return Some(i);
        }
        let mut matches = self.messages.iter().enumerate().filter(|(_, m)| m.name == name);
        match (matches.next(), matches.next()) {
            (Some((i, _)), None) => Some(i),
            _ => None,
        }
    }

    pub fn message(&self, index: usize) -> &ResolvedMessage {
        &self.messages[index]
    }

    /// First top-level message that no field refers to.
    pub fn root_message(&self) -> Option<usize> {
        let referenced: HashSet<usize> = self
            .messages
            .iter()
            .flat_map(|m| m.fields.iter())
            .filter_map(|f| match f.kind {
                FieldKind::Message(i) => Some(i),
                _ => None,
            })
            .collect();
        let top_level = |m: &ResolvedMessage| !m.full_name.contains('.');
        self.messages
            .iter()
            .enumerate()
            .find(|(i, m)| top_level(m) && !referenced.contains(i))
            .or_else(|| self.messages.iter().enumerate().find(|(_, m)| top_level(m)))
            .map(|(i, _)| i)
    }
}

fn flatten<'a>(
    m: &'a MessageDecl,
    scope: &str,
    out: &mut Vec<(String, &'a MessageDecl)>,
    enums: &mut Vec<String>,
) {
    let full_name = if scope.is_empty() {
        m.name.clone()
    } else {
        format!("{}.{}", scope, m.name)
    };
    for e in &m.enums {
        enums.push(format!("{}.{}", full_name, e.name));
    }
    out.push((full_name.clone(), m));
    for nested in &m.nested {
        flatten(nested, &full_name, out, enums);
    }
}

/// Resolve a type reference the way scoped lookup works: innermost enclosing scope first.
fn resolve_type(
    type_name: &str,
    scope: &str,
    package: Option<&str>,
    messages: &HashMap<String, usize>,
    enums: &[String],
) -> Option<FieldKind> {
    if let Some(st) = ScalarType::from_keyword(type_name) {
        return Some(FieldKind::Scalar(st));
    }
    let lookup = |candidate: &str| -> Option<FieldKind> {
        if let Some(&i) = messages.get(candidate) {
            return Some(FieldKind::Message(i));
        }
        enums.iter().any(|e| e == candidate).then_some(FieldKind::Enum)
    };
    if let Some(absolute) = type_name.strip_prefix('.') {
        let relative = match package {
            Some(pkg) => absolute
                .strip_prefix(pkg)
                .and_then(|r| r.strip_prefix('.'))
                .unwrap_or(absolute),
            None => absolute,
        };
        return lookup(relative);
    }
    let mut scope = scope.to_string();
    loop {
        let candidate = if scope.is_empty() {
            type_name.to_string()
        } else {
            format!("{}.{}", scope, type_name)
        };
        if let Some(kind) = lookup(&candidate) {
            return Some(kind);
        }
        if scope.is_empty() {
            break;
        }
        scope = match scope.rfind('.') {
            Some(i) => scope[..i].to_string(),
            None => String::new(),
        };
    }
    // Package-qualified reference without the leading dot.
    package
        .and_then(|pkg| type_name.strip_prefix(pkg))
        .and_then(|r| r.strip_prefix('.'))
        .and_then(lookup)
}
