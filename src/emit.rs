//! Schema emission: synthesize a schema that describes a tree.
//!
//! Message nodes are grouped into message declarations: the root is always its own group,
//! nodes sharing a non-placeholder type name share a group, and message children found under
//! one group at the same field number share a group. Groups whose bodies come out identical are
//! merged, and the survivors are numbered in depth-first order of first occurrence.

use crate::ast::{FieldDecl, Label, MessageDecl, Schema, Syntax};
use crate::tree::{Node, NodePath};
use crate::types::{is_identifier, FieldType, ScalarType};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::Write;
use tracing::debug;

/// Name of the emitted top-level message describing the root.
pub const ROOT_MESSAGE: &str = "Message";

/// Emitted name of the message declared for `message_<k>`.
pub fn message_name(k: u32) -> String {
    format!("{}{}", ROOT_MESSAGE, k)
}

/// A synthesized schema plus the synthetic type each non-root message node maps to.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub schema: Schema,
    pub assignments: Vec<(NodePath, u32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Decl {
    Scalar(ScalarType),
    /// Group id.
    Message(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BodyField {
    label: Label,
    decl: Decl,
    name: String,
    number: u32,
}

struct MergedField {
    number: u32,
    name: Option<String>,
    repeated: bool,
    decls: Vec<Decl>,
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Union keeping the smaller index as representative.
fn union(parent: &mut [usize], a: usize, b: usize) -> bool {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra == rb {
        return false;
    }
    parent[ra.max(rb)] = ra.min(rb);
    true
}

pub fn synthesize(root: &Node) -> Synthesis {
    // Index 0 is the root.
    let nodes: Vec<(NodePath, &Node)> = root
        .preorder()
        .into_iter()
        .filter(|(path, n)| path.is_root() || n.is_message())
        .collect();
    let index: HashMap<&NodePath, usize> = nodes.iter().enumerate().map(|(i, (p, _))| (p, i)).collect();
    let parent_of: Vec<Option<usize>> = nodes
        .iter()
        .map(|(p, _)| p.parent().and_then(|pp| index.get(&pp).copied()))
        .collect();

    let mut uf: Vec<usize> = (0..nodes.len()).collect();
    close_slots(&nodes, &parent_of, &mut uf);

    // Instances of one named type share a declaration unless they label its fields differently.
    let mut by_name: Vec<Vec<usize>> = Vec::new();
    let mut name_slot: HashMap<&str, usize> = HashMap::new();
    for (i, (_, n)) in nodes.iter().enumerate().skip(1) {
        if n.field_type.is_placeholder() {
            continue;
        }
        match name_slot.get(n.field_type.as_str()) {
            Some(&s) => by_name[s].push(i),
            None => {
                name_slot.insert(n.field_type.as_str(), by_name.len());
                by_name.push(vec![i]);
            }
        }
    }
    for members in &by_name {
        let first = members[0];
        let rep = find(&mut uf, first);
        if members.iter().all(|&m| find(&mut uf, m) == rep) {
            continue;
        }
        let mut trial = uf.clone();
        for &m in &members[1..] {
            union(&mut trial, first, m);
        }
        close_slots(&nodes, &parent_of, &mut trial);
        if names_agree(&nodes, &mut uf, &mut trial) {
            uf = trial;
        } else {
            debug!(
                type_name = nodes[first].1.field_type.as_str(),
                "instances label fields differently; declaring them apart"
            );
        }
    }

    // Dense group ids in order of first occurrence; the root gets 0.
    let mut gid_of_rep: HashMap<usize, usize> = HashMap::new();
    let mut gid = vec![0; nodes.len()];
    for i in 0..nodes.len() {
        let rep = find(&mut uf, i);
        let next = gid_of_rep.len();
        gid[i] = *gid_of_rep.entry(rep).or_insert(next);
    }
    let group_count = gid_of_rep.len();

    let mut instances: Vec<Vec<(&NodePath, &Node)>> = vec![Vec::new(); group_count];
    for (i, (p, n)) in nodes.iter().enumerate() {
        instances[gid[i]].push((p, *n));
    }
    let bodies: Vec<Vec<BodyField>> = instances
        .iter()
        .map(|members| group_body(members, |path| index.get(path).map(|&i| gid[i])))
        .collect();

    let canon = dedup_bodies(&bodies);
    let mut number_of: HashMap<usize, u32> = HashMap::new();
    for g in 1..group_count {
        let rep = canonical(&canon, g);
        let next = number_of.len() as u32 + 1;
        number_of.entry(rep).or_insert(next);
    }
    let type_name = |decl: Decl| -> String {
        match decl {
            Decl::Scalar(st) => st.keyword().to_string(),
            Decl::Message(g) => message_name(number_of.get(&canonical(&canon, g)).copied().unwrap_or(0)),
        }
    };
    let to_decl = |name: String, body: &[BodyField]| -> MessageDecl {
        let mut msg = MessageDecl::new(&name);
        msg.fields = body
            .iter()
            .map(|f| FieldDecl {
                label: f.label,
                type_name: type_name(f.decl),
                name: f.name.clone(),
                number: f.number as u64,
            })
            .collect();
        msg
    };

    let mut messages = vec![to_decl(ROOT_MESSAGE.to_string(), &bodies[0])];
    let mut emitted: Vec<(u32, usize)> = number_of.iter().map(|(&g, &k)| (k, g)).collect();
    emitted.sort_unstable();
    for (k, g) in emitted {
        messages.push(to_decl(message_name(k), &bodies[g]));
    }

    let assignments = nodes
        .iter()
        .enumerate()
        .skip(1)
        .filter_map(|(i, (p, _))| {
            number_of
                .get(&canonical(&canon, gid[i]))
                .map(|&k| ((*p).clone(), k))
        })
        .collect();

    Synthesis {
        schema: Schema {
            syntax: Syntax::Proto2,
            package: None,
            messages,
            enums: Vec::new(),
        },
        assignments,
    }
}

/// Children of one group at one field number share a group; repeated until nothing merges.
fn close_slots(nodes: &[(NodePath, &Node)], parent_of: &[Option<usize>], uf: &mut [usize]) {
    loop {
        let mut changed = false;
        let mut slots: HashMap<(usize, u32), usize> = HashMap::new();
        for i in 1..nodes.len() {
            let Some(p) = parent_of[i] else { continue };
            let key = (find(uf, p), nodes[i].1.field_num);
            match slots.get(&key) {
                Some(&other) => changed |= union(uf, other, i),
                None => {
                    slots.insert(key, i);
                }
            }
        }
        if !changed {
            return;
        }
    }
}

/// Name a field is declared with: the node's name when it is an identifier.
fn field_name(node: &Node) -> String {
    if is_identifier(&node.name) {
        node.name.clone()
    } else {
        format!("field_{}", node.field_num)
    }
}

/// True when no group of `after` joins groups of `before` that name one field number
/// differently, or give one name to different field numbers.
fn names_agree(nodes: &[(NodePath, &Node)], before: &mut [usize], after: &mut [usize]) -> bool {
    let mut names: HashMap<usize, BTreeMap<u32, BTreeSet<String>>> = HashMap::new();
    let mut parts: HashMap<usize, BTreeSet<usize>> = HashMap::new();
    for (i, (_, node)) in nodes.iter().enumerate() {
        let b = find(before, i);
        parts.entry(find(after, i)).or_default().insert(b);
        let body = names.entry(b).or_default();
        for child in &node.children {
            body.entry(child.field_num).or_default().insert(field_name(child));
        }
    }
    parts.values().filter(|p| p.len() > 1).all(|joined| {
        let mut by_num: HashMap<u32, &BTreeSet<String>> = HashMap::new();
        let mut by_name: HashMap<&str, u32> = HashMap::new();
        for b in joined {
            let Some(body) = names.get(b) else { continue };
            for (num, labels) in body {
                if by_num.get(num).is_some_and(|seen| *seen != labels) {
                    return false;
                }
                if labels.iter().any(|l| by_name.get(l.as_str()).is_some_and(|n| n != num)) {
                    return false;
                }
            }
            for (num, labels) in body {
                by_num.insert(*num, labels);
                for l in labels {
                    by_name.insert(l.as_str(), *num);
                }
            }
        }
        true
    })
}

fn group_body<'a, F>(instances: &[(&'a NodePath, &'a Node)], group_of: F) -> Vec<BodyField>
where
    F: Fn(&NodePath) -> Option<usize>,
{
    let mut merged: Vec<MergedField> = Vec::new();
    let mut slot: HashMap<u32, usize> = HashMap::new();
    for (path, node) in instances {
        let mut counts: HashMap<u32, usize> = HashMap::new();
        for (ci, child) in node.children.iter().enumerate() {
            *counts.entry(child.field_num).or_default() += 1;
            let decl = if child.is_message() {
                match group_of(&path.child(ci)) {
                    Some(g) => Decl::Message(g),
                    None => Decl::Scalar(ScalarType::Bytes),
                }
            } else {
                Decl::Scalar(
                    child
                        .field_type
                        .canonical_scalar(child.wire)
                        .unwrap_or(ScalarType::Bytes),
                )
            };
            let name = Some(child.name.clone()).filter(|n| is_identifier(n));
            match slot.get(&child.field_num) {
                Some(&s) => {
                    let m = &mut merged[s];
                    if !m.decls.contains(&decl) {
                        m.decls.push(decl);
                    }
                    if m.name.is_none() {
                        m.name = name;
                    }
                }
                None => {
                    slot.insert(child.field_num, merged.len());
                    merged.push(MergedField {
                        number: child.field_num,
                        name,
                        repeated: false,
                        decls: vec![decl],
                    });
                }
            }
        }
        for (num, count) in counts {
            match slot.get(&num) {
                Some(&s) if count > 1 => merged[s].repeated = true,
                _ => {}
            }
        }
    }

    let mut used: HashSet<String> = HashSet::new();
    merged
        .into_iter()
        .map(|m| {
            let base = m.name.unwrap_or_else(|| format!("field_{}", m.number));
            let mut name = base.clone();
            let mut n = 2;
            while used.contains(&name) {
                name = format!("{}_{}", base, n);
                n += 1;
            }
            used.insert(name.clone());
            BodyField {
                label: if m.repeated { Label::Repeated } else { Label::Optional },
                decl: widen(&m.decls),
                name,
                number: m.number,
            }
        })
        .collect()
}

/// Pick one declaration for a field whose instances disagree.
fn widen(decls: &[Decl]) -> Decl {
    let first = decls[0];
    if decls.len() == 1 {
        return first;
    }
    let scalars: Vec<ScalarType> = decls
        .iter()
        .filter_map(|d| match d {
            Decl::Scalar(st) => Some(*st),
            Decl::Message(_) => None,
        })
        .collect();
    if scalars.len() != decls.len() {
        return Decl::Scalar(ScalarType::Bytes);
    }
    let class = scalars[0].wire_type();
    if scalars.iter().any(|st| st.wire_type() != class) {
        return first;
    }
    match class {
        crate::wire::WireType::Varint => {
            let unsigned = scalars.iter().any(|st| st.is_unsigned_integer());
            let signed = scalars.iter().any(|st| st.is_signed_integer());
            Decl::Scalar(if unsigned && !signed {
                ScalarType::Uint64
            } else {
                ScalarType::Int64
            })
        }
        crate::wire::WireType::LengthDelimited => Decl::Scalar(ScalarType::Bytes),
        _ => first,
    }
}

/// Merge groups with identical bodies until nothing changes; returns a redirect table.
fn dedup_bodies(bodies: &[Vec<BodyField>]) -> Vec<usize> {
    let mut canon: Vec<usize> = (0..bodies.len()).collect();
    loop {
        let mut changed = false;
        let mut seen: HashMap<Vec<BodyField>, usize> = HashMap::new();
        for g in 1..bodies.len() {
            if canon[g] != g {
                continue;
            }
            let key: Vec<BodyField> = bodies[g]
                .iter()
                .map(|f| BodyField {
                    decl: match f.decl {
                        Decl::Message(m) => Decl::Message(canonical(&canon, m)),
                        d => d,
                    },
                    ..f.clone()
                })
                .collect();
            match seen.get(&key) {
                Some(&first) => {
                    canon[g] = first;
                    changed = true;
                }
                None => {
                    seen.insert(key, g);
                }
            }
        }
        if !changed {
            return canon;
        }
    }
}

fn canonical(canon: &[usize], mut g: usize) -> usize {
    while canon[g] != g {
        g = canon[g];
    }
    g
}

/// Emit the schema text describing `root`.
pub fn emit_schema(root: &Node) -> String {
    render(&synthesize(root).schema)
}

/// Rewrite every non-root message node's type to its synthetic `message_<k>` name.
pub fn normalize_message_types(root: &mut Node) {
    for (path, k) in synthesize(root).assignments {
        if let Some(node) = root.get_mut(&path) {
            node.field_type = FieldType::synthetic(k);
        }
    }
}

/// Render a schema as text.
pub fn render(schema: &Schema) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "syntax = \"{}\";", schema.syntax.as_str());
    if let Some(pkg) = &schema.package {
        let _ = writeln!(out, "\npackage {};", pkg);
    }
    for e in &schema.enums {
        out.push('\n');
        render_enum(&mut out, e, 0);
    }
    for m in &schema.messages {
        out.push('\n');
        render_message(&mut out, m, 0);
    }
    out
}

fn render_message(out: &mut String, m: &MessageDecl, depth: usize) {
    let pad = "  ".repeat(depth);
    let _ = writeln!(out, "{}message {} {{", pad, m.name);
    for e in &m.enums {
        render_enum(out, e, depth + 1);
    }
    for nested in &m.nested {
        render_message(out, nested, depth + 1);
    }
    for f in &m.fields {
        let label = f.label.keyword().map(|k| format!("{} ", k)).unwrap_or_default();
        let _ = writeln!(out, "{}  {}{} {} = {};", pad, label, f.type_name, f.name, f.number);
    }
    let _ = writeln!(out, "{}}}", pad);
}

fn render_enum(out: &mut String, e: &crate::ast::EnumDecl, depth: usize) {
    let pad = "  ".repeat(depth);
    let _ = writeln!(out, "{}enum {} {{", pad, e.name);
    for (name, value) in &e.values {
        let _ = writeln!(out, "{}  {} = {};", pad, name, value);
    }
    let _ = writeln!(out, "{}}}", pad);
}
