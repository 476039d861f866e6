//! Format a field tree for display (dump text, tree view rows).

use crate::tree::Node;
use crate::value::Value;

/// Value as shown in a dump: strings quoted, null as `<unset>`.
pub fn format_value(node: &Node) -> String {
    match &node.value {
        Value::Null => "<unset>".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Text(s) if node.field_type.wire_type(node.wire) == crate::wire::WireType::LengthDelimited => {
            format!("\"{}\"", s)
        }
        Value::Text(s) => s.clone(),
    }
}

/// One row for a tree view: `label [N]: type = value`, or `label [N]: Type {K}` for messages.
pub fn node_summary_line(node: &Node) -> String {
    let head = if node.field_num == 0 {
        format!("{}: {}", node.label(), node.field_type)
    } else {
        format!("{} [{}]: {}", node.label(), node.field_num, node.field_type)
    };
    if node.is_message() {
        format!("{} {{{}}}", head, node.children.len())
    } else {
        format!("{} = {}", head, format_value(node))
    }
}

/// Multi-line indented dump of `node` and its subtree.
pub fn node_to_dump(node: &Node, indent: usize) -> String {
    let mut lines = Vec::new();
    push_lines(node, indent, &mut lines);
    lines.join("\n")
}

fn push_lines(node: &Node, indent: usize, lines: &mut Vec<String>) {
    let pad = "  ".repeat(indent);
    if !node.is_message() {
        lines.push(format!("{}{}", pad, node_summary_line(node)));
        return;
    }
    let head = if node.field_num == 0 {
        format!("{}{}: {}", pad, node.label(), node.field_type)
    } else {
        format!("{}{} [{}]: {}", pad, node.label(), node.field_num, node.field_type)
    };
    if node.children.is_empty() {
        lines.push(format!("{} {{}}", head));
        return;
    }
    lines.push(format!("{} {{", head));
    for child in &node.children {
        push_lines(child, indent + 1, lines);
    }
    lines.push(format!("{}}}", pad));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarType;

    #[test]
    fn dump_indents_messages() {
        let mut root = Node::root();
        root.children.push(Node::scalar(1, ScalarType::String, Value::text("hi")).named("title"));
        root.children.push(Node::message(
            2,
            "message_1",
            vec![Node::scalar(1, ScalarType::Bool, Value::Bool(true))],
        ));
        root.children.push(Node::scalar(3, ScalarType::Int32, Value::Null));
        let text = node_to_dump(&root, 0);
        assert_eq!(
            text,
            "root: message {\n  title [1]: string = \"hi\"\n  field_2 [2]: message_1 {\n    field_1 [1]: bool = true\n  }\n  field_3 [3]: int32 = <unset>\n}"
        );
        assert_eq!(node_summary_line(&root.children[1]), "field_2 [2]: message_1 {1}");
    }
}
