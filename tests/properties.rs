//! Property tests over generated payloads and trees.

use proptest::prelude::*;
use protoedit::wire::{write_record, WireValue};
use protoedit::{
    apply_schema, decode, emit_schema, encode, to_json, wire_equivalent, Answer, EditOutcome, Editor, FieldType,
    Node, NodePath, Prompt, ScalarType, Value,
};
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum Rec {
    Varint(u64),
    Fixed32(u32),
    Fixed64(u64),
    Len(Vec<u8>),
    Nested(Vec<(u32, Rec)>),
}

fn write_all(out: &mut Vec<u8>, records: &[(u32, Rec)]) {
    for (field_num, rec) in records {
        let value = match rec {
            Rec::Varint(v) => WireValue::Varint(*v),
            Rec::Fixed32(v) => WireValue::Fixed32(*v),
            Rec::Fixed64(v) => WireValue::Fixed64(*v),
            Rec::Len(b) => WireValue::Len(b.clone()),
            Rec::Nested(inner) => {
                let mut body = Vec::new();
                write_all(&mut body, inner);
                WireValue::Len(body)
            }
        };
        write_record(out, *field_num, &value);
    }
}

fn arb_record() -> impl Strategy<Value = Rec> {
    let leaf = prop_oneof![
        any::<u64>().prop_map(Rec::Varint),
        (0u64..3).prop_map(Rec::Varint),
        any::<u32>().prop_map(Rec::Fixed32),
        any::<u64>().prop_map(Rec::Fixed64),
        prop::collection::vec(any::<u8>(), 0..12).prop_map(Rec::Len),
        "[a-z ]{0,12}".prop_map(|s| Rec::Len(s.into_bytes())),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop::collection::vec((1u32..6, inner), 0..6).prop_map(Rec::Nested)
    })
}

fn arb_payload() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec((1u32..6, arb_record()), 0..8).prop_map(|records| {
        let mut out = Vec::new();
        write_all(&mut out, &records);
        out
    })
}

fn arb_numeric() -> impl Strategy<Value = ScalarType> {
    prop::sample::select(
        ScalarType::ALL
            .iter()
            .copied()
            .filter(|st| st.is_numeric())
            .collect::<Vec<_>>(),
    )
}

fn arb_scalar() -> impl Strategy<Value = ScalarType> {
    prop::sample::select(ScalarType::ALL.to_vec())
}

fn check_idempotent(bytes: &[u8]) -> Result<(), TestCaseError> {
    let Ok(tree) = decode(bytes) else {
        return Ok(());
    };
    let encoded = encode(&tree).map_err(|e| TestCaseError::fail(e.to_string()))?;
    let again = decode(&encoded).map_err(|e| TestCaseError::fail(e.to_string()))?;
    prop_assert_eq!(again, tree);
    Ok(())
}

fn check_reapplies(tree: &Node) -> Result<(), TestCaseError> {
    let schema = emit_schema(tree);
    let mut applied = tree.clone();
    apply_schema(&mut applied, &schema).map_err(|e| TestCaseError::fail(format!("{e}\n{schema}")))?;
    prop_assert!(wire_equivalent(tree, &applied), "schema:\n{}", schema);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn decode_is_idempotent_on_generated_payloads(bytes in arb_payload()) {
        prop_assert!(decode(&bytes).is_ok());
        check_idempotent(&bytes)?;
    }

    #[test]
    fn decode_is_idempotent_on_raw_bytes(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        check_idempotent(&bytes)?;
    }

    #[test]
    fn emitted_schema_reapplies_as_a_no_op(bytes in arb_payload()) {
        let tree = decode(&bytes).expect("generated payloads decode");
        let schema = emit_schema(&tree);
        let mut applied = tree.clone();
        apply_schema(&mut applied, &schema).map_err(|e| TestCaseError::fail(format!("{e}\n{schema}")))?;
        prop_assert!(wire_equivalent(&tree, &applied), "schema:\n{}", schema);
        prop_assert_eq!(encode(&applied).expect("encode"), encode(&tree).expect("encode"));
    }

    #[test]
    fn emitted_schema_reapplies_after_renames(
        bytes in arb_payload(),
        renames in prop::collection::vec((any::<prop::sample::Index>(), "n_[a-z]{1,5}"), 1..5),
    ) {
        let mut editor = Editor::new(decode(&bytes).expect("generated payloads decode"));
        for (pick, name) in &renames {
            let fields: Vec<NodePath> = editor.root().preorder().into_iter().skip(1).map(|(p, _)| p).collect();
            if fields.is_empty() {
                break;
            }
            editor.rename(&fields[pick.index(fields.len())], name);
        }
        check_reapplies(editor.root())?;
    }

    #[test]
    fn emitted_schema_reapplies_after_type_changes(
        bytes in arb_payload(),
        changes in prop::collection::vec((any::<prop::sample::Index>(), arb_scalar()), 1..4),
    ) {
        let mut editor = Editor::new(decode(&bytes).expect("generated payloads decode"));
        let mut host = |_: &Prompt| Answer::yes();
        for (pick, new_type) in &changes {
            let leaves: Vec<NodePath> = editor
                .root()
                .preorder()
                .into_iter()
                .skip(1)
                .filter(|(_, n)| !n.is_message())
                .map(|(p, _)| p)
                .collect();
            if leaves.is_empty() {
                break;
            }
            editor.set_type_with(&leaves[pick.index(leaves.len())], FieldType::Scalar(*new_type), &mut host);
        }
        prop_assert!(editor.check_invariants().is_ok());
        check_reapplies(editor.root())?;
    }

    #[test]
    fn json_keys_follow_labels(bytes in arb_payload()) {
        let tree = decode(&bytes).expect("generated payloads decode");
        let json = to_json(Some(&tree)).expect("projection");
        let object = json.as_object().expect("root is an object");
        let mut counts: HashMap<String, usize> = HashMap::new();
        for child in &tree.children {
            *counts.entry(child.label().into_owned()).or_default() += 1;
        }
        prop_assert_eq!(object.len(), counts.len());
        for (label, count) in counts {
            let value = object.get(&label);
            prop_assert!(value.is_some(), "missing key {}", label);
            if count > 1 {
                prop_assert_eq!(value.and_then(|v| v.as_array()).map(Vec::len), Some(count));
            }
        }
    }

    #[test]
    fn bool_numeric_changes_are_seamless(bit in any::<bool>(), numeric in arb_numeric()) {
        let mut root = Node::root();
        root.children.push(Node::scalar(1, ScalarType::Bool, Value::Bool(bit)));
        let mut editor = Editor::new(root);
        let path = NodePath::new(vec![0]);
        prop_assert_eq!(editor.set_type(&path, FieldType::Scalar(numeric)), EditOutcome::Applied);
        let expected = Value::text(if bit { "1" } else { "0" });
        prop_assert_eq!(&editor.root().children[0].value, &expected);
        prop_assert_eq!(editor.set_type(&path, FieldType::Scalar(ScalarType::Bool)), EditOutcome::Applied);
        prop_assert_eq!(&editor.root().children[0].value, &Value::Bool(bit));
    }

    #[test]
    fn confirmed_type_changes_reach_every_instance(
        texts in prop::collection::vec("[a-z0-9]{0,4}", 2..5),
        target in any::<prop::sample::Index>(),
        new_type in arb_scalar(),
    ) {
        let mut root = Node::root();
        for (i, text) in texts.iter().enumerate() {
            let mut item = Node::message(i as u32 + 1, "Item", Vec::new());
            item.children.push(Node::scalar(5, ScalarType::String, Value::text(text.as_str())));
            item.children.push(Node::scalar(5, ScalarType::String, Value::text("x")));
            root.children.push(item);
        }
        let mut editor = Editor::new(root);
        let path = NodePath::new(vec![target.index(texts.len()), 0]);
        let mut host = |_: &Prompt| Answer::yes();
        let outcome = editor.set_type_with(&path, FieldType::Scalar(new_type), &mut host);
        prop_assert!(matches!(outcome, EditOutcome::Applied | EditOutcome::Unchanged));
        for item in &editor.root().children {
            for field in &item.children {
                prop_assert_eq!(&field.field_type, &FieldType::Scalar(new_type));
            }
        }
        prop_assert!(editor.check_invariants().is_ok());
    }
}
