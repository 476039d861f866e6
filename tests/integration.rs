//! Integration tests: decode, encode, emit and apply end to end, plus wire-format boundary cases.

use protoedit::wire::{write_record, WireValue};
use protoedit::{
    apply_schema, decode, emit_schema, encode, to_json, wire_equivalent, Answer, EditOutcome, Editor, FieldType,
    Node, NodePath, Prompt, ScalarType, SchemaApplyError, Value,
};
use serde_json::json;

fn record(out: &mut Vec<u8>, field_num: u32, value: WireValue) {
    write_record(out, field_num, &value);
}

fn text(out: &mut Vec<u8>, field_num: u32, s: &str) {
    record(out, field_num, WireValue::Len(s.as_bytes().to_vec()));
}

fn person_bytes() -> Vec<u8> {
    let mut address = Vec::new();
    text(&mut address, 1, "123 Main St");
    text(&mut address, 2, "New York");
    text(&mut address, 3, "USA");
    record(&mut address, 4, WireValue::Varint(10001));

    let mut out = Vec::new();
    text(&mut out, 1, "John Doe");
    record(&mut out, 2, WireValue::Varint(30));
    text(&mut out, 3, "john@example.com");
    record(&mut out, 4, WireValue::Len(address));
    text(&mut out, 5, "reading");
    text(&mut out, 5, "coding");
    out
}

#[test]
fn test_simple_round_trip() {
    let mut bytes = Vec::new();
    text(&mut bytes, 1, "Hello, World!");
    record(&mut bytes, 2, WireValue::Varint(42));
    record(&mut bytes, 3, WireValue::Varint(1));

    let root = decode(&bytes).expect("decode");
    let nums: Vec<u32> = root.children.iter().map(|c| c.field_num).collect();
    assert_eq!(nums, vec![1, 2, 3]);
    assert_eq!(root.children[0].field_type, FieldType::Scalar(ScalarType::String));
    assert_eq!(root.children[0].value, Value::text("Hello, World!"));
    assert_eq!(root.children[1].field_type, FieldType::Number);
    assert_eq!(root.children[1].value, Value::text("42"));
    assert_eq!(root.children[2].field_type, FieldType::Scalar(ScalarType::Bool));
    assert_eq!(root.children[2].value, Value::Bool(true));

    let encoded = encode(&root).expect("encode");
    assert_eq!(encoded, bytes);
    assert_eq!(decode(&encoded).expect("decode again"), root);
}

#[test]
fn test_nested_message() {
    let root = decode(&person_bytes()).expect("decode");
    assert_eq!(root.children.len(), 6);
    let address = &root.children[3];
    assert_eq!(address.field_num, 4);
    assert!(address.is_message());
    assert_eq!(address.children.len(), 4);
    assert!(address.children.iter().all(|c| !c.is_message()));
    assert_eq!(address.children[3].value, Value::text("10001"));

    let hobbies: Vec<&Node> = root.children.iter().filter(|c| c.field_num == 5).collect();
    assert_eq!(hobbies.len(), 2);
    assert!(hobbies
        .iter()
        .all(|h| h.field_type == FieldType::Scalar(ScalarType::String) && h.is_repeated));

    let encoded = encode(&root).expect("encode");
    assert_eq!(encoded, person_bytes());
}

#[test]
fn test_required_missing() {
    let mut bytes = Vec::new();
    text(&mut bytes, 1, "x");
    let mut root = decode(&bytes).expect("decode");
    let before = root.clone();
    let err = apply_schema(
        &mut root,
        r#"syntax = "proto2"; message M { optional string name = 1; required int32 age = 2; }"#,
    )
    .expect_err("age is required");
    assert!(matches!(err, SchemaApplyError::MissingRequired { .. }));
    assert!(err.to_string().contains("missing required field"));
    assert_eq!(root, before);
}

#[test]
fn test_type_promotion() {
    let mut root = Node::root();
    root.children.push(Node::scalar(3, ScalarType::String, Value::text("old_value")));
    let mut editor = Editor::new(root);
    let path = NodePath::new(vec![0]);
    let outcome = editor.set_type(&path, FieldType::synthetic(1));
    assert_eq!(outcome, EditOutcome::Applied);
    let node = &editor.root().children[0];
    assert!(node.field_type.synthetic_index().is_some());
    assert!(node.children.is_empty());
    assert_eq!(node.value, Value::Null);
    editor.check_invariants().expect("invariants");
}

#[test]
fn test_duplicate_synthesized_name() {
    let mut bytes = Vec::new();
    for (num, street) in [(1, "Elm"), (2, "Oak")] {
        let mut inner = Vec::new();
        text(&mut inner, 1, street);
        record(&mut inner, 2, WireValue::Varint(12));
        record(&mut bytes, num, WireValue::Len(inner));
    }
    let root = decode(&bytes).expect("decode");
    assert!(root.children.iter().all(Node::is_message));
    let schema = emit_schema(&root);
    assert_eq!(schema.matches("message Message1 {").count(), 1);
    assert!(!schema.contains("Message2"));
    assert_eq!(schema.matches("optional Message1 ").count(), 2);
}

#[test]
fn test_structural_propagation() {
    let mut root = Node::root();
    for num in [1, 2] {
        root.children.push(Node::message(
            num,
            "message_1",
            vec![Node::scalar(5, ScalarType::String, Value::text("a"))],
        ));
    }
    let mut editor = Editor::new(root);
    let first = NodePath::new(vec![0, 0]);
    let outcome = editor.set_type(&first, FieldType::Scalar(ScalarType::Int32));
    assert!(matches!(outcome, EditOutcome::Confirm(Prompt::TypeChange { .. })));
    let outcome = editor.respond(Answer::yes());
    assert!(matches!(outcome, EditOutcome::Confirm(Prompt::Propagation { count: 1, .. })));
    assert_eq!(editor.respond(Answer::yes()), EditOutcome::Applied);
    for message in &editor.root().children {
        assert_eq!(message.children[0].field_type, FieldType::Scalar(ScalarType::Int32));
        assert_eq!(message.children[0].value, Value::Null);
    }
    editor.check_invariants().expect("invariants");
}

#[test]
fn test_schema_projection_and_reencode() {
    let mut root = decode(&person_bytes()).expect("decode");
    apply_schema(
        &mut root,
        r#"
        syntax = "proto2";
        message Person {
          optional string name = 1;
          optional int32 age = 2;
          optional string email = 3;
          optional Address address = 4;
          repeated string hobbies = 5;
        }
        message Address {
          optional string street = 1;
          optional string city = 2;
          optional string country = 3;
          optional uint32 zip_code = 4;
        }
        "#,
    )
    .expect("apply");
    let json = to_json(Some(&root)).expect("json");
    assert_eq!(
        json,
        json!({
            "name": "John Doe",
            "age": "30",
            "email": "john@example.com",
            "address": {"street": "123 Main St", "city": "New York", "country": "USA", "zip_code": "10001"},
            "hobbies": ["reading", "coding"],
        })
    );
    assert_eq!(root.children[3].field_type, FieldType::Message("Address".into()));
    assert_eq!(encode(&root).expect("encode"), person_bytes());
}

#[test]
fn test_empty_buffer() {
    let root = decode(&[]).expect("decode");
    assert!(root.children.is_empty());
    assert_eq!(root.name, "root");
    assert_eq!(encode(&root).expect("encode"), Vec::<u8>::new());
}

#[test]
fn test_single_zero_byte_payload_is_string() {
    let mut bytes = Vec::new();
    record(&mut bytes, 1, WireValue::Len(vec![0x00]));
    let root = decode(&bytes).expect("decode");
    assert_eq!(root.children[0].field_type, FieldType::Scalar(ScalarType::String));
    assert_eq!(root.children[0].value, Value::text("\0"));
}

#[test]
fn test_uint64_max_round_trips() {
    let mut bytes = Vec::new();
    record(&mut bytes, 1, WireValue::Varint(u64::MAX));
    let mut root = decode(&bytes).expect("decode");
    assert_eq!(root.children[0].value, Value::text("18446744073709551615"));
    assert_eq!(encode(&root).expect("encode"), bytes);
    apply_schema(&mut root, "message M { optional uint64 big = 1; }").expect("apply");
    assert_eq!(root.children[0].value, Value::text("18446744073709551615"));
    assert_eq!(encode(&root).expect("encode"), bytes);
}

#[test]
fn test_single_occurrence_emits_optional() {
    let mut bytes = Vec::new();
    text(&mut bytes, 7, "only");
    let mut root = decode(&bytes).expect("decode");
    root.children[0].is_repeated = true;
    let schema = emit_schema(&root);
    assert!(schema.contains("optional string field_7 = 7;"));
    assert!(!schema.contains("repeated"));
}

#[test]
fn test_emitted_schema_reapplies_cleanly() {
    let mut root = decode(&person_bytes()).expect("decode");
    let original = root.clone();
    let schema = emit_schema(&root);
    apply_schema(&mut root, &schema).expect("apply emitted schema");
    assert!(protoedit::wire_equivalent(&original, &root));
    assert_eq!(encode(&root).expect("encode"), person_bytes());
}

#[test]
fn test_file_round_trip_with_schema_on_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("person.bin");
    let schema_path = dir.path().join("person.proto");
    let output = dir.path().join("person.out.bin");
    std::fs::write(&input, person_bytes()).expect("write input");

    let root = decode(&std::fs::read(&input).expect("read input")).expect("decode");
    std::fs::write(&schema_path, emit_schema(&root)).expect("write schema");

    let mut root = decode(&std::fs::read(&input).expect("read input")).expect("decode");
    let source = std::fs::read_to_string(&schema_path).expect("read schema");
    apply_schema(&mut root, &source).expect("apply");
    std::fs::write(&output, encode(&root).expect("encode")).expect("write output");
    assert_eq!(std::fs::read(&output).expect("read output"), person_bytes());
}

#[test]
fn test_wide_and_long_payloads() {
    let mut bytes = Vec::new();
    for i in 0..20_000u64 {
        record(&mut bytes, 1, WireValue::Varint(1_000 + i));
    }
    for n in 2..2_002u32 {
        record(&mut bytes, n, WireValue::Varint(u64::from(n) * 3));
    }
    let tree = decode(&bytes).expect("decode");
    assert_eq!(tree.children.len(), 22_000);
    assert!(tree.children[..20_000].iter().all(|c| c.is_repeated));
    assert!(tree.children[20_000..].iter().all(|c| !c.is_repeated));

    let schema = emit_schema(&tree);
    let line = |suffix: &str| schema.lines().find(|l| l.ends_with(suffix)).map(str::trim_start);
    assert!(line(" field_1 = 1;").is_some_and(|l| l.starts_with("repeated ")));
    assert!(line(" field_2001 = 2001;").is_some_and(|l| l.starts_with("optional ")));
    assert_eq!(schema.matches(" field_").count(), 2_001);

    let mut applied = tree.clone();
    apply_schema(&mut applied, &schema).expect("apply");
    assert!(wire_equivalent(&tree, &applied));
}
