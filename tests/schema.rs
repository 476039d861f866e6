//! Schema tests: dialect parsing, name resolution, and projection onto decoded trees.

use protoedit::ast::{FieldKind, Label, Syntax};
use protoedit::wire::{write_record, zigzag_encode, WireValue};
use protoedit::{
    apply_schema, apply_schema_as, decode, encode, parse, parse_resolved, FieldType, ScalarType,
    SchemaApplyError, SchemaParseError, Value,
};

const FULL_DIALECT: &str = r#"
// Account records.
syntax = "proto3";

package acme.accounts;

import "google/protobuf/timestamp.proto";
option java_package = "com.acme.accounts";

/* Top-level enum. */
enum Status {
  option allow_alias = true;
  UNKNOWN = 0;
  ACTIVE = 1;
  SUSPENDED = -1;
}

message Account {
  reserved 9, 12 to 15;
  reserved "legacy";
  string owner = 1 [json_name = "ownerName"];
  Status status = 2;
  repeated Entry entries = 3;
  .acme.accounts.Account.Limits limits = 4;
  oneof contact {
    string email = 5;
    string phone = 6;
  }
  map_like = 7;

  message Entry {
    sint64 delta = 1;
    optional fixed32 code = 2 [packed = false, default = 7];
  }

  message Limits {
    uint64 daily = 1;
    Entry last = 2;
  }
}
"#;

fn record(out: &mut Vec<u8>, field_num: u32, value: WireValue) {
    write_record(out, field_num, &value);
}

#[test]
fn test_full_dialect_rejects_field_without_type() {
    let err = parse(FULL_DIALECT).expect_err("`map_like = 7;` has no type");
    assert!(matches!(err, SchemaParseError::Syntax { .. }));
}

#[test]
fn test_full_dialect_parses_and_resolves() {
    let source = FULL_DIALECT.replace("  map_like = 7;\n", "");
    let schema = parse(&source).expect("parse");
    assert_eq!(schema.syntax, Syntax::Proto3);
    assert_eq!(schema.package.as_deref(), Some("acme.accounts"));
    assert_eq!(schema.enums.len(), 1);
    assert_eq!(schema.enums[0].values[2], ("SUSPENDED".to_string(), -1));

    let account = &schema.messages[0];
    assert_eq!(account.name, "Account");
    assert_eq!(account.nested.len(), 2);
    let names: Vec<&str> = account.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["owner", "status", "entries", "limits", "email", "phone"]);
    assert_eq!(account.fields[0].label, Label::Implicit);
    assert_eq!(account.fields[2].label, Label::Repeated);

    let resolved = parse_resolved(&source).expect("resolve");
    let root = resolved.root_message().expect("root");
    assert_eq!(resolved.message(root).full_name, "Account");
    let entry = resolved.get_message("Account.Entry").expect("entry");
    assert_eq!(resolved.get_message(".acme.accounts.Account.Entry"), Some(entry));
    assert_eq!(resolved.get_message("Entry"), Some(entry));
    let limits = resolved.get_message("Limits").expect("limits");
    assert!(matches!(resolved.message(limits).fields[1].kind, FieldKind::Message(i) if i == entry));
    assert!(matches!(resolved.message(root).fields[1].kind, FieldKind::Enum));
}

#[test]
fn test_resolution_errors() {
    assert!(matches!(
        parse_resolved("message M { optional Missing x = 1; }"),
        Err(SchemaParseError::UnresolvedType { .. })
    ));
    assert!(matches!(
        parse_resolved("message M { optional int32 a = 1; optional int32 b = 1; }"),
        Err(SchemaParseError::DuplicateFieldNumber { number: 1, .. })
    ));
    assert!(matches!(
        parse_resolved("message M { optional int32 a = 0; }"),
        Err(SchemaParseError::InvalidFieldNumber { number: 0, .. })
    ));
    assert!(matches!(
        parse_resolved("message M { optional int32 a = 536870912; }"),
        Err(SchemaParseError::InvalidFieldNumber { .. })
    ));
    assert!(matches!(
        parse_resolved("message M {} message M {}"),
        Err(SchemaParseError::DuplicateMessage(_))
    ));
    assert!(matches!(
        parse(r#"syntax = "proto4"; message M {}"#),
        Err(SchemaParseError::UnsupportedSyntax(_))
    ));
}

#[test]
fn test_syntax_error_position() {
    let err = parse("message M {\n  optional int32 x = ;\n}").expect_err("missing number");
    match err {
        SchemaParseError::Syntax { line, column, .. } => {
            assert_eq!(line, 2);
            assert!(column > 1);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_apply_reinterprets_varints() {
    let mut bytes = Vec::new();
    record(&mut bytes, 1, WireValue::Varint(300));
    record(&mut bytes, 2, WireValue::Varint(zigzag_encode(-5)));
    record(&mut bytes, 3, WireValue::Varint(1));
    record(&mut bytes, 4, WireValue::Fixed64(u64::MAX));
    let mut root = decode(&bytes).expect("decode");
    apply_schema(
        &mut root,
        r#"
        message M {
          optional uint32 a = 1;
          optional sint64 b = 2;
          optional bool c = 3;
          optional sfixed64 d = 4;
        }
        "#,
    )
    .expect("apply");
    let values: Vec<Value> = root.children.iter().map(|c| c.value.clone()).collect();
    assert_eq!(
        values,
        vec![Value::text("300"), Value::text("-5"), Value::Bool(true), Value::text("-1")]
    );
    assert_eq!(root.children[0].field_type, FieldType::Scalar(ScalarType::Uint32));
    assert_eq!(encode(&root).expect("encode"), bytes);
}

#[test]
fn test_apply_int32_sign_extended() {
    let mut bytes = Vec::new();
    record(&mut bytes, 1, WireValue::Varint(u64::MAX));
    let mut root = decode(&bytes).expect("decode");
    apply_schema(&mut root, "message M { optional int32 a = 1; }").expect("apply");
    assert_eq!(root.children[0].value, Value::text("-1"));
    assert_eq!(encode(&root).expect("encode"), bytes);
}

#[test]
fn test_apply_switches_between_message_and_text() {
    // "hi" happens to parse as field 13 = 105.
    let mut bytes = Vec::new();
    record(&mut bytes, 1, WireValue::Len(b"hi".to_vec()));
    record(&mut bytes, 2, WireValue::Len(Vec::new()));
    let mut root = decode(&bytes).expect("decode");
    assert!(root.children[0].is_message());
    assert_eq!(root.children[1].value, Value::text(""));

    apply_schema(
        &mut root,
        "message M { optional string greeting = 1; optional Inner inner = 2; } message Inner { optional int32 x = 1; }",
    )
    .expect("apply");
    assert_eq!(root.children[0].value, Value::text("hi"));
    assert!(root.children[0].children.is_empty());
    assert_eq!(root.children[1].field_type, FieldType::Message("Inner".into()));
    assert!(root.children[1].children.is_empty());
    assert_eq!(encode(&root).expect("encode"), bytes);
}

#[test]
fn test_cross_class_declaration_is_rejected() {
    let mut bytes = Vec::new();
    record(&mut bytes, 1, WireValue::Varint(300));
    let mut root = decode(&bytes).expect("decode");
    let before = root.clone();
    let err = apply_schema(&mut root, "message M { optional string s = 1; }").expect_err("varint as string");
    assert!(matches!(err, SchemaApplyError::IncompatibleType { ref declared, .. } if declared == "string"));
    assert_eq!(root, before);
}

#[test]
fn test_apply_schema_as_and_nested_required() {
    let mut inner = Vec::new();
    record(&mut inner, 1, WireValue::Varint(7));
    let mut bytes = Vec::new();
    record(&mut bytes, 3, WireValue::Len(inner));
    record(&mut bytes, 9, WireValue::Varint(2));

    let schema = r#"
        message Wrapper { optional Payload payload = 3; }
        message Payload { required uint32 id = 1; required string label = 2; }
    "#;
    let nested = r#"
        message Alt { optional Payload.Detail detail = 3; }
        message Payload { message Detail { optional uint32 id = 1; } }
    "#;

    let mut root = decode(&bytes).expect("decode");
    let err = apply_schema_as(&mut root, schema, "Wrapper").expect_err("label missing");
    assert!(matches!(err, SchemaApplyError::MissingRequired { ref name, .. } if name == "label"));

    let err = apply_schema_as(&mut root, nested, "Nope").expect_err("no such message");
    assert!(matches!(err, SchemaApplyError::Parse(SchemaParseError::UnknownMessage(_))));

    apply_schema_as(&mut root, nested, "Alt").expect("apply");
    let detail = &root.children[0];
    assert_eq!(detail.name, "detail");
    assert_eq!(detail.field_type, FieldType::Message("Detail".into()));
    assert_eq!(detail.children[0].name, "id");
    assert_eq!(detail.children[0].value, Value::text("7"));
    // Undeclared fields keep their decoded form.
    assert_eq!(root.children[1].name, "");
    assert_eq!(root.children[1].field_type, FieldType::Number);
}

#[test]
fn test_repeated_label_and_enum_fields() {
    let mut bytes = Vec::new();
    record(&mut bytes, 1, WireValue::Varint(2));
    record(&mut bytes, 2, WireValue::Len(b"only".to_vec()));
    let mut root = decode(&bytes).expect("decode");
    apply_schema(
        &mut root,
        "enum Color { RED = 0; GREEN = 2; } message M { optional Color color = 1; repeated string tags = 2; }",
    )
    .expect("apply");
    assert_eq!(root.children[0].field_type, FieldType::Scalar(ScalarType::Int32));
    assert_eq!(root.children[0].value, Value::text("2"));
    assert!(root.children[1].is_repeated);
}

#[test]
fn test_instances_of_declared_type_are_harmonized() {
    // Field 5 is 0 in one instance and 9 in the other: bool and number before the schema.
    let mut a = Vec::new();
    record(&mut a, 5, WireValue::Varint(0));
    let mut b = Vec::new();
    record(&mut b, 5, WireValue::Varint(9));
    let mut bytes = Vec::new();
    record(&mut bytes, 1, WireValue::Len(a));
    record(&mut bytes, 2, WireValue::Len(b));
    let mut root = decode(&bytes).expect("decode");
    assert_eq!(root.children[0].children[0].field_type, FieldType::Scalar(ScalarType::Bool));

    apply_schema(
        &mut root,
        "message M { optional Item x = 1; optional Item y = 2; } message Item { }",
    )
    .expect("apply");
    let types: Vec<&FieldType> = root.children.iter().map(|c| &c.children[0].field_type).collect();
    assert_eq!(types, [&FieldType::Number, &FieldType::Number]);
    root.check_invariants().expect("invariants");
    assert_eq!(encode(&root).expect("encode"), bytes);
}
