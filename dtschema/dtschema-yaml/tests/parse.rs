mod test_helpers;

use dtschema_core::{SchemaError, Value};
use dtschema_fabric::{
    Decoder,
    ast::{LiteralValue, MemberType, SizeDecl, TypeDeclKind},
};
use dtschema_yaml::{load_format, parse_format};
use pretty_assertions::assert_eq;
use test_helpers::*;

const ARCHIVE: &str = r#"
name: archive
type: format
description: Simple archive with little-endian entry headers
urls: ["https://example.com/archive-format"]
metadata:
  authors: ['Test Author']
  year: 2024
---
name: byte
type: integer
attributes:
  format: unsigned
  size: 1
  units: bytes
---
name: uint16
type: integer
attributes:
  format: unsigned
  size: 2
  units: bytes
---
name: uint32
type: integer
attributes:
  format: unsigned
  size: 4
  units: bytes
---
name: entry_header
type: structure
description: Entry header
attributes:
  byte_order: little-endian
members:
- name: signature
  type: stream
  element_data_type: byte
  number_of_elements: 2
  value: "\xc7\x71"
- name: name_size
  data_type: uint16
- name: file_size
  data_type: uint32
- name: path
  type: string
  encoding: ascii
  element_data_type: byte
  elements_data_size: entry_header.name_size
  elements_terminator: "\x00"
- name: alignment_padding
  type: padding
  alignment_size: 4
"#;

#[test]
fn format_document_names_the_format() {
    let format = parse_format("defs/archive.yaml", ARCHIVE).expect("parse");
    assert_eq!(format.name, "archive");
    assert_eq!(
        format.description.as_deref(),
        Some("Simple archive with little-endian entry headers")
    );
    assert_eq!(format.definitions.len(), 4);

    let TypeDeclKind::Structure(header) = &format.definitions[3].kind else {
        panic!("entry_header should be a structure");
    };
    assert_eq!(header.members.len(), 5);
    assert_eq!(header.members[0].value, Some(LiteralValue::Text("\u{c7}q".to_string())));
    let MemberType::Inline(path) = &header.members[3].ty else {
        panic!("path should be declared inline");
    };
    let TypeDeclKind::String(path) = path.as_ref() else {
        panic!("path should be a string");
    };
    assert_eq!(path.encoding, "ascii");
    assert_eq!(path.sequence.elements_terminator, Some(vec![0]));
    assert_eq!(
        path.sequence.elements_data_size,
        Some(SizeDecl::Expression("entry_header.name_size".to_string()))
    );
}

#[test]
fn loaded_format_decodes() {
    let schema = load_format("archive.yaml", ARCHIVE).expect("load");
    let root = schema.record_type("entry_header").expect("record type");
    let data = [0xC7u8, 0x71, 4, 0, 5, 0, 0, 0, b'a', b'b', b'c', 0, 0xEE];

    let record = Decoder::new(&schema).decode(root, &data, 0, None).expect("decode");
    assert_eq!(record.byte_size(), 12);
    assert_eq!(record.get("signature"), Some(&Value::bytes([0xC7u8, 0x71])));
    assert_eq!(record.get("name_size"), Some(&Value::U16(4)));
    assert_eq!(record.get("file_size"), Some(&Value::U32(5)));
    assert_eq!(record.get("path"), Some(&Value::string("abc")));
    assert!(!record.contains("alignment_padding"));
}

#[test]
fn signature_mismatch_is_a_constraint_violation() {
    let schema = load_format("archive.yaml", ARCHIVE).expect("load");
    let root = schema.record_type("entry_header").expect("record type");
    let data = [0x71u8, 0xC7, 4, 0, 5, 0, 0, 0, b'a', b'b', b'c', 0];

    let err = Decoder::new(&schema)
        .decode(root, &data, 0, None)
        .expect_err("byte-swapped signature");
    assert_eq!(err.path(), "entry_header.signature");
    assert_eq!(err.offset(), 0);
}

#[test]
fn format_name_defaults_to_file_stem() {
    let format = parse_format("defs/leveldb.yaml", PRIMITIVES).expect("parse");
    assert_eq!(format.name, "leveldb");
    assert_eq!(format.description, None);
    assert_eq!(format.definitions.len(), 3);
}

#[test]
fn empty_documents_are_skipped() {
    let text = format!("---\n{PRIMITIVES}---\n");
    let format = parse_format("primitives.yaml", &text).expect("parse");
    assert_eq!(format.definitions.len(), 3);
}

#[test]
fn groups_enumerations_and_constants() {
    let text = with_primitives(
        r#"
name: record_kind
type: enumeration
values:
- name: TEXT
  number: 1
  description: Text record
- name: BINARY
  number: 2
---
name: maximum_size
type: constant
value: 16
---
name: record_base
type: structure
attributes:
  byte_order: big-endian
members:
- name: kind
  data_type: uint16
---
name: text_record
type: structure
attributes:
  byte_order: big-endian
members:
- name: kind
  data_type: uint16
  value: 1
- name: size
  data_type: byte
  values: [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]
- name: text
  type: string
  encoding: utf8
  element_data_type: byte
  elements_data_size: size
---
name: binary_record
type: structure
attributes:
  byte_order: big-endian
members:
- name: kind
  data_type: uint16
  value: 2
- name: data
  type: stream
  element_data_type: byte
  number_of_elements: 4
---
name: record
type: structure-group
base: record_base
identifier: kind
members:
- text_record
- binary_record
"#,
    );
    let schema = load_format("records.yaml", &text).expect("load");
    assert_eq!(schema.constant("maximum_size"), Some(16));
    let kinds = schema.enumeration("record_kind").expect("enumeration");
    assert_eq!(kinds.value_of("BINARY"), Some(2));
    assert_eq!(kinds.name_of(1), Some("TEXT"));

    let root = schema.record_type("record").expect("record type");
    let decoder = Decoder::new(&schema);

    let text_record = decoder
        .decode(root, &[0u8, 1, 2, b'h', b'i'], 0, None)
        .expect("text record");
    assert_eq!(text_record.variant(), Some("text_record"));
    assert_eq!(text_record.get("text"), Some(&Value::string("hi")));

    let binary_record = decoder
        .decode(root, &[0u8, 2, 1, 2, 3, 4], 0, None)
        .expect("binary record");
    assert_eq!(binary_record.variant(), Some("binary_record"));
    assert_eq!(binary_record.get("data"), Some(&Value::bytes([1u8, 2, 3, 4])));
}

#[test]
fn unknown_member_key_reports_its_path() {
    let text = with_primitives(
        r#"
name: header
type: structure
members:
- name: size
  data_type: uint32
- name: flags
  data_typ: uint16
"#,
    );
    let detail = parse_detail(parse_format("typo.yaml", &text).expect_err("typo"));
    assert!(detail.contains("document 4"), "{detail}");
    assert!(detail.contains("members[1]"), "{detail}");
    assert!(detail.contains("unknown field `data_typ`"), "{detail}");
}

#[test]
fn unknown_definition_key_is_rejected() {
    let text = "name: uint32\ntype: integer\nsize: 4\n";
    let detail = parse_detail(parse_format("typo.yaml", text).expect_err("size is an attribute"));
    assert!(detail.contains("document 1"), "{detail}");
    assert!(detail.contains("unknown field `size`"), "{detail}");
}

#[test]
fn nested_attribute_errors_carry_the_key_path() {
    let text = "name: uint32\ntype: integer\nattributes:\n  size: four\n";
    let detail = parse_detail(parse_format("bad.yaml", text).expect_err("size is not a number"));
    assert!(detail.contains("attributes.size"), "{detail}");
}

#[test]
fn invalid_attribute_values_are_rejected() {
    let cases = [
        (
            "name: x\ntype: integer\nattributes:\n  size: 4\n  byte_order: middle-endian\n",
            "attributes.byte_order",
        ),
        (
            "name: x\ntype: integer\nattributes:\n  size: 4\n  units: bits\n",
            "attributes.units",
        ),
        (
            "name: x\ntype: integer\nattributes:\n  size: 4\n  format: decimal\n",
            "attributes.format",
        ),
        ("name: x\ntype: integer\n", "attributes.size"),
        ("name: x\ntype: bit-field\n", "unsupported definition type"),
        ("type: integer\nattributes:\n  size: 4\n", "name"),
    ];
    for (text, expected) in cases {
        let detail = parse_detail(parse_format("bad.yaml", text).expect_err(text));
        assert!(detail.contains(expected), "{text}: {detail}");
    }
}

#[test]
fn member_declaration_errors() {
    let cases = [
        (
            "- name: a\n  data_type: byte\n  type: stream\n",
            "both data_type and type",
        ),
        ("- name: a\n", "needs data_type or type"),
        ("- name: a\n  type: integer\n", "cannot be declared inline"),
        (
            "- name: a\n  type: string\n  element_data_type: byte\n  number_of_elements: 2\n",
            "members[0].encoding",
        ),
        (
            "- name: a\n  type: stream\n  element_data_type: byte\n  elements_terminator: \"\\u0100\"\n",
            "elements_terminator",
        ),
        ("- name: a\n  type: padding\n", "members[0].alignment_size"),
    ];
    for (members, expected) in cases {
        let text = with_primitives(&format!("name: s\ntype: structure\nmembers:\n{members}"));
        let detail = parse_detail(parse_format("bad.yaml", &text).expect_err(members));
        assert!(detail.contains(expected), "{members}: {detail}");
    }
}

#[test]
fn second_format_document_is_rejected() {
    let text = "name: a\ntype: format\n---\nname: b\ntype: format\n";
    let detail = parse_detail(parse_format("two.yaml", text).expect_err("two formats"));
    assert!(detail.contains("document 2"), "{detail}");
}

#[test]
fn resolution_errors_pass_through() {
    let text = with_primitives(
        "name: header\ntype: structure\nmembers:\n- name: size\n  data_type: uint128\n",
    );
    let err = load_format("header.yaml", &text).expect_err("uint128 is undefined");
    assert!(
        matches!(&err, SchemaError::UnknownType { name, .. } if name == "uint128"),
        "{err:?}"
    );
}

#[test]
fn malformed_yaml_is_a_parse_error() {
    let detail = parse_detail(
        parse_format("broken.yaml", "name: [unclosed\ntype: integer\n").expect_err("bad yaml"),
    );
    assert!(detail.starts_with("document 1"), "{detail}");
}
