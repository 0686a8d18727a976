mod test_helpers;

use dtschema_core::{DecodedRecord, EncodeError, Value};
use dtschema_fabric::{
    Decoder, Encoder, Schema,
    ast::{MemberDecl, SequenceDecl, SizeDecl, StructureDecl, TypeDeclKind},
};
use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use test_helpers::*;

fn round_trip(schema: &Schema, name: &str, data: &[u8]) {
    let root = schema.record_type(name).expect("record type");
    let decoded = Decoder::new(schema).decode(root, data, 0, None).expect("decode");
    let encoded = Encoder::new(schema).encode(root, &decoded).expect("encode");
    assert_eq!(encoded, data);
    let again = Decoder::new(schema).decode(root, &encoded, 0, None).expect("decode");
    assert_eq!(again, decoded);
}

#[test]
fn round_trip_counted_list() {
    round_trip(
        &tagged_list(),
        "tagged_list",
        &[0xCD, 0xAB, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x02, 0x00],
    );
}

#[test]
fn round_trip_conditional_padding_and_strings() {
    let schema = schema(vec![structure(
        "entry",
        vec![
            MemberDecl::named("flags", "uint8"),
            MemberDecl::named("extra", "uint16be").with_condition("flags & 1 == 1"),
            MemberDecl::inline("pad", TypeDeclKind::Padding { alignment_size: 4 }),
            MemberDecl::inline("name", cstring()),
            MemberDecl::named("enabled", "bool8"),
            MemberDecl::named("delta", "int32"),
        ],
    )]);
    round_trip(&schema, "entry", &[1, 0x12, 0x34, 0, b'a', b'b', 0, 1, 0xFE, 0xFF, 0xFF, 0xFF]);
    round_trip(&schema, "entry", &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
}

#[test]
fn round_trip_structure_group() {
    let schema = schema(vec![
        structure("base", vec![MemberDecl::named("kind", "uint8")]),
        structure(
            "small",
            vec![
                MemberDecl::named("kind", "uint8").with_value(int(1)),
                MemberDecl::named("value", "uint8"),
            ],
        ),
        structure(
            "large",
            vec![
                MemberDecl::named("kind", "uint8").with_value(int(2)),
                MemberDecl::named("value", "uint64"),
            ],
        ),
        group("item", "base", "kind", &["small", "large"], None),
        structure(
            "items",
            vec![
                MemberDecl::named("count", "uint8"),
                MemberDecl::inline("entries", sequence_of("item", "count")),
            ],
        ),
    ]);
    round_trip(&schema, "items", &[2, 1, 0x7F, 2, 1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn missing_field_is_reported() {
    let schema = tagged_list();
    let root = schema.record_type("tagged_list").expect("record type");
    let mut fields = IndexMap::new();
    fields.insert("tag".to_string(), Value::U32(0xABCD));
    let record = DecodedRecord::new("tagged_list", 0..0, fields);

    let err = Encoder::new(&schema).encode(root, &record).expect_err("count missing");
    assert_eq!(
        err,
        EncodeError::MissingField {
            path: "tagged_list.count".to_string()
        }
    );
}

#[test]
fn inconsistent_count_is_rejected() {
    let schema = tagged_list();
    let root = schema.record_type("tagged_list").expect("record type");
    let mut fields = IndexMap::new();
    fields.insert("tag".to_string(), Value::U32(0xABCD));
    fields.insert("count".to_string(), Value::U32(3));
    fields.insert("items".to_string(), Value::Sequence(vec![Value::U16(1)]));
    let record = DecodedRecord::new("tagged_list", 0..0, fields);

    let err = Encoder::new(&schema).encode(root, &record).expect_err("1 element, count 3");
    assert!(matches!(err, EncodeError::TypeMismatch { .. }), "{err:?}");
}

#[test]
fn overflowing_count_is_rejected() {
    let words = TypeDeclKind::Stream(SequenceDecl {
        number_of_elements: Some(SizeDecl::Expression("count".to_string())),
        ..SequenceDecl::new("uint32")
    });
    let schema = schema(vec![structure(
        "words",
        vec![
            MemberDecl::named("count", "uint64"),
            MemberDecl::inline("data", words),
        ],
    )]);
    let root = schema.record_type("words").expect("record type");
    let mut fields = IndexMap::new();
    fields.insert("count".to_string(), Value::U64(u64::MAX));
    fields.insert("data".to_string(), Value::bytes([0u8; 4]));
    let record = DecodedRecord::new("words", 0..0, fields);

    let err = Encoder::new(&schema).encode(root, &record).expect_err("count overflows");
    assert!(matches!(err, EncodeError::Expression { .. }), "{err:?}");
}

#[test]
fn out_of_range_integer_is_rejected() {
    let schema = schema(vec![structure("small", vec![MemberDecl::named("v", "uint8")])]);
    let root = schema.record_type("small").expect("record type");
    let mut fields = IndexMap::new();
    fields.insert("v".to_string(), Value::U32(300));
    let record = DecodedRecord::new("small", 0..0, fields);

    let err = Encoder::new(&schema).encode(root, &record).expect_err("300 needs two bytes");
    assert!(format!("{err}").contains("small.v"), "{err}");
}

#[test]
fn unions_are_not_encoded() {
    let schema = schema(vec![decl(
        "either",
        TypeDeclKind::Union(StructureDecl {
            byte_order: None,
            members: vec![
                MemberDecl::named("wide", "uint32"),
                MemberDecl::named("narrow", "uint8"),
            ],
        }),
    )]);
    let root = schema.record_type("either").expect("record type");
    let record = Decoder::new(&schema)
        .decode(root, &[1u8, 0, 0, 0], 0, None)
        .expect("decode");

    let err = Encoder::new(&schema).encode(root, &record).expect_err("overlay");
    assert!(matches!(err, EncodeError::Unsupported { .. }), "{err:?}");
}
