mod test_helpers;

use dtschema_core::{DecodeError, DecodedRecord, Guid, Value};
use dtschema_fabric::{
    DecodeOptions, Decoder, Schema,
    ast::{
        BooleanDecl, MemberDecl, SequenceDecl, SizeDecl, StringDecl, StructureDecl, TypeDeclKind,
    },
};
use pretty_assertions::assert_eq;
use test_helpers::*;

fn decode(schema: &Schema, name: &str, data: &[u8]) -> Result<DecodedRecord, DecodeError> {
    decode_bounded(schema, name, data, None)
}

fn decode_bounded(
    schema: &Schema,
    name: &str,
    data: &[u8],
    bound: Option<usize>,
) -> Result<DecodedRecord, DecodeError> {
    let root = schema.record_type(name).expect("record type");
    Decoder::new(schema).decode(root, data, 0, bound)
}

const TAGGED_LIST: [u8; 12] = [
    0xCD, 0xAB, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x02, 0x00,
];

#[test]
fn decode_tagged_list() {
    let schema = tagged_list();
    let record = decode(&schema, "tagged_list", &TAGGED_LIST).expect("decode");

    assert_eq!(record.name(), "tagged_list");
    assert_eq!(record.range(), 0..12);
    assert_eq!(record.field_names().collect::<Vec<_>>(), ["tag", "count", "items"]);
    assert_eq!(record.get("tag"), Some(&Value::U32(0xABCD)));
    assert_eq!(record.get("count"), Some(&Value::U32(2)));
    assert_eq!(
        record.get("items"),
        Some(&Value::Sequence(vec![Value::U16(1), Value::U16(2)]))
    );
}

#[test]
fn decode_tagged_list_wrong_tag_is_constraint_violation() {
    let schema = tagged_list();
    let mut data = TAGGED_LIST;
    data[0] = 0xFF;
    data[1] = 0xFF;

    let err = decode(&schema, "tagged_list", &data).expect_err("tag must be 0xABCD");
    match &err {
        DecodeError::ConstraintViolation {
            path,
            offset,
            expected,
            actual,
        } => {
            assert_eq!(path, "tagged_list.tag");
            assert_eq!(*offset, 0);
            assert_eq!(expected, "0xabcd");
            assert_eq!(actual, "0xffff");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(format!("{err}").contains("tagged_list.tag"));
}

#[test]
fn decode_is_idempotent() {
    let schema = tagged_list();
    let first = decode(&schema, "tagged_list", &TAGGED_LIST).expect("decode");
    let second = decode(&schema, "tagged_list", &TAGGED_LIST).expect("decode");
    assert_eq!(first, second);
}

#[test]
fn fixed_structure_consumes_sum_of_widths() {
    let schema = schema(vec![structure(
        "fixed",
        vec![
            MemberDecl::named("a", "uint8"),
            MemberDecl::named("b", "uint16"),
            MemberDecl::named("c", "uint32"),
            MemberDecl::named("d", "uint64"),
        ],
    )]);
    let id = schema.structure_id("fixed").expect("structure");
    assert_eq!(schema.structure_byte_size(id), Some(15));

    let data: Vec<u8> = (1..=15).collect();
    let record = decode(&schema, "fixed", &data).expect("decode");
    assert_eq!(record.byte_size(), 15);
    assert_eq!(record.get("b"), Some(&Value::U16(0x0302)));
    assert_eq!(record.get("d"), Some(&Value::U64(0x0f0e0d0c0b0a0908)));
}

fn flagged() -> Schema {
    schema(vec![structure(
        "flagged",
        vec![
            MemberDecl::named("flags", "uint8"),
            MemberDecl::named("extra", "uint32").with_condition("flags & 0x01 != 0"),
            MemberDecl::named("tail", "uint8"),
        ],
    )])
}

#[test]
fn conditional_field_toggles_with_flag() {
    let schema = flagged();

    let with = decode(&schema, "flagged", &[0x01, 0x78, 0x56, 0x34, 0x12, 0xFF]).expect("decode");
    assert_eq!(with.field_names().collect::<Vec<_>>(), ["flags", "extra", "tail"]);
    assert_eq!(with.get("extra"), Some(&Value::U32(0x12345678)));
    assert_eq!(with.byte_size(), 6);

    let without = decode(&schema, "flagged", &[0x00, 0xFF]).expect("decode");
    assert_eq!(without.field_names().collect::<Vec<_>>(), ["flags", "tail"]);
    assert_eq!(without.get("tail"), Some(&Value::U8(0xFF)));
    assert_eq!(with.byte_size() - without.byte_size(), 4);
}

#[test]
fn size_bound_must_match_exactly() {
    let schema = tagged_list();
    decode_bounded(&schema, "tagged_list", &TAGGED_LIST, Some(12)).expect("exact bound");

    let short = decode_bounded(&schema, "tagged_list", &TAGGED_LIST, Some(11))
        .expect_err("one byte short");
    assert!(matches!(short, DecodeError::SizeMismatch { .. }), "{short:?}");

    let mut longer = TAGGED_LIST.to_vec();
    longer.push(0);
    let long = decode_bounded(&schema, "tagged_list", &longer, Some(13)).expect_err("one byte long");
    assert!(matches!(long, DecodeError::SizeMismatch { .. }), "{long:?}");
}

#[test]
fn truncated_input_reports_required_length() {
    let schema = tagged_list();
    let err = decode(&schema, "tagged_list", &TAGGED_LIST[..6]).expect_err("truncated");
    match &err {
        DecodeError::InsufficientData {
            path,
            offset,
            needed,
            available,
        } => {
            assert_eq!(path, "tagged_list.count");
            assert_eq!((*offset, *needed, *available), (4, 4, 2));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.required_len(), Some(8));
}

#[test]
fn runaway_count_fails_before_allocating() {
    let schema = tagged_list();
    let data = [0xCD, 0xAB, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0x00];
    let err = decode(&schema, "tagged_list", &data).expect_err("count too large");
    assert!(matches!(err, DecodeError::SizeMismatch { .. }), "{err:?}");
    assert_eq!(err.path(), "tagged_list.items");
    assert_eq!(err.offset(), 8);
}

fn empty_entry_table() -> Schema {
    schema(vec![
        structure(
            "empty_entry",
            vec![MemberDecl::named("x", "uint8").with_condition("false")],
        ),
        structure(
            "table",
            vec![
                MemberDecl::named("count", "uint32"),
                MemberDecl::inline("entries", sequence_of("empty_entry", "count")),
            ],
        ),
    ])
}

#[test]
fn zero_sized_elements_do_not_run_away() {
    let schema = empty_entry_table();
    let err = decode(&schema, "table", &[0xFF, 0xFF, 0xFF, 0x0F]).expect_err("count too large");
    assert!(matches!(err, DecodeError::SizeMismatch { .. }), "{err:?}");
    assert_eq!(err.path(), "table.entries[0]");
    assert_eq!(err.offset(), 4);
}

#[test]
fn small_count_of_zero_sized_elements() {
    let schema = empty_entry_table();
    let record = decode(&schema, "table", &[0x02, 0x00, 0x00, 0x00, 0xAA, 0xAA]).expect("decode");
    match record.get("entries") {
        Some(Value::Sequence(entries)) => assert_eq!(entries.len(), 2),
        other => panic!("unexpected entries: {other:?}"),
    }
    assert_eq!(record.range(), 0..4);
}

#[test]
fn boolean_policies() {
    let mut defs = vec![decl(
        "strict_bool",
        TypeDeclKind::Boolean(BooleanDecl {
            size: 1,
            byte_order: None,
            false_value: 0,
            true_value: Some(1),
        }),
    )];
    defs.push(structure("strict", vec![MemberDecl::named("flag", "strict_bool")]));
    defs.push(structure("lenient", vec![MemberDecl::named("flag", "bool8")]));
    let schema = schema(defs);

    let record = decode(&schema, "strict", &[1]).expect("decode");
    assert_eq!(record.get("flag"), Some(&Value::Bool(true)));
    let err = decode(&schema, "strict", &[2]).expect_err("2 is neither true nor false");
    assert!(matches!(err, DecodeError::InvalidBooleanValue { raw: 2, .. }), "{err:?}");

    let record = decode(&schema, "lenient", &[2]).expect("decode");
    assert_eq!(record.get("flag"), Some(&Value::Bool(true)));
    let record = decode(&schema, "lenient", &[0]).expect("decode");
    assert_eq!(record.get("flag"), Some(&Value::Bool(false)));
}

#[test]
fn terminated_string() {
    let schema = schema(vec![structure(
        "named",
        vec![
            MemberDecl::inline("name", cstring()),
            MemberDecl::named("after", "uint8"),
        ],
    )]);

    let record = decode(&schema, "named", b"abc\0\x07").expect("decode");
    assert_eq!(record.get("name"), Some(&Value::string("abc")));
    assert_eq!(record.get("after"), Some(&Value::U8(7)));
    assert_eq!(record.range(), 0..5);

    let err = decode(&schema, "named", b"abc").expect_err("no terminator");
    assert!(matches!(err, DecodeError::UnterminatedString { .. }), "{err:?}");
    assert_eq!(err.path(), "named.name");
}

#[test]
fn sized_string_without_terminator() {
    let fixed = TypeDeclKind::String(StringDecl {
        sequence: SequenceDecl {
            elements_data_size: Some(SizeDecl::Literal(4)),
            elements_terminator: Some(vec![0]),
            ..SequenceDecl::new("byte")
        },
        encoding: "ascii".to_string(),
    });
    let schema = schema(vec![structure(
        "label",
        vec![
            MemberDecl::inline("text", fixed),
            MemberDecl::named("after", "uint8"),
        ],
    )]);

    let record = decode(&schema, "label", b"ab\0\0\x09").expect("decode");
    assert_eq!(record.get("text"), Some(&Value::string("ab")));
    assert_eq!(record.get("after"), Some(&Value::U8(9)));

    // The terminator after the region does not count.
    let err = decode(&schema, "label", b"abcd\0").expect_err("no terminator in region");
    assert!(matches!(err, DecodeError::UnterminatedString { .. }), "{err:?}");
    assert_eq!(err.path(), "label.text");
    assert_eq!(err.offset(), 0);
}

#[test]
fn sized_utf16_string() {
    let utf16 = TypeDeclKind::String(StringDecl {
        sequence: SequenceDecl {
            elements_data_size: Some(SizeDecl::Literal(4)),
            ..SequenceDecl::new("byte")
        },
        encoding: "utf-16-le".to_string(),
    });
    let schema = schema(vec![structure("wide", vec![MemberDecl::inline("text", utf16)])]);

    let record = decode(&schema, "wide", &[0x68, 0x00, 0x69, 0x00]).expect("decode");
    assert_eq!(record.get("text"), Some(&Value::string("hi")));
}

#[test]
fn stream_up_to_terminator() {
    let terminated = TypeDeclKind::Stream(SequenceDecl {
        elements_terminator: Some(vec![0xFF, 0xFF]),
        ..SequenceDecl::new("uint16")
    });
    let schema = schema(vec![structure(
        "blob",
        vec![
            MemberDecl::inline("data", terminated),
            MemberDecl::named("next", "uint8"),
        ],
    )]);

    let record = decode(&schema, "blob", &[1, 2, 3, 4, 0xFF, 0xFF, 9]).expect("decode");
    assert_eq!(record.get("data"), Some(&Value::bytes([1u8, 2, 3, 4])));
    assert_eq!(record.get("next"), Some(&Value::U8(9)));
}

#[test]
fn padding_aligns_to_structure_start() {
    let schema = schema(vec![structure(
        "padded",
        vec![
            MemberDecl::named("a", "uint8"),
            MemberDecl::inline("pad", TypeDeclKind::Padding { alignment_size: 4 }),
            MemberDecl::named("b", "uint32"),
        ],
    )]);

    let record = decode(&schema, "padded", &[1, 0, 0, 0, 4, 0, 0, 0]).expect("decode");
    assert_eq!(record.field_names().collect::<Vec<_>>(), ["a", "b"]);
    assert_eq!(record.get("b"), Some(&Value::U32(4)));
    assert_eq!(record.range(), 0..8);
}

#[test]
fn negative_size_fails_unless_clamped() {
    let strict = TypeDeclKind::Stream(SequenceDecl {
        number_of_elements: Some(SizeDecl::Expression("size - 4".to_string())),
        ..SequenceDecl::new("byte")
    });
    let clamped = TypeDeclKind::Stream(SequenceDecl {
        number_of_elements: Some(SizeDecl::Expression("size - 4".to_string())),
        clamp_negative_size: true,
        ..SequenceDecl::new("byte")
    });
    let schema = schema(vec![
        structure(
            "strict",
            vec![MemberDecl::named("size", "int32"), MemberDecl::inline("data", strict)],
        ),
        structure(
            "clamped",
            vec![MemberDecl::named("size", "int32"), MemberDecl::inline("data", clamped)],
        ),
    ]);

    let err = decode(&schema, "strict", &[2, 0, 0, 0]).expect_err("negative size");
    assert!(matches!(err, DecodeError::SizeMismatch { .. }), "{err:?}");

    let record = decode(&schema, "clamped", &[2, 0, 0, 0]).expect("decode");
    assert_eq!(record.get("data"), Some(&Value::bytes(Vec::<u8>::new())));
    assert_eq!(record.range(), 0..4);
}

#[test]
fn nesting_deeper_than_limit_fails() {
    let schema = schema(vec![
        structure("inner", vec![MemberDecl::named("v", "uint8")]),
        structure("middle", vec![MemberDecl::named("i", "inner")]),
        structure("outer", vec![MemberDecl::named("m", "middle")]),
    ]);
    let root = schema.record_type("outer").expect("record type");

    Decoder::new(&schema)
        .decode(root, &[1], 0, None)
        .expect("default depth is enough");

    let err = Decoder::new(&schema)
        .with_options(DecodeOptions::default().with_max_depth(2))
        .decode(root, &[1], 0, None)
        .expect_err("three levels with a limit of two");
    assert!(matches!(err, DecodeError::RecursionLimit { limit: 2, .. }), "{err:?}");
    assert_eq!(err.path(), "outer.m.i");
}

#[test]
fn explicit_byte_order_overrides_structure() {
    let schema = schema(vec![structure(
        "mixed",
        vec![
            MemberDecl::named("be", "uint16be"),
            MemberDecl::named("le", "uint16"),
        ],
    )]);
    let record = decode(&schema, "mixed", &[0x12, 0x34, 0x12, 0x34]).expect("decode");
    assert_eq!(record.get("be"), Some(&Value::U16(0x1234)));
    assert_eq!(record.get("le"), Some(&Value::U16(0x3412)));
}

#[test]
fn nested_structure_reads_enclosing_fields() {
    let body = TypeDeclKind::Structure(StructureDecl {
        byte_order: None,
        members: vec![
            MemberDecl::inline("items", sequence_of("uint8", "count")),
            MemberDecl::inline("again", stream_of("header.count")),
        ],
    });
    let schema = schema(vec![structure(
        "header",
        vec![MemberDecl::named("count", "uint8"), MemberDecl::inline("body", body)],
    )]);

    let record = decode(&schema, "header", &[2, 1, 2, 3, 4]).expect("decode");
    let body = record.get("body").expect("body").try_record().expect("record");
    assert_eq!(body.range(), 1..5);
    assert_eq!(
        body.get("items"),
        Some(&Value::Sequence(vec![Value::U8(1), Value::U8(2)]))
    );
    assert_eq!(body.get("again"), Some(&Value::bytes([3u8, 4])));
}

#[test]
fn reference_to_skipped_field_is_unresolved() {
    let schema = schema(vec![structure(
        "optional",
        vec![
            MemberDecl::named("flags", "uint8"),
            MemberDecl::named("length", "uint8").with_condition("flags == 1"),
            MemberDecl::inline("data", stream_of("length")),
        ],
    )]);

    let record = decode(&schema, "optional", &[1, 2, 0xAA, 0xBB]).expect("decode");
    assert_eq!(record.get("data"), Some(&Value::bytes([0xAAu8, 0xBB])));

    let err = decode(&schema, "optional", &[0, 0xAA]).expect_err("length skipped");
    match err {
        DecodeError::UnresolvedReference {
            path, reference, ..
        } => {
            assert_eq!(path, "optional.data");
            assert_eq!(reference, "length");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn boolean_size_expression_is_type_mismatch() {
    let schema = schema(vec![structure(
        "confused",
        vec![
            MemberDecl::named("count", "uint8"),
            MemberDecl::inline("data", stream_of("count > 1")),
        ],
    )]);
    let err = decode(&schema, "confused", &[2, 0, 0]).expect_err("boolean count");
    assert!(matches!(err, DecodeError::TypeMismatch { .. }), "{err:?}");
}

#[test]
fn union_overlays_members() {
    let union = TypeDeclKind::Union(StructureDecl {
        byte_order: None,
        members: vec![
            MemberDecl::named("as_int", "uint32"),
            MemberDecl::inline("as_bytes", stream_of("4")),
            MemberDecl::named("low", "uint16"),
        ],
    });
    let schema = schema(vec![structure(
        "overlay",
        vec![MemberDecl::inline("u", union), MemberDecl::named("tail", "uint8")],
    )]);

    let record = decode(&schema, "overlay", &[1, 0, 0, 0, 9]).expect("decode");
    let u = record.get("u").expect("u").try_record().expect("record");
    assert_eq!(u.get("as_int"), Some(&Value::U32(1)));
    assert_eq!(u.get("as_bytes"), Some(&Value::bytes([1u8, 0, 0, 0])));
    assert_eq!(u.get("low"), Some(&Value::U16(1)));
    assert_eq!(u.range(), 0..4);
    assert_eq!(record.get("tail"), Some(&Value::U8(9)));
}

#[test]
fn sized_sequence_must_land_on_boundary() {
    let schema = schema(vec![structure(
        "sized",
        vec![
            MemberDecl::named("size", "uint8"),
            MemberDecl::inline("items", sized_sequence_of("uint16", "size")),
        ],
    )]);

    let record = decode(&schema, "sized", &[4, 1, 0, 2, 0]).expect("decode");
    assert_eq!(
        record.get("items"),
        Some(&Value::Sequence(vec![Value::U16(1), Value::U16(2)]))
    );

    let err = decode(&schema, "sized", &[3, 1, 0, 2, 0]).expect_err("element overruns");
    assert!(matches!(err, DecodeError::SizeMismatch { .. }), "{err:?}");
    assert_eq!(err.path(), "sized.items[1]");
}

#[test]
fn little_endian_guid() {
    let schema = schema(vec![
        decl("guid", TypeDeclKind::Uuid { byte_order: None }),
        structure("identified", vec![MemberDecl::named("id", "guid")]),
    ]);
    let data = [
        0x33, 0x22, 0x11, 0x00, 0x55, 0x44, 0x77, 0x66, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE,
        0xFF,
    ];
    let record = decode(&schema, "identified", &data).expect("decode");
    let guid: Guid = record.get("id").expect("id").try_guid().expect("guid");
    assert_eq!(guid.to_string(), "00112233-4455-6677-8899-aabbccddeeff");
}

#[test]
fn decode_single_primitive() {
    let schema = tagged_list();
    let id = schema.type_id("uint16be").expect("type");
    let (value, consumed) = Decoder::new(&schema)
        .decode_primitive(id, &[0x00, 0x01, 0x02], 1)
        .expect("decode");
    assert_eq!(value, Value::U16(0x0102));
    assert_eq!(consumed, 2);
}
