#![allow(dead_code)]

use dtschema_core::ByteOrder;
use dtschema_fabric::{
    Schema,
    ast::{
        BooleanDecl, FormatDecl, GroupDecl, IntegerDecl, LiteralValue, MemberDecl, SequenceDecl,
        SizeDecl, StringDecl, StructureDecl, TypeDecl, TypeDeclKind,
    },
    resolve,
};

pub fn decl(name: &str, kind: TypeDeclKind) -> TypeDecl {
    TypeDecl {
        name: name.to_string(),
        description: None,
        kind,
    }
}

pub fn int_kind(size: usize, signed: bool) -> TypeDeclKind {
    TypeDeclKind::Integer(IntegerDecl {
        size,
        signed,
        byte_order: None,
    })
}

/// The usual primitive set: byte, uint8..uint64, int32, all little-endian by
/// inheritance from the structures that use them.
pub fn primitives() -> Vec<TypeDecl> {
    vec![
        decl("byte", int_kind(1, false)),
        decl("uint8", int_kind(1, false)),
        decl("uint16", int_kind(2, false)),
        decl("uint32", int_kind(4, false)),
        decl("uint64", int_kind(8, false)),
        decl("int32", int_kind(4, true)),
        decl(
            "uint16be",
            TypeDeclKind::Integer(IntegerDecl {
                size: 2,
                signed: false,
                byte_order: Some(ByteOrder::BigEndian),
            }),
        ),
        decl(
            "bool8",
            TypeDeclKind::Boolean(BooleanDecl {
                size: 1,
                byte_order: None,
                false_value: 0,
                true_value: None,
            }),
        ),
    ]
}

pub fn structure(name: &str, members: Vec<MemberDecl>) -> TypeDecl {
    decl(
        name,
        TypeDeclKind::Structure(StructureDecl {
            byte_order: Some(ByteOrder::LittleEndian),
            members,
        }),
    )
}

pub fn group(name: &str, base: &str, identifier: &str, members: &[&str], default: Option<&str>) -> TypeDecl {
    decl(
        name,
        TypeDeclKind::StructureGroup(GroupDecl {
            base: base.to_string(),
            identifier: identifier.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
            default: default.map(str::to_string),
        }),
    )
}

pub fn sequence_of(element: &str, count: &str) -> TypeDeclKind {
    TypeDeclKind::Sequence(SequenceDecl {
        number_of_elements: Some(SizeDecl::Expression(count.to_string())),
        ..SequenceDecl::new(element)
    })
}

pub fn sized_sequence_of(element: &str, size: &str) -> TypeDeclKind {
    TypeDeclKind::Sequence(SequenceDecl {
        elements_data_size: Some(SizeDecl::Expression(size.to_string())),
        ..SequenceDecl::new(element)
    })
}

pub fn stream_of(count: &str) -> TypeDeclKind {
    TypeDeclKind::Stream(SequenceDecl {
        number_of_elements: Some(SizeDecl::Expression(count.to_string())),
        ..SequenceDecl::new("byte")
    })
}

pub fn cstring() -> TypeDeclKind {
    TypeDeclKind::String(StringDecl {
        sequence: SequenceDecl {
            elements_terminator: Some(vec![0]),
            ..SequenceDecl::new("byte")
        },
        encoding: "ascii".to_string(),
    })
}

pub fn int(value: i128) -> LiteralValue {
    LiteralValue::Integer(value)
}

pub fn format(definitions: Vec<TypeDecl>) -> FormatDecl {
    FormatDecl {
        name: "test".to_string(),
        description: None,
        definitions,
    }
}

/// Resolve the primitive set plus `definitions`.
pub fn schema(definitions: Vec<TypeDecl>) -> Schema {
    let mut all = primitives();
    all.extend(definitions);
    resolve(format(all)).expect("schema should resolve")
}

/// The header from the worked example: a tagged, counted `uint16` list.
pub fn tagged_list() -> Schema {
    schema(vec![structure(
        "tagged_list",
        vec![
            MemberDecl::named("tag", "uint32").with_value(int(0xABCD)),
            MemberDecl::named("count", "uint32"),
            MemberDecl::inline("items", sequence_of("uint16", "count")),
        ],
    )])
}
