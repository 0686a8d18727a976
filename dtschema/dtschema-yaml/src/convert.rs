//! Raw documents → [`dtschema_fabric::ast`] declarations.

use std::fmt;

use dtschema_core::{ByteOrder, SchemaError};
use dtschema_fabric::ast::{
    BooleanDecl, CharacterDecl, EnumerationDecl, EnumerationValueDecl, FloatDecl, GroupDecl,
    IntegerDecl, LiteralValue, MemberDecl, MemberType, SequenceDecl, SizeDecl, StringDecl,
    StructureDecl, TypeDecl, TypeDeclKind, latin1_bytes,
};

use crate::document::{RawAttributes, RawBytes, RawDefinition, RawLiteral, RawMember, RawSize};

/// One converted document.
pub(crate) enum Document {
    /// `type: format`
    Format {
        name: Option<String>,
        description: Option<String>,
    },
    Definition(TypeDecl),
}

/// Position of a document inside its source, used to build error messages.
pub(crate) struct Location<'a> {
    pub source_name: &'a str,
    pub index: usize,
}

impl Location<'_> {
    pub fn error(&self, key: &str, detail: impl fmt::Display) -> SchemaError {
        let detail = match key {
            "" | "." => format!("document {}: {detail}", self.index + 1),
            key => format!("document {}: {key}: {detail}", self.index + 1),
        };
        SchemaError::Parse {
            source_name: self.source_name.to_string(),
            detail,
        }
    }
}

fn child(key: &str, name: &str) -> String {
    if key.is_empty() {
        name.to_string()
    } else {
        format!("{key}.{name}")
    }
}

pub(crate) fn convert(raw: RawDefinition, at: &Location<'_>) -> Result<Document, SchemaError> {
    if raw.kind == "format" {
        if let Some(metadata) = &raw.metadata {
            log::debug!("{}: format metadata has {} keys", at.source_name, metadata.len());
        }
        return Ok(Document::Format {
            name: raw.name,
            description: raw.description,
        });
    }
    let name = raw.name.clone().ok_or_else(|| at.error("name", "missing"))?;
    if !raw.aliases.is_empty() {
        log::warn!("{}: ignoring aliases of '{name}'", at.source_name);
    }
    let description = raw.description.clone();
    let kind = definition_kind(raw, at)?;
    Ok(Document::Definition(TypeDecl {
        name,
        description,
        kind,
    }))
}

fn definition_kind(raw: RawDefinition, at: &Location<'_>) -> Result<TypeDeclKind, SchemaError> {
    let attrs = &raw.attributes;
    check_units(attrs, at, "")?;
    let byte_order = byte_order(attrs, at, "")?;
    match raw.kind.as_str() {
        "integer" => {
            return Ok(TypeDeclKind::Integer(IntegerDecl {
                size: required_size(attrs, at, "")?,
                signed: signed(attrs, at)?,
                byte_order,
            }));
        }
        "floating-point" => {
            return Ok(TypeDeclKind::FloatingPoint(FloatDecl {
                size: required_size(attrs, at, "")?,
                byte_order,
            }));
        }
        "boolean" => {
            return Ok(TypeDeclKind::Boolean(BooleanDecl {
                size: attrs.size.unwrap_or(1),
                byte_order,
                false_value: attrs.false_value.unwrap_or(0),
                true_value: attrs.true_value,
            }));
        }
        "character" => {
            return Ok(TypeDeclKind::Character(CharacterDecl {
                size: attrs.size.unwrap_or(1),
                byte_order,
            }));
        }
        "uuid" => return Ok(TypeDeclKind::Uuid { byte_order }),
        "structure-group" => {
            let names = raw
                .members
                .unwrap_or_default()
                .into_iter()
                .enumerate()
                .map(|(i, value)| {
                    value
                        .as_str()
                        .map(str::to_string)
                        .ok_or_else(|| at.error(&format!("members[{i}]"), "expected a structure name"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(TypeDeclKind::StructureGroup(GroupDecl {
                base: raw.base.ok_or_else(|| at.error("base", "required for structure-group"))?,
                identifier: raw
                    .identifier
                    .ok_or_else(|| at.error("identifier", "required for structure-group"))?,
                members: names,
                default: raw.default,
            }));
        }
        "enumeration" => {
            let values = raw.values.ok_or_else(|| at.error("values", "required for enumeration"))?;
            let values = values
                .into_iter()
                .map(|value| {
                    if !value.aliases.is_empty() {
                        log::warn!("{}: ignoring aliases of '{}'", at.source_name, value.name);
                    }
                    EnumerationValueDecl {
                        name: value.name,
                        number: i128::from(value.number),
                        description: value.description,
                    }
                })
                .collect();
            return Ok(TypeDeclKind::Enumeration(EnumerationDecl { values }));
        }
        "constant" => {
            let value = match raw.value {
                Some(RawLiteral::Signed(v)) => i128::from(v),
                Some(RawLiteral::Unsigned(v)) => i128::from(v),
                Some(_) => return Err(at.error("value", "constant must be an integer")),
                None => return Err(at.error("value", "required for constant")),
            };
            return Ok(TypeDeclKind::Constant { value });
        }
        _ => {}
    }

    let kind = raw.kind;
    let members = raw.members;
    let shared = SharedKeys {
        attributes: raw.attributes,
        sequence: SequenceKeys {
            element_data_type: raw.element_data_type,
            number_of_elements: raw.number_of_elements,
            elements_data_size: raw.elements_data_size,
            elements_terminator: raw.elements_terminator,
            clamp_negative_size: false,
        },
        encoding: raw.encoding,
        alignment_size: raw.alignment_size,
    };
    shared_kind(&kind, shared, || definition_members(members, at), at, "")?
        .ok_or_else(|| at.error("type", format!("unsupported definition type '{kind}'")))
}

fn definition_members(
    values: Option<Vec<serde_yaml::Value>>,
    at: &Location<'_>,
) -> Result<Vec<MemberDecl>, SchemaError> {
    values
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            let key = format!("members[{i}]");
            let raw: RawMember = serde_path_to_error::deserialize(value).map_err(|err| {
                let path = err.path().to_string();
                match path.as_str() {
                    "." => at.error(&key, err.inner()),
                    path => at.error(&child(&key, path), err.inner()),
                }
            })?;
            member(raw, at, &key)
        })
        .collect()
}

fn member(raw: RawMember, at: &Location<'_>, key: &str) -> Result<MemberDecl, SchemaError> {
    let RawMember {
        name,
        data_type,
        kind,
        description,
        attributes,
        element_data_type,
        number_of_elements,
        elements_data_size,
        elements_terminator,
        encoding,
        alignment_size,
        members,
        condition,
        value,
        values,
        clamp_negative_size,
    } = raw;
    check_units(&attributes, at, key)?;

    let ty = match (data_type, kind) {
        (Some(data_type), None) => MemberType::Named(data_type),
        (None, Some(kind)) => {
            let shared = SharedKeys {
                attributes,
                sequence: SequenceKeys {
                    element_data_type,
                    number_of_elements,
                    elements_data_size,
                    elements_terminator,
                    clamp_negative_size,
                },
                encoding,
                alignment_size,
            };
            let nested = |members: Option<Vec<RawMember>>| {
                members
                    .unwrap_or_default()
                    .into_iter()
                    .enumerate()
                    .map(|(i, m)| member(m, at, &child(key, &format!("members[{i}]"))))
                    .collect::<Result<Vec<_>, _>>()
            };
            let inline = shared_kind(&kind, shared, || nested(members), at, key)?
                .ok_or_else(|| at.error(&child(key, "type"), format!("'{kind}' cannot be declared inline")))?;
            MemberType::Inline(Box::new(inline))
        }
        (Some(_), Some(_)) => {
            return Err(at.error(key, "member declares both data_type and type"));
        }
        (None, None) => return Err(at.error(key, "member needs data_type or type")),
    };

    Ok(MemberDecl {
        name,
        description,
        ty,
        condition,
        value: value.map(literal),
        values: values.unwrap_or_default().into_iter().map(literal).collect(),
    })
}

struct SequenceKeys {
    element_data_type: Option<String>,
    number_of_elements: Option<RawSize>,
    elements_data_size: Option<RawSize>,
    elements_terminator: Option<RawBytes>,
    clamp_negative_size: bool,
}

impl SequenceKeys {
    fn into_decl(self, at: &Location<'_>, key: &str) -> Result<SequenceDecl, SchemaError> {
        let element = self
            .element_data_type
            .ok_or_else(|| at.error(&child(key, "element_data_type"), "missing"))?;
        let terminator = match self.elements_terminator {
            None => None,
            Some(RawBytes::List(bytes)) => Some(bytes),
            Some(RawBytes::Text(text)) => Some(latin1_bytes(&text).ok_or_else(|| {
                at.error(
                    &child(key, "elements_terminator"),
                    "characters above U+00FF cannot be bytes",
                )
            })?),
        };
        if terminator.as_ref().is_some_and(Vec::is_empty) {
            return Err(at.error(&child(key, "elements_terminator"), "empty terminator"));
        }
        Ok(SequenceDecl {
            element_data_type: element,
            number_of_elements: self.number_of_elements.map(size),
            elements_data_size: self.elements_data_size.map(size),
            elements_terminator: terminator,
            clamp_negative_size: self.clamp_negative_size,
        })
    }
}

struct SharedKeys {
    attributes: RawAttributes,
    sequence: SequenceKeys,
    encoding: Option<String>,
    alignment_size: Option<usize>,
}

/// Kinds accepted both as named definitions and inline on members. Returns
/// `None` for any other kind.
fn shared_kind(
    kind: &str,
    keys: SharedKeys,
    members: impl FnOnce() -> Result<Vec<MemberDecl>, SchemaError>,
    at: &Location<'_>,
    key: &str,
) -> Result<Option<TypeDeclKind>, SchemaError> {
    let byte_order = byte_order(&keys.attributes, at, key)?;
    let kind = match kind {
        "stream" => TypeDeclKind::Stream(keys.sequence.into_decl(at, key)?),
        "sequence" => TypeDeclKind::Sequence(keys.sequence.into_decl(at, key)?),
        "string" => {
            let encoding = keys
                .encoding
                .or(keys.attributes.encoding)
                .ok_or_else(|| at.error(&child(key, "encoding"), "required for string"))?;
            TypeDeclKind::String(StringDecl {
                sequence: keys.sequence.into_decl(at, key)?,
                encoding,
            })
        }
        "padding" => TypeDeclKind::Padding {
            alignment_size: keys
                .alignment_size
                .or(keys.attributes.alignment_size)
                .ok_or_else(|| at.error(&child(key, "alignment_size"), "required for padding"))?,
        },
        "structure" => TypeDeclKind::Structure(StructureDecl {
            byte_order,
            members: members()?,
        }),
        "union" => TypeDeclKind::Union(StructureDecl {
            byte_order,
            members: members()?,
        }),
        _ => return Ok(None),
    };
    Ok(Some(kind))
}

fn byte_order(
    attrs: &RawAttributes,
    at: &Location<'_>,
    key: &str,
) -> Result<Option<ByteOrder>, SchemaError> {
    attrs
        .byte_order
        .as_deref()
        .map(|s| {
            ByteOrder::parse(s).ok_or_else(|| {
                at.error(
                    &child(key, "attributes.byte_order"),
                    format!("unknown byte order '{s}'"),
                )
            })
        })
        .transpose()
}

fn check_units(attrs: &RawAttributes, at: &Location<'_>, key: &str) -> Result<(), SchemaError> {
    match attrs.units.as_deref() {
        None | Some("bytes") => Ok(()),
        Some(units) => Err(at.error(
            &child(key, "attributes.units"),
            format!("unsupported units '{units}'"),
        )),
    }
}

fn required_size(attrs: &RawAttributes, at: &Location<'_>, key: &str) -> Result<usize, SchemaError> {
    attrs
        .size
        .ok_or_else(|| at.error(&child(key, "attributes.size"), "missing"))
}

fn signed(attrs: &RawAttributes, at: &Location<'_>) -> Result<bool, SchemaError> {
    match attrs.format.as_deref() {
        None | Some("signed") => Ok(true),
        Some("unsigned") => Ok(false),
        Some(other) => Err(at.error(
            "attributes.format",
            format!("expected signed or unsigned, found '{other}'"),
        )),
    }
}

fn size(raw: RawSize) -> SizeDecl {
    match raw {
        RawSize::Literal(n) => SizeDecl::Literal(n),
        RawSize::Expression(expr) => SizeDecl::Expression(expr),
    }
}

fn literal(raw: RawLiteral) -> LiteralValue {
    match raw {
        RawLiteral::Signed(v) => LiteralValue::Integer(i128::from(v)),
        RawLiteral::Unsigned(v) => LiteralValue::Integer(i128::from(v)),
        RawLiteral::Bool(v) => LiteralValue::Bool(v),
        RawLiteral::Text(v) => LiteralValue::Text(v),
    }
}
