//! Resolution: turns a [`FormatDecl`] into a linked [`Schema`].
//!
//! Resolution runs in three phases so that definitions may reference names
//! declared later in the same format:
//!
//! 1. **Register** every name and reserve its arena slot
//!    (`DuplicateDefinition` on clashes).
//! 2. **Build** definitions, resolving type names (`UnknownType`) and
//!    creating anonymous definitions for inline member types.
//! 3. **Link** expressions to field references, build structure-group
//!    variant tables and validate element sizes.

use std::collections::HashMap;

use dtschema_core::SchemaError;
use encoding::{EncodingRef, label::encoding_from_whatwg_label};
use indexmap::IndexMap;

use crate::{
    ast::{
        FormatDecl, GroupDecl, LiteralValue, MemberType, SequenceDecl, SizeDecl, StructureDecl,
        TypeDecl, TypeDeclKind, latin1_bytes,
    },
    expr::{Expr, Expression, FieldRef},
    model::{
        BooleanType, CharacterType, DiscriminantKey, EnumerationDefinition, EnumerationValue,
        FieldDefinition, FloatType, GroupId, IntegerType, Layout, Length, Schema, SequenceType,
        SizeExpr, StringType, StructId, StructureDefinition, StructureGroupDefinition, TypeDefinition,
        TypeId, TypeKind,
    },
};

/// Resolve all definitions of one format. Resolution is all-or-nothing.
pub fn resolve(decl: FormatDecl) -> Result<Schema, SchemaError> {
    let mut resolver = Resolver::new(&decl.name);
    resolver.register(&decl.definitions)?;
    resolver.build(&decl.definitions)?;
    let schema = resolver.finish(decl)?;
    log::debug!(
        "resolved format '{}': {} types, {} structures, {} structure groups",
        schema.name,
        schema.types.len(),
        schema.structures.len(),
        schema.groups.len()
    );
    Ok(schema)
}

/// Look up a string encoding, accepting dtFabric spellings such as
/// `utf-16-le` and `utf8` next to WHATWG labels.
pub fn lookup_encoding(label: &str) -> Option<EncodingRef> {
    let label = label.trim().to_ascii_lowercase();
    let normalized = match label.as_str() {
        "utf8" => "utf-8",
        "utf-16-le" | "utf16-le" | "utf16le" => "utf-16le",
        "utf-16-be" | "utf16-be" | "utf16be" => "utf-16be",
        "ascii" => "us-ascii",
        "latin1" | "latin-1" => "iso-8859-1",
        other => other,
    };
    encoding_from_whatwg_label(normalized)
}

/// Field context an inline type's expressions are linked against: the
/// structure that declares it and how many of its fields precede it.
#[derive(Debug, Clone, Copy)]
struct Scope {
    structure: StructId,
    visible: usize,
}

struct Resolver {
    format: String,
    names: IndexMap<String, TypeId>,
    types: Vec<Option<TypeDefinition>>,
    structures: Vec<Option<StructureDefinition>>,
    groups: Vec<(String, Option<String>, GroupDecl)>,
    enumerations: IndexMap<String, EnumerationDefinition>,
    constants: IndexMap<String, i128>,
    scopes: HashMap<TypeId, Scope>,
}

impl Resolver {
    fn new(format: &str) -> Self {
        Self {
            format: format.to_string(),
            names: IndexMap::new(),
            types: Vec::new(),
            structures: Vec::new(),
            groups: Vec::new(),
            enumerations: IndexMap::new(),
            constants: IndexMap::new(),
            scopes: HashMap::new(),
        }
    }

    fn register(&mut self, decls: &[TypeDecl]) -> Result<(), SchemaError> {
        for decl in decls {
            if decl.name.is_empty() {
                return Err(SchemaError::invalid(&self.format, "definition without a name"));
            }
            if self.names.contains_key(&decl.name)
                || self.enumerations.contains_key(&decl.name)
                || self.constants.contains_key(&decl.name)
            {
                return Err(SchemaError::DuplicateDefinition {
                    format: self.format.clone(),
                    name: decl.name.clone(),
                });
            }
            match &decl.kind {
                TypeDeclKind::Enumeration(e) => {
                    let mut values: Vec<EnumerationValue> = Vec::with_capacity(e.values.len());
                    for v in &e.values {
                        if values.iter().any(|existing| existing.name == v.name) {
                            return Err(SchemaError::invalid(
                                &decl.name,
                                format!("duplicate enumeration value '{}'", v.name),
                            ));
                        }
                        values.push(EnumerationValue {
                            name: v.name.clone(),
                            number: v.number,
                            description: v.description.clone(),
                        });
                    }
                    self.enumerations.insert(
                        decl.name.clone(),
                        EnumerationDefinition {
                            name: decl.name.clone(),
                            description: decl.description.clone(),
                            values,
                        },
                    );
                }
                TypeDeclKind::Constant { value } => {
                    self.constants.insert(decl.name.clone(), *value);
                }
                TypeDeclKind::Structure(_) | TypeDeclKind::Union(_) => {
                    let sid = StructId(self.structures.len());
                    self.structures.push(None);
                    let id = self.push_type(Some(TypeDefinition {
                        name: decl.name.clone(),
                        description: decl.description.clone(),
                        kind: TypeKind::Structure(sid),
                    }));
                    self.names.insert(decl.name.clone(), id);
                }
                TypeDeclKind::StructureGroup(group) => {
                    let gid = GroupId(self.groups.len());
                    self.groups.push((
                        decl.name.clone(),
                        decl.description.clone(),
                        group.clone(),
                    ));
                    let id = self.push_type(Some(TypeDefinition {
                        name: decl.name.clone(),
                        description: decl.description.clone(),
                        kind: TypeKind::Group(gid),
                    }));
                    self.names.insert(decl.name.clone(), id);
                }
                _ => {
                    let id = self.push_type(None);
                    self.names.insert(decl.name.clone(), id);
                }
            }
        }
        Ok(())
    }

    fn build(&mut self, decls: &[TypeDecl]) -> Result<(), SchemaError> {
        for decl in decls {
            let Some(&id) = self.names.get(&decl.name) else {
                continue;
            };
            match &decl.kind {
                TypeDeclKind::Structure(s) | TypeDeclKind::Union(s) => {
                    let Some(TypeDefinition {
                        kind: TypeKind::Structure(sid),
                        ..
                    }) = self.types[id.0]
                    else {
                        continue;
                    };
                    let layout = if matches!(decl.kind, TypeDeclKind::Union(_)) {
                        Layout::Overlay
                    } else {
                        Layout::Sequential
                    };
                    self.build_structure(sid, &decl.name, decl.description.clone(), s, layout)?;
                }
                TypeDeclKind::StructureGroup(_)
                | TypeDeclKind::Enumeration(_)
                | TypeDeclKind::Constant { .. } => {}
                kind => {
                    let kind = self.build_kind(&decl.name, kind)?;
                    self.types[id.0] = Some(TypeDefinition {
                        name: decl.name.clone(),
                        description: decl.description.clone(),
                        kind,
                    });
                }
            }
        }
        Ok(())
    }

    fn push_type(&mut self, def: Option<TypeDefinition>) -> TypeId {
        let id = TypeId(self.types.len());
        self.types.push(def);
        id
    }

    fn lookup(&self, name: &str, referenced_by: &str) -> Result<TypeId, SchemaError> {
        if let Some(&id) = self.names.get(name) {
            return Ok(id);
        }
        if self.enumerations.contains_key(name) || self.constants.contains_key(name) {
            return Err(SchemaError::invalid(
                referenced_by,
                format!("'{name}' is not a data type"),
            ));
        }
        Err(SchemaError::UnknownType {
            name: name.to_string(),
            referenced_by: referenced_by.to_string(),
        })
    }

    fn build_kind(&mut self, owner: &str, kind: &TypeDeclKind) -> Result<TypeKind, SchemaError> {
        Ok(match kind {
            TypeDeclKind::Integer(d) => {
                check_size(owner, d.size, &[1, 2, 4, 8])?;
                TypeKind::Integer(IntegerType {
                    size: d.size,
                    signed: d.signed,
                    byte_order: d.byte_order,
                })
            }
            TypeDeclKind::FloatingPoint(d) => {
                check_size(owner, d.size, &[4, 8])?;
                TypeKind::FloatingPoint(FloatType {
                    size: d.size,
                    byte_order: d.byte_order,
                })
            }
            TypeDeclKind::Boolean(d) => {
                check_size(owner, d.size, &[1, 2, 4, 8])?;
                if d.true_value == Some(d.false_value) {
                    return Err(SchemaError::invalid(owner, "true_value equals false_value"));
                }
                TypeKind::Boolean(BooleanType {
                    size: d.size,
                    byte_order: d.byte_order,
                    false_value: d.false_value,
                    true_value: d.true_value,
                })
            }
            TypeDeclKind::Character(d) => {
                check_size(owner, d.size, &[1, 2, 4])?;
                TypeKind::Character(CharacterType {
                    size: d.size,
                    byte_order: d.byte_order,
                })
            }
            TypeDeclKind::Uuid { byte_order } => TypeKind::Uuid {
                byte_order: *byte_order,
            },
            TypeDeclKind::Padding { alignment_size } => {
                if *alignment_size == 0 {
                    return Err(SchemaError::invalid(owner, "alignment_size must be positive"));
                }
                TypeKind::Padding {
                    alignment_size: *alignment_size,
                }
            }
            TypeDeclKind::Stream(d) => TypeKind::Stream(self.build_sequence(owner, d)?),
            TypeDeclKind::Sequence(d) => TypeKind::Sequence(self.build_sequence(owner, d)?),
            TypeDeclKind::String(d) => {
                let sequence = self.build_sequence(owner, &d.sequence)?;
                let encoding = lookup_encoding(&d.encoding).ok_or_else(|| {
                    SchemaError::invalid(owner, format!("unsupported encoding '{}'", d.encoding))
                })?;
                TypeKind::String(StringType {
                    sequence,
                    encoding_label: d.encoding.clone(),
                    encoding,
                })
            }
            TypeDeclKind::Structure(s) | TypeDeclKind::Union(s) => {
                let sid = StructId(self.structures.len());
                self.structures.push(None);
                let layout = if matches!(kind, TypeDeclKind::Union(_)) {
                    Layout::Overlay
                } else {
                    Layout::Sequential
                };
                self.build_structure(sid, owner, None, s, layout)?;
                TypeKind::Structure(sid)
            }
            TypeDeclKind::StructureGroup(_)
            | TypeDeclKind::Enumeration(_)
            | TypeDeclKind::Constant { .. } => {
                return Err(SchemaError::invalid(
                    owner,
                    format!("{} cannot be declared inline", kind.kind_name()),
                ));
            }
        })
    }

    fn build_sequence(&self, owner: &str, d: &SequenceDecl) -> Result<SequenceType, SchemaError> {
        let element = self.lookup(&d.element_data_type, owner)?;
        let length = match (&d.number_of_elements, &d.elements_data_size) {
            (Some(_), Some(_)) => {
                return Err(SchemaError::invalid(
                    owner,
                    "number_of_elements and elements_data_size are mutually exclusive",
                ));
            }
            (Some(count), None) => Some(Length::Count(size_expr(owner, count)?)),
            (None, Some(size)) => Some(Length::DataSize(size_expr(owner, size)?)),
            (None, None) => None,
        };
        if length.is_none() && d.elements_terminator.is_none() {
            return Err(SchemaError::invalid(
                owner,
                "requires number_of_elements, elements_data_size or elements_terminator",
            ));
        }
        if d.elements_terminator.as_ref().is_some_and(Vec::is_empty) {
            return Err(SchemaError::invalid(owner, "empty elements_terminator"));
        }
        Ok(SequenceType {
            element,
            length,
            terminator: d.elements_terminator.clone(),
            clamp_negative_size: d.clamp_negative_size,
        })
    }

    fn build_structure(
        &mut self,
        sid: StructId,
        name: &str,
        description: Option<String>,
        decl: &StructureDecl,
        layout: Layout,
    ) -> Result<(), SchemaError> {
        let mut fields = Vec::with_capacity(decl.members.len());
        let mut field_index = HashMap::with_capacity(decl.members.len());
        for (index, member) in decl.members.iter().enumerate() {
            let member_path = format!("{name}.{}", member.name);
            if member.name.is_empty() {
                return Err(SchemaError::invalid(name, format!("member {index} has no name")));
            }
            if field_index.insert(member.name.clone(), index).is_some() {
                return Err(SchemaError::invalid(
                    name,
                    format!("duplicate member '{}'", member.name),
                ));
            }
            let ty = match &member.ty {
                MemberType::Named(type_name) => self.lookup(type_name, &member_path)?,
                MemberType::Inline(kind) => {
                    let scope = Scope {
                        structure: sid,
                        visible: index,
                    };
                    let kind = self.build_kind(&member_path, kind)?;
                    let id = self.push_type(Some(TypeDefinition {
                        name: member_path.clone(),
                        description: member.description.clone(),
                        kind,
                    }));
                    self.scopes.insert(id, scope);
                    id
                }
            };
            let condition = member
                .condition
                .as_deref()
                .map(|source| parse(&member_path, source))
                .transpose()?;
            fields.push(FieldDefinition {
                name: member.name.clone(),
                description: member.description.clone(),
                ty,
                condition,
                value: member.value.clone(),
                values: member.values.clone(),
            });
        }
        self.structures[sid.0] = Some(StructureDefinition {
            name: name.to_string(),
            description,
            byte_order: decl.byte_order,
            layout,
            fields,
            field_index,
        });
        Ok(())
    }

    fn finish(self, decl: FormatDecl) -> Result<Schema, SchemaError> {
        let incomplete = || SchemaError::invalid(&decl.name, "definition was never built");
        let types = self
            .types
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(incomplete)?;
        let structures = self
            .structures
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(incomplete)?;
        let mut schema = Schema {
            name: decl.name,
            description: decl.description,
            types,
            structures,
            groups: Vec::new(),
            enumerations: self.enumerations,
            constants: self.constants,
            names: self.names,
        };
        let groups = self
            .groups
            .into_iter()
            .map(|(name, description, decl)| LinkGroup {
                name,
                description,
                decl,
            })
            .collect();
        link(&mut schema, groups, &self.scopes)?;
        Ok(schema)
    }
}

/// Structure-group declaration waiting for its member structures.
struct LinkGroup {
    name: String,
    description: Option<String>,
    decl: GroupDecl,
}

fn check_size(owner: &str, size: usize, allowed: &[usize]) -> Result<(), SchemaError> {
    if allowed.contains(&size) {
        Ok(())
    } else {
        Err(SchemaError::invalid(
            owner,
            format!("unsupported size {size}, expected one of {allowed:?}"),
        ))
    }
}

fn parse(owner: &str, source: &str) -> Result<Expression, SchemaError> {
    Expression::parse(source).map_err(|detail| SchemaError::InvalidExpression {
        name: owner.to_string(),
        expression: source.to_string(),
        detail,
    })
}

fn size_expr(owner: &str, decl: &SizeDecl) -> Result<SizeExpr, SchemaError> {
    Ok(match decl {
        SizeDecl::Literal(n) => SizeExpr::Literal(*n),
        SizeDecl::Expression(source) => match parse(owner, source)?.into_root() {
            Expr::Int(n) if u64::try_from(n).is_ok() => SizeExpr::Literal(n as u64),
            root => SizeExpr::Expression(Expression::new(source.as_str(), root)),
        },
    })
}

// Phase 3

fn link(
    schema: &mut Schema,
    groups: Vec<LinkGroup>,
    scopes: &HashMap<TypeId, Scope>,
) -> Result<(), SchemaError> {
    let mut built = Vec::with_capacity(groups.len());
    for group in groups {
        built.push(build_group(schema, group)?);
    }
    schema.groups = built;

    let mut type_links = Vec::new();
    for (i, def) in schema.types.iter().enumerate() {
        if let Some(expr) = length_expression(&def.kind) {
            let scope = scopes.get(&TypeId(i)).copied();
            type_links.push((i, link_expression(schema, &def.name, scope, expr)?));
        }
    }
    let mut field_links = Vec::new();
    for (s, def) in schema.structures.iter().enumerate() {
        for (f, field) in def.fields.iter().enumerate() {
            if let Some(condition) = &field.condition {
                let scope = Scope {
                    structure: StructId(s),
                    visible: f,
                };
                let owner = format!("{}.{}", def.name, field.name);
                field_links.push((s, f, link_expression(schema, &owner, Some(scope), condition)?));
            }
        }
    }
    for (i, expr) in type_links {
        if let Some(slot) = length_expression_mut(&mut schema.types[i].kind) {
            *slot = expr;
        }
    }
    for (s, f, expr) in field_links {
        schema.structures[s].fields[f].condition = Some(expr);
    }

    validate_sequences(schema)
}

fn sequence_of(kind: &TypeKind) -> Option<&SequenceType> {
    match kind {
        TypeKind::Stream(seq) | TypeKind::Sequence(seq) => Some(seq),
        TypeKind::String(s) => Some(&s.sequence),
        _ => None,
    }
}

fn length_expression(kind: &TypeKind) -> Option<&Expression> {
    match &sequence_of(kind)?.length {
        Some(Length::Count(SizeExpr::Expression(e)) | Length::DataSize(SizeExpr::Expression(e))) => {
            Some(e)
        }
        _ => None,
    }
}

fn length_expression_mut(kind: &mut TypeKind) -> Option<&mut Expression> {
    let seq = match kind {
        TypeKind::Stream(seq) | TypeKind::Sequence(seq) => seq,
        TypeKind::String(s) => &mut s.sequence,
        _ => return None,
    };
    match &mut seq.length {
        Some(Length::Count(SizeExpr::Expression(e)) | Length::DataSize(SizeExpr::Expression(e))) => {
            Some(e)
        }
        _ => None,
    }
}

fn validate_sequences(schema: &Schema) -> Result<(), SchemaError> {
    for def in &schema.types {
        let Some(seq) = sequence_of(&def.kind) else {
            continue;
        };
        let element_size = schema.byte_size(seq.element);
        let byte_run = !matches!(def.kind, TypeKind::Sequence(_));
        if byte_run && !matches!(element_size, Some(n) if n > 0) {
            return Err(SchemaError::invalid(
                &def.name,
                format!(
                    "element type '{}' of a {} must have a fixed size",
                    schema.type_def(seq.element).name,
                    def.kind.kind_name()
                ),
            ));
        }
        if let Some(terminator) = &seq.terminator
            && element_size != Some(terminator.len())
        {
            return Err(SchemaError::invalid(
                &def.name,
                format!(
                    "elements_terminator of {} bytes does not match the element size",
                    terminator.len()
                ),
            ));
        }
    }
    Ok(())
}

fn build_group(schema: &Schema, group: LinkGroup) -> Result<StructureGroupDefinition, SchemaError> {
    let LinkGroup {
        name,
        description,
        decl,
    } = group;
    let structure = |type_name: &str| -> Result<StructId, SchemaError> {
        match schema.type_id(type_name) {
            None => Err(SchemaError::UnknownType {
                name: type_name.to_string(),
                referenced_by: name.clone(),
            }),
            Some(_) => schema.structure_id(type_name).ok_or_else(|| {
                SchemaError::invalid(&name, format!("'{type_name}' is not a structure"))
            }),
        }
    };
    let base = structure(&decl.base)?;
    let base_def = schema.structure_def(base);
    let identifier = base_def.field_index(&decl.identifier).ok_or_else(|| {
        SchemaError::invalid(
            &name,
            format!("base '{}' has no identifier member '{}'", decl.base, decl.identifier),
        )
    })?;
    let identifier_is_stream = matches!(
        schema.type_def(base_def.fields[identifier].ty).kind,
        TypeKind::Stream(_)
    );
    let default = decl.default.as_deref().map(structure).transpose()?;

    let mut members = Vec::with_capacity(decl.members.len());
    let mut variants = HashMap::new();
    for member_name in &decl.members {
        let member = structure(member_name)?;
        let field = schema
            .structure_def(member)
            .field(&decl.identifier)
            .ok_or_else(|| {
                SchemaError::invalid(
                    &name,
                    format!("member '{member_name}' has no member '{}'", decl.identifier),
                )
            })?;
        let literals: Vec<&LiteralValue> = field.value.iter().chain(&field.values).collect();
        if literals.is_empty() && Some(member) != default {
            return Err(SchemaError::invalid(
                &name,
                format!(
                    "member '{member_name}' does not constrain '{}' to a value",
                    decl.identifier
                ),
            ));
        }
        for literal in literals {
            let key = discriminant_key(&name, literal, identifier_is_stream)?;
            if let Some(previous) = variants.insert(key.clone(), member)
                && previous != member
            {
                return Err(SchemaError::invalid(
                    &name,
                    format!(
                        "discriminant {key} is claimed by '{}' and '{member_name}'",
                        schema.structure_def(previous).name
                    ),
                ));
            }
        }
        members.push(member);
    }
    Ok(StructureGroupDefinition {
        name,
        description,
        base,
        identifier,
        members,
        default,
        variants,
    })
}

fn discriminant_key(
    group: &str,
    literal: &LiteralValue,
    stream: bool,
) -> Result<DiscriminantKey, SchemaError> {
    Ok(match literal {
        LiteralValue::Integer(v) => DiscriminantKey::Int(*v),
        LiteralValue::Bool(v) => DiscriminantKey::Bool(*v),
        LiteralValue::Bytes(b) => DiscriminantKey::Bytes(b.clone()),
        LiteralValue::Text(s) if stream => DiscriminantKey::Bytes(latin1_bytes(s).ok_or_else(
            || SchemaError::invalid(group, format!("{s:?} is not a byte string")),
        )?),
        LiteralValue::Text(s) => DiscriminantKey::Text(s.clone()),
    })
}

fn link_expression(
    schema: &Schema,
    owner: &str,
    scope: Option<Scope>,
    expr: &Expression,
) -> Result<Expression, SchemaError> {
    let invalid = |detail: String| SchemaError::InvalidExpression {
        name: owner.to_string(),
        expression: expr.source().to_string(),
        detail,
    };
    let root = expr.root().clone().try_map_leaves(&mut |leaf| match leaf {
        Expr::Name(parts) => link_name(schema, scope, &parts).map_err(invalid),
        Expr::SizeOf(type_name) => {
            let id = schema
                .type_id(&type_name)
                .ok_or_else(|| invalid(format!("SIZEOF of unknown type '{type_name}'")))?;
            let size = schema
                .byte_size(id)
                .ok_or_else(|| invalid(format!("'{type_name}' has no fixed size")))?;
            Ok(Expr::Int(size as i128))
        }
        other => Ok(other),
    })?;
    Ok(Expression::new(expr.source(), root))
}

fn link_name(schema: &Schema, scope: Option<Scope>, parts: &[String]) -> Result<Expr, String> {
    let text = parts.join(".");
    let (first, rest) = parts
        .split_first()
        .ok_or_else(|| "empty name".to_string())?;

    if let Some(scope) = scope {
        let current = schema.structure_def(scope.structure);
        if let Some(index) = current.field_index(first) {
            return sibling(scope, index, rest, text);
        }
        if *first == current.name
            && let Some((field, path)) = rest.split_first()
        {
            let index = current
                .field_index(field)
                .ok_or_else(|| format!("structure '{first}' has no member '{field}'"))?;
            return sibling(scope, index, path, text);
        }
    }

    if rest.is_empty() {
        if let Some(value) = schema.constant(first) {
            return Ok(Expr::Int(value));
        }
        if schema.structures.iter().any(|s| s.field_index(first).is_some()) {
            return Ok(Expr::Field(FieldRef::Nearest {
                name: first.clone(),
            }));
        }
        return Err(format!("unknown name '{first}'"));
    }

    if let Some(structure) = schema.structure_id(first) {
        let (field, path) = rest
            .split_first()
            .ok_or_else(|| format!("'{text}' names a structure, not a member"))?;
        let index = schema
            .structure_def(structure)
            .field_index(field)
            .ok_or_else(|| format!("structure '{first}' has no member '{field}'"))?;
        return Ok(Expr::Field(FieldRef::Enclosing {
            structure,
            index,
            path: path.to_vec(),
            text,
        }));
    }

    if let Some(enumeration) = schema.enumeration(first)
        && let [value] = rest
    {
        return enumeration
            .value_of(value)
            .map(Expr::Int)
            .ok_or_else(|| format!("enumeration '{first}' has no value '{value}'"));
    }

    Err(format!("unknown name '{text}'"))
}

fn sibling(scope: Scope, index: usize, path: &[String], text: String) -> Result<Expr, String> {
    if index >= scope.visible {
        return Err(format!("'{text}' refers to a member that is not decoded yet"));
    }
    Ok(Expr::Field(FieldRef::Sibling {
        index,
        path: path.to_vec(),
        text,
    }))
}
