//! Resolved, immutable schema of one format.
//!
//! Definitions live in arena vectors addressed by [`TypeId`], [`StructId`]
//! and [`GroupId`]. A [`Schema`] is produced by [`crate::resolve`] and never
//! mutated afterwards, so it can be shared across threads behind an `Arc`.

use std::{collections::HashMap, fmt};

use dtschema_core::{ByteOrder, SchemaError, Value};
use encoding::EncodingRef;
use indexmap::IndexMap;

use crate::{ast::LiteralValue, expr::Expression};

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) usize);

        impl $name {
            pub fn index(self) -> usize {
                self.0
            }
        }
    };
}

arena_id!(
    /// Index of a [`TypeDefinition`] in its [`Schema`].
    TypeId
);
arena_id!(
    /// Index of a [`StructureDefinition`] in its [`Schema`].
    StructId
);
arena_id!(
    /// Index of a [`StructureGroupDefinition`] in its [`Schema`].
    GroupId
);

#[derive(Debug, Clone)]
pub struct TypeDefinition {
    /// Declared name, or `structure.member` for inline member types.
    pub name: String,
    pub description: Option<String>,
    pub kind: TypeKind,
}

#[derive(Debug, Clone)]
pub enum TypeKind {
    Integer(IntegerType),
    FloatingPoint(FloatType),
    Boolean(BooleanType),
    Character(CharacterType),
    Uuid { byte_order: Option<ByteOrder> },
    Stream(SequenceType),
    Sequence(SequenceType),
    String(StringType),
    Padding { alignment_size: usize },
    Structure(StructId),
    Group(GroupId),
}

impl TypeKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            TypeKind::Integer(_) => "integer",
            TypeKind::FloatingPoint(_) => "floating-point",
            TypeKind::Boolean(_) => "boolean",
            TypeKind::Character(_) => "character",
            TypeKind::Uuid { .. } => "uuid",
            TypeKind::Stream(_) => "stream",
            TypeKind::Sequence(_) => "sequence",
            TypeKind::String(_) => "string",
            TypeKind::Padding { .. } => "padding",
            TypeKind::Structure(_) => "structure",
            TypeKind::Group(_) => "structure-group",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegerType {
    pub size: usize,
    pub signed: bool,
    pub byte_order: Option<ByteOrder>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatType {
    pub size: usize,
    pub byte_order: Option<ByteOrder>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BooleanType {
    pub size: usize,
    pub byte_order: Option<ByteOrder>,
    pub false_value: u64,
    pub true_value: Option<u64>,
}

impl BooleanType {
    /// Interpret a raw value; `None` when `true_value` is declared and `raw`
    /// matches neither value.
    pub fn interpret(&self, raw: u64) -> Option<bool> {
        match self.true_value {
            _ if raw == self.false_value => Some(false),
            Some(true_value) => (raw == true_value).then_some(true),
            None => Some(true),
        }
    }

    /// Raw value written for `value`.
    pub fn raw(&self, value: bool) -> u64 {
        match (value, self.true_value) {
            (false, _) => self.false_value,
            (true, Some(true_value)) => true_value,
            (true, None) if self.false_value == 0 => 1,
            (true, None) => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacterType {
    pub size: usize,
    pub byte_order: Option<ByteOrder>,
}

/// Literal or linked expression giving an element count or byte size.
#[derive(Debug, Clone, PartialEq)]
pub enum SizeExpr {
    Literal(u64),
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Length {
    /// `number_of_elements`
    Count(SizeExpr),
    /// `elements_data_size`
    DataSize(SizeExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceType {
    pub element: TypeId,
    /// `None` means the run ends at `terminator`.
    pub length: Option<Length>,
    pub terminator: Option<Vec<u8>>,
    pub clamp_negative_size: bool,
}

#[derive(Clone)]
pub struct StringType {
    pub sequence: SequenceType,
    /// Label as declared in the schema.
    pub encoding_label: String,
    pub encoding: EncodingRef,
}

impl fmt::Debug for StringType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringType")
            .field("sequence", &self.sequence)
            .field("encoding", &self.encoding_label)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Sequential,
    /// Union: every member starts at the structure's start offset.
    Overlay,
}

#[derive(Debug, Clone)]
pub struct StructureDefinition {
    pub name: String,
    pub description: Option<String>,
    pub byte_order: Option<ByteOrder>,
    pub layout: Layout,
    pub fields: Vec<FieldDefinition>,
    pub(crate) field_index: HashMap<String, usize>,
}

impl StructureDefinition {
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.field_index(name).map(|i| &self.fields[i])
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_index.get(name).copied()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeId,
    /// Field is skipped when this evaluates to false.
    pub condition: Option<Expression>,
    /// Fixed value the decoded field must equal.
    pub value: Option<LiteralValue>,
    /// Allow-list of permitted values.
    pub values: Vec<LiteralValue>,
}

impl FieldDefinition {
    pub fn has_constraint(&self) -> bool {
        self.value.is_some() || !self.values.is_empty()
    }

    /// Whether `value` satisfies the `value` / `values` constraints.
    pub fn accepts(&self, value: &Value) -> bool {
        if let Some(expected) = &self.value
            && !expected.matches(value)
        {
            return false;
        }
        self.values.is_empty() || self.values.iter().any(|v| v.matches(value))
    }

    /// Human-readable form of the constraint for error messages.
    pub fn describe_constraint(&self) -> String {
        match &self.value {
            Some(value) => value.to_string(),
            None => {
                let values: Vec<_> = self.values.iter().map(ToString::to_string).collect();
                format!("one of [{}]", values.join(", "))
            }
        }
    }
}

/// Key of a structure-group variant table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DiscriminantKey {
    Int(i128),
    Bool(bool),
    Bytes(Vec<u8>),
    Text(String),
}

impl DiscriminantKey {
    /// Key of a decoded discriminant value.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(Self::Bool(*v)),
            Value::Char(c) => Some(Self::Int(i128::from(u32::from(*c)))),
            Value::Bytes(b) => Some(Self::Bytes(b.to_vec())),
            Value::String(s) => Some(Self::Text(s.to_string())),
            other => other.as_integer().map(Self::Int),
        }
    }
}

impl fmt::Display for DiscriminantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v} (0x{v:x})"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Bytes(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Self::Text(s) => write!(f, "{s:?}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StructureGroupDefinition {
    pub name: String,
    pub description: Option<String>,
    pub base: StructId,
    /// Index of the identifier field in the base structure.
    pub identifier: usize,
    pub members: Vec<StructId>,
    pub default: Option<StructId>,
    pub(crate) variants: HashMap<DiscriminantKey, StructId>,
}

impl StructureGroupDefinition {
    /// Variant registered for `key`, falling back to the default member.
    pub fn variant_for(&self, key: &DiscriminantKey) -> Option<StructId> {
        self.variants.get(key).copied().or(self.default)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumerationDefinition {
    pub name: String,
    pub description: Option<String>,
    pub values: Vec<EnumerationValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumerationValue {
    pub name: String,
    pub number: i128,
    pub description: Option<String>,
}

impl EnumerationDefinition {
    pub fn name_of(&self, number: i128) -> Option<&str> {
        self.values
            .iter()
            .find(|v| v.number == number)
            .map(|v| v.name.as_str())
    }

    pub fn value_of(&self, name: &str) -> Option<i128> {
        self.values.iter().find(|v| v.name == name).map(|v| v.number)
    }
}

/// Root of a decode: a structure or a structure-group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Structure(StructId),
    Group(GroupId),
}

/// Maximum nesting followed when computing static sizes.
const MAX_SIZE_DEPTH: usize = 64;

#[derive(Debug, Clone)]
pub struct Schema {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) types: Vec<TypeDefinition>,
    pub(crate) structures: Vec<StructureDefinition>,
    pub(crate) groups: Vec<StructureGroupDefinition>,
    pub(crate) enumerations: IndexMap<String, EnumerationDefinition>,
    pub(crate) constants: IndexMap<String, i128>,
    pub(crate) names: IndexMap<String, TypeId>,
}

impl Schema {
    /// Format name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn type_id(&self, name: &str) -> Option<TypeId> {
        self.names.get(name).copied()
    }

    /// Look up a named type definition.
    pub fn resolve(&self, name: &str) -> Result<&TypeDefinition, SchemaError> {
        self.type_id(name)
            .map(|id| self.type_def(id))
            .ok_or_else(|| SchemaError::UnknownType {
                name: name.to_string(),
                referenced_by: self.name.clone(),
            })
    }

    pub fn type_def(&self, id: TypeId) -> &TypeDefinition {
        &self.types[id.0]
    }

    pub fn structure_def(&self, id: StructId) -> &StructureDefinition {
        &self.structures[id.0]
    }

    pub fn group_def(&self, id: GroupId) -> &StructureGroupDefinition {
        &self.groups[id.0]
    }

    pub fn structure_id(&self, name: &str) -> Option<StructId> {
        match self.type_id(name).map(|id| &self.type_def(id).kind) {
            Some(TypeKind::Structure(sid)) => Some(*sid),
            _ => None,
        }
    }

    /// Look up a structure by name; fails with `UnknownStructure`.
    pub fn structure(&self, name: &str) -> Result<&StructureDefinition, SchemaError> {
        self.structure_id(name)
            .map(|id| self.structure_def(id))
            .ok_or_else(|| self.unknown_structure(name))
    }

    pub fn group(&self, name: &str) -> Result<&StructureGroupDefinition, SchemaError> {
        match self.type_id(name).map(|id| &self.type_def(id).kind) {
            Some(TypeKind::Group(gid)) => Ok(self.group_def(*gid)),
            _ => Err(self.unknown_structure(name)),
        }
    }

    /// Structure or structure-group named `name`.
    pub fn record_type(&self, name: &str) -> Result<RecordType, SchemaError> {
        match self.type_id(name).map(|id| &self.type_def(id).kind) {
            Some(TypeKind::Structure(sid)) => Ok(RecordType::Structure(*sid)),
            Some(TypeKind::Group(gid)) => Ok(RecordType::Group(*gid)),
            _ => Err(self.unknown_structure(name)),
        }
    }

    pub fn enumeration(&self, name: &str) -> Option<&EnumerationDefinition> {
        self.enumerations.get(name)
    }

    pub fn constant(&self, name: &str) -> Option<i128> {
        self.constants.get(name).copied()
    }

    /// Named definitions in declaration order (enumerations and constants
    /// excluded).
    pub fn types(&self) -> impl Iterator<Item = (&str, &TypeDefinition)> {
        self.names
            .iter()
            .map(|(name, id)| (name.as_str(), self.type_def(*id)))
    }

    pub fn structures(&self) -> impl Iterator<Item = &StructureDefinition> {
        self.structures.iter()
    }

    /// Fixed byte width of a type when it is known without decoding.
    pub fn byte_size(&self, id: TypeId) -> Option<usize> {
        self.byte_size_at(id, 0)
    }

    pub fn structure_byte_size(&self, id: StructId) -> Option<usize> {
        self.structure_size_at(id, 0)
    }

    fn byte_size_at(&self, id: TypeId, depth: usize) -> Option<usize> {
        if depth > MAX_SIZE_DEPTH {
            return None;
        }
        match &self.type_def(id).kind {
            TypeKind::Integer(t) => Some(t.size),
            TypeKind::FloatingPoint(t) => Some(t.size),
            TypeKind::Boolean(t) => Some(t.size),
            TypeKind::Character(t) => Some(t.size),
            TypeKind::Uuid { .. } => Some(16),
            TypeKind::Stream(seq) | TypeKind::Sequence(seq) => self.sequence_size_at(seq, depth),
            TypeKind::String(s) => self.sequence_size_at(&s.sequence, depth),
            TypeKind::Padding { .. } | TypeKind::Group(_) => None,
            TypeKind::Structure(sid) => self.structure_size_at(*sid, depth + 1),
        }
    }

    fn sequence_size_at(&self, seq: &SequenceType, depth: usize) -> Option<usize> {
        match &seq.length {
            Some(Length::DataSize(SizeExpr::Literal(n))) => usize::try_from(*n).ok(),
            Some(Length::Count(SizeExpr::Literal(n))) if seq.terminator.is_none() => {
                let element = self.byte_size_at(seq.element, depth + 1)?;
                usize::try_from(*n).ok()?.checked_mul(element)
            }
            _ => None,
        }
    }

    fn structure_size_at(&self, id: StructId, depth: usize) -> Option<usize> {
        let def = self.structure_def(id);
        let mut sizes = def.fields.iter().map(|f| {
            if f.condition.is_some() {
                None
            } else {
                self.byte_size_at(f.ty, depth)
            }
        });
        match def.layout {
            Layout::Sequential => sizes.try_fold(0usize, |acc, s| acc.checked_add(s?)),
            Layout::Overlay => sizes.try_fold(0usize, |acc, s| Some(acc.max(s?))),
        }
    }

    pub(crate) fn unknown_structure(&self, name: &str) -> SchemaError {
        SchemaError::UnknownStructure {
            format: self.name.clone(),
            name: name.to_string(),
        }
    }
}
