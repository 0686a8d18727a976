//! Declaration types produced by schema-text parsers.
//!
//! A parser (e.g. `dtschema-yaml`) turns declarative input into a
//! [`FormatDecl`]; [`crate::resolve`] then links names and expressions into a
//! [`crate::Schema`]. Nothing here is resolved: type names and expressions are
//! kept as written.

use std::fmt;

use dtschema_core::{ByteOrder, Value};

/// All definitions of one format, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormatDecl {
    pub name: String,
    pub description: Option<String>,
    pub definitions: Vec<TypeDecl>,
}

/// One named definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub name: String,
    pub description: Option<String>,
    pub kind: TypeDeclKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeDeclKind {
    Integer(IntegerDecl),
    FloatingPoint(FloatDecl),
    Boolean(BooleanDecl),
    Character(CharacterDecl),
    Uuid { byte_order: Option<ByteOrder> },
    Stream(SequenceDecl),
    Sequence(SequenceDecl),
    String(StringDecl),
    Padding { alignment_size: usize },
    Structure(StructureDecl),
    /// Members overlaid at the same offset.
    Union(StructureDecl),
    StructureGroup(GroupDecl),
    Enumeration(EnumerationDecl),
    Constant { value: i128 },
}

impl TypeDeclKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::FloatingPoint(_) => "floating-point",
            Self::Boolean(_) => "boolean",
            Self::Character(_) => "character",
            Self::Uuid { .. } => "uuid",
            Self::Stream(_) => "stream",
            Self::Sequence(_) => "sequence",
            Self::String(_) => "string",
            Self::Padding { .. } => "padding",
            Self::Structure(_) => "structure",
            Self::Union(_) => "union",
            Self::StructureGroup(_) => "structure-group",
            Self::Enumeration(_) => "enumeration",
            Self::Constant { .. } => "constant",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntegerDecl {
    pub size: usize,
    pub signed: bool,
    pub byte_order: Option<ByteOrder>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FloatDecl {
    pub size: usize,
    pub byte_order: Option<ByteOrder>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BooleanDecl {
    pub size: usize,
    pub byte_order: Option<ByteOrder>,
    pub false_value: u64,
    /// When set, only `true_value` and `false_value` are accepted.
    pub true_value: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CharacterDecl {
    pub size: usize,
    pub byte_order: Option<ByteOrder>,
}

/// Element count or byte size as written: a literal or an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum SizeDecl {
    Literal(u64),
    Expression(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceDecl {
    pub element_data_type: String,
    pub number_of_elements: Option<SizeDecl>,
    pub elements_data_size: Option<SizeDecl>,
    pub elements_terminator: Option<Vec<u8>>,
    /// Negative count or size evaluates to zero instead of failing.
    pub clamp_negative_size: bool,
}

impl SequenceDecl {
    pub fn new(element_data_type: impl Into<String>) -> Self {
        Self {
            element_data_type: element_data_type.into(),
            number_of_elements: None,
            elements_data_size: None,
            elements_terminator: None,
            clamp_negative_size: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringDecl {
    pub sequence: SequenceDecl,
    pub encoding: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructureDecl {
    pub byte_order: Option<ByteOrder>,
    pub members: Vec<MemberDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberDecl {
    pub name: String,
    pub description: Option<String>,
    pub ty: MemberType,
    pub condition: Option<String>,
    pub value: Option<LiteralValue>,
    pub values: Vec<LiteralValue>,
}

impl MemberDecl {
    pub fn named(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty: MemberType::Named(data_type.into()),
            condition: None,
            value: None,
            values: Vec::new(),
        }
    }

    pub fn inline(name: impl Into<String>, kind: TypeDeclKind) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty: MemberType::Inline(Box::new(kind)),
            condition: None,
            value: None,
            values: Vec::new(),
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_value(mut self, value: LiteralValue) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_values(mut self, values: Vec<LiteralValue>) -> Self {
        self.values = values;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberType {
    /// `data_type: <name>`
    Named(String),
    /// `type: <kind>` with the kind's keys on the member itself.
    Inline(Box<TypeDeclKind>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupDecl {
    pub base: String,
    pub identifier: String,
    pub members: Vec<String>,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumerationDecl {
    pub values: Vec<EnumerationValueDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumerationValueDecl {
    pub name: String,
    pub number: i128,
    pub description: Option<String>,
}

/// Literal used in `value` / `values` constraints.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Integer(i128),
    Bool(bool),
    /// Text; compared against byte values using its code points as bytes.
    Text(String),
    Bytes(Vec<u8>),
}

impl LiteralValue {
    /// Whether a decoded value equals this literal.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Integer(expected), Value::Char(c)) => *expected == i128::from(u32::from(*c)),
            (Self::Integer(expected), other) => other.as_integer() == Some(*expected),
            (Self::Bool(expected), Value::Bool(actual)) => expected == actual,
            (Self::Text(expected), Value::String(actual)) => expected.as_str() == &**actual,
            (Self::Text(expected), Value::Char(actual)) => {
                let mut chars = expected.chars();
                chars.next() == Some(*actual) && chars.next().is_none()
            }
            (Self::Text(expected), Value::Bytes(actual)) => {
                latin1_bytes(expected).is_some_and(|b| b == **actual)
            }
            (Self::Bytes(expected), Value::Bytes(actual)) => expected[..] == **actual,
            (Self::Bytes(expected), Value::String(actual)) => expected[..] == *actual.as_bytes(),
            _ => false,
        }
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) if *v < 0 => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "0x{v:x}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => {
                f.write_str("b\"")?;
                for byte in b {
                    write!(f, "\\x{byte:02x}")?;
                }
                f.write_str("\"")
            }
        }
    }
}

/// Bytes of a string whose code points are all below 256.
pub fn latin1_bytes(s: &str) -> Option<Vec<u8>> {
    s.chars().map(|c| u8::try_from(u32::from(c)).ok()).collect()
}
