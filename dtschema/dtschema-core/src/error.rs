//! Error types shared by the schema loader, decoder and encoder.

/// Error raised while loading or resolving schema definitions.
///
/// Loading is atomic: any of these aborts the whole load.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    /// Declarative input is malformed (bad YAML, unknown key, wrong shape).
    #[error("failed to parse schema '{source_name}': {detail}")]
    Parse { source_name: String, detail: String },

    /// Two definitions share a name within one format.
    #[error("duplicate definition '{name}' in format '{format}'")]
    DuplicateDefinition { format: String, name: String },

    /// A definition references a type name that does not exist.
    #[error("unknown type '{name}' referenced by '{referenced_by}'")]
    UnknownType { name: String, referenced_by: String },

    /// A structure (or structure-group) lookup failed.
    #[error("unknown structure '{name}' in format '{format}'")]
    UnknownStructure { format: String, name: String },

    #[error("unknown format '{name}'")]
    UnknownFormat { name: String },

    /// A definition is well-formed but semantically invalid.
    #[error("invalid definition '{name}': {detail}")]
    InvalidDefinition { name: String, detail: String },

    /// A size or condition expression failed to parse or link.
    #[error("invalid expression '{expression}' in '{name}': {detail}")]
    InvalidExpression {
        name: String,
        expression: String,
        detail: String,
    },
}

impl SchemaError {
    pub fn invalid(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            name: name.into(),
            detail: detail.into(),
        }
    }
}

/// Error raised while decoding a byte buffer.
///
/// `path` locates the field (`structure.field[3].member`) and `offset` is the
/// absolute byte offset in the decoded buffer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("insufficient data at {path} (offset {offset}): need {needed} bytes, {available} available")]
    InsufficientData {
        path: String,
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("size mismatch at {path} (offset {offset}): {detail}")]
    SizeMismatch {
        path: String,
        offset: usize,
        detail: String,
    },

    #[error("constraint violation at {path} (offset {offset}): expected {expected}, found {actual}")]
    ConstraintViolation {
        path: String,
        offset: usize,
        expected: String,
        actual: String,
    },

    #[error("unknown variant of structure group '{group}' at {path} (offset {offset}): discriminant {discriminant}")]
    UnknownVariant {
        path: String,
        offset: usize,
        group: String,
        discriminant: String,
    },

    #[error("unresolved reference '{reference}' at {path} (offset {offset})")]
    UnresolvedReference {
        path: String,
        offset: usize,
        reference: String,
    },

    #[error("type mismatch at {path} (offset {offset}): {detail}")]
    TypeMismatch {
        path: String,
        offset: usize,
        detail: String,
    },

    #[error("arithmetic error at {path} (offset {offset}): {detail}")]
    Arithmetic {
        path: String,
        offset: usize,
        detail: String,
    },

    #[error("unterminated string at {path} (offset {offset})")]
    UnterminatedString { path: String, offset: usize },

    #[error("invalid string at {path} (offset {offset}): {detail}")]
    InvalidString {
        path: String,
        offset: usize,
        detail: String,
    },

    #[error("invalid boolean value 0x{raw:x} at {path} (offset {offset})")]
    InvalidBooleanValue {
        path: String,
        offset: usize,
        raw: u64,
    },

    #[error("nesting depth limit {limit} exceeded at {path} (offset {offset})")]
    RecursionLimit {
        path: String,
        offset: usize,
        limit: usize,
    },
}

impl DecodeError {
    /// Field path the error was raised at.
    pub fn path(&self) -> &str {
        match self {
            Self::InsufficientData { path, .. }
            | Self::SizeMismatch { path, .. }
            | Self::ConstraintViolation { path, .. }
            | Self::UnknownVariant { path, .. }
            | Self::UnresolvedReference { path, .. }
            | Self::TypeMismatch { path, .. }
            | Self::Arithmetic { path, .. }
            | Self::UnterminatedString { path, .. }
            | Self::InvalidString { path, .. }
            | Self::InvalidBooleanValue { path, .. }
            | Self::RecursionLimit { path, .. } => path,
        }
    }

    /// Absolute byte offset the error was raised at.
    pub fn offset(&self) -> usize {
        match self {
            Self::InsufficientData { offset, .. }
            | Self::SizeMismatch { offset, .. }
            | Self::ConstraintViolation { offset, .. }
            | Self::UnknownVariant { offset, .. }
            | Self::UnresolvedReference { offset, .. }
            | Self::TypeMismatch { offset, .. }
            | Self::Arithmetic { offset, .. }
            | Self::UnterminatedString { offset, .. }
            | Self::InvalidString { offset, .. }
            | Self::InvalidBooleanValue { offset, .. }
            | Self::RecursionLimit { offset, .. } => *offset,
        }
    }

    /// Shift the offset by `base`, for buffers that start at `base` within a
    /// larger source.
    pub fn rebase(mut self, base: usize) -> Self {
        match &mut self {
            Self::InsufficientData { offset, .. }
            | Self::SizeMismatch { offset, .. }
            | Self::ConstraintViolation { offset, .. }
            | Self::UnknownVariant { offset, .. }
            | Self::UnresolvedReference { offset, .. }
            | Self::TypeMismatch { offset, .. }
            | Self::Arithmetic { offset, .. }
            | Self::UnterminatedString { offset, .. }
            | Self::InvalidString { offset, .. }
            | Self::InvalidBooleanValue { offset, .. }
            | Self::RecursionLimit { offset, .. } => *offset = offset.saturating_add(base),
        }
        self
    }

    /// Total buffer length that would have satisfied the failed read, if the
    /// error was caused by running out of data.
    pub fn required_len(&self) -> Option<usize> {
        match self {
            Self::InsufficientData { offset, needed, .. } => offset.checked_add(*needed),
            _ => None,
        }
    }
}

/// Error raised while encoding a record back into bytes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    #[error("missing field {path}")]
    MissingField { path: String },

    #[error("type mismatch at {path}: {detail}")]
    TypeMismatch { path: String, detail: String },

    #[error("cannot encode {path}: {detail}")]
    Unsupported { path: String, detail: String },

    /// A condition or size expression failed while encoding.
    #[error("expression failed at {path}: {detail}")]
    Expression { path: String, detail: String },
}

/// Returned by the typed accessors on [`Value`](crate::Value).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("value type mismatch: expected {expected}, found {actual}")]
pub struct ValueTypeError {
    pub expected: String,
    pub actual: String,
}

impl ValueTypeError {
    pub fn new(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
