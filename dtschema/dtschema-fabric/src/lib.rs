//! Schema resolution, expression evaluation and structure decoding for
//! dtFabric-style data type definitions.
//!
//! Key components:
//! - [`ast`]: declarations produced by schema-text parsers
//! - [`expr`]: size/condition expression parser and evaluator
//! - [`resolve`]: [`ast::FormatDecl`] → linked [`Schema`]
//! - [`Decoder`]: byte buffer → [`dtschema_core::DecodedRecord`], including
//!   structure-group dispatch
//! - [`Encoder`]: [`dtschema_core::DecodedRecord`] → bytes

pub mod ast;
mod decoder;
mod encoder;
pub mod expr;
mod group;
mod model;
mod primitive;
mod resolver;

pub use decoder::{DEFAULT_MAX_DEPTH, DecodeOptions, Decoder};
pub use encoder::Encoder;
pub use model::{
    BooleanType, CharacterType, DiscriminantKey, EnumerationDefinition, EnumerationValue,
    FieldDefinition, FloatType, GroupId, IntegerType, Layout, Length, RecordType, Schema,
    SequenceType, SizeExpr, StringType, StructId, StructureDefinition, StructureGroupDefinition,
    TypeDefinition, TypeId, TypeKind,
};
pub use resolver::{lookup_encoding, resolve};
