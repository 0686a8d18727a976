//! Format-agnostic core types for `dtschema`.
//!
//! This crate provides the decoded intermediate representation
//! ([`Value`] / [`DecodedRecord`]), [`ByteOrder`], [`Guid`] and the error
//! enums shared by the schema loader, decoder and encoder.

mod byte_order;
mod error;
mod guid;
mod record;
mod value;

pub use byte_order::ByteOrder;
pub use error::{DecodeError, EncodeError, SchemaError, ValueTypeError};
pub use guid::Guid;
pub use record::DecodedRecord;
pub use value::Value;
