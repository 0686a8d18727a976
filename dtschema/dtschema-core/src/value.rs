//! Decoded field values.

use std::sync::Arc;

use crate::{Guid, error::ValueTypeError, record::DecodedRecord};

/// Value produced by the structure decoder.
/// Integer widths are preserved; no lossy conversions.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Char(char),
    String(Arc<str>),
    /// Raw bytes of a stream field.
    Bytes(Arc<[u8]>),
    Guid(Guid),
    Sequence(Vec<Value>),
    Struct(Box<DecodedRecord>),
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Self {
        Self::String(Arc::from(s.as_ref()))
    }

    pub fn bytes(b: impl AsRef<[u8]>) -> Self {
        Self::Bytes(Arc::from(b.as_ref()))
    }

    /// Shift nested record ranges by `base`.
    pub(crate) fn rebase(&mut self, base: usize) {
        match self {
            Value::Struct(record) => record.rebase(base),
            Value::Sequence(items) => items.iter_mut().for_each(|v| v.rebase(base)),
            _ => {}
        }
    }

    /// Integer value widened to `i128`, `None` for non-integer values.
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Value::I8(v) => Some(i128::from(*v)),
            Value::I16(v) => Some(i128::from(*v)),
            Value::I32(v) => Some(i128::from(*v)),
            Value::I64(v) => Some(i128::from(*v)),
            Value::U8(v) => Some(i128::from(*v)),
            Value::U16(v) => Some(i128::from(*v)),
            Value::U32(v) => Some(i128::from(*v)),
            Value::U64(v) => Some(i128::from(*v)),
            _ => None,
        }
    }

    pub fn try_integer(&self) -> Result<i128, ValueTypeError> {
        self.as_integer()
            .ok_or_else(|| self.type_mismatch("integer"))
    }

    pub fn try_u8(&self) -> Result<u8, ValueTypeError> {
        match self {
            Value::U8(v) => Ok(*v),
            _ => Err(self.type_mismatch("U8")),
        }
    }

    pub fn try_u16(&self) -> Result<u16, ValueTypeError> {
        match self {
            Value::U16(v) => Ok(*v),
            _ => Err(self.type_mismatch("U16")),
        }
    }

    pub fn try_u32(&self) -> Result<u32, ValueTypeError> {
        match self {
            Value::U32(v) => Ok(*v),
            _ => Err(self.type_mismatch("U32")),
        }
    }

    pub fn try_u64(&self) -> Result<u64, ValueTypeError> {
        match self {
            Value::U64(v) => Ok(*v),
            _ => Err(self.type_mismatch("U64")),
        }
    }

    pub fn try_i32(&self) -> Result<i32, ValueTypeError> {
        match self {
            Value::I32(v) => Ok(*v),
            _ => Err(self.type_mismatch("I32")),
        }
    }

    pub fn try_i64(&self) -> Result<i64, ValueTypeError> {
        match self {
            Value::I64(v) => Ok(*v),
            _ => Err(self.type_mismatch("I64")),
        }
    }

    pub fn try_bool(&self) -> Result<bool, ValueTypeError> {
        match self {
            Value::Bool(v) => Ok(*v),
            _ => Err(self.type_mismatch("Bool")),
        }
    }

    pub fn try_f64(&self) -> Result<f64, ValueTypeError> {
        match self {
            Value::F64(v) => Ok(*v),
            Value::F32(v) => Ok(f64::from(*v)),
            _ => Err(self.type_mismatch("F64")),
        }
    }

    pub fn try_str(&self) -> Result<&str, ValueTypeError> {
        match self {
            Value::String(v) => Ok(v.as_ref()),
            _ => Err(self.type_mismatch("String")),
        }
    }

    pub fn try_bytes(&self) -> Result<&[u8], ValueTypeError> {
        match self {
            Value::Bytes(v) => Ok(v.as_ref()),
            _ => Err(self.type_mismatch("Bytes")),
        }
    }

    pub fn try_guid(&self) -> Result<Guid, ValueTypeError> {
        match self {
            Value::Guid(v) => Ok(*v),
            _ => Err(self.type_mismatch("Guid")),
        }
    }

    pub fn try_sequence(&self) -> Result<&[Value], ValueTypeError> {
        match self {
            Value::Sequence(v) => Ok(v.as_slice()),
            _ => Err(self.type_mismatch("Sequence")),
        }
    }

    pub fn try_record(&self) -> Result<&DecodedRecord, ValueTypeError> {
        match self {
            Value::Struct(v) => Ok(v.as_ref()),
            _ => Err(self.type_mismatch("Struct")),
        }
    }

    pub fn type_mismatch(&self, expected: impl Into<String>) -> ValueTypeError {
        ValueTypeError::new(expected, self.variant_name())
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "Bool",
            Value::I8(_) => "I8",
            Value::I16(_) => "I16",
            Value::I32(_) => "I32",
            Value::I64(_) => "I64",
            Value::U8(_) => "U8",
            Value::U16(_) => "U16",
            Value::U32(_) => "U32",
            Value::U64(_) => "U64",
            Value::F32(_) => "F32",
            Value::F64(_) => "F64",
            Value::Char(_) => "Char",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::Guid(_) => "Guid",
            Value::Sequence(_) => "Sequence",
            Value::Struct(_) => "Struct",
        }
    }
}
