//! Fixed-width primitive reads and writes.
//!
//! Callers hand in a slice that holds exactly the primitive's bytes; byte
//! order is already resolved against the enclosing structure.

use bytes::{Buf, BufMut};
use dtschema_core::{ByteOrder, Guid, Value};

use crate::model::{BooleanType, CharacterType, FloatType, IntegerType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PrimitiveError {
    Truncated,
    InvalidBoolean(u64),
    InvalidCharacter(u32),
    UnsupportedSize(usize),
}

type Result<T> = std::result::Result<T, PrimitiveError>;

fn truncated<E>(_: E) -> PrimitiveError {
    PrimitiveError::Truncated
}

pub(crate) fn read_unsigned(mut buf: &[u8], size: usize, order: ByteOrder) -> Result<u64> {
    let big = order.is_big_endian();
    match (size, big) {
        (1, _) => buf.try_get_u8().map(u64::from).map_err(truncated),
        (2, true) => buf.try_get_u16().map(u64::from).map_err(truncated),
        (2, false) => buf.try_get_u16_le().map(u64::from).map_err(truncated),
        (4, true) => buf.try_get_u32().map(u64::from).map_err(truncated),
        (4, false) => buf.try_get_u32_le().map(u64::from).map_err(truncated),
        (8, true) => buf.try_get_u64().map_err(truncated),
        (8, false) => buf.try_get_u64_le().map_err(truncated),
        (n, _) => Err(PrimitiveError::UnsupportedSize(n)),
    }
}

pub(crate) fn decode_integer(mut buf: &[u8], ty: &IntegerType, order: ByteOrder) -> Result<Value> {
    if !ty.signed {
        let raw = read_unsigned(buf, ty.size, order)?;
        return Ok(match ty.size {
            1 => Value::U8(raw as u8),
            2 => Value::U16(raw as u16),
            4 => Value::U32(raw as u32),
            _ => Value::U64(raw),
        });
    }
    let big = order.is_big_endian();
    match (ty.size, big) {
        (1, _) => buf.try_get_i8().map(Value::I8).map_err(truncated),
        (2, true) => buf.try_get_i16().map(Value::I16).map_err(truncated),
        (2, false) => buf.try_get_i16_le().map(Value::I16).map_err(truncated),
        (4, true) => buf.try_get_i32().map(Value::I32).map_err(truncated),
        (4, false) => buf.try_get_i32_le().map(Value::I32).map_err(truncated),
        (8, true) => buf.try_get_i64().map(Value::I64).map_err(truncated),
        (8, false) => buf.try_get_i64_le().map(Value::I64).map_err(truncated),
        (n, _) => Err(PrimitiveError::UnsupportedSize(n)),
    }
}

pub(crate) fn decode_float(mut buf: &[u8], ty: &FloatType, order: ByteOrder) -> Result<Value> {
    match (ty.size, order.is_big_endian()) {
        (4, true) => buf.try_get_f32().map(Value::F32).map_err(truncated),
        (4, false) => buf.try_get_f32_le().map(Value::F32).map_err(truncated),
        (8, true) => buf.try_get_f64().map(Value::F64).map_err(truncated),
        (8, false) => buf.try_get_f64_le().map(Value::F64).map_err(truncated),
        (n, _) => Err(PrimitiveError::UnsupportedSize(n)),
    }
}

pub(crate) fn decode_boolean(buf: &[u8], ty: &BooleanType, order: ByteOrder) -> Result<Value> {
    let raw = read_unsigned(buf, ty.size, order)?;
    ty.interpret(raw)
        .map(Value::Bool)
        .ok_or(PrimitiveError::InvalidBoolean(raw))
}

pub(crate) fn decode_character(buf: &[u8], ty: &CharacterType, order: ByteOrder) -> Result<Value> {
    let raw = read_unsigned(buf, ty.size, order)?;
    // Two-byte characters are single UTF-16 code units, so surrogates fail.
    let code = u32::try_from(raw).map_err(|_| PrimitiveError::InvalidCharacter(u32::MAX))?;
    char::from_u32(code)
        .map(Value::Char)
        .ok_or(PrimitiveError::InvalidCharacter(code))
}

pub(crate) fn decode_uuid(buf: &[u8], order: ByteOrder) -> Result<Value> {
    let bytes: [u8; 16] = buf.get(..16).ok_or(PrimitiveError::Truncated)?
        .try_into()
        .map_err(truncated)?;
    Ok(Value::Guid(Guid::from_stored(bytes, order.resolve())))
}

pub(crate) fn put_unsigned(out: &mut Vec<u8>, raw: u64, size: usize, order: ByteOrder) -> Result<()> {
    let big = order.is_big_endian();
    let fits = size >= 8 || raw >> (size * 8) == 0;
    if !fits {
        return Err(PrimitiveError::UnsupportedSize(size));
    }
    match (size, big) {
        (1, _) => out.put_u8(raw as u8),
        (2, true) => out.put_u16(raw as u16),
        (2, false) => out.put_u16_le(raw as u16),
        (4, true) => out.put_u32(raw as u32),
        (4, false) => out.put_u32_le(raw as u32),
        (8, true) => out.put_u64(raw),
        (8, false) => out.put_u64_le(raw),
        (n, _) => return Err(PrimitiveError::UnsupportedSize(n)),
    }
    Ok(())
}

/// Write an integer; `None` when `value` does not fit the declared width.
pub(crate) fn put_integer(out: &mut Vec<u8>, value: i128, ty: &IntegerType, order: ByteOrder) -> Option<()> {
    let bits = ty.size * 8;
    let raw = if ty.signed {
        let min = -(1i128 << (bits - 1));
        let max = (1i128 << (bits - 1)) - 1;
        if value < min || value > max {
            return None;
        }
        // Two's complement truncated to the field width.
        (value as u128 & (u128::MAX >> (128 - bits))) as u64
    } else {
        if value < 0 || (bits < 128 && value >> bits != 0) {
            return None;
        }
        u64::try_from(value).ok()?
    };
    put_unsigned(out, raw, ty.size, order).ok()
}

pub(crate) fn put_float(out: &mut Vec<u8>, value: f64, ty: &FloatType, order: ByteOrder) -> Option<()> {
    match (ty.size, order.is_big_endian()) {
        (4, true) => out.put_f32(value as f32),
        (4, false) => out.put_f32_le(value as f32),
        (8, true) => out.put_f64(value),
        (8, false) => out.put_f64_le(value),
        _ => return None,
    }
    Some(())
}

pub(crate) fn put_character(out: &mut Vec<u8>, c: char, ty: &CharacterType, order: ByteOrder) -> Option<()> {
    let code = u64::from(u32::from(c));
    put_unsigned(out, code, ty.size, order).ok()
}

pub(crate) fn put_uuid(out: &mut Vec<u8>, guid: &Guid, order: ByteOrder) {
    out.put_slice(&guid.to_stored(order.resolve()));
}
