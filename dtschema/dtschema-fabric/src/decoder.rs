//! Structure decoding over an immutable byte buffer.

use std::sync::Arc;

use dtschema_core::{ByteOrder, DecodeError, DecodedRecord, Value};
use encoding::{DecoderTrap, Encoding};
use indexmap::IndexMap;

use crate::{
    expr::{Bindings, Expression},
    model::{
        Layout, Length, RecordType, Schema, SequenceType, SizeExpr, StringType, StructId, TypeId,
        TypeKind,
    },
    primitive::{self, PrimitiveError},
};

/// Default limit on nested structure decodes.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Tunables for a decode call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Structures nested deeper than this fail with `RecursionLimit`.
    pub max_depth: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl DecodeOptions {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Decodes records of one [`Schema`].
///
/// The decoder holds no per-call state; every call builds its own context,
/// so one decoder can be shared across threads.
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'s> {
    schema: &'s Schema,
    options: DecodeOptions,
}

impl<'s> Decoder<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            options: DecodeOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DecodeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    /// Decode a structure or structure-group starting at `offset`.
    ///
    /// With `size_bound`, the record must consume exactly that many bytes.
    pub fn decode(
        &self,
        root: RecordType,
        data: &[u8],
        offset: usize,
        size_bound: Option<usize>,
    ) -> Result<DecodedRecord, DecodeError> {
        let mut ctx = DecodeContext::new(self.schema, data, self.options);
        match root {
            RecordType::Structure(id) => {
                let path = self.schema.structure_def(id).name.clone();
                ctx.decode_structure(id, offset, ByteOrder::Native, size_bound, &path)
            }
            RecordType::Group(id) => {
                let path = self.schema.group_def(id).name.clone();
                ctx.decode_group(id, offset, ByteOrder::Native, size_bound, &path)
            }
        }
    }

    pub fn decode_structure(
        &self,
        id: StructId,
        data: &[u8],
        offset: usize,
        size_bound: Option<usize>,
    ) -> Result<DecodedRecord, DecodeError> {
        self.decode(RecordType::Structure(id), data, offset, size_bound)
    }

    /// Decode a single primitive; returns the value and the bytes consumed.
    pub fn decode_primitive(
        &self,
        id: TypeId,
        data: &[u8],
        offset: usize,
    ) -> Result<(Value, usize), DecodeError> {
        let def = self.schema.type_def(id);
        let ctx = DecodeContext::new(self.schema, data, self.options);
        let (value, end) = ctx.decode_primitive(&def.kind, offset, ByteOrder::Native, &def.name)?;
        Ok((value, end - offset))
    }
}

/// Values decoded so far for one structure on the decode stack.
#[derive(Debug)]
pub(crate) struct Frame {
    pub(crate) structure: StructId,
    pub(crate) values: Vec<Option<Value>>,
}

/// Transient state of one decode call.
pub(crate) struct DecodeContext<'a> {
    pub(crate) schema: &'a Schema,
    pub(crate) data: &'a [u8],
    /// End of the active size bound, if any.
    pub(crate) limit: Option<usize>,
    pub(crate) frames: Vec<Frame>,
    depth: usize,
    max_depth: usize,
}

impl<'a> DecodeContext<'a> {
    fn new(schema: &'a Schema, data: &'a [u8], options: DecodeOptions) -> Self {
        Self {
            schema,
            data,
            limit: None,
            frames: Vec::new(),
            depth: 0,
            max_depth: options.max_depth,
        }
    }

    /// Borrow `len` bytes at `offset`, honouring the active bound.
    pub(crate) fn take(&self, offset: usize, len: usize, path: &str) -> Result<&'a [u8], DecodeError> {
        let data: &'a [u8] = self.data;
        let end = offset.checked_add(len).ok_or_else(|| DecodeError::SizeMismatch {
            path: path.to_string(),
            offset,
            detail: format!("{len} bytes at offset {offset} overflow the address space"),
        })?;
        if let Some(limit) = self.limit
            && end > limit
        {
            return Err(DecodeError::SizeMismatch {
                path: path.to_string(),
                offset,
                detail: format!("reading {len} bytes overruns the size bound ending at {limit}"),
            });
        }
        if end > data.len() {
            return Err(DecodeError::InsufficientData {
                path: path.to_string(),
                offset,
                needed: len,
                available: data.len().saturating_sub(offset),
            });
        }
        Ok(&data[offset..end])
    }

    /// Bytes readable from `offset` before the bound or the end of data.
    fn remaining(&self, offset: usize) -> usize {
        let end = self.limit.map_or(self.data.len(), |l| l.min(self.data.len()));
        end.saturating_sub(offset)
    }

    pub(crate) fn decode_structure(
        &mut self,
        id: StructId,
        offset: usize,
        inherited: ByteOrder,
        size_bound: Option<usize>,
        path: &str,
    ) -> Result<DecodedRecord, DecodeError> {
        if self.depth >= self.max_depth {
            return Err(DecodeError::RecursionLimit {
                path: path.to_string(),
                offset,
                limit: self.max_depth,
            });
        }
        let saved_limit = self.limit;
        if let Some(bound) = size_bound {
            self.take(offset, bound, path)?;
            self.limit = Some(offset + bound);
        }
        let schema = self.schema;
        let def = schema.structure_def(id);
        let order = def.byte_order.unwrap_or(inherited);

        self.depth += 1;
        self.frames.push(Frame {
            structure: id,
            values: vec![None; def.fields.len()],
        });
        let result = self.decode_fields(id, offset, order, path);
        let frame = self.frames.pop();
        self.depth -= 1;
        self.limit = saved_limit;
        let end = result?;

        if let Some(bound) = size_bound
            && end - offset != bound
        {
            return Err(DecodeError::SizeMismatch {
                path: path.to_string(),
                offset,
                detail: format!(
                    "structure '{}' consumed {} bytes, expected exactly {bound}",
                    def.name,
                    end - offset
                ),
            });
        }

        let mut fields = IndexMap::with_capacity(def.fields.len());
        if let Some(frame) = frame {
            for (field, value) in def.fields.iter().zip(frame.values) {
                if let Some(value) = value {
                    fields.insert(field.name.clone(), value);
                }
            }
        }
        Ok(DecodedRecord::new(def.name.as_str(), offset..end, fields))
    }

    fn decode_fields(
        &mut self,
        id: StructId,
        offset: usize,
        order: ByteOrder,
        path: &str,
    ) -> Result<usize, DecodeError> {
        let schema = self.schema;
        let def = schema.structure_def(id);
        let mut cursor = offset;
        let mut end = offset;
        for (index, field) in def.fields.iter().enumerate() {
            let field_path = format!("{path}.{}", field.name);
            let start = match def.layout {
                Layout::Sequential => cursor,
                Layout::Overlay => offset,
            };
            if let Some(condition) = &field.condition
                && !self.condition(condition, &field_path, start)?
            {
                log::trace!("{field_path}: condition '{condition}' is false, skipped");
                continue;
            }

            if let TypeKind::Padding { alignment_size } = schema.type_def(field.ty).kind {
                let relative = start - offset;
                let pad = (alignment_size - relative % alignment_size) % alignment_size;
                self.take(start, pad, &field_path)?;
                cursor = start + pad;
                end = end.max(cursor);
                continue;
            }

            log::trace!("{field_path}: decoding at offset {start}");
            let (value, next) = self.decode_type(field.ty, start, order, &field_path)?;
            if field.has_constraint() && !field.accepts(&value) {
                return Err(DecodeError::ConstraintViolation {
                    path: field_path,
                    offset: start,
                    expected: field.describe_constraint(),
                    actual: describe_value(&value),
                });
            }
            if let Some(frame) = self.frames.last_mut() {
                frame.values[index] = Some(value);
            }
            cursor = next;
            end = end.max(next);
        }
        Ok(end)
    }

    pub(crate) fn decode_type(
        &mut self,
        id: TypeId,
        offset: usize,
        order: ByteOrder,
        path: &str,
    ) -> Result<(Value, usize), DecodeError> {
        let schema = self.schema;
        match &schema.type_def(id).kind {
            TypeKind::Stream(seq) => {
                let (bytes, end) = self.byte_run(seq, offset, path, false)?;
                Ok((Value::bytes(bytes), end))
            }
            TypeKind::Sequence(seq) => self.decode_sequence(seq, offset, order, path),
            TypeKind::String(s) => self.decode_string(s, offset, path),
            TypeKind::Structure(sid) => {
                let record = self.decode_structure(*sid, offset, order, None, path)?;
                let end = record.range().end;
                Ok((Value::Struct(Box::new(record)), end))
            }
            TypeKind::Group(gid) => {
                let record = self.decode_group(*gid, offset, order, None, path)?;
                let end = record.range().end;
                Ok((Value::Struct(Box::new(record)), end))
            }
            TypeKind::Padding { .. } => Err(DecodeError::TypeMismatch {
                path: path.to_string(),
                offset,
                detail: "padding is only valid as a structure member".to_string(),
            }),
            kind => self.decode_primitive(kind, offset, order, path),
        }
    }

    fn decode_primitive(
        &self,
        kind: &TypeKind,
        offset: usize,
        order: ByteOrder,
        path: &str,
    ) -> Result<(Value, usize), DecodeError> {
        let fail = |err: PrimitiveError| primitive_error(err, path, offset);
        let (size, value) = match kind {
            TypeKind::Integer(t) => {
                let bytes = self.take(offset, t.size, path)?;
                let order = t.byte_order.unwrap_or(order);
                (t.size, primitive::decode_integer(bytes, t, order).map_err(fail)?)
            }
            TypeKind::FloatingPoint(t) => {
                let bytes = self.take(offset, t.size, path)?;
                let order = t.byte_order.unwrap_or(order);
                (t.size, primitive::decode_float(bytes, t, order).map_err(fail)?)
            }
            TypeKind::Boolean(t) => {
                let bytes = self.take(offset, t.size, path)?;
                let order = t.byte_order.unwrap_or(order);
                (t.size, primitive::decode_boolean(bytes, t, order).map_err(fail)?)
            }
            TypeKind::Character(t) => {
                let bytes = self.take(offset, t.size, path)?;
                let order = t.byte_order.unwrap_or(order);
                (t.size, primitive::decode_character(bytes, t, order).map_err(fail)?)
            }
            TypeKind::Uuid { byte_order } => {
                let bytes = self.take(offset, 16, path)?;
                let order = byte_order.unwrap_or(order);
                (16, primitive::decode_uuid(bytes, order).map_err(fail)?)
            }
            other => {
                return Err(DecodeError::TypeMismatch {
                    path: path.to_string(),
                    offset,
                    detail: format!("{} is not a primitive type", other.kind_name()),
                });
            }
        };
        Ok((value, offset + size))
    }

    fn condition(&self, condition: &Expression, path: &str, offset: usize) -> Result<bool, DecodeError> {
        condition
            .evaluate_condition(self)
            .map_err(|err| err.at(path, offset))
    }

    fn size(
        &self,
        size: &SizeExpr,
        clamp_negative: bool,
        path: &str,
        offset: usize,
    ) -> Result<usize, DecodeError> {
        let raw = match size {
            SizeExpr::Literal(n) => i128::from(*n),
            SizeExpr::Expression(expr) => expr
                .evaluate_integer(self)
                .map_err(|err| err.at(path, offset))?,
        };
        if raw < 0 {
            if clamp_negative {
                return Ok(0);
            }
            return Err(DecodeError::SizeMismatch {
                path: path.to_string(),
                offset,
                detail: format!("negative size {raw}"),
            });
        }
        usize::try_from(raw).map_err(|_| DecodeError::SizeMismatch {
            path: path.to_string(),
            offset,
            detail: format!("size {raw} exceeds the address space"),
        })
    }

    /// Raw bytes of a stream or string, excluding any terminator, and the
    /// offset following the run.
    fn byte_run(
        &self,
        seq: &SequenceType,
        offset: usize,
        path: &str,
        text: bool,
    ) -> Result<(&'a [u8], usize), DecodeError> {
        let element_size = self.schema.byte_size(seq.element).unwrap_or(1).max(1);
        let region_len = match &seq.length {
            Some(Length::Count(count)) => {
                let count = self.size(count, seq.clamp_negative_size, path, offset)?;
                Some(count.checked_mul(element_size).ok_or_else(|| {
                    DecodeError::SizeMismatch {
                        path: path.to_string(),
                        offset,
                        detail: format!("{count} elements overflow the address space"),
                    }
                })?)
            }
            Some(Length::DataSize(size)) => {
                let size = self.size(size, seq.clamp_negative_size, path, offset)?;
                if size % element_size != 0 {
                    return Err(DecodeError::SizeMismatch {
                        path: path.to_string(),
                        offset,
                        detail: format!(
                            "data size {size} is not a multiple of the element size {element_size}"
                        ),
                    });
                }
                Some(size)
            }
            None => None,
        };

        match (region_len, &seq.terminator) {
            (Some(len), None) => Ok((self.take(offset, len, path)?, offset + len)),
            (Some(len), Some(terminator)) => {
                let region = self.take(offset, len, path)?;
                match find_terminator(region, terminator) {
                    Some(at) => Ok((&region[..at], offset + len)),
                    None if text => Err(DecodeError::UnterminatedString {
                        path: path.to_string(),
                        offset,
                    }),
                    None => Ok((region, offset + len)),
                }
            }
            (None, Some(terminator)) => {
                let available = self.take(offset, self.remaining(offset), path)?;
                match find_terminator(available, terminator) {
                    Some(at) => Ok((&available[..at], offset + at + terminator.len())),
                    None if text => Err(DecodeError::UnterminatedString {
                        path: path.to_string(),
                        offset,
                    }),
                    None => Err(self.missing_terminator(offset, available.len(), terminator.len(), path)),
                }
            }
            (None, None) => Err(DecodeError::SizeMismatch {
                path: path.to_string(),
                offset,
                detail: "run has neither a length nor a terminator".to_string(),
            }),
        }
    }

    fn missing_terminator(&self, offset: usize, scanned: usize, len: usize, path: &str) -> DecodeError {
        let end = offset + scanned;
        if self.limit.is_some_and(|limit| limit <= self.data.len()) {
            DecodeError::SizeMismatch {
                path: path.to_string(),
                offset,
                detail: "elements terminator not found within the size bound".to_string(),
            }
        } else {
            DecodeError::InsufficientData {
                path: path.to_string(),
                offset: end,
                needed: len,
                available: 0,
            }
        }
    }

    fn decode_string(
        &self,
        ty: &StringType,
        offset: usize,
        path: &str,
    ) -> Result<(Value, usize), DecodeError> {
        let (bytes, end) = self.byte_run(&ty.sequence, offset, path, true)?;
        let text = ty
            .encoding
            .decode(bytes, DecoderTrap::Strict)
            .map_err(|err| DecodeError::InvalidString {
                path: path.to_string(),
                offset,
                detail: format!("invalid {} data: {err}", ty.encoding_label),
            })?;
        Ok((Value::String(Arc::from(text)), end))
    }

    fn decode_sequence(
        &mut self,
        seq: &SequenceType,
        offset: usize,
        order: ByteOrder,
        path: &str,
    ) -> Result<(Value, usize), DecodeError> {
        let element_min = self.schema.byte_size(seq.element).unwrap_or(0);
        let mut values = Vec::new();
        let mut cursor = offset;

        match &seq.length {
            Some(Length::Count(count)) => {
                let count = self.size(count, seq.clamp_negative_size, path, offset)?;
                let remaining = self.remaining(offset);
                if count.checked_mul(element_min).is_none_or(|n| n > remaining) {
                    return Err(DecodeError::SizeMismatch {
                        path: path.to_string(),
                        offset,
                        detail: format!(
                            "{count} elements of at least {element_min} bytes exceed the {remaining} bytes remaining"
                        ),
                    });
                }
                values.reserve(count.min(remaining));
                for i in 0..count {
                    let (value, next) = self.element(seq, cursor, order, path, i)?;
                    if next == cursor && count > remaining {
                        return Err(DecodeError::SizeMismatch {
                            path: format!("{path}[{i}]"),
                            offset: cursor,
                            detail: format!(
                                "{count} zero-sized elements exceed the {remaining} bytes remaining"
                            ),
                        });
                    }
                    let terminated = self.is_terminator(seq, cursor, next);
                    cursor = next;
                    if terminated {
                        break;
                    }
                    values.push(value);
                }
            }
            Some(Length::DataSize(size)) => {
                let size = self.size(size, seq.clamp_negative_size, path, offset)?;
                self.take(offset, size, path)?;
                let end = offset + size;
                let saved_limit = self.limit.replace(end);
                let result = (|| -> Result<(), DecodeError> {
                    let mut i = 0;
                    while cursor < end {
                        let (value, next) = self.element(seq, cursor, order, path, i)?;
                        if next == cursor {
                            return Err(DecodeError::SizeMismatch {
                                path: format!("{path}[{i}]"),
                                offset: cursor,
                                detail: "zero-sized element in a sized sequence".to_string(),
                            });
                        }
                        let terminated = self.is_terminator(seq, cursor, next);
                        cursor = next;
                        if terminated {
                            break;
                        }
                        values.push(value);
                        i += 1;
                    }
                    Ok(())
                })();
                self.limit = saved_limit;
                result?;
                cursor = end;
            }
            None => {
                let mut i = 0;
                loop {
                    let (value, next) = self.element(seq, cursor, order, path, i)?;
                    let terminated = self.is_terminator(seq, cursor, next);
                    cursor = next;
                    if terminated {
                        break;
                    }
                    values.push(value);
                    i += 1;
                }
            }
        }
        Ok((Value::Sequence(values), cursor))
    }

    fn element(
        &mut self,
        seq: &SequenceType,
        offset: usize,
        order: ByteOrder,
        path: &str,
        index: usize,
    ) -> Result<(Value, usize), DecodeError> {
        let path = format!("{path}[{index}]");
        self.decode_type(seq.element, offset, order, &path)
    }

    fn is_terminator(&self, seq: &SequenceType, start: usize, end: usize) -> bool {
        seq.terminator
            .as_deref()
            .is_some_and(|t| self.data.get(start..end) == Some(t))
    }
}

impl Bindings for DecodeContext<'_> {
    fn sibling(&self, index: usize) -> Option<&Value> {
        self.frames.last()?.values.get(index)?.as_ref()
    }

    fn enclosing(&self, structure: StructId, index: usize) -> Option<&Value> {
        self.frames
            .iter()
            .rev()
            .find(|frame| frame.structure == structure)?
            .values
            .get(index)?
            .as_ref()
    }

    fn nearest(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| {
            let index = self.schema.structure_def(frame.structure).field_index(name)?;
            Some(frame.values.get(index)?.as_ref())
        })?
    }
}

pub(crate) fn find_terminator(bytes: &[u8], terminator: &[u8]) -> Option<usize> {
    bytes
        .chunks_exact(terminator.len())
        .position(|chunk| chunk == terminator)
        .map(|i| i * terminator.len())
}

fn primitive_error(err: PrimitiveError, path: &str, offset: usize) -> DecodeError {
    let path = path.to_string();
    match err {
        PrimitiveError::Truncated => DecodeError::InsufficientData {
            path,
            offset,
            needed: 1,
            available: 0,
        },
        PrimitiveError::InvalidBoolean(raw) => DecodeError::InvalidBooleanValue { path, offset, raw },
        PrimitiveError::InvalidCharacter(code) => DecodeError::InvalidString {
            path,
            offset,
            detail: format!("0x{code:x} is not a valid character"),
        },
        PrimitiveError::UnsupportedSize(size) => DecodeError::TypeMismatch {
            path,
            offset,
            detail: format!("unsupported primitive size {size}"),
        },
    }
}

/// Short rendering of a decoded value for error messages.
pub(crate) fn describe_value(value: &Value) -> String {
    match value {
        Value::Char(c) => format!("{c:?}"),
        Value::String(s) => format!("{s:?}"),
        Value::Bytes(b) => {
            let hex: String = b.iter().map(|byte| format!("\\x{byte:02x}")).collect();
            format!("b\"{hex}\"")
        }
        Value::Bool(v) => v.to_string(),
        other => match other.as_integer() {
            Some(v) if v < 0 => v.to_string(),
            Some(v) => format!("0x{v:x}"),
            None => format!("{other:?}"),
        },
    }
}
