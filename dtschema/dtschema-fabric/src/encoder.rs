//! Encoding of decoded records back into bytes.
//!
//! The encoder is the inverse of [`crate::Decoder`]: conditions and size
//! expressions are evaluated against the record being written, and lengths
//! are checked against what the decoder would read back.

use bytes::BufMut;
use dtschema_core::{ByteOrder, DecodedRecord, EncodeError, Value};
use encoding::{EncoderTrap, Encoding};

use crate::{
    decoder::find_terminator,
    expr::{Bindings, Expression},
    model::{
        GroupId, Layout, Length, RecordType, Schema, SequenceType, SizeExpr, StructId, TypeId,
        TypeKind,
    },
    primitive,
};

#[derive(Debug, Clone, Copy)]
pub struct Encoder<'s> {
    schema: &'s Schema,
}

impl<'s> Encoder<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        Self { schema }
    }

    /// Encode `record` as an instance of `root`.
    pub fn encode(&self, root: RecordType, record: &DecodedRecord) -> Result<Vec<u8>, EncodeError> {
        let mut ctx = EncodeContext {
            schema: self.schema,
            out: Vec::with_capacity(record.byte_size()),
            frames: Vec::new(),
        };
        match root {
            RecordType::Structure(id) => {
                let path = self.schema.structure_def(id).name.clone();
                ctx.encode_structure(id, record, ByteOrder::Native, &path)?;
            }
            RecordType::Group(id) => {
                let path = self.schema.group_def(id).name.clone();
                let variant = ctx.variant_of(id, record, &path)?;
                ctx.encode_structure(variant, record, ByteOrder::Native, &path)?;
            }
        }
        Ok(ctx.out)
    }
}

struct EncodeFrame<'a> {
    structure: StructId,
    record: &'a DecodedRecord,
}

struct EncodeContext<'a> {
    schema: &'a Schema,
    out: Vec<u8>,
    frames: Vec<EncodeFrame<'a>>,
}

impl<'a> EncodeContext<'a> {
    fn encode_structure(
        &mut self,
        id: StructId,
        record: &'a DecodedRecord,
        inherited: ByteOrder,
        path: &str,
    ) -> Result<(), EncodeError> {
        let schema = self.schema;
        let def = schema.structure_def(id);
        if def.layout == Layout::Overlay {
            return Err(EncodeError::Unsupported {
                path: path.to_string(),
                detail: format!("union '{}' cannot be encoded", def.name),
            });
        }
        let order = def.byte_order.unwrap_or(inherited);
        let start = self.out.len();
        self.frames.push(EncodeFrame {
            structure: id,
            record,
        });
        let result = (|| -> Result<(), EncodeError> {
            for field in &def.fields {
                let field_path = format!("{path}.{}", field.name);
                if let Some(condition) = &field.condition
                    && !self.condition(condition, &field_path)?
                {
                    continue;
                }
                if let TypeKind::Padding { alignment_size } = schema.type_def(field.ty).kind {
                    let relative = self.out.len() - start;
                    let pad = (alignment_size - relative % alignment_size) % alignment_size;
                    self.out.put_bytes(0, pad);
                    continue;
                }
                let value = record
                    .get(&field.name)
                    .ok_or_else(|| EncodeError::MissingField {
                        path: field_path.clone(),
                    })?;
                self.encode_value(field.ty, value, order, &field_path)?;
            }
            Ok(())
        })();
        self.frames.pop();
        result
    }

    fn encode_value(
        &mut self,
        id: TypeId,
        value: &'a Value,
        order: ByteOrder,
        path: &str,
    ) -> Result<(), EncodeError> {
        let schema = self.schema;
        let mismatch = |expected: &str| EncodeError::TypeMismatch {
            path: path.to_string(),
            detail: format!("expected {expected}, found {}", value.variant_name()),
        };
        match &schema.type_def(id).kind {
            TypeKind::Integer(t) => {
                let v = value.as_integer().ok_or_else(|| mismatch("an integer"))?;
                primitive::put_integer(&mut self.out, v, t, t.byte_order.unwrap_or(order)).ok_or_else(
                    || EncodeError::TypeMismatch {
                        path: path.to_string(),
                        detail: format!("{v} does not fit a {}-byte integer", t.size),
                    },
                )
            }
            TypeKind::FloatingPoint(t) => {
                let v = match value {
                    Value::F32(v) => f64::from(*v),
                    Value::F64(v) => *v,
                    _ => return Err(mismatch("a float")),
                };
                primitive::put_float(&mut self.out, v, t, t.byte_order.unwrap_or(order))
                    .ok_or_else(|| mismatch("a float"))
            }
            TypeKind::Boolean(t) => {
                let Value::Bool(v) = value else {
                    return Err(mismatch("a boolean"));
                };
                primitive::put_unsigned(&mut self.out, t.raw(*v), t.size, t.byte_order.unwrap_or(order))
                    .map_err(|_| mismatch("a boolean"))
            }
            TypeKind::Character(t) => {
                let Value::Char(c) = value else {
                    return Err(mismatch("a character"));
                };
                primitive::put_character(&mut self.out, *c, t, t.byte_order.unwrap_or(order))
                    .ok_or_else(|| EncodeError::TypeMismatch {
                        path: path.to_string(),
                        detail: format!("{c:?} does not fit a {}-byte character", t.size),
                    })
            }
            TypeKind::Uuid { byte_order } => {
                let Value::Guid(guid) = value else {
                    return Err(mismatch("a GUID"));
                };
                primitive::put_uuid(&mut self.out, guid, byte_order.unwrap_or(order));
                Ok(())
            }
            TypeKind::Stream(seq) => {
                let bytes = value.try_bytes().map_err(|_| mismatch("bytes"))?;
                self.write_run(seq, bytes, false, path)
            }
            TypeKind::String(s) => {
                let text = value.try_str().map_err(|_| mismatch("a string"))?;
                let bytes = s
                    .encoding
                    .encode(text, EncoderTrap::Strict)
                    .map_err(|err| EncodeError::TypeMismatch {
                        path: path.to_string(),
                        detail: format!("cannot encode as {}: {err}", s.encoding_label),
                    })?;
                self.write_run(&s.sequence, &bytes, true, path)
            }
            TypeKind::Sequence(seq) => {
                let elements = value.try_sequence().map_err(|_| mismatch("a sequence"))?;
                self.write_sequence(seq, elements, order, path)
            }
            TypeKind::Structure(sid) => {
                let record = value.try_record().map_err(|_| mismatch("a structure"))?;
                self.encode_structure(*sid, record, order, path)
            }
            TypeKind::Group(gid) => {
                let record = value.try_record().map_err(|_| mismatch("a structure"))?;
                let variant = self.variant_of(*gid, record, path)?;
                self.encode_structure(variant, record, order, path)
            }
            TypeKind::Padding { .. } => Err(EncodeError::Unsupported {
                path: path.to_string(),
                detail: "padding outside a structure".to_string(),
            }),
        }
    }

    fn variant_of(
        &self,
        id: GroupId,
        record: &DecodedRecord,
        path: &str,
    ) -> Result<StructId, EncodeError> {
        let group = self.schema.group_def(id);
        let variant = record
            .variant()
            .and_then(|name| self.schema.structure_id(name))
            .filter(|sid| group.members.contains(sid) || group.default == Some(*sid));
        variant.ok_or_else(|| EncodeError::Unsupported {
            path: path.to_string(),
            detail: format!("record does not name a variant of '{}'", group.name),
        })
    }

    fn condition(&self, condition: &Expression, path: &str) -> Result<bool, EncodeError> {
        condition
            .evaluate_condition(self)
            .map_err(|err| EncodeError::Expression {
                path: path.to_string(),
                detail: err.to_string(),
            })
    }

    fn size(&self, size: &SizeExpr, clamp_negative: bool, path: &str) -> Result<usize, EncodeError> {
        let raw = match size {
            SizeExpr::Literal(n) => i128::from(*n),
            SizeExpr::Expression(expr) => {
                expr.evaluate_integer(self)
                    .map_err(|err| EncodeError::Expression {
                        path: path.to_string(),
                        detail: err.to_string(),
                    })?
            }
        };
        if raw < 0 && clamp_negative {
            return Ok(0);
        }
        usize::try_from(raw).map_err(|_| EncodeError::Expression {
            path: path.to_string(),
            detail: format!("invalid size {raw}"),
        })
    }

    fn expected_len(&self, seq: &SequenceType, path: &str) -> Result<Option<usize>, EncodeError> {
        let element_size = self.schema.byte_size(seq.element).unwrap_or(1);
        Ok(match &seq.length {
            Some(Length::Count(count)) => {
                let count = self.size(count, seq.clamp_negative_size, path)?;
                Some(count.checked_mul(element_size).ok_or_else(|| EncodeError::Expression {
                    path: path.to_string(),
                    detail: format!("{count} elements overflow the address space"),
                })?)
            }
            Some(Length::DataSize(size)) => Some(self.size(size, seq.clamp_negative_size, path)?),
            None => None,
        })
    }

    fn write_run(
        &mut self,
        seq: &SequenceType,
        bytes: &[u8],
        text: bool,
        path: &str,
    ) -> Result<(), EncodeError> {
        let length_mismatch = |expected: usize| EncodeError::TypeMismatch {
            path: path.to_string(),
            detail: format!("{} bytes do not fit a run of {expected} bytes", bytes.len()),
        };
        if let Some(terminator) = &seq.terminator
            && find_terminator(bytes, terminator).is_some()
        {
            return Err(EncodeError::TypeMismatch {
                path: path.to_string(),
                detail: "value contains the elements terminator".to_string(),
            });
        }
        match (self.expected_len(seq, path)?, &seq.terminator) {
            (Some(expected), None) => {
                if bytes.len() != expected {
                    return Err(length_mismatch(expected));
                }
                self.out.put_slice(bytes);
            }
            (Some(expected), Some(_)) if !text && bytes.len() == expected => {
                self.out.put_slice(bytes);
            }
            (Some(expected), Some(terminator)) => {
                let used = bytes.len() + terminator.len();
                if used > expected {
                    return Err(length_mismatch(expected));
                }
                self.out.put_slice(bytes);
                self.out.put_slice(terminator);
                self.out.put_bytes(0, expected - used);
            }
            (None, Some(terminator)) => {
                self.out.put_slice(bytes);
                self.out.put_slice(terminator);
            }
            (None, None) => {
                return Err(EncodeError::Unsupported {
                    path: path.to_string(),
                    detail: "run has neither a length nor a terminator".to_string(),
                });
            }
        }
        Ok(())
    }

    fn write_sequence(
        &mut self,
        seq: &SequenceType,
        elements: &'a [Value],
        order: ByteOrder,
        path: &str,
    ) -> Result<(), EncodeError> {
        let start = self.out.len();
        let count = match &seq.length {
            Some(Length::Count(count)) => Some(self.size(count, seq.clamp_negative_size, path)?),
            _ => None,
        };
        let data_size = match &seq.length {
            Some(Length::DataSize(size)) => Some(self.size(size, seq.clamp_negative_size, path)?),
            _ => None,
        };
        if let Some(count) = count {
            let fits = match seq.terminator {
                Some(_) => elements.len() <= count,
                None => elements.len() == count,
            };
            if !fits {
                return Err(EncodeError::TypeMismatch {
                    path: path.to_string(),
                    detail: format!("{} elements where {count} are declared", elements.len()),
                });
            }
        }
        for (i, element) in elements.iter().enumerate() {
            self.encode_value(seq.element, element, order, &format!("{path}[{i}]"))?;
        }
        let written = self.out.len() - start;
        let full = count.is_some_and(|c| elements.len() == c) || data_size == Some(written);
        if let Some(terminator) = &seq.terminator
            && !full
        {
            self.out.put_slice(terminator);
        }
        if let Some(size) = data_size {
            let written = self.out.len() - start;
            if written > size || (seq.terminator.is_none() && written != size) {
                return Err(EncodeError::TypeMismatch {
                    path: path.to_string(),
                    detail: format!("{written} bytes of elements where {size} are declared"),
                });
            }
            self.out.put_bytes(0, size - written);
        }
        Ok(())
    }
}

impl Bindings for EncodeContext<'_> {
    fn sibling(&self, index: usize) -> Option<&Value> {
        let frame = self.frames.last()?;
        let field = self.schema.structure_def(frame.structure).fields.get(index)?;
        frame.record.get(&field.name)
    }

    fn enclosing(&self, structure: StructId, index: usize) -> Option<&Value> {
        let frame = self.frames.iter().rev().find(|f| f.structure == structure)?;
        let field = self.schema.structure_def(structure).fields.get(index)?;
        frame.record.get(&field.name)
    }

    fn nearest(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| {
            self.schema.structure_def(frame.structure).field_index(name)?;
            Some(frame.record.get(name))
        })?
    }
}
