//! Structure-group (tagged union) dispatch.
//!
//! A dispatch goes through two states. In the first the group's base
//! structure has been decoded and its identifier field read; in the second
//! the identifier has selected a variant, which is decoded again from the
//! original offset. The base record is discarded.

use dtschema_core::{ByteOrder, DecodeError, DecodedRecord};

use crate::{
    decoder::DecodeContext,
    model::{DiscriminantKey, GroupId},
};

impl DecodeContext<'_> {
    pub(crate) fn decode_group(
        &mut self,
        id: GroupId,
        offset: usize,
        inherited: ByteOrder,
        size_bound: Option<usize>,
        path: &str,
    ) -> Result<DecodedRecord, DecodeError> {
        let schema = self.schema;
        let group = schema.group_def(id);
        let base_def = schema.structure_def(group.base);
        let identifier = &base_def.fields[group.identifier].name;

        // The bound limits the base decode but only the variant has to fill it.
        let saved_limit = self.limit;
        if let Some(bound) = size_bound {
            self.take(offset, bound, path)?;
            self.limit = Some(offset + bound);
        }
        let base = self.decode_structure(group.base, offset, inherited, None, path);
        self.limit = saved_limit;
        let base = base?;

        let discriminant = base.get(identifier).ok_or_else(|| DecodeError::UnresolvedReference {
            path: path.to_string(),
            offset,
            reference: format!("{}.{identifier}", base_def.name),
        })?;
        let key = DiscriminantKey::from_value(discriminant).ok_or_else(|| DecodeError::TypeMismatch {
            path: format!("{path}.{identifier}"),
            offset,
            detail: format!(
                "a {} value cannot select a structure-group variant",
                discriminant.variant_name()
            ),
        })?;

        let variant = group
            .variant_for(&key)
            .ok_or_else(|| DecodeError::UnknownVariant {
                path: path.to_string(),
                offset,
                group: group.name.clone(),
                discriminant: key.to_string(),
            })?;

        let variant_name = schema.structure_def(variant).name.as_str();
        log::trace!("{path}: structure group '{}' selected '{variant_name}'", group.name);
        let record = self.decode_structure(variant, offset, inherited, size_bound, path)?;
        let range = record.range();
        Ok(DecodedRecord::new(group.name.as_str(), range, record.into_fields()).with_variant(variant_name))
    }
}
