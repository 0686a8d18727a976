//! Decoding from seekable sources when a record's size is not known before
//! decoding it.

use std::io::{self, Read, Seek, SeekFrom};

use dtschema_core::{DecodeError, DecodedRecord};
use dtschema_fabric::RecordType;

use crate::{catalog::FormatCatalog, error::CatalogError};

/// First read for structures without a fixed size.
const INITIAL_READ: usize = 512;
/// Upper bound on the up-front buffer allocation.
const MAX_PREALLOC: usize = 1 << 20;

/// Decode `structure` at `offset` of `reader`, reading only as much as the
/// decode needs.
///
/// Fixed-size structures are read in one go. Otherwise reading starts with a
/// small window and grows whenever the decoder runs out of data. Record
/// ranges and error offsets are absolute within `reader`.
pub fn read_structure_with_size_hint<R: Read + Seek>(
    catalog: &FormatCatalog,
    format: &str,
    structure: &str,
    reader: &mut R,
    offset: u64,
) -> Result<DecodedRecord, CatalogError> {
    let decoder = catalog.decoder(format)?;
    let schema = decoder.schema();
    let root = schema.record_type(structure)?;
    let base = usize::try_from(offset)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset exceeds address space"))?;
    let fixed = match root {
        RecordType::Structure(id) => schema.structure_byte_size(id),
        RecordType::Group(_) => None,
    };

    let mut want = fixed.unwrap_or(INITIAL_READ);
    loop {
        reader.seek(SeekFrom::Start(offset))?;
        let mut buffer = Vec::with_capacity(want.min(MAX_PREALLOC));
        let limit = u64::try_from(want).unwrap_or(u64::MAX);
        reader.by_ref().take(limit).read_to_end(&mut buffer)?;
        let exhausted = buffer.len() < want;

        let err = match decoder.decode(root, &buffer, 0, None) {
            Ok(mut record) => {
                record.rebase(base);
                return Ok(record);
            }
            Err(err) if exhausted => return Err(err.rebase(base).into()),
            Err(err) => err,
        };
        want = match &err {
            DecodeError::InsufficientData { .. } => err
                .required_len()
                .unwrap_or(usize::MAX)
                .max(want.saturating_mul(2)),
            // A count checked against a partial window fails as a size
            // mismatch; retry against everything that is left.
            DecodeError::SizeMismatch { .. } => usize::MAX,
            // The terminator may lie past the window.
            DecodeError::UnterminatedString { .. } => want.saturating_mul(2),
            _ => return Err(err.rebase(base).into()),
        };
        log::trace!("{structure} at {offset}: growing read window to {want} bytes");
    }
}
