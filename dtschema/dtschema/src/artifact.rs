//! Memory-mapped input files.

use std::{
    fs,
    path::{Path, PathBuf},
};

use dtschema_core::DecodedRecord;
use memmap2::Mmap;
use rayon::prelude::*;

use crate::{catalog::FormatCatalog, error::CatalogError};

/// A read-only file mapped into memory for decoding.
#[derive(Debug)]
pub struct MappedArtifact {
    path: PathBuf,
    mmap: Mmap,
}

impl MappedArtifact {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let file = fs::File::open(path)?;
        // SAFETY: the mapping is read-only; callers must not truncate the file
        // while it is mapped.
        let mmap = unsafe { Mmap::map(&file) }?;
        Ok(Self {
            path: path.to_path_buf(),
            mmap,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Decode one record at `offset`.
    pub fn decode_at(
        &self,
        catalog: &FormatCatalog,
        format: &str,
        structure: &str,
        offset: usize,
    ) -> Result<DecodedRecord, CatalogError> {
        catalog.decode(format, structure, &self.mmap, offset)
    }

    /// Decode one record per offset in parallel. Results keep the order of
    /// `offsets`; one failure does not affect the others.
    pub fn decode_batch(
        &self,
        catalog: &FormatCatalog,
        format: &str,
        structure: &str,
        offsets: &[usize],
    ) -> Vec<Result<DecodedRecord, CatalogError>> {
        offsets
            .par_iter()
            .map(|&offset| self.decode_at(catalog, format, structure, offset))
            .collect()
    }
}
