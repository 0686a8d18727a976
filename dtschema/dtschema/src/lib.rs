//! Format catalog and decoding entry points for declarative binary structure
//! schemas.
//!
//! ```text
//! definitions (YAML text / files / FormatDecl)
//!   └─ FormatCatalogBuilder::build   – parse + resolve every format, atomically
//!       └─ FormatCatalog             – format name → Arc<Schema>
//!           ├─ decode / encode       – byte buffers
//!           ├─ read_structure_with_size_hint – Read + Seek sources
//!           └─ MappedArtifact        – memory-mapped files, parallel batches
//! ```

mod artifact;
mod catalog;
mod error;
mod hint;

pub use artifact::MappedArtifact;
pub use catalog::{FormatCatalog, FormatCatalogBuilder, SchemaSource, global, install};
pub use dtschema_core as core;
pub use dtschema_fabric as fabric;
#[cfg(feature = "yaml")]
pub use dtschema_yaml as yaml;
pub use error::CatalogError;
pub use hint::read_structure_with_size_hint;
