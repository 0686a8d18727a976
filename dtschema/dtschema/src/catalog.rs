//! Process-wide mapping from format name to its resolved schema.

use std::{collections::HashMap, fs, path::PathBuf, sync::Arc};

use dtschema_core::{DecodedRecord, SchemaError};
use dtschema_fabric::{
    DecodeOptions, Decoder, Encoder, EnumerationDefinition, Schema, StructureDefinition,
    ast::FormatDecl,
};
use once_cell::sync::OnceCell;

use crate::error::CatalogError;

static GLOBAL: OnceCell<FormatCatalog> = OnceCell::new();

/// Install `catalog` as the process-wide catalog. Succeeds once.
pub fn install(catalog: FormatCatalog) -> Result<&'static FormatCatalog, CatalogError> {
    GLOBAL
        .try_insert(catalog)
        .map_err(|_| CatalogError::AlreadyInstalled)
}

/// The process-wide catalog, once installed.
pub fn global() -> Option<&'static FormatCatalog> {
    GLOBAL.get()
}

/// One input to [`FormatCatalogBuilder`].
#[derive(Debug, Clone)]
pub enum SchemaSource {
    /// Definitions text; `source_name` names it in errors.
    Text { source_name: String, text: String },
    /// Definitions file, read at build time.
    File(PathBuf),
    /// Already parsed declarations.
    Decl(FormatDecl),
}

/// Immutable set of resolved formats.
///
/// Schemas are shared behind [`Arc`]; a catalog is `Send + Sync` and can be
/// read from any number of threads.
#[derive(Debug, Default)]
pub struct FormatCatalog {
    formats: HashMap<String, Arc<Schema>>,
    options: DecodeOptions,
}

/// Builder for configuring [`FormatCatalog`].
#[derive(Debug, Default)]
pub struct FormatCatalogBuilder {
    sources: Vec<SchemaSource>,
    options: DecodeOptions,
}

impl FormatCatalog {
    /// Create a builder for [`FormatCatalog`].
    pub fn builder() -> FormatCatalogBuilder {
        FormatCatalogBuilder::default()
    }

    /// Load every source. Either all formats load or none do.
    pub fn load(sources: impl IntoIterator<Item = SchemaSource>) -> Result<Self, CatalogError> {
        sources
            .into_iter()
            .fold(Self::builder(), FormatCatalogBuilder::with)
            .build()
    }

    pub fn options(&self) -> DecodeOptions {
        self.options
    }

    /// Format names, sorted.
    pub fn formats(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.formats.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn schema(&self, format: &str) -> Result<&Arc<Schema>, SchemaError> {
        self.formats
            .get(format)
            .ok_or_else(|| SchemaError::UnknownFormat {
                name: format.to_string(),
            })
    }

    pub fn get_structure(
        &self,
        format: &str,
        structure: &str,
    ) -> Result<&StructureDefinition, SchemaError> {
        self.schema(format)?.structure(structure)
    }

    /// Fixed byte size of a named type, `None` when it varies.
    pub fn byte_size(&self, format: &str, type_name: &str) -> Result<Option<usize>, SchemaError> {
        let schema = self.schema(format)?;
        let id = schema
            .type_id(type_name)
            .ok_or_else(|| SchemaError::UnknownType {
                name: type_name.to_string(),
                referenced_by: format.to_string(),
            })?;
        Ok(schema.byte_size(id))
    }

    pub fn enumeration(
        &self,
        format: &str,
        name: &str,
    ) -> Result<&EnumerationDefinition, SchemaError> {
        self.schema(format)?
            .enumeration(name)
            .ok_or_else(|| SchemaError::UnknownType {
                name: name.to_string(),
                referenced_by: format.to_string(),
            })
    }

    /// Decoder over one format, configured with the catalog's options.
    pub fn decoder(&self, format: &str) -> Result<Decoder<'_>, SchemaError> {
        Ok(Decoder::new(self.schema(format)?).with_options(self.options))
    }

    /// Decode `structure` (or structure-group) at `offset` of `data`.
    pub fn decode(
        &self,
        format: &str,
        structure: &str,
        data: &[u8],
        offset: usize,
    ) -> Result<DecodedRecord, CatalogError> {
        self.decode_bounded(format, structure, data, offset, None)
    }

    /// Like [`decode`](Self::decode), but the record must span exactly
    /// `size_bound` bytes when given.
    pub fn decode_bounded(
        &self,
        format: &str,
        structure: &str,
        data: &[u8],
        offset: usize,
        size_bound: Option<usize>,
    ) -> Result<DecodedRecord, CatalogError> {
        let decoder = self.decoder(format)?;
        let root = decoder.schema().record_type(structure)?;
        Ok(decoder.decode(root, data, offset, size_bound)?)
    }

    /// Encode `record` as an instance of `structure`.
    pub fn encode(
        &self,
        format: &str,
        structure: &str,
        record: &DecodedRecord,
    ) -> Result<Vec<u8>, CatalogError> {
        let schema = self.schema(format)?;
        let root = schema.record_type(structure)?;
        Ok(Encoder::new(schema).encode(root, record)?)
    }
}

impl FormatCatalogBuilder {
    pub fn with(mut self, source: SchemaSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Add definitions text.
    pub fn with_source(self, source_name: impl Into<String>, text: impl Into<String>) -> Self {
        self.with(SchemaSource::Text {
            source_name: source_name.into(),
            text: text.into(),
        })
    }

    /// Add a definitions file. The file is read by [`build`](Self::build).
    pub fn with_file(self, path: impl Into<PathBuf>) -> Self {
        self.with(SchemaSource::File(path.into()))
    }

    pub fn with_decl(self, decl: FormatDecl) -> Self {
        self.with(SchemaSource::Decl(decl))
    }

    /// Maximum structure nesting depth (default: 64).
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.options = self.options.with_max_depth(max_depth);
        self
    }

    /// Load every source into a new catalog.
    pub fn build(self) -> Result<FormatCatalog, CatalogError> {
        let mut formats = HashMap::new();
        for source in self.sources {
            let schema = load_source(source)?;
            let name = schema.name().to_string();
            if formats.contains_key(&name) {
                return Err(SchemaError::DuplicateDefinition {
                    format: name.clone(),
                    name,
                }
                .into());
            }
            log::debug!(
                "loaded format '{name}' ({} structures)",
                schema.structures().count()
            );
            formats.insert(name, Arc::new(schema));
        }
        Ok(FormatCatalog {
            formats,
            options: self.options,
        })
    }
}

fn load_source(source: SchemaSource) -> Result<Schema, CatalogError> {
    match source {
        SchemaSource::Decl(decl) => Ok(dtschema_fabric::resolve(decl)?),
        SchemaSource::Text { source_name, text } => load_text(&source_name, &text),
        SchemaSource::File(path) => {
            let text = fs::read_to_string(&path).map_err(|source| CatalogError::ReadDefinitions {
                path: path.clone(),
                source,
            })?;
            load_text(&path.display().to_string(), &text)
        }
    }
}

#[cfg(feature = "yaml")]
fn load_text(source_name: &str, text: &str) -> Result<Schema, CatalogError> {
    Ok(dtschema_yaml::load_format(source_name, text)?)
}

#[cfg(not(feature = "yaml"))]
fn load_text(source_name: &str, _text: &str) -> Result<Schema, CatalogError> {
    Err(CatalogError::UnsupportedSource {
        source_name: source_name.to_string(),
    })
}
