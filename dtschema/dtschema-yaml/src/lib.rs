//! YAML definitions files for `dtschema`.
//!
//! A definitions file is a stream of YAML documents separated by `---`, each
//! describing one named type (integer, structure, structure-group, ...). An
//! optional `type: format` document names the format and describes it.
//!
//! # Pipeline
//!
//! ```text
//! definitions text
//!   └─ serde_yaml::Deserializer   – one document at a time
//!       └─ RawDefinition          – serde shapes, unknown keys rejected
//!           └─ convert            – RawDefinition → ast::TypeDecl
//!               └─ dtschema_fabric::resolve  – FormatDecl → Schema
//! ```
//!
//! Byte strings (terminators, stream `value`s) are written as quoted strings
//! whose code points are the bytes, e.g. `"\x00\x00"`.

mod convert;
mod document;

use std::path::Path;

use dtschema_core::SchemaError;
use dtschema_fabric::{Schema, ast::FormatDecl};

use crate::{
    convert::{Document, Location},
    document::RawDefinition,
};

/// Parse a definitions file into unresolved declarations.
///
/// `source_name` is used in error messages and, without a `type: format`
/// document, its file stem names the format.
pub fn parse_format(source_name: &str, text: &str) -> Result<FormatDecl, SchemaError> {
    let mut format = FormatDecl::default();
    let mut format_name = None;

    for (index, document) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let at = Location { source_name, index };
        let raw: Option<RawDefinition> =
            serde_path_to_error::deserialize(document).map_err(|err| {
                let path = err.path().to_string();
                at.error(&path, err.inner())
            })?;
        let Some(raw) = raw else {
            continue;
        };
        match convert::convert(raw, &at)? {
            Document::Format { name, description } => {
                if format_name.is_some() {
                    return Err(at.error("type", "more than one format document"));
                }
                format_name = Some(name.unwrap_or_else(|| default_name(source_name)));
                format.description = description;
            }
            Document::Definition(decl) => format.definitions.push(decl),
        }
    }

    format.name = format_name.unwrap_or_else(|| default_name(source_name));
    log::debug!(
        "parsed {} definitions of format '{}' from {source_name}",
        format.definitions.len(),
        format.name
    );
    Ok(format)
}

/// Parse and resolve a definitions file.
pub fn load_format(source_name: &str, text: &str) -> Result<Schema, SchemaError> {
    dtschema_fabric::resolve(parse_format(source_name, text)?)
}

fn default_name(source_name: &str) -> String {
    Path::new(source_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(source_name)
        .to_string()
}
