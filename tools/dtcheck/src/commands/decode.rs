use std::{
    io::{self, Write},
    path::PathBuf,
};

use anyhow::{Result, bail};
use clap::Args;
use dtschema::{CatalogError, FormatCatalog, MappedArtifact};

#[derive(Args)]
pub struct DecodeArgs {
    /// Input files to decode
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Definitions file (repeatable)
    #[arg(short, long = "definitions", required = true)]
    definitions: Vec<PathBuf>,

    /// Format name (defaults to the only loaded format)
    #[arg(short, long)]
    format: Option<String>,

    /// Structure or structure-group to decode
    #[arg(short, long)]
    structure: String,

    /// Byte offset of the structure, decimal or 0x-prefixed hex
    #[arg(long, default_value = "0", value_parser = parse_number)]
    offset: usize,

    /// Exact size the structure must span
    #[arg(long, value_parser = parse_number)]
    size: Option<usize>,

    /// Maximum structure nesting depth
    #[arg(long)]
    max_depth: Option<usize>,
}

impl DecodeArgs {
    /// Returns whether every input decoded.
    pub fn run(self) -> Result<bool> {
        let mut builder = self
            .definitions
            .iter()
            .fold(FormatCatalog::builder(), |builder, path| builder.with_file(path));
        if let Some(depth) = self.max_depth {
            builder = builder.with_max_depth(depth);
        }
        let catalog = builder.build()?;
        let format = match &self.format {
            Some(format) => format.clone(),
            None => match catalog.formats().as_slice() {
                [only] => only.to_string(),
                formats => bail!(
                    "--format is required when several formats are loaded ({})",
                    formats.join(", ")
                ),
            },
        };
        // Fail early on a bad structure name instead of once per input.
        catalog.schema(&format)?.record_type(&self.structure)?;

        let stdout = io::stdout();
        let mut out = stdout.lock();
        let mut ok = true;
        for input in &self.inputs {
            log::debug!("decoding {}.{} from {}", format, self.structure, input.display());
            let decoded = MappedArtifact::open(input).and_then(|artifact| {
                catalog.decode_bounded(
                    &format,
                    &self.structure,
                    artifact.bytes(),
                    self.offset,
                    self.size,
                )
            });
            match decoded {
                Ok(record) => {
                    writeln!(out, "{}:", input.display())?;
                    writeln!(out, "{record:#?}")?;
                }
                Err(err) => {
                    ok = false;
                    report(input, &err);
                }
            }
        }
        Ok(ok)
    }
}

fn report(input: &std::path::Path, err: &CatalogError) {
    match err.as_decode() {
        Some(decode) => eprintln!(
            "error: {}: {} at offset {} (0x{:x}): {decode}",
            input.display(),
            decode.path(),
            decode.offset(),
            decode.offset()
        ),
        None => eprintln!("error: {}: {err}", input.display()),
    }
}

fn parse_number(raw: &str) -> Result<usize, String> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{raw}': {e}"))
}
