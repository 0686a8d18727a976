use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use dtschema::FormatCatalog;

#[derive(Args)]
pub struct CheckArgs {
    /// Definitions files to validate
    #[arg(required = true)]
    definitions: Vec<PathBuf>,
}

impl CheckArgs {
    /// Returns whether every file loaded.
    pub fn run(self) -> Result<bool> {
        let mut ok = true;
        for path in &self.definitions {
            match FormatCatalog::builder().with_file(path).build() {
                Ok(catalog) => {
                    for format in catalog.formats() {
                        let schema = catalog.schema(format)?;
                        println!(
                            "ok: {} (format '{format}', {} types, {} structures)",
                            path.display(),
                            schema.types().count(),
                            schema.structures().count()
                        );
                    }
                }
                Err(err) => {
                    ok = false;
                    eprintln!("error: {}: {err}", path.display());
                }
            }
        }
        Ok(ok)
    }
}
