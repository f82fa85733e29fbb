use std::{fs::File, io::BufReader, io::BufWriter, path::PathBuf};

use clap::Args;
use miette::{Context, IntoDiagnostic, Result};
use pso2_text::Translation;
use tracing::info;

use super::TextSource;
use crate::commands::create_file;

pub(crate) fn read_translations<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let f = File::open(path)
        .into_diagnostic()
        .context(format!("path: {}", path.display()))?;
    serde_json::from_reader(BufReader::new(f))
        .into_diagnostic()
        .context(format!("parsing {}", path.display()))
}

#[derive(Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    source: TextSource,

    /// A JSON list of `{identifier, collision, string}` records
    #[arg(short, long, value_name = "FILE")]
    translations: PathBuf,

    /// A target text table
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl ApplyArgs {
    pub fn handle(&self) -> Result<()> {
        let mut text = self.source.load()?;
        let translations: Vec<Translation> = read_translations(&self.translations)?;

        let changed = text.apply_translations(&translations)?;
        info!("{changed} of {} pairs changed", text.pairs().len());

        let out = BufWriter::new(create_file(&self.output, self.overwrite)?);
        text.write(out)
            .context(format!("writing {}", self.output.display()))?
            .into_inner()
            .map_err(|e| e.into_error())
            .into_diagnostic()?;
        Ok(())
    }
}
