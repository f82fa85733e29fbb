use std::path::PathBuf;

use clap::{Args, Subcommand};
use miette::{Context, IntoDiagnostic, Result};
use pso2_archive::model::ModelChunkKind;
use pso2_archive::Model;

#[derive(Subcommand)]
pub enum ModelCommands {
    /// List the chunks of a VTBF model
    Chunks(ChunksArgs),
}

impl ModelCommands {
    pub fn handle(&self) -> Result<()> {
        match self {
            ModelCommands::Chunks(chunks) => chunks.handle(),
        }
    }
}

#[derive(Args)]
pub struct ChunksArgs {
    /// An input model
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,
}

impl ChunksArgs {
    pub fn handle(&self) -> Result<()> {
        let data = std::fs::read(&self.file)
            .into_diagnostic()
            .context(format!("path: {}", self.file.display()))?;
        let model = Model::parse(&data).context(format!("reading {}", self.file.display()))?;

        println!("{} ({} chunks)", model.kind, model.chunks.len());
        for chunk in &model.chunks {
            let kind = match chunk.kind {
                ModelChunkKind::Opaque(_) => "opaque",
                ModelChunkKind::Node => "bones",
                ModelChunkKind::Nodo => "bone extras",
                ModelChunkKind::Vset => "vertex layout",
            };
            println!(
                "{:#010x} {} {} {:>8} {kind}",
                chunk.offset,
                chunk.tag,
                chunk.subtype,
                chunk.data.len()
            );
        }
        Ok(())
    }
}
