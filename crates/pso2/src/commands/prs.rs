use std::path::PathBuf;

use clap::{Args, Subcommand};
use miette::{Context, IntoDiagnostic, Result};
use tracing::info;

use super::create_file;

#[derive(Subcommand)]
pub enum PrsCommands {
    /// Decompress a PRS stream
    Decompress(DecompressArgs),
    /// Store a file as a PRS stream
    Compress(CompressArgs),
}

impl PrsCommands {
    pub fn handle(&self) -> Result<()> {
        match self {
            PrsCommands::Decompress(decompress) => decompress.handle(),
            PrsCommands::Compress(compress) => compress.handle(),
        }
    }
}

fn read(path: &PathBuf) -> Result<Vec<u8>> {
    std::fs::read(path)
        .into_diagnostic()
        .context(format!("path: {}", path.display()))
}

fn write(path: &PathBuf, data: &[u8], overwrite: bool) -> Result<()> {
    use std::io::Write;

    info!("writing {} ({} bytes)", path.display(), data.len());
    create_file(path, overwrite)?
        .write_all(data)
        .into_diagnostic()
        .context(format!("writing {}", path.display()))
}

#[derive(Args)]
pub struct DecompressArgs {
    /// An input PRS stream
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A target file
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Size of the decompressed data; short streams are padded with zeros
    #[arg(short, long)]
    size: usize,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl DecompressArgs {
    pub fn handle(&self) -> Result<()> {
        let data = read(&self.file)?;
        let output = pso2_prs::decompress(&data, self.size)
            .into_diagnostic()
            .context(format!("decompressing {}", self.file.display()))?;
        write(&self.output, &output, self.overwrite)
    }
}

#[derive(Args)]
pub struct CompressArgs {
    /// An input file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A target PRS stream
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl CompressArgs {
    pub fn handle(&self) -> Result<()> {
        let data = read(&self.file)?;
        let output = pso2_prs::compress(&data).into_diagnostic()?;
        write(&self.output, &output, self.overwrite)
    }
}
