use std::{fs::File, io::BufReader, path::PathBuf};

use clap::{Args, Subcommand};
use miette::{Context, IntoDiagnostic, Result};
use pso2_archive::AfpArchive;
use tracing::info;

use super::{create_file, entry_path};

#[derive(Subcommand)]
pub enum AfpCommands {
    /// List the entries of an AFP archive
    List(ListArgs),
    /// Extract an AFP archive into a directory
    Extract(ExtractArgs),
}

impl AfpCommands {
    pub fn handle(&self) -> Result<()> {
        match self {
            AfpCommands::List(list) => list.handle(),
            AfpCommands::Extract(extract) => extract.handle(),
        }
    }
}

fn open(path: &PathBuf) -> Result<AfpArchive<BufReader<File>>> {
    let f = File::open(path)
        .into_diagnostic()
        .context(format!("path: {}", path.display()))?;
    Ok(AfpArchive::new(BufReader::new(f)).context(format!("reading {}", path.display()))?)
}

#[derive(Args)]
pub struct ListArgs {
    /// An input AFP file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,
}

impl ListArgs {
    pub fn handle(&self) -> Result<()> {
        let afp = open(&self.file)?;
        for file in afp.files() {
            println!("{:>4} {:>10} {}", file.kind, file.size(), file.file_name);
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct ExtractArgs {
    /// An input AFP file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A target directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl ExtractArgs {
    pub fn handle(&self) -> Result<()> {
        let mut afp = open(&self.file)?;

        for i in 0..afp.len() {
            let mut entry = afp.by_index(i)?;

            let p = entry_path(&self.directory, entry.name())?;
            info!("writing {}", p.display());

            let mut out = create_file(&p, self.overwrite)?;
            std::io::copy(&mut entry, &mut out)
                .into_diagnostic()
                .context(format!("extracting {}", p.display()))?;
        }
        Ok(())
    }
}
