use std::{fs::File, io::BufReader, io::Cursor, io::Read, path::PathBuf};

use clap::{Args, Subcommand};
use miette::{miette, Context, IntoDiagnostic, Result};
use pso2_text::TextFile;

pub mod apply;
pub mod diff;
pub mod dump;

#[derive(Subcommand)]
pub enum TextCommands {
    /// Print the contents of a text table
    Dump(dump::DumpArgs),
    /// Compare the pairs of two text tables
    Diff(diff::DiffArgs),
    /// Rewrite a text table with translated strings
    Apply(apply::ApplyArgs),
}

impl TextCommands {
    pub fn handle(&self) -> Result<()> {
        match self {
            TextCommands::Dump(dump) => dump.handle(),
            TextCommands::Diff(diff) => diff.handle(),
            TextCommands::Apply(apply) => apply.handle(),
        }
    }
}

/// Where a text table comes from
#[derive(Args)]
pub struct TextSource {
    /// A text table, or the name of one inside `--ice`
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Read the table from this ICE archive
    #[arg(long, value_name = "ARCHIVE")]
    ice: Option<PathBuf>,
}

impl TextSource {
    pub fn describe(&self) -> String {
        match &self.ice {
            Some(ice) => format!("{}:{}", ice.display(), self.file.display()),
            None => self.file.display().to_string(),
        }
    }

    pub fn load(&self) -> Result<TextFile> {
        let Some(archive) = &self.ice else {
            let f = File::open(&self.file)
                .into_diagnostic()
                .context(format!("path: {}", self.file.display()))?;
            return Ok(TextFile::new(BufReader::new(f)).context(format!("reading {}", self.describe()))?);
        };

        let name = self.file.to_string_lossy();
        let mut ice = super::ice::open(archive)?;
        let handle = ice
            .find_any(&name)
            .ok_or(miette!("{} has no file named {name}", archive.display()))?;

        let mut data = Vec::new();
        ice.by_index(handle)?
            .read_to_end(&mut data)
            .into_diagnostic()
            .context(format!("reading {}", self.describe()))?;
        Ok(TextFile::new(Cursor::new(data)).context(format!("reading {}", self.describe()))?)
    }
}
