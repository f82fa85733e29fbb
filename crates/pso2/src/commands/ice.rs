use std::{fs::File, io::BufReader, io::BufWriter, path::PathBuf};

use clap::{Args, Subcommand};
use miette::{miette, Context, IntoDiagnostic, Result};
use pso2_archive::ice::IceWriterOptions;
use pso2_archive::IceArchive;
use tracing::info;

use super::{create_file, entry_path};

#[derive(Subcommand)]
pub enum IceCommands {
    /// List the files of an ICE archive
    List(ListArgs),
    /// Extract an ICE archive into a directory, one sub-directory per group
    Extract(ExtractArgs),
    /// Write a copy of an ICE archive with some files replaced or removed
    Repack(RepackArgs),
}

impl IceCommands {
    pub fn handle(&self) -> Result<()> {
        match self {
            IceCommands::List(list) => list.handle(),
            IceCommands::Extract(extract) => extract.handle(),
            IceCommands::Repack(repack) => repack.handle(),
        }
    }
}

pub(crate) fn open(path: &PathBuf) -> Result<IceArchive<BufReader<File>>> {
    let f = File::open(path)
        .into_diagnostic()
        .context(format!("path: {}", path.display()))?;
    Ok(IceArchive::new(BufReader::new(f)).context(format!("reading {}", path.display()))?)
}

#[derive(Args)]
pub struct ListArgs {
    /// An input ICE file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,
}

impl ListArgs {
    pub fn handle(&self) -> Result<()> {
        let ice = open(&self.file)?;
        for (handle, file) in ice.files() {
            println!("{:>6} {:>4} {:>10} {}", handle.to_string(), file.kind, file.size(), file.file_name);
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct ExtractArgs {
    /// An input ICE file
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
        let mut ice = open(&self.file)?;
        let handles: Vec<_> = ice.files().map(|(handle, _)| handle).collect();

        for handle in handles {
            let mut entry = ice.by_index(handle)?;

            let p = entry_path(&self.directory.join(handle.group.to_string()), entry.name())?;
            info!("writing {}", p.display());

            let mut out = create_file(&p, self.overwrite)?;
            std::io::copy(&mut entry, &mut out)
                .into_diagnostic()
                .context(format!("extracting {}", p.display()))?;
        }
        Ok(())
    }
}

/// `NAME=PATH`, an empty path removing the file
fn parse_replacement(value: &str) -> std::result::Result<(String, Option<PathBuf>), String> {
    let (name, path) = value
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=PATH, found {value}"))?;
    if name.is_empty() {
        return Err("the file name is empty".to_owned());
    }
    let path = Some(path).filter(|p| !p.is_empty()).map(PathBuf::from);
    Ok((name.to_owned(), path))
}

#[derive(Args)]
pub struct RepackArgs {
    /// An input ICE file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A target ICE file
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Replace a file with the contents of PATH, or remove it when PATH is empty
    #[arg(short, long, value_name = "NAME=PATH", value_parser = parse_replacement)]
    replace: Vec<(String, Option<PathBuf>)>,

    /// PRS compress the groups that had to be rebuilt
    #[arg(long, default_value_t = false)]
    compress: bool,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl RepackArgs {
    pub fn handle(&self) -> Result<()> {
        let mut ice = open(&self.file)?;

        for (name, path) in &self.replace {
            let handle = ice
                .find_any(name)
                .ok_or(miette!("{} has no file named {name}", self.file.display()))?;

            let data = match path {
                Some(path) => {
                    info!("replacing {name} with {}", path.display());
                    Some(
                        std::fs::read(path)
                            .into_diagnostic()
                            .context(format!("reading {}", path.display()))?,
                    )
                }
                None => {
                    info!("removing {name}");
                    None
                }
            };
            ice.replace(handle, data)?;
        }

        info!("creating {}", self.output.display());
        let out = BufWriter::new(create_file(&self.output, self.overwrite)?);
        let options = IceWriterOptions::builder().compress_modified(self.compress).build();
        let out = ice.write(out, options).context("writing ice file")?;
        out.into_inner()
            .map_err(|e| e.into_error())
            .into_diagnostic()
            .context(format!("flushing {}", self.output.display()))?;
        Ok(())
    }
}
