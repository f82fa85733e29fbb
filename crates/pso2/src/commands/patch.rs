use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufWriter, Cursor, Read},
    path::{Path, PathBuf},
};

use clap::Args;
use miette::{miette, Context, IntoDiagnostic, Result};
use owo_colors::OwoColorize;
use pso2_archive::ice::IceWriterOptions;
use pso2_text::{TextFile, Translation};
use rayon::prelude::*;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use super::text::apply::read_translations;

/// Translations by archive file name, then by text file name inside the archive
type TranslationMap = BTreeMap<String, BTreeMap<String, Vec<Translation>>>;

#[derive(Args)]
pub struct PatchArgs {
    /// A JSON object mapping archive names to text file names to `{identifier, collision, string}` lists
    #[arg(short, long, value_name = "FILE")]
    translations: PathBuf,

    /// Number of archives patched at once
    #[arg(short, long, default_value_t = default_workers())]
    workers: usize,

    /// Move the original archives here before replacing them
    #[arg(short, long, value_name = "DIR")]
    backup: Option<PathBuf>,

    /// Write patched archives here instead of replacing the originals
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// PRS compress the rebuilt groups
    #[arg(long, default_value_t = false)]
    compress: bool,

    /// Archives, or directories searched for them
    #[arg(required = true, value_name = "ARCHIVES")]
    archives: Vec<PathBuf>,
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get()) + 1
}

/// Where one archive is read from and written to
struct Job<'a> {
    source: PathBuf,
    files: &'a BTreeMap<String, Vec<Translation>>,
}

impl PatchArgs {
    fn jobs<'a>(&self, translations: &'a TranslationMap) -> Vec<Job<'a>> {
        self.archives
            .iter()
            .flat_map(|path| WalkDir::new(path).into_iter().filter_map(|e| e.ok()))
            .filter(|e| !e.file_type().is_dir())
            .filter_map(|e| {
                let name = e.file_name().to_str()?;
                let files = translations.get(name)?;
                Some(Job {
                    source: e.into_path(),
                    files,
                })
            })
            .collect()
    }

    fn destination(&self, source: &Path) -> PathBuf {
        match (&self.output, source.file_name()) {
            (Some(output), Some(name)) => output.join(name),
            _ => source.to_path_buf(),
        }
    }

    /// Patch one archive, returning how many pairs changed.
    fn patch(&self, job: &Job<'_>) -> Result<usize> {
        let changed = patch_archive(
            &job.source,
            job.files,
            &self.destination(&job.source),
            self.backup.as_deref(),
            IceWriterOptions::builder().compress_modified(self.compress).build(),
        )?;
        debug!("{}: {changed} pairs changed", job.source.display());
        Ok(changed)
    }

    pub fn handle(&self) -> Result<()> {
        let translations: TranslationMap = read_translations(&self.translations)?;

        for dir in self.backup.iter().chain(self.output.iter()) {
            std::fs::create_dir_all(dir)
                .into_diagnostic()
                .context(format!("creating {}", dir.display()))?;
        }

        let jobs = self.jobs(&translations);
        if jobs.is_empty() {
            return Err(miette!("none of the archives has translations"));
        }
        info!("patching {} archives with {} workers", jobs.len(), self.workers);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers.max(1))
            .build()
            .into_diagnostic()?;
        let results: Vec<(&Job<'_>, Result<usize>)> =
            pool.install(|| jobs.par_iter().map(|job| (job, self.patch(job))).collect());

        let mut changed = 0;
        let mut failed = 0;
        for (job, result) in &results {
            match result {
                Ok(count) => changed += count,
                Err(e) => {
                    failed += 1;
                    error!("{}: {e:?}", job.source.display());
                }
            }
        }

        info!("{} pairs changed in {} archives", changed, results.len() - failed);
        if failed > 0 {
            return Err(miette!("{} of {} archives failed", failed.red(), results.len()));
        }
        Ok(())
    }
}

/// Apply `files` to the text tables of the archive at `source` and write it to `destination` if anything changed.
///
/// An existing `destination` is moved to `backup` first.
fn patch_archive(
    source: &Path,
    files: &BTreeMap<String, Vec<Translation>>,
    destination: &Path,
    backup: Option<&Path>,
    options: IceWriterOptions,
) -> Result<usize> {
    let mut ice = super::ice::open(&source.to_path_buf())?;
    let mut changed = 0;

    for (name, translations) in files {
        let Some(handle) = ice.find_any(name) else {
            warn!("{}: no file named {name}", source.display());
            continue;
        };

        let mut data = Vec::new();
        ice.by_index(handle)?
            .read_to_end(&mut data)
            .into_diagnostic()
            .context(format!("reading {name}"))?;

        let mut text = TextFile::new(Cursor::new(data)).context(format!("parsing {name}"))?;
        let count = text.apply_translations(translations)?;
        if count == 0 {
            continue;
        }

        let data = text.write(Vec::new()).context(format!("writing {name}"))?;
        ice.replace(handle, Some(data))?;
        changed += count;
    }

    if !ice.is_dirty() {
        return Ok(0);
    }

    let temporary = destination.with_extension("patching");
    let out = BufWriter::new(File::create(&temporary).into_diagnostic()?);
    let written = ice
        .write(out, options)
        .context(format!("writing {}", temporary.display()))
        .and_then(|out| out.into_inner().map_err(|e| e.into_error()).into_diagnostic());
    drop(ice);
    if let Err(e) = written {
        let _ = std::fs::remove_file(&temporary);
        return Err(e);
    }

    if let (Some(backup), Some(name)) = (backup, destination.file_name()) {
        if destination.exists() {
            let target = backup.join(name);
            if std::fs::rename(destination, &target).is_err() {
                std::fs::copy(destination, &target)
                    .into_diagnostic()
                    .context(format!("backing up to {}", target.display()))?;
            }
        }
    }

    std::fs::rename(&temporary, destination)
        .into_diagnostic()
        .context(format!("replacing {}", destination.display()))?;
    info!("patched {}", destination.display());
    Ok(changed)
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use pso2_archive::{CompressionMethod, IceArchive, IceWriter};
    use pso2_text::read::{PAIR_END, PAIR_START};
    use pso2_text::{TextEntry, TextValue};
    use tracing_test::traced_test;
    use widestring::U16String;

    use super::*;

    fn table() -> Result<Vec<u8>> {
        let entry = |value: Vec<u32>, text: TextValue| TextEntry { value, text };
        let text = TextFile::from_entries(
            vec![
                entry(vec![PAIR_START], TextValue::None),
                entry(vec![0], TextValue::Identifier("greeting".into())),
                entry(vec![0], TextValue::String(U16String::from_str("Hello"))),
                entry(vec![PAIR_END], TextValue::None),
                entry(vec![0, 0], TextValue::None),
            ],
            true,
        );
        Ok(text.write(Vec::new())?)
    }

    fn archive(path: &Path) -> Result<()> {
        let mut ice = IceWriter::new(Vec::new());
        ice.start_group(CompressionMethod::None)?;
        ice.start_file("ui_text.text", "text")?;
        ice.write_all(&table()?).into_diagnostic()?;
        ice.start_file("other.bin", "bin")?;
        ice.write_all(b"untouched").into_diagnostic()?;
        std::fs::write(path, ice.finish()?).into_diagnostic()
    }

    #[traced_test]
    #[test]
    fn archives_are_patched_and_backed_up() -> Result<()> {
        let root = std::env::temp_dir().join(format!("pso2-patch-{}", std::process::id()));
        let backup = root.join("backup");
        std::fs::create_dir_all(&backup).into_diagnostic()?;
        let path = root.join("0123456789abcdef");
        archive(&path)?;

        let mut files = BTreeMap::new();
        files.insert(
            "ui_text.text".to_owned(),
            vec![Translation::new("greeting".into(), 0, "Bonjour".into())],
        );
        files.insert("missing.text".to_owned(), vec![]);

        let changed = patch_archive(&path, &files, &path, Some(&backup), IceWriterOptions::default())?;
        assert_eq!(changed, 1);
        assert!(backup.join("0123456789abcdef").exists());

        let mut ice = IceArchive::new(File::open(&path).into_diagnostic()?)?;
        let mut data = Vec::new();
        ice.by_name(0, "ui_text.text")?.read_to_end(&mut data).into_diagnostic()?;
        let text = TextFile::new(Cursor::new(data))?;
        assert_eq!(text.pair_string(0)?.to_string_lossy(), "Bonjour");

        let mut other = Vec::new();
        ice.by_name(0, "other.bin")?.read_to_end(&mut other).into_diagnostic()?;
        assert_eq!(other, b"untouched");

        // Nothing left to change, so nothing is written
        assert_eq!(patch_archive(&path, &files, &path, None, IceWriterOptions::default())?, 0);

        std::fs::remove_dir_all(&root).into_diagnostic()?;
        Ok(())
    }
}
