use std::io::Write;

use clap::{Args, ValueEnum};
use miette::{IntoDiagnostic, Result};
use owo_colors::OwoColorize;
use pso2_text::TextValue;

use super::TextSource;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Format {
    /// One line per pair
    #[default]
    Pairs,
    /// Every entry with its words
    Entries,
    /// The whole table as JSON
    Json,
    /// The pairs as a JSON translation list
    Translations,
}

#[derive(Args)]
pub struct DumpArgs {
    #[command(flatten)]
    source: TextSource,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Pairs)]
    format: Format,
}

impl DumpArgs {
    pub fn handle(&self) -> Result<()> {
        let text = self.source.load()?;
        let mut out = std::io::stdout().lock();

        match self.format {
            Format::Pairs => {
                for index in 0..text.pairs().len() {
                    writeln!(
                        out,
                        "{}: {}",
                        text.pair_identifier(index)?.blue(),
                        text.pair_string(index)?.display()
                    )
                    .into_diagnostic()?;
                }
            }
            Format::Entries => {
                for (index, entry) in text.entries().iter().enumerate() {
                    let words = entry.value.iter().map(|w| format!("{w:#010x}")).collect::<Vec<_>>();
                    let text = match &entry.text {
                        TextValue::None => String::new(),
                        TextValue::Identifier(identifier) => format!(" {}", identifier.blue()),
                        TextValue::String(string) => format!(" {}", string.display().green()),
                    };
                    writeln!(out, "{index:>6} [{}]{text}", words.join(", ")).into_diagnostic()?;
                }
            }
            Format::Json => {
                serde_json::to_writer_pretty(&mut out, &text).into_diagnostic()?;
                writeln!(out).into_diagnostic()?;
            }
            Format::Translations => {
                serde_json::to_writer_pretty(&mut out, &text.translations()?).into_diagnostic()?;
                writeln!(out).into_diagnostic()?;
            }
        }
        Ok(())
    }
}
