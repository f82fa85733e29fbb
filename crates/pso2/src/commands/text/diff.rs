use std::{collections::BTreeMap, fmt::Display};

use clap::{Args, ValueEnum};
use itertools::Itertools;
use miette::Result;
use owo_colors::OwoColorize;
use similar::{ChangeTag, TextDiff};

use super::TextSource;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Mode {
    /// Only name the pairs that changed
    #[default]
    Semantic,
    /// Show the changed strings inline
    Full,
}

/// `identifier#collision`
type Key = (String, usize);

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Change {
    Added(Key, String),
    Removed(Key, String),
    Modified(Key, Vec<String>),
}

fn key_name((identifier, collision): &Key) -> String {
    match collision {
        0 => identifier.clone(),
        n => format!("{identifier}#{n}"),
    }
}

impl Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Change::Added(k, v) => writeln!(f, "✅ {}: {}", key_name(k), v.green()),
            Change::Removed(k, v) => writeln!(f, "❌ {}: {}", key_name(k), v.red()),
            Change::Modified(k, context) => {
                writeln!(f, "🔃 {}", key_name(k).blue())?;
                if !context.is_empty() {
                    writeln!(f, "{}", context.iter().map(|l| format!("  {l}")).join("\n"))?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Args)]
pub struct DiffArgs {
    /// An input text table
    #[arg(short, long, value_name = "FILE")]
    left: std::path::PathBuf,

    /// An input text table
    #[arg(short, long, value_name = "FILE")]
    right: std::path::PathBuf,

    /// Read both tables from this ICE archive
    #[arg(long, value_name = "ARCHIVE")]
    ice: Option<std::path::PathBuf>,

    /// Comparison mode
    #[arg(short, long, value_enum, default_value_t = Mode::Semantic)]
    mode: Mode,
}

impl DiffArgs {
    fn pairs(&self, file: &std::path::Path) -> Result<BTreeMap<Key, String>> {
        let source = TextSource {
            file: file.to_path_buf(),
            ice: self.ice.clone(),
        };
        Ok(source
            .load()?
            .translations()?
            .into_iter()
            .map(|t| ((t.identifier, t.collision), t.string))
            .collect())
    }

    fn inline(old: &str, new: &str) -> Vec<String> {
        let diff = TextDiff::from_lines(old, new);
        let mut lines = Vec::new();
        for op in diff.ops() {
            for change in diff.iter_inline_changes(op) {
                let mut line = String::new();
                for (emphasized, value) in change.iter_strings_lossy() {
                    let value = value.trim_end_matches('\n');
                    if !emphasized {
                        line.push_str(&format!("{}", value.dimmed()));
                    } else if change.tag() == ChangeTag::Insert {
                        line.push_str(&format!("{}", value.green().underline()));
                    } else {
                        line.push_str(&format!("{}", value.red().underline()));
                    }
                }
                lines.push(line);
            }
        }
        lines
    }

    fn changes(&self, left: &BTreeMap<Key, String>, right: &BTreeMap<Key, String>) -> Vec<Change> {
        let mut result = Vec::new();

        right
            .iter()
            .filter(|(k, _)| !left.contains_key(*k))
            .for_each(|(k, v)| result.push(Change::Added(k.clone(), v.clone())));

        left.iter()
            .filter(|(k, _)| !right.contains_key(*k))
            .for_each(|(k, v)| result.push(Change::Removed(k.clone(), v.clone())));

        for (k, old) in left {
            let Some(new) = right.get(k) else {
                continue;
            };
            if old == new {
                continue;
            }

            let context = match self.mode {
                Mode::Full => Self::inline(old, new),
                Mode::Semantic => Vec::new(),
            };
            result.push(Change::Modified(k.clone(), context));
        }

        result.sort();
        result
    }

    pub fn handle(&self) -> Result<()> {
        let left = self.pairs(&self.left)?;
        let right = self.pairs(&self.right)?;

        for change in self.changes(&left, &right) {
            print!("{change}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn table(pairs: &[(&str, usize, &str)]) -> BTreeMap<Key, String> {
        pairs
            .iter()
            .map(|(i, c, s)| ((i.to_string(), *c), s.to_string()))
            .collect()
    }

    #[test]
    fn changes_by_identifier_and_collision() {
        let args = DiffArgs {
            left: "a".into(),
            right: "b".into(),
            ice: None,
            mode: Mode::Semantic,
        };
        let left = table(&[("greeting", 0, "Hello"), ("greeting", 1, "Hi"), ("bye", 0, "Bye")]);
        let right = table(&[("greeting", 0, "Hello"), ("greeting", 1, "Hey"), ("new", 0, "New")]);

        assert_eq!(
            args.changes(&left, &right),
            vec![
                Change::Added(("new".into(), 0), "New".into()),
                Change::Removed(("bye".into(), 0), "Bye".into()),
                Change::Modified(("greeting".into(), 1), vec![]),
            ]
        );
    }
}
