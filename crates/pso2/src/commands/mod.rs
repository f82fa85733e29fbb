pub mod afp;
pub mod ice;
pub mod model;
pub mod patch;
pub mod proxy;
pub mod prs;
pub mod text;

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Handle AFP archives
    Afp {
        #[command(subcommand)]
        command: afp::AfpCommands,
    },
    /// Handle ICE archives
    Ice {
        #[command(subcommand)]
        command: ice::IceCommands,
    },
    /// Handle text tables
    Text {
        #[command(subcommand)]
        command: text::TextCommands,
    },
    /// Handle VTBF models
    Model {
        #[command(subcommand)]
        command: model::ModelCommands,
    },
    /// Handle PRS compressed data
    Prs {
        #[command(subcommand)]
        command: prs::PrsCommands,
    },
    /// Run the rewriting proxy for every ship
    Proxy(proxy::ProxyArgs),
    /// Apply translations to the text tables inside ICE archives
    Patch(patch::PatchArgs),
}

impl Commands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            Commands::Afp { command } => command.handle(),
            Commands::Ice { command } => command.handle(),
            Commands::Text { command } => command.handle(),
            Commands::Model { command } => command.handle(),
            Commands::Prs { command } => command.handle(),
            Commands::Proxy(proxy) => proxy.handle(),
            Commands::Patch(patch) => patch.handle(),
        }
    }
}

/// Create `path`, refusing to replace an existing file unless `overwrite` is set.
pub(crate) fn create_file(path: &std::path::Path, overwrite: bool) -> miette::Result<std::fs::File> {
    use miette::{Context, IntoDiagnostic};

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .into_diagnostic()
            .context(format!("creating {}", parent.display()))?;
    }

    let file = if !overwrite {
        std::fs::File::create_new(path)
    } else {
        std::fs::File::create(path)
    };
    file.into_diagnostic().context(format!("creating {}", path.display()))
}

/// Join an archive entry name below `directory`, refusing names that would escape it.
pub(crate) fn entry_path(directory: &std::path::Path, name: &str) -> miette::Result<std::path::PathBuf> {
    use std::path::Component;

    let relative = std::path::Path::new(name);
    if relative.components().any(|c| !matches!(c, Component::Normal(_))) {
        return Err(miette::miette!("refusing to extract {name} outside of the target directory"));
    }
    Ok(directory.join(relative))
}
