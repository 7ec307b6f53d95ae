use crate::error::{LaunchError, ParseError};
use crate::host::Host;
use crate::model::{AppHandle, Application, ParseOptions};
use crate::terminal::Terminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

pub mod macos;
pub mod xdg;

/// One enumerated entry source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Desktop id, or the bundle path until the bundle identifier is read.
    pub id: String,
    pub path: PathBuf,
}

/// Platform-specific half of the indexer: where entries live, how they are parsed and launched.
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Directories watched for changes.
    fn roots(&self) -> Vec<PathBuf>;

    /// Whether subdirectories of the roots are watched too.
    fn watch_subdirectories(&self) -> bool {
        false
    }

    /// Deduplicated sources in parse order. Stops early once `abort` is set.
    fn enumerate(&self, abort: &AtomicBool) -> Vec<SourceEntry>;

    fn parse(&self, source: &SourceEntry, options: &ParseOptions) -> Result<Application, ParseError>;

    /// Terminal descriptors among `apps`, which is sorted by id.
    fn identify_terminals(&self, apps: &[AppHandle]) -> Vec<Terminal>;

    /// Launches `exec` (the record's or one of its actions') with an optional target URL.
    fn launch(
        &self,
        app: &Application,
        exec: &[String],
        url: Option<&str>,
        terminal: Option<&Terminal>,
        host: &dyn Host,
    ) -> Result<(), LaunchError>;

    /// Runs `argv` inside `terminal`.
    fn run_terminal(
        &self,
        terminal: &Terminal,
        argv: &[String],
        working_dir: Option<&Path>,
        host: &dyn Host,
    ) -> Result<(), LaunchError>;

    /// Runs a shell script inside `terminal`.
    fn run_terminal_script(&self, terminal: &Terminal, script: &str, host: &dyn Host) -> Result<(), LaunchError>;

    /// Label of the action that shows a record's source.
    fn reveal_label(&self) -> &'static str {
        "Open desktop entry"
    }

    fn reveal(&self, app: &Application, host: &dyn Host) -> Result<(), LaunchError> {
        host.open_path(&app.source_path)
    }
}

/// Backend for the platform this binary was built for.
pub fn platform_backend() -> Arc<dyn Backend> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(macos::MacBackend::from_env())
    }
    #[cfg(not(target_os = "macos"))]
    {
        Arc::new(xdg::XdgBackend::from_env())
    }
}
