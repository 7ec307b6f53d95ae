use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared handle to an indexed application. Cloning is cheap; records never change after publication.
pub type AppHandle = Arc<Application>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IconSpec {
    /// Absolute image file
    Path(PathBuf),
    /// Name looked up in the icon theme
    Theme(String),
}

impl IconSpec {
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let path = Path::new(value);
        if path.is_absolute() {
            Some(IconSpec::Path(path.to_path_buf()))
        } else {
            Some(IconSpec::Theme(value.to_string()))
        }
    }

    pub fn to_arg(&self) -> String {
        match self {
            IconSpec::Path(p) => p.to_string_lossy().into_owned(),
            IconSpec::Theme(name) => name.clone(),
        }
    }
}

/// A `[Desktop Action <id>]` group of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DesktopAction {
    pub id: String,
    pub name: String,
    pub exec: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Application {
    pub id: String,                     // Desktop id or bundle identifier
    pub source_path: PathBuf,           // .desktop file or .app bundle
    pub names: Vec<String>,             // Localized name first, never empty
    pub description: String,
    pub icon: Option<IconSpec>,
    pub exec: Vec<String>,              // Argv template, may hold field codes. Empty for bundles.
    pub working_dir: Option<PathBuf>,
    pub needs_terminal: bool,
    pub is_terminal_emulator: bool,
    pub actions: Vec<DesktopAction>,
}

impl Application {
    pub fn new(id: String, source_path: PathBuf, name: String) -> Self {
        Self {
            id,
            source_path,
            names: vec![name],
            description: String::new(),
            icon: None,
            exec: Vec::new(),
            working_dir: None,
            needs_terminal: false,
            is_terminal_emulator: false,
            actions: Vec::new(),
        }
    }

    /// Display name: the localized name.
    pub fn name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or(&self.id)
    }

    /// Appends a search name unless it is empty or already present.
    pub fn push_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !name.is_empty() && !self.names.contains(&name) {
            self.names.push(name);
        }
    }

    pub fn action(&self, id: &str) -> Option<&DesktopAction> {
        self.actions.iter().find(|a| a.id == id)
    }
}

/// Configuration snapshot that governs one index run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParseOptions {
    pub ignore_show_in_keys: bool,
    pub use_exec: bool,
    pub use_generic_name: bool,
    pub use_keywords: bool,
    pub use_non_localized_name: bool,
}

/// Something the host can trigger on a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionItem {
    pub id: String,
    pub label: String,
}

pub const ACTION_LAUNCH: &str = "launch";
pub const ACTION_REVEAL: &str = "reveal-entry";
pub const ACTION_PREFIX: &str = "action-";
