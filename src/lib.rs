//! Desktop application index for launchers: XDG desktop entries and macOS bundles,
//! terminal emulator detection and search items.

pub mod config;
pub mod desktop_entry;
pub mod error;
pub mod exec;
pub mod host;
pub mod index_items;
pub mod indexer;
pub mod model;
pub mod plugin;
pub mod sources;
pub mod terminal;
pub mod watcher;

pub use config::Config;
pub use error::{ConfigError, ExecError, LaunchError, ParseError};
pub use host::{Host, SystemHost};
pub use index_items::IndexItem;
pub use model::{AppHandle, Application, ParseOptions};
pub use plugin::Plugin;
