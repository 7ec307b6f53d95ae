use crate::error::ConfigError;
use crate::index_items::ItemOptions;
use crate::model::ParseOptions;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub use_non_localized_name: bool,
    #[serde(default)]
    pub split_camel_case: bool,
    #[serde(default)]
    pub use_acronyms: bool,
    #[serde(default = "default_true")]
    pub ignore_show_in_keys: bool,
    #[serde(default)]
    pub use_exec: bool,
    #[serde(default)]
    pub use_generic_name: bool,
    #[serde(default)]
    pub use_keywords: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal: Option<String>,
}

fn default_true() -> bool { true }

impl Default for Config {
    fn default() -> Self {
        Self {
            use_non_localized_name: false,
            split_camel_case: false,
            use_acronyms: false,
            ignore_show_in_keys: default_true(),
            use_exec: false,
            use_generic_name: false,
            use_keywords: false,
            terminal: None,
        }
    }
}

impl Config {
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            ignore_show_in_keys: self.ignore_show_in_keys,
            use_exec: self.use_exec,
            use_generic_name: self.use_generic_name,
            use_keywords: self.use_keywords,
            use_non_localized_name: self.use_non_localized_name,
        }
    }

    pub fn item_options(&self) -> ItemOptions {
        ItemOptions {
            split_camel_case: self.split_camel_case,
            use_acronyms: self.use_acronyms,
        }
    }
}

pub fn config_path() -> PathBuf {
    match ProjectDirs::from("org", "apps-index", "apps-index") {
        Some(dirs) => dirs.config_dir().join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}

pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml::to_string_pretty(config)?)?;
    Ok(())
}
