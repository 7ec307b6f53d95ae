//! Error types shared across the indexer.

use std::path::PathBuf;

/// Errors produced while splitting an `Exec` value into argv tokens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecError {
    #[error("unterminated quote")]
    UnterminatedQuote,

    #[error("unterminated escape at end of string")]
    TrailingBackslash,

    #[error("invalid escape '\\{0}' in quoted string")]
    InvalidQuotedEscape(char),
}

/// Reasons an entry source is rejected. None of these are fatal for an index run.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing required key '{0}'")]
    MissingKey(&'static str),

    #[error("entries of type other than 'Application' are not handled")]
    NotApplication,

    #[error("excluded by 'NoDisplay'")]
    NoDisplay,

    #[error("excluded by 'Hidden'")]
    Hidden,

    #[error("excluded by 'NotShowIn'")]
    NotShowIn,

    #[error("excluded by 'OnlyShowIn'")]
    OnlyShowIn,

    #[error("empty Name value")]
    EmptyName,

    #[error("empty Exec value")]
    EmptyExec,

    #[error("malformed Exec value: {0}")]
    MalformedExec(#[from] ExecError),

    #[error("invalid bundle {path}: {reason}")]
    Bundle { path: PathBuf, reason: String },
}

/// Failures surfaced to the user when launching something.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("No terminal available.")]
    NoTerminal,

    #[error("Failed to run terminal with script: Script is empty.")]
    EmptyScript,

    #[error("Failed to run terminal with script: Could not create temporary script file. {0}")]
    ScriptFile(std::io::Error),

    #[error("Empty command line.")]
    EmptyCommandline,

    #[error("Unknown action '{0}'.")]
    UnknownAction(String),

    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Config file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
