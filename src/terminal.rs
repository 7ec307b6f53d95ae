//! Terminal emulator detection, selection and commandline construction.

use crate::model::AppHandle;
use log::{debug, warn};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Normalized command → arguments that make the terminal run a command.
/// Sorted by command for binary search.
pub static SUPPORTED_TERMINALS: &[(&str, &[&str])] = &[
    ("alacritty", &["-e"]),
    ("blackbox", &["--"]),
    ("blackbox-terminal", &["--"]),
    ("contour", &["--"]),
    ("cool-retro-term", &["-e"]),
    ("deepin-terminal", &["-e"]),
    ("foot", &[]),
    ("footclient", &[]),
    ("ghostty", &["-e"]),
    ("gnome-terminal", &["--"]),
    ("io.elementary.terminal", &["-x"]),
    ("kgx", &["-e"]),
    ("kitty", &["--"]),
    ("konsole", &["-e"]),
    ("lxterminal", &["-e"]),
    ("mate-terminal", &["-x"]),
    ("ptyxis", &["--"]),
    ("qterminal", &["-e"]),
    ("roxterm", &["-x"]),
    ("sakura", &["-e"]),
    ("st", &["-e"]),
    ("terminator", &["-u", "-x"]), // -u: https://github.com/gnome-terminator/terminator/issues/939
    ("terminology", &["-e"]),
    ("termite", &["-e"]),
    ("tilix", &["-e"]),
    ("urxvt", &["-e"]),
    ("urxvt-tabbed", &["-e"]),
    ("urxvtc", &["-e"]),
    ("uxterm", &["-e"]),
    ("wezterm", &["-e"]),
    ("x-terminal-emulator", &["-e"]),
    ("xfce4-terminal", &["-x"]),
    ("xterm", &["-e"]),
];

pub const APPLE_TERMINAL_ID: &str = "com.apple.Terminal";
pub const ITERM_ID: &str = "com.googlecode.iterm2";

pub const APPLE_TERMINAL_SCRIPT: &str = "tell application \"Terminal\" to activate\n\
     tell application \"Terminal\" to do script \"exec %1\"";
pub const ITERM_SCRIPT: &str =
    "tell application \"iTerm\" to create window with default profile command \"%1\"";

pub fn exec_args(command: &str) -> Option<&'static [&'static str]> {
    SUPPORTED_TERMINALS
        .binary_search_by(|(c, _)| (*c).cmp(command))
        .ok()
        .map(|i| SUPPORTED_TERMINALS[i].1)
}

/// How a terminal is told to run a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalTemplate {
    /// Arguments placed between the terminal's own argv and the command.
    Args(&'static [&'static str]),
    /// AppleScript with a `%1` placeholder for the shell command.
    AppleScript(&'static str),
}

/// An indexed application recognised as a terminal emulator.
#[derive(Debug, Clone)]
pub struct Terminal {
    pub app: AppHandle,
    pub template: TerminalTemplate,
}

impl Terminal {
    pub fn id(&self) -> &str {
        &self.app.id
    }

    pub fn name(&self) -> &str {
        self.app.name()
    }
}

/// Comparable command name of an Exec argv, unwrapping flatpak and snap launchers.
pub fn normalized_command(exec: &[String]) -> Option<String> {
    let first = exec.first()?;

    if basename(first) == "flatpak" {
        let command = exec
            .iter()
            .filter_map(|arg| arg.strip_prefix("--command="))
            .last()
            .map(str::to_string);
        if command.is_none() {
            warn!("Flatpak exec commandline w/o '--command': {}", exec.join(" "));
        }
        return command.filter(|c| !c.is_empty());
    }

    if let Some(arg) = exec.iter().find(|a| a.starts_with("/snap/bin/")) {
        let command = &arg["/snap/bin/".len()..];
        if command.is_empty() {
            warn!("Failed getting snap command: Exec: {}", exec.join(" "));
            return None;
        }
        return Some(command.to_string());
    }

    let name = basename(first);
    (!name.is_empty()).then(|| name.to_string())
}

fn basename(token: &str) -> &str {
    Path::new(token)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(token)
}

/// Terminal descriptors for XDG records flagged as terminal emulators.
pub fn identify_xdg_terminals(apps: &[AppHandle]) -> Vec<Terminal> {
    let mut terminals = Vec::new();
    for app in apps.iter().filter(|a| a.is_terminal_emulator) {
        match normalized_command(&app.exec) {
            Some(command) => match exec_args(&command) {
                Some(args) => terminals.push(Terminal {
                    app: app.clone(),
                    template: TerminalTemplate::Args(args),
                }),
                None => warn!(
                    "Terminal '{}' not supported. Please post an issue. Exec: {}",
                    app.id,
                    app.exec.join(" ")
                ),
            },
            None => warn!(
                "Failed to get normalized command. Terminal '{}' not supported. Exec: {}",
                app.id,
                app.exec.join(" ")
            ),
        }
    }
    terminals
}

/// Wraps the two known macOS terminal bundles. `apps` must be sorted by id.
pub fn identify_macos_terminals(apps: &[AppHandle]) -> Vec<Terminal> {
    [(APPLE_TERMINAL_ID, APPLE_TERMINAL_SCRIPT), (ITERM_ID, ITERM_SCRIPT)]
        .into_iter()
        .filter_map(|(id, script)| {
            apps.binary_search_by(|a| a.id.as_str().cmp(id))
                .ok()
                .map(|i| Terminal {
                    app: apps[i].clone(),
                    template: TerminalTemplate::AppleScript(script),
                })
        })
        .collect()
}

/// Result of choosing the active terminal after an index run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub index: Option<usize>,
    pub notice: Option<String>,
}

pub fn select_terminal(terminals: &[Terminal], configured: Option<&str>) -> Selection {
    let Some(first) = terminals.first() else {
        return Selection {
            index: None,
            notice: Some("No terminals available.".to_string()),
        };
    };

    match configured {
        None => Selection {
            index: Some(0),
            notice: Some(format!("No terminal configured. Using {}.", first.name())),
        },
        Some(id) => match terminals.iter().position(|t| t.id() == id) {
            Some(i) => Selection { index: Some(i), notice: None },
            None => Selection {
                index: Some(0),
                notice: Some(format!(
                    "Configured terminal '{}' does not exist. Using {}.",
                    id,
                    first.id()
                )),
            },
        },
    }
}

/// XDG terminal commandline: the terminal's argv, its exec arguments, then `argv`.
pub fn xdg_commandline(terminal_exec: &[String], args: &[&str], argv: &[String]) -> Vec<String> {
    let mut commandline = terminal_exec.to_vec();
    let already_terminated = !args.is_empty()
        && commandline.len() > args.len()
        && commandline[commandline.len() - args.len()..]
            .iter()
            .zip(args)
            .all(|(a, b)| a == b);
    if !already_terminated {
        commandline.extend(args.iter().map(|a| a.to_string()));
    }
    commandline.extend(argv.iter().cloned());
    commandline
}

pub fn osascript_commandline(apple_script: &str, command: &str) -> Vec<String> {
    vec![
        "/usr/bin/osascript".to_string(),
        "-l".to_string(),
        "AppleScript".to_string(),
        "-e".to_string(),
        apple_script.replace("%1", command),
    ]
}

/// Login shell of the current user, falling back to `$SHELL` and `/bin/sh`.
pub fn user_shell() -> String {
    #[cfg(unix)]
    {
        use nix::unistd::{User, geteuid};
        match User::from_uid(geteuid()) {
            Ok(Some(user)) => {
                let shell = user.shell.to_string_lossy().into_owned();
                if !shell.is_empty() {
                    return shell;
                }
            }
            Ok(None) => debug!("No passwd entry for the current user"),
            Err(e) => debug!("getpwuid failed: {}", e),
        }
    }
    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "/bin/sh".to_string())
}

/// Writes `clear; <script>` to `<dir>/terminal_command`. The file is overwritten on
/// every launch and never deleted, so the terminal can still read it.
pub fn write_script_file(dir: &Path, script: &str) -> std::io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join("terminal_command");
    let mut file = fs::File::create(&path)?;
    file.write_all(b"clear; ")?;
    file.write_all(script.as_bytes())?;
    Ok(path)
}

/// Single-quotes a token for a POSIX shell when needed.
pub fn shell_quote(token: &str) -> String {
    let plain = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        token.to_string()
    } else {
        format!("'{}'", token.replace('\'', r"'\''"))
    }
}
