//! macOS application bundles. Pure file parsing, so it builds and tests everywhere.

use crate::desktop_entry::Locale;
use crate::error::{LaunchError, ParseError};
use crate::host::Host;
use crate::model::{AppHandle, Application, IconSpec, ParseOptions};
use crate::sources::{Backend, SourceEntry};
use crate::terminal::{
    self, APPLE_TERMINAL_ID, ITERM_ID, Terminal, TerminalTemplate, osascript_commandline, shell_quote, user_shell,
    write_script_file,
};
use directories::BaseDirs;
use log::{debug, info};
use plist::{Dictionary, Value};
use std::collections::HashSet;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

pub const FINDER_PATH: &str = "/System/Library/CoreServices/Finder.app";

pub struct MacBackend {
    roots: Vec<PathBuf>,
    seeds: Vec<PathBuf>,
    locale: Locale,
}

impl MacBackend {
    pub fn from_env() -> Self {
        let mut roots = vec![
            PathBuf::from("/Applications"),
            PathBuf::from("/System/Applications"),
            PathBuf::from("/System/Cryptexes/App/System/Applications"),
        ];
        if let Some(base) = BaseDirs::new() {
            roots.push(base.home_dir().join("Applications"));
        }
        roots.push(Path::new(FINDER_PATH).join("Contents/Applications"));

        Self::new(roots, vec![PathBuf::from(FINDER_PATH)], Locale::from_env())
    }

    pub fn new(roots: Vec<PathBuf>, seeds: Vec<PathBuf>, locale: Locale) -> Self {
        Self { roots, seeds, locale }
    }
}

fn is_bundle(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("app")
}

/// Collects bundles below `dir`. Bundles are not descended into.
pub fn scan_bundles(dir: &Path, result: &mut Vec<PathBuf>, abort: &AtomicBool) {
    let mut visited = HashSet::new();
    scan_dir(dir, result, &mut visited, abort);
}

fn scan_dir(dir: &Path, result: &mut Vec<PathBuf>, visited: &mut HashSet<PathBuf>, abort: &AtomicBool) {
    // Symlinked directories may point back at an ancestor.
    if let Ok(real) = fs::canonicalize(dir) {
        if !visited.insert(real) {
            debug!("Skipping {:?}: already scanned", dir);
            return;
        }
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Skipping {:?}: {}", dir, e);
            return;
        }
    };

    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    for path in dirs {
        if is_bundle(&path) {
            result.push(path);
        } else if abort.load(Ordering::Relaxed) {
            break;
        } else {
            scan_dir(&path, result, visited, abort);
        }
    }
}

fn string_value(dict: &Dictionary, key: &str) -> Option<String> {
    dict.get(key)
        .and_then(Value::as_string)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn read_info_plist(bundle: &Path) -> Result<Dictionary, ParseError> {
    let invalid = |reason: String| ParseError::Bundle {
        path: bundle.to_path_buf(),
        reason,
    };
    let bytes = fs::read(bundle.join("Contents/Info.plist"))?;
    Value::from_reader(Cursor::new(bytes))
        .map_err(|e| invalid(format!("unreadable Info.plist: {e}")))?
        .into_dictionary()
        .ok_or_else(|| invalid("Info.plist is not a dictionary".to_string()))
}

fn utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Option<String> {
    let units: Vec<u16> = bytes.chunks_exact(2).map(|c| unit([c[0], c[1]])).collect();
    String::from_utf16(&units).ok()
}

/// Entries of an `InfoPlist.strings` file. Built bundles ship binary lists. Source-style
/// files are `"key" = "value";` lines without enclosing braces, often UTF-16.
fn read_strings(bytes: &[u8]) -> Option<Dictionary> {
    if let Some(dict) = Value::from_reader(Cursor::new(bytes)).ok().and_then(Value::into_dictionary) {
        return Some(dict);
    }

    let text = match bytes {
        [0xFF, 0xFE, rest @ ..] => utf16(rest, u16::from_le_bytes)?,
        [0xFE, 0xFF, rest @ ..] => utf16(rest, u16::from_be_bytes)?,
        _ => String::from_utf8(bytes.to_vec()).ok()?,
    };
    let text = text.trim_start_matches('\u{feff}').trim();
    let text = if text.starts_with('{') { text.to_string() } else { format!("{{\n{text}\n}}") };
    Value::from_reader(Cursor::new(text.into_bytes()))
        .ok()
        .and_then(Value::into_dictionary)
}

fn localized_strings(bundle: &Path, locale: &Locale) -> Option<Dictionary> {
    let resources = bundle.join("Contents/Resources");
    let mut dirs = Vec::new();
    if let Some(lang) = locale.language() {
        if let Some(country) = locale.country() {
            dirs.push(format!("{lang}_{country}.lproj"));
            dirs.push(format!("{lang}-{country}.lproj"));
        }
        dirs.push(format!("{lang}.lproj"));
    }
    dirs.extend(["en.lproj".to_string(), "English.lproj".to_string(), "Base.lproj".to_string()]);

    dirs.iter()
        .filter_map(|d| fs::read(resources.join(d).join("InfoPlist.strings")).ok())
        .find_map(|bytes| read_strings(&bytes))
}

/// Builds an application record from a bundle's `Contents/Info.plist`.
pub fn parse_bundle(path: &Path, use_non_localized_name: bool, locale: &Locale) -> Result<Application, ParseError> {
    let info = read_info_plist(path)?;
    let id = string_value(&info, "CFBundleIdentifier").ok_or_else(|| ParseError::Bundle {
        path: path.to_path_buf(),
        reason: "missing CFBundleIdentifier".to_string(),
    })?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    let non_localized = string_value(&info, "CFBundleName").unwrap_or_else(|| stem.clone());

    let strings = localized_strings(path, locale);
    let localized = strings
        .as_ref()
        .and_then(|s| string_value(s, "CFBundleDisplayName").or_else(|| string_value(s, "CFBundleName")))
        .or_else(|| string_value(&info, "CFBundleDisplayName"))
        .unwrap_or_else(|| if stem.is_empty() { non_localized.clone() } else { stem });
    if localized.trim().is_empty() {
        return Err(ParseError::EmptyName);
    }

    let mut app = Application::new(id, path.to_path_buf(), localized);
    if use_non_localized_name {
        app.push_name(non_localized);
    }

    app.icon = string_value(&info, "CFBundleIconFile").map(|file| {
        let file = if Path::new(&file).extension().is_some() { file } else { format!("{file}.icns") };
        IconSpec::Path(path.join("Contents/Resources").join(file))
    });
    app.description = path.to_string_lossy().into_owned();
    // LSApplicationCategoryType has no terminal category. Terminals are the bundles
    // with a known AppleScript template.
    app.is_terminal_emulator = app.id == APPLE_TERMINAL_ID || app.id == ITERM_ID;

    Ok(app)
}

impl Backend for MacBackend {
    fn name(&self) -> &'static str {
        "macos"
    }

    fn roots(&self) -> Vec<PathBuf> {
        self.roots.clone()
    }

    fn enumerate(&self, abort: &AtomicBool) -> Vec<SourceEntry> {
        let mut paths: Vec<PathBuf> = self.seeds.iter().filter(|s| s.is_dir()).cloned().collect();
        for root in &self.roots {
            if abort.load(Ordering::Relaxed) {
                break;
            }
            scan_bundles(root, &mut paths, abort);
        }

        let mut seen = HashSet::new();
        paths
            .into_iter()
            .filter(|p| seen.insert(p.clone()))
            .map(|path| SourceEntry {
                id: path.to_string_lossy().into_owned(),
                path,
            })
            .collect()
    }

    fn parse(&self, source: &SourceEntry, options: &ParseOptions) -> Result<Application, ParseError> {
        parse_bundle(&source.path, options.use_non_localized_name, &self.locale)
    }

    fn identify_terminals(&self, apps: &[AppHandle]) -> Vec<Terminal> {
        terminal::identify_macos_terminals(apps)
    }

    fn launch(
        &self,
        app: &Application,
        _exec: &[String],
        _url: Option<&str>,
        _terminal: Option<&Terminal>,
        host: &dyn Host,
    ) -> Result<(), LaunchError> {
        host.open_path(&app.source_path)
    }

    fn reveal_label(&self) -> &'static str {
        "Reveal bundle"
    }

    fn reveal(&self, app: &Application, host: &dyn Host) -> Result<(), LaunchError> {
        let argv = ["open".to_string(), "-R".to_string(), app.source_path.to_string_lossy().into_owned()];
        host.run_detached(&argv, None)
    }

    fn run_terminal(
        &self,
        terminal: &Terminal,
        argv: &[String],
        working_dir: Option<&Path>,
        host: &dyn Host,
    ) -> Result<(), LaunchError> {
        let mut script = String::new();
        if let Some(dir) = working_dir {
            script.push_str(&format!("cd {} && ", shell_quote(&dir.to_string_lossy())));
        }
        let command: Vec<String> = argv.iter().map(|a| shell_quote(a)).collect();
        script.push_str(&command.join(" "));
        self.run_terminal_script(terminal, &script, host)
    }

    fn run_terminal_script(&self, terminal: &Terminal, script: &str, host: &dyn Host) -> Result<(), LaunchError> {
        let TerminalTemplate::AppleScript(apple_script) = terminal.template else {
            debug!("Terminal '{}' has no AppleScript template", terminal.id());
            return Err(LaunchError::NoTerminal);
        };

        let script = script.trim();
        if script.is_empty() {
            return Err(LaunchError::EmptyScript);
        }

        let file = write_script_file(&host.cache_dir(), script).map_err(LaunchError::ScriptFile)?;
        let command = format!("{} -i {}", user_shell(), shell_quote(&file.to_string_lossy()));
        info!("Running in terminal '{}': {}", terminal.id(), command);
        host.run_detached(&osascript_commandline(apple_script, &command), None)
    }
}
