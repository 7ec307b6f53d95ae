use crate::desktop_entry::{DESKTOP_ENTRY_GROUP, DesktopEntryFile, Locale};
use crate::error::{LaunchError, ParseError};
use crate::exec::{FieldContext, build_commandline, command_prefix, expand_field_codes, split_exec};
use crate::host::Host;
use crate::model::{AppHandle, Application, DesktopAction, IconSpec, ParseOptions};
use crate::sources::{Backend, SourceEntry};
use crate::terminal::{self, Terminal, TerminalTemplate, shell_quote, user_shell, xdg_commandline};
use directories::BaseDirs;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use walkdir::WalkDir;

/// First Exec tokens that say nothing about the application.
const GENERIC_LAUNCHERS: &[&str] = &[
    "bash", "dbus-send", "env", "flatpak", "java", "perl", "python", "ruby", "sh",
];

pub struct XdgBackend {
    roots: Vec<PathBuf>,
    desktops: Vec<String>,
    locale: Locale,
}

impl XdgBackend {
    pub fn from_env() -> Self {
        Self::new(application_dirs(), current_desktops(), Locale::from_env())
    }

    pub fn new(roots: Vec<PathBuf>, desktops: Vec<String>, locale: Locale) -> Self {
        Self { roots, desktops, locale }
    }
}

/// `applications` directories in precedence order: `$XDG_DATA_HOME` first, then `$XDG_DATA_DIRS`.
pub fn application_dirs() -> Vec<PathBuf> {
    let data_home = std::env::var("XDG_DATA_HOME")
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| BaseDirs::new().map(|b| b.data_dir().to_path_buf()));
    let data_dirs = std::env::var("XDG_DATA_DIRS")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "/usr/local/share:/usr/share".to_string());

    let mut dirs: Vec<PathBuf> = Vec::new();
    let candidates = data_home
        .into_iter()
        .chain(data_dirs.split(':').filter(|d| !d.is_empty()).map(PathBuf::from))
        .map(|d| d.join("applications"));
    for dir in candidates {
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}

/// Desktop names from `XDG_CURRENT_DESKTOP`.
pub fn current_desktops() -> Vec<String> {
    std::env::var("XDG_CURRENT_DESKTOP")
        .unwrap_or_default()
        .split(':')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Desktop file id: the path below `applications/` with `/` turned into `-`, minus `.desktop`.
pub fn desktop_file_id(root: &Path, path: &Path) -> Option<String> {
    let full = path.to_str()?;
    let relative = match full.rfind("applications/") {
        Some(i) => &full[i + "applications/".len()..],
        None => path.strip_prefix(root).ok()?.to_str()?,
    };
    let id = relative.strip_suffix(".desktop")?.replace('/', "-");
    (!id.is_empty()).then_some(id)
}

/// Maps desktop ids to files. Earlier roots shadow later ones.
pub fn enumerate_desktop_files(roots: &[PathBuf], abort: &AtomicBool) -> BTreeMap<String, PathBuf> {
    let mut files: BTreeMap<String, PathBuf> = BTreeMap::new();

    for root in roots {
        if !root.is_dir() {
            debug!("Skipping missing application directory {:?}", root);
            continue;
        }
        debug!("Scanning desktop entries in {:?}", root);

        let walker = WalkDir::new(root).follow_links(true).sort_by_file_name();
        for entry in walker.into_iter().filter_map(|e| e.ok()) {
            if abort.load(Ordering::Relaxed) {
                return files;
            }
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("desktop") {
                continue;
            }
            let Some(id) = desktop_file_id(root, path) else {
                debug!("Cannot derive desktop id for {:?}", path);
                continue;
            };
            match files.entry(id) {
                Entry::Vacant(v) => {
                    v.insert(path.to_path_buf());
                }
                Entry::Occupied(o) => debug!(
                    "Desktop file '{}' at {:?} will be skipped: Shadowed by {:?}",
                    o.key(),
                    path,
                    o.get()
                ),
            }
        }
    }

    files
}

/// Builds an application record from a desktop file.
pub fn parse_desktop_entry(
    id: &str,
    path: &Path,
    options: &ParseOptions,
    desktops: &[String],
    locale: &Locale,
) -> Result<Application, ParseError> {
    let file = DesktopEntryFile::read(path)?;
    let root = DESKTOP_ENTRY_GROUP;

    let is_terminal_emulator = file
        .list(root, "Categories")
        .is_some_and(|cats| cats.iter().any(|c| c == "TerminalEmulator"));

    match file.string(root, "Type") {
        Some(t) if t == "Application" => {}
        Some(_) => return Err(ParseError::NotApplication),
        None => return Err(ParseError::MissingKey("Type")),
    }

    if file.boolean(root, "NoDisplay") == Some(true) {
        return Err(ParseError::NoDisplay);
    }
    if file.boolean(root, "Hidden") == Some(true) {
        return Err(ParseError::Hidden);
    }

    if !options.ignore_show_in_keys {
        if let Some(not_show_in) = file.list(root, "NotShowIn") {
            if not_show_in.iter().any(|de| desktops.contains(de)) {
                return Err(ParseError::NotShowIn);
            }
        }
        if let Some(only_show_in) = file.list(root, "OnlyShowIn") {
            if !only_show_in.iter().any(|de| desktops.contains(de)) {
                return Err(ParseError::OnlyShowIn);
            }
        }
    }

    let raw_name = file.string(root, "Name").ok_or(ParseError::MissingKey("Name"))?;
    let name = file.locale_string(root, "Name", locale).unwrap_or_else(|| raw_name.clone());
    if name.trim().is_empty() {
        return Err(ParseError::EmptyName);
    }

    let exec = read_exec(&file, root)?;

    let mut app = Application::new(id.to_string(), path.to_path_buf(), name);
    app.is_terminal_emulator = is_terminal_emulator;

    if options.use_non_localized_name {
        app.push_name(raw_name);
    }

    if options.use_exec {
        if let Some(first) = exec.first().filter(|f| !is_generic_launcher(f)) {
            app.push_name(first.clone());
        }
    }

    let keywords = file.locale_list(root, "Keywords", locale).unwrap_or_default();
    app.description = file
        .locale_string(root, "Comment", locale)
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| keywords.join(", "));
    if options.use_keywords {
        for keyword in &keywords {
            app.push_name(keyword.clone());
        }
    }

    if options.use_generic_name {
        if let Some(generic) = file.locale_string(root, "GenericName", locale) {
            app.push_name(generic);
        }
    }

    app.icon = file
        .locale_string(root, "Icon", locale)
        .and_then(|i| IconSpec::parse(&i));
    app.working_dir = file
        .string(root, "Path")
        .filter(|p| !p.is_empty())
        .map(PathBuf::from);
    app.needs_terminal = file.boolean(root, "Terminal").unwrap_or(false);
    app.exec = exec;

    for action_id in file.list(root, "Actions").unwrap_or_default() {
        match read_action(&file, &action_id, locale) {
            Ok(action) => app.actions.push(action),
            Err(e) => warn!("{:?}: Desktop action '{}' skipped: {}", path, action_id, e),
        }
    }

    Ok(app)
}

fn read_exec(file: &DesktopEntryFile, group: &str) -> Result<Vec<String>, ParseError> {
    let value = file.string(group, "Exec").ok_or(ParseError::MissingKey("Exec"))?;
    let exec = split_exec(&value)?;
    if exec.is_empty() {
        return Err(ParseError::EmptyExec);
    }
    Ok(exec)
}

fn read_action(file: &DesktopEntryFile, action_id: &str, locale: &Locale) -> Result<DesktopAction, ParseError> {
    let group = format!("Desktop Action {action_id}");
    let name = file
        .locale_string(&group, "Name", locale)
        .filter(|n| !n.is_empty())
        .ok_or(ParseError::MissingKey("Name"))?;
    let exec = read_exec(file, &group)?;
    Ok(DesktopAction {
        id: action_id.to_string(),
        name,
        exec,
    })
}

fn is_generic_launcher(first: &str) -> bool {
    first.starts_with('/') || GENERIC_LAUNCHERS.contains(&first)
}

fn field_context(app: &Application) -> FieldContext<'_> {
    FieldContext {
        name: app.name(),
        icon: app.icon.as_ref(),
        source_path: &app.source_path,
    }
}

impl Backend for XdgBackend {
    fn name(&self) -> &'static str {
        "xdg"
    }

    fn roots(&self) -> Vec<PathBuf> {
        self.roots.clone()
    }

    fn watch_subdirectories(&self) -> bool {
        true
    }

    fn enumerate(&self, abort: &AtomicBool) -> Vec<SourceEntry> {
        enumerate_desktop_files(&self.roots, abort)
            .into_iter()
            .map(|(id, path)| SourceEntry { id, path })
            .collect()
    }

    fn parse(&self, source: &SourceEntry, options: &ParseOptions) -> Result<Application, ParseError> {
        parse_desktop_entry(&source.id, &source.path, options, &self.desktops, &self.locale)
    }

    fn identify_terminals(&self, apps: &[AppHandle]) -> Vec<Terminal> {
        terminal::identify_xdg_terminals(apps)
    }

    fn launch(
        &self,
        app: &Application,
        exec: &[String],
        url: Option<&str>,
        terminal: Option<&Terminal>,
        host: &dyn Host,
    ) -> Result<(), LaunchError> {
        let commandline = build_commandline(exec, url, &field_context(app), &command_prefix());
        if commandline.is_empty() {
            return Err(LaunchError::EmptyCommandline);
        }

        if app.needs_terminal {
            let terminal = terminal.ok_or(LaunchError::NoTerminal)?;
            self.run_terminal(terminal, &commandline, app.working_dir.as_deref(), host)
        } else {
            host.run_detached(&commandline, app.working_dir.as_deref())
        }
    }

    fn run_terminal(
        &self,
        terminal: &Terminal,
        argv: &[String],
        working_dir: Option<&Path>,
        host: &dyn Host,
    ) -> Result<(), LaunchError> {
        match terminal.template {
            TerminalTemplate::Args(args) => {
                let exec = expand_field_codes(&terminal.app.exec, None, &field_context(&terminal.app));
                let commandline = xdg_commandline(&exec, args, argv);
                let working_dir = working_dir.or(terminal.app.working_dir.as_deref());
                info!("Running in terminal '{}': {}", terminal.id(), commandline.join(" "));
                host.run_detached(&commandline, working_dir)
            }
            TerminalTemplate::AppleScript(_) => {
                let script: Vec<String> = argv.iter().map(|a| shell_quote(a)).collect();
                self.run_terminal_script(terminal, &script.join(" "), host)
            }
        }
    }

    fn run_terminal_script(&self, terminal: &Terminal, script: &str, host: &dyn Host) -> Result<(), LaunchError> {
        let script = script.trim();
        if script.is_empty() {
            return Err(LaunchError::EmptyScript);
        }
        let argv = [user_shell(), "-i".to_string(), "-c".to_string(), script.to_string()];
        self.run_terminal(terminal, &argv, None, host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::RecordingHost;
    use std::fs;
    use std::sync::Arc;

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    fn parse(path: &Path, options: ParseOptions, desktops: &[&str]) -> Result<Application, ParseError> {
        let desktops: Vec<String> = desktops.iter().map(|d| d.to_string()).collect();
        parse_desktop_entry("test", path, &options, &desktops, &Locale::default())
    }

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn computes_desktop_ids() {
        let root = Path::new("/usr/share/applications");
        assert_eq!(
            desktop_file_id(root, Path::new("/usr/share/applications/kde4/dolphin.desktop")).as_deref(),
            Some("kde4-dolphin")
        );
        assert_eq!(
            desktop_file_id(Path::new("/opt/apps"), Path::new("/opt/apps/sub/x.desktop")).as_deref(),
            Some("sub-x")
        );
        assert_eq!(desktop_file_id(root, Path::new("/usr/share/applications/readme.txt")), None);
    }

    #[test]
    fn earlier_roots_shadow_later_ones() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a/applications");
        let b = tmp.path().join("b/applications");
        let entry = "[Desktop Entry]\nType=Application\nName=Foo\nExec=foo\n";
        let in_a = write(&a, "foo.desktop", entry);
        write(&b, "foo.desktop", entry);
        write(&b, "nested/bar.desktop", entry);
        write(&b, "notes.txt", "x");

        let files = enumerate_desktop_files(&[a, b.clone(), tmp.path().join("missing")], &AtomicBool::new(false));
        assert_eq!(files.keys().collect::<Vec<_>>(), vec!["foo", "nested-bar"]);
        assert_eq!(files["foo"], in_a);
        assert_eq!(files["nested-bar"], b.join("nested/bar.desktop"));
    }

    #[test]
    fn enumeration_stops_when_aborted() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("applications");
        write(&root, "foo.desktop", "[Desktop Entry]\n");
        assert!(enumerate_desktop_files(&[root], &AtomicBool::new(true)).is_empty());
    }

    #[test]
    fn parses_a_minimal_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(tmp.path(), "applications/firefox.desktop", "[Desktop Entry]\nType=Application\nName=Firefox\nExec=firefox %u\n");
        let app = parse(&path, ParseOptions::default(), &[]).unwrap();
        assert_eq!(app.names, vec!["Firefox"]);
        assert_eq!(app.exec, s(&["firefox", "%u"]));
        assert_eq!(app.description, "");
        assert!(!app.needs_terminal);
        assert!(!app.is_terminal_emulator);
        assert!(app.actions.is_empty());
    }

    #[test]
    fn collects_optional_names_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(
            tmp.path(),
            "applications/org.gnome.Nautilus.desktop",
            "[Desktop Entry]\nType=Application\nName=Files\nName[de]=Dateien\nGenericName=File Manager\n\
             Keywords=folder;manager;Files;\nExec=nautilus --new-window %U\nIcon=org.gnome.Nautilus\n\
             Path=/tmp\nTerminal=false\n",
        );
        let options = ParseOptions {
            ignore_show_in_keys: true,
            use_exec: true,
            use_generic_name: true,
            use_keywords: true,
            use_non_localized_name: true,
        };
        let de = Locale::parse("de_DE.UTF-8");
        let app = parse_desktop_entry("org.gnome.Nautilus", &path, &options, &[], &de).unwrap();
        assert_eq!(app.names, vec!["Dateien", "Files", "nautilus", "folder", "manager", "File Manager"]);
        assert_eq!(app.description, "folder, manager, Files");
        assert_eq!(app.icon, Some(IconSpec::Theme("org.gnome.Nautilus".into())));
        assert_eq!(app.working_dir, Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn generic_launchers_are_not_names() {
        let tmp = tempfile::tempdir().unwrap();
        let options = ParseOptions {
            use_exec: true,
            ..Default::default()
        };
        for exec in ["env FOO=1 app", "/usr/bin/app", "python3x", "flatpak run org.App"] {
            let path = write(tmp.path(), "applications/x.desktop", &format!("[Desktop Entry]\nType=Application\nName=X\nExec={exec}\n"));
            let app = parse(&path, options, &[]).unwrap();
            let expected = if exec == "python3x" { vec!["X", "python3x"] } else { vec!["X"] };
            assert_eq!(app.names, expected, "Exec={exec}");
        }
    }

    #[test]
    fn comment_wins_over_keywords_for_description() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(tmp.path(), "applications/x.desktop", "[Desktop Entry]\nType=Application\nName=X\nExec=x\nComment=Does X\nKeywords=a;b\n");
        assert_eq!(parse(&path, ParseOptions::default(), &[]).unwrap().description, "Does X");
    }

    #[test]
    fn rejects_invalid_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let cases = [
            ("Type=Link\nName=X\nExec=x", "NotApplication"),
            ("Name=X\nExec=x", "MissingKey(\"Type\")"),
            ("Type=Application\nName=X\nExec=x\nNoDisplay=true", "NoDisplay"),
            ("Type=Application\nName=X\nExec=x\nHidden=true", "Hidden"),
            ("Type=Application\nName=\nExec=x", "EmptyName"),
            ("Type=Application\nExec=x", "MissingKey(\"Name\")"),
            ("Type=Application\nName=X\nExec=", "EmptyExec"),
            ("Type=Application\nName=X", "MissingKey(\"Exec\")"),
            ("Type=Application\nName=X\nExec=\"x", "MalformedExec(UnterminatedQuote)"),
        ];
        for (body, expected) in cases {
            let path = write(tmp.path(), "applications/bad.desktop", &format!("[Desktop Entry]\n{body}\n"));
            let err = parse(&path, ParseOptions::default(), &[]).unwrap_err();
            assert_eq!(format!("{err:?}"), expected, "{body:?}");
        }
        let missing = parse(&tmp.path().join("nope.desktop"), ParseOptions::default(), &[]).unwrap_err();
        assert!(matches!(missing, ParseError::Io(_)));
    }

    #[test]
    fn show_in_keys_respect_the_option() {
        let tmp = tempfile::tempdir().unwrap();
        let only_kde = write(tmp.path(), "applications/kde.desktop", "[Desktop Entry]\nType=Application\nName=K\nExec=k\nOnlyShowIn=KDE;\n");
        let not_gnome = write(tmp.path(), "applications/ng.desktop", "[Desktop Entry]\nType=Application\nName=N\nExec=n\nNotShowIn=GNOME;\n");
        let strict = ParseOptions {
            ignore_show_in_keys: false,
            ..Default::default()
        };
        let lenient = ParseOptions {
            ignore_show_in_keys: true,
            ..Default::default()
        };

        assert!(matches!(parse(&only_kde, strict, &["GNOME"]), Err(ParseError::OnlyShowIn)));
        assert!(parse(&only_kde, strict, &["ubuntu", "KDE"]).is_ok());
        assert!(parse(&only_kde, lenient, &["GNOME"]).is_ok());
        assert!(matches!(parse(&not_gnome, strict, &["ubuntu", "GNOME"]), Err(ParseError::NotShowIn)));
        assert!(parse(&not_gnome, lenient, &["GNOME"]).is_ok());

        let only_nowhere = write(tmp.path(), "applications/none.desktop", "[Desktop Entry]\nType=Application\nName=E\nExec=e\nOnlyShowIn=\n");
        assert!(matches!(parse(&only_nowhere, strict, &["GNOME"]), Err(ParseError::OnlyShowIn)));
        assert!(parse(&only_nowhere, lenient, &["GNOME"]).is_ok());
    }

    #[test]
    fn malformed_actions_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(
            tmp.path(),
            "applications/kitty.desktop",
            "[Desktop Entry]\nType=Application\nName=kitty\nExec=kitty\nCategories=System;TerminalEmulator;\n\
             Actions=new;broken;missing;\n\n\
             [Desktop Action new]\nName=New Window\nExec=kitty --single-instance\n\n\
             [Desktop Action broken]\nName=Broken\nExec=\"unterminated\n",
        );
        let app = parse(&path, ParseOptions::default(), &[]).unwrap();
        assert!(app.is_terminal_emulator);
        assert_eq!(app.actions.len(), 1);
        assert_eq!(app.actions[0].id, "new");
        assert_eq!(app.actions[0].exec, s(&["kitty", "--single-instance"]));
    }

    fn terminal_for(exec: &[&str]) -> Terminal {
        let mut app = Application::new("org.gnome.Terminal".into(), PathBuf::from("/a/t.desktop"), "Terminal".into());
        app.exec = s(exec);
        app.is_terminal_emulator = true;
        Terminal {
            app: Arc::new(app),
            template: TerminalTemplate::Args(&["--"]),
        }
    }

    fn backend() -> XdgBackend {
        XdgBackend::new(Vec::new(), Vec::new(), Locale::default())
    }

    #[test]
    fn terminal_argv_is_prefixed_with_the_terminal() {
        let host = RecordingHost::default();
        let terminal = terminal_for(&["gnome-terminal", "--"]);
        backend()
            .run_terminal(&terminal, &s(&["echo", "hi"]), None, &host)
            .unwrap();
        assert_eq!(host.spawned()[0].0, s(&["gnome-terminal", "--", "echo", "hi"]));
    }

    #[test]
    fn terminal_scripts_run_through_the_user_shell() {
        let host = RecordingHost::default();
        let terminal = terminal_for(&["gnome-terminal"]);
        let backend = backend();
        assert!(matches!(
            backend.run_terminal_script(&terminal, "  \n ", &host),
            Err(LaunchError::EmptyScript)
        ));
        backend.run_terminal_script(&terminal, " echo hi ", &host).unwrap();
        let argv = &host.spawned()[0].0;
        assert_eq!(argv[..2], s(&["gnome-terminal", "--"])[..]);
        assert_eq!(argv[3..], s(&["-i", "-c", "echo hi"])[..]);
    }

    #[test]
    fn terminal_apps_need_a_terminal() {
        let host = RecordingHost::default();
        let mut app = Application::new("htop".into(), PathBuf::from("/a/htop.desktop"), "htop".into());
        app.exec = s(&["htop"]);
        app.needs_terminal = true;
        app.working_dir = Some(PathBuf::from("/tmp"));
        let backend = backend();

        assert!(matches!(
            backend.launch(&app, &app.exec, None, None, &host),
            Err(LaunchError::NoTerminal)
        ));

        let terminal = terminal_for(&["kitty"]);
        backend.launch(&app, &app.exec, None, Some(&terminal), &host).unwrap();
        assert_eq!(host.spawned()[0], (s(&["kitty", "--", "htop"]), Some(PathBuf::from("/tmp"))));
    }
}
