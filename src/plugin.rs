//! Host-facing facade: owns the published index, the terminal selection and the settings.

use crate::config::{Config, save_config_to};
use crate::error::LaunchError;
use crate::host::Host;
use crate::index_items::{IndexItem, build_index_items};
use crate::indexer::{IndexRun, Indexer};
use crate::model::{ACTION_LAUNCH, ACTION_PREFIX, ACTION_REVEAL, ActionItem, AppHandle, Application};
use crate::sources::Backend;
use crate::terminal::{Terminal, select_terminal};
use crate::watcher::WatchEvent;
use calloop::LoopHandle;
use calloop::channel::{Channel, Event, Sender};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_TRIGGER: &str = "apps ";

pub struct Plugin<H: Host> {
    host: H,
    backend: Arc<dyn Backend>,
    indexer: Indexer,
    config: Config,
    config_path: Option<PathBuf>,
    apps: Vec<AppHandle>,
    items: Vec<IndexItem>,
    terminals: Vec<Terminal>,
    active_terminal: Option<usize>,
    terminal_notice: Option<String>,
    published: u64,
    reindex_pending: bool,
}

impl<H: Host> Plugin<H> {
    /// `config_path`, when set, is where settings changes are persisted.
    pub fn new(
        host: H,
        backend: Arc<dyn Backend>,
        config: Config,
        config_path: Option<PathBuf>,
        finished: Sender<IndexRun>,
    ) -> Self {
        Self {
            host,
            indexer: Indexer::new(backend.clone(), finished),
            backend,
            config,
            config_path,
            apps: Vec::new(),
            items: Vec::new(),
            terminals: Vec::new(),
            active_terminal: None,
            terminal_notice: None,
            published: 0,
            reindex_pending: false,
        }
    }

    pub fn default_trigger(&self) -> &'static str {
        DEFAULT_TRIGGER
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Requests a fresh index run, superseding any running one.
    pub fn update_index_items(&mut self) {
        self.reindex_pending = false;
        self.indexer.run(self.config.parse_options());
    }

    /// Whether the latest requested run has not been published yet.
    pub fn is_indexing(&self) -> bool {
        self.published != self.indexer.generation()
    }

    /// Publishes a finished run: swaps the index, reselects the terminal and hands the
    /// new items to the host.
    pub fn finish(&mut self, run: IndexRun) {
        if run.generation != self.indexer.generation() {
            debug!(
                "Publishing index run {} while run {} is pending",
                run.generation,
                self.indexer.generation()
            );
        }
        debug!("Index run {} took {} ms", run.generation, run.elapsed.as_millis());

        self.published = self.published.max(run.generation);
        self.apps = run.apps;
        self.terminals = self.backend.identify_terminals(&self.apps);

        let selection = select_terminal(&self.terminals, self.config.terminal.as_deref());
        self.active_terminal = selection.index;
        self.terminal_notice = selection.notice;
        if let Some(terminal) = self.active_terminal() {
            debug!("Active terminal: {}", terminal.id());
        }

        self.rebuild_items();
        self.host.apps_changed();
    }

    fn rebuild_items(&mut self) {
        self.items = build_index_items(&self.apps, self.config.item_options());
        self.host.set_index_items(&self.items);
    }

    pub fn index_items(&self) -> &[IndexItem] {
        &self.items
    }

    /// The published index, sorted by id.
    pub fn applications(&self) -> &[AppHandle] {
        &self.apps
    }

    pub fn find(&self, id: &str) -> Option<&AppHandle> {
        self.apps
            .binary_search_by(|a| a.id.as_str().cmp(id))
            .ok()
            .map(|i| &self.apps[i])
    }

    /// Terminals sorted case-insensitively by name.
    pub fn terminals(&self) -> Vec<&Terminal> {
        let mut terminals: Vec<&Terminal> = self.terminals.iter().collect();
        terminals.sort_by_cached_key(|t| t.name().to_lowercase());
        terminals
    }

    pub fn active_terminal(&self) -> Option<&Terminal> {
        self.active_terminal.and_then(|i| self.terminals.get(i))
    }

    /// Selects and persists the terminal with `id`. Unknown ids are ignored.
    pub fn set_terminal(&mut self, id: &str) -> bool {
        let Some(index) = self.terminals.iter().position(|t| t.id() == id) else {
            warn!("Terminal '{}' does not exist", id);
            return false;
        };
        self.active_terminal = Some(index);
        self.terminal_notice = None;
        if self.config.terminal.as_deref() != Some(id) {
            self.config.terminal = Some(id.to_string());
            self.persist();
        }
        true
    }

    /// Terminal-emulator records and their Exec lines.
    pub fn terminal_report(&self) -> BTreeMap<String, String> {
        self.apps
            .iter()
            .filter(|a| a.is_terminal_emulator)
            .map(|a| (a.id.clone(), a.exec.join(" ")))
            .collect()
    }

    fn show_terminal_notice(&mut self) {
        if let Some(notice) = self.terminal_notice.take() {
            self.host.warning(&notice);
        }
    }

    fn report(&self, result: Result<(), LaunchError>) -> Result<(), LaunchError> {
        if let Err(e) = &result {
            self.host.warning(&e.to_string());
        }
        result
    }

    /// Runs a shell script in the active terminal.
    pub fn run_terminal(&mut self, script: &str) -> Result<(), LaunchError> {
        self.show_terminal_notice();
        let result = match self.active_terminal() {
            Some(terminal) => self.backend.run_terminal_script(terminal, script, &self.host),
            None => Err(LaunchError::NoTerminal),
        };
        self.report(result)
    }

    /// Runs `argv` in the active terminal, in `working_dir` if given.
    pub fn run_terminal_argv(&mut self, argv: &[String], working_dir: Option<&Path>) -> Result<(), LaunchError> {
        self.show_terminal_notice();
        let result = match self.active_terminal() {
            Some(terminal) => self.backend.run_terminal(terminal, argv, working_dir, &self.host),
            None => Err(LaunchError::NoTerminal),
        };
        self.report(result)
    }

    /// Launch first, then desktop actions, then the reveal action.
    pub fn actions(&self, app: &Application) -> Vec<ActionItem> {
        let mut actions = vec![ActionItem {
            id: ACTION_LAUNCH.to_string(),
            label: "Launch app".to_string(),
        }];
        actions.extend(app.actions.iter().map(|a| ActionItem {
            id: format!("{ACTION_PREFIX}{}", a.id),
            label: a.name.clone(),
        }));
        actions.push(ActionItem {
            id: ACTION_REVEAL.to_string(),
            label: self.backend.reveal_label().to_string(),
        });
        actions
    }

    pub fn launch(&mut self, app: &Application, url: Option<&str>) -> Result<(), LaunchError> {
        self.activate(app, ACTION_LAUNCH, url)
    }

    /// Triggers the action `action_id` of [`Plugin::actions`].
    pub fn activate(&mut self, app: &Application, action_id: &str, url: Option<&str>) -> Result<(), LaunchError> {
        if app.needs_terminal {
            self.show_terminal_notice();
        }

        let result = if action_id == ACTION_LAUNCH {
            info!("Launching '{}'", app.id);
            self.backend.launch(app, &app.exec, url, self.active_terminal(), &self.host)
        } else if action_id == ACTION_REVEAL {
            self.backend.reveal(app, &self.host)
        } else {
            match action_id.strip_prefix(ACTION_PREFIX).and_then(|id| app.action(id)) {
                Some(action) => {
                    info!("Launching '{}' action '{}'", app.id, action.id);
                    self.backend.launch(app, &action.exec, url, self.active_terminal(), &self.host)
                }
                None => Err(LaunchError::UnknownAction(action_id.to_string())),
            }
        };
        self.report(result)
    }

    /// Marks the index stale. Runs are started by [`Plugin::flush_pending_reindex`] so a
    /// burst of events costs one run.
    pub fn note_source_change(&mut self, event: &WatchEvent) {
        debug!("Source change: {:?}", event.paths);
        self.reindex_pending = true;
    }

    pub fn flush_pending_reindex(&mut self) -> bool {
        if !self.reindex_pending {
            return false;
        }
        self.update_index_items();
        true
    }

    fn persist(&self) {
        let Some(path) = &self.config_path else {
            return;
        };
        if let Err(e) = save_config_to(&self.config, path) {
            warn!("Failed to save config to {:?}: {}", path, e);
        }
    }

    pub fn use_non_localized_name(&self) -> bool {
        self.config.use_non_localized_name
    }

    pub fn set_use_non_localized_name(&mut self, v: bool) {
        if self.config.use_non_localized_name != v {
            self.config.use_non_localized_name = v;
            self.persist();
            self.update_index_items();
        }
    }

    pub fn ignore_show_in_keys(&self) -> bool {
        self.config.ignore_show_in_keys
    }

    pub fn set_ignore_show_in_keys(&mut self, v: bool) {
        if self.config.ignore_show_in_keys != v {
            self.config.ignore_show_in_keys = v;
            self.persist();
            self.update_index_items();
        }
    }

    pub fn use_exec(&self) -> bool {
        self.config.use_exec
    }

    pub fn set_use_exec(&mut self, v: bool) {
        if self.config.use_exec != v {
            self.config.use_exec = v;
            self.persist();
            self.update_index_items();
        }
    }

    pub fn use_generic_name(&self) -> bool {
        self.config.use_generic_name
    }

    pub fn set_use_generic_name(&mut self, v: bool) {
        if self.config.use_generic_name != v {
            self.config.use_generic_name = v;
            self.persist();
            self.update_index_items();
        }
    }

    pub fn use_keywords(&self) -> bool {
        self.config.use_keywords
    }

    pub fn set_use_keywords(&mut self, v: bool) {
        if self.config.use_keywords != v {
            self.config.use_keywords = v;
            self.persist();
            self.update_index_items();
        }
    }

    pub fn split_camel_case(&self) -> bool {
        self.config.split_camel_case
    }

    pub fn set_split_camel_case(&mut self, v: bool) {
        if self.config.split_camel_case != v {
            self.config.split_camel_case = v;
            self.persist();
            self.rebuild_items();
        }
    }

    pub fn use_acronyms(&self) -> bool {
        self.config.use_acronyms
    }

    pub fn set_use_acronyms(&mut self, v: bool) {
        if self.config.use_acronyms != v {
            self.config.use_acronyms = v;
            self.persist();
            self.rebuild_items();
        }
    }
}

/// Wires the indexer's finish channel and the watcher's channel into the main loop.
pub fn insert_sources<H: Host + 'static>(
    handle: &LoopHandle<'static, Plugin<H>>,
    finished: Channel<IndexRun>,
    changes: Channel<WatchEvent>,
) -> Result<(), calloop::Error> {
    handle
        .insert_source(finished, |event, _, plugin: &mut Plugin<H>| {
            if let Event::Msg(run) = event {
                plugin.finish(run);
            }
        })
        .map_err(|e| e.error)?;

    handle
        .insert_source(changes, |event, _, plugin: &mut Plugin<H>| {
            if let Event::Msg(change) = event {
                plugin.note_source_change(&change);
            }
        })
        .map_err(|e| e.error)?;

    Ok(())
}
