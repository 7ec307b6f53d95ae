//! Single-slot background index job.

use crate::model::{AppHandle, ParseOptions};
use crate::sources::Backend;
use calloop::channel::Sender;
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Result of a completed, non-aborted run.
#[derive(Debug)]
pub struct IndexRun {
    pub generation: u64,
    pub apps: Vec<AppHandle>,
    pub elapsed: Duration,
}

struct Job {
    abort: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Runs enumerate-and-parse on a worker thread. A new [`Indexer::run`] aborts and joins
/// the previous worker before starting, so at most one job is ever live.
pub struct Indexer {
    backend: Arc<dyn Backend>,
    finished: Sender<IndexRun>,
    job: Option<Job>,
    generation: u64,
}

impl Indexer {
    pub fn new(backend: Arc<dyn Backend>, finished: Sender<IndexRun>) -> Self {
        Self {
            backend,
            finished,
            job: None,
            generation: 0,
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Supersedes any running job with a fresh one using `options`.
    pub fn run(&mut self, options: ParseOptions) {
        self.cancel();
        self.generation += 1;

        let generation = self.generation;
        let abort = Arc::new(AtomicBool::new(false));
        let flag = abort.clone();
        let backend = self.backend.clone();
        let finished = self.finished.clone();

        let spawned = thread::Builder::new()
            .name("apps-indexer".to_string())
            .spawn(move || {
                let start = Instant::now();
                let Some(apps) = index(backend.as_ref(), &options, &flag) else {
                    debug!("Index run {} aborted", generation);
                    return;
                };
                let run = IndexRun {
                    generation,
                    apps,
                    elapsed: start.elapsed(),
                };
                if finished.send(run).is_err() {
                    debug!("Index run {} finished after the receiver was dropped", generation);
                }
            });

        match spawned {
            Ok(handle) => self.job = Some(Job { abort, handle }),
            Err(e) => warn!("Failed to spawn indexer thread: {}", e),
        }
    }

    fn cancel(&mut self) {
        if let Some(job) = self.job.take() {
            job.abort.store(true, Ordering::Relaxed);
            if job.handle.join().is_err() {
                warn!("Indexer thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.job.as_ref().is_some_and(|job| !job.handle.is_finished())
    }

    /// Generation of the most recently requested run.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for Indexer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Enumerates and parses every source. `None` if `abort` was raised along the way.
///
/// The result is sorted by id; when two sources report the same id the first enumerated wins.
pub fn index(backend: &dyn Backend, options: &ParseOptions, abort: &AtomicBool) -> Option<Vec<AppHandle>> {
    let start = Instant::now();
    let sources = backend.enumerate(abort);

    let mut apps: Vec<AppHandle> = Vec::with_capacity(sources.len());
    for source in &sources {
        if abort.load(Ordering::Relaxed) {
            return None;
        }
        match backend.parse(source, options) {
            Ok(app) => apps.push(Arc::new(app)),
            Err(e) => debug!("Skipping {:?}: {}", source.path, e),
        }
    }
    if abort.load(Ordering::Relaxed) {
        return None;
    }

    apps.sort_by(|a, b| a.id.cmp(&b.id));
    apps.dedup_by(|later, kept| {
        let duplicate = later.id == kept.id;
        if duplicate {
            debug!("Duplicate id '{}': {:?} ignored", later.id, later.source_path);
        }
        duplicate
    });

    info!(
        "Indexed {} applications ({} ms) [{}]",
        apps.len(),
        start.elapsed().as_millis(),
        backend.name()
    );
    Some(apps)
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::error::{LaunchError, ParseError};
    use crate::host::Host;
    use crate::model::{AppHandle, Application, ParseOptions};
    use crate::sources::{Backend, SourceEntry};
    use crate::terminal::{self, Terminal};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// In-memory backend. Names are the upper-cased id, ids starting with `bad` fail to
    /// parse and ids ending in `term` are terminal emulators.
    #[derive(Default)]
    pub struct FakeBackend {
        pub sources: Mutex<Vec<SourceEntry>>,
        pub parse_delay: Duration,
        pub parsed: AtomicUsize,
    }

    impl FakeBackend {
        pub fn with_ids(ids: &[&str]) -> Self {
            let backend = Self::default();
            backend.set_ids(ids);
            backend
        }

        pub fn set_ids(&self, ids: &[&str]) {
            *self.sources.lock().unwrap() = ids
                .iter()
                .map(|id| SourceEntry {
                    id: id.to_string(),
                    path: PathBuf::from(format!("/fake/{id}.desktop")),
                })
                .collect();
        }
    }

    impl Backend for FakeBackend {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn roots(&self) -> Vec<PathBuf> {
            Vec::new()
        }

        fn enumerate(&self, _abort: &AtomicBool) -> Vec<SourceEntry> {
            self.sources.lock().unwrap().clone()
        }

        fn parse(&self, source: &SourceEntry, options: &ParseOptions) -> Result<Application, ParseError> {
            std::thread::sleep(self.parse_delay);
            self.parsed.fetch_add(1, Ordering::SeqCst);
            if source.id.starts_with("bad") {
                return Err(ParseError::NoDisplay);
            }
            let mut app = Application::new(source.id.clone(), source.path.clone(), source.id.to_uppercase());
            app.exec = vec![source.id.clone()];
            if options.use_exec {
                app.push_name(source.id.clone());
            }
            app.is_terminal_emulator = source.id.ends_with("term");
            Ok(app)
        }

        fn identify_terminals(&self, apps: &[AppHandle]) -> Vec<Terminal> {
            apps.iter()
                .filter(|a| a.is_terminal_emulator)
                .map(|a| Terminal {
                    app: a.clone(),
                    template: terminal::TerminalTemplate::Args(&["-e"]),
                })
                .collect()
        }

        fn launch(
            &self,
            app: &Application,
            exec: &[String],
            _url: Option<&str>,
            _terminal: Option<&Terminal>,
            host: &dyn Host,
        ) -> Result<(), LaunchError> {
            host.run_detached(exec, app.working_dir.as_deref())
        }

        fn run_terminal(
            &self,
            terminal: &Terminal,
            argv: &[String],
            working_dir: Option<&Path>,
            host: &dyn Host,
        ) -> Result<(), LaunchError> {
            let mut commandline = terminal.app.exec.clone();
            commandline.push("-e".to_string());
            commandline.extend(argv.iter().cloned());
            host.run_detached(&commandline, working_dir)
        }

        fn run_terminal_script(&self, terminal: &Terminal, script: &str, host: &dyn Host) -> Result<(), LaunchError> {
            let script = script.trim();
            if script.is_empty() {
                return Err(LaunchError::EmptyScript);
            }
            self.run_terminal(terminal, &["sh".to_string(), "-c".to_string(), script.to_string()], None, host)
        }
    }
}
