//! Filesystem watch on the source roots, forwarded to the main loop.

use calloop::channel::Sender;
use log::{debug, warn};
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Some directory below a watched root changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub paths: Vec<PathBuf>,
}

/// Keeps the underlying watcher alive. Dropping it stops notifications.
pub struct RootWatcher {
    _watcher: RecommendedWatcher,
    watched: Vec<PathBuf>,
}

impl RootWatcher {
    /// Watches `roots` (and, with `subdirectories`, every directory below them found now).
    /// Directories that do not exist are skipped; new subdirectories are picked up by the
    /// next watcher, not this one.
    pub fn new(roots: &[PathBuf], subdirectories: bool, tx: Sender<WatchEvent>) -> notify::Result<Self> {
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(ev) => {
                    if matches!(
                        ev.kind,
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                    ) && tx.send(WatchEvent { paths: ev.paths }).is_err()
                    {
                        debug!("Watch event dropped, main loop is gone");
                    }
                }
                Err(e) => warn!("Watch error: {:?}", e),
            },
            Config::default(),
        )?;

        let mut watched = Vec::new();
        for dir in watch_dirs(roots, subdirectories) {
            match watcher.watch(&dir, RecursiveMode::NonRecursive) {
                Ok(()) => watched.push(dir),
                Err(e) => debug!("Not watching {:?}: {}", dir, e),
            }
        }
        debug!("Watching {} directories", watched.len());

        Ok(Self {
            _watcher: watcher,
            watched,
        })
    }

    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }
}

/// Existing roots, each followed by its subdirectories when requested.
pub fn watch_dirs(roots: &[PathBuf], subdirectories: bool) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    for root in roots.iter().filter(|r| r.is_dir()) {
        push_unique(&mut dirs, root);
        if subdirectories {
            WalkDir::new(root)
                .min_depth(1)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_dir())
                .for_each(|e| push_unique(&mut dirs, e.path()));
        }
    }
    dirs
}

fn push_unique(dirs: &mut Vec<PathBuf>, dir: &Path) {
    if !dirs.iter().any(|d| d == dir) {
        dirs.push(dir.to_path_buf());
    }
}
