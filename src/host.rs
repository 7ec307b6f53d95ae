use crate::error::LaunchError;
use crate::index_items::IndexItem;
use directories::ProjectDirs;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Services the launcher host provides to the plug-in.
pub trait Host {
    /// Starts `argv` detached from the launcher.
    fn run_detached(&self, argv: &[String], working_dir: Option<&Path>) -> Result<(), LaunchError>;

    /// Opens a file or bundle with the desktop's default handler.
    fn open_path(&self, path: &Path) -> Result<(), LaunchError>;

    /// User-visible warning.
    fn warning(&self, message: &str);

    fn set_index_items(&self, _items: &[IndexItem]) {}

    fn apps_changed(&self) {}

    fn cache_dir(&self) -> PathBuf;
}

/// Host implementation backed by the operating system, used by the binary.
///
/// Spawned children are not waited for. Processes that never reap their children
/// should ignore `SIGCHLD`, as the binary does.
pub struct SystemHost {
    cache_dir: PathBuf,
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemHost {
    pub fn new() -> Self {
        let cache_dir = ProjectDirs::from("org", "apps-index", "apps-index")
            .map(|dirs| dirs.cache_dir().to_path_buf())
            .unwrap_or_else(std::env::temp_dir);
        Self { cache_dir }
    }
}

impl Host for SystemHost {
    fn run_detached(&self, argv: &[String], working_dir: Option<&Path>) -> Result<(), LaunchError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(LaunchError::EmptyCommandline);
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        if let Some(dir) = working_dir.filter(|d| d.is_dir()) {
            command.current_dir(dir);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // SAFETY: setsid is async-signal-safe.
            unsafe {
                command.pre_exec(|| {
                    nix::unistd::setsid().map_err(std::io::Error::from)?;
                    Ok(())
                });
            }
        }

        info!("Starting detached process: {}", argv.join(" "));
        command.spawn().map_err(|source| LaunchError::Spawn {
            program: program.clone(),
            source,
        })?;
        Ok(())
    }

    fn open_path(&self, path: &Path) -> Result<(), LaunchError> {
        let opener = if cfg!(target_os = "macos") { "open" } else { "xdg-open" };
        self.run_detached(&[opener.to_string(), path.to_string_lossy().into_owned()], None)
    }

    fn warning(&self, message: &str) {
        warn!("{}", message);
    }

    fn set_index_items(&self, items: &[IndexItem]) {
        info!("Index holds {} items", items.len());
    }

    fn apps_changed(&self) {
        info!("Applications changed");
    }

    fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records every host call for assertions.
    #[derive(Clone, Default)]
    pub struct RecordingHost {
        pub spawned: Arc<Mutex<Vec<(Vec<String>, Option<PathBuf>)>>>,
        pub opened: Arc<Mutex<Vec<PathBuf>>>,
        pub warnings: Arc<Mutex<Vec<String>>>,
        pub item_sets: Arc<Mutex<Vec<Vec<String>>>>,
        pub changes: Arc<Mutex<usize>>,
        pub cache: PathBuf,
    }

    impl RecordingHost {
        pub fn with_cache(cache: PathBuf) -> Self {
            Self {
                cache,
                ..Default::default()
            }
        }

        pub fn spawned(&self) -> Vec<(Vec<String>, Option<PathBuf>)> {
            self.spawned.lock().unwrap().clone()
        }

        pub fn warnings(&self) -> Vec<String> {
            self.warnings.lock().unwrap().clone()
        }

        pub fn change_count(&self) -> usize {
            *self.changes.lock().unwrap()
        }
    }

    impl Host for RecordingHost {
        fn run_detached(&self, argv: &[String], working_dir: Option<&Path>) -> Result<(), LaunchError> {
            if argv.is_empty() {
                return Err(LaunchError::EmptyCommandline);
            }
            self.spawned
                .lock()
                .unwrap()
                .push((argv.to_vec(), working_dir.map(Path::to_path_buf)));
            Ok(())
        }

        fn open_path(&self, path: &Path) -> Result<(), LaunchError> {
            self.opened.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }

        fn warning(&self, message: &str) {
            self.warnings.lock().unwrap().push(message.to_string());
        }

        fn set_index_items(&self, items: &[IndexItem]) {
            self.item_sets
                .lock()
                .unwrap()
                .push(items.iter().map(|i| i.string.clone()).collect());
        }

        fn apps_changed(&self) {
            *self.changes.lock().unwrap() += 1;
        }

        fn cache_dir(&self) -> PathBuf {
            self.cache.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn system_host_leaves_child_reaping_to_the_process() {
        let _host = SystemHost::new();
        let status = Command::new("true").status().unwrap();
        assert!(status.success());
    }

    #[test]
    fn empty_commandlines_are_rejected() {
        let host = SystemHost::new();
        assert!(matches!(host.run_detached(&[], None), Err(LaunchError::EmptyCommandline)));
    }
}
