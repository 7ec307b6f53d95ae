use anyhow::{Context, Result, bail};
use apps_index::config::{config_path, load_config_from};
use apps_index::index_items::build_index_items;
use apps_index::indexer::index;
use apps_index::plugin::{Plugin, insert_sources};
use apps_index::sources::{Backend, platform_backend};
use apps_index::watcher::{RootWatcher, WatchEvent};
use apps_index::{AppHandle, Application, Config, SystemHost};
use calloop::EventLoop;
use calloop::channel::{Sender, channel};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file to use instead of the default location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Index once and print the applications
    List {
        /// Print JSON instead of one line per application
        #[arg(long)]
        json: bool,
    },
    /// Index once and print the search items
    Items,
    /// Keep the index current, reindexing when application directories change
    Watch,
    /// Index once and run a shell script in the active terminal
    Terminal {
        script: String,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    #[cfg(not(target_os = "macos"))]
    {
        // SAFETY: no other threads exist yet.
        unsafe { std::env::remove_var("DESKTOP_AUTOSTART_ID") };
    }

    #[cfg(unix)]
    {
        use nix::sys::signal::{SigHandler, Signal, signal};
        // SAFETY: SigIgn installs no handler code; detached children are reaped by the kernel.
        if let Err(e) = unsafe { signal(Signal::SIGCHLD, SigHandler::SigIgn) } {
            warn!("Failed to ignore SIGCHLD: {}", e);
        }
    }

    let args = Args::parse();

    let path = args.config.unwrap_or_else(config_path);
    let config = load_config_from(&path).with_context(|| format!("loading {}", path.display()))?;
    let backend = platform_backend();

    match args.command {
        Command::List { json } => list(backend.as_ref(), &config, json),
        Command::Items => {
            let apps = index_once(backend.as_ref(), &config)?;
            for item in build_index_items(&apps, config.item_options()) {
                println!("{}\t{}", item.app.id, item.string);
            }
            Ok(())
        }
        Command::Watch => watch(backend, config, path),
        Command::Terminal { script } => run_script(backend, config, path, &script),
    }
}

fn index_once(backend: &dyn Backend, config: &Config) -> Result<Vec<AppHandle>> {
    match index(backend, &config.parse_options(), &AtomicBool::new(false)) {
        Some(apps) => Ok(apps),
        None => bail!("indexing was aborted"),
    }
}

fn list(backend: &dyn Backend, config: &Config, json: bool) -> Result<()> {
    let apps = index_once(backend, config)?;
    if json {
        let records: Vec<&Application> = apps.iter().map(Arc::as_ref).collect();
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        for app in &apps {
            println!("{}\t{}\t{}", app.id, app.name(), app.exec.join(" "));
        }
    }
    Ok(())
}

fn new_loop(
    backend: Arc<dyn Backend>,
    config: Config,
    path: PathBuf,
) -> Result<(EventLoop<'static, Plugin<SystemHost>>, Plugin<SystemHost>, Sender<WatchEvent>)> {
    let event_loop: EventLoop<Plugin<SystemHost>> = EventLoop::try_new()?;
    let (tx_finished, rx_finished) = channel();
    let (tx_changes, rx_changes) = channel();
    insert_sources(&event_loop.handle(), rx_finished, rx_changes)?;

    let plugin = Plugin::new(SystemHost::new(), backend, config, Some(path), tx_finished);
    Ok((event_loop, plugin, tx_changes))
}

fn watch(backend: Arc<dyn Backend>, config: Config, path: PathBuf) -> Result<()> {
    let roots = backend.roots();
    let subdirectories = backend.watch_subdirectories();
    let (mut event_loop, mut plugin, tx_changes) = new_loop(backend, config, path)?;

    let _watcher = RootWatcher::new(&roots, subdirectories, tx_changes)?;
    plugin.update_index_items();
    info!("Watching {} application directories", roots.len());

    loop {
        event_loop.dispatch(None, &mut plugin)?;
        plugin.flush_pending_reindex();
    }
}

fn run_script(backend: Arc<dyn Backend>, config: Config, path: PathBuf, script: &str) -> Result<()> {
    let (mut event_loop, mut plugin, _tx_changes) = new_loop(backend, config, path)?;

    plugin.update_index_items();
    while plugin.is_indexing() {
        event_loop.dispatch(None, &mut plugin)?;
    }

    if let Some(terminal) = plugin.active_terminal() {
        info!("Using terminal '{}'", terminal.id());
    } else {
        warn!("No terminal found among {} applications", plugin.applications().len());
    }
    plugin.run_terminal(script)?;
    Ok(())
}
