use std::path::PathBuf;

use log::{info, warn, LevelFilter};

use scadasim::cli::{self, StartupFile};
use scadasim::config;
use scadasim::event_loop::EventLoop;
use scadasim::log::{init_log, DEFAULT_LOG_FILE};
use scadasim::var::{StoreConfig, VarStore};

#[tokio::main]
async fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("scadasim: {e}");
            eprintln!("{}", cli::USAGE);
            std::process::exit(1);
        }
    };

    // ── Logging ───────────────────────────────────────────────────────────────
    if args.debug {
        let path = args
            .log_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));
        if let Err(e) = init_log(LevelFilter::Debug, &path) {
            eprintln!("scadasim: can't open log {}: {e}", path.display());
        }
    }

    let store = VarStore::new(StoreConfig {
        tick_ms: args.tick_ms,
        ..StoreConfig::default()
    });
    let is_tty = unsafe {
        libc::isatty(libc::STDIN_FILENO) != 0 && libc::isatty(libc::STDOUT_FILENO) != 0
    };
    let mut event_loop = EventLoop::new(store, is_tty);

    // ── Startup file ──────────────────────────────────────────────────────────
    let startup = match args.startup {
        StartupFile::Skip => None,
        StartupFile::Explicit(path) => Some(path),
        StartupFile::Search => config::find_startup_file(),
    };
    if let Some(path) = startup {
        match config::load_file(&mut event_loop.store, &path) {
            Ok((count, errors)) => {
                info!("{}: {count} statements", path.display());
                for e in errors {
                    eprintln!("scadasim: {}: {e}", path.display());
                }
            }
            Err(e) => {
                warn!("{}: {e}", path.display());
                eprintln!("scadasim: warning: {}: {e}", path.display());
            }
        }
    }

    // ── Startup statements (-c) ───────────────────────────────────────────────
    if let Err(e) = event_loop.run_commands(&args.commands) {
        eprintln!("scadasim: {e}");
        std::process::exit(1);
    }
    if event_loop.should_quit() {
        return;
    }

    // ── Enter main loop ───────────────────────────────────────────────────────
    if let Err(e) = event_loop.run().await {
        eprintln!("scadasim: {e}");
        std::process::exit(1);
    }
}
