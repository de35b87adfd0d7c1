//! marginalia: comment on rendered documentation pages from the terminal.
//!
//! Entry point for the `marginalia` binary. Wires together the command line,
//! configuration (`config`), logging, the comment store (`marginalia-core`),
//! the terminal lifecycle (`tui`), the event bus (`event`), and rendering
//! (`ui`).
//!
//! # Startup sequence
//!
//! 1. Parse arguments, open the log file, load config and theme.
//! 2. Open the SQLite store. `--import` / `--export` run here and exit.
//! 3. Read every page. I/O errors surface before the terminal is touched.
//! 4. `install_panic_hook()`, `register_sigterm()`, then `init_tui()`.
//! 5. Create the event channel, `spawn_event_task()`, build the `App`.
//!
//! The event loop lives in `run`, which returns on quit, SIGTERM, channel
//! close, or a draw error. `restore_tui()` is called once after it returns,
//! whatever the outcome; the panic hook covers panics.

mod app;
mod config;
mod event;
mod page;
mod theme;
mod tui;
mod ui;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use clap::Parser;
use marginalia_core::{wire, SqliteStore};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::config::Config;
use crate::event::AppEvent;
use crate::page::Page;
use crate::theme::Theme;
use crate::ui::keybindings::{handle_key, handle_mouse, KeyAction};

/// Working directory for the database and log file.
const DATA_DIR: &str = ".marginalia";

#[derive(Debug, Parser)]
#[command(name = "marginalia", version, about = "Comment on rendered documentation pages")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/marginalia/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comment database, overriding `db_path` from the config.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Load comments from a JSON file into the database, then exit.
    #[arg(long, value_name = "FILE")]
    import: Option<PathBuf>,

    /// Write every comment as JSON to FILE (`-` for stdout), then exit.
    #[arg(long, value_name = "FILE")]
    export: Option<PathBuf>,

    /// HTML pages to open; `n` / `p` move between them.
    #[arg(value_name = "PAGE", required_unless_present_any = ["import", "export"])]
    pages: Vec<PathBuf>,
}

fn init_logging() -> std::io::Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(Path::new(DATA_DIR).join("marginalia.log"))?;
    let filter = EnvFilter::try_from_env("MARGINALIA_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    // Ignored when a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
    Ok(())
}

fn core_err(e: marginalia_core::Error) -> std::io::Error {
    std::io::Error::other(e)
}

/// Runs `--import` and `--export`. Returns `true` if either was given.
async fn transfer(cli: &Cli, store: &SqliteStore) -> std::io::Result<bool> {
    if let Some(path) = &cli.import {
        let json = std::fs::read_to_string(path)?;
        let comments = wire::decode_comments(&json).map_err(core_err)?;
        let total = comments.len();
        let added = store.import(comments).await.map_err(core_err)?;
        eprintln!("marginalia: imported {added} of {total} comments from {}", path.display());
    }
    if let Some(path) = &cli.export {
        let comments = store.export().await.map_err(core_err)?;
        let json = wire::encode_comments(&comments).map_err(core_err)?;
        if path == Path::new("-") {
            let mut out = std::io::stdout().lock();
            out.write_all(json.as_bytes())?;
            out.write_all(b"\n")?;
        } else {
            std::fs::write(path, json)?;
            eprintln!("marginalia: exported {} comments to {}", comments.len(), path.display());
        }
    }
    Ok(cli.import.is_some() || cli.export.is_some())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    std::fs::create_dir_all(DATA_DIR)?;
    init_logging()?;

    let config_file = cli.config.clone().unwrap_or_else(config::config_path);
    let config = Config::load(&config_file);
    let theme = Theme::from_name(&config.theme);

    let db_path = cli.db.clone().unwrap_or_else(|| config.db_path.clone());
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let store = SqliteStore::open(&db_path.to_string_lossy())
        .await
        .map_err(core_err)?
        .delete_on_resolve(config.delete_on_resolve);

    if transfer(&cli, &store).await? {
        return Ok(());
    }

    let pages = cli
        .pages
        .iter()
        .map(|p| Page::load(p))
        .collect::<std::io::Result<Vec<_>>>()?;
    info!(pages = pages.len(), db = %db_path.display(), "starting");

    tui::install_panic_hook();
    let term_flag = tui::register_sigterm()?;
    let mut terminal = tui::init_tui()?;

    let handler = event::EventHandler::new();
    event::spawn_event_task(handler.tx.clone());
    let mut rx = handler.rx;

    let mut app = App::new(pages, store, handler.tx.clone(), &config);
    app.start();

    let result = run(&mut terminal, &mut rx, &mut app, &theme, &term_flag).await;

    tui::restore_tui()?;
    if let Err(e) = &result {
        error!(error = %e, "event loop failed");
    }
    result
}

/// The event loop. Returns on quit, SIGTERM, channel close, or a draw error.
async fn run(
    terminal: &mut tui::Tui,
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<AppEvent>,
    app: &mut App,
    theme: &Theme,
    term_flag: &Arc<AtomicBool>,
) -> std::io::Result<()> {
    loop {
        tokio::select! {
            // Heartbeat: SIGTERM is checked at least every 50ms even when no
            // events arrive.
            _ = tokio::time::sleep(std::time::Duration::from_millis(50)) => {
                if term_flag.load(Ordering::Relaxed) {
                    return Ok(());
                }
            }
            maybe_event = rx.recv() => {
                match maybe_event {
                    Some(AppEvent::Render) => {
                        terminal.draw(|frame| ui::render(frame, app, theme))?;
                    }
                    Some(AppEvent::Key(key)) => {
                        if handle_key(key, app) == KeyAction::Quit {
                            return Ok(());
                        }
                    }
                    Some(AppEvent::Mouse(mouse)) => {
                        handle_mouse(mouse, app);
                    }
                    Some(AppEvent::Permissions(ticket, permissions)) => {
                        app.on_permissions(ticket, permissions);
                    }
                    Some(AppEvent::Loaded(ticket, result)) => app.on_loaded(ticket, result),
                    Some(AppEvent::Created(submission, result)) => {
                        app.on_created(submission, result);
                    }
                    Some(AppEvent::Resolved(ticket, id, result)) => {
                        app.on_resolved(ticket, id, result);
                    }
                    // The next Render reads the new size from the frame.
                    Some(AppEvent::Resize(_, _)) | Some(AppEvent::Tick) => {}
                    None => return Ok(()),
                }
                if term_flag.load(Ordering::Relaxed) {
                    return Ok(());
                }
            }
        }
    }
}
