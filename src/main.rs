//! Keyboard Timing - record key event timing to a CSV log
//!
//! Runs one capture session with the selected backend and writes the log
//! when the session stops.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use keyboard_timing::{
    backend::{open_backend, run_session, BackendKind},
    config::Config,
    keyboard::KeyEvent,
    session::CancelToken,
};

#[derive(Debug, Parser)]
#[command(name = "keyboard-timing", version, about = "Record keyboard event timing to CSV")]
struct Cli {
    /// Output CSV path (defaults to <output.directory>/rust_<backend>_<os>.csv)
    output: Option<PathBuf>,

    /// Capture backend: window, evdev or poll
    #[arg(short, long)]
    backend: Option<BackendKind>,

    /// Configuration file to use instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(Config::load().unwrap_or_else(|e| {
            log::warn!("ignoring config file: {}", e);
            Config::default()
        })),
    }
}

fn echo(event: &KeyEvent) {
    eprintln!(
        "\r[{}] {} {} (keycode={}) t={:.3}ms",
        event.seq, event.event_type, event.character, event.keycode, event.timestamp_ms
    );
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let kind = cli.backend.unwrap_or(config.capture.backend);
    let output = cli
        .output
        .unwrap_or_else(|| config.default_output(kind));

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("failed to install interrupt handler")?;

    let mut backend = open_backend(kind, &config)
        .with_context(|| format!("failed to start the {} backend", kind))?;

    let pump = kind != BackendKind::Window;
    if pump {
        eprintln!("Recording key events with the {} backend. Press Ctrl+C to stop.", kind);
    }
    let live = pump && config.output.live_display;

    let outcome = run_session(backend.as_mut(), output, &cancel, |session| {
        if live {
            session.set_observer(Box::new(echo));
        }
    });
    // Restores the terminal before anything is printed
    drop(backend);

    let summary = outcome.context("capture failed")?;
    println!(
        "Wrote {} events ({} key downs, {} repeats) in {:.1}s to {}",
        summary.total_events,
        summary.key_downs,
        summary.repeats,
        summary.duration_secs,
        summary.output.display()
    );

    Ok(())
}
