//! Capture backend boundary
//!
//! A backend owns one OS event source, turns its notifications into
//! [`RawEvent`](crate::keyboard::RawEvent)s and feeds them to the session.
//! It releases its resource on every exit path through `Drop`.

use crate::config::Config;
use crate::keyboard::{Keymap, ModifierLayout};
use crate::session::{CancelToken, CaptureMode, CaptureSession, SessionError, SessionSummary};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Available capture backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Focused terminal window, stops on the stop key
    #[default]
    Window,
    /// Linux kernel input devices, stops on interrupt
    Evdev,
    /// Global key-state polling, stops on interrupt
    Poll,
}

impl BackendKind {
    pub fn all() -> &'static [BackendKind] {
        &[Self::Window, Self::Evdev, Self::Poll]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Window => "window",
            Self::Evdev => "evdev",
            Self::Poll => "poll",
        }
    }

    pub fn mode(&self) -> CaptureMode {
        match self {
            Self::Window => CaptureMode::Gui,
            Self::Evdev | Self::Poll => CaptureMode::Terminal,
        }
    }

    /// Default log path for this backend under `directory`
    pub fn default_output(&self, directory: &Path) -> PathBuf {
        directory.join(format!("rust_{}_{}.csv", self.name(), std::env::consts::OS))
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown backend `{}` (expected window, evdev or poll)", s))
    }
}

/// Static description of a backend's numbering and modifier layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendInfo {
    pub kind: BackendKind,
    pub mode: CaptureMode,
    pub keymap: Keymap,
    pub layout: ModifierLayout,
}

/// Capture setup and runtime failures
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("permission denied opening {resource}. {remediation}")]
    PermissionDenied {
        resource: String,
        remediation: String,
    },

    #[error("no keyboard devices found")]
    NoDevices,

    #[error(
        "this terminal does not report key releases. Use a terminal that supports the kitty \
         keyboard protocol, or capture with --backend evdev or --backend poll"
    )]
    NoKeyReleases,

    #[error("the {0} backend is not available on this platform")]
    Unsupported(BackendKind),

    #[error("terminal I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// One source of raw keyboard notifications
pub trait Backend {
    fn info(&self) -> BackendInfo;

    /// Deliver events into `session` until a stop is requested.
    ///
    /// Must return within one poll interval of `cancel` being set.
    fn run(&mut self, session: &mut CaptureSession, cancel: &CancelToken)
        -> Result<(), CaptureError>;
}

/// Acquire the OS resource for `kind`. Nothing is captured yet.
pub fn open_backend(kind: BackendKind, config: &Config) -> Result<Box<dyn Backend>, CaptureError> {
    let interval = config.poll_interval();
    match kind {
        BackendKind::Window => Ok(Box::new(crate::ui::WindowBackend::open(
            &config.capture.stop_key,
            interval,
        )?)),
        #[cfg(target_os = "linux")]
        BackendKind::Evdev => Ok(Box::new(crate::keyboard::EvdevListener::open(interval)?)),
        #[cfg(not(target_os = "linux"))]
        BackendKind::Evdev => Err(CaptureError::Unsupported(kind)),
        BackendKind::Poll => Ok(Box::new(crate::keyboard::PollListener::new(interval))),
    }
}

/// Create a session for `backend`, run it to completion and save the log.
///
/// The log is written exactly once, also when the backend fails mid-capture;
/// in that case the backend error is returned after saving.
pub fn run_session(
    backend: &mut dyn Backend,
    output: PathBuf,
    cancel: &CancelToken,
    configure: impl FnOnce(&mut CaptureSession),
) -> Result<SessionSummary, CaptureError> {
    let info = backend.info();
    let mut session = CaptureSession::new(output, info.mode, info.keymap, info.layout);
    configure(&mut session);

    session.begin()?;
    log::info!("{} backend capturing", info.kind);
    let outcome = backend.run(&mut session, cancel);
    let summary = match session.stop() {
        Ok(summary) => summary,
        Err(e) => {
            if let Err(run_err) = &outcome {
                log::error!("{} backend failed: {}", info.kind, run_err);
            }
            return Err(e.into());
        }
    };

    outcome.map(|()| summary)
}
