//! Capture session lifecycle
//!
//! A session moves `Idle -> Capturing -> Stopped` exactly once. Stopping
//! writes the CSV log; there is no way back to `Capturing`.

use crate::clock::{Clock, MonotonicClock, CLOCK_SOURCE};
use crate::keyboard::{KeyEvent, Keymap, ModifierLayout, RawEvent};
use crate::recorder::{Observer, Recorder};
use crate::report::{CsvError, CsvWriter};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// How key events reach the process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Events delivered to a focused window
    Gui,
    /// Global capture from a terminal process
    Terminal,
}

impl CaptureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gui => "gui",
            Self::Terminal => "terminal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gui" => Some(Self::Gui),
            "terminal" => Some(Self::Terminal),
            _ => None,
        }
    }
}

/// Descriptor of the host platform, e.g. `Linux-x86_64`
pub fn platform_descriptor() -> String {
    let os = match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "macOS",
        "windows" => "Windows",
        other => other,
    };
    format!("{}-{}", os, std::env::consts::ARCH)
}

/// Values written to the metadata block of the log
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMetadata {
    pub platform: String,
    pub mode: CaptureMode,
    pub clock_source: String,
    pub start_time_utc: DateTime<Utc>,
}

impl SessionMetadata {
    pub fn new(mode: CaptureMode) -> Self {
        Self {
            platform: platform_descriptor(),
            mode,
            clock_source: CLOCK_SOURCE.to_string(),
            start_time_utc: Utc::now(),
        }
    }
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Capturing,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Capturing => "capturing",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Session lifecycle failures
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot move session from {from} to {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("failed to save session log: {0}")]
    Save(#[from] CsvError),
}

/// Stop request shared between the capture thread and a signal handler
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Totals reported after a session is saved
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub output: PathBuf,
    pub total_events: usize,
    pub key_downs: usize,
    pub repeats: usize,
    pub duration_secs: f64,
}

/// One recording run: owns the recorder, the log metadata and the output path
pub struct CaptureSession<C: Clock = MonotonicClock> {
    state: SessionState,
    recorder: Recorder<C>,
    metadata: SessionMetadata,
    output: PathBuf,
    started: Option<Instant>,
}

impl CaptureSession<MonotonicClock> {
    pub fn new(
        output: impl Into<PathBuf>,
        mode: CaptureMode,
        keymap: Keymap,
        layout: ModifierLayout,
    ) -> Self {
        Self::with_clock(output, mode, keymap, layout, MonotonicClock::new())
    }
}

impl<C: Clock> CaptureSession<C> {
    pub fn with_clock(
        output: impl Into<PathBuf>,
        mode: CaptureMode,
        keymap: Keymap,
        layout: ModifierLayout,
        clock: C,
    ) -> Self {
        Self {
            state: SessionState::Idle,
            recorder: Recorder::with_clock(clock, keymap, layout),
            metadata: SessionMetadata::new(mode),
            output: output.into(),
            started: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn metadata(&self) -> &SessionMetadata {
        &self.metadata
    }

    pub fn events(&self) -> &[KeyEvent] {
        self.recorder.events()
    }

    pub fn set_observer(&mut self, observer: Observer) {
        self.recorder.set_observer(observer);
    }

    /// Start capturing: restarts the clock and stamps the UTC start time.
    pub fn begin(&mut self) -> Result<(), SessionError> {
        self.transition(SessionState::Idle, SessionState::Capturing)?;
        self.recorder.restart_clock();
        self.metadata.start_time_utc = Utc::now();
        self.started = Some(Instant::now());
        log::info!("capture started, output {}", self.output.display());
        Ok(())
    }

    /// Record a raw event. Events outside `Capturing` are dropped.
    pub fn record(&mut self, raw: RawEvent) -> Option<&KeyEvent> {
        if self.state != SessionState::Capturing {
            log::debug!("dropping keycode {} while {}", raw.keycode, self.state);
            return None;
        }
        self.recorder.record(raw)
    }

    /// Stop capturing and write the log. Runs at most once per session.
    pub fn stop(&mut self) -> Result<SessionSummary, SessionError> {
        self.transition(SessionState::Capturing, SessionState::Stopped)?;

        let events = self.recorder.events();
        CsvWriter::write(&self.output, &self.metadata, events)?;

        Ok(SessionSummary {
            output: self.output.clone(),
            total_events: events.len(),
            key_downs: events.iter().filter(|e| e.is_down()).count(),
            repeats: events.iter().filter(|e| e.is_repeat).count(),
            duration_secs: self
                .started
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0),
        })
    }

    fn transition(&mut self, from: SessionState, to: SessionState) -> Result<(), SessionError> {
        if self.state != from {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn session(dir: &Path) -> CaptureSession<ManualClock> {
        CaptureSession::with_clock(
            dir.join("out.csv"),
            CaptureMode::Terminal,
            Keymap::LinuxEvdev,
            ModifierLayout::CANONICAL,
            ManualClock::new(0.5),
        )
    }

    #[test]
    fn lifecycle_idle_capturing_stopped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut session = session(dir.path());
        assert_eq!(session.state(), SessionState::Idle);

        session.begin().expect("begin");
        assert_eq!(session.state(), SessionState::Capturing);

        session.record(RawEvent::key_down(30));
        let summary = session.stop().expect("stop");
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(summary.total_events, 1);
        assert_eq!(summary.key_downs, 1);
        assert!(dir.path().join("out.csv").exists());
    }

    #[test]
    fn events_before_begin_are_dropped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut session = session(dir.path());
        assert!(session.record(RawEvent::key_down(30)).is_none());
        session.begin().expect("begin");
        let first = session.record(RawEvent::key_down(30)).expect("recorded");
        assert_eq!(first.seq, 1);
    }

    #[test]
    fn no_restart_after_stop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut session = session(dir.path());
        session.begin().expect("begin");
        session.stop().expect("stop");

        assert!(matches!(
            session.begin(),
            Err(SessionError::InvalidTransition {
                from: SessionState::Stopped,
                ..
            })
        ));
        assert!(session.stop().is_err());
        assert!(session.record(RawEvent::key_down(30)).is_none());
    }

    #[test]
    fn stop_from_idle_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut session = session(dir.path());
        assert!(matches!(
            session.stop(),
            Err(SessionError::InvalidTransition {
                from: SessionState::Idle,
                to: SessionState::Stopped,
            })
        ));
        assert!(!dir.path().join("out.csv").exists());
    }

    #[test]
    fn write_failure_still_ends_capture() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file").expect("write");

        let mut session = CaptureSession::with_clock(
            blocker.join("out.csv"),
            CaptureMode::Gui,
            Keymap::LinuxEvdev,
            ModifierLayout::CANONICAL,
            ManualClock::new(1.0),
        );
        session.begin().expect("begin");
        session.record(RawEvent::key_down(30));

        assert!(matches!(session.stop(), Err(SessionError::Save(_))));
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.events().len(), 1);
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let handle = token.clone();
        assert!(!token.is_cancelled());
        std::thread::spawn(move || handle.cancel())
            .join()
            .expect("join");
        assert!(token.is_cancelled());
    }

    #[test]
    fn mode_names_round_trip() {
        assert_eq!(CaptureMode::parse(CaptureMode::Gui.as_str()), Some(CaptureMode::Gui));
        assert_eq!(CaptureMode::parse("terminal"), Some(CaptureMode::Terminal));
        assert_eq!(CaptureMode::parse("window"), None);
    }

    #[test]
    fn platform_descriptor_has_os_and_arch() {
        let descriptor = platform_descriptor();
        assert!(descriptor.ends_with(std::env::consts::ARCH));
        assert!(descriptor.contains('-'));
    }
}
