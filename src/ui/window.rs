//! In-window capture backend
//!
//! Key events arrive only while the terminal window has focus, on the main
//! thread, one at a time. A designated stop key ends the session.

use super::widgets::LivePanel;
use crate::backend::{Backend, BackendInfo, BackendKind, CaptureError};
use crate::clock::Clock;
use crate::keyboard::keymap::evdev_code_for_char;
use crate::keyboard::{Keymap, ModifierLayout, RawEvent, RawEventKind};
use crate::session::{CancelToken, CaptureSession};
use crossterm::{
    event::{
        self, Event, KeyCode, KeyEvent as CtKeyEvent, KeyEventKind, KeyModifiers,
        KeyboardEnhancementFlags, ModifierKeyCode, PopKeyboardEnhancementFlags,
        PushKeyboardEnhancementFlags,
    },
    execute,
    terminal::{
        disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, stdout, Stdout};
use std::time::Duration;

/// Keycodes for characters outside the US layout table start here
pub const UNMAPPED_CHAR_BASE: u32 = 0x1_0000;

/// Kitty keyboard protocol flags requested while capturing. Modifier keys
/// are only reported on their own with `REPORT_ALL_KEYS_AS_ESCAPE_CODES`.
pub const ENHANCEMENT_FLAGS: KeyboardEnhancementFlags =
    KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
        .union(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
        .union(KeyboardEnhancementFlags::REPORT_ALL_KEYS_AS_ESCAPE_CODES);

/// Restores the terminal when dropped, on every exit path
struct TerminalGuard {
    enhanced: bool,
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let mut out = stdout();
        if self.enhanced {
            let _ = execute!(out, PopKeyboardEnhancementFlags);
        }
        let _ = execute!(out, LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
}

/// Terminal-window backend with a live panel
pub struct WindowBackend {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    stop_key: KeyCode,
    stop_key_name: String,
    interval: Duration,
    _guard: TerminalGuard,
}

impl WindowBackend {
    /// Switch the terminal to raw mode and request key-release reporting
    pub fn open(stop_key: &str, interval: Duration) -> Result<Self, CaptureError> {
        let (stop_key, stop_key_name) = match parse_stop_key(stop_key) {
            Some(key) => (key, stop_key.to_string()),
            None => {
                log::warn!("unknown stop key `{}`, using escape", stop_key);
                (KeyCode::Esc, "escape".to_string())
            }
        };

        enable_raw_mode()?;
        let mut guard = TerminalGuard { enhanced: false };

        let mut out = stdout();
        execute!(out, EnterAlternateScreen)?;
        if matches!(supports_keyboard_enhancement(), Ok(true)) {
            execute!(out, PushKeyboardEnhancementFlags(ENHANCEMENT_FLAGS))?;
            guard.enhanced = true;
        }
        // Windows consoles report releases without the enhancement protocol
        require_key_releases(guard.enhanced, cfg!(windows))?;

        let terminal = Terminal::new(CrosstermBackend::new(out))?;

        Ok(Self {
            terminal,
            stop_key,
            stop_key_name,
            interval,
            _guard: guard,
        })
    }

    fn draw(&mut self, session: &CaptureSession) -> io::Result<()> {
        let panel = LivePanel::new(session.events(), &self.stop_key_name);
        self.terminal
            .draw(|frame| frame.render_widget(panel, frame.area()))?;
        Ok(())
    }
}

impl Backend for WindowBackend {
    fn info(&self) -> BackendInfo {
        BackendInfo {
            kind: BackendKind::Window,
            mode: BackendKind::Window.mode(),
            keymap: Keymap::LinuxEvdev,
            layout: ModifierLayout::CANONICAL,
        }
    }

    fn run(
        &mut self,
        session: &mut CaptureSession,
        cancel: &CancelToken,
    ) -> Result<(), CaptureError> {
        self.draw(session)?;

        while !cancel.is_cancelled() {
            if !event::poll(self.interval)? {
                continue;
            }
            if let Event::Key(key) = event::read()? {
                if handle_key(session, &key, self.stop_key) == KeyOutcome::Stop {
                    log::info!("stop key pressed");
                    break;
                }
            }
            self.draw(session)?;
        }
        Ok(())
    }
}

/// What the capture loop does after a key event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Recorded,
    Ignored,
    Stop,
}

/// Record `key` into `session` unless it is the stop key press
pub fn handle_key<C: Clock>(
    session: &mut CaptureSession<C>,
    key: &CtKeyEvent,
    stop_key: KeyCode,
) -> KeyOutcome {
    if is_stop_key(key, stop_key) {
        return KeyOutcome::Stop;
    }
    match raw_from_key(key) {
        Some(raw) if session.record(raw.clone()).is_some() => KeyOutcome::Recorded,
        Some(_) => KeyOutcome::Ignored,
        None => {
            log::debug!("no keycode for {:?}", key.code);
            KeyOutcome::Ignored
        }
    }
}

fn require_key_releases(enhanced: bool, windows_console: bool) -> Result<(), CaptureError> {
    if enhanced || windows_console {
        Ok(())
    } else {
        Err(CaptureError::NoKeyReleases)
    }
}

fn is_stop_key(key: &CtKeyEvent, stop_key: KeyCode) -> bool {
    key.code == stop_key && key.kind == KeyEventKind::Press
}

/// Parse a configured stop key name (`escape`, `f12`, `q`, ...)
pub fn parse_stop_key(name: &str) -> Option<KeyCode> {
    let lower = name.trim().to_ascii_lowercase();
    match lower.as_str() {
        "escape" | "esc" => Some(KeyCode::Esc),
        "return" | "enter" => Some(KeyCode::Enter),
        "tab" => Some(KeyCode::Tab),
        "backspace" => Some(KeyCode::Backspace),
        "delete" => Some(KeyCode::Delete),
        "end" => Some(KeyCode::End),
        other => {
            if let Some(n) = other.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
                return (1..=24).contains(&n).then_some(KeyCode::F(n));
            }
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(KeyCode::Char(c)),
                _ => None,
            }
        }
    }
}

/// Kernel key code for a crossterm key, in the same numbering as the
/// evdev backend
pub fn window_keycode(code: &KeyCode) -> Option<u32> {
    let code = match code {
        KeyCode::Char(c) => evdev_code_for_char(*c).unwrap_or(UNMAPPED_CHAR_BASE + *c as u32),
        KeyCode::Esc => 1,
        KeyCode::Backspace => 14,
        KeyCode::Tab | KeyCode::BackTab => 15,
        KeyCode::Enter => 28,
        KeyCode::CapsLock => 58,
        KeyCode::F(n @ 1..=10) => 58 + u32::from(*n),
        KeyCode::F(11) => 87,
        KeyCode::F(12) => 88,
        KeyCode::F(n @ 13..=24) => 170 + u32::from(*n),
        KeyCode::Home => 102,
        KeyCode::Up => 103,
        KeyCode::PageUp => 104,
        KeyCode::Left => 105,
        KeyCode::Right => 106,
        KeyCode::End => 107,
        KeyCode::Down => 108,
        KeyCode::PageDown => 109,
        KeyCode::Insert => 110,
        KeyCode::Delete => 111,
        KeyCode::Menu => 127,
        KeyCode::Modifier(m) => match m {
            ModifierKeyCode::LeftShift => 42,
            ModifierKeyCode::RightShift => 54,
            ModifierKeyCode::LeftControl => 29,
            ModifierKeyCode::RightControl => 97,
            ModifierKeyCode::LeftAlt => 56,
            ModifierKeyCode::RightAlt => 100,
            ModifierKeyCode::LeftSuper | ModifierKeyCode::LeftMeta => 125,
            ModifierKeyCode::RightSuper | ModifierKeyCode::RightMeta => 126,
            _ => return None,
        },
        _ => return None,
    };
    Some(code)
}

/// Canonical modifier mask from crossterm modifier flags
pub fn window_modifier_mask(modifiers: KeyModifiers) -> u64 {
    let layout = ModifierLayout::CANONICAL;
    let mut mask = 0;
    if modifiers.contains(KeyModifiers::SHIFT) {
        mask |= layout.shift;
    }
    if modifiers.contains(KeyModifiers::CONTROL) {
        mask |= layout.ctrl;
    }
    if modifiers.contains(KeyModifiers::ALT) {
        mask |= layout.alt;
    }
    if modifiers.intersects(KeyModifiers::SUPER | KeyModifiers::META) {
        mask |= layout.cmd;
    }
    mask
}

/// Convert a crossterm key event. `Repeat` is reported as a plain key-down.
pub fn raw_from_key(key: &CtKeyEvent) -> Option<RawEvent> {
    let kind = match key.kind {
        KeyEventKind::Press | KeyEventKind::Repeat => RawEventKind::KeyDown,
        KeyEventKind::Release => RawEventKind::KeyUp,
    };
    let keycode = window_keycode(&key.code)?;
    let mut raw = RawEvent::new(keycode, kind).with_modifiers(window_modifier_mask(key.modifiers));
    if let KeyCode::Char(c) = key.code {
        raw = raw.with_text(c.to_string());
    }
    Some(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::session::CaptureMode;
    use crossterm::event::KeyEventState;

    fn key(code: KeyCode, modifiers: KeyModifiers, kind: KeyEventKind) -> CtKeyEvent {
        CtKeyEvent {
            code,
            modifiers,
            kind,
            state: KeyEventState::NONE,
        }
    }

    #[test]
    fn char_keys_carry_text_and_evdev_code() {
        let raw = raw_from_key(&key(KeyCode::Char('A'), KeyModifiers::SHIFT, KeyEventKind::Press))
            .expect("mapped");
        assert_eq!(raw.keycode, 30);
        assert_eq!(raw.kind, RawEventKind::KeyDown);
        assert_eq!(raw.text.as_deref(), Some("A"));
        assert_eq!(raw.modifier_mask, ModifierLayout::CANONICAL.shift);
    }

    #[test]
    fn native_repeat_is_plain_key_down() {
        let raw = raw_from_key(&key(KeyCode::Char('a'), KeyModifiers::NONE, KeyEventKind::Repeat))
            .expect("mapped");
        assert_eq!(raw.kind, RawEventKind::KeyDown);
    }

    #[test]
    fn release_maps_to_key_up() {
        let raw = raw_from_key(&key(KeyCode::Enter, KeyModifiers::NONE, KeyEventKind::Release))
            .expect("mapped");
        assert_eq!(raw.kind, RawEventKind::KeyUp);
        assert_eq!(raw.keycode, 28);
        assert!(raw.text.is_none());
    }

    #[test]
    fn unmapped_chars_get_distinct_codes() {
        let e_acute = window_keycode(&KeyCode::Char('é')).expect("mapped");
        let u_umlaut = window_keycode(&KeyCode::Char('ü')).expect("mapped");
        assert!(e_acute >= UNMAPPED_CHAR_BASE);
        assert_ne!(e_acute, u_umlaut);
    }

    #[test]
    fn function_keys() {
        assert_eq!(window_keycode(&KeyCode::F(1)), Some(59));
        assert_eq!(window_keycode(&KeyCode::F(10)), Some(68));
        assert_eq!(window_keycode(&KeyCode::F(12)), Some(88));
        assert_eq!(window_keycode(&KeyCode::F(13)), Some(183));
        assert_eq!(window_keycode(&KeyCode::F(25)), None);
    }

    #[test]
    fn modifier_flags_to_mask() {
        let mask = window_modifier_mask(KeyModifiers::CONTROL | KeyModifiers::SUPER);
        assert_eq!(mask, 0x2 | 0x8);
        assert_eq!(window_modifier_mask(KeyModifiers::NONE), 0);
    }

    #[test]
    fn stop_key_names() {
        assert_eq!(parse_stop_key("escape"), Some(KeyCode::Esc));
        assert_eq!(parse_stop_key("Esc"), Some(KeyCode::Esc));
        assert_eq!(parse_stop_key("f12"), Some(KeyCode::F(12)));
        assert_eq!(parse_stop_key("q"), Some(KeyCode::Char('q')));
        assert_eq!(parse_stop_key("f99"), None);
        assert_eq!(parse_stop_key("hyper"), None);
    }

    #[test]
    fn stop_key_matches_press_only() {
        let press = key(KeyCode::Esc, KeyModifiers::NONE, KeyEventKind::Press);
        let release = key(KeyCode::Esc, KeyModifiers::NONE, KeyEventKind::Release);
        assert!(is_stop_key(&press, KeyCode::Esc));
        assert!(!is_stop_key(&release, KeyCode::Esc));
    }

    fn capturing_session() -> CaptureSession<ManualClock> {
        let mut session = CaptureSession::with_clock(
            "unused.csv",
            CaptureMode::Gui,
            Keymap::LinuxEvdev,
            ModifierLayout::CANONICAL,
            ManualClock::new(1.0),
        );
        session.begin().expect("begin");
        session
    }

    #[test]
    fn stop_key_press_is_not_recorded() {
        let mut session = capturing_session();
        let a = key(KeyCode::Char('a'), KeyModifiers::NONE, KeyEventKind::Press);
        let esc = key(KeyCode::Esc, KeyModifiers::NONE, KeyEventKind::Press);

        assert_eq!(handle_key(&mut session, &a, KeyCode::Esc), KeyOutcome::Recorded);
        assert_eq!(handle_key(&mut session, &esc, KeyCode::Esc), KeyOutcome::Stop);
        assert_eq!(session.events().len(), 1);
        assert_eq!(session.events()[0].character, "a");
    }

    #[test]
    fn other_stop_key_leaves_escape_recordable() {
        let mut session = capturing_session();
        let esc = key(KeyCode::Esc, KeyModifiers::NONE, KeyEventKind::Press);
        assert_eq!(handle_key(&mut session, &esc, KeyCode::F(12)), KeyOutcome::Recorded);
        assert_eq!(session.events()[0].character, "escape");
    }

    #[test]
    fn unmapped_keys_are_ignored() {
        let mut session = capturing_session();
        let media = key(KeyCode::F(30), KeyModifiers::NONE, KeyEventKind::Press);
        assert_eq!(handle_key(&mut session, &media, KeyCode::Esc), KeyOutcome::Ignored);
        assert!(session.events().is_empty());
    }

    #[test]
    fn press_release_pairs_are_not_repeats() {
        let mut session = capturing_session();
        for kind in [KeyEventKind::Press, KeyEventKind::Release, KeyEventKind::Press] {
            handle_key(
                &mut session,
                &key(KeyCode::Char('a'), KeyModifiers::NONE, kind),
                KeyCode::Esc,
            );
        }
        let repeats: Vec<bool> = session.events().iter().map(|e| e.is_repeat).collect();
        assert_eq!(repeats, vec![false, false, false]);
    }

    #[test]
    fn terminals_without_releases_are_rejected() {
        assert!(matches!(
            require_key_releases(false, false),
            Err(CaptureError::NoKeyReleases)
        ));
        assert!(require_key_releases(true, false).is_ok());
        assert!(require_key_releases(false, true).is_ok());
    }

    #[test]
    fn enhancement_reports_modifier_keys_and_releases() {
        assert!(ENHANCEMENT_FLAGS.contains(KeyboardEnhancementFlags::REPORT_EVENT_TYPES));
        assert!(ENHANCEMENT_FLAGS.contains(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES));
        assert!(
            ENHANCEMENT_FLAGS.contains(KeyboardEnhancementFlags::REPORT_ALL_KEYS_AS_ESCAPE_CODES)
        );
    }

    #[test]
    fn bare_modifier_keys_map_to_evdev() {
        let shift = key(
            KeyCode::Modifier(ModifierKeyCode::LeftShift),
            KeyModifiers::SHIFT,
            KeyEventKind::Press,
        );
        let raw = raw_from_key(&shift).expect("mapped");
        assert_eq!(raw.keycode, 42);
        assert_eq!(raw.modifier_mask, ModifierLayout::CANONICAL.shift);
    }
}
