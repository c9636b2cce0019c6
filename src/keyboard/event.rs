//! Raw and canonical keyboard event types

use std::fmt;

/// Kind of notification a backend hands to the recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventKind {
    /// Key was pressed (including OS autorepeat notifications)
    KeyDown,
    /// Key was released
    KeyUp,
    /// A modifier key changed state without saying which way.
    /// Must go through [`ModifierToggle`](super::ModifierToggle) first.
    ModifierChanged,
    /// Anything else the backend saw (mouse, flags, tap-disabled, ...)
    Other,
}

/// An unnormalized key notification from one capture backend
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    /// Key identifier in the backend's own numbering space
    pub keycode: u32,
    /// Hardware scancode, or 0 if the backend has none
    pub scancode: u32,
    pub kind: RawEventKind,
    /// Active modifiers in the backend's bit layout
    pub modifier_mask: u64,
    /// Time the backend stamped on the event, if it has one
    pub backend_time_ms: Option<f64>,
    /// Printable text the backend associated with the key
    pub text: Option<String>,
}

impl RawEvent {
    pub fn new(keycode: u32, kind: RawEventKind) -> Self {
        Self {
            keycode,
            scancode: 0,
            kind,
            modifier_mask: 0,
            backend_time_ms: None,
            text: None,
        }
    }

    pub fn key_down(keycode: u32) -> Self {
        Self::new(keycode, RawEventKind::KeyDown)
    }

    pub fn key_up(keycode: u32) -> Self {
        Self::new(keycode, RawEventKind::KeyUp)
    }

    pub fn with_scancode(mut self, scancode: u32) -> Self {
        self.scancode = scancode;
        self
    }

    pub fn with_modifiers(mut self, mask: u64) -> Self {
        self.modifier_mask = mask;
        self
    }

    pub fn with_backend_time(mut self, time_ms: f64) -> Self {
        self.backend_time_ms = Some(time_ms);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Direction of a recorded key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventType {
    /// Key was pressed down
    KeyDown,
    /// Key was released
    KeyUp,
}

impl KeyEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeyDown => "key_down",
            Self::KeyUp => "key_up",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "key_down" => Some(Self::KeyDown),
            "key_up" => Some(Self::KeyUp),
            _ => None,
        }
    }
}

impl fmt::Display for KeyEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A canonical, backend-independent key event record.
///
/// Created once by the [`Recorder`](crate::recorder::Recorder) and never
/// modified afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyEvent {
    /// 1-based position in the session log
    pub seq: u64,
    /// Milliseconds since session start, from the session clock
    pub timestamp_ms: f64,
    /// Backend-reported time, 0.0 when unavailable
    pub event_timestamp_ms: f64,
    pub event_type: KeyEventType,
    pub keycode: u32,
    pub scancode: u32,
    /// Printable character, key name, or hex fallback
    pub character: String,
    /// `shift+ctrl+alt+cmd` subset, or `none`
    pub modifiers: String,
    pub is_repeat: bool,
}

impl KeyEvent {
    pub fn is_down(&self) -> bool {
        self.event_type == KeyEventType::KeyDown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_fills_optional_fields() {
        let raw = RawEvent::key_down(30)
            .with_scancode(30)
            .with_modifiers(0x1)
            .with_backend_time(12.5)
            .with_text("a");
        assert_eq!(raw.kind, RawEventKind::KeyDown);
        assert_eq!(raw.scancode, 30);
        assert_eq!(raw.modifier_mask, 0x1);
        assert_eq!(raw.backend_time_ms, Some(12.5));
        assert_eq!(raw.text.as_deref(), Some("a"));
    }

    #[test]
    fn event_type_names() {
        assert_eq!(KeyEventType::KeyDown.to_string(), "key_down");
        assert_eq!(KeyEventType::KeyUp.as_str(), "key_up");
        assert_eq!(KeyEventType::parse("key_up"), Some(KeyEventType::KeyUp));
        assert_eq!(KeyEventType::parse("press"), None);
    }
}
