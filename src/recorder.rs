//! Central event sink: raw backend notifications in, canonical records out

use crate::clock::{Clock, MonotonicClock};
use crate::keyboard::{
    CharacterResolver, KeyEvent, KeyEventType, Keymap, ModifierEncoder, ModifierLayout, RawEvent,
    RawEventKind, RepeatTracker,
};

/// Live-display hook, called once per recorded event
pub type Observer = Box<dyn FnMut(&KeyEvent)>;

/// Normalizes raw events into the append-only session log.
///
/// The recorder is the only writer of the log. Records are never removed or
/// reordered once appended.
pub struct Recorder<C: Clock = MonotonicClock> {
    clock: C,
    repeats: RepeatTracker,
    encoder: ModifierEncoder,
    resolver: CharacterResolver,
    events: Vec<KeyEvent>,
    observer: Option<Observer>,
}

impl Recorder<MonotonicClock> {
    pub fn new(keymap: Keymap, layout: ModifierLayout) -> Self {
        Self::with_clock(MonotonicClock::new(), keymap, layout)
    }
}

impl<C: Clock> Recorder<C> {
    pub fn with_clock(clock: C, keymap: Keymap, layout: ModifierLayout) -> Self {
        Self {
            clock,
            repeats: RepeatTracker::new(),
            encoder: ModifierEncoder::new(layout),
            resolver: CharacterResolver::new(keymap),
            events: Vec::with_capacity(4096),
            observer: None,
        }
    }

    /// Install a live-display hook
    pub fn set_observer(&mut self, observer: Observer) {
        self.observer = Some(observer);
    }

    /// Restart the session clock
    pub fn restart_clock(&mut self) {
        self.clock.restart();
    }

    /// Normalize one raw event and append it to the log.
    ///
    /// Returns `None` for event kinds that are not key transitions; those do
    /// not consume a sequence number.
    pub fn record(&mut self, raw: RawEvent) -> Option<&KeyEvent> {
        let event_type = match raw.kind {
            RawEventKind::KeyDown => KeyEventType::KeyDown,
            RawEventKind::KeyUp => KeyEventType::KeyUp,
            RawEventKind::ModifierChanged | RawEventKind::Other => {
                log::trace!("ignoring {:?} for keycode {}", raw.kind, raw.keycode);
                return None;
            }
        };

        let timestamp_ms = self.clock.elapsed_ms();

        let is_repeat = match event_type {
            KeyEventType::KeyDown => self.repeats.on_key_down(raw.keycode),
            KeyEventType::KeyUp => {
                self.repeats.on_key_up(raw.keycode);
                false
            }
        };

        let event = KeyEvent {
            seq: self.events.len() as u64 + 1,
            timestamp_ms,
            event_timestamp_ms: raw.backend_time_ms.unwrap_or(0.0),
            event_type,
            keycode: raw.keycode,
            scancode: raw.scancode,
            character: self.resolver.resolve(raw.keycode, raw.text.as_deref()),
            modifiers: self.encoder.encode(raw.modifier_mask),
            is_repeat,
        };

        if let Some(observer) = self.observer.as_mut() {
            observer(&event);
        }

        self.events.push(event);
        self.events.last()
    }

    /// All records so far, in sequence order
    pub fn events(&self) -> &[KeyEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of keys the repeat tracker considers held
    pub fn held_keys(&self) -> usize {
        self.repeats.held_count()
    }
}
