//! Held-key state tracking

use super::modifiers::ModifierLayout;
use super::{RawEvent, RawEventKind};
use std::collections::{HashMap, HashSet};

/// Tracks which keycodes are currently held and classifies key-downs.
///
/// Repeat detection comes only from this set. Backend autorepeat flags are
/// never consulted, so every backend gets the same semantics.
#[derive(Debug, Default, Clone)]
pub struct RepeatTracker {
    held: HashSet<u32>,
}

impl RepeatTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key-down. Returns true if the key was already held.
    pub fn on_key_down(&mut self, keycode: u32) -> bool {
        !self.held.insert(keycode)
    }

    /// Register a key-up. Unknown keys are ignored, some backends drop events.
    pub fn on_key_up(&mut self, keycode: u32) {
        self.held.remove(&keycode);
    }

    pub fn is_held(&self, keycode: u32) -> bool {
        self.held.contains(&keycode)
    }

    /// Number of keys currently held
    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    pub fn reset(&mut self) {
        self.held.clear();
    }
}

/// Turns "modifier changed" notifications into explicit down/up pairs.
///
/// Event taps report a modifier key as a single flags-changed event; which
/// direction it went is inferred from the previous state of that keycode.
#[derive(Debug, Default, Clone)]
pub struct ModifierToggle {
    down: HashMap<u32, bool>,
}

impl ModifierToggle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite `ModifierChanged` into `KeyDown`/`KeyUp`; other kinds pass through.
    pub fn translate(&mut self, mut event: RawEvent) -> RawEvent {
        if event.kind == RawEventKind::ModifierChanged {
            let was_down = self.down.get(&event.keycode).copied().unwrap_or(false);
            self.down.insert(event.keycode, !was_down);
            event.kind = if was_down {
                RawEventKind::KeyUp
            } else {
                RawEventKind::KeyDown
            };
        }
        event
    }
}

/// Which canonical modifier a key contributes while held
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierKey {
    Shift,
    Ctrl,
    Alt,
    Cmd,
}

impl ModifierKey {
    fn bit(self) -> u64 {
        let layout = ModifierLayout::CANONICAL;
        match self {
            Self::Shift => layout.shift,
            Self::Ctrl => layout.ctrl,
            Self::Alt => layout.alt,
            Self::Cmd => layout.cmd,
        }
    }
}

/// Derives a canonical modifier mask from held modifier keys.
///
/// Used by backends that only report key transitions and no modifier state.
/// The state is updated before the mask is read, so a shift key-down already
/// carries `shift`.
#[derive(Debug, Clone)]
pub struct HeldModifiers {
    keys: HashMap<u32, ModifierKey>,
    held: HashSet<u32>,
}

impl HeldModifiers {
    pub fn new(keys: HashMap<u32, ModifierKey>) -> Self {
        Self {
            keys,
            held: HashSet::new(),
        }
    }

    /// Modifier keys in the Linux input-event numbering
    pub fn evdev() -> Self {
        Self::new(HashMap::from([
            (42, ModifierKey::Shift),
            (54, ModifierKey::Shift),
            (29, ModifierKey::Ctrl),
            (97, ModifierKey::Ctrl),
            (56, ModifierKey::Alt),
            (100, ModifierKey::Alt),
            (125, ModifierKey::Cmd),
            (126, ModifierKey::Cmd),
        ]))
    }

    /// Update with a key transition and return the resulting mask
    pub fn update(&mut self, keycode: u32, pressed: bool) -> u64 {
        if self.keys.contains_key(&keycode) {
            if pressed {
                self.held.insert(keycode);
            } else {
                self.held.remove(&keycode);
            }
        }
        self.mask()
    }

    pub fn mask(&self) -> u64 {
        self.held
            .iter()
            .filter_map(|code| self.keys.get(code))
            .fold(0, |mask, key| mask | key.bit())
    }
}
