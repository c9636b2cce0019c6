//! Global key-state polling backend
//!
//! Compares the set of pressed keys between polls. Works anywhere
//! device_query does, but cannot see OS autorepeat and has no event time.

use super::keymap::evdev_code_from_device_query;
use super::{HeldModifiers, Keymap, ModifierLayout, RawEvent, RawEventKind};
use crate::backend::{Backend, BackendInfo, BackendKind, CaptureError};
use crate::session::{CancelToken, CaptureSession};
use device_query::{DeviceQuery, DeviceState, Keycode};
use std::time::Duration;

/// Keyboard listener that polls for key state changes
pub struct PollListener {
    device_state: DeviceState,
    last_keys: Vec<Keycode>,
    modifiers: HeldModifiers,
    interval: Duration,
}

impl PollListener {
    /// Create a new keyboard listener polling every `interval`
    pub fn new(interval: Duration) -> Self {
        Self {
            device_state: DeviceState::new(),
            last_keys: Vec::new(),
            modifiers: HeldModifiers::evdev(),
            interval,
        }
    }

    /// Poll once and return the raw events for every key that changed
    pub fn poll(&mut self) -> Vec<RawEvent> {
        let current_keys = self.device_state.get_keys();
        let events = key_transitions(&self.last_keys, &current_keys)
            .into_iter()
            .map(|(key, kind)| {
                let code = evdev_code_from_device_query(key);
                let mask = self.modifiers.update(code, kind == RawEventKind::KeyDown);
                RawEvent::new(code, kind).with_modifiers(mask)
            })
            .collect();

        self.last_keys = current_keys;
        events
    }
}

/// Keys pressed since `previous`, then keys released since `previous`
pub fn key_transitions(previous: &[Keycode], current: &[Keycode]) -> Vec<(Keycode, RawEventKind)> {
    let pressed = current
        .iter()
        .filter(|key| !previous.contains(*key))
        .map(|key| (*key, RawEventKind::KeyDown));
    let released = previous
        .iter()
        .filter(|key| !current.contains(*key))
        .map(|key| (*key, RawEventKind::KeyUp));
    pressed.chain(released).collect()
}

impl Backend for PollListener {
    fn info(&self) -> BackendInfo {
        BackendInfo {
            kind: BackendKind::Poll,
            mode: BackendKind::Poll.mode(),
            keymap: Keymap::LinuxEvdev,
            layout: ModifierLayout::CANONICAL,
        }
    }

    fn run(
        &mut self,
        session: &mut CaptureSession,
        cancel: &CancelToken,
    ) -> Result<(), CaptureError> {
        log::info!("polling key state every {:?}", self.interval);
        self.last_keys = self.device_state.get_keys();

        while !cancel.is_cancelled() {
            for raw in self.poll() {
                session.record(raw);
            }
            std::thread::sleep(self.interval);
        }
        Ok(())
    }
}
