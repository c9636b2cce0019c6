//! Keyboard event normalization and capture backends

mod event;
mod state;
pub mod keymap;
pub mod listener;
pub mod modifiers;

#[cfg(target_os = "linux")]
pub mod evdev_listener;

pub use event::{KeyEvent, KeyEventType, RawEvent, RawEventKind};
pub use keymap::{CharacterResolver, Keymap};
pub use listener::PollListener;
pub use modifiers::{ModifierEncoder, ModifierLayout};
pub use state::{HeldModifiers, ModifierKey, ModifierToggle, RepeatTracker};

#[cfg(target_os = "linux")]
pub use evdev_listener::EvdevListener;
