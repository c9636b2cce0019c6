//! Terminal User Interface components

mod widgets;
mod window;

pub use widgets::LivePanel;
pub use window::{
    handle_key, parse_stop_key, raw_from_key, window_keycode, window_modifier_mask, KeyOutcome,
    WindowBackend, ENHANCEMENT_FLAGS, UNMAPPED_CHAR_BASE,
};
