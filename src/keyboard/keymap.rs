//! Key code tables and character resolution
//!
//! Each capture backend reports keys in its own numbering space. One static
//! table per numbering space turns a keycode into a short label; the
//! [`CharacterResolver`] picks the table from configuration.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Keycode numbering space of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keymap {
    /// Apple virtual keycodes (`kVK_*`)
    AppleVirtual,
    /// Windows virtual-key codes (`VK_*`)
    WindowsVirtual,
    /// Linux input-event codes (`KEY_*`)
    LinuxEvdev,
}

impl Keymap {
    /// Named-key table for this numbering space
    pub fn table(self) -> &'static HashMap<u32, &'static str> {
        match self {
            Self::AppleVirtual => &APPLE_KEYMAP,
            Self::WindowsVirtual => &WINDOWS_KEYMAP,
            Self::LinuxEvdev => &EVDEV_KEYMAP,
        }
    }

    pub fn label(self, keycode: u32) -> Option<&'static str> {
        self.table().get(&keycode).copied()
    }
}

/// Apple virtual keycodes, US ANSI layout
pub static APPLE_KEYMAP: LazyLock<HashMap<u32, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        (0x00, "a"),
        (0x01, "s"),
        (0x02, "d"),
        (0x03, "f"),
        (0x04, "h"),
        (0x05, "g"),
        (0x06, "z"),
        (0x07, "x"),
        (0x08, "c"),
        (0x09, "v"),
        (0x0B, "b"),
        (0x0C, "q"),
        (0x0D, "w"),
        (0x0E, "e"),
        (0x0F, "r"),
        (0x10, "y"),
        (0x11, "t"),
        (0x12, "1"),
        (0x13, "2"),
        (0x14, "3"),
        (0x15, "4"),
        (0x16, "6"),
        (0x17, "5"),
        (0x19, "9"),
        (0x1A, "7"),
        (0x1C, "8"),
        (0x1D, "0"),
        (0x1F, "o"),
        (0x20, "u"),
        (0x22, "i"),
        (0x23, "p"),
        (0x24, "return"),
        (0x25, "l"),
        (0x26, "j"),
        (0x28, "k"),
        (0x2D, "n"),
        (0x2E, "m"),
        (0x30, "tab"),
        (0x31, "space"),
        (0x33, "backspace"),
        (0x35, "escape"),
        (0x36, "cmd_r"),
        (0x37, "cmd_l"),
        (0x38, "shift_l"),
        (0x39, "capslock"),
        (0x3A, "alt_l"),
        (0x3B, "ctrl_l"),
        (0x3C, "shift_r"),
        (0x3D, "alt_r"),
        (0x3E, "ctrl_r"),
        (0x7B, "left"),
        (0x7C, "right"),
        (0x7D, "down"),
        (0x7E, "up"),
    ])
});

/// Windows virtual-key codes
pub static WINDOWS_KEYMAP: LazyLock<HashMap<u32, &'static str>> = LazyLock::new(|| {
    const LETTERS: [&str; 26] = [
        "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m", "n", "o", "p", "q",
        "r", "s", "t", "u", "v", "w", "x", "y", "z",
    ];
    const DIGITS: [&str; 10] = ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"];

    let mut map = HashMap::from([
        (0x08, "backspace"),
        (0x09, "tab"),
        (0x0D, "return"),
        (0x14, "capslock"),
        (0x1B, "escape"),
        (0x20, "space"),
        (0x21, "pageup"),
        (0x22, "pagedown"),
        (0x23, "end"),
        (0x24, "home"),
        (0x25, "left"),
        (0x26, "up"),
        (0x27, "right"),
        (0x28, "down"),
        (0x2D, "insert"),
        (0x2E, "delete"),
        (0x5B, "win_l"),
        (0x5C, "win_r"),
        (0xA0, "shift_l"),
        (0xA1, "shift_r"),
        (0xA2, "ctrl_l"),
        (0xA3, "ctrl_r"),
        (0xA4, "alt_l"),
        (0xA5, "alt_r"),
    ]);
    for (offset, digit) in DIGITS.iter().enumerate() {
        map.insert(0x30 + offset as u32, *digit);
    }
    for (offset, letter) in LETTERS.iter().enumerate() {
        map.insert(0x41 + offset as u32, *letter);
    }
    map
});

/// Linux input-event codes, US layout
pub static EVDEV_KEYMAP: LazyLock<HashMap<u32, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        (1, "escape"),
        (2, "1"),
        (3, "2"),
        (4, "3"),
        (5, "4"),
        (6, "5"),
        (7, "6"),
        (8, "7"),
        (9, "8"),
        (10, "9"),
        (11, "0"),
        (12, "-"),
        (13, "="),
        (14, "backspace"),
        (15, "tab"),
        (16, "q"),
        (17, "w"),
        (18, "e"),
        (19, "r"),
        (20, "t"),
        (21, "y"),
        (22, "u"),
        (23, "i"),
        (24, "o"),
        (25, "p"),
        (26, "["),
        (27, "]"),
        (28, "return"),
        (29, "ctrl_l"),
        (30, "a"),
        (31, "s"),
        (32, "d"),
        (33, "f"),
        (34, "g"),
        (35, "h"),
        (36, "j"),
        (37, "k"),
        (38, "l"),
        (39, ";"),
        (40, "'"),
        (41, "`"),
        (42, "shift_l"),
        (43, "\\"),
        (44, "z"),
        (45, "x"),
        (46, "c"),
        (47, "v"),
        (48, "b"),
        (49, "n"),
        (50, "m"),
        (51, "comma"),
        (52, "."),
        (53, "/"),
        (54, "shift_r"),
        (56, "alt_l"),
        (57, "space"),
        (58, "capslock"),
        (59, "f1"),
        (60, "f2"),
        (61, "f3"),
        (62, "f4"),
        (63, "f5"),
        (64, "f6"),
        (65, "f7"),
        (66, "f8"),
        (67, "f9"),
        (68, "f10"),
        (87, "f11"),
        (88, "f12"),
        (97, "ctrl_r"),
        (100, "alt_r"),
        (102, "home"),
        (103, "up"),
        (104, "pageup"),
        (105, "left"),
        (106, "right"),
        (107, "end"),
        (108, "down"),
        (109, "pagedown"),
        (110, "insert"),
        (111, "delete"),
        (125, "cmd_l"),
        (126, "cmd_r"),
        (127, "menu"),
        (55, "kp*"),
        (71, "kp7"),
        (72, "kp8"),
        (73, "kp9"),
        (74, "kp-"),
        (75, "kp4"),
        (76, "kp5"),
        (77, "kp6"),
        (78, "kp+"),
        (79, "kp1"),
        (80, "kp2"),
        (81, "kp3"),
        (82, "kp0"),
        (83, "kp."),
        (96, "kp_enter"),
        (98, "kp/"),
        (117, "kp="),
        (183, "f13"),
        (184, "f14"),
        (185, "f15"),
        (186, "f16"),
        (187, "f17"),
        (188, "f18"),
        (189, "f19"),
        (190, "f20"),
    ])
});

/// Shifted US-layout symbols and the evdev key that produces them
const EVDEV_SHIFTED: [(char, u32); 21] = [
    ('!', 2),
    ('@', 3),
    ('#', 4),
    ('$', 5),
    ('%', 6),
    ('^', 7),
    ('&', 8),
    ('*', 9),
    ('(', 10),
    (')', 11),
    ('_', 12),
    ('+', 13),
    ('{', 26),
    ('}', 27),
    (':', 39),
    ('"', 40),
    ('~', 41),
    ('|', 43),
    ('<', 51),
    ('>', 52),
    ('?', 53),
];

/// Find the evdev key that types `c` on a US layout.
pub fn evdev_code_for_char(c: char) -> Option<u32> {
    match c {
        ' ' => return Some(57),
        ',' => return Some(51),
        _ => {}
    }
    if let Some((_, code)) = EVDEV_SHIFTED.iter().find(|(sym, _)| *sym == c) {
        return Some(*code);
    }

    let lower = c.to_ascii_lowercase();
    let mut buf = [0u8; 4];
    let wanted: &str = lower.encode_utf8(&mut buf);
    EVDEV_KEYMAP
        .iter()
        .find(|(_, label)| **label == wanted)
        .map(|(code, _)| *code)
}

/// Map a device_query key to its Linux input-event code
pub fn evdev_code_from_device_query(keycode: device_query::Keycode) -> u32 {
    use device_query::Keycode as DK;
    match keycode {
        DK::Escape => 1,
        DK::Key1 => 2,
        DK::Key2 => 3,
        DK::Key3 => 4,
        DK::Key4 => 5,
        DK::Key5 => 6,
        DK::Key6 => 7,
        DK::Key7 => 8,
        DK::Key8 => 9,
        DK::Key9 => 10,
        DK::Key0 => 11,
        DK::Minus => 12,
        DK::Equal => 13,
        DK::Backspace => 14,
        DK::Tab => 15,
        DK::Q => 16,
        DK::W => 17,
        DK::E => 18,
        DK::R => 19,
        DK::T => 20,
        DK::Y => 21,
        DK::U => 22,
        DK::I => 23,
        DK::O => 24,
        DK::P => 25,
        DK::LeftBracket => 26,
        DK::RightBracket => 27,
        DK::Enter => 28,
        DK::LControl => 29,
        DK::A => 30,
        DK::S => 31,
        DK::D => 32,
        DK::F => 33,
        DK::G => 34,
        DK::H => 35,
        DK::J => 36,
        DK::K => 37,
        DK::L => 38,
        DK::Semicolon => 39,
        DK::Apostrophe => 40,
        DK::Grave => 41,
        DK::LShift => 42,
        DK::BackSlash => 43,
        DK::Z => 44,
        DK::X => 45,
        DK::C => 46,
        DK::V => 47,
        DK::B => 48,
        DK::N => 49,
        DK::M => 50,
        DK::Comma => 51,
        DK::Dot => 52,
        DK::Slash => 53,
        DK::RShift => 54,
        DK::LAlt | DK::LOption => 56,
        DK::Space => 57,
        DK::CapsLock => 58,
        DK::F1 => 59,
        DK::F2 => 60,
        DK::F3 => 61,
        DK::F4 => 62,
        DK::F5 => 63,
        DK::F6 => 64,
        DK::F7 => 65,
        DK::F8 => 66,
        DK::F9 => 67,
        DK::F10 => 68,
        DK::F11 => 87,
        DK::F12 => 88,
        DK::F13 => 183,
        DK::F14 => 184,
        DK::F15 => 185,
        DK::F16 => 186,
        DK::F17 => 187,
        DK::F18 => 188,
        DK::F19 => 189,
        DK::F20 => 190,
        DK::NumpadMultiply => 55,
        DK::Numpad7 => 71,
        DK::Numpad8 => 72,
        DK::Numpad9 => 73,
        DK::NumpadSubtract => 74,
        DK::Numpad4 => 75,
        DK::Numpad5 => 76,
        DK::Numpad6 => 77,
        DK::NumpadAdd => 78,
        DK::Numpad1 => 79,
        DK::Numpad2 => 80,
        DK::Numpad3 => 81,
        DK::Numpad0 => 82,
        DK::NumpadDecimal => 83,
        DK::NumpadEnter => 96,
        DK::NumpadDivide => 98,
        DK::NumpadEquals => 117,
        DK::RControl => 97,
        DK::RAlt | DK::ROption => 100,
        DK::Home => 102,
        DK::Up => 103,
        DK::PageUp => 104,
        DK::Left => 105,
        DK::Right => 106,
        DK::End => 107,
        DK::Down => 108,
        DK::PageDown => 109,
        DK::Insert => 110,
        DK::Delete => 111,
        DK::LMeta | DK::Command => 125,
        DK::RMeta => 126,
    }
}

/// Produces the `character` label of a key event
#[derive(Debug, Clone, Copy)]
pub struct CharacterResolver {
    keymap: Keymap,
}

impl CharacterResolver {
    pub fn new(keymap: Keymap) -> Self {
        Self { keymap }
    }

    pub fn keymap(&self) -> Keymap {
        self.keymap
    }

    /// Resolve a label: printable hint, then the named-key table, then hex.
    pub fn resolve(&self, keycode: u32, hint: Option<&str>) -> String {
        if let Some(text) = hint.filter(|t| is_printable_char(t)) {
            return text.to_string();
        }
        match self.keymap.label(keycode) {
            Some(label) => label.to_string(),
            None => format!("0x{:02x}", keycode),
        }
    }
}

/// True for exactly one non-control character
fn is_printable_char(text: &str) -> bool {
    let mut chars = text.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if !c.is_control())
}
