//! Modifier mask encoding

/// Bit values a platform uses for each modifier. Zero means the platform
/// never reports that modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModifierLayout {
    pub shift: u64,
    pub ctrl: u64,
    pub alt: u64,
    pub cmd: u64,
}

impl ModifierLayout {
    /// Layout produced by adapters that build the mask themselves
    pub const CANONICAL: Self = Self {
        shift: 0x1,
        ctrl: 0x2,
        alt: 0x4,
        cmd: 0x8,
    };

    /// Tk event state on Windows
    pub const TK_WINDOWS: Self = Self {
        shift: 0x0001,
        ctrl: 0x0004,
        alt: 0x20000,
        cmd: 0,
    };

    /// Tk event state on macOS
    pub const TK_MACOS: Self = Self {
        shift: 0x0001,
        ctrl: 0x0004,
        alt: 0x0080,
        cmd: 0x0008,
    };

    /// CGEventFlags from a Quartz event tap
    pub const QUARTZ: Self = Self {
        shift: 0x0002_0000,
        ctrl: 0x0004_0000,
        alt: 0x0008_0000,
        cmd: 0x0010_0000,
    };
}

/// Converts a modifier mask to the `shift+ctrl+alt+cmd` token form
#[derive(Debug, Clone, Copy)]
pub struct ModifierEncoder {
    layout: ModifierLayout,
}

impl ModifierEncoder {
    pub fn new(layout: ModifierLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> ModifierLayout {
        self.layout
    }

    pub fn encode(&self, mask: u64) -> String {
        let tokens = [
            (self.layout.shift, "shift"),
            (self.layout.ctrl, "ctrl"),
            (self.layout.alt, "alt"),
            (self.layout.cmd, "cmd"),
        ];

        let parts: Vec<&str> = tokens
            .iter()
            .filter(|(bit, _)| *bit != 0 && mask & bit != 0)
            .map(|(_, name)| *name)
            .collect();

        if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join("+")
        }
    }
}

impl Default for ModifierEncoder {
    fn default() -> Self {
        Self::new(ModifierLayout::CANONICAL)
    }
}
