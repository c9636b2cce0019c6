//! Raw evdev-based keyboard backend for Linux
//!
//! Reads `input_event` records straight from `/dev/input/event*`. Gives
//! kernel key codes, kernel timestamps and autorepeat notifications, and
//! sees keys regardless of which window has focus.

use super::{HeldModifiers, Keymap, ModifierLayout, RawEvent, RawEventKind};
use crate::backend::{Backend, BackendInfo, BackendKind, CaptureError};
use crate::session::{CancelToken, CaptureSession};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use std::fs::{self, File};
use std::io::{self, Read};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

const PERMISSION_HINT: &str =
    "Add your user to the 'input' group (then log in again) or run with sudo.";

/// A raw input event from the kernel
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub tv_sec: i64,
    pub tv_usec: i64,
    pub event_type: u16,
    pub code: u16,
    pub value: i32,
}

const EV_KEY: u16 = 0x01;
const INPUT_EVENT_SIZE: usize = std::mem::size_of::<InputEvent>();

/// Find all keyboard input devices
fn find_keyboard_devices() -> Result<Vec<PathBuf>, CaptureError> {
    let input_dir = Path::new("/dev/input");
    let entries = fs::read_dir(input_dir).map_err(|_| CaptureError::NoDevices)?;

    let mut keyboards: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.starts_with("event"))
        })
        .filter(|path| is_keyboard_device(path))
        .collect();
    keyboards.sort();

    if keyboards.is_empty() {
        return Err(CaptureError::NoDevices);
    }
    Ok(keyboards)
}

/// Check if a device is a keyboard by examining /sys/class/input
fn is_keyboard_device(device_path: &Path) -> bool {
    let Some(name) = device_path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };

    // Key capability bitmap: a keyboard reports far more keys than a
    // power button or a mouse
    let caps_path = format!("/sys/class/input/{}/device/capabilities/key", name);
    if let Ok(caps) = fs::read_to_string(&caps_path) {
        let total_bits: u32 = caps
            .split_whitespace()
            .filter_map(|hex| u64::from_str_radix(hex, 16).ok())
            .map(|n| n.count_ones())
            .sum();
        return total_bits > 50;
    }

    let name_path = format!("/sys/class/input/{}/device/name", name);
    fs::read_to_string(&name_path)
        .map(|dev_name| {
            let dev_name = dev_name.to_lowercase();
            dev_name.contains("keyboard") || dev_name.contains("kbd")
        })
        .unwrap_or(false)
}

/// Split a read buffer into whole input events; trailing bytes are dropped
pub fn decode_events(bytes: &[u8]) -> Vec<InputEvent> {
    bytes
        .chunks_exact(INPUT_EVENT_SIZE)
        .map(|chunk| {
            // SAFETY: chunk is exactly size_of::<InputEvent>() bytes and
            // InputEvent is plain old data; read_unaligned has no alignment
            // requirement.
            unsafe { std::ptr::read_unaligned(chunk.as_ptr() as *const InputEvent) }
        })
        .collect()
}

/// Convert one kernel event to a raw key event.
///
/// Autorepeat (value 2) becomes a plain key-down; the recorder decides
/// whether it is a repeat.
pub fn raw_from_input(event: &InputEvent, modifiers: &mut HeldModifiers) -> Option<RawEvent> {
    if event.event_type != EV_KEY {
        return None;
    }
    let kind = match event.value {
        0 => RawEventKind::KeyUp,
        1 | 2 => RawEventKind::KeyDown,
        _ => return None,
    };
    let code = u32::from(event.code);
    let mask = modifiers.update(code, kind == RawEventKind::KeyDown);
    let time_ms = event.tv_sec as f64 * 1000.0 + event.tv_usec as f64 / 1000.0;

    Some(
        RawEvent::new(code, kind)
            .with_scancode(code)
            .with_modifiers(mask)
            .with_backend_time(time_ms),
    )
}

/// Switch `file` to non-blocking reads, keeping its other status flags
fn set_nonblocking(file: &File) -> nix::Result<()> {
    let fd = file.as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

/// Evdev-based global keyboard backend
pub struct EvdevListener {
    devices: Vec<File>,
    modifiers: HeldModifiers,
    buffer: Vec<u8>,
    interval: Duration,
}

impl EvdevListener {
    /// Open every readable keyboard device in non-blocking mode
    pub fn open(interval: Duration) -> Result<Self, CaptureError> {
        let candidates = find_keyboard_devices()?;
        let mut devices = Vec::new();

        for path in candidates {
            match File::open(&path) {
                Ok(file) => {
                    set_nonblocking(&file).map_err(|e| CaptureError::Io(e.into()))?;
                    log::info!("opened keyboard device {}", path.display());
                    devices.push(file);
                }
                Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                    log::debug!("no access to {}", path.display());
                }
                Err(e) => return Err(CaptureError::Io(e)),
            }
        }

        if devices.is_empty() {
            return Err(CaptureError::PermissionDenied {
                resource: "/dev/input/event*".to_string(),
                remediation: PERMISSION_HINT.to_string(),
            });
        }

        Ok(Self {
            devices,
            modifiers: HeldModifiers::evdev(),
            buffer: vec![0u8; INPUT_EVENT_SIZE * 64],
            interval,
        })
    }

    /// Drain every pending event from all devices
    pub fn read_pending(&mut self) -> Vec<RawEvent> {
        let mut events = Vec::new();

        for device in &mut self.devices {
            loop {
                match device.read(&mut self.buffer) {
                    Ok(bytes_read) if bytes_read >= INPUT_EVENT_SIZE => {
                        events.extend(
                            decode_events(&self.buffer[..bytes_read])
                                .iter()
                                .filter_map(|ev| raw_from_input(ev, &mut self.modifiers)),
                        );
                    }
                    Ok(_) => break,
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => {
                        log::warn!("keyboard device read failed: {}", e);
                        break;
                    }
                }
            }
        }

        events
    }
}

impl Backend for EvdevListener {
    fn info(&self) -> BackendInfo {
        BackendInfo {
            kind: BackendKind::Evdev,
            mode: BackendKind::Evdev.mode(),
            keymap: Keymap::LinuxEvdev,
            layout: ModifierLayout::CANONICAL,
        }
    }

    fn run(
        &mut self,
        session: &mut CaptureSession,
        cancel: &CancelToken,
    ) -> Result<(), CaptureError> {
        // Discard whatever was queued before capture started
        let stale = self.read_pending().len();
        if stale > 0 {
            log::debug!("discarded {} queued events", stale);
        }

        while !cancel.is_cancelled() {
            for raw in self.read_pending() {
                session.record(raw);
            }
            std::thread::sleep(self.interval);
        }
        Ok(())
    }
}

impl Drop for EvdevListener {
    fn drop(&mut self) {
        log::debug!("releasing {} keyboard device(s)", self.devices.len());
    }
}
