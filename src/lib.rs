//! Keyboard Timing - key event timing recorder
//!
//! Captures key-down and key-up events from one of several backends, stamps
//! each with a monotonic millisecond timestamp, detects autorepeat, resolves
//! a printable character and the held modifiers, and writes the session as a
//! CSV log that can be compared across platforms and implementations.

pub mod backend;
pub mod clock;
pub mod config;
pub mod keyboard;
pub mod recorder;
pub mod report;
pub mod session;
pub mod ui;

pub use config::Config;
