//! Presentation backend seam.
//!
//! The capability table never talks to a window, sound card or keyboard
//! directly. It goes through the narrow traits below, which a backend
//! implements. Sinks are opened lazily by the capabilities and then owned by
//! the session's `HostState`.
//!
//! `headless` is the backend shipped with the crate: an in-memory surface
//! with PNG snapshots, a counting audio device with optional WAV capture, and
//! a scripted keyboard.

pub mod headless;

use crate::config::{AudioConfig, CommandPolicy};
use crate::error::PlatformError;
use std::time::Duration;

pub use headless::{HeadlessPlatform, HeadlessMonitor, HeadlessStats, ScriptedKey};

/// Pixel output target (the "canvas").
pub trait Surface: Send {
    /// Current backing size in pixels.
    fn size(&self) -> (u32, u32);

    /// Reallocate the backing store. Contents are discarded.
    fn resize(&mut self, width: u32, height: u32);

    /// Copy a full frame of RGBA8 pixels, `width * height * 4` bytes.
    fn put_image(&mut self, rgba: &[u8]) -> Result<(), PlatformError>;
}

/// Stereo output device fed by the host's pull callback.
pub trait AudioOutput: Send {
    /// Start or continue playback. Called on every `start_audio`.
    fn resume(&mut self);

    /// Accept one period of de-interleaved samples (equal lengths).
    fn write(&mut self, left: &[f32], right: &[f32]) -> Result<(), PlatformError>;

    /// Flush and release the device.
    fn close(&mut self) -> Result<(), PlatformError> {
        Ok(())
    }
}

/// Raw event from the host keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Key { code: u32, down: bool, repeat: bool },
    /// Native context-menu request; never forwarded to the guest.
    ContextMenu,
}

/// Source of keyboard events.
pub trait KeySource: Send {
    /// Drain events that are due at `elapsed` (time since the loop started).
    fn poll(&mut self, elapsed: Duration) -> Vec<InputEvent>;

    /// When the next event becomes due, if known.
    fn next_due(&self) -> Option<Duration> {
        None
    }
}

/// Host presentation backend.
pub trait Platform: Send {
    fn open_surface(
        &mut self,
        id: &str,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn Surface>, PlatformError>;

    fn open_audio(&mut self, config: &AudioConfig) -> Result<Box<dyn AudioOutput>, PlatformError>;

    fn open_keyboard(&mut self) -> Result<Box<dyn KeySource>, PlatformError>;

    /// Blocking, user-facing notification.
    fn alert(&mut self, message: &str);

    /// Handle trusted guest command text according to `policy`.
    fn execute(&mut self, command: &str, policy: CommandPolicy) -> Result<(), PlatformError>;
}
