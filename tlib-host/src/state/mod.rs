//! Per-session host state.
//!
//! This is the `wasmtime::Store` data: every host import reaches it through
//! `Caller::data_mut`, and the driving loop through `Store::data_mut`. It
//! replaces process globals with one owner per guest instance.
//!
//! Presentation sinks start out as `None`; being `Some` is what makes the
//! corresponding `start_*` / `present_frame` capability idempotent.

use crate::av::AudioStream;
use crate::clock::Clock;
use crate::config::{AudioConfig, CommandPolicy, HostConfig};
use crate::input::Keyboard;
use crate::platform::{Platform, Surface};
use std::time::Duration;

pub struct HostState {
    /// Set by `wasm_exit`; the loop never reschedules once this is true.
    pub exit_requested: bool,

    /// Last value passed to `wasm_sleep`, in microseconds.
    pub next_sleep_us: i64,

    pub surface_id: String,
    pub audio_config: AudioConfig,
    /// How `wasm_system` / `wasm_eval` text is handled.
    pub commands: CommandPolicy,

    pub platform: Box<dyn Platform>,
    pub clock: Box<dyn Clock>,

    /// Opened on the first `pix_wasm_draw`.
    pub surface: Option<Box<dyn Surface>>,
    /// Registered on the first `pix_wasm_start_audio`.
    pub audio: Option<AudioStream>,
    /// Registered on the first `pix_wasm_start_input`.
    pub keyboard: Option<Keyboard>,
}

impl HostState {
    pub fn new(config: &HostConfig, platform: Box<dyn Platform>, clock: Box<dyn Clock>) -> Self {
        Self {
            exit_requested: false,
            next_sleep_us: 0,
            surface_id: config.surface_id.clone(),
            audio_config: config.audio.clone(),
            commands: config.commands,
            platform,
            clock,
            surface: None,
            audio: None,
            keyboard: None,
        }
    }

    /// Delay requested for the next iteration; negative requests clamp to zero.
    pub fn next_sleep(&self) -> Duration {
        Duration::from_micros(self.next_sleep_us.max(0) as u64)
    }

    /// Release standing registrations (audio device, key source).
    pub fn shutdown(&mut self) {
        if let Some(mut audio) = self.audio.take() {
            if let Err(e) = audio.close() {
                tracing::warn!("failed to close audio output: {e}");
            }
        }
        self.keyboard = None;
    }
}
