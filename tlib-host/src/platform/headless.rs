//! Headless backend: no window, no sound card.
//!
//! Everything a sink observes is mirrored into a shared `HeadlessStats`
//! reachable through a cloned `HeadlessMonitor`, so the runner (and tests) can
//! inspect the session after the store owns the platform.

use super::{AudioOutput, InputEvent, KeySource, Platform, Surface};
use crate::config::{AudioConfig, CommandPolicy};
use crate::error::PlatformError;

use std::collections::VecDeque;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Everything the headless sinks have seen.
#[derive(Debug, Default, Clone)]
pub struct HeadlessStats {
    pub surfaces_opened: u32,
    /// Size of the surface, once opened.
    pub surface_size: Option<(u32, u32)>,
    /// Every resize after creation, in order.
    pub resizes: Vec<(u32, u32)>,
    pub frames_presented: u64,
    /// RGBA8 pixels of the most recent frame.
    pub last_frame: Vec<u8>,

    pub audio_opened: u32,
    pub audio_resumes: u32,
    /// Stereo frames written to the device.
    pub audio_frames: u64,
    /// Peak absolute sample value seen.
    pub audio_peak: f32,

    pub keyboards_opened: u32,

    pub alerts: Vec<String>,
    pub commands: Vec<String>,
}

/// Shared handle onto `HeadlessStats`.
#[derive(Debug, Clone, Default)]
pub struct HeadlessMonitor(Arc<Mutex<HeadlessStats>>);

impl HeadlessMonitor {
    fn lock(&self) -> MutexGuard<'_, HeadlessStats> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current statistics.
    pub fn snapshot(&self) -> HeadlessStats {
        self.lock().clone()
    }

    /// Write the last presented frame as an RGBA PNG.
    ///
    /// Returns `Ok(false)` when nothing has been presented yet.
    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<bool, PlatformError> {
        let (width, height, pixels) = {
            let s = self.lock();
            match s.surface_size {
                Some((w, h)) if s.frames_presented > 0 => (w, h, s.last_frame.clone()),
                _ => return Ok(false),
            }
        };

        let file = BufWriter::new(File::create(path.as_ref())?);
        let mut encoder = png::Encoder::new(file, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder
            .write_header()
            .map_err(|e| PlatformError::Encode(e.to_string()))?;
        writer
            .write_image_data(&pixels)
            .map_err(|e| PlatformError::Encode(e.to_string()))?;
        writer
            .finish()
            .map_err(|e| PlatformError::Encode(e.to_string()))?;
        Ok(true)
    }
}

/// A key event scheduled relative to loop start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedKey {
    pub at: Duration,
    pub event: InputEvent,
}

impl ScriptedKey {
    pub fn down(at: Duration, code: u32) -> Self {
        Self {
            at,
            event: InputEvent::Key {
                code,
                down: true,
                repeat: false,
            },
        }
    }

    pub fn up(at: Duration, code: u32) -> Self {
        Self {
            at,
            event: InputEvent::Key {
                code,
                down: false,
                repeat: false,
            },
        }
    }
}

/// Headless presentation backend.
#[derive(Debug, Default)]
pub struct HeadlessPlatform {
    monitor: HeadlessMonitor,
    key_script: Vec<ScriptedKey>,
    audio_capture: Option<PathBuf>,
}

impl HeadlessPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for inspecting the session from outside the store.
    pub fn monitor(&self) -> HeadlessMonitor {
        self.monitor.clone()
    }

    /// Builder: key events delivered once the guest starts input
    pub fn script_keys(mut self, keys: impl IntoIterator<Item = ScriptedKey>) -> Self {
        self.key_script.extend(keys);
        self
    }

    /// Builder: record audio output to a 32-bit float WAV file
    pub fn capture_audio(mut self, path: impl Into<PathBuf>) -> Self {
        self.audio_capture = Some(path.into());
        self
    }
}

impl Platform for HeadlessPlatform {
    fn open_surface(
        &mut self,
        id: &str,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn Surface>, PlatformError> {
        tracing::debug!(id, width, height, "opening headless surface");
        {
            let mut s = self.monitor.lock();
            s.surfaces_opened += 1;
            s.surface_size = Some((width, height));
        }
        Ok(Box::new(HeadlessSurface {
            width,
            height,
            pixels: vec![0; pixel_len(width, height)],
            monitor: self.monitor.clone(),
        }))
    }

    fn open_audio(&mut self, config: &AudioConfig) -> Result<Box<dyn AudioOutput>, PlatformError> {
        let wav = match &self.audio_capture {
            Some(path) => {
                let spec = hound::WavSpec {
                    channels: 2,
                    sample_rate: config.sample_rate,
                    bits_per_sample: 32,
                    sample_format: hound::SampleFormat::Float,
                };
                let writer = hound::WavWriter::create(path, spec)
                    .map_err(|e| PlatformError::Audio(e.to_string()))?;
                tracing::info!(path = %path.display(), "capturing audio");
                Some(writer)
            }
            None => None,
        };
        self.monitor.lock().audio_opened += 1;
        Ok(Box::new(HeadlessAudio {
            wav,
            monitor: self.monitor.clone(),
        }))
    }

    fn open_keyboard(&mut self) -> Result<Box<dyn KeySource>, PlatformError> {
        self.monitor.lock().keyboards_opened += 1;
        let mut script = std::mem::take(&mut self.key_script);
        script.sort_by_key(|k| k.at);
        Ok(Box::new(ScriptedKeys {
            pending: script.into(),
        }))
    }

    fn alert(&mut self, message: &str) {
        tracing::warn!(target: "alert", "{message}");
        self.monitor.lock().alerts.push(message.to_string());
    }

    fn execute(&mut self, command: &str, policy: CommandPolicy) -> Result<(), PlatformError> {
        self.monitor.lock().commands.push(command.to_string());
        match policy {
            CommandPolicy::Shell => {
                let status = Command::new("sh").arg("-c").arg(command).status()?;
                if status.success() {
                    Ok(())
                } else {
                    Err(PlatformError::CommandFailed(status))
                }
            }
            CommandPolicy::Record => {
                tracing::info!(command, "recorded host command");
                Ok(())
            }
            CommandPolicy::Deny => Err(PlatformError::CommandDenied(command.to_string())),
        }
    }
}

fn pixel_len(width: u32, height: u32) -> usize {
    (width as usize)
        .saturating_mul(height as usize)
        .saturating_mul(4)
}

struct HeadlessSurface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    monitor: HeadlessMonitor,
}

impl Surface for HeadlessSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels = vec![0; pixel_len(width, height)];
        let mut s = self.monitor.lock();
        s.surface_size = Some((width, height));
        s.resizes.push((width, height));
    }

    fn put_image(&mut self, rgba: &[u8]) -> Result<(), PlatformError> {
        if rgba.len() != self.pixels.len() {
            return Err(PlatformError::InvalidFrame {
                width: self.width,
                height: self.height,
            });
        }
        self.pixels.copy_from_slice(rgba);
        let mut s = self.monitor.lock();
        s.frames_presented += 1;
        s.last_frame.clear();
        s.last_frame.extend_from_slice(&self.pixels);
        Ok(())
    }
}

struct HeadlessAudio {
    wav: Option<hound::WavWriter<BufWriter<File>>>,
    monitor: HeadlessMonitor,
}

impl AudioOutput for HeadlessAudio {
    fn resume(&mut self) {
        self.monitor.lock().audio_resumes += 1;
    }

    fn write(&mut self, left: &[f32], right: &[f32]) -> Result<(), PlatformError> {
        if let Some(wav) = self.wav.as_mut() {
            for (l, r) in left.iter().zip(right) {
                wav.write_sample(*l)
                    .and_then(|_| wav.write_sample(*r))
                    .map_err(|e| PlatformError::Audio(e.to_string()))?;
            }
        }

        let peak = left
            .iter()
            .chain(right)
            .fold(0.0f32, |acc, s| acc.max(s.abs()));
        let mut s = self.monitor.lock();
        s.audio_frames += left.len() as u64;
        s.audio_peak = s.audio_peak.max(peak);
        Ok(())
    }

    fn close(&mut self) -> Result<(), PlatformError> {
        if let Some(wav) = self.wav.take() {
            wav.finalize()
                .map_err(|e| PlatformError::Audio(e.to_string()))?;
        }
        Ok(())
    }
}

struct ScriptedKeys {
    pending: VecDeque<ScriptedKey>,
}

impl KeySource for ScriptedKeys {
    fn poll(&mut self, elapsed: Duration) -> Vec<InputEvent> {
        let mut due = Vec::new();
        while self.pending.front().is_some_and(|k| k.at <= elapsed) {
            if let Some(k) = self.pending.pop_front() {
                due.push(k.event);
            }
        }
        due
    }

    fn next_due(&self) -> Option<Duration> {
        self.pending.front().map(|k| k.at)
    }
}
