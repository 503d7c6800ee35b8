//! Configuration for the host.

use crate::error::{HostError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default guest artifact name, looked up relative to the working directory.
pub const DEFAULT_ARTIFACT: &str = "index.wasm";

/// Default presentation surface id.
pub const DEFAULT_SURFACE_ID: &str = "canvas";

/// What `wasm_system` / `wasm_eval` do with guest command text.
///
/// Commands are an unsandboxed escape hatch for trusted guests. None of these
/// policies is a security boundary against a hostile module; `Deny` only
/// switches the feature off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandPolicy {
    /// Run through `sh -c`; non-zero exit status counts as failure
    #[default]
    Shell,
    /// Log and record the command, report success
    Record,
    /// Reject every command
    Deny,
}

/// Audio output parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AudioConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,

    /// Frames pulled from the guest ring per callback
    pub period_frames: u32,
}

impl AudioConfig {
    /// Time covered by one pull of `period_frames`.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(f64::from(self.period_frames) / f64::from(self.sample_rate.max(1)))
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            period_frames: 1024,
        }
    }
}

/// Wasm proposal toggles for the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub simd: bool,
    pub relaxed_simd: bool,
    pub multi_memory: bool,
    pub tail_call: bool,
    pub reference_types: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            simd: true,
            relaxed_simd: true,
            multi_memory: true,
            tail_call: true,
            reference_types: true,
        }
    }
}

/// Configuration for a host session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Guest module (`.wasm` or `.wat`)
    pub artifact: PathBuf,

    /// Surface id passed to the platform when the first frame is presented
    pub surface_id: String,

    /// Stop after this many entry-point invocations (None = until exit)
    pub max_frames: Option<u64>,

    /// Host command handling
    pub commands: CommandPolicy,

    pub audio: AudioConfig,

    pub engine: EngineConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            artifact: PathBuf::from(DEFAULT_ARTIFACT),
            surface_id: DEFAULT_SURFACE_ID.to_string(),
            max_frames: None,
            commands: CommandPolicy::default(),
            audio: AudioConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl HostConfig {
    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| HostError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(HostError::Config("audio.sample_rate must be > 0".into()));
        }
        if self.audio.period_frames == 0 {
            return Err(HostError::Config("audio.period_frames must be > 0".into()));
        }
        if self.audio.period().is_zero() {
            return Err(HostError::Config(
                "audio.period_frames / audio.sample_rate rounds to zero time".into(),
            ));
        }
        if self.surface_id.is_empty() {
            return Err(HostError::Config("surface_id must not be empty".into()));
        }
        if self.engine.relaxed_simd && !self.engine.simd {
            return Err(HostError::Config("engine.relaxed_simd requires engine.simd".into()));
        }
        Ok(())
    }

    /// Builder: set artifact path
    pub fn artifact(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifact = path.into();
        self
    }

    /// Builder: set surface id
    pub fn surface_id(mut self, id: impl Into<String>) -> Self {
        self.surface_id = id.into();
        self
    }

    /// Builder: limit the number of frames
    pub fn max_frames(mut self, frames: u64) -> Self {
        self.max_frames = Some(frames);
        self
    }

    /// Builder: set command policy
    pub fn commands(mut self, policy: CommandPolicy) -> Self {
        self.commands = policy;
        self
    }

    /// Builder: set audio parameters
    pub fn audio(mut self, sample_rate: u32, period_frames: u32) -> Self {
        self.audio = AudioConfig {
            sample_rate,
            period_frames,
        };
        self
    }
}
