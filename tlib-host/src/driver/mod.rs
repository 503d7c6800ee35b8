//! The driving loop.
//!
//! Calls the guest's `os_main` once per iteration and suspends between
//! iterations for the delay the guest last requested through `wasm_sleep`.
//! While suspended it services the standing registrations: the audio pull
//! (one period every `period_frames / sample_rate` seconds) and due key events.
//!
//! ```text
//! Loading -> Running -> Sleeping -> Running -> ... -> Stopped(outcome)
//! ```
//!
//! Every transition happens in [`DrivingLoop::step`]; [`DrivingLoop::run`] steps
//! until the loop stops. Everything runs on the caller's thread.

use crate::abi::GuestEntrypoints;
use crate::clock::Clock;
use crate::config::HostConfig;
use crate::error::{GuestFatal, HostError, Result};
use crate::loader;
use crate::memory::MemoryView;
use crate::platform::Platform;
use crate::runtime::WasmtimeRuntime;
use crate::state::HostState;

use std::path::PathBuf;
use std::time::Duration;
use wasmtime::Store;

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The guest called `wasm_exit`.
    Exited,
    /// Load error or unhandled guest trap; already reported.
    Failed(String),
    /// `max_frames` iterations ran.
    FrameLimit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    Loading,
    Running,
    /// `until` is absolute clock time.
    Sleeping { delay: Duration, until: Duration },
    Stopped(Outcome),
}

/// Where the guest module comes from.
#[derive(Debug, Clone)]
pub enum Source {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

pub struct DrivingLoop {
    config: HostConfig,
    runtime: WasmtimeRuntime,
    store: Store<HostState>,
    source: Source,
    guest: Option<GuestEntrypoints>,
    state: LoopState,
    frames: u64,
    /// Clock time when the loop was created; key events are scheduled relative to it.
    started: Duration,
    /// Clock time of the next audio pull.
    next_audio: Option<Duration>,
}

impl DrivingLoop {
    /// Build a loop that will load `config.artifact`.
    pub fn new(
        config: HostConfig,
        platform: impl Platform + 'static,
        clock: impl Clock + 'static,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = WasmtimeRuntime::new(&config.engine)?;
        let started = clock.now();
        let store = runtime.new_store(HostState::new(&config, Box::new(platform), Box::new(clock)));
        let source = Source::Path(loader::resolve_artifact(&config.artifact));

        Ok(Self {
            config,
            runtime,
            store,
            source,
            guest: None,
            state: LoopState::Loading,
            frames: 0,
            started,
            next_audio: None,
        })
    }

    /// Load the guest from in-memory WASM or WAT bytes instead of the artifact path.
    pub fn with_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.source = Source::Bytes(bytes.into());
        self
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    /// Number of `os_main` invocations so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn host(&self) -> &HostState {
        self.store.data()
    }

    /// Live guest memory, once loaded.
    pub fn memory(&mut self) -> Option<&mut [u8]> {
        let guest = self.guest.as_ref()?;
        Some(guest.memory.data_mut(&mut self.store))
    }

    /// Drive the loop until it stops.
    ///
    /// Guest failures are an `Ok(Outcome::Failed)`; `Err` is reserved for load
    /// errors.
    pub fn run(&mut self) -> Result<Outcome> {
        loop {
            if let LoopState::Stopped(outcome) = &self.state {
                return Ok(outcome.clone());
            }
            self.step()?;
        }
    }

    /// Advance exactly one state.
    pub fn step(&mut self) -> Result<()> {
        let next = match self.state.clone() {
            LoopState::Loading => match self.load() {
                Ok(()) => LoopState::Running,
                Err(e) => {
                    let message = e.to_string();
                    tracing::error!("failed to load guest: {message}");
                    self.store.data_mut().platform.alert(&message);
                    self.stop(Outcome::Failed(message));
                    return Err(e);
                }
            },
            LoopState::Running => self.run_frame(),
            LoopState::Sleeping { until, .. } => match self.sleep_until(until) {
                Ok(()) => LoopState::Running,
                Err(e) => LoopState::Stopped(self.failure(e)),
            },
            LoopState::Stopped(_) => return Err(HostError::Stopped),
        };

        match next {
            LoopState::Stopped(outcome) => self.stop(outcome),
            next => {
                tracing::trace!(state = ?next, "loop transition");
                self.state = next;
            }
        }
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        let module = match &self.source {
            Source::Path(path) => loader::load_module(&self.runtime.engine, path)?,
            Source::Bytes(bytes) => loader::compile_module(&self.runtime.engine, bytes)?,
        };
        let (_, guest) = self.runtime.instantiate(&mut self.store, &module)?;
        tracing::info!(
            memory_bytes = guest.memory.data_size(&self.store),
            key_callback = guest.key_down.is_some(),
            "guest loaded"
        );
        self.guest = Some(guest);
        Ok(())
    }

    fn run_frame(&mut self) -> LoopState {
        if self.store.data().exit_requested {
            return LoopState::Stopped(Outcome::Exited);
        }
        if self.config.max_frames.is_some_and(|max| self.frames >= max) {
            return LoopState::Stopped(Outcome::FrameLimit);
        }
        let Some(guest) = self.guest.as_ref() else {
            return LoopState::Stopped(Outcome::Failed("guest not loaded".into()));
        };

        self.frames += 1;
        let main = guest.main.clone();
        match main.call(&mut self.store) {
            Ok(()) if self.store.data().exit_requested => LoopState::Stopped(Outcome::Exited),
            Ok(()) => {
                let host = self.store.data();
                let delay = host.next_sleep();
                LoopState::Sleeping {
                    delay,
                    until: host.clock.now() + delay,
                }
            }
            Err(e) => LoopState::Stopped(self.failure(e)),
        }
    }

    /// Service standing registrations until `until`, sleeping in between.
    fn sleep_until(&mut self, until: Duration) -> anyhow::Result<()> {
        loop {
            let now = self.store.data().clock.now();
            self.pump_audio(now)?;
            self.deliver_keys(now)?;
            if self.store.data().exit_requested || now >= until {
                return Ok(());
            }

            let host = self.store.data();
            let mut wake = until;
            if let Some(at) = self.next_audio {
                wake = wake.min(at);
            }
            if let Some(at) = host.keyboard.as_ref().and_then(|k| k.next_due()) {
                wake = wake.min(self.started + at);
            }
            let nap = wake.saturating_sub(now);
            if !nap.is_zero() {
                self.store.data_mut().clock.sleep(nap);
            }
        }
    }

    /// Pull every audio period that has come due by `now`.
    fn pump_audio(&mut self, now: Duration) -> anyhow::Result<()> {
        if self.store.data().audio.is_none() {
            return Ok(());
        }
        let period = self.store.data().audio_config.period();
        let Some(memory) = self.guest.as_ref().map(|g| g.memory) else {
            return Ok(());
        };

        let mut due = *self.next_audio.get_or_insert(now);
        while due <= now {
            let (bytes, host) = memory.data_and_store_mut(&mut self.store);
            if let Some(audio) = host.audio.as_mut() {
                audio.pump(&mut MemoryView::new(bytes))?;
            }
            due += period;
        }
        self.next_audio = Some(due);
        Ok(())
    }

    /// Forward due key transitions to `pix_wasm_key_down`.
    fn deliver_keys(&mut self, now: Duration) -> anyhow::Result<()> {
        let elapsed = now.saturating_sub(self.started);
        let transitions = match self.store.data_mut().keyboard.as_mut() {
            Some(keyboard) => keyboard.due(elapsed),
            None => return Ok(()),
        };
        if transitions.is_empty() {
            return Ok(());
        }
        let Some(callback) = self.guest.as_ref().and_then(|g| g.key_down.clone()) else {
            return Err(HostError::MissingExport(crate::abi::guest_exports::KEY_DOWN).into());
        };

        for key in transitions {
            tracing::trace!(ctx = key.context, key = key.key, down = key.down, "key");
            callback.call(&mut self.store, (key.context, key.key, u32::from(key.down)))?;
            if self.store.data().exit_requested {
                break;
            }
        }
        Ok(())
    }

    /// Turn an error raised while the guest ran into an outcome, reporting it once.
    fn failure(&mut self, error: anyhow::Error) -> Outcome {
        let host = self.store.data_mut();
        if host.exit_requested {
            tracing::debug!("guest trapped after exit: {error:#}");
            return Outcome::Exited;
        }
        if let Some(fatal) = error.downcast_ref::<GuestFatal>() {
            // Already alerted by `wasm_fail`.
            return Outcome::Failed(fatal.message.clone());
        }

        let message = format!("{error:#}");
        tracing::error!("guest failed: {message}");
        host.platform.alert(&message);
        Outcome::Failed(message)
    }

    fn stop(&mut self, outcome: Outcome) {
        tracing::info!(?outcome, frames = self.frames, "loop stopped");
        self.store.data_mut().shutdown();
        self.next_audio = None;
        self.state = LoopState::Stopped(outcome);
    }
}
