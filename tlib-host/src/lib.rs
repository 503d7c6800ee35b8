//! tlib-host: a native host for tlib WebAssembly guests.
//!
//! A guest is a single `index.wasm` (or `.wat`) module built against the tlib
//! "env" imports. The host:
//! - loads and instantiates it with the capability table (`wasm_*` OS calls and
//!   `pix_wasm_*` presentation calls),
//! - drives its `os_main` entry point from a cooperative loop that honours
//!   `wasm_sleep`,
//! - pulls audio from the guest's ring buffer and forwards key events between
//!   guest invocations.
//!
//! Presentation goes through the [`platform::Platform`] trait; the crate ships a
//! headless backend. The ABI surface is defined in [`abi`].
//!
//! ```no_run
//! use tlib_host::{DrivingLoop, HeadlessPlatform, HostConfig, SystemClock};
//!
//! let config = HostConfig::default().artifact("build/index.wasm");
//! let outcome = DrivingLoop::new(config, HeadlessPlatform::new(), SystemClock)?.run()?;
//! println!("{outcome:?}");
//! # Ok::<(), tlib_host::HostError>(())
//! ```

pub mod abi;
pub mod av;
pub mod clock;
pub mod config;
pub mod driver;
pub mod error;
pub mod input;
pub mod loader;
pub mod memory;
pub mod platform;
pub mod runtime;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AudioConfig, CommandPolicy, EngineConfig, HostConfig};
pub use driver::{DrivingLoop, LoopState, Outcome, Source};
pub use error::{GuestFatal, HostError, MemoryError, PlatformError, Result};
pub use platform::{HeadlessPlatform, HeadlessMonitor, HeadlessStats, InputEvent, Platform, ScriptedKey};
