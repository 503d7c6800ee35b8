//! tlib-host ABI module
//!
//! This module defines the ABI contract between:
//! - **Host**: `tlib-host` (native wasmtime embedding)
//! - **Guest**: the loaded WASM module (usually built from C with `-target wasm32`)
//!
//! ## Imports (guest -> host)
//! Imported from module `"env"`. All pointers are offsets into the guest's exported `memory`
//! and are only valid for the duration of the call.
//!
//! ### OS
//! - `wasm_exit()`
//! - `wasm_fail(msg: u32, len: u32)`
//! - `wasm_write(fd: u32, data: u32, len: u32) -> u32`
//! - `wasm_time() -> i64`: microseconds since 1970
//! - `wasm_sleep(us: i64)`: delay before the next `os_main` call
//! - `wasm_system(cmd: u32, len: u32) -> i32`
//! - `wasm_eval(cmd: u32) -> i32`: NUL-terminated variant of `wasm_system`
//!
//! ### Pix
//! - `pix_wasm_draw(width: u32, height: u32, rgba: u32)`
//! - `pix_wasm_start_audio(buffer: u32, frames: u32, cursor: u32)`
//! - `pix_wasm_start_input(ctx: u32)`
//!
//! ## Exports (host -> guest)
//! - `memory` (required)
//! - `os_main(argc: i32, argv: i32)` or `os_main()` (required), called once per loop iteration
//! - `pix_wasm_key_down(ctx: u32, key: u32, down: u32)` (required once input is started)

use wasmtime::{Instance, Store, TypedFunc};

/// Import module name used by the guest.
pub const IMPORT_MODULE: &str = "env";

/// Guest export names.
pub mod guest_exports {
    pub const MEMORY: &str = "memory";
    /// Called once per loop iteration (required).
    pub const MAIN: &str = "os_main";
    /// Key transition callback (required when input is started).
    pub const KEY_DOWN: &str = "pix_wasm_key_down";
}

/// Host import names provided to the guest.
///
/// These are the string names under module [`IMPORT_MODULE`].
pub mod host_imports {
    // OS
    pub const EXIT: &str = "wasm_exit";
    pub const FAIL: &str = "wasm_fail";
    pub const WRITE: &str = "wasm_write";
    pub const TIME: &str = "wasm_time";
    pub const SLEEP: &str = "wasm_sleep";
    pub const SYSTEM: &str = "wasm_system";
    pub const EVAL: &str = "wasm_eval";

    // Pix
    pub const DRAW: &str = "pix_wasm_draw";
    pub const START_AUDIO: &str = "pix_wasm_start_audio";
    pub const START_INPUT: &str = "pix_wasm_start_input";
}

/// Bytes per presented pixel (RGBA8).
pub const BYTES_PER_PIXEL: u32 = 4;

/// One ring-buffer frame: left + right `f32`.
pub const SAMPLES_PER_FRAME: usize = 2;

/// Status returned by `wasm_system` / `wasm_eval`.
pub mod command_status {
    pub const OK: i32 = 0;
    pub const FAILED: i32 = 1;
}

/// Helpers for validating guest exports.
pub mod validate {
    use super::guest_exports;
    use wasmtime::{Instance, Memory, Store};

    /// Validate that a guest instance exports what the host needs to drive it.
    ///
    /// Returns the exported memory so callers do not look it up twice.
    pub fn required_exports_present<T: 'static>(
        instance: &Instance,
        store: &mut Store<T>,
    ) -> Result<Memory, MissingExport> {
        let memory = instance
            .get_memory(&mut *store, guest_exports::MEMORY)
            .ok_or(MissingExport::Memory)?;
        if instance.get_func(&mut *store, guest_exports::MAIN).is_none() {
            return Err(MissingExport::Main);
        }
        Ok(memory)
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MissingExport {
        Memory,
        Main,
    }

    impl MissingExport {
        pub fn name(self) -> &'static str {
            match self {
                MissingExport::Memory => guest_exports::MEMORY,
                MissingExport::Main => guest_exports::MAIN,
            }
        }
    }
}

/// Entry point in either of the two shapes C toolchains produce.
#[derive(Clone)]
pub enum MainFunc {
    /// `os_main(argc, argv)`, called with `(0, 0)`
    Argv(TypedFunc<(i32, i32), ()>),
    /// `os_main()`
    Bare(TypedFunc<(), ()>),
}

impl MainFunc {
    pub fn call<T: 'static>(&self, store: &mut Store<T>) -> anyhow::Result<()> {
        match self {
            MainFunc::Argv(f) => f.call(store, (0, 0)),
            MainFunc::Bare(f) => f.call(store, ()),
        }
    }
}

/// Resolved guest entrypoints.
///
/// Resolved once after instantiation and reused for every iteration.
#[derive(Clone)]
pub struct GuestEntrypoints {
    pub main: MainFunc,
    pub key_down: Option<TypedFunc<(u32, u32, u32), ()>>,
    pub memory: wasmtime::Memory,
}

impl GuestEntrypoints {
    /// Type the entrypoints of an instance that passed
    /// [`validate::required_exports_present`].
    pub fn resolve<T: 'static>(
        instance: &Instance,
        store: &mut Store<T>,
        memory: wasmtime::Memory,
    ) -> anyhow::Result<Self> {
        let main = match instance.get_typed_func::<(i32, i32), ()>(&mut *store, guest_exports::MAIN)
        {
            Ok(f) => MainFunc::Argv(f),
            Err(_) => MainFunc::Bare(
                instance.get_typed_func::<(), ()>(&mut *store, guest_exports::MAIN)?,
            ),
        };

        let key_down = instance
            .get_typed_func::<(u32, u32, u32), ()>(&mut *store, guest_exports::KEY_DOWN)
            .ok();

        Ok(Self {
            main,
            key_down,
            memory,
        })
    }
}
