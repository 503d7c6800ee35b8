//! Wasmtime-backed runtime glue for tlib-host.
//!
//! Responsibilities:
//! - Create a Wasmtime `Engine` with the configured proposal flags.
//! - Define the capability table under module `"env"`.
//! - Instantiate a compiled `wasmtime::Module` into a `Store<HostState>`.
//!
//! Entrypoint resolution (`os_main` in either shape, optional
//! `pix_wasm_key_down`) lives in `crate::abi::GuestEntrypoints::resolve`.

pub mod imports;
pub mod runtime;

pub use runtime::WasmtimeRuntime;
