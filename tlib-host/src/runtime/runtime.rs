//! Wasmtime engine and linker for one guest session.

use crate::abi::{self, GuestEntrypoints};
use crate::config::EngineConfig;
use crate::error::HostError;
use crate::state::HostState;

use wasmtime::{Instance, Linker, Module, Store};

/// Host-side runtime container.
///
/// The store is not kept here: it owns the session's `HostState` and belongs to
/// the driving loop.
pub struct WasmtimeRuntime {
    pub engine: wasmtime::Engine,
    pub linker: Linker<HostState>,
}

impl WasmtimeRuntime {
    /// Create an engine with the proposal set from `config` and a linker holding
    /// the capability table.
    pub fn new(config: &EngineConfig) -> Result<Self, HostError> {
        let mut cfg = wasmtime::Config::new();

        // Baseline that C toolchains emit by default.
        cfg.wasm_multi_value(true);
        cfg.wasm_bulk_memory(true);

        cfg.wasm_reference_types(config.reference_types);
        cfg.wasm_simd(config.simd);
        cfg.wasm_relaxed_simd(config.relaxed_simd);
        cfg.wasm_multi_memory(config.multi_memory);
        cfg.wasm_tail_call(config.tail_call);

        let engine = wasmtime::Engine::new(&cfg)
            .map_err(|e| HostError::Config(format!("engine: {e:#}")))?;
        let mut linker = Linker::new(&engine);
        super::imports::define_imports(&mut linker)
            .map_err(|e| HostError::Instantiate(format!("{e:#}")))?;

        Ok(Self { engine, linker })
    }

    pub fn new_store(&self, state: HostState) -> Store<HostState> {
        Store::new(&self.engine, state)
    }

    /// Instantiate a module and resolve its entrypoints.
    pub fn instantiate(
        &self,
        store: &mut Store<HostState>,
        module: &Module,
    ) -> Result<(Instance, GuestEntrypoints), HostError> {
        let instance = self
            .linker
            .instantiate(&mut *store, module)
            .map_err(|e| HostError::Instantiate(format!("{e:#}")))?;

        let memory = abi::validate::required_exports_present(&instance, store)
            .map_err(|missing| HostError::MissingExport(missing.name()))?;
        let entrypoints = GuestEntrypoints::resolve(&instance, store, memory)
            .map_err(|e| HostError::Instantiate(format!("{e:#}")))?;

        Ok((instance, entrypoints))
    }
}
