//! Host import definitions for the Wasmtime runtime.
//!
//! This module defines the capability table: every host function the guest
//! imports under the `"env"` module. Capabilities re-derive their memory view on
//! each call and never call back into the guest.

use crate::{
    abi::{IMPORT_MODULE, command_status, guest_exports, host_imports},
    av,
    error::{GuestFatal, HostError},
    input,
    memory::MemoryView,
    state::HostState,
};

use wasmtime::{Caller, Extern, Linker, Memory};

/// The guest's exported linear memory.
fn guest_memory(caller: &mut Caller<'_, HostState>) -> anyhow::Result<Memory> {
    caller
        .get_export(guest_exports::MEMORY)
        .and_then(Extern::into_memory)
        .ok_or_else(|| HostError::MissingExport(guest_exports::MEMORY).into())
}

/// Hand command text to the platform; failures become status 1.
fn run_host_command(state: &mut HostState, command: &str) -> i32 {
    tracing::debug!(command, policy = ?state.commands, "host command");
    match state.platform.execute(command, state.commands) {
        Ok(()) => command_status::OK,
        Err(e) => {
            tracing::warn!(command, "host command failed: {e}");
            command_status::FAILED
        }
    }
}

/// Define all host imports expected by guests under module `"env"`.
///
/// Must be called before instantiating the module.
pub fn define_imports(linker: &mut Linker<HostState>) -> Result<(), anyhow::Error> {
    // --- OS ---
    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::EXIT,
        |mut caller: Caller<'_, HostState>| {
            tracing::debug!("guest requested exit");
            caller.data_mut().exit_requested = true;
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::FAIL,
        |mut caller: Caller<'_, HostState>, ptr: u32, len: u32| -> anyhow::Result<()> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, state) = memory.data_and_store_mut(&mut caller);
            let message = MemoryView::new(bytes).text(ptr, len)?.into_owned();

            tracing::error!(target: "guest", "{message}");
            state.platform.alert(&message);
            Err(GuestFatal { message }.into())
        },
    )?;

    // Console output: (fd, ptr, len) -> 1 on success, 0 if the range is bad
    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::WRITE,
        |mut caller: Caller<'_, HostState>, fd: i32, ptr: u32, len: u32| -> anyhow::Result<i32> {
            let memory = guest_memory(&mut caller)?;
            let view = MemoryView::new(memory.data_mut(&mut caller));
            match view.text(ptr, len) {
                Ok(text) => {
                    tracing::info!(target: "guest", fd, "{}", text.trim_end_matches('\n'));
                    Ok(1)
                }
                Err(e) => {
                    tracing::warn!(fd, "wasm_write: {e}");
                    Ok(0)
                }
            }
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::TIME,
        |caller: Caller<'_, HostState>| -> i64 { caller.data().clock.now_micros() },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::SLEEP,
        |mut caller: Caller<'_, HostState>, us: i64| {
            caller.data_mut().next_sleep_us = us;
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::SYSTEM,
        |mut caller: Caller<'_, HostState>, ptr: u32, len: u32| -> anyhow::Result<i32> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, state) = memory.data_and_store_mut(&mut caller);
            let command = MemoryView::new(bytes).text(ptr, len)?.into_owned();
            Ok(run_host_command(state, &command))
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::EVAL,
        |mut caller: Caller<'_, HostState>, ptr: u32| -> anyhow::Result<i32> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, state) = memory.data_and_store_mut(&mut caller);
            let view = MemoryView::new(bytes);
            let command = String::from_utf8_lossy(view.c_str(ptr)?).into_owned();
            Ok(run_host_command(state, &command))
        },
    )?;

    // --- Pix ---
    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::DRAW,
        |mut caller: Caller<'_, HostState>, width: u32, height: u32, ptr: u32| -> anyhow::Result<()> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, state) = memory.data_and_store_mut(&mut caller);
            av::present_frame(state, &MemoryView::new(bytes), width, height, ptr)?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::START_AUDIO,
        |mut caller: Caller<'_, HostState>,
         buffer: u32,
         frames: u32,
         cursor: u32|
         -> anyhow::Result<()> {
            let memory = guest_memory(&mut caller)?;
            let (bytes, state) = memory.data_and_store_mut(&mut caller);
            av::start_audio(state, &mut MemoryView::new(bytes), buffer, frames, cursor)?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::START_INPUT,
        |mut caller: Caller<'_, HostState>, ctx: u32| -> anyhow::Result<()> {
            let has_callback = caller
                .get_export(guest_exports::KEY_DOWN)
                .and_then(Extern::into_func)
                .is_some();
            input::start_input(caller.data_mut(), has_callback, ctx)?;
            Ok(())
        },
    )?;

    Ok(())
}
