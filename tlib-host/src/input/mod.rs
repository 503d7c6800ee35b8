//! Input module for tlib-host.
//!
//! Responsibilities:
//! - Register the platform key source once, on the first `pix_wasm_start_input(ctx)`.
//! - Filter raw platform events: auto-repeats are dropped and the native
//!   context-menu request is swallowed.
//! - Hand the driving loop `(ctx, key, down)` triples for the guest's
//!   `pix_wasm_key_down` export.
//!
//! Key codes are passed through untouched (DOM `keyCode` numbering for the
//! browser-compatible guests); mapping them is the guest's job.

use crate::error::HostError;
use crate::platform::{InputEvent, KeySource};
use crate::state::HostState;
use std::time::Duration;

/// A key transition ready for the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyTransition {
    pub context: u32,
    pub key: u32,
    pub down: bool,
}

/// Registered keyboard: the platform source plus the guest context id.
pub struct Keyboard {
    source: Box<dyn KeySource>,
    context: u32,
}

impl Keyboard {
    pub fn new(source: Box<dyn KeySource>, context: u32) -> Self {
        Self { source, context }
    }

    pub fn context(&self) -> u32 {
        self.context
    }

    pub fn next_due(&self) -> Option<Duration> {
        self.source.next_due()
    }

    /// Transitions due at `elapsed`, already filtered.
    pub fn due(&mut self, elapsed: Duration) -> Vec<KeyTransition> {
        self.source
            .poll(elapsed)
            .into_iter()
            .filter_map(translate)
            .map(|(key, down)| KeyTransition {
                context: self.context,
                key,
                down,
            })
            .collect()
    }
}

/// Map a platform event to `(key, down)`, or `None` if the guest must not see it.
pub fn translate(event: InputEvent) -> Option<(u32, bool)> {
    match event {
        InputEvent::Key { repeat: true, .. } => None,
        InputEvent::Key { code, down, .. } => Some((code, down)),
        InputEvent::ContextMenu => {
            tracing::trace!("suppressed context menu");
            None
        }
    }
}

/// `pix_wasm_start_input`: register listeners once.
///
/// `has_callback` reports whether the guest exports `pix_wasm_key_down`; a
/// guest asking for input without one is a linking error. Later calls are
/// no-ops and keep the first context id.
pub fn start_input(state: &mut HostState, has_callback: bool, context: u32) -> Result<(), HostError> {
    if let Some(keyboard) = &state.keyboard {
        if keyboard.context() != context {
            tracing::debug!(
                registered = keyboard.context(),
                requested = context,
                "input already started; keeping first context"
            );
        }
        return Ok(());
    }
    if !has_callback {
        return Err(HostError::MissingExport(crate::abi::guest_exports::KEY_DOWN));
    }

    let source = state.platform.open_keyboard()?;
    tracing::info!(context, "input started");
    state.keyboard = Some(Keyboard::new(source, context));
    Ok(())
}
