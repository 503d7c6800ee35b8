//! Audio/Video capabilities for tlib-host.
//!
//! - Video: the guest renders RGBA8 pixels into its own memory and calls
//!   `pix_wasm_draw(w, h, ptr)`. The host copies them onto the platform surface,
//!   opening it on first use and resizing only when the dimensions change.
//!
//! - Audio: the guest owns a ring of interleaved stereo `f32` frames plus a
//!   `u32` cursor, and registers both once with `pix_wasm_start_audio`. From
//!   then on the host pulls one period at a time between guest invocations,
//!   zeroing each consumed slot so the guest can mix into it again.

mod audio;
mod video;

pub use audio::{AudioStream, RingBuffer, start_audio};
pub use video::present_frame;

use crate::error::{MemoryError, PlatformError};
use thiserror::Error;

/// Errors from AV operations.
#[derive(Debug, Error)]
pub enum AvError {
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error("audio ring must hold at least one frame")]
    EmptyRing,
}
