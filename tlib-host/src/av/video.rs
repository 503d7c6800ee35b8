use super::AvError;
use crate::abi::BYTES_PER_PIXEL;
use crate::error::PlatformError;
use crate::memory::MemoryView;
use crate::state::HostState;

/// Present a `width * height` RGBA8 frame read from guest memory at `ptr`.
pub fn present_frame(
    state: &mut HostState,
    view: &MemoryView<'_>,
    width: u32,
    height: u32,
    ptr: u32,
) -> Result<(), AvError> {
    let invalid = PlatformError::InvalidFrame { width, height };
    if width == 0 || height == 0 {
        return Err(invalid.into());
    }
    let Some(len) = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(BYTES_PER_PIXEL))
    else {
        return Err(invalid.into());
    };
    let pixels = view.bytes(ptr, len)?;

    if state.surface.is_none() {
        let surface = state
            .platform
            .open_surface(&state.surface_id, width, height)?;
        tracing::info!(id = %state.surface_id, width, height, "surface opened");
        state.surface = Some(surface);
    }

    if let Some(surface) = state.surface.as_mut() {
        if surface.size() != (width, height) {
            tracing::debug!(width, height, "resizing surface");
            surface.resize(width, height);
        }
        surface.put_image(pixels)?;
    }
    Ok(())
}
