use super::AvError;
use crate::abi::SAMPLES_PER_FRAME;
use crate::memory::{ElementKind, MemoryView};
use crate::platform::AudioOutput;
use crate::state::HostState;


/// Location of the guest-owned audio ring.
///
/// `capacity` stereo frames of `f32` start at `buffer_ptr`; the shared `u32`
/// read cursor (in frames) lives at `cursor_ptr`. The guest mixes ahead of the
/// cursor, the host consumes at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingBuffer {
    pub buffer_ptr: u32,
    pub capacity: u32,
    pub cursor_ptr: u32,
}

impl RingBuffer {
    /// Check that the ring and cursor lie inside current guest memory.
    pub fn validate(&self, view: &mut MemoryView<'_>) -> Result<(), AvError> {
        if self.capacity == 0 {
            return Err(AvError::EmptyRing);
        }
        view.span(self.buffer_ptr, self.sample_count(), ElementKind::F32)?;
        view.read_u32(self.cursor_ptr)?;
        Ok(())
    }

    fn sample_count(&self) -> usize {
        self.capacity as usize * SAMPLES_PER_FRAME
    }

    /// Consume `left.len()` frames at the cursor.
    ///
    /// Each consumed slot is zeroed (the "played" marker) and the cursor is
    /// advanced modulo `capacity` and written back. Returns the new cursor.
    pub fn consume(
        &self,
        view: &mut MemoryView<'_>,
        left: &mut [f32],
        right: &mut [f32],
    ) -> Result<u32, AvError> {
        if self.capacity == 0 {
            return Err(AvError::EmptyRing);
        }
        let mut cursor = view.read_u32(self.cursor_ptr)? % self.capacity;

        let mut samples = view.span(self.buffer_ptr, self.sample_count(), ElementKind::F32)?;
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let at = cursor as usize * SAMPLES_PER_FRAME;
            *l = samples.get_f32(at);
            *r = samples.get_f32(at + 1);
            samples.fill_zero(at);
            samples.fill_zero(at + 1);

            cursor += 1;
            if cursor >= self.capacity {
                cursor = 0;
            }
        }

        view.write_u32(self.cursor_ptr, cursor)?;
        Ok(cursor)
    }
}

/// A registered pull stream: ring + output device + scratch buffers.
pub struct AudioStream {
    ring: RingBuffer,
    output: Box<dyn AudioOutput>,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl AudioStream {
    pub fn new(ring: RingBuffer, output: Box<dyn AudioOutput>, period_frames: usize) -> Self {
        Self {
            ring,
            output,
            left: vec![0.0; period_frames],
            right: vec![0.0; period_frames],
        }
    }

    pub fn ring(&self) -> RingBuffer {
        self.ring
    }

    pub fn period_frames(&self) -> usize {
        self.left.len()
    }

    pub fn resume(&mut self) {
        self.output.resume();
    }

    /// The pull callback: one period from the ring into the device.
    pub fn pump(&mut self, view: &mut MemoryView<'_>) -> Result<(), AvError> {
        self.ring.consume(view, &mut self.left, &mut self.right)?;
        self.output.write(&self.left, &self.right)?;
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), AvError> {
        self.output.close()?;
        Ok(())
    }
}

/// `pix_wasm_start_audio`: register the ring once, resume on every call.
pub fn start_audio(
    state: &mut HostState,
    view: &mut MemoryView<'_>,
    buffer_ptr: u32,
    capacity: u32,
    cursor_ptr: u32,
) -> Result<(), AvError> {
    if let Some(audio) = state.audio.as_mut() {
        audio.resume();
        return Ok(());
    }

    let ring = RingBuffer {
        buffer_ptr,
        capacity,
        cursor_ptr,
    };
    ring.validate(view)?;

    let mut output = state.platform.open_audio(&state.audio_config)?;
    output.resume();
    tracing::info!(
        buffer_ptr,
        capacity,
        cursor_ptr,
        sample_rate = state.audio_config.sample_rate,
        "audio started"
    );
    state.audio = Some(AudioStream::new(
        ring,
        output,
        state.audio_config.period_frames as usize,
    ));
    Ok(())
}
