//! Typed window over guest linear memory.
//!
//! A `MemoryView` borrows the live bytes of the guest's exported `memory` for
//! the duration of one host call (or one audio pump). It must never outlive
//! that borrow: `memory.grow` in the guest may move the backing buffer, so
//! callers re-derive a view from the `wasmtime::Memory` handle every time.
//!
//! All multi-byte values are little-endian, matching wasm32.

use crate::error::MemoryError;
use std::borrow::Cow;

/// Element type of a typed span.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ElementKind {
    U8,
    U32,
    F32,
}

impl ElementKind {
    pub const fn size(self) -> usize {
        match self {
            ElementKind::U8 => 1,
            ElementKind::U32 | ElementKind::F32 => 4,
        }
    }
}

/// Borrowed view over guest memory bytes.
pub struct MemoryView<'a> {
    bytes: &'a mut [u8],
}

impl<'a> MemoryView<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }

    /// Current size of guest memory in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    fn range(&self, offset: u32, len: usize) -> Result<std::ops::Range<usize>, MemoryError> {
        let start = offset as usize;
        start
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .map(|end| start..end)
            .ok_or(MemoryError::OutOfBounds {
                offset,
                len,
                size: self.bytes.len(),
            })
    }

    pub fn bytes(&self, offset: u32, len: u32) -> Result<&[u8], MemoryError> {
        let r = self.range(offset, len as usize)?;
        Ok(&self.bytes[r])
    }

    pub fn bytes_mut(&mut self, offset: u32, len: u32) -> Result<&mut [u8], MemoryError> {
        let r = self.range(offset, len as usize)?;
        Ok(&mut self.bytes[r])
    }

    /// Decode `len` bytes as UTF-8, replacing invalid sequences.
    pub fn text(&self, offset: u32, len: u32) -> Result<Cow<'_, str>, MemoryError> {
        Ok(String::from_utf8_lossy(self.bytes(offset, len)?))
    }

    /// Bytes of a NUL-terminated string starting at `offset` (terminator excluded).
    pub fn c_str(&self, offset: u32) -> Result<&[u8], MemoryError> {
        let tail = self.bytes(offset, (self.bytes.len() as u32).saturating_sub(offset))?;
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or(MemoryError::Unterminated { offset })?;
        Ok(&tail[..end])
    }

    pub fn read_u32(&self, offset: u32) -> Result<u32, MemoryError> {
        let b = self.bytes(offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn write_u32(&mut self, offset: u32, value: u32) -> Result<(), MemoryError> {
        self.bytes_mut(offset, 4)?
            .copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Typed span of `count` elements of `kind` starting at `offset`.
    pub fn span(
        &mut self,
        offset: u32,
        count: usize,
        kind: ElementKind,
    ) -> Result<Span<'_>, MemoryError> {
        let len = count
            .checked_mul(kind.size())
            .ok_or(MemoryError::OutOfBounds {
                offset,
                len: usize::MAX,
                size: self.bytes.len(),
            })?;
        let r = self.range(offset, len)?;
        Ok(Span {
            bytes: &mut self.bytes[r],
            kind,
        })
    }
}

/// A typed, mutable span of guest memory.
///
/// Element access is by index; indices past `len()` panic like slice indexing.
pub struct Span<'a> {
    bytes: &'a mut [u8],
    kind: ElementKind,
}

impl Span<'_> {
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / self.kind.size()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn word(&self, index: usize) -> [u8; 4] {
        let at = index * 4;
        [
            self.bytes[at],
            self.bytes[at + 1],
            self.bytes[at + 2],
            self.bytes[at + 3],
        ]
    }

    pub fn get_u8(&self, index: usize) -> u8 {
        self.bytes[index]
    }

    pub fn get_u32(&self, index: usize) -> u32 {
        u32::from_le_bytes(self.word(index))
    }

    pub fn get_f32(&self, index: usize) -> f32 {
        f32::from_le_bytes(self.word(index))
    }

    pub fn set_u32(&mut self, index: usize, value: u32) {
        self.bytes[index * 4..index * 4 + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn set_f32(&mut self, index: usize, value: f32) {
        self.bytes[index * 4..index * 4 + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Zero one element.
    pub fn fill_zero(&mut self, index: usize) {
        let size = self.kind.size();
        self.bytes[index * size..(index + 1) * size].fill(0);
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }
}
