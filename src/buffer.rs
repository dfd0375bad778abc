//! Owned PCM buffers that cross the C boundary.
//!
//! A buffer is allocated here and released here. The sample count lives in a
//! hidden header just before the first sample, so a C caller only has to hand
//! the data pointer back to [`PcmBuffer::from_raw`]. Zero-length buffers are
//! never allocated; empty audio is represented by a null pointer.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::error::BridgeError;

/// Heap block holding `[len: usize][samples: i16; len]`.
pub struct PcmBuffer {
    base: NonNull<u8>,
    len: usize,
}

// The block is uniquely owned and holds plain integers.
unsafe impl Send for PcmBuffer {}

impl PcmBuffer {
    /// Copy `samples` into a newly allocated buffer.
    ///
    /// Returns `Ok(None)` for empty input.
    pub fn from_samples(samples: &[i16]) -> Result<Option<Self>, BridgeError> {
        if samples.is_empty() {
            return Ok(None);
        }

        let (layout, offset) = block_layout(samples.len())?;
        // SAFETY: layout has non-zero size (header plus at least one sample).
        let raw = unsafe { alloc::alloc(layout) };
        let Some(base) = NonNull::new(raw) else {
            return Err(BridgeError::Allocation(format!(
                "failed to allocate {} bytes",
                layout.size()
            )));
        };

        // SAFETY: base is aligned for usize and the block is large enough for
        // the header followed by `samples.len()` i16 values at `offset`.
        unsafe {
            base.as_ptr().cast::<usize>().write(samples.len());
            let data = base.as_ptr().add(offset).cast::<i16>();
            std::ptr::copy_nonoverlapping(samples.as_ptr(), data, samples.len());
        }

        Ok(Some(Self {
            base,
            len: samples.len(),
        }))
    }

    pub fn as_slice(&self) -> &[i16] {
        // SAFETY: the data region was initialized in from_samples and lives as
        // long as self.
        unsafe { std::slice::from_raw_parts(self.data_ptr(), self.len) }
    }

    /// Give up ownership, returning the sample pointer and its length.
    ///
    /// The pointer must eventually be passed to [`PcmBuffer::from_raw`] and
    /// dropped exactly once.
    pub fn into_raw(self) -> (*mut i16, usize) {
        let parts = (self.data_ptr(), self.len);
        std::mem::forget(self);
        parts
    }

    /// Reclaim a buffer previously released by [`PcmBuffer::into_raw`].
    ///
    /// Returns `None` for a null pointer.
    ///
    /// # Safety
    ///
    /// `data` must be null or a pointer obtained from `into_raw` that has not
    /// been reclaimed yet.
    pub unsafe fn from_raw(data: *mut i16) -> Option<Self> {
        let data = NonNull::new(data)?;
        let offset = data_offset();
        // SAFETY: caller guarantees `data` sits `offset` bytes past a block base.
        let base = unsafe { NonNull::new_unchecked(data.as_ptr().cast::<u8>().sub(offset)) };
        let len = unsafe { base.as_ptr().cast::<usize>().read() };
        Some(Self { base, len })
    }

    fn data_ptr(&self) -> *mut i16 {
        // SAFETY: offset is within the allocated block.
        unsafe { self.base.as_ptr().add(data_offset()).cast::<i16>() }
    }
}

impl Drop for PcmBuffer {
    fn drop(&mut self) {
        // The layout was valid when the block was allocated, so it still is.
        if let Ok((layout, _)) = block_layout(self.len) {
            // SAFETY: base was allocated by alloc::alloc with this layout.
            unsafe { alloc::dealloc(self.base.as_ptr(), layout) };
        }
    }
}

impl std::fmt::Debug for PcmBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcmBuffer").field("len", &self.len).finish()
    }
}

fn block_layout(len: usize) -> Result<(Layout, usize), BridgeError> {
    let samples = Layout::array::<i16>(len).map_err(|e| BridgeError::Allocation(e.to_string()))?;
    let (layout, offset) = Layout::new::<usize>()
        .extend(samples)
        .map_err(|e| BridgeError::Allocation(e.to_string()))?;
    Ok((layout.pad_to_align(), offset))
}

fn data_offset() -> usize {
    // i16 alignment never exceeds usize alignment, so the samples start right
    // after the header.
    std::mem::size_of::<usize>()
}
