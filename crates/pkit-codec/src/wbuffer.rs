//! Append-only byte sinks for the codecs
//!
//! Every encoder and decoder writes through [`WBuffer`]. A failed codec
//! call truncates the sink back to the size it had on entry.

use pkit_core::error::{KitError, KitResult};

/// Append-only output buffer
pub trait WBuffer {
    /// Bytes written so far
    fn size(&self) -> usize;

    /// Grow by `n` bytes and return the new tail for the caller to fill
    ///
    /// Fails with `NoMemory` and leaves the buffer unchanged when the space
    /// cannot be provided.
    fn reserve(&mut self, n: usize) -> KitResult<&mut [u8]>;

    /// Shrink to `size` bytes; no effect when already smaller
    fn truncate(&mut self, size: usize);

    /// Written bytes
    fn as_bytes(&self) -> &[u8];

    fn clear(&mut self) {
        self.truncate(0);
    }

    fn append_byte(&mut self, byte: u8) -> KitResult<()> {
        self.reserve(1)?[0] = byte;
        Ok(())
    }

    fn append(&mut self, data: &[u8]) -> KitResult<()> {
        self.reserve(data.len())?.copy_from_slice(data);
        Ok(())
    }
}

impl WBuffer for Vec<u8> {
    #[inline]
    fn size(&self) -> usize {
        self.len()
    }

    fn reserve(&mut self, n: usize) -> KitResult<&mut [u8]> {
        let start = self.len();
        let end = start.checked_add(n).ok_or(KitError::NoMemory)?;
        self.try_reserve(n).map_err(|_| KitError::NoMemory)?;
        self.resize(end, 0);
        Ok(&mut self[start..])
    }

    #[inline]
    fn truncate(&mut self, size: usize) {
        Vec::truncate(self, size);
    }

    #[inline]
    fn as_bytes(&self) -> &[u8] {
        self
    }
}

/// Fixed-capacity sink over a caller-provided slice
#[derive(Debug)]
pub struct StaticBuffer<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> StaticBuffer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        StaticBuffer { buf, len: 0 }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.len
    }
}

impl WBuffer for StaticBuffer<'_> {
    #[inline]
    fn size(&self) -> usize {
        self.len
    }

    fn reserve(&mut self, n: usize) -> KitResult<&mut [u8]> {
        if n > self.remaining() {
            return Err(KitError::NoMemory);
        }
        let start = self.len;
        self.len += n;
        Ok(&mut self.buf[start..self.len])
    }

    #[inline]
    fn truncate(&mut self, size: usize) {
        self.len = self.len.min(size);
    }

    #[inline]
    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

/// Run `f` against `wb`, truncating back to the entry size if it fails
pub(crate) fn rollback_on_err<W, T, F>(wb: &mut W, f: F) -> KitResult<T>
where
    W: WBuffer + ?Sized,
    F: FnOnce(&mut W) -> KitResult<T>,
{
    let start = wb.size();
    let res = f(wb);
    if res.is_err() {
        wb.truncate(start);
    }
    res
}
