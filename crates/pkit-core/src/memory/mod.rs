//! Page allocator
//!
//! Hands out anonymous, page-aligned memory in multiples of the system
//! page size. Platform-specific implementations do the mapping.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::*;
    } else {
        compile_error!("pkit-core needs a unix page allocator");
    }
}

use crate::error::{KitError, KitResult};
use core::ptr::NonNull;
use std::sync::OnceLock;

/// Fallback when sysconf cannot report a page size
const DEFAULT_PAGE_SIZE: usize = 4096;

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

/// The system page size in bytes (cached after the first call)
#[inline]
pub fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(|| {
        match nix::unistd::sysconf(nix::unistd::SysconfVar::PAGE_SIZE) {
            Ok(Some(size)) if size > 0 => size as usize,
            _ => DEFAULT_PAGE_SIZE,
        }
    })
}

/// Round `size` up to a multiple of the page size
///
/// Fails with `NoMemory` when the rounded size does not fit in `usize`.
#[inline]
pub fn round_to_pages(size: usize) -> KitResult<usize> {
    let pgsize = page_size();
    let rounded = size.checked_add(pgsize - 1).ok_or(KitError::NoMemory)?;
    Ok(rounded & !(pgsize - 1))
}

/// A mapped run of whole pages
///
/// Not freed on drop; the owner returns it with [`free_pages`].
#[derive(Debug, PartialEq, Eq)]
pub struct PageBlock {
    addr: NonNull<u8>,
    size: usize,
}

impl PageBlock {
    #[inline]
    pub fn addr(&self) -> NonNull<u8> {
        self.addr
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// One past the last byte of the block
    #[inline]
    pub fn end(&self) -> *mut u8 {
        // Safety: size bytes starting at addr are mapped
        unsafe { self.addr.as_ptr().add(self.size) }
    }

    /// Rebuild a block from parts previously taken out of a `PageBlock`
    ///
    /// # Safety
    ///
    /// `addr`/`size` must describe a live mapping from [`alloc_pages`].
    #[inline]
    pub unsafe fn from_raw_parts(addr: NonNull<u8>, size: usize) -> Self {
        PageBlock { addr, size }
    }
}

// Safety: a PageBlock is plain memory ownership, no thread affinity
unsafe impl Send for PageBlock {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_power_of_two() {
        let pgsize = page_size();
        assert!(pgsize >= 4096);
        assert!(pgsize.is_power_of_two());
    }

    #[test]
    fn test_round_to_pages() {
        let pgsize = page_size();
        assert_eq!(round_to_pages(0).unwrap(), 0);
        assert_eq!(round_to_pages(1).unwrap(), pgsize);
        assert_eq!(round_to_pages(pgsize).unwrap(), pgsize);
        assert_eq!(round_to_pages(pgsize + 1).unwrap(), 2 * pgsize);
        assert_eq!(round_to_pages(usize::MAX), Err(KitError::NoMemory));
    }

    #[test]
    fn test_alloc_write_free() {
        let pgsize = page_size();
        let block = alloc_pages(pgsize + 10).unwrap();
        assert_eq!(block.size(), 2 * pgsize);
        assert_eq!(block.addr().as_ptr() as usize % pgsize, 0);

        unsafe {
            block.addr().as_ptr().write(0xA5);
            block.end().sub(1).write(0x5A);
            assert_eq!(*block.addr().as_ptr(), 0xA5);
        }
        free_pages(block).unwrap();
    }

    #[test]
    fn test_alloc_zero_is_invalid() {
        assert_eq!(alloc_pages(0), Err(KitError::Invalid));
    }
}
