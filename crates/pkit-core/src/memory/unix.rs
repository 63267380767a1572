//! Unix page allocator using mmap

use super::{round_to_pages, PageBlock};
use crate::error::{KitError, KitResult};
use crate::ktrace;
use core::ptr::NonNull;

/// Map at least `size` bytes of zeroed, read-write anonymous memory
///
/// The size is rounded up to whole pages. `size == 0` is `Invalid`,
/// a refused mapping is `NoMemory`.
pub fn alloc_pages(size: usize) -> KitResult<PageBlock> {
    if size == 0 {
        return Err(KitError::Invalid);
    }
    let size = round_to_pages(size)?;

    let addr = unsafe {
        libc::mmap(
            core::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };

    if addr == libc::MAP_FAILED {
        return Err(KitError::NoMemory);
    }

    ktrace!("alloc_pages: {:p} size={}", addr, size);
    // Safety: mmap succeeded, so addr is non-null
    let addr = unsafe { NonNull::new_unchecked(addr as *mut u8) };
    // Safety: addr/size describe the mapping just created
    Ok(unsafe { PageBlock::from_raw_parts(addr, size) })
}

/// Unmap a block returned by [`alloc_pages`]
pub fn free_pages(block: PageBlock) -> KitResult<()> {
    ktrace!("free_pages: {:p} size={}", block.addr().as_ptr(), block.size());
    let ret = unsafe { libc::munmap(block.addr().as_ptr() as *mut libc::c_void, block.size()) };
    if ret != 0 {
        return Err(KitError::last_os_error());
    }
    Ok(())
}
