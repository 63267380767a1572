//! Binary stack: a page-backed LIFO arena
//!
//! Bytes are pushed from high to low addresses inside the current block.
//! When a push does not fit, a new block of whole pages becomes current and
//! links back to the previous one; pointers handed out earlier stay valid
//! because blocks never move. A single freed block is kept in a cache slot
//! so a push/pop pair oscillating across a block boundary does not hit the
//! page allocator every time.
//!
//! Block layout (`size` bytes, page aligned):
//!
//! ```text
//! +-------------+------------------------------+
//! | BlockHeader |   free   |  pushed objects   |
//! +-------------+------------------------------+
//! base          ^ data     ^ top               ^ base + size (page aligned)
//! ```
//!
//! The end of every block is page aligned and objects are laid down from the
//! end, so if every pushed size is a multiple of N every returned address is
//! N-aligned.
//!
//! A block's `usedsize` is frozen the moment a newer block becomes current.

use crate::error::{FirstError, KitError, KitResult};
use crate::memory::{alloc_pages, free_pages, PageBlock};
use crate::{ktrace, kwarn};
use core::mem::size_of;
use core::ptr::NonNull;

#[repr(C)]
struct BlockHeader {
    /// Next older block
    prev: Option<NonNull<BlockHeader>>,
    /// Total block size including this header
    size: usize,
    /// Bytes in use, valid only while a newer block is current
    usedsize: usize,
}

/// Header size rounded up to 16 bytes
const HEADER_SIZE: usize = (size_of::<BlockHeader>() + 15) & !15;

/// A variable-size LIFO arena returning stable pointers
pub struct BinStack {
    /// Current (newest) block
    block: NonNull<BlockHeader>,
    /// Free bytes left in the current block
    freesize: usize,
    /// Most recently released block, reused by the next overflowing push
    cache: Option<PageBlock>,
}

// Safety: the stack exclusively owns its blocks
unsafe impl Send for BinStack {}

impl BinStack {
    /// Create a stack whose first block holds at least `preallocate` bytes
    pub fn new(preallocate: usize) -> KitResult<Self> {
        let needed = preallocate.checked_add(HEADER_SIZE).ok_or(KitError::NoMemory)?;
        let block = alloc_pages(needed)?;
        let freesize = block.size() - HEADER_SIZE;
        let header = Self::install(block, None);

        Ok(BinStack {
            block: header,
            freesize,
            cache: None,
        })
    }

    /// Write a fresh header at the start of `block`
    fn install(block: PageBlock, prev: Option<NonNull<BlockHeader>>) -> NonNull<BlockHeader> {
        let header = block.addr().cast::<BlockHeader>();
        // Safety: the block is mapped, page aligned and larger than a header
        unsafe {
            header.as_ptr().write(BlockHeader {
                prev,
                size: block.size(),
                usedsize: 0,
            });
        }
        header
    }

    #[inline]
    fn header(&self) -> &BlockHeader {
        // Safety: the current block stays mapped while the stack lives
        unsafe { self.block.as_ref() }
    }

    #[inline]
    fn used_in_current(&self) -> usize {
        self.header().size - HEADER_SIZE - self.freesize
    }

    /// Reserve `size` bytes on top and return their (lowest) address
    ///
    /// The memory stays valid until the matching `pop`, whatever is pushed
    /// in between. Fails with `NoMemory` and leaves the stack unchanged if a
    /// new block cannot be mapped.
    #[inline]
    pub fn push(&mut self, size: usize) -> KitResult<NonNull<u8>> {
        if size > self.freesize {
            self.push_block(size)?;
        } else {
            self.freesize -= size;
        }
        Ok(self.top())
    }

    /// Make a block with room for `size` bytes current and reserve them
    fn push_block(&mut self, size: usize) -> KitResult<()> {
        let needed = size.checked_add(HEADER_SIZE).ok_or(KitError::NoMemory)?;

        let block = match self.cache.take() {
            Some(cached) if cached.size() >= needed => cached,
            other => {
                self.cache = other;
                alloc_pages(needed)?
            }
        };
        ktrace!("binstack: new block {:p} size={}", block.addr().as_ptr(), block.size());

        let used = self.used_in_current();
        // Safety: current header is mapped and exclusively ours
        unsafe { self.block.as_mut().usedsize = used };

        let blocksize = block.size();
        self.block = Self::install(block, Some(self.block));
        self.freesize = blocksize - HEADER_SIZE - size;
        Ok(())
    }

    /// Remove the top `size` bytes, crossing block boundaries as needed
    ///
    /// `size` larger than [`size`](Self::size) fails with `Invalid` and
    /// changes nothing. Blocks emptied by the pop are released; a release
    /// failure is reported but the pop itself is already complete.
    pub fn pop(&mut self, size: usize) -> KitResult<()> {
        self.check_pop(size)?;

        let mut first = FirstError::new();
        let mut remaining = size;
        loop {
            let used = self.used_in_current();
            let prev = self.header().prev;
            match prev {
                Some(prev) if remaining >= used => {
                    remaining -= used;
                    let emptied = self.block;
                    self.block = prev;
                    // Safety: prev is a live older block
                    let prev = unsafe { prev.as_ref() };
                    self.freesize = prev.size - HEADER_SIZE - prev.usedsize;
                    first.check(self.release_block(emptied));
                }
                _ => {
                    self.freesize += remaining;
                    break;
                }
            }
        }
        first.into_result()
    }

    /// Fail unless `size` live bytes exist
    fn check_pop(&self, size: usize) -> KitResult<()> {
        let mut remaining = size;
        let mut used = self.used_in_current();
        let mut block = self.header();
        while remaining > used {
            remaining -= used;
            match block.prev {
                // Safety: older blocks stay mapped while linked
                Some(prev) => block = unsafe { prev.as_ref() },
                None => return Err(KitError::Invalid),
            }
            used = block.usedsize;
        }
        Ok(())
    }

    /// Move an emptied block into the cache slot, unmapping the old occupant
    fn release_block(&mut self, block: NonNull<BlockHeader>) -> KitResult<()> {
        // Safety: the header still describes the block's own mapping
        let block = unsafe {
            let size = block.as_ref().size;
            PageBlock::from_raw_parts(block.cast::<u8>(), size)
        };
        ktrace!("binstack: release block {:p} size={}", block.addr().as_ptr(), block.size());

        match self.cache.replace(block) {
            Some(old) => free_pages(old),
            None => Ok(()),
        }
    }

    /// Address of the most recently pushed byte
    ///
    /// Valid even when empty: it then points at the unused end of the
    /// current block.
    #[inline]
    pub fn top(&self) -> NonNull<u8> {
        // Safety: HEADER_SIZE + freesize never exceeds the block size
        unsafe { NonNull::new_unchecked(self.block.cast::<u8>().as_ptr().add(HEADER_SIZE + self.freesize)) }
    }

    /// Total live bytes across all blocks
    pub fn size(&self) -> usize {
        let mut total = self.used_in_current();
        let mut prev = self.header().prev;
        while let Some(block) = prev {
            // Safety: linked blocks stay mapped
            let block = unsafe { block.as_ref() };
            total += block.usedsize;
            prev = block.prev;
        }
        total
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.header().prev.is_none() && self.used_in_current() == 0
    }

    /// Release every block, including the cached one
    ///
    /// Continues past unmap failures and returns the first.
    pub fn free(mut self) -> KitResult<()> {
        let result = self.release_all();
        core::mem::forget(self);
        result
    }

    fn release_all(&mut self) -> KitResult<()> {
        let mut first = FirstError::new();
        if let Some(cached) = self.cache.take() {
            first.check(free_pages(cached));
        }

        let mut next = Some(self.block);
        while let Some(block) = next {
            // Safety: read the header before the mapping goes away
            let (prev, size) = unsafe { (block.as_ref().prev, block.as_ref().size) };
            let block = unsafe { PageBlock::from_raw_parts(block.cast::<u8>(), size) };
            first.check(free_pages(block));
            next = prev;
        }
        first.into_result()
    }
}

impl Drop for BinStack {
    fn drop(&mut self) {
        if let Err(e) = self.release_all() {
            kwarn!("binstack: releasing blocks failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::page_size;

    #[test]
    fn test_empty_stack() {
        let stack = BinStack::new(0).unwrap();
        assert!(stack.is_empty());
        assert_eq!(stack.size(), 0);
        // Empty top sits at the page aligned end of the first block
        assert_eq!(stack.top().as_ptr() as usize % page_size(), 0);
        stack.free().unwrap();
    }

    #[test]
    fn test_alignment_follows_push_size() {
        let mut stack = BinStack::new(0).unwrap();

        let p = stack.push(8).unwrap();
        assert_eq!(p.as_ptr() as usize % 8, 0);
        assert_eq!(p, stack.top());
        assert_eq!((p.as_ptr() as usize + 8) % page_size(), 0);
        stack.pop(8).unwrap();

        let p = stack.push(16).unwrap();
        assert_eq!(p.as_ptr() as usize % 16, 0);
        let q = stack.push(16).unwrap();
        assert_eq!(q.as_ptr() as usize % 16, 0);
        assert_eq!(q.as_ptr() as usize + 16, p.as_ptr() as usize);
    }

    #[test]
    fn test_page_pushes_cross_blocks() {
        let pgsize = page_size();
        let mut stack = BinStack::new(0).unwrap();
        let before = stack.push(16).unwrap();

        let mut ptrs = Vec::new();
        for i in 0..20u8 {
            let p = stack.push(pgsize).unwrap();
            unsafe { core::ptr::write_bytes(p.as_ptr(), i, pgsize) };
            ptrs.push(p);
        }
        assert_eq!(stack.size(), 16 + 20 * pgsize);

        // Every page push lands in its own block, nothing moved
        for (i, p) in ptrs.iter().enumerate() {
            let bytes = unsafe { core::slice::from_raw_parts(p.as_ptr(), pgsize) };
            assert!(bytes.iter().all(|&b| b == i as u8));
        }

        for _ in 0..20 {
            stack.pop(pgsize).unwrap();
        }
        assert_eq!(stack.top(), before);
        assert_eq!(stack.size(), 16);
    }

    #[test]
    fn test_pointer_stability_and_size_identity() {
        let mut stack = BinStack::new(100).unwrap();
        let mut pushed = Vec::new();
        let mut total = 0usize;

        for i in 0..500usize {
            let size = 1 + (i * 37) % 300;
            let p = stack.push(size).unwrap();
            unsafe { core::ptr::write_bytes(p.as_ptr(), (i % 251) as u8, size) };
            pushed.push((p, size, (i % 251) as u8));
            total += size;
            assert_eq!(stack.size(), total);
        }

        for &(p, size, fill) in &pushed {
            let bytes = unsafe { core::slice::from_raw_parts(p.as_ptr(), size) };
            assert!(bytes.iter().all(|&b| b == fill));
        }

        while let Some((p, size, _)) = pushed.pop() {
            assert_eq!(stack.top(), p);
            stack.pop(size).unwrap();
            total -= size;
            assert_eq!(stack.size(), total);
        }
        assert!(stack.is_empty());
    }

    #[test]
    fn test_pop_across_several_blocks_at_once() {
        let pgsize = page_size();
        let mut stack = BinStack::new(0).unwrap();
        let base = stack.top();
        for _ in 0..5 {
            stack.push(pgsize).unwrap();
        }
        stack.push(24).unwrap();

        stack.pop(24 + 5 * pgsize).unwrap();
        assert!(stack.is_empty());
        assert_eq!(stack.top(), base);
    }

    #[test]
    fn test_oversize_pop_changes_nothing() {
        let pgsize = page_size();
        let mut stack = BinStack::new(0).unwrap();
        stack.push(pgsize).unwrap();
        let top = stack.push(pgsize).unwrap();

        assert_eq!(stack.pop(2 * pgsize + 1), Err(KitError::Invalid));
        assert_eq!(stack.size(), 2 * pgsize);
        assert_eq!(stack.top(), top);

        let mut empty = BinStack::new(0).unwrap();
        assert_eq!(empty.pop(1), Err(KitError::Invalid));
        assert!(empty.pop(0).is_ok());
    }

    #[test]
    fn test_cached_block_is_reused() {
        let pgsize = page_size();
        let mut stack = BinStack::new(0).unwrap();
        let fill = stack.freesize;
        stack.push(fill).unwrap();

        let first = stack.push(pgsize).unwrap();
        stack.pop(pgsize).unwrap();
        assert!(stack.cache.is_some());

        // Oscillating across the boundary lands in the same cached block
        let second = stack.push(pgsize).unwrap();
        assert_eq!(first, second);
        assert!(stack.cache.is_none());
    }

    #[test]
    fn test_push_larger_than_cache_allocates() {
        let pgsize = page_size();
        let mut stack = BinStack::new(0).unwrap();
        let fill = stack.freesize;
        stack.push(fill).unwrap();

        stack.push(8).unwrap();
        stack.pop(8).unwrap();
        let cached = stack.cache.as_ref().map(|b| b.size()).unwrap();

        let big = stack.push(4 * pgsize).unwrap();
        assert_eq!(big.as_ptr() as usize % 8, 0);
        // The small cached block stays cached
        assert_eq!(stack.cache.as_ref().map(|b| b.size()), Some(cached));
        assert_eq!(stack.size(), fill + 4 * pgsize);
    }
}
