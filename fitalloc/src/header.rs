//! In-band block metadata.
//!
//! Every block, live or free, is preceded by its header:
//!
//! ```text
//! ... | header | payload | header | payload | ...
//!     ^        ^
//!     header   payload = header + H::SIZE
//! ```
//!
//! `free` receives nothing but the payload address, so the header is always
//! recovered as `payload - H::SIZE`. Whether a block is free is decided by
//! membership in the owning free set, never by a flag in the header.
use core::ptr::NonNull;

use crate::mem::{ALIGN, PAGE_SIZE};

/// Metadata layout shared by the allocation strategies.
///
/// ## Safety
/// Implementors must be `#[repr(C)]`, and their size and alignment must be
/// multiples of [`ALIGN`] so that payloads stay aligned after a split.
pub(crate) unsafe trait Header: Sized {
    const SIZE: usize = core::mem::size_of::<Self>();

    /// A header of `size` payload bytes linked to nothing.
    fn detached(size: usize) -> Self;

    fn size(&self) -> usize;

    fn set_size(&mut self, size: usize);
}

/// Writes a detached header of `size` payload bytes at `at`.
///
/// ## Safety
/// `at..at + H::SIZE + size` must be writable memory owned by the heap.
#[inline]
pub(crate) unsafe fn format<H: Header>(at: NonNull<u8>, size: usize) -> NonNull<H> {
    debug_assert!(memory_addr::is_aligned(at.addr().get(), ALIGN));
    debug_assert!(memory_addr::is_aligned(size, ALIGN));
    let header = at.cast::<H>();
    unsafe { header.write(H::detached(size)) };
    header
}

/// Formats a freshly donated page as one block spanning the whole page.
///
/// ## Safety
/// `page` must be an unused extent of [`PAGE_SIZE`] bytes.
#[inline]
pub(crate) unsafe fn format_page<H: Header>(page: NonNull<u8>) -> NonNull<H> {
    unsafe { format(page, PAGE_SIZE - H::SIZE) }
}

#[inline]
pub(crate) unsafe fn payload<H: Header>(header: NonNull<H>) -> NonNull<u8> {
    unsafe { header.cast::<u8>().add(H::SIZE) }
}

#[inline]
pub(crate) unsafe fn from_payload<H: Header>(ptr: NonNull<u8>) -> NonNull<H> {
    unsafe { ptr.sub(H::SIZE).cast() }
}

/// Shrinks `block` to `size` payload bytes if the leftover can host another
/// header, and returns the leftover formatted as a detached block.
///
/// ```text
/// ... | header | size bytes | tail header | remaining - H::SIZE bytes | ...
/// ```
///
/// A leftover of at most `H::SIZE` bytes stays with the block.
///
/// ## Safety
/// `block` must be a valid header with `size <= block.size()`, and must not
/// be a member of any free set.
pub(crate) unsafe fn carve<H: Header>(mut block: NonNull<H>, size: usize) -> Option<NonNull<H>> {
    let header = unsafe { block.as_mut() };
    debug_assert!(header.size() >= size);
    let remaining = header.size() - size;
    if remaining <= H::SIZE {
        return None;
    }
    header.set_size(size);

    unsafe {
        let tail = payload(block).add(size);
        Some(format(tail, remaining - H::SIZE))
    }
}
