use core::alloc::Layout;
use core::ptr::NonNull;

pub use alloc::alloc::handle_alloc_error;

use crate::seal::Sealed;

/// The extent size every page source hands out, and the unit of donation.
pub const PAGE_SIZE: usize = memory_addr::PAGE_SIZE_4K;
/// Alignment of every payload and every request size.
pub const ALIGN: usize = 8;
pub const MIN_REQUEST: usize = 8;
pub const MAX_REQUEST: usize = 4000;

pub(crate) const PAGE_LAYOUT: Layout = match Layout::from_size_align(PAGE_SIZE, PAGE_SIZE) {
    Ok(layout) => layout,
    Err(_) => panic!("page layout must be valid"),
};

/// Returns whether `size` is a request the allocators accept.
#[inline]
pub(crate) const fn is_request(size: usize) -> bool {
    size >= MIN_REQUEST && size <= MAX_REQUEST && memory_addr::is_aligned(size, ALIGN)
}

/// Failure of a [`PageSource`].
pub enum Error<E> {
    /// The extent address or size is not a non-zero multiple of [`PAGE_SIZE`].
    Unaligned { addr: usize, size: usize },
    /// A capped source would exceed its limit; `mapped` is what it holds.
    Exhausted { requested: usize, mapped: usize },
    /// The backing mapping call failed.
    MapError(E),
}

impl<E: core::fmt::Debug> core::error::Error for Error<E> {}

impl<E: core::fmt::Debug> core::fmt::Debug for Error<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Unaligned { addr, size } => write!(
                f,
                "Extent not page aligned, addr {:#x}, size {}",
                addr, size
            ),
            Self::Exhausted { requested, mapped } => write!(
                f,
                "Page source exhausted, requested {}, mapped {}",
                requested, mapped
            ),
            Self::MapError(err) => write!(f, "Mapping error: {:?}", err),
        }
    }
}

impl<E: core::fmt::Debug> core::fmt::Display for Error<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(self, f)
    }
}

/// Supplier of page-aligned extents.
///
/// The allocators only ever call [`allocate`](PageSource::allocate) with
/// [`PAGE_SIZE`]; [`release`](PageSource::release) exists for collaborators
/// that instrument or own the boundary.
pub trait PageSource {
    type Error: core::fmt::Debug;

    /// Maps a fresh extent of exactly `size` bytes.
    ///
    /// `size` must be a non-zero multiple of [`PAGE_SIZE`].
    fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, Self::Error>;

    /// Unmaps an extent previously returned by [`allocate`](PageSource::allocate).
    ///
    /// ## Safety
    /// - `ptr..ptr + size` must be an extent of this source.
    /// - No live reference may point into the extent.
    unsafe fn release(&mut self, ptr: NonNull<u8>, size: usize) -> Result<(), Self::Error>;
}

impl<P: PageSource> PageSource for &mut P {
    type Error = P::Error;

    #[inline]
    fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, Self::Error> {
        (**self).allocate(size)
    }

    #[inline]
    unsafe fn release(&mut self, ptr: NonNull<u8>, size: usize) -> Result<(), Self::Error> {
        unsafe { (**self).release(ptr, size) }
    }
}

/// Acquires one page for donation, aborting the process if the source fails.
pub(crate) fn acquire_page<P: PageSource>(source: &mut P) -> NonNull<u8> {
    match source.allocate(PAGE_SIZE) {
        Ok(page) => page,
        Err(_err) => {
            #[cfg(feature = "tracing")]
            tracing::error!("[Page]: source failed to map {} bytes: {:?}", PAGE_SIZE, _err);
            handle_alloc_error(PAGE_LAYOUT)
        }
    }
}

/// The `initialize / allocate / free / finalize` contract shared by every
/// strategy.
///
/// Requests must satisfy `MIN_REQUEST <= size <= MAX_REQUEST` and be a
/// multiple of [`ALIGN`]. This is only checked in debug builds.
pub trait FitAlloc: Sealed {
    /// Bytes of metadata placed immediately before every payload.
    const HEADER_SIZE: usize;

    type Source: PageSource;

    fn source(&self) -> &Self::Source;

    /// Resets the free set to its empty state.
    ///
    /// Pages donated before the reset are not returned to the source.
    fn initialize(&mut self);

    /// Returns an 8-byte aligned payload of at least `size` bytes.
    fn allocate(&mut self, size: usize) -> NonNull<u8>;

    /// Returns a payload to the free set.
    ///
    /// ## Safety
    /// `ptr` must come from [`allocate`](FitAlloc::allocate) on this heap
    /// since the last [`initialize`](FitAlloc::initialize), and must not have
    /// been freed already.
    unsafe fn free(&mut self, ptr: NonNull<u8>);

    fn finalize(&mut self);
}

pub trait HeapInfo {
    /// Bytes obtained from the page source so far.
    fn mapped(&self) -> usize;

    /// Visits the payload size of every block in the free set.
    fn for_each_free(&self, f: &mut dyn FnMut(usize));

    /// Payload bytes currently sitting in the free set.
    fn remained(&self) -> usize {
        let mut total = 0;
        self.for_each_free(&mut |size| total += size);
        total
    }

    fn free_blocks(&self) -> usize {
        let mut count = 0;
        self.for_each_free(&mut |_| count += 1);
        count
    }
}
