use core::ffi::c_void;
use core::num::NonZeroUsize;
use core::ptr::NonNull;

use nix::sys::mman::{self, MapFlags, ProtFlags};

use crate::mem::{Error, PAGE_SIZE, PageSource};

/// Page source backed by anonymous private `mmap` regions.
///
/// Extents are readable, writable and zero filled. A source built with
/// [`with_limit`](MmapSource::with_limit) refuses to hold more than its cap.
#[derive(Debug)]
pub struct MmapSource {
    mapped: usize,
    released: usize,
    limit: usize,
}

impl MmapSource {
    pub const fn new() -> Self {
        Self {
            mapped: 0,
            released: 0,
            limit: usize::MAX,
        }
    }

    /// Creates a source holding at most `pages` pages at a time.
    pub const fn with_limit(pages: usize) -> Self {
        Self {
            mapped: 0,
            released: 0,
            limit: pages.saturating_mul(PAGE_SIZE),
        }
    }

    /// Bytes currently mapped and not yet released.
    #[inline]
    pub fn held(&self) -> usize {
        self.mapped - self.released
    }

    /// Total bytes mapped so far.
    #[inline]
    pub fn mapped(&self) -> usize {
        self.mapped
    }

    /// Total bytes unmapped so far.
    #[inline]
    pub fn released(&self) -> usize {
        self.released
    }
}

fn extent(addr: usize, size: usize) -> Result<NonZeroUsize, Error<nix::Error>> {
    if !memory_addr::is_aligned_4k(addr) || !memory_addr::is_aligned_4k(size) {
        return Err(Error::Unaligned { addr, size });
    }
    NonZeroUsize::new(size).ok_or(Error::Unaligned { addr, size })
}

impl Default for MmapSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PageSource for MmapSource {
    type Error = Error<nix::Error>;

    fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, Self::Error> {
        let len = extent(0, size)?;
        if size > self.limit - self.held() {
            return Err(Error::Exhausted {
                requested: size,
                mapped: self.held(),
            });
        }
        let prot = ProtFlags::PROT_READ | ProtFlags::PROT_WRITE;
        let ptr = unsafe { mman::mmap_anonymous(None, len, prot, MapFlags::MAP_PRIVATE) }
            .map_err(Error::MapError)?;
        self.mapped += size;

        #[cfg(feature = "tracing")]
        tracing::trace!("[Mmap]: mapped {:p}, size {}", ptr, size);

        Ok(ptr.cast())
    }

    unsafe fn release(&mut self, ptr: NonNull<u8>, size: usize) -> Result<(), Self::Error> {
        extent(ptr.addr().get(), size)?;
        unsafe { mman::munmap(ptr.cast::<c_void>(), size) }.map_err(Error::MapError)?;
        self.released += size;

        #[cfg(feature = "tracing")]
        tracing::trace!("[Mmap]: unmapped {:p}, size {}", ptr, size);

        Ok(())
    }
}
