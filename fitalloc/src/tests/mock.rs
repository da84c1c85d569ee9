use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::ptr::NonNull;

use crate::mem::{Error, PAGE_SIZE, PageSource};

/// Page source over the global allocator, with an optional cap on the
/// number of mapped pages.
pub(crate) struct MockSource {
    extents: Vec<(NonNull<u8>, usize)>,
    limit: usize,
    mapped: usize,
}

impl MockSource {
    pub(crate) fn new() -> Self {
        Self::with_limit(usize::MAX / PAGE_SIZE)
    }

    pub(crate) fn with_limit(pages: usize) -> Self {
        Self {
            extents: Vec::new(),
            limit: pages * PAGE_SIZE,
            mapped: 0,
        }
    }

    /// Pages currently mapped.
    pub(crate) fn pages(&self) -> usize {
        self.mapped / PAGE_SIZE
    }
}

impl PageSource for MockSource {
    type Error = Error<()>;

    fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, Self::Error> {
        if size == 0 || !memory_addr::is_aligned_4k(size) {
            return Err(Error::Unaligned { addr: 0, size });
        }
        if size > self.limit - self.mapped {
            return Err(Error::Exhausted {
                requested: size,
                mapped: self.mapped,
            });
        }

        let layout = Layout::from_size_align(size, PAGE_SIZE).map_err(|_| Error::MapError(()))?;
        let ptr = NonNull::new(unsafe { alloc_zeroed(layout) }).ok_or(Error::MapError(()))?;
        self.extents.push((ptr, size));
        self.mapped += size;
        Ok(ptr)
    }

    unsafe fn release(&mut self, ptr: NonNull<u8>, size: usize) -> Result<(), Self::Error> {
        let addr = ptr.addr().get();
        if !memory_addr::is_aligned_4k(addr) || !memory_addr::is_aligned_4k(size) {
            return Err(Error::Unaligned { addr, size });
        }
        let at = self
            .extents
            .iter()
            .position(|&extent| extent == (ptr, size))
            .ok_or(Error::MapError(()))?;

        self.extents.swap_remove(at);
        self.mapped -= size;
        unsafe { dealloc(ptr.as_ptr(), Layout::from_size_align_unchecked(size, PAGE_SIZE)) };
        Ok(())
    }
}

impl Drop for MockSource {
    fn drop(&mut self) {
        for (ptr, size) in self.extents.drain(..) {
            unsafe { dealloc(ptr.as_ptr(), Layout::from_size_align_unchecked(size, PAGE_SIZE)) };
        }
    }
}

#[test]
fn rejects_partial_pages() {
    let mut source = MockSource::new();
    assert!(matches!(
        source.allocate(100),
        Err(Error::Unaligned { size: 100, .. })
    ));
    assert!(matches!(source.allocate(0), Err(Error::Unaligned { .. })));
    assert_eq!(source.pages(), 0);
}

#[test]
fn enforces_limit() {
    let mut source = MockSource::with_limit(2);
    let first = source.allocate(PAGE_SIZE).expect("should map");
    source.allocate(PAGE_SIZE).expect("should map");

    let err = source.allocate(PAGE_SIZE).unwrap_err();
    assert!(matches!(
        err,
        Error::Exhausted {
            requested: PAGE_SIZE,
            mapped
        } if mapped == 2 * PAGE_SIZE
    ));
    assert!(format!("{}", err).contains("exhausted"));

    unsafe { source.release(first, PAGE_SIZE).expect("should release") };
    assert_eq!(source.pages(), 1);
    source.allocate(PAGE_SIZE).expect("room after release");
}

#[test]
fn release_checks_extent() {
    let mut source = MockSource::new();
    let ptr = source.allocate(2 * PAGE_SIZE).expect("should map");
    assert!(memory_addr::is_aligned_4k(ptr.addr().get()));

    unsafe {
        let inner = ptr.add(8);
        assert!(matches!(
            source.release(inner, PAGE_SIZE),
            Err(Error::Unaligned { .. })
        ));
        // right address, wrong length
        assert!(matches!(
            source.release(ptr, PAGE_SIZE),
            Err(Error::MapError(()))
        ));
        source.release(ptr, 2 * PAGE_SIZE).expect("should release");
    }
    assert_eq!(source.pages(), 0);
}
