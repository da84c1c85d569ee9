#![cfg(all(unix, feature = "unix"))]

use crate::mem::{Error, FitAlloc, HeapInfo, PAGE_SIZE, PageSource};
use crate::os::MmapSource;
use crate::tests::{Workload, tracing_init};
use crate::{BestFit, FirstFit};

#[test]
fn mmap_zeroed_pages() {
    let mut source = MmapSource::new();
    let ptr = source.allocate(2 * PAGE_SIZE).expect("should map");
    assert!(memory_addr::is_aligned_4k(ptr.addr().get()));
    assert_eq!(source.mapped(), 2 * PAGE_SIZE);

    unsafe {
        let bytes = core::slice::from_raw_parts_mut(ptr.as_ptr(), 2 * PAGE_SIZE);
        assert!(bytes.iter().all(|&b| b == 0));
        bytes.fill(0xa5);
        assert!(bytes.iter().all(|&b| b == 0xa5));

        source.release(ptr, 2 * PAGE_SIZE).expect("should unmap");
    }
    assert_eq!(source.released(), 2 * PAGE_SIZE);
}

#[test]
fn mmap_rejects_unaligned() {
    let mut source = MmapSource::new();
    assert!(matches!(
        source.allocate(PAGE_SIZE + 8),
        Err(Error::Unaligned { .. })
    ));
    assert!(matches!(source.allocate(0), Err(Error::Unaligned { .. })));

    let ptr = source.allocate(PAGE_SIZE).expect("should map");
    unsafe {
        assert!(matches!(
            source.release(ptr.add(8), PAGE_SIZE),
            Err(Error::Unaligned { .. })
        ));
        source.release(ptr, PAGE_SIZE).expect("should unmap");
    }
    assert_eq!(source.mapped(), PAGE_SIZE);
}

#[test]
fn first_fit_on_mmap() {
    tracing_init();

    let mut source = MmapSource::new();
    {
        let mut heap = FirstFit::new(&mut source);
        let mut work = Workload::new(5);
        for _ in 0..2000 {
            work.step(&mut heap);
        }
        work.drain(&mut heap);
        assert_eq!(heap.mapped(), heap.source().mapped());
        tracing::debug!("first fit over mmap: {:?}", heap);
        heap.finalize();
    }
    assert!(source.mapped() >= PAGE_SIZE);
    assert_eq!(source.released(), 0);
}

#[test]
fn best_fit_on_mmap() {
    let mut heap = BestFit::new(MmapSource::new());
    let mut work = Workload::new(6);
    for _ in 0..2000 {
        work.step(&mut heap);
    }
    work.drain(&mut heap);
    assert_eq!(heap.mapped(), heap.source().mapped());
    assert_eq!(heap.free_tree().len(), heap.free_blocks());
    tracing::debug!("best fit over mmap: {:?}", heap);
    heap.finalize();
}

#[test]
fn mmap_limit_exhausts() {
    let mut source = MmapSource::with_limit(2);
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
    assert_eq!(source.mapped(), 2 * PAGE_SIZE);

    unsafe { source.release(first, PAGE_SIZE).expect("should unmap") };
    assert_eq!(source.held(), PAGE_SIZE);
    source.allocate(PAGE_SIZE).expect("room after release");
    assert_eq!(source.held(), 2 * PAGE_SIZE);
}
