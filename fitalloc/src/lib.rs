#![cfg_attr(not(any(test, feature = "std")), no_std)]

//! Fixed-size heap managers carving 8..=4000 byte blocks out of 4 KiB pages.
//!
//! Two interchangeable strategies share the same in-band header convention:
//! [`FirstFit`] scans an unordered free list, [`BestFit`] searches a
//! height-balanced tree keyed by block size. Both implement [`FitAlloc`].

extern crate alloc;

#[cfg(feature = "tracing")]
extern crate tracing;

mod best_fit;
mod first_fit;
mod header;
mod mem;
pub mod os;
pub mod prelude;

pub use best_fit::{BestFit, FreeTree};
pub use first_fit::FirstFit;
pub use mem::{
    ALIGN, Error, FitAlloc, HeapInfo, MAX_REQUEST, MIN_REQUEST, PAGE_SIZE, PageSource,
};

mod seal {
    pub trait Sealed {}
}
