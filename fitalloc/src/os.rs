#![cfg(feature = "std")]

#[cfg(all(unix, feature = "unix"))]
pub mod unix;

#[cfg(all(unix, feature = "unix"))]
pub use self::unix::MmapSource;
