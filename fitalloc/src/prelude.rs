pub use crate::mem::{FitAlloc, HeapInfo, PageSource};
pub use crate::{BestFit, FirstFit};

#[cfg(all(unix, feature = "unix"))]
pub use crate::os::MmapSource;
