use std::cell::RefCell;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::rc::Rc;
use std::time::Duration;

use fitalloc::PageSource;

/// Figures of one challenge run.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub elapsed: Duration,
    pub mapped: usize,
    pub unmapped: usize,
    pub allocated: usize,
    pub freed: usize,
}

impl Stats {
    /// Share of the mapped bytes held by live objects, in percent.
    pub fn utilization(&self) -> f64 {
        let held = self.mapped - self.unmapped;
        if held == 0 {
            return 0.0;
        }
        100.0 * (self.allocated - self.freed) as f64 / held as f64
    }
}

/// Line oriented operation log, one `<op> <addr> <size>` record per line.
///
/// The first write error is kept and reported by [`flush`](Trace::flush);
/// records after it are dropped.
pub struct Trace {
    path: PathBuf,
    out: BufWriter<File>,
    error: Option<io::Error>,
}

pub type SharedTrace = Rc<RefCell<Trace>>;

impl Trace {
    pub fn create(dir: &Path, challenge: usize, strategy: &str) -> io::Result<SharedTrace> {
        let path = dir.join(format!("trace{}_{}.txt", challenge, strategy));
        let file = File::create(&path)?;
        Ok(Rc::new(RefCell::new(Self::with_file(path, file))))
    }

    fn with_file(path: PathBuf, file: File) -> Self {
        Self {
            path,
            out: BufWriter::new(file),
            error: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&mut self, op: char, ptr: NonNull<u8>, size: usize) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = writeln!(self.out, "{} {} {}", op, ptr.addr(), size) {
            #[cfg(feature = "tracing")]
            tracing::error!("[Trace]: failed to write {}: {}", self.path.display(), err);
            self.error = Some(err);
        }
    }

    /// Flushes buffered records, or returns the first write error.
    pub fn flush(&mut self) -> io::Result<()> {
        match self.error.take() {
            Some(err) => Err(err),
            None => self.out.flush(),
        }
    }
}

/// Page source wrapper counting mapped and unmapped bytes.
///
/// Every extent still held is handed back to the inner source on drop,
/// without being counted or traced.
pub struct Metered<P: PageSource> {
    inner: P,
    extents: Vec<(NonNull<u8>, usize)>,
    mapped: usize,
    unmapped: usize,
    trace: Option<SharedTrace>,
}

impl<P: PageSource> Metered<P> {
    pub fn new(inner: P, trace: Option<SharedTrace>) -> Self {
        Self {
            inner,
            extents: Vec::new(),
            mapped: 0,
            unmapped: 0,
            trace,
        }
    }

    pub fn mapped(&self) -> usize {
        self.mapped
    }

    pub fn unmapped(&self) -> usize {
        self.unmapped
    }
}

impl<P: PageSource> PageSource for Metered<P> {
    type Error = P::Error;

    fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, Self::Error> {
        let ptr = self.inner.allocate(size)?;
        self.extents.push((ptr, size));
        self.mapped += size;
        if let Some(trace) = &self.trace {
            trace.borrow_mut().record('m', ptr, size);
        }
        Ok(ptr)
    }

    unsafe fn release(&mut self, ptr: NonNull<u8>, size: usize) -> Result<(), Self::Error> {
        unsafe { self.inner.release(ptr, size)? };
        self.extents.retain(|&extent| extent != (ptr, size));
        self.unmapped += size;
        if let Some(trace) = &self.trace {
            trace.borrow_mut().record('u', ptr, size);
        }
        Ok(())
    }
}

impl<P: PageSource> Drop for Metered<P> {
    fn drop(&mut self) {
        for (ptr, size) in self.extents.drain(..) {
            // The owning heap is gone, nothing points into the extent.
            if let Err(_err) = unsafe { self.inner.release(ptr, size) } {
                #[cfg(feature = "tracing")]
                tracing::warn!("[Metered]: failed to release {:p}: {:?}", ptr, _err);
            }
        }
    }
}
