use std::path::PathBuf;
use std::ptr::NonNull;
use std::time::Instant;

use fitalloc::os::MmapSource;
use fitalloc::{ALIGN, BestFit, FirstFit, FitAlloc};
use hdrhistogram::Histogram;

use crate::stats::{Metered, SharedTrace, Stats};

const LAMBDA: f64 = 1.0;
const THRESHOLD: f64 = 6.0;
const CYCLES: usize = 10;
/// Probability that an object is never freed.
const LEAK: f64 = 0.04;

/// Epoch layout of a challenge run.
#[derive(Debug, Clone, Copy)]
pub struct Shape {
    pub epochs: usize,
    /// Objects allocated in every epoch but the first of a cycle.
    pub small: usize,
    /// Objects allocated in the first epoch of a cycle.
    pub large: usize,
}

impl Shape {
    pub const NORMAL: Self = Self {
        epochs: 100,
        small: 100,
        large: 2000,
    };

    /// Reduced shape used while traces are written.
    pub const TRACE: Self = Self {
        epochs: 10,
        small: 25,
        large: 50,
    };
}

#[derive(Debug, Clone, Copy)]
pub struct Challenge {
    pub index: usize,
    pub min: usize,
    pub max: usize,
}

pub const WARM_UP: Challenge = Challenge {
    index: 0,
    min: 128,
    max: 128,
};

pub const CHALLENGES: [Challenge; 5] = [
    Challenge {
        index: 1,
        min: 128,
        max: 128,
    },
    Challenge {
        index: 2,
        min: 16,
        max: 16,
    },
    Challenge {
        index: 3,
        min: 16,
        max: 128,
    },
    Challenge {
        index: 4,
        min: 256,
        max: 4000,
    },
    Challenge {
        index: 5,
        min: 8,
        max: 4000,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    FirstFit,
    BestFit,
}

impl Strategy {
    pub const ALL: [Self; 2] = [Self::FirstFit, Self::BestFit];

    pub fn name(self) -> &'static str {
        match self {
            Self::FirstFit => "first_fit",
            Self::BestFit => "best_fit",
        }
    }

    pub fn run(
        self,
        challenge: Challenge,
        shape: Shape,
        rng: &mut fastrand::Rng,
        trace: Option<SharedTrace>,
        latency: Option<&mut Histogram<u64>>,
    ) -> Stats {
        let source = Metered::new(MmapSource::new(), trace.clone());
        let mut run = Run {
            challenge,
            shape,
            rng,
            trace,
            latency,
        };
        match self {
            Self::FirstFit => run.drive(FirstFit::new(source)),
            Self::BestFit => run.drive(BestFit::new(source)),
        }
    }
}

/// Environment driven harness settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub trace_dir: Option<PathBuf>,
    pub seed: u64,
}

impl Config {
    pub const DEFAULT_SEED: u64 = 12;

    /// Reads `FITALLOC_TRACE` and `FITALLOC_SEED`.
    pub fn from_env() -> Self {
        let trace_dir = std::env::var_os("FITALLOC_TRACE").map(PathBuf::from);
        let seed = std::env::var("FITALLOC_SEED")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Self::DEFAULT_SEED);
        Self { trace_dir, seed }
    }

    pub fn shape(&self) -> Shape {
        if self.trace_dir.is_some() {
            Shape::TRACE
        } else {
            Shape::NORMAL
        }
    }
}

/// Truncated exponential sample in `[0, 1]`.
fn exponential(rng: &mut fastrand::Rng) -> f64 {
    // 1 - [0, 1) keeps ln away from zero
    let tau = -LAMBDA * (1.0 - rng.f64()).ln();
    tau.min(THRESHOLD) / THRESHOLD
}

/// Object size in `[min, max]`, rounded down to [`ALIGN`].
pub fn object_size(rng: &mut fastrand::Rng, min: usize, max: usize) -> usize {
    debug_assert!(min <= max && min % ALIGN == 0);
    let size = ((max - min) as f64 * exponential(rng)) as usize + min;
    size / ALIGN * ALIGN
}

/// Object lifetime in `[min, max]` epochs.
pub fn object_lifetime(rng: &mut fastrand::Rng, min: usize, max: usize) -> usize {
    ((max - min) as f64 * exponential(rng)) as usize + min
}

struct Object {
    ptr: NonNull<u8>,
    size: usize,
    tag: u8,
}

struct Run<'a> {
    challenge: Challenge,
    shape: Shape,
    rng: &'a mut fastrand::Rng,
    trace: Option<SharedTrace>,
    latency: Option<&'a mut Histogram<u64>>,
}

impl Run<'_> {
    fn drive<A>(&mut self, mut heap: A) -> Stats
    where
        A: FitAlloc<Source = Metered<MmapSource>>,
    {
        let Shape {
            epochs,
            small,
            large,
        } = self.shape;
        // the last slot holds objects that are never freed
        let mut objects: Vec<Vec<Object>> = (0..=epochs).map(|_| Vec::new()).collect();
        let mut stats = Stats::default();
        let mut tag = 0u8;

        let begin = Instant::now();
        for _cycle in 0..CYCLES {
            for epoch in 0..epochs {
                let count = if epoch == 0 { large } else { small };
                for _ in 0..count {
                    let size = object_size(self.rng, self.challenge.min, self.challenge.max);
                    let lifetime = object_lifetime(self.rng, 1, epochs);
                    stats.allocated += size;

                    let ptr = self.allocate(&mut heap, size);
                    self.record('a', ptr, size);
                    unsafe { ptr.write_bytes(tag, size) };
                    let object = Object { ptr, size, tag };

                    // zero is what fresh pages hold
                    tag = tag.wrapping_add(1).max(1);

                    let slot = if self.rng.f64() < LEAK {
                        epochs
                    } else {
                        (epoch + lifetime) % epochs
                    };
                    objects[slot].push(object);
                }

                for Object { ptr, size, tag: expected } in objects[epoch].drain(..) {
                    stats.freed += size;
                    let (first, last) = unsafe { (ptr.read(), ptr.add(size - 1).read()) };
                    assert!(
                        first == expected && last == expected,
                        "object {:p} of {} bytes lost its tag {}",
                        ptr,
                        size,
                        expected
                    );
                    self.record('f', ptr, size);
                    unsafe { heap.free(ptr) };
                }
            }
        }
        stats.elapsed = begin.elapsed();

        heap.finalize();
        stats.mapped = heap.source().mapped();
        stats.unmapped = heap.source().unmapped();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "[Run]: challenge {}, elapsed {:?}, mapped {}",
            self.challenge.index,
            stats.elapsed,
            stats.mapped
        );

        stats
    }

    #[inline]
    fn allocate<A: FitAlloc>(&mut self, heap: &mut A, size: usize) -> NonNull<u8> {
        match self.latency.as_deref_mut() {
            Some(hist) => {
                let begin = Instant::now();
                let ptr = heap.allocate(size);
                hist.saturating_record(begin.elapsed().as_nanos() as u64);
                ptr
            }
            None => heap.allocate(size),
        }
    }

    #[inline]
    fn record(&self, op: char, ptr: NonNull<u8>, size: usize) {
        if let Some(trace) = &self.trace {
            trace.borrow_mut().record(op, ptr, size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_within_bounds() {
        let mut rng = fastrand::Rng::with_seed(Config::DEFAULT_SEED);
        for Challenge { min, max, .. } in CHALLENGES {
            for _ in 0..10000 {
                let size = object_size(&mut rng, min, max);
                assert!((min..=max).contains(&size));
                assert_eq!(size % ALIGN, 0);
            }
        }
        for _ in 0..10000 {
            let lifetime = object_lifetime(&mut rng, 1, Shape::NORMAL.epochs);
            assert!((1..=Shape::NORMAL.epochs).contains(&lifetime));
        }
    }

    #[test]
    fn small_sizes_dominate() {
        let mut rng = fastrand::Rng::with_seed(3);
        let below = (0..10000)
            .filter(|_| object_size(&mut rng, 8, 4000) < 2000)
            .count();
        // P(tau < 3) = 1 - e^-3
        assert!(below > 9000, "{} of 10000 below the midpoint", below);
    }

    #[test]
    fn trace_run_keeps_tags() {
        let mut rng = fastrand::Rng::with_seed(Config::DEFAULT_SEED);
        for strategy in Strategy::ALL {
            for challenge in CHALLENGES {
                let stats = strategy.run(challenge, Shape::TRACE, &mut rng, None, None);
                assert!(stats.allocated >= stats.freed);
                assert!(stats.mapped > 0);
                assert!(stats.utilization() <= 100.0);
            }
        }
    }
}
