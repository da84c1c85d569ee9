//! Challenge harness comparing the fitalloc strategies on a synthetic
//! allocate/free workload.

pub mod stats;
pub mod workload;

use std::io;

use bytesize::ByteSize;
use hdrhistogram::Histogram;

use crate::stats::{Stats, Trace};
use crate::workload::{CHALLENGES, Challenge, Config, Strategy, WARM_UP};

pub fn tracing_init() {
    #[cfg(feature = "tracing")]
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Runs the warm-up and every challenge once per strategy and prints the
/// comparison table.
///
/// With a trace directory configured, one trace file per challenge and
/// strategy is written there.
pub fn report(config: &Config) -> io::Result<()> {
    let shape = config.shape();
    let mut rng = fastrand::Rng::with_seed(config.seed);

    if config.trace_dir.is_some() {
        println!("!!! WARNING - tracing is enabled, figures differ from normal runs.");
    }

    Strategy::FirstFit.run(WARM_UP, shape, &mut rng, None, None);

    for challenge in CHALLENGES {
        let mut rows = Vec::with_capacity(Strategy::ALL.len());
        for strategy in Strategy::ALL {
            let trace = match &config.trace_dir {
                Some(dir) => Some(Trace::create(dir, challenge.index, strategy.name())?),
                None => None,
            };
            let mut latency = Histogram::<u64>::new(3).expect("3 significant figures");
            let stats = strategy.run(
                challenge,
                shape,
                &mut rng,
                trace.clone(),
                Some(&mut latency),
            );
            if let Some(trace) = trace {
                let mut trace = trace.borrow_mut();
                trace.flush()?;
                println!("trace written to {}", trace.path().display());
            }
            rows.push((stats, latency));
        }
        print_challenge(challenge, &rows);
    }
    Ok(())
}

fn print_challenge(challenge: Challenge, rows: &[(Stats, Histogram<u64>)]) {
    const RULE: &str = "==========================================================================";

    fn line(label: &str, cells: impl Iterator<Item = String>) {
        let cells: Vec<_> = cells.map(|c| format!("{:>16}", c)).collect();
        println!("{:>16}| {}", label, cells.join(" => "));
    }

    println!("{}", RULE);
    line(
        &format!("Challenge #{:<5}", challenge.index),
        Strategy::ALL.iter().map(|s| s.name().to_string()),
    );
    line(
        "---------------",
        Strategy::ALL.iter().map(|_| "-".repeat(16)),
    );
    line(
        "Time [ms]",
        rows.iter().map(|(s, _)| s.elapsed.as_millis().to_string()),
    );
    line(
        "Utilization [%]",
        rows.iter().map(|(s, _)| format!("{:.0}", s.utilization())),
    );
    line(
        "Mapped",
        rows.iter().map(|(s, _)| {
            let mapped = ByteSize::b((s.mapped - s.unmapped) as u64);
            mapped.display().iec_short().to_string()
        }),
    );
    line(
        "Alloc p50 [ns]",
        rows.iter().map(|(_, h)| h.value_at_quantile(0.5).to_string()),
    );
    line(
        "Alloc p99 [ns]",
        rows.iter().map(|(_, h)| h.value_at_quantile(0.99).to_string()),
    );
}
