use crate::config::DriverConfig;
use anyhow::{Context, anyhow, bail};
use segseq::{Error, MemoryStore, MultiStoreAllocator, SequenceRegistry, StoreStats};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread::scope;
use std::time::{Duration, Instant};

type Allocator = MultiStoreAllocator<Arc<MemoryStore>>;

/// What one worker thread saw.
#[derive(Debug, Default)]
struct WorkerOutcome {
    // One vector per sequence, in config order.
    values: Vec<Vec<i64>>,
    failures: usize,
    last_error: Option<Error>,
}

/// Summary of a driver run.
#[derive(Debug)]
pub struct Report {
    pub issued: usize,
    pub failures: usize,
    pub last_error: Option<Error>,
    pub elapsed: Duration,
    pub store_stats: Vec<StoreStats>,
    pub samples: Vec<String>,
}

impl Report {
    pub fn ids_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.issued as f64 / secs
        } else {
            0.0
        }
    }
}

/// Builds the stores and registry described by `config`, draws identifiers
/// from `config.threads` workers and checks that no sequence ever handed out
/// the same value twice.
///
/// # Errors
/// Fails if the registry cannot be set up or a duplicate value was observed.
/// Individual draw failures (store outages beyond the retry budget, timeouts)
/// are counted in the report instead.
pub fn run(config: &DriverConfig) -> anyhow::Result<Report> {
    let stores: Vec<Arc<MemoryStore>> = (0..config.stores())
        .map(|_| Arc::new(MemoryStore::new()))
        .collect();
    let allocator = Allocator::with_weights(stores.clone(), config.weights.clone())?
        .with_policy(config.policy);
    let mut registry = SequenceRegistry::new(Arc::new(allocator));
    if let Some(timeout) = config.timeout {
        registry = registry.with_timeout(timeout);
    }

    // Rows are created while every store is healthy.
    for sequence in &config.sequences {
        registry
            .register(sequence.clone())
            .with_context(|| format!("registering sequence `{}`", sequence.name()))?;
    }
    let bootstrapped = registry.bootstrap()?;
    tracing::info!(
        registered = registry.len(),
        bootstrapped,
        "sequences ready"
    );

    for store in stores.iter().take(config.flaky_stores) {
        store.set_failure_rate(config.failure_rate);
    }

    let started = Instant::now();
    let outcomes = drive(&registry, config)?;
    let elapsed = started.elapsed();

    for store in &stores {
        store.set_failure_rate(0.0);
    }

    let mut issued = 0;
    let mut failures = 0;
    let mut last_error = None;
    for (index, sequence) in config.sequences.iter().enumerate() {
        let mut seen = HashSet::new();
        for outcome in &outcomes {
            for &value in &outcome.values[index] {
                if !seen.insert(value) {
                    bail!("sequence `{}` issued {value} twice", sequence.name());
                }
            }
        }
        tracing::info!(sequence = sequence.name(), issued = seen.len(), "all values unique");
        issued += seen.len();
    }
    for outcome in outcomes {
        failures += outcome.failures;
        if outcome.last_error.is_some() {
            last_error = outcome.last_error;
        }
    }

    let samples = match &config.format {
        Some(format) => config
            .sequences
            .iter()
            .map(|sequence| registry.next_formatted(sequence.name(), format))
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(Report {
        issued,
        failures,
        last_error,
        elapsed,
        store_stats: stores.iter().map(|store| store.stats()).collect(),
        samples,
    })
}

fn drive(
    registry: &SequenceRegistry<Allocator>,
    config: &DriverConfig,
) -> anyhow::Result<Vec<WorkerOutcome>> {
    let names: Vec<&str> = config
        .sequences
        .iter()
        .map(|sequence| sequence.name())
        .collect();

    scope(|s| {
        let workers: Vec<_> = (0..config.threads)
            .map(|worker| {
                let names = &names;
                s.spawn(move || {
                    let mut outcome = WorkerOutcome {
                        values: vec![Vec::new(); names.len()],
                        ..WorkerOutcome::default()
                    };
                    for draw in 0..config.ids_per_thread {
                        let index = (worker + draw) % names.len();
                        match registry.next_value(names[index]) {
                            Ok(value) => outcome.values[index].push(value),
                            Err(e @ Error::SpaceExhausted { .. }) => {
                                tracing::warn!(worker, "stopping early: {e}");
                                outcome.failures += 1;
                                outcome.last_error = Some(e);
                                break;
                            }
                            Err(e) => {
                                outcome.failures += 1;
                                outcome.last_error = Some(e);
                            }
                        }
                    }
                    outcome
                })
            })
            .collect();

        workers
            .into_iter()
            .map(|worker| {
                worker
                    .join()
                    .map_err(|_| anyhow!("worker thread panicked"))
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use segseq::{RetryPolicy, SequenceConfig};

    fn config() -> DriverConfig {
        DriverConfig {
            weights: vec![10, 10, 10],
            sequences: vec![
                SequenceConfig::new("order").with_step(64),
                SequenceConfig::new("invoice").with_step(16),
            ],
            policy: RetryPolicy::default(),
            timeout: None,
            threads: 4,
            ids_per_thread: 2_000,
            flaky_stores: 0,
            failure_rate: 0.0,
            format: None,
        }
    }

    #[test]
    fn healthy_run_issues_every_id() {
        let report = run(&config()).unwrap();
        assert_eq!(report.issued, 8_000);
        assert_eq!(report.failures, 0);
        assert_eq!(report.store_stats.len(), 3);
        assert!(report.samples.is_empty());
    }

    #[test]
    fn flaky_stores_do_not_break_uniqueness() {
        let config = DriverConfig {
            flaky_stores: 2,
            failure_rate: 0.5,
            ..config()
        };
        let report = run(&config).unwrap();
        assert_eq!(report.issued + report.failures, 8_000);
    }

    #[test]
    fn exhausted_space_is_reported() {
        let config = DriverConfig {
            sequences: vec![
                SequenceConfig::new("tiny")
                    .with_max_value(100)
                    .with_step(10),
            ],
            weights: vec![10],
            ..config()
        };
        let report = run(&config).unwrap();
        assert_eq!(report.issued, 100);
        assert!(matches!(
            report.last_error,
            Some(Error::SpaceExhausted { .. })
        ));
    }

    #[test]
    fn samples_are_formatted() {
        let config = DriverConfig {
            format: Some(
                segseq::IdFormat::new()
                    .with_date_prefix(false)
                    .with_type_code("X"),
            ),
            ids_per_thread: 10,
            ..config()
        };
        let report = run(&config).unwrap();
        assert_eq!(report.samples.len(), 2);
        assert!(report.samples.iter().all(|sample| sample.starts_with('X')));
    }
}
