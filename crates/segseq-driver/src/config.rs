use anyhow::bail;
use clap::Parser;
use segseq::{
    DEFAULT_MAX_VALUE, DEFAULT_MIN_VALUE, DEFAULT_RETRY_TIMES, DEFAULT_STEP, IdFormat,
    RetryPolicy, SequenceConfig,
};
use std::time::Duration;

/// Settings for one driver run.
///
/// The driver builds a set of in-memory stores, optionally makes some of them
/// fail at random, registers the requested sequences and then draws
/// identifiers from many threads at once. Every value can be given as a flag
/// or through the environment (a `.env` file is honoured).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "segseq-driver",
    version,
    about = "Drives segment-cached sequences from many threads and checks every id is unique"
)]
pub struct CliArgs {
    /// Number of independent backing stores.
    ///
    /// Environment variable: `STORES`
    #[arg(long, env = "STORES", default_value_t = 3)]
    pub stores: usize,

    /// Selection weight per store, comma separated. Defaults to an equal
    /// weight for every store.
    ///
    /// Environment variable: `WEIGHTS`
    #[arg(long, env = "WEIGHTS", value_delimiter = ',')]
    pub weights: Option<Vec<u32>>,

    /// Names of the sequences to drive, comma separated.
    ///
    /// Environment variable: `SEQUENCES`
    #[arg(long, env = "SEQUENCES", value_delimiter = ',', default_value = "order,invoice")]
    pub sequences: Vec<String>,

    /// Identifiers claimed per store round trip.
    ///
    /// Environment variable: `STEP`
    #[arg(long, env = "STEP", default_value_t = DEFAULT_STEP)]
    pub step: i64,

    /// First identifier of every sequence.
    ///
    /// Environment variable: `MIN_VALUE`
    #[arg(long, env = "MIN_VALUE", default_value_t = DEFAULT_MIN_VALUE)]
    pub min_value: i64,

    /// Exclusive upper bound of every sequence.
    ///
    /// Environment variable: `MAX_VALUE`
    #[arg(long, env = "MAX_VALUE", default_value_t = DEFAULT_MAX_VALUE)]
    pub max_value: i64,

    /// Worker threads drawing identifiers.
    ///
    /// Environment variable: `THREADS`
    #[arg(long, env = "THREADS", default_value_t = num_cpus::get())]
    pub threads: usize,

    /// Identifiers each worker draws, spread round-robin over the sequences.
    ///
    /// Environment variable: `IDS_PER_THREAD`
    #[arg(long, env = "IDS_PER_THREAD", default_value_t = 100_000)]
    pub ids_per_thread: usize,

    /// Retries per range allocation before giving up.
    ///
    /// Environment variable: `RETRY_TIMES`
    #[arg(long, env = "RETRY_TIMES", default_value_t = DEFAULT_RETRY_TIMES)]
    pub retry_times: u32,

    /// Upper bound in milliseconds for a single refill. Unbounded if unset.
    ///
    /// Environment variable: `TIMEOUT_MS`
    #[arg(long, env = "TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// How many of the stores (counting from the first) fail at random.
    ///
    /// Environment variable: `FLAKY_STORES`
    #[arg(long, env = "FLAKY_STORES", default_value_t = 0)]
    pub flaky_stores: usize,

    /// Probability in `[0, 1]` that a call to a flaky store fails.
    ///
    /// Environment variable: `FAILURE_RATE`
    #[arg(long, env = "FAILURE_RATE", default_value_t = 0.0)]
    pub failure_rate: f64,

    /// Print a few formatted identifiers (`yyyyMMdd` + type code + value)
    /// after the run.
    #[arg(long, default_value_t = false)]
    pub format: bool,

    /// Type code placed between date and value in formatted identifiers.
    ///
    /// Environment variable: `TYPE_CODE`
    #[arg(long, env = "TYPE_CODE")]
    pub type_code: Option<String>,

    /// Zero-pad formatted values to the width of the max value.
    #[arg(long, default_value_t = false)]
    pub zero_pad: bool,
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub weights: Vec<u32>,
    pub sequences: Vec<SequenceConfig>,
    pub policy: RetryPolicy,
    pub timeout: Option<Duration>,
    pub threads: usize,
    pub ids_per_thread: usize,
    pub flaky_stores: usize,
    pub failure_rate: f64,
    pub format: Option<IdFormat>,
}

impl DriverConfig {
    pub fn stores(&self) -> usize {
        self.weights.len()
    }
}

impl TryFrom<CliArgs> for DriverConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.stores == 0 {
            bail!("STORES must be greater than 0");
        }

        let weights = match args.weights {
            Some(weights) if weights.len() != args.stores => bail!(
                "WEIGHTS has {} entries but STORES is {}",
                weights.len(),
                args.stores
            ),
            Some(weights) if weights.iter().all(|&w| w == 0) => {
                bail!("WEIGHTS must give at least one store a non-zero weight")
            }
            Some(weights) => weights,
            None => vec![segseq::DEFAULT_WEIGHT; args.stores],
        };

        if args.threads == 0 {
            bail!("THREADS must be greater than 0");
        }

        if !(0.0..=1.0).contains(&args.failure_rate) {
            bail!("FAILURE_RATE must be within [0, 1], got {}", args.failure_rate);
        }

        if args.flaky_stores > args.stores {
            bail!(
                "FLAKY_STORES ({}) exceeds STORES ({})",
                args.flaky_stores,
                args.stores
            );
        }

        let mut sequences = Vec::with_capacity(args.sequences.len());
        for name in &args.sequences {
            let config = SequenceConfig::new(name.trim())
                .with_min_value(args.min_value)
                .with_max_value(args.max_value)
                .with_step(args.step);
            config.validate()?;
            if sequences
                .iter()
                .any(|known: &SequenceConfig| known.name() == config.name())
            {
                bail!("sequence `{}` listed twice", config.name());
            }
            sequences.push(config);
        }
        if sequences.is_empty() {
            bail!("SEQUENCES must name at least one sequence");
        }

        let format = args.format.then(|| {
            let format = IdFormat::new().with_zero_pad(args.zero_pad);
            match args.type_code {
                Some(code) => format.with_type_code(code),
                None => format,
            }
        });

        Ok(Self {
            weights,
            sequences,
            policy: RetryPolicy::default().with_retry_times(args.retry_times),
            timeout: args.timeout_ms.map(Duration::from_millis),
            threads: args.threads,
            ids_per_thread: args.ids_per_thread,
            flaky_stores: args.flaky_stores,
            failure_rate: args.failure_rate,
            format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<DriverConfig> {
        let args = CliArgs::try_parse_from(["segseq-driver"].iter().chain(args))?;
        DriverConfig::try_from(args)
    }

    #[test]
    fn defaults() {
        let config = parse(&["--threads", "2"]).unwrap();
        assert_eq!(config.stores(), 3);
        assert_eq!(config.weights, vec![10, 10, 10]);
        let names: Vec<_> = config.sequences.iter().map(SequenceConfig::name).collect();
        assert_eq!(names, vec!["order", "invoice"]);
        assert_eq!(config.policy.retry_times, 150);
        assert!(config.timeout.is_none());
        assert!(config.format.is_none());
    }

    #[test]
    fn explicit_weights_and_format() {
        let config = parse(&[
            "--stores",
            "2",
            "--weights",
            "1,3",
            "--timeout-ms",
            "250",
            "--format",
            "--type-code",
            "07",
            "--zero-pad",
        ])
        .unwrap();
        assert_eq!(config.weights, vec![1, 3]);
        assert_eq!(config.timeout, Some(Duration::from_millis(250)));
        let format = config.format.unwrap();
        assert_eq!(format.type_code(), Some("07"));
        assert!(format.zero_pad());
    }

    #[test]
    fn rejects_inconsistent_settings() {
        assert!(parse(&["--stores", "0"]).is_err());
        assert!(parse(&["--stores", "2", "--weights", "1,2,3"]).is_err());
        assert!(parse(&["--stores", "2", "--weights", "0,0"]).is_err());
        assert!(parse(&["--threads", "0"]).is_err());
        assert!(parse(&["--failure-rate", "1.5"]).is_err());
        assert!(parse(&["--stores", "1", "--flaky-stores", "2"]).is_err());
        assert!(parse(&["--step", "0"]).is_err());
        assert!(parse(&["--sequences", "a,a"]).is_err());
        assert!(parse(&["--sequences", " "]).is_err());
    }
}
