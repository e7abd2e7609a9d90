//! The `hash_report` driver: runs avalanche statistics and throughput
//! measurements for each length class of the hash.

use std::hint::black_box;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info};

use crate::city::{hash64, Bucket};
use crate::stats::{
    compute_stats, generate_bit_combinations, generate_counting, generate_gray_code,
    generate_n_random_bits, generate_random, generate_single_1_bit,
};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("unknown flag `{0}`")]
    UnknownFlag(String),

    #[error("flag `{0}` expects a value")]
    MissingValue(String),

    #[error("invalid value `{value}` for `{flag}`")]
    InvalidValue { flag: String, value: String },

    #[error("failed to write avalanche chart `{}`: {source}", .path.display())]
    Png {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub struct LengthClass<'a> {
    pub name: &'a str,
    pub input_size: usize, // In bytes.
}

impl LengthClass<'_> {
    pub fn bucket(&self) -> Bucket {
        Bucket::for_len(self.input_size)
    }
}

/// One representative length per bucket, the largest each bucket accepts,
/// plus long inputs with a trailing partial block and with several blocks.
pub const LENGTH_CLASSES: &[LengthClass] = &[
    LengthClass {
        name: "1-3 bytes",
        input_size: 3,
    },
    LengthClass {
        name: "4-7 bytes",
        input_size: 7,
    },
    LengthClass {
        name: "8-16 bytes",
        input_size: 16,
    },
    LengthClass {
        name: "17-32 bytes",
        input_size: 32,
    },
    LengthClass {
        name: "33-64 bytes",
        input_size: 64,
    },
    LengthClass {
        name: "one block plus tail",
        input_size: 100,
    },
    LengthClass {
        name: "four blocks",
        input_size: 256,
    },
];

pub struct BitPattern<'a> {
    pub name: &'a str,
    pub gen_function: &'a dyn Fn(usize, &mut [u8]),

    /// Number of rounds to run the pattern with. Zero is treated specially, and
    /// means to use the bit width of the input.
    pub rounds: usize,
}

pub const PATTERNS: &[BitPattern] = &[
    BitPattern {
        name: "random",
        gen_function: &generate_random,
        rounds: 1 << 12,
    },
    BitPattern {
        name: "counting",
        gen_function: &generate_counting,
        rounds: 1 << 12,
    },
    BitPattern {
        name: "gray code",
        gen_function: &generate_gray_code,
        rounds: 1 << 12,
    },
    BitPattern {
        name: "bit combinations",
        gen_function: &generate_bit_combinations,
        rounds: 1 << 12,
    },
    BitPattern {
        name: "8 random bits",
        gen_function: &|seed, bytes| generate_n_random_bits(seed, bytes, 8),
        rounds: 1 << 12,
    },
    BitPattern {
        name: "single-bit",
        gen_function: &generate_single_1_bit,

        // NOTE: because this test has a small, fixed number of rounds by its
        // nature, the generated statistics should be interpreted a little
        // differently. Even a very good hash is unlikely to achieve "perfect"
        // avalanche or BIC by this measure, purely because it's impossible to
        // collect enough samples to reduce variance enough.
        rounds: 0,
    },
];

#[derive(Debug, Clone, PartialEq)]
pub struct ReportConfig {
    pub do_bic: bool,
    pub write_png: bool,
    pub out_dir: PathBuf,
    /// Overrides the round count of every pattern with a fixed count.
    /// Patterns with a round count of zero always run once per input bit.
    pub rounds: Option<usize>,
    pub throughput: bool,
    pub iterations: usize,
    /// Lowercased substrings of length class names.  Empty selects all.
    pub name_filters: Vec<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            do_bic: false,
            write_png: true,
            out_dir: PathBuf::from("."),
            rounds: None,
            throughput: false,
            iterations: 1 << 20,
            name_filters: Vec::new(),
        }
    }
}

impl ReportConfig {
    pub const USAGE: &'static str = "usage: hash_report [--bic] [--no-png] [--out <dir>] \
        [--rounds <n>] [--throughput] [--iterations <n>] [class name filter...]";

    /// Parses command line arguments, not including the program name.
    pub fn from_args<I>(args: I) -> Result<Self, ReportError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            if !arg.starts_with('-') {
                config.name_filters.push(arg.to_lowercase());
                continue;
            }

            match arg.as_str() {
                "--bic" => config.do_bic = true,
                "--no-png" => config.write_png = false,
                "--throughput" => config.throughput = true,
                "--out" => {
                    let value = args.next().ok_or_else(|| ReportError::MissingValue(arg.clone()))?;
                    config.out_dir = PathBuf::from(value);
                }
                "--rounds" => {
                    let value = args.next().ok_or_else(|| ReportError::MissingValue(arg.clone()))?;
                    config.rounds = Some(parse_count(&arg, value)?);
                }
                "--iterations" => {
                    let value = args.next().ok_or_else(|| ReportError::MissingValue(arg.clone()))?;
                    config.iterations = parse_count(&arg, value)?;
                }
                _ => return Err(ReportError::UnknownFlag(arg)),
            }
        }

        Ok(config)
    }

    pub fn rounds_for(&self, pattern: &BitPattern, class: &LengthClass) -> usize {
        match (self.rounds, pattern.rounds) {
            (_, 0) => class.input_size * 8,
            (Some(rounds), _) => rounds,
            (None, rounds) => rounds,
        }
    }

    pub fn selects(&self, class: &LengthClass) -> bool {
        if self.name_filters.is_empty() {
            return true;
        }
        let lower_name = class.name.to_lowercase();
        self.name_filters
            .iter()
            .any(|filter| lower_name.contains(filter.as_str()))
    }
}

/// Parses a strictly positive count.
fn parse_count(flag: &str, value: String) -> Result<usize, ReportError> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ReportError::InvalidValue {
            flag: flag.to_string(),
            value,
        }),
    }
}

#[derive(Debug, Copy, Clone)]
pub struct Throughput {
    pub iterations: usize,
    pub elapsed: Duration,
    pub digests_per_sec: f64,
    pub bytes_per_sec: f64,
}

/// Hashes a fixed buffer of `input_size` bytes `iterations` times.
pub fn measure_throughput(input_size: usize, iterations: usize) -> Throughput {
    let mut input = vec![0u8; input_size];
    generate_random(input_size, &mut input);

    let start = Instant::now();
    let mut acc = 0u64;
    for _ in 0..iterations {
        acc ^= hash64(black_box(&input[..]));
    }
    black_box(acc);
    let elapsed = start.elapsed();

    let secs = elapsed.as_secs_f64().max(f64::MIN_POSITIVE);
    Throughput {
        iterations,
        elapsed,
        digests_per_sec: iterations as f64 / secs,
        bytes_per_sec: (iterations * input_size) as f64 / secs,
    }
}

pub fn run(config: &ReportConfig) -> Result<(), ReportError> {
    for class in LENGTH_CLASSES.iter().filter(|class| config.selects(class)) {
        println!("\n================================");
        println!("{} ({} bytes, {:?})", class.name, class.input_size, class.bucket());
        info!(class = class.name, input_size = class.input_size, "analysing length class");

        if config.throughput {
            let t = measure_throughput(class.input_size, config.iterations);
            println!(
                "    Throughput: {:0.1} Mdigests/s, {:0.1} MB/s",
                t.digests_per_sec / 1e6,
                t.bytes_per_sec / 1e6,
            );
            debug!(iterations = t.iterations, elapsed = ?t.elapsed, "throughput measured");
        }

        for pattern in PATTERNS.iter() {
            let rounds = config.rounds_for(pattern, class);

            println!("\nInput bit pattern: {}", pattern.name);
            let stats = compute_stats(
                pattern.gen_function,
                hash64,
                class.input_size,
                rounds,
                true,
                config.do_bic,
            );
            stats.print_report();

            if config.write_png {
                let path = config
                    .out_dir
                    .join(format!("{} - {}.png", class.name, pattern.name));
                stats
                    .write_avalanche_png(&path)
                    .map_err(|source| ReportError::Png {
                        path: path.clone(),
                        source,
                    })?;
                debug!(path = %path.display(), "wrote avalanche chart");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults() {
        let config = ReportConfig::from_args(Vec::new()).unwrap();
        assert_eq!(config, ReportConfig::default());
        assert!(config.write_png);
        assert!(!config.do_bic);
    }

    #[test]
    fn parses_flags_and_filters() {
        let config = ReportConfig::from_args(args(&[
            "--bic",
            "--no-png",
            "--out",
            "charts",
            "--rounds",
            "100",
            "--throughput",
            "--iterations",
            "5000",
            "Blocks",
        ]))
        .unwrap();

        assert!(config.do_bic);
        assert!(!config.write_png);
        assert_eq!(config.out_dir, PathBuf::from("charts"));
        assert_eq!(config.rounds, Some(100));
        assert!(config.throughput);
        assert_eq!(config.iterations, 5000);
        assert_eq!(config.name_filters, vec!["blocks".to_string()]);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(matches!(
            ReportConfig::from_args(args(&["--fast"])),
            Err(ReportError::UnknownFlag(flag)) if flag == "--fast"
        ));
        assert!(matches!(
            ReportConfig::from_args(args(&["--rounds"])),
            Err(ReportError::MissingValue(_))
        ));
        assert!(matches!(
            ReportConfig::from_args(args(&["--rounds", "lots"])),
            Err(ReportError::InvalidValue { .. })
        ));
        assert!(matches!(
            ReportConfig::from_args(args(&["--iterations", "0"])),
            Err(ReportError::InvalidValue { .. })
        ));
    }

    #[test]
    fn rounds_override_skips_per_bit_patterns() {
        let class = &LENGTH_CLASSES[2];
        let random = &PATTERNS[0];
        let single_bit = PATTERNS.iter().find(|p| p.rounds == 0).unwrap();

        let config = ReportConfig::default();
        assert_eq!(config.rounds_for(random, class), random.rounds);
        assert_eq!(config.rounds_for(single_bit, class), class.input_size * 8);

        let config = ReportConfig::from_args(args(&["--rounds", "7"])).unwrap();
        assert_eq!(config.rounds_for(random, class), 7);
        assert_eq!(config.rounds_for(single_bit, class), class.input_size * 8);
    }

    #[test]
    fn filters_select_by_substring() {
        let config = ReportConfig::from_args(args(&["block"])).unwrap();
        let selected: Vec<_> = LENGTH_CLASSES
            .iter()
            .filter(|class| config.selects(class))
            .map(|class| class.name)
            .collect();
        assert_eq!(selected, vec!["one block plus tail", "four blocks"]);
    }

    #[test]
    fn classes_cover_every_bucket() {
        let buckets: Vec<Bucket> = LENGTH_CLASSES.iter().map(|class| class.bucket()).collect();
        for bucket in [Bucket::UpTo16, Bucket::UpTo32, Bucket::UpTo64, Bucket::Over64] {
            assert!(buckets.contains(&bucket), "{:?}", bucket);
        }
        assert!(LENGTH_CLASSES.iter().any(|class| class.input_size % 64 != 0
            && class.bucket() == Bucket::Over64));
    }

    #[test]
    fn throughput_counts_iterations() {
        let t = measure_throughput(64, 1000);
        assert_eq!(t.iterations, 1000);
        assert!(t.digests_per_sec > 0.0);
        assert!(t.bytes_per_sec >= t.digests_per_sec);
    }

    #[test]
    fn run_writes_charts() {
        let dir = tempfile::tempdir().unwrap();
        let config = ReportConfig {
            out_dir: dir.path().to_path_buf(),
            rounds: Some(4),
            name_filters: vec!["1-3".to_string()],
            ..ReportConfig::default()
        };
        run(&config).unwrap();

        for pattern in PATTERNS.iter() {
            let path = dir.path().join(format!("1-3 bytes - {}.png", pattern.name));
            assert!(path.exists(), "{}", path.display());
        }
    }

    #[test]
    fn run_reports_png_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = ReportConfig {
            out_dir: dir.path().join("missing"),
            rounds: Some(2),
            name_filters: vec!["4-7".to_string()],
            ..ReportConfig::default()
        };
        assert!(matches!(run(&config), Err(ReportError::Png { .. })));
    }
}
