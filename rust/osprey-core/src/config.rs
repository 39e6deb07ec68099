//! Emulator configuration.
//!
//! A [`Config`] is loaded once (from the whitespace-separated key/value file
//! format) and treated as immutable for the lifetime of a scheduler run.
//! Range clamps are applied at construction so the rest of the system never
//! has to re-validate.

use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use strum_macros::{Display, EnumString};
use thiserror::Error;

/// Errors produced while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot open configuration file: {0}")]
    Io(#[from] io::Error),
    #[error("invalid value `{value}` for key `{key}`")]
    InvalidValue { key: String, value: String },
}

/// Which scheduling policy the dispatcher runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum SchedulingAlgorithm {
    /// First-come-first-served: a dispatched process runs to completion.
    #[strum(serialize = "fcfs")]
    Fcfs,
    /// Preemptive round-robin with a fixed quantum.
    #[strum(serialize = "rr")]
    RoundRobin,
}

/// Immutable emulator configuration.
///
/// Field names track the configuration file keys (`num-cpu`,
/// `quantum-cycles`, …). All counts are in ticks unless stated otherwise;
/// memory quantities are in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Number of CPU cores, clamped to 1..=128.
    pub cpu_count: u32,
    pub scheduler: SchedulingAlgorithm,
    /// Round-robin burst length in ticks; forced to 1 under FCFS.
    pub quantum_cycles: u32,
    /// Batch generator period, in iterations of its own wall loop.
    pub batch_process_freq: u32,
    pub min_instructions: u32,
    pub max_instructions: u32,
    /// Extra idle ticks between instruction steps. A worker performs one
    /// step every `delay_per_exec + 1` ticks.
    pub delay_per_exec: u32,
    pub max_overall_mem: u32,
    /// Parsed and retained, but not yet consulted by the allocator;
    /// reserved for a future paging memory model.
    pub mem_per_frame: u32,
    pub mem_per_proc: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cpu_count: 4,
            scheduler: SchedulingAlgorithm::RoundRobin,
            quantum_cycles: 5,
            batch_process_freq: 1,
            min_instructions: 1000,
            max_instructions: 2000,
            delay_per_exec: 0,
            max_overall_mem: 16384,
            mem_per_frame: 16,
            mem_per_proc: 4096,
        }
    }
}

impl Config {
    /// Load a configuration from `path`.
    ///
    /// The file holds one `key value` pair per line, whitespace separated.
    /// Unknown keys are ignored so configuration files can carry settings
    /// for other tools. Missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let text = fs::read_to_string(path)?;
        let mut cfg = Config::default();

        for line in text.lines() {
            let mut parts = line.split_whitespace();
            let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
                continue;
            };
            match key {
                "num-cpu" => cfg.cpu_count = parse_u32(key, value)?,
                "scheduler" => {
                    cfg.scheduler = SchedulingAlgorithm::from_str(value).map_err(|_| {
                        ConfigError::InvalidValue {
                            key: key.into(),
                            value: value.into(),
                        }
                    })?
                }
                "quantum-cycles" => cfg.quantum_cycles = parse_u32(key, value)?,
                "batch-process-freq" => cfg.batch_process_freq = parse_u32(key, value)?,
                "min-ins" => cfg.min_instructions = parse_u32(key, value)?,
                "max-ins" => cfg.max_instructions = parse_u32(key, value)?,
                "delay-per-exec" => cfg.delay_per_exec = parse_u32(key, value)?,
                "max-overall-mem" => cfg.max_overall_mem = parse_u32(key, value)?,
                "mem-per-frame" => cfg.mem_per_frame = parse_u32(key, value)?,
                "mem-per-proc" => cfg.mem_per_proc = parse_u32(key, value)?,
                _ => {}
            }
        }

        cfg.normalize();
        Ok(cfg)
    }

    /// Apply the range clamps the rest of the system relies on.
    ///
    /// `cpu_count` stays in 1..=128, `quantum_cycles` and
    /// `batch_process_freq` are at least 1, `max_instructions` is at least
    /// `min_instructions`, and a non-round-robin scheduler forces the
    /// quantum to 1.
    pub fn normalize(&mut self) {
        self.cpu_count = self.cpu_count.clamp(1, 128);
        self.quantum_cycles = self.quantum_cycles.max(1);
        self.batch_process_freq = self.batch_process_freq.max(1);
        self.min_instructions = self.min_instructions.max(1);
        self.max_instructions = self.max_instructions.max(self.min_instructions);
        if self.scheduler != SchedulingAlgorithm::RoundRobin {
            self.quantum_cycles = 1;
        }
    }
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.into(),
        value: value.into(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "osprey-config-test-{}-{:?}.txt",
            std::process::id(),
            std::thread::current().id()
        ));
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn parses_all_known_keys() {
        let path = write_temp(
            "num-cpu 2\n\
             scheduler rr\n\
             quantum-cycles 4\n\
             batch-process-freq 3\n\
             min-ins 10\n\
             max-ins 20\n\
             delay-per-exec 1\n\
             max-overall-mem 1024\n\
             mem-per-frame 16\n\
             mem-per-proc 256\n",
        );
        let cfg = Config::from_file(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(cfg.cpu_count, 2);
        assert_eq!(cfg.scheduler, SchedulingAlgorithm::RoundRobin);
        assert_eq!(cfg.quantum_cycles, 4);
        assert_eq!(cfg.batch_process_freq, 3);
        assert_eq!(cfg.min_instructions, 10);
        assert_eq!(cfg.max_instructions, 20);
        assert_eq!(cfg.delay_per_exec, 1);
        assert_eq!(cfg.max_overall_mem, 1024);
        assert_eq!(cfg.mem_per_frame, 16);
        assert_eq!(cfg.mem_per_proc, 256);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let path = write_temp("num-cpu 8\nsome-future-knob 99\n");
        let cfg = Config::from_file(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(cfg.cpu_count, 8);
    }

    #[test]
    fn fcfs_forces_quantum_to_one() {
        let path = write_temp("scheduler fcfs\nquantum-cycles 9\n");
        let cfg = Config::from_file(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(cfg.scheduler, SchedulingAlgorithm::Fcfs);
        assert_eq!(cfg.quantum_cycles, 1);
    }

    #[test]
    fn cpu_count_clamped_to_valid_range() {
        let path = write_temp("num-cpu 0\n");
        let cfg = Config::from_file(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(cfg.cpu_count, 1);

        let path = write_temp("num-cpu 500\n");
        let cfg = Config::from_file(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(cfg.cpu_count, 128);
    }

    #[test]
    fn max_instructions_clamped_to_min() {
        let path = write_temp("min-ins 50\nmax-ins 10\n");
        let cfg = Config::from_file(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(cfg.max_instructions, 50);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = Config::from_file("/definitely/not/here.txt").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn bad_number_is_an_error() {
        let path = write_temp("num-cpu lots\n");
        let err = Config::from_file(&path).unwrap_err();
        fs::remove_file(&path).ok();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn algorithm_round_trips_through_strings() {
        assert_eq!(
            SchedulingAlgorithm::from_str("fcfs").unwrap(),
            SchedulingAlgorithm::Fcfs
        );
        assert_eq!(SchedulingAlgorithm::RoundRobin.to_string(), "rr");
    }
}
