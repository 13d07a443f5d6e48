//! Parsing of the simulator's `config.txt` (spec §6).
//!
//! Line-oriented `key=value`. Blank lines and `#` comments are ignored;
//! surrounding whitespace is trimmed. Every key is required.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use thiserror::Error;

/// Scheduling policy selected by the `scheduler` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Fcfs,
    Rr,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Fcfs => write!(f, "fcfs"),
            Algorithm::Rr => write!(f, "rr"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub num_cpu: u32,
    pub scheduler: Algorithm,
    pub batch_process_freq: u32,
    pub min_ins: u32,
    pub max_ins: u32,
    pub delays_per_exec: u32,
    pub quantum_cycles: u32,
    pub max_overall_mem: u32,
    pub mem_per_frame: u32,
    pub min_mem_per_proc: u32,
    pub max_mem_per_proc: u32,
}

/// Every way `config.txt` can be malformed (spec §7, "Configuration").
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing required key `{0}`")]
    MissingKey(&'static str),
    #[error("key `{key}` has non-numeric value `{value}`")]
    NotNumeric { key: &'static str, value: String },
    #[error("key `{key}` value `{value}` is out of range: {reason}")]
    OutOfRange {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("unrecognized scheduler `{0}`, expected `fcfs` or `rr`")]
    UnknownScheduler(String),
    #[error("min-ins ({min}) must be <= max-ins ({max})")]
    InsRangeInverted { min: u32, max: u32 },
    #[error("min-mem-per-proc ({min}) must be <= max-mem-per-proc ({max})")]
    MemRangeInverted { min: u32, max: u32 },
    #[error("mem-per-frame ({frame}) does not divide max-overall-mem ({total})")]
    FrameDoesNotDivideMem { frame: u32, total: u32 },
}

impl Config {
    /// Parses `config.txt` source text.
    pub fn parse(source: &str) -> Result<Config, ConfigError> {
        let mut kv: HashMap<String, String> = HashMap::new();
        for raw_line in source.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            kv.insert(key.trim().to_string(), value.trim().to_string());
        }

        let num_cpu = parse_u32(&kv, "num-cpu")?;
        if num_cpu < 1 {
            return Err(ConfigError::OutOfRange {
                key: "num-cpu",
                value: num_cpu.to_string(),
                reason: "must be >= 1",
            });
        }

        let scheduler_raw = require(&kv, "scheduler")?;
        let scheduler = match scheduler_raw.as_str() {
            "fcfs" => Algorithm::Fcfs,
            "rr" => Algorithm::Rr,
            other => return Err(ConfigError::UnknownScheduler(other.to_string())),
        };

        let batch_process_freq = parse_u32(&kv, "batch-process-freq")?;

        let min_ins = parse_u32_min(&kv, "min-ins", 1)?;
        let max_ins = parse_u32_min(&kv, "max-ins", 1)?;
        if min_ins > max_ins {
            return Err(ConfigError::InsRangeInverted {
                min: min_ins,
                max: max_ins,
            });
        }

        let delays_per_exec = parse_u32(&kv, "delays-per-exec")?;

        let quantum_cycles = parse_u32_min(&kv, "quantum-cycles", 1)?;

        let max_overall_mem = parse_u32_min(&kv, "max-overall-mem", 1)?;
        let mem_per_frame = parse_u32_min(&kv, "mem-per-frame", 1)?;
        if max_overall_mem % mem_per_frame != 0 {
            return Err(ConfigError::FrameDoesNotDivideMem {
                frame: mem_per_frame,
                total: max_overall_mem,
            });
        }

        let min_mem_per_proc = parse_u32_min(&kv, "min-mem-per-proc", 64)?;
        let max_mem_per_proc = parse_u32_min(&kv, "max-mem-per-proc", 64)?;
        if min_mem_per_proc > max_mem_per_proc {
            return Err(ConfigError::MemRangeInverted {
                min: min_mem_per_proc,
                max: max_mem_per_proc,
            });
        }

        Ok(Config {
            num_cpu,
            scheduler,
            batch_process_freq,
            min_ins,
            max_ins,
            delays_per_exec,
            quantum_cycles,
            max_overall_mem,
            mem_per_frame,
            min_mem_per_proc,
            max_mem_per_proc,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// `frame_count = max_overall_mem / mem_per_frame` (spec §4.3 Init).
    pub fn frame_count(&self) -> u32 {
        self.max_overall_mem / self.mem_per_frame
    }
}

fn require(kv: &HashMap<String, String>, key: &'static str) -> Result<String, ConfigError> {
    kv.get(key).cloned().ok_or(ConfigError::MissingKey(key))
}

fn parse_u32(kv: &HashMap<String, String>, key: &'static str) -> Result<u32, ConfigError> {
    let raw = require(kv, key)?;
    raw.parse::<u32>()
        .map_err(|_| ConfigError::NotNumeric { key, value: raw })
}

fn parse_u32_min(
    kv: &HashMap<String, String>,
    key: &'static str,
    min: u32,
) -> Result<u32, ConfigError> {
    let value = parse_u32(kv, key)?;
    if value < min {
        return Err(ConfigError::OutOfRange {
            key,
            value: value.to_string(),
            reason: "below the minimum allowed by this key",
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> String {
        r#"
            # example config
            num-cpu=2
            scheduler=rr
            batch-process-freq=1
            min-ins=1
            max-ins=5
            delays-per-exec=0
            quantum-cycles=2
            max-overall-mem=64
            mem-per-frame=16
            min-mem-per-proc=64
            max-mem-per-proc=64
        "#
        .to_string()
    }

    #[test]
    fn parses_a_well_formed_config() {
        let cfg = Config::parse(&sample()).unwrap();
        assert_eq!(cfg.num_cpu, 2);
        assert_eq!(cfg.scheduler, Algorithm::Rr);
        assert_eq!(cfg.frame_count(), 4);
    }

    #[test]
    fn rejects_missing_key() {
        let text = sample().replace("num-cpu=2\n", "");
        let err = Config::parse(&text).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey("num-cpu")));
    }

    #[test]
    fn rejects_non_numeric() {
        let text = sample().replace("num-cpu=2", "num-cpu=two");
        assert!(matches!(
            Config::parse(&text),
            Err(ConfigError::NotNumeric { key: "num-cpu", .. })
        ));
    }

    #[test]
    fn rejects_inverted_ins_range() {
        let text = sample().replace("min-ins=1", "min-ins=9");
        assert!(matches!(
            Config::parse(&text),
            Err(ConfigError::InsRangeInverted { .. })
        ));
    }

    #[test]
    fn rejects_frame_not_dividing_mem() {
        let text = sample().replace("mem-per-frame=16", "mem-per-frame=7");
        assert!(matches!(
            Config::parse(&text),
            Err(ConfigError::FrameDoesNotDivideMem { .. })
        ));
    }

    #[test]
    fn rejects_unknown_scheduler() {
        let text = sample().replace("scheduler=rr", "scheduler=priority");
        assert!(matches!(
            Config::parse(&text),
            Err(ConfigError::UnknownScheduler(_))
        ));
    }

    #[test]
    fn from_file_reads_a_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.txt");
        std::fs::write(&path, sample()).unwrap();
        let cfg = Config::from_file(&path).unwrap();
        assert_eq!(cfg.num_cpu, 2);
    }
}
