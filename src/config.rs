//! Benchmark run configuration.
//!
//! A [`RunConfig`] is resolved once at startup from built-in defaults,
//! an optional TOML file and command-line overrides, validated, and
//! never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default configuration constants
///
/// These match the historical defaults of the plfsdir runner workload:
/// 8 epochs of 1024 keys per rank, 8-byte keys with 32-byte values,
/// 2 MiB I/O buffers and 10 filter bits per key.
pub mod defaults {

    /// Watchdog timeout in seconds (0 disables the watchdog)
    pub const TIMEOUT_SECS: u64 = 300;

    /// Number of epochs written by each rank
    pub const NUM_EPOCHS: u32 = 8;

    /// Number of keys written per rank per epoch
    pub const KEYS_PER_EPOCH: u32 = 1 << 10;

    /// Data and index buffer size in bytes
    pub const IO_SIZE: usize = 2 << 20;

    /// Filter bits per key handed to the storage layer
    pub const FILTER_BITS: u32 = 10;

    /// Key size in bytes
    pub const KEY_SIZE: usize = 8;

    /// Value size in bytes
    pub const VALUE_SIZE: usize = 32;

    /// Remote-storage (bbos) server port
    pub const BBOS_PORT: u16 = 12345;

    /// Remote-storage (bbos) server hostname
    pub const fn default_bbos_hostname() -> &'static str {
        "127.0.0.1"
    }

    /// Default log level
    pub const fn default_log_level() -> &'static str {
        "info"
    }
}

/// Resolved options for one benchmark run.
///
/// All fields are fixed once resolution completes; sizes and counts use
/// unsigned types so negative values are unrepresentable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Target plfsdir path, shared by all ranks
    #[serde(default)]
    pub dir: PathBuf,

    /// Number of epochs to write
    #[serde(default = "default_nepochs")]
    pub nepochs: u32,

    /// Keys written per rank per epoch
    #[serde(default = "default_nkeys")]
    pub nkeys: u32,

    /// Key size in bytes (must be > 0)
    #[serde(default = "default_keysz")]
    pub keysz: usize,

    /// Value size in bytes
    #[serde(default = "default_valsz")]
    pub valsz: usize,

    /// Filter bits per key for the storage layer's membership filter
    #[serde(default = "default_filterbits")]
    pub filterbits: u32,

    /// Data and index buffer size in bytes (must be > 0)
    #[serde(default = "default_iosz")]
    pub iosz: usize,

    /// Background worker threads for the storage handle (0 = none)
    #[serde(default)]
    pub bgthreads: usize,

    /// Rotate to a new write-ahead log at every epoch boundary
    #[serde(default)]
    pub logrotation: bool,

    /// Route storage I/O through a remote bbos endpoint
    #[serde(default)]
    pub bbos: bool,

    /// Remote bbos server hostname
    #[serde(default = "default_bbos_hostname")]
    pub bbos_hostname: String,

    /// Remote bbos server port (must be > 0)
    #[serde(default = "default_bbos_port")]
    pub bbos_port: u16,

    /// Watchdog timeout in seconds (0 disables the watchdog)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Verbose progress output
    #[serde(default)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_nepochs() -> u32 {
    defaults::NUM_EPOCHS
}

fn default_nkeys() -> u32 {
    defaults::KEYS_PER_EPOCH
}

fn default_keysz() -> usize {
    defaults::KEY_SIZE
}

fn default_valsz() -> usize {
    defaults::VALUE_SIZE
}

fn default_filterbits() -> u32 {
    defaults::FILTER_BITS
}

fn default_iosz() -> usize {
    defaults::IO_SIZE
}

fn default_bbos_hostname() -> String {
    defaults::default_bbos_hostname().to_string()
}

fn default_bbos_port() -> u16 {
    defaults::BBOS_PORT
}

fn default_timeout() -> u64 {
    defaults::TIMEOUT_SECS
}

fn default_log_level() -> String {
    defaults::default_log_level().to_string()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::new(),
            nepochs: default_nepochs(),
            nkeys: default_nkeys(),
            keysz: default_keysz(),
            valsz: default_valsz(),
            filterbits: default_filterbits(),
            iosz: default_iosz(),
            bgthreads: 0,
            logrotation: false,
            bbos: false,
            bbos_hostname: default_bbos_hostname(),
            bbos_port: default_bbos_port(),
            timeout_secs: default_timeout(),
            verbose: false,
            log_level: default_log_level(),
        }
    }
}

impl RunConfig {
    /// Load configuration from a TOML file.
    ///
    /// Missing fields fall back to the built-in defaults. The result is
    /// not validated here; callers apply CLI overrides first and then
    /// call [`RunConfig::validate`].
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::ReadError(format!("{}: {}", path.display(), e))
        })?;

        let config: RunConfig = toml::from_str(&contents).map_err(|e| {
            ConfigError::ParseError(format!("{}: {}", path.display(), e))
        })?;

        Ok(config)
    }

    /// Validate the resolved configuration.
    ///
    /// Each message names the offending option so the binary can print
    /// a usage error and exit. No partially valid configuration is ever
    /// returned to the caller on failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError("bad args: no plfsdir given".to_string()));
        }

        if self.iosz == 0 {
            return Err(ConfigError::ValidationError("bad io size".to_string()));
        }

        if self.keysz == 0 {
            return Err(ConfigError::ValidationError("bad key size".to_string()));
        }

        if self.bbos_port == 0 {
            return Err(ConfigError::ValidationError("bad bbos port".to_string()));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!("bad log level: {}", other)));
            }
        }

        Ok(())
    }

    /// Print the resolved options, mirroring the workload's traditional
    /// startup banner.
    pub fn print_opts(&self, rank: u32, size: u32) {
        println!("\nplfsbench\n==options:");
        println!("\ttimeout: {} secs", self.timeout_secs);
        println!("\tnum bg threads: {}", self.bgthreads);
        println!("\tnum epochs: {}", self.nepochs);
        println!("\tnum keys per epoch: {} (per rank)", self.nkeys);
        println!("\tplfsdir: {}", self.dir.display());
        println!("\tkey size: {}", self.keysz);
        println!("\tvalue size: {}", self.valsz);
        println!("\tfilter bits per key: {}", self.filterbits);
        println!("\tio size: {}", self.iosz);
        println!("\tlog rotation: {}", self.logrotation);
        println!("\tbbos: {}", self.bbos);
        println!("\tbbos hostname: {}", self.bbos_hostname);
        println!("\tbbos port: {}", self.bbos_port);
        println!("\tgroup size: {} (rank {})", size, rank);
        println!("\tverbose: {}", self.verbose);
        println!();
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    ReadError(String),

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("{0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_config() -> RunConfig {
        RunConfig {
            dir: PathBuf::from("/tmp/plfsbench/dir"),
            ..RunConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert_eq!(config.nepochs, 8);
        assert_eq!(config.nkeys, 1024);
        assert_eq!(config.keysz, 8);
        assert_eq!(config.valsz, 32);
        assert_eq!(config.filterbits, 10);
        assert_eq!(config.iosz, 2 << 20);
        assert_eq!(config.timeout_secs, 300);
        assert_eq!(config.bbos_hostname, "127.0.0.1");
        assert_eq!(config.bbos_port, 12345);
        assert!(!config.logrotation);
        assert!(!config.bbos);
    }

    #[test]
    fn test_config_validation() {
        let mut config = valid_config();
        assert!(config.validate().is_ok());

        // Missing directory
        config.dir = PathBuf::new();
        assert!(config.validate().is_err());
        config.dir = PathBuf::from("/tmp/plfsbench/dir");

        // Zero key size
        config.keysz = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bad key size"));
        config.keysz = 8;

        // Zero io size
        config.iosz = 0;
        assert!(config.validate().is_err());
        config.iosz = 1 << 20;

        // Zero bbos port
        config.bbos_port = 0;
        assert!(config.validate().is_err());
        config.bbos_port = 12345;

        // Bad log level
        config.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_epochs_and_keys_are_valid() {
        let mut config = valid_config();
        config.nepochs = 0;
        config.nkeys = 0;
        config.valsz = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = valid_config();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: RunConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.nepochs, deserialized.nepochs);
        assert_eq!(config.nkeys, deserialized.nkeys);
        assert_eq!(config.bbos_hostname, deserialized.bbos_hostname);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "nepochs = 2\nnkeys = 16\nlogrotation = true").unwrap();

        let config = RunConfig::from_file(file.path()).unwrap();
        assert_eq!(config.nepochs, 2);
        assert_eq!(config.nkeys, 16);
        assert!(config.logrotation);
        // Unspecified fields keep their defaults
        assert_eq!(config.keysz, 8);
        assert_eq!(config.timeout_secs, 300);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = RunConfig::from_file(std::path::Path::new("/nonexistent/plfsbench.toml"));
        assert!(matches!(err, Err(ConfigError::ReadError(_))));
    }
}
