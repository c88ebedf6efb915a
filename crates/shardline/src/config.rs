//! TOML configuration for the shardline CLI.
//!
//! Every section is optional. Command-line flags override file values.

use std::path::Path;

use serde::Deserialize;
use shardline_erasure::suggest_config;
use shardline_stream::config::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_STALE_FRAMES};
use shardline_stream::{ReaderConfig, WriterConfig};

/// Data shards used when neither the file nor the flags say otherwise.
pub const DEFAULT_DATA_SHARDS: usize = 17;

/// Parity shards used when neither the file nor the flags say otherwise.
pub const DEFAULT_PARITY_SHARDS: usize = 3;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Erasure coding parameters.
    pub erasure: ErasureSection,
    /// Chunking and reader tuning.
    pub stream: StreamSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[erasure]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ErasureSection {
    /// Number of data shards.
    pub data: Option<usize>,
    /// Number of parity shards. `0` selects the plain splitter.
    pub parity: Option<usize>,
    /// Number of independent shard targets (disks, nodes). When set, data
    /// and parity default to [`suggest_config`] for this many targets.
    pub targets: Option<usize>,
}

/// `[stream]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StreamSection {
    /// Chunk size in bytes.
    pub chunk_size: Option<usize>,
    /// Stale frames a shard may skip per chunk before it is dropped.
    pub max_stale_frames: Option<usize>,
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or use defaults if no path given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)?;
                let config: CliConfig = toml::from_str(&content)?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Effective `(data, parity)` shard counts.
    ///
    /// Explicit counts win; otherwise the target count picks them, falling
    /// back to 17 data + 3 parity.
    pub fn erasure_params(&self) -> (usize, usize) {
        let (data, parity) = match self.erasure.targets {
            Some(targets) => suggest_config(targets),
            None => (DEFAULT_DATA_SHARDS, DEFAULT_PARITY_SHARDS),
        };
        (
            self.erasure.data.unwrap_or(data),
            self.erasure.parity.unwrap_or(parity),
        )
    }

    /// Effective chunk size (config value or 10 MB default).
    pub fn chunk_size(&self) -> usize {
        self.stream.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig::with_chunk_size(self.chunk_size())
    }

    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            max_stale_frames: self
                .stream
                .max_stale_frames
                .unwrap_or(DEFAULT_MAX_STALE_FRAMES),
            ..ReaderConfig::default()
        }
    }
}
