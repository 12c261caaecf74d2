/*!
Engine-facing configuration.

This module defines the subset of the recognized configuration options
that the *engine* consumes directly: writer tuning, compaction policy,
retry/timeout limits, and cache TTL. Loading these values from a file or
environment, and the `s3.*` / `catalog.*` options that wire up the
object store and catalog implementations, is the external transport
layer's job — this crate only needs somewhere to receive the parsed
values.
*/

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Named deployment profile. Selects the defaults for opportunistic
/// compaction checks, which the source specifies per-environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local/developer environment: checks and compacts aggressively.
    Dev,
    /// Staging environment: a middle ground.
    Staging,
    /// Production environment: checks least often, compacts only once
    /// files have meaningfully accumulated.
    Prod,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Prod
    }
}

/// Tuning for the [`crate::writer::Writer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WriterConfig {
    /// Target size, in MiB, for a single data file.
    pub target_file_size_mb: u64,
    /// Compression codec applied to data files.
    pub compression_codec: String,
    /// Row group size hint passed to the underlying columnar writer.
    pub row_group_size: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            target_file_size_mb: 128,
            compression_codec: "zstd".to_string(),
            row_group_size: 100_000,
        }
    }
}

/// Policy governing opportunistic detection and explicit compaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CompactionConfig {
    /// Files smaller than this, in MiB, count towards `small_files_count`.
    pub small_file_threshold_mb: u64,
    /// Minimum number of small files before compaction is recommended
    /// (or, for an explicit `COMPACT` without `force`, before it runs).
    pub min_files_to_compact: usize,
    /// The writer performs the opportunistic file-count check every Nth
    /// successful write.
    pub opportunistic_check_interval: u64,
    /// Upper bound on files rewritten by a single `COMPACT` call.
    pub max_files_per_compaction: usize,
    /// Default retention window, in hours, for `expire_snapshots`.
    pub snapshot_retention_hours: u64,
}

impl CompactionConfig {
    /// Defaults as specified per deployment environment: dev checks (and
    /// compacts) aggressively, staging moderately, prod conservatively.
    pub fn for_environment(env: Environment) -> Self {
        let (interval, min_files) = match env {
            Environment::Dev => (5, 3),
            Environment::Staging => (75, 15),
            Environment::Prod => (100, 20),
        };
        CompactionConfig {
            small_file_threshold_mb: 64,
            min_files_to_compact: min_files,
            opportunistic_check_interval: interval,
            max_files_per_compaction: 500,
            snapshot_retention_hours: 168,
        }
    }
}

impl Default for CompactionConfig {
    fn default() -> Self {
        CompactionConfig::for_environment(Environment::default())
    }
}

/// Retry and batching limits shared across components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PerformanceConfig {
    /// Maximum number of commit retries after a catalog conflict.
    pub max_retries: u32,
    /// Soft deadline for a query, in milliseconds.
    pub query_timeout_ms: u64,
    /// Preferred row batch size for writes and scans.
    pub batch_size: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        PerformanceConfig {
            max_retries: 3,
            query_timeout_ms: 30_000,
            batch_size: 10_000,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EngineConfig {
    /// Deployment profile; governs [`CompactionConfig`] defaults when
    /// not overridden explicitly.
    pub environment: Environment,
    /// Writer tuning.
    pub writer: WriterConfig,
    /// Compaction policy.
    pub compaction: CompactionConfig,
    /// Retry/timeout/batching limits.
    pub performance: PerformanceConfig,
    /// TTL, in seconds, for the hot metadata cache.
    pub cache_ttl_secs: u64,
    /// Deadline for read operations (`QUERY`, `DESCRIBE_TABLE`, `LIST_TABLES`).
    pub read_timeout_secs: u64,
    /// Deadline for write operations (`WRITE`, `UPDATE`, `DELETE`, `HARD_DELETE`, `CREATE_TABLE`).
    pub write_timeout_secs: u64,
    /// Deadline for `COMPACT`.
    pub compaction_timeout_secs: u64,
}

impl EngineConfig {
    /// Build the defaults for a given deployment environment.
    pub fn for_environment(environment: Environment) -> Self {
        EngineConfig {
            environment,
            writer: WriterConfig::default(),
            compaction: CompactionConfig::for_environment(environment),
            performance: PerformanceConfig::default(),
            cache_ttl_secs: 5,
            read_timeout_secs: 30,
            write_timeout_secs: 60,
            compaction_timeout_secs: 900,
        }
    }

    /// The hot metadata cache TTL as a [`Duration`].
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// The deadline for read operations as a [`Duration`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// The deadline for write operations as a [`Duration`].
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// The deadline for compaction as a [`Duration`].
    pub fn compaction_timeout(&self) -> Duration {
        Duration::from_secs(self.compaction_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::for_environment(Environment::default())
    }
}
