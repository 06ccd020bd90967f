//! Table-level configuration: every tunable knob collected into one
//! struct, constructed with sensible defaults and overridden with a
//! builder.

use crate::checkpoint::CheckpointPolicy;
use crate::maintenance::DEFAULT_RETENTION_MILLIS;
use crate::retry::RetryPolicy;
use crate::row::DataType;

#[derive(Debug, Clone, PartialEq)]
pub struct TableConfig {
    pub checkpoint_policy: CheckpointPolicy,
    /// Minimum age, in milliseconds, before a pre-checkpoint log version
    /// becomes eligible for cleanup.
    pub log_retention_millis: i64,
    /// `None` means CDC retention is unbounded (no age-based GC of change
    /// files beyond what vacuum-adjacent tooling decides).
    pub cdc_retention_millis: Option<u64>,
    /// Tombstone age before vacuum may physically delete a removed file.
    pub vacuum_retention_millis: i64,
    pub retry_policy: RetryPolicy,
    /// Target size, in bytes, compaction bins small files up to.
    pub compaction_target_size_bytes: u64,
    /// Mirrors `delta.enableChangeDataFeed` on the table's `Metadata`.
    pub cdc_enabled: bool,
    /// Dotted field paths to shred out of their VARIANT column into the zone
    /// map at write time, so a predicate against that nested path can
    /// skip files the same way a top-level column comparison does. Each
    /// entry is the path plus the runtime type a value must have to be
    /// shredded.
    pub shredded_fields: Vec<(String, DataType)>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            checkpoint_policy: CheckpointPolicy::default(),
            log_retention_millis: 7 * 24 * 60 * 60 * 1000,
            cdc_retention_millis: None,
            vacuum_retention_millis: DEFAULT_RETENTION_MILLIS,
            retry_policy: RetryPolicy::default(),
            compaction_target_size_bytes: 128 * 1024 * 1024,
            cdc_enabled: false,
            shredded_fields: Vec::new(),
        }
    }
}

impl TableConfig {
    /// Fast thresholds for tests: small checkpoint interval, near-zero
    /// retention windows, no retries by default so failures surface
    /// immediately instead of being retried away.
    pub fn testing() -> Self {
        Self {
            checkpoint_policy: CheckpointPolicy::testing(),
            log_retention_millis: 0,
            cdc_retention_millis: None,
            vacuum_retention_millis: 0,
            retry_policy: RetryPolicy::default(),
            compaction_target_size_bytes: 1024,
            cdc_enabled: false,
            shredded_fields: Vec::new(),
        }
    }

    pub fn with_shredded_field(mut self, path: impl Into<String>, data_type: DataType) -> Self {
        self.shredded_fields.push((path.into(), data_type));
        self
    }

    pub fn with_checkpoint_policy(mut self, policy: CheckpointPolicy) -> Self {
        self.checkpoint_policy = policy;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_vacuum_retention_millis(mut self, millis: i64) -> Self {
        self.vacuum_retention_millis = millis;
        self
    }

    pub fn with_compaction_target_size_bytes(mut self, bytes: u64) -> Self {
        self.compaction_target_size_bytes = bytes;
        self
    }

    pub fn with_cdc_enabled(mut self, enabled: bool) -> Self {
        self.cdc_enabled = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn testing_preset_uses_tight_thresholds() {
        let config = TableConfig::testing();
        assert_eq!(config.checkpoint_policy.interval, 2);
        assert_eq!(config.vacuum_retention_millis, 0);
    }

    #[test]
    fn builder_overrides_individual_fields() {
        let config = TableConfig::default().with_cdc_enabled(true).with_compaction_target_size_bytes(4096);
        assert!(config.cdc_enabled);
        assert_eq!(config.compaction_target_size_bytes, 4096);
        assert_eq!(config.vacuum_retention_millis, TableConfig::default().vacuum_retention_millis);
    }
}
