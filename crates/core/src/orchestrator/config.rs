//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the report orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum reports the service lets run concurrently.
    #[serde(default = "default_max_running_slots")]
    pub max_running_slots: usize,

    /// Maximum reports created per batch.
    /// Capped at `max_running_slots` when batches are planned.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between consecutive report creations (milliseconds).
    #[serde(default = "default_pause_between_creations")]
    pub pause_between_creations_ms: u64,

    /// Pause between batches (milliseconds).
    #[serde(default = "default_pause_between_batches")]
    pub pause_between_batches_ms: u64,

    /// How often to re-count running reports while waiting for slots (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub slot_poll_interval_ms: u64,

    /// How often to sweep the status of active reports (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub status_poll_interval_ms: u64,

    /// Shared deadline for every report of a batch to resolve (milliseconds).
    #[serde(default = "default_max_wait_per_batch")]
    pub max_wait_per_batch_ms: u64,

    /// How long to wait for a whole batch worth of slots (milliseconds).
    #[serde(default = "default_max_wait_for_slots")]
    pub max_wait_for_slots_ms: u64,

    /// How long to wait for a single slot once batch admission failed (milliseconds).
    #[serde(default = "default_single_slot_wait")]
    pub single_slot_wait_ms: u64,

    /// Cooldown after the service rejects a creation for quota reasons (milliseconds).
    #[serde(default = "default_rate_limit_cooldown")]
    pub rate_limit_cooldown_ms: u64,

    /// Remaining-quota level that triggers a warning.
    #[serde(default = "default_low_water")]
    pub rate_limit_low_water: u32,

    /// Remaining-quota level that requires confirmation to continue.
    #[serde(default = "default_critical_water")]
    pub rate_limit_critical_water: u32,

    /// Number of running reports shown while waiting for slots.
    #[serde(default = "default_running_preview_limit")]
    pub running_preview_limit: usize,
}

fn default_max_running_slots() -> usize {
    8
}

fn default_batch_size() -> usize {
    4
}

fn default_pause_between_creations() -> u64 {
    2_000 // 2 seconds
}

fn default_pause_between_batches() -> u64 {
    5_000 // 5 seconds
}

fn default_poll_interval() -> u64 {
    30_000 // 30 seconds
}

fn default_max_wait_per_batch() -> u64 {
    3_600_000 // 1 hour
}

fn default_max_wait_for_slots() -> u64 {
    1_800_000 // 30 minutes
}

fn default_single_slot_wait() -> u64 {
    300_000 // 5 minutes
}

fn default_rate_limit_cooldown() -> u64 {
    60_000 // 1 minute
}

fn default_low_water() -> u32 {
    10
}

fn default_critical_water() -> u32 {
    5
}

fn default_running_preview_limit() -> usize {
    5
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_running_slots: default_max_running_slots(),
            batch_size: default_batch_size(),
            pause_between_creations_ms: default_pause_between_creations(),
            pause_between_batches_ms: default_pause_between_batches(),
            slot_poll_interval_ms: default_poll_interval(),
            status_poll_interval_ms: default_poll_interval(),
            max_wait_per_batch_ms: default_max_wait_per_batch(),
            max_wait_for_slots_ms: default_max_wait_for_slots(),
            single_slot_wait_ms: default_single_slot_wait(),
            rate_limit_cooldown_ms: default_rate_limit_cooldown(),
            rate_limit_low_water: default_low_water(),
            rate_limit_critical_water: default_critical_water(),
            running_preview_limit: default_running_preview_limit(),
        }
    }
}

impl OrchestratorConfig {
    /// Batch size actually used: never zero, never above the slot maximum.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.min(self.max_running_slots).max(1)
    }

    pub fn pause_between_creations(&self) -> Duration {
        Duration::from_millis(self.pause_between_creations_ms)
    }

    pub fn pause_between_batches(&self) -> Duration {
        Duration::from_millis(self.pause_between_batches_ms)
    }

    pub fn slot_poll_interval(&self) -> Duration {
        Duration::from_millis(self.slot_poll_interval_ms)
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }

    pub fn max_wait_per_batch(&self) -> Duration {
        Duration::from_millis(self.max_wait_per_batch_ms)
    }

    pub fn max_wait_for_slots(&self) -> Duration {
        Duration::from_millis(self.max_wait_for_slots_ms)
    }

    pub fn single_slot_wait(&self) -> Duration {
        Duration::from_millis(self.single_slot_wait_ms)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_millis(self.rate_limit_cooldown_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_running_slots, 8);
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.pause_between_creations_ms, 2_000);
        assert_eq!(config.pause_between_batches_ms, 5_000);
        assert_eq!(config.slot_poll_interval_ms, 30_000);
        assert_eq!(config.status_poll_interval_ms, 30_000);
        assert_eq!(config.max_wait_per_batch_ms, 3_600_000);
        assert_eq!(config.max_wait_for_slots_ms, 1_800_000);
        assert_eq!(config.rate_limit_low_water, 10);
        assert_eq!(config.rate_limit_critical_water, 5);
    }

    #[test]
    fn test_deserialize_minimal() {
        let config: OrchestratorConfig = toml::from_str("").unwrap();
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.max_wait_per_batch(), Duration::from_secs(3600));
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            max_running_slots = 4
            batch_size = 2
            pause_between_creations_ms = 100
            pause_between_batches_ms = 200
            slot_poll_interval_ms = 300
            status_poll_interval_ms = 400
            max_wait_per_batch_ms = 500
            max_wait_for_slots_ms = 600
            single_slot_wait_ms = 700
            rate_limit_cooldown_ms = 800
            rate_limit_low_water = 20
            rate_limit_critical_water = 3
            running_preview_limit = 2
        "#;
        let config: OrchestratorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.max_running_slots, 4);
        assert_eq!(config.batch_size, 2);
        assert_eq!(config.pause_between_creations(), Duration::from_millis(100));
        assert_eq!(config.single_slot_wait(), Duration::from_millis(700));
        assert_eq!(config.rate_limit_cooldown(), Duration::from_millis(800));
        assert_eq!(config.rate_limit_critical_water, 3);
        assert_eq!(config.running_preview_limit, 2);
    }

    #[test]
    fn test_effective_batch_size() {
        let mut config = OrchestratorConfig::default();
        assert_eq!(config.effective_batch_size(), 4);

        config.batch_size = 12;
        assert_eq!(config.effective_batch_size(), 8);

        config.batch_size = 0;
        assert_eq!(config.effective_batch_size(), 1);
    }
}
