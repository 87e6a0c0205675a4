//! Engine configuration.

use eyre::{eyre, Result};

/// Tuning for the flush-protection latch, which defers deletion propagation
/// when the upstream transiently reports a near-empty pool (node restart).
#[derive(Clone, Copy, Debug)]
pub struct FlushProtectionConfig {
    /// Pre-pass cache size must exceed this for the latch to arm.
    pub min_before_size: usize,
    /// Arm when `upstream / before` is at or below this ratio.
    pub ratio_threshold: f64,
    /// How long deletions stay suppressed once armed, in milliseconds.
    pub cooldown_ms: u64,
}

impl Default for FlushProtectionConfig {
    fn default() -> Self {
        Self {
            min_before_size: 20_000,
            ratio_threshold: 0.80,
            cooldown_ms: 120_000,
        }
    }
}

/// Configuration for one [`crate::engine::MempoolSync`] instance.
#[derive(Clone, Copy, Debug)]
pub struct SyncConfig {
    /// Nominal pass period; the per-pass fetch budget is ten times this.
    pub refresh_rate_ms: u64,
    /// Rate smoothing window in seconds.
    pub rate_window_seconds: u64,
    /// Flush-protection tuning.
    pub flush_protection: FlushProtectionConfig,
    /// Capacity of the latest-arrivals list.
    pub latest_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            refresh_rate_ms: 2_000,
            rate_window_seconds: 150,
            flush_protection: FlushProtectionConfig::default(),
            latest_capacity: 6,
        }
    }
}

impl SyncConfig {
    /// Worst-case duration of a single reconciliation pass, in milliseconds.
    pub fn pass_budget_ms(&self) -> u64 {
        self.refresh_rate_ms.saturating_mul(10)
    }

    /// Rejects configurations the engine cannot run with.
    ///
    /// # Errors
    /// Returns error on a zero refresh rate, a zero rate window, a zero
    /// latest capacity, or a flush ratio outside `(0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if self.refresh_rate_ms == 0 {
            return Err(eyre!("refresh_rate_ms must be positive"));
        }
        if self.rate_window_seconds == 0 {
            return Err(eyre!("rate_window_seconds must be positive"));
        }
        if self.latest_capacity == 0 {
            return Err(eyre!("latest_capacity must be positive"));
        }

        let ratio = self.flush_protection.ratio_threshold;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(eyre!(
                "flush_protection.ratio_threshold must be within (0, 1], got {}",
                ratio
            ));
        }

        Ok(())
    }
}
