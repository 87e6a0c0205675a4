//! Flush-protection latch.
//!
//! When a node restarts it transiently reports a near-empty mempool. Without
//! protection the engine would propagate thousands of deletions that the
//! node re-publishes within seconds. The latch suppresses deletion
//! propagation for a cooldown period instead.

use crate::config::FlushProtectionConfig;

/// Latch states. `Armed` preserves the cache as-is during classification;
/// `Cooling` marks the first normally-classifying pass after the cooldown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LatchState {
    Idle,
    Armed,
    Cooling,
}

pub struct FlushLatch {
    config: FlushProtectionConfig,
    state: LatchState,
    cooldown_deadline_ms: u64,
}

impl FlushLatch {
    pub fn new(config: FlushProtectionConfig) -> Self {
        Self {
            config,
            state: LatchState::Idle,
            cooldown_deadline_ms: 0,
        }
    }

    pub fn state(&self) -> LatchState {
        self.state
    }

    /// Advances the cooldown timer. Called once at the start of every pass;
    /// moves `Armed` to `Cooling` once the deadline has passed.
    pub fn advance(&mut self, now_ms: u64) {
        if self.state == LatchState::Armed && now_ms >= self.cooldown_deadline_ms {
            self.state = LatchState::Cooling;
        }
    }

    /// Evaluates the arm predicate against the pre-pass cache size.
    ///
    /// Returns true when the latch armed this pass; the caller clears the
    /// in-sync flag. Re-triggering while armed or cooling is a no-op.
    pub fn try_arm(&mut self, now_ms: u64, before_size: usize, upstream_size: usize) -> bool {
        if self.state != LatchState::Idle {
            return false;
        }
        if before_size <= self.config.min_before_size {
            return false;
        }

        let ratio = upstream_size as f64 / before_size as f64;
        if ratio > self.config.ratio_threshold {
            return false;
        }

        self.state = LatchState::Armed;
        self.cooldown_deadline_ms = now_ms.saturating_add(self.config.cooldown_ms);
        true
    }

    /// Whether this pass must keep the cache unchanged during
    /// classification.
    pub fn suppresses_deletions(&self) -> bool {
        self.state == LatchState::Armed
    }

    /// Resets `Cooling` to `Idle`. Called by the pass that classified
    /// normally after the cooldown.
    pub fn settle(&mut self) {
        if self.state == LatchState::Cooling {
            self.state = LatchState::Idle;
        }
    }
}
