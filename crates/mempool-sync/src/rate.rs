//! Arrival-rate tracking over a sliding sample window.
//!
//! Two append-only buffers record one sample per newly ingested transaction:
//! the arrival timestamp and the `(timestamp, vsize)` pair. A periodic tick
//! prunes expired samples and recomputes the smoothed rates.

use std::collections::VecDeque;

use serde::Serialize;

/// Smoothed arrival rates over the configured window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct RateEstimate {
    /// New transactions per second.
    pub tx_per_second: f64,
    /// New virtual bytes per second, rounded to the nearest integer.
    pub vbytes_per_second: u64,
}

/// Maintains the sample buffers and the latest estimate.
pub struct RateTracker {
    window_seconds: u64,
    arrivals: VecDeque<u64>,
    vsizes: VecDeque<(u64, f64)>,
    estimate: RateEstimate,
}

impl RateTracker {
    pub fn new(window_seconds: u64) -> Self {
        Self {
            window_seconds,
            arrivals: VecDeque::new(),
            vsizes: VecDeque::new(),
            estimate: RateEstimate::default(),
        }
    }

    /// Records one newly ingested transaction. The caller gates this on the
    /// engine being in sync; backlog ingested during initial catch-up is not
    /// an arrival.
    pub fn record(&mut self, now_ms: u64, vsize: f64) {
        self.arrivals.push_back(now_ms);
        self.vsizes.push_back((now_ms, vsize));
    }

    /// Prunes samples older than the window and recomputes the estimate.
    /// Driven at 1 Hz.
    pub fn tick(&mut self, now_ms: u64) {
        let cutoff = now_ms.saturating_sub(self.window_seconds * 1000);

        while self.arrivals.front().is_some_and(|ts| *ts <= cutoff) {
            self.arrivals.pop_front();
        }
        while self.vsizes.front().is_some_and(|(ts, _)| *ts <= cutoff) {
            self.vsizes.pop_front();
        }

        let window = self.window_seconds as f64;
        let total_vsize: f64 = self.vsizes.iter().map(|(_, vsize)| vsize).sum();

        self.estimate = RateEstimate {
            tx_per_second: self.arrivals.len() as f64 / window,
            vbytes_per_second: (total_vsize / window).round() as u64,
        };
    }

    /// The estimate computed by the most recent tick.
    pub fn estimate(&self) -> RateEstimate {
        self.estimate
    }

    /// Number of samples currently inside the window.
    pub fn sample_count(&self) -> usize {
        self.arrivals.len()
    }
}
