//! Per-sample timestamp reconstruction and sampling-rate bookkeeping.
//!
//! The firmware only reports how long each block took to acquire, not when
//! each sample was taken. The host therefore stamps a block on arrival and
//! spreads its samples uniformly over the preceding `duration_micros`.
//! Intra-block jitter on the microcontroller is invisible to this scheme; the
//! resulting error is bounded by one block duration.

use crate::protocol::Block;
use serde::Serialize;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Timestamps for `count` samples of a block that finished arriving at `arrival_s`.
///
/// Sample `i` gets `arrival_s - duration + (i / count) * duration`.
pub fn sample_times(
    arrival_s: f64,
    duration_micros: u32,
    count: usize,
) -> impl Iterator<Item = f64> {
    let duration_s = f64::from(duration_micros) / 1_000_000.0;
    let block_start = arrival_s - duration_s;
    (0..count).map(move |i| block_start + (i as f64 / count as f64) * duration_s)
}

/// Why no average sampling rate could be derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateUnavailable {
    #[error("no block information available")]
    NoBlocks,
    #[error("total block duration is 0")]
    ZeroDuration,
}

/// Sample counts and durations of every accepted block.
///
/// The average rate is a single scalar over the whole run, which assumes the
/// block rate stayed roughly constant. A drifting rate biases both spectral
/// and stability results; that is accepted rather than corrected.
#[derive(Debug, Default, Clone, Serialize)]
pub struct BlockLedger {
    sample_counts: Vec<u16>,
    durations_micros: Vec<u32>,
}

impl BlockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, block: &Block) {
        self.sample_counts.push(block.sample_count);
        self.durations_micros.push(block.duration_micros);
    }

    /// Number of blocks recorded.
    pub fn len(&self) -> usize {
        self.sample_counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_counts.is_empty()
    }

    pub fn total_samples(&self) -> u64 {
        self.sample_counts.iter().map(|&n| u64::from(n)).sum()
    }

    pub fn total_duration_s(&self) -> f64 {
        self.durations_micros.iter().map(|&d| u64::from(d)).sum::<u64>() as f64 / 1_000_000.0
    }

    /// Total samples over total block duration, in Hz.
    pub fn average_rate(&self) -> Result<f64, RateUnavailable> {
        if self.is_empty() {
            return Err(RateUnavailable::NoBlocks);
        }
        let duration = self.total_duration_s();
        if duration <= 0.0 {
            return Err(RateUnavailable::ZeroDuration);
        }
        Ok(self.total_samples() as f64 / duration)
    }
}

/// Monotonic time source for the acquisition loop.
pub trait Clock {
    /// Seconds since the clock's origin.
    fn now_s(&self) -> f64;

    fn sleep(&self, duration: Duration);
}

/// Wall-clock monotonic time backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_s(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A clock that only moves when told to; sleeping advances it instantly.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<f64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        self.now.set(self.now.get() + duration.as_secs_f64());
    }
}

impl Clock for ManualClock {
    fn now_s(&self) -> f64 {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Longest uninterrupted nap taken by [`sleep_unless_stopped`].
const STOP_POLL: Duration = Duration::from_millis(50);

/// Sleeps for `duration` in short slices, checking `stop` between them.
///
/// Returns `false` as soon as the flag is seen raised, `true` if the full
/// duration passed.
pub fn sleep_unless_stopped<C: Clock + ?Sized>(clock: &C, duration: Duration, stop: &AtomicBool) -> bool {
    let mut remaining = duration;
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        if remaining.is_zero() {
            return true;
        }
        let nap = remaining.min(STOP_POLL);
        clock.sleep(nap);
        remaining -= nap;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_span_the_block_ending_at_arrival() {
        let times: Vec<f64> = sample_times(10.0, 40_000, 4).collect();
        let expected = [9.96, 9.97, 9.98, 9.99];
        for (t, e) in times.iter().zip(expected) {
            assert!((t - e).abs() < 1e-12, "{t} vs {e}");
        }
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn zero_duration_collapses_to_arrival() {
        assert!(sample_times(3.0, 0, 5).all(|t| t == 3.0));
    }

    #[test]
    fn average_rate_sums_all_blocks() {
        let mut ledger = BlockLedger::new();
        assert_eq!(ledger.average_rate(), Err(RateUnavailable::NoBlocks));

        ledger.record(&Block::new(100_000, vec![1; 100]).unwrap());
        ledger.record(&Block::new(300_000, vec![1; 100]).unwrap());
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.total_samples(), 200);
        assert!((ledger.average_rate().unwrap() - 500.0).abs() < 1e-9);
    }

    #[test]
    fn zero_total_duration_has_no_rate() {
        let mut ledger = BlockLedger::new();
        ledger.record(&Block::new(0, vec![1, 2]).unwrap());
        assert_eq!(ledger.average_rate(), Err(RateUnavailable::ZeroDuration));
    }

    #[test]
    fn manual_clock_advances_on_sleep() {
        let clock = ManualClock::new();
        clock.sleep(Duration::from_millis(1500));
        assert!((clock.now_s() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn sleep_runs_to_completion_without_stop() {
        let clock = ManualClock::new();
        assert!(sleep_unless_stopped(&clock, Duration::from_millis(2120), &AtomicBool::new(false)));
        assert!((clock.now_s() - 2.12).abs() < 1e-9);
    }

    #[test]
    fn raised_flag_cuts_sleep_short() {
        let clock = ManualClock::new();
        assert!(!sleep_unless_stopped(&clock, Duration::from_secs(2), &AtomicBool::new(true)));
        assert_eq!(clock.now_s(), 0.0);
    }
}
