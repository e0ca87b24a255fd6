//! Fixed-range latency histogram.
//!
//! One bucket per integer millisecond in `0..=10_000` plus a single overflow
//! bucket. Buckets only ever grow within a buffer's lifetime, the total
//! always equals the sum of the buckets, and two histograms merge
//! bucket-wise into the histogram of the concatenated sample stream.

use std::fmt;

/// Largest latency tracked with full resolution, in milliseconds.
pub const MAX_TRACKED_MILLIS: u64 = 10_000;

const BUCKETS: usize = MAX_TRACKED_MILLIS as usize + 2;
const OVERFLOW: usize = BUCKETS - 1;

/// A percentile answer. Samples past the tracked range surface as `OverMax`
/// and are formatted as "greater than the maximum".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PercentileValue {
    Millis(u64),
    OverMax,
}

impl fmt::Display for PercentileValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PercentileValue::Millis(ms) => write!(f, "{}ms", ms),
            PercentileValue::OverMax => write!(f, ">{}ms", MAX_TRACKED_MILLIS),
        }
    }
}

/// Bucketed latency histogram with percentile queries.
#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    buckets: Box<[u64]>,
    total: u64,
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyHistogram {
    pub fn new() -> Self {
        Self {
            buckets: vec![0; BUCKETS].into_boxed_slice(),
            total: 0,
        }
    }

    /// Records one sample. Negative values clamp to zero; values past
    /// [`MAX_TRACKED_MILLIS`] land in the overflow bucket.
    pub fn record(&mut self, millis: i64) {
        let millis = millis.max(0) as u64;
        let idx = if millis > MAX_TRACKED_MILLIS {
            OVERFLOW
        } else {
            millis as usize
        };
        self.buckets[idx] += 1;
        self.total += 1;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Zeroes every bucket and the total.
    pub fn reset(&mut self) {
        self.buckets.fill(0);
        self.total = 0;
    }

    /// Adds `other`'s buckets into this histogram.
    pub fn merge_from(&mut self, other: &LatencyHistogram) {
        for (dst, src) in self.buckets.iter_mut().zip(other.buckets.iter()) {
            *dst += src;
        }
        self.total += other.total;
    }

    /// Smallest bucket whose cumulative count reaches `ceil(p * total)`.
    /// Returns `None` when the histogram is empty. `p` is a fraction in
    /// `(0, 1]`.
    pub fn percentile(&self, p: f64) -> Option<PercentileValue> {
        if self.total == 0 {
            return None;
        }
        let rank = ((p * self.total as f64).ceil() as u64).max(1);
        let mut cumulative = 0u64;
        for (idx, &count) in self.buckets.iter().enumerate() {
            cumulative += count;
            if cumulative >= rank {
                return Some(if idx == OVERFLOW {
                    PercentileValue::OverMax
                } else {
                    PercentileValue::Millis(idx as u64)
                });
            }
        }
        // total > 0 guarantees the cumulative walk reaches the rank.
        Some(PercentileValue::OverMax)
    }

    #[cfg(test)]
    fn bucket_sum(&self) -> u64 {
        self.buckets.iter().sum()
    }
}
