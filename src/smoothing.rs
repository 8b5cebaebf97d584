//! Rolling-window smoothing of the power signal.
//!
//! A fixed-capacity FIFO of recent samples; each observation returns the mean
//! and median of everything currently held.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// One instantaneous power measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PowerSample {
    pub value_w: f64,
    pub observed_at: DateTime<Utc>,
}

/// Summary statistics over the window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SmoothedPower {
    pub mean_w: f64,
    pub median_w: f64,
}

/// Fixed-capacity FIFO; the oldest sample is evicted on overflow
#[derive(Debug, Clone)]
pub struct RollingWindow {
    samples: VecDeque<PowerSample>,
    capacity: usize,
}

/// Samples allocated up front; larger windows grow on demand
const PREALLOC_SAMPLES: usize = 1024;

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(PREALLOC_SAMPLES)),
            capacity,
        }
    }

    pub fn push(&mut self, sample: PowerSample) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Change capacity, keeping the most recent samples that still fit
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&PowerSample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PowerSample> {
        self.samples.iter()
    }

    /// Mean and median of the held samples; `None` when empty
    pub fn stats(&self) -> Option<SmoothedPower> {
        if self.samples.is_empty() {
            return None;
        }
        let n = self.samples.len();
        let mean_w = self.samples.iter().map(|s| s.value_w).sum::<f64>() / n as f64;

        let mut sorted: Vec<f64> = self.samples.iter().map(|s| s.value_w).collect();
        sorted.sort_by(f64::total_cmp);
        let mid = n / 2;
        let median_w = if n % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        Some(SmoothedPower { mean_w, median_w })
    }
}

/// Owns the rolling window for the lifetime of the control loop
#[derive(Debug, Clone)]
pub struct Smoother {
    window: RollingWindow,
}

impl Smoother {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: RollingWindow::new(capacity),
        }
    }

    /// Append a sample and summarize the window including it
    pub fn observe(&mut self, sample: PowerSample) -> SmoothedPower {
        self.window.push(sample);
        // The window holds at least the sample just pushed
        self.window.stats().unwrap_or(SmoothedPower {
            mean_w: sample.value_w,
            median_w: sample.value_w,
        })
    }

    pub fn resize(&mut self, capacity: usize) {
        if capacity.max(1) != self.window.capacity() {
            self.window.set_capacity(capacity);
        }
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn s(v: f64, secs: i64) -> PowerSample {
        PowerSample {
            value_w: v,
            observed_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    #[test]
    fn single_sample_mean_equals_median() {
        let mut sm = Smoother::new(5);
        let out = sm.observe(s(1234.0, 0));
        assert_eq!(out.mean_w, 1234.0);
        assert_eq!(out.median_w, 1234.0);
    }

    #[test]
    fn even_count_median_averages_middle_values() {
        let mut sm = Smoother::new(10);
        sm.observe(s(100.0, 0));
        sm.observe(s(400.0, 1));
        sm.observe(s(200.0, 2));
        let out = sm.observe(s(300.0, 3));
        assert_eq!(out.median_w, 250.0);
        assert_eq!(out.mean_w, 250.0);
    }

    #[test]
    fn window_never_exceeds_capacity() {
        let mut sm = Smoother::new(3);
        for i in 0..20 {
            sm.observe(s(i as f64, i));
            assert!(sm.window().len() <= 3);
        }
        // only 17, 18, 19 remain
        let out = sm.window().stats().unwrap();
        assert_eq!(out.mean_w, 18.0);
        assert_eq!(out.median_w, 18.0);
        assert_eq!(sm.window().latest().unwrap().value_w, 19.0);
    }

    #[test]
    fn huge_capacity_allocates_lazily() {
        let mut sm = Smoother::new(usize::MAX);
        assert_eq!(sm.window().capacity(), usize::MAX);
        let out = sm.observe(s(7.0, 0));
        assert_eq!(out.mean_w, 7.0);
        assert_eq!(sm.window().len(), 1);
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let mut sm = Smoother::new(0);
        sm.observe(s(1.0, 0));
        let out = sm.observe(s(5.0, 1));
        assert_eq!(sm.window().capacity(), 1);
        assert_eq!(out.mean_w, 5.0);
    }

    #[test]
    fn shrinking_keeps_most_recent() {
        let mut sm = Smoother::new(5);
        for (i, v) in [10.0, 20.0, 30.0, 40.0, 50.0].into_iter().enumerate() {
            sm.observe(s(v, i as i64));
        }
        sm.resize(2);
        let vals: Vec<f64> = sm.window().iter().map(|p| p.value_w).collect();
        assert_eq!(vals, vec![40.0, 50.0]);
    }

    #[test]
    fn outlier_moves_mean_not_median() {
        let mut sm = Smoother::new(5);
        for (i, v) in [2000.0, 2010.0, 1990.0, 2005.0].into_iter().enumerate() {
            sm.observe(s(v, i as i64));
        }
        let out = sm.observe(s(100.0, 5));
        assert!(out.mean_w < 1700.0);
        assert_eq!(out.median_w, 2000.0);
    }
}
