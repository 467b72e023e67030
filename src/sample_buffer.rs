use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use polars::prelude::*;

use crate::sample::Sample;

/// Number of points kept for display when nothing else is configured.
pub const DEFAULT_CAPACITY: usize = 600;

pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const SETPOINT_COLUMN: &str = "setpoint";
pub const MEASURED_COLUMN: &str = "measured";
pub const TEMPERATURE_COLUMN: &str = "temperature";
pub const STATUS_COLUMN: &str = "status";

#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("Sample buffer capacity must be at least 1")]
    ZeroCapacity,
}

/// Fixed-capacity rolling history of samples, oldest first.
///
/// The acquisition loop is the only writer. Any number of readers may take snapshots
/// concurrently; a snapshot never contains a partially inserted sample.
#[derive(Debug)]
pub struct SampleBuffer {
    capacity: usize,
    samples: RwLock<VecDeque<Sample>>,
}

impl SampleBuffer {
    pub fn with_capacity(capacity: usize) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::ZeroCapacity);
        }
        Ok(Self {
            capacity,
            samples: RwLock::new(VecDeque::with_capacity(capacity)),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Appends a sample, evicting the oldest one when full.
    pub fn push(&self, sample: Sample) {
        let mut samples = self.write();
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn latest(&self) -> Option<Sample> {
        self.read().back().copied()
    }

    /// Copy of the current contents in acquisition order.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.read().iter().copied().collect()
    }

    /// Trailing-window means of the measured values.
    ///
    /// Only full windows produce an output, so the result has `len - window + 1` points.
    /// Returns an empty vector when the window is zero or larger than the history; callers
    /// fall back to the raw series in that case.
    pub fn moving_average(&self, window: usize) -> Vec<f64> {
        let measured: Vec<f64> = self.read().iter().map(Sample::measured).collect();
        trailing_means(&measured, window)
    }

    /// Measured series for plotting, optionally smoothed.
    ///
    /// Averaged points are stamped with the time of the newest sample in their window.
    /// Falls back to the raw series while there is not enough data for the window.
    pub fn measured_series(&self, smoothing: Option<usize>) -> Vec<(DateTime<Utc>, f64)> {
        let samples = self.snapshot();
        if let Some(window) = smoothing {
            let measured: Vec<f64> = samples.iter().map(Sample::measured).collect();
            let means = trailing_means(&measured, window);
            if !means.is_empty() {
                return samples[window - 1..]
                    .iter()
                    .map(Sample::timestamp)
                    .zip(means)
                    .collect();
            }
        }
        samples
            .iter()
            .map(|sample| (sample.timestamp(), sample.measured()))
            .collect()
    }

    pub fn setpoint_series(&self) -> Vec<(DateTime<Utc>, f64)> {
        self.read()
            .iter()
            .map(|sample| (sample.timestamp(), sample.setpoint()))
            .collect()
    }

    /// Snapshot as a DataFrame with one row per sample.
    pub fn to_frame(&self) -> PolarsResult<DataFrame> {
        let samples = self.snapshot();

        polars::df!(
            TIMESTAMP_COLUMN => samples.iter().map(Sample::unix_timestamp).collect::<Vec<f64>>(),
            SETPOINT_COLUMN => samples.iter().map(Sample::setpoint).collect::<Vec<f64>>(),
            MEASURED_COLUMN => samples.iter().map(Sample::measured).collect::<Vec<f64>>(),
            TEMPERATURE_COLUMN => samples.iter().map(Sample::temperature).collect::<Vec<f64>>(),
            STATUS_COLUMN => samples.iter().map(|s| s.status().mask()).collect::<Vec<u32>>()
        )
    }

    // A panicking reader cannot leave the deque half-modified, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, VecDeque<Sample>> {
        self.samples.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, VecDeque<Sample>> {
        self.samples.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn trailing_means(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || values.len() < window {
        return Vec::new();
    }
    let divisor = window as f64;
    values
        .windows(window)
        .map(|chunk| chunk.iter().sum::<f64>() / divisor)
        .collect()
}
