use chrono::{DateTime, Utc};

use crate::status_code::DeviceStatus;

/// One acquisition cycle's worth of readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    timestamp: DateTime<Utc>,
    setpoint: f64,
    measured: f64,
    temperature: f64,
    status: DeviceStatus,
}

impl Sample {
    pub fn new(
        timestamp: DateTime<Utc>,
        setpoint: f64,
        measured: f64,
        temperature: f64,
        status: DeviceStatus,
    ) -> Self {
        Self {
            timestamp,
            setpoint,
            measured,
            temperature,
            status,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Seconds since the unix epoch, with microsecond resolution.
    pub fn unix_timestamp(&self) -> f64 {
        self.timestamp.timestamp_micros() as f64 / 1_000_000.0
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    pub fn measured(&self) -> f64 {
        self.measured
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }
}
