use std::fmt;
use std::num::ParseFloatError;
use std::str::FromStr;

use crate::transport::TransportError;

/// Lowest accepted flow setpoint in sccm.
pub const SETPOINT_MIN: f64 = 0.0;
/// Highest accepted flow setpoint in sccm.
pub const SETPOINT_MAX: f64 = 50.0;

#[derive(Debug, thiserror::Error)]
pub enum SetpointError {
    #[error("Setpoint must be between {min} and {max} sccm, got {value}")]
    OutOfRange { value: f64, min: f64, max: f64 },

    #[error("Setpoint is not a number: {0}")]
    Parse(#[from] ParseFloatError),

    #[error("Device is disconnected, setpoint writes are disabled")]
    Disconnected,

    #[error("Failed to write setpoint: {0}")]
    Transport(#[from] TransportError),
}

/// A flow setpoint that has passed range validation.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Setpoint(f64);

impl Setpoint {
    pub const ZERO: Self = Self(SETPOINT_MIN);

    pub fn new(value: f64) -> Result<Self, SetpointError> {
        // NaN fails the range check as well
        if (SETPOINT_MIN..=SETPOINT_MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(SetpointError::OutOfRange {
                value,
                min: SETPOINT_MIN,
                max: SETPOINT_MAX,
            })
        }
    }

    /// Accepts a value already read back from the device without range checks.
    ///
    /// The device may report a setpoint configured outside this tool's allowed range;
    /// it is kept as-is so a reconnection restores what the device had.
    pub(crate) fn from_device(value: f64) -> Self {
        Self(value)
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl FromStr for Setpoint {
    type Err = SetpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f64 = s.trim().parse()?;
        Self::new(value)
    }
}

impl fmt::Display for Setpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} sccm", self.0)
    }
}
