use std::fmt;

use serde::Deserialize;

/// Any failure while talking to the device. All of them mean the link is unusable.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Device did not answer within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Malformed response from device: {0}")]
    MalformedResponse(String),

    #[error("Transport is closed")]
    Closed,
}

/// Blocking access to one opened mass-flow controller.
///
/// Implementations wrap a vendor protocol driver. Every call may fail with a
/// [`TransportError`], after which the handle is considered dead and is dropped.
pub trait Transport: Send {
    /// Raw status bitmask, see [`crate::status_code::STATUS_CODES`].
    fn read_status(&mut self) -> Result<u32, TransportError>;

    /// Measured flow in the configured user unit.
    fn read_measured(&mut self) -> Result<f64, TransportError>;

    /// Gas temperature in degrees Celsius.
    fn read_temperature(&mut self) -> Result<f64, TransportError>;

    fn read_setpoint(&mut self) -> Result<f64, TransportError>;

    fn write_setpoint(&mut self, value: f64) -> Result<(), TransportError>;

    /// Serial number or similar; used as a liveness check after opening.
    fn read_identifier(&mut self) -> Result<String, TransportError>;

    fn apply_unit(&mut self, unit: &MediumUnit) -> Result<(), TransportError>;

    fn reset(&mut self) -> Result<(), TransportError>;

    /// Releases the link. Dropping the handle must have the same effect.
    fn close(&mut self) {}
}

/// Opens fresh transport handles, once at startup and again for every reconnection attempt.
pub trait Connector {
    type Transport: Transport + 'static;

    fn open(&mut self) -> Result<Self::Transport, TransportError>;

    /// Human-readable location of the device for log messages.
    fn describe(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitPrefix {
    Nano,
    Micro,
    Milli,
    Centi,
    Deci,
    Base,
    Kilo,
}

impl UnitPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitPrefix::Nano => "nano",
            UnitPrefix::Micro => "micro",
            UnitPrefix::Milli => "milli",
            UnitPrefix::Centi => "centi",
            UnitPrefix::Deci => "deci",
            UnitPrefix::Base => "",
            UnitPrefix::Kilo => "kilo",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            UnitPrefix::Nano => "n",
            UnitPrefix::Micro => "u",
            UnitPrefix::Milli => "m",
            UnitPrefix::Centi => "c",
            UnitPrefix::Deci => "d",
            UnitPrefix::Base => "",
            UnitPrefix::Kilo => "k",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowUnit {
    NormLiter,
    StandardLiter,
    #[serde(rename = "standard_liter_15c")]
    StandardLiterAt15C,
    #[serde(rename = "standard_liter_25c")]
    StandardLiterAt25C,
    Liter,
    Gram,
}

impl FlowUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowUnit::NormLiter => "norm liter",
            FlowUnit::StandardLiter => "standard liter",
            FlowUnit::StandardLiterAt15C => "standard liter (15 C)",
            FlowUnit::StandardLiterAt25C => "standard liter (25 C)",
            FlowUnit::Liter => "liter",
            FlowUnit::Gram => "gram",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            FlowUnit::NormLiter => "ln",
            FlowUnit::StandardLiter => "sl",
            FlowUnit::StandardLiterAt15C => "sl15",
            FlowUnit::StandardLiterAt25C => "sl25",
            FlowUnit::Liter => "l",
            FlowUnit::Gram => "g",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBase {
    Second,
    Minute,
    Hour,
}

impl TimeBase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeBase::Second => "second",
            TimeBase::Minute => "minute",
            TimeBase::Hour => "hour",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            TimeBase::Second => "s",
            TimeBase::Minute => "min",
            TimeBase::Hour => "h",
        }
    }
}

/// User-defined measurement unit the device scales its readings to.
///
/// The default, milli standard liter per minute, is sccm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MediumUnit {
    pub prefix: UnitPrefix,
    pub unit: FlowUnit,
    pub time_base: TimeBase,
}

impl Default for MediumUnit {
    fn default() -> Self {
        Self {
            prefix: UnitPrefix::Milli,
            unit: FlowUnit::StandardLiter,
            time_base: TimeBase::Minute,
        }
    }
}

impl MediumUnit {
    /// Short label for column headers, `sccm` for the default unit.
    pub fn abbreviation(&self) -> String {
        if *self == Self::default() {
            return "sccm".to_string();
        }
        format!(
            "{}{}/{}",
            self.prefix.symbol(),
            self.unit.symbol(),
            self.time_base.symbol()
        )
    }
}

impl fmt::Display for MediumUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let UnitPrefix::Base = self.prefix {
            write!(f, "{} per {}", self.unit.as_str(), self.time_base.as_str())
        } else {
            write!(
                f,
                "{} {} per {}",
                self.prefix.as_str(),
                self.unit.as_str(),
                self.time_base.as_str()
            )
        }
    }
}
