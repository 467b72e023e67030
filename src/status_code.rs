use std::fmt;

/// One fault condition reported in the device status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode {
    pub bit: u32,
    pub description: &'static str,
}

impl StatusCode {
    const fn new(bit: u32, description: &'static str) -> Self {
        Self { bit, description }
    }
}

/// Fault bits of the SFC5xxx status word, in reporting order.
pub static STATUS_CODES: [StatusCode; 11] = [
    StatusCode::new(1, "Boot Error"),
    StatusCode::new(2, "Cmd Post Processing Error"),
    StatusCode::new(4, "Input Supply out of Range"),
    StatusCode::new(8, "Valve Supply out of Range"),
    StatusCode::new(16, "Signal Processor Init"),
    StatusCode::new(32, "Sensor Comm Error"),
    StatusCode::new(64, "Setpoint Input Error"),
    StatusCode::new(128, "Actuator Output Error"),
    StatusCode::new(256, "Signal Output Error"),
    StatusCode::new(512, "Signal Buffer Error"),
    StatusCode::new(1024, "Missing Gas Pressure"),
];

/// Decoded status word as read from the device.
///
/// Bits that are not in [`STATUS_CODES`] are carried along in the raw value but never
/// reported as faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceStatus(u32);

impl DeviceStatus {
    pub fn new(mask: u32) -> Self {
        Self(mask)
    }

    pub fn mask(self) -> u32 {
        self.0
    }

    pub fn is_nominal(self) -> bool {
        self.0 == 0
    }

    /// Active faults in table order.
    pub fn faults(self) -> impl Iterator<Item = &'static StatusCode> {
        STATUS_CODES.iter().filter(move |code| self.0 & code.bit != 0)
    }

    pub fn fault_names(self) -> Vec<&'static str> {
        self.faults().map(|code| code.description).collect()
    }

    pub fn indicator(self) -> StatusIndicator {
        if self.is_nominal() {
            StatusIndicator::Nominal
        } else {
            StatusIndicator::Fault
        }
    }
}

impl From<u32> for DeviceStatus {
    fn from(mask: u32) -> Self {
        Self(mask)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nominal() {
            return write!(f, "OK");
        }
        write!(f, "{} (Code: {})", self.fault_names().join(", "), self.0)
    }
}

/// Coarse health shown by the persistent status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusIndicator {
    Nominal,
    Fault,
    Disconnected,
}

impl StatusIndicator {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusIndicator::Nominal => "ok",
            StatusIndicator::Fault => "error",
            StatusIndicator::Disconnected => "disconnected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_mask_is_nominal() {
        let status = DeviceStatus::new(0);
        assert!(status.is_nominal());
        assert!(status.fault_names().is_empty());
        assert_eq!(status.indicator(), StatusIndicator::Nominal);
        assert_eq!(status.to_string(), "OK");
    }

    #[test]
    fn test_combined_bits_in_table_order() {
        let status = DeviceStatus::new(5);
        assert_eq!(
            status.fault_names(),
            vec!["Boot Error", "Input Supply out of Range"]
        );
        assert_eq!(status.indicator(), StatusIndicator::Fault);
        assert_eq!(
            status.to_string(),
            "Boot Error, Input Supply out of Range (Code: 5)"
        );
    }

    #[test]
    fn test_unknown_bits_are_ignored() {
        let status = DeviceStatus::new(0x8000_0000 | 1024 | 2048);
        assert_eq!(status.fault_names(), vec!["Missing Gas Pressure"]);

        let unknown_only = DeviceStatus::new(4096);
        assert!(!unknown_only.is_nominal());
        assert!(unknown_only.fault_names().is_empty());
    }

    #[test]
    fn test_table_bits_are_distinct_single_bits() {
        let mut seen = 0u32;
        for code in &STATUS_CODES {
            assert_eq!(code.bit.count_ones(), 1);
            assert_eq!(seen & code.bit, 0);
            seen |= code.bit;
        }
    }

    #[test]
    fn test_indicator_as_str() {
        assert_eq!(StatusIndicator::Nominal.as_str(), "ok");
        assert_eq!(StatusIndicator::Fault.as_str(), "error");
        assert_eq!(StatusIndicator::Disconnected.as_str(), "disconnected");
    }
}
