//! # SFC Monitor
//!
//! Acquisition and reconnection engine for a Sensirion SFC5xxx-style mass-flow controller
//! attached over a serial link.
//!
//! The crate polls the device at a fixed cadence on a dedicated thread, keeps a bounded
//! rolling history for display, writes every sample to a per-day CSV log and reconnects on
//! its own when the link drops. The vendor wire protocol is not part of this crate: it is
//! plugged in through the [`Transport`] trait.
//!
//! ## Features
//!
//! - **Fixed-cadence acquisition**: status, flow and temperature read as one unit
//! - **Automatic reconnection**: fixed-period retries, unit and setpoint restored afterwards
//! - **Rolling history**: ring buffer with trailing moving average and `polars` export
//! - **Daily CSV logs**: one file per day, header written once, one append per sample
//! - **Status decoding**: device fault bitmask to readable fault names
//!
//! ## Examples
//!
//! ### Monitoring a simulated device
//!
//! ```rust,no_run
//! use sfc_monitor::{MonitorConfig, Monitor, MonitorEvent, Simulator};
//! use std::sync::{mpsc, Arc};
//! use std::time::Duration;
//!
//! let simulator = Simulator::new(10.0);
//! let (events, rx) = mpsc::channel::<MonitorEvent>();
//! let mut monitor = Monitor::connect(
//!     simulator.connector(),
//!     &MonitorConfig::default(),
//!     Arc::new(events),
//! )?;
//!
//! monitor.set_setpoint(25.0)?;
//! for _ in 0..20 {
//!     monitor.service(Duration::from_millis(100));
//! }
//! println!("{} samples buffered", monitor.buffer().len());
//! monitor.shutdown();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Decoding a status word
//!
//! ```rust
//! use sfc_monitor::DeviceStatus;
//!
//! let status = DeviceStatus::new(5);
//! assert_eq!(status.fault_names(), vec!["Boot Error", "Input Supply out of Range"]);
//! println!("Status: {}", status);
//! ```
//!
//! ### Plugging in a protocol driver
//!
//! ```rust,ignore
//! use sfc_monitor::{SerialConnector, SerialSettings};
//!
//! let connector = SerialConnector::new(SerialSettings::default(), |port| {
//!     // wrap the opened port in your protocol implementation
//!     MyShdlcDriver::new(port)
//! });
//! ```

pub mod acquisition;
pub mod config;
pub mod log_writer;
pub mod monitor;
pub mod observer;
pub mod sample;
pub mod sample_buffer;
pub mod serial_connector;
pub mod setpoint;
pub mod simulator;
pub mod status_code;
pub mod transport;

// Re-export the main types for convenience
pub use config::{ConfigError, MonitorConfig};

pub use log_writer::{log_header, read_day_file, LogError, LogRecord, LogWriter};

pub use monitor::{ConnectError, Monitor};

pub use observer::{ConnectionState, MonitorEvent, NoopObserver, Observer};

pub use sample::Sample;

pub use sample_buffer::{BufferError, SampleBuffer};

pub use serial_connector::{available_ports, SerialConnector, SerialDevice, SerialSettings};

pub use setpoint::{Setpoint, SetpointError, SETPOINT_MAX, SETPOINT_MIN};

pub use simulator::{DeviceCall, SimulatedConnector, SimulatedTransport, Simulator};

pub use status_code::{DeviceStatus, StatusCode, StatusIndicator, STATUS_CODES};

pub use transport::{Connector, FlowUnit, MediumUnit, TimeBase, Transport, TransportError, UnitPrefix};
