use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::acquisition::{AcquisitionLoop, AcquisitionSinks};
use crate::config::{ConfigError, MonitorConfig};
use crate::log_writer::LogWriter;
use crate::observer::{ConnectionState, Observer};
use crate::sample_buffer::{BufferError, SampleBuffer};
use crate::setpoint::{Setpoint, SetpointError};
use crate::status_code::StatusIndicator;
use crate::transport::{Connector, MediumUnit, Transport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Invalid monitor configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to connect to the device on {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: TransportError,
    },

    #[error("Failed to set measurement unit: {0}")]
    Unit(#[source] TransportError),

    #[error("Failed to read initial setpoint: {0}")]
    InitialSetpoint(#[source] TransportError),

    #[error("Invalid buffer configuration: {0}")]
    Buffer(#[from] BufferError),

    #[error("Failed to start acquisition thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// One monitoring session for one device.
///
/// Owns the transport (directly, or through the acquisition thread while connected) and the
/// connection state. All state changes happen on the thread that owns the `Monitor` and
/// calls [`Monitor::service`]; the acquisition thread only reports that it has ended.
pub struct Monitor<C: Connector> {
    connector: C,
    unit: MediumUnit,
    cadence: Duration,
    reconnect_interval: Duration,
    sinks: AcquisitionSinks,
    state: ConnectionState,
    setpoint: Setpoint,
    acquisition: Option<AcquisitionLoop<C::Transport>>,
    reconnect_at: Option<Instant>,
    failed_attempts: u64,
    stopped: bool,
}

impl<C: Connector> Monitor<C> {
    /// Open the device, configure it and start acquisition.
    ///
    /// Any failure here is fatal: no acquisition thread is left running.
    pub fn connect(
        mut connector: C,
        config: &MonitorConfig,
        observer: Arc<dyn Observer>,
    ) -> Result<Self, ConnectError> {
        config.validate()?;

        let buffer = Arc::new(SampleBuffer::with_capacity(config.buffer_capacity)?);
        let sinks = AcquisitionSinks {
            buffer,
            log: LogWriter::new(&config.log_dir).with_unit(&config.unit),
            observer,
        };

        let mut transport = connector.open().map_err(|source| ConnectError::Open {
            port: connector.describe(),
            source,
        })?;
        transport
            .apply_unit(&config.unit)
            .map_err(ConnectError::Unit)?;
        let setpoint = transport
            .read_setpoint()
            .map_err(ConnectError::InitialSetpoint)?;
        let setpoint = Setpoint::from_device(setpoint);
        log::info!("Device connected. Initial setpoint: {}", setpoint);

        let acquisition =
            AcquisitionLoop::spawn(transport, setpoint, config.poll_interval(), sinks.clone())
                .map_err(ConnectError::Spawn)?;

        let monitor = Self {
            connector,
            unit: config.unit,
            cadence: config.poll_interval(),
            reconnect_interval: config.reconnect_interval(),
            sinks,
            state: ConnectionState::Connected,
            setpoint,
            acquisition: Some(acquisition),
            reconnect_at: None,
            failed_attempts: 0,
            stopped: false,
        };
        monitor.sinks.observer.on_connection_state(ConnectionState::Connected);
        Ok(monitor)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Last setpoint successfully written to the device.
    pub fn setpoint(&self) -> Setpoint {
        self.setpoint
    }

    pub fn buffer(&self) -> Arc<SampleBuffer> {
        Arc::clone(&self.sinks.buffer)
    }

    pub fn log_writer(&self) -> &LogWriter {
        &self.sinks.log
    }

    /// Reconnection attempts that failed since the link was lost.
    pub fn failed_attempts(&self) -> u64 {
        self.failed_attempts
    }

    pub fn status_indicator(&self) -> StatusIndicator {
        if self.state != ConnectionState::Connected {
            return StatusIndicator::Disconnected;
        }
        self.sinks
            .buffer
            .latest()
            .map_or(StatusIndicator::Nominal, |sample| sample.status().indicator())
    }

    /// Validate and write a new flow setpoint.
    ///
    /// Out-of-range values are rejected without touching the device. While disconnected
    /// every write is rejected.
    pub fn set_setpoint(&mut self, value: f64) -> Result<Setpoint, SetpointError> {
        let setpoint = Setpoint::new(value)?;

        let acquisition = match (&self.acquisition, self.state) {
            (Some(acquisition), ConnectionState::Connected) => acquisition,
            _ => return Err(SetpointError::Disconnected),
        };
        acquisition.write_setpoint(setpoint)?;

        self.setpoint = setpoint;
        Ok(setpoint)
    }

    /// Run one step of the control loop, waiting at most `timeout`.
    ///
    /// While connected this waits for the acquisition thread to report a fault. While
    /// disconnected it sleeps until the reconnection deadline and then makes one attempt.
    pub fn service(&mut self, timeout: Duration) -> ConnectionState {
        if self.stopped {
            thread::sleep(timeout);
            return self.state;
        }

        match self.state {
            ConnectionState::Connected => {
                let ended = self
                    .acquisition
                    .as_ref()
                    .map_or(true, |acquisition| acquisition.wait_for_fault(timeout));
                if ended {
                    self.handle_disconnection();
                }
            }
            ConnectionState::Disconnected | ConnectionState::Reconnecting => {
                let now = Instant::now();
                let due = *self.reconnect_at.get_or_insert(now);
                if due > now {
                    thread::sleep((due - now).min(timeout));
                }
                if Instant::now() >= due {
                    self.attempt_reconnection();
                }
            }
        }
        self.state
    }

    /// Service the monitor until `stop` is set, then shut it down.
    pub fn run_until(mut self, stop: &AtomicBool, tick: Duration) {
        while !stop.load(Ordering::Relaxed) {
            self.service(tick);
        }
        self.shutdown();
    }

    /// Stop everything and put the device into a safe state.
    pub fn shutdown(mut self) {
        self.teardown();
    }

    fn handle_disconnection(&mut self) {
        if let Some(exit) = self.acquisition.take().and_then(AcquisitionLoop::join) {
            self.setpoint = exit.setpoint;
            let mut transport = exit.transport;
            transport.close();
        }

        self.reconnect_at = Some(Instant::now() + self.reconnect_interval);
        log::warn!(
            "Disconnected from {}, attempting to reconnect every {:?}",
            self.connector.describe(),
            self.reconnect_interval
        );
        self.transition(ConnectionState::Disconnected);
    }

    fn attempt_reconnection(&mut self) {
        let _span = tracing::info_span!("reconnect", attempt = self.failed_attempts + 1).entered();
        self.transition(ConnectionState::Reconnecting);

        match self.reopen() {
            Ok(acquisition) => {
                log::info!(
                    "Reconnected to {} after {} failed attempt(s)",
                    self.connector.describe(),
                    self.failed_attempts
                );
                self.acquisition = Some(acquisition);
                self.reconnect_at = None;
                self.failed_attempts = 0;
                self.transition(ConnectionState::Connected);
            }
            Err(e) => {
                self.failed_attempts += 1;
                log::info!("Reconnect failed: {}. Retrying in {:?}", e, self.reconnect_interval);
                self.reconnect_at = Some(Instant::now() + self.reconnect_interval);
                self.transition(ConnectionState::Disconnected);
            }
        }
    }

    /// Fresh transport, liveness check, configuration restore, new acquisition thread.
    fn reopen(&mut self) -> Result<AcquisitionLoop<C::Transport>, TransportError> {
        let mut transport = self.connector.open()?;

        if let Err(e) = self.restore(&mut transport) {
            transport.close();
            return Err(e);
        }

        Ok(AcquisitionLoop::spawn(
            transport,
            self.setpoint,
            self.cadence,
            self.sinks.clone(),
        )?)
    }

    fn restore(&self, transport: &mut C::Transport) -> Result<(), TransportError> {
        let identifier = transport.read_identifier()?;
        log::debug!("Device {} answered", identifier);
        transport.apply_unit(&self.unit)?;
        transport.write_setpoint(self.setpoint.value())?;
        Ok(())
    }

    fn transition(&mut self, state: ConnectionState) {
        if self.state != state {
            log::debug!("Connection state {} -> {}", self.state, state);
            self.state = state;
            self.sinks.observer.on_connection_state(state);
        }
    }

    fn teardown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        // no reconnection may race the shutdown
        self.reconnect_at = None;

        match self.acquisition.take().and_then(AcquisitionLoop::stop) {
            Some(exit) => {
                let mut transport = exit.transport;
                if let Err(e) = transport
                    .write_setpoint(0.0)
                    .and_then(|()| transport.reset())
                {
                    log::warn!("Could not reset device on close: {}", e);
                }
                transport.close();
            }
            None => log::debug!("No open transport at shutdown"),
        }

        self.transition(ConnectionState::Disconnected);
        log::info!("Monitor shut down");
    }
}

impl<C: Connector> Drop for Monitor<C> {
    fn drop(&mut self) {
        self.teardown();
    }
}
