//! Hardware-free stand-in for a mass-flow controller.
//!
//! The simulated flow follows the setpoint with a first-order lag, so plots look like a
//! real controller settling. The [`Simulator`] handle is shared with every transport it
//! opens and lets callers inject link failures at any point.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::transport::{Connector, MediumUnit, Transport, TransportError};

/// Fraction of the remaining setpoint error closed on every measured read.
const FLOW_RESPONSE: f64 = 0.3;
const AMBIENT_TEMPERATURE: f64 = 23.5;

/// Which device call an injected fault hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCall {
    Status,
    Measured,
    Temperature,
    Setpoint,
}

#[derive(Debug)]
struct SimState {
    serial_number: String,
    setpoint: f64,
    flow: f64,
    status: u32,
    unit: Option<MediumUnit>,
    generation: u64,
    failing_opens: usize,
    failing_call: Option<DeviceCall>,
    opens: usize,
    resets: usize,
}

#[derive(Debug, Clone)]
pub struct Simulator {
    state: Arc<Mutex<SimState>>,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Simulator {
    pub fn new(initial_setpoint: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                serial_number: "SIM-5500-0001".to_string(),
                setpoint: initial_setpoint,
                flow: 0.0,
                status: 0,
                unit: None,
                generation: 0,
                failing_opens: 0,
                failing_call: None,
                opens: 0,
                resets: 0,
            })),
        }
    }

    pub fn connector(&self) -> SimulatedConnector {
        SimulatedConnector {
            simulator: self.clone(),
        }
    }

    /// Kill every transport opened so far, as if the cable was pulled.
    pub fn drop_link(&self) {
        self.lock().generation += 1;
    }

    /// The next `count` open attempts fail.
    pub fn fail_next_opens(&self, count: usize) {
        self.lock().failing_opens = count;
    }

    /// The next call of the given kind fails and takes the link down with it.
    pub fn fail_next(&self, call: DeviceCall) {
        self.lock().failing_call = Some(call);
    }

    pub fn set_status(&self, mask: u32) {
        self.lock().status = mask;
    }

    pub fn setpoint(&self) -> f64 {
        self.lock().setpoint
    }

    pub fn unit(&self) -> Option<MediumUnit> {
        self.lock().unit
    }

    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    pub fn resets(&self) -> usize {
        self.lock().resets
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct SimulatedConnector {
    simulator: Simulator,
}

impl Connector for SimulatedConnector {
    type Transport = SimulatedTransport;

    fn open(&mut self) -> Result<SimulatedTransport, TransportError> {
        let mut state = self.simulator.lock();
        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "simulated port not present",
            )));
        }
        state.opens += 1;
        Ok(SimulatedTransport {
            simulator: self.simulator.clone(),
            generation: state.generation,
            open: true,
        })
    }

    fn describe(&self) -> String {
        "simulator".to_string()
    }
}

pub struct SimulatedTransport {
    simulator: Simulator,
    generation: u64,
    open: bool,
}

impl SimulatedTransport {
    /// Lock the shared state, failing if this handle's link is gone.
    fn link(&mut self, call: Option<DeviceCall>) -> Result<MutexGuard<'_, SimState>, TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        let mut state = self.simulator.lock();
        if state.generation != self.generation {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "simulated link lost",
            )));
        }
        if call.is_some() && state.failing_call == call {
            state.failing_call = None;
            state.generation += 1;
            return Err(TransportError::Timeout { timeout_ms: 500 });
        }
        Ok(state)
    }
}

impl Transport for SimulatedTransport {
    fn read_status(&mut self) -> Result<u32, TransportError> {
        Ok(self.link(Some(DeviceCall::Status))?.status)
    }

    fn read_measured(&mut self) -> Result<f64, TransportError> {
        let mut state = self.link(Some(DeviceCall::Measured))?;
        let flow = state.flow + (state.setpoint - state.flow) * FLOW_RESPONSE;
        state.flow = flow;
        Ok(flow)
    }

    fn read_temperature(&mut self) -> Result<f64, TransportError> {
        let state = self.link(Some(DeviceCall::Temperature))?;
        Ok(AMBIENT_TEMPERATURE + state.flow * 0.01)
    }

    fn read_setpoint(&mut self) -> Result<f64, TransportError> {
        Ok(self.link(None)?.setpoint)
    }

    fn write_setpoint(&mut self, value: f64) -> Result<(), TransportError> {
        self.link(Some(DeviceCall::Setpoint))?.setpoint = value;
        Ok(())
    }

    fn read_identifier(&mut self) -> Result<String, TransportError> {
        Ok(self.link(None)?.serial_number.clone())
    }

    fn apply_unit(&mut self, unit: &MediumUnit) -> Result<(), TransportError> {
        self.link(None)?.unit = Some(*unit);
        Ok(())
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        let mut state = self.link(None)?;
        state.resets += 1;
        state.flow = 0.0;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }
}
