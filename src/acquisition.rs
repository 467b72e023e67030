use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, SubsecRound, Utc};

use crate::log_writer::{LogRecord, LogWriter};
use crate::observer::Observer;
use crate::sample::Sample;
use crate::sample_buffer::SampleBuffer;
use crate::setpoint::{Setpoint, SetpointError};
use crate::status_code::DeviceStatus;
use crate::transport::{Transport, TransportError};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Where every acquired sample goes, in this order.
#[derive(Clone)]
pub struct AcquisitionSinks {
    pub buffer: Arc<SampleBuffer>,
    pub log: LogWriter,
    pub observer: Arc<dyn Observer>,
}

enum LoopCommand {
    WriteSetpoint {
        setpoint: Setpoint,
        reply: Sender<Result<(), TransportError>>,
    },
    Stop,
}

/// What the acquisition thread hands back when it ends.
pub struct LoopExit<T> {
    pub transport: T,
    pub setpoint: Setpoint,
    pub faulted: bool,
}

/// Handle to the running acquisition thread.
///
/// The thread owns the transport until it ends and returns it through [`LoopExit`].
pub struct AcquisitionLoop<T> {
    commands: Sender<LoopCommand>,
    ended: Receiver<()>,
    handle: JoinHandle<LoopExit<T>>,
}

impl<T: Transport + 'static> AcquisitionLoop<T> {
    pub fn spawn(
        transport: T,
        setpoint: Setpoint,
        cadence: Duration,
        sinks: AcquisitionSinks,
    ) -> io::Result<Self> {
        let (commands, command_rx) = mpsc::channel();
        let (ended_tx, ended) = mpsc::channel();

        let worker = Worker {
            last_timestamp: sinks.buffer.latest().map(|sample| sample.timestamp()),
            transport,
            setpoint,
            cadence,
            sinks,
            commands: command_rx,
            ended: ended_tx,
        };

        let handle = thread::Builder::new()
            .name("sfc-acquisition".to_string())
            .spawn(move || worker.run())?;

        Ok(Self {
            commands,
            ended,
            handle,
        })
    }

    /// Write a setpoint between two cycles.
    ///
    /// Blocks until the thread has executed the write. A failed write ends the loop.
    pub fn write_setpoint(&self, setpoint: Setpoint) -> Result<(), SetpointError> {
        let (reply, reply_rx) = mpsc::channel();
        self.commands
            .send(LoopCommand::WriteSetpoint { setpoint, reply })
            .map_err(|_| SetpointError::Disconnected)?;

        match reply_rx.recv() {
            Ok(result) => result.map_err(SetpointError::from),
            // thread ended before it got to the command
            Err(_) => Err(SetpointError::Disconnected),
        }
    }

    /// Wait up to `timeout` for the thread to end on its own. Returns true if it has.
    pub fn wait_for_fault(&self, timeout: Duration) -> bool {
        match self.ended.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    /// Ask the thread to stop after its current cycle and wait for it.
    pub fn stop(self) -> Option<LoopExit<T>> {
        let _ = self.commands.send(LoopCommand::Stop);
        self.join()
    }

    pub fn join(self) -> Option<LoopExit<T>> {
        match self.handle.join() {
            Ok(exit) => Some(exit),
            Err(_) => {
                log::error!("Acquisition thread panicked, transport lost");
                None
            }
        }
    }
}

enum Wait {
    Elapsed,
    Stop,
    Fault,
}

struct Worker<T> {
    transport: T,
    setpoint: Setpoint,
    cadence: Duration,
    sinks: AcquisitionSinks,
    commands: Receiver<LoopCommand>,
    ended: Sender<()>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl<T: Transport> Worker<T> {
    fn run(mut self) -> LoopExit<T> {
        let _span = tracing::info_span!("acquisition").entered();
        log::debug!("Acquisition loop started, cadence {:?}", self.cadence);

        loop {
            let started = Instant::now();
            let polled_at = Utc::now();

            match self.read_sample(polled_at) {
                Ok(sample) => self.publish(&sample),
                Err(e) => {
                    log::warn!("Device disconnected: {}", e);
                    return self.fault();
                }
            }

            match self.serve_until(started + self.cadence) {
                Wait::Elapsed => {}
                Wait::Stop => {
                    log::debug!("Acquisition loop stopped");
                    return self.exit(false);
                }
                Wait::Fault => return self.fault(),
            }
        }
    }

    /// Status, flow and temperature form one sample; any failure discards all of it.
    ///
    /// The sample is stamped with the time the cycle started, at the microsecond
    /// resolution the log stores.
    fn read_sample(&mut self, polled_at: DateTime<Utc>) -> Result<Sample, TransportError> {
        let status = self.transport.read_status()?;
        let measured = self.transport.read_measured()?;
        let temperature = self.transport.read_temperature()?;

        // keep timestamps non-decreasing across wall clock steps
        let mut timestamp = polled_at.trunc_subsecs(6);
        if let Some(last) = self.last_timestamp {
            timestamp = timestamp.max(last);
        }
        self.last_timestamp = Some(timestamp);

        Ok(Sample::new(
            timestamp,
            self.setpoint.value(),
            measured,
            temperature,
            DeviceStatus::new(status),
        ))
    }

    fn publish(&self, sample: &Sample) {
        self.sinks.buffer.push(*sample);
        if let Err(e) = self.sinks.log.append(&LogRecord::from(sample)) {
            log::warn!("Could not write to log file: {}", e);
        }
        self.sinks.observer.on_sample(sample);
    }

    /// Sleep until `deadline`, executing commands as they arrive.
    fn serve_until(&mut self, deadline: Instant) -> Wait {
        loop {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Wait::Elapsed;
            };

            match self.commands.recv_timeout(remaining) {
                // the deadline is rechecked at the top
                Err(RecvTimeoutError::Timeout) => {}
                Ok(LoopCommand::Stop) | Err(RecvTimeoutError::Disconnected) => return Wait::Stop,
                Ok(LoopCommand::WriteSetpoint { setpoint, reply }) => {
                    match self.transport.write_setpoint(setpoint.value()) {
                        Ok(()) => {
                            log::debug!("Setpoint changed to {}", setpoint);
                            self.setpoint = setpoint;
                            let _ = reply.send(Ok(()));
                        }
                        Err(e) => {
                            log::warn!("Device disconnected during setpoint write: {}", e);
                            let _ = reply.send(Err(e));
                            return Wait::Fault;
                        }
                    }
                }
            }
        }
    }

    fn fault(self) -> LoopExit<T> {
        let _ = self.ended.send(());
        self.exit(true)
    }

    fn exit(self, faulted: bool) -> LoopExit<T> {
        LoopExit {
            transport: self.transport,
            setpoint: self.setpoint,
            faulted,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::log_writer::read_day_file;
    use crate::observer::{MonitorEvent, NoopObserver};
    use crate::simulator::{DeviceCall, Simulator};
    use crate::transport::Connector;

    const CADENCE: Duration = Duration::from_millis(10);
    // wall clock may be slewed slightly against the monotonic clock
    const CLOCK_SLACK: Duration = Duration::from_millis(1);

    fn sinks(dir: &std::path::Path, observer: Arc<dyn Observer>) -> AcquisitionSinks {
        AcquisitionSinks {
            buffer: Arc::new(SampleBuffer::with_capacity(100).unwrap()),
            log: LogWriter::new(dir),
            observer,
        }
    }

    #[test]
    fn test_samples_reach_every_sink() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel::<MonitorEvent>();
        let sinks = sinks(dir.path(), Arc::new(tx));
        let buffer = Arc::clone(&sinks.buffer);

        let simulator = Simulator::new(10.0);
        let transport = simulator.connector().open().unwrap();
        let acquisition =
            AcquisitionLoop::spawn(transport, Setpoint::new(10.0).unwrap(), CADENCE, sinks)
                .unwrap();

        for _ in 0..3 {
            match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
                MonitorEvent::Sample(sample) => assert_eq!(sample.setpoint(), 10.0),
                other => panic!("Unexpected event: {:?}", other),
            }
        }

        let exit = acquisition.stop().unwrap();
        assert!(!exit.faulted);
        assert!(buffer.len() >= 3);

        let snapshot = buffer.snapshot();
        let min_gap = chrono::Duration::from_std(CADENCE - CLOCK_SLACK).unwrap();
        for pair in snapshot.windows(2) {
            assert!(
                pair[1].timestamp() - pair[0].timestamp() >= min_gap,
                "samples closer than the cadence: {} then {}",
                pair[0].timestamp(),
                pair[1].timestamp()
            );
        }

        // the log holds the same samples in the same order, timestamps included
        let log_path = dir.path().join(LogWriter::file_name(chrono::Local::now().date_naive()));
        let rows = read_day_file(&log_path).unwrap();
        let expected: Vec<LogRecord> = snapshot.iter().map(LogRecord::from).collect();
        assert_eq!(rows, expected);
        for (row, sample) in rows.iter().zip(&snapshot) {
            assert_eq!(row.timestamp(), Some(sample.timestamp()));
        }
    }

    #[test]
    fn test_fault_in_any_read_emits_nothing() {
        for call in [DeviceCall::Status, DeviceCall::Measured, DeviceCall::Temperature] {
            let dir = tempfile::tempdir().unwrap();
            let sinks = sinks(dir.path(), Arc::new(NoopObserver));
            let buffer = Arc::clone(&sinks.buffer);

            let simulator = Simulator::new(5.0);
            let transport = simulator.connector().open().unwrap();
            // fails during the very first cycle
            simulator.fail_next(call);
            let acquisition =
                AcquisitionLoop::spawn(transport, Setpoint::new(5.0).unwrap(), CADENCE, sinks)
                    .unwrap();

            assert!(acquisition.wait_for_fault(Duration::from_secs(2)));
            let exit = acquisition.join().unwrap();
            assert!(exit.faulted, "{:?} fault not reported", call);
            assert!(buffer.is_empty(), "{:?} fault produced a sample", call);
        }
    }

    #[test]
    fn test_setpoint_write_between_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let sinks = sinks(dir.path(), Arc::new(NoopObserver));
        let buffer = Arc::clone(&sinks.buffer);

        let simulator = Simulator::new(0.0);
        let transport = simulator.connector().open().unwrap();
        let acquisition =
            AcquisitionLoop::spawn(transport, Setpoint::ZERO, CADENCE, sinks).unwrap();

        acquisition
            .write_setpoint(Setpoint::new(20.0).unwrap())
            .unwrap();
        assert_eq!(simulator.setpoint(), 20.0);

        assert!(!acquisition.wait_for_fault(CADENCE * 5));
        assert_eq!(buffer.latest().map(|s| s.setpoint()), Some(20.0));

        let exit = acquisition.stop().unwrap();
        assert_eq!(exit.setpoint.value(), 20.0);
    }

    #[test]
    fn test_failed_setpoint_write_ends_loop() {
        let dir = tempfile::tempdir().unwrap();
        let sinks = sinks(dir.path(), Arc::new(NoopObserver));

        let simulator = Simulator::new(0.0);
        let transport = simulator.connector().open().unwrap();
        let acquisition =
            AcquisitionLoop::spawn(transport, Setpoint::ZERO, CADENCE, sinks).unwrap();

        simulator.fail_next(DeviceCall::Setpoint);
        assert!(matches!(
            acquisition.write_setpoint(Setpoint::new(1.0).unwrap()),
            Err(SetpointError::Transport(_))
        ));
        assert!(acquisition.wait_for_fault(Duration::from_secs(2)));

        let exit = acquisition.join().unwrap();
        assert!(exit.faulted);
        assert_eq!(exit.setpoint, Setpoint::ZERO);
    }

    #[test]
    fn test_log_failure_does_not_stop_acquisition() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let sinks = sinks(&blocker, Arc::new(NoopObserver));
        let buffer = Arc::clone(&sinks.buffer);

        let simulator = Simulator::new(1.0);
        let transport = simulator.connector().open().unwrap();
        let acquisition =
            AcquisitionLoop::spawn(transport, Setpoint::new(1.0).unwrap(), CADENCE, sinks)
                .unwrap();

        assert!(!acquisition.wait_for_fault(CADENCE * 5));
        assert!(buffer.len() >= 2);
        assert!(!acquisition.stop().unwrap().faulted);
    }
}
