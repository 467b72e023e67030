use std::fmt;
use std::sync::mpsc::Sender;

use crate::sample::Sample;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives push notifications from the monitor.
///
/// Called from the acquisition thread (samples) and the control thread (state changes).
/// Implementations must return quickly and must not block.
pub trait Observer: Send + Sync {
    fn on_sample(&self, sample: &Sample);

    fn on_connection_state(&self, state: ConnectionState);
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Sample(Sample),
    ConnectionState(ConnectionState),
}

/// Forwards everything into a channel; a dropped receiver is ignored.
impl Observer for Sender<MonitorEvent> {
    fn on_sample(&self, sample: &Sample) {
        let _ = self.send(MonitorEvent::Sample(*sample));
    }

    fn on_connection_state(&self, state: ConnectionState) {
        let _ = self.send(MonitorEvent::ConnectionState(state));
    }
}

/// Observer that drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn on_sample(&self, _sample: &Sample) {}

    fn on_connection_state(&self, _state: ConnectionState) {}
}
