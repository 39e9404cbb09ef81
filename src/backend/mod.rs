//! Fetch backend
//!
//! History reads run on a tokio runtime so no read ever blocks the chart.
//! The chart side talks to the backend through crossbeam channels, the
//! same way a UI thread would.
//!
//! # Architecture
//!
//! - [`BackendCommand`] - Messages sent from the chart host to the backend
//! - [`BackendMessage`] - Messages sent from the backend to the chart host
//! - [`FrontendReceiver`] - Host-side handle for sending commands and receiving messages
//! - [`FetchBackend`] - Backend entry point; [`FetchBackend::run`] blocks on the command loop
//!
//! # Example
//!
//! ```ignore
//! use histscope::backend::FetchBackend;
//! use histscope::history::MemoryHistory;
//! use std::sync::Arc;
//!
//! let runtime = tokio::runtime::Runtime::new()?;
//! let source = Arc::new(MemoryHistory::new());
//! let (backend, frontend) = FetchBackend::new(source, keys, runtime.handle().clone());
//! std::thread::spawn(move || backend.run());
//!
//! for command in chart.take_commands() {
//!     if let Some(event) = frontend.dispatch(command) {
//!         // forward to other charts
//!     }
//! }
//! for message in frontend.drain() {
//!     chart.apply(message, now);
//! }
//! ```

pub mod worker;

pub use worker::{BackendWorker, LiveTailTimer};

use crate::chart::{ChartCommand, ChartEvent};
use crate::error::HistScopeError;
use crate::history::HistorySource;
use crate::scheduler::FetchRequest;
use crate::types::VariableKey;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// Message sent from the chart host to the backend
#[derive(Debug, Clone)]
pub enum BackendCommand {
    /// Execute a history read
    Fetch(FetchRequest),
    /// Deliver [`BackendMessage::LiveTailDue`] after the period, replacing
    /// any timer already armed
    ScheduleLiveTail(Duration),
    CancelLiveTail,
    /// Ask for the newest sample time of every variable
    QueryLastWritten { before: f64 },
    Shutdown,
}

/// Message sent from the backend to the chart host
#[derive(Debug)]
pub enum BackendMessage {
    /// Wire bytes of a successful read
    FetchCompleted {
        request: FetchRequest,
        payload: Vec<u8>,
    },
    FetchFailed {
        request: FetchRequest,
        error: HistScopeError,
    },
    /// Newest sample time per variable, zero for none
    LastWritten { before: f64, times: Vec<f64> },
    LastWrittenFailed { error: HistScopeError },
    /// Live-tail timer fired
    LiveTailDue,
    /// Backend is shutting down
    Shutdown,
}

/// Host-side handle of a [`FetchBackend`]
pub struct FrontendReceiver {
    /// Receiver for backend messages
    pub receiver: Receiver<BackendMessage>,
    /// Sender for commands to the backend
    pub command_sender: Sender<BackendCommand>,
}

impl FrontendReceiver {
    /// Try to receive a message without blocking
    pub fn try_recv(&self) -> Option<BackendMessage> {
        self.receiver.try_recv().ok()
    }

    /// Receive all pending messages
    pub fn drain(&self) -> Vec<BackendMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.receiver.try_recv() {
            messages.push(msg);
        }
        messages
    }

    /// Send a command to the backend
    pub fn send_command(&self, cmd: BackendCommand) -> bool {
        self.command_sender.send(cmd).is_ok()
    }

    /// Forward a chart command. Notifications are not backend work and are
    /// handed back to the caller.
    pub fn dispatch(&self, command: ChartCommand) -> Option<ChartEvent> {
        let cmd = match command {
            ChartCommand::Fetch(request) => BackendCommand::Fetch(request),
            ChartCommand::ScheduleLiveTail(period) => BackendCommand::ScheduleLiveTail(period),
            ChartCommand::CancelLiveTail => BackendCommand::CancelLiveTail,
            ChartCommand::QueryLastWritten { before } => BackendCommand::QueryLastWritten { before },
            ChartCommand::Notify(event) => return Some(event),
        };
        if !self.send_command(cmd) {
            tracing::warn!("Fetch backend is gone, dropping command");
        }
        None
    }

    /// Request shutdown
    pub fn shutdown(&self) {
        let _ = self.command_sender.send(BackendCommand::Shutdown);
    }
}

/// Backend executing history reads for one chart
pub struct FetchBackend {
    source: Arc<dyn HistorySource>,
    variables: Arc<[VariableKey]>,
    runtime: tokio::runtime::Handle,
    /// Receiver for commands from the host
    command_receiver: Receiver<BackendCommand>,
    /// Sender for messages to the host
    message_sender: Sender<BackendMessage>,
    /// Running flag
    running: Arc<AtomicBool>,
}

impl FetchBackend {
    /// Create a backend reading `variables` from `source`, with its tasks
    /// spawned on `runtime`
    pub fn new(
        source: Arc<dyn HistorySource>,
        variables: Vec<VariableKey>,
        runtime: tokio::runtime::Handle,
    ) -> (Self, FrontendReceiver) {
        let (cmd_tx, cmd_rx) = bounded(256);
        // One reply per request, so replies are bounded by what the chart asked for
        let (msg_tx, msg_rx) = unbounded();

        let backend = Self {
            source,
            variables: variables.into(),
            runtime,
            command_receiver: cmd_rx,
            message_sender: msg_tx,
            running: Arc::new(AtomicBool::new(true)),
        };

        let frontend = FrontendReceiver {
            receiver: msg_rx,
            command_sender: cmd_tx,
        };

        (backend, frontend)
    }

    /// Run the command loop until shutdown or until the host hangs up
    pub fn run(self) {
        let mut worker = BackendWorker::new(
            self.source,
            self.variables,
            self.runtime,
            self.command_receiver,
            self.message_sender,
            self.running,
        );
        worker.run();
    }

    /// Get a handle to stop the backend
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistory;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_backend_creation() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (backend, frontend) =
            FetchBackend::new(Arc::new(MemoryHistory::new()), Vec::new(), runtime.handle().clone());

        assert!(backend.stop_handle().load(Ordering::SeqCst));
        assert!(frontend.send_command(BackendCommand::Shutdown));
        assert!(frontend.try_recv().is_none());
    }

    #[test]
    fn test_dispatch_returns_notifications() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (_backend, frontend) =
            FetchBackend::new(Arc::new(MemoryHistory::new()), Vec::new(), runtime.handle().clone());

        let event = frontend.dispatch(ChartCommand::Notify(ChartEvent::ResetAxes));
        assert_eq!(event, Some(ChartEvent::ResetAxes));
        assert!(frontend.dispatch(ChartCommand::CancelLiveTail).is_none());
    }
}
