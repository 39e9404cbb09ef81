//! Backend worker loop
//!
//! The worker blocks on the command channel and turns each command into a
//! task on the tokio runtime. Reads complete in any order; the chart sorts
//! that out through request generations.

use crate::backend::{BackendCommand, BackendMessage};
use crate::history::HistorySource;
use crate::scheduler::FetchRequest;
use crate::types::VariableKey;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// How often the loop checks the running flag while idle
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Single-shot live-tail timer. Arming it again replaces the pending shot.
#[derive(Debug, Default)]
pub struct LiveTailTimer {
    task: Option<JoinHandle<()>>,
}

impl LiveTailTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, runtime: &Handle, period: Duration, tx: Sender<BackendMessage>) {
        self.cancel();
        self.task = Some(runtime.spawn(async move {
            tokio::time::sleep(period).await;
            let _ = tx.send(BackendMessage::LiveTailDue);
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Whether a shot is pending
    pub fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

/// The worker behind a [`crate::backend::FetchBackend`]
pub struct BackendWorker {
    source: Arc<dyn HistorySource>,
    variables: Arc<[VariableKey]>,
    runtime: Handle,
    /// Command receiver from the host
    command_rx: Receiver<BackendCommand>,
    /// Message sender to the host
    message_tx: Sender<BackendMessage>,
    running: Arc<AtomicBool>,
    live_tail: LiveTailTimer,
}

impl BackendWorker {
    pub fn new(
        source: Arc<dyn HistorySource>,
        variables: Arc<[VariableKey]>,
        runtime: Handle,
        command_rx: Receiver<BackendCommand>,
        message_tx: Sender<BackendMessage>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            variables,
            runtime,
            command_rx,
            message_tx,
            running,
            live_tail: LiveTailTimer::new(),
        }
    }

    /// Run the main worker loop
    pub fn run(&mut self) {
        tracing::info!(variables = self.variables.len(), "Fetch backend started");

        while self.running.load(Ordering::SeqCst) {
            match self.command_rx.recv_timeout(IDLE_POLL) {
                Ok(cmd) => self.handle_command(cmd),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    self.running.store(false, Ordering::SeqCst);
                }
            }
        }

        self.live_tail.cancel();
        let _ = self.message_tx.send(BackendMessage::Shutdown);
        tracing::info!("Fetch backend stopped");
    }

    /// Handle a single command
    fn handle_command(&mut self, cmd: BackendCommand) {
        match cmd {
            BackendCommand::Fetch(request) => self.spawn_fetch(request),
            BackendCommand::ScheduleLiveTail(period) => {
                self.live_tail
                    .schedule(&self.runtime, period, self.message_tx.clone());
            }
            BackendCommand::CancelLiveTail => self.live_tail.cancel(),
            BackendCommand::QueryLastWritten { before } => self.spawn_last_written(before),
            BackendCommand::Shutdown => {
                self.running.store(false, Ordering::SeqCst);
            }
        }
    }

    fn spawn_fetch(&self, request: FetchRequest) {
        let source = Arc::clone(&self.source);
        let variables = Arc::clone(&self.variables);
        let tx = self.message_tx.clone();

        self.runtime.spawn(async move {
            let result = match request.num_bins {
                Some(num_bins) => {
                    source
                        .read_binned(&variables, request.start, request.end, num_bins)
                        .await
                }
                None => source.read_raw(&variables, request.start, request.end).await,
            };

            let message = match result {
                Ok(payload) => {
                    tracing::debug!(id = request.id, bytes = payload.len(), "History read completed");
                    BackendMessage::FetchCompleted { request, payload }
                }
                Err(error) => {
                    tracing::warn!(id = request.id, "History read failed: {}", error);
                    BackendMessage::FetchFailed { request, error }
                }
            };
            let _ = tx.send(message);
        });
    }

    fn spawn_last_written(&self, before: f64) {
        let source = Arc::clone(&self.source);
        let variables = Arc::clone(&self.variables);
        let tx = self.message_tx.clone();

        self.runtime.spawn(async move {
            let message = match source.last_written(&variables, before).await {
                Ok(times) => BackendMessage::LastWritten { before, times },
                Err(error) => {
                    tracing::warn!("Last-written query failed: {}", error);
                    BackendMessage::LastWrittenFailed { error }
                }
            };
            let _ = tx.send(message);
        });
    }
}
