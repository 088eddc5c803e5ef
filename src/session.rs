//! Controller-side pack session.
//!
//! A [`Session`] owns the engine process, the exchange task, the event
//! queue, and the meshes being packed. The host calls [`Session::poll`] from
//! its UI loop; each call drains every queued event without blocking,
//! applies packed UVs, and returns a [`SessionStatus`].
//!
//! ```text
//! Starting -> Running -> Finished
//!                     -> Failed     (an Error-severity message was seen)
//!                     -> Cancelled  (cancel() called)
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::{EncodedRequest, Request, ResultSet};
use crate::error::{PackError, Result, StartError};
use crate::exchange::{
    EventReceiver, EventSender, Exchange, SessionEvent, Severity, PREPARING_MESSAGE,
};
use crate::mesh::{HostMesh, LoopLayout};
use crate::options::PackOptions;
use crate::packer::PackerConfig;
use crate::transport::EngineProcess;
use crate::writer::apply_results;

/// Reported when the user cancels a running session.
pub const CANCELLED_MESSAGE: &str = "UV-Packer cancelled";

/// Title of alerts raised for errors.
pub const ALERT_TITLE: &str = "Error";

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Starting,
    Running,
    Finished,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Finished | SessionState::Cancelled | SessionState::Failed
        )
    }
}

/// Snapshot of a session for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Last reported engine progress, 0.0..=1.0.
    pub progress: f64,
    pub last_message: Option<String>,
    /// Coverage rounded to two decimals, once reported.
    pub coverage: Option<String>,
    pub elapsed: Duration,
}

impl SessionStatus {
    /// Stats line, e.g. `0.88% ¦ 1.52s`.
    pub fn summary(&self) -> String {
        format!(
            "{}% ¦ {:.2}s",
            self.coverage.as_deref().unwrap_or("0.0"),
            self.elapsed.as_secs_f64()
        )
    }
}

/// Where status text and alerts go.
pub trait StatusSink: Send + Sync {
    /// Status bar style message.
    fn report(&self, severity: Severity, message: &str);

    /// Modal alert. Raised for every Error-severity message.
    fn alert(&self, title: &str, message: &str);
}

/// Forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn report(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info => tracing::info!("{}", message),
            Severity::Warning => tracing::warn!("{}", message),
            Severity::Error => tracing::error!("{}", message),
        }
    }

    fn alert(&self, title: &str, message: &str) {
        tracing::error!("{}: {}", title, message);
    }
}

/// A running or finished pack.
pub struct Session<M> {
    meshes: Vec<M>,
    layouts: Vec<LoopLayout>,
    process: EngineProcess,
    worker: JoinHandle<()>,
    events_tx: EventSender,
    events: EventReceiver,
    cancel: CancellationToken,
    sink: Arc<dyn StatusSink>,
    exit_grace: Duration,

    state: SessionState,
    progress: f64,
    last_message: Option<String>,
    coverage: Option<f64>,
    saw_error: bool,
    complete_queued: bool,
    engine_exited: bool,
    worker_done_at: Option<Instant>,
    started: Instant,
    ended: Option<Instant>,
}

/// Everything set up before the exchange task is spawned.
struct Launch {
    encoded: EncodedRequest,
    process: EngineProcess,
    stdin: ChildStdin,
    stdout: ChildStdout,
    runtime: Handle,
}

fn launch<M: HostMesh>(
    meshes: &[M],
    options: &PackOptions,
    config: &PackerConfig,
) -> Result<Launch> {
    options.validate()?;
    let snapshots = meshes.iter().map(|m| m.snapshot()).collect();
    let encoded = Request::new(*options, snapshots).encode()?;

    let runtime = config.runtime()?;
    let mut process = {
        let _guard = runtime.enter();
        config.engine_command().spawn()?
    };
    let (stdin, stdout) = process
        .take_pipes()
        .ok_or_else(|| PackError::Configuration("Engine pipes unavailable".to_string()))?;

    Ok(Launch {
        encoded,
        process,
        stdin,
        stdout,
        runtime,
    })
}

impl<M: HostMesh> Session<M> {
    /// Encode `meshes`, spawn the engine and start the exchange.
    ///
    /// Options and geometry are validated and the request is fully encoded
    /// before the engine is launched, so configuration errors never leave a
    /// process behind. On failure the meshes come back untouched inside the
    /// [`StartError`]. Meshes are submitted in the order given; use
    /// [`Packer`](crate::Packer) for de-duplication and UV channel setup.
    pub fn start(
        meshes: Vec<M>,
        options: &PackOptions,
        config: &PackerConfig,
        sink: Arc<dyn StatusSink>,
    ) -> std::result::Result<Self, StartError<M>> {
        sink.report(Severity::Info, PREPARING_MESSAGE);
        let Launch {
            encoded,
            process,
            stdin,
            stdout,
            runtime,
        } = match launch(&meshes, options, config) {
            Ok(launch) => launch,
            Err(e) => return Err(StartError::new(e, meshes)),
        };

        let (events_tx, events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let worker = Exchange {
            stdin,
            stdout,
            request: encoded.framed,
            max_frame_size: config.max_frame_size,
            events: events_tx.clone(),
            cancel: cancel.clone(),
        }
        .spawn(&runtime);

        tracing::info!(
            "Started pack of {} objects (engine pid {:?})",
            meshes.len(),
            process.id()
        );

        Ok(Self {
            meshes,
            layouts: encoded.layouts,
            process,
            worker,
            events_tx,
            events,
            cancel,
            sink,
            exit_grace: config.exit_grace,
            state: SessionState::Starting,
            progress: 0.0,
            last_message: Some(PREPARING_MESSAGE.to_string()),
            coverage: None,
            saw_error: false,
            complete_queued: false,
            engine_exited: false,
            worker_done_at: None,
            started: Instant::now(),
            ended: None,
        })
    }

    /// Drain queued events and report where the session stands.
    ///
    /// Never blocks. Once the exchange task has finished and the engine
    /// process has exited, completion is queued and drained in the same call.
    /// An engine still running after a failed exchange is killed; one still
    /// running `exit_grace` after a clean exchange is killed too. Polling a
    /// finished session reaps the engine if it has not been reaped yet.
    pub fn poll(&mut self) -> SessionStatus {
        if self.state.is_terminal() {
            self.reap();
            return self.status();
        }
        if self.state == SessionState::Starting {
            self.state = SessionState::Running;
        }

        self.drain();

        if !self.state.is_terminal() && !self.complete_queued && self.worker.is_finished() {
            if self.reap() {
                self.complete_queued = true;
                let _ = self.events_tx.send(SessionEvent::Complete);
                self.drain();
            } else if self.saw_error {
                // Exchange failed but the engine is still up.
                self.process.kill();
            } else {
                let done = *self.worker_done_at.get_or_insert_with(Instant::now);
                if done.elapsed() >= self.exit_grace {
                    tracing::warn!(
                        "Engine still running {:?} after its last frame, terminating",
                        self.exit_grace
                    );
                    self.process.kill();
                }
            }
        }

        self.status()
    }

    /// Kill the engine and stop the exchange. Takes effect immediately.
    ///
    /// Events still queued are discarded. No-op on a finished session.
    pub fn cancel(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.process.kill();
        self.cancel.cancel();
        self.reap();
        self.report(Severity::Info, CANCELLED_MESSAGE);
        self.finish(SessionState::Cancelled);
    }

    pub fn status(&self) -> SessionStatus {
        let end = self.ended.unwrap_or_else(Instant::now);
        SessionStatus {
            state: self.state,
            progress: self.progress,
            last_message: self.last_message.clone(),
            coverage: self.coverage.map(|c| format!("{:.2}", c)),
            elapsed: end.saturating_duration_since(self.started),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Engine process id. `None` once the process has been reaped.
    pub fn engine_id(&self) -> Option<u32> {
        self.process.id()
    }

    /// Whether the engine has exited and been reaped, as of the last poll.
    pub fn engine_exited(&self) -> bool {
        self.engine_exited
    }

    /// The meshes being packed, in submission order.
    pub fn meshes(&self) -> &[M] {
        &self.meshes
    }

    pub(crate) fn meshes_mut(&mut self) -> &mut [M] {
        &mut self.meshes
    }

    /// Give the meshes back. Cancels first if still running.
    pub fn into_meshes(mut self) -> Vec<M> {
        self.cancel();
        std::mem::take(&mut self.meshes)
    }

    fn reap(&mut self) -> bool {
        if !self.engine_exited {
            self.engine_exited = self.process.has_exited();
        }
        self.engine_exited
    }

    fn drain(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.handle(event);
            if self.state.is_terminal() {
                break;
            }
        }
    }

    fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Progress(fraction) => {
                self.progress = fraction;
                let line = format!("Progress: {} %", (fraction * 100.0) as i32);
                self.report(Severity::Info, &line);
            }
            SessionEvent::Info { text, severity } => self.report(severity, &text),
            SessionEvent::Stats(coverage) => self.coverage = Some(coverage),
            SessionEvent::Results(results) => self.apply(&results),
            SessionEvent::Complete => {
                let state = if self.saw_error {
                    SessionState::Failed
                } else {
                    SessionState::Finished
                };
                self.finish(state);
            }
        }
    }

    fn apply(&mut self, results: &ResultSet) {
        let report = apply_results(&mut self.meshes, &self.layouts, results);
        for err in report.errors {
            self.report(Severity::Error, &err.to_string());
        }
    }

    fn report(&mut self, severity: Severity, message: &str) {
        self.sink.report(severity, message);
        if severity == Severity::Error {
            self.saw_error = true;
            self.sink.alert(ALERT_TITLE, message);
        }
        self.last_message = Some(message.to_string());
    }

    fn finish(&mut self, state: SessionState) {
        tracing::debug!("Session {:?} -> {:?}", self.state, state);
        self.state = state;
        self.ended = Some(Instant::now());
    }
}

impl<M> Drop for Session<M> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<M> std::fmt::Debug for Session<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("progress", &self.progress)
            .field("objects", &self.layouts.len())
            .finish_non_exhaustive()
    }
}
