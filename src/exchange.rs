//! Background exchange with the engine.
//!
//! One task per session writes the request, reads frames until the terminal
//! one, and turns what it sees into [`SessionEvent`]s on an unbounded queue.
//! It never touches host meshes: packed UVs travel back as
//! [`SessionEvent::Results`] and are applied by the controller.
//!
//! # Event order
//!
//! ```text
//! Info("Packing") -> Progress* ->
//!     Results, Stats, Info("Packing complete", Warning)   on Success
//!     Info(text, Error)                                   on Error / failure
//! ```
//!
//! The worker never posts [`SessionEvent::Complete`]; the controller does
//! that once both the task and the process are gone. "Preparing geometry"
//! is reported by the controller itself, before the request is encoded.

use std::any::Any;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::{ResponseFrame, ResultSet};
use crate::error::Result;
use crate::transport::{send_request, FrameReader};

/// Status message severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
}

/// Message from the exchange task to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Engine progress, 0.0..=1.0.
    Progress(f64),
    Info { text: String, severity: Severity },
    /// Sheet coverage reported with the results.
    Stats(f64),
    /// Packed UVs, to be written by the controller.
    Results(ResultSet),
    /// Worker and process are both gone.
    Complete,
}

impl SessionEvent {
    pub fn info(text: impl Into<String>) -> Self {
        Self::Info {
            text: text.into(),
            severity: Severity::Info,
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::Info {
            text: text.into(),
            severity: Severity::Warning,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::Info {
            text: text.into(),
            severity: Severity::Error,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

pub const PREPARING_MESSAGE: &str = "Preparing geometry";
pub const PACKING_MESSAGE: &str = "Packing";
pub const COMPLETE_MESSAGE: &str = "Packing complete";

/// Everything the exchange task needs.
pub struct Exchange<W, R> {
    pub stdin: W,
    pub stdout: R,
    /// Length-prefixed request, written as-is.
    pub request: Bytes,
    pub max_frame_size: u32,
    pub events: EventSender,
    pub cancel: CancellationToken,
}

impl<W, R> Exchange<W, R>
where
    W: AsyncWrite + Unpin + Send + 'static,
    R: AsyncRead + Unpin + Send + 'static,
{
    /// Spawn the exchange on `runtime`.
    ///
    /// The returned handle finishes after the terminal frame, a failure, or
    /// cancellation. A panic inside the exchange is reported as an error
    /// event rather than propagated.
    pub fn spawn(self, runtime: &Handle) -> JoinHandle<()> {
        let events = self.events.clone();
        let cancel = self.cancel.clone();
        let inner_runtime = runtime.clone();

        runtime.spawn(async move {
            let inner = inner_runtime.spawn(self.run());
            match inner.await {
                Ok(()) => {}
                Err(e) if e.is_panic() => {
                    let reason = panic_message(e.into_panic());
                    tracing::error!("Exchange task panicked: {}", reason);
                    if !cancel.is_cancelled() {
                        let _ = events.send(SessionEvent::error(format!(
                            "Packing worker failed: {}",
                            reason
                        )));
                    }
                }
                Err(_) => tracing::debug!("Exchange task aborted"),
            }
        })
    }

    async fn run(self) {
        let Exchange {
            stdin,
            stdout,
            request,
            max_frame_size,
            events,
            cancel,
        } = self;

        let _ = events.send(SessionEvent::info(PACKING_MESSAGE));

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Exchange cancelled");
                return;
            }
            outcome = exchange(stdin, stdout, request, max_frame_size, &events) => outcome,
        };

        if let Err(e) = outcome {
            if cancel.is_cancelled() {
                tracing::debug!("Exchange ended after cancel: {}", e);
                return;
            }
            tracing::error!("Exchange failed: {}", e);
            let _ = events.send(SessionEvent::error(e.to_string()));
        }
    }
}

/// Write the request and forward frames until the terminal one.
///
/// Both pipe ends are dropped on return so the engine sees EOF.
async fn exchange<W, R>(
    mut stdin: W,
    stdout: R,
    request: Bytes,
    max_frame_size: u32,
    events: &EventSender,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    send_request(&mut stdin, &request).await?;

    let mut frames = FrameReader::with_max_frame_size(stdout, max_frame_size);
    while let Some(frame) = frames.next_frame().await? {
        match frame {
            ResponseFrame::Progress(fraction) => {
                let _ = events.send(SessionEvent::Progress(fraction));
            }
            ResponseFrame::Success(results) => {
                tracing::debug!(
                    "Engine packed {} objects, coverage {}",
                    results.objects.len(),
                    results.coverage
                );
                let coverage = results.coverage;
                let _ = events.send(SessionEvent::Results(results));
                let _ = events.send(SessionEvent::Stats(coverage));
                let _ = events.send(SessionEvent::warning(COMPLETE_MESSAGE));
            }
            ResponseFrame::Error(text) => {
                tracing::debug!("Engine reported error: {}", text);
                let _ = events.send(SessionEvent::error(text));
            }
            ResponseFrame::Unknown(_) => {}
        }
    }

    drop(stdin);
    Ok(())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ObjectResult;
    use crate::protocol::{build_frame, read_frame, DEFAULT_MAX_FRAME_SIZE};
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};

    fn drain(rx: &mut EventReceiver) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    struct Harness {
        engine_in: DuplexStream,
        engine_out: DuplexStream,
        events: EventReceiver,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    }

    fn start(request: &[u8]) -> Harness {
        let (host_stdin, engine_in) = duplex(64 * 1024);
        let (engine_out, host_stdout) = duplex(64 * 1024);
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task = Exchange {
            stdin: host_stdin,
            stdout: host_stdout,
            request: Bytes::from(build_frame(request)),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            events: tx,
            cancel: cancel.clone(),
        }
        .spawn(&Handle::current());

        Harness {
            engine_in,
            engine_out,
            events: rx,
            cancel,
            task,
        }
    }

    async fn reply(out: &mut DuplexStream, frame: ResponseFrame) {
        out.write_all(&build_frame(&frame.encode())).await.unwrap();
    }

    #[tokio::test]
    async fn test_success_event_order() {
        let mut h = start(b"request");
        let body = read_frame(&mut h.engine_in, DEFAULT_MAX_FRAME_SIZE).await.unwrap();
        assert_eq!(&body[..], b"request");

        let results = ResultSet {
            objects: vec![ObjectResult {
                object_index: 0,
                name: "Cube".into(),
                uvs: vec![[0.0, 0.0]; 3],
            }],
            coverage: 0.875,
        };
        reply(&mut h.engine_out, ResponseFrame::Progress(0.5)).await;
        reply(&mut h.engine_out, ResponseFrame::Unknown(42)).await;
        reply(&mut h.engine_out, ResponseFrame::Success(results.clone())).await;
        h.task.await.unwrap();

        assert_eq!(
            drain(&mut h.events),
            vec![
                SessionEvent::info(PACKING_MESSAGE),
                SessionEvent::Progress(0.5),
                SessionEvent::Results(results),
                SessionEvent::Stats(0.875),
                SessionEvent::warning(COMPLETE_MESSAGE),
            ]
        );
    }

    #[tokio::test]
    async fn test_engine_error_becomes_error_event() {
        let mut h = start(b"request");
        read_frame(&mut h.engine_in, DEFAULT_MAX_FRAME_SIZE).await.unwrap();
        reply(&mut h.engine_out, ResponseFrame::Error("License expired".into())).await;
        h.task.await.unwrap();

        let events = drain(&mut h.events);
        assert_eq!(events.last(), Some(&SessionEvent::error("License expired")));
        assert!(!events.contains(&SessionEvent::Complete));
    }

    #[tokio::test]
    async fn test_closed_pipe_reports_error() {
        let mut h = start(b"request");
        read_frame(&mut h.engine_in, DEFAULT_MAX_FRAME_SIZE).await.unwrap();
        drop(h.engine_out);
        h.task.await.unwrap();

        let events = drain(&mut h.events);
        assert!(matches!(
            events.last(),
            Some(SessionEvent::Info { severity: Severity::Error, .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_is_silent() {
        let mut h = start(b"request");
        read_frame(&mut h.engine_in, DEFAULT_MAX_FRAME_SIZE).await.unwrap();

        h.cancel.cancel();
        h.task.await.unwrap();
        drop(h.engine_out);

        let events = drain(&mut h.events);
        assert_eq!(events, vec![SessionEvent::info(PACKING_MESSAGE)]);
    }

    #[tokio::test]
    async fn test_pipes_closed_after_terminal_frame() {
        use tokio::io::AsyncReadExt;

        let mut h = start(b"request");
        read_frame(&mut h.engine_in, DEFAULT_MAX_FRAME_SIZE).await.unwrap();
        reply(&mut h.engine_out, ResponseFrame::Error("nope".into())).await;
        h.task.await.unwrap();

        let mut rest = Vec::new();
        let n = h.engine_in.read_to_end(&mut rest).await.unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(7u8)), "unknown panic");
    }
}
