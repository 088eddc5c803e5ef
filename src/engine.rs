//! Engine side of the protocol.
//!
//! Helpers for writing a packing engine (or a stand-in for one): read the
//! request from stdin, answer with progress frames and one terminal frame on
//! stdout.
//!
//! # Important
//!
//! - **stdout** carries binary frames only
//! - **stderr** is for logs (inherited by the host)
//! - Never print to stdout with `println!`
//!
//! # Example
//!
//! ```ignore
//! use uvpack_bridge::engine::{identity_results, read_request, EngineResponder};
//!
//! let request = read_request(&mut tokio::io::stdin(), DEFAULT_MAX_FRAME_SIZE).await?;
//! let mut responder = EngineResponder::new(tokio::io::stdout());
//! responder.progress(0.5).await?;
//! responder.success(&identity_results(&request, 0.875)).await?;
//! ```

use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::{ObjectResult, Request, ResponseFrame, ResultSet};
use crate::error::{PackError, Result};
use crate::protocol::{read_frame, write_frame, PROTOCOL_VERSION};

/// Read one framed request.
///
/// A major version other than ours is a protocol error.
pub async fn read_request<R>(reader: &mut R, max_frame_size: u32) -> Result<Request>
where
    R: AsyncRead + Unpin,
{
    let body = read_frame(reader, max_frame_size).await?;
    let request = Request::decode(&body)?;

    if request.protocol_version.0 != PROTOCOL_VERSION.0 {
        return Err(PackError::Protocol(format!(
            "Unsupported protocol version {}.{}.{}",
            request.protocol_version.0, request.protocol_version.1, request.protocol_version.2
        )));
    }

    tracing::debug!(
        "Received request for {} objects ({} bytes)",
        request.objects.len(),
        body.len()
    );
    Ok(request)
}

/// Writes response frames. Each frame is flushed immediately.
pub struct EngineResponder<W> {
    writer: W,
    finished: bool,
}

impl<W> EngineResponder<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            finished: false,
        }
    }

    pub async fn progress(&mut self, fraction: f64) -> Result<()> {
        self.send(&ResponseFrame::Progress(fraction)).await
    }

    /// Terminal error frame.
    pub async fn error(&mut self, message: &str) -> Result<()> {
        self.send(&ResponseFrame::Error(message.to_string())).await
    }

    /// Terminal success frame.
    pub async fn success(&mut self, results: &ResultSet) -> Result<()> {
        self.send(&ResponseFrame::Success(results.clone())).await
    }

    /// Send any frame. Nothing may follow a terminal frame.
    pub async fn send(&mut self, frame: &ResponseFrame) -> Result<()> {
        if self.finished {
            return Err(PackError::Protocol(
                "Response already terminated".to_string(),
            ));
        }
        write_frame(&mut self.writer, &frame.encode()).await?;
        self.finished = frame.is_terminal();
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Results that hand every loop its submitted UV back unchanged.
pub fn identity_results(request: &Request, coverage: f64) -> ResultSet {
    ResultSet {
        objects: request
            .objects
            .iter()
            .map(|(object_index, snapshot)| ObjectResult {
                object_index: *object_index,
                name: snapshot.name.clone(),
                uvs: snapshot.uvs(),
            })
            .collect(),
        coverage,
    }
}
