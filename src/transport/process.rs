//! Engine child process and the frame exchange over its pipes.
//!
//! The request goes to the child's stdin as one contiguous write; responses
//! come back on its stdout as a sequence of frames ending in exactly one
//! Success or Error frame. stderr is inherited so engine logs reach the
//! host's console.
//!
//! # Example
//!
//! ```ignore
//! use uvpack_bridge::transport::{EngineCommand, FrameReader};
//!
//! let mut engine = EngineCommand::new("uv-packer-engine").spawn()?;
//! let (mut stdin, stdout) = engine.take_pipes().unwrap();
//! send_request(&mut stdin, &encoded.framed).await?;
//! let mut frames = FrameReader::new(stdout);
//! while let Some(frame) = frames.next_frame().await? {
//!     println!("{:?}", frame);
//! }
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::codec::ResponseFrame;
use crate::error::{PackError, Result};
use crate::protocol::{read_frame, write_framed, DEFAULT_MAX_FRAME_SIZE};

/// How to launch the packing engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl EngineCommand {
    /// Launch `program` with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Spawn the engine with piped stdin/stdout.
    ///
    /// Must be called from within a tokio runtime context. The child is
    /// killed if the returned [`EngineProcess`] is dropped while running.
    pub fn spawn(&self) -> Result<EngineProcess> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PackError::ProcessSpawn {
                path: self.program.clone(),
                source,
            })?;

        tracing::debug!(
            "Spawned packing engine {} (pid {:?})",
            self.program.display(),
            child.id()
        );

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        Ok(EngineProcess {
            child,
            stdin,
            stdout,
        })
    }
}

/// A running engine process.
///
/// The pipes are handed to the worker with [`take_pipes`](Self::take_pipes);
/// the process itself stays with the controller so it can poll for exit and
/// kill it on cancel.
#[derive(Debug)]
pub struct EngineProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
}

impl EngineProcess {
    /// Take both pipe ends. Returns `None` after the first call.
    pub fn take_pipes(&mut self) -> Option<(ChildStdin, ChildStdout)> {
        match (self.stdin.take(), self.stdout.take()) {
            (Some(stdin), Some(stdout)) => Some((stdin, stdout)),
            _ => None,
        }
    }

    /// OS process id, if still running.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Non-blocking exit check. Errors querying the OS count as exited.
    pub fn try_exit_status(&mut self) -> Option<ExitStatus> {
        match self.child.try_wait() {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!("Failed to query engine process status: {}", e);
                Some(ExitStatus::default())
            }
        }
    }

    /// Whether the process has exited.
    pub fn has_exited(&mut self) -> bool {
        self.try_exit_status().is_some()
    }

    /// Ask the OS to terminate the process. Does not wait.
    pub fn kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            // Already reaped processes report InvalidInput here.
            tracing::debug!("Engine kill: {}", e);
        }
    }
}

/// Write an already-framed request and flush it.
pub async fn send_request<W>(writer: &mut W, framed: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_framed(writer, framed).await?;
    tracing::debug!("Sent request of {} bytes", framed.len());
    Ok(())
}

/// Reads response frames until the terminal one.
///
/// Unknown message types are logged and skipped. After a Success or Error
/// frame has been returned, [`next_frame`](Self::next_frame) yields `None`
/// without touching the stream again.
pub struct FrameReader<R> {
    reader: R,
    max_frame_size: u32,
    finished: bool,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Create a reader with the default frame size limit.
    pub fn new(reader: R) -> Self {
        Self::with_max_frame_size(reader, DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(reader: R, max_frame_size: u32) -> Self {
        Self {
            reader,
            max_frame_size,
            finished: false,
        }
    }

    /// Read and decode the next known frame.
    pub async fn next_frame(&mut self) -> Result<Option<ResponseFrame>> {
        while !self.finished {
            let body = read_frame(&mut self.reader, self.max_frame_size).await?;
            let frame = ResponseFrame::decode(&body)?;

            match frame {
                ResponseFrame::Unknown(tag) => {
                    tracing::warn!("Ignoring unsupported message type {}", tag);
                }
                frame => {
                    self.finished = frame.is_terminal();
                    return Ok(Some(frame));
                }
            }
        }
        Ok(None)
    }

    /// Whether the terminal frame has been read.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> R {
        self.reader
    }
}
