//! # uvpack-bridge
//!
//! Host-side bridge to an external UV packing engine.
//!
//! This crate hands mesh UV data to a long-running engine child process and
//! gets packed UV coordinates back without blocking the host's UI thread.
//!
//! ## Architecture
//!
//! - **Request** (stdin): one length-prefixed binary frame with protocol
//!   version, packing options, and per-object geometry
//! - **Responses** (stdout): length-prefixed frames, any number of Progress
//!   followed by exactly one Success or Error
//! - **Exchange task**: a tokio task per session does the pipe I/O and
//!   queues events
//! - **Controller**: [`Session::poll`] drains the queue, writes UVs back to
//!   the host meshes, and tracks the session state
//!
//! ## Example
//!
//! ```ignore
//! use uvpack_bridge::{PackOptions, Packer, PackMode};
//!
//! let options = PackOptions::builder()
//!     .pack_mode(PackMode::HighQuality)
//!     .size(2048, 2048)
//!     .build()?;
//!
//! let mut packer = Packer::builder().create_uv_channel(true).build();
//! let handle = packer.begin_pack(&options, selected_meshes)?;
//!
//! // from the UI timer:
//! let status = packer.poll_session(handle)?;
//! ui.set_status(status.last_message.as_deref().unwrap_or(""));
//! ui.set_stats(&status.summary());
//! ```

pub mod codec;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod mesh;
pub mod options;
pub mod packer;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod writer;

pub use codec::{ObjectResult, Request, ResponseFrame, ResultSet};
pub use error::{PackError, Result, StartError};
pub use exchange::{SessionEvent, Severity};
pub use mesh::{EditableMesh, HostMesh, MeshSnapshot};
pub use options::{PackMode, PackOptions, PackOptionsBuilder, RotationStep};
pub use packer::{Packer, PackerBuilder, PackerConfig, SessionHandle};
pub use session::{Session, SessionState, SessionStatus, StatusSink, TracingSink};
