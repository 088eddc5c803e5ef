//! Transport module - engine process and pipe I/O.
//!
//! Provides:
//! - [`EngineCommand`] / [`EngineProcess`] - spawning and supervising the engine
//! - [`send_request`] - one contiguous write of the framed request
//! - [`FrameReader`] - reads response frames until Success or Error

mod process;

pub use process::{send_request, EngineCommand, EngineProcess, FrameReader};
