//! Protocol module - wire constants, framing, and the bounds-checked reader.
//!
//! This module implements the byte-level layer shared by both ends of the pipe:
//! - Length-prefix framing (`u32 LE || body`)
//! - Message type tags and protocol version
//! - [`WireReader`] for decoding bodies without reading past the end

mod frame;
mod reader;
mod wire_format;

pub use frame::{build_frame, read_frame, write_frame, write_framed};
pub use reader::WireReader;
pub use wire_format::{
    message_type, BOOL_SIZE, DEFAULT_MAX_FRAME_SIZE, F64_SIZE, LENGTH_PREFIX_SIZE,
    PROTOCOL_VERSION, U32_SIZE,
};
