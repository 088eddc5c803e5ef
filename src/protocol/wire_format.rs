//! Wire format constants.
//!
//! Every unit on the pipe is a length-prefixed frame:
//! ```text
//! ┌──────────┬─────────────────────┐
//! │ Length   │ Body                │
//! │ 4 bytes  │ Length bytes        │
//! │ uint32 LE│                     │
//! └──────────┴─────────────────────┘
//! ```
//!
//! Response bodies start with a uint32 message type. All multi-byte integers
//! are Little Endian, floats are IEEE-754 binary64 and strings are
//! length-prefixed UTF-8 without a terminator.

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum frame body size (1 GB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 1_073_741_824;

/// Bridge protocol version sent at the start of every request.
pub const PROTOCOL_VERSION: (u32, u32, u32) = (1, 1, 0);

/// Response message type tags.
pub mod message_type {
    /// Final result set; ends the exchange.
    pub const SUCCESS: u32 = 0;
    /// Progress fraction in `[0, 1]`.
    pub const PROGRESS: u32 = 1;
    /// Engine error text; ends the exchange.
    pub const ERROR: u32 = 2;
}

/// Size of a u32 field.
pub const U32_SIZE: usize = 4;

/// Size of an f64 field.
pub const F64_SIZE: usize = 8;

/// Size of a bool field.
pub const BOOL_SIZE: usize = 1;
