//! Bounds-checked cursor over a frame body.
//!
//! Every read checks the remaining length first and returns
//! [`PackError::Protocol`] instead of reading past the end of the buffer.
//!
//! # Example
//!
//! ```
//! use uvpack_bridge::protocol::WireReader;
//!
//! let body = [7u8, 0, 0, 0];
//! let mut reader = WireReader::new(&body);
//! assert_eq!(reader.read_u32().unwrap(), 7);
//! assert!(reader.read_u32().is_err());
//! ```

use bytes::Buf;

use super::wire_format::{BOOL_SIZE, F64_SIZE, U32_SIZE};
use crate::error::{PackError, Result};

/// Position-tracking reader for little-endian wire data.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    position: usize,
}

impl<'a> WireReader<'a> {
    /// Create a reader positioned at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, position: 0 }
    }

    /// Current byte offset from the start of the buffer.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes left to read.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.position
    }

    /// Whether the whole buffer has been consumed.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(PackError::Protocol(format!(
                "Truncated {} at offset {}: need {} bytes, {} left",
                what,
                self.position,
                len,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    /// Read a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32> {
        let mut bytes = self.take(U32_SIZE, "u32")?;
        Ok(bytes.get_u32_le())
    }

    /// Read a little-endian IEEE-754 binary64.
    pub fn read_f64(&mut self) -> Result<f64> {
        let mut bytes = self.take(F64_SIZE, "f64")?;
        Ok(bytes.get_f64_le())
    }

    /// Read a one-byte bool (any non-zero value is true).
    pub fn read_bool(&mut self) -> Result<bool> {
        let bytes = self.take(BOOL_SIZE, "bool")?;
        Ok(bytes[0] != 0)
    }

    /// Read `N` consecutive f64 values.
    pub fn read_f64_array<const N: usize>(&mut self) -> Result<[f64; N]> {
        let mut out = [0.0; N];
        for slot in out.iter_mut() {
            *slot = self.read_f64()?;
        }
        Ok(out)
    }

    /// Read a u32-length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len, "string")?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| PackError::Protocol(format!("Invalid UTF-8 string: {}", e)))
    }

    /// Read a u32 element count and check the buffer can hold at least
    /// `min_element_size` bytes per element, so a corrupt count can't
    /// trigger a huge allocation.
    pub fn read_count(&mut self, min_element_size: usize) -> Result<usize> {
        let count = self.read_u32()? as usize;
        if count.saturating_mul(min_element_size) > self.remaining() {
            return Err(PackError::Protocol(format!(
                "Element count {} exceeds remaining {} bytes",
                count,
                self.remaining()
            )));
        }
        Ok(count)
    }
}
