//! Length-prefixed framing.
//!
//! Applied uniformly to the single outbound request and to each inbound
//! response: `uint32 length (LE) || body`.
//!
//! # Example
//!
//! ```
//! use uvpack_bridge::protocol::{build_frame, LENGTH_PREFIX_SIZE};
//!
//! let bytes = build_frame(b"hello");
//! assert_eq!(bytes.len(), LENGTH_PREFIX_SIZE + 5);
//! assert_eq!(&bytes[..4], &5u32.to_le_bytes());
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::wire_format::LENGTH_PREFIX_SIZE;
use crate::error::{PackError, Result};

/// Build a complete frame as a single contiguous buffer.
pub fn build_frame(body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    buf.put_u32_le(body.len() as u32);
    buf.put_slice(body);
    buf
}

/// Write one frame as a single write and flush immediately.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&build_frame(body)).await?;
    writer.flush().await?;
    Ok(())
}

/// Write an already-framed buffer (length prefix included) and flush.
pub async fn write_framed<W>(writer: &mut W, framed: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(framed).await?;
    writer.flush().await?;
    Ok(())
}

/// Read exactly one frame body.
///
/// Reads 4 bytes of length, then exactly that many body bytes. A stream that
/// closes mid-frame is a transport error ([`PackError::Transport`] with
/// `UnexpectedEof`), never a short result.
pub async fn read_frame<R>(reader: &mut R, max_frame_size: u32) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let length = reader.read_u32_le().await?;

    if length > max_frame_size {
        return Err(PackError::Protocol(format!(
            "Frame size {} exceeds maximum {}",
            length, max_frame_size
        )));
    }

    let mut body = BytesMut::zeroed(length as usize);
    reader.read_exact(&mut body).await?;
    Ok(body.freeze())
}
