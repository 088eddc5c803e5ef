//! Response frame bodies.
//!
//! ```text
//! u32 message type
//! 0 Success:  u32 object count
//!             per object: u32 object index | u32 name len | name
//!                         | u32 uv count | uv count × (f64 x, f64 y)
//!             f64 coverage
//! 1 Progress: f64 fraction
//! 2 Error:    u32 len | UTF-8 text
//! ```
//!
//! Any other message type decodes to [`ResponseFrame::Unknown`] so the read
//! loop can skip it.

use bytes::BufMut;

use crate::error::{PackError, Result};
use crate::protocol::{message_type, WireReader, F64_SIZE, U32_SIZE};

/// Packed UVs for one submitted object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectResult {
    pub object_index: u32,
    pub name: String,
    /// One pair per loop, in the original face/loop traversal order.
    pub uvs: Vec<[f64; 2]>,
}

/// Payload of a Success frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    pub objects: Vec<ObjectResult>,
    /// Fraction of the sheet covered by packed charts.
    pub coverage: f64,
}

/// One decoded response frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFrame {
    Success(ResultSet),
    Progress(f64),
    Error(String),
    /// Unrecognized message type; skipped by the reader.
    Unknown(u32),
}

impl ResponseFrame {
    /// Success and Error end the exchange.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResponseFrame::Success(_) | ResponseFrame::Error(_))
    }

    /// The engine-reported error carried by an Error frame.
    pub fn engine_error(&self) -> Option<PackError> {
        match self {
            ResponseFrame::Error(text) => Some(PackError::Engine(text.clone())),
            _ => None,
        }
    }

    /// Decode a frame body.
    pub fn decode(body: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(body);
        let tag = reader.read_u32()?;

        match tag {
            message_type::SUCCESS => Ok(ResponseFrame::Success(decode_result_set(&mut reader)?)),
            message_type::PROGRESS => Ok(ResponseFrame::Progress(reader.read_f64()?)),
            message_type::ERROR => Ok(ResponseFrame::Error(reader.read_string()?)),
            other => Ok(ResponseFrame::Unknown(other)),
        }
    }

    /// Encode a frame body (engine side). `Unknown` encodes just its tag.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            ResponseFrame::Success(results) => {
                buf.put_u32_le(message_type::SUCCESS);
                encode_result_set(results, &mut buf);
            }
            ResponseFrame::Progress(fraction) => {
                buf.put_u32_le(message_type::PROGRESS);
                buf.put_f64_le(*fraction);
            }
            ResponseFrame::Error(text) => {
                buf.put_u32_le(message_type::ERROR);
                buf.put_u32_le(text.len() as u32);
                buf.put_slice(text.as_bytes());
            }
            ResponseFrame::Unknown(tag) => buf.put_u32_le(*tag),
        }
        buf
    }
}

fn decode_result_set(reader: &mut WireReader<'_>) -> Result<ResultSet> {
    let count = reader.read_count(3 * U32_SIZE)?;
    let mut objects = Vec::with_capacity(count);

    for _ in 0..count {
        let object_index = reader.read_u32()?;
        let name = reader.read_string()?;
        let uv_count = reader.read_count(2 * F64_SIZE)?;
        let mut uvs = Vec::with_capacity(uv_count);
        for _ in 0..uv_count {
            uvs.push(reader.read_f64_array::<2>()?);
        }
        objects.push(ObjectResult {
            object_index,
            name,
            uvs,
        });
    }

    let coverage = reader.read_f64()?;
    if !reader.is_exhausted() {
        tracing::debug!("Ignoring {} trailing bytes in result set", reader.remaining());
    }

    Ok(ResultSet { objects, coverage })
}

fn encode_result_set<B: BufMut>(results: &ResultSet, buf: &mut B) {
    buf.put_u32_le(results.objects.len() as u32);
    for object in &results.objects {
        buf.put_u32_le(object.object_index);
        buf.put_u32_le(object.name.len() as u32);
        buf.put_slice(object.name.as_bytes());
        buf.put_u32_le(object.uvs.len() as u32);
        for uv in &object.uvs {
            buf.put_f64_le(uv[0]);
            buf.put_f64_le(uv[1]);
        }
    }
    buf.put_f64_le(results.coverage);
}
