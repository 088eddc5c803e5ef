//! Request assembly.
//!
//! ```text
//! u32 length (of everything after it)
//! u32 major | u32 minor | u32 patch
//! options block (36 bytes)
//! u32 object count
//! per object: u32 object index | geometry block
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::geometry::{decode_geometry, encode_geometry};
use crate::error::{PackError, Result};
use crate::mesh::{LoopLayout, MeshSnapshot};
use crate::options::PackOptions;
use crate::protocol::{WireReader, LENGTH_PREFIX_SIZE, PROTOCOL_VERSION, U32_SIZE};

/// Message reported when a request has nothing to pack.
pub const NO_OBJECTS_MESSAGE: &str = "No objects to pack.";

/// A full pack request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub protocol_version: (u32, u32, u32),
    pub options: PackOptions,
    /// `(object_index, snapshot)`; the index is the join key for results.
    pub objects: Vec<(u32, MeshSnapshot)>,
}

/// A framed request ready for the pipe, plus what the mesh writer needs later.
#[derive(Debug, Clone)]
pub struct EncodedRequest {
    /// Length prefix and body, written in one go.
    pub framed: Bytes,
    /// Loop layout per object, indexed by object index.
    pub layouts: Vec<LoopLayout>,
}

impl Request {
    /// Build a request for `snapshots`, assigning object indices by position.
    pub fn new(options: PackOptions, snapshots: Vec<MeshSnapshot>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            options,
            objects: snapshots
                .into_iter()
                .enumerate()
                .map(|(i, s)| (i as u32, s))
                .collect(),
        }
    }

    /// Encode and length-prefix the request.
    ///
    /// Zero objects is a [`PackError::Configuration`], reported before any I/O.
    pub fn encode(&self) -> Result<EncodedRequest> {
        if self.objects.is_empty() {
            return Err(PackError::Configuration(NO_OBJECTS_MESSAGE.to_string()));
        }

        let mut buf = BytesMut::with_capacity(4096);
        buf.put_u32_le(0); // patched below

        let (major, minor, patch) = self.protocol_version;
        buf.put_u32_le(major);
        buf.put_u32_le(minor);
        buf.put_u32_le(patch);
        self.options.encode_into(&mut buf);
        buf.put_u32_le(self.objects.len() as u32);

        let mut layouts = Vec::with_capacity(self.objects.len());
        for (object_index, snapshot) in &self.objects {
            buf.put_u32_le(*object_index);
            layouts.push(encode_geometry(snapshot, &mut buf)?);
        }

        let body_len = (buf.len() - LENGTH_PREFIX_SIZE) as u32;
        buf[..LENGTH_PREFIX_SIZE].copy_from_slice(&body_len.to_le_bytes());

        Ok(EncodedRequest {
            framed: buf.freeze(),
            layouts,
        })
    }

    /// Decode a request body (length prefix already stripped).
    pub fn decode(body: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(body);
        let protocol_version = (reader.read_u32()?, reader.read_u32()?, reader.read_u32()?);
        let options = PackOptions::decode(&mut reader)?;

        let count = reader.read_count(U32_SIZE)?;
        let mut objects = Vec::with_capacity(count);
        for _ in 0..count {
            let object_index = reader.read_u32()?;
            let geometry = decode_geometry(&mut reader)?;
            objects.push((object_index, geometry.snapshot));
        }

        if !reader.is_exhausted() {
            return Err(PackError::Protocol(format!(
                "{} trailing bytes after request",
                reader.remaining()
            )));
        }

        Ok(Self {
            protocol_version,
            options,
            objects,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::tests::quad;
    use crate::mesh::HostMesh;
    use crate::options::ENCODED_OPTIONS_SIZE;

    #[test]
    fn test_zero_objects_rejected() {
        let request = Request::new(PackOptions::default(), Vec::new());
        let err = request.encode().unwrap_err();

        assert!(matches!(err, PackError::Configuration(_)));
        assert_eq!(err.to_string(), "Configuration error: No objects to pack.");
    }

    #[test]
    fn test_length_prefix_covers_body() {
        let request = Request::new(PackOptions::default(), vec![quad("A", 1).snapshot()]);
        let encoded = request.encode().unwrap();

        let prefix = u32::from_le_bytes(encoded.framed[..4].try_into().unwrap());
        assert_eq!(prefix as usize, encoded.framed.len() - LENGTH_PREFIX_SIZE);
    }

    #[test]
    fn test_header_layout() {
        let request = Request::new(PackOptions::default(), vec![quad("A", 1).snapshot()]);
        let encoded = request.encode().unwrap();
        let body = &encoded.framed[LENGTH_PREFIX_SIZE..];

        assert_eq!(&body[0..4], &PROTOCOL_VERSION.0.to_le_bytes());
        assert_eq!(&body[4..8], &PROTOCOL_VERSION.1.to_le_bytes());
        assert_eq!(&body[8..12], &PROTOCOL_VERSION.2.to_le_bytes());
        assert_eq!(&body[12..12 + ENCODED_OPTIONS_SIZE], &PackOptions::default().encode()[..]);

        let count_at = 12 + ENCODED_OPTIONS_SIZE;
        assert_eq!(&body[count_at..count_at + 4], &1u32.to_le_bytes());
        assert_eq!(&body[count_at + 4..count_at + 8], &0u32.to_le_bytes());
    }

    #[test]
    fn test_decode_roundtrip_keeps_indices() {
        let request = Request::new(
            PackOptions::default(),
            vec![quad("A", 1).snapshot(), quad("B", 2).snapshot()],
        );
        let encoded = request.encode().unwrap();

        let decoded = Request::decode(&encoded.framed[LENGTH_PREFIX_SIZE..]).unwrap();
        assert_eq!(decoded, request);
        assert_eq!(decoded.objects[1].0, 1);
        assert_eq!(encoded.layouts.len(), 2);
        assert_eq!(encoded.layouts[1].loop_count(), 4);
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let request = Request::new(PackOptions::default(), vec![quad("A", 1).snapshot()]);
        let encoded = request.encode().unwrap();
        let mut body = encoded.framed[LENGTH_PREFIX_SIZE..].to_vec();
        body.push(0);

        assert!(Request::decode(&body).is_err());
    }

    #[test]
    fn test_bad_mesh_fails_whole_request() {
        let mut broken = quad("B", 2).snapshot();
        broken.faces[0].loops.truncate(1);
        let request = Request::new(PackOptions::default(), vec![quad("A", 1).snapshot(), broken]);

        assert!(matches!(request.encode(), Err(PackError::Configuration(_))));
    }
}
