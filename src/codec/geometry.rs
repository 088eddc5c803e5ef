//! Geometry block encoding.
//!
//! ```text
//! name      u32 len | UTF-8 bytes
//! vertices  u32 count | count × (f64 x, f64 y, f64 z)
//! faces     u32 count | per face:
//!             u32 loop count | per loop:
//!               u32 vertex | f64×3 normal | f64×2 uv | u8 pinned | u32 loop index
//! ```
//!
//! The loop index runs 0..L-1 across the whole mesh and is never reset per
//! face. Results come back in the same order, which is what lets the mesh
//! writer replay them positionally.

use bytes::BufMut;

use crate::error::{PackError, Result};
use crate::mesh::{LoopLayout, MeshFace, MeshLoopSample, MeshSnapshot, MeshVertex};
use crate::protocol::{WireReader, BOOL_SIZE, F64_SIZE, U32_SIZE};

/// Bytes per encoded loop record.
pub const LOOP_RECORD_SIZE: usize = U32_SIZE + 5 * F64_SIZE + BOOL_SIZE + U32_SIZE;

/// Bytes per encoded vertex.
pub const VERTEX_RECORD_SIZE: usize = 3 * F64_SIZE;

/// Minimum loops per face.
pub const MIN_FACE_LOOPS: usize = 3;

/// Append one geometry block to `buf`.
///
/// Fails before writing anything if the vertex table isn't contiguous
/// (`vertices[i].index == i`), a loop references a missing vertex, or a face
/// has fewer than three loops. Returns the per-face loop counts.
pub fn encode_geometry<B: BufMut>(snapshot: &MeshSnapshot, buf: &mut B) -> Result<LoopLayout> {
    validate(snapshot)?;

    let name = snapshot.name.as_bytes();
    buf.put_u32_le(name.len() as u32);
    buf.put_slice(name);

    buf.put_u32_le(snapshot.vertices.len() as u32);
    for vertex in &snapshot.vertices {
        for c in vertex.position {
            buf.put_f64_le(c);
        }
    }

    let mut loop_index: u32 = 0;
    buf.put_u32_le(snapshot.faces.len() as u32);
    for face in &snapshot.faces {
        buf.put_u32_le(face.loops.len() as u32);
        for sample in &face.loops {
            buf.put_u32_le(sample.vertex);
            for c in sample.normal {
                buf.put_f64_le(c);
            }
            buf.put_f64_le(sample.uv[0]);
            buf.put_f64_le(sample.uv[1]);
            buf.put_u8(sample.pinned as u8);
            buf.put_u32_le(loop_index);
            loop_index += 1;
        }
    }

    Ok(snapshot.loop_layout())
}

fn validate(snapshot: &MeshSnapshot) -> Result<()> {
    if let Some((i, v)) = snapshot
        .vertices
        .iter()
        .enumerate()
        .find(|(i, v)| v.index as usize != *i)
    {
        return Err(PackError::Configuration(format!(
            "{}: vertex table is not contiguous (slot {} holds index {})",
            snapshot.name, i, v.index
        )));
    }

    let vertex_count = snapshot.vertices.len();
    for (f, face) in snapshot.faces.iter().enumerate() {
        if face.loops.len() < MIN_FACE_LOOPS {
            return Err(PackError::Configuration(format!(
                "{}: face {} has {} loops, need at least {}",
                snapshot.name,
                f,
                face.loops.len(),
                MIN_FACE_LOOPS
            )));
        }
        if let Some(bad) = face.loops.iter().find(|l| l.vertex as usize >= vertex_count) {
            return Err(PackError::Configuration(format!(
                "{}: face {} references vertex {} of {}",
                snapshot.name, f, bad.vertex, vertex_count
            )));
        }
    }
    Ok(())
}

/// A geometry block decoded on the engine side.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedGeometry {
    pub snapshot: MeshSnapshot,
    /// Sequential loop indices exactly as they appeared on the wire.
    pub loop_indices: Vec<u32>,
}

/// Inverse of [`encode_geometry`].
pub fn decode_geometry(reader: &mut WireReader<'_>) -> Result<DecodedGeometry> {
    let name = reader.read_string()?;

    let vertex_count = reader.read_count(VERTEX_RECORD_SIZE)?;
    let mut vertices = Vec::with_capacity(vertex_count);
    for index in 0..vertex_count {
        vertices.push(MeshVertex {
            index: index as u32,
            position: reader.read_f64_array::<3>()?,
        });
    }

    let face_count = reader.read_count(U32_SIZE)?;
    let mut faces = Vec::with_capacity(face_count);
    let mut loop_indices = Vec::new();
    for _ in 0..face_count {
        let loop_count = reader.read_count(LOOP_RECORD_SIZE)?;
        let mut loops = Vec::with_capacity(loop_count);
        for _ in 0..loop_count {
            let vertex = reader.read_u32()?;
            let normal = reader.read_f64_array::<3>()?;
            let uv = reader.read_f64_array::<2>()?;
            let pinned = reader.read_bool()?;
            loop_indices.push(reader.read_u32()?);
            loops.push(MeshLoopSample {
                vertex,
                normal,
                uv,
                pinned,
            });
        }
        faces.push(MeshFace { loops });
    }

    Ok(DecodedGeometry {
        snapshot: MeshSnapshot {
            name,
            vertices,
            faces,
        },
        loop_indices,
    })
}
