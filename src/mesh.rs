//! Mesh snapshots and the host mesh interface.
//!
//! The host's scene graph is an external collaborator. It is reached only
//! through [`HostMesh`]: the packer asks each mesh for a read-only
//! [`MeshSnapshot`] before the exchange and writes packed UVs back through
//! [`HostMesh::set_loop_uv`] afterwards. [`EditableMesh`] is a plain
//! in-memory implementation used by tests and the stub engine.

use std::collections::HashSet;

/// One vertex of a snapshot. `index` is stable within the snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshVertex {
    pub index: u32,
    pub position: [f64; 3],
}

/// One (vertex, face) incidence carrying its own normal, UV and pin flag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshLoopSample {
    pub vertex: u32,
    pub normal: [f64; 3],
    pub uv: [f64; 2],
    pub pinned: bool,
}

/// Ordered loops of one face.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshFace {
    pub loops: Vec<MeshLoopSample>,
}

/// Read-only copy of one mesh taken at the start of a pack request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshSnapshot {
    pub name: String,
    pub vertices: Vec<MeshVertex>,
    pub faces: Vec<MeshFace>,
}

impl MeshSnapshot {
    /// Total loops across all faces.
    pub fn loop_count(&self) -> usize {
        self.faces.iter().map(|f| f.loops.len()).sum()
    }

    /// Per-face loop counts in traversal order.
    pub fn loop_layout(&self) -> LoopLayout {
        LoopLayout {
            face_loops: self.faces.iter().map(|f| f.loops.len() as u32).collect(),
        }
    }

    /// UVs of every loop in traversal order.
    pub fn uvs(&self) -> Vec<[f64; 2]> {
        self.faces
            .iter()
            .flat_map(|f| f.loops.iter().map(|l| l.uv))
            .collect()
    }
}

/// Face/loop shape recorded at encode time.
///
/// Sequential loop index `i` maps back to a `(face, corner)` pair by walking
/// faces in order, which is how results are replayed positionally.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoopLayout {
    face_loops: Vec<u32>,
}

impl LoopLayout {
    pub fn new(face_loops: Vec<u32>) -> Self {
        Self { face_loops }
    }

    /// Total loop count.
    pub fn loop_count(&self) -> usize {
        self.face_loops.iter().map(|&n| n as usize).sum()
    }

    /// Iterate `(face, corner)` in sequential loop index order.
    pub fn corners(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.face_loops
            .iter()
            .enumerate()
            .flat_map(|(face, &n)| (0..n as usize).map(move |corner| (face, corner)))
    }
}

/// Interface to a mesh object owned by the host.
///
/// Only the controller calls the mutating methods; snapshots are plain data
/// and may cross to the worker.
pub trait HostMesh {
    /// Object name, sent to the engine.
    fn name(&self) -> &str;

    /// Identity of the underlying mesh data. Objects sharing data return the
    /// same key and are packed once.
    fn mesh_key(&self) -> u64;

    /// Snapshot of the mesh using the active UV layer.
    fn snapshot(&self) -> MeshSnapshot;

    /// Write one loop UV on the active UV layer.
    fn set_loop_uv(&mut self, face: usize, corner: usize, uv: [f64; 2]);

    fn has_uv_layer(&self, name: &str) -> bool;

    fn add_uv_layer(&mut self, name: &str);

    /// Make `name` the active layer. Returns false if it doesn't exist.
    fn set_active_uv_layer(&mut self, name: &str) -> bool;

    /// Remove a layer. Returns false if it didn't exist.
    fn remove_uv_layer(&mut self, name: &str) -> bool;
}

/// Split off the first object for every distinct [`HostMesh::mesh_key`].
///
/// Returns `(unique, shared)`; `shared` holds the later objects whose mesh
/// data is already covered, in their original order.
pub fn split_unique<M: HostMesh>(meshes: Vec<M>) -> (Vec<M>, Vec<M>) {
    let mut seen = HashSet::new();
    meshes
        .into_iter()
        .partition(|m| seen.insert(m.mesh_key()))
}

/// Add the named UV layer where missing and make it active on every mesh.
pub fn ensure_uv_channel<M: HostMesh>(meshes: &mut [M], name: &str) {
    for mesh in meshes.iter_mut() {
        if !mesh.has_uv_layer(name) {
            tracing::debug!("Adding UV layer '{}' to {}", name, mesh.name());
            mesh.add_uv_layer(name);
        }
        mesh.set_active_uv_layer(name);
    }
}

/// Remove the named UV layer from every mesh that has it.
pub fn remove_uv_channel<M: HostMesh>(meshes: &mut [M], name: &str) -> usize {
    meshes
        .iter_mut()
        .filter_map(|m| m.remove_uv_layer(name).then_some(()))
        .count()
}

#[derive(Debug, Clone, PartialEq)]
struct UvLayer {
    name: String,
    uvs: Vec<Vec<[f64; 2]>>,
    pins: Vec<Vec<bool>>,
}

/// Simple polygon mesh with named UV layers.
#[derive(Debug, Clone, PartialEq)]
pub struct EditableMesh {
    name: String,
    key: u64,
    positions: Vec<[f64; 3]>,
    faces: Vec<Vec<u32>>,
    layers: Vec<UvLayer>,
    active_layer: usize,
}

/// Name of the layer created by [`EditableMesh::new`].
pub const DEFAULT_UV_LAYER: &str = "UVMap";

impl EditableMesh {
    /// Create a mesh with one default UV layer (all UVs at the origin).
    ///
    /// `faces` hold vertex indices into `positions`.
    pub fn new(
        name: impl Into<String>,
        key: u64,
        positions: Vec<[f64; 3]>,
        faces: Vec<Vec<u32>>,
    ) -> Self {
        let mut mesh = Self {
            name: name.into(),
            key,
            positions,
            faces,
            layers: Vec::new(),
            active_layer: 0,
        };
        mesh.add_uv_layer(DEFAULT_UV_LAYER);
        mesh
    }

    /// Replace the active layer's UVs. `uvs[face][corner]`.
    pub fn with_uvs(mut self, uvs: Vec<Vec<[f64; 2]>>) -> Self {
        if let Some(layer) = self.layers.get_mut(self.active_layer) {
            layer.uvs = uvs;
        }
        self
    }

    /// Pin one loop on the active layer.
    pub fn pin(&mut self, face: usize, corner: usize) {
        if let Some(pin) = self
            .layers
            .get_mut(self.active_layer)
            .and_then(|l| l.pins.get_mut(face))
            .and_then(|f| f.get_mut(corner))
        {
            *pin = true;
        }
    }

    /// UV of one loop on the active layer.
    pub fn loop_uv(&self, face: usize, corner: usize) -> Option<[f64; 2]> {
        self.layers
            .get(self.active_layer)
            .and_then(|l| l.uvs.get(face))
            .and_then(|f| f.get(corner))
            .copied()
    }

    /// Name of the active UV layer, if any.
    pub fn active_uv_layer(&self) -> Option<&str> {
        self.layers.get(self.active_layer).map(|l| l.name.as_str())
    }

    pub fn uv_layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name.as_str()).collect()
    }

    /// Area-weighted vertex normals (Newell face normals summed per vertex).
    fn vertex_normals(&self) -> Vec<[f64; 3]> {
        let mut normals = vec![[0.0f64; 3]; self.positions.len()];

        for face in &self.faces {
            let mut n = [0.0f64; 3];
            for (i, &a) in face.iter().enumerate() {
                let b = face[(i + 1) % face.len()];
                let (Some(pa), Some(pb)) = (
                    self.positions.get(a as usize),
                    self.positions.get(b as usize),
                ) else {
                    continue;
                };
                n[0] += (pa[1] - pb[1]) * (pa[2] + pb[2]);
                n[1] += (pa[2] - pb[2]) * (pa[0] + pb[0]);
                n[2] += (pa[0] - pb[0]) * (pa[1] + pb[1]);
            }
            for &v in face {
                if let Some(acc) = normals.get_mut(v as usize) {
                    acc[0] += n[0];
                    acc[1] += n[1];
                    acc[2] += n[2];
                }
            }
        }

        for n in normals.iter_mut() {
            let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
            if len > 0.0 {
                n.iter_mut().for_each(|c| *c /= len);
            }
        }
        normals
    }
}

impl HostMesh for EditableMesh {
    fn name(&self) -> &str {
        &self.name
    }

    fn mesh_key(&self) -> u64 {
        self.key
    }

    fn snapshot(&self) -> MeshSnapshot {
        let normals = self.vertex_normals();
        let layer = self.layers.get(self.active_layer);

        let vertices = self
            .positions
            .iter()
            .enumerate()
            .map(|(i, &position)| MeshVertex {
                index: i as u32,
                position,
            })
            .collect();

        let faces = self
            .faces
            .iter()
            .enumerate()
            .map(|(f, face)| MeshFace {
                loops: face
                    .iter()
                    .enumerate()
                    .map(|(c, &vertex)| MeshLoopSample {
                        vertex,
                        normal: normals.get(vertex as usize).copied().unwrap_or_default(),
                        uv: layer
                            .and_then(|l| l.uvs.get(f))
                            .and_then(|uvs| uvs.get(c))
                            .copied()
                            .unwrap_or_default(),
                        pinned: layer
                            .and_then(|l| l.pins.get(f))
                            .and_then(|pins| pins.get(c))
                            .copied()
                            .unwrap_or(false),
                    })
                    .collect(),
            })
            .collect();

        MeshSnapshot {
            name: self.name.clone(),
            vertices,
            faces,
        }
    }

    fn set_loop_uv(&mut self, face: usize, corner: usize, uv: [f64; 2]) {
        if let Some(slot) = self
            .layers
            .get_mut(self.active_layer)
            .and_then(|l| l.uvs.get_mut(face))
            .and_then(|f| f.get_mut(corner))
        {
            *slot = uv;
        }
    }

    fn has_uv_layer(&self, name: &str) -> bool {
        self.layers.iter().any(|l| l.name == name)
    }

    fn add_uv_layer(&mut self, name: &str) {
        // New layers start as a copy of the active one, like most DCC hosts.
        let (uvs, pins) = match self.layers.get(self.active_layer) {
            Some(active) => (active.uvs.clone(), active.pins.clone()),
            None => (
                self.faces.iter().map(|f| vec![[0.0; 2]; f.len()]).collect(),
                self.faces.iter().map(|f| vec![false; f.len()]).collect(),
            ),
        };
        self.layers.push(UvLayer {
            name: name.to_string(),
            uvs,
            pins,
        });
    }

    fn set_active_uv_layer(&mut self, name: &str) -> bool {
        match self.layers.iter().position(|l| l.name == name) {
            Some(idx) => {
                self.active_layer = idx;
                true
            }
            None => false,
        }
    }

    fn remove_uv_layer(&mut self, name: &str) -> bool {
        let Some(idx) = self.layers.iter().position(|l| l.name == name) else {
            return false;
        };
        self.layers.remove(idx);
        if self.active_layer >= idx && self.active_layer > 0 {
            self.active_layer -= 1;
        }
        true
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Unit quad in the XY plane with UVs matching positions.
    pub(crate) fn quad(name: &str, key: u64) -> EditableMesh {
        EditableMesh::new(
            name,
            key,
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            vec![vec![0, 1, 2, 3]],
        )
        .with_uvs(vec![vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]])
    }

    #[test]
    fn test_snapshot_shape() {
        let snapshot = quad("Quad", 1).snapshot();

        assert_eq!(snapshot.name, "Quad");
        assert_eq!(snapshot.vertices.len(), 4);
        assert_eq!(snapshot.faces.len(), 1);
        assert_eq!(snapshot.loop_count(), 4);
        assert_eq!(snapshot.faces[0].loops[2].uv, [1.0, 1.0]);
        assert_eq!(snapshot.faces[0].loops[2].vertex, 2);
    }

    #[test]
    fn test_snapshot_normals_point_up() {
        let snapshot = quad("Quad", 1).snapshot();
        for l in &snapshot.faces[0].loops {
            assert!((l.normal[2] - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_pin_reaches_snapshot() {
        let mut mesh = quad("Quad", 1);
        mesh.pin(0, 3);
        let snapshot = mesh.snapshot();
        assert!(snapshot.faces[0].loops[3].pinned);
        assert!(!snapshot.faces[0].loops[0].pinned);
    }

    #[test]
    fn test_loop_layout_corners() {
        let layout = LoopLayout::new(vec![3, 4]);
        let corners: Vec<_> = layout.corners().collect();

        assert_eq!(layout.loop_count(), 7);
        assert_eq!(corners[0], (0, 0));
        assert_eq!(corners[2], (0, 2));
        assert_eq!(corners[3], (1, 0));
        assert_eq!(corners[6], (1, 3));
    }

    #[test]
    fn test_split_unique_keeps_first_per_key() {
        let meshes = vec![quad("A", 1), quad("B", 2), quad("A.001", 1), quad("B.001", 2)];
        let (unique, shared) = split_unique(meshes);
        let names = |v: &[EditableMesh]| -> Vec<String> {
            v.iter().map(|m| m.name().to_string()).collect()
        };
        assert_eq!(names(&unique), vec!["A", "B"]);
        assert_eq!(names(&shared), vec!["A.001", "B.001"]);
    }

    #[test]
    fn test_ensure_uv_channel_copies_and_activates() {
        let mut meshes = vec![quad("A", 1)];
        ensure_uv_channel(&mut meshes, "UV-Packer");

        assert_eq!(meshes[0].active_uv_layer(), Some("UV-Packer"));
        assert_eq!(meshes[0].loop_uv(0, 1), Some([1.0, 0.0]));

        // Second call doesn't duplicate the layer.
        ensure_uv_channel(&mut meshes, "UV-Packer");
        assert_eq!(meshes[0].uv_layer_names(), vec![DEFAULT_UV_LAYER, "UV-Packer"]);
    }

    #[test]
    fn test_new_layer_is_independent() {
        let mut meshes = vec![quad("A", 1)];
        ensure_uv_channel(&mut meshes, "Packed");
        meshes[0].set_loop_uv(0, 0, [0.5, 0.5]);

        assert!(meshes[0].set_active_uv_layer(DEFAULT_UV_LAYER));
        assert_eq!(meshes[0].loop_uv(0, 0), Some([0.0, 0.0]));
    }

    #[test]
    fn test_remove_uv_channel() {
        let mut meshes = vec![quad("A", 1), quad("B", 2)];
        ensure_uv_channel(&mut meshes[..1], "Packed");

        assert_eq!(remove_uv_channel(&mut meshes, "Packed"), 1);
        assert!(!meshes[0].has_uv_layer("Packed"));
        assert_eq!(meshes[0].active_uv_layer(), Some(DEFAULT_UV_LAYER));
    }
}
