//! Replays packed UVs onto host meshes.
//!
//! Results are joined to the submitted meshes by object index and written
//! positionally: uv `i` goes to the loop that carried sequential index `i`
//! in the request. Runs on the controller only.

use crate::codec::{ObjectResult, ResultSet};
use crate::error::{PackError, Result};
use crate::mesh::{HostMesh, LoopLayout};

/// Outcome of replaying a whole [`ResultSet`].
#[derive(Debug, Default)]
pub struct WriteReport {
    /// Objects whose UVs were written.
    pub written: usize,
    /// One error per object that was skipped.
    pub errors: Vec<PackError>,
}

impl WriteReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Write every object in `results` to its mesh.
///
/// `meshes` and `layouts` are indexed by object index, as submitted. A bad
/// entry is recorded in the report and skipped; the rest are still written.
pub fn apply_results<M: HostMesh>(
    meshes: &mut [M],
    layouts: &[LoopLayout],
    results: &ResultSet,
) -> WriteReport {
    let mut report = WriteReport::default();

    for object in &results.objects {
        let index = object.object_index as usize;
        let outcome = match (meshes.get_mut(index), layouts.get(index)) {
            (Some(mesh), Some(layout)) => apply_object(mesh, layout, object),
            _ => Err(PackError::Protocol(format!(
                "Result for unknown object index {} ('{}')",
                object.object_index, object.name
            ))),
        };

        match outcome {
            Ok(()) => report.written += 1,
            Err(e) => {
                tracing::warn!("Skipping packed UVs: {}", e);
                report.errors.push(e);
            }
        }
    }

    tracing::debug!(
        "Applied packed UVs to {} of {} objects",
        report.written,
        results.objects.len()
    );
    report
}

/// Write one object's UVs. Nothing is written on a count mismatch.
pub fn apply_object<M: HostMesh>(
    mesh: &mut M,
    layout: &LoopLayout,
    result: &ObjectResult,
) -> Result<()> {
    let expected = layout.loop_count();
    if result.uvs.len() != expected {
        return Err(PackError::Protocol(format!(
            "{}: engine returned {} UVs for {} loops",
            mesh.name(),
            result.uvs.len(),
            expected
        )));
    }

    for ((face, corner), uv) in layout.corners().zip(&result.uvs) {
        mesh.set_loop_uv(face, corner, *uv);
    }
    Ok(())
}
