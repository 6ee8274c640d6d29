//! Operation timing instrumentation.

use std::time::Instant;

use coupling_mesh::Mesh;
use tracing::{debug, info};

/// Logs an operation's elapsed wall time when dropped.
pub(crate) struct OperationTimer {
    name: &'static str,
    start: Instant,
}

impl OperationTimer {
    /// Start a timer for an operation transferring between two meshes.
    pub(crate) fn with_meshes(name: &'static str, from: &Mesh, to: &Mesh) -> Self {
        debug!(
            target: "coupling_map::timing",
            operation = name,
            from = from.name(),
            from_vertices = from.vertices().len(),
            to = to.name(),
            to_vertices = to.vertices().len(),
            "starting operation"
        );
        Self {
            name,
            start: Instant::now(),
        }
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        info!(
            target: "coupling_map::timing",
            operation = self.name,
            elapsed_ms = format!("{:.2}", elapsed_ms),
            "operation completed"
        );
    }
}
