//! Error types for mesh construction.

use thiserror::Error;

/// Result type alias for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;

/// Errors that can occur while building a mesh.
#[derive(Debug, Error)]
pub enum MeshError {
    /// Mesh dimension outside the supported range.
    #[error("unsupported mesh dimension {dimensions}, expected 2 or 3")]
    InvalidDimension { dimensions: usize },

    /// A primitive references a vertex that does not exist.
    #[error("{primitive} references vertex {vertex_index}, but mesh \"{mesh}\" only has {vertex_count} vertices")]
    InvalidVertexIndex {
        mesh: String,
        primitive: &'static str,
        vertex_index: u32,
        vertex_count: usize,
    },

    /// A vertex coordinate is NaN or infinite.
    #[error("invalid coordinate on vertex {vertex_index} of mesh \"{mesh}\": {coordinate} is {value}")]
    InvalidCoordinate {
        mesh: String,
        vertex_index: u32,
        coordinate: &'static str,
        value: f64,
    },
}
