//! Error types for mapping operations.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for mapping operations.
pub type MapResult<T> = Result<T, MapError>;

/// Errors that can occur while computing or applying a mapping.
///
/// Degenerate geometry is deliberately absent: a vanishing triangle or edge
/// encountered during projection is recovered locally by falling through to
/// a lower-dimensional primitive and is only reported as a warning.
#[derive(Debug, Error, Diagnostic)]
pub enum MapError {
    /// The search mesh has no primitives of any dimension.
    #[error("search mesh \"{mesh}\" has no vertices to project onto")]
    #[diagnostic(
        code(map::search::empty),
        help(
            "The mesh serving as projection target must contain at least its vertices. Check that the mesh was populated before computing the mapping."
        )
    )]
    EmptySearchSpace { mesh: String },

    /// Input and output fields carry a different number of components.
    #[error("field component counts differ: input carries {input}, output carries {output}")]
    #[diagnostic(
        code(map::fields::dimension_mismatch),
        help("Both fields must be scalar, or vectors of the same dimension.")
    )]
    DimensionMismatch { input: usize, output: usize },

    /// A field slice length is not a multiple of its mesh's vertex count.
    #[error("field of length {length} does not evenly cover the {vertex_count} vertices of mesh \"{mesh}\"")]
    #[diagnostic(
        code(map::fields::invalid_length),
        help("Field arrays are flat: vertex count times component count.")
    )]
    InvalidFieldLength {
        mesh: String,
        length: usize,
        vertex_count: usize,
    },

    /// `map` was called before `compute_mapping`.
    #[error("no mapping has been computed")]
    #[diagnostic(
        code(map::stencils::stale),
        help("Call compute_mapping (or tag_mesh_first_round) before map.")
    )]
    StaleStencils,

    /// A mesh does not match the mapping's spatial dimension.
    #[error("mesh \"{mesh}\" is {found}-dimensional, mapping expects {expected}")]
    #[diagnostic(code(map::mesh::dimension))]
    MeshDimension {
        mesh: String,
        expected: usize,
        found: usize,
    },

    /// The requested mapping dimension is unsupported.
    #[error("unsupported mapping dimension {dimensions}, expected 2 or 3")]
    #[diagnostic(code(map::dimension::invalid))]
    InvalidDimension { dimensions: usize },
}
