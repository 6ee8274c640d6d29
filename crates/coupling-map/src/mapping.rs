//! Polymorphic mapping interface.
//!
//! The enclosing system treats all mapping flavours through this trait;
//! nearest-projection is one implementation. Mesh requirements declared
//! here tell the system what to request from remote participants: a
//! `Full` side needs connectivity (edges, triangles), a `Vertex` side only
//! needs coordinates.

use crate::error::MapResult;

/// Direction of field transfer.
///
/// `Consistent` interpolates a state field from input to output.
/// `Conservative` applies the adjoint of the consistent map, preserving the
/// field integral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    Consistent,
    Conservative,
}

/// What a mapping needs from a mesh to operate on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshRequirement {
    /// Vertex coordinates suffice.
    Vertex,
    /// Connectivity (edges and, in 3-D, triangles) is required.
    Full,
}

/// Capability set shared by all mapping flavours.
pub trait Mapping {
    /// The transfer direction this mapping was constructed with.
    fn constraint(&self) -> Constraint;

    /// Requirement on the input mesh.
    fn input_requirement(&self) -> MeshRequirement;

    /// Requirement on the output mesh.
    fn output_requirement(&self) -> MeshRequirement;

    /// Whether stencils are currently available for [`map`](Mapping::map).
    fn has_computed_mapping(&self) -> bool;

    /// Populate the stencil table, one stencil per origin vertex.
    fn compute_mapping(&mut self) -> MapResult<()>;

    /// Discard all stencils.
    fn clear(&mut self);

    /// Apply the stored stencils to a flat field array. `out_values` must
    /// be zeroed by the caller; mapped contributions accumulate into it.
    fn map(&self, in_values: &[f64], out_values: &mut [f64]) -> MapResult<()>;

    /// Tag the search-mesh vertices referenced by any nonzero stencil
    /// entry, then discard the stencils.
    fn tag_mesh_first_round(&mut self) -> MapResult<()>;

    /// Second tagging round; a no-op for projection-based mappings.
    fn tag_mesh_second_round(&mut self) -> MapResult<()>;
}
