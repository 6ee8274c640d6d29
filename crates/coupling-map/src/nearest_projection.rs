//! Nearest-projection mapping between coupling meshes.
//!
//! For every origin vertex the engine shortlists nearby search-mesh
//! primitives through the spatial indices, projects onto them in order of
//! distance, and keeps the first projection that lands inside a primitive.
//! Failing candidates fall through the cascade triangle → edge → vertex,
//! so a stencil is always produced as long as the search mesh has any
//! vertices at all.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hashbrown::HashSet;
use nalgebra::Point3;
use rayon::prelude::*;
use tracing::{debug, warn};

use coupling_mesh::index::{self, EdgeTree, TriangleTree, VertexTree};
use coupling_mesh::Mesh;

use crate::error::{MapError, MapResult};
use crate::mapping::{Constraint, Mapping, MeshRequirement};
use crate::projection;
use crate::stencil::{Stencil, StencilTable};
use crate::timing::OperationTimer;

/// Nearest candidates fetched per primitive kind. Bounding boxes can rank
/// near-ties differently from exact geometry; a margin of four covers the
/// reordering without measurable cost. Not user-tunable.
const CANDIDATE_COUNT: usize = 4;

/// Weights at or below this magnitude do not mark a vertex as referenced
/// during tagging.
const NONZERO_TOLERANCE: f64 = 1e-14;

/// Projection-based first-order mapping.
///
/// In the consistent direction, stencils are computed for output-mesh
/// vertices against input-mesh primitives; conservative is the mirror.
/// The instance owns its stencil table; meshes are shared read-only and
/// must outlive the mapping.
pub struct NearestProjectionMapping {
    constraint: Constraint,
    dimensions: usize,
    input: Arc<Mesh>,
    output: Arc<Mesh>,
    stencils: StencilTable,
    has_computed: bool,
}

impl NearestProjectionMapping {
    /// Create a mapping between `input` and `output`.
    ///
    /// Fails if `dimensions` is not 2 or 3, or if either mesh was built
    /// with a different dimension.
    pub fn new(
        constraint: Constraint,
        dimensions: usize,
        input: Arc<Mesh>,
        output: Arc<Mesh>,
    ) -> MapResult<Self> {
        if dimensions != 2 && dimensions != 3 {
            return Err(MapError::InvalidDimension { dimensions });
        }
        for mesh in [&input, &output] {
            if mesh.dimensions() != dimensions {
                return Err(MapError::MeshDimension {
                    mesh: mesh.name().to_string(),
                    expected: dimensions,
                    found: mesh.dimensions(),
                });
            }
        }
        Ok(Self {
            constraint,
            dimensions,
            input,
            output,
            stencils: StencilTable::new(),
            has_computed: false,
        })
    }

    /// The mesh field values are read from in the consistent direction.
    #[inline]
    pub fn input(&self) -> &Arc<Mesh> {
        &self.input
    }

    /// The mesh field values are written to in the consistent direction.
    #[inline]
    pub fn output(&self) -> &Arc<Mesh> {
        &self.output
    }

    /// Spatial dimension, 2 or 3.
    #[inline]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// The computed stencil table. Empty until
    /// [`compute_mapping`](Mapping::compute_mapping) runs.
    #[inline]
    pub fn stencils(&self) -> &StencilTable {
        &self.stencils
    }

    /// The mesh whose vertices stencils are computed for.
    fn origins(&self) -> &Arc<Mesh> {
        match self.constraint {
            Constraint::Consistent => &self.output,
            Constraint::Conservative => &self.input,
        }
    }

    /// The mesh whose primitives serve as projection targets.
    fn search_space(&self) -> &Arc<Mesh> {
        match self.constraint {
            Constraint::Consistent => &self.input,
            Constraint::Conservative => &self.output,
        }
    }
}

impl Mapping for NearestProjectionMapping {
    fn constraint(&self) -> Constraint {
        self.constraint
    }

    fn input_requirement(&self) -> MeshRequirement {
        match self.constraint {
            Constraint::Consistent => MeshRequirement::Full,
            Constraint::Conservative => MeshRequirement::Vertex,
        }
    }

    fn output_requirement(&self) -> MeshRequirement {
        match self.constraint {
            Constraint::Consistent => MeshRequirement::Vertex,
            Constraint::Conservative => MeshRequirement::Full,
        }
    }

    fn has_computed_mapping(&self) -> bool {
        self.has_computed
    }

    fn compute_mapping(&mut self) -> MapResult<()> {
        let origins = Arc::clone(self.origins());
        let search = Arc::clone(self.search_space());
        let _timer = OperationTimer::with_meshes("compute_mapping", &origins, &search);

        debug!(
            constraint = ?self.constraint,
            origins = %origins.summary(),
            search = %search.summary(),
            "computing mapping"
        );

        if origins.vertices().is_empty() {
            self.stencils.replace(Vec::new());
            self.has_computed = true;
            return Ok(());
        }
        if search.vertices().is_empty() {
            self.clear();
            return Err(MapError::EmptySearchSpace {
                mesh: search.name().to_string(),
            });
        }

        let use_triangles = self.dimensions == 3;
        if use_triangles && search.triangles().is_empty() {
            warn!(
                mesh = search.name(),
                "3D search mesh has no triangles; projecting onto primitives of lower dimension"
            );
        }
        if !use_triangles && search.edges().is_empty() {
            warn!(
                mesh = search.name(),
                "2D search mesh has no edges; falling back to nearest-neighbor mapping"
            );
        }

        let triangle_tree = if use_triangles && !search.triangles().is_empty() {
            Some(index::triangle_tree(&search))
        } else {
            None
        };
        let edge_tree = if search.edges().is_empty() {
            None
        } else {
            Some(index::edge_tree(&search))
        };
        let vertex_tree = index::vertex_tree(&search);

        let degenerate = AtomicUsize::new(0);

        // Each stencil depends only on its own origin vertex, so origins
        // shard freely across workers; collect preserves origin order.
        let stencils: Vec<Stencil> = origins
            .vertices()
            .par_iter()
            .map(|origin| {
                let point = origin.position();
                if let Some(tree) = triangle_tree.as_deref() {
                    if let Some(stencil) =
                        project_onto_triangles(&point, tree, &search, &degenerate)
                    {
                        return stencil;
                    }
                }
                if let Some(tree) = edge_tree.as_deref() {
                    if let Some(stencil) = project_onto_edges(&point, tree, &search, &degenerate) {
                        return stencil;
                    }
                }
                nearest_vertex_stencil(&point, &vertex_tree)
            })
            .collect();

        let skipped = degenerate.load(Ordering::Relaxed);
        if skipped > 0 {
            warn!(
                count = skipped,
                mesh = search.name(),
                "skipped degenerate primitives during projection"
            );
        }

        self.stencils.replace(stencils);
        self.has_computed = true;
        Ok(())
    }

    fn clear(&mut self) {
        self.stencils.clear();
        self.has_computed = false;
    }

    fn map(&self, in_values: &[f64], out_values: &mut [f64]) -> MapResult<()> {
        let _timer = OperationTimer::with_meshes("map", &self.input, &self.output);

        if !self.has_computed {
            return Err(MapError::StaleStencils);
        }

        let in_components = field_components(&self.input, in_values.len())?;
        let out_components = field_components(&self.output, out_values.len())?;
        if in_components != out_components {
            return Err(MapError::DimensionMismatch {
                input: in_components,
                output: out_components,
            });
        }
        let components = in_components;

        match self.constraint {
            Constraint::Consistent => {
                debug!("mapping consistent");
                // Stencils are indexed by output vertex.
                for (i, stencil) in self.stencils.iter().enumerate() {
                    let out_offset = i * components;
                    for element in stencil.elements() {
                        let in_offset = element.vertex as usize * components;
                        for k in 0..components {
                            out_values[out_offset + k] +=
                                element.weight * in_values[in_offset + k];
                        }
                    }
                }
            }
            Constraint::Conservative => {
                debug!("mapping conservative");
                // Stencils are indexed by input vertex and scatter into
                // shared output rows; this direction must stay serial.
                for (i, stencil) in self.stencils.iter().enumerate() {
                    let in_offset = i * components;
                    for element in stencil.elements() {
                        let out_offset = element.vertex as usize * components;
                        for k in 0..components {
                            out_values[out_offset + k] +=
                                element.weight * in_values[in_offset + k];
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn tag_mesh_first_round(&mut self) -> MapResult<()> {
        let _timer = OperationTimer::with_meshes("tag_mesh_first_round", &self.input, &self.output);

        self.compute_mapping()?;

        // Stencil elements reference vertices of the search mesh, so that
        // is the mesh to tag: input for consistent, output for conservative.
        let to_tag = Arc::clone(self.search_space());
        let total = to_tag.vertices().len();

        let mut referenced: HashSet<u32> = HashSet::new();
        'collect: for stencil in self.stencils.iter() {
            for element in stencil.elements() {
                if element.weight.abs() > NONZERO_TOLERANCE {
                    referenced.insert(element.vertex);
                    if referenced.len() == total {
                        break 'collect;
                    }
                }
            }
        }

        for &id in &referenced {
            if let Some(vertex) = to_tag.vertex(id) {
                vertex.set_tagged();
            }
        }
        debug!(
            tagged = referenced.len(),
            total,
            mesh = to_tag.name(),
            "first round tagged vertices"
        );

        // Stencils computed for tagging are speculative; the final mapping
        // is recomputed on the partitioned mesh.
        self.clear();
        Ok(())
    }

    fn tag_mesh_second_round(&mut self) -> MapResult<()> {
        Ok(())
    }
}

/// Component count of a flat field over `mesh`, zero for an empty slice.
fn field_components(mesh: &Mesh, length: usize) -> MapResult<usize> {
    let vertex_count = mesh.vertices().len();
    if vertex_count == 0 {
        return if length == 0 {
            Ok(0)
        } else {
            Err(MapError::InvalidFieldLength {
                mesh: mesh.name().to_string(),
                length,
                vertex_count,
            })
        };
    }
    if length % vertex_count != 0 {
        return Err(MapError::InvalidFieldLength {
            mesh: mesh.name().to_string(),
            length,
            vertex_count,
        });
    }
    Ok(length / vertex_count)
}

fn project_onto_triangles(
    point: &Point3<f64>,
    tree: &TriangleTree,
    search: &Mesh,
    degenerate: &AtomicUsize,
) -> Option<Stencil> {
    for candidate in tree.nearest(point, CANDIDATE_COUNT) {
        let triangle = &search.triangles()[candidate.index as usize];
        let corners = search.triangle_points(triangle);
        match projection::project_onto_triangle(point, corners, triangle.vertices()) {
            Some(stencil) if stencil.is_interior() => return Some(stencil),
            Some(_) => {}
            None => {
                degenerate.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    None
}

fn project_onto_edges(
    point: &Point3<f64>,
    tree: &EdgeTree,
    search: &Mesh,
    degenerate: &AtomicUsize,
) -> Option<Stencil> {
    for candidate in tree.nearest(point, CANDIDATE_COUNT) {
        let edge = &search.edges()[candidate.index as usize];
        let endpoints = search.segment_points(edge);
        match projection::project_onto_segment(point, endpoints, edge.vertices()) {
            Some(stencil) if stencil.is_interior() => return Some(stencil),
            Some(_) => {}
            None => {
                degenerate.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    None
}

fn nearest_vertex_stencil(point: &Point3<f64>, tree: &VertexTree) -> Stencil {
    // A margin of candidates keeps equidistant ties resolvable by id.
    let matches = tree.nearest(point, CANDIDATE_COUNT);
    let nearest = matches
        .first()
        .expect("search mesh has vertices; checked before the origin loop");
    projection::vertex_stencil(nearest.index)
}
