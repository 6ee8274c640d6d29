//! Core mesh primitives.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use nalgebra::Point3;

use crate::error::{MeshError, MeshResult};

static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique identifier for a mesh.
///
/// Used as the key into the spatial index cache, so two meshes never share
/// an id even if one is dropped and another created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(u64);

impl MeshId {
    fn fresh() -> Self {
        MeshId(NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A mesh vertex with fixed coordinates and a stable identifier.
///
/// Ids are assigned sequentially on insertion, so a vertex id doubles as its
/// position in the mesh's vertex sequence and as the row index into flat
/// field arrays.
///
/// The tag bit marks vertices referenced by at least one interpolation
/// stencil. It is atomic so a tagging pass can run against a mesh shared
/// read-only between several mapping instances.
#[derive(Debug)]
pub struct Vertex {
    id: u32,
    position: Point3<f64>,
    tag: AtomicBool,
}

impl Vertex {
    /// Stable identifier, unique within the owning mesh.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Vertex coordinates. For 2-D meshes the z component is zero.
    #[inline]
    pub fn position(&self) -> Point3<f64> {
        self.position
    }

    /// Whether this vertex has been tagged as referenced by a stencil.
    #[inline]
    pub fn is_tagged(&self) -> bool {
        self.tag.load(Ordering::Relaxed)
    }

    /// Set the tag bit. Tags are sticky; there is no per-vertex reset.
    #[inline]
    pub fn set_tagged(&self) {
        self.tag.store(true, Ordering::Relaxed);
    }
}

/// An ordered pair of vertex ids within a single mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    id: u32,
    vertices: [u32; 2],
}

impl Edge {
    /// Stable identifier, unique within the owning mesh.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The two endpoint vertex ids.
    #[inline]
    pub fn vertices(&self) -> [u32; 2] {
        self.vertices
    }
}

/// An ordered triple of vertex ids within a single mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triangle {
    id: u32,
    vertices: [u32; 3],
}

impl Triangle {
    /// Stable identifier, unique within the owning mesh.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The three corner vertex ids.
    #[inline]
    pub fn vertices(&self) -> [u32; 3] {
        self.vertices
    }
}

/// A named collection of vertices, edges, and triangles.
///
/// Primitives are stored in insertion order and addressable by id, which
/// equals their position in the respective sequence. Every edge and
/// triangle references vertices of the same mesh; this is checked at
/// insertion time.
///
/// The version counter is bumped by every mutation and drives invalidation
/// of cached spatial indices (see [`crate::index`]).
#[derive(Debug)]
pub struct Mesh {
    name: String,
    id: MeshId,
    dimensions: usize,
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    triangles: Vec<Triangle>,
    version: u64,
}

impl Mesh {
    /// Create an empty mesh of the given dimension (2 or 3).
    pub fn new(name: impl Into<String>, dimensions: usize) -> MeshResult<Self> {
        if dimensions != 2 && dimensions != 3 {
            return Err(MeshError::InvalidDimension { dimensions });
        }
        Ok(Self {
            name: name.into(),
            id: MeshId::fresh(),
            dimensions,
            vertices: Vec::new(),
            edges: Vec::new(),
            triangles: Vec::new(),
            version: 0,
        })
    }

    /// Mesh name, used in diagnostics.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Process-unique mesh identifier.
    #[inline]
    pub fn id(&self) -> MeshId {
        self.id
    }

    /// Spatial dimension, 2 or 3.
    #[inline]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Current mutation counter.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Append a vertex and return its id.
    ///
    /// Coordinates must be finite. For 2-D meshes the z component is
    /// stored as zero regardless of the input.
    pub fn add_vertex(&mut self, position: Point3<f64>) -> MeshResult<u32> {
        let id = self.vertices.len() as u32;
        for (coordinate, value) in [("x", position.x), ("y", position.y), ("z", position.z)] {
            if !value.is_finite() {
                return Err(MeshError::InvalidCoordinate {
                    mesh: self.name.clone(),
                    vertex_index: id,
                    coordinate,
                    value,
                });
            }
        }
        let position = if self.dimensions == 2 {
            Point3::new(position.x, position.y, 0.0)
        } else {
            position
        };
        self.vertices.push(Vertex {
            id,
            position,
            tag: AtomicBool::new(false),
        });
        self.version += 1;
        Ok(id)
    }

    /// Append an edge between two existing vertices and return its id.
    pub fn add_edge(&mut self, a: u32, b: u32) -> MeshResult<u32> {
        self.check_vertex_index("edge", a)?;
        self.check_vertex_index("edge", b)?;
        let id = self.edges.len() as u32;
        self.edges.push(Edge {
            id,
            vertices: [a, b],
        });
        self.version += 1;
        Ok(id)
    }

    /// Append a triangle over three existing vertices and return its id.
    pub fn add_triangle(&mut self, a: u32, b: u32, c: u32) -> MeshResult<u32> {
        self.check_vertex_index("triangle", a)?;
        self.check_vertex_index("triangle", b)?;
        self.check_vertex_index("triangle", c)?;
        let id = self.triangles.len() as u32;
        self.triangles.push(Triangle {
            id,
            vertices: [a, b, c],
        });
        self.version += 1;
        Ok(id)
    }

    /// Vertices in insertion order.
    #[inline]
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Edges in insertion order.
    #[inline]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Triangles in insertion order.
    #[inline]
    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    /// Look up a vertex by id.
    #[inline]
    pub fn vertex(&self, id: u32) -> Option<&Vertex> {
        self.vertices.get(id as usize)
    }

    /// Resolve an edge's endpoints to coordinates.
    #[inline]
    pub fn segment_points(&self, edge: &Edge) -> [Point3<f64>; 2] {
        let [a, b] = edge.vertices;
        [
            self.vertices[a as usize].position,
            self.vertices[b as usize].position,
        ]
    }

    /// Resolve a triangle's corners to coordinates.
    #[inline]
    pub fn triangle_points(&self, triangle: &Triangle) -> [Point3<f64>; 3] {
        let [a, b, c] = triangle.vertices;
        [
            self.vertices[a as usize].position,
            self.vertices[b as usize].position,
            self.vertices[c as usize].position,
        ]
    }

    /// Axis-aligned bounding box over all vertices, or None if empty.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        if self.vertices.is_empty() {
            return None;
        }

        let mut min = self.vertices[0].position;
        let mut max = self.vertices[0].position;

        for vertex in &self.vertices[1..] {
            let p = &vertex.position;
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }

        Some((min, max))
    }

    /// One-line summary for diagnostics.
    pub fn summary(&self) -> String {
        format!(
            "\"{}\" ({}D, {} vertices, {} edges, {} triangles)",
            self.name,
            self.dimensions,
            self.vertices.len(),
            self.edges.len(),
            self.triangles.len()
        )
    }

    fn check_vertex_index(&self, primitive: &'static str, index: u32) -> MeshResult<()> {
        if (index as usize) < self.vertices.len() {
            Ok(())
        } else {
            Err(MeshError::InvalidVertexIndex {
                mesh: self.name.clone(),
                primitive,
                vertex_index: index,
                vertex_count: self.vertices.len(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_vertex_ids_are_sequential() {
        let mut mesh = Mesh::new("test", 3).unwrap();
        assert_eq!(mesh.add_vertex(Point3::new(0.0, 0.0, 0.0)).unwrap(), 0);
        assert_eq!(mesh.add_vertex(Point3::new(1.0, 0.0, 0.0)).unwrap(), 1);
        assert_eq!(mesh.add_vertex(Point3::new(0.0, 1.0, 0.0)).unwrap(), 2);
        assert_eq!(mesh.vertices().len(), 3);
        assert_eq!(mesh.vertex(1).unwrap().id(), 1);
    }

    #[test]
    fn test_two_dimensional_mesh_zeroes_z() {
        let mut mesh = Mesh::new("plane", 2).unwrap();
        let id = mesh.add_vertex(Point3::new(1.0, 2.0, 7.5)).unwrap();
        let position = mesh.vertex(id).unwrap().position();
        assert!(approx_eq(position.z, 0.0));
    }

    #[test]
    fn test_invalid_dimension_rejected() {
        assert!(matches!(
            Mesh::new("bad", 4),
            Err(MeshError::InvalidDimension { dimensions: 4 })
        ));
    }

    #[test]
    fn test_non_finite_coordinate_rejected() {
        let mut mesh = Mesh::new("test", 3).unwrap();
        let err = mesh.add_vertex(Point3::new(0.0, f64::NAN, 0.0));
        assert!(matches!(err, Err(MeshError::InvalidCoordinate { .. })));
    }

    #[test]
    fn test_edge_requires_existing_vertices() {
        let mut mesh = Mesh::new("test", 2).unwrap();
        mesh.add_vertex(Point3::new(0.0, 0.0, 0.0)).unwrap();
        assert!(mesh.add_edge(0, 1).is_err());
        mesh.add_vertex(Point3::new(1.0, 0.0, 0.0)).unwrap();
        assert_eq!(mesh.add_edge(0, 1).unwrap(), 0);
    }

    #[test]
    fn test_triangle_requires_existing_vertices() {
        let mut mesh = Mesh::new("test", 3).unwrap();
        mesh.add_vertex(Point3::new(0.0, 0.0, 0.0)).unwrap();
        mesh.add_vertex(Point3::new(1.0, 0.0, 0.0)).unwrap();
        assert!(mesh.add_triangle(0, 1, 2).is_err());
    }

    #[test]
    fn test_version_bumps_on_mutation() {
        let mut mesh = Mesh::new("test", 3).unwrap();
        let v0 = mesh.version();
        mesh.add_vertex(Point3::new(0.0, 0.0, 0.0)).unwrap();
        assert!(mesh.version() > v0);
        let v1 = mesh.version();
        mesh.add_vertex(Point3::new(1.0, 0.0, 0.0)).unwrap();
        mesh.add_edge(0, 1).unwrap();
        assert!(mesh.version() > v1);
    }

    #[test]
    fn test_mesh_ids_are_unique() {
        let a = Mesh::new("a", 3).unwrap();
        let b = Mesh::new("b", 3).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_tag_bit_defaults_false_and_sticks() {
        let mut mesh = Mesh::new("test", 3).unwrap();
        let id = mesh.add_vertex(Point3::new(0.0, 0.0, 0.0)).unwrap();
        let vertex = mesh.vertex(id).unwrap();
        assert!(!vertex.is_tagged());
        vertex.set_tagged();
        assert!(vertex.is_tagged());
        vertex.set_tagged();
        assert!(vertex.is_tagged());
    }

    #[test]
    fn test_bounds() {
        let mut mesh = Mesh::new("test", 3).unwrap();
        assert!(mesh.bounds().is_none());
        mesh.add_vertex(Point3::new(-1.0, 2.0, 0.5)).unwrap();
        mesh.add_vertex(Point3::new(3.0, -4.0, 1.5)).unwrap();
        let (min, max) = mesh.bounds().unwrap();
        assert!(approx_eq(min.x, -1.0) && approx_eq(min.y, -4.0) && approx_eq(min.z, 0.5));
        assert!(approx_eq(max.x, 3.0) && approx_eq(max.y, 2.0) && approx_eq(max.z, 1.5));
    }

    #[test]
    fn test_segment_and_triangle_points() {
        let mut mesh = Mesh::new("test", 3).unwrap();
        mesh.add_vertex(Point3::new(0.0, 0.0, 0.0)).unwrap();
        mesh.add_vertex(Point3::new(1.0, 0.0, 0.0)).unwrap();
        mesh.add_vertex(Point3::new(0.0, 1.0, 0.0)).unwrap();
        mesh.add_edge(0, 1).unwrap();
        mesh.add_triangle(0, 1, 2).unwrap();

        let [a, b] = mesh.segment_points(&mesh.edges()[0]);
        assert!(approx_eq(a.x, 0.0) && approx_eq(b.x, 1.0));

        let [p0, p1, p2] = mesh.triangle_points(&mesh.triangles()[0]);
        assert!(approx_eq(p0.x, 0.0) && approx_eq(p1.x, 1.0) && approx_eq(p2.y, 1.0));
    }
}
