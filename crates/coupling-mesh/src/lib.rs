//! Mesh primitives and spatial indices for coupling surfaces.
//!
//! This crate holds the read side of a mesh-to-mesh data mapping: immutable
//! geometric primitives (vertices, edges, triangles) collected into named
//! meshes, plus cached spatial indices supporting k-nearest primitive
//! queries. The mapping algorithms themselves live in `coupling-map`.
//!
//! # Quick Start
//!
//! ```
//! use coupling_mesh::Mesh;
//! use nalgebra::Point3;
//!
//! let mut mesh = Mesh::new("interface", 3).unwrap();
//! let a = mesh.add_vertex(Point3::new(0.0, 0.0, 0.0)).unwrap();
//! let b = mesh.add_vertex(Point3::new(1.0, 0.0, 0.0)).unwrap();
//! let c = mesh.add_vertex(Point3::new(0.0, 1.0, 0.0)).unwrap();
//! mesh.add_triangle(a, b, c).unwrap();
//!
//! let tree = coupling_mesh::index::triangle_tree(&mesh);
//! let nearest = tree.nearest(&Point3::new(0.2, 0.2, 1.0), 4);
//! assert_eq!(nearest[0].index, 0);
//! ```
//!
//! Indices are cached per mesh in a process-wide store and invalidated
//! through the mesh's version counter; see [`index::IndexCache`].

mod error;
mod types;

pub mod index;

pub use error::{MeshError, MeshResult};
pub use types::{Edge, Mesh, MeshId, Triangle, Vertex};
