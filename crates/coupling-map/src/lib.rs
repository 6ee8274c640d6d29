//! Nearest-projection field mapping between coupling meshes.
//!
//! This crate transfers scalar and vector fields between two unstructured
//! surface meshes, as used in partitioned multi-physics coupling. For each
//! vertex of one mesh it builds an interpolation stencil onto the nearest
//! primitive of the other mesh, walking the cascade triangle → edge →
//! vertex until a projection with non-negative barycentric weights is
//! found. The stencils then apply in either direction:
//!
//! - **consistent**: interpolate a state field from input to output
//!   (constant fields map to themselves),
//! - **conservative**: apply the adjoint, preserving the field integral.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use coupling_map::{Constraint, Mapping, NearestProjectionMapping};
//! use coupling_mesh::Mesh;
//! use nalgebra::Point3;
//!
//! // A single triangle serving as the interpolation source.
//! let mut input = Mesh::new("fluid", 3).unwrap();
//! let a = input.add_vertex(Point3::new(0.0, 0.0, 0.0)).unwrap();
//! let b = input.add_vertex(Point3::new(1.0, 0.0, 0.0)).unwrap();
//! let c = input.add_vertex(Point3::new(0.0, 1.0, 0.0)).unwrap();
//! input.add_triangle(a, b, c).unwrap();
//!
//! let mut output = Mesh::new("solid", 3).unwrap();
//! output.add_vertex(Point3::new(0.25, 0.25, 0.5)).unwrap();
//!
//! let mut mapping = NearestProjectionMapping::new(
//!     Constraint::Consistent,
//!     3,
//!     Arc::new(input),
//!     Arc::new(output),
//! )
//! .unwrap();
//!
//! mapping.compute_mapping().unwrap();
//! let in_values = [1.0, 0.0, 0.0];
//! let mut out_values = [0.0];
//! mapping.map(&in_values, &mut out_values).unwrap();
//! assert!((out_values[0] - 0.5).abs() < 1e-12);
//! ```
//!
//! Field arrays are flat `&[f64]` slices of length vertex count times
//! component count; the output slice must be zeroed by the caller.
//! Mappings are polymorphic over the [`Mapping`] trait so the enclosing
//! system can drive any flavour uniformly.

mod timing;

pub mod error;
pub mod mapping;
pub mod nearest_projection;
pub mod projection;
pub mod stencil;

pub use error::{MapError, MapResult};
pub use mapping::{Constraint, Mapping, MeshRequirement};
pub use nearest_projection::NearestProjectionMapping;
pub use stencil::{InterpolationElement, Stencil, StencilTable};
