//! Point-to-primitive projection kernels.
//!
//! Each kernel expresses the closest point on a primitive to a query point
//! as a combination of the primitive's corner vertices, returned as a
//! [`Stencil`] with signed weights. Interiority is not decided here; the
//! mapping engine tests it separately and walks the cascade on failure.

use nalgebra::Point3;

use crate::stencil::Stencil;

/// Orthogonal projection of `point` onto the triangle's plane, expressed in
/// barycentric coordinates over the corners.
///
/// Returns `None` when the triangle is degenerate (its Gram determinant
/// vanishes relative to the edge lengths), in which case the caller falls
/// through to a lower-dimensional primitive.
pub fn project_onto_triangle(
    point: &Point3<f64>,
    corners: [Point3<f64>; 3],
    vertex_ids: [u32; 3],
) -> Option<Stencil> {
    let [a, b, c] = corners;
    let e0 = b - a;
    let e1 = c - a;
    let w = point - a;

    let d00 = e0.norm_squared();
    let d01 = e0.dot(&e1);
    let d11 = e1.norm_squared();
    let denom = d00 * d11 - d01 * d01;
    if denom <= f64::EPSILON * d00 * d11 {
        return None;
    }

    let dw0 = w.dot(&e0);
    let dw1 = w.dot(&e1);
    let l1 = (d11 * dw0 - d01 * dw1) / denom;
    let l2 = (d00 * dw1 - d01 * dw0) / denom;
    let l0 = 1.0 - l1 - l2;

    Some(Stencil::from_triangle(vertex_ids, [l0, l1, l2]))
}

/// Projection of `point` onto the line carrying a segment, expressed as
/// weights `(1 - t, t)` over the endpoints.
///
/// Returns `None` for a degenerate (zero-length) edge.
pub fn project_onto_segment(
    point: &Point3<f64>,
    endpoints: [Point3<f64>; 2],
    vertex_ids: [u32; 2],
) -> Option<Stencil> {
    let [a, b] = endpoints;
    let direction = b - a;
    let len2 = direction.norm_squared();
    if len2 <= f64::EPSILON {
        return None;
    }

    let t = (point - a).dot(&direction) / len2;
    Some(Stencil::from_segment(vertex_ids, [1.0 - t, t]))
}

/// Unit-weight stencil on a single vertex.
#[inline]
pub fn vertex_stencil(vertex_id: u32) -> Stencil {
    Stencil::from_vertex(vertex_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    fn unit_triangle() -> [Point3<f64>; 3] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn test_triangle_interior_projection() {
        let stencil =
            project_onto_triangle(&Point3::new(0.25, 0.25, 0.5), unit_triangle(), [0, 1, 2])
                .unwrap();
        let weights: Vec<f64> = stencil.elements().iter().map(|e| e.weight).collect();
        assert!(approx_eq(weights[0], 0.5));
        assert!(approx_eq(weights[1], 0.25));
        assert!(approx_eq(weights[2], 0.25));
        assert!(stencil.is_interior());
        assert!(approx_eq(stencil.weight_sum(), 1.0));
    }

    #[test]
    fn test_triangle_exterior_weights_are_signed() {
        let stencil =
            project_onto_triangle(&Point3::new(-0.5, 0.5, 0.0), unit_triangle(), [0, 1, 2])
                .unwrap();
        assert!(!stencil.is_interior());
        // Signed weights still sum to one.
        assert!(approx_eq(stencil.weight_sum(), 1.0));
        assert!(stencil.elements()[1].weight < 0.0);
    }

    #[test]
    fn test_triangle_corner_projection() {
        let stencil = project_onto_triangle(&Point3::new(1.0, 0.0, 2.0), unit_triangle(), [0, 1, 2])
            .unwrap();
        let weights: Vec<f64> = stencil.elements().iter().map(|e| e.weight).collect();
        assert!(approx_eq(weights[0], 0.0));
        assert!(approx_eq(weights[1], 1.0));
        assert!(approx_eq(weights[2], 0.0));
        assert!(stencil.is_interior());
    }

    #[test]
    fn test_degenerate_triangle_rejected() {
        let collinear = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ];
        assert!(project_onto_triangle(&Point3::new(0.5, 1.0, 0.0), collinear, [0, 1, 2]).is_none());
    }

    #[test]
    fn test_segment_midpoint_projection() {
        let endpoints = [Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        let stencil = project_onto_segment(&Point3::new(0.5, 1.0, 0.0), endpoints, [0, 1]).unwrap();
        let weights: Vec<f64> = stencil.elements().iter().map(|e| e.weight).collect();
        assert!(approx_eq(weights[0], 0.5));
        assert!(approx_eq(weights[1], 0.5));
        assert!(stencil.is_interior());
    }

    #[test]
    fn test_segment_projection_beyond_endpoint() {
        let endpoints = [Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        let stencil = project_onto_segment(&Point3::new(2.0, 0.0, 0.0), endpoints, [0, 1]).unwrap();
        assert!(!stencil.is_interior());
        assert!(approx_eq(stencil.weight_sum(), 1.0));
        assert!(approx_eq(stencil.elements()[1].weight, 2.0));
    }

    #[test]
    fn test_degenerate_segment_rejected() {
        let endpoints = [Point3::new(1.0, 1.0, 0.0), Point3::new(1.0, 1.0, 0.0)];
        assert!(project_onto_segment(&Point3::new(0.0, 0.0, 0.0), endpoints, [0, 1]).is_none());
    }

    #[test]
    fn test_vertex_stencil() {
        let stencil = vertex_stencil(9);
        assert_eq!(stencil.elements()[0].vertex, 9);
        assert!(approx_eq(stencil.weight_sum(), 1.0));
    }
}
