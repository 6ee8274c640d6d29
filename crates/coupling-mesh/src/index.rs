//! Spatial indices over mesh primitives.
//!
//! Three index kinds are maintained per mesh: a k-d tree over vertices and
//! bulk-loaded AABB trees over edges and triangles. All support k-nearest
//! queries with exact point-to-primitive distances, so the returned
//! candidates are nearest by geometry rather than by bounding box.
//!
//! Built indices are held in a process-wide cache keyed by [`MeshId`] and
//! invalidated through the mesh version counter; see [`IndexCache`].

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};

use hashbrown::HashMap;
use nalgebra::Point3;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::types::{Mesh, MeshId};

/// A candidate primitive together with its exact distance to the query
/// point. Candidate lists are ordered by `(distance, index)` so ties break
/// deterministically by primitive id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub distance: f64,
    pub index: u32,
}

// ============================================================================
// Vertex tree
// ============================================================================

/// k-d tree over mesh vertices.
pub struct VertexTree {
    tree: kiddo::KdTree<f64, 3>,
    len: usize,
}

impl VertexTree {
    fn build(mesh: &Mesh) -> Self {
        let mut tree = kiddo::KdTree::new();
        for vertex in mesh.vertices() {
            let p = vertex.position();
            tree.add(&[p.x, p.y, p.z], vertex.id() as u64);
        }
        Self {
            tree,
            len: mesh.vertices().len(),
        }
    }

    /// Whether the underlying mesh had no vertices.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The k nearest vertices to `point`, ordered by `(distance, id)`.
    pub fn nearest(&self, point: &Point3<f64>, k: usize) -> Vec<Match> {
        if self.len == 0 || k == 0 {
            return Vec::new();
        }
        let neighbours = self
            .tree
            .nearest_n::<kiddo::SquaredEuclidean>(&[point.x, point.y, point.z], k);
        let mut matches: Vec<Match> = neighbours
            .iter()
            .map(|n| Match {
                distance: n.distance.sqrt(),
                index: n.item as u32,
            })
            .collect();
        matches.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.index.cmp(&b.index))
        });
        matches
    }
}

// ============================================================================
// AABB tree over extended primitives
// ============================================================================

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy)]
struct Aabb {
    min: Point3<f64>,
    max: Point3<f64>,
}

impl Aabb {
    fn from_points(points: &[Point3<f64>]) -> Self {
        let mut min = points[0];
        let mut max = points[0];
        for p in &points[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }
        Self { min, max }
    }

    fn merge(&self, other: &Aabb) -> Self {
        Self {
            min: Point3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Point3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    fn center(&self, axis: usize) -> f64 {
        (self.min[axis] + self.max[axis]) * 0.5
    }

    /// Squared distance from `point` to the box, zero inside.
    fn distance_squared(&self, point: &Point3<f64>) -> f64 {
        let mut d2 = 0.0;
        for axis in 0..3 {
            let v = point[axis];
            let d = if v < self.min[axis] {
                self.min[axis] - v
            } else if v > self.max[axis] {
                v - self.max[axis]
            } else {
                0.0
            };
            d2 += d * d;
        }
        d2
    }
}

/// Node of a bulk-loaded bounding-box tree.
#[derive(Debug)]
enum BvhNode {
    Leaf {
        aabb: Aabb,
        index: u32,
    },
    Internal {
        aabb: Aabb,
        left: Box<BvhNode>,
        right: Box<BvhNode>,
    },
}

impl BvhNode {
    /// Build by median split along the longest extent.
    fn build(bounds: &[Aabb], order: &mut [u32]) -> Option<Self> {
        if order.is_empty() {
            return None;
        }

        if order.len() == 1 {
            let index = order[0];
            return Some(BvhNode::Leaf {
                aabb: bounds[index as usize],
                index,
            });
        }

        let mut combined = bounds[order[0] as usize];
        for &i in order[1..].iter() {
            combined = combined.merge(&bounds[i as usize]);
        }

        let extent = combined.max - combined.min;
        let axis = if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        };

        order.sort_by(|&a, &b| {
            bounds[a as usize]
                .center(axis)
                .total_cmp(&bounds[b as usize].center(axis))
        });

        let mid = order.len() / 2;
        let (left_order, right_order) = order.split_at_mut(mid);

        match (
            BvhNode::build(bounds, left_order),
            BvhNode::build(bounds, right_order),
        ) {
            (Some(l), Some(r)) => Some(BvhNode::Internal {
                aabb: combined,
                left: Box::new(l),
                right: Box::new(r),
            }),
            (Some(l), None) => Some(l),
            (None, Some(r)) => Some(r),
            (None, None) => None,
        }
    }

    fn aabb(&self) -> &Aabb {
        match self {
            BvhNode::Leaf { aabb, .. } => aabb,
            BvhNode::Internal { aabb, .. } => aabb,
        }
    }
}

/// Queue entry for best-first traversal, ordered as a min-heap on the
/// squared lower-bound distance.
struct QueueEntry<'a> {
    distance_squared: f64,
    node: &'a BvhNode,
}

impl PartialEq for QueueEntry<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.distance_squared.total_cmp(&other.distance_squared) == CmpOrdering::Equal
    }
}

impl Eq for QueueEntry<'_> {}

impl PartialOrd for QueueEntry<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry<'_> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.distance_squared.total_cmp(&self.distance_squared)
    }
}

/// Best-first k-nearest over a BVH. `exact` maps a leaf's primitive index
/// to the squared point-to-primitive distance.
fn nearest_in_bvh(
    root: Option<&BvhNode>,
    point: &Point3<f64>,
    k: usize,
    exact: impl Fn(u32) -> f64,
) -> Vec<Match> {
    let root = match root {
        Some(root) => root,
        None => return Vec::new(),
    };
    if k == 0 {
        return Vec::new();
    }

    let mut queue = BinaryHeap::new();
    queue.push(QueueEntry {
        distance_squared: root.aabb().distance_squared(point),
        node: root,
    });

    // Kept sorted by (distance, index), at most k entries.
    let mut best: Vec<(f64, u32)> = Vec::with_capacity(k + 1);

    while let Some(entry) = queue.pop() {
        // Strict comparison keeps equal-distance subtrees visitable, so the
        // id tie-break stays deterministic.
        if best.len() == k && entry.distance_squared > best[k - 1].0 {
            break;
        }
        match entry.node {
            BvhNode::Leaf { index, .. } => {
                let d2 = exact(*index);
                let at = best
                    .partition_point(|&(bd, bi)| bd < d2 || (bd == d2 && bi < *index));
                best.insert(at, (d2, *index));
                best.truncate(k);
            }
            BvhNode::Internal { left, right, .. } => {
                queue.push(QueueEntry {
                    distance_squared: left.aabb().distance_squared(point),
                    node: left,
                });
                queue.push(QueueEntry {
                    distance_squared: right.aabb().distance_squared(point),
                    node: right,
                });
            }
        }
    }

    best.into_iter()
        .map(|(d2, index)| Match {
            distance: d2.sqrt(),
            index,
        })
        .collect()
}

/// Bounding-box tree over mesh edges.
pub struct EdgeTree {
    root: Option<BvhNode>,
    segments: Vec<[Point3<f64>; 2]>,
}

impl EdgeTree {
    fn build(mesh: &Mesh) -> Self {
        let segments: Vec<[Point3<f64>; 2]> = mesh
            .edges()
            .iter()
            .map(|edge| mesh.segment_points(edge))
            .collect();
        let bounds: Vec<Aabb> = segments.iter().map(|s| Aabb::from_points(s)).collect();
        let mut order: Vec<u32> = (0..segments.len() as u32).collect();
        let root = BvhNode::build(&bounds, &mut order);
        Self { root, segments }
    }

    /// Whether the underlying mesh had no edges.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The k nearest edges to `point`, ordered by `(distance, id)`.
    pub fn nearest(&self, point: &Point3<f64>, k: usize) -> Vec<Match> {
        nearest_in_bvh(self.root.as_ref(), point, k, |index| {
            point_segment_distance_squared(point, &self.segments[index as usize])
        })
    }
}

/// Bounding-box tree over mesh triangles.
pub struct TriangleTree {
    root: Option<BvhNode>,
    corners: Vec<[Point3<f64>; 3]>,
}

impl TriangleTree {
    fn build(mesh: &Mesh) -> Self {
        let corners: Vec<[Point3<f64>; 3]> = mesh
            .triangles()
            .iter()
            .map(|triangle| mesh.triangle_points(triangle))
            .collect();
        let bounds: Vec<Aabb> = corners.iter().map(|c| Aabb::from_points(c)).collect();
        let mut order: Vec<u32> = (0..corners.len() as u32).collect();
        let root = BvhNode::build(&bounds, &mut order);
        Self { root, corners }
    }

    /// Whether the underlying mesh had no triangles.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.corners.is_empty()
    }

    /// The k nearest triangles to `point`, ordered by `(distance, id)`.
    pub fn nearest(&self, point: &Point3<f64>, k: usize) -> Vec<Match> {
        nearest_in_bvh(self.root.as_ref(), point, k, |index| {
            let [a, b, c] = self.corners[index as usize];
            let closest = closest_point_on_triangle(point, a, b, c);
            (closest - point).norm_squared()
        })
    }
}

fn point_segment_distance_squared(p: &Point3<f64>, segment: &[Point3<f64>; 2]) -> f64 {
    let [a, b] = *segment;
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 <= f64::EPSILON {
        return (p - a).norm_squared();
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    let closest = a + ab * t;
    (p - closest).norm_squared()
}

/// Closest point on triangle `abc` to `p`, via Voronoi region tests.
fn closest_point_on_triangle(
    p: &Point3<f64>,
    a: Point3<f64>,
    b: Point3<f64>,
    c: Point3<f64>,
) -> Point3<f64> {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let sum = va + vb + vc;
    if sum.abs() <= f64::EPSILON {
        // Degenerate triangle: fall back to the nearest boundary segment.
        let candidates = [
            [a, b],
            [a, c],
            [b, c],
        ];
        let mut closest = a;
        let mut min_d2 = f64::INFINITY;
        for segment in &candidates {
            let [s0, s1] = *segment;
            let dir = s1 - s0;
            let len2 = dir.norm_squared();
            let q = if len2 <= f64::EPSILON {
                s0
            } else {
                let t = ((p - s0).dot(&dir) / len2).clamp(0.0, 1.0);
                s0 + dir * t
            };
            let d2 = (p - q).norm_squared();
            if d2 < min_d2 {
                min_d2 = d2;
                closest = q;
            }
        }
        return closest;
    }

    let denom = 1.0 / sum;
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

// ============================================================================
// Process-wide index cache
// ============================================================================

struct CacheEntry<T> {
    version: u64,
    tree: Arc<T>,
}

/// Keyed store of built indices with version-counter invalidation.
///
/// Entries are keyed by [`MeshId`] and remember the mesh version they were
/// built at; a lookup against a mutated mesh transparently rebuilds. The
/// process-wide instance behind [`vertex_tree`], [`edge_tree`] and
/// [`triangle_tree`] can be torn down with [`clear`] or per mesh with
/// [`invalidate`]. Tests may also construct private caches.
#[derive(Default)]
pub struct IndexCache {
    vertices: HashMap<MeshId, CacheEntry<VertexTree>>,
    edges: HashMap<MeshId, CacheEntry<EdgeTree>>,
    triangles: HashMap<MeshId, CacheEntry<TriangleTree>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached vertex tree for `mesh`, rebuilt if the mesh has mutated.
    pub fn vertex_tree(&mut self, mesh: &Mesh) -> Arc<VertexTree> {
        if let Some(entry) = self.vertices.get(&mesh.id()) {
            if entry.version == mesh.version() {
                return Arc::clone(&entry.tree);
            }
        }
        debug!(mesh = mesh.name(), kind = "vertex", "building spatial index");
        let tree = Arc::new(VertexTree::build(mesh));
        self.vertices.insert(
            mesh.id(),
            CacheEntry {
                version: mesh.version(),
                tree: Arc::clone(&tree),
            },
        );
        tree
    }

    /// Cached edge tree for `mesh`, rebuilt if the mesh has mutated.
    pub fn edge_tree(&mut self, mesh: &Mesh) -> Arc<EdgeTree> {
        if let Some(entry) = self.edges.get(&mesh.id()) {
            if entry.version == mesh.version() {
                return Arc::clone(&entry.tree);
            }
        }
        debug!(mesh = mesh.name(), kind = "edge", "building spatial index");
        let tree = Arc::new(EdgeTree::build(mesh));
        self.edges.insert(
            mesh.id(),
            CacheEntry {
                version: mesh.version(),
                tree: Arc::clone(&tree),
            },
        );
        tree
    }

    /// Cached triangle tree for `mesh`, rebuilt if the mesh has mutated.
    pub fn triangle_tree(&mut self, mesh: &Mesh) -> Arc<TriangleTree> {
        if let Some(entry) = self.triangles.get(&mesh.id()) {
            if entry.version == mesh.version() {
                return Arc::clone(&entry.tree);
            }
        }
        debug!(
            mesh = mesh.name(),
            kind = "triangle",
            "building spatial index"
        );
        let tree = Arc::new(TriangleTree::build(mesh));
        self.triangles.insert(
            mesh.id(),
            CacheEntry {
                version: mesh.version(),
                tree: Arc::clone(&tree),
            },
        );
        tree
    }

    /// Drop all cached indices for one mesh.
    pub fn invalidate(&mut self, id: MeshId) {
        self.vertices.remove(&id);
        self.edges.remove(&id);
        self.triangles.remove(&id);
    }

    /// Drop every cached index.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.edges.clear();
        self.triangles.clear();
    }
}

static CACHE: Lazy<Mutex<IndexCache>> = Lazy::new(|| Mutex::new(IndexCache::new()));

fn cache() -> std::sync::MutexGuard<'static, IndexCache> {
    CACHE.lock().expect("spatial index cache poisoned")
}

/// Vertex tree for `mesh` from the process-wide cache.
pub fn vertex_tree(mesh: &Mesh) -> Arc<VertexTree> {
    cache().vertex_tree(mesh)
}

/// Edge tree for `mesh` from the process-wide cache.
pub fn edge_tree(mesh: &Mesh) -> Arc<EdgeTree> {
    cache().edge_tree(mesh)
}

/// Triangle tree for `mesh` from the process-wide cache.
pub fn triangle_tree(mesh: &Mesh) -> Arc<TriangleTree> {
    cache().triangle_tree(mesh)
}

/// Drop the process-wide cache entries for one mesh. Call when a mesh is
/// dropped or about to be bulk-mutated.
pub fn invalidate(id: MeshId) {
    cache().invalidate(id);
}

/// Tear down the process-wide index cache.
pub fn clear() {
    cache().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    fn unit_triangle_mesh() -> Mesh {
        let mut mesh = Mesh::new("unit", 3).unwrap();
        mesh.add_vertex(Point3::new(0.0, 0.0, 0.0)).unwrap();
        mesh.add_vertex(Point3::new(1.0, 0.0, 0.0)).unwrap();
        mesh.add_vertex(Point3::new(0.0, 1.0, 0.0)).unwrap();
        mesh.add_edge(0, 1).unwrap();
        mesh.add_edge(1, 2).unwrap();
        mesh.add_edge(2, 0).unwrap();
        mesh.add_triangle(0, 1, 2).unwrap();
        mesh
    }

    #[test]
    fn test_vertex_tree_nearest() {
        let mesh = unit_triangle_mesh();
        let tree = VertexTree::build(&mesh);
        let matches = tree.nearest(&Point3::new(0.9, 0.05, 0.0), 1);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].index, 1);
    }

    #[test]
    fn test_vertex_tree_orders_by_distance_then_id() {
        let mut mesh = Mesh::new("grid", 2).unwrap();
        // Two vertices equidistant from the query point.
        mesh.add_vertex(Point3::new(-1.0, 0.0, 0.0)).unwrap();
        mesh.add_vertex(Point3::new(1.0, 0.0, 0.0)).unwrap();
        let tree = VertexTree::build(&mesh);
        let matches = tree.nearest(&Point3::new(0.0, 0.0, 0.0), 2);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].index, 0);
        assert_eq!(matches[1].index, 1);
    }

    #[test]
    fn test_empty_trees_return_no_matches() {
        let mesh = Mesh::new("empty", 3).unwrap();
        let point = Point3::new(0.0, 0.0, 0.0);
        assert!(VertexTree::build(&mesh).nearest(&point, 4).is_empty());
        assert!(EdgeTree::build(&mesh).nearest(&point, 4).is_empty());
        assert!(TriangleTree::build(&mesh).nearest(&point, 4).is_empty());
    }

    #[test]
    fn test_edge_tree_exact_distance() {
        let mesh = unit_triangle_mesh();
        let tree = EdgeTree::build(&mesh);
        // Above the midpoint of the bottom edge.
        let matches = tree.nearest(&Point3::new(0.5, -1.0, 0.0), 3);
        assert_eq!(matches[0].index, 0);
        assert!(approx_eq(matches[0].distance, 1.0));
    }

    #[test]
    fn test_triangle_tree_exact_distance() {
        let mut mesh = Mesh::new("two", 3).unwrap();
        mesh.add_vertex(Point3::new(0.0, 0.0, 0.0)).unwrap();
        mesh.add_vertex(Point3::new(1.0, 0.0, 0.0)).unwrap();
        mesh.add_vertex(Point3::new(0.0, 1.0, 0.0)).unwrap();
        mesh.add_vertex(Point3::new(0.0, 0.0, 2.0)).unwrap();
        mesh.add_vertex(Point3::new(1.0, 0.0, 2.0)).unwrap();
        mesh.add_vertex(Point3::new(0.0, 1.0, 2.0)).unwrap();
        mesh.add_triangle(0, 1, 2).unwrap();
        mesh.add_triangle(3, 4, 5).unwrap();

        let tree = TriangleTree::build(&mesh);
        let matches = tree.nearest(&Point3::new(0.25, 0.25, 0.5), 2);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].index, 0);
        assert!(approx_eq(matches[0].distance, 0.5));
        assert!(approx_eq(matches[1].distance, 1.5));
    }

    #[test]
    fn test_bvh_nearest_more_than_available() {
        let mesh = unit_triangle_mesh();
        let tree = EdgeTree::build(&mesh);
        let matches = tree.nearest(&Point3::new(0.0, 0.0, 0.0), 10);
        assert_eq!(matches.len(), 3);
    }

    #[test]
    fn test_closest_point_on_triangle_regions() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(0.0, 1.0, 0.0);

        // Interior projection.
        let q = closest_point_on_triangle(&Point3::new(0.25, 0.25, 1.0), a, b, c);
        assert!(approx_eq(q.x, 0.25) && approx_eq(q.y, 0.25) && approx_eq(q.z, 0.0));

        // Vertex region.
        let q = closest_point_on_triangle(&Point3::new(-1.0, -1.0, 0.0), a, b, c);
        assert!(approx_eq(q.x, 0.0) && approx_eq(q.y, 0.0));

        // Edge region.
        let q = closest_point_on_triangle(&Point3::new(0.5, -1.0, 0.0), a, b, c);
        assert!(approx_eq(q.x, 0.5) && approx_eq(q.y, 0.0));
    }

    #[test]
    fn test_cache_reuses_and_invalidates() {
        let mut mesh = unit_triangle_mesh();
        let mut cache = IndexCache::new();

        let first = cache.vertex_tree(&mesh);
        let again = cache.vertex_tree(&mesh);
        assert!(Arc::ptr_eq(&first, &again));

        mesh.add_vertex(Point3::new(5.0, 5.0, 5.0)).unwrap();
        let rebuilt = cache.vertex_tree(&mesh);
        assert!(!Arc::ptr_eq(&first, &rebuilt));

        let matches = rebuilt.nearest(&Point3::new(5.0, 5.0, 5.0), 1);
        assert_eq!(matches[0].index, 3);
    }

    #[test]
    fn test_cache_invalidate_drops_entries() {
        let mesh = unit_triangle_mesh();
        let mut cache = IndexCache::new();
        let first = cache.edge_tree(&mesh);
        cache.invalidate(mesh.id());
        let rebuilt = cache.edge_tree(&mesh);
        assert!(!Arc::ptr_eq(&first, &rebuilt));
    }
}
