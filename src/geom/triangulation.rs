use super::{Point3, Tolerance, Vec3};

/// Triangles over the corners of one polygon, as local corner indices.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PolygonTriangulation {
    pub triangles: Vec<[u32; 3]>,
    /// Ear clipping gave up and a fan was emitted instead.
    pub fan_fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TriangulationError {
    #[error("polygon needs at least 3 corners, found {0}")]
    TooFewCorners(usize),
    #[error("polygon has zero area")]
    ZeroArea,
    #[error("polygon corners must be finite")]
    NonFinite,
}

/// Newell normal of a closed polygon. Its length is twice the polygon area
/// and it points along the side the corner order winds counter-clockwise
/// around.
#[must_use]
pub fn polygon_normal(points: &[Point3]) -> Vec3 {
    let mut n = Vec3::ZERO;
    for (i, a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        n.x += (a.y - b.y) * (a.z + b.z);
        n.y += (a.z - b.z) * (a.x + b.x);
        n.z += (a.x - b.x) * (a.y + b.y);
    }
    n
}

/// Triangulate one planar (or nearly planar) polygon.
///
/// Convex polygons are fanned from corner 0. Everything else is projected onto
/// the plane of its Newell normal and ear-clipped; the resulting triangles keep
/// the polygon's winding.
pub fn triangulate_polygon(
    points: &[Point3],
    convex: bool,
) -> Result<PolygonTriangulation, TriangulationError> {
    if points.len() < 3 {
        return Err(TriangulationError::TooFewCorners(points.len()));
    }
    if points.iter().any(|p| !p.is_finite()) {
        return Err(TriangulationError::NonFinite);
    }

    let normal = polygon_normal(points);
    let extent = polygon_extent(points);
    let area_tol = Tolerance::new(Tolerance::ZERO_LENGTH.eps * extent.max(1.0));
    if area_tol.is_zero_vec3(normal) {
        return Err(TriangulationError::ZeroArea);
    }

    if convex || points.len() == 3 {
        return Ok(PolygonTriangulation {
            triangles: fan(points.len()),
            fan_fallback: false,
        });
    }

    let Some(n) = normal.normalized() else {
        return Err(TriangulationError::ZeroArea);
    };
    let (u, v) = plane_basis(n);
    let origin = points[0];
    let projected: Vec<Uv> = points
        .iter()
        .map(|p| {
            let d = p.sub_point(origin);
            Uv { u: d.dot(u), v: d.dot(v) }
        })
        .collect();

    let tol = Tolerance::new(extent.max(f64::MIN_POSITIVE) * 1e-10);
    let mut nodes = Vec::with_capacity(projected.len());
    let start = build_ring_nodes(&mut nodes, &projected);
    match earclip_polygon(start, &mut nodes, tol) {
        Some(triangles) if !triangles.is_empty() => Ok(PolygonTriangulation {
            triangles,
            fan_fallback: false,
        }),
        _ => Ok(PolygonTriangulation {
            triangles: fan(points.len()),
            fan_fallback: true,
        }),
    }
}

fn fan(corner_count: usize) -> Vec<[u32; 3]> {
    let count = u32::try_from(corner_count).unwrap_or(u32::MAX);
    (1..count.saturating_sub(1)).map(|i| [0, i, i + 1]).collect()
}

fn polygon_extent(points: &[Point3]) -> f64 {
    super::BBox::from_points(points.iter().copied())
        .map(|b| {
            let s = b.size();
            s.x.max(s.y).max(s.z)
        })
        .unwrap_or(0.0)
}

/// Orthonormal `(u, v)` spanning the plane with normal `n`, with `u × v == n`
/// so counter-clockwise order around `n` stays counter-clockwise in `(u, v)`.
fn plane_basis(n: Vec3) -> (Vec3, Vec3) {
    let seed = if n.x.abs() < 0.9 { Vec3::X } else { Vec3::Y };
    let v = n.cross(seed).normalized().unwrap_or(Vec3::Y);
    let u = v.cross(n);
    (u, v)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Uv {
    u: f64,
    v: f64,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    idx: u32,
    point: Uv,
    prev: usize,
    next: usize,
}

fn build_ring_nodes(nodes: &mut Vec<Node>, points: &[Uv]) -> usize {
    let start_idx = nodes.len();
    let len = points.len();
    for (i, &point) in points.iter().enumerate() {
        nodes.push(Node {
            idx: u32::try_from(i).unwrap_or(u32::MAX),
            point,
            prev: start_idx + (i + len - 1) % len,
            next: start_idx + (i + 1) % len,
        });
    }
    start_idx
}

fn ring_len(start: usize, nodes: &[Node]) -> usize {
    let mut count = 0usize;
    let mut cur = start;
    loop {
        count += 1;
        cur = nodes[cur].next;
        if cur == start || count > nodes.len().saturating_add(1) {
            break;
        }
    }
    count
}

/// Drops coincident and collinear corners; `None` once fewer than 3 remain.
fn filter_ring_points(start: usize, nodes: &mut [Node], tol: Tolerance) -> Option<usize> {
    if ring_len(start, nodes) < 3 {
        return None;
    }

    let mut start = start;
    let mut cur = start;
    let mut guard = 0usize;

    loop {
        guard += 1;
        if guard > nodes.len().saturating_mul(4).max(16) {
            break;
        }

        let prev = nodes[cur].prev;
        let next = nodes[cur].next;
        if cur == next || cur == prev || prev == next {
            break;
        }

        let p = nodes[prev].point;
        let c = nodes[cur].point;
        let n = nodes[next].point;

        let dup = approx_eq_uv(p, c, tol) || approx_eq_uv(c, n, tol);
        let collinear = distance_point_to_line_2d(p, c, n) <= tol.eps;

        if dup || collinear {
            if cur == start {
                start = next;
            }
            remove_node(cur, nodes);
            cur = prev;
            if ring_len(start, nodes) < 3 {
                return None;
            }
        } else {
            cur = next;
        }

        if cur == start {
            break;
        }
    }

    Some(start)
}

fn earclip_polygon(start: usize, nodes: &mut [Node], tol: Tolerance) -> Option<Vec<[u32; 3]>> {
    let mut start = filter_ring_points(start, nodes, tol)?;

    let is_ccw = signed_area_ring(start, nodes) > 0.0;
    let mut remaining = ring_len(start, nodes);
    let mut ear = start;
    let mut stop = start;
    let mut triangles = Vec::with_capacity(remaining.saturating_sub(2));
    let mut passes_without_clip = 0usize;

    while remaining > 2 {
        let prev = nodes[ear].prev;
        let next = nodes[ear].next;
        if is_ear(prev, ear, next, nodes, is_ccw, tol) {
            if is_ccw {
                triangles.push([nodes[prev].idx, nodes[ear].idx, nodes[next].idx]);
            } else {
                triangles.push([nodes[prev].idx, nodes[next].idx, nodes[ear].idx]);
            }

            if ear == start {
                start = next;
            }
            remove_node(ear, nodes);
            remaining -= 1;
            ear = next;
            stop = next;
            passes_without_clip = 0;
            continue;
        }

        ear = next;
        if ear == stop {
            passes_without_clip += 1;
            if passes_without_clip > 2 {
                return None;
            }
            start = filter_ring_points(start, nodes, tol)?;
            remaining = ring_len(start, nodes);
            ear = start;
            stop = start;
        }
    }

    Some(triangles)
}

fn is_ear(prev: usize, ear: usize, next: usize, nodes: &[Node], is_ccw: bool, tol: Tolerance) -> bool {
    let a = nodes[prev].point;
    let b = nodes[ear].point;
    let c = nodes[next].point;

    if distance_point_to_line_2d(a, b, c) <= tol.eps {
        return false;
    }

    let cross = orient2d(a, b, c);
    if is_ccw {
        if cross <= 0.0 {
            return false;
        }
    } else if cross >= 0.0 {
        return false;
    }

    let mut p = nodes[next].next;
    let mut guard = 0usize;
    while p != prev {
        guard += 1;
        if guard > nodes.len().saturating_add(1) {
            break;
        }
        let pt = nodes[p].point;
        if point_in_triangle(a, b, c, pt, is_ccw, tol) {
            let cross_p = orient2d(nodes[nodes[p].prev].point, pt, nodes[nodes[p].next].point);
            let is_reflex = if is_ccw {
                cross_p <= tol.eps
            } else {
                cross_p >= -tol.eps
            };
            if is_reflex {
                return false;
            }
        }
        p = nodes[p].next;
    }

    true
}

fn signed_area_ring(start: usize, nodes: &[Node]) -> f64 {
    let mut area = 0.0;
    let mut p = start;
    loop {
        let q = nodes[p].next;
        let a = nodes[p].point;
        let b = nodes[q].point;
        area += a.u * b.v - b.u * a.v;
        p = q;
        if p == start {
            break;
        }
    }
    0.5 * area
}

fn remove_node(node: usize, nodes: &mut [Node]) {
    let prev = nodes[node].prev;
    let next = nodes[node].next;
    nodes[prev].next = next;
    nodes[next].prev = prev;
}

fn approx_eq_uv(a: Uv, b: Uv, tol: Tolerance) -> bool {
    (a.u - b.u).abs() <= tol.eps && (a.v - b.v).abs() <= tol.eps
}

fn orient2d(a: Uv, b: Uv, c: Uv) -> f64 {
    (b.u - a.u) * (c.v - a.v) - (b.v - a.v) * (c.u - a.u)
}

fn point_in_triangle(a: Uv, b: Uv, c: Uv, p: Uv, is_ccw: bool, tol: Tolerance) -> bool {
    let ab = orient2d(a, b, p);
    let bc = orient2d(b, c, p);
    let ca = orient2d(c, a, p);

    if is_ccw {
        ab >= -tol.eps && bc >= -tol.eps && ca >= -tol.eps
    } else {
        ab <= tol.eps && bc <= tol.eps && ca <= tol.eps
    }
}

fn distance_point_to_line_2d(a: Uv, p: Uv, b: Uv) -> f64 {
    let du = b.u - a.u;
    let dv = b.v - a.v;
    let len = (du * du + dv * dv).sqrt();
    if len <= f64::EPSILON {
        return ((p.u - a.u).powi(2) + (p.v - a.v).powi(2)).sqrt();
    }
    orient2d(a, b, p).abs() / len
}
