//! Spine-aligned coordinate frames for extrusions.
//!
//! Frames are recomputed from scratch on every build and returned by value;
//! nothing here holds state between calls.

use super::extrusion::ExtrusionError;
use super::{Point3, Transform, Vec3, wrap_angle};

/// Orthonormal basis at one spine point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpineFrame {
    pub origin: Point3,
    pub x: Vec3,
    /// Spine tangent.
    pub y: Vec3,
    pub z: Vec3,
    /// Twist correction about local Y, in `(-PI, PI]`.
    pub twist: f64,
}

impl SpineFrame {
    /// `translate(origin) * axes * rotate_y(twist)`.
    #[must_use]
    pub fn basis(&self) -> Transform {
        Transform::translate(self.origin.to_vec3()) * self.rotation()
    }

    /// Rotation part of [`basis`](Self::basis).
    #[must_use]
    pub fn rotation(&self) -> Transform {
        Transform::from_axes(Point3::ORIGIN, self.x, self.y, self.z) * Transform::rotate_y(self.twist)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpineFrames {
    pub frames: Vec<SpineFrame>,
    /// Frames whose `z` axis was copied from a neighbour.
    pub inherited_count: usize,
}

/// First and last points coincide. `tolerance` of 0 means exact equality.
#[must_use]
pub fn is_closed(points: &[Point3], tolerance: f64) -> bool {
    match (points.first(), points.last()) {
        (Some(&first), Some(&last)) if points.len() > 1 => {
            if tolerance > 0.0 {
                first.distance_to(last) <= tolerance
            } else {
                first == last
            }
        }
        _ => false,
    }
}

/// Every pair of consecutive segments has an exactly zero cross product.
#[must_use]
pub fn is_collinear(points: &[Point3]) -> bool {
    let sum: f64 = points
        .windows(3)
        .map(|w| (w[2] - w[1]).cross(w[1] - w[0]).length_squared())
        .sum();
    sum == 0.0
}

/// Computes one frame per spine point.
///
/// A straight spine gets a single constant frame; a straight closed spine
/// describes a solid of revolution and is rejected.
pub fn compute_spine_frames(
    points: &[Point3],
    closed: bool,
    collinear: bool,
) -> Result<SpineFrames, ExtrusionError> {
    if points.len() < 2 {
        return Err(ExtrusionError::SpineTooShort(points.len()));
    }
    if collinear {
        if closed {
            return Err(ExtrusionError::SolidOfRevolution);
        }
        return Ok(straight_frames(points));
    }
    Ok(bent_frames(points, closed))
}

fn straight_frames(points: &[Point3]) -> SpineFrames {
    let start = points[0];
    let y = points
        .iter()
        .rev()
        .find_map(|&p| (p - start).normalized())
        .unwrap_or(Vec3::Y);
    let (x, z) = complete_basis(y);

    SpineFrames {
        frames: points
            .iter()
            .map(|&origin| SpineFrame { origin, x, y, z, twist: 0.0 })
            .collect(),
        inherited_count: 0,
    }
}

/// `x` and `z` around a lone `y`, seeded with `+X` (or `∓Y` when `y` lies
/// close to the X axis).
fn complete_basis(y: Vec3) -> (Vec3, Vec3) {
    let seed = if y.x.abs() > 0.9 {
        Vec3::new(0.0, -y.x.signum(), 0.0)
    } else {
        Vec3::X
    };
    let z = seed.cross(y).normalized().unwrap_or(Vec3::Z);
    let x = y.cross(z).normalized().unwrap_or(Vec3::X);
    (x, z)
}

fn bent_frames(points: &[Point3], closed: bool) -> SpineFrames {
    let n = points.len();
    let last = n - 1;

    let ys: Vec<Vec3> = (0..n).map(|i| tangent(points, i, closed)).collect();

    let mut raw: Vec<Option<Vec3>> = vec![None; n];
    for i in 1..last {
        raw[i] = bend_normal(points[i - 1], points[i], points[i + 1]);
    }
    if closed {
        let z = bend_normal(points[n - 2], points[0], points[1]);
        raw[0] = z;
        raw[last] = z;
    } else {
        raw[0] = raw.get(1).copied().flatten();
        raw[last] = raw[last - 1];
    }

    let first_valid = raw.iter().flatten().next().copied().unwrap_or(Vec3::Z);
    let mut inherited_count = 0;
    let mut previous: Option<Vec3> = None;
    let mut frames = Vec::with_capacity(n);

    for (i, &y) in ys.iter().enumerate() {
        let mut z = if let Some(z) = raw[i] {
            z
        } else {
            inherited_count += 1;
            previous.unwrap_or(first_valid)
        };
        if previous.is_some_and(|p| z.dot(p) < 0.0) {
            z = -z;
        }
        previous = Some(z);

        let (x, z) = match y.cross(z).normalized() {
            Some(x) => (x, x.cross(y)),
            None => complete_basis(y),
        };
        frames.push(SpineFrame { origin: points[i], x, y, z, twist: 0.0 });
    }

    SpineFrames { frames, inherited_count }
}

fn bend_normal(prev: Point3, at: Point3, next: Point3) -> Option<Vec3> {
    (prev - at).cross(next - at).normalized()
}

fn tangent(points: &[Point3], i: usize, closed: bool) -> Vec3 {
    let n = points.len();
    let last = n - 1;
    let diff = |a: usize, b: usize| (points[a] - points[b]).normalized();

    if i == 0 || i == last {
        if closed {
            if let Some(y) = diff(1, n - 2) {
                return y;
            }
        }
        let end = if i == 0 { diff(1, 0) } else { diff(last, last - 1) };
        return end.or_else(|| nearest_distinct(points, i)).unwrap_or(Vec3::Z);
    }

    diff(i + 1, i - 1)
        .or_else(|| diff(i + 1, i))
        .or_else(|| diff(i, i - 1))
        .or_else(|| nearest_distinct(points, i))
        .unwrap_or(Vec3::Y)
}

/// Direction along the spine toward the closest point that differs from
/// `points[i]`.
fn nearest_distinct(points: &[Point3], i: usize) -> Option<Vec3> {
    let at = points[i];
    (1..points.len()).find_map(|d| {
        let ahead = points.get(i + d).and_then(|&p| (p - at).normalized());
        let behind = i
            .checked_sub(d)
            .and_then(|j| (at - points[j]).normalized());
        ahead.or(behind)
    })
}

/// Accumulates a rotation about local Y so a cross-section point moves as
/// little as possible between consecutive frames.
///
/// For each frame the `z` angle to its predecessor is tried in both
/// directions; the candidate that lands `test_point` closer to where the
/// previous frame put it wins.
pub fn correct_twist(frames: &mut [SpineFrame], test_point: Point3) {
    let mut theta = 0.0;
    for i in 1..frames.len() {
        let angle = frames[i].z.angle_to(frames[i - 1].z);
        if angle != 0.0 {
            let previous = frames[i - 1].rotation().apply_point(test_point);
            let landing = |t: f64| {
                let candidate = SpineFrame { twist: t, ..frames[i] };
                candidate.rotation().apply_point(test_point).distance_to(previous)
            };
            let negative = theta - angle;
            let positive = theta + angle;
            theta = if landing(positive) > landing(negative) {
                negative
            } else {
                positive
            };
            theta = wrap_angle(theta);
        }
        frames[i].twist = theta;
    }
}

/// First point off the local Y axis, else the first point.
#[must_use]
pub fn twist_test_point(cross_section: &[Point3]) -> Option<Point3> {
    cross_section
        .iter()
        .find(|p| p.x != 0.0 || p.z != 0.0)
        .or_else(|| cross_section.first())
        .copied()
}
