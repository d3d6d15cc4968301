//! Extrusion of a cross-section along a spine.
//!
//! Every spine point gets a frame from [`compute_spine_frames`]; the
//! cross-section is scaled, rotated by the per-point orientation, placed in
//! that frame and emitted as one ring of vertices. Rings are joined by side
//! quads, optionally closed by caps, and the resulting polygon list goes
//! through the [`IndexedMeshTessellator`] so crease angle and convexity are
//! handled the same way as for indexed face sets.

use serde::Deserialize;

use super::data::{AttributeArray, ChangeFlags, GeometryData, GeometryType};
use super::diagnostics::BuildDiagnostics;
use super::metrics::{GeomMetrics, TimingBucket};
use super::spine::{
    SpineFrame, compute_spine_frames, correct_twist, is_closed, is_collinear, twist_test_point,
};
use super::tessellation::{IndexedFaceSet, IndexedMeshTessellator, TessellationError};
use super::{BBox, Point3, Transform, Vec3};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ExtrusionError {
    #[error("closed straight spine describes a solid of revolution")]
    SolidOfRevolution,
    #[error("spine needs at least 2 points, got {0}")]
    SpineTooShort(usize),
    #[error(transparent)]
    Tessellation(#[from] TessellationError),
}

/// Raw fields of an extrusion.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Extrusion {
    /// Flat xz pairs.
    pub cross_section: Vec<f32>,
    /// Flat xyz triples.
    pub spine: Vec<f32>,
    /// Flat (x, z) scale pairs, one per spine point; the last one repeats.
    pub scale: Vec<f32>,
    /// Flat axis-angle quads, one per spine point; the last one repeats.
    pub orientation: Vec<f32>,
    pub begin_cap: bool,
    pub end_cap: bool,
    pub ccw: bool,
    pub convex: bool,
    pub crease_angle: f32,
    /// Distance under which the spine ends count as joined. 0 compares
    /// exactly.
    pub closed_tolerance: f32,
}

impl Default for Extrusion {
    fn default() -> Self {
        Self {
            cross_section: vec![1.0, 1.0, 1.0, -1.0, -1.0, -1.0, -1.0, 1.0, 1.0, 1.0],
            spine: vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            scale: vec![1.0, 1.0],
            orientation: vec![0.0, 0.0, 1.0, 0.0],
            begin_cap: true,
            end_cap: true,
            ccw: true,
            convex: true,
            crease_angle: 0.0,
            closed_tolerance: 0.0,
        }
    }
}

impl Extrusion {
    /// Cross-section points in the local XZ plane.
    #[must_use]
    pub fn cross_section_points(&self) -> Vec<Point3> {
        self.cross_section
            .chunks_exact(2)
            .map(|c| Point3::new(f64::from(c[0]), 0.0, f64::from(c[1])))
            .collect()
    }

    #[must_use]
    pub fn spine_points(&self) -> Vec<Point3> {
        self.spine
            .chunks_exact(3)
            .map(|c| Point3::from_f32([c[0], c[1], c[2]]))
            .collect()
    }

    /// Scale at spine point `i`, holding the last value.
    #[must_use]
    pub fn scale_at(&self, i: usize) -> (f64, f64) {
        let pairs = self.scale.len() / 2;
        if pairs == 0 {
            return (1.0, 1.0);
        }
        let k = i.min(pairs - 1) * 2;
        (f64::from(self.scale[k]), f64::from(self.scale[k + 1]))
    }

    /// Orientation at spine point `i`, holding the last value. A zero axis
    /// is the identity.
    #[must_use]
    pub fn orientation_at(&self, i: usize) -> Transform {
        let quads = self.orientation.len() / 4;
        if quads == 0 {
            return Transform::identity();
        }
        let k = i.min(quads - 1) * 4;
        let o = &self.orientation[k..k + 4];
        let axis = Vec3::from_f32([o[0], o[1], o[2]]);
        Transform::rotate_axis(axis, f64::from(o[3])).unwrap_or_default()
    }
}

/// Shape of the last extrusion build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtrusionLayout {
    pub spine_count: usize,
    /// Unique cross-section points per ring.
    pub ring_vertex_count: usize,
    pub side_polygon_count: usize,
    pub cap_polygon_count: usize,
    pub cross_section_closed: bool,
    pub spine_closed: bool,
}

impl ExtrusionLayout {
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.spine_count * self.ring_vertex_count
    }
}

/// Extrusion polygons in indexed-face-set form.
struct SweptPolygons {
    faces: IndexedFaceSet,
    layout: ExtrusionLayout,
    frames: Vec<SpineFrame>,
    inherited_count: usize,
}

/// Builds extrusions and keeps the tessellator map for in-place updates.
#[derive(Debug, Default)]
pub struct ExtrusionGenerator {
    tessellator: IndexedMeshTessellator,
    frames: Vec<SpineFrame>,
    layout: Option<ExtrusionLayout>,
    settings: Option<(bool, bool, bool, bool)>,
}

impl ExtrusionGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate(
        &mut self,
        extrusion: &Extrusion,
    ) -> Result<(GeometryData, BuildDiagnostics), ExtrusionError> {
        self.layout = None;
        self.frames.clear();

        let mut metrics = GeomMetrics::default();
        metrics.begin();

        let Some(swept) = metrics.time(TimingBucket::Extrusion, || sweep(extrusion))? else {
            self.tessellator.release_scratch();
            log::debug!("extrusion cross-section has fewer than 2 distinct points");
            return Ok((GeometryData::empty(GeometryType::Triangles), BuildDiagnostics::new()));
        };

        let (data, mut diagnostics) = self.tessellator.generate(&swept.faces)?;
        diagnostics.inherited_frame_count = swept.inherited_count;
        diagnostics.polygon_count = swept.layout.side_polygon_count + swept.layout.cap_polygon_count;
        if let Some(timing) = metrics.end() {
            match &mut diagnostics.timing {
                Some(mine) => mine.accumulate(&timing),
                None => diagnostics.timing = Some(timing),
            }
        }
        log::debug!(
            "extrusion {} rings x {}: {}",
            swept.layout.spine_count,
            swept.layout.ring_vertex_count,
            diagnostics.summary()
        );

        self.layout = Some(swept.layout);
        self.frames = swept.frames;
        self.settings = Some(settings_of(extrusion));
        Ok((data, diagnostics))
    }

    /// Reshapes the last build in place when only scale, orientation or
    /// spine positions moved and the ring and polygon counts still match;
    /// rebuilds otherwise.
    pub fn update(
        &mut self,
        extrusion: &Extrusion,
        changes: ChangeFlags,
        data: &mut GeometryData,
    ) -> Result<BuildDiagnostics, ExtrusionError> {
        let reshape = changes == ChangeFlags::COORDS
            && self.tessellator.has_scratch()
            && self.settings == Some(settings_of(extrusion));
        if reshape {
            if let Some(swept) = sweep(extrusion)? {
                if Some(swept.layout) == self.layout {
                    let mut diagnostics =
                        self.tessellator.update(&swept.faces, ChangeFlags::COORDS, data)?;
                    diagnostics.inherited_frame_count = swept.inherited_count;
                    diagnostics.polygon_count =
                        swept.layout.side_polygon_count + swept.layout.cap_polygon_count;
                    self.frames = swept.frames;
                    return Ok(diagnostics);
                }
            }
        }

        let (rebuilt, diagnostics) = self.generate(extrusion)?;
        *data = rebuilt;
        Ok(diagnostics)
    }

    /// Frames of the last successful build.
    #[must_use]
    pub fn frames(&self) -> &[SpineFrame] {
        &self.frames
    }

    #[must_use]
    pub fn layout(&self) -> Option<ExtrusionLayout> {
        self.layout
    }

    pub fn release_scratch(&mut self) {
        self.tessellator.release_scratch();
    }

    #[must_use]
    pub fn has_scratch(&self) -> bool {
        self.tessellator.has_scratch()
    }
}

fn settings_of(extrusion: &Extrusion) -> (bool, bool, bool, bool) {
    (extrusion.begin_cap, extrusion.end_cap, extrusion.ccw, extrusion.convex)
}

/// Frames, rings and polygons; `None` when the cross-section cannot form a
/// ring.
fn sweep(extrusion: &Extrusion) -> Result<Option<SweptPolygons>, ExtrusionError> {
    let section = extrusion.cross_section_points();
    let cross_section_closed = section.len() > 2 && section.first() == section.last();
    let ring = if cross_section_closed {
        section.len() - 1
    } else {
        section.len()
    };
    if ring < 2 {
        return Ok(None);
    }

    let spine = extrusion.spine_points();
    let spine_closed = is_closed(&spine, f64::from(extrusion.closed_tolerance));
    let collinear = is_collinear(&spine);
    let computed = compute_spine_frames(&spine, spine_closed, collinear)?;
    let mut frames = computed.frames;
    if let Some(test_point) = twist_test_point(&section) {
        correct_twist(&mut frames, test_point);
    }

    let mut coord = Vec::with_capacity(frames.len() * ring * 3);
    for (i, frame) in frames.iter().enumerate() {
        let (sx, sz) = extrusion.scale_at(i);
        let transform = frame.basis() * extrusion.orientation_at(i) * Transform::scale(sx, 1.0, sz);
        for &p in &section[..ring] {
            coord.extend_from_slice(&transform.apply_point(p).to_f32());
        }
    }

    let mut polygons = PolygonWriter::new(extrusion.ccw);
    let rows = frames.len();
    let cols = section.len();
    let seam = |j: usize| if cross_section_closed && j == ring { 0 } else { j };
    let vertex = |i: usize, j: usize| i * ring + seam(j);
    let side_tex = |i: usize, j: usize| i * cols + j;

    for i in 0..rows - 1 {
        for j in 0..cols - 1 {
            polygons.push(&[
                (vertex(i, j + 1), side_tex(i, j + 1)),
                (vertex(i + 1, j + 1), side_tex(i + 1, j + 1)),
                (vertex(i + 1, j), side_tex(i + 1, j)),
                (vertex(i, j), side_tex(i, j)),
            ]);
        }
    }
    let side_polygon_count = (rows - 1) * (cols - 1);

    let cap_tex = rows * cols;
    let mut cap_polygon_count = 0;
    if extrusion.begin_cap {
        let mut corners: Vec<(usize, usize)> = (0..ring).map(|j| (vertex(0, j), cap_tex + j)).collect();
        corners[1..].reverse();
        polygons.push(&corners);
        cap_polygon_count += 1;
    }
    if extrusion.end_cap {
        let corners: Vec<(usize, usize)> = (0..ring)
            .map(|j| (vertex(rows - 1, j), cap_tex + j))
            .collect();
        polygons.push(&corners);
        cap_polygon_count += 1;
    }

    let mut tex = side_tex_coords(&section, &spine);
    tex.values.extend(cap_tex_coords(&section[..ring]).values);

    let (coord_index, tex_coord_index) = polygons.finish();
    let faces = IndexedFaceSet {
        coord,
        coord_index,
        tex_coords: vec![tex],
        tex_coord_index,
        ccw: true,
        convex: extrusion.convex,
        crease_angle: extrusion.crease_angle,
        ..IndexedFaceSet::default()
    };

    Ok(Some(SweptPolygons {
        faces,
        layout: ExtrusionLayout {
            spine_count: rows,
            ring_vertex_count: ring,
            side_polygon_count,
            cap_polygon_count,
            cross_section_closed,
            spine_closed,
        },
        frames,
        inherited_count: computed.inherited_count,
    }))
}

/// Accumulates `-1` terminated coordinate and texture index lists. Corners
/// are given counter-clockwise and reversed for clockwise extrusions.
struct PolygonWriter {
    ccw: bool,
    coord_index: Vec<i32>,
    tex_coord_index: Vec<i32>,
}

impl PolygonWriter {
    fn new(ccw: bool) -> Self {
        Self {
            ccw,
            coord_index: Vec::new(),
            tex_coord_index: Vec::new(),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn push(&mut self, corners: &[(usize, usize)]) {
        let mut emit = |&(v, t): &(usize, usize)| {
            self.coord_index.push(v as i32);
            self.tex_coord_index.push(t as i32);
        };
        if self.ccw {
            corners.iter().for_each(&mut emit);
        } else {
            corners.iter().rev().for_each(&mut emit);
        }
        self.coord_index.push(-1);
        self.tex_coord_index.push(-1);
    }

    fn finish(self) -> (Vec<i32>, Vec<i32>) {
        (self.coord_index, self.tex_coord_index)
    }
}

/// Cumulative length fractions; index fractions when the polyline has no
/// length.
#[allow(clippy::cast_precision_loss)]
fn length_fractions(points: &[Point3]) -> Vec<f64> {
    let mut acc = Vec::with_capacity(points.len());
    let mut total = 0.0;
    acc.push(0.0);
    for w in points.windows(2) {
        total += w[0].distance_to(w[1]);
        acc.push(total);
    }
    if total > 0.0 {
        acc.iter().map(|d| d / total).collect()
    } else {
        let last = points.len().saturating_sub(1).max(1) as f64;
        (0..points.len()).map(|i| i as f64 / last).collect()
    }
}

/// `s` runs along the cross-section, `t` along the spine; one pair per
/// (spine point, cross-section point) including the closing seam point.
#[allow(clippy::cast_possible_truncation)]
fn side_tex_coords(section: &[Point3], spine: &[Point3]) -> AttributeArray {
    let s = length_fractions(section);
    let t = length_fractions(spine);
    let mut out = AttributeArray::with_capacity(2, s.len() * t.len() + section.len());
    for &tv in &t {
        for &sv in &s {
            out.push(&[sv as f32, tv as f32]);
        }
    }
    out
}

/// Bounding-box mapping, the larger extent spanning `[0, 1]`.
#[allow(clippy::cast_possible_truncation)]
fn cap_tex_coords(ring: &[Point3]) -> AttributeArray {
    let mut out = AttributeArray::with_capacity(2, ring.len());
    let Some(bbox) = BBox::from_points(ring.iter().copied()) else {
        return out;
    };
    let size = bbox.size();
    let extent = size.x.max(size.z);
    for p in ring {
        let (s, t) = if extent > 0.0 {
            ((p.x - bbox.min.x) / extent, (p.z - bbox.min.z) / extent)
        } else {
            (0.0, 0.0)
        };
        out.push(&[s as f32, t as f32]);
    }
    out
}
