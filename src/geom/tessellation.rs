//! Indexed face set tessellation.
//!
//! `coordIndex` is a flat polygon list with `-1` closing each polygon. Every
//! polygon is triangulated on its own and the result is written out as an
//! unindexed, counter-clockwise `Triangles` buffer so per-corner normals,
//! colors and texture coordinates never need to share a vertex.
//!
//! The tessellator keeps the corner map of its last topology pass (output
//! vertex -> polygon corner -> `coordIndex` slot). Attribute-only changes are
//! applied by re-reading the inputs through that map.

use std::f64::consts::PI;

use serde::Deserialize;

use super::data::{
    AttributeArray, AttributeError, ChangeFlags, GeometryData, GeometryType, check_attribute_layout,
};
use super::diagnostics::BuildDiagnostics;
use super::metrics::{GeomMetrics, TimingBucket};
use super::triangulation::{polygon_normal, triangulate_polygon};
use super::{BBox, Point3, Tolerance, Vec3};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TessellationError {
    #[error(transparent)]
    Attribute(#[from] AttributeError),
}

/// Raw fields of an indexed face set.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IndexedFaceSet {
    /// Flat xyz triples.
    pub coord: Vec<f32>,
    pub coord_index: Vec<i32>,
    pub color: Option<AttributeArray>,
    pub color_index: Vec<i32>,
    /// Flat xyz triples; empty when no normal node is present.
    pub normal: Vec<f32>,
    pub normal_index: Vec<i32>,
    pub tex_coords: Vec<AttributeArray>,
    pub tex_coord_index: Vec<i32>,
    pub tex_set_map: Vec<usize>,
    pub ccw: bool,
    pub convex: bool,
    pub color_per_vertex: bool,
    pub normal_per_vertex: bool,
    /// Radians; clamped to `[0, PI]`.
    pub crease_angle: f32,
}

impl Default for IndexedFaceSet {
    fn default() -> Self {
        Self {
            coord: Vec::new(),
            coord_index: Vec::new(),
            color: None,
            color_index: Vec::new(),
            normal: Vec::new(),
            normal_index: Vec::new(),
            tex_coords: Vec::new(),
            tex_coord_index: Vec::new(),
            tex_set_map: Vec::new(),
            ccw: true,
            convex: true,
            color_per_vertex: true,
            normal_per_vertex: true,
            crease_angle: 0.0,
        }
    }
}

impl IndexedFaceSet {
    #[must_use]
    pub fn coord_count(&self) -> usize {
        self.coord.len() / 3
    }

    fn point(&self, index: usize) -> Option<Point3> {
        let s = self.coord.get(index * 3..index * 3 + 3)?;
        Some(Point3::from_f32([s[0], s[1], s[2]]))
    }

    /// Crease angle in `[0, PI]`; non-finite values read as 0.
    #[must_use]
    pub fn clamped_crease_angle(&self) -> f64 {
        let angle = f64::from(self.crease_angle);
        if angle.is_finite() { angle.clamp(0.0, PI) } else { 0.0 }
    }

    fn validate(&self) -> Result<(), TessellationError> {
        check_attribute_layout(self.color.as_ref(), &self.tex_coords, &self.tex_set_map)?;
        Ok(())
    }
}

/// Source of one output vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceCorner {
    /// Index into `coord`.
    pub coord: u32,
    /// Position in `coordIndex`.
    pub slot: u32,
    /// Ordinal of the source polygon in `coordIndex`.
    pub polygon: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FaceRecord {
    ordinal: u32,
    start: u32,
    len: u32,
}

/// Corner map retained from the last topology pass.
#[derive(Debug, Clone, Default, PartialEq)]
struct TopologyMap {
    /// Per polygon corner.
    corner_coords: Vec<u32>,
    corner_slots: Vec<u32>,
    corner_faces: Vec<u32>,
    faces: Vec<FaceRecord>,
    /// Output vertex -> polygon corner.
    triangles: Vec<u32>,
    max_coord: Option<u32>,
}

impl TopologyMap {
    fn fits(&self, input: &IndexedFaceSet) -> bool {
        self.max_coord
            .is_none_or(|max| (max as usize) < input.coord_count())
    }

    fn ordinal_of(&self, corner: u32) -> u32 {
        self.faces[self.corner_faces[corner as usize] as usize].ordinal
    }
}

/// Turns indexed face sets into flat triangle buffers, retaining the corner
/// map between calls.
#[derive(Debug, Default)]
pub struct IndexedMeshTessellator {
    map: Option<TopologyMap>,
}

/// One-shot tessellation without retained state.
pub fn tessellate(
    input: &IndexedFaceSet,
) -> Result<(GeometryData, BuildDiagnostics), TessellationError> {
    IndexedMeshTessellator::new().generate(input)
}

impl IndexedMeshTessellator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Full re-tessellation.
    pub fn generate(
        &mut self,
        input: &IndexedFaceSet,
    ) -> Result<(GeometryData, BuildDiagnostics), TessellationError> {
        input.validate()?;

        let mut metrics = GeomMetrics::default();
        metrics.begin();
        let mut diagnostics = BuildDiagnostics::new();

        let map = metrics.time(TimingBucket::Triangulation, || {
            build_topology(input, &mut diagnostics)
        });

        let mut data = GeometryData::empty(GeometryType::Triangles);
        data.vertex_count = map.triangles.len();
        metrics.time(TimingBucket::Tessellation, || {
            fill_coordinates(&map, input, &mut data);
            fill_colors(&map, input, &mut data, &mut diagnostics);
            fill_tex_coords(&map, input, &mut data, &mut diagnostics);
        });
        metrics.time(TimingBucket::Normals, || {
            fill_normals(&map, input, &mut data, &mut diagnostics);
        });

        diagnostics.vertex_count = data.vertex_count;
        diagnostics.triangle_count = data.vertex_count / 3;
        diagnostics.timing = metrics.end();
        log::debug!("indexed face set tessellated: {}", diagnostics.summary());

        self.map = Some(map);
        Ok((data, diagnostics))
    }

    /// Applies `changes` to `data`, re-tessellating only when connectivity or
    /// settings changed (or no corner map is retained).
    pub fn update(
        &mut self,
        input: &IndexedFaceSet,
        changes: ChangeFlags,
        data: &mut GeometryData,
    ) -> Result<BuildDiagnostics, TessellationError> {
        let patchable = changes.is_attribute_only()
            && self.map.as_ref().is_some_and(|map| map.fits(input));
        if !patchable {
            let (rebuilt, diagnostics) = self.generate(input)?;
            *data = rebuilt;
            return Ok(diagnostics);
        }

        input.validate()?;
        let Some(map) = self.map.as_ref() else {
            return Ok(BuildDiagnostics::default());
        };

        let mut diagnostics = BuildDiagnostics {
            patched: true,
            vertex_count: data.vertex_count,
            triangle_count: data.vertex_count / 3,
            ..BuildDiagnostics::default()
        };

        if changes.contains(ChangeFlags::COORDS) {
            fill_coordinates(map, input, data);
        }
        if changes.contains(ChangeFlags::COLORS) {
            fill_colors(map, input, data, &mut diagnostics);
        }
        if changes.intersects(ChangeFlags::COORDS | ChangeFlags::TEX_COORDS) {
            fill_tex_coords(map, input, data, &mut diagnostics);
        }
        if changes.intersects(ChangeFlags::COORDS | ChangeFlags::NORMALS) {
            fill_normals(map, input, data, &mut diagnostics);
        }

        log::debug!("indexed face set patched ({changes:?}): {}", diagnostics.summary());
        Ok(diagnostics)
    }

    /// Drops the retained corner map; the next update re-tessellates.
    pub fn release_scratch(&mut self) {
        self.map = None;
    }

    #[must_use]
    pub fn has_scratch(&self) -> bool {
        self.map.is_some()
    }

    /// Source corner of every output vertex from the last topology pass.
    #[must_use]
    pub fn source_corners(&self) -> Vec<SourceCorner> {
        let Some(map) = &self.map else {
            return Vec::new();
        };
        map.triangles
            .iter()
            .map(|&corner| SourceCorner {
                coord: map.corner_coords[corner as usize],
                slot: map.corner_slots[corner as usize],
                polygon: map.ordinal_of(corner),
            })
            .collect()
    }
}

/// `(start, end)` slot ranges of every non-empty polygon run. A trailing run
/// without a closing `-1` still counts.
fn polygon_runs(coord_index: &[i32]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start = 0;
    for (i, &index) in coord_index.iter().enumerate() {
        if index == -1 {
            if i > start {
                runs.push((start, i));
            }
            start = i + 1;
        }
    }
    if start < coord_index.len() {
        runs.push((start, coord_index.len()));
    }
    runs
}

#[allow(clippy::cast_possible_truncation)]
fn build_topology(input: &IndexedFaceSet, diagnostics: &mut BuildDiagnostics) -> TopologyMap {
    let mut map = TopologyMap::default();
    let mut slots: Vec<usize> = Vec::new();
    let mut points: Vec<Point3> = Vec::new();

    'polygons: for (ordinal, (start, end)) in polygon_runs(&input.coord_index).into_iter().enumerate() {
        diagnostics.polygon_count += 1;
        slots.clear();
        points.clear();

        for slot in start..end {
            let raw = input.coord_index[slot];
            let Some(point) = usize::try_from(raw).ok().and_then(|i| input.point(i)) else {
                diagnostics.skipped_polygon_count += 1;
                continue 'polygons;
            };
            if slots.last().is_some_and(|&s| input.coord_index[s] == raw) {
                continue;
            }
            slots.push(slot);
            points.push(point);
        }
        if slots.len() > 1 && input.coord_index[slots[0]] == input.coord_index[slots[slots.len() - 1]] {
            slots.pop();
            points.pop();
        }

        let Ok(triangulation) = triangulate_polygon(&points, input.convex) else {
            diagnostics.skipped_polygon_count += 1;
            continue;
        };
        if triangulation.fan_fallback {
            diagnostics.fallback_triangulation_count += 1;
        }

        let face = map.faces.len() as u32;
        let base = map.corner_coords.len() as u32;
        for &slot in &slots {
            let coord = input.coord_index[slot] as u32;
            map.corner_coords.push(coord);
            map.corner_slots.push(slot as u32);
            map.corner_faces.push(face);
            map.max_coord = Some(map.max_coord.map_or(coord, |m| m.max(coord)));
        }
        map.faces.push(FaceRecord {
            ordinal: ordinal as u32,
            start: base,
            len: slots.len() as u32,
        });

        for [a, b, c] in triangulation.triangles {
            let order = if input.ccw { [a, b, c] } else { [a, c, b] };
            map.triangles.extend(order.iter().map(|&k| base + k));
        }
    }

    if diagnostics.skipped_polygon_count > 0 {
        diagnostics.add_warning(format!(
            "{} degenerate polygon(s) skipped",
            diagnostics.skipped_polygon_count
        ));
    }
    map
}

/// Attribute index for a polygon corner: the dedicated index list when
/// present, otherwise `coordIndex` (per vertex) or the polygon ordinal (per
/// face).
fn attribute_index(
    index: &[i32],
    coord_index: &[i32],
    per_vertex: bool,
    slot: u32,
    ordinal: u32,
) -> Option<usize> {
    let raw = if per_vertex {
        let list = if index.is_empty() { coord_index } else { index };
        *list.get(slot as usize)?
    } else if index.is_empty() {
        return Some(ordinal as usize);
    } else {
        *index.get(ordinal as usize)?
    };
    usize::try_from(raw).ok()
}

fn fill_coordinates(map: &TopologyMap, input: &IndexedFaceSet, data: &mut GeometryData) {
    data.coordinates.clear();
    data.coordinates.reserve(map.triangles.len() * 3);
    for &corner in &map.triangles {
        let c = map.corner_coords[corner as usize] as usize;
        match input.coord.get(c * 3..c * 3 + 3) {
            Some(xyz) => data.coordinates.extend_from_slice(xyz),
            None => data.coordinates.extend_from_slice(&[0.0; 3]),
        }
    }
}

fn fill_colors(
    map: &TopologyMap,
    input: &IndexedFaceSet,
    data: &mut GeometryData,
    diagnostics: &mut BuildDiagnostics,
) {
    data.colors = None;
    let Some(color) = input.color.as_ref().filter(|c| c.element_count() > 0) else {
        return;
    };

    let mut out = AttributeArray::with_capacity(color.components, map.triangles.len());
    for &corner in &map.triangles {
        let value = attribute_index(
            &input.color_index,
            &input.coord_index,
            input.color_per_vertex,
            map.corner_slots[corner as usize],
            map.ordinal_of(corner),
        )
        .and_then(|i| color.get(i));
        let Some(value) = value else {
            diagnostics.add_warning("color index out of range; colors dropped");
            return;
        };
        out.push(value);
    }
    data.colors = Some(out);
}

fn fill_tex_coords(
    map: &TopologyMap,
    input: &IndexedFaceSet,
    data: &mut GeometryData,
    diagnostics: &mut BuildDiagnostics,
) {
    data.tex_coords.clear();
    data.tex_set_map.clone_from(&input.tex_set_map);

    if input.tex_coords.is_empty() {
        data.tex_coords.push(default_tex_coords(map, input));
        return;
    }

    for (set, tex) in input.tex_coords.iter().enumerate() {
        let mut out = AttributeArray::with_capacity(tex.components, map.triangles.len());
        let mut complete = true;
        for &corner in &map.triangles {
            let value = attribute_index(
                &input.tex_coord_index,
                &input.coord_index,
                true,
                map.corner_slots[corner as usize],
                0,
            )
            .and_then(|i| tex.get(i));
            match value {
                Some(value) => out.push(value),
                None => {
                    complete = false;
                    break;
                }
            }
        }
        if complete {
            data.tex_coords.push(out);
        } else {
            diagnostics.add_warning(format!(
                "texture coordinate set {set} is too short; generated coordinates used"
            ));
            data.tex_coords.push(default_tex_coords(map, input));
        }
    }
}

/// Bounding-box texture mapping: the largest extent runs along `s`, the second
/// largest along `t`, both scaled by the largest extent.
#[allow(clippy::cast_possible_truncation)]
fn default_tex_coords(map: &TopologyMap, input: &IndexedFaceSet) -> AttributeArray {
    let mut out = AttributeArray::with_capacity(2, map.triangles.len());
    let bbox = BBox::from_points((0..input.coord_count()).filter_map(|i| input.point(i)));
    let Some(bbox) = bbox else {
        return out;
    };

    let size = bbox.size();
    let extents = [size.x, size.y, size.z];
    let mut axes = [0usize, 1, 2];
    axes.sort_by(|&a, &b| extents[b].total_cmp(&extents[a]));
    let (s_axis, t_axis) = (axes[0], axes[1]);
    let scale = extents[s_axis];
    let min = [bbox.min.x, bbox.min.y, bbox.min.z];

    for &corner in &map.triangles {
        let c = map.corner_coords[corner as usize] as usize;
        let p = input.point(c).unwrap_or_default();
        let p = [p.x, p.y, p.z];
        if scale > 0.0 {
            out.push(&[
                ((p[s_axis] - min[s_axis]) / scale) as f32,
                ((p[t_axis] - min[t_axis]) / scale) as f32,
            ]);
        } else {
            out.push(&[0.0, 0.0]);
        }
    }
    out
}

fn fill_normals(
    map: &TopologyMap,
    input: &IndexedFaceSet,
    data: &mut GeometryData,
    diagnostics: &mut BuildDiagnostics,
) {
    if let Some(normals) = explicit_normals(map, input) {
        data.normals = normals;
        return;
    }
    if !input.normal.is_empty() {
        diagnostics.add_warning("normal index out of range; normals generated");
    }

    let face_normals = face_normals(map, input);
    let corner_normals = if input.normal_per_vertex {
        let (normals, split) = smooth_corner_normals(map, &face_normals, input.clamped_crease_angle());
        diagnostics.split_vertex_count = split;
        normals
    } else {
        map.corner_faces
            .iter()
            .map(|&f| face_normals[f as usize])
            .collect()
    };

    data.normals.clear();
    data.normals.reserve(map.triangles.len() * 3);
    for &corner in &map.triangles {
        data.normals
            .extend_from_slice(&corner_normals[corner as usize].to_f32());
    }
}

fn explicit_normals(map: &TopologyMap, input: &IndexedFaceSet) -> Option<Vec<f32>> {
    if input.normal.is_empty() {
        return None;
    }
    let mut out = Vec::with_capacity(map.triangles.len() * 3);
    for &corner in &map.triangles {
        let i = attribute_index(
            &input.normal_index,
            &input.coord_index,
            input.normal_per_vertex,
            map.corner_slots[corner as usize],
            map.ordinal_of(corner),
        )?;
        out.extend_from_slice(input.normal.get(i * 3..i * 3 + 3)?);
    }
    Some(out)
}

/// Unit face normals pointing out of the front face.
fn face_normals(map: &TopologyMap, input: &IndexedFaceSet) -> Vec<Vec3> {
    let mut points = Vec::new();
    map.faces
        .iter()
        .map(|face| {
            points.clear();
            let range = face.start as usize..(face.start + face.len) as usize;
            points.extend(
                map.corner_coords[range]
                    .iter()
                    .map(|&c| input.point(c as usize).unwrap_or_default()),
            );
            let n = polygon_normal(&points).normalized().unwrap_or(Vec3::Y);
            if input.ccw { n } else { -n }
        })
        .collect()
}

/// Per-corner normals averaged over the faces around the corner's coordinate
/// whose normal lies within `crease_angle` of the corner's own face. Returns
/// the normals and how many corners had a neighbour excluded by the crease.
fn smooth_corner_normals(
    map: &TopologyMap,
    face_normals: &[Vec3],
    crease_angle: f64,
) -> (Vec<Vec3>, usize) {
    let coord_count = map.max_coord.map_or(0, |m| m as usize + 1);

    // Faces around each coordinate, CSR layout, each face at most once.
    let mut offsets = vec![0u32; coord_count + 1];
    let mut last_face = vec![u32::MAX; coord_count];
    for (&c, &f) in map.corner_coords.iter().zip(&map.corner_faces) {
        if last_face[c as usize] != f {
            last_face[c as usize] = f;
            offsets[c as usize + 1] += 1;
        }
    }
    for i in 0..coord_count {
        offsets[i + 1] += offsets[i];
    }
    let mut cursor = offsets.clone();
    let mut around = vec![0u32; offsets[coord_count] as usize];
    last_face.fill(u32::MAX);
    for (&c, &f) in map.corner_coords.iter().zip(&map.corner_faces) {
        if last_face[c as usize] != f {
            last_face[c as usize] = f;
            around[cursor[c as usize] as usize] = f;
            cursor[c as usize] += 1;
        }
    }

    let smooth_everything = crease_angle >= PI - Tolerance::ANGLE.eps;
    let mut split = 0;
    let normals = map
        .corner_coords
        .iter()
        .zip(&map.corner_faces)
        .map(|(&c, &f)| {
            let own = face_normals[f as usize];
            let neighbours = &around[offsets[c as usize] as usize..offsets[c as usize + 1] as usize];
            let mut sum = Vec3::ZERO;
            let mut creased = false;
            for &g in neighbours {
                let other = face_normals[g as usize];
                if g == f || smooth_everything || own.angle_to(other) < crease_angle {
                    sum += other;
                } else {
                    creased = true;
                }
            }
            if creased {
                split += 1;
            }
            sum.normalized().unwrap_or(own)
        })
        .collect();
    (normals, split)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polygon_runs_handles_missing_terminator_and_empty_runs() {
        assert_eq!(polygon_runs(&[0, 1, 2, -1, 2, 3, 0]), vec![(0, 3), (4, 7)]);
        assert_eq!(polygon_runs(&[-1, -1, 0, 1, 2, -1]), vec![(2, 5)]);
        assert!(polygon_runs(&[]).is_empty());
    }

    #[test]
    fn attribute_index_falls_back_to_coord_index_and_ordinal() {
        let coord_index = [4, 5, 6, -1];
        assert_eq!(attribute_index(&[], &coord_index, true, 1, 0), Some(5));
        assert_eq!(attribute_index(&[9, 8, 7, -1], &coord_index, true, 2, 0), Some(7));
        assert_eq!(attribute_index(&[], &coord_index, false, 1, 3), Some(3));
        assert_eq!(attribute_index(&[2, 1], &coord_index, false, 0, 1), Some(1));
        assert_eq!(attribute_index(&[2], &coord_index, false, 0, 1), None);
        assert_eq!(attribute_index(&[-1], &coord_index, true, 0, 0), None);
    }

    #[test]
    fn closing_duplicate_corner_is_dropped() {
        let input = IndexedFaceSet {
            coord: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0],
            coord_index: vec![0, 1, 1, 2, 0, -1],
            ..IndexedFaceSet::default()
        };
        let mut diagnostics = BuildDiagnostics::default();
        let map = build_topology(&input, &mut diagnostics);
        assert_eq!(map.corner_coords, vec![0, 1, 2]);
        assert_eq!(map.corner_slots, vec![0, 1, 3]);
        assert_eq!(map.triangles, vec![0, 1, 2]);
        assert!(diagnostics.is_clean());
    }
}
