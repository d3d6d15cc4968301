//! Height field (elevation grid) meshing.
//!
//! Sample `(x, z)` lives at `heights[z * x_dimension + x]` and is placed at
//! `(x * x_spacing, height, z * z_spacing)`. The grid is emitted as triangle
//! strips when every attribute is per vertex, otherwise as independent quads
//! so each cell can carry its own color and normal. An indexed-quad layout
//! sharing one vertex per sample is available for per-vertex data.

use serde::Deserialize;

use super::data::{
    AttributeArray, AttributeError, ChangeFlags, GeometryData, GeometryType, check_attribute_layout,
};
use super::diagnostics::BuildDiagnostics;
use super::metrics::{GeomMetrics, TimingBucket};
use super::triangulation::polygon_normal;
use super::{Point3, Vec3};

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum HeightFieldError {
    #[error("grid spacing must be finite and non-negative (x {x}, z {z})")]
    InvalidSpacing { x: f32, z: f32 },
    #[error(transparent)]
    Attribute(#[from] AttributeError),
}

/// Grid points allowed per supplied height; missing samples read as 0 up to
/// this bound.
pub const MAX_SAMPLES_PER_HEIGHT: usize = 4;

/// Raw fields of an elevation grid.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HeightField {
    pub x_dimension: usize,
    pub z_dimension: usize,
    pub x_spacing: f32,
    pub z_spacing: f32,
    pub heights: Vec<f32>,
    pub color: Option<AttributeArray>,
    /// Flat xyz triples; empty when no normal node is present.
    pub normal: Vec<f32>,
    pub tex_coords: Vec<AttributeArray>,
    pub tex_set_map: Vec<usize>,
    pub color_per_vertex: bool,
    pub normal_per_vertex: bool,
    pub ccw: bool,
}

impl Default for HeightField {
    fn default() -> Self {
        Self {
            x_dimension: 0,
            z_dimension: 0,
            x_spacing: 1.0,
            z_spacing: 1.0,
            heights: Vec::new(),
            color: None,
            normal: Vec::new(),
            tex_coords: Vec::new(),
            tex_set_map: Vec::new(),
            color_per_vertex: true,
            normal_per_vertex: true,
            ccw: true,
        }
    }
}

impl HeightField {
    /// Flat grid of the given size with unit spacing.
    #[must_use]
    pub fn flat(x_dimension: usize, z_dimension: usize) -> Self {
        Self {
            x_dimension,
            z_dimension,
            heights: vec![0.0; x_dimension * z_dimension],
            ..Self::default()
        }
    }

    /// Saturates instead of overflowing; see [`is_oversized`](Self::is_oversized).
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.x_dimension.saturating_mul(self.z_dimension)
    }

    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.x_dimension
            .saturating_sub(1)
            .saturating_mul(self.z_dimension.saturating_sub(1))
    }

    /// Dimensions that overflow, that cannot be addressed by `u32` indices
    /// once every cell gets four vertices, or that span more than
    /// [`MAX_SAMPLES_PER_HEIGHT`] grid points per supplied height.
    #[must_use]
    pub fn is_oversized(&self) -> bool {
        let Some(points) = self.x_dimension.checked_mul(self.z_dimension) else {
            return true;
        };
        u32::try_from(points.saturating_mul(4)).is_err()
            || points > self.heights.len().saturating_mul(MAX_SAMPLES_PER_HEIGHT)
    }

    /// Too few samples or cells to produce any face, or an oversized grid.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.heights.len() < 3 || self.is_oversized() || self.cell_count() == 0
    }

    /// Missing samples read as 0.
    fn height(&self, x: usize, z: usize) -> f64 {
        self.heights
            .get(z * self.x_dimension + x)
            .map_or(0.0, |&h| f64::from(h))
    }

    #[allow(clippy::cast_precision_loss)]
    fn sample(&self, x: usize, z: usize) -> Point3 {
        Point3::new(
            x as f64 * f64::from(self.x_spacing),
            self.height(x, z),
            z as f64 * f64::from(self.z_spacing),
        )
    }

    fn validate(&self) -> Result<(), HeightFieldError> {
        let ok = |s: f32| s.is_finite() && s >= 0.0;
        if !ok(self.x_spacing) || !ok(self.z_spacing) {
            return Err(HeightFieldError::InvalidSpacing {
                x: self.x_spacing,
                z: self.z_spacing,
            });
        }
        check_attribute_layout(self.color.as_ref(), &self.tex_coords, &self.tex_set_map)?;
        Ok(())
    }
}

/// Connectivity chosen for a height field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridMode {
    /// One strip per row of cells, shared vertices.
    TriangleStrips,
    /// Four private vertices per cell.
    Quads,
    /// One vertex per sample, four indices per cell.
    IndexedQuads,
}

impl GridMode {
    /// Strips only work when nothing is per face.
    #[must_use]
    pub fn for_flags(color_per_vertex: bool, normal_per_vertex: bool) -> Self {
        if color_per_vertex && normal_per_vertex {
            Self::TriangleStrips
        } else {
            Self::Quads
        }
    }

    #[must_use]
    pub fn geometry_type(self) -> GeometryType {
        match self {
            Self::TriangleStrips => GeometryType::TriangleStrips,
            Self::Quads => GeometryType::Quads,
            Self::IndexedQuads => GeometryType::IndexedQuads,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GridCorner {
    point: u32,
    cell: u32,
}

/// Output-vertex layout retained between builds.
#[derive(Debug, Clone, PartialEq)]
struct GridLayout {
    mode: GridMode,
    x_dim: usize,
    z_dim: usize,
    /// Flags as requested by the field, for change detection.
    requested: [bool; 3],
    color_per_vertex: bool,
    normal_per_vertex: bool,
    ccw: bool,
    corners: Vec<GridCorner>,
    indices: Vec<u32>,
    strip_counts: Vec<u32>,
}

impl GridLayout {
    #[allow(clippy::cast_possible_truncation)]
    fn build(field: &HeightField, mode: GridMode) -> Self {
        let xd = field.x_dimension;
        let zd = field.z_dimension;
        let point = |x: usize, z: usize| (z * xd + x) as u32;
        let cell = |x: usize, z: usize| (z * (xd - 1) + x) as u32;
        let ccw = field.ccw;

        let mut corners = Vec::new();
        let mut indices = Vec::new();
        let mut strip_counts = Vec::new();

        match mode {
            GridMode::TriangleStrips => {
                corners.reserve((zd - 1) * xd * 2);
                for z in 0..zd - 1 {
                    for x in 0..xd {
                        let c = cell(x.min(xd - 2), z);
                        let lower = GridCorner { point: point(x, z), cell: c };
                        let upper = GridCorner { point: point(x, z + 1), cell: c };
                        if ccw {
                            corners.extend([lower, upper]);
                        } else {
                            corners.extend([upper, lower]);
                        }
                    }
                    strip_counts.push((xd * 2) as u32);
                }
            }
            GridMode::Quads => {
                corners.reserve(field.cell_count() * 4);
                for z in 0..zd - 1 {
                    for x in 0..xd - 1 {
                        let c = cell(x, z);
                        let quad = if ccw {
                            [point(x, z), point(x, z + 1), point(x + 1, z + 1), point(x + 1, z)]
                        } else {
                            [point(x, z), point(x + 1, z), point(x + 1, z + 1), point(x, z + 1)]
                        };
                        corners.extend(quad.map(|p| GridCorner { point: p, cell: c }));
                    }
                }
            }
            GridMode::IndexedQuads => {
                corners.extend((0..field.point_count() as u32).map(|p| GridCorner { point: p, cell: 0 }));
                indices.reserve(field.cell_count() * 4);
                for z in 0..zd - 1 {
                    for x in 0..xd - 1 {
                        let quad = if ccw {
                            [point(x, z), point(x, z + 1), point(x + 1, z + 1), point(x + 1, z)]
                        } else {
                            [point(x, z), point(x + 1, z), point(x + 1, z + 1), point(x, z + 1)]
                        };
                        indices.extend(quad);
                    }
                }
            }
        }

        let indexed = mode == GridMode::IndexedQuads;
        Self {
            mode,
            x_dim: xd,
            z_dim: zd,
            requested: [field.ccw, field.color_per_vertex, field.normal_per_vertex],
            color_per_vertex: field.color_per_vertex || indexed,
            normal_per_vertex: field.normal_per_vertex || indexed,
            ccw,
            corners,
            indices,
            strip_counts,
        }
    }

    fn matches(&self, field: &HeightField) -> bool {
        !field.is_degenerate()
            && self.x_dim == field.x_dimension
            && self.z_dim == field.z_dimension
            && self.requested == [field.ccw, field.color_per_vertex, field.normal_per_vertex]
    }

    fn key(corner: GridCorner, per_vertex: bool) -> usize {
        if per_vertex { corner.point as usize } else { corner.cell as usize }
    }
}

/// Meshes height fields, retaining the vertex layout for in-place updates.
#[derive(Debug, Default)]
pub struct HeightFieldGenerator {
    layout: Option<GridLayout>,
    indexed: bool,
}

impl HeightFieldGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Strips or quads depending on the per-vertex flags.
    pub fn generate(
        &mut self,
        field: &HeightField,
    ) -> Result<(GeometryData, BuildDiagnostics), HeightFieldError> {
        self.build(field, GridMode::for_flags(field.color_per_vertex, field.normal_per_vertex))
    }

    /// Shared-vertex grid: `x_dimension * z_dimension` vertices and four
    /// indices per cell. Per-face attributes cannot be expressed here and
    /// are dropped.
    pub fn generate_indexed_quads(
        &mut self,
        field: &HeightField,
    ) -> Result<(GeometryData, BuildDiagnostics), HeightFieldError> {
        self.build(field, GridMode::IndexedQuads)
    }

    /// Patches `data` for attribute-only changes; rebuilds otherwise, in the
    /// mode of the last build.
    pub fn update(
        &mut self,
        field: &HeightField,
        changes: ChangeFlags,
        data: &mut GeometryData,
    ) -> Result<BuildDiagnostics, HeightFieldError> {
        let patchable = changes.is_attribute_only()
            && self
                .layout
                .as_ref()
                .is_some_and(|layout| layout.matches(field) && layout.corners.len() == data.vertex_count);
        if !patchable {
            let (rebuilt, diagnostics) = if self.indexed {
                self.generate_indexed_quads(field)?
            } else {
                self.generate(field)?
            };
            *data = rebuilt;
            return Ok(diagnostics);
        }

        field.validate()?;
        let Some(layout) = self.layout.as_ref() else {
            return Ok(BuildDiagnostics::default());
        };

        let mut diagnostics = BuildDiagnostics {
            patched: true,
            vertex_count: data.vertex_count,
            triangle_count: data.triangle_count(),
            polygon_count: field.cell_count(),
            ..BuildDiagnostics::default()
        };
        if changes.contains(ChangeFlags::COORDS) {
            fill_coordinates(layout, field, data);
        }
        if changes.intersects(ChangeFlags::COORDS | ChangeFlags::NORMALS) {
            fill_normals(layout, field, data, &mut diagnostics);
        }
        if changes.contains(ChangeFlags::COLORS) {
            fill_colors(layout, field, data, &mut diagnostics);
        }
        if changes.contains(ChangeFlags::TEX_COORDS) {
            fill_tex_coords(layout, field, data, &mut diagnostics);
        }
        log::debug!("height field patched ({changes:?}): {}", diagnostics.summary());
        Ok(diagnostics)
    }

    /// Height-only change: rewrites coordinates (and generated normals).
    pub fn update_heights(
        &mut self,
        field: &HeightField,
        data: &mut GeometryData,
    ) -> Result<BuildDiagnostics, HeightFieldError> {
        self.update(field, ChangeFlags::COORDS, data)
    }

    /// Drops the retained layout; the next update rebuilds.
    pub fn release_scratch(&mut self) {
        self.layout = None;
    }

    #[must_use]
    pub fn has_scratch(&self) -> bool {
        self.layout.is_some()
    }

    /// Mode of the retained layout.
    #[must_use]
    pub fn mode(&self) -> Option<GridMode> {
        self.layout.as_ref().map(|layout| layout.mode)
    }

    fn build(
        &mut self,
        field: &HeightField,
        mode: GridMode,
    ) -> Result<(GeometryData, BuildDiagnostics), HeightFieldError> {
        field.validate()?;
        self.indexed = mode == GridMode::IndexedQuads;

        let mut diagnostics = BuildDiagnostics::new();
        if field.is_degenerate() {
            self.layout = None;
            if field.heights.len() >= 3 && field.is_oversized() {
                diagnostics.add_warning(format!(
                    "{}x{} grid is too large for {} heights; nothing emitted",
                    field.x_dimension,
                    field.z_dimension,
                    field.heights.len()
                ));
            }
            log::debug!(
                "height field {}x{} with {} samples has no faces",
                field.x_dimension,
                field.z_dimension,
                field.heights.len()
            );
            return Ok((GeometryData::empty(mode.geometry_type()), diagnostics));
        }

        let mut metrics = GeomMetrics::default();
        metrics.begin();

        if mode == GridMode::IndexedQuads {
            if !field.color_per_vertex && field.color.is_some() {
                diagnostics.add_warning("per-face colors cannot be shared; read per vertex");
            }
            if !field.normal_per_vertex && !field.normal.is_empty() {
                diagnostics.add_warning("per-face normals cannot be shared; read per vertex");
            }
        }

        let (layout, data) = metrics.time(TimingBucket::HeightField, || {
            let layout = GridLayout::build(field, mode);
            let mut data = GeometryData::empty(mode.geometry_type());
            data.vertex_count = layout.corners.len();
            data.indices.clone_from(&layout.indices);
            data.strip_counts.clone_from(&layout.strip_counts);
            fill_coordinates(&layout, field, &mut data);
            fill_colors(&layout, field, &mut data, &mut diagnostics);
            fill_tex_coords(&layout, field, &mut data, &mut diagnostics);
            (layout, data)
        });
        let mut data = data;
        metrics.time(TimingBucket::Normals, || {
            fill_normals(&layout, field, &mut data, &mut diagnostics);
        });

        diagnostics.vertex_count = data.vertex_count;
        diagnostics.triangle_count = data.triangle_count();
        diagnostics.polygon_count = field.cell_count();
        diagnostics.timing = metrics.end();
        log::debug!("height field {:?}: {}", mode, diagnostics.summary());

        self.layout = Some(layout);
        Ok((data, diagnostics))
    }
}

fn fill_coordinates(layout: &GridLayout, field: &HeightField, data: &mut GeometryData) {
    data.coordinates.clear();
    data.coordinates.reserve(layout.corners.len() * 3);
    for corner in &layout.corners {
        let p = corner.point as usize;
        let sample = field.sample(p % layout.x_dim, p / layout.x_dim);
        data.coordinates.extend_from_slice(&sample.to_f32());
    }
}

fn fill_colors(
    layout: &GridLayout,
    field: &HeightField,
    data: &mut GeometryData,
    diagnostics: &mut BuildDiagnostics,
) {
    data.colors = None;
    let Some(color) = field.color.as_ref().filter(|c| c.element_count() > 0) else {
        return;
    };
    let needed = if layout.color_per_vertex {
        field.point_count()
    } else {
        field.cell_count()
    };
    if color.element_count() < needed {
        diagnostics.add_warning(format!(
            "{} colors supplied, {needed} required; colors dropped",
            color.element_count()
        ));
        return;
    }

    let mut out = AttributeArray::with_capacity(color.components, layout.corners.len());
    for &corner in &layout.corners {
        if let Some(value) = color.get(GridLayout::key(corner, layout.color_per_vertex)) {
            out.push(value);
        }
    }
    data.colors = Some(out);
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn fill_tex_coords(
    layout: &GridLayout,
    field: &HeightField,
    data: &mut GeometryData,
    diagnostics: &mut BuildDiagnostics,
) {
    let generated = || {
        let mut out = AttributeArray::with_capacity(2, layout.corners.len());
        let sx = (layout.x_dim - 1) as f64;
        let sz = (layout.z_dim - 1) as f64;
        for corner in &layout.corners {
            let p = corner.point as usize;
            let x = (p % layout.x_dim) as f64;
            let z = (p / layout.x_dim) as f64;
            out.push(&[(x / sx) as f32, (z / sz) as f32]);
        }
        out
    };

    data.tex_coords.clear();
    data.tex_set_map.clone_from(&field.tex_set_map);
    if field.tex_coords.is_empty() {
        data.tex_coords.push(generated());
        return;
    }

    for (set, tex) in field.tex_coords.iter().enumerate() {
        if tex.element_count() < field.point_count() {
            diagnostics.add_warning(format!(
                "texture coordinate set {set} is too short; generated coordinates used"
            ));
            data.tex_coords.push(generated());
            continue;
        }
        let mut out = AttributeArray::with_capacity(tex.components, layout.corners.len());
        for corner in &layout.corners {
            if let Some(value) = tex.get(corner.point as usize) {
                out.push(value);
            }
        }
        data.tex_coords.push(out);
    }
}

fn fill_normals(
    layout: &GridLayout,
    field: &HeightField,
    data: &mut GeometryData,
    diagnostics: &mut BuildDiagnostics,
) {
    let per_vertex = layout.normal_per_vertex;
    data.normals.clear();
    data.normals.reserve(layout.corners.len() * 3);

    if !field.normal.is_empty() {
        let needed = if per_vertex {
            field.point_count()
        } else {
            field.cell_count()
        };
        if field.normal.len() / 3 >= needed {
            for &corner in &layout.corners {
                let i = GridLayout::key(corner, per_vertex);
                data.normals.extend_from_slice(&field.normal[i * 3..i * 3 + 3]);
            }
            return;
        }
        diagnostics.add_warning(format!(
            "{} normals supplied, {needed} required; normals generated",
            field.normal.len() / 3
        ));
    }

    let cells = cell_normals(field);
    let values = if per_vertex { vertex_normals(field, &cells) } else { cells };
    for &corner in &layout.corners {
        let n = values[GridLayout::key(corner, per_vertex)];
        let n = if layout.ccw { n } else { -n };
        data.normals.extend_from_slice(&n.to_f32());
    }
}

/// Unit normal of every cell, facing up for counter-clockwise grids.
fn cell_normals(field: &HeightField) -> Vec<Vec3> {
    let xd = field.x_dimension;
    let zd = field.z_dimension;
    let mut normals = Vec::with_capacity(field.cell_count());
    for z in 0..zd - 1 {
        for x in 0..xd - 1 {
            let quad = [
                field.sample(x, z),
                field.sample(x, z + 1),
                field.sample(x + 1, z + 1),
                field.sample(x + 1, z),
            ];
            normals.push(polygon_normal(&quad).normalized().unwrap_or(Vec3::Y));
        }
    }
    normals
}

/// Average of the normals of the (up to four) cells around each sample.
fn vertex_normals(field: &HeightField, cells: &[Vec3]) -> Vec<Vec3> {
    let xd = field.x_dimension;
    let zd = field.z_dimension;
    let mut normals = Vec::with_capacity(field.point_count());
    for z in 0..zd {
        for x in 0..xd {
            let mut sum = Vec3::ZERO;
            for cz in z.saturating_sub(1)..=z.min(zd - 2) {
                for cx in x.saturating_sub(1)..=x.min(xd - 2) {
                    sum += cells[cz * (xd - 1) + cx];
                }
            }
            normals.push(sum.normalized().unwrap_or(Vec3::Y));
        }
    }
    normals
}
