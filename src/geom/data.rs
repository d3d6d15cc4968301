//! Render-ready mesh buffers shared by every generator.
//!
//! A [`GeometryData`] is produced wholesale by a generator and handed to the
//! rendering layer by value. Attribute-only rebuilds patch its buffers in place
//! through the owning generator; nothing else mutates it.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Connectivity encoding of a [`GeometryData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GeometryType {
    /// Every 3 vertices form a triangle.
    #[default]
    Triangles,
    /// Every 4 vertices form a quad.
    Quads,
    /// `strip_counts` partitions the vertices into triangle strips.
    TriangleStrips,
    /// Every 3 entries of `indices` form a triangle.
    IndexedTriangles,
    /// Every 4 entries of `indices` form a quad.
    IndexedQuads,
    /// `strip_counts` partitions `indices` into triangle fans.
    IndexedTriangleFans,
}

impl GeometryType {
    #[must_use]
    pub const fn is_indexed(self) -> bool {
        matches!(
            self,
            Self::IndexedTriangles | Self::IndexedQuads | Self::IndexedTriangleFans
        )
    }
}

/// Flat multi-component attribute buffer (colors, texture coordinates).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AttributeArray {
    pub components: usize,
    pub values: Vec<f32>,
}

impl AttributeArray {
    #[must_use]
    pub fn new(components: usize, values: Vec<f32>) -> Self {
        Self { components, values }
    }

    #[must_use]
    pub fn with_capacity(components: usize, elements: usize) -> Self {
        Self {
            components,
            values: Vec::with_capacity(components.saturating_mul(elements)),
        }
    }

    /// Number of complete elements; a trailing partial element is ignored.
    #[must_use]
    pub fn element_count(&self) -> usize {
        if self.components == 0 {
            0
        } else {
            self.values.len() / self.components
        }
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&[f32]> {
        if index >= self.element_count() {
            return None;
        }
        let start = index * self.components;
        self.values.get(start..start + self.components)
    }

    pub fn push(&mut self, element: &[f32]) {
        self.values.extend_from_slice(element);
    }
}

/// Attribute layouts a generator refuses to interpret.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum AttributeError {
    #[error("color node has {0} components per entry (3 or 4 required)")]
    InvalidColorComponents(usize),
    #[error("texture coordinate set {set} has {components} components (2, 3 or 4 required)")]
    InvalidTexCoordComponents { set: usize, components: usize },
    #[error("texture unit {unit} references missing texture coordinate set {set}")]
    InvalidTexSetMap { unit: usize, set: usize },
}

/// Checks color/texture component counts and the texture unit map. With no
/// texture sets, units may only reference the generated set 0.
pub fn check_attribute_layout(
    color: Option<&AttributeArray>,
    tex_coords: &[AttributeArray],
    tex_set_map: &[usize],
) -> Result<(), AttributeError> {
    if let Some(color) = color {
        if color.components != 3 && color.components != 4 {
            return Err(AttributeError::InvalidColorComponents(color.components));
        }
    }
    for (set, tex) in tex_coords.iter().enumerate() {
        if !(2..=4).contains(&tex.components) {
            return Err(AttributeError::InvalidTexCoordComponents {
                set,
                components: tex.components,
            });
        }
    }
    for (unit, &set) in tex_set_map.iter().enumerate() {
        if set >= tex_coords.len().max(1) {
            return Err(AttributeError::InvalidTexSetMap { unit, set });
        }
    }
    Ok(())
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GeometryDataError {
    #[error("coordinate buffer holds {actual} floats, expected {expected}")]
    CoordinateLength { expected: usize, actual: usize },
    #[error("{attribute} buffer holds {actual} floats, expected {expected}")]
    AttributeLength {
        attribute: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("color buffer has {0} components per vertex (3 or 4 required)")]
    ColorComponents(usize),
    #[error("texture coordinate set {set} has {components} components (2, 3 or 4 required)")]
    TexCoordComponents { set: usize, components: usize },
    #[error("texture unit {unit} reads missing set {set}")]
    TexSetMap { unit: usize, set: usize },
    #[error("index {index} at position {position} exceeds vertex count {vertex_count}")]
    IndexOutOfRange {
        position: usize,
        index: u32,
        vertex_count: usize,
    },
    #[error("{geometry_type:?} needs a multiple of {stride} entries, found {len}")]
    Stride {
        geometry_type: GeometryType,
        stride: usize,
        len: usize,
    },
    #[error("strip counts sum to {sum}, expected {expected}")]
    StripCounts { sum: usize, expected: usize },
    #[error("coordinate buffer contains NaN or infinite values")]
    NonFinite,
}

/// Canonical generator output consumed by the rendering layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeometryData {
    pub geometry_type: GeometryType,
    pub vertex_count: usize,
    /// 3 floats per vertex.
    pub coordinates: Vec<f32>,
    /// 3 floats per vertex; empty when the geometry carries no normals.
    pub normals: Vec<f32>,
    /// Unique texture coordinate sets.
    pub tex_coords: Vec<AttributeArray>,
    /// `tex_set_map[unit]` is the set read by texture unit `unit`.
    pub tex_set_map: Vec<usize>,
    pub colors: Option<AttributeArray>,
    pub indices: Vec<u32>,
    pub strip_counts: Vec<u32>,
}

impl GeometryData {
    #[must_use]
    pub fn empty(geometry_type: GeometryType) -> Self {
        Self {
            geometry_type,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertex_count == 0
    }

    /// Number of triangles or quads the renderer will draw.
    #[must_use]
    pub fn face_count(&self) -> usize {
        match self.geometry_type {
            GeometryType::Triangles => self.vertex_count / 3,
            GeometryType::Quads => self.vertex_count / 4,
            GeometryType::IndexedTriangles => self.indices.len() / 3,
            GeometryType::IndexedQuads => self.indices.len() / 4,
            GeometryType::TriangleStrips | GeometryType::IndexedTriangleFans => self
                .strip_counts
                .iter()
                .map(|&count| (count as usize).saturating_sub(2))
                .sum(),
        }
    }

    /// Triangles the renderer ends up rasterising (quads count twice).
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        match self.geometry_type {
            GeometryType::Quads | GeometryType::IndexedQuads => self.face_count() * 2,
            _ => self.face_count(),
        }
    }

    /// Number of elements indexed by the connectivity (vertices or indices).
    fn connectivity_len(&self) -> usize {
        if self.geometry_type.is_indexed() {
            self.indices.len()
        } else {
            self.vertex_count
        }
    }

    /// Position of vertex `i`.
    #[must_use]
    pub fn position(&self, i: usize) -> Option<[f32; 3]> {
        let s = self.coordinates.get(i * 3..i * 3 + 3)?;
        Some([s[0], s[1], s[2]])
    }

    /// Normal of vertex `i`.
    #[must_use]
    pub fn normal(&self, i: usize) -> Option<[f32; 3]> {
        let s = self.normals.get(i * 3..i * 3 + 3)?;
        Some([s[0], s[1], s[2]])
    }

    /// Every face expanded to vertex-index triangles with the winding the
    /// renderer sees: quads split along their first diagonal, odd strip
    /// triangles flipped.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn triangles(&self) -> Vec<[u32; 3]> {
        let connectivity: Vec<u32> = if self.geometry_type.is_indexed() {
            self.indices.clone()
        } else {
            (0..self.vertex_count as u32).collect()
        };

        let mut out = Vec::with_capacity(self.triangle_count());
        match self.geometry_type {
            GeometryType::Triangles | GeometryType::IndexedTriangles => {
                out.extend(connectivity.chunks_exact(3).map(|t| [t[0], t[1], t[2]]));
            }
            GeometryType::Quads | GeometryType::IndexedQuads => {
                for q in connectivity.chunks_exact(4) {
                    out.push([q[0], q[1], q[2]]);
                    out.push([q[0], q[2], q[3]]);
                }
            }
            GeometryType::TriangleStrips | GeometryType::IndexedTriangleFans => {
                let fan = self.geometry_type == GeometryType::IndexedTriangleFans;
                let mut start = 0;
                for &count in &self.strip_counts {
                    let end = (start + count as usize).min(connectivity.len());
                    let run = &connectivity[start..end];
                    for k in 0..run.len().saturating_sub(2) {
                        out.push(if fan {
                            [run[0], run[k + 1], run[k + 2]]
                        } else if k % 2 == 0 {
                            [run[k], run[k + 1], run[k + 2]]
                        } else {
                            [run[k + 1], run[k], run[k + 2]]
                        });
                    }
                    start = end;
                }
            }
        }
        out
    }

    pub fn validate(&self) -> Result<(), GeometryDataError> {
        let n = self.vertex_count;
        if self.coordinates.len() != n * 3 {
            return Err(GeometryDataError::CoordinateLength {
                expected: n * 3,
                actual: self.coordinates.len(),
            });
        }
        if self.coordinates.iter().any(|v| !v.is_finite()) {
            return Err(GeometryDataError::NonFinite);
        }
        if !self.normals.is_empty() && self.normals.len() != n * 3 {
            return Err(GeometryDataError::AttributeLength {
                attribute: "normal",
                expected: n * 3,
                actual: self.normals.len(),
            });
        }
        if let Some(colors) = &self.colors {
            if colors.components != 3 && colors.components != 4 {
                return Err(GeometryDataError::ColorComponents(colors.components));
            }
            if colors.values.len() != n * colors.components {
                return Err(GeometryDataError::AttributeLength {
                    attribute: "color",
                    expected: n * colors.components,
                    actual: colors.values.len(),
                });
            }
        }
        for (set, tex) in self.tex_coords.iter().enumerate() {
            if !(2..=4).contains(&tex.components) {
                return Err(GeometryDataError::TexCoordComponents {
                    set,
                    components: tex.components,
                });
            }
            if tex.values.len() != n * tex.components {
                return Err(GeometryDataError::AttributeLength {
                    attribute: "texture coordinate",
                    expected: n * tex.components,
                    actual: tex.values.len(),
                });
            }
        }
        for (unit, &set) in self.tex_set_map.iter().enumerate() {
            if set >= self.tex_coords.len() {
                return Err(GeometryDataError::TexSetMap { unit, set });
            }
        }

        if let Some((position, &index)) = self
            .indices
            .iter()
            .enumerate()
            .find(|&(_, &i)| i as usize >= n)
        {
            return Err(GeometryDataError::IndexOutOfRange {
                position,
                index,
                vertex_count: n,
            });
        }

        let stride = match self.geometry_type {
            GeometryType::Triangles | GeometryType::IndexedTriangles => 3,
            GeometryType::Quads | GeometryType::IndexedQuads => 4,
            GeometryType::TriangleStrips | GeometryType::IndexedTriangleFans => 1,
        };
        let len = self.connectivity_len();
        if len % stride != 0 {
            return Err(GeometryDataError::Stride {
                geometry_type: self.geometry_type,
                stride,
                len,
            });
        }
        if matches!(
            self.geometry_type,
            GeometryType::TriangleStrips | GeometryType::IndexedTriangleFans
        ) {
            let sum: usize = self.strip_counts.iter().map(|&c| c as usize).sum();
            if sum != len {
                return Err(GeometryDataError::StripCounts { sum, expected: len });
            }
        }
        Ok(())
    }
}

bitflags! {
    /// Which inputs changed since the last build.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChangeFlags: u32 {
        const COORDS = 1;
        const COLORS = 1 << 1;
        const NORMALS = 1 << 2;
        const TEX_COORDS = 1 << 3;
        /// Connectivity changed; always forces re-tessellation.
        const INDICES = 1 << 4;
        /// Flags, dimensions, crease angle and other settings.
        const SETTINGS = 1 << 5;
        const ALL = Self::COORDS.bits()
            | Self::COLORS.bits()
            | Self::NORMALS.bits()
            | Self::TEX_COORDS.bits()
            | Self::INDICES.bits()
            | Self::SETTINGS.bits();
    }
}

impl ChangeFlags {
    /// True when the change can be applied without rebuilding connectivity.
    #[must_use]
    pub fn is_attribute_only(self) -> bool {
        !self.is_empty() && !self.intersects(Self::INDICES | Self::SETTINGS)
    }
}
