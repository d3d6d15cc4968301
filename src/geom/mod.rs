//! Mesh generation for X3D geometry nodes.
//!
//! Each generator turns one declarative node into a [`GeometryData`]:
//!
//! - [`HeightFieldGenerator`]: elevation grids as strips, quads or indexed quads;
//! - [`ExtrusionGenerator`]: a cross-section swept along a spine;
//! - [`IndexedMeshTessellator`]: polygon lists triangulated with crease-angle
//!   normals.
//!
//! Generators keep the vertex layout of their last build so attribute-only
//! changes ([`ChangeFlags`]) can be patched in place. [`ShapeGeometry`] ties a
//! [`GeometrySource`] to its generator and the current buffers.

mod core;
mod data;
mod diagnostics;
mod elevation;
mod extrusion;
mod metrics;
mod source;
mod spine;
mod tessellation;
mod triangulation;

pub use core::{BBox, Point3, Tolerance, Transform, Vec3, wrap_angle};
pub use data::{
    AttributeArray, AttributeError, ChangeFlags, GeometryData, GeometryDataError, GeometryType,
    check_attribute_layout,
};
pub use diagnostics::{BuildDiagnostics, CollectingReporter, ErrorReporter, GeomError, LogReporter};
pub use elevation::{
    GridMode, HeightField, HeightFieldError, HeightFieldGenerator, MAX_SAMPLES_PER_HEIGHT,
};
pub use extrusion::{Extrusion, ExtrusionError, ExtrusionGenerator, ExtrusionLayout};
pub use metrics::{GeomMetrics, GeomTimingReport, TimingBucket};
pub use source::{GeometrySource, ShapeGeometry};
pub use spine::{
    SpineFrame, SpineFrames, compute_spine_frames, correct_twist, is_closed, is_collinear,
    twist_test_point,
};
pub use tessellation::{
    IndexedFaceSet, IndexedMeshTessellator, SourceCorner, TessellationError, tessellate,
};
pub use triangulation::{
    PolygonTriangulation, TriangulationError, polygon_normal, triangulate_polygon,
};

#[cfg(test)]
mod tests;
