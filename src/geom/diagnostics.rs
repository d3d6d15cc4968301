//! Build diagnostics and the caller-supplied error channel.
//!
//! Generators separate two kinds of trouble:
//!
//! - configuration errors (a closed straight spine, bad attribute component
//!   counts) abort the build and surface as [`GeomError`];
//! - degenerate-but-tolerable input (skipped polygons, inherited spine frames,
//!   attribute arrays that are too short) is absorbed and recorded as counts
//!   and warnings on [`BuildDiagnostics`].
//!
//! ```ignore
//! let mut reporter = CollectingReporter::default();
//! let data = source.build(&mut reporter);
//! for message in &reporter.errors {
//!     eprintln!("geometry error: {message}");
//! }
//! ```

use std::fmt;

use super::elevation::HeightFieldError;
use super::extrusion::ExtrusionError;
use super::metrics::GeomTimingReport;
use super::tessellation::TessellationError;

/// Any configuration error raised by a generator.
#[derive(Debug, thiserror::Error)]
pub enum GeomError {
    #[error("height field: {0}")]
    HeightField(#[from] HeightFieldError),
    #[error("extrusion: {0}")]
    Extrusion(#[from] ExtrusionError),
    #[error("indexed face set: {0}")]
    Tessellation(#[from] TessellationError),
}

/// Sink for configuration errors and warnings produced during a rebuild.
pub trait ErrorReporter {
    fn error(&mut self, error: &GeomError);
    fn warning(&mut self, message: &str);
}

/// Forwards everything to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn error(&mut self, error: &GeomError) {
        log::error!("{error}");
    }

    fn warning(&mut self, message: &str) {
        log::warn!("{message}");
    }
}

/// Keeps every message, in order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CollectingReporter {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl CollectingReporter {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

impl ErrorReporter for CollectingReporter {
    fn error(&mut self, error: &GeomError) {
        self.errors.push(error.to_string());
    }

    fn warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }
}

/// Counters collected while building one [`GeometryData`](super::GeometryData).
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BuildDiagnostics {
    /// Vertices in the output buffers.
    pub vertex_count: usize,

    /// Triangles the renderer will draw (quads count as two).
    pub triangle_count: usize,

    /// Source polygons (or grid cells) considered.
    pub polygon_count: usize,

    /// Polygons dropped as degenerate: fewer than 3 distinct corners,
    /// out-of-range indices or zero area.
    pub skipped_polygon_count: usize,

    /// Non-convex polygons where ear clipping failed and a fan was used.
    pub fallback_triangulation_count: usize,

    /// Spine frames whose bend axis was inherited from a neighbour.
    pub inherited_frame_count: usize,

    /// Output corners whose smoothed normal differs from another corner
    /// sharing the same source coordinate.
    pub split_vertex_count: usize,

    /// Whether the last update patched buffers instead of rebuilding.
    pub patched: bool,

    /// Only populated with the `geom_metrics` feature on non-WASM targets.
    pub timing: Option<GeomTimingReport>,

    /// Human-readable notes about absorbed irregularities.
    pub warnings: Vec<String>,
}

impl BuildDiagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// No polygons dropped, no fallbacks taken, no warnings.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.skipped_polygon_count == 0
            && self.fallback_triangulation_count == 0
            && self.inherited_frame_count == 0
            && self.warnings.is_empty()
    }

    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Sums counts and appends warnings. `patched` is AND-ed; timing buckets
    /// are accumulated.
    pub fn merge(&mut self, other: &BuildDiagnostics) {
        self.vertex_count += other.vertex_count;
        self.triangle_count += other.triangle_count;
        self.polygon_count += other.polygon_count;
        self.skipped_polygon_count += other.skipped_polygon_count;
        self.fallback_triangulation_count += other.fallback_triangulation_count;
        self.inherited_frame_count += other.inherited_frame_count;
        self.split_vertex_count += other.split_vertex_count;
        self.patched = self.patched && other.patched;
        self.warnings.extend(other.warnings.iter().cloned());
        match (&mut self.timing, &other.timing) {
            (Some(mine), Some(theirs)) => mine.accumulate(theirs),
            (None, Some(theirs)) => self.timing = Some(theirs.clone()),
            _ => {}
        }
    }

    /// Forwards every warning to `reporter`.
    pub fn report_warnings(&self, reporter: &mut dyn ErrorReporter) {
        for warning in &self.warnings {
            reporter.warning(warning);
        }
    }

    /// Short summary for log lines: `"V:{vertices} T:{triangles} [issues...]"`.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("V:{} T:{}", self.vertex_count, self.triangle_count)];

        if self.skipped_polygon_count > 0 {
            parts.push(format!("skipped:{}", self.skipped_polygon_count));
        }
        if self.fallback_triangulation_count > 0 {
            parts.push(format!("fan-fallback:{}", self.fallback_triangulation_count));
        }
        if self.inherited_frame_count > 0 {
            parts.push(format!("inherited-frames:{}", self.inherited_frame_count));
        }
        if self.split_vertex_count > 0 {
            parts.push(format!("creased:{}", self.split_vertex_count));
        }
        if self.patched {
            parts.push("patched".to_string());
        }

        parts.join(" ")
    }
}

impl fmt::Display for BuildDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Build Diagnostics:")?;
        writeln!(f, "  Vertices: {}", self.vertex_count)?;
        writeln!(f, "  Triangles: {}", self.triangle_count)?;
        writeln!(f, "  Polygons: {}", self.polygon_count)?;

        if self.skipped_polygon_count > 0 {
            writeln!(f, "  Skipped polygons: {}", self.skipped_polygon_count)?;
        }
        if self.fallback_triangulation_count > 0 {
            writeln!(f, "  Fan fallbacks: {}", self.fallback_triangulation_count)?;
        }
        if self.inherited_frame_count > 0 {
            writeln!(f, "  Inherited spine frames: {}", self.inherited_frame_count)?;
        }
        if self.split_vertex_count > 0 {
            writeln!(f, "  Creased corners: {}", self.split_vertex_count)?;
        }
        if self.patched {
            writeln!(f, "  Buffers patched in place")?;
        }

        if !self.warnings.is_empty() {
            writeln!(f, "  Warnings:")?;
            for warning in &self.warnings {
                writeln!(f, "    - {warning}")?;
            }
        }

        if let Some(timing) = &self.timing {
            writeln!(f, "  Timing: {} ms total", timing.total_ms())?;
        }

        let status = if self.is_clean() { "CLEAN" } else { "DEGRADED" };
        writeln!(f, "  Status: {status}")?;

        Ok(())
    }
}
