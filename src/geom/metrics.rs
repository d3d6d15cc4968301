//! Opt-in timing hooks for the generators.
//!
//! Timing is only collected when the `geom_metrics` feature is enabled and the
//! target is not WASM (`std::time::Instant` is unavailable there). Otherwise
//! every call compiles down to running the closure.
//!
//! ```ignore
//! let mut metrics = GeomMetrics::default();
//! metrics.begin();
//! let frames = metrics.time(TimingBucket::SpineFrames, || compute_spine_frames(&spine));
//! if let Some(report) = metrics.end() {
//!     println!("frames: {} ns", report.spine_frames_ns);
//! }
//! ```

/// Phases of a geometry rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimingBucket {
    /// Elevation grid layout and buffer fill.
    HeightField,
    /// Spine frame and twist correction computation.
    SpineFrames,
    /// Extrusion ring and polygon emission.
    Extrusion,
    /// Indexed face set topology pass and buffer fill.
    Tessellation,
    /// Per-polygon fan/ear-clipping triangulation.
    Triangulation,
    /// Face normal and crease smoothing.
    Normals,
}

/// Cumulative nanoseconds per bucket.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GeomTimingReport {
    pub height_field_ns: u64,
    pub spine_frames_ns: u64,
    pub extrusion_ns: u64,
    pub tessellation_ns: u64,
    pub triangulation_ns: u64,
    pub normals_ns: u64,
}

impl GeomTimingReport {
    #[must_use]
    pub fn total_ns(&self) -> u64 {
        self.height_field_ns
            .saturating_add(self.spine_frames_ns)
            .saturating_add(self.extrusion_ns)
            .saturating_add(self.tessellation_ns)
            .saturating_add(self.triangulation_ns)
            .saturating_add(self.normals_ns)
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn total_ms(&self) -> f64 {
        self.total_ns() as f64 / 1_000_000.0
    }

    /// Adds every bucket of `other` into `self`.
    pub fn accumulate(&mut self, other: &Self) {
        self.height_field_ns = self.height_field_ns.saturating_add(other.height_field_ns);
        self.spine_frames_ns = self.spine_frames_ns.saturating_add(other.spine_frames_ns);
        self.extrusion_ns = self.extrusion_ns.saturating_add(other.extrusion_ns);
        self.tessellation_ns = self.tessellation_ns.saturating_add(other.tessellation_ns);
        self.triangulation_ns = self.triangulation_ns.saturating_add(other.triangulation_ns);
        self.normals_ns = self.normals_ns.saturating_add(other.normals_ns);
    }
}

/// Accumulator for timing a rebuild.
///
/// When the `geom_metrics` feature is disabled (or on WASM), all methods are
/// no-ops and [`end`](Self::end) returns `None`.
#[derive(Debug, Default)]
pub struct GeomMetrics {
    #[cfg(all(feature = "geom_metrics", not(target_arch = "wasm32")))]
    report: GeomTimingReport,
}

impl GeomMetrics {
    pub fn begin(&mut self) {
        #[cfg(all(feature = "geom_metrics", not(target_arch = "wasm32")))]
        {
            self.report = GeomTimingReport::default();
        }
    }

    #[must_use]
    pub fn end(&self) -> Option<GeomTimingReport> {
        #[cfg(all(feature = "geom_metrics", not(target_arch = "wasm32")))]
        {
            Some(self.report.clone())
        }
        #[cfg(not(all(feature = "geom_metrics", not(target_arch = "wasm32"))))]
        {
            None
        }
    }

    /// Runs `f`, adding its elapsed time to `bucket` when metrics are enabled.
    pub fn time<R>(&mut self, bucket: TimingBucket, f: impl FnOnce() -> R) -> R {
        #[cfg(all(feature = "geom_metrics", not(target_arch = "wasm32")))]
        {
            let start = std::time::Instant::now();
            let result = f();
            let nanos = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);
            self.add_to_bucket(bucket, nanos);
            result
        }

        #[cfg(not(all(feature = "geom_metrics", not(target_arch = "wasm32"))))]
        {
            let _ = bucket;
            f()
        }
    }

    #[cfg(all(feature = "geom_metrics", not(target_arch = "wasm32")))]
    fn add_to_bucket(&mut self, bucket: TimingBucket, nanos: u64) {
        let slot = match bucket {
            TimingBucket::HeightField => &mut self.report.height_field_ns,
            TimingBucket::SpineFrames => &mut self.report.spine_frames_ns,
            TimingBucket::Extrusion => &mut self.report.extrusion_ns,
            TimingBucket::Tessellation => &mut self.report.tessellation_ns,
            TimingBucket::Triangulation => &mut self.report.triangulation_ns,
            TimingBucket::Normals => &mut self.report.normals_ns,
        };
        *slot = slot.saturating_add(nanos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_report_total() {
        let report = GeomTimingReport {
            spine_frames_ns: 1000,
            triangulation_ns: 2000,
            normals_ns: 3000,
            ..GeomTimingReport::default()
        };
        assert_eq!(report.total_ns(), 6000);
        assert!((report.total_ms() - 0.006).abs() < 1e-9);
    }

    #[test]
    fn test_accumulate_adds_buckets() {
        let mut a = GeomTimingReport {
            height_field_ns: 5,
            ..GeomTimingReport::default()
        };
        let b = GeomTimingReport {
            height_field_ns: 7,
            normals_ns: u64::MAX,
            ..GeomTimingReport::default()
        };
        a.accumulate(&b);
        a.accumulate(&b);
        assert_eq!(a.height_field_ns, 19);
        assert_eq!(a.normals_ns, u64::MAX);
    }

    #[test]
    fn test_time_returns_closure_result() {
        let mut metrics = GeomMetrics::default();
        metrics.begin();
        let result = metrics.time(TimingBucket::Tessellation, || 42);
        assert_eq!(result, 42);
        let _ = metrics.end();
    }
}
