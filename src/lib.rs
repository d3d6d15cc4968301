#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod geom;

use std::fmt;

use geom::{
    BuildDiagnostics, ChangeFlags, CollectingReporter, ErrorReporter, GeomError, GeometrySource,
    ShapeGeometry,
};
use serde::Serialize;
use wasm_bindgen::JsError;
use wasm_bindgen::prelude::*;

cfg_if::cfg_if! {
    if #[cfg(all(feature = "console_error_panic_hook", target_arch = "wasm32"))] {
        #[wasm_bindgen(start)]
        pub fn initialize() {
            console_error_panic_hook::set_once();
            init_logger();
        }
    } else {
        #[wasm_bindgen(start)]
        pub fn initialize() {
            init_logger();
        }
    }
}

#[cfg(feature = "debug_logs")]
fn init_logger() {
    use log::LevelFilter;
    use wasm_bindgen_console_logger::DEFAULT_LOGGER;
    // a second initialize() keeps the logger that is already installed
    if log::set_logger(&DEFAULT_LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
}

#[cfg(not(feature = "debug_logs"))]
fn init_logger() {}

#[macro_export]
macro_rules! debug_log {
    ($($t:tt)*) => {{
        #[cfg(feature = "debug_logs")]
        {
            #[cfg(target_arch = "wasm32")]
            {
                ::web_sys::console::log_1(&::wasm_bindgen::JsValue::from_str(&format!($($t)*)));
            }
            #[cfg(not(target_arch = "wasm32"))]
            {
                println!("{}", format!($($t)*));
            }
        }
    }};
}

/// Collects the messages of one build and echoes them to the debug log.
#[derive(Debug, Default)]
struct HostReporter {
    collected: CollectingReporter,
}

impl ErrorReporter for HostReporter {
    fn error(&mut self, error: &GeomError) {
        debug_log!("geometry error: {error}");
        self.collected.error(error);
    }

    fn warning(&mut self, message: &str) {
        debug_log!("geometry warning: {message}");
        self.collected.warning(message);
    }
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct DiagnosticsExport<'a> {
    kind: &'static str,
    vertex_count: usize,
    triangle_count: usize,
    polygon_count: usize,
    skipped_polygon_count: usize,
    fallback_triangulation_count: usize,
    inherited_frame_count: usize,
    split_vertex_count: usize,
    patched: bool,
    errors: &'a [String],
    warnings: &'a [String],
}

impl<'a> DiagnosticsExport<'a> {
    fn new(
        kind: &'static str,
        diagnostics: &BuildDiagnostics,
        reporter: &'a CollectingReporter,
    ) -> Self {
        Self {
            kind,
            vertex_count: diagnostics.vertex_count,
            triangle_count: diagnostics.triangle_count,
            polygon_count: diagnostics.polygon_count,
            skipped_polygon_count: diagnostics.skipped_polygon_count,
            fallback_triangulation_count: diagnostics.fallback_triangulation_count,
            inherited_frame_count: diagnostics.inherited_frame_count,
            split_vertex_count: diagnostics.split_vertex_count,
            patched: diagnostics.patched,
            errors: &reporter.errors,
            warnings: &reporter.warnings,
        }
    }
}

/// Unknown bits are ignored; no bits at all means "rebuild".
fn change_flags(bits: u32) -> ChangeFlags {
    ChangeFlags::from_bits_truncate(bits)
}

/// One geometry node and its render buffers, for consumers on the JS side.
#[wasm_bindgen]
pub struct ShapeHandle {
    shape: ShapeGeometry,
    reporter: HostReporter,
}

#[wasm_bindgen]
impl ShapeHandle {
    /// Builds from a plain object tagged with `kind` (`heightField`,
    /// `extrusion` or `indexedFaceSet`).
    #[wasm_bindgen(constructor)]
    pub fn new(source: JsValue) -> Result<ShapeHandle, JsValue> {
        let source: GeometrySource = serde_wasm_bindgen::from_value(source).map_err(to_js_error)?;
        Ok(Self::from_source(source))
    }

    #[wasm_bindgen]
    pub fn kind(&self) -> String {
        self.shape.source().kind().to_string()
    }

    /// Replaces the node fields. `changes` holds [`ChangeFlags`] bits naming
    /// what differs from the previous fields.
    #[wasm_bindgen]
    pub fn update(&mut self, source: JsValue, changes: u32) -> Result<(), JsValue> {
        let source: GeometrySource = serde_wasm_bindgen::from_value(source).map_err(to_js_error)?;
        self.apply(source, change_flags(changes));
        Ok(())
    }

    #[wasm_bindgen]
    pub fn rebuild(&mut self) {
        self.reporter = HostReporter::default();
        self.shape.rebuild(&mut self.reporter);
    }

    #[wasm_bindgen]
    pub fn set_static(&mut self, is_static: bool) {
        self.shape.set_static(is_static);
    }

    /// Current buffers; empty when the last build failed.
    #[wasm_bindgen]
    pub fn get_geometry(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(self.shape.geometry())
            .map_err(|err| JsError::new(&err.to_string()).into())
    }

    /// Counters, errors and warnings of the last build or update.
    #[wasm_bindgen]
    pub fn get_diagnostics(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.diagnostics_export())
            .map_err(|err| JsError::new(&err.to_string()).into())
    }
}

impl ShapeHandle {
    fn from_source(source: GeometrySource) -> Self {
        let mut reporter = HostReporter::default();
        let shape = ShapeGeometry::new(source, &mut reporter);
        Self { shape, reporter }
    }

    fn apply(&mut self, source: GeometrySource, changes: ChangeFlags) {
        self.reporter = HostReporter::default();
        self.shape.update(source, changes, &mut self.reporter);
    }

    fn diagnostics_export(&self) -> DiagnosticsExport<'_> {
        DiagnosticsExport::new(
            self.shape.source().kind(),
            self.shape.diagnostics(),
            &self.reporter.collected,
        )
    }
}

fn to_js_error<E: fmt::Display>(error: E) -> JsValue {
    js_error(&error.to_string())
}

fn js_error(message: &str) -> JsValue {
    #[cfg(target_arch = "wasm32")]
    {
        JsError::new(message).into()
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = message;
        JsValue::NULL
    }
}

#[cfg(test)]
mod tests {
    use super::{ShapeHandle, change_flags};
    use crate::geom::{ChangeFlags, Extrusion, GeometrySource, HeightField};

    #[test]
    fn change_flags_drop_unknown_bits() {
        assert_eq!(change_flags(0), ChangeFlags::empty());
        assert_eq!(change_flags(1 | 4), ChangeFlags::COORDS | ChangeFlags::NORMALS);
        assert_eq!(change_flags(u32::MAX), ChangeFlags::ALL);
    }

    #[test]
    fn handle_reports_only_the_last_build() {
        let broken = GeometrySource::Extrusion(Extrusion {
            spine: vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
            ..Extrusion::default()
        });
        let mut handle = ShapeHandle::from_source(broken);
        assert_eq!(handle.kind(), "extrusion");
        let export = handle.diagnostics_export();
        assert_eq!(export.errors.len(), 1);
        assert_eq!(export.vertex_count, 0);

        handle.apply(
            GeometrySource::HeightField(HeightField::flat(3, 3)),
            ChangeFlags::COORDS,
        );
        let export = handle.diagnostics_export();
        assert_eq!(export.kind, "heightField");
        assert!(export.errors.is_empty());
        assert_eq!(export.vertex_count, 12);
        assert!(!export.patched);
    }

    #[test]
    fn static_handle_rebuilds_cleanly() {
        let mut handle = ShapeHandle::from_source(GeometrySource::HeightField(HeightField {
            heights: vec![0.0, 0.0, 0.0, 0.0],
            ..HeightField::flat(2, 2)
        }));
        assert_eq!(handle.kind(), "heightField");
        assert_eq!(handle.diagnostics_export().triangle_count, 2);

        handle.set_static(true);
        handle.rebuild();
        let export = handle.diagnostics_export();
        assert_eq!(export.triangle_count, 2);
        assert!(export.errors.is_empty() && export.warnings.is_empty());
    }
}
