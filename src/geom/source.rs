//! Geometry node descriptions and their retained build state.

use serde::Deserialize;

use super::data::{ChangeFlags, GeometryData, GeometryType};
use super::diagnostics::{BuildDiagnostics, ErrorReporter, GeomError};
use super::elevation::{GridMode, HeightField, HeightFieldGenerator};
use super::extrusion::{Extrusion, ExtrusionGenerator};
use super::tessellation::{IndexedFaceSet, IndexedMeshTessellator};

/// One of the supported geometry nodes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum GeometrySource {
    HeightField(HeightField),
    Extrusion(Extrusion),
    IndexedFaceSet(IndexedFaceSet),
}

impl GeometrySource {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HeightField(_) => "heightField",
            Self::Extrusion(_) => "extrusion",
            Self::IndexedFaceSet(_) => "indexedFaceSet",
        }
    }

    /// Geometry type an empty result is reported with.
    #[must_use]
    pub fn empty_type(&self) -> GeometryType {
        match self {
            Self::HeightField(field) => {
                GridMode::for_flags(field.color_per_vertex, field.normal_per_vertex).geometry_type()
            }
            Self::Extrusion(_) | Self::IndexedFaceSet(_) => GeometryType::Triangles,
        }
    }

    /// One-shot build. Configuration errors go to `reporter` and yield empty
    /// geometry; warnings are forwarded.
    pub fn build(&self, reporter: &mut dyn ErrorReporter) -> GeometryData {
        let mut generator = Generator::for_source(self);
        match generator.generate(self) {
            Ok((data, diagnostics)) => {
                diagnostics.report_warnings(reporter);
                data
            }
            Err(err) => {
                reporter.error(&err);
                GeometryData::empty(self.empty_type())
            }
        }
    }
}

#[derive(Debug)]
enum Generator {
    HeightField(HeightFieldGenerator),
    Extrusion(ExtrusionGenerator),
    IndexedFaceSet(IndexedMeshTessellator),
}

impl Generator {
    fn for_source(source: &GeometrySource) -> Self {
        match source {
            GeometrySource::HeightField(_) => Self::HeightField(HeightFieldGenerator::new()),
            GeometrySource::Extrusion(_) => Self::Extrusion(ExtrusionGenerator::new()),
            GeometrySource::IndexedFaceSet(_) => Self::IndexedFaceSet(IndexedMeshTessellator::new()),
        }
    }

    fn matches(&self, source: &GeometrySource) -> bool {
        matches!(
            (self, source),
            (Self::HeightField(_), GeometrySource::HeightField(_))
                | (Self::Extrusion(_), GeometrySource::Extrusion(_))
                | (Self::IndexedFaceSet(_), GeometrySource::IndexedFaceSet(_))
        )
    }

    fn generate(
        &mut self,
        source: &GeometrySource,
    ) -> Result<(GeometryData, BuildDiagnostics), GeomError> {
        Ok(match (self, source) {
            (Self::HeightField(g), GeometrySource::HeightField(field)) => g.generate(field)?,
            (Self::Extrusion(g), GeometrySource::Extrusion(extrusion)) => g.generate(extrusion)?,
            (Self::IndexedFaceSet(g), GeometrySource::IndexedFaceSet(faces)) => g.generate(faces)?,
            (generator, source) => {
                *generator = Self::for_source(source);
                return generator.generate(source);
            }
        })
    }

    fn update(
        &mut self,
        source: &GeometrySource,
        changes: ChangeFlags,
        data: &mut GeometryData,
    ) -> Result<BuildDiagnostics, GeomError> {
        Ok(match (self, source) {
            (Self::HeightField(g), GeometrySource::HeightField(field)) => {
                g.update(field, changes, data)?
            }
            (Self::Extrusion(g), GeometrySource::Extrusion(extrusion)) => {
                g.update(extrusion, changes, data)?
            }
            (Self::IndexedFaceSet(g), GeometrySource::IndexedFaceSet(faces)) => {
                g.update(faces, changes, data)?
            }
            (generator, source) => {
                let (rebuilt, diagnostics) = generator.generate(source)?;
                *data = rebuilt;
                diagnostics
            }
        })
    }

    fn release_scratch(&mut self) {
        match self {
            Self::HeightField(g) => g.release_scratch(),
            Self::Extrusion(g) => g.release_scratch(),
            Self::IndexedFaceSet(g) => g.release_scratch(),
        }
    }

    fn has_scratch(&self) -> bool {
        match self {
            Self::HeightField(g) => g.has_scratch(),
            Self::Extrusion(g) => g.has_scratch(),
            Self::IndexedFaceSet(g) => g.has_scratch(),
        }
    }
}

/// A geometry node with its current render buffers.
///
/// Field changes come in through [`update`](Self::update) together with
/// flags naming what changed; attribute-only changes patch the buffers in
/// place when the generator still holds the layout of the last build.
#[derive(Debug)]
pub struct ShapeGeometry {
    source: GeometrySource,
    generator: Generator,
    data: GeometryData,
    diagnostics: BuildDiagnostics,
    is_static: bool,
}

impl ShapeGeometry {
    pub fn new(source: GeometrySource, reporter: &mut dyn ErrorReporter) -> Self {
        let generator = Generator::for_source(&source);
        let mut shape = Self {
            data: GeometryData::empty(source.empty_type()),
            source,
            generator,
            diagnostics: BuildDiagnostics::new(),
            is_static: false,
        };
        shape.rebuild(reporter);
        shape
    }

    /// Replaces the source and brings the buffers up to date.
    pub fn update(
        &mut self,
        source: GeometrySource,
        changes: ChangeFlags,
        reporter: &mut dyn ErrorReporter,
    ) -> &GeometryData {
        let same_kind = self.generator.matches(&source);
        self.source = source;
        if !same_kind || changes.is_empty() {
            if !same_kind {
                self.generator = Generator::for_source(&self.source);
            }
            self.rebuild(reporter);
            return &self.data;
        }

        let result = self.generator.update(&self.source, changes, &mut self.data);
        self.finish(result, reporter);
        &self.data
    }

    /// Full rebuild from the current source.
    pub fn rebuild(&mut self, reporter: &mut dyn ErrorReporter) -> &GeometryData {
        let result = self.generator.generate(&self.source).map(|(data, diagnostics)| {
            self.data = data;
            diagnostics
        });
        self.finish(result, reporter);
        &self.data
    }

    #[must_use]
    pub fn geometry(&self) -> &GeometryData {
        &self.data
    }

    #[must_use]
    pub fn diagnostics(&self) -> &BuildDiagnostics {
        &self.diagnostics
    }

    #[must_use]
    pub fn source(&self) -> &GeometrySource {
        &self.source
    }

    /// Static shapes do not expect further changes and drop generator
    /// scratch after every build.
    pub fn set_static(&mut self, is_static: bool) {
        self.is_static = is_static;
        if is_static {
            self.generator.release_scratch();
        }
    }

    #[must_use]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    #[must_use]
    pub fn has_scratch(&self) -> bool {
        self.generator.has_scratch()
    }

    fn finish(
        &mut self,
        result: Result<BuildDiagnostics, GeomError>,
        reporter: &mut dyn ErrorReporter,
    ) {
        match result {
            Ok(diagnostics) => {
                diagnostics.report_warnings(reporter);
                self.diagnostics = diagnostics;
                if self.is_static {
                    self.generator.release_scratch();
                }
            }
            Err(err) => {
                reporter.error(&err);
                self.generator.release_scratch();
                self.data = GeometryData::empty(self.source.empty_type());
                self.diagnostics = BuildDiagnostics::new();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::diagnostics::CollectingReporter;

    #[test]
    fn kind_names_match_serde_tags() {
        let source = GeometrySource::Extrusion(Extrusion::default());
        assert_eq!(source.kind(), "extrusion");
        let source = GeometrySource::HeightField(HeightField::default());
        assert_eq!(source.empty_type(), GeometryType::TriangleStrips);
    }

    #[test]
    fn switching_kind_replaces_generator() {
        let mut reporter = CollectingReporter::default();
        let mut shape = ShapeGeometry::new(
            GeometrySource::HeightField(HeightField::flat(2, 2)),
            &mut reporter,
        );
        assert_eq!(shape.geometry().geometry_type, GeometryType::TriangleStrips);

        shape.update(
            GeometrySource::Extrusion(Extrusion::default()),
            ChangeFlags::COORDS,
            &mut reporter,
        );
        assert_eq!(shape.geometry().geometry_type, GeometryType::Triangles);
        assert!(!shape.geometry().is_empty());
        assert!(reporter.errors.is_empty());
    }
}
