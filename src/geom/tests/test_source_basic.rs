use crate::geom::{
    AttributeArray, ChangeFlags, CollectingReporter, Extrusion, GeometrySource, GeometryType,
    HeightField, IndexedFaceSet, LogReporter, ShapeGeometry,
};

fn ramp_field() -> GeometrySource {
    GeometrySource::HeightField(HeightField {
        x_dimension: 3,
        z_dimension: 3,
        heights: vec![0.0, 0.5, 1.0, 0.5, 1.0, 1.5, 1.0, 1.5, 2.0],
        ..HeightField::default()
    })
}

fn revolved_extrusion() -> GeometrySource {
    GeometrySource::Extrusion(Extrusion {
        spine: vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
        ..Extrusion::default()
    })
}

#[test]
fn one_shot_build_forwards_warnings() {
    let mut reporter = CollectingReporter::default();
    let source = GeometrySource::IndexedFaceSet(IndexedFaceSet {
        coord: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        coord_index: vec![0, 1, 2, -1],
        color: Some(AttributeArray::new(3, vec![1.0, 0.0, 0.0])),
        ..IndexedFaceSet::default()
    });
    let data = source.build(&mut reporter);
    assert_eq!(data.triangle_count(), 1);
    assert!(reporter.errors.is_empty());
    assert_eq!(reporter.warnings.len(), 1);
}

#[test]
fn configuration_error_yields_empty_geometry() {
    let mut reporter = CollectingReporter::default();
    let data = revolved_extrusion().build(&mut reporter);
    assert!(data.is_empty());
    assert_eq!(data.geometry_type, GeometryType::Triangles);
    assert_eq!(reporter.errors.len(), 1);
    assert!(reporter.errors[0].starts_with("extrusion:"));
}

#[test]
fn log_reporter_builds_like_any_other_sink() {
    let mut reporter = LogReporter;
    assert!(revolved_extrusion().build(&mut reporter).is_empty());
    assert_eq!(ramp_field().build(&mut reporter).vertex_count, 12);
}

#[test]
fn shape_recovers_after_an_error() {
    let mut reporter = CollectingReporter::default();
    let mut shape = ShapeGeometry::new(revolved_extrusion(), &mut reporter);
    assert!(shape.geometry().is_empty());
    assert!(!shape.has_scratch());
    assert_eq!(reporter.errors.len(), 1);

    let data = shape.update(
        GeometrySource::Extrusion(Extrusion::default()),
        ChangeFlags::COORDS,
        &mut reporter,
    );
    assert_eq!(data.triangle_count(), 12);
    assert_eq!(reporter.errors.len(), 1);
    assert!(shape.has_scratch());
}

#[test]
fn height_change_patches_shape_buffers() {
    let mut reporter = CollectingReporter::default();
    let mut shape = ShapeGeometry::new(ramp_field(), &mut reporter);
    assert!(!shape.diagnostics().patched);

    let GeometrySource::HeightField(mut field) = ramp_field() else {
        unreachable!()
    };
    field.heights[4] = 3.0;
    let moved = GeometrySource::HeightField(field);
    shape.update(moved.clone(), ChangeFlags::COORDS, &mut reporter);

    assert!(shape.diagnostics().patched);
    assert_eq!(shape.geometry(), &moved.build(&mut reporter));
    assert_eq!(shape.source(), &moved);
    assert!(reporter.is_empty());
}

#[test]
fn empty_change_set_rebuilds() {
    let mut reporter = CollectingReporter::default();
    let mut shape = ShapeGeometry::new(ramp_field(), &mut reporter);
    shape.update(ramp_field(), ChangeFlags::empty(), &mut reporter);
    assert!(!shape.diagnostics().patched);
    assert_eq!(shape.geometry().vertex_count, 12);
}

#[test]
fn static_shapes_drop_scratch_after_each_build() {
    let mut reporter = CollectingReporter::default();
    let mut shape = ShapeGeometry::new(ramp_field(), &mut reporter);
    assert!(shape.has_scratch());

    shape.set_static(true);
    assert!(shape.is_static());
    assert!(!shape.has_scratch());

    shape.update(ramp_field(), ChangeFlags::COORDS, &mut reporter);
    assert!(!shape.diagnostics().patched);
    assert!(!shape.has_scratch());
    assert!(!shape.geometry().is_empty());

    shape.set_static(false);
    shape.rebuild(&mut reporter);
    assert!(shape.has_scratch());
}
