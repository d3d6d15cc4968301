use x3d_geom::geom::{
    AttributeArray, ChangeFlags, CollectingReporter, Extrusion, GeometryData, GeometrySource,
    GeometryType, HeightField, IndexedFaceSet, ShapeGeometry,
};

fn build(source: &GeometrySource) -> (GeometryData, CollectingReporter) {
    let mut reporter = CollectingReporter::default();
    let data = source.build(&mut reporter);
    (data, reporter)
}

fn mesh_area(data: &GeometryData) -> f64 {
    let p = |i: u32| {
        let [x, y, z] = data.position(i as usize).expect("index in range");
        [f64::from(x), f64::from(y), f64::from(z)]
    };
    data.triangles()
        .into_iter()
        .map(|[a, b, c]| {
            let (a, b, c) = (p(a), p(b), p(c));
            let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
            let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
            let n = [
                u[1] * v[2] - u[2] * v[1],
                u[2] * v[0] - u[0] * v[2],
                u[0] * v[1] - u[1] * v[0],
            ];
            (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt() / 2.0
        })
        .sum()
}

fn extrusion_along(spine: &[f32]) -> GeometrySource {
    GeometrySource::Extrusion(Extrusion {
        spine: spine.to_vec(),
        ..Extrusion::default()
    })
}

#[test]
fn tilted_elevation_grid_covers_its_area() {
    let source = GeometrySource::HeightField(HeightField {
        x_dimension: 3,
        z_dimension: 2,
        x_spacing: 2.0,
        heights: vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
        ..HeightField::default()
    });
    let (data, reporter) = build(&source);
    assert!(reporter.is_empty());
    assert_eq!(data.geometry_type, GeometryType::TriangleStrips);
    assert_eq!(data.validate(), Ok(()));
    // two 2 x 1 cells tilted up by one unit over a depth of one
    assert!((mesh_area(&data) - 4.0 * 2f64.sqrt()).abs() < 1e-5);
}

#[test]
fn grid_modes_cover_the_same_surface() {
    // planar cells, so the split diagonal does not change the area
    let field = HeightField {
        x_dimension: 4,
        z_dimension: 3,
        heights: vec![0.0, 1.0, 2.0, 3.0, 2.0, 3.0, 4.0, 5.0, 4.0, 5.0, 6.0, 7.0],
        ..HeightField::default()
    };
    let faceted = HeightField {
        normal_per_vertex: false,
        ..field.clone()
    };
    let (a, _) = build(&GeometrySource::HeightField(field));
    let (b, _) = build(&GeometrySource::HeightField(faceted));
    assert_eq!(a.geometry_type, GeometryType::TriangleStrips);
    assert_eq!(b.geometry_type, GeometryType::Quads);
    assert_eq!(a.triangle_count(), b.triangle_count());
    assert!((mesh_area(&a) - mesh_area(&b)).abs() < 1e-5);
}

#[test]
fn default_extrusion_is_a_closed_box() {
    let (data, reporter) = build(&GeometrySource::Extrusion(Extrusion::default()));
    assert!(reporter.is_empty());
    assert_eq!(data.triangle_count(), 12);
    // four 2 x 1 sides and two 2 x 2 caps
    assert!((mesh_area(&data) - 16.0).abs() < 1e-5);
    assert_eq!(data.validate(), Ok(()));
}

#[test]
fn revolved_extrusion_reports_an_error() {
    let (data, reporter) = build(&extrusion_along(&[0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0]));
    assert!(data.is_empty());
    assert_eq!(reporter.errors.len(), 1);
}

#[test]
fn face_set_with_per_face_rgba_colors() {
    let source = GeometrySource::IndexedFaceSet(IndexedFaceSet {
        coord: vec![
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0,
        ],
        coord_index: vec![0, 1, 2, 3, -1, 4, 5, 6, 7, -1],
        color: Some(AttributeArray::new(4, vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.5])),
        color_per_vertex: false,
        ..IndexedFaceSet::default()
    });
    let (data, reporter) = build(&source);
    assert!(reporter.is_empty());
    assert_eq!(data.vertex_count, 12);
    let colors = data.colors.as_ref().expect("colors kept");
    assert_eq!(colors.components, 4);
    assert_eq!(colors.get(0), Some(&[1.0, 0.0, 0.0, 1.0][..]));
    assert_eq!(colors.get(11), Some(&[0.0, 0.0, 1.0, 0.5][..]));
    assert!((mesh_area(&data) - 2.0).abs() < 1e-6);
}

#[test]
fn shape_updates_follow_the_source() {
    let mut reporter = CollectingReporter::default();
    let spine = [0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0];
    let mut shape = ShapeGeometry::new(extrusion_along(&spine), &mut reporter);
    assert_eq!(shape.geometry().triangle_count(), 2 * 4 * 2 + 4);

    let wider = GeometrySource::Extrusion(Extrusion {
        spine: spine.to_vec(),
        scale: vec![1.0, 1.0, 2.0, 2.0, 1.0, 1.0],
        ..Extrusion::default()
    });
    shape.update(wider.clone(), ChangeFlags::COORDS, &mut reporter);
    assert!(shape.diagnostics().patched);
    assert_eq!(shape.geometry(), &wider.build(&mut reporter));

    let uncapped = GeometrySource::Extrusion(Extrusion {
        begin_cap: false,
        end_cap: false,
        ..Extrusion::default()
    });
    shape.update(uncapped, ChangeFlags::SETTINGS, &mut reporter);
    assert!(!shape.diagnostics().patched);
    assert_eq!(shape.geometry().triangle_count(), 8);
    assert!(reporter.errors.is_empty());
}
