use std::f64::consts::PI;

use approx::assert_relative_eq;

use crate::geom::{
    AttributeArray, AttributeError, ChangeFlags, GeometryData, GeometryType, IndexedFaceSet,
    IndexedMeshTessellator, Point3, SourceCorner, TessellationError, polygon_normal, tessellate,
};

fn unit_quad() -> IndexedFaceSet {
    IndexedFaceSet {
        coord: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
        coord_index: vec![0, 1, 2, 3, -1],
        ..IndexedFaceSet::default()
    }
}

/// Two unit squares meeting at a right angle along the X axis: one in the
/// z = 0 plane facing +Z, one in the y = 0 plane facing -Y.
fn folded_pair(crease_angle: f32) -> IndexedFaceSet {
    IndexedFaceSet {
        coord: vec![
            0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            1.0, 1.0, 0.0, //
            0.0, 1.0, 0.0, //
            1.0, 0.0, -1.0, //
            0.0, 0.0, -1.0,
        ],
        coord_index: vec![0, 1, 2, 3, -1, 1, 0, 5, 4, -1],
        crease_angle,
        ..IndexedFaceSet::default()
    }
}

fn triangle_normal(data: &GeometryData, t: [u32; 3]) -> [f64; 3] {
    let points: Vec<Point3> = t
        .iter()
        .map(|&i| Point3::from_f32(data.position(i as usize).unwrap()))
        .collect();
    let n = polygon_normal(&points);
    [n.x, n.y, n.z]
}

fn assert_normal(data: &GeometryData, vertex: usize, expected: [f32; 3]) {
    let n = data.normal(vertex).unwrap();
    for (a, b) in n.iter().zip(expected) {
        assert_relative_eq!(*a, b, epsilon = 1e-6);
    }
}

#[test]
fn quad_becomes_two_triangles() {
    let (data, diag) = tessellate(&unit_quad()).unwrap();
    assert_eq!(data.geometry_type, GeometryType::Triangles);
    assert_eq!(data.vertex_count, 6);
    assert_eq!(data.triangle_count(), 2);
    assert_eq!(diag.polygon_count, 1);
    assert_eq!(diag.triangle_count, 2);
    assert!(diag.is_clean());
    assert_eq!(data.validate(), Ok(()));

    assert_eq!(data.position(1), Some([1.0, 0.0, 0.0]));
    assert_eq!(data.position(5), Some([0.0, 1.0, 0.0]));
    for i in 0..6 {
        assert_eq!(data.normal(i), Some([0.0, 0.0, 1.0]));
    }
}

#[test]
fn quad_without_convex_hint_still_becomes_two_triangles() {
    let input = IndexedFaceSet {
        convex: false,
        ..unit_quad()
    };
    let (data, diag) = tessellate(&input).unwrap();
    assert_eq!(data.triangle_count(), 2);
    assert_eq!(diag.skipped_polygon_count, 0);

    let area: f64 = data
        .triangles()
        .into_iter()
        .map(|[a, b, c]| {
            let p = |i: u32| Point3::from_f32(data.position(i as usize).unwrap());
            (p(b) - p(a)).cross(p(c) - p(a)).length() / 2.0
        })
        .sum();
    assert!((area - 1.0).abs() < 1e-9);
}

#[test]
fn clockwise_faces_flip_winding_and_normals() {
    let input = IndexedFaceSet {
        ccw: false,
        ..unit_quad()
    };
    let (data, _) = tessellate(&input).unwrap();
    assert_eq!(data.position(1), Some([1.0, 1.0, 0.0]));
    for t in data.triangles() {
        assert!(triangle_normal(&data, t)[2] < 0.0);
    }
    for i in 0..data.vertex_count {
        assert_normal(&data, i, [0.0, 0.0, -1.0]);
    }
}

#[test]
fn zero_crease_angle_keeps_faces_flat() {
    let (data, diag) = tessellate(&folded_pair(0.0)).unwrap();
    assert_eq!(data.vertex_count, 12);
    // the four corners on the shared edge
    assert_eq!(diag.split_vertex_count, 4);
    assert_normal(&data, 0, [0.0, 0.0, 1.0]);
    assert_normal(&data, 6, [0.0, -1.0, 0.0]);
    assert_normal(&data, 7, [0.0, -1.0, 0.0]);
}

#[test]
fn wide_crease_angle_smooths_the_fold() {
    let half = std::f32::consts::FRAC_1_SQRT_2;
    for crease in [2.0, std::f32::consts::PI] {
        let (data, diag) = tessellate(&folded_pair(crease)).unwrap();
        assert_eq!(diag.split_vertex_count, 0);
        // shared edge corners blend both faces, the rest keep their own
        assert_normal(&data, 0, [0.0, -half, half]);
        assert_normal(&data, 1, [0.0, -half, half]);
        assert_normal(&data, 2, [0.0, 0.0, 1.0]);
        assert_normal(&data, 6, [0.0, -half, half]);
        assert_normal(&data, 8, [0.0, -1.0, 0.0]);
    }
}

#[test]
fn crease_angle_is_clamped() {
    let input = folded_pair(10.0);
    assert_relative_eq!(input.clamped_crease_angle(), PI);
    let input = folded_pair(-1.0);
    assert_eq!(input.clamped_crease_angle(), 0.0);
    let input = folded_pair(f32::NAN);
    assert_eq!(input.clamped_crease_angle(), 0.0);
}

#[test]
fn out_of_range_index_skips_only_that_polygon() {
    let input = IndexedFaceSet {
        coord: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        coord_index: vec![0, 1, 2, -1, 0, 1, 7, -1],
        ..IndexedFaceSet::default()
    };
    let (data, diag) = tessellate(&input).unwrap();
    assert_eq!(diag.polygon_count, 2);
    assert_eq!(diag.skipped_polygon_count, 1);
    assert_eq!(data.triangle_count(), 1);
    assert!(diag.has_warnings());
}

#[test]
fn collapsed_polygons_are_skipped() {
    let input = IndexedFaceSet {
        coord: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        coord_index: vec![0, 1, 2, -1, 0, 0, 3, -1, 0, 1, 3, -1],
        ..IndexedFaceSet::default()
    };
    let (data, diag) = tessellate(&input).unwrap();
    assert_eq!(diag.skipped_polygon_count, 2);
    assert_eq!(data.triangle_count(), 1);
}

#[test]
fn trailing_polygon_without_terminator_counts() {
    let input = IndexedFaceSet {
        coord_index: vec![0, 1, 2],
        ..unit_quad()
    };
    let (data, diag) = tessellate(&input).unwrap();
    assert_eq!(diag.polygon_count, 1);
    assert_eq!(data.triangle_count(), 1);
}

#[test]
fn non_convex_polygon_is_ear_clipped() {
    // L shape starting next to its reflex corner, so a fan would fold over
    let input = IndexedFaceSet {
        coord: vec![
            2.0, 1.0, 0.0, //
            1.0, 1.0, 0.0, //
            1.0, 2.0, 0.0, //
            0.0, 2.0, 0.0, //
            0.0, 0.0, 0.0, //
            2.0, 0.0, 0.0,
        ],
        coord_index: vec![0, 1, 2, 3, 4, 5, -1],
        convex: false,
        ..IndexedFaceSet::default()
    };
    let (data, diag) = tessellate(&input).unwrap();
    assert_eq!(data.triangle_count(), 4);
    assert_eq!(diag.fallback_triangulation_count, 0);
    let mut area = 0.0;
    for t in data.triangles() {
        let n = triangle_normal(&data, t);
        assert!(n[2] > 0.0, "folded triangle {t:?}");
        area += n[2] / 2.0;
    }
    assert_relative_eq!(area, 3.0, epsilon = 1e-9);

    let fanned = IndexedFaceSet {
        convex: true,
        ..input
    };
    let (data, _) = tessellate(&fanned).unwrap();
    assert!(
        data.triangles()
            .into_iter()
            .any(|t| triangle_normal(&data, t)[2] < 0.0)
    );
}

#[test]
fn per_face_colors_follow_polygon_order() {
    let input = IndexedFaceSet {
        coord_index: vec![0, 1, 2, -1, 0, 2, 3, -1],
        color: Some(AttributeArray::new(3, vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0])),
        color_per_vertex: false,
        ..unit_quad()
    };
    let (data, diag) = tessellate(&input).unwrap();
    assert!(diag.is_clean());
    let colors = data.colors.as_ref().unwrap();
    for v in 0..3 {
        assert_eq!(colors.get(v), Some(&[1.0, 0.0, 0.0][..]));
        assert_eq!(colors.get(3 + v), Some(&[0.0, 0.0, 1.0][..]));
    }
}

#[test]
fn color_index_selects_per_face_entries() {
    let input = IndexedFaceSet {
        coord_index: vec![0, 1, 2, -1, 0, 2, 3, -1],
        color: Some(AttributeArray::new(4, vec![1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.5])),
        color_index: vec![1, 0],
        color_per_vertex: false,
        ..unit_quad()
    };
    let (data, _) = tessellate(&input).unwrap();
    let colors = data.colors.as_ref().unwrap();
    assert_eq!(colors.components, 4);
    assert_eq!(colors.get(0), Some(&[0.0, 1.0, 0.0, 0.5][..]));
    assert_eq!(colors.get(5), Some(&[1.0, 0.0, 0.0, 1.0][..]));
}

#[test]
fn short_color_list_is_dropped_with_warning() {
    let input = IndexedFaceSet {
        color: Some(AttributeArray::new(3, vec![1.0, 1.0, 1.0])),
        ..unit_quad()
    };
    let (data, diag) = tessellate(&input).unwrap();
    assert!(data.colors.is_none());
    assert!(diag.has_warnings());
    assert_eq!(data.triangle_count(), 2);
}

#[test]
fn bad_color_components_are_a_configuration_error() {
    let input = IndexedFaceSet {
        color: Some(AttributeArray::new(2, vec![1.0; 8])),
        ..unit_quad()
    };
    assert_eq!(
        tessellate(&input),
        Err(TessellationError::Attribute(AttributeError::InvalidColorComponents(2)))
    );
}

#[test]
fn separate_normal_and_tex_coord_indices() {
    let input = IndexedFaceSet {
        normal: vec![0.0, 0.0, 1.0, 0.0, 1.0, 0.0],
        normal_index: vec![1, 1, 1, 1, -1],
        tex_coords: vec![AttributeArray::new(2, vec![0.0, 0.0, 0.25, 0.25, 0.5, 0.5, 0.75, 0.75])],
        tex_coord_index: vec![3, 2, 1, 0, -1],
        ..unit_quad()
    };
    let (data, diag) = tessellate(&input).unwrap();
    assert!(diag.is_clean());
    for i in 0..data.vertex_count {
        assert_eq!(data.normal(i), Some([0.0, 1.0, 0.0]));
    }
    let tex = &data.tex_coords[0];
    // output vertex 1 is coordIndex slot 1
    assert_eq!(tex.get(1), Some(&[0.5, 0.5][..]));
    assert_eq!(tex.get(5), Some(&[0.0, 0.0][..]));
}

#[test]
fn generated_tex_coords_follow_the_bounding_box() {
    let (data, _) = tessellate(&unit_quad()).unwrap();
    let tex = &data.tex_coords[0];
    assert_eq!(tex.element_count(), 6);
    assert_eq!(tex.get(0), Some(&[0.0, 0.0][..]));
    assert_eq!(tex.get(2), Some(&[1.0, 1.0][..]));
}

#[test]
fn source_corners_map_every_output_vertex() {
    let mut tessellator = IndexedMeshTessellator::new();
    let (data, _) = tessellator.generate(&folded_pair(0.0)).unwrap();
    let corners = tessellator.source_corners();
    assert_eq!(corners.len(), data.vertex_count);
    assert_eq!(
        corners[6],
        SourceCorner {
            coord: 1,
            slot: 5,
            polygon: 1
        }
    );

    tessellator.release_scratch();
    assert!(!tessellator.has_scratch());
    assert!(tessellator.source_corners().is_empty());
}

#[test]
fn color_change_patches_without_retessellating() {
    let mut tessellator = IndexedMeshTessellator::new();
    let mut input = IndexedFaceSet {
        color: Some(AttributeArray::new(3, vec![0.0; 12])),
        ..unit_quad()
    };
    let (mut data, _) = tessellator.generate(&input).unwrap();

    input.color = Some(AttributeArray::new(3, vec![1.0; 12]));
    let diag = tessellator.update(&input, ChangeFlags::COLORS, &mut data).unwrap();
    assert!(diag.patched);
    assert_eq!(data.colors.as_ref().unwrap().values, vec![1.0; 18]);

    let (fresh, _) = tessellate(&input).unwrap();
    assert_eq!(data, fresh);
}

#[test]
fn moved_coordinates_patch_positions_and_normals() {
    let mut tessellator = IndexedMeshTessellator::new();
    let mut input = folded_pair(2.0);
    let (mut data, _) = tessellator.generate(&input).unwrap();

    // lift the far edge of the first square
    input.coord[8] = 0.5;
    input.coord[11] = 0.5;
    let diag = tessellator.update(&input, ChangeFlags::COORDS, &mut data).unwrap();
    assert!(diag.patched);
    let (fresh, _) = tessellate(&input).unwrap();
    assert_eq!(data, fresh);
}

#[test]
fn connectivity_change_retessellates() {
    let mut tessellator = IndexedMeshTessellator::new();
    let mut input = unit_quad();
    let (mut data, _) = tessellator.generate(&input).unwrap();

    input.coord_index = vec![0, 1, 2, -1];
    let diag = tessellator.update(&input, ChangeFlags::INDICES, &mut data).unwrap();
    assert!(!diag.patched);
    assert_eq!(data.vertex_count, 3);

    // a patch that would read past the new coordinate list rebuilds too
    input.coord.truncate(6);
    input.coord_index = vec![0, 1, 2, -1];
    let diag = tessellator.update(&input, ChangeFlags::COORDS, &mut data).unwrap();
    assert!(!diag.patched);
    assert!(data.is_empty());
}

#[test]
fn tessellation_is_deterministic() {
    let input = IndexedFaceSet {
        convex: false,
        crease_angle: 0.7,
        ..folded_pair(0.7)
    };
    let mut tessellator = IndexedMeshTessellator::new();
    let (a, _) = tessellator.generate(&input).unwrap();
    let (b, _) = tessellator.generate(&input).unwrap();
    assert_eq!(a, b);
    assert_eq!(a, tessellate(&input).unwrap().0);
}
