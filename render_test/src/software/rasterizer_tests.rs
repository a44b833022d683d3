//! Unit tests for rasterizer.rs

use crate::software::rasterizer::*;
use glam::{Vec2, Vec4};

fn vertex(x: f32, y: f32, w: f32, varyings: Vec<Vec4>) -> ClipVertex {
    ClipVertex {
        position: Vec4::new(x * w, y * w, 0.0, w),
        varyings,
    }
}

fn coverage(width: u32, height: u32, triangles: &[[ClipVertex; 3]]) -> Vec<u32> {
    let mut target = ColorTarget::new(width, height);
    let mut counts = vec![0u32; (width * height) as usize];
    for triangle in triangles {
        rasterize_triangle(&mut target, [&triangle[0], &triangle[1], &triangle[2]], |p, _| {
            counts[p.y as usize * width as usize + p.x as usize] += 1;
            Vec4::ONE
        });
    }
    counts
}

// ============================================================================
// COLOR TARGET
// ============================================================================

#[test]
fn test_quantize_clamps_and_rounds() {
    assert_eq!(quantize(Vec4::new(0.0, 1.0, 0.5, 2.0)), [0, 255, 128, 255]);
    assert_eq!(quantize(Vec4::new(-1.0, 0.2, 0.0, 1.0)), [0, 51, 0, 255]);
}

#[test]
fn test_clear_fills_every_pixel() {
    let mut target = ColorTarget::new(3, 2);
    target.clear([0.0, 0.0, 1.0, 1.0]);
    assert_eq!(target.pixels().len(), 3 * 2 * 4);
    assert!(target.pixels().chunks_exact(4).all(|p| p == [0, 0, 255, 255]));
    assert_eq!(target.pixel(2, 1), Some([0, 0, 255, 255]));
    assert_eq!(target.pixel(3, 0), None);
}

// ============================================================================
// COVERAGE
// ============================================================================

#[test]
fn test_triangle_covers_center_not_corners() {
    let mut target = ColorTarget::new(8, 8);
    target.clear([0.0, 0.0, 0.0, 1.0]);
    let a = vertex(-0.5, -0.5, 1.0, vec![]);
    let b = vertex(0.5, -0.5, 1.0, vec![]);
    let c = vertex(0.0, 0.5, 1.0, vec![]);
    let written = rasterize_triangle(&mut target, [&a, &b, &c], |_, _| Vec4::new(1.0, 0.0, 0.0, 1.0));

    assert!(written > 0);
    assert_eq!(target.pixel(3, 3), Some([255, 0, 0, 255]));
    assert_eq!(target.pixel(0, 0), Some([0, 0, 0, 255]));
    assert_eq!(target.pixel(7, 7), Some([0, 0, 0, 255]));
}

#[test]
fn test_ndc_y_points_up() {
    // Triangle in the upper half of NDC lands in the top rows
    let counts = coverage(
        4,
        4,
        &[[vertex(-1.0, 0.0, 1.0, vec![]), vertex(1.0, 0.0, 1.0, vec![]), vertex(-1.0, 1.0, 1.0, vec![])]],
    );
    assert!(counts[..8].iter().any(|c| *c > 0));
    assert!(counts[8..].iter().all(|c| *c == 0));
}

#[test]
fn test_shared_edge_pixels_are_written_once() {
    // The quad diagonal passes exactly through pixel centers
    let quad = [
        [vertex(-1.0, -1.0, 1.0, vec![]), vertex(1.0, -1.0, 1.0, vec![]), vertex(1.0, 1.0, 1.0, vec![])],
        [vertex(-1.0, -1.0, 1.0, vec![]), vertex(1.0, 1.0, 1.0, vec![]), vertex(-1.0, 1.0, 1.0, vec![])],
    ];
    let counts = coverage(4, 4, &quad);
    assert!(counts.iter().all(|c| *c == 1), "coverage: {:?}", counts);
}

#[test]
fn test_winding_does_not_matter() {
    let ccw = [vertex(-0.8, -0.8, 1.0, vec![]), vertex(0.8, -0.8, 1.0, vec![]), vertex(0.0, 0.8, 1.0, vec![])];
    let cw = [ccw[0].clone(), ccw[2].clone(), ccw[1].clone()];
    assert_eq!(coverage(16, 16, &[ccw]), coverage(16, 16, &[cw]));
}

#[test]
fn test_degenerate_triangle_is_skipped() {
    let mut target = ColorTarget::new(4, 4);
    let a = vertex(-1.0, -1.0, 1.0, vec![]);
    let b = vertex(1.0, 1.0, 1.0, vec![]);
    let c = vertex(0.0, 0.0, 1.0, vec![]);
    assert_eq!(rasterize_triangle(&mut target, [&a, &b, &c], |_, _| Vec4::ONE), 0);
}

// ============================================================================
// CLIPPING
// ============================================================================

fn at_depth(x: f32, y: f32, z: f32, w: f32) -> ClipVertex {
    ClipVertex {
        position: Vec4::new(x, y, z, w),
        varyings: vec![],
    }
}

#[test]
fn test_depth_beyond_far_plane_is_clipped() {
    let mut target = ColorTarget::new(16, 16);
    let a = at_depth(-1.0, -1.0, 2.0, 1.0);
    let b = at_depth(3.0, -1.0, 2.0, 1.0);
    let c = at_depth(-1.0, 3.0, 2.0, 1.0);
    assert_eq!(rasterize_triangle(&mut target, [&a, &b, &c], |_, _| Vec4::ONE), 0);
}

#[test]
fn test_depth_in_front_of_near_plane_is_clipped() {
    let mut target = ColorTarget::new(16, 16);
    let a = at_depth(-1.0, -1.0, -0.5, 1.0);
    let b = at_depth(3.0, -1.0, -0.5, 1.0);
    let c = at_depth(-1.0, 3.0, -0.5, 1.0);
    assert_eq!(rasterize_triangle(&mut target, [&a, &b, &c], |_, _| Vec4::ONE), 0);
}

#[test]
fn test_full_screen_triangle_inside_depth_range_covers_target() {
    let mut target = ColorTarget::new(16, 16);
    let a = at_depth(-1.0, -1.0, 0.5, 1.0);
    let b = at_depth(3.0, -1.0, 0.5, 1.0);
    let c = at_depth(-1.0, 3.0, 0.5, 1.0);
    assert_eq!(rasterize_triangle(&mut target, [&a, &b, &c], |_, _| Vec4::ONE), 256);
}

#[test]
fn test_vertex_behind_eye_draws_visible_part() {
    // c has w < 0; only the part with z <= w survives, i.e. NDC y in [-0.5, -0.25]
    let mut target = ColorTarget::new(16, 16);
    let a = at_depth(-0.5, -0.5, 0.5, 1.0);
    let b = at_depth(0.5, -0.5, 0.5, 1.0);
    let c = at_depth(0.0, 0.5, 0.25, -0.5);
    let mut rows = Vec::new();
    let written = rasterize_triangle(&mut target, [&a, &b, &c], |p, _| {
        rows.push(p.y);
        Vec4::ONE
    });
    assert!(written > 0);
    assert!(rows.iter().all(|&y| (10.0..=12.0).contains(&y)));
}

#[test]
fn test_clip_triangle_keeps_inside_triangle_unchanged() {
    let a = at_depth(-0.5, -0.5, 0.5, 1.0);
    let b = at_depth(0.5, -0.5, 0.5, 1.0);
    let c = at_depth(0.0, 0.5, 0.5, 1.0);
    let polygon = clip_triangle([&a, &b, &c]);
    assert_eq!(polygon, vec![a, b, c]);
}

#[test]
fn test_clip_triangle_interpolates_varyings_on_new_vertices() {
    let a = ClipVertex {
        position: Vec4::new(0.0, 0.0, 0.5, 1.0),
        varyings: vec![Vec4::ZERO],
    };
    let b = ClipVertex {
        position: Vec4::new(0.0, 0.0, 1.5, 1.0),
        varyings: vec![Vec4::ONE],
    };
    let c = ClipVertex {
        position: Vec4::new(0.5, 0.5, 0.5, 1.0),
        varyings: vec![Vec4::ZERO],
    };
    let polygon = clip_triangle([&a, &b, &c]);
    // a-b crosses the far plane at its midpoint
    let crossing = polygon
        .iter()
        .find(|v| (v.position.z - 1.0).abs() < 1e-6 && v.position.x == 0.0)
        .expect("far plane crossing on a-b");
    assert!((crossing.varyings[0] - Vec4::splat(0.5)).abs().max_element() < 1e-6);
}

// ============================================================================
// INTERPOLATION
// ============================================================================

#[test]
fn test_barycentric_weights_sum_to_one() {
    let mut target = ColorTarget::new(16, 16);
    let a = vertex(-0.9, -0.9, 1.0, vec![Vec4::new(1.0, 0.0, 0.0, 1.0)]);
    let b = vertex(0.9, -0.9, 1.0, vec![Vec4::new(0.0, 1.0, 0.0, 1.0)]);
    let c = vertex(0.0, 0.9, 1.0, vec![Vec4::new(0.0, 0.0, 1.0, 1.0)]);
    let written = rasterize_triangle(&mut target, [&a, &b, &c], |_, varyings| {
        let v = varyings[0];
        assert!((v.x + v.y + v.z - 1.0).abs() < 1e-4);
        assert!((v.w - 1.0).abs() < 1e-5);
        v
    });
    assert!(written > 0);
}

#[test]
fn test_uniform_w_scale_gives_identical_output() {
    let colors = [Vec4::new(1.0, 0.0, 0.0, 1.0), Vec4::new(0.0, 1.0, 0.0, 1.0), Vec4::new(0.0, 0.0, 1.0, 1.0)];
    let render = |w: f32| {
        let mut target = ColorTarget::new(16, 16);
        let a = vertex(-0.9, -0.9, w, vec![colors[0]]);
        let b = vertex(0.9, -0.9, w, vec![colors[1]]);
        let c = vertex(0.0, 0.9, w, vec![colors[2]]);
        rasterize_triangle(&mut target, [&a, &b, &c], |_, v| v[0]);
        target
    };
    assert_eq!(render(1.0), render(4.0));
}

#[test]
fn test_perspective_weights_favor_near_vertex() {
    // Vertex a is much closer (small w) so its varying dominates at the screen centroid
    let mut target = ColorTarget::new(32, 32);
    let a = vertex(-0.9, -0.9, 0.25, vec![Vec4::new(1.0, 0.0, 0.0, 0.0)]);
    let b = vertex(0.9, -0.9, 4.0, vec![Vec4::new(0.0, 1.0, 0.0, 0.0)]);
    let c = vertex(0.0, 0.9, 4.0, vec![Vec4::new(0.0, 0.0, 1.0, 0.0)]);
    let centroid = Vec2::new(16.0, 20.8);
    let mut sampled = None;
    rasterize_triangle(&mut target, [&a, &b, &c], |p, v| {
        if (p - centroid).length() < 1.0 {
            sampled = Some(v[0]);
        }
        v[0]
    });
    let v = sampled.expect("centroid pixel covered");
    assert!(v.x > v.y && v.x > v.z);
}
