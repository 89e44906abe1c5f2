use navtile_geom::Vec3;

fn approx_eq(a: f32, b: f32, eps: f32) -> bool {
    (a - b).abs() <= eps
}

fn vec3_approx_eq(a: Vec3, b: Vec3, eps: f32) -> bool {
    approx_eq(a.x, b.x, eps) && approx_eq(a.y, b.y, eps) && approx_eq(a.z, b.z, eps)
}

#[test]
fn vec3_cross_of_floor_triangle_points_up() {
    // Counter-clockwise seen from above with z pointing toward the viewer
    let a = Vec3::new(0.0, 0.0, 0.0);
    let b = Vec3::new(0.0, 0.0, 1.0);
    let c = Vec3::new(1.0, 0.0, 0.0);
    let n = (b - a).cross(c - a).normalized();
    assert!(vec3_approx_eq(n, Vec3::UP, 1e-6));
}

#[test]
fn vec3_min_max_componentwise() {
    let a = Vec3::new(1.0, -2.0, 3.0);
    let b = Vec3::new(-1.0, 5.0, 3.5);
    assert_eq!(a.min(b), Vec3::new(-1.0, -2.0, 3.0));
    assert_eq!(a.max(b), Vec3::new(1.0, 5.0, 3.5));
}

#[test]
fn vec3_array_conversions() {
    let v: Vec3 = [1.0, 2.0, 3.0].into();
    assert_eq!(v, Vec3::new(1.0, 2.0, 3.0));
    let arr: [f32; 3] = v.into();
    assert_eq!(arr, [1.0, 2.0, 3.0]);
}

#[test]
fn vec3_dot_length_normalized() {
    let v = Vec3::new(3.0, 4.0, 0.0);
    assert!(approx_eq(v.dot(v), 25.0, 1e-6));
    assert!(approx_eq(v.length(), 5.0, 1e-6));
    assert!(vec3_approx_eq(v.normalized(), Vec3::new(0.6, 0.8, 0.0), 1e-6));

    // Zero vector normalization should be a no-op (not NaN, unchanged)
    assert!(vec3_approx_eq(Vec3::ZERO.normalized(), Vec3::ZERO, 1e-6));
}
