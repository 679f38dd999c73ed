//! Point sets used to place particles when a scene is set up.

use rand::Rng;

use crate::{
    floating_type_mod::{FT, PI, TAU},
    vec3f, V3,
};

/// Vector with every component drawn uniformly from `[min, max)`.
pub fn random_vec3(rng: &mut impl Rng, min: FT, max: FT) -> V3 {
    if min >= max {
        return vec3f(min, min, min);
    }
    vec3f(rng.gen_range(min..max), rng.gen_range(min..max), rng.gen_range(min..max))
}

/// Uniformly distributed points inside a ball (rejection sampling).
pub fn random_points_in_sphere(rng: &mut impl Rng, count: usize, radius: FT) -> Vec<V3> {
    let mut points = Vec::with_capacity(count);
    while points.len() < count {
        let p = random_vec3(rng, -1., 1.);
        if p.norm_squared() <= 1. {
            points.push(p * radius);
        }
    }
    points
}

/// Points on a sphere surface from randomly drawn spherical angles.
///
/// Points cluster towards the poles since the polar angle is drawn uniformly.
pub fn sphere_surface_points(rng: &mut impl Rng, count: usize, radius: FT) -> Vec<V3> {
    (0..count)
        .map(|_| {
            let theta = rng.gen_range(0. ..TAU);
            let phi = rng.gen_range(0. ..PI);
            vec3f(
                radius * phi.sin() * theta.cos(),
                radius * phi.sin() * theta.sin(),
                radius * phi.cos(),
            )
        })
        .collect()
}

/// The 12 vertices of an icosahedron, scaled so that (0, b, a) has length `radius`
/// for b = 1/golden ratio and a = 1.
pub fn icosphere_points(radius: FT) -> Vec<V3> {
    let phi: FT = (1. + (5. as FT).sqrt()) * 0.5;
    let a: FT = 1.;
    let b: FT = 1. / phi;
    let scale = radius / (a * a + b * b).sqrt();

    [
        vec3f(0., b, -a),
        vec3f(b, a, 0.),
        vec3f(-b, a, 0.),
        vec3f(0., b, a),
        vec3f(0., -b, a),
        vec3f(-a, 0., b),
        vec3f(0., -b, -a),
        vec3f(a, 0., -b),
        vec3f(a, 0., b),
        vec3f(-a, 0., -b),
        vec3f(b, -a, 0.),
        vec3f(-b, -a, 0.),
    ]
    .iter()
    .map(|p| p * scale)
    .collect()
}

/// Points of a cube sphere: a `points_per_row` x `points_per_row` grid on every
/// cube face, projected onto the sphere. Produces `6 * points_per_row^2` points.
pub fn cube_sphere_points(points_per_row: usize, radius: FT) -> Vec<V3> {
    let mut points = Vec::with_capacity(6 * points_per_row * points_per_row);
    if points_per_row == 0 {
        return points;
    }

    // a single row degenerates to the face centers
    let angle_step = |i: usize| {
        if points_per_row == 1 {
            0.
        } else {
            (90. * i as FT / (points_per_row - 1) as FT).to_radians()
        }
    };
    let quarter = (45. as FT).to_radians();

    for i in 0..points_per_row {
        // latitudinal plane rotating from 45 to -45 degrees around z
        let a2 = if points_per_row == 1 { 0. } else { quarter - angle_step(i) };
        let n2 = vec3f(-a2.sin(), a2.cos(), 0.);

        for j in 0..points_per_row {
            // longitudinal plane rotating from -45 to 45 degrees around y
            let a1 = if points_per_row == 1 { 0. } else { -quarter + angle_step(j) };
            let n1 = vec3f(-a1.sin(), 0., -a1.cos());

            let v = n1.cross(&n2).normalize();

            points.push(vec3f(v.x, v.y, v.z) * radius);
            points.push(vec3f(-v.x, v.y, -v.z) * radius);
            points.push(vec3f(-v.z, v.x, -v.y) * radius);
            points.push(vec3f(v.z, -v.x, v.y) * radius);
            points.push(vec3f(v.z, v.y, -v.x) * radius);
            points.push(vec3f(-v.z, v.y, v.x) * radius);
        }
    }

    points
}
