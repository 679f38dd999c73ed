use crate::{floating_type_mod::FT, particles::ParticleStore, ParticleId, V3};

/// Separations below this are treated as coincident particles.
pub const DEGENERATE_DISTANCE: FT = 1.0e-6;

/// Adjustments for a colliding pair. The first particle receives the negated
/// values, the second one receives them as they are.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionResponse {
    pub position_correction: V3,
    pub velocity_impulse: V3,
}

/// Direction from `x1` to `x2`, falls back to +X for coincident particles.
#[inline(always)]
pub fn collision_normal(x1: &V3, x2: &V3, dist: FT) -> V3 {
    if dist > DEGENERATE_DISTANCE {
        (x2 - x1) / dist
    } else {
        V3::new(1., 0., 0.)
    }
}

/// Pushes both particles apart by half of the overlap each and exchanges a
/// restitution scaled impulse along the line of centers.
///
/// The impulse is not restricted to approaching particles, separating pairs
/// that still overlap are pushed apart further.
#[inline(always)]
pub fn collision_response(
    x1: &V3,
    x2: &V3,
    v1: &V3,
    v2: &V3,
    particle_radius: FT,
    dist: FT,
    restitution: FT,
) -> CollisionResponse {
    let overlap = 2. * particle_radius - dist;
    let normal = collision_normal(x1, x2, dist);

    let relative_velocity = v1 - v2;
    let impulse_magnitude = relative_velocity.dot(&normal) * (1. + restitution);

    CollisionResponse {
        position_correction: normal * (overlap * 0.5),
        velocity_impulse: normal * (impulse_magnitude * 0.5),
    }
}

/// Resolves the collision of particles `i` and `j` in place.
pub fn resolve_collision(
    particles: &mut ParticleStore,
    i: ParticleId,
    j: ParticleId,
    particle_radius: FT,
    dist: FT,
    restitution: FT,
) {
    debug_assert!(i != j);

    let response = collision_response(
        &particles.position[i],
        &particles.position[j],
        &particles.velocity[i],
        &particles.velocity[j],
        particle_radius,
        dist,
        restitution,
    );

    particles.position[i] -= response.position_correction;
    particles.position[j] += response.position_correction;

    particles.velocity[i] -= response.velocity_impulse;
    particles.velocity[j] += response.velocity_impulse;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert_ft_approx_eq, vec3f};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn two_particles(x1: V3, x2: V3, v1: V3, v2: V3) -> ParticleStore {
        let mut particles = ParticleStore::new(2, 0.1);
        particles.spawn(x1, v1).unwrap();
        particles.spawn(x2, v2).unwrap();
        particles
    }

    #[test]
    fn head_on_collision() {
        let pr = 0.1;
        let mut particles = two_particles(
            vec3f(-0.15, 0., 0.),
            vec3f(0.15, 0., 0.),
            vec3f(1., 0., 0.),
            vec3f(-1., 0., 0.),
        );
        let dist = (particles.position[1] - particles.position[0]).norm();

        resolve_collision(&mut particles, 0, 1, pr, dist, 0.8);

        let new_dist = (particles.position[1] - particles.position[0]).norm();
        assert!(new_dist - 2. * pr >= -1e-6, "particles still overlap: {}", new_dist);

        assert_ft_approx_eq(particles.velocity[0].x, -0.8, 1e-6, || "left particle".into());
        assert_ft_approx_eq(particles.velocity[1].x, 0.8, 1e-6, || "right particle".into());
        assert_eq!(particles.velocity[0].y, 0.);
    }

    #[test]
    fn correction_moves_overlapping_particles_apart() {
        let mut rng = StdRng::seed_from_u64(9);
        let pr = 0.1;

        for _ in 0..1000 {
            let x1 = vec3f(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
            let offset = vec3f(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
            let x2 = x1 + offset.normalize() * rng.gen_range(0.001..0.199);
            let v1 = vec3f(rng.gen_range(-2.0..2.0), 0., rng.gen_range(-2.0..2.0));
            let v2 = vec3f(0., rng.gen_range(-2.0..2.0), 0.);

            let mut particles = two_particles(x1, x2, v1, v2);
            let dist = (x2 - x1).norm();
            resolve_collision(&mut particles, 0, 1, pr, dist, 0.8);

            let new_dist = (particles.position[1] - particles.position[0]).norm();
            assert!(new_dist >= dist);

            // the correction alone conserves linear momentum
            let dx = (particles.position[0] - x1) + (particles.position[1] - x2);
            let dv = (particles.velocity[0] - v1) + (particles.velocity[1] - v2);
            assert!(dx.norm() < 1e-5);
            assert!(dv.norm() < 1e-5);
        }
    }

    #[test]
    fn coincident_particles_get_a_fixed_normal() {
        let pr = 0.1;
        let x = vec3f(0.3, 0.3, 0.3);
        let mut particles = two_particles(x, x, V3::zeros(), V3::zeros());

        resolve_collision(&mut particles, 0, 1, pr, 0., 0.8);

        for i in 0..2 {
            assert!(particles.position[i].iter().all(|c| c.is_finite()));
            assert!(particles.velocity[i].iter().all(|c| c.is_finite()));
        }
        assert_ft_approx_eq(particles.position[0].x, 0.2, 1e-6, || "pushed along -x".into());
        assert_ft_approx_eq(particles.position[1].x, 0.4, 1e-6, || "pushed along +x".into());
        assert_eq!(particles.position[0].y, 0.3);
    }

    #[test]
    fn response_is_antisymmetric_in_particle_order() {
        let x1 = vec3f(0., 0., 0.);
        let x2 = vec3f(0.1, 0.05, 0.);
        let v1 = vec3f(1., 0., 0.);
        let v2 = vec3f(0., -1., 0.);
        let dist = (x2 - x1).norm();

        let a = collision_response(&x1, &x2, &v1, &v2, 0.1, dist, 0.8);
        let b = collision_response(&x2, &x1, &v2, &v1, 0.1, dist, 0.8);

        assert!((a.position_correction + b.position_correction).norm() < 1e-6);
        assert!((a.velocity_impulse + b.velocity_impulse).norm() < 1e-6);
    }
}
