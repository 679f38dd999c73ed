use crate::{
    collision::resolve_collision,
    floating_type_mod::FT,
    integrator::{apply_container_constraint, integrate_particle},
    particles::ParticleStore,
    simulation_parameters::SimulationParams,
    spatial_hash::SpatialHashGrid,
    V3,
};

use super::{ComputeBackendTrait, SubStepStats};

/// Single threaded reference implementation.
///
/// Particles are processed in id order and every collision is applied
/// immediately, so particle `i` may move particle `j > i` before `j` is
/// integrated. The result depends on that order.
#[derive(Default)]
pub struct SequentialBackend {}

impl SequentialBackend {
    pub fn new() -> Self {
        SequentialBackend {}
    }
}

impl ComputeBackendTrait for SequentialBackend {
    fn build_grid(&mut self, grid: &mut SpatialHashGrid, positions: &[V3]) {
        grid.build(positions);
    }

    fn sub_step(
        &mut self,
        particles: &mut ParticleStore,
        grid: &mut SpatialHashGrid,
        simulation_params: SimulationParams,
        sub_dt: FT,
    ) -> SubStepStats {
        let pr = simulation_params.particle_radius;
        let collision_distance = simulation_params.collision_distance();
        let mut stats = SubStepStats::default();

        for i in 0..particles.len() {
            integrate_particle(
                &mut particles.position[i],
                &mut particles.velocity[i],
                &mut particles.acceleration[i],
                simulation_params.gravity,
                simulation_params.drag,
                sub_dt,
            );
            apply_container_constraint(
                &mut particles.position[i],
                &mut particles.velocity[i],
                simulation_params.container_radius,
            );

            let p1 = particles.position[i];
            for &j in grid.query(&p1, collision_distance) {
                if j == i {
                    continue;
                }

                // candidates are only close in hash space, check the real distance
                let dist = (particles.position[j] - particles.position[i]).norm();
                if dist < collision_distance {
                    resolve_collision(particles, i, j, pr, dist, simulation_params.restitution);
                    stats.collisions += 1;
                }
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backend::ParallelBackend, collision::resolve_collision, vec3f};

    fn chain() -> ParticleStore {
        // 0 overlaps 1; 1 only reaches 2 after being pushed away from 0
        let mut particles = ParticleStore::new(3, 0.1);
        particles.spawn(vec3f(0., 0., 0.), V3::zeros()).unwrap();
        particles.spawn(vec3f(0.15, 0., 0.), V3::zeros()).unwrap();
        particles.spawn(vec3f(0.175, 0.199, 0.), V3::zeros()).unwrap();
        particles
    }

    fn run_sub_step(backend: &mut impl ComputeBackendTrait, particles: &mut ParticleStore) {
        let params = SimulationParams {
            gravity: 0.,
            drag: 0.,
            ..SimulationParams::default()
        };
        let mut grid = SpatialHashGrid::new(params.grid_spacing(), 100);
        backend.build_grid(&mut grid, particles.positions());
        backend.sub_step(particles, &mut grid, params, 0.01);
    }

    fn assert_positions_eq(a: &[V3], b: &[V3]) {
        for (i, (pa, pb)) in a.iter().zip(b).enumerate() {
            assert!((pa - pb).norm() < 1e-5, "particle {}: {:?} != {:?}", i, pa, pb);
        }
    }

    #[test]
    fn resolved_particles_move_before_their_own_turn() {
        let mut sequential = chain();
        run_sub_step(&mut SequentialBackend::new(), &mut sequential);

        // in place and in id order: pair (0, 1) first, then 1 collides with 2 at its new position
        let mut expected = chain();
        let dist = (expected.position[1] - expected.position[0]).norm();
        resolve_collision(&mut expected, 0, 1, 0.1, dist, 0.8);
        let dist = (expected.position[2] - expected.position[1]).norm();
        assert!(dist < 0.2);
        resolve_collision(&mut expected, 1, 2, 0.1, dist, 0.8);

        assert_positions_eq(&sequential.position, &expected.position);
        assert_positions_eq(
            &sequential.position,
            &[vec3f(-0.025, 0., 0.), vec3f(0.175, -0.0005, 0.), vec3f(0.175, 0.1995, 0.)],
        );
    }

    #[test]
    fn sequential_result_differs_from_jacobi_result() {
        let mut sequential = chain();
        run_sub_step(&mut SequentialBackend::new(), &mut sequential);

        let mut jacobi = chain();
        run_sub_step(&mut ParallelBackend::new(), &mut jacobi);

        // the snapshot only sees the overlap of 0 and 1, particle 2 stays put
        assert_positions_eq(
            &jacobi.position,
            &[vec3f(-0.025, 0., 0.), vec3f(0.175, 0., 0.), vec3f(0.175, 0.199, 0.)],
        );
        assert!((sequential.position[2] - jacobi.position[2]).norm() > 1e-4);
    }
}
