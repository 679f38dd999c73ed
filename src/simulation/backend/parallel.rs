use rayon::iter::ParallelIterator;

use crate::{
    collision::collision_response,
    concurrency::{into_par_iter, par_iter_mut1, par_iter_mut2, par_iter_mut3},
    floating_type_mod::FT,
    integrator::{apply_container_constraint, integrate_particle},
    particles::ParticleStore,
    simulation_parameters::SimulationParams,
    spatial_hash::{NeighborLists, SpatialHashGrid},
    ParticleId, V3,
};

use super::{ComputeBackendTrait, SubStepStats};

/// Data-parallel implementation on the rayon thread pool.
///
/// The grid contents are identical to the sequential build, only the hashing
/// runs in parallel. A sub-step integrates all particles first and resolves
/// collisions afterwards against a snapshot (Jacobi style): each particle sums
/// its half of every overlapping pair and all deltas are applied at once. The
/// result is independent of particle order and every unordered pair is resolved
/// once per sub-step.
///
/// Neighbors are searched with the post-integration positions in a grid built
/// before integration, so a pair can be found from one side only. The lists
/// are symmetrized before the collision pass, otherwise only one partner of
/// such a pair would be corrected.
#[derive(Default)]
pub struct ParallelBackend {
    buckets: Vec<usize>,
    neighbors: NeighborLists,
    position_snapshot: Vec<V3>,
    velocity_snapshot: Vec<V3>,
}

impl ParallelBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn build_neighbor_lists(&mut self, grid: &SpatialHashGrid, positions: &[V3], max_dist: FT) {
        let lists: Vec<Vec<ParticleId>> = into_par_iter(0..positions.len())
            .map(|i| {
                let mut list = Vec::new();
                grid.neighbors_of(positions, i, max_dist, &mut list);
                list
            })
            .collect();

        self.neighbors.set_symmetric(lists);
    }
}

impl ComputeBackendTrait for ParallelBackend {
    fn build_grid(&mut self, grid: &mut SpatialHashGrid, positions: &[V3]) {
        self.buckets.resize(positions.len(), 0);
        {
            let grid: &SpatialHashGrid = grid;
            par_iter_mut1(&mut self.buckets, |i, bucket| {
                *bucket = grid.hash_pos(&positions[i]);
            });
        }
        grid.build_from_buckets(&self.buckets);
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
        let restitution = simulation_params.restitution;

        par_iter_mut3(
            &mut particles.position,
            &mut particles.velocity,
            &mut particles.acceleration,
            |_i, position, velocity, acceleration| {
                integrate_particle(
                    position,
                    velocity,
                    acceleration,
                    simulation_params.gravity,
                    simulation_params.drag,
                    sub_dt,
                );
                apply_container_constraint(position, velocity, simulation_params.container_radius);
            },
        );

        self.build_neighbor_lists(grid, &particles.position, collision_distance);

        self.position_snapshot.clone_from(&particles.position);
        self.velocity_snapshot.clone_from(&particles.velocity);

        let x = &self.position_snapshot;
        let v = &self.velocity_snapshot;
        let neighbors = &self.neighbors;

        // every pair shows up in both neighbor lists, particle i only applies its own half
        par_iter_mut2(&mut particles.position, &mut particles.velocity, |i, position, velocity| {
            let mut position_delta = V3::zeros();
            let mut velocity_delta = V3::zeros();

            for &j in neighbors.neighbors(i) {
                let dist = (x[j] - x[i]).norm();
                let response = collision_response(&x[i], &x[j], &v[i], &v[j], pr, dist, restitution);
                position_delta -= response.position_correction;
                velocity_delta -= response.velocity_impulse;
            }

            *position += position_delta;
            *velocity += velocity_delta;
        });

        SubStepStats {
            collisions: self.neighbors.total_neighbor_count() / 2,
        }
    }
}
