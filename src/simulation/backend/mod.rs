use crate::{
    floating_type_mod::FT, particles::ParticleStore, simulation_parameters::BackendType,
    simulation_parameters::SimulationParams, spatial_hash::SpatialHashGrid, V3,
};

mod parallel;
mod sequential;

use enum_dispatch::enum_dispatch;
pub use parallel::ParallelBackend;
pub use sequential::SequentialBackend;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SubStepStats {
    pub collisions: usize,
}

/// Executes the two phases of a simulation step: sorting the particles into
/// the hash grid, and advancing them by one sub-step including collisions.
///
/// All implementations must produce the same grid contents from `build_grid`.
#[enum_dispatch]
pub trait ComputeBackendTrait {
    fn build_grid(&mut self, grid: &mut SpatialHashGrid, positions: &[V3]);

    fn sub_step(
        &mut self,
        particles: &mut ParticleStore,
        grid: &mut SpatialHashGrid,
        simulation_params: SimulationParams,
        sub_dt: FT,
    ) -> SubStepStats;
}

#[enum_dispatch(ComputeBackendTrait)]
pub enum ComputeBackend {
    SequentialBackend(SequentialBackend),
    ParallelBackend(ParallelBackend),
}

impl ComputeBackend {
    pub fn new(backend_type: BackendType) -> ComputeBackend {
        match backend_type {
            BackendType::Sequential => SequentialBackend::new().into(),
            BackendType::Parallel => ParallelBackend::new().into(),
        }
    }

    pub fn backend_type(&self) -> BackendType {
        match self {
            ComputeBackend::SequentialBackend(_) => BackendType::Sequential,
            ComputeBackend::ParallelBackend(_) => BackendType::Parallel,
        }
    }
}
