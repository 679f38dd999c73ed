use crate::{error::SimulationError, floating_type_mod::FT};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    pub particle_radius: FT,

    // frame time in seconds; split evenly into `sub_steps`
    pub dt: FT,
    pub gravity: FT,
    pub container_radius: FT,
    pub sub_steps: usize,

    // velocity proportional damping, acceleration += -drag * velocity
    pub drag: FT,
    pub restitution: FT,

    // cell edge length of the hash grid, `None` uses twice the particle radius
    pub grid_spacing: Option<FT>,

    pub max_particles: usize,
    pub capacity_policy: CapacityPolicy,
    pub backend: BackendType,
    pub grid_rebuild: GridRebuild,
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            particle_radius: 0.1,
            dt: 1. / 60.,
            gravity: 9.8,
            container_radius: 3.0,
            sub_steps: 8,
            drag: 0.2,
            restitution: 0.8,
            grid_spacing: None,
            max_particles: 1000,
            capacity_policy: CapacityPolicy::Fixed,
            backend: BackendType::Sequential,
            grid_rebuild: GridRebuild::PerFrame,
        }
    }
}

impl SimulationParams {
    /// Two particles overlap if their centers are closer than this.
    pub fn collision_distance(&self) -> FT {
        2. * self.particle_radius
    }

    pub fn grid_spacing(&self) -> FT {
        self.grid_spacing.unwrap_or_else(|| self.collision_distance())
    }

    pub fn sub_dt(&self) -> FT {
        self.dt / self.sub_steps.max(1) as FT
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        fn positive(name: &'static str, v: FT) -> Result<(), SimulationError> {
            if v > 0. && v.is_finite() {
                Ok(())
            } else {
                Err(SimulationError::invalid_parameter(
                    name,
                    format!("must be positive and finite, got {}", v),
                ))
            }
        }

        positive("particle_radius", self.particle_radius)?;
        positive("dt", self.dt)?;
        positive("container_radius", self.container_radius)?;
        if let Some(spacing) = self.grid_spacing {
            positive("grid_spacing", spacing)?;
        }

        if !self.gravity.is_finite() {
            return Err(SimulationError::invalid_parameter("gravity", "must be finite"));
        }
        if self.sub_steps == 0 {
            return Err(SimulationError::invalid_parameter("sub_steps", "at least one sub-step is required"));
        }
        if self.max_particles == 0 {
            return Err(SimulationError::invalid_parameter("max_particles", "capacity must not be zero"));
        }
        if !(self.drag >= 0. && self.drag.is_finite()) {
            return Err(SimulationError::invalid_parameter(
                "drag",
                format!("must be non-negative, got {}", self.drag),
            ));
        }
        if !(0. ..=1.).contains(&self.restitution) {
            return Err(SimulationError::invalid_parameter(
                "restitution",
                format!("must be within [0, 1], got {}", self.restitution),
            ));
        }

        Ok(())
    }
}

/// What happens when a spawn would exceed `max_particles`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapacityPolicy {
    // reject the spawn with `SimulationError::CapacityExceeded`
    Fixed,
    // double the capacity and resize the grid before spawning
    Grow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendType {
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridRebuild {
    // neighbor candidates may go stale during later sub-steps
    PerFrame,
    PerSubStep,
}
