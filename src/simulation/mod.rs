pub mod backend;
pub mod collision;
pub mod concurrency;
pub mod error;
pub mod integrator;
pub mod particles;
pub mod simulation_parameters;
pub mod spatial_hash;
pub mod spawn_patterns;
pub mod simulation;

pub type IT = i32;

#[cfg(feature = "double-precision")]
pub mod floating_type_mod {
    pub type FT = f64;
    pub use std::f64::consts::{PI, TAU};
}

#[cfg(not(feature = "double-precision"))]
pub mod floating_type_mod {
    pub type FT = f32;
    pub use std::f32::consts::{PI, TAU};
}

use floating_type_mod::FT;

use nalgebra::SVector;

pub type V<FT, const D: usize> = SVector<FT, D>;

pub type V3 = V<FT, 3>;
pub type V3I = V<IT, 3>;

/// Stable index of a particle inside the [`particles::ParticleStore`].
pub type ParticleId = usize;

pub fn vec3f(x: FT, y: FT, z: FT) -> V3 {
    [x, y, z].into()
}

pub use simulation::*;
