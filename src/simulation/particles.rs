use nalgebra::zero;

use crate::{error::SimulationError, floating_type_mod::FT, ParticleId, V3};

macro_rules! decl_particle_store {
    (pub struct $struct_name:ident { $(pub $field_name:ident: Vec<$field_type:ty> | $default_value:expr),*$(,)?  }) => {
        /// Structure-of-arrays storage for all particles. The index into each
        /// attribute vector is the particle id, ids are never reordered.
        pub struct $struct_name {
            $(
                pub $field_name : Vec<$field_type>,
            )*
            capacity: usize,
            particle_radius: FT,
        }

        impl $struct_name {
            pub fn new(capacity: usize, particle_radius: FT) -> Self {
                Self {
                    $(
                        $field_name: Vec::with_capacity(capacity),
                    )*
                    capacity,
                    particle_radius,
                }
            }

            fn push_default(&mut self) {
                $(
                    self.$field_name.push($default_value);
                )*
            }

            fn reserve_exact(&mut self, additional: usize) {
                $(
                    self.$field_name.reserve_exact(additional);
                )*
            }
        }
    }
}

decl_particle_store! {
    pub struct ParticleStore {
        pub position: Vec<V3> | zero(),
        pub velocity: Vec<V3> | zero(),

        // force accumulator, reset at the beginning of every sub-step
        pub acceleration: Vec<V3> | zero(),

        pub radius: Vec<FT> | 0.,
    }
}

impl ParticleStore {
    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn particle_radius(&self) -> FT {
        self.particle_radius
    }

    /// Appends a particle and returns its id.
    pub fn spawn(&mut self, position: V3, velocity: V3) -> Result<ParticleId, SimulationError> {
        let id = self.len();
        if id >= self.capacity {
            return Err(SimulationError::CapacityExceeded {
                requested: id + 1,
                capacity: self.capacity,
            });
        }

        self.push_default();
        self.position[id] = position;
        self.velocity[id] = velocity;
        self.radius[id] = self.particle_radius;

        Ok(id)
    }

    /// Raises the capacity. The grid has to be resized to the same capacity.
    pub fn set_capacity(&mut self, capacity: usize) {
        assert!(capacity >= self.len(), "cannot shrink the particle store below its length");
        self.reserve_exact(capacity - self.len());
        self.capacity = capacity;
    }

    /// All particles share one radius, changing it applies to existing particles too.
    pub fn set_particle_radius(&mut self, particle_radius: FT) {
        if self.particle_radius != particle_radius {
            self.particle_radius = particle_radius;
            self.radius.iter_mut().for_each(|r| *r = particle_radius);
        }
    }

    pub fn positions(&self) -> &[V3] {
        &self.position
    }

    pub fn max_speed(&self) -> FT {
        self.velocity.iter().map(|v| v.norm()).fold(0., FT::max)
    }
}
