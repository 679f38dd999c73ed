use std::collections::HashMap;
use std::fmt::{Display, Write};
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};
use num_traits::Float;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::simulation::backend::{ComputeBackend, ComputeBackendTrait};
use crate::simulation::error::SimulationError;
use crate::simulation::particles::ParticleStore;
use crate::simulation::simulation_parameters::{CapacityPolicy, GridRebuild, SimulationParams};
use crate::simulation::spatial_hash::SpatialHashGrid;
use crate::simulation::spawn_patterns::{
    cube_sphere_points, icosphere_points, random_points_in_sphere, random_vec3, sphere_surface_points,
};
use crate::{floating_type_mod::FT, vec3f, ParticleId, V3};

#[derive(Clone)]
struct Counter<T> {
    values: Vec<T>,
    last_start: Instant,
}
impl<T> Counter<T> {
    fn new() -> Self {
        Counter::<T> {
            last_start: Instant::now(),
            values: Vec::new(),
        }
    }
    fn add_value(&mut self, v: T) {
        self.values.push(v);
    }
}
impl Counter<FT> {
    fn avg(&self) -> FT {
        self.values.iter().cloned().sum::<FT>() / self.values.len().max(1) as FT
    }
    fn min(&self) -> FT {
        self.values.iter().cloned().fold(FT::MAX, FT::min)
    }
    fn max(&self) -> FT {
        self.values.iter().cloned().fold(FT::MIN, FT::max)
    }
}
impl Counter<Duration> {
    fn begin(&mut self) {
        self.last_start = Instant::now();
    }

    fn end(&mut self) {
        self.values.push(Instant::now() - self.last_start);
    }

    fn end_add_to_last(&mut self) {
        let duration = Instant::now() - self.last_start;
        match self.values.last_mut() {
            Some(last) => *last += duration,
            None => self.values.push(duration),
        }
    }

    fn avg(&self) -> Duration {
        self.sum() / self.values.len().max(1) as u32
    }

    fn sum(&self) -> Duration {
        self.values.iter().cloned().sum::<Duration>()
    }
}

struct ValueCounters {
    counters: HashMap<String, Counter<FT>>,
    enabled: bool,
}
impl ValueCounters {
    fn new(enabled: bool) -> ValueCounters {
        ValueCounters {
            counters: HashMap::default(),
            enabled,
        }
    }

    fn add_value(&mut self, id: &str, v: FT) {
        if self.enabled {
            self.counters
                .entry(id.to_string())
                .or_insert_with(Counter::<FT>::new)
                .add_value(v);
        }
    }
}

struct PerformanceCounters {
    counters: HashMap<String, Counter<Duration>>,
    enabled: bool,
}
impl PerformanceCounters {
    fn new(enabled: bool) -> PerformanceCounters {
        PerformanceCounters {
            counters: HashMap::default(),
            enabled,
        }
    }

    fn begin(&mut self, id: &str) {
        if self.enabled {
            self.counters
                .entry(id.to_string())
                .or_insert_with(Counter::<Duration>::new)
                .begin();
        }
    }
    fn end(&mut self, id: &str) {
        if let Some(counter) = self.counters.get_mut(id) {
            counter.end();
        }
    }
    fn end_add_to_last(&mut self, id: &str) {
        if let Some(counter) = self.counters.get_mut(id) {
            counter.end_add_to_last();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnRequest {
    pub position: V3,
    pub velocity: V3,
}

pub struct ParticleSimulation {
    pub particles: ParticleStore,

    // private so that nothing can query it outside of `advance`, where it is rebuilt first
    grid: SpatialHashGrid,
    backend: ComputeBackend,
    capacity_policy: CapacityPolicy,

    pending_spawns: Vec<SpawnRequest>,

    pub time: FT,
    pub step_number: usize,

    // last parameters that passed validation, used when `advance` gets invalid ones
    simulation_params: SimulationParams,

    pcounters: PerformanceCounters,
    vcounters: ValueCounters,
}

impl ParticleSimulation {
    pub fn new(
        simulation_params: SimulationParams,
        counters_enabled: bool,
    ) -> Result<ParticleSimulation, SimulationError> {
        simulation_params.validate()?;

        Ok(ParticleSimulation {
            particles: ParticleStore::new(simulation_params.max_particles, simulation_params.particle_radius),
            grid: SpatialHashGrid::new(simulation_params.grid_spacing(), simulation_params.max_particles),
            backend: ComputeBackend::new(simulation_params.backend),
            capacity_policy: simulation_params.capacity_policy,
            pending_spawns: Vec::new(),
            time: 0.,
            step_number: 0,
            simulation_params,
            pcounters: PerformanceCounters::new(counters_enabled),
            vcounters: ValueCounters::new(counters_enabled),
        })
    }

    /// Parameters used by the last frame (or the initial ones).
    pub fn simulation_params(&self) -> SimulationParams {
        self.simulation_params
    }

    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    pub fn capacity(&self) -> usize {
        self.particles.capacity()
    }

    pub fn positions(&self) -> &[V3] {
        self.particles.positions()
    }

    /// Spawns a particle right away, growing the capacity if the policy allows it.
    pub fn spawn(&mut self, position: V3, velocity: V3) -> Result<ParticleId, SimulationError> {
        self.ensure_capacity(self.particles.len() + 1)?;
        self.particles.spawn(position, velocity)
    }

    /// Queues a spawn that is applied by the next `apply_pending_spawns`.
    pub fn request_spawn(&mut self, position: V3, velocity: V3) {
        self.pending_spawns.push(SpawnRequest { position, velocity });
    }

    pub fn num_pending_spawns(&self) -> usize {
        self.pending_spawns.len()
    }

    /// Applies all queued spawns. Has to be called between frames.
    ///
    /// With a fixed capacity either all requests are applied or none, the
    /// queue is left untouched on error.
    pub fn apply_pending_spawns(&mut self) -> Result<Vec<ParticleId>, SimulationError> {
        if self.pending_spawns.is_empty() {
            return Ok(Vec::new());
        }

        self.ensure_capacity(self.particles.len() + self.pending_spawns.len())?;

        let requests = std::mem::take(&mut self.pending_spawns);
        let ids = requests
            .into_iter()
            .map(|request| self.particles.spawn(request.position, request.velocity))
            .collect::<Result<Vec<_>, _>>()?;

        debug!("spawned {} queued particles ({} total)", ids.len(), self.particles.len());
        Ok(ids)
    }

    fn ensure_capacity(&mut self, required: usize) -> Result<(), SimulationError> {
        let capacity = self.particles.capacity();
        if required <= capacity {
            return Ok(());
        }

        match self.capacity_policy {
            CapacityPolicy::Fixed => Err(SimulationError::CapacityExceeded {
                requested: required,
                capacity,
            }),
            CapacityPolicy::Grow => {
                let new_capacity = (capacity * 2).max(required);
                info!("growing particle capacity from {} to {}", capacity, new_capacity);
                self.particles.set_capacity(new_capacity);
                self.grid.resize(new_capacity);
                Ok(())
            }
        }
    }

    /// Advances all particles by one frame of `simulation_params.dt` seconds.
    ///
    /// Parameters that fail validation are ignored with a warning and the
    /// frame runs with the previously accepted ones.
    pub fn advance(&mut self, simulation_params: SimulationParams) {
        trace!("begin step {} at time {}", self.step_number, self.time);

        self.vcounters
            .add_value("particle-count", self.particles.len() as FT);
        self.pcounters.begin("simulation-step");

        let simulation_params = self.apply_runtime_params(simulation_params);

        let sub_steps = simulation_params.sub_steps.max(1);
        let sub_dt = simulation_params.sub_dt();
        let mut collisions = 0;

        // the grid always reflects the current positions before the first query of a step
        self.pcounters.begin("grid-build");
        self.backend.build_grid(&mut self.grid, &self.particles.position);
        self.pcounters.end("grid-build");

        self.pcounters.begin("sub-steps");
        for step in 0..sub_steps {
            if step > 0 && simulation_params.grid_rebuild == GridRebuild::PerSubStep {
                self.pcounters.begin("grid-build");
                self.backend.build_grid(&mut self.grid, &self.particles.position);
                self.pcounters.end_add_to_last("grid-build");
            }

            let stats = self
                .backend
                .sub_step(&mut self.particles, &mut self.grid, simulation_params, sub_dt);
            collisions += stats.collisions;
        }
        self.pcounters.end("sub-steps");

        self.vcounters.add_value("collisions", collisions as FT);
        if self.vcounters.enabled {
            self.vcounters.add_value("max-speed", self.particles.max_speed());
        }

        self.time += simulation_params.dt;
        self.step_number += 1;

        self.pcounters.end("simulation-step");
        trace!("end step with {} collision resolutions", collisions);
    }

    fn apply_runtime_params(&mut self, simulation_params: SimulationParams) -> SimulationParams {
        if let Err(e) = simulation_params.validate() {
            warn!("keeping previous simulation parameters: {}", e);
            return self.simulation_params;
        }
        self.simulation_params = simulation_params;

        self.particles
            .set_particle_radius(simulation_params.particle_radius);
        self.capacity_policy = simulation_params.capacity_policy;

        let spacing = simulation_params.grid_spacing();
        if self.grid.spacing() != spacing {
            debug!("grid spacing changed from {} to {}", self.grid.spacing(), spacing);
            self.grid.set_spacing(spacing);
        }

        if self.backend.backend_type() != simulation_params.backend {
            debug!("switching compute backend to {:?}", simulation_params.backend);
            self.backend = ComputeBackend::new(simulation_params.backend);
        }

        simulation_params
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SpawnPattern {
    Single { position: V3 },
    RandomBox { count: usize, min: FT, max: FT },
    RandomBall { count: usize, radius: FT },
    SphereSurface { count: usize, radius: FT },
    IcoSphere { radius: FT },
    CubeSphere { points_per_row: usize, radius: FT },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSpawn {
    pub pattern: SpawnPattern,

    // every velocity component is drawn uniformly from this range
    #[serde(default)]
    pub velocity_range: (FT, FT),

    // simulation time in seconds at which the particles appear
    #[serde(default)]
    pub at_time: FT,
}

impl SceneSpawn {
    /// Rejects ranges that would be silently collapsed or inverted by the generators.
    pub fn validate(&self) -> Result<(), SimulationError> {
        let (vmin, vmax) = self.velocity_range;
        if !(vmin.is_finite() && vmax.is_finite() && vmin <= vmax) {
            return Err(SimulationError::invalid_parameter(
                "velocity_range",
                format!("expected finite [min, max] with min <= max, got [{}, {}]", vmin, vmax),
            ));
        }
        if !(self.at_time >= 0. && self.at_time.is_finite()) {
            return Err(SimulationError::invalid_parameter(
                "at_time",
                format!("must be a non-negative time, got {}", self.at_time),
            ));
        }

        let radius = match &self.pattern {
            SpawnPattern::RandomBox { min, max, .. } => {
                if !(min.is_finite() && max.is_finite() && min <= max) {
                    return Err(SimulationError::invalid_parameter(
                        "RandomBox",
                        format!("expected min <= max, got [{}, {}]", min, max),
                    ));
                }
                None
            }
            SpawnPattern::RandomBall { radius, .. }
            | SpawnPattern::SphereSurface { radius, .. }
            | SpawnPattern::IcoSphere { radius }
            | SpawnPattern::CubeSphere { radius, .. } => Some(*radius),
            SpawnPattern::Single { .. } => None,
        };
        match radius {
            Some(radius) if !(radius >= 0. && radius.is_finite()) => Err(SimulationError::invalid_parameter(
                "radius",
                format!("pattern radius must be non-negative, got {}", radius),
            )),
            _ => Ok(()),
        }
    }

    pub fn generate(&self, rng: &mut StdRng) -> Vec<SpawnRequest> {
        let positions = match &self.pattern {
            SpawnPattern::Single { position } => vec![*position],
            SpawnPattern::RandomBox { count, min, max } => (0..*count).map(|_| random_vec3(rng, *min, *max)).collect(),
            SpawnPattern::RandomBall { count, radius } => random_points_in_sphere(rng, *count, *radius),
            SpawnPattern::SphereSurface { count, radius } => sphere_surface_points(rng, *count, *radius),
            SpawnPattern::IcoSphere { radius } => icosphere_points(*radius),
            SpawnPattern::CubeSphere { points_per_row, radius } => cube_sphere_points(*points_per_row, *radius),
        };

        let (vmin, vmax) = self.velocity_range;
        positions
            .into_iter()
            .map(|position| SpawnRequest {
                position,
                velocity: random_vec3(rng, vmin, vmax),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    #[serde(default)]
    pub seed: u64,
    pub spawns: Vec<SceneSpawn>,
}

impl SceneConfig {
    pub fn validate(&self) -> Result<(), SimulationError> {
        self.spawns.iter().try_for_each(SceneSpawn::validate)
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        SceneConfig {
            seed: 0,
            spawns: vec![
                SceneSpawn {
                    pattern: SpawnPattern::RandomBox {
                        count: 200,
                        min: -2.,
                        max: 2.,
                    },
                    velocity_range: (-1., 1.),
                    at_time: 0.,
                },
                SceneSpawn {
                    pattern: SpawnPattern::Single {
                        position: vec3f(0., 2., 0.),
                    },
                    velocity_range: (0., 0.),
                    at_time: 1.,
                },
            ],
        }
    }
}

/// Feeds timed scene spawns into a simulation once their time has come.
pub struct SpawnSchedule {
    // sorted by time, reversed so that the next spawn can be popped
    upcoming: Vec<(FT, Vec<SpawnRequest>)>,
}

impl SpawnSchedule {
    pub fn new(mut upcoming: Vec<(FT, Vec<SpawnRequest>)>) -> SpawnSchedule {
        upcoming.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        SpawnSchedule { upcoming }
    }

    pub fn is_empty(&self) -> bool {
        self.upcoming.is_empty()
    }

    /// Queues all spawns due at the current simulation time, returns how many particles were queued.
    pub fn queue_due(&mut self, simulation: &mut ParticleSimulation) -> usize {
        let mut queued = 0;
        while let Some((at_time, _)) = self.upcoming.last() {
            if *at_time > simulation.time {
                break;
            }
            if let Some((_, requests)) = self.upcoming.pop() {
                queued += requests.len();
                for request in requests {
                    simulation.request_spawn(request.position, request.velocity);
                }
            }
        }
        queued
    }
}

/// Creates a simulation with every scene spawn at time zero applied and
/// returns the schedule for the later ones.
pub fn init_particle_sim(
    simulation_params: SimulationParams,
    scene_config: &SceneConfig,
    counters_enabled: bool,
) -> Result<(ParticleSimulation, SpawnSchedule), SimulationError> {
    scene_config.validate()?;

    let mut rng = StdRng::seed_from_u64(scene_config.seed);
    let mut simulation = ParticleSimulation::new(simulation_params, counters_enabled)?;
    let mut later = Vec::new();

    for spawn in &scene_config.spawns {
        let requests = spawn.generate(&mut rng);
        if spawn.at_time <= 0. {
            for request in requests {
                simulation.spawn(request.position, request.velocity)?;
            }
        } else {
            later.push((spawn.at_time, requests));
        }
    }

    info!(
        "INIT {} PARTICLES ({} scheduled spawns)",
        simulation.num_particles(),
        later.len()
    );

    Ok((simulation, SpawnSchedule::new(later)))
}

pub fn is_ft_approx_eq<FT: Float>(a: FT, b: FT, tolerance: FT) -> bool {
    assert!(!a.is_nan());
    assert!(!b.is_nan());
    b <= a + tolerance && b >= a - tolerance
}

pub fn assert_ft_approx_eq<FT: Float + Display>(a: FT, b: FT, tolerance: FT, s: impl FnOnce() -> String) {
    if !is_ft_approx_eq(a, b, tolerance) {
        panic!(
            "{} value not equal with a tolerance of {}:\n\ta={}\n\tb={}\n",
            s(),
            tolerance,
            a,
            b
        );
    }
}

pub fn write_statistics(simulation: &ParticleSimulation) -> String {
    let mut s = String::new();

    let simulation_time = simulation
        .pcounters
        .counters
        .get("simulation-step")
        .map(|c| c.sum())
        .unwrap_or_default();

    let _ = writeln!(
        s,
        "frames: {}  simulated time: {:.3}s  particles: {}",
        simulation.step_number,
        simulation.time,
        simulation.num_particles()
    );
    let _ = writeln!(s, "simulation-time: {}ms", simulation_time.as_secs_f64() * 1000.);
    let _ = writeln!(s);

    let mut v = simulation.pcounters.counters.iter().collect::<Vec<_>>();
    v.sort_by(|x, y| x.0.cmp(y.0));
    for (label, pcounter) in v {
        let _ = writeln!(s, "{}: avg:{}ms", label, pcounter.avg().as_secs_f64() * 1000.);
    }
    let _ = writeln!(s);

    let mut v = simulation.vcounters.counters.iter().collect::<Vec<_>>();
    v.sort_by(|x, y| x.0.cmp(y.0));
    for (label, vcounter) in v {
        let _ = writeln!(
            s,
            "{}: min:{} max:{} avg:{}",
            label,
            vcounter.min(),
            vcounter.max(),
            vcounter.avg()
        );
    }

    s
}
