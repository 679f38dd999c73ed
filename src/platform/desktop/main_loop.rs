use std::{collections::HashMap, path::PathBuf, time::Duration};

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use log::{debug, error, info, LevelFilter};

use crate::{
    error::SimulationError, floating_type_mod::FT, init_particle_sim, simulation_parameters::SimulationParams,
    write_statistics, ParticleSimulation, SceneConfig,
};

use super::vtk_exporter::VtkExporter;

const CARGO_PKG_AUTHORS: &'static str = env!("CARGO_PKG_AUTHORS");
const CARGO_PKG_VERSION: &'static str = env!("CARGO_PKG_VERSION");
const CARGO_PKG_DESCRIPTION: &'static str = env!("CARGO_PKG_DESCRIPTION");

struct RunOptions {
    max_seconds: FT,
    counters_enabled: bool,
    statistics_path: Option<String>,
    vtk_output: Option<PathBuf>,
    vtk_every: usize,
}

pub fn start() {
    let matches = App::new("Sphere Particle Simulation")
        .version(CARGO_PKG_VERSION)
        .author(CARGO_PKG_AUTHORS)
        .about(CARGO_PKG_DESCRIPTION)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity"),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Run simulation with given config")
                .arg(
                    Arg::with_name("SIMULATION_CONFIG")
                        .help("Sets the simulation paramaters")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("SCENE_CONFIG")
                        .help("Scene setup")
                        .required(true)
                        .index(2),
                )
                .arg(
                    Arg::with_name("MAX_SECONDS")
                        .long("max-seconds")
                        .short("s")
                        .default_value("10")
                        .takes_value(true)
                        .help("Stop simulation after the given amount of simulated seconds"),
                )
                .arg(
                    Arg::with_name("OVERWRITE_CONFIG_FILE")
                        .long("overwrite-config-file")
                        .short("c")
                        .required(false)
                        .takes_value(true)
                        .help("Overwrite single entries of the simulation config"),
                )
                .arg(
                    Arg::with_name("STATISTICS_ENABLED")
                        .help("Track performance of individual steps")
                        .short("p")
                        .long("statistics-enabled")
                        .takes_value(false),
                )
                .arg(
                    Arg::with_name("STATISTICS_PATH")
                        .long("statistics-path")
                        .short("w")
                        .required(false)
                        .takes_value(true)
                        .help("Where to write statistics to"),
                )
                .arg(
                    Arg::with_name("VTK_OUTPUT")
                        .long("vtk-output")
                        .short("o")
                        .required(false)
                        .takes_value(true)
                        .help("Folder for VTK snapshots (no export if missing)"),
                )
                .arg(
                    Arg::with_name("VTK_EVERY")
                        .long("vtk-every")
                        .default_value("1")
                        .takes_value(true)
                        .help("Write a VTK snapshot every N frames"),
                ),
        )
        .subcommand(
            SubCommand::with_name("print-default-config")
                .about("Print the default simulation parameters as YAML")
                .arg(
                    Arg::with_name("SCENE")
                        .long("scene")
                        .takes_value(false)
                        .help("Print the default scene instead"),
                ),
        )
        .get_matches();

    let level = match matches.occurrences_of("v") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let result = if let Some(run_matches) = matches.subcommand_matches("run") {
        run(run_matches)
    } else if let Some(subcmd_matches) = matches.subcommand_matches("print-default-config") {
        print_default_config(subcmd_matches.is_present("SCENE"))
    } else {
        unreachable!()
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn print_default_config(scene: bool) -> Result<(), SimulationError> {
    let yaml = if scene {
        serde_yaml::to_string(&SceneConfig::default())?
    } else {
        serde_yaml::to_string(&SimulationParams::default())?
    };
    print!("{}", yaml);
    Ok(())
}

/// Reads the simulation parameters and replaces single entries by the ones
/// from the overwrite file.
fn load_simulation_params(
    parameter_file: &str,
    overwrite_file: Option<&str>,
) -> Result<SimulationParams, SimulationError> {
    let params_yaml = std::fs::read_to_string(parameter_file)?;
    let mut simulation_params_serde: serde_yaml::Value = serde_yaml::from_str(&params_yaml)?;
    if simulation_params_serde.is_null() {
        simulation_params_serde = serde_yaml::Value::Mapping(Default::default());
    }

    if let Some(overwrite_file) = overwrite_file {
        let overwrite_config_str = std::fs::read_to_string(overwrite_file)?;
        let overwrite_config_file: HashMap<String, serde_yaml::Value> = serde_yaml::from_str(&overwrite_config_str)?;
        let mapping = simulation_params_serde.as_mapping_mut().ok_or_else(|| {
            SimulationError::invalid_parameter("SIMULATION_CONFIG", "simulation config is not a mapping")
        })?;
        let defaults = serde_yaml::to_value(SimulationParams::default())?;
        for (k, v) in overwrite_config_file.into_iter() {
            if defaults.get(k.as_str()).is_none() {
                return Err(SimulationError::invalid_parameter(
                    "OVERWRITE_CONFIG_FILE",
                    format!("unknown simulation parameter `{}`", k),
                ));
            }
            debug!("overwriting simulation parameter {}", k);
            mapping.insert(serde_yaml::Value::String(k), v);
        }
    }

    let simulation_params: SimulationParams = serde_yaml::from_value(simulation_params_serde)?;
    simulation_params.validate()?;
    Ok(simulation_params)
}

fn parse_arg<T: std::str::FromStr>(matches: &ArgMatches, name: &'static str) -> Result<Option<T>, SimulationError> {
    matches
        .value_of(name)
        .map(|x| {
            x.parse::<T>()
                .map_err(|_| SimulationError::invalid_parameter(name, format!("cannot parse `{}`", x)))
        })
        .transpose()
}

fn run(run_matches: &ArgMatches) -> Result<(), SimulationError> {
    let parameter_file = run_matches
        .value_of("SIMULATION_CONFIG")
        .ok_or_else(|| SimulationError::invalid_parameter("SIMULATION_CONFIG", "missing simulation config"))?;
    let simulation_params = load_simulation_params(parameter_file, run_matches.value_of("OVERWRITE_CONFIG_FILE"))?;
    info!("{:?}", simulation_params);

    let scene_file_path = run_matches
        .value_of("SCENE_CONFIG")
        .ok_or_else(|| SimulationError::invalid_parameter("SCENE_CONFIG", "missing scene config"))?;
    let scene_yaml = std::fs::read_to_string(scene_file_path)?;
    let scene_config: SceneConfig = serde_yaml::from_str(&scene_yaml)?;
    debug!("{:?}", scene_config);

    let options = RunOptions {
        max_seconds: parse_arg(run_matches, "MAX_SECONDS")?.unwrap_or(10.),
        counters_enabled: run_matches.is_present("STATISTICS_ENABLED"),
        statistics_path: run_matches.value_of("STATISTICS_PATH").map(String::from),
        vtk_output: run_matches.value_of("VTK_OUTPUT").map(PathBuf::from),
        vtk_every: parse_arg::<usize>(run_matches, "VTK_EVERY")?.unwrap_or(1).max(1),
    };

    let simulation = simulation_main(simulation_params, &scene_config, &options)?;

    if options.counters_enabled {
        let s = write_statistics(&simulation);
        print!("{}", s);
        if let Some(statistics_path) = &options.statistics_path {
            std::fs::write(statistics_path, s)?;
        }
    }

    Ok(())
}

fn simulation_main(
    simulation_params: SimulationParams,
    scene_config: &SceneConfig,
    options: &RunOptions,
) -> Result<ParticleSimulation, SimulationError> {
    let (mut simulation, mut spawn_schedule) =
        init_particle_sim(simulation_params, scene_config, options.counters_enabled)?;

    let mut vtk_exporter = match &options.vtk_output {
        Some(folder) => Some(VtkExporter::new(folder, "particles")?),
        None => None,
    };

    let mut total_duration: Duration = Duration::from_nanos(0);
    let mut frame_number: u32 = 0;

    while simulation.time < options.max_seconds {
        spawn_schedule.queue_due(&mut simulation);
        simulation.apply_pending_spawns()?;

        let a = std::time::Instant::now();
        simulation.advance(simulation_params);
        let b = std::time::Instant::now();

        total_duration += b - a;
        frame_number += 1;

        if let Some(vtk_exporter) = &mut vtk_exporter {
            if (frame_number as usize - 1) % options.vtk_every == 0 {
                vtk_exporter.add_snapshot(simulation.time, &simulation.particles, simulation_params)?;
            }
        }

        debug!(
            "{:05}: {} particles {}msec ({}msec AVG)",
            frame_number,
            simulation.num_particles(),
            (b - a).as_secs_f32() * 1000.,
            (total_duration / frame_number).as_secs_f32() * 1000.
        );
    }

    info!(
        "simulated {:.3}s in {} frames with {} particles ({}msec AVG per frame)",
        simulation.time,
        frame_number,
        simulation.num_particles(),
        (total_duration / frame_number.max(1)).as_secs_f32() * 1000.
    );
    if let Some(vtk_exporter) = &vtk_exporter {
        info!("wrote {} VTK snapshots", vtk_exporter.num_snapshots());
    }

    Ok(simulation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrite_file_replaces_single_entries() {
        let folder = std::env::temp_dir().join(format!("sphere-particles-config-{}", std::process::id()));
        std::fs::create_dir_all(&folder).unwrap();
        let params_path = folder.join("simulation.yaml");
        let overwrite_path = folder.join("overwrite.yaml");
        std::fs::write(&params_path, "particle_radius: 0.05\nsub_steps: 4\n").unwrap();
        std::fs::write(&overwrite_path, "sub_steps: 2\nrestitution: 0.5\n").unwrap();

        let params = load_simulation_params(
            params_path.to_str().unwrap(),
            Some(overwrite_path.to_str().unwrap()),
        )
        .unwrap();
        assert_eq!(params.particle_radius, 0.05);
        assert_eq!(params.sub_steps, 2);
        assert_eq!(params.restitution, 0.5);

        std::fs::write(&overwrite_path, "gravty: 1.0\n").unwrap();
        assert!(matches!(
            load_simulation_params(params_path.to_str().unwrap(), Some(overwrite_path.to_str().unwrap())),
            Err(SimulationError::InvalidParameter {
                name: "OVERWRITE_CONFIG_FILE",
                ..
            })
        ));

        std::fs::write(&overwrite_path, "restitution: 2.0\n").unwrap();
        assert!(matches!(
            load_simulation_params(params_path.to_str().unwrap(), Some(overwrite_path.to_str().unwrap())),
            Err(SimulationError::InvalidParameter { name: "restitution", .. })
        ));

        std::fs::remove_dir_all(&folder).unwrap();
    }

    #[test]
    fn headless_run_reaches_max_seconds() {
        let options = RunOptions {
            max_seconds: 0.5,
            counters_enabled: true,
            statistics_path: None,
            vtk_output: None,
            vtk_every: 1,
        };
        let simulation = simulation_main(SimulationParams::default(), &SceneConfig::default(), &options).unwrap();
        assert!(simulation.time >= 0.5);
        assert_eq!(simulation.num_particles(), 200);
    }
}
