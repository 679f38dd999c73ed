//! Error types for the particle simulation.
//!
//! Capacity and parameter problems are reported by the simulation itself,
//! the remaining variants come from loading configuration files and exporting
//! snapshots.

use std::fmt;

#[derive(Debug)]
pub enum SimulationError {
    /// Spawning would exceed the preallocated particle/grid capacity.
    CapacityExceeded { requested: usize, capacity: usize },
    /// A simulation parameter is outside of its valid range.
    InvalidParameter { name: &'static str, reason: String },
    /// Failed to read or write a file.
    Io(std::io::Error),
    /// Failed to parse a YAML configuration.
    Config(serde_yaml::Error),
    /// Failed to write a VTK snapshot.
    Export(vtkio::Error),
}

impl SimulationError {
    pub fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        SimulationError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::CapacityExceeded { requested, capacity } => write!(
                f,
                "Particle capacity exceeded: {} particles requested but capacity is {}",
                requested, capacity
            ),
            SimulationError::InvalidParameter { name, reason } => {
                write!(f, "Invalid simulation parameter `{}`: {}", name, reason)
            }
            SimulationError::Io(e) => write!(f, "I/O error: {}", e),
            SimulationError::Config(e) => write!(f, "Failed to parse configuration: {}", e),
            SimulationError::Export(e) => write!(f, "Failed to export VTK snapshot: {}", e),
        }
    }
}

impl std::error::Error for SimulationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimulationError::Io(e) => Some(e),
            SimulationError::Config(e) => Some(e),
            SimulationError::Export(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SimulationError {
    fn from(e: std::io::Error) -> Self {
        SimulationError::Io(e)
    }
}

impl From<serde_yaml::Error> for SimulationError {
    fn from(e: serde_yaml::Error) -> Self {
        SimulationError::Config(e)
    }
}

impl From<vtkio::Error> for SimulationError {
    fn from(e: vtkio::Error) -> Self {
        SimulationError::Export(e)
    }
}
