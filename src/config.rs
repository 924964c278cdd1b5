//! Run configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::preemption::PreemptionConfig;
use crate::topology::Topology;
use crate::traffic::StreamSpec;

/// Queue capacity of a port, in frames per priority level, when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Per-port scheduling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// Frames per priority queue.
    pub queue_capacity: usize,
    /// Enables frame preemption on the port.
    pub preemption: Option<PreemptionConfig>,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            preemption: None,
        }
    }
}

impl PortConfig {
    /// Non-preemptive port with the given queue capacity.
    pub fn with_capacity(queue_capacity: usize) -> Self {
        Self {
            queue_capacity,
            ..Default::default()
        }
    }

    /// Enables preemption with the given parameters.
    pub fn preemptive(mut self, preemption: PreemptionConfig) -> Self {
        self.preemption = Some(preemption);
        self
    }

    /// Rejects empty queues and invalid preemption parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::invalid("queue_capacity", "must hold at least one frame"));
        }
        if let Some(p) = &self.preemption {
            p.validate()?;
        }
        Ok(())
    }
}

/// Parameters of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Events up to and including this time are dispatched.
    pub sim_duration: f64,
    /// Seed of the simulation RNG.
    #[serde(default)]
    pub seed: u64,
    /// Traffic streams; a stream is identified by its index.
    #[serde(default)]
    pub streams: Vec<StreamSpec>,
}

impl ExperimentConfig {
    /// Experiment without streams.
    pub fn new(sim_duration: f64, seed: u64) -> Self {
        Self {
            sim_duration,
            seed,
            streams: Vec::new(),
        }
    }

    /// Appends streams after the existing ones.
    pub fn with_streams(mut self, streams: impl IntoIterator<Item = StreamSpec>) -> Self {
        self.streams.extend(streams);
        self
    }

    /// Parses an experiment from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Checks the duration and every stream on its own. Reachability is checked against a topology by
    /// [`Fabric::new`](crate::Fabric::new).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sim_duration.is_finite() && self.sim_duration > 0.0) {
            return Err(ConfigError::invalid(
                "sim_duration",
                format!("{} must be positive", self.sim_duration),
            ));
        }
        for (i, stream) in self.streams.iter().enumerate() {
            stream.validate(i)?;
        }
        Ok(())
    }
}

/// A topology together with the experiment to run on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Fabric to simulate.
    pub topology: Topology,
    /// Run parameters and traffic.
    pub experiment: ExperimentConfig,
}

impl Scenario {
    /// Parses a scenario from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reads and parses a JSON scenario file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Pretty-printed JSON form of the scenario.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
