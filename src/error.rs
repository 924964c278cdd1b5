//! Error types.
//!
//! Configuration problems are reported by [`Fabric::new`](crate::Fabric::new) before any event is dispatched.
//! Scheduling violations indicate a broken engine invariant and abort the run. Queue overflows are not errors:
//! they are recorded as drops in the [`MetricsSink`](crate::MetricsSink).

use thiserror::Error;

use crate::message::{NodeId, StreamId, SwitchId};
use crate::topology::PortId;

/// Invalid topology or experiment parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A numeric or structural parameter is out of its allowed range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },
    /// A node identifier does not exist in the topology.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    /// A switch identifier does not exist in the topology.
    #[error("unknown switch {0}")]
    UnknownSwitch(SwitchId),
    /// Two components share the same name.
    #[error("duplicate component name `{0}`")]
    DuplicateName(String),
    /// A forwarding entry points at a port the switch does not have.
    #[error("switch `{switch}` routes {dst} to port {port} which does not exist")]
    DanglingRoute {
        /// Switch name.
        switch: String,
        /// Destination of the entry.
        dst: NodeId,
        /// Missing port index.
        port: PortId,
    },
    /// A node that sources traffic has no outbound link.
    #[error("node `{0}` has no uplink")]
    MissingUplink(String),
    /// The forwarding tables do not lead from `src` to `dst`.
    #[error("{dst} is unreachable from {src}: {reason}")]
    Unreachable {
        /// Source node.
        src: NodeId,
        /// Destination node.
        dst: NodeId,
        /// Where the walk stopped.
        reason: String,
    },
    /// A stream definition is invalid.
    #[error("stream {stream}: {reason}")]
    InvalidStream {
        /// Offending stream.
        stream: StreamId,
        /// What is wrong with it.
        reason: String,
    },
    /// A configuration document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

impl ConfigError {
    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Internal engine contract breach. Continuing after one would produce meaningless metrics.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("scheduling violation at t={time:.9} in `{component}`{}: {detail}", port_suffix(.port))]
pub struct SchedulingViolation {
    /// Simulation time of the violation.
    pub time: f64,
    /// Name of the component where it was detected (empty if not yet attributed).
    pub component: String,
    /// Egress port, if the violation concerns one.
    pub port: Option<PortId>,
    /// Description including the offending frame state.
    pub detail: String,
}

fn port_suffix(port: &Option<PortId>) -> String {
    port.map(|p| format!(" port {p}")).unwrap_or_default()
}

impl SchedulingViolation {
    /// Creates a violation not yet attributed to a component.
    pub fn new(time: f64, detail: impl Into<String>) -> Self {
        Self {
            time,
            component: String::new(),
            port: None,
            detail: detail.into(),
        }
    }

    /// Attributes the violation to a component and optionally a port.
    pub fn at(mut self, component: &str, port: Option<PortId>) -> Self {
        self.component = component.to_string();
        self.port = port.or(self.port);
        self
    }
}

/// Top-level error type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Rejected before the run started.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Aborted the run.
    #[error(transparent)]
    Scheduling(#[from] SchedulingViolation),
}

impl Error {
    /// Returns `true` for configuration errors.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

/// Result type used throughout the crate.
pub type SimResult<T = ()> = Result<T, Error>;
