//! Messages, frames and the identifiers they carry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::topology::PortId;

/// Compute node (traffic source and sink).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// Switch of the fabric.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SwitchId(pub u32);

impl fmt::Display for SwitchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// Periodic traffic stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub u32);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

/// Globally unique message identifier, assigned in creation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg#{}", self.0)
    }
}

/// Traffic class, 0 (lowest) to 7 (highest).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    /// Number of priority levels.
    pub const LEVELS: usize = 8;
    /// Priority 0.
    pub const LOWEST: Priority = Priority(0);
    /// Priority 7.
    pub const HIGHEST: Priority = Priority(7);

    /// Returns `None` if `level` is not in `0..=7`.
    pub fn new(level: u8) -> Option<Self> {
        ((level as usize) < Self::LEVELS).then_some(Priority(level))
    }

    /// Numeric level.
    pub fn level(self) -> u8 {
        self.0
    }

    /// Index into per-priority arrays.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Number of levels strictly above `self`, which bounds how many frames can be suspended under it.
    pub fn levels_above(self) -> usize {
        Self::LEVELS - 1 - self.index()
    }
}

impl TryFrom<u8> for Priority {
    type Error = ConfigError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Priority::new(level).ok_or_else(|| ConfigError::invalid("priority", format!("{level} is not in 0..=7")))
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> u8 {
        p.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Label attached to every stream so analysis can separate collective phases from cross traffic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseTag {
    /// All-to-All exchange.
    AllToAll,
    /// All-Reduce, reduce phase (towards the root).
    Reduce,
    /// All-Reduce, broadcast phase (from the root).
    Broadcast,
    /// Hierarchical All-to-All inside a rack.
    IntraRack,
    /// Hierarchical All-to-All between rack representatives.
    InterRack,
    /// Hierarchical All-to-All from a representative to its rack.
    RackDistribution,
    /// Hierarchical All-Reduce towards the rack representative.
    LocalReduce,
    /// Hierarchical All-Reduce between representatives towards the global root.
    GlobalReduce,
    /// Hierarchical All-Reduce from the global root to representatives.
    GlobalBroadcast,
    /// Hierarchical All-Reduce from a representative to its rack.
    LocalBroadcast,
    /// Cross traffic competing with collectives.
    Background,
    /// User-defined stream without a collective role.
    #[default]
    Unlabeled,
}

impl PhaseTag {
    /// Whether the stream belongs to a collective operation.
    pub fn is_collective(self) -> bool {
        !matches!(self, PhaseTag::Background | PhaseTag::Unlabeled)
    }
}

/// Application message. Immutable once created.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique within a run.
    pub id: MessageId,
    /// Stream that emitted the message.
    pub stream: StreamId,
    /// Sequence number within the stream.
    pub seq: u64,
    /// Source node.
    pub src: NodeId,
    /// Destination node.
    pub dst: NodeId,
    /// Scheduling priority at every hop.
    pub priority: Priority,
    /// Size on the wire.
    pub size_bytes: u64,
    /// Simulation time of emission at the source.
    pub created_at: f64,
    /// Phase of the emitting stream.
    pub phase: PhaseTag,
}

/// Per-hop transmission unit of a message on one link.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// Message carried by the frame.
    pub message: Message,
    /// Bytes still to put on the wire at this hop.
    pub remaining_bytes: u64,
    /// Bytes already put on the wire at this hop.
    pub sent_bytes: u64,
    /// Port the frame leaves through.
    pub egress_port: PortId,
}

impl Frame {
    /// Frame with nothing sent yet.
    pub fn new(message: Message, egress_port: PortId) -> Self {
        Self {
            message,
            remaining_bytes: message.size_bytes,
            sent_bytes: 0,
            egress_port,
        }
    }

    /// Priority of the carried message.
    pub fn priority(&self) -> Priority {
        self.message.priority
    }

    /// Checks the byte accounting of a frame that is about to (re)start transmission.
    pub(crate) fn check_resumable(&self) -> Result<(), String> {
        let size = self.message.size_bytes;
        if self.remaining_bytes == 0 || self.remaining_bytes > size || self.sent_bytes + self.remaining_bytes != size {
            return Err(format!(
                "inconsistent frame state for {}: size {}, sent {}, remaining {}",
                self.message.id, size, self.sent_bytes, self.remaining_bytes
            ));
        }
        Ok(())
    }
}
