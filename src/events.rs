//! Event payloads exchanged between fabric components.

use serde::Serialize;

use crate::message::{Message, StreamId};
use crate::topology::PortId;

/// A stream emitted a message at its source node.
#[derive(Clone, Serialize)]
pub struct MessageCreated {
    /// The new message.
    pub message: Message,
}

/// The last byte of a message reached the receiving end of a link.
#[derive(Clone, Serialize)]
pub struct FrameArrived {
    /// The message carried by the frame.
    pub message: Message,
}

/// An egress port finished a transmission segment.
#[derive(Clone, Serialize)]
pub struct TransmissionCompleted {
    /// Port of the receiving component.
    pub port: PortId,
    /// Segment token issued when the transmission started.
    pub segment: u64,
}

/// Periodic tick of a traffic stream.
#[derive(Clone, Serialize)]
pub struct StreamTick {
    /// Stream to fire.
    pub stream: StreamId,
}
