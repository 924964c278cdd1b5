//! Compute nodes: inject messages through their uplink and absorb messages addressed to them.

use std::cell::RefCell;
use std::rc::Rc;

use crate::cast;
use crate::context::SimulationContext;
use crate::error::{SchedulingViolation, SimResult};
use crate::event::Event;
use crate::events::{FrameArrived, MessageCreated, TransmissionCompleted};
use crate::handler::EventHandler;
use crate::link::Link;
use crate::message::{Frame, Message, NodeId};
use crate::metrics::MetricsSink;
use crate::port::PortStats;
use crate::topology::PortId;
use crate::{log_debug, log_trace};

/// Compute node with at most one uplink.
pub struct Node {
    id: NodeId,
    uplink: Option<Link>,
    metrics: Rc<RefCell<MetricsSink>>,
    received: u64,
    ctx: SimulationContext,
}

impl Node {
    /// Creates the node; deliveries are recorded in `metrics`.
    pub fn new(id: NodeId, uplink: Option<Link>, metrics: Rc<RefCell<MetricsSink>>, ctx: SimulationContext) -> Self {
        Self {
            id,
            uplink,
            metrics,
            received: 0,
            ctx,
        }
    }

    /// Node identifier in the topology.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Outbound link, if any.
    pub fn uplink(&self) -> Option<&Link> {
        self.uplink.as_ref()
    }

    /// Counters of the uplink port.
    pub fn uplink_stats(&self) -> Option<&PortStats> {
        self.uplink.as_ref().map(Link::stats)
    }

    /// Messages delivered to this node.
    pub fn received(&self) -> u64 {
        self.received
    }

    fn violation(&self, port: Option<PortId>, detail: String) -> crate::error::Error {
        SchedulingViolation::new(self.ctx.time(), detail)
            .at(self.ctx.name(), port)
            .into()
    }

    fn on_message_created(&mut self, message: Message) -> SimResult {
        let Some(link) = self.uplink.as_mut() else {
            return Err(self.violation(None, format!("{} created at a node without uplink", message.id)));
        };
        log_trace!(self.ctx, "injecting {} for {}", message.id, message.dst);
        let frame = Frame::new(message, link.index());
        link.offer(frame, &self.ctx, &mut self.metrics.borrow_mut())
    }

    fn on_frame_arrived(&mut self, message: Message) -> SimResult {
        if message.dst != self.id {
            return Err(self.violation(None, format!("{} for {} arrived at {}", message.id, message.dst, self.id)));
        }
        let now = self.ctx.time();
        self.received += 1;
        log_debug!(
            self.ctx,
            "received {} from {} after {:.9}s",
            message.id,
            message.src,
            now - message.created_at
        );
        self.metrics.borrow_mut().record_delivered(message, now);
        Ok(())
    }

    fn on_transmission_completed(&mut self, port: PortId, segment: u64) -> SimResult {
        if let Some(link) = self.uplink.as_mut().filter(|l| l.index() == port) {
            return link.complete(segment, &self.ctx);
        }
        Err(self.violation(Some(port), format!("completion of segment {segment} on a missing port")))
    }
}

impl EventHandler for Node {
    fn on(&mut self, event: Event) -> SimResult {
        cast!(match event.data {
            MessageCreated { message } => {
                self.on_message_created(message)
            }
            FrameArrived { message } => {
                self.on_frame_arrived(message)
            }
            TransmissionCompleted { port, segment } => {
                self.on_transmission_completed(port, segment)
            }
        })
    }
}
