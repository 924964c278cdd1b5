//! Store-and-forward switches.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::cast;
use crate::context::SimulationContext;
use crate::error::{SchedulingViolation, SimResult};
use crate::event::Event;
use crate::events::{FrameArrived, TransmissionCompleted};
use crate::handler::EventHandler;
use crate::link::Link;
use crate::log_trace;
use crate::message::{Frame, Message, NodeId, SwitchId};
use crate::metrics::MetricsSink;
use crate::topology::PortId;

/// Forwarding counters of a switch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SwitchStats {
    /// Messages that arrived on any port.
    pub received: u64,
    /// Messages handed to an egress port, dropped ones included.
    pub forwarded: u64,
}

/// Switch owning the egress ports and forwarding table. Nothing else touches its port state.
pub struct Switch {
    id: SwitchId,
    ports: Vec<Link>,
    routes: FxHashMap<NodeId, PortId>,
    metrics: Rc<RefCell<MetricsSink>>,
    stats: SwitchStats,
    ctx: SimulationContext,
}

impl Switch {
    /// Creates a switch with its ports and forwarding table.
    pub fn new(
        id: SwitchId,
        ports: Vec<Link>,
        routes: impl IntoIterator<Item = (NodeId, PortId)>,
        metrics: Rc<RefCell<MetricsSink>>,
        ctx: SimulationContext,
    ) -> Self {
        Self {
            id,
            ports,
            routes: routes.into_iter().collect(),
            metrics,
            stats: SwitchStats::default(),
            ctx,
        }
    }

    /// Switch identifier in the topology.
    pub fn id(&self) -> SwitchId {
        self.id
    }

    /// Egress ports in index order.
    pub fn ports(&self) -> &[Link] {
        &self.ports
    }

    /// Forwarding counters.
    pub fn stats(&self) -> &SwitchStats {
        &self.stats
    }

    fn violation(&self, port: Option<PortId>, detail: String) -> crate::error::Error {
        SchedulingViolation::new(self.ctx.time(), detail)
            .at(self.ctx.name(), port)
            .into()
    }

    fn on_frame_arrived(&mut self, message: Message) -> SimResult {
        self.stats.received += 1;
        let Some(&port) = self.routes.get(&message.dst) else {
            return Err(self.violation(None, format!("no route for {} to {}", message.id, message.dst)));
        };
        if port >= self.ports.len() {
            return Err(self.violation(Some(port), format!("route for {} points at a missing port", message.dst)));
        }
        log_trace!(self.ctx, "forwarding {} to port {}", message.id, port);
        self.stats.forwarded += 1;
        self.ports[port].offer(Frame::new(message, port), &self.ctx, &mut self.metrics.borrow_mut())
    }

    fn on_transmission_completed(&mut self, port: PortId, segment: u64) -> SimResult {
        if let Some(link) = self.ports.get_mut(port) {
            return link.complete(segment, &self.ctx);
        }
        Err(self.violation(Some(port), format!("completion of segment {segment} on a missing port")))
    }
}

impl EventHandler for Switch {
    fn on(&mut self, event: Event) -> SimResult {
        cast!(match event.data {
            FrameArrived { message } => {
                self.on_frame_arrived(message)
            }
            TransmissionCompleted { port, segment } => {
                self.on_transmission_completed(port, segment)
            }
        })
    }
}
