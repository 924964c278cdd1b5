//! Directed links and their egress ports.

use serde::{Deserialize, Serialize};

use crate::component::Id;
use crate::context::SimulationContext;
use crate::error::{ConfigError, SchedulingViolation, SimResult};
use crate::event::EventId;
use crate::events::{FrameArrived, TransmissionCompleted};
use crate::message::Frame;
use crate::metrics::{DropPoint, MetricsSink};
use crate::port::{EgressPort, PortState, PortStats, Segment};
use crate::topology::PortId;
use crate::{log_debug, log_trace};

/// Physical parameters of a directed link.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkSpec {
    /// Bits per second.
    pub bandwidth_bps: f64,
    /// Seconds from the last byte leaving the port to its arrival at the peer.
    pub propagation_delay: f64,
}

impl LinkSpec {
    /// Link with bandwidth in bits per second and delay in seconds.
    pub fn new(bandwidth_bps: f64, propagation_delay: f64) -> Self {
        Self {
            bandwidth_bps,
            propagation_delay,
        }
    }

    /// Link with bandwidth given in megabits per second and delay in milliseconds.
    pub fn mbps_ms(mbps: f64, delay_ms: f64) -> Self {
        Self::new(mbps * 1e6, delay_ms * 1e-3)
    }

    /// Serialization time of `bytes` on this link.
    pub fn transmission_time(&self, bytes: u64) -> f64 {
        bytes as f64 * 8.0 / self.bandwidth_bps
    }

    /// Requires a positive bandwidth and a non-negative delay.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.bandwidth_bps.is_finite() && self.bandwidth_bps > 0.0) {
            return Err(ConfigError::invalid(
                "bandwidth_bps",
                format!("{} must be positive", self.bandwidth_bps),
            ));
        }
        if !(self.propagation_delay.is_finite() && self.propagation_delay >= 0.0) {
            return Err(ConfigError::invalid(
                "propagation_delay",
                format!("{} must be non-negative", self.propagation_delay),
            ));
        }
        Ok(())
    }
}

/// Outbound interface of a node or switch.
pub struct Link {
    index: PortId,
    spec: LinkSpec,
    peer: Id,
    port: EgressPort,
    completion: Option<EventId>,
}

impl Link {
    /// Link leaving through port `index` towards component `peer`.
    pub fn new(index: PortId, spec: LinkSpec, peer: Id, port: EgressPort) -> Self {
        Self {
            index,
            spec,
            peer,
            port,
            completion: None,
        }
    }

    /// Port index within the owner.
    pub fn index(&self) -> PortId {
        self.index
    }

    /// Physical parameters.
    pub fn spec(&self) -> &LinkSpec {
        &self.spec
    }

    /// Component receiving the frames.
    pub fn peer(&self) -> Id {
        self.peer
    }

    /// Counters of the egress port.
    pub fn stats(&self) -> &PortStats {
        self.port.stats()
    }

    /// Snapshot of the egress port at `now`.
    pub fn state(&self, now: f64) -> PortState {
        self.port.state(now)
    }

    fn violation(&self, ctx: &SimulationContext, e: SchedulingViolation) -> crate::error::Error {
        e.at(ctx.name(), Some(self.index)).into()
    }

    /// Hands a frame to the egress port.
    ///
    /// The frame is dropped if its queue is full. Otherwise an idle port starts transmitting and a busy port checks
    /// whether the new arrival outranks and may preempt the current frame.
    pub fn offer(&mut self, frame: Frame, ctx: &SimulationContext, metrics: &mut MetricsSink) -> SimResult {
        let now = ctx.time();
        let priority = frame.priority();
        if let Err(frame) = self.port.enqueue(frame) {
            log_debug!(
                ctx,
                "port {}: queue {} full, dropped {}",
                self.index,
                frame.priority(),
                frame.message.id
            );
            metrics.record_dropped(
                frame.message,
                now,
                DropPoint {
                    component: ctx.name().to_string(),
                    port: self.index,
                    priority: frame.priority(),
                },
            );
            return Ok(());
        }
        if self.port.is_idle() {
            return self.start_next(ctx);
        }
        let preempted = self.port.try_preempt(priority, now).map_err(|e| self.violation(ctx, e))?;
        if let Some(preempted) = preempted {
            if let Some(id) = self.completion.take() {
                ctx.cancel_event(id);
            }
            log_debug!(
                ctx,
                "port {}: preempted segment {}, started segment {}",
                self.index,
                preempted.cancelled.id,
                preempted.started.id
            );
            self.schedule_completion(preempted.started, ctx)?;
        }
        Ok(())
    }

    fn start_next(&mut self, ctx: &SimulationContext) -> SimResult {
        let started = self.port.start_next(ctx.time()).map_err(|e| self.violation(ctx, e))?;
        if let Some(segment) = started {
            self.schedule_completion(segment, ctx)?;
        }
        Ok(())
    }

    fn schedule_completion(&mut self, segment: Segment, ctx: &SimulationContext) -> SimResult {
        let id = ctx.emit_at(
            TransmissionCompleted {
                port: self.index,
                segment: segment.id,
            },
            ctx.id(),
            segment.finish_at,
        )?;
        self.completion = Some(id);
        Ok(())
    }

    /// Finishes the current segment, sends the message to the peer and starts the next transmission.
    pub fn complete(&mut self, segment: u64, ctx: &SimulationContext) -> SimResult {
        let frame = self.port.complete(segment, ctx.time()).map_err(|e| self.violation(ctx, e))?;
        self.completion = None;
        log_trace!(ctx, "port {}: sent {}", self.index, frame.message.id);
        ctx.emit(
            FrameArrived {
                message: frame.message,
            },
            self.peer,
            self.spec.propagation_delay,
        )?;
        self.start_next(ctx)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn transmission_time_in_seconds() {
        let spec = LinkSpec::mbps_ms(1000.0, 0.5);
        assert_relative_eq!(spec.transmission_time(1500), 12e-6);
        assert_relative_eq!(spec.propagation_delay, 0.0005);
    }

    #[test]
    fn invalid_link_parameters() {
        assert!(LinkSpec::new(0.0, 0.0).validate().is_err());
        assert!(LinkSpec::new(1e9, -1.0).validate().is_err());
        assert!(LinkSpec::new(f64::NAN, 0.0).validate().is_err());
        assert!(LinkSpec::new(1e9, 0.0).validate().is_ok());
    }
}
