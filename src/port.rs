//! Egress port scheduler: strict-priority queues plus the optional preemption state machine.

use serde::Serialize;

use crate::error::SchedulingViolation;
use crate::message::{Frame, MessageId, Priority};
use crate::preemption::{Decision, PreemptionConfig, Suspended, SuspensionStack};
use crate::queue::PriorityQueues;

/// Token identifying one uninterrupted transmission segment of a frame on a port.
///
/// Completion events carry the token so that a completion of a segment that was cut short by preemption can be told
/// apart from the completion of the current one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// Unique per port.
    pub id: u64,
    /// Time the last byte leaves the port unless the segment is interrupted.
    pub finish_at: f64,
}

/// Observable state of an egress port.
#[derive(Debug, Clone, PartialEq)]
pub enum PortState {
    /// Nothing on the link.
    Idle,
    /// A frame is on the link.
    Transmitting {
        /// Message the frame belongs to.
        message: MessageId,
        /// Priority of the frame.
        priority: Priority,
        /// Bytes left at the time of the snapshot.
        remaining: u64,
        /// Whether a higher priority arrival could interrupt the frame now.
        preemptible: bool,
        /// Depth of the suspension stack.
        suspended: usize,
    },
}

/// Counters of one egress port.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PortStats {
    /// Frames accepted into a queue.
    pub frames_enqueued: u64,
    /// Frames rejected by a full queue.
    pub frames_dropped: u64,
    /// Drops by frame priority.
    pub drops_by_priority: [u64; Priority::LEVELS],
    /// Frames fully sent.
    pub frames_transmitted: u64,
    /// Frames interrupted by a higher priority frame.
    pub preemptions: u64,
    /// Preemptions counted by the priority of the interrupted frame.
    pub preemptions_by_priority: [u64; Priority::LEVELS],
    /// Suspended frames put back on the link.
    pub resumptions: u64,
    /// Preemptions denied by the policy.
    pub refused_preemptions: u64,
    /// Guard band and resume overhead charged to the port timeline.
    pub overhead_bytes: u64,
    /// Seconds the port spent transmitting or paying overhead.
    pub busy_time: f64,
    /// Deepest suspension stack seen.
    pub max_suspension_depth: usize,
}

/// Result of a successful preemption.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preempted {
    /// Segment of the interrupted frame whose completion must not fire.
    pub cancelled: Segment,
    /// Segment of the frame that took over the link.
    pub started: Segment,
}

#[derive(Debug, Clone)]
struct Transmission {
    frame: Frame,
    segment: Segment,
    started_at: f64,
    data_start: f64,
    remaining_at_start: u64,
}

/// Egress side of a link.
#[derive(Debug, Clone)]
pub struct EgressPort {
    queues: PriorityQueues,
    current: Option<Transmission>,
    suspended: SuspensionStack,
    preemption: Option<PreemptionConfig>,
    bandwidth_bps: f64,
    next_segment: u64,
    last_preemption: Option<f64>,
    stats: PortStats,
}

impl EgressPort {
    /// Idle port; `preemption` enables the preemption engine.
    pub fn new(bandwidth_bps: f64, queue_capacity: usize, preemption: Option<PreemptionConfig>) -> Self {
        Self {
            queues: PriorityQueues::new(queue_capacity),
            current: None,
            suspended: SuspensionStack::new(),
            preemption,
            bandwidth_bps,
            next_segment: 0,
            last_preemption: None,
            stats: PortStats::default(),
        }
    }

    fn seconds(&self, bytes: u64) -> f64 {
        bytes as f64 * 8.0 / self.bandwidth_bps
    }

    /// Port counters.
    pub fn stats(&self) -> &PortStats {
        &self.stats
    }

    /// Whether nothing is being transmitted.
    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    /// Frames waiting in the queues, suspended ones excluded.
    pub fn queued(&self) -> usize {
        self.queues.len()
    }

    /// Preemption parameters, if enabled.
    pub fn preemption(&self) -> Option<&PreemptionConfig> {
        self.preemption.as_ref()
    }

    /// Queues a frame; a full queue hands it back as a drop.
    pub fn enqueue(&mut self, frame: Frame) -> Result<(), Frame> {
        let priority = frame.priority();
        match self.queues.push(frame) {
            Ok(()) => {
                self.stats.frames_enqueued += 1;
                Ok(())
            }
            Err(frame) => {
                self.stats.frames_dropped += 1;
                self.stats.drops_by_priority[priority.index()] += 1;
                Err(frame)
            }
        }
    }

    /// Starts the next transmission on an idle port.
    ///
    /// A suspended frame is resumed before anything is taken from the queues. Returns `None` if there is nothing
    /// to send.
    pub fn start_next(&mut self, now: f64) -> Result<Option<Segment>, SchedulingViolation> {
        if let Some(tx) = &self.current {
            return Err(SchedulingViolation::new(
                now,
                format!("port is still transmitting {}", tx.frame.message.id),
            ));
        }
        if let Some(entry) = self.suspended.pop() {
            let overhead = self.preemption.as_ref().map_or(0, |p| p.resume_overhead_bytes);
            self.stats.resumptions += 1;
            self.stats.overhead_bytes += overhead;
            return self.begin(entry.frame, now, overhead).map(Some);
        }
        match self.queues.pop_highest() {
            Some(frame) => self.begin(frame, now, 0).map(Some),
            None => Ok(None),
        }
    }

    fn begin(&mut self, frame: Frame, now: f64, overhead_bytes: u64) -> Result<Segment, SchedulingViolation> {
        frame
            .check_resumable()
            .map_err(|detail| SchedulingViolation::new(now, detail))?;
        let data_start = now + self.seconds(overhead_bytes);
        let segment = Segment {
            id: self.next_segment,
            finish_at: data_start + self.seconds(frame.remaining_bytes),
        };
        self.next_segment += 1;
        self.current = Some(Transmission {
            remaining_at_start: frame.remaining_bytes,
            frame,
            segment,
            started_at: now,
            data_start,
        });
        Ok(segment)
    }

    fn remaining_at(&self, tx: &Transmission, now: f64) -> u64 {
        let sent = ((now - tx.data_start) * self.bandwidth_bps / 8.0).floor().max(0.0) as u64;
        tx.remaining_at_start - sent.min(tx.remaining_at_start)
    }

    /// Reacts to the arrival of a frame of priority `arrived` that was just queued.
    ///
    /// Only an arrival that outranks the current frame can interrupt it. The head of the highest queue then takes
    /// over the link if the policy allows it. A refusal is counted once per arrival.
    pub fn try_preempt(&mut self, arrived: Priority, now: f64) -> Result<Option<Preempted>, SchedulingViolation> {
        let (Some(cfg), Some(tx)) = (&self.preemption, &self.current) else {
            return Ok(None);
        };
        if self.queues.highest_priority().is_none() {
            return Ok(None);
        }
        let occupant = tx.frame.priority();
        let remaining = self.remaining_at(tx, now);
        match cfg.evaluate(occupant, arrived, remaining, now, self.last_preemption) {
            Decision::NotApplicable => return Ok(None),
            Decision::Refuse(_) => {
                self.stats.refused_preemptions += 1;
                return Ok(None);
            }
            Decision::Preempt => {}
        }
        let guard_band = cfg.guard_band_bytes;
        let Some(mut tx) = self.current.take() else {
            return Ok(None);
        };
        let sent = tx.remaining_at_start - remaining;
        tx.frame.sent_bytes += sent;
        tx.frame.remaining_bytes = remaining;
        self.stats.busy_time += now - tx.started_at;
        self.suspended.push(Suspended {
            frame: tx.frame,
            suspended_at: now,
        })?;
        self.stats.max_suspension_depth = self.stats.max_suspension_depth.max(self.suspended.depth());
        self.stats.preemptions += 1;
        self.stats.preemptions_by_priority[occupant.index()] += 1;
        self.stats.overhead_bytes += guard_band;
        self.last_preemption = Some(now);
        let Some(next) = self.queues.pop_highest() else {
            return Err(SchedulingViolation::new(now, "preemption candidate vanished from its queue"));
        };
        let started = self.begin(next, now, guard_band)?;
        Ok(Some(Preempted {
            cancelled: tx.segment,
            started,
        }))
    }

    /// Finishes the current transmission and returns the fully sent frame.
    ///
    /// The segment must be the one currently on the link.
    pub fn complete(&mut self, segment: u64, now: f64) -> Result<Frame, SchedulingViolation> {
        match &self.current {
            Some(tx) if tx.segment.id == segment => {}
            Some(tx) => {
                return Err(SchedulingViolation::new(
                    now,
                    format!(
                        "stale completion of segment {segment} while segment {} of {} is on the link",
                        tx.segment.id, tx.frame.message.id
                    ),
                ))
            }
            None => {
                return Err(SchedulingViolation::new(
                    now,
                    format!("completion of segment {segment} on an idle port"),
                ))
            }
        }
        let Some(tx) = self.current.take() else {
            return Err(SchedulingViolation::new(now, "port emptied during completion"));
        };
        let mut frame = tx.frame;
        frame.sent_bytes += frame.remaining_bytes;
        frame.remaining_bytes = 0;
        if frame.sent_bytes != frame.message.size_bytes {
            return Err(SchedulingViolation::new(
                now,
                format!(
                    "{} completed with {} of {} bytes sent",
                    frame.message.id, frame.sent_bytes, frame.message.size_bytes
                ),
            ));
        }
        self.stats.busy_time += now - tx.started_at;
        self.stats.frames_transmitted += 1;
        Ok(frame)
    }

    /// Snapshot of the port state at `now`.
    pub fn state(&self, now: f64) -> PortState {
        match &self.current {
            None => PortState::Idle,
            Some(tx) => {
                let remaining = self.remaining_at(tx, now);
                PortState::Transmitting {
                    message: tx.frame.message.id,
                    priority: tx.frame.priority(),
                    remaining,
                    preemptible: self
                        .preemption
                        .as_ref()
                        .is_some_and(|p| remaining > p.min_preemptible_remainder),
                    suspended: self.suspended.depth(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::message::test_helpers::frame;

    const GBPS: f64 = 1e9;

    fn p(level: u8) -> Priority {
        Priority::new(level).unwrap()
    }

    fn preemptive(gb: u64, threshold: u64) -> EgressPort {
        EgressPort::new(GBPS, 16, Some(PreemptionConfig::symmetric(gb, threshold)))
    }

    #[test]
    fn transmission_time_follows_bandwidth() {
        let mut port = EgressPort::new(GBPS, 16, None);
        port.enqueue(frame(1, 0, 1250)).unwrap();
        let seg = port.start_next(0.0).unwrap().unwrap();
        assert_abs_diff_eq!(seg.finish_at, 10e-6, epsilon = 1e-15);
        let done = port.complete(seg.id, seg.finish_at).unwrap();
        assert_eq!(done.sent_bytes, 1250);
        assert!(port.is_idle());
        assert!(port.start_next(seg.finish_at).unwrap().is_none());
    }

    #[test]
    fn non_preemptive_port_serves_highest_waiting_first() {
        let mut port = EgressPort::new(GBPS, 16, None);
        port.enqueue(frame(1, 0, 1000)).unwrap();
        let seg = port.start_next(0.0).unwrap().unwrap();
        port.enqueue(frame(2, 1, 1000)).unwrap();
        port.enqueue(frame(3, 7, 1000)).unwrap();
        assert!(port.try_preempt(p(7), 1e-6).unwrap().is_none());
        port.complete(seg.id, seg.finish_at).unwrap();
        let next = port.start_next(seg.finish_at).unwrap().unwrap();
        let f = port.complete(next.id, next.finish_at).unwrap();
        assert_eq!(f.message.id.0, 3);
    }

    #[test]
    fn pause_and_resume_preserve_remaining_bytes() {
        let mut port = preemptive(24, 64);
        port.enqueue(frame(1, 1, 1500)).unwrap();
        let low = port.start_next(0.0).unwrap().unwrap();
        // a little over 500 bytes are on the wire after 4 us
        let t = 4.0001e-6;
        port.enqueue(frame(2, 7, 100)).unwrap();
        let pre = port.try_preempt(p(7), t).unwrap().unwrap();
        assert_eq!(pre.cancelled, low);
        match port.state(t) {
            PortState::Transmitting { priority, suspended, .. } => {
                assert_eq!(priority, Priority::HIGHEST);
                assert_eq!(suspended, 1);
            }
            PortState::Idle => panic!("port should be busy"),
        }
        // guard band 24 B plus 100 B of data
        assert_abs_diff_eq!(pre.started.finish_at, t + 124.0 * 8.0 / GBPS, epsilon = 1e-15);
        assert!(port.complete(low.id, low.finish_at).is_err());
        let high = port.complete(pre.started.id, pre.started.finish_at).unwrap();
        assert_eq!(high.message.id.0, 2);

        let resumed = port.start_next(pre.started.finish_at).unwrap().unwrap();
        assert_abs_diff_eq!(
            resumed.finish_at - pre.started.finish_at,
            (24.0 + 1000.0) * 8.0 / GBPS,
            epsilon = 1e-15
        );
        let low_frame = port.complete(resumed.id, resumed.finish_at).unwrap();
        assert_eq!(low_frame.sent_bytes, 1500);
        let stats = port.stats();
        assert_eq!(stats.preemptions, 1);
        assert_eq!(stats.resumptions, 1);
        assert_eq!(stats.overhead_bytes, 48);
        assert_eq!(stats.preemptions_by_priority[1], 1);
    }

    #[test]
    fn nearly_finished_frame_is_not_preempted() {
        let mut port = preemptive(24, 64);
        port.enqueue(frame(1, 0, 1000)).unwrap();
        let seg = port.start_next(0.0).unwrap().unwrap();
        port.enqueue(frame(2, 7, 100)).unwrap();
        // 960 bytes sent, 40 left
        assert!(port.try_preempt(p(7), 7.68e-6).unwrap().is_none());
        assert_eq!(port.stats().refused_preemptions, 1);
        assert!(matches!(port.state(7.68e-6), PortState::Transmitting { preemptible: false, .. }));
        let f = port.complete(seg.id, seg.finish_at).unwrap();
        assert_eq!(f.message.id.0, 1);
    }

    #[test]
    fn nested_preemption_unwinds_in_lifo_order() {
        let mut port = preemptive(0, 0);
        port.enqueue(frame(1, 1, 1000)).unwrap();
        port.start_next(0.0).unwrap();
        port.enqueue(frame(2, 4, 1000)).unwrap();
        let first = port.try_preempt(p(4), 1e-6).unwrap().unwrap();
        port.enqueue(frame(3, 7, 1000)).unwrap();
        let second = port.try_preempt(p(7), 2e-6).unwrap().unwrap();
        assert_eq!(second.cancelled, first.started);
        assert_eq!(port.stats().max_suspension_depth, 2);

        let mut order = Vec::new();
        let mut seg = second.started;
        loop {
            let f = port.complete(seg.id, seg.finish_at).unwrap();
            order.push(f.message.id.0);
            match port.start_next(seg.finish_at).unwrap() {
                Some(next) => seg = next,
                None => break,
            }
        }
        assert_eq!(order, vec![3, 2, 1]);
        assert_eq!(port.stats().resumptions, 2);
    }

    #[test]
    fn waiting_frame_does_not_preempt_on_lower_arrival() {
        let mut port = preemptive(0, 0);
        port.enqueue(frame(1, 1, 10_000)).unwrap();
        port.start_next(0.0).unwrap();
        port.enqueue(frame(2, 4, 1000)).unwrap();
        let high = port.try_preempt(p(4), 1e-6).unwrap().unwrap();
        // p3 cannot interrupt p4 and waits
        port.enqueue(frame(3, 3, 1000)).unwrap();
        assert!(port.try_preempt(p(3), 2e-6).unwrap().is_none());
        port.complete(high.started.id, high.started.finish_at).unwrap();

        // the suspended p1 frame goes back on the link ahead of the waiting p3 frame
        let resumed = port.start_next(high.started.finish_at).unwrap().unwrap();
        let t = high.started.finish_at + 1e-6;
        port.enqueue(frame(4, 0, 1000)).unwrap();
        assert!(port.try_preempt(p(0), t).unwrap().is_none());
        assert_eq!(port.stats().preemptions, 1);
        assert_eq!(port.stats().refused_preemptions, 0);
        assert!(matches!(port.state(t), PortState::Transmitting { message, .. } if message.0 == 1));

        let mut order = Vec::new();
        let mut seg = resumed;
        loop {
            order.push(port.complete(seg.id, seg.finish_at).unwrap().message.id.0);
            match port.start_next(seg.finish_at).unwrap() {
                Some(next) => seg = next,
                None => break,
            }
        }
        assert_eq!(order, vec![1, 3, 4]);
    }

    #[test]
    fn refusal_is_counted_once_per_arrival() {
        let mut port = preemptive(24, 600);
        port.enqueue(frame(1, 1, 1000)).unwrap();
        let seg = port.start_next(0.0).unwrap().unwrap();
        // 612 bytes sent, 388 left
        let t = 4.9e-6;
        port.enqueue(frame(2, 7, 100)).unwrap();
        assert!(port.try_preempt(p(7), t).unwrap().is_none());
        assert_eq!(port.stats().refused_preemptions, 1);

        for id in [3, 4] {
            port.enqueue(frame(id, 0, 100)).unwrap();
            assert!(port.try_preempt(p(0), t + 1e-7).unwrap().is_none());
        }
        assert_eq!(port.stats().refused_preemptions, 1);
        assert_eq!(port.stats().preemptions, 0);
        let f = port.complete(seg.id, seg.finish_at).unwrap();
        assert_eq!(f.message.id.0, 1);
    }

    #[test]
    fn drops_are_counted_per_priority() {
        let mut port = EgressPort::new(GBPS, 1, None);
        port.enqueue(frame(1, 3, 100)).unwrap();
        assert!(port.enqueue(frame(2, 3, 100)).is_err());
        assert_eq!(port.stats().frames_dropped, 1);
        assert_eq!(port.stats().drops_by_priority[3], 1);
    }

    #[test]
    fn starting_a_busy_port_is_a_violation() {
        let mut port = EgressPort::new(GBPS, 4, None);
        port.enqueue(frame(1, 3, 100)).unwrap();
        port.enqueue(frame(2, 3, 100)).unwrap();
        port.start_next(0.0).unwrap();
        assert!(port.start_next(0.0).is_err());
    }
}
