//! Periodic traffic streams and the generator component that drives them.

use serde::{Deserialize, Serialize};

use crate::cast;
use crate::component::Id;
use crate::context::SimulationContext;
use crate::error::{ConfigError, SchedulingViolation, SimResult};
use crate::event::Event;
use crate::events::{MessageCreated, StreamTick};
use crate::handler::EventHandler;
use crate::log_trace;
use crate::message::{Message, MessageId, NodeId, PhaseTag, Priority, StreamId};

/// Periodic source of equally sized messages between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSpec {
    /// Source node.
    pub src: NodeId,
    /// Destination node.
    pub dst: NodeId,
    /// Priority of every message.
    pub priority: Priority,
    /// Bytes per message.
    pub message_size: u64,
    /// Seconds between consecutive messages.
    pub interval: f64,
    /// Label used by the metrics.
    #[serde(default)]
    pub phase: PhaseTag,
    /// Time of the first message.
    #[serde(default)]
    pub start_time: f64,
    /// Relative interval jitter: each gap is scaled by a uniform factor in `[1 - jitter, 1 + jitter]`.
    #[serde(default)]
    pub jitter: f64,
}

/// Parameters shared by all streams of a collective pattern.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamParams {
    /// Priority of every message.
    pub priority: Priority,
    /// Bytes per message.
    pub message_size: u64,
    /// Seconds between consecutive messages.
    pub interval: f64,
    /// Time of the first message.
    #[serde(default)]
    pub start_time: f64,
    /// Relative interval jitter.
    #[serde(default)]
    pub jitter: f64,
}

impl StreamParams {
    /// Strictly periodic parameters starting at time zero.
    pub fn new(priority: Priority, message_size: u64, interval: f64) -> Self {
        Self {
            priority,
            message_size,
            interval,
            start_time: 0.0,
            jitter: 0.0,
        }
    }

    /// Sets the time of the first message.
    pub fn starting_at(mut self, start_time: f64) -> Self {
        self.start_time = start_time;
        self
    }

    /// Sets the relative interval jitter.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Stream from `src` to `dst` with these parameters.
    pub fn stream(&self, src: NodeId, dst: NodeId, phase: PhaseTag) -> StreamSpec {
        StreamSpec {
            src,
            dst,
            priority: self.priority,
            message_size: self.message_size,
            interval: self.interval,
            phase,
            start_time: self.start_time,
            jitter: self.jitter,
        }
    }
}

/// Position of a stream in its emission sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamCursor {
    /// Stream the cursor belongs to.
    pub stream: StreamId,
    /// Sequence number of the next message.
    pub seq: u64,
}

impl StreamCursor {
    /// Cursor before the first message.
    pub fn new(stream: StreamId) -> Self {
        Self { stream, seq: 0 }
    }
}

/// One message emitted by a stream and when the stream fires next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Emission {
    /// The emitted message.
    pub message: Message,
    /// Time of the next message.
    pub next_at: f64,
    /// Cursor after the emission.
    pub cursor: StreamCursor,
}

impl StreamSpec {
    /// Checks the stream on its own; `index` is used in the error.
    pub fn validate(&self, index: usize) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidStream {
            stream: StreamId(index as u32),
            reason,
        };
        if self.src == self.dst {
            return Err(invalid(format!("source and destination are both {}", self.src)));
        }
        if self.message_size == 0 {
            return Err(invalid("message size must be positive".into()));
        }
        if !(self.interval.is_finite() && self.interval > 0.0) {
            return Err(invalid(format!("interval {} must be positive", self.interval)));
        }
        if !(self.start_time.is_finite() && self.start_time >= 0.0) {
            return Err(invalid(format!("start time {} must be non-negative", self.start_time)));
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(invalid(format!("jitter {} is not in [0, 1)", self.jitter)));
        }
        Ok(())
    }

    /// Emits the message due at `now` and computes the time of the next one.
    ///
    /// `jitter_factor` scales the interval to the next message; pass `1.0` for a strictly periodic stream.
    pub fn emit(&self, cursor: StreamCursor, now: f64, id: MessageId, jitter_factor: f64) -> Emission {
        let message = Message {
            id,
            stream: cursor.stream,
            seq: cursor.seq,
            src: self.src,
            dst: self.dst,
            priority: self.priority,
            size_bytes: self.message_size,
            created_at: now,
            phase: self.phase,
        };
        Emission {
            message,
            next_at: now + self.interval * jitter_factor,
            cursor: StreamCursor {
                stream: cursor.stream,
                seq: cursor.seq + 1,
            },
        }
    }
}

/// Component that fires every stream and hands the messages to their source nodes.
pub struct TrafficGenerator {
    streams: Vec<StreamSpec>,
    cursors: Vec<StreamCursor>,
    sources: Vec<Id>,
    end_time: f64,
    next_message: u64,
    ctx: SimulationContext,
}

impl TrafficGenerator {
    /// `sources[i]` is the component id of the source node of `streams[i]`.
    pub fn new(streams: Vec<StreamSpec>, sources: Vec<Id>, end_time: f64, ctx: SimulationContext) -> Self {
        let cursors = (0..streams.len() as u32).map(|i| StreamCursor::new(StreamId(i))).collect();
        Self {
            streams,
            cursors,
            sources,
            end_time,
            next_message: 0,
            ctx,
        }
    }

    /// Schedules the first message of every stream that starts before the end of the run.
    pub fn start(&self) -> SimResult {
        for (i, stream) in self.streams.iter().enumerate() {
            if stream.start_time < self.end_time {
                self.ctx
                    .emit_at(StreamTick { stream: StreamId(i as u32) }, self.ctx.id(), stream.start_time)?;
            }
        }
        Ok(())
    }

    /// Number of messages emitted so far.
    pub fn messages_created(&self) -> u64 {
        self.next_message
    }

    fn on_tick(&mut self, stream: StreamId) -> SimResult {
        let i = stream.0 as usize;
        let (Some(spec), Some(&cursor), Some(&source)) = (self.streams.get(i), self.cursors.get(i), self.sources.get(i))
        else {
            return Err(SchedulingViolation::new(self.ctx.time(), format!("tick for unknown {stream}"))
                .at(self.ctx.name(), None)
                .into());
        };
        let factor = if spec.jitter > 0.0 {
            self.ctx.gen_range(1.0 - spec.jitter..=1.0 + spec.jitter)
        } else {
            1.0
        };
        let now = self.ctx.time();
        let emission = spec.emit(cursor, now, MessageId(self.next_message), factor);
        self.next_message += 1;
        self.cursors[i] = emission.cursor;
        log_trace!(
            self.ctx,
            "{} emitted {} {} -> {} ({} B, {})",
            stream,
            emission.message.id,
            emission.message.src,
            emission.message.dst,
            emission.message.size_bytes,
            emission.message.priority
        );
        self.ctx.emit_now(
            MessageCreated {
                message: emission.message,
            },
            source,
        )?;
        if emission.next_at < self.end_time {
            self.ctx.emit_at(StreamTick { stream }, self.ctx.id(), emission.next_at)?;
        }
        Ok(())
    }
}

impl EventHandler for TrafficGenerator {
    fn on(&mut self, event: Event) -> SimResult {
        cast!(match event.data {
            StreamTick { stream } => {
                self.on_tick(stream)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> StreamSpec {
        StreamParams::new(Priority::new(5).unwrap(), 1500, 0.001)
            .starting_at(0.01)
            .stream(NodeId(0), NodeId(3), PhaseTag::AllToAll)
    }

    #[test]
    fn emission_advances_cursor_and_time() {
        let s = spec();
        let e = s.emit(StreamCursor::new(StreamId(4)), 0.01, MessageId(9), 1.0);
        assert_eq!(e.message.seq, 0);
        assert_eq!(e.message.stream, StreamId(4));
        assert_eq!(e.message.created_at, 0.01);
        assert_eq!(e.message.phase, PhaseTag::AllToAll);
        assert_eq!(e.cursor.seq, 1);
        assert!((e.next_at - 0.011).abs() < 1e-12);
        let e2 = s.emit(e.cursor, e.next_at, MessageId(10), 1.1);
        assert_eq!(e2.message.seq, 1);
        assert!((e2.next_at - e.next_at - 0.0011).abs() < 1e-12);
    }

    #[test]
    fn invalid_streams() {
        let mut s = spec();
        s.dst = s.src;
        assert!(matches!(s.validate(2), Err(ConfigError::InvalidStream { stream: StreamId(2), .. })));
        let mut s = spec();
        s.interval = 0.0;
        assert!(s.validate(0).is_err());
        let mut s = spec();
        s.message_size = 0;
        assert!(s.validate(0).is_err());
        let mut s = spec();
        s.jitter = 1.0;
        assert!(s.validate(0).is_err());
        assert!(spec().validate(0).is_ok());
    }
}
