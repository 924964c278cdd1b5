//! Per-message outcome records and their summaries.

use std::slice;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::message::{Message, PhaseTag, Priority, StreamId};
use crate::topology::PortId;

/// Where a message was dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DropPoint {
    /// Name of the node or switch owning the full queue.
    pub component: String,
    /// Egress port index.
    pub port: PortId,
    /// Priority of the full queue.
    pub priority: Priority,
}

/// How a message left the fabric.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// Reached its destination.
    Delivered {
        /// Seconds from creation to delivery.
        delay: f64,
    },
    /// Dropped at a full queue.
    Dropped {
        /// Queue that rejected the message.
        at: DropPoint,
    },
}

/// Terminal outcome of one message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsRecord {
    /// The message as created.
    pub message: Message,
    /// Time of delivery or drop.
    pub time: f64,
    /// Delivered or dropped.
    pub outcome: Outcome,
}

impl MetricsRecord {
    /// Whether the message reached its destination.
    pub fn is_delivered(&self) -> bool {
        matches!(self.outcome, Outcome::Delivered { .. })
    }

    /// End-to-end delay of a delivered message.
    pub fn delay(&self) -> Option<f64> {
        match self.outcome {
            Outcome::Delivered { delay } => Some(delay),
            Outcome::Dropped { .. } => None,
        }
    }
}

/// Append-only log of message outcomes.
#[derive(Debug, Default)]
pub struct MetricsSink {
    records: Vec<MetricsRecord>,
    delivered: u64,
    dropped: u64,
}

impl MetricsSink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a delivery at `time`.
    pub fn record_delivered(&mut self, message: Message, time: f64) {
        self.delivered += 1;
        self.records.push(MetricsRecord {
            message,
            time,
            outcome: Outcome::Delivered {
                delay: time - message.created_at,
            },
        });
    }

    /// Records a drop at `time`.
    pub fn record_dropped(&mut self, message: Message, time: f64, at: DropPoint) {
        self.dropped += 1;
        self.records.push(MetricsRecord {
            message,
            time,
            outcome: Outcome::Dropped { at },
        });
    }

    /// Records in the order they were produced. Can be called any number of times.
    pub fn records(&self) -> slice::Iter<'_, MetricsRecord> {
        self.records.iter()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of delivered messages.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Number of dropped messages.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Summary over the records accepted by `filter`.
    pub fn summary<F>(&self, filter: F) -> Summary
    where
        F: Fn(&MetricsRecord) -> bool,
    {
        Summary::from_records(self.records.iter().filter(|r| filter(r)))
    }

    /// Summary over the messages of one phase.
    pub fn phase_summary(&self, phase: PhaseTag) -> Summary {
        self.summary(|r| r.message.phase == phase)
    }

    /// Summary over all collective traffic.
    pub fn collective_summary(&self) -> Summary {
        self.summary(|r| r.message.phase.is_collective())
    }
}

/// Delay distribution of delivered messages, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelayStats {
    /// Number of delivered messages.
    pub count: usize,
    /// Mean delay.
    pub mean: f64,
    /// Smallest delay.
    pub min: f64,
    /// Largest delay.
    pub max: f64,
    /// Mean absolute difference between consecutive delays of the same stream.
    pub jitter: f64,
    /// 95th percentile.
    pub p95: f64,
    /// 99th percentile.
    pub p99: f64,
}

impl DelayStats {
    fn from_delays(delays: &[f64], jitter: f64) -> Option<Self> {
        if delays.is_empty() {
            return None;
        }
        let mut sorted = delays.to_vec();
        sorted.sort_by(f64::total_cmp);
        let count = sorted.len();
        Some(Self {
            count,
            mean: sorted.iter().sum::<f64>() / count as f64,
            min: sorted[0],
            max: sorted[count - 1],
            jitter,
            p95: nearest_rank(&sorted, 95.0),
            p99: nearest_rank(&sorted, 99.0),
        })
    }
}

fn nearest_rank(sorted: &[f64], percentile: f64) -> f64 {
    let rank = (percentile / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Aggregate view over a set of records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    /// Delivered messages.
    pub delivered: u64,
    /// Dropped messages.
    pub dropped: u64,
    /// Bytes of the delivered messages.
    pub delivered_bytes: u64,
    /// `None` if nothing was delivered.
    pub delay: Option<DelayStats>,
    /// Delivered bits per second between the first creation and the last delivery.
    pub throughput_bps: f64,
}

impl Summary {
    /// Summarizes the given records.
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a MetricsRecord>,
    {
        let mut delivered = 0;
        let mut dropped = 0;
        let mut delivered_bytes = 0;
        let mut delays = Vec::new();
        let mut last_delay: FxHashMap<StreamId, f64> = FxHashMap::default();
        let mut jitter_sum = 0.0;
        let mut jitter_pairs = 0usize;
        let mut first_created = f64::INFINITY;
        let mut last_delivered = f64::NEG_INFINITY;

        for record in records {
            match record.outcome {
                Outcome::Delivered { delay } => {
                    delivered += 1;
                    delivered_bytes += record.message.size_bytes;
                    delays.push(delay);
                    if let Some(prev) = last_delay.insert(record.message.stream, delay) {
                        jitter_sum += (delay - prev).abs();
                        jitter_pairs += 1;
                    }
                    first_created = first_created.min(record.message.created_at);
                    last_delivered = last_delivered.max(record.time);
                }
                Outcome::Dropped { .. } => dropped += 1,
            }
        }

        let jitter = if jitter_pairs > 0 {
            jitter_sum / jitter_pairs as f64
        } else {
            0.0
        };
        let span = last_delivered - first_created;
        let throughput_bps = if delivered > 0 && span > 0.0 {
            delivered_bytes as f64 * 8.0 / span
        } else {
            0.0
        };
        Self {
            delivered,
            dropped,
            delivered_bytes,
            delay: DelayStats::from_delays(&delays, jitter),
            throughput_bps,
        }
    }

    /// Fraction of terminated messages that were dropped.
    pub fn drop_rate(&self) -> f64 {
        let total = self.delivered + self.dropped;
        if total == 0 {
            0.0
        } else {
            self.dropped as f64 / total as f64
        }
    }

    /// Mean delay of the delivered messages.
    pub fn mean_delay(&self) -> Option<f64> {
        self.delay.as_ref().map(|d| d.mean)
    }
}
