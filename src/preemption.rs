//! Frame preemption policy and the suspension stack of paused frames.
//!
//! A port with preemption enabled may interrupt its current frame when a strictly higher priority frame is waiting.
//! The interrupted frame is pushed onto a LIFO [`SuspensionStack`] together with the bytes it still has to send, and
//! is resumed once the frames that preempted it have completed. Interrupting costs `guard_band_bytes` of port time
//! before the new frame's data, resuming costs `resume_overhead_bytes`.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SchedulingViolation};
use crate::message::{Frame, Priority};

/// Per-port preemption parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreemptionConfig {
    /// Bytes-equivalent of port time charged for each interruption.
    pub guard_band_bytes: u64,
    /// Bytes-equivalent of port time charged for each resumption.
    pub resume_overhead_bytes: u64,
    /// A frame with this many or fewer remaining bytes is never preempted.
    pub min_preemptible_remainder: u64,
    /// Smallest priority difference between the candidate and the occupant that allows preemption.
    pub min_priority_gap: u8,
    /// Minimum time in seconds between two preemptions on the same port.
    pub min_preemption_interval: f64,
}

impl Default for PreemptionConfig {
    fn default() -> Self {
        Self {
            guard_band_bytes: 24,
            resume_overhead_bytes: 24,
            min_preemptible_remainder: 64,
            min_priority_gap: 1,
            min_preemption_interval: 0.0,
        }
    }
}

impl PreemptionConfig {
    /// Configuration where interrupting and resuming cost the same.
    pub fn symmetric(overhead_bytes: u64, min_preemptible_remainder: u64) -> Self {
        Self {
            guard_band_bytes: overhead_bytes,
            resume_overhead_bytes: overhead_bytes,
            min_preemptible_remainder,
            ..Default::default()
        }
    }

    /// Checks the priority gap and the interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_priority_gap == 0 || self.min_priority_gap as usize >= Priority::LEVELS {
            return Err(ConfigError::invalid(
                "min_priority_gap",
                format!("{} is not in 1..=7", self.min_priority_gap),
            ));
        }
        if !self.min_preemption_interval.is_finite() || self.min_preemption_interval < 0.0 {
            return Err(ConfigError::invalid(
                "min_preemption_interval",
                format!("{} must be a non-negative number of seconds", self.min_preemption_interval),
            ));
        }
        Ok(())
    }

    /// Decides whether an occupant may be interrupted by a candidate.
    ///
    /// `remaining` is the occupant's unsent byte count at `now`, `last_preemption` the time of the previous
    /// preemption on the same port.
    pub fn evaluate(
        &self,
        occupant: Priority,
        candidate: Priority,
        remaining: u64,
        now: f64,
        last_preemption: Option<f64>,
    ) -> Decision {
        if candidate.level() < occupant.level().saturating_add(self.min_priority_gap) {
            return Decision::NotApplicable;
        }
        if remaining <= self.min_preemptible_remainder {
            return Decision::Refuse(Refusal::BelowThreshold);
        }
        if let Some(last) = last_preemption {
            if now - last < self.min_preemption_interval {
                return Decision::Refuse(Refusal::TooSoon);
            }
        }
        Decision::Preempt
    }
}

/// Outcome of [`PreemptionConfig::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Interrupt the occupant.
    Preempt,
    /// The candidate outranks the occupant but the policy keeps the occupant on the link.
    Refuse(Refusal),
    /// The candidate does not outrank the occupant enough to be considered.
    NotApplicable,
}

/// Reason for refusing a preemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    /// The occupant is too close to completion.
    BelowThreshold,
    /// The port was preempted too recently.
    TooSoon,
}

/// A paused frame with the bytes it still has to send.
#[derive(Debug, Clone, PartialEq)]
pub struct Suspended {
    /// Frame with its remaining bytes.
    pub frame: Frame,
    /// Time of the interruption.
    pub suspended_at: f64,
}

/// LIFO stack of paused frames of one port.
///
/// Priorities strictly increase from the bottom to the top, so the depth never exceeds the number of levels above
/// the bottom frame.
#[derive(Debug, Clone, Default)]
pub struct SuspensionStack {
    frames: Vec<Suspended>,
}

impl SuspensionStack {
    /// Empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspends a frame. Breaking the priority order or the depth bound is a violation.
    pub fn push(&mut self, entry: Suspended) -> Result<(), SchedulingViolation> {
        let priority = entry.frame.priority();
        if let Some(top) = self.frames.last() {
            if top.frame.priority() >= priority {
                return Err(SchedulingViolation::new(
                    entry.suspended_at,
                    format!(
                        "suspending {} at {} on top of {} at {}",
                        entry.frame.message.id,
                        priority,
                        top.frame.message.id,
                        top.frame.priority()
                    ),
                ));
            }
        }
        let bottom = self.frames.first().map(|s| s.frame.priority()).unwrap_or(priority);
        if self.frames.len() + 1 > bottom.levels_above().max(1) {
            return Err(SchedulingViolation::new(
                entry.suspended_at,
                format!("suspension depth {} exceeds the levels above {}", self.frames.len() + 1, bottom),
            ));
        }
        entry
            .frame
            .check_resumable()
            .map_err(|detail| SchedulingViolation::new(entry.suspended_at, detail))?;
        self.frames.push(entry);
        Ok(())
    }

    /// Most recently suspended frame.
    pub fn pop(&mut self) -> Option<Suspended> {
        self.frames.pop()
    }

    /// Frame that would be resumed next.
    pub fn top(&self) -> Option<&Suspended> {
        self.frames.last()
    }

    /// Number of suspended frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether no frame is suspended.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
