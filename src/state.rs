use std::collections::BinaryHeap;

use rand::distributions::uniform::{SampleRange, SampleUniform};
use rand::prelude::*;
use rand_pcg::Pcg64;
use rustc_hash::FxHashSet;

use crate::component::Id;
use crate::error::SchedulingViolation;
use crate::event::{Event, EventData, EventId};

pub(crate) struct SimulationState {
    clock: f64,
    rand: Pcg64,
    events: BinaryHeap<Event>,
    pending: FxHashSet<EventId>,
    canceled: FxHashSet<EventId>,
    event_count: u64,
}

impl SimulationState {
    pub fn new(seed: u64) -> Self {
        Self {
            clock: 0.0,
            rand: Pcg64::seed_from_u64(seed),
            events: BinaryHeap::new(),
            pending: FxHashSet::default(),
            canceled: FxHashSet::default(),
            event_count: 0,
        }
    }

    pub fn time(&self) -> f64 {
        self.clock
    }

    pub fn set_time(&mut self, time: f64) {
        self.clock = time;
    }

    pub fn rand(&mut self) -> f64 {
        self.rand.gen_range(0.0..1.0)
    }

    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.rand.gen_range(range)
    }

    pub fn add_event<T>(&mut self, data: T, src: Id, dst: Id, delay: f64) -> Result<EventId, SchedulingViolation>
    where
        T: EventData,
    {
        if !delay.is_finite() || delay < 0.0 {
            return Err(SchedulingViolation::new(
                self.clock,
                format!("event scheduled with invalid delay {delay}"),
            ));
        }
        self.push_event(Box::new(data), src, dst, self.clock + delay)
    }

    pub fn add_event_at<T>(&mut self, data: T, src: Id, dst: Id, time: f64) -> Result<EventId, SchedulingViolation>
    where
        T: EventData,
    {
        if !time.is_finite() || time < self.clock {
            return Err(SchedulingViolation::new(
                self.clock,
                format!("event scheduled in the past at t={time}"),
            ));
        }
        self.push_event(Box::new(data), src, dst, time)
    }

    fn push_event(
        &mut self,
        data: Box<dyn EventData>,
        src: Id,
        dst: Id,
        time: f64,
    ) -> Result<EventId, SchedulingViolation> {
        let id = self.event_count;
        self.events.push(Event { id, time, src, dst, data });
        self.pending.insert(id);
        self.event_count += 1;
        Ok(id)
    }

    pub fn next_event(&mut self) -> Option<Event> {
        while let Some(event) = self.events.pop() {
            if self.canceled.remove(&event.id) {
                continue;
            }
            self.pending.remove(&event.id);
            self.clock = event.time;
            return Some(event);
        }
        None
    }

    pub fn peek_event(&mut self) -> Option<&Event> {
        while let Some(event) = self.events.peek() {
            if self.canceled.contains(&event.id) {
                let id = event.id;
                self.events.pop();
                self.canceled.remove(&id);
            } else {
                break;
            }
        }
        self.events.peek()
    }

    /// Cancels a pending event. Cancelling an event that already fired or was already cancelled has no effect.
    pub fn cancel_event(&mut self, id: EventId) {
        if self.pending.remove(&id) {
            self.canceled.insert(id);
        }
    }

    pub fn is_pending(&self, id: EventId) -> bool {
        self.pending.contains(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn event_count(&self) -> u64 {
        self.event_count
    }
}
