//! Simulation events.

use std::cmp::Ordering;

use downcast_rs::{impl_downcast, Downcast};
use dyn_clone::{clone_trait_object, DynClone};
use serde::Serialize;

use crate::component::Id;

/// Event identifier.
///
/// Identifiers are assigned from a monotonic counter at scheduling time, so for two events with equal timestamps
/// the one scheduled first has the smaller identifier and is dispatched first.
pub type EventId = u64;

/// Trait that should be implemented by event payload.
///
/// It is implemented automatically for every type that is `Clone + Serialize + 'static`. Serialization is only used
/// for logging of events that could not be delivered or handled.
pub trait EventData: Downcast + DynClone + erased_serde::Serialize {}

impl_downcast!(EventData);

clone_trait_object!(EventData);

erased_serde::serialize_trait_object!(EventData);

impl<T: Serialize + Clone + 'static> EventData for T {}

/// Representation of event.
#[derive(Clone)]
pub struct Event {
    /// Unique event identifier, also the tie-breaking sequence number.
    pub id: EventId,
    /// Time of event occurrence.
    pub time: f64,
    /// Identifier of event source.
    pub src: Id,
    /// Identifier of event destination.
    pub dst: Id,
    /// Event payload.
    pub data: Box<dyn EventData>,
}

impl Eq for Event {}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

// BinaryHeap is a max-heap, so the order is reversed to pop the smallest (time, id) first.
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BinaryHeap;

    use super::*;

    #[derive(Clone, Serialize)]
    struct Ping {
        seq: u32,
    }

    fn event(id: EventId, time: f64) -> Event {
        Event {
            id,
            time,
            src: 0,
            dst: 0,
            data: Box::new(Ping { seq: id as u32 }),
        }
    }

    #[test]
    fn earlier_event_pops_first() {
        let mut heap = BinaryHeap::new();
        heap.push(event(0, 2.0));
        heap.push(event(1, 1.0));
        heap.push(event(2, 3.0));
        let times: Vec<f64> = std::iter::from_fn(|| heap.pop()).map(|e| e.time).collect();
        assert_eq!(times, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn equal_times_pop_in_id_order() {
        let mut heap = BinaryHeap::new();
        for id in [4, 1, 3, 0, 2] {
            heap.push(event(id, 5.0));
        }
        let ids: Vec<EventId> = std::iter::from_fn(|| heap.pop()).map(|e| e.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn payload_downcasts_to_its_type() {
        let e = event(7, 0.0);
        assert!(e.data.is::<Ping>());
        let ping = e.data.downcast::<Ping>().ok().unwrap();
        assert_eq!(ping.seq, 7);
    }
}
