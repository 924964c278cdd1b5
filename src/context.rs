//! Accessing simulation from components.

use std::cell::RefCell;
use std::rc::Rc;

use rand::distributions::uniform::{SampleRange, SampleUniform};

use crate::component::Id;
use crate::error::{SchedulingViolation, SimResult};
use crate::event::{EventData, EventId};
use crate::state::SimulationState;

/// A facade for accessing the simulation state and producing events from simulation components.
pub struct SimulationContext {
    id: Id,
    name: String,
    sim_state: Rc<RefCell<SimulationState>>,
    names: Rc<RefCell<Vec<String>>>,
}

impl SimulationContext {
    pub(crate) fn new(
        id: Id,
        name: &str,
        sim_state: Rc<RefCell<SimulationState>>,
        names: Rc<RefCell<Vec<String>>>,
    ) -> Self {
        Self {
            id,
            name: name.to_owned(),
            sim_state,
            names,
        }
    }

    /// Returns the identifier of component associated with this context.
    pub fn id(&self) -> Id {
        self.id
    }

    /// Returns the name of component associated with this context.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.sim_state.borrow().time()
    }

    /// Returns a random float in the range _[0, 1)_ using the simulation-wide random number generator.
    pub fn rand(&self) -> f64 {
        self.sim_state.borrow_mut().rand()
    }

    /// Returns a random number in the specified range using the simulation-wide random number generator.
    ///
    /// ```rust
    /// use fabricsim::Simulation;
    ///
    /// let mut sim = Simulation::new(123);
    /// let ctx = sim.create_context("comp");
    /// let factor = ctx.gen_range(0.9..=1.1);
    /// assert!((0.9..=1.1).contains(&factor));
    /// ```
    pub fn gen_range<T, R>(&self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.sim_state.borrow_mut().gen_range(range)
    }

    /// Creates new event with specified payload, destination and delay, returns event id.
    ///
    /// A negative or non-finite delay is rejected with a scheduling violation attributed to this component.
    pub fn emit<T>(&self, data: T, dst: Id, delay: f64) -> SimResult<EventId>
    where
        T: EventData,
    {
        self.sim_state
            .borrow_mut()
            .add_event(data, self.id, dst, delay)
            .map_err(|e| self.attribute(e))
    }

    /// Same as [`emit`](Self::emit), but the event is scheduled at the current time.
    pub fn emit_now<T>(&self, data: T, dst: Id) -> SimResult<EventId>
    where
        T: EventData,
    {
        self.emit(data, dst, 0.0)
    }

    /// Same as [`emit`](Self::emit), but the event is addressed to the component itself.
    pub fn emit_self<T>(&self, data: T, delay: f64) -> SimResult<EventId>
    where
        T: EventData,
    {
        self.emit(data, self.id, delay)
    }

    /// Creates new event with specified payload and destination scheduled at the absolute time `time`.
    ///
    /// Times before the current simulation time are rejected.
    pub fn emit_at<T>(&self, data: T, dst: Id, time: f64) -> SimResult<EventId>
    where
        T: EventData,
    {
        self.sim_state
            .borrow_mut()
            .add_event_at(data, self.id, dst, time)
            .map_err(|e| self.attribute(e))
    }

    /// Cancels the specified event. Has no effect if the event already occurred or was canceled.
    pub fn cancel_event(&self, id: EventId) {
        self.sim_state.borrow_mut().cancel_event(id);
    }

    /// Returns component name by its identifier.
    pub fn lookup_name(&self, id: Id) -> Option<String> {
        self.names.borrow().get(id as usize).cloned()
    }

    fn attribute(&self, e: SchedulingViolation) -> crate::error::Error {
        e.at(&self.name, None).into()
    }
}
