//! Simulation configuration and execution.

use std::cell::RefCell;
use std::rc::Rc;

use rand::distributions::uniform::{SampleRange, SampleUniform};
use rustc_hash::FxHashMap;

use crate::component::Id;
use crate::context::SimulationContext;
use crate::error::{SchedulingViolation, SimResult};
use crate::event::EventId;
use crate::handler::EventHandler;
use crate::log::log_undelivered_event;
use crate::state::SimulationState;

/// Represents a simulation, provides methods for its configuration and execution.
pub struct Simulation {
    sim_state: Rc<RefCell<SimulationState>>,
    name_to_id: FxHashMap<String, Id>,
    names: Rc<RefCell<Vec<String>>>,
    handlers: Vec<Option<Rc<RefCell<dyn EventHandler>>>>,
    dispatched: u64,
}

impl Simulation {
    /// Creates a new simulation with specified random seed.
    pub fn new(seed: u64) -> Self {
        Self {
            sim_state: Rc::new(RefCell::new(SimulationState::new(seed))),
            name_to_id: FxHashMap::default(),
            names: Rc::new(RefCell::new(Vec::new())),
            handlers: Vec::new(),
            dispatched: 0,
        }
    }

    fn register(&mut self, name: &str) -> Id {
        if let Some(&id) = self.name_to_id.get(name) {
            return id;
        }
        let id = self.name_to_id.len() as Id;
        self.name_to_id.insert(name.to_owned(), id);
        self.names.borrow_mut().push(name.to_owned());
        self.handlers.push(None);
        id
    }

    /// Returns the identifier of component by its name.
    pub fn lookup_id(&self, name: &str) -> Option<Id> {
        self.name_to_id.get(name).copied()
    }

    /// Returns the name of component by its identifier.
    pub fn lookup_name(&self, id: Id) -> Option<String> {
        self.names.borrow().get(id as usize).cloned()
    }

    /// Creates a new simulation context with specified name.
    ///
    /// Creating a context with a name that is already registered returns a context bound to the same identifier.
    pub fn create_context<S>(&mut self, name: S) -> SimulationContext
    where
        S: AsRef<str>,
    {
        let name = name.as_ref();
        let id = self.register(name);
        SimulationContext::new(id, name, self.sim_state.clone(), self.names.clone())
    }

    /// Registers the event handler implementation for component with specified name, returns the component id.
    pub fn add_handler<S>(&mut self, name: S, handler: Rc<RefCell<dyn EventHandler>>) -> Id
    where
        S: AsRef<str>,
    {
        let id = self.register(name.as_ref());
        self.handlers[id as usize] = Some(handler);
        id
    }

    /// Removes the event handler of the component. Subsequent events for it are discarded.
    pub fn remove_handler<S>(&mut self, name: S)
    where
        S: AsRef<str>,
    {
        if let Some(id) = self.lookup_id(name.as_ref()) {
            self.handlers[id as usize] = None;
        }
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.sim_state.borrow().time()
    }

    /// Returns a random float in the range _[0, 1)_ using the simulation-wide random number generator.
    pub fn rand(&mut self) -> f64 {
        self.sim_state.borrow_mut().rand()
    }

    /// Returns a random number in the specified range using the simulation-wide random number generator.
    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.sim_state.borrow_mut().gen_range(range)
    }

    /// Cancels the specified event. Has no effect if the event already occurred or was canceled.
    pub fn cancel_event(&mut self, id: EventId) {
        self.sim_state.borrow_mut().cancel_event(id);
    }

    /// Performs a single step through the simulation.
    ///
    /// Takes the next event from the queue, advances the simulation time to event time and tries to process it
    /// by invoking the [`EventHandler::on`] method of the corresponding event handler.
    /// If there is no handler registered for component with Id `event.dst`, logs the undelivered event and discards it.
    ///
    /// Returns `true` if some pending event was found (no matter was it properly processed or not) and `false`
    /// otherwise. The latter means that there are no pending events, so no progress can be made.
    pub fn step(&mut self) -> SimResult<bool> {
        let prev = self.time();
        let next = self.sim_state.borrow_mut().next_event();
        let Some(event) = next else {
            return Ok(false);
        };
        if event.time < prev {
            return Err(SchedulingViolation::new(
                prev,
                format!("event {} dispatched at t={} after the clock reached t={}", event.id, event.time, prev),
            )
            .at("simulation", None)
            .into());
        }
        self.dispatched += 1;
        match self.handlers.get(event.dst as usize).and_then(|h| h.clone()) {
            Some(handler) => handler.borrow_mut().on(event)?,
            None => log_undelivered_event(event.id, event.time, event.src, event.dst, event.data.as_ref()),
        }
        Ok(true)
    }

    /// Performs the specified number of steps through the simulation.
    ///
    /// Returns `true` if there could be more pending events and `false` otherwise.
    pub fn steps(&mut self, step_count: u64) -> SimResult<bool> {
        for _ in 0..step_count {
            if !self.step()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Steps through the simulation until there are no pending events left.
    pub fn step_until_no_events(&mut self) -> SimResult {
        while self.step()? {}
        Ok(())
    }

    /// Steps through the simulation until the specified time.
    ///
    /// Events with time less than or equal to `time` are processed. The simulation time is then set to `time`,
    /// later events stay in the queue.
    pub fn step_until_time(&mut self, time: f64) -> SimResult {
        loop {
            let due = {
                let mut state = self.sim_state.borrow_mut();
                matches!(state.peek_event(), Some(event) if event.time <= time)
            };
            if !due || !self.step()? {
                break;
            }
        }
        let mut state = self.sim_state.borrow_mut();
        if state.time() < time {
            state.set_time(time);
        }
        Ok(())
    }

    /// Returns the total number of created events.
    ///
    /// Note that cancelled events are also counted here.
    pub fn event_count(&self) -> u64 {
        self.sim_state.borrow().event_count()
    }

    /// Returns the number of dispatched events.
    pub fn dispatched_count(&self) -> u64 {
        self.dispatched
    }

    /// Returns the number of events that are scheduled and not yet dispatched or cancelled.
    pub fn pending_count(&self) -> usize {
        self.sim_state.borrow().pending_count()
    }
}

#[cfg(test)]
mod tests {
    use serde::Serialize;

    use super::*;
    use crate::cast;
    use crate::event::Event;

    #[derive(Clone, Serialize)]
    struct Ping {
        tag: u32,
    }

    #[derive(Clone, Serialize)]
    struct Echo {
        delay: f64,
    }

    struct Recorder {
        seen: Vec<(f64, u32)>,
        ctx: SimulationContext,
    }

    impl EventHandler for Recorder {
        fn on(&mut self, event: Event) -> SimResult {
            cast!(match event.data {
                Ping { tag } => {
                    self.seen.push((self.ctx.time(), tag));
                    Ok(())
                }
                Echo { delay } => {
                    self.ctx.emit_self(Ping { tag: 99 }, delay)?;
                    Ok(())
                }
            })
        }
    }

    fn setup() -> (Simulation, Rc<RefCell<Recorder>>, SimulationContext) {
        let mut sim = Simulation::new(7);
        let ctx = sim.create_context("recorder");
        let recorder = Rc::new(RefCell::new(Recorder { seen: Vec::new(), ctx }));
        sim.add_handler("recorder", recorder.clone());
        let driver = sim.create_context("driver");
        (sim, recorder, driver)
    }

    #[test]
    fn same_time_events_are_dispatched_in_emission_order() {
        let (mut sim, recorder, driver) = setup();
        let dst = sim.lookup_id("recorder").unwrap();
        for tag in 0..5 {
            driver.emit(Ping { tag }, dst, 1.0).unwrap();
        }
        driver.emit(Ping { tag: 100 }, dst, 0.5).unwrap();
        sim.step_until_no_events().unwrap();
        let tags: Vec<u32> = recorder.borrow().seen.iter().map(|(_, t)| *t).collect();
        assert_eq!(tags, vec![100, 0, 1, 2, 3, 4]);
        assert_eq!(sim.dispatched_count(), 6);
    }

    #[test]
    fn cancelled_event_is_not_dispatched() {
        let (mut sim, recorder, driver) = setup();
        let dst = sim.lookup_id("recorder").unwrap();
        let id = driver.emit(Ping { tag: 1 }, dst, 1.0).unwrap();
        driver.emit(Ping { tag: 2 }, dst, 2.0).unwrap();
        sim.cancel_event(id);
        sim.cancel_event(id);
        sim.step_until_no_events().unwrap();
        assert_eq!(recorder.borrow().seen, vec![(2.0, 2)]);
    }

    #[test]
    fn step_until_time_includes_boundary_and_keeps_later_events() {
        let (mut sim, recorder, driver) = setup();
        let dst = sim.lookup_id("recorder").unwrap();
        driver.emit(Ping { tag: 1 }, dst, 1.0).unwrap();
        driver.emit(Ping { tag: 2 }, dst, 3.0).unwrap();
        sim.step_until_time(1.0).unwrap();
        assert_eq!(recorder.borrow().seen.len(), 1);
        sim.step_until_time(2.0).unwrap();
        assert_eq!(sim.time(), 2.0);
        assert_eq!(sim.pending_count(), 1);
    }

    #[test]
    fn handler_errors_abort_the_step() {
        let (mut sim, _recorder, driver) = setup();
        let dst = sim.lookup_id("recorder").unwrap();
        driver.emit(Echo { delay: -1.0 }, dst, 0.0).unwrap();
        let err = sim.step().unwrap_err();
        assert!(!err.is_config());
        assert!(err.to_string().contains("recorder"));
    }

    #[test]
    fn events_without_handler_are_discarded() {
        let (mut sim, _recorder, driver) = setup();
        let nowhere = sim.create_context("nowhere").id();
        driver.emit(Ping { tag: 1 }, nowhere, 1.0).unwrap();
        assert!(sim.step().unwrap());
        assert!(!sim.step().unwrap());
    }

    #[test]
    fn names_map_to_stable_ids() {
        let (mut sim, _recorder, _driver) = setup();
        let again = sim.create_context("recorder");
        assert_eq!(Some(again.id()), sim.lookup_id("recorder"));
        assert_eq!(sim.lookup_name(again.id()).as_deref(), Some("recorder"));
        assert!(sim.lookup_id("missing").is_none());
    }
}
