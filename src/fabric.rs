//! Assembly of a simulation from a topology and an experiment, and its execution.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use crate::component::Id;
use crate::config::ExperimentConfig;
use crate::context::SimulationContext;
use crate::error::{ConfigError, SimResult};
use crate::link::Link;
use crate::message::{NodeId, SwitchId};
use crate::metrics::MetricsSink;
use crate::node::Node;
use crate::port::{EgressPort, PortStats};
use crate::simulation::Simulation;
use crate::switch::{Switch, SwitchStats};
use crate::topology::{Hop, PortId, PortSpec, Topology};
use crate::traffic::TrafficGenerator;
use crate::{log_debug, log_info};

const FABRIC: &str = "fabric";
const GENERATOR: &str = "generator";

/// Aggregate statistics of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    /// Events dispatched to handlers.
    pub events_processed: u64,
    /// Events ever scheduled, cancelled ones included.
    pub events_scheduled: u64,
    /// Messages emitted by all streams.
    pub messages_created: u64,
    /// Messages delivered to their destination.
    pub delivered: u64,
    /// Messages dropped at a full queue.
    pub dropped: u64,
    /// Preemptions over all ports.
    pub preemptions: u64,
    /// Resumptions of suspended frames over all ports.
    pub resumptions: u64,
    /// Preemptions refused by policy over all ports.
    pub refused_preemptions: u64,
    /// Guard band and resume overhead over all ports.
    pub overhead_bytes: u64,
    /// Simulation time at the end of the run.
    pub end_time: f64,
}

impl RunStats {
    /// Messages that were neither delivered nor dropped when the run ended.
    pub fn in_flight(&self) -> u64 {
        self.messages_created.saturating_sub(self.delivered + self.dropped)
    }
}

/// Counters of one egress port together with its owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortReport {
    /// Node or switch name.
    pub component: String,
    /// Port index within the component.
    pub port: PortId,
    /// Port counters.
    pub stats: PortStats,
}

/// A ready-to-run simulation of traffic over a fabric.
pub struct Fabric {
    sim: Simulation,
    topology: Topology,
    config: ExperimentConfig,
    nodes: Vec<Rc<RefCell<Node>>>,
    switches: Vec<Rc<RefCell<Switch>>>,
    generator: Rc<RefCell<TrafficGenerator>>,
    metrics: Rc<RefCell<MetricsSink>>,
    ctx: SimulationContext,
}

impl Fabric {
    /// Validates the configuration and registers all components.
    ///
    /// Every problem with the topology or the streams, including destinations the forwarding tables cannot reach,
    /// is reported here before any event is dispatched.
    pub fn new(topology: Topology, config: ExperimentConfig) -> SimResult<Self> {
        topology.validate()?;
        config.validate()?;
        for name in topology.nodes.iter().map(|n| &n.name).chain(topology.switches.iter().map(|s| &s.name)) {
            if name == FABRIC || name == GENERATOR {
                return Err(ConfigError::DuplicateName(name.clone()).into());
            }
        }
        for stream in &config.streams {
            topology.path(stream.src, stream.dst)?;
        }

        let mut sim = Simulation::new(config.seed);
        let ctx = sim.create_context(FABRIC);
        let metrics = Rc::new(RefCell::new(MetricsSink::new()));

        // register every name first so that peers can be resolved to component ids
        let node_ctxs: Vec<SimulationContext> = topology.nodes.iter().map(|n| sim.create_context(&n.name)).collect();
        let switch_ctxs: Vec<SimulationContext> =
            topology.switches.iter().map(|s| sim.create_context(&s.name)).collect();
        let peer_id = |hop: Hop| -> Id {
            match hop {
                Hop::Node(n) => node_ctxs[n.0 as usize].id(),
                Hop::Switch(s) => switch_ctxs[s.0 as usize].id(),
            }
        };
        let build_link = |index: PortId, spec: &PortSpec| {
            Link::new(
                index,
                spec.link,
                peer_id(spec.to),
                EgressPort::new(
                    spec.link.bandwidth_bps,
                    spec.config.queue_capacity,
                    spec.config.preemption.clone(),
                ),
            )
        };

        let node_links: Vec<Option<Link>> = topology
            .nodes
            .iter()
            .map(|n| n.uplink.as_ref().map(|p| build_link(0, p)))
            .collect();
        let switch_links: Vec<Vec<Link>> = topology
            .switches
            .iter()
            .map(|s| s.ports.iter().enumerate().map(|(i, p)| build_link(i, p)).collect())
            .collect();

        let mut nodes = Vec::with_capacity(topology.nodes.len());
        let mut sources = Vec::with_capacity(topology.nodes.len());
        for (i, (node_ctx, uplink)) in node_ctxs.into_iter().zip(node_links).enumerate() {
            sources.push(node_ctx.id());
            let name = node_ctx.name().to_owned();
            let node = Rc::new(RefCell::new(Node::new(NodeId(i as u32), uplink, metrics.clone(), node_ctx)));
            sim.add_handler(name, node.clone());
            nodes.push(node);
        }
        let mut switches = Vec::with_capacity(topology.switches.len());
        for (i, ((switch_ctx, ports), spec)) in switch_ctxs
            .into_iter()
            .zip(switch_links)
            .zip(&topology.switches)
            .enumerate()
        {
            let name = switch_ctx.name().to_owned();
            let routes = spec.routes.iter().map(|(&dst, &port)| (dst, port));
            let switch = Rc::new(RefCell::new(Switch::new(
                SwitchId(i as u32),
                ports,
                routes,
                metrics.clone(),
                switch_ctx,
            )));
            sim.add_handler(name, switch.clone());
            switches.push(switch);
        }

        let stream_sources = config.streams.iter().map(|s| sources[s.src.0 as usize]).collect();
        let generator = Rc::new(RefCell::new(TrafficGenerator::new(
            config.streams.clone(),
            stream_sources,
            config.sim_duration,
            sim.create_context(GENERATOR),
        )));
        sim.add_handler(GENERATOR, generator.clone());
        generator.borrow().start()?;

        log_debug!(
            ctx,
            "built fabric with {} nodes, {} switches and {} streams",
            nodes.len(),
            switches.len(),
            config.streams.len()
        );
        Ok(Self {
            sim,
            topology,
            config,
            nodes,
            switches,
            generator,
            metrics,
            ctx,
        })
    }

    /// Runs the simulation up to the configured duration and returns the run statistics.
    ///
    /// Events scheduled after the end of the run are discarded. A scheduling violation aborts the run.
    pub fn run(&mut self) -> SimResult<RunStats> {
        log_info!(self.ctx, "running until t={}", self.config.sim_duration);
        self.sim.step_until_time(self.config.sim_duration)?;
        let stats = self.stats();
        log_info!(
            self.ctx,
            "done: {} events, {} delivered, {} dropped, {} preemptions",
            stats.events_processed,
            stats.delivered,
            stats.dropped,
            stats.preemptions
        );
        Ok(stats)
    }

    /// Topology the fabric was built from.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Experiment the fabric runs.
    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Current simulation time.
    pub fn time(&self) -> f64 {
        self.sim.time()
    }

    /// Outcome records collected so far.
    pub fn metrics(&self) -> std::cell::Ref<'_, MetricsSink> {
        self.metrics.borrow()
    }

    /// Counters of every egress port, node uplinks first.
    pub fn port_stats(&self) -> Vec<PortReport> {
        let mut reports = Vec::new();
        for (node, spec) in self.nodes.iter().zip(&self.topology.nodes) {
            if let Some(link) = node.borrow().uplink() {
                reports.push(PortReport {
                    component: spec.name.clone(),
                    port: link.index(),
                    stats: link.stats().clone(),
                });
            }
        }
        for (switch, spec) in self.switches.iter().zip(&self.topology.switches) {
            for link in switch.borrow().ports() {
                reports.push(PortReport {
                    component: spec.name.clone(),
                    port: link.index(),
                    stats: link.stats().clone(),
                });
            }
        }
        reports
    }

    /// Forwarding counters of every switch by name.
    pub fn switch_stats(&self) -> Vec<(String, SwitchStats)> {
        self.switches
            .iter()
            .zip(&self.topology.switches)
            .map(|(switch, spec)| (spec.name.clone(), switch.borrow().stats().clone()))
            .collect()
    }

    /// Statistics of the run so far.
    pub fn stats(&self) -> RunStats {
        let mut stats = RunStats {
            events_processed: self.sim.dispatched_count(),
            events_scheduled: self.sim.event_count(),
            messages_created: self.generator.borrow().messages_created(),
            end_time: self.sim.time(),
            ..Default::default()
        };
        {
            let metrics = self.metrics.borrow();
            stats.delivered = metrics.delivered();
            stats.dropped = metrics.dropped();
        }
        for report in self.port_stats() {
            stats.preemptions += report.stats.preemptions;
            stats.resumptions += report.stats.resumptions;
            stats.refused_preemptions += report.stats.refused_preemptions;
            stats.overhead_bytes += report.stats.overhead_bytes;
        }
        stats
    }
}
