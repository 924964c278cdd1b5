//! Discrete-event simulation of collective communication traffic (All-to-All, All-Reduce) over priority-queued
//! datacenter fabrics with frame preemption. The crate measures delay, jitter, drop rate and throughput of collective
//! traffic competing with background traffic under different priority and preemption policies.
//!
//! ## Contents
//!
//! - [Basic Concepts](crate#basic-concepts)
//! - [Example](crate#example)
//! - [Simulation Kernel](crate#simulation-kernel)
//! - [Fabric Model](crate#fabric-model)
//! - [Frame Preemption](crate#frame-preemption)
//! - [Traffic](crate#traffic)
//!
//! ## Basic Concepts
//!
//! A run is described by a [`Topology`] and an [`ExperimentConfig`]. The topology lists compute nodes, switches and
//! the directed links between them, together with the per-port scheduling configuration and the forwarding table of
//! every switch. The experiment sets the simulated duration, the random seed and the periodic traffic streams.
//! [`Fabric::new`] checks both and turns them into simulation components; [`Fabric::run`] executes the model and
//! the [`MetricsSink`] collects one record per message that was delivered or dropped.
//!
//! **Message.** A [`Message`] is created by a stream at its source node with a priority from 0 (lowest) to 7
//! (highest) and a size in bytes. It is immutable and ends up either delivered or dropped.
//!
//! **Frame.** At every hop a message travels as a [`Frame`] which tracks how many bytes have been put on the wire.
//! The sum of sent and remaining bytes always equals the message size.
//!
//! **Link.** Every node and switch owns its outbound links. A [`Link`] has a bandwidth, a propagation delay and an
//! egress port with eight bounded FIFO queues, one per priority.
//!
//! ## Example
//!
//! ```rust
//! use fabricsim::{
//!     background, CollectivePattern, ExperimentConfig, Fabric, LinkSpec, NodeId, PhaseTag, PortConfig, Priority,
//!     StreamParams, Topology,
//! };
//!
//! // Two racks of four nodes under one root switch
//! let topology = Topology::two_tier_tree(
//!     2,
//!     4,
//!     LinkSpec::mbps_ms(1000.0, 0.5),
//!     LinkSpec::mbps_ms(2000.0, 1.0),
//!     PortConfig::default(),
//! )
//! .unwrap();
//! let nodes: Vec<NodeId> = topology.node_ids().collect();
//!
//! // All-to-All at priority 7 against cross-rack background traffic at priority 1
//! let collective = StreamParams::new(Priority::HIGHEST, 1000, 0.01);
//! let cross = StreamParams::new(Priority::new(1).unwrap(), 1500, 0.001);
//! let config = ExperimentConfig::new(0.1, 42)
//!     .with_streams(CollectivePattern::AllToAll.expand(&nodes, collective).unwrap())
//!     .with_streams(background(&[(NodeId(0), NodeId(4)), (NodeId(1), NodeId(5))], cross));
//!
//! let mut fabric = Fabric::new(topology, config).unwrap();
//! let stats = fabric.run().unwrap();
//! let summary = fabric.metrics().phase_summary(PhaseTag::AllToAll);
//! assert!(stats.delivered > 0);
//! assert_eq!(summary.delay.unwrap().count as u64, summary.delivered);
//! ```
//!
//! ## Simulation Kernel
//!
//! The kernel follows the classic event-driven model. [`Simulation`] owns the clock, the event queue and a seeded
//! random number generator. Components are registered under unique names; each gets a [`SimulationContext`] for
//! reading the time, drawing random numbers and emitting events to other components, and implements
//! [`EventHandler`] to receive events. The [`cast!`] macro matches the type of the event payload.
//!
//! Events are dispatched in non-decreasing time order. Events with equal timestamps are dispatched in the order they
//! were emitted, which makes runs with the same seed exactly reproducible. A pending event can be canceled; canceling
//! an event that already fired has no effect. Emitting an event into the past is a [`SchedulingViolation`], as is
//! any broken engine invariant detected by the fabric components. A violation aborts the run.
//!
//! ## Fabric Model
//!
//! A message arriving at a switch is looked up in the forwarding table and its frame is enqueued at the selected
//! egress port. The port serves the head of the highest non-empty priority queue, one frame at a time, and the frame
//! occupies the link for `size * 8 / bandwidth` seconds. The message then reaches the peer after the propagation
//! delay. A frame arriving at a full queue is dropped and recorded; it is never retried. Node uplinks use the same
//! port machinery as switch ports.
//!
//! ## Frame Preemption
//!
//! A port configured with a [`PreemptionConfig`] may interrupt the frame on the link when a higher priority frame
//! waits. The interrupted frame keeps the bytes it has left and goes onto a LIFO suspension stack; the port pays a
//! guard band before sending the new frame. When the link frees up, the most recently suspended frame is resumed
//! after a resume overhead. Frames close to completion, with no more than `min_preemptible_remainder` bytes left,
//! are never interrupted. See [`preemption`] for the details.
//!
//! ## Traffic
//!
//! Traffic consists of periodic streams ([`StreamSpec`]) emitting equally sized messages between two nodes. The
//! [`CollectivePattern`] variants expand a collective operation over a set of nodes into streams tagged with their
//! phase, and [`background`] adds cross traffic. Per-phase summaries of delay, jitter, drop rate and throughput are
//! available from [`MetricsSink::summary`].

#![warn(missing_docs)]
#![allow(clippy::needless_doctest_main)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod collective;
pub mod component;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod events;
pub mod fabric;
pub mod handler;
pub mod link;
pub mod log;
pub mod message;
pub mod metrics;
pub mod node;
pub mod port;
pub mod preemption;
pub mod queue;
pub mod simulation;
mod state;
pub mod switch;
pub mod topology;
pub mod traffic;

pub use colored;
pub use collective::{background, CollectivePattern};
pub use component::Id;
pub use config::{ExperimentConfig, PortConfig, Scenario};
pub use context::SimulationContext;
pub use error::{ConfigError, Error, SchedulingViolation, SimResult};
pub use event::{Event, EventData, EventId};
pub use fabric::{Fabric, PortReport, RunStats};
pub use handler::EventHandler;
pub use link::{Link, LinkSpec};
pub use message::{Frame, Message, MessageId, NodeId, PhaseTag, Priority, StreamId, SwitchId};
pub use metrics::{DelayStats, DropPoint, MetricsRecord, MetricsSink, Outcome, Summary};
pub use port::{EgressPort, PortState, PortStats};
pub use preemption::PreemptionConfig;
pub use simulation::Simulation;
pub use switch::SwitchStats;
pub use topology::{Hop, PortId, Topology};
pub use traffic::{StreamParams, StreamSpec, TrafficGenerator};
