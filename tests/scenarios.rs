//! Collective traffic against cross-rack background traffic on the two-rack tree.
//!
//! Background streams n0->n4, n1->n5, n2->n6 and n3->n7 together offer 2.4 Gbit/s to the 2 Gbit/s uplink of `agg0`,
//! so that port stays congested for most of the run. Scenario A gives the collective priority 7 and the background
//! priority 1; scenario B puts both at priority 3.

mod common;

use fabricsim::{
    background, CollectivePattern, ExperimentConfig, Fabric, NodeId, PortConfig, Priority, StreamParams, Summary,
};

use common::{init_logger, tree, tree_nodes};

const DURATION: f64 = 0.05;
const QUEUE: usize = 50;

fn background_pairs() -> Vec<(NodeId, NodeId)> {
    (0..4).map(|i| (NodeId(i), NodeId(i + 4))).collect()
}

fn run(pattern: CollectivePattern, collective_priority: u8, background_priority: u8) -> (Summary, Summary) {
    init_logger();
    let collective = StreamParams::new(Priority::new(collective_priority).unwrap(), 1000, 0.001);
    let cross = StreamParams::new(Priority::new(background_priority).unwrap(), 1500, 20e-6);
    let config = ExperimentConfig::new(DURATION, 11)
        .with_streams(pattern.expand(&tree_nodes(), collective).unwrap())
        .with_streams(background(&background_pairs(), cross));
    let mut fabric = Fabric::new(tree(PortConfig::with_capacity(QUEUE)), config).unwrap();
    fabric.run().unwrap();
    let metrics = fabric.metrics();
    let all = metrics.collective_summary();
    // only this direction crosses the congested uplink of agg0
    let upstream = metrics.summary(|r| r.message.phase.is_collective() && r.message.src.0 < 4 && r.message.dst.0 >= 4);
    (all, upstream)
}

#[test]
fn all_to_all_expands_to_56_streams() {
    let params = StreamParams::new(Priority::HIGHEST, 1000, 0.001);
    let streams = CollectivePattern::AllToAll.expand(&tree_nodes(), params).unwrap();
    assert_eq!(streams.len(), 56);
}

#[test]
fn all_to_all_high_priority_beats_shared_priority() {
    let (a_all, a_up) = run(CollectivePattern::AllToAll, 7, 1);
    let (b_all, b_up) = run(CollectivePattern::AllToAll, 3, 3);

    assert_eq!(a_all.dropped, 0);
    assert!(b_all.drop_rate() >= a_all.drop_rate());

    // priority 7 only ever waits for the collective burst and one background frame per hop
    let a_delay = a_up.delay.as_ref().unwrap();
    assert!(a_delay.max < 3e-3 + 300e-6, "{a_delay:?}");
    let b_worse = b_up.dropped > 0 || b_up.mean_delay().is_some_and(|b| b > a_delay.mean + 100e-6);
    assert!(b_worse, "A {a_up:?} vs B {b_up:?}");
}

#[test]
fn all_reduce_high_priority_is_never_dropped() {
    let (a_all, a_up) = run(CollectivePattern::AllReduce, 7, 1);
    let (_, b_up) = run(CollectivePattern::AllReduce, 3, 3);

    assert_eq!(a_all.dropped, 0);
    assert!(a_all.delivered > 0);
    // the broadcast from n0 is the only collective traffic towards rack 1
    let a_delay = a_up.mean_delay().unwrap();
    let b_worse = b_up.dropped > 0 || b_up.mean_delay().is_some_and(|b| b > a_delay + 100e-6);
    assert!(b_worse, "A {a_up:?} vs B {b_up:?}");
}

#[test]
fn background_suffers_when_it_has_lower_priority() {
    init_logger();
    let collective = StreamParams::new(Priority::HIGHEST, 1000, 0.001);
    let cross = StreamParams::new(Priority::new(1).unwrap(), 1500, 20e-6);
    let config = ExperimentConfig::new(DURATION, 11)
        .with_streams(CollectivePattern::AllToAll.expand(&tree_nodes(), collective).unwrap())
        .with_streams(background(&background_pairs(), cross));
    let mut fabric = Fabric::new(tree(PortConfig::with_capacity(QUEUE)), config).unwrap();
    let stats = fabric.run().unwrap();
    let background = fabric.metrics().phase_summary(fabricsim::PhaseTag::Background);

    // 4 x 600 Mbit/s into a 2 Gbit/s port
    assert!(background.dropped > 0);
    assert_eq!(stats.dropped, background.dropped);
    let agg0_up = fabric
        .port_stats()
        .into_iter()
        .find(|r| r.component == "agg0" && r.port == 0)
        .unwrap();
    assert_eq!(agg0_up.stats.drops_by_priority[1], background.dropped);
    assert!(agg0_up.stats.busy_time > 0.9 * DURATION);
}
