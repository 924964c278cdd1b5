mod common;

use fabricsim::{
    background, CollectivePattern, ExperimentConfig, Fabric, MetricsRecord, NodeId, PortConfig, PreemptionConfig,
    Priority, RunStats, StreamParams,
};

use common::{init_logger, tree, tree_nodes};

fn run(seed: u64) -> (RunStats, Vec<MetricsRecord>) {
    init_logger();
    let collective = StreamParams::new(Priority::HIGHEST, 1000, 0.0005).with_jitter(0.2);
    let cross = StreamParams::new(Priority::new(2).unwrap(), 1500, 30e-6).with_jitter(0.2);
    let config = ExperimentConfig::new(0.02, seed)
        .with_streams(CollectivePattern::AllToAll.expand(&tree_nodes(), collective).unwrap())
        .with_streams(background(&[(NodeId(0), NodeId(4)), (NodeId(1), NodeId(5))], cross));
    let ports = PortConfig::with_capacity(20).preemptive(PreemptionConfig::default());
    let mut fabric = Fabric::new(tree(ports), config).unwrap();
    let stats = fabric.run().unwrap();
    let records = fabric.metrics().records().cloned().collect();
    (stats, records)
}

#[test]
fn same_seed_same_run() {
    let (stats_a, records_a) = run(123);
    let (stats_b, records_b) = run(123);
    assert!(!records_a.is_empty());
    assert_eq!(stats_a, stats_b);
    assert_eq!(records_a, records_b);
}

#[test]
fn different_seed_different_run() {
    let (_, records_a) = run(123);
    let (_, records_b) = run(321);
    assert_ne!(records_a, records_b);
}

#[test]
fn jitter_moves_creation_times_off_the_grid() {
    let (_, records) = run(7);
    let off_grid = records
        .iter()
        .filter(|r| r.message.seq > 0)
        .any(|r| (r.message.created_at / 0.0005).fract().abs() > 1e-6);
    assert!(off_grid);
}
