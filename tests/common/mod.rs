#![allow(dead_code)]

use fabricsim::{LinkSpec, NodeId, PortConfig, Topology};

/// Installs a test logger once; output is shown for failing tests only.
pub fn init_logger() {
    let _ = env_logger::Builder::from_default_env().is_test(true).try_init();
}

/// Eight nodes in two racks of four: `agg0` holds n0..n3, `agg1` holds n4..n7, both under `root`.
/// Access links run at 1 Gbit/s with 0.5 ms delay, aggregation links at 2 Gbit/s with 1 ms delay.
pub fn tree(config: PortConfig) -> Topology {
    Topology::two_tier_tree(
        2,
        4,
        LinkSpec::mbps_ms(1000.0, 0.5),
        LinkSpec::mbps_ms(2000.0, 1.0),
        config,
    )
    .unwrap()
}

pub fn tree_nodes() -> Vec<NodeId> {
    (0..8).map(NodeId).collect()
}

pub fn same_rack(a: NodeId, b: NodeId) -> bool {
    a.0 / 4 == b.0 / 4
}

/// `h0 -> s0 -> h1` plus the reverse direction. The uplinks of the hosts use `host`, the switch ports use `switch`.
pub fn line(link: LinkSpec, host: PortConfig, switch: PortConfig) -> Topology {
    let mut topo = Topology::new();
    let h0 = topo.add_node("h0");
    let h1 = topo.add_node("h1");
    let s0 = topo.add_switch("s0");
    topo.attach(h0, s0, link, host.clone()).unwrap();
    topo.attach(h1, s0, link, host).unwrap();
    for port in &mut topo.switches[0].ports {
        port.config = switch.clone();
    }
    topo
}
