//! Fabric description: nodes, switches, directed links and forwarding tables.
//!
//! A [`Topology`] is plain data. How it was derived (tree, ring, rails) does not matter to the engine, which only
//! requires that the forwarding tables lead every configured stream from its source to its destination.
//! [`Topology::two_tier_tree`] builds the rack-and-aggregation tree used by the bundled scenarios.

use std::collections::BTreeMap;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::config::PortConfig;
use crate::error::ConfigError;
use crate::link::LinkSpec;
use crate::message::{NodeId, SwitchId};

/// Index of an egress port within its owner.
pub type PortId = usize;

/// Receiving end of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hop {
    /// Delivers to a node.
    Node(NodeId),
    /// Forwards through a switch.
    Switch(SwitchId),
}

/// Directed link leaving a node or switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSpec {
    /// Receiving end.
    pub to: Hop,
    /// Bandwidth and delay.
    pub link: LinkSpec,
    /// Scheduling of the egress port.
    #[serde(default)]
    pub config: PortConfig,
}

/// Compute node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique component name.
    pub name: String,
    /// Link into the fabric; required for nodes that send traffic.
    #[serde(default)]
    pub uplink: Option<PortSpec>,
}

/// Switch with its ports and forwarding table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchSpec {
    /// Unique component name.
    pub name: String,
    /// Egress ports; the index is the port id.
    #[serde(default)]
    pub ports: Vec<PortSpec>,
    /// Forwarding table: destination node to egress port.
    #[serde(default)]
    pub routes: BTreeMap<NodeId, PortId>,
}

/// Nodes and switches are identified by their position in the respective list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    /// Compute nodes.
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    /// Switches.
    #[serde(default)]
    pub switches: Vec<SwitchSpec>,
}

impl Topology {
    /// Empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node without uplink.
    pub fn add_node(&mut self, name: impl Into<String>) -> NodeId {
        self.nodes.push(NodeSpec {
            name: name.into(),
            uplink: None,
        });
        NodeId(self.nodes.len() as u32 - 1)
    }

    /// Adds a switch without ports.
    pub fn add_switch(&mut self, name: impl Into<String>) -> SwitchId {
        self.switches.push(SwitchSpec {
            name: name.into(),
            ports: Vec::new(),
            routes: BTreeMap::new(),
        });
        SwitchId(self.switches.len() as u32 - 1)
    }

    /// Looks up a node.
    pub fn node(&self, id: NodeId) -> Result<&NodeSpec, ConfigError> {
        self.nodes.get(id.0 as usize).ok_or(ConfigError::UnknownNode(id))
    }

    /// Looks up a switch.
    pub fn switch(&self, id: SwitchId) -> Result<&SwitchSpec, ConfigError> {
        self.switches.get(id.0 as usize).ok_or(ConfigError::UnknownSwitch(id))
    }

    fn switch_mut(&mut self, id: SwitchId) -> Result<&mut SwitchSpec, ConfigError> {
        self.switches.get_mut(id.0 as usize).ok_or(ConfigError::UnknownSwitch(id))
    }

    /// All node ids in order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// Sets the outbound link of a node.
    pub fn set_uplink(&mut self, node: NodeId, port: PortSpec) -> Result<(), ConfigError> {
        let spec = self.nodes.get_mut(node.0 as usize).ok_or(ConfigError::UnknownNode(node))?;
        spec.uplink = Some(port);
        Ok(())
    }

    /// Adds an egress port to a switch.
    pub fn add_port(&mut self, switch: SwitchId, port: PortSpec) -> Result<PortId, ConfigError> {
        let spec = self.switch_mut(switch)?;
        spec.ports.push(port);
        Ok(spec.ports.len() - 1)
    }

    /// Sets the forwarding entry of `switch` for `dst`.
    pub fn add_route(&mut self, switch: SwitchId, dst: NodeId, port: PortId) -> Result<(), ConfigError> {
        self.switch_mut(switch)?.routes.insert(dst, port);
        Ok(())
    }

    /// Links `node` and `switch` in both directions and routes traffic for `node` through the new switch port.
    pub fn attach(
        &mut self,
        node: NodeId,
        switch: SwitchId,
        link: LinkSpec,
        config: PortConfig,
    ) -> Result<PortId, ConfigError> {
        self.set_uplink(
            node,
            PortSpec {
                to: Hop::Switch(switch),
                link,
                config: config.clone(),
            },
        )?;
        let port = self.add_port(
            switch,
            PortSpec {
                to: Hop::Node(node),
                link,
                config,
            },
        )?;
        self.add_route(switch, node, port)?;
        Ok(port)
    }

    /// Links two switches in both directions; returns the port on `a` and the port on `b`.
    pub fn interconnect(
        &mut self,
        a: SwitchId,
        b: SwitchId,
        link: LinkSpec,
        config: PortConfig,
    ) -> Result<(PortId, PortId), ConfigError> {
        let pa = self.add_port(
            a,
            PortSpec {
                to: Hop::Switch(b),
                link,
                config: config.clone(),
            },
        )?;
        let pb = self.add_port(
            b,
            PortSpec {
                to: Hop::Switch(a),
                link,
                config,
            },
        )?;
        Ok((pa, pb))
    }

    /// Two-tier tree: `racks` aggregation switches with `nodes_per_rack` nodes each under one root switch.
    ///
    /// Nodes are numbered rack by rack, so rack `r` holds nodes `r * nodes_per_rack ..`. Every port, node uplinks
    /// included, uses `config`.
    pub fn two_tier_tree(
        racks: usize,
        nodes_per_rack: usize,
        access: LinkSpec,
        aggregation: LinkSpec,
        config: PortConfig,
    ) -> Result<Self, ConfigError> {
        if racks == 0 || nodes_per_rack == 0 {
            return Err(ConfigError::invalid("racks", "tree needs at least one rack with one node"));
        }
        let mut topo = Topology::new();
        let root = topo.add_switch("root");
        for r in 0..racks {
            let agg = topo.add_switch(format!("agg{r}"));
            let (up, down) = topo.interconnect(agg, root, aggregation, config.clone())?;
            let rack: Vec<NodeId> = (0..nodes_per_rack)
                .map(|i| topo.add_node(format!("n{}", r * nodes_per_rack + i)))
                .collect();
            for &node in &rack {
                topo.attach(node, agg, access, config.clone())?;
                topo.add_route(root, node, down)?;
            }
            // everything outside the rack leaves through the root
            for other in 0..racks * nodes_per_rack {
                let other = NodeId(other as u32);
                if !rack.contains(&other) {
                    topo.add_route(agg, other, up)?;
                }
            }
        }
        Ok(topo)
    }

    /// Checks names, link parameters, port configurations and forwarding tables.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = FxHashSet::default();
        for name in self.nodes.iter().map(|n| &n.name).chain(self.switches.iter().map(|s| &s.name)) {
            if name.is_empty() {
                return Err(ConfigError::invalid("name", "component names must not be empty"));
            }
            if !names.insert(name.as_str()) {
                return Err(ConfigError::DuplicateName(name.clone()));
            }
        }
        for node in &self.nodes {
            if let Some(port) = &node.uplink {
                self.validate_port(port)?;
            }
        }
        for switch in &self.switches {
            for port in &switch.ports {
                self.validate_port(port)?;
            }
            for (&dst, &port) in &switch.routes {
                self.node(dst)?;
                if port >= switch.ports.len() {
                    return Err(ConfigError::DanglingRoute {
                        switch: switch.name.clone(),
                        dst,
                        port,
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_port(&self, port: &PortSpec) -> Result<(), ConfigError> {
        match port.to {
            Hop::Node(id) => {
                self.node(id)?;
            }
            Hop::Switch(id) => {
                self.switch(id)?;
            }
        }
        port.link.validate()?;
        port.config.validate()
    }

    /// Follows the forwarding tables from `src` to `dst` and returns the switches on the way.
    pub fn path(&self, src: NodeId, dst: NodeId) -> Result<Vec<SwitchId>, ConfigError> {
        let source = self.node(src)?;
        self.node(dst)?;
        let uplink = source
            .uplink
            .as_ref()
            .ok_or_else(|| ConfigError::MissingUplink(source.name.clone()))?;
        let unreachable = |reason: String| ConfigError::Unreachable { src, dst, reason };
        let mut visited = Vec::new();
        let mut hop = uplink.to;
        loop {
            match hop {
                Hop::Node(node) if node == dst => return Ok(visited),
                Hop::Node(node) => return Err(unreachable(format!("forwarded to {node}"))),
                Hop::Switch(switch) => {
                    if visited.contains(&switch) {
                        return Err(unreachable(format!("routing loop through {}", self.switch(switch)?.name)));
                    }
                    visited.push(switch);
                    let spec = self.switch(switch)?;
                    let port = spec
                        .routes
                        .get(&dst)
                        .and_then(|&p| spec.ports.get(p))
                        .ok_or_else(|| unreachable(format!("no route at {}", spec.name)))?;
                    hop = port.to;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Topology {
        Topology::two_tier_tree(
            2,
            4,
            LinkSpec::mbps_ms(1000.0, 0.5),
            LinkSpec::mbps_ms(2000.0, 1.0),
            PortConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn tree_has_expected_shape() {
        let topo = tree();
        assert_eq!(topo.nodes.len(), 8);
        assert_eq!(topo.switches.len(), 3);
        assert!(topo.validate().is_ok());
        assert_eq!(topo.switches[1].name, "agg0");
        assert_eq!(topo.nodes[5].name, "n5");
    }

    #[test]
    fn paths_in_tree() {
        let topo = tree();
        assert_eq!(topo.path(NodeId(0), NodeId(3)).unwrap(), vec![SwitchId(1)]);
        assert_eq!(
            topo.path(NodeId(0), NodeId(4)).unwrap(),
            vec![SwitchId(1), SwitchId(0), SwitchId(2)]
        );
        for src in topo.node_ids() {
            for dst in topo.node_ids() {
                if src != dst {
                    assert!(topo.path(src, dst).is_ok(), "{src} -> {dst}");
                }
            }
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut topo = Topology::new();
        topo.add_node("x");
        topo.add_switch("x");
        assert_eq!(topo.validate(), Err(ConfigError::DuplicateName("x".into())));
    }

    #[test]
    fn dangling_route_is_rejected() {
        let mut topo = Topology::new();
        let n = topo.add_node("n0");
        let s = topo.add_switch("s0");
        topo.add_route(s, n, 3).unwrap();
        assert!(matches!(topo.validate(), Err(ConfigError::DanglingRoute { port: 3, .. })));
    }

    #[test]
    fn loops_and_missing_routes_are_unreachable() {
        let mut topo = Topology::new();
        let a = topo.add_node("a");
        let b = topo.add_node("b");
        let s0 = topo.add_switch("s0");
        let s1 = topo.add_switch("s1");
        let link = LinkSpec::new(1e9, 0.0);
        topo.attach(a, s0, link, PortConfig::default()).unwrap();
        let (p0, p1) = topo.interconnect(s0, s1, link, PortConfig::default()).unwrap();
        assert!(matches!(topo.path(a, b), Err(ConfigError::Unreachable { .. })));
        topo.add_route(s0, b, p0).unwrap();
        topo.add_route(s1, b, p1).unwrap();
        let err = topo.path(a, b).unwrap_err();
        assert!(err.to_string().contains("loop"));
        assert!(matches!(topo.path(b, a), Err(ConfigError::MissingUplink(_))));
    }

    #[test]
    fn topology_round_trips_through_json() {
        let topo = tree();
        let json = serde_json::to_string(&topo).unwrap();
        let back: Topology = serde_json::from_str(&json).unwrap();
        assert_eq!(back, topo);
    }
}
