//! Expansion of collective operations into periodic streams.
//!
//! Flat patterns:
//!
//! - **All-to-All** over `N` nodes: one stream per ordered pair, `N * (N - 1)` in total.
//! - **All-Reduce** over `N` nodes: the first node is the root. `N - 1` reduce streams send to the root and `N - 1`
//!   broadcast streams send from it. Broadcast streams are independent periodic streams; the phase tag only labels
//!   them for analysis.
//!
//! Hierarchical patterns split the nodes into racks of `nodes_per_rack` consecutive nodes and use the first node of
//! every rack as its representative.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::message::{NodeId, PhaseTag};
use crate::traffic::{StreamParams, StreamSpec};

/// Collective operation to expand into streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CollectivePattern {
    /// Every node sends to every other node.
    AllToAll,
    /// Reduce to the first node, then broadcast from it.
    AllReduce,
    /// Intra-rack all-to-all, exchange between representatives, distribution from representatives.
    HierarchicalAllToAll {
        /// Rack size; the first node of each rack is its representative.
        nodes_per_rack: usize,
    },
    /// Local reduce, global reduce, global broadcast, local broadcast.
    HierarchicalAllReduce {
        /// Rack size; the first node of each rack is its representative.
        nodes_per_rack: usize,
    },
}

impl CollectivePattern {
    /// Streams implementing the pattern over `nodes`, in a fixed order.
    pub fn expand(&self, nodes: &[NodeId], params: StreamParams) -> Result<Vec<StreamSpec>, ConfigError> {
        if nodes.len() < 2 {
            return Err(ConfigError::invalid(
                "nodes",
                format!("a collective needs at least two nodes, got {}", nodes.len()),
            ));
        }
        match *self {
            CollectivePattern::AllToAll => Ok(all_to_all(nodes, params, PhaseTag::AllToAll)),
            CollectivePattern::AllReduce => {
                let root = nodes[0];
                let mut streams: Vec<StreamSpec> = nodes[1..]
                    .iter()
                    .map(|&n| params.stream(n, root, PhaseTag::Reduce))
                    .collect();
                streams.extend(nodes[1..].iter().map(|&n| params.stream(root, n, PhaseTag::Broadcast)));
                Ok(streams)
            }
            CollectivePattern::HierarchicalAllToAll { nodes_per_rack } => {
                let racks = racks(nodes, nodes_per_rack)?;
                let reps: Vec<NodeId> = racks.iter().map(|r| r[0]).collect();
                let mut streams = Vec::new();
                for rack in &racks {
                    streams.extend(all_to_all(rack, params, PhaseTag::IntraRack));
                }
                streams.extend(all_to_all(&reps, params, PhaseTag::InterRack));
                for rack in &racks {
                    streams.extend(rack[1..].iter().map(|&n| params.stream(rack[0], n, PhaseTag::RackDistribution)));
                }
                Ok(streams)
            }
            CollectivePattern::HierarchicalAllReduce { nodes_per_rack } => {
                let racks = racks(nodes, nodes_per_rack)?;
                let root = racks[0][0];
                let mut streams = Vec::new();
                for rack in &racks {
                    streams.extend(rack[1..].iter().map(|&n| params.stream(n, rack[0], PhaseTag::LocalReduce)));
                }
                streams.extend(racks[1..].iter().map(|r| params.stream(r[0], root, PhaseTag::GlobalReduce)));
                streams.extend(racks[1..].iter().map(|r| params.stream(root, r[0], PhaseTag::GlobalBroadcast)));
                for rack in &racks {
                    streams.extend(rack[1..].iter().map(|&n| params.stream(rack[0], n, PhaseTag::LocalBroadcast)));
                }
                Ok(streams)
            }
        }
    }
}

fn all_to_all(nodes: &[NodeId], params: StreamParams, phase: PhaseTag) -> Vec<StreamSpec> {
    nodes
        .iter()
        .flat_map(|&src| {
            nodes
                .iter()
                .filter(move |&&dst| dst != src)
                .map(move |&dst| params.stream(src, dst, phase))
        })
        .collect()
}

fn racks(nodes: &[NodeId], nodes_per_rack: usize) -> Result<Vec<&[NodeId]>, ConfigError> {
    if nodes_per_rack == 0 || nodes.len() % nodes_per_rack != 0 {
        return Err(ConfigError::invalid(
            "nodes_per_rack",
            format!("{} nodes cannot be split into racks of {nodes_per_rack}", nodes.len()),
        ));
    }
    Ok(nodes.chunks(nodes_per_rack).collect())
}

/// Always-on cross traffic over the given pairs, tagged [`PhaseTag::Background`].
pub fn background(pairs: &[(NodeId, NodeId)], params: StreamParams) -> Vec<StreamSpec> {
    pairs
        .iter()
        .map(|&(src, dst)| params.stream(src, dst, PhaseTag::Background))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Priority;

    fn nodes(n: u32) -> Vec<NodeId> {
        (0..n).map(NodeId).collect()
    }

    fn params() -> StreamParams {
        StreamParams::new(Priority::HIGHEST, 1000, 0.001)
    }

    fn count(streams: &[StreamSpec], phase: PhaseTag) -> usize {
        streams.iter().filter(|s| s.phase == phase).count()
    }

    #[test]
    fn all_to_all_covers_every_ordered_pair() {
        let streams = CollectivePattern::AllToAll.expand(&nodes(8), params()).unwrap();
        assert_eq!(streams.len(), 56);
        assert!(streams.iter().all(|s| s.src != s.dst));
        let mut pairs: Vec<_> = streams.iter().map(|s| (s.src, s.dst)).collect();
        pairs.sort();
        pairs.dedup();
        assert_eq!(pairs.len(), 56);
    }

    #[test]
    fn all_reduce_uses_first_node_as_root() {
        let streams = CollectivePattern::AllReduce.expand(&nodes(8), params()).unwrap();
        assert_eq!(streams.len(), 14);
        assert_eq!(count(&streams, PhaseTag::Reduce), 7);
        assert_eq!(count(&streams, PhaseTag::Broadcast), 7);
        for s in &streams {
            match s.phase {
                PhaseTag::Reduce => assert_eq!(s.dst, NodeId(0)),
                PhaseTag::Broadcast => assert_eq!(s.src, NodeId(0)),
                other => panic!("unexpected phase {other:?}"),
            }
        }
    }

    #[test]
    fn hierarchical_all_to_all_phases() {
        let pattern = CollectivePattern::HierarchicalAllToAll { nodes_per_rack: 4 };
        let streams = pattern.expand(&nodes(8), params()).unwrap();
        assert_eq!(count(&streams, PhaseTag::IntraRack), 24);
        assert_eq!(count(&streams, PhaseTag::InterRack), 2);
        assert_eq!(count(&streams, PhaseTag::RackDistribution), 6);
    }

    #[test]
    fn hierarchical_all_reduce_phases() {
        let pattern = CollectivePattern::HierarchicalAllReduce { nodes_per_rack: 4 };
        let streams = pattern.expand(&nodes(8), params()).unwrap();
        assert_eq!(streams.len(), 14);
        assert_eq!(count(&streams, PhaseTag::LocalReduce), 6);
        let global: Vec<_> = streams
            .iter()
            .filter(|s| s.phase == PhaseTag::GlobalReduce)
            .map(|s| (s.src, s.dst))
            .collect();
        assert_eq!(global, vec![(NodeId(4), NodeId(0))]);
    }

    #[test]
    fn uneven_racks_and_tiny_groups_are_rejected() {
        let pattern = CollectivePattern::HierarchicalAllReduce { nodes_per_rack: 3 };
        assert!(pattern.expand(&nodes(8), params()).is_err());
        assert!(CollectivePattern::AllToAll.expand(&nodes(1), params()).is_err());
    }

    #[test]
    fn background_pairs_are_tagged() {
        let streams = background(&[(NodeId(0), NodeId(4)), (NodeId(1), NodeId(5))], params());
        assert_eq!(streams.len(), 2);
        assert!(streams.iter().all(|s| s.phase == PhaseTag::Background));
    }
}
