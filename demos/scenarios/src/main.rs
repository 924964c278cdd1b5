use std::error::Error;
use std::path::PathBuf;

use clap::{ArgEnum, Parser};
use log::info;
use serde::Serialize;

use fabricsim::{
    background, CollectivePattern, ExperimentConfig, Fabric, LinkSpec, NodeId, PhaseTag, PortConfig, PortReport,
    PreemptionConfig, Priority, RunStats, Scenario, StreamParams, Summary, Topology,
};

#[derive(ArgEnum, Clone, Copy, Debug)]
enum Pattern {
    AllToAll,
    AllReduce,
    HierarchicalAllToAll,
    HierarchicalAllReduce,
}

/// Runs a collective against cross-rack background traffic on a two-rack tree, once with the collective at the
/// highest priority (A) and once sharing a priority with the background (B).
#[derive(Parser, Debug)]
#[clap(about, long_about = None)]
struct Args {
    /// Simulated seconds
    #[clap(long, default_value_t = 0.05)]
    duration: f64,

    /// Random seed
    #[clap(long, default_value_t = 42)]
    seed: u64,

    /// Collective pattern
    #[clap(long, arg_enum, default_value = "all-to-all")]
    pattern: Pattern,

    /// Frames per priority queue
    #[clap(long, default_value_t = 50)]
    queue: usize,

    /// Enable frame preemption on every port
    #[clap(long)]
    preemption: bool,

    /// Run a scenario file instead of the built-in comparison
    #[clap(long)]
    scenario: Option<PathBuf>,
}

#[derive(Serialize)]
struct Report {
    name: String,
    run: RunStats,
    collective: Summary,
    background: Summary,
    busiest_ports: Vec<PortReport>,
}

const RACKS: usize = 2;
const NODES_PER_RACK: usize = 4;

impl Pattern {
    fn collective(self) -> CollectivePattern {
        match self {
            Pattern::AllToAll => CollectivePattern::AllToAll,
            Pattern::AllReduce => CollectivePattern::AllReduce,
            Pattern::HierarchicalAllToAll => CollectivePattern::HierarchicalAllToAll {
                nodes_per_rack: NODES_PER_RACK,
            },
            Pattern::HierarchicalAllReduce => CollectivePattern::HierarchicalAllReduce {
                nodes_per_rack: NODES_PER_RACK,
            },
        }
    }
}

fn report(name: &str, fabric: &mut Fabric) -> Result<Report, Box<dyn Error>> {
    let run = fabric.run()?;
    let mut ports = fabric.port_stats();
    ports.sort_by(|a, b| b.stats.busy_time.total_cmp(&a.stats.busy_time));
    ports.truncate(3);
    let metrics = fabric.metrics();
    Ok(Report {
        name: name.to_owned(),
        run,
        collective: metrics.collective_summary(),
        background: metrics.phase_summary(PhaseTag::Background),
        busiest_ports: ports,
    })
}

fn comparison(args: &Args) -> Result<Vec<Report>, Box<dyn Error>> {
    let mut ports = PortConfig::with_capacity(args.queue);
    if args.preemption {
        ports = ports.preemptive(PreemptionConfig::default());
    }
    let topology = Topology::two_tier_tree(
        RACKS,
        NODES_PER_RACK,
        LinkSpec::mbps_ms(1000.0, 0.5),
        LinkSpec::mbps_ms(2000.0, 1.0),
        ports,
    )?;
    let nodes: Vec<NodeId> = topology.node_ids().collect();
    // every node of rack 0 sends to its counterpart in rack 1
    let pairs: Vec<(NodeId, NodeId)> = (0..NODES_PER_RACK as u32)
        .map(|i| (NodeId(i), NodeId(i + NODES_PER_RACK as u32)))
        .collect();

    let mut reports = Vec::new();
    for (name, collective_priority, background_priority) in [("A", 7u8, 1u8), ("B", 3, 3)] {
        let collective = StreamParams::new(Priority::try_from(collective_priority)?, 1000, 0.001);
        let cross = StreamParams::new(Priority::try_from(background_priority)?, 1500, 20e-6);
        let config = ExperimentConfig::new(args.duration, args.seed)
            .with_streams(args.pattern.collective().expand(&nodes, collective)?)
            .with_streams(background(&pairs, cross));
        info!("scenario {}: {} streams", name, config.streams.len());
        let mut fabric = Fabric::new(topology.clone(), config)?;
        reports.push(report(name, &mut fabric)?);
    }
    Ok(reports)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();

    let reports = match &args.scenario {
        Some(path) => {
            let scenario = Scenario::from_file(path)?;
            let mut fabric = Fabric::new(scenario.topology, scenario.experiment)?;
            vec![report(&path.display().to_string(), &mut fabric)?]
        }
        None => comparison(&args)?,
    };
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}
