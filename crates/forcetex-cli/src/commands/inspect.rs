//! Inspect command implementation.
//!
//! Prints the topology and image sizes a graph would load with, without
//! running anything.

use std::path::Path;

use anyhow::{Context, Result};
use forcetex_core::{GraphInput, LinkDirection, TextureLayout, Topology};

/// Summary of a loaded graph.
#[derive(Debug, PartialEq, Eq)]
pub struct GraphStats {
    pub nodes: usize,
    pub input_links: usize,
    pub complete_links: usize,
    pub max_degree: u32,
    pub isolated: usize,
    pub max_outgoing_group: usize,
    pub max_incoming_group: usize,
    pub points_side: u32,
    pub links_side: u32,
}

impl GraphStats {
    pub fn from_topology(topology: &Topology, input_links: usize) -> Self {
        let degrees: Vec<u32> = (0..topology.node_count())
            .filter_map(|index| topology.degree(index))
            .collect();

        Self {
            nodes: topology.node_count(),
            input_links,
            complete_links: topology.complete_link_count(),
            max_degree: degrees.iter().copied().max().unwrap_or(0),
            isolated: degrees.iter().filter(|&&degree| degree == 0).count(),
            max_outgoing_group: topology.max_group_size(LinkDirection::Outgoing),
            max_incoming_group: topology.max_group_size(LinkDirection::Incoming),
            points_side: TextureLayout::for_points(topology.node_count()).side(),
            links_side: TextureLayout::for_links(topology.complete_link_count()).side(),
        }
    }

    pub fn dropped_links(&self) -> usize {
        self.input_links - self.complete_links
    }
}

/// Execute the inspect command.
pub fn execute(path: &Path) -> Result<()> {
    let graph = GraphInput::from_path(path)
        .with_context(|| format!("Failed to load graph from {}", path.display()))?;
    let input_links = graph.links.len();
    let topology = Topology::build(graph.nodes, graph.links);
    let stats = GraphStats::from_topology(&topology, input_links);

    println!("📊 Graph: {}", path.display());
    println!();
    println!("   Nodes:            {}", stats.nodes);
    println!("   Links:            {}", stats.complete_links);
    if stats.dropped_links() > 0 {
        println!("   ⚠️  Dropped:       {} (unknown endpoints)", stats.dropped_links());
    }
    println!("   Max degree:       {}", stats.max_degree);
    println!("   Isolated nodes:   {}", stats.isolated);
    println!("   Max out group:    {}", stats.max_outgoing_group);
    println!("   Max in group:     {}", stats.max_incoming_group);
    println!();
    println!("🧱 Images:");
    println!("   Points:           {0}x{0}", stats.points_side);
    println!("   Links:            {0}x{0}", stats.links_side);

    Ok(())
}
