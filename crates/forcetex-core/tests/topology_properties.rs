//! Property-style checks for the topology index and input loading.
//!
//! Run with: `cargo test --package forcetex-core --test topology_properties`

use std::collections::HashSet;

use forcetex_core::{
    GraphInput, InputLink, InputNode, LinkDirection, SimulationConfig, TextureLayout, Topology,
};

// =============================================================================
// Helpers
// =============================================================================

/// Deterministic xorshift so the graphs are reproducible without extra deps.
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next() % n as u64) as usize
    }
}

fn random_graph(seed: u64, nodes: usize, links: usize, dangling: usize) -> (Vec<InputNode>, Vec<InputLink>) {
    let mut rng = XorShift(seed);
    let node_list = (0..nodes).map(|i| InputNode::new(format!("n{i}"))).collect();
    let mut link_list: Vec<InputLink> = (0..links)
        .map(|_| {
            InputLink::new(
                format!("n{}", rng.below(nodes)),
                format!("n{}", rng.below(nodes)),
            )
        })
        .collect();
    for i in 0..dangling {
        link_list.push(InputLink::new(format!("n{}", rng.below(nodes)), format!("ghost{i}")));
        link_list.push(InputLink::new(format!("ghost{i}"), format!("n{}", rng.below(nodes))));
    }
    (node_list, link_list)
}

// =============================================================================
// Sorted order
// =============================================================================

#[test]
fn test_sorted_index_is_a_bijection() {
    for seed in [1u64, 7, 42, 1234] {
        let (nodes, links) = random_graph(seed, 97, 300, 0);
        let topo = Topology::build(nodes, links);

        let mut seen = HashSet::new();
        for sorted in 0..topo.node_count() {
            let input = topo.input_index_of(sorted).unwrap();
            assert!(seen.insert(input), "input index {input} assigned twice");
            assert_eq!(topo.sorted_index_of(input), Some(sorted));

            let id = &topo.nodes()[input].id;
            assert_eq!(topo.sorted_index_by_id(id), Some(sorted));
        }
        assert_eq!(seen.len(), topo.node_count());
    }
}

#[test]
fn test_degree_is_non_decreasing_in_sorted_order() {
    let (nodes, links) = random_graph(99, 200, 800, 0);
    let topo = Topology::build(nodes, links);

    let degrees: Vec<u32> = (0..topo.node_count())
        .map(|sorted| topo.sorted_degree(sorted).unwrap())
        .collect();
    assert!(degrees.windows(2).all(|w| w[0] <= w[1]));
}

// =============================================================================
// Completeness filtering
// =============================================================================

#[test]
fn test_dangling_links_never_reach_groups_or_degree() {
    let (nodes, links) = random_graph(5, 50, 120, 30);
    let total_links = links.len();
    let topo = Topology::build(nodes.clone(), links.clone());

    assert_eq!(topo.complete_link_count(), total_links - 60);

    let (clean_nodes, clean_links): (Vec<_>, Vec<_>) = (
        nodes,
        links
            .into_iter()
            .filter(|l| !l.source.starts_with("ghost") && !l.target.starts_with("ghost"))
            .collect(),
    );
    let clean = Topology::build(clean_nodes, clean_links);

    for input in 0..topo.node_count() {
        assert_eq!(topo.degree(input), clean.degree(input));
    }
    for direction in LinkDirection::ALL {
        assert_eq!(topo.groups(direction), clean.groups(direction));
    }
}

#[test]
fn test_group_entries_fit_link_texture() {
    let (nodes, links) = random_graph(11, 64, 500, 0);
    let topo = Topology::build(nodes, links);
    let layout = TextureLayout::for_links(topo.complete_link_count());

    for direction in LinkDirection::ALL {
        assert!(topo.group_entry_count(direction) <= layout.texel_count());
    }
}

// =============================================================================
// File loading
// =============================================================================

#[test]
fn test_load_graph_and_config_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let graph_path = dir.path().join("graph.json");
    let config_path = dir.path().join("config.json");

    std::fs::write(
        &graph_path,
        r#"{"nodes":[{"id":"a"},{"id":"b"}],"links":[{"source":"a","target":"b"}]}"#,
    )
    .unwrap();
    std::fs::write(&config_path, r#"{"spaceSize": 512, "gravity": 0.25}"#).unwrap();

    let graph = GraphInput::from_path(&graph_path).unwrap();
    let config = SimulationConfig::from_path(&config_path).unwrap();

    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(config.space_size, 512);
    assert_eq!(config.gravity, 0.25);
    assert!(SimulationConfig::from_path(dir.path().join("missing.json")).is_err());
}
