//! Topology indexing: degree-sorted node order and ragged adjacency groups.
//!
//! All engine-side addressing uses the *sorted index* (rank by ascending
//! total degree, ties kept in input order). Callers only ever see ids and
//! input indices; this module owns the bijection between the three.

use std::collections::{HashMap, HashSet};

use crate::{InputLink, InputNode};

/// Which side of a link a group is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkDirection {
    /// Source → targets.
    Outgoing,
    /// Target → sources.
    Incoming,
}

impl LinkDirection {
    pub const ALL: [LinkDirection; 2] = [LinkDirection::Outgoing, LinkDirection::Incoming];

    pub fn label(&self) -> &'static str {
        match self {
            LinkDirection::Outgoing => "outgoing",
            LinkDirection::Incoming => "incoming",
        }
    }
}

/// Static index over one loaded dataset.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    nodes: Vec<InputNode>,
    /// Complete links only, in input order.
    links: Vec<InputLink>,
    id_to_input: HashMap<String, usize>,
    in_degree: Vec<u32>,
    out_degree: Vec<u32>,
    degree: Vec<u32>,
    sorted_to_input: Vec<usize>,
    input_to_sorted: Vec<usize>,
    /// Keyed by sorted index, values are sorted indices.
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
}

impl Topology {
    /// Index a raw node/link list.
    ///
    /// Links whose source or target id is unknown are dropped here and never
    /// seen again; they contribute neither degree nor adjacency.
    pub fn build(nodes: Vec<InputNode>, links: Vec<InputLink>) -> Self {
        let node_count = nodes.len();

        let mut id_to_input = HashMap::with_capacity(node_count);
        for (index, node) in nodes.iter().enumerate() {
            id_to_input.insert(node.id.clone(), index);
        }

        let mut in_degree = vec![0u32; node_count];
        let mut out_degree = vec![0u32; node_count];
        let mut resolved = Vec::with_capacity(links.len());
        let mut complete = Vec::with_capacity(links.len());
        let mut dropped = 0usize;

        for link in links {
            match (id_to_input.get(&link.source), id_to_input.get(&link.target)) {
                (Some(&source), Some(&target)) => {
                    out_degree[source] += 1;
                    in_degree[target] += 1;
                    resolved.push((source, target));
                    complete.push(link);
                }
                _ => dropped += 1,
            }
        }

        if dropped > 0 {
            tracing::debug!(dropped, "Dropped links with unknown endpoints");
        }

        let degree: Vec<u32> = in_degree
            .iter()
            .zip(&out_degree)
            .map(|(i, o)| i + o)
            .collect();

        // Vec::sort_by_key is stable, so equal degrees keep input order.
        let mut sorted_to_input: Vec<usize> = (0..node_count).collect();
        sorted_to_input.sort_by_key(|&input| degree[input]);

        let mut input_to_sorted = vec![0usize; node_count];
        for (sorted, &input) in sorted_to_input.iter().enumerate() {
            input_to_sorted[input] = sorted;
        }

        let mut outgoing = vec![Vec::new(); node_count];
        let mut incoming = vec![Vec::new(); node_count];
        let mut seen = HashSet::with_capacity(resolved.len());
        for (source, target) in resolved {
            let pair = (input_to_sorted[source], input_to_sorted[target]);
            if seen.insert(pair) {
                outgoing[pair.0].push(pair.1);
                incoming[pair.1].push(pair.0);
            }
        }

        Self {
            nodes,
            links: complete,
            id_to_input,
            in_degree,
            out_degree,
            degree,
            sorted_to_input,
            input_to_sorted,
            outgoing,
            incoming,
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn complete_link_count(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in input order.
    pub fn nodes(&self) -> &[InputNode] {
        &self.nodes
    }

    /// Complete links in input order.
    pub fn links(&self) -> &[InputLink] {
        &self.links
    }

    /// Total degree by input index.
    pub fn degree(&self, input_index: usize) -> Option<u32> {
        self.degree.get(input_index).copied()
    }

    pub fn in_degree(&self, input_index: usize) -> Option<u32> {
        self.in_degree.get(input_index).copied()
    }

    pub fn out_degree(&self, input_index: usize) -> Option<u32> {
        self.out_degree.get(input_index).copied()
    }

    /// Total degree by sorted index.
    pub fn sorted_degree(&self, sorted_index: usize) -> Option<u32> {
        self.sorted_to_input
            .get(sorted_index)
            .map(|&input| self.degree[input])
    }

    pub fn sorted_index_of(&self, input_index: usize) -> Option<usize> {
        self.input_to_sorted.get(input_index).copied()
    }

    pub fn input_index_of(&self, sorted_index: usize) -> Option<usize> {
        self.sorted_to_input.get(sorted_index).copied()
    }

    pub fn input_index_by_id(&self, id: &str) -> Option<usize> {
        self.id_to_input.get(id).copied()
    }

    pub fn sorted_index_by_id(&self, id: &str) -> Option<usize> {
        self.input_index_by_id(id)
            .map(|input| self.input_to_sorted[input])
    }

    pub fn node_by_sorted(&self, sorted_index: usize) -> Option<&InputNode> {
        self.input_index_of(sorted_index).map(|input| &self.nodes[input])
    }

    pub fn node_by_id(&self, id: &str) -> Option<&InputNode> {
        self.input_index_by_id(id).map(|input| &self.nodes[input])
    }

    /// Adjacency groups for one direction, indexed by sorted index.
    pub fn groups(&self, direction: LinkDirection) -> &[Vec<usize>] {
        match direction {
            LinkDirection::Outgoing => &self.outgoing,
            LinkDirection::Incoming => &self.incoming,
        }
    }

    /// Largest group size in one direction.
    pub fn max_group_size(&self, direction: LinkDirection) -> usize {
        self.groups(direction)
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
    }

    /// Number of packed entries for one direction.
    pub fn group_entry_count(&self, direction: LinkDirection) -> usize {
        self.groups(direction).iter().map(Vec::len).sum()
    }

    /// Ids of every node linked to `id` in either direction.
    ///
    /// Returns `None` when the id is unknown.
    pub fn adjacent_ids(&self, id: &str) -> Option<Vec<&str>> {
        let sorted = self.sorted_index_by_id(id)?;
        let mut seen = HashSet::new();
        let ids = self.outgoing[sorted]
            .iter()
            .chain(&self.incoming[sorted])
            .filter(|&&neighbor| seen.insert(neighbor))
            .filter_map(|&neighbor| self.node_by_sorted(neighbor))
            .map(|node| node.id.as_str())
            .collect();
        Some(ids)
    }
}
