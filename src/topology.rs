//! Graph topology: node identity and connectivity
//!
//! A [`GraphTopology`] is validated once at load time and never mutated
//! afterwards. A graph update loads a fresh topology and computes a
//! [`TopologyDiff`] against the previous one so simulation state can be
//! reconciled instead of rebuilt.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{PathError, TopologyError, TopologyResult};

/// Default weight for edges that do not specify one
pub const DEFAULT_EDGE_WEIGHT: f32 = 1.0;

/// Default mass for nodes that do not specify one
pub const DEFAULT_NODE_MASS: f32 = 1.0;

/// A node as supplied by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Stable identity of the node
    pub id: String,
    /// Mass used by repulsion (derived from a size metric by the host)
    #[serde(default = "default_mass")]
    pub mass: f32,
    /// Opaque passthrough, never read by the simulation
    #[serde(default)]
    pub metadata: Value,
}

fn default_mass() -> f32 {
    DEFAULT_NODE_MASS
}

impl NodeSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mass: DEFAULT_NODE_MASS,
            metadata: Value::Null,
        }
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// An edge as supplied by the host, keyed by node ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeSpec {
    pub source: String,
    pub target: String,
    #[serde(default = "default_weight")]
    pub weight: f32,
    /// Overrides the global natural length for this edge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_length: Option<f32>,
}

fn default_weight() -> f32 {
    DEFAULT_EDGE_WEIGHT
}

impl EdgeSpec {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            weight: DEFAULT_EDGE_WEIGHT,
            rest_length: None,
        }
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_rest_length(mut self, rest_length: f32) -> Self {
        self.rest_length = Some(rest_length);
        self
    }
}

/// A validated, deduplicated edge (indices into the topology's node list)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopologyEdge {
    pub source: usize,
    pub target: usize,
    /// Summed weight of every input edge between this pair
    pub weight: f32,
    pub rest_length: Option<f32>,
}

/// Immutable record of nodes and edges
#[derive(Debug, Clone, Default)]
pub struct GraphTopology {
    nodes: Vec<NodeSpec>,
    edges: Vec<TopologyEdge>,
    index: HashMap<String, usize>,
}

impl GraphTopology {
    /// Validate and build a topology
    ///
    /// Fails on duplicate node ids, edges naming unknown nodes, and negative
    /// or non-finite weights. Edges between the same unordered pair are merged
    /// by summing weights; the first explicit rest length wins. Self-loops
    /// carry no spring and are dropped.
    pub fn load(nodes: Vec<NodeSpec>, edges: Vec<EdgeSpec>) -> TopologyResult<Self> {
        let mut index = HashMap::with_capacity(nodes.len());
        let mut nodes = nodes;
        for (i, node) in nodes.iter_mut().enumerate() {
            if index.insert(node.id.clone(), i).is_some() {
                return Err(TopologyError::DuplicateNode(node.id.clone()));
            }
            if !node.mass.is_finite() || node.mass < 0.0 {
                warn!(id = %node.id, mass = node.mass, "invalid node mass, using default");
                node.mass = DEFAULT_NODE_MASS;
            }
        }

        let mut merged: Vec<TopologyEdge> = Vec::with_capacity(edges.len());
        let mut pair_slot: HashMap<(usize, usize), usize> = HashMap::new();
        let mut self_loops = 0usize;

        for edge in &edges {
            let lookup = |id: &str| {
                index
                    .get(id)
                    .copied()
                    .ok_or_else(|| TopologyError::UnknownEndpoint {
                        source_id: edge.source.clone(),
                        target_id: edge.target.clone(),
                        missing: id.to_string(),
                    })
            };
            let source = lookup(&edge.source)?;
            let target = lookup(&edge.target)?;

            if !edge.weight.is_finite() || edge.weight < 0.0 {
                return Err(TopologyError::InvalidWeight {
                    source_id: edge.source.clone(),
                    target_id: edge.target.clone(),
                    weight: edge.weight,
                });
            }

            if source == target {
                self_loops += 1;
                continue;
            }

            let rest_length = edge
                .rest_length
                .filter(|length| length.is_finite() && *length >= 0.0);

            let key = (source.min(target), source.max(target));
            match pair_slot.get(&key) {
                Some(&slot) => {
                    let existing = &mut merged[slot];
                    existing.weight += edge.weight;
                    if existing.rest_length.is_none() {
                        existing.rest_length = rest_length;
                    }
                }
                None => {
                    pair_slot.insert(key, merged.len());
                    merged.push(TopologyEdge {
                        source,
                        target,
                        weight: edge.weight,
                        rest_length,
                    });
                }
            }
        }

        if self_loops > 0 {
            debug!(self_loops, "dropped self-loop edges");
        }
        debug!(
            nodes = nodes.len(),
            input_edges = edges.len(),
            edges = merged.len(),
            "topology loaded"
        );

        Ok(Self {
            nodes,
            edges: merged,
            index,
        })
    }

    pub fn nodes(&self) -> &[NodeSpec] {
        &self.nodes
    }

    pub fn edges(&self) -> &[TopologyEdge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.index_of(id).map(|i| &self.nodes[i])
    }

    /// Ids of both endpoints of an edge
    pub fn endpoints(&self, edge: &TopologyEdge) -> (&str, &str) {
        (&self.nodes[edge.source].id, &self.nodes[edge.target].id)
    }

    /// Order-independent description of the edge set, for change detection
    fn edge_signature(&self) -> Vec<(&str, &str, u32, Option<u32>)> {
        let mut signature: Vec<_> = self
            .edges
            .iter()
            .map(|edge| {
                let (a, b) = self.endpoints(edge);
                let (a, b) = if a <= b { (a, b) } else { (b, a) };
                let rest = edge.rest_length.map(f32::to_bits);
                (a, b, edge.weight.to_bits(), rest)
            })
            .collect();
        signature.sort_unstable();
        signature
    }

    /// Compute the reconciliation diff from `previous` to `self`
    pub fn diff_from(&self, previous: Option<&GraphTopology>) -> TopologyDiff {
        let Some(previous) = previous else {
            return TopologyDiff {
                added: self.nodes.iter().map(|n| n.id.clone()).collect(),
                removed: Vec::new(),
                retained: Vec::new(),
                edges_changed: !self.edges.is_empty(),
            };
        };

        let mut added = Vec::new();
        let mut retained = Vec::new();
        for node in &self.nodes {
            if previous.contains(&node.id) {
                retained.push(node.id.clone());
            } else {
                added.push(node.id.clone());
            }
        }
        let removed = previous
            .nodes
            .iter()
            .filter(|node| !self.contains(&node.id))
            .map(|node| node.id.clone())
            .collect();

        TopologyDiff {
            added,
            removed,
            retained,
            edges_changed: self.edge_signature() != previous.edge_signature(),
        }
    }

    /// Lowest-cost path between two nodes, using edge weight as cost
    pub fn shortest_path(&self, start: &str, end: &str) -> Result<Vec<String>, PathError> {
        let start_idx = self
            .index_of(start)
            .ok_or_else(|| PathError::UnknownNode(start.to_string()))?;
        let end_idx = self
            .index_of(end)
            .ok_or_else(|| PathError::UnknownNode(end.to_string()))?;

        let mut neighbors: Vec<Vec<(usize, f32)>> = vec![Vec::new(); self.nodes.len()];
        for edge in &self.edges {
            neighbors[edge.source].push((edge.target, edge.weight));
            neighbors[edge.target].push((edge.source, edge.weight));
        }

        let mut distance = vec![f32::INFINITY; self.nodes.len()];
        let mut previous: Vec<Option<usize>> = vec![None; self.nodes.len()];
        let mut visited = HashSet::new();
        let mut queue = BinaryHeap::new();

        distance[start_idx] = 0.0;
        queue.push(Frontier {
            cost: 0.0,
            node: start_idx,
        });

        while let Some(Frontier { cost, node }) = queue.pop() {
            if node == end_idx {
                break;
            }
            if !visited.insert(node) {
                continue;
            }
            for &(next, weight) in &neighbors[node] {
                let candidate = cost + weight;
                if candidate < distance[next] {
                    distance[next] = candidate;
                    previous[next] = Some(node);
                    queue.push(Frontier {
                        cost: candidate,
                        node: next,
                    });
                }
            }
        }

        if !distance[end_idx].is_finite() {
            return Err(PathError::Unreachable {
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        let mut path = vec![end_idx];
        let mut cursor = end_idx;
        while let Some(prev) = previous[cursor] {
            path.push(prev);
            cursor = prev;
        }
        path.reverse();
        Ok(path.into_iter().map(|i| self.nodes[i].id.clone()).collect())
    }
}

/// Min-heap entry for Dijkstra
#[derive(Debug, Clone, Copy)]
struct Frontier {
    cost: f32,
    node: usize,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap pops the cheapest entry
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Node-set changes between two topologies
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub retained: Vec<String>,
    /// Whether the merged edge set differs
    pub edges_changed: bool,
}

impl TopologyDiff {
    /// True when neither the node set nor the edge set changed
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && !self.edges_changed
    }
}
