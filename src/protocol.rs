//! Wire payloads exchanged with the host
//!
//! The engine never opens connections itself. These types are the JSON
//! shapes a host moves between the controller and its renderer or network
//! peers.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::PositionEntry;
use crate::topology::{DEFAULT_EDGE_WEIGHT, DEFAULT_NODE_MASS, EdgeSpec, NodeSpec};

/// A node in a topology load payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadNode {
    pub id: String,
    /// Host-side size metric, mapped to mass by [`TopologyPayload::into_specs`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f32>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

/// An edge in a topology load payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadEdge {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_length: Option<f32>,
}

/// `{ nodes: [...], edges: [...] }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyPayload {
    #[serde(default)]
    pub nodes: Vec<PayloadNode>,
    #[serde(default)]
    pub edges: Vec<PayloadEdge>,
}

impl TopologyPayload {
    /// Convert into load specs, mapping each node's `size` through `size_to_mass`
    ///
    /// Nodes without a size get the default mass.
    pub fn into_specs(self, size_to_mass: impl Fn(f32) -> f32) -> (Vec<NodeSpec>, Vec<EdgeSpec>) {
        let nodes = self
            .nodes
            .into_iter()
            .map(|node| NodeSpec {
                id: node.id,
                mass: node.size.map_or(DEFAULT_NODE_MASS, &size_to_mass),
                metadata: node.metadata,
            })
            .collect();

        let edges = self
            .edges
            .into_iter()
            .map(|edge| EdgeSpec {
                source: edge.source,
                target: edge.target,
                weight: edge.weight.unwrap_or(DEFAULT_EDGE_WEIGHT),
                rest_length: edge.rest_length,
            })
            .collect();

        (nodes, edges)
    }
}

/// A batch of `{ id, x, y, z }` entries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub positions: Vec<PositionEntry>,
    /// Milliseconds since the Unix epoch when the batch was taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl PositionUpdate {
    /// Wrap entries, stamping the current time
    pub fn now(positions: Vec<PositionEntry>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| d.as_millis() as u64);
        Self {
            positions,
            timestamp,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Messages a host relays between the engine and its peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GraphMessage {
    /// Full topology for a newly connected peer
    InitialGraph(TopologyPayload),
    /// Positions that moved since the previous update
    PositionUpdate(PositionUpdate),
    /// Flat or nested parameter overrides
    ParameterUpdate { parameters: Value },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_topology_payload_with_optional_fields() {
        let payload: TopologyPayload = serde_json::from_value(json!({
            "nodes": [
                { "id": "a", "size": 4.0, "metadata": { "label": "Alpha" } },
                { "id": "b" }
            ],
            "edges": [
                { "source": "a", "target": "b", "weight": 2.5, "restLength": 30.0 },
                { "source": "b", "target": "a" }
            ]
        }))
        .unwrap();

        let (nodes, edges) = payload.into_specs(|size| size.sqrt());
        assert_eq!(nodes[0].mass, 2.0);
        assert_eq!(nodes[0].metadata["label"], "Alpha");
        assert_eq!(nodes[1].mass, DEFAULT_NODE_MASS);
        assert_eq!(edges[0].weight, 2.5);
        assert_eq!(edges[0].rest_length, Some(30.0));
        assert_eq!(edges[1].weight, DEFAULT_EDGE_WEIGHT);
        assert_eq!(edges[1].rest_length, None);
    }

    #[test]
    fn empty_payload_is_valid() {
        let payload: TopologyPayload = serde_json::from_str("{}").unwrap();
        assert!(payload.nodes.is_empty());
        assert!(payload.edges.is_empty());
    }

    #[test]
    fn position_update_serializes_flat_entries() {
        let update = PositionUpdate {
            positions: vec![PositionEntry {
                id: "a".to_string(),
                x: 1.0,
                y: -2.0,
                z: 0.5,
            }],
            timestamp: Some(42),
        };
        insta::assert_snapshot!(
            serde_json::to_string(&update).unwrap(),
            @r#"{"positions":[{"id":"a","x":1.0,"y":-2.0,"z":0.5}],"timestamp":42}"#
        );
    }

    #[test]
    fn now_stamps_the_batch() {
        let update = PositionUpdate::now(Vec::new());
        assert!(update.timestamp.is_some_and(|t| t > 0));
        assert!(update.is_empty());
    }

    #[test]
    fn messages_are_tagged_by_type() {
        let message: GraphMessage = serde_json::from_value(json!({
            "type": "parameterUpdate",
            "parameters": { "physics": { "damping": 0.5 } }
        }))
        .unwrap();
        match message {
            GraphMessage::ParameterUpdate { parameters } => {
                assert_eq!(parameters["physics"]["damping"], 0.5);
            }
            other => panic!("unexpected message {other:?}"),
        }

        let update = GraphMessage::PositionUpdate(PositionUpdate::default());
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["type"], "positionUpdate");
        assert_eq!(value["positions"], json!([]));
    }

    #[test]
    fn initial_graph_round_trips_through_json() {
        let message = GraphMessage::InitialGraph(TopologyPayload {
            nodes: vec![PayloadNode {
                id: "a".to_string(),
                size: None,
                metadata: Value::Null,
            }],
            edges: vec![],
        });
        let text = serde_json::to_string(&message).unwrap();
        let expected = r#"{"type":"initialGraph","nodes":[{"id":"a"}],"edges":[]}"#;
        assert_eq!(text, expected);
        let back: GraphMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(back, message);
    }
}
