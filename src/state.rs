//! Simulation state: per-node position, velocity and mass buffers
//!
//! Buffers are parallel arrays indexed by a dense slot number. Slot order is
//! an implementation detail (removal swaps the last slot in); node ids are
//! the stable keys.

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::forces::SpringEdge;
use crate::math::{self, Vec3};
use crate::topology::{GraphTopology, TopologyDiff};

/// Position of one node, as broadcast to renderers and peers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodePosition<'a> {
    pub id: &'a str,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Owned form of [`NodePosition`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEntry {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl PositionEntry {
    pub fn position(&self) -> Vec3 {
        [self.x, self.y, self.z]
    }
}

impl From<NodePosition<'_>> for PositionEntry {
    fn from(p: NodePosition<'_>) -> Self {
        Self {
            id: p.id.to_string(),
            x: p.x,
            y: p.y,
            z: p.z,
        }
    }
}

/// Mutable motion state of every node in the current topology
#[derive(Debug, Clone, Default)]
pub struct SimulationState {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    pub(crate) positions: Vec<Vec3>,
    pub(crate) velocities: Vec<Vec3>,
    pub(crate) masses: Vec<f32>,
    /// Last position reported by [`SimulationState::take_changed`]
    broadcast: Vec<Option<Vec3>>,
}

/// Uniform random point inside a sphere of `radius`
///
/// Cube-root radial sampling gives uniform volumetric density.
pub fn sample_in_sphere<R: Rng + ?Sized>(rng: &mut R, radius: f32) -> Vec3 {
    let theta = rng.gen_range(0.0..std::f32::consts::TAU);
    let phi = (2.0 * rng.gen_range(0.0f32..1.0) - 1.0).acos();
    let r = radius * rng.gen_range(0.0f32..1.0).cbrt();

    [
        r * phi.sin() * theta.cos(),
        r * phi.sin() * theta.sin(),
        r * phi.cos(),
    ]
}

impl SimulationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build state directly from `(id, position, mass)` triples with zero velocity
    ///
    /// Later duplicates of an id are ignored.
    pub fn from_nodes(nodes: impl IntoIterator<Item = (String, Vec3, f32)>) -> Self {
        let mut state = Self::new();
        for (id, position, mass) in nodes {
            if state.index.contains_key(&id) {
                continue;
            }
            state.index.insert(id.clone(), state.ids.len());
            state.ids.push(id);
            state.positions.push(position);
            state.velocities.push(math::ZERO);
            state.masses.push(mass);
            state.broadcast.push(None);
        }
        state
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn velocities(&self) -> &[Vec3] {
        &self.velocities
    }

    pub fn masses(&self) -> &[f32] {
        &self.masses
    }

    pub fn slot(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn position(&self, id: &str) -> Option<Vec3> {
        self.slot(id).map(|i| self.positions[i])
    }

    pub fn velocity(&self, id: &str) -> Option<Vec3> {
        self.slot(id).map(|i| self.velocities[i])
    }

    /// Bring the buffers in line with `topology`
    ///
    /// Removed ids are dropped, added ids get a random position inside
    /// `radius` and zero velocity, retained ids keep their motion state.
    /// Masses are refreshed from the topology for every node.
    pub fn reconcile<R: Rng + ?Sized>(
        &mut self,
        diff: &TopologyDiff,
        topology: &GraphTopology,
        radius: f32,
        rng: &mut R,
    ) {
        for id in &diff.removed {
            self.remove(id);
        }

        for id in &diff.added {
            if self.index.contains_key(id) {
                continue;
            }
            self.index.insert(id.clone(), self.ids.len());
            self.ids.push(id.clone());
            self.positions.push(sample_in_sphere(rng, radius));
            self.velocities.push(math::ZERO);
            self.masses.push(1.0);
            self.broadcast.push(None);
        }

        for (slot, id) in self.ids.iter().enumerate() {
            if let Some(node) = topology.node(id) {
                self.masses[slot] = node.mass;
            }
        }
    }

    fn remove(&mut self, id: &str) {
        let Some(slot) = self.index.remove(id) else {
            return;
        };
        self.ids.swap_remove(slot);
        self.positions.swap_remove(slot);
        self.velocities.swap_remove(slot);
        self.masses.swap_remove(slot);
        self.broadcast.swap_remove(slot);
        if let Some(moved) = self.ids.get(slot) {
            self.index.insert(moved.clone(), slot);
        }
    }

    /// Map topology edges onto state slots
    pub fn springs(&self, topology: &GraphTopology) -> Vec<SpringEdge> {
        topology
            .edges()
            .iter()
            .filter_map(|edge| {
                let (source, target) = topology.endpoints(edge);
                Some(SpringEdge {
                    a: self.slot(source)?,
                    b: self.slot(target)?,
                    weight: edge.weight,
                    rest_length: edge.rest_length,
                })
            })
            .collect()
    }

    /// Overwrite a node's position and zero its velocity
    ///
    /// Returns `false` when the id is unknown.
    pub fn set_position(&mut self, id: &str, position: Vec3) -> bool {
        match self.slot(id) {
            Some(slot) => {
                self.positions[slot] = position;
                self.velocities[slot] = math::ZERO;
                true
            }
            None => false,
        }
    }

    /// Current positions of every node; does not mutate state
    pub fn positions_snapshot(&self) -> Vec<NodePosition<'_>> {
        self.ids
            .iter()
            .zip(&self.positions)
            .map(|(id, p)| NodePosition {
                id,
                x: p[0],
                y: p[1],
                z: p[2],
            })
            .collect()
    }

    /// Nodes that moved more than `epsilon` on any axis since they were last
    /// reported, marking them as reported
    pub fn take_changed(&mut self, epsilon: f32) -> Vec<PositionEntry> {
        let mut changed = Vec::new();
        let current = self.ids.iter().zip(&self.positions);
        for ((id, &p), last) in current.zip(&mut self.broadcast) {
            let moved = match last {
                Some(prev) => (0..3).any(|axis| (p[axis] - prev[axis]).abs() > epsilon),
                None => true,
            };
            if moved {
                *last = Some(p);
                changed.push(PositionEntry {
                    id: id.clone(),
                    x: p[0],
                    y: p[1],
                    z: p[2],
                });
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{EdgeSpec, NodeSpec};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn topology(ids: &[&str]) -> GraphTopology {
        GraphTopology::load(ids.iter().map(|id| NodeSpec::new(*id)).collect(), vec![]).unwrap()
    }

    fn loaded(ids: &[&str]) -> (SimulationState, GraphTopology) {
        let topology = topology(ids);
        let mut state = SimulationState::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        state.reconcile(&topology.diff_from(None), &topology, 100.0, &mut rng);
        (state, topology)
    }

    #[test]
    fn sampled_points_stay_inside_sphere() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        for _ in 0..1000 {
            let p = sample_in_sphere(&mut rng, 50.0);
            assert!(math::length(p) <= 50.0 + 1e-3);
        }
    }

    #[test]
    fn sampling_is_not_center_biased() {
        // Uniform volume density puts 7/8 of points beyond half the radius
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let outer = (0..4000)
            .filter(|_| math::length(sample_in_sphere(&mut rng, 1.0)) > 0.5)
            .count();
        assert!(outer > 3300, "only {outer} of 4000 in the outer shell");
    }

    #[test]
    fn reconcile_adds_nodes_with_zero_velocity() {
        let (state, _) = loaded(&["a", "b", "c"]);
        assert_eq!(state.len(), 3);
        for v in state.velocities() {
            assert_eq!(*v, math::ZERO);
        }
    }

    #[test]
    fn reconcile_preserves_retained_nodes() {
        let (mut state, old) = loaded(&["a", "b", "c"]);
        state.set_position("b", [1.0, 2.0, 3.0]);
        let b_before = state.position("b").unwrap();

        let new = topology(&["b", "c", "d"]);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        state.reconcile(&new.diff_from(Some(&old)), &new, 100.0, &mut rng);

        assert_eq!(state.len(), 3);
        assert!(state.slot("a").is_none());
        assert!(state.slot("d").is_some());
        assert_eq!(state.position("b"), Some(b_before));

        let mut ids: Vec<_> = state.ids().to_vec();
        ids.sort();
        assert_eq!(ids, vec!["b", "c", "d"]);
    }

    #[test]
    fn removal_keeps_index_consistent() {
        let (mut state, old) = loaded(&["a", "b", "c", "d"]);
        let d_before = state.position("d").unwrap();

        let new = topology(&["b", "c", "d"]);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        state.reconcile(&new.diff_from(Some(&old)), &new, 100.0, &mut rng);

        for (slot, id) in state.ids().iter().enumerate() {
            assert_eq!(state.slot(id), Some(slot));
        }
        assert_eq!(state.position("d"), Some(d_before));
    }

    #[test]
    fn springs_map_to_state_slots() {
        let topology = GraphTopology::load(
            vec![NodeSpec::new("x"), NodeSpec::new("y")],
            vec![EdgeSpec::new("y", "x").with_weight(2.0)],
        )
        .unwrap();
        let mut state = SimulationState::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        state.reconcile(&topology.diff_from(None), &topology, 10.0, &mut rng);

        let springs = state.springs(&topology);
        assert_eq!(springs.len(), 1);
        assert_eq!(springs[0].a, state.slot("y").unwrap());
        assert_eq!(springs[0].b, state.slot("x").unwrap());
        assert_eq!(springs[0].weight, 2.0);
    }

    #[test]
    fn snapshot_does_not_mutate() {
        let (state, _) = loaded(&["a", "b"]);
        let first: Vec<PositionEntry> = state
            .positions_snapshot()
            .into_iter()
            .map(Into::into)
            .collect();
        let second: Vec<PositionEntry> = state
            .positions_snapshot()
            .into_iter()
            .map(Into::into)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn take_changed_reports_only_movement() {
        let (mut state, _) = loaded(&["a", "b"]);
        assert_eq!(state.take_changed(0.001).len(), 2);
        assert!(state.take_changed(0.001).is_empty());

        let a = state.position("a").unwrap();
        state.set_position("a", [a[0] + 0.0001, a[1], a[2]]);
        assert!(state.take_changed(0.001).is_empty());

        state.set_position("a", [a[0] + 1.0, a[1], a[2]]);
        let changed = state.take_changed(0.001);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].id, "a");
    }

    #[test]
    fn set_position_rejects_unknown_id() {
        let (mut state, _) = loaded(&["a"]);
        assert!(!state.set_position("nope", math::ZERO));
    }
}
