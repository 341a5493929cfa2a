//! Simulation controller
//!
//! [`SimulationController`] owns the topology, the simulation state, the
//! parameters, and the active executor. All mutation goes through it; readers
//! only ever receive snapshots.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{CapabilityError, ParameterWarning, PathError, TopologyError};
use crate::executor::{
    self, Executor, ExecutorPreference, ExecutorStatus, ParallelExecutor, SequentialExecutor,
};
use crate::forces::SpringEdge;
use crate::integrator;
use crate::math::Vec3;
use crate::params::SimulationParameters;
use crate::protocol::PositionUpdate;
use crate::state::{PositionEntry, SimulationState};
use crate::topology::{EdgeSpec, GraphTopology, NodeSpec, TopologyDiff};

/// One authoritative layout simulation for a graph view
pub struct SimulationController {
    topology: Option<GraphTopology>,
    state: SimulationState,
    springs: Vec<SpringEdge>,
    params: SimulationParameters,
    executor: Box<dyn Executor>,
    status: ExecutorStatus,
    rng: ChaCha8Rng,
    ticks: u64,
    running: bool,
}

impl SimulationController {
    /// Create a running controller with no topology
    ///
    /// Parallel capability is acquired once here. Failing to acquire it
    /// degrades to the sequential executor and is reported by
    /// [`SimulationController::status`].
    pub fn new(params: SimulationParameters, preference: ExecutorPreference) -> Self {
        Self::with_capability(params, preference, ParallelExecutor::acquire)
    }

    /// Create a controller whose parallel executor comes from `acquire`
    pub fn with_capability(
        params: SimulationParameters,
        preference: ExecutorPreference,
        acquire: impl FnOnce() -> Result<ParallelExecutor, CapabilityError>,
    ) -> Self {
        let (executor, degraded) = executor::select_with(preference, acquire);
        Self::with_executor(params, executor, degraded.map(|reason| reason.to_string()))
    }

    /// Create a controller around an explicit executor
    pub fn with_executor(
        params: SimulationParameters,
        executor: Box<dyn Executor>,
        degraded: Option<String>,
    ) -> Self {
        let params = params.sanitized();
        let rng = match params.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let status = ExecutorStatus {
            kind: executor.kind(),
            backend: executor.backend().to_string(),
            degraded,
        };

        Self {
            topology: None,
            state: SimulationState::new(),
            springs: Vec::new(),
            params,
            executor,
            status,
            rng,
            ticks: 0,
            running: true,
        }
    }

    /// Replace the topology and reconcile simulation state against it
    ///
    /// The load is atomic: on error nothing changes. When the node or edge
    /// set differs from the previous topology, `iterations_per_settle` steps
    /// run before returning.
    pub fn load_topology(
        &mut self,
        nodes: Vec<NodeSpec>,
        edges: Vec<EdgeSpec>,
    ) -> Result<TopologyDiff, TopologyError> {
        let topology = match GraphTopology::load(nodes, edges) {
            Ok(topology) => topology,
            Err(err) => {
                warn!(%err, "rejected topology load");
                return Err(err);
            }
        };
        let diff = topology.diff_from(self.topology.as_ref());

        self.state
            .reconcile(&diff, &topology, self.params.target_radius, &mut self.rng);
        self.springs = self.state.springs(&topology);
        self.topology = Some(topology);

        info!(
            nodes = self.state.len(),
            springs = self.springs.len(),
            added = diff.added.len(),
            removed = diff.removed.len(),
            "loaded topology"
        );

        if !diff.is_unchanged() {
            self.settle();
        }
        Ok(diff)
    }

    /// Run `iterations_per_settle` steps of `time_step`
    fn settle(&mut self) {
        let iterations = self.params.iterations_per_settle;
        if iterations == 0 || self.state.is_empty() {
            return;
        }
        let dt = self.params.time_step;
        for _ in 0..iterations {
            self.advance(dt);
        }
        debug!(iterations, "settled layout");
    }

    /// Advance one step of `dt`
    ///
    /// No-op while stopped or when there are no nodes.
    pub fn tick(&mut self, dt: f32) {
        if !self.running || self.state.is_empty() {
            return;
        }
        self.advance(dt);
    }

    /// Advance one step of the configured `time_step`
    pub fn step(&mut self) {
        self.tick(self.params.time_step);
    }

    fn advance(&mut self, dt: f32) {
        let result = self
            .executor
            .advance(&mut self.state, &self.springs, &self.params, dt);

        if let Err(err) = result {
            warn!(
                %err,
                backend = self.executor.backend(),
                "executor failed, degraded to sequential"
            );
            self.executor = Box::new(SequentialExecutor::new());
            self.status = ExecutorStatus {
                kind: self.executor.kind(),
                backend: self.executor.backend().to_string(),
                degraded: Some(err.to_string()),
            };
            // Sequential advance cannot fail
            let _ = self
                .executor
                .advance(&mut self.state, &self.springs, &self.params, dt);
        }

        self.ticks += 1;
        let interval = u64::from(self.params.rescale_interval);
        if interval > 0 && self.ticks % interval == 0 {
            integrator::recenter(&mut self.state.positions, &self.params);
        }
    }

    /// Merge recognized parameter fields; unrecognized ones are reported
    pub fn set_parameters(&mut self, update: &Value) -> Vec<ParameterWarning> {
        let reseed = self.params.seed;
        let warnings = self.params.merge(update);
        if self.params.seed != reseed {
            if let Some(seed) = self.params.seed {
                self.rng = ChaCha8Rng::seed_from_u64(seed);
            }
        }
        debug!(warnings = warnings.len(), "updated parameters");
        warnings
    }

    pub fn parameters(&self) -> &SimulationParameters {
        &self.params
    }

    /// Snapshot of every node's position
    pub fn positions(&self) -> Vec<PositionEntry> {
        self.state
            .positions_snapshot()
            .into_iter()
            .map(PositionEntry::from)
            .collect()
    }

    /// Nodes that moved more than `position_epsilon` since the previous call
    pub fn changed_positions(&mut self) -> PositionUpdate {
        PositionUpdate::now(self.state.take_changed(self.params.position_epsilon))
    }

    /// Override a node's position and zero its velocity
    ///
    /// Takes effect on the next tick. Returns `false` (and logs) when the id
    /// is not in the current topology.
    pub fn apply_external_position_update(&mut self, id: &str, position: Vec3) -> bool {
        let applied = self.state.set_position(id, position);
        if !applied {
            warn!(id, "position update for unknown node ignored");
        }
        applied
    }

    /// Apply a batch of `{ id, x, y, z }` overrides, returning how many matched
    pub fn apply_position_update(&mut self, update: &PositionUpdate) -> usize {
        let mut matched = 0;
        for entry in &update.positions {
            if self.apply_external_position_update(&entry.id, entry.position()) {
                matched += 1;
            }
        }
        matched
    }

    /// Current endpoints of every spring, for drawing edges
    pub fn edge_segments(&self) -> Vec<(Vec3, Vec3)> {
        let positions = self.state.positions();
        self.springs
            .iter()
            .map(|spring| (positions[spring.a], positions[spring.b]))
            .collect()
    }

    /// Lowest-weight path between two nodes of the current topology
    pub fn shortest_path(&self, start: &str, end: &str) -> Result<Vec<String>, PathError> {
        match &self.topology {
            Some(topology) => topology.shortest_path(start, end),
            None => Err(PathError::UnknownNode(start.to_string())),
        }
    }

    pub fn status(&self) -> &ExecutorStatus {
        &self.status
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    /// Stop advancing; `tick` becomes a no-op until [`SimulationController::start`]
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn topology(&self) -> Option<&GraphTopology> {
        self.topology.as_ref()
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Ticks advanced so far, settle iterations included
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl Default for SimulationController {
    fn default() -> Self {
        Self::new(SimulationParameters::default(), ExecutorPreference::Auto)
    }
}
