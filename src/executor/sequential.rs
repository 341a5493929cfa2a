//! In-process executor over the state arrays

use super::{Executor, ExecutorKind};
use crate::error::ExecutorError;
use crate::forces::{self, SpringEdge};
use crate::integrator;
use crate::math::Vec3;
use crate::params::SimulationParameters;
use crate::state::SimulationState;

/// Direct O(n²) loop; bit-reproducible for a given input
#[derive(Debug, Default)]
pub struct SequentialExecutor {
    forces: Vec<Vec3>,
}

impl SequentialExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Executor for SequentialExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Sequential
    }

    fn backend(&self) -> &str {
        "cpu"
    }

    fn advance(
        &mut self,
        state: &mut SimulationState,
        springs: &[SpringEdge],
        params: &SimulationParameters,
        dt: f32,
    ) -> Result<(), ExecutorError> {
        forces::accumulate(
            &state.positions,
            &state.masses,
            springs,
            params,
            &mut self.forces,
        );
        integrator::step(
            &mut state.positions,
            &mut state.velocities,
            &self.forces,
            dt,
            params,
        );
        Ok(())
    }
}
