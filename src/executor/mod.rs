//! Executor strategies
//!
//! An [`Executor`] advances [`SimulationState`] by one tick: it evaluates the
//! force model and integrates the result. Two strategies exist:
//!
//! - **Sequential**: direct loop over the state arrays in process
//! - **Parallel**: the same math expressed as a per-node kernel over a packed
//!   device buffer, dispatched on a [`ComputeBackend`] (rayon thread pool or
//!   wgpu compute shader)
//!
//! The strategy is chosen once by [`select`]. Failing to acquire a parallel
//! backend is never fatal; the sequential executor is returned together with
//! the [`CapabilityError`] explaining why.

pub mod kernel;
mod parallel;
mod sequential;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CapabilityError, ExecutorError};
use crate::forces::SpringEdge;
use crate::params::SimulationParameters;
use crate::state::SimulationState;

pub use kernel::{
    ComputeBackend, KernelBuffers, KernelNeighbor, KernelNode, KernelSpan, KernelUniforms,
};
pub use parallel::ParallelExecutor;
#[cfg(feature = "parallel")]
pub use parallel::RayonBackend;
pub use sequential::SequentialExecutor;

/// Which strategy is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    Sequential,
    Parallel,
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorKind::Sequential => f.write_str("sequential"),
            ExecutorKind::Parallel => f.write_str("parallel"),
        }
    }
}

/// Strategy requested at controller start-up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorPreference {
    /// Parallel when available, otherwise sequential without complaint
    #[default]
    Auto,
    /// Sequential without attempting parallel acquisition
    Sequential,
    /// Parallel, degrading to sequential with a warning if it cannot be
    /// acquired
    Parallel,
}

/// Advances simulation state by one tick
pub trait Executor: Send {
    fn kind(&self) -> ExecutorKind;

    /// Human-readable backend name for status reporting
    fn backend(&self) -> &str;

    /// Compute forces from the current state and integrate one step of `dt`
    ///
    /// On error the state is left as it was before the call.
    fn advance(
        &mut self,
        state: &mut SimulationState,
        springs: &[SpringEdge],
        params: &SimulationParameters,
        dt: f32,
    ) -> Result<(), ExecutorError>;
}

/// Observable executor condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutorStatus {
    pub kind: ExecutorKind,
    pub backend: String,
    /// Why the executor is not the requested one, if it was degraded
    pub degraded: Option<String>,
}

impl ExecutorStatus {
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// Pick an executor for `preference`
///
/// Returns the chosen executor and, when parallel capability was wanted but
/// could not be acquired, the reason it degraded to sequential.
pub fn select(preference: ExecutorPreference) -> (Box<dyn Executor>, Option<CapabilityError>) {
    select_with(preference, ParallelExecutor::acquire)
}

/// [`select`] with an explicit way of acquiring the parallel executor
///
/// `acquire` is not called for [`ExecutorPreference::Sequential`]. Degrading
/// is logged at `info` for [`ExecutorPreference::Auto`] and at `warn` when
/// parallel was explicitly requested.
pub fn select_with(
    preference: ExecutorPreference,
    acquire: impl FnOnce() -> Result<ParallelExecutor, CapabilityError>,
) -> (Box<dyn Executor>, Option<CapabilityError>) {
    if preference == ExecutorPreference::Sequential {
        info!("using sequential executor");
        return (Box::new(SequentialExecutor::new()), None);
    }

    match acquire() {
        Ok(executor) => {
            info!(backend = executor.backend(), "using parallel executor");
            (Box::new(executor), None)
        }
        Err(reason) => {
            if preference == ExecutorPreference::Parallel {
                warn!(%reason, "requested parallel executor unavailable, using sequential");
            } else {
                info!(%reason, "parallel executor unavailable, using sequential");
            }
            (Box::new(SequentialExecutor::new()), Some(reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_preference_never_degrades() {
        let (executor, degraded) = select(ExecutorPreference::Sequential);
        assert_eq!(executor.kind(), ExecutorKind::Sequential);
        assert!(degraded.is_none());
    }

    #[test]
    fn auto_preference_always_yields_an_executor() {
        let (executor, degraded) = select(ExecutorPreference::Auto);
        match executor.kind() {
            ExecutorKind::Parallel => assert!(degraded.is_none()),
            ExecutorKind::Sequential => assert!(degraded.is_some()),
        }
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_available_with_thread_pool_backend() {
        let (executor, degraded) = select(ExecutorPreference::Parallel);
        assert_eq!(executor.kind(), ExecutorKind::Parallel);
        assert!(degraded.is_none());
    }

    fn no_adapter() -> CapabilityError {
        CapabilityError::ParallelUnavailable("no adapter".to_string())
    }

    fn must_not_run() -> Result<ParallelExecutor, CapabilityError> {
        panic!("parallel executor acquired for a sequential preference")
    }

    #[test]
    fn unavailable_parallel_degrades_to_sequential() {
        for preference in [ExecutorPreference::Auto, ExecutorPreference::Parallel] {
            let (executor, degraded) = select_with(preference, || Err(no_adapter()));
            assert_eq!(executor.kind(), ExecutorKind::Sequential, "{preference:?}");
            assert_eq!(executor.backend(), "cpu");
            assert_eq!(degraded, Some(no_adapter()));
        }
    }

    #[test]
    fn sequential_preference_never_acquires_parallel() {
        let (executor, degraded) = select_with(ExecutorPreference::Sequential, must_not_run);
        assert_eq!(executor.kind(), ExecutorKind::Sequential);
        assert!(degraded.is_none());
    }

    #[test]
    fn kind_display() {
        assert_eq!(ExecutorKind::Parallel.to_string(), "parallel");
        assert_eq!(ExecutorKind::Sequential.to_string(), "sequential");
    }
}
