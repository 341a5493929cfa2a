//! Parallel executor: kernel dispatch on a compute backend

use tracing::debug;

use super::kernel::{ComputeBackend, KernelBuffers};
use super::{Executor, ExecutorKind};
use crate::error::{CapabilityError, ExecutorError};
use crate::forces::SpringEdge;
use crate::params::SimulationParameters;
use crate::state::SimulationState;

/// Packs state into kernel buffers, dispatches, and reads results back
pub struct ParallelExecutor {
    backend: Box<dyn ComputeBackend>,
    buffers: KernelBuffers,
}

impl ParallelExecutor {
    pub fn with_backend(backend: Box<dyn ComputeBackend>) -> Self {
        Self {
            backend,
            buffers: KernelBuffers::default(),
        }
    }

    /// Acquire the best available backend
    ///
    /// Tries the GPU first (feature `gpu`), then the thread pool (feature
    /// `parallel`). The error carries the reason every compiled-in backend
    /// failed.
    pub fn acquire() -> Result<Self, CapabilityError> {
        #[allow(unused_mut)]
        let mut failures: Vec<String> = Vec::new();

        #[cfg(feature = "gpu")]
        {
            match crate::gpu::GpuBackend::new() {
                Ok(backend) => return Ok(Self::with_backend(Box::new(backend))),
                Err(err) => {
                    debug!(%err, "gpu backend unavailable");
                    failures.push(format!("gpu: {}", err.reason()));
                }
            }
        }

        #[cfg(feature = "parallel")]
        {
            match RayonBackend::new() {
                Ok(backend) => return Ok(Self::with_backend(Box::new(backend))),
                Err(err) => failures.push(format!("thread pool: {}", err.reason())),
            }
        }

        debug!(?failures, "no parallel backend available");
        if failures.is_empty() {
            Err(CapabilityError::Disabled)
        } else {
            Err(CapabilityError::ParallelUnavailable(failures.join("; ")))
        }
    }
}

impl Executor for ParallelExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Parallel
    }

    fn backend(&self) -> &str {
        self.backend.name()
    }

    fn advance(
        &mut self,
        state: &mut SimulationState,
        springs: &[SpringEdge],
        params: &SimulationParameters,
        dt: f32,
    ) -> Result<(), ExecutorError> {
        if state.is_empty() {
            return Ok(());
        }
        self.buffers.pack(state, springs, params, dt);
        self.backend.dispatch(&mut self.buffers, params, dt)?;
        if self.buffers.nodes.len() != state.len() {
            return Err(ExecutorError::Readback(format!(
                "expected {} nodes, got {}",
                state.len(),
                self.buffers.nodes.len()
            )));
        }
        self.buffers.unpack(state);
        Ok(())
    }
}

/// Kernel backend running one invocation per node on a rayon thread pool
#[cfg(feature = "parallel")]
pub struct RayonBackend {
    pool: rayon::ThreadPool,
}

#[cfg(feature = "parallel")]
impl RayonBackend {
    pub fn new() -> Result<Self, CapabilityError> {
        Self::with_threads(0)
    }

    /// Use `threads` workers (0 = one per logical core)
    pub fn with_threads(threads: usize) -> Result<Self, CapabilityError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("forcegraph-kernel-{i}"))
            .build()
            .map_err(|e| CapabilityError::ParallelUnavailable(e.to_string()))?;
        let threads = pool.current_num_threads();
        debug!(threads, "kernel thread pool ready");
        Ok(Self { pool })
    }
}

#[cfg(feature = "parallel")]
impl ComputeBackend for RayonBackend {
    fn name(&self) -> &'static str {
        "rayon"
    }

    fn dispatch(
        &mut self,
        buffers: &mut KernelBuffers,
        params: &SimulationParameters,
        dt: f32,
    ) -> Result<(), ExecutorError> {
        use rayon::prelude::*;

        let input: &KernelBuffers = buffers;
        let next = self.pool.install(|| {
            (0..input.nodes.len())
                .into_par_iter()
                .map(|i| super::kernel::node_update(i, input, params, dt))
                .collect::<Vec<_>>()
        });
        buffers.nodes = next;
        Ok(())
    }
}

#[cfg(all(test, feature = "parallel"))]
mod tests {
    use super::*;
    use crate::executor::SequentialExecutor;
    use crate::math;

    fn state() -> SimulationState {
        SimulationState::from_nodes((0..12).map(|i| {
            let t = i as f32;
            let position = [t.cos() * 30.0, t.sin() * 30.0, t * 2.0 - 12.0];
            (format!("n{i}"), position, 1.0)
        }))
    }

    fn springs() -> Vec<SpringEdge> {
        (0..11)
            .map(|i| SpringEdge {
                a: i,
                b: i + 1,
                weight: 1.0,
                rest_length: Some(15.0),
            })
            .collect()
    }

    #[cfg(not(feature = "gpu"))]
    #[test]
    fn acquire_falls_through_to_thread_pool() {
        let executor = ParallelExecutor::acquire().unwrap();
        assert_eq!(executor.backend(), "rayon");
    }

    #[test]
    fn parallel_tracks_sequential() {
        let params = SimulationParameters::default();
        let springs = springs();
        let mut x = state();
        let mut y = state();
        let mut sequential = SequentialExecutor::new();
        let mut parallel =
            ParallelExecutor::with_backend(Box::new(RayonBackend::with_threads(4).unwrap()));

        for _ in 0..50 {
            sequential.advance(&mut x, &springs, &params, 0.5).unwrap();
            parallel.advance(&mut y, &springs, &params, 0.5).unwrap();
        }

        for (a, b) in x.positions().iter().zip(y.positions()) {
            assert!(math::length(math::sub(*a, *b)) < 1e-2, "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn parallel_is_deterministic_across_thread_counts() {
        let params = SimulationParameters::default();
        let mut one = state();
        let mut many = state();
        let mut single =
            ParallelExecutor::with_backend(Box::new(RayonBackend::with_threads(1).unwrap()));
        let mut multi =
            ParallelExecutor::with_backend(Box::new(RayonBackend::with_threads(8).unwrap()));

        for _ in 0..20 {
            single.advance(&mut one, &springs(), &params, 0.5).unwrap();
            multi.advance(&mut many, &springs(), &params, 0.5).unwrap();
        }
        assert_eq!(one.positions(), many.positions());
    }

    #[test]
    fn empty_state_is_a_no_op() {
        let params = SimulationParameters::default();
        let mut empty = SimulationState::new();
        let mut parallel = ParallelExecutor::with_backend(Box::new(RayonBackend::new().unwrap()));
        parallel.advance(&mut empty, &[], &params, 0.5).unwrap();
        assert!(empty.is_empty());
    }
}
