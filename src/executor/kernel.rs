//! Data-parallel layout kernel
//!
//! Node state is packed into a flat buffer of [`KernelNode`]; springs become
//! a CSR adjacency (`spans` + `neighbors`) holding both directions of every
//! edge. One kernel invocation per node scans all other nodes for repulsion,
//! walks its own adjacency for springs, applies centering, and integrates
//! itself. Invocations only read the input buffer and only write their own
//! output slot, so they can run in any order or all at once.
//!
//! These types are `repr(C)` so the same buffers upload directly to the GPU.

use crate::error::ExecutorError;
use crate::forces::{self, SpringEdge};
use crate::integrator;
use crate::math::{self, Vec3};
use crate::params::SimulationParameters;
use crate::state::SimulationState;

/// Workgroup size shared by every compute backend
pub const WORKGROUP_SIZE: u32 = 256;

/// One node in the kernel buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "gpu", derive(bytemuck::Pod, bytemuck::Zeroable))]
pub struct KernelNode {
    pub position: [f32; 3],
    pub mass: f32,
    pub velocity: [f32; 3],
    /// Padding for 16-byte alignment
    pub _padding: f32,
}

/// Range of a node's neighbors inside the neighbor buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "gpu", derive(bytemuck::Pod, bytemuck::Zeroable))]
pub struct KernelSpan {
    pub offset: u32,
    pub count: u32,
}

/// One directed half of a spring
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "gpu", derive(bytemuck::Pod, bytemuck::Zeroable))]
pub struct KernelNeighbor {
    pub index: u32,
    pub weight: f32,
    /// Rest length with the global default already resolved
    pub rest_length: f32,
    pub _padding: f32,
}

/// Parameters passed to the kernel as uniforms
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "gpu", derive(bytemuck::Pod, bytemuck::Zeroable))]
pub struct KernelUniforms {
    pub node_count: u32,
    pub dt: f32,
    pub repulsion_strength: f32,
    pub spring_strength: f32,
    pub damping: f32,
    pub max_velocity: f32,
    pub max_force: f32,
    pub centering_force: f32,
    pub target_radius: f32,
    pub min_distance: f32,
    pub repulsion_epsilon: f32,
    pub _padding: f32,
}

impl KernelUniforms {
    pub fn new(node_count: usize, params: &SimulationParameters, dt: f32) -> Self {
        Self {
            node_count: node_count as u32,
            dt,
            repulsion_strength: params.repulsion_strength,
            spring_strength: params.spring_strength,
            damping: params.damping,
            max_velocity: params.max_velocity,
            max_force: params.max_force,
            centering_force: params.centering_force,
            target_radius: params.target_radius,
            min_distance: params.min_distance,
            repulsion_epsilon: params.repulsion_epsilon,
            _padding: 0.0,
        }
    }
}

/// Host-side copy of every buffer a kernel dispatch reads or writes
#[derive(Debug, Clone, Default)]
pub struct KernelBuffers {
    pub nodes: Vec<KernelNode>,
    pub spans: Vec<KernelSpan>,
    pub neighbors: Vec<KernelNeighbor>,
    pub uniforms: KernelUniforms,
}

impl KernelBuffers {
    /// Pack state and springs into kernel layout
    pub fn pack(
        &mut self,
        state: &SimulationState,
        springs: &[SpringEdge],
        params: &SimulationParameters,
        dt: f32,
    ) {
        let n = state.len();

        self.nodes.clear();
        self.nodes.extend(
            state
                .positions
                .iter()
                .zip(&state.velocities)
                .zip(&state.masses)
                .map(|((&position, &velocity), &mass)| KernelNode {
                    position,
                    mass,
                    velocity,
                    _padding: 0.0,
                }),
        );

        self.spans.clear();
        self.spans.resize(n, KernelSpan::default());
        for edge in springs {
            self.spans[edge.a].count += 1;
            self.spans[edge.b].count += 1;
        }
        let mut offset = 0u32;
        for span in &mut self.spans {
            span.offset = offset;
            offset += span.count;
            span.count = 0;
        }

        self.neighbors.clear();
        let total = offset as usize;
        self.neighbors.resize(total, KernelNeighbor::default());
        for edge in springs {
            let rest_length = edge.rest_length(params);
            for (from, to) in [(edge.a, edge.b), (edge.b, edge.a)] {
                let span = &mut self.spans[from];
                self.neighbors[(span.offset + span.count) as usize] = KernelNeighbor {
                    index: to as u32,
                    weight: edge.weight,
                    rest_length,
                    _padding: 0.0,
                };
                span.count += 1;
            }
        }

        self.uniforms = KernelUniforms::new(n, params, dt);
    }

    /// Copy kernel output back into simulation state
    pub fn unpack(&self, state: &mut SimulationState) {
        for ((node, position), velocity) in self
            .nodes
            .iter()
            .zip(state.positions.iter_mut())
            .zip(state.velocities.iter_mut())
        {
            *position = node.position;
            *velocity = node.velocity;
        }
    }

    fn neighbors_of(&self, index: usize) -> &[KernelNeighbor] {
        let span = self.spans[index];
        let start = span.offset as usize;
        &self.neighbors[start..start + span.count as usize]
    }
}

/// The kernel: new state of node `index` given the full input buffer
pub fn node_update(
    index: usize,
    buffers: &KernelBuffers,
    params: &SimulationParameters,
    dt: f32,
) -> KernelNode {
    let nodes = &buffers.nodes;
    let node = nodes[index];
    let mut force: Vec3 = math::ZERO;

    for (j, other) in nodes.iter().enumerate() {
        if j == index {
            continue;
        }
        let f = forces::repulsion(
            (index, node.position, node.mass),
            (j, other.position, other.mass),
            params,
        );
        math::add_assign(&mut force, f);
    }

    for neighbor in buffers.neighbors_of(index) {
        let j = neighbor.index as usize;
        let f = forces::spring(
            (index, node.position),
            (j, nodes[j].position),
            neighbor.weight,
            neighbor.rest_length,
            params,
        );
        math::add_assign(&mut force, f);
    }

    math::add_assign(&mut force, forces::centering(node.position, params));

    let (position, velocity) =
        integrator::integrate_node(node.position, node.velocity, force, dt, params);
    KernelNode {
        position,
        velocity,
        ..node
    }
}

/// A device that can run the kernel over a packed buffer
///
/// `dispatch` must behave as if [`node_update`] ran for every node against
/// the pre-dispatch buffer, replacing `buffers.nodes` with the results. It
/// blocks until results are available.
pub trait ComputeBackend: Send {
    fn name(&self) -> &'static str;

    fn dispatch(
        &mut self,
        buffers: &mut KernelBuffers,
        params: &SimulationParameters,
        dt: f32,
    ) -> Result<(), ExecutorError>;
}
