//! forcegraph - a 3D force-directed layout engine for interactive graph views.
//!
//! Nodes repel each other, edges pull their endpoints toward a rest length,
//! and a weak centering force keeps the layout bounded. The
//! [`SimulationController`] owns the simulation and advances it one tick at a
//! time on a sequential or data-parallel [`Executor`](executor::Executor).

pub mod controller;
pub mod error;
pub mod executor;
pub mod forces;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod integrator;
pub mod math;
pub mod params;
pub mod protocol;
pub mod state;
pub mod topology;

pub use controller::SimulationController;
pub use error::{CapabilityError, ExecutorError, ParameterWarning, PathError, TopologyError};
pub use executor::{ExecutorKind, ExecutorPreference, ExecutorStatus};
pub use params::SimulationParameters;
pub use protocol::{GraphMessage, PositionUpdate, TopologyPayload};
pub use state::{NodePosition, PositionEntry, SimulationState};
pub use topology::{EdgeSpec, GraphTopology, NodeSpec, TopologyDiff};
