//! Error and warning types for the layout engine
//!
//! Structural problems (bad topology) are hard errors returned to the caller.
//! Capability problems and parameter problems are conditions: they are logged
//! and reported, but never abort a load or a tick.

use thiserror::Error;

/// Errors raised while ingesting a topology
///
/// A load that fails with any of these leaves the previously installed
/// topology and simulation state untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopologyError {
    /// An edge names a node id that is not part of the node set
    #[error("edge {source_id} -> {target_id} references unknown node '{missing}'")]
    UnknownEndpoint {
        source_id: String,
        target_id: String,
        missing: String,
    },

    /// Two input nodes share the same id
    #[error("duplicate node id '{0}'")]
    DuplicateNode(String),

    /// An edge weight is negative or not finite
    #[error("edge {source_id} -> {target_id} has invalid weight {weight}")]
    InvalidWeight {
        source_id: String,
        target_id: String,
        weight: f32,
    },
}

/// Result type for topology ingestion
pub type TopologyResult<T> = Result<T, TopologyError>;

/// Errors raised by path queries over a loaded topology
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("unknown node '{0}'")]
    UnknownNode(String),

    #[error("no path from '{start}' to '{end}'")]
    Unreachable { start: String, end: String },
}

/// Reasons the data-parallel executor could not be acquired
///
/// Never surfaced as a failure: the controller falls back to the sequential
/// executor and exposes this through its status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// No parallel backend could be initialised
    #[error("parallel compute unavailable: {0}")]
    ParallelUnavailable(String),

    /// The crate was built without any parallel backend
    #[error("no parallel backend compiled in")]
    Disabled,
}

impl CapabilityError {
    /// The failure detail without the variant's message prefix
    pub fn reason(&self) -> String {
        match self {
            CapabilityError::ParallelUnavailable(reason) => reason.clone(),
            CapabilityError::Disabled => self.to_string(),
        }
    }
}

/// Hard failure inside an executor while advancing a tick
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("compute dispatch failed: {0}")]
    Dispatch(String),

    #[error("failed to read back node buffer: {0}")]
    Readback(String),
}

/// Non-fatal problems found while merging a parameter update
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterWarning {
    #[error("unrecognized parameter '{0}' ignored")]
    UnrecognizedField(String),

    #[error("parameter '{key}' has non-numeric value {value}")]
    InvalidValue { key: String, value: String },

    #[error("parameter '{key}' clamped from {from} to {to}")]
    Clamped { key: String, from: f32, to: f32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_endpoint_message_names_missing_node() {
        let err = TopologyError::UnknownEndpoint {
            source_id: "a".to_string(),
            target_id: "ghost".to_string(),
            missing: "ghost".to_string(),
        };
        insta::assert_snapshot!(
            err.to_string(),
            @"edge a -> ghost references unknown node 'ghost'"
        );
    }

    #[test]
    fn warning_messages() {
        insta::assert_snapshot!(
            ParameterWarning::UnrecognizedField("glow".to_string()).to_string(),
            @"unrecognized parameter 'glow' ignored"
        );
        insta::assert_snapshot!(
            CapabilityError::ParallelUnavailable("no adapter".to_string()).to_string(),
            @"parallel compute unavailable: no adapter"
        );
    }

    #[test]
    fn capability_reason_drops_prefix() {
        let err = CapabilityError::ParallelUnavailable("no adapter".to_string());
        assert_eq!(err.reason(), "no adapter");
        let disabled = CapabilityError::Disabled;
        assert_eq!(disabled.reason(), disabled.to_string());
    }
}
