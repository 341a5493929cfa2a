//! Tunable simulation parameters
//!
//! All parameters have defaults. Updates arrive as loosely-typed JSON maps
//! (flat or nested) and are merged over the current values key by key;
//! unknown keys are reported and ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ParameterWarning;

// =============================================================================
// Default Constants
// =============================================================================

/// Default number of synchronous iterations run after a topology change
pub const DEFAULT_ITERATIONS_PER_SETTLE: u32 = 250;

/// Default pairwise repulsion coefficient
pub const DEFAULT_REPULSION_STRENGTH: f32 = 2.0;

/// Default spring constant (multiplied by edge weight)
pub const DEFAULT_SPRING_STRENGTH: f32 = 2.0;

/// Default rest length for edges without an explicit override
pub const DEFAULT_NATURAL_LENGTH: f32 = 100.0;

/// Default velocity damping factor (applied each tick)
pub const DEFAULT_DAMPING: f32 = 0.8;

/// Default velocity magnitude limit
pub const DEFAULT_MAX_VELOCITY: f32 = 10.0;

/// Default limit on any single repulsion or spring contribution
pub const DEFAULT_MAX_FORCE: f32 = 50.0;

/// Default strength of the pull back inside `target_radius`
pub const DEFAULT_CENTERING_FORCE: f32 = 0.05;

/// Default radius of the layout volume
pub const DEFAULT_TARGET_RADIUS: f32 = 200.0;

/// Default minimum distance for repulsion (singularity guard)
pub const DEFAULT_MIN_DISTANCE: f32 = 0.1;

/// Default softening term added to d² in the repulsion denominator
pub const DEFAULT_REPULSION_EPSILON: f32 = 0.1;

/// Default nominal timestep
pub const DEFAULT_TIME_STEP: f32 = 0.5;

/// Default number of ticks between global recenter/rescale passes
pub const DEFAULT_RESCALE_INTERVAL: u32 = 10;

/// Default per-axis movement below which a node is not re-broadcast
pub const DEFAULT_POSITION_EPSILON: f32 = 0.001;

/// Lower bound damping is clamped to (damping must stay in (0, 1])
pub const MIN_DAMPING: f32 = 0.001;

/// Lower bound `min_distance` is clamped to
pub const MIN_DISTANCE_FLOOR: f32 = 1e-4;

/// Parameters for the force-directed layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulationParameters {
    /// Integration steps run synchronously when the topology changes
    pub iterations_per_settle: u32,
    pub repulsion_strength: f32,
    pub spring_strength: f32,
    /// Global rest length for springs
    pub natural_length: f32,
    /// Velocity multiplier per tick, in (0, 1]
    pub damping: f32,
    pub max_velocity: f32,
    pub max_force: f32,
    pub centering_force: f32,
    pub target_radius: f32,
    pub min_distance: f32,
    pub repulsion_epsilon: f32,
    /// Nominal dt for settle iterations and [`crate::SimulationController::step`]
    pub time_step: f32,
    /// Ticks between global recenter/rescale passes (0 = never)
    pub rescale_interval: u32,
    pub position_epsilon: f32,
    /// Seed for initial placement; `None` seeds from the OS
    pub seed: Option<u64>,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            iterations_per_settle: DEFAULT_ITERATIONS_PER_SETTLE,
            repulsion_strength: DEFAULT_REPULSION_STRENGTH,
            spring_strength: DEFAULT_SPRING_STRENGTH,
            natural_length: DEFAULT_NATURAL_LENGTH,
            damping: DEFAULT_DAMPING,
            max_velocity: DEFAULT_MAX_VELOCITY,
            max_force: DEFAULT_MAX_FORCE,
            centering_force: DEFAULT_CENTERING_FORCE,
            target_radius: DEFAULT_TARGET_RADIUS,
            min_distance: DEFAULT_MIN_DISTANCE,
            repulsion_epsilon: DEFAULT_REPULSION_EPSILON,
            time_step: DEFAULT_TIME_STEP,
            rescale_interval: DEFAULT_RESCALE_INTERVAL,
            position_epsilon: DEFAULT_POSITION_EPSILON,
            seed: None,
        }
    }
}

/// A recognized parameter key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    IterationsPerSettle,
    RepulsionStrength,
    SpringStrength,
    NaturalLength,
    Damping,
    MaxVelocity,
    MaxForce,
    CenteringForce,
    TargetRadius,
    MinDistance,
    RepulsionEpsilon,
    TimeStep,
    RescaleInterval,
    PositionEpsilon,
    Seed,
}

impl Field {
    /// Resolve a key in camelCase, snake_case, or one of the legacy UI aliases
    fn from_key(key: &str) -> Option<Self> {
        let normalized: String = key
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        let field = match normalized.as_str() {
            "iterationspersettle" | "iterations" | "forcedirectediterations"
            | "initialiterations" => Field::IterationsPerSettle,
            "repulsionstrength" | "repulsion" | "forcedirectedrepulsion" => {
                Field::RepulsionStrength
            }
            "springstrength" | "attractionstrength" | "forcedirectedspring" => {
                Field::SpringStrength
            }
            "naturallength" | "restlength" => Field::NaturalLength,
            "damping" | "forcedirecteddamping" => Field::Damping,
            "maxvelocity" | "maxspeed" => Field::MaxVelocity,
            "maxforce" => Field::MaxForce,
            "centeringforce" | "centerstrength" => Field::CenteringForce,
            "targetradius" => Field::TargetRadius,
            "mindistance" => Field::MinDistance,
            "repulsionepsilon" => Field::RepulsionEpsilon,
            "timestep" | "deltatime" | "dt" => Field::TimeStep,
            "rescaleinterval" => Field::RescaleInterval,
            "positionepsilon" | "updatethreshold" => Field::PositionEpsilon,
            "seed" => Field::Seed,
            _ => return None,
        };
        Some(field)
    }
}

impl SimulationParameters {
    /// Merge a (possibly nested) JSON map of overrides into these parameters
    ///
    /// Only recognized keys are applied. Nested objects are flattened, so
    /// `{"physics": {"damping": 0.5}}` sets `damping`. Values are sanitized
    /// after merging; every problem is logged and returned as a warning.
    pub fn merge(&mut self, update: &Value) -> Vec<ParameterWarning> {
        let mut warnings = Vec::new();
        match update {
            Value::Object(map) => {
                for (key, value) in map {
                    self.merge_entry(key, value, &mut warnings);
                }
            }
            other => warnings.push(ParameterWarning::InvalidValue {
                key: String::new(),
                value: other.to_string(),
            }),
        }
        warnings.extend(self.sanitize());

        for warning in &warnings {
            warn!(%warning, "parameter update");
        }
        warnings
    }

    /// Apply one key, returning whether it (or anything nested under it) was recognized
    fn merge_entry(
        &mut self,
        key: &str,
        value: &Value,
        warnings: &mut Vec<ParameterWarning>,
    ) -> bool {
        let Some(field) = Field::from_key(key) else {
            let mut recognized = false;
            if let Value::Object(nested) = value {
                for (inner_key, inner_value) in nested {
                    recognized |= self.merge_entry(inner_key, inner_value, warnings);
                }
            }
            if !recognized {
                warnings.push(ParameterWarning::UnrecognizedField(key.to_string()));
            }
            return recognized;
        };

        if field == Field::Seed {
            match value {
                Value::Null => self.seed = None,
                _ => match value.as_u64() {
                    Some(seed) => self.seed = Some(seed),
                    None => warnings.push(ParameterWarning::InvalidValue {
                        key: key.to_string(),
                        value: value.to_string(),
                    }),
                },
            }
            return true;
        }

        let Some(number) = value.as_f64() else {
            warnings.push(ParameterWarning::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            });
            return true;
        };

        debug!(key, number, "applying parameter");
        let as_count = |n: f64| n.max(0.0).min(u32::MAX as f64) as u32;
        match field {
            Field::IterationsPerSettle => self.iterations_per_settle = as_count(number),
            Field::RescaleInterval => self.rescale_interval = as_count(number),
            Field::RepulsionStrength => self.repulsion_strength = number as f32,
            Field::SpringStrength => self.spring_strength = number as f32,
            Field::NaturalLength => self.natural_length = number as f32,
            Field::Damping => self.damping = number as f32,
            Field::MaxVelocity => self.max_velocity = number as f32,
            Field::MaxForce => self.max_force = number as f32,
            Field::CenteringForce => self.centering_force = number as f32,
            Field::TargetRadius => self.target_radius = number as f32,
            Field::MinDistance => self.min_distance = number as f32,
            Field::RepulsionEpsilon => self.repulsion_epsilon = number as f32,
            Field::TimeStep => self.time_step = number as f32,
            Field::PositionEpsilon => self.position_epsilon = number as f32,
            Field::Seed => {}
        }
        true
    }

    /// Clamp every field into its valid range
    ///
    /// Runs whenever parameters are set, so the hot loop can assume valid
    /// values. Non-finite values fall back to the default.
    pub fn sanitize(&mut self) -> Vec<ParameterWarning> {
        let mut warnings = Vec::new();
        let defaults = Self::default();

        let mut clamp = |key: &str, value: &mut f32, min: f32, max: f32, fallback: f32| {
            let clamped = if value.is_finite() {
                value.clamp(min, max)
            } else {
                fallback
            };
            if clamped != *value {
                warnings.push(ParameterWarning::Clamped {
                    key: key.to_string(),
                    from: *value,
                    to: clamped,
                });
                *value = clamped;
            }
        };

        clamp(
            "damping",
            &mut self.damping,
            MIN_DAMPING,
            1.0,
            defaults.damping,
        );
        clamp(
            "minDistance",
            &mut self.min_distance,
            MIN_DISTANCE_FLOOR,
            f32::MAX,
            defaults.min_distance,
        );
        clamp(
            "timeStep",
            &mut self.time_step,
            f32::MIN_POSITIVE,
            f32::MAX,
            defaults.time_step,
        );

        let non_negative = [
            ("repulsionStrength", &mut self.repulsion_strength),
            ("springStrength", &mut self.spring_strength),
            ("naturalLength", &mut self.natural_length),
            ("maxVelocity", &mut self.max_velocity),
            ("maxForce", &mut self.max_force),
            ("centeringForce", &mut self.centering_force),
            ("targetRadius", &mut self.target_radius),
            ("repulsionEpsilon", &mut self.repulsion_epsilon),
            ("positionEpsilon", &mut self.position_epsilon),
        ];
        let fallbacks = [
            defaults.repulsion_strength,
            defaults.spring_strength,
            defaults.natural_length,
            defaults.max_velocity,
            defaults.max_force,
            defaults.centering_force,
            defaults.target_radius,
            defaults.repulsion_epsilon,
            defaults.position_epsilon,
        ];
        for ((key, value), fallback) in non_negative.into_iter().zip(fallbacks) {
            clamp(key, value, 0.0, f32::MAX, fallback);
        }

        warnings
    }

    /// Parameters with sanitization applied, discarding warnings
    pub fn sanitized(mut self) -> Self {
        for warning in self.sanitize() {
            warn!(%warning, "parameter sanitized");
        }
        self
    }
}
