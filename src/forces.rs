//! Force model
//!
//! Pure functions computing per-node force contributions from positions,
//! masses, springs, and parameters. Both executors build on these so the
//! physics is written exactly once.
//!
//! # Forces
//!
//! - **Repulsion**: every pair pushes apart with `k * mi * mj / (d² + ε)`
//! - **Spring**: every edge obeys Hooke's law `k * w * (d - L)`
//! - **Centering**: nodes beyond `target_radius` are pulled back linearly
//!
//! Each repulsion and spring contribution is clamped to `max_force` before it
//! is accumulated.

use crate::math::{self, Vec3};
use crate::params::SimulationParameters;

/// A spring between two simulation-state indices
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpringEdge {
    pub a: usize,
    pub b: usize,
    pub weight: f32,
    /// Per-edge override of `natural_length`
    pub rest_length: Option<f32>,
}

impl SpringEdge {
    pub fn rest_length(&self, params: &SimulationParameters) -> f32 {
        self.rest_length.unwrap_or(params.natural_length)
    }
}

/// Deterministic unit direction for node `i` when it coincides with node `j`
///
/// Derived from the unordered pair so every pair separates along its own
/// axis; the result for `(j, i)` is the exact negation of `(i, j)`.
pub fn fallback_direction(i: usize, j: usize) -> Vec3 {
    let (lo, hi) = if i < j { (i, j) } else { (j, i) };
    let h = (lo as u32).wrapping_mul(0x9E37_79B1)
        ^ (hi as u32).wrapping_add(1).wrapping_mul(0x85EB_CA77);
    let u = (h >> 8) as f32 / 16_777_216.0;
    let v = (h.wrapping_mul(0xC2B2_AE3D) >> 8) as f32 / 16_777_216.0;

    let z = 1.0 - 2.0 * u;
    let r = (1.0 - z * z).max(0.0).sqrt();
    let theta = std::f32::consts::TAU * v;
    let dir = [r * theta.cos(), r * theta.sin(), z];

    if i < j { dir } else { math::neg(dir) }
}

/// Repulsive force exerted on node `i` by node `j`
pub fn repulsion(
    (i, pi, mi): (usize, Vec3, f32),
    (j, pj, mj): (usize, Vec3, f32),
    params: &SimulationParameters,
) -> Vec3 {
    let delta = math::sub(pi, pj);
    let dist = math::length(delta);
    let dir = if dist > 0.0 {
        math::scale(delta, 1.0 / dist)
    } else {
        fallback_direction(i, j)
    };

    let d = dist.max(params.min_distance);
    let magnitude = params.repulsion_strength * mi * mj / (d * d + params.repulsion_epsilon);
    math::scale(dir, magnitude.min(params.max_force))
}

/// Spring force exerted on node `i` by an edge to node `j`
///
/// Positive magnitude (stretched) pulls `i` toward `j`; negative
/// (compressed) pushes it away.
pub fn spring(
    (i, pi): (usize, Vec3),
    (j, pj): (usize, Vec3),
    weight: f32,
    rest_length: f32,
    params: &SimulationParameters,
) -> Vec3 {
    let delta = math::sub(pj, pi);
    let dist = math::length(delta);
    let toward = if dist > 0.0 {
        math::scale(delta, 1.0 / dist)
    } else {
        math::neg(fallback_direction(i, j))
    };

    let magnitude = params.spring_strength * weight * (dist - rest_length);
    let magnitude = magnitude.clamp(-params.max_force, params.max_force);
    math::scale(toward, magnitude)
}

/// Pull back toward the origin once a node leaves `target_radius`
pub fn centering(p: Vec3, params: &SimulationParameters) -> Vec3 {
    let r = math::length(p);
    if r <= params.target_radius || r == 0.0 {
        return math::ZERO;
    }
    let magnitude = params.centering_force * (r - params.target_radius);
    math::scale(p, -magnitude / r)
}

/// Compute the net force on every node into `forces`
///
/// Pairwise repulsion is evaluated once per unordered pair and applied with
/// opposite signs to both nodes.
pub fn accumulate(
    positions: &[Vec3],
    masses: &[f32],
    springs: &[SpringEdge],
    params: &SimulationParameters,
    forces: &mut Vec<Vec3>,
) {
    let n = positions.len();
    forces.clear();
    forces.resize(n, math::ZERO);

    for i in 0..n {
        for j in (i + 1)..n {
            let f = repulsion(
                (i, positions[i], masses[i]),
                (j, positions[j], masses[j]),
                params,
            );
            math::add_assign(&mut forces[i], f);
            math::sub_assign(&mut forces[j], f);
        }
    }

    for edge in springs {
        let f = spring(
            (edge.a, positions[edge.a]),
            (edge.b, positions[edge.b]),
            edge.weight,
            edge.rest_length(params),
            params,
        );
        math::add_assign(&mut forces[edge.a], f);
        math::sub_assign(&mut forces[edge.b], f);
    }

    for (force, &p) in forces.iter_mut().zip(positions) {
        math::add_assign(force, centering(p, params));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SimulationParameters {
        SimulationParameters::default()
    }

    #[test]
    fn repulsion_is_antisymmetric() {
        let params = params();
        let a = (0, [1.5, -2.0, 3.25], 1.0);
        let b = (1, [-4.0, 0.5, 1.0], 2.0);

        let on_a = repulsion(a, b, &params);
        let on_b = repulsion(b, a, &params);
        assert_eq!(on_a, math::neg(on_b));
    }

    #[test]
    fn repulsion_pushes_apart() {
        let params = params();
        let f = repulsion((0, math::ZERO, 1.0), (1, [2.0, 0.0, 0.0], 1.0), &params);
        assert!(f[0] < 0.0);
        assert_eq!(f[1], 0.0);
        assert_eq!(f[2], 0.0);
    }

    #[test]
    fn coincident_nodes_use_clamped_fallback() {
        let params = SimulationParameters {
            repulsion_strength: 1e9,
            ..params()
        };
        let f = repulsion((0, [5.0; 3], 1.0), (1, [5.0; 3], 1.0), &params);
        let magnitude = math::length(f);

        assert!(magnitude > 0.0);
        assert!(magnitude <= params.max_force * (1.0 + 1e-5));
    }

    #[test]
    fn fallback_direction_is_unit_and_antisymmetric() {
        for (i, j) in [(0, 1), (0, 2), (1, 2), (7, 3)] {
            let d = fallback_direction(i, j);
            assert!((math::length(d) - 1.0).abs() < 1e-5);
            assert_eq!(d, math::neg(fallback_direction(j, i)));
        }
        assert_ne!(fallback_direction(0, 1), fallback_direction(0, 2));
        assert_ne!(fallback_direction(0, 1), fallback_direction(1, 2));
    }

    #[test]
    fn spring_at_rest_length_is_zero() {
        let params = params();
        let f = spring((0, math::ZERO), (1, [10.0, 0.0, 0.0]), 1.0, 10.0, &params);
        assert_eq!(f, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn stretched_spring_pulls_together() {
        let params = params();
        let f = spring((0, math::ZERO), (1, [20.0, 0.0, 0.0]), 1.0, 10.0, &params);
        assert!(f[0] > 0.0);
    }

    #[test]
    fn compressed_spring_pushes_apart() {
        let params = params();
        let f = spring((0, math::ZERO), (1, [5.0, 0.0, 0.0]), 1.0, 10.0, &params);
        assert!(f[0] < 0.0);
    }

    #[test]
    fn spring_is_clamped() {
        let params = params();
        let f = spring((0, math::ZERO), (1, [1e6, 0.0, 0.0]), 5.0, 10.0, &params);
        assert!((math::length(f) - params.max_force).abs() < 1e-3);
    }

    #[test]
    fn centering_inactive_inside_radius() {
        let params = params();
        assert_eq!(centering([10.0, 0.0, 0.0], &params), math::ZERO);
    }

    #[test]
    fn centering_pulls_back_outside_radius() {
        let params = params();
        let f = centering([0.0, params.target_radius + 100.0, 0.0], &params);
        assert!(f[1] < 0.0);
        assert!((f[1] + params.centering_force * 100.0).abs() < 1e-4);
    }

    #[test]
    fn accumulate_balances_two_unconnected_nodes() {
        let params = params();
        let positions = vec![[1.0, 2.0, 3.0], [-3.0, 0.5, 8.0]];
        let masses = vec![1.0, 1.0];
        let mut forces = Vec::new();
        accumulate(&positions, &masses, &[], &params, &mut forces);

        assert_eq!(forces[0], math::neg(forces[1]));
    }
}
