//! Time integration
//!
//! Semi-implicit Euler with damping and a hard velocity limit, plus a global
//! recenter/rescale pass run every `rescale_interval` ticks.

use crate::math::{self, Vec3};
use crate::params::SimulationParameters;

/// Advance a single node by one step, returning its new position and velocity
#[inline]
pub fn integrate_node(
    position: Vec3,
    velocity: Vec3,
    force: Vec3,
    dt: f32,
    params: &SimulationParameters,
) -> (Vec3, Vec3) {
    let mut velocity = math::scale(math::add(velocity, math::scale(force, dt)), params.damping);

    let speed = math::length(velocity);
    if speed > params.max_velocity {
        velocity = math::scale(velocity, params.max_velocity / speed);
    }

    let position = math::add(position, math::scale(velocity, dt));
    (position, velocity)
}

/// Advance every node by one step
pub fn step(
    positions: &mut [Vec3],
    velocities: &mut [Vec3],
    forces: &[Vec3],
    dt: f32,
    params: &SimulationParameters,
) {
    for ((position, velocity), &force) in positions
        .iter_mut()
        .zip(velocities.iter_mut())
        .zip(forces)
    {
        let (p, v) = integrate_node(*position, *velocity, force, dt, params);
        *position = p;
        *velocity = v;
    }
}

/// Move the centroid to the origin and shrink the layout back to `target_radius`
///
/// The layout is only scaled down, never inflated, so compact graphs keep
/// their natural edge lengths.
pub fn recenter(positions: &mut [Vec3], params: &SimulationParameters) {
    if positions.is_empty() {
        return;
    }

    let mut centroid = math::ZERO;
    for &p in positions.iter() {
        math::add_assign(&mut centroid, p);
    }
    let centroid = math::scale(centroid, 1.0 / positions.len() as f32);

    let mut max_radius = 0.0f32;
    for p in positions.iter_mut() {
        math::sub_assign(p, centroid);
        max_radius = max_radius.max(math::length(*p));
    }

    if max_radius > params.target_radius && max_radius > 0.0 {
        let factor = params.target_radius / max_radius;
        for p in positions.iter_mut() {
            *p = math::scale(*p, factor);
        }
    }
}
