//! WGSL compute shader for the layout kernel
//!
//! A single entry point expresses the same per-node math as
//! [`crate::executor::kernel::node_update`]: all-pairs repulsion, springs over
//! the CSR adjacency, centering, then damped integration with a velocity
//! limit. It reads `nodes_in` and writes `nodes_out` so every invocation sees
//! the pre-tick state.

/// Buffer layouts; must match the `repr(C)` kernel types
pub const TYPES: &str = r#"
struct Node {
    position: vec3<f32>,
    mass: f32,
    velocity: vec3<f32>,
    _padding: f32,
}

struct Span {
    offset: u32,
    count: u32,
}

struct Neighbor {
    index: u32,
    weight: f32,
    rest_length: f32,
    _padding: f32,
}

struct Uniforms {
    node_count: u32,
    dt: f32,
    repulsion_strength: f32,
    spring_strength: f32,
    damping: f32,
    max_velocity: f32,
    max_force: f32,
    centering_force: f32,
    target_radius: f32,
    min_distance: f32,
    repulsion_epsilon: f32,
    _padding: f32,
}

@group(0) @binding(0) var<storage, read> nodes_in: array<Node>;
@group(0) @binding(1) var<storage, read_write> nodes_out: array<Node>;
@group(0) @binding(2) var<storage, read> spans: array<Span>;
@group(0) @binding(3) var<storage, read> neighbors: array<Neighbor>;
@group(0) @binding(4) var<uniform> uniforms: Uniforms;
"#;

/// Deterministic separation axis for coincident pairs
pub const FALLBACK_DIRECTION: &str = r#"
fn fallback_direction(i: u32, j: u32) -> vec3<f32> {
    let lo = min(i, j);
    let hi = max(i, j);
    let h = (lo * 0x9E3779B1u) ^ ((hi + 1u) * 0x85EBCA77u);
    let u = f32(h >> 8u) / 16777216.0;
    let v = f32((h * 0xC2B2AE3Du) >> 8u) / 16777216.0;

    let z = 1.0 - 2.0 * u;
    let r = sqrt(max(1.0 - z * z, 0.0));
    let theta = 6.28318530717958647692 * v;
    let dir = vec3<f32>(r * cos(theta), r * sin(theta), z);

    if (i < j) {
        return dir;
    }
    return -dir;
}
"#;

/// The layout step entry point
pub const LAYOUT_STEP: &str = r#"
@compute @workgroup_size(256)
fn layout_step(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if (i >= uniforms.node_count) {
        return;
    }

    let node = nodes_in[i];
    var force = vec3<f32>(0.0, 0.0, 0.0);

    // Repulsion from every other node
    for (var j = 0u; j < uniforms.node_count; j++) {
        if (j == i) {
            continue;
        }
        let other = nodes_in[j];
        let delta = node.position - other.position;
        let dist = length(delta);
        var dir = fallback_direction(i, j);
        if (dist > 0.0) {
            dir = delta / dist;
        }
        let d = max(dist, uniforms.min_distance);
        let magnitude = uniforms.repulsion_strength * node.mass * other.mass
            / (d * d + uniforms.repulsion_epsilon);
        force += dir * min(magnitude, uniforms.max_force);
    }

    // Springs (Hooke's law toward rest length)
    let span = spans[i];
    for (var k = 0u; k < span.count; k++) {
        let neighbor = neighbors[span.offset + k];
        let j = neighbor.index;
        let delta = nodes_in[j].position - node.position;
        let dist = length(delta);
        var toward = -fallback_direction(i, j);
        if (dist > 0.0) {
            toward = delta / dist;
        }
        let magnitude = uniforms.spring_strength * neighbor.weight * (dist - neighbor.rest_length);
        force += toward * clamp(magnitude, -uniforms.max_force, uniforms.max_force);
    }

    // Centering outside the target radius
    let r = length(node.position);
    if (r > uniforms.target_radius && r > 0.0) {
        let magnitude = uniforms.centering_force * (r - uniforms.target_radius);
        force -= node.position * (magnitude / r);
    }

    // Damped integration with velocity limit
    var velocity = (node.velocity + force * uniforms.dt) * uniforms.damping;
    let speed = length(velocity);
    if (speed > uniforms.max_velocity) {
        velocity = velocity * (uniforms.max_velocity / speed);
    }

    var updated = node;
    updated.velocity = velocity;
    updated.position = node.position + velocity * uniforms.dt;
    nodes_out[i] = updated;
}
"#;

/// Full shader source for pipeline creation
pub fn layout_shader() -> String {
    format!("{}\n{}\n{}", TYPES, FALLBACK_DIRECTION, LAYOUT_STEP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_declares_entry_point_and_bindings() {
        let source = layout_shader();
        assert!(source.contains("fn layout_step"));
        for binding in 0..5 {
            assert!(source.contains(&format!("@binding({binding})")));
        }
    }
}
