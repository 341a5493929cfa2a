//! Small vector helpers over `[f32; 3]`
//!
//! Positions and velocities stay plain arrays so they can be copied straight
//! into compute buffers.

pub type Vec3 = [f32; 3];

pub const ZERO: Vec3 = [0.0, 0.0, 0.0];

#[inline]
pub fn add(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn scale(a: Vec3, s: f32) -> Vec3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

#[inline]
pub fn neg(a: Vec3) -> Vec3 {
    [-a[0], -a[1], -a[2]]
}

#[inline]
pub fn dot(a: Vec3, b: Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn length(a: Vec3) -> f32 {
    dot(a, a).sqrt()
}

#[inline]
pub fn add_assign(a: &mut Vec3, b: Vec3) {
    a[0] += b[0];
    a[1] += b[1];
    a[2] += b[2];
}

#[inline]
pub fn sub_assign(a: &mut Vec3, b: Vec3) {
    a[0] -= b[0];
    a[1] -= b[1];
    a[2] -= b[2];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_of_3_4_0() {
        assert_eq!(length([3.0, 4.0, 0.0]), 5.0);
    }

    #[test]
    fn sub_is_exact_negation_when_swapped() {
        let a = [0.1, -7.3, 12.25];
        let b = [3.3, 0.7, -1.0];
        assert_eq!(sub(a, b), neg(sub(b, a)));
    }
}
