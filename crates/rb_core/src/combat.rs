//! Attack geometry.
//!
//! The scheduler decides *when* an attack fires; these predicates decide
//! *whether it lands*, given an attacker origin and a target point. They
//! are collaborators of the engine, not of the scheduler.

use nalgebra::Vector3;

use crate::config::AttackShape;

/// Cone attacks open 30 degrees around the aim direction.
pub const CONE_HALF_ANGLE_DEG: f32 = 30.0;

/// Where the attack volume is centered: spheres track the target, cones
/// and lines project from the attacker toward the target.
pub fn predict_attack_position(
    shape: AttackShape,
    origin: Vector3<f32>,
    target: Vector3<f32>,
    range: f32,
) -> Vector3<f32> {
    match shape {
        AttackShape::Sphere => target,
        AttackShape::Cone | AttackShape::Line => {
            let direction = normalize_or_zero(target - origin);
            origin + direction * range * 0.5
        }
    }
}

/// Does an attack of the given shape, centered per
/// [`predict_attack_position`], reach the target?
pub fn hit_test(
    shape: AttackShape,
    origin: Vector3<f32>,
    target: Vector3<f32>,
    range: f32,
) -> bool {
    let attack_position = predict_attack_position(shape, origin, target, range);
    match shape {
        AttackShape::Sphere => (target - attack_position).norm() <= range,
        AttackShape::Cone => {
            let to_target = target - origin;
            let aim = attack_position - origin;
            if aim.norm() == 0.0 || to_target.norm() == 0.0 {
                return true; // degenerate: target on top of the attacker
            }
            let angle_deg = to_target.angle(&aim).to_degrees();
            angle_deg <= CONE_HALF_ANGLE_DEG && to_target.norm() <= range
        }
        AttackShape::Line => {
            let line_direction = normalize_or_zero(attack_position - origin);
            let line_end = attack_position + line_direction * range;
            let along = (target - origin).dot(&line_direction);
            if along < 0.0 || along > (line_end - origin).norm() {
                return false;
            }
            let closest = origin + line_direction * along;
            (target - closest).norm() <= range * 0.5
        }
    }
}

fn normalize_or_zero(v: Vector3<f32>) -> Vector3<f32> {
    let norm = v.norm();
    if norm > 0.0 {
        v / norm
    } else {
        Vector3::zeros()
    }
}
