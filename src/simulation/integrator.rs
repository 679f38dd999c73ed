use crate::{floating_type_mod::FT, V3};

/// Advances a single particle by one sub-step.
///
/// Forces are accumulated into `acceleration` (gravity along -y and linear drag),
/// then velocity and position are integrated with semi-implicit Euler.
#[inline(always)]
pub fn integrate_particle(
    position: &mut V3,
    velocity: &mut V3,
    acceleration: &mut V3,
    gravity: FT,
    drag: FT,
    sub_dt: FT,
) {
    *acceleration = V3::zeros();

    acceleration.y -= gravity;
    *acceleration += -drag * *velocity;

    *velocity += *acceleration * sub_dt;
    *position += *velocity * sub_dt;
}

/// Keeps a particle inside the container sphere around the origin.
///
/// Particles outside are moved back onto the surface and lose the outward
/// component of their velocity, so they slide along the wall instead of bouncing.
#[inline(always)]
pub fn apply_container_constraint(position: &mut V3, velocity: &mut V3, container_radius: FT) {
    let distance = position.norm();

    if distance > container_radius {
        let normal = *position / distance;
        *position = normal * container_radius;
        *velocity -= velocity.dot(&normal) * normal;
    }
}
