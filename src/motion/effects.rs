//! The motion effects and the context they run against.

use super::{Animation, Kinematics, MotionSignal};
use crate::components::Position;

/// State an effect may read and mutate during one invocation.
pub struct EffectContext<'a> {
    pub kinematics: &'a mut Kinematics,
    /// Entity position at the start of the tick.
    pub position: Position,
    pub signals: &'a mut Vec<MotionSignal>,
}

impl<'a> EffectContext<'a> {
    pub fn new(
        kinematics: &'a mut Kinematics,
        position: Position,
        signals: &'a mut Vec<MotionSignal>,
    ) -> Self {
        Self {
            kinematics,
            position,
            signals,
        }
    }
}

/// One step of a motion sequence. `apply` returns true while the effect is
/// still active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    /// Capture origin, target, bearing and braking distance. Finishes at once.
    InitMovement,
    /// Turn toward the target bearing until aligned.
    RotateToTarget,
    StartMovement,
    StartMoveAnimation,
    /// Full acceleration until the braking threshold or top speed.
    AccelerateToTarget,
    /// Coast until inside the braking distance.
    MoveToTarget,
    /// Brake until the entity comes to rest.
    Stopping,
    ResetMovement,
    StopAnimation,
    /// Cosmetic hover oscillation. Never finishes.
    Levitating,
}

impl Effect {
    pub fn apply(self, ctx: &mut EffectContext<'_>) -> bool {
        match self {
            Effect::InitMovement => init_movement(ctx),
            Effect::RotateToTarget => rotate_to_target(ctx),
            Effect::StartMovement => {
                ctx.signals.push(MotionSignal::Moved);
                false
            }
            Effect::StartMoveAnimation => {
                ctx.kinematics.animation = Animation::Moving;
                false
            }
            Effect::AccelerateToTarget => accelerate_to_target(ctx),
            Effect::MoveToTarget => move_to_target(ctx),
            Effect::Stopping => stopping(ctx),
            Effect::ResetMovement => reset_movement(ctx),
            Effect::StopAnimation => {
                ctx.kinematics.animation = Animation::Idle;
                false
            }
            Effect::Levitating => levitating(ctx),
        }
    }

    /// Effects that never finish on their own.
    pub fn is_perpetual(self) -> bool {
        matches!(self, Effect::Levitating)
    }
}

fn init_movement(ctx: &mut EffectContext<'_>) -> bool {
    let origin = ctx.position;
    let k = &mut *ctx.kinematics;
    let target = k.requested.unwrap_or(origin);
    let distance = origin.distance_to(&target);

    let m = &mut k.movement;
    m.origin = origin;
    m.target = target;
    m.target_initial_distance = distance;
    m.target_drag_threshold = m.max_target_drag_threshold.min(distance / 2.0);
    m.target_angle = if distance > 0.0 {
        origin.angle_to(&target)
    } else {
        k.rotation.current
    };
    m.acceleration = 0.0;
    m.distance = distance;
    m.distance_inverse = 0.0;
    m.distance_from_origin = 0.0;
    m.stopping = false;

    k.rotation.target = m.target_angle;
    if k.rotation.angle_count <= 1 || k.rotation.max_angular_velocity <= 0.0 {
        k.rotation.current = k.rotation.target;
    }
    k.arrived = false;
    k.stopped_at_destination = false;
    false
}

fn rotate_to_target(ctx: &mut EffectContext<'_>) -> bool {
    let k = &mut *ctx.kinematics;
    if k.movement.velocity > 0.0 {
        // Already under way: turn faster and let translation carry on.
        k.rotation.angular_velocity = k.rotation.max_angular_velocity * 1.5;
        return false;
    }

    k.rotation.angular_velocity = k.rotation.max_angular_velocity;
    if k.rotation.is_aligned() {
        k.rotation.current = k.rotation.target;
        k.rotation.angular_velocity = 0.0;
        ctx.signals.push(MotionSignal::RecheckOccupancy);
        return false;
    }
    true
}

fn accelerate_to_target(ctx: &mut EffectContext<'_>) -> bool {
    let m = &mut ctx.kinematics.movement;
    m.acceleration = m.max_acceleration;
    m.distance_inverse < m.target_drag_threshold && m.velocity < m.max_velocity
}

fn move_to_target(ctx: &mut EffectContext<'_>) -> bool {
    let k = &mut *ctx.kinematics;
    let m = &mut k.movement;
    m.acceleration = 0.0;
    if m.distance > m.target_drag_threshold && m.distance_from_origin < m.target_initial_distance {
        return true;
    }
    k.arrived = true;
    false
}

fn stopping(ctx: &mut EffectContext<'_>) -> bool {
    let k = &mut *ctx.kinematics;
    let m = &mut k.movement;
    if m.distance > 0.0 && m.distance_from_origin < m.target_initial_distance && m.velocity > 0.0 {
        m.acceleration = -m.max_acceleration;
        m.stopping = true;
        return true;
    }

    m.acceleration = 0.0;
    m.stopping = false;
    if k.arrived {
        k.stopped_at_destination = true;
    }
    ctx.signals.push(MotionSignal::Stopped);
    false
}

fn reset_movement(ctx: &mut EffectContext<'_>) -> bool {
    let k = &mut *ctx.kinematics;
    k.movement.acceleration = 0.0;
    k.movement.velocity = 0.0;
    k.movement.stopping = false;
    k.rotation.angular_velocity = 0.0;
    false
}

fn levitating(ctx: &mut EffectContext<'_>) -> bool {
    let lev = &mut ctx.kinematics.levitation;
    lev.time = lev.time.wrapping_add(1);
    lev.offset = (lev.time as f32 / 50.0).sin() / 100.0;
    true
}
