//! Kinematic state and the effect pipeline that drives it.
//!
//! A move is expressed as a queue of [`Effect`]s. Each tick the pipeline runs
//! first, adjusting accelerations and flags, then [`Kinematics::integrate`]
//! advances velocity, heading and position by the tick's delta time.

pub mod effects;
pub mod pipeline;

pub use effects::{Effect, EffectContext};
pub use pipeline::EffectPipeline;

use crate::components::Position;
use crate::definitions::EntityDefinition;
use bevy_ecs::prelude::*;
use std::f32::consts::{PI, TAU};

/// Side effects requested by motion effects, applied by the motion system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionSignal {
    Moved,
    Stopped,
    /// Heading settled; re-mark the occupancy grid for this entity.
    RecheckOccupancy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Animation {
    #[default]
    Idle,
    Moving,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MovementState {
    pub origin: Position,
    pub target: Position,
    pub velocity: f32,
    pub acceleration: f32,
    pub max_velocity: f32,
    pub max_acceleration: f32,
    pub target_initial_distance: f32,
    /// Distance from the target at which braking starts.
    pub target_drag_threshold: f32,
    /// Braking distance from top speed.
    pub max_target_drag_threshold: f32,
    /// Bearing fixed when the move was initialised.
    pub target_angle: f32,
    pub distance: f32,
    /// Distance covered toward the target.
    pub distance_inverse: f32,
    pub distance_from_origin: f32,
    pub stopping: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RotationState {
    pub current: f32,
    pub target: f32,
    pub angular_velocity: f32,
    pub max_angular_velocity: f32,
    /// Discrete headings; alignment is judged on these.
    pub angle_count: u16,
}

impl RotationState {
    /// Discrete heading index of `angle`.
    pub fn angle_code(&self, angle: f32) -> u16 {
        let count = self.angle_count.max(1);
        let turns = angle.rem_euclid(TAU) / TAU;
        ((turns * f32::from(count)).round() as u32 % u32::from(count)) as u16
    }

    pub fn is_aligned(&self) -> bool {
        self.angle_code(self.current) == self.angle_code(self.target)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LevitationState {
    pub time: u32,
    pub offset: f32,
}

/// Everything the effects read and write.
#[derive(Debug, Clone, Default)]
pub struct Kinematics {
    pub movement: MovementState,
    pub rotation: RotationState,
    pub levitation: LevitationState,
    pub animation: Animation,
    /// Destination of the current or last move request.
    pub requested: Option<Position>,
    pub arrived: bool,
    pub stopped_at_destination: bool,
}

impl Kinematics {
    pub fn from_definition(def: &EntityDefinition) -> Self {
        Self {
            movement: MovementState {
                max_velocity: def.max_velocity,
                max_acceleration: def.max_acceleration,
                max_target_drag_threshold: def.max_drag_threshold(),
                ..Default::default()
            },
            rotation: RotationState {
                max_angular_velocity: def.max_angular_velocity,
                angle_count: def.angle_count,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Advance velocity, heading and position by `dt` seconds.
    pub fn integrate(&mut self, position: &mut Position, dt: f32) {
        let m = &mut self.movement;
        m.velocity = (m.velocity + m.acceleration * dt).max(0.0).min(m.max_velocity);
        if m.velocity > 0.0 {
            position.x += m.target_angle.cos() * m.velocity * dt;
            position.y += m.target_angle.sin() * m.velocity * dt;
        }

        let r = &mut self.rotation;
        if r.angular_velocity > 0.0 {
            let diff = shortest_arc(r.current, r.target);
            let step = r.angular_velocity * dt;
            r.current = if diff.abs() <= step {
                r.target
            } else {
                normalize_angle(r.current + step.copysign(diff))
            };
        }

        m.distance = position.distance_to(&m.target);
        m.distance_from_origin = m.origin.distance_to(position);
        m.distance_inverse = (m.target_initial_distance - m.distance).max(0.0);
    }
}

/// Angle in `(-PI, PI]`.
pub fn normalize_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(TAU);
    if wrapped > PI {
        wrapped - TAU
    } else {
        wrapped
    }
}

/// Signed smallest rotation from `from` to `to`.
pub fn shortest_arc(from: f32, to: f32) -> f32 {
    normalize_angle(to - from)
}

/// Per-entity motion: kinematic state plus its effect queue.
#[derive(Component, Debug, Clone, Default)]
pub struct Motion {
    pub kinematics: Kinematics,
    pipeline: EffectPipeline,
    mobile: bool,
    levitates: bool,
}

impl Motion {
    pub fn from_definition(def: &EntityDefinition) -> Self {
        let mut motion = Self {
            kinematics: Kinematics::from_definition(def),
            pipeline: EffectPipeline::new(),
            mobile: def.can_move(),
            levitates: def.levitates,
        };
        motion.append_idle_effects();
        motion
    }

    pub fn pipeline(&self) -> &EffectPipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut EffectPipeline {
        &mut self.pipeline
    }

    pub fn can_move(&self) -> bool {
        self.mobile
    }

    /// Moving, or with motion effects still queued.
    pub fn is_moving(&self) -> bool {
        self.kinematics.movement.velocity > 0.0 || self.pipeline.has_pending_motion()
    }

    pub fn heading(&self) -> f32 {
        self.kinematics.rotation.current
    }

    pub fn velocity(&self) -> f32 {
        self.kinematics.movement.velocity
    }

    /// Destination of the move in progress.
    pub fn destination(&self) -> Option<Position> {
        if self.is_moving() {
            self.kinematics.requested
        } else {
            None
        }
    }

    /// Replace any queued motion with a move to `target`.
    /// Returns false for entities that cannot move.
    pub fn move_to(&mut self, target: Position) -> bool {
        if !self.mobile {
            return false;
        }
        self.kinematics.requested = Some(target);
        self.pipeline.reset();
        for effect in [
            Effect::InitMovement,
            Effect::RotateToTarget,
            Effect::StartMovement,
            Effect::StartMoveAnimation,
            Effect::AccelerateToTarget,
            Effect::MoveToTarget,
            Effect::Stopping,
            Effect::ResetMovement,
            Effect::StopAnimation,
        ] {
            self.pipeline.add(effect);
        }
        self.append_idle_effects();
        true
    }

    /// Brake to a halt from wherever the entity is.
    pub fn stop(&mut self) {
        self.pipeline.reset();
        self.pipeline.add(Effect::Stopping);
        self.pipeline.add(Effect::ResetMovement);
        self.pipeline.add(Effect::StopAnimation);
        self.append_idle_effects();
    }

    /// Drop all motion immediately, without braking.
    pub fn halt(&mut self) {
        self.pipeline.reset();
        let k = &mut self.kinematics;
        k.movement.velocity = 0.0;
        k.movement.acceleration = 0.0;
        k.movement.stopping = false;
        k.rotation.angular_velocity = 0.0;
        k.animation = Animation::Idle;
        self.append_idle_effects();
    }

    /// Run the effect queue, then integrate. Requested side effects are
    /// appended to `signals`.
    pub fn step(&mut self, position: &mut Position, dt: f32, signals: &mut Vec<MotionSignal>) {
        let mut ctx = EffectContext::new(&mut self.kinematics, *position, signals);
        self.pipeline.update(&mut ctx);
        self.kinematics.integrate(position, dt);
    }

    fn append_idle_effects(&mut self) {
        if self.levitates {
            self.pipeline.add(Effect::Levitating);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> EntityDefinition {
        EntityDefinition {
            id: "runner".into(),
            max_velocity: 60.0,
            max_acceleration: 60.0,
            max_angular_velocity: PI,
            ..Default::default()
        }
    }

    fn run_until_idle(motion: &mut Motion, pos: &mut Position, max_ticks: usize) -> (usize, Vec<MotionSignal>) {
        let mut signals = Vec::new();
        for tick in 0..max_ticks {
            motion.step(pos, 1.0 / 30.0, &mut signals);
            if !motion.is_moving() {
                return (tick + 1, signals);
            }
        }
        panic!("motion did not settle within {} ticks", max_ticks);
    }

    #[test]
    fn test_move_reaches_target() {
        let mut motion = Motion::from_definition(&runner());
        let mut pos = Position::new(100.0, 100.0);
        assert!(motion.move_to(Position::new(300.0, 100.0)));
        assert_eq!(motion.destination(), Some(Position::new(300.0, 100.0)));

        let (_, signals) = run_until_idle(&mut motion, &mut pos, 1000);
        assert!(pos.distance_to(&Position::new(300.0, 100.0)) < 5.0);
        assert!(motion.kinematics.stopped_at_destination);
        assert_eq!(motion.velocity(), 0.0);
        assert!(motion.pipeline().is_empty());
        assert_eq!(signals.first(), Some(&MotionSignal::RecheckOccupancy));
        assert!(signals.contains(&MotionSignal::Moved));
        assert_eq!(signals.last(), Some(&MotionSignal::Stopped));
    }

    #[test]
    fn test_move_rotates_first() {
        let mut motion = Motion::from_definition(&runner());
        let mut pos = Position::new(0.0, 0.0);
        motion.move_to(Position::new(-100.0, 0.0));

        let mut signals = Vec::new();
        motion.step(&mut pos, 1.0 / 30.0, &mut signals);
        assert_eq!(pos, Position::new(0.0, 0.0));
        assert_eq!(motion.pipeline().head(), Some(Effect::RotateToTarget));

        run_until_idle(&mut motion, &mut pos, 2000);
        assert!(pos.distance_to(&Position::new(-100.0, 0.0)) < 5.0);
        assert!((normalize_angle(motion.heading()) - PI).abs() < 0.01);
    }

    #[test]
    fn test_stop_brakes_without_reaching_target() {
        let mut motion = Motion::from_definition(&runner());
        let mut pos = Position::new(0.0, 0.0);
        motion.move_to(Position::new(1000.0, 0.0));
        let mut signals = Vec::new();
        for _ in 0..60 {
            motion.step(&mut pos, 1.0 / 30.0, &mut signals);
        }
        assert!(motion.velocity() > 0.0);

        motion.stop();
        run_until_idle(&mut motion, &mut pos, 500);
        assert!(pos.x < 200.0);
        assert!(!motion.kinematics.stopped_at_destination);
    }

    #[test]
    fn test_immobile_ignores_moves() {
        let def = EntityDefinition {
            id: "rock".into(),
            ..Default::default()
        };
        let mut motion = Motion::from_definition(&def);
        assert!(!motion.move_to(Position::new(10.0, 10.0)));
        assert!(!motion.is_moving());
    }

    #[test]
    fn test_levitating_entity_keeps_effect_after_moves() {
        let def = EntityDefinition {
            levitates: true,
            ..runner()
        };
        let mut motion = Motion::from_definition(&def);
        assert_eq!(motion.pipeline().head(), Some(Effect::Levitating));
        assert!(!motion.is_moving());

        let mut pos = Position::default();
        motion.move_to(Position::new(50.0, 0.0));
        run_until_idle(&mut motion, &mut pos, 1000);
        assert_eq!(motion.pipeline().len(), 1);
        assert_eq!(motion.pipeline().head(), Some(Effect::Levitating));

        motion.halt();
        assert_eq!(motion.pipeline().head(), Some(Effect::Levitating));
    }

    #[test]
    fn test_angle_helpers() {
        assert!((normalize_angle(3.0 * PI) - PI).abs() < 1e-5);
        assert!((shortest_arc(0.1, TAU - 0.1) + 0.2).abs() < 1e-5);

        let rotation = RotationState {
            angle_count: 8,
            ..Default::default()
        };
        assert_eq!(rotation.angle_code(0.0), 0);
        assert_eq!(rotation.angle_code(PI / 2.0), 2);
        assert_eq!(rotation.angle_code(-PI / 2.0), 6);
        assert_eq!(rotation.angle_code(TAU - 0.01), 0);
    }
}
