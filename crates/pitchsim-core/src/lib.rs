//! Robot-soccer simulation core.
//!
//! A seedable, single-threaded tick engine: a rigid-body world holding a
//! ball and two robot teams consumes delayed radio commands, steps physics
//! to an external clock, and produces delayed per-camera vision frames with
//! synchronous radio responses. All probabilistic behavior flows through one
//! seeded generator, so identical seeds and command streams replay
//! identical output bytes.

pub mod ball;
pub mod control;
pub mod errors;
pub mod field;
pub mod geometry;
pub mod radio;
pub mod rng;
pub mod robot;
pub mod simulator;
pub mod timing;
pub mod transform;
pub mod vision;
pub mod wire;

use glam::Vec3;
use pitchsim_physics::{DynamicsWorld, Material};

pub use ball::SimBall;
pub use control::{
    Command, CommandSimulator, CommandTransceiver, KickStyle, LocalVelocity, RadioResponse,
    Realism, RealismConfig, RobotCommand, RobotControl, RobotId, RobotSpecs, SslControl, Team,
    TeamSpec, TeleportBall, TeleportRobot, VisionWorstCase,
};
pub use errors::{ErrorAggregator, ErrorSource, SimError};
pub use field::SimField;
pub use geometry::{CameraCalibration, FieldGeometry, SimulatorSetup};
pub use radio::CommandQueue;
pub use rng::SimRng;
pub use robot::{RobotSlot, SimRobot};
pub use simulator::{NullSink, Simulator, SimulatorError, SimulatorSink, TimingStatus};
pub use timing::{ManualTimer, ScaledTimer, SimTimer, SingleShotQueue};
pub use transform::FieldTransform;
pub use vision::{check_camera_id, position_offset_for_camera, VisionPacket, VisionPipeline};
pub use wire::{BallState, DetectionFrame, RobotState, SimulatorState, WrapperPacket};

/// Length factor applied when crossing into the physics engine; the solver
/// behaves poorly at centimeter scale.
pub const SIMULATOR_SCALE: f32 = 10.0;

/// Physics substep size in seconds.
pub const SUB_TIMESTEP: f32 = 1.0 / 200.0;

/// Substep cap per tick; time beyond it is dropped.
pub const MAX_SUBSTEPS: usize = 10;

/// Ball radius in meters.
pub const BALL_RADIUS: f32 = 0.0215;

/// Ball mass in kilograms.
pub const BALL_MASS: f32 = 0.046;

// Restitution and friction between robots, ball and floor come from
// empirical measurements: ball/floor restitution sqrt(h'/h) = 0.56,
// ball/robot 0.60, sliding friction ball/floor 0.35, ball/robot 0.22.
// Factored per surface with the ball at 1, leaving floor 0.56/0.35 and
// robot 0.60/0.22.
const FLOOR_MATERIAL: Material = Material {
    restitution: 0.56,
    friction: 0.35,
};

/// Dynamics world with the standard gravity and floor material, lengths
/// premultiplied by [`SIMULATOR_SCALE`].
#[must_use]
pub fn world_with_defaults() -> DynamicsWorld {
    DynamicsWorld::new(Vec3::new(0.0, 0.0, -9.81 * SIMULATOR_SCALE), FLOOR_MATERIAL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_world_pulls_bodies_down() {
        let world = world_with_defaults();
        assert!(world.gravity().z < 0.0);
        assert_eq!(world.body_count(), 0);
    }

    #[test]
    fn scale_constants_are_consistent() {
        assert!(BALL_RADIUS * SIMULATOR_SCALE > 0.1);
        assert!(SUB_TIMESTEP > 0.0);
        assert!(MAX_SUBSTEPS > 0);
    }
}
