//! The match ball: rigid body, teleportation, and per-camera detection
//! emission with the occlusion and noise model.

use glam::{Vec2, Vec3};
use pitchsim_physics::{BodyError, BodyHandle, DynamicsWorld, Material, RigidBodyDesc, Shape};

use crate::control::TeleportBall;
use crate::rng::SimRng;
use crate::transform::to_vision;
use crate::wire::{BallState, DetectionBall};
use crate::{BALL_MASS, BALL_RADIUS, SIMULATOR_SCALE};

/// Reported blob area of an unobstructed ball, in camera pixels.
const BASE_AREA: f32 = 86.0;

const BALL_MATERIAL: Material = Material {
    restitution: 1.0,
    friction: 1.0,
};

/// Inputs for projecting the ball into one camera.
#[derive(Debug, Clone, Copy)]
pub struct BallDetectionParams {
    pub stddev_p: f32,
    pub stddev_area: f32,
    /// True camera position in field meters.
    pub camera: Vec3,
    pub enable_invisible: bool,
    pub visibility_threshold: f32,
    /// Systematic position bias in field meters.
    pub position_offset: Vec3,
}

/// Cylinder blocking the camera's view of the ball.
#[derive(Debug, Clone, Copy)]
pub struct Occluder {
    pub position: Vec3,
    pub radius: f32,
    pub height: f32,
}

/// The ball rigid body plus its pending teleport.
#[derive(Debug)]
pub struct SimBall {
    body: BodyHandle,
    pending_teleport: Option<TeleportBall>,
}

impl SimBall {
    /// Create the ball at the center spot.
    pub fn new(world: &mut DynamicsWorld) -> Result<Self, BodyError> {
        let body = world.add_body(
            RigidBodyDesc::new(
                Shape::Sphere {
                    radius: BALL_RADIUS * SIMULATOR_SCALE,
                },
                BALL_MASS,
            )
            .with_material(BALL_MATERIAL)
            .with_position(Vec3::new(0.0, 0.0, BALL_RADIUS * SIMULATOR_SCALE)),
        )?;
        Ok(Self {
            body,
            pending_teleport: None,
        })
    }

    /// Remove the ball's body from the world.
    pub fn destroy(self, world: &mut DynamicsWorld) {
        world.remove_body(self.body);
    }

    /// Position in field meters.
    #[must_use]
    pub fn position(&self, world: &DynamicsWorld) -> Vec3 {
        world
            .body(self.body)
            .map(|body| body.position() / SIMULATOR_SCALE)
            .unwrap_or_default()
    }

    /// Velocity in m/s.
    #[must_use]
    pub fn velocity(&self, world: &DynamicsWorld) -> Vec3 {
        world
            .body(self.body)
            .map(|body| body.linear_velocity() / SIMULATOR_SCALE)
            .unwrap_or_default()
    }

    pub fn set_velocity(&self, world: &mut DynamicsWorld, velocity_m: Vec3) {
        if let Some(body) = world.body_mut(self.body) {
            body.set_linear_velocity(velocity_m * SIMULATOR_SCALE);
        }
    }

    pub fn set_position(&self, world: &mut DynamicsWorld, position_m: Vec3) {
        if let Some(body) = world.body_mut(self.body) {
            body.set_position(position_m * SIMULATOR_SCALE);
        }
    }

    /// True when physics state left the legal range and the ball must be
    /// rebuilt at the next tick boundary.
    #[must_use]
    pub fn is_invalid(&self, world: &DynamicsWorld) -> bool {
        match world.body(self.body) {
            Some(body) => {
                body.is_degenerate() || body.position().z < -BALL_RADIUS * SIMULATOR_SCALE
            }
            None => true,
        }
    }

    /// Queue a teleport; it applies at the next substep boundary.
    pub fn teleport(&mut self, teleport: &TeleportBall) {
        self.pending_teleport = Some(*teleport);
    }

    /// Apply queued mutations. Runs inside the physics tick callback only.
    pub fn begin(&mut self, world: &mut DynamicsWorld) {
        let Some(teleport) = self.pending_teleport.take() else {
            return;
        };
        let Some(body) = world.body_mut(self.body) else {
            return;
        };
        let mut position = body.position() / SIMULATOR_SCALE;
        if let Some(x) = teleport.x {
            position.x = x;
        }
        if let Some(y) = teleport.y {
            position.y = y;
        }
        if teleport.x.is_some() || teleport.y.is_some() || teleport.z.is_some() {
            // A repositioned ball lands on the floor unless a height is given.
            position.z = teleport.z.unwrap_or(BALL_RADIUS);
        }
        let mut velocity = body.linear_velocity() / SIMULATOR_SCALE;
        if let Some(vx) = teleport.vx {
            velocity.x = vx;
        }
        if let Some(vy) = teleport.vy {
            velocity.y = vy;
        }
        if let Some(vz) = teleport.vz {
            velocity.z = vz;
        }
        body.set_position(position * SIMULATOR_SCALE);
        body.set_linear_velocity(velocity * SIMULATOR_SCALE);
        body.set_angular_velocity(Vec3::ZERO);
    }

    /// Ground-truth state in field meters.
    #[must_use]
    pub fn write_state(&self, world: &DynamicsWorld) -> BallState {
        let (position, velocity, angular) = world
            .body(self.body)
            .map(|body| {
                (
                    body.position() / SIMULATOR_SCALE,
                    body.linear_velocity() / SIMULATOR_SCALE,
                    body.angular_velocity(),
                )
            })
            .unwrap_or_default();
        BallState {
            p_x: position.x,
            p_y: position.y,
            p_z: position.z,
            v_x: velocity.x,
            v_y: velocity.y,
            v_z: velocity.z,
            angular_x: angular.x,
            angular_y: angular.y,
            angular_z: angular.z,
        }
    }

    /// Restore a previously captured state.
    pub fn restore_state(&mut self, state: &BallState, world: &mut DynamicsWorld) {
        self.pending_teleport = None;
        if let Some(body) = world.body_mut(self.body) {
            body.set_position(Vec3::new(state.p_x, state.p_y, state.p_z) * SIMULATOR_SCALE);
            body.set_linear_velocity(Vec3::new(state.v_x, state.v_y, state.v_z) * SIMULATOR_SCALE);
            body.set_angular_velocity(Vec3::new(
                state.angular_x,
                state.angular_y,
                state.angular_z,
            ));
        }
    }

    /// Project the ball into one camera, appending a detection on success.
    ///
    /// Returns false when the ball is occluded below the visibility threshold
    /// or cannot be projected; in that case nothing is appended and the
    /// caller strips the frame.
    pub fn update_detection(
        &self,
        world: &DynamicsWorld,
        rng: &mut SimRng,
        params: &BallDetectionParams,
        occluders: &[Occluder],
        out: &mut Vec<DetectionBall>,
    ) -> bool {
        let position = self.position(world);
        let visibility = visibility_fraction(position, params.camera, occluders);
        if params.enable_invisible && visibility < params.visibility_threshold {
            return false;
        }
        emit_detection(rng, position, visibility, params, out)
    }

    /// Append a detection at an arbitrary position (used for the false ball
    /// at a dribbler corner). Occlusion is not evaluated.
    pub fn add_detection_at(
        &self,
        rng: &mut SimRng,
        position_m: Vec3,
        params: &BallDetectionParams,
        out: &mut Vec<DetectionBall>,
    ) -> bool {
        emit_detection(rng, position_m, 1.0, params, out)
    }
}

/// Fraction of the ball left visible after cylinder occluders cut the
/// camera ray.
fn visibility_fraction(ball: Vec3, camera: Vec3, occluders: &[Occluder]) -> f32 {
    let mut fraction = 1.0f32;
    let seg = Vec2::new(ball.x - camera.x, ball.y - camera.y);
    let seg_len_sq = seg.length_squared();
    for occluder in occluders {
        let to_occluder = Vec2::new(occluder.position.x - camera.x, occluder.position.y - camera.y);
        let t = if seg_len_sq > 1e-9 {
            (to_occluder.dot(seg) / seg_len_sq).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let closest = camera.truncate() + seg * t;
        let lateral = (Vec2::new(occluder.position.x, occluder.position.y) - closest).length();
        if lateral >= occluder.radius + BALL_RADIUS {
            continue;
        }
        // Height of the camera ray where it passes the occluder.
        let ray_height = camera.z + (ball.z - camera.z) * t;
        if ray_height > occluder.height {
            continue;
        }
        let covered = ((occluder.radius + BALL_RADIUS - lateral) / (2.0 * BALL_RADIUS))
            .clamp(0.0, 1.0);
        fraction = fraction.min(1.0 - covered);
    }
    fraction
}

fn emit_detection(
    rng: &mut SimRng,
    position: Vec3,
    visibility: f32,
    params: &BallDetectionParams,
    out: &mut Vec<DetectionBall>,
) -> bool {
    // A camera at or below the ball cannot project it onto the floor.
    if params.camera.z <= position.z {
        return false;
    }
    let scale = params.camera.z / (params.camera.z - position.z);
    let ground = Vec2::new(
        params.camera.x + (position.x - params.camera.x) * scale,
        params.camera.y + (position.y - params.camera.y) * scale,
    );
    let noisy_x = rng.normal(ground.x, params.stddev_p) + params.position_offset.x;
    let noisy_y = rng.normal(ground.y, params.stddev_p) + params.position_offset.y;
    let area = rng.normal(BASE_AREA, params.stddev_area).max(0.0);
    out.push(DetectionBall {
        confidence: visibility.clamp(0.0, 1.0),
        area,
        x: to_vision(noisy_x),
        y: to_vision(noisy_y),
        z: to_vision(position.z),
        pixel_x: to_vision(noisy_x) / 10.0,
        pixel_y: to_vision(noisy_y) / 10.0,
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world_with_defaults;

    fn params(camera: Vec3) -> BallDetectionParams {
        BallDetectionParams {
            stddev_p: 0.0,
            stddev_area: 0.0,
            camera,
            enable_invisible: true,
            visibility_threshold: 0.4,
            position_offset: Vec3::ZERO,
        }
    }

    #[test]
    fn new_ball_rests_on_the_floor() {
        let mut world = world_with_defaults();
        let ball = SimBall::new(&mut world).expect("ball");
        let position = ball.position(&world);
        assert!((position.z - BALL_RADIUS).abs() < 1e-6);
        assert!(!ball.is_invalid(&world));
    }

    #[test]
    fn teleport_applies_at_begin() {
        let mut world = world_with_defaults();
        let mut ball = SimBall::new(&mut world).expect("ball");
        ball.teleport(&TeleportBall {
            x: Some(1.0),
            y: Some(-2.0),
            vx: Some(0.5),
            vy: Some(0.0),
            ..TeleportBall::default()
        });
        // Nothing moves until the tick boundary.
        assert_eq!(ball.position(&world).x, 0.0);
        ball.begin(&mut world);
        let position = ball.position(&world);
        assert!((position.x - 1.0).abs() < 1e-6);
        assert!((position.y + 2.0).abs() < 1e-6);
        assert!((ball.velocity(&world).x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn state_round_trips_through_restore() {
        let mut world = world_with_defaults();
        let mut ball = SimBall::new(&mut world).expect("ball");
        let state = BallState {
            p_x: 2.0,
            p_y: -1.0,
            p_z: 0.5,
            v_x: 1.0,
            v_y: 0.0,
            v_z: -0.2,
            ..BallState::default()
        };
        ball.restore_state(&state, &mut world);
        let written = ball.write_state(&world);
        assert!((written.p_x - 2.0).abs() < 1e-6);
        assert!((written.v_z + 0.2).abs() < 1e-6);
    }

    #[test]
    fn unobstructed_ball_is_detected() {
        let mut world = world_with_defaults();
        let ball = SimBall::new(&mut world).expect("ball");
        let mut rng = SimRng::new(0);
        let mut out = Vec::new();
        let visible = ball.update_detection(
            &world,
            &mut rng,
            &params(Vec3::new(0.0, 0.0, 4.0)),
            &[],
            &mut out,
        );
        assert!(visible);
        assert_eq!(out.len(), 1);
        assert!(out[0].x.abs() < 1.0, "ball sits at the origin in mm");
    }

    #[test]
    fn occluder_on_the_ray_hides_the_ball() {
        let mut world = world_with_defaults();
        let ball = SimBall::new(&mut world).expect("ball");
        let mut rng = SimRng::new(0);
        let mut out = Vec::new();
        // Camera looks from (2, 0, 3); a robot body sits on the ray.
        let occluder = Occluder {
            position: Vec3::new(1.0, 0.0, 0.075),
            radius: 0.09,
            height: 0.15,
        };
        let visible = ball.update_detection(
            &world,
            &mut rng,
            &params(Vec3::new(2.0, 0.0, 0.1)),
            &[occluder],
            &mut out,
        );
        assert!(!visible);
        assert!(out.is_empty());
    }

    #[test]
    fn flying_ball_projects_away_from_the_camera() {
        let mut world = world_with_defaults();
        let mut ball = SimBall::new(&mut world).expect("ball");
        ball.teleport(&TeleportBall {
            x: Some(1.0),
            y: Some(0.0),
            z: Some(0.5),
            ..TeleportBall::default()
        });
        ball.begin(&mut world);
        let mut rng = SimRng::new(0);
        let mut out = Vec::new();
        let camera = Vec3::new(0.0, 0.0, 4.0);
        assert!(ball.update_detection(&world, &mut rng, &params(camera), &[], &mut out));
        // Projection onto the floor moves the reported position past the true x.
        assert!(out[0].x > 1_000.0);
    }

    #[test]
    fn noise_is_seed_deterministic() {
        let mut world = world_with_defaults();
        let ball = SimBall::new(&mut world).expect("ball");
        let mut detection_params = params(Vec3::new(1.0, 1.0, 4.0));
        detection_params.stddev_p = 0.01;
        detection_params.stddev_area = 3.0;
        let mut first = Vec::new();
        let mut second = Vec::new();
        let mut rng = SimRng::new(99);
        ball.update_detection(&world, &mut rng, &detection_params, &[], &mut first);
        let mut rng = SimRng::new(99);
        ball.update_detection(&world, &mut rng, &detection_params, &[], &mut second);
        assert_eq!(first, second);
    }
}
