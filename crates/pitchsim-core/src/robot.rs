//! A single simulated robot: rigid body, velocity control, dribbler and
//! kicker, flipped detection, teleportation, and detection emission.

use glam::{Vec2, Vec3};
use pitchsim_physics::{BodyError, BodyHandle, DynamicsWorld, Material, RigidBodyDesc, Shape};

use crate::ball::SimBall;
use crate::control::{KickStyle, RadioResponse, RobotCommand, RobotSpecs, TeleportRobot};
use crate::rng::SimRng;
use crate::transform::to_vision;
use crate::wire::{DetectionRobot, RobotState};
use crate::{BALL_RADIUS, SIMULATOR_SCALE};

const ROBOT_MATERIAL: Material = Material {
    restitution: 0.6,
    friction: 0.22,
};

/// Longitudinal reach of the dribbler zone in front of the contact line.
const DRIBBLER_REACH: f32 = 0.03;

/// Pull applied to the ball per substep in imperfect dribble mode.
const DRIBBLE_PULL_GAIN: f32 = 8.0;

/// Team-map entry: the live robot plus the generation tag it was built
/// from.
#[derive(Debug)]
pub struct RobotSlot {
    pub robot: SimRobot,
    pub generation: u32,
}

/// One robot instance owned by a team map.
#[derive(Debug)]
pub struct SimRobot {
    specs: RobotSpecs,
    body: BodyHandle,
    command: RobotCommand,
    charged: bool,
    dribble_perfect: bool,
    dribbling: bool,
    last_send_time: i64,
    pending_teleport: Option<TeleportRobot>,
}

impl SimRobot {
    /// Create a robot standing at `(x, y)` meters facing `yaw`.
    pub fn new(
        world: &mut DynamicsWorld,
        specs: RobotSpecs,
        position: Vec2,
        yaw: f32,
    ) -> Result<Self, BodyError> {
        let half_extents =
            Vec3::new(specs.radius, specs.radius, specs.height / 2.0) * SIMULATOR_SCALE;
        let body = world.add_body(
            RigidBodyDesc::new(Shape::Cuboid { half_extents }, specs.mass)
                .with_material(ROBOT_MATERIAL)
                .with_position(
                    Vec3::new(position.x, position.y, specs.height / 2.0) * SIMULATOR_SCALE,
                )
                .with_yaw(yaw),
        )?;
        Ok(Self {
            specs,
            body,
            command: RobotCommand::default(),
            charged: false,
            dribble_perfect: false,
            dribbling: false,
            last_send_time: 0,
            pending_teleport: None,
        })
    }

    /// Remove the robot's body from the world.
    pub fn destroy(self, world: &mut DynamicsWorld) {
        world.remove_body(self.body);
    }

    #[must_use]
    pub fn specs(&self) -> &RobotSpecs {
        &self.specs
    }

    /// Position in field meters.
    #[must_use]
    pub fn position(&self, world: &DynamicsWorld) -> Vec3 {
        world
            .body(self.body)
            .map(|body| body.position() / SIMULATOR_SCALE)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn yaw(&self, world: &DynamicsWorld) -> f32 {
        world.body(self.body).map(|body| body.yaw()).unwrap_or(0.0)
    }

    /// True when the body has tipped past upright.
    #[must_use]
    pub fn is_flipped(&self, world: &DynamicsWorld) -> bool {
        world
            .body(self.body)
            .map(|body| body.up().z < 0.0)
            .unwrap_or(false)
    }

    #[must_use]
    pub fn last_send_time(&self) -> i64 {
        self.last_send_time
    }

    /// Switch between rigid-hold and frictional dribbling.
    pub fn set_dribble_mode(&mut self, perfect: bool) {
        if self.dribble_perfect != perfect {
            self.dribbling = false;
        }
        self.dribble_perfect = perfect;
    }

    /// Release the ball regardless of dribbler state.
    pub fn stop_dribbling(&mut self) {
        self.dribbling = false;
    }

    #[must_use]
    pub fn is_dribbling(&self) -> bool {
        self.dribbling
    }

    /// Store the latest radio command and fabricate the synchronous
    /// response. The caller stamps time and team color.
    pub fn set_command(
        &mut self,
        command: &RobotCommand,
        ball: &SimBall,
        world: &DynamicsWorld,
        charge: bool,
    ) -> RadioResponse {
        self.command = *command;
        self.charged = charge;
        if command.dribbler_speed.unwrap_or(0.0) <= 0.0 {
            self.dribbling = false;
        }
        RadioResponse {
            time: 0,
            is_blue: false,
            id: self.specs.id,
            generation: self.specs.generation,
            ball_detected: self.ball_in_dribbler_zone(world, ball),
            cap_charged: charge,
        }
    }

    /// Queue a teleport; it applies at the next substep boundary.
    pub fn teleport(&mut self, teleport: &TeleportRobot) {
        self.pending_teleport = Some(*teleport);
    }

    /// Ground-truth state in field meters.
    #[must_use]
    pub fn write_state(&self, world: &DynamicsWorld) -> RobotState {
        let (position, yaw, velocity, omega) = world
            .body(self.body)
            .map(|body| {
                (
                    body.position() / SIMULATOR_SCALE,
                    body.yaw(),
                    body.linear_velocity() / SIMULATOR_SCALE,
                    body.angular_velocity().z,
                )
            })
            .unwrap_or_default();
        RobotState {
            id: self.specs.id,
            p_x: position.x,
            p_y: position.y,
            angle: yaw,
            v_x: velocity.x,
            v_y: velocity.y,
            omega,
        }
    }

    /// Restore a previously captured state.
    pub fn restore_state(&mut self, state: &RobotState, world: &mut DynamicsWorld) {
        self.pending_teleport = None;
        let height = self.specs.height;
        if let Some(body) = world.body_mut(self.body) {
            body.set_position(Vec3::new(state.p_x, state.p_y, height / 2.0) * SIMULATOR_SCALE);
            body.set_yaw(state.angle);
            body.set_linear_velocity(Vec3::new(state.v_x, state.v_y, 0.0) * SIMULATOR_SCALE);
            body.set_angular_velocity(Vec3::new(0.0, 0.0, state.omega));
            body.set_up(Vec3::Z);
        }
    }

    /// Apply queued mutations and drive the body towards its command.
    /// Runs inside the physics tick callback only.
    pub fn begin(&mut self, world: &mut DynamicsWorld, ball: &mut SimBall, time_step: f32) {
        self.apply_pending_teleport(world);
        self.drive(world, time_step);
        self.run_dribbler_and_kicker(world, ball);
    }

    fn apply_pending_teleport(&mut self, world: &mut DynamicsWorld) {
        let Some(teleport) = self.pending_teleport.take() else {
            return;
        };
        let height = self.specs.height;
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
        position.z = height / 2.0;
        body.set_position(position * SIMULATOR_SCALE);
        if let Some(orientation) = teleport.orientation {
            body.set_yaw(orientation);
        }
        let mut velocity = body.linear_velocity() / SIMULATOR_SCALE;
        if let Some(v_x) = teleport.v_x {
            velocity.x = v_x;
        }
        if let Some(v_y) = teleport.v_y {
            velocity.y = v_y;
        }
        velocity.z = 0.0;
        body.set_linear_velocity(velocity * SIMULATOR_SCALE);
        let omega = teleport.v_angular.unwrap_or(0.0);
        body.set_angular_velocity(Vec3::new(0.0, 0.0, omega));
        body.set_up(Vec3::Z);
    }

    /// Proportional velocity controller bounded by the spec's kinematic
    /// limits.
    fn drive(&mut self, world: &mut DynamicsWorld, time_step: f32) {
        if time_step <= 0.0 {
            return;
        }
        let Some(body) = world.body_mut(self.body) else {
            return;
        };
        let setpoint = self.command.move_command.unwrap_or_default();
        let speed = Vec2::new(setpoint.forward, setpoint.left);
        let clamped = if speed.length() > self.specs.v_max {
            speed * (self.specs.v_max / speed.length())
        } else {
            speed
        };
        let (sin, cos) = body.yaw().sin_cos();
        let target_world = Vec2::new(
            cos * clamped.x - sin * clamped.y,
            sin * clamped.x + cos * clamped.y,
        ) * SIMULATOR_SCALE;
        let current = body.linear_velocity();
        let mut accel = (target_world - Vec2::new(current.x, current.y)) / time_step;
        let accel_limit = self.specs.a_max * SIMULATOR_SCALE;
        if accel.length() > accel_limit {
            accel = accel * (accel_limit / accel.length());
        }
        body.apply_central_force(Vec3::new(accel.x, accel.y, 0.0) * body.mass());

        let target_omega = setpoint
            .angular
            .clamp(-self.specs.omega_max, self.specs.omega_max);
        let torque = (target_omega - body.angular_velocity().z) / time_step * body.mass();
        body.apply_torque_z(torque);
    }

    fn run_dribbler_and_kicker(&mut self, world: &mut DynamicsWorld, ball: &mut SimBall) {
        let in_zone = self.ball_in_dribbler_zone(world, ball);

        let kick_speed = self.command.kick_speed.unwrap_or(0.0);
        if kick_speed > 0.0 && self.charged && in_zone {
            let yaw = self.yaw(world);
            let facing = Vec2::from_angle(yaw);
            let velocity = match self.command.kick_style {
                KickStyle::Flat => {
                    let speed = kick_speed.min(self.specs.shot_linear_max);
                    Vec3::new(facing.x * speed, facing.y * speed, 0.0)
                }
                KickStyle::Chip => {
                    // Fixed 45 degree chip: speed splits evenly between the
                    // ground plane and z.
                    let speed = kick_speed.min(self.specs.shot_chip_max);
                    let component = speed * std::f32::consts::FRAC_1_SQRT_2;
                    Vec3::new(facing.x * component, facing.y * component, component)
                }
            };
            self.dribbling = false;
            ball.set_velocity(world, velocity);
            return;
        }

        let dribbler_speed = self.command.dribbler_speed.unwrap_or(0.0);
        if dribbler_speed <= 0.0 {
            self.dribbling = false;
            return;
        }
        if !in_zone && !self.dribbling {
            return;
        }
        self.dribbling = true;
        let hold_point = self.dribbler_center(world);
        if self.dribble_perfect {
            // Rigid hold: the ball tracks the dribbler contact point.
            let robot_velocity = world
                .body(self.body)
                .map(|body| body.linear_velocity() / SIMULATOR_SCALE)
                .unwrap_or_default();
            ball.set_position(world, Vec3::new(hold_point.x, hold_point.y, BALL_RADIUS));
            ball.set_velocity(
                world,
                Vec3::new(robot_velocity.x, robot_velocity.y, 0.0),
            );
        } else {
            // Frictional contact: pull the ball towards the bar.
            let ball_position = ball.position(world);
            let delta = Vec2::new(hold_point.x - ball_position.x, hold_point.y - ball_position.y);
            if delta.length() > self.specs.radius + BALL_RADIUS {
                self.dribbling = false;
                return;
            }
            let ball_velocity = ball.velocity(world);
            ball.set_velocity(
                world,
                Vec3::new(
                    ball_velocity.x + delta.x * DRIBBLE_PULL_GAIN * 0.005,
                    ball_velocity.y + delta.y * DRIBBLE_PULL_GAIN * 0.005,
                    ball_velocity.z,
                ),
            );
        }
    }

    /// Center of the dribbler contact line in field meters.
    #[must_use]
    pub fn dribbler_center(&self, world: &DynamicsWorld) -> Vec3 {
        let position = self.position(world);
        let facing = Vec2::from_angle(self.yaw(world));
        Vec3::new(
            position.x + facing.x * self.specs.shoot_radius,
            position.y + facing.y * self.specs.shoot_radius,
            BALL_RADIUS,
        )
    }

    /// World position of a dribbler corner; `right` selects the side seen
    /// from behind the robot.
    #[must_use]
    pub fn dribbler_corner(&self, world: &DynamicsWorld, right: bool) -> Vec3 {
        let center = self.dribbler_center(world);
        let facing = Vec2::from_angle(self.yaw(world));
        let side = Vec2::new(facing.y, -facing.x) * if right { 1.0 } else { -1.0 };
        let half_width = self.specs.dribbler_width / 2.0;
        Vec3::new(
            center.x + side.x * half_width,
            center.y + side.y * half_width,
            center.z,
        )
    }

    #[must_use]
    pub fn ball_in_dribbler_zone(&self, world: &DynamicsWorld, ball: &SimBall) -> bool {
        let ball_position = ball.position(world);
        if ball_position.z > self.specs.height {
            return false;
        }
        let center = self.dribbler_center(world);
        let facing = Vec2::from_angle(self.yaw(world));
        let delta = Vec2::new(ball_position.x - center.x, ball_position.y - center.y);
        let forward = delta.dot(facing);
        let lateral = delta.dot(Vec2::new(-facing.y, facing.x)).abs();
        forward >= -BALL_RADIUS
            && forward <= DRIBBLER_REACH + BALL_RADIUS
            && lateral <= self.specs.dribbler_width / 2.0 + BALL_RADIUS
    }

    /// Project the robot into one camera, appending a detection and
    /// recording the send time.
    #[allow(clippy::too_many_arguments)]
    pub fn update_detection(
        &mut self,
        world: &DynamicsWorld,
        rng: &mut SimRng,
        stddev_p: f32,
        stddev_phi: f32,
        time: i64,
        position_offset: Vec3,
        out: &mut Vec<DetectionRobot>,
    ) {
        let position = self.position(world);
        let x = rng.normal(position.x, stddev_p) + position_offset.x;
        let y = rng.normal(position.y, stddev_p) + position_offset.y;
        let orientation = rng.normal(self.yaw(world), stddev_phi);
        out.push(DetectionRobot {
            confidence: 1.0,
            robot_id: self.specs.id,
            x: to_vision(x),
            y: to_vision(y),
            orientation,
            pixel_x: to_vision(x) / 10.0,
            pixel_y: to_vision(y) / 10.0,
            height: self.specs.height,
        });
        self.last_send_time = time;
    }
}
