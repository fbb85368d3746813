//! Inbound control messages: simulator commands, realism configuration,
//! teleports, radio control, and team definitions.
//!
//! Every field that may be absent on the wire is an `Option`; absent fields
//! leave the corresponding simulator state untouched. Positions and speeds
//! are field meters, durations nanoseconds unless noted.

use serde::{Deserialize, Serialize};

/// Addressed team color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Team {
    Blue,
    Yellow,
}

/// Robot address: team color plus the per-color unique id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotId {
    pub team: Team,
    pub id: u32,
}

/// Immutable per-robot build description.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RobotSpecs {
    pub id: u32,
    pub generation: u32,
    /// Body radius in meters.
    pub radius: f32,
    pub height: f32,
    pub mass: f32,
    /// Width of the dribbler bar in meters.
    pub dribbler_width: f32,
    /// Distance from the body center to the dribbler contact line.
    pub shoot_radius: f32,
    /// Linear speed limit in m/s.
    pub v_max: f32,
    /// Angular speed limit in rad/s.
    pub omega_max: f32,
    /// Linear kick speed ceiling in m/s.
    pub shot_linear_max: f32,
    /// Chip kick speed ceiling in m/s.
    pub shot_chip_max: f32,
    /// Linear acceleration limit in m/s^2.
    pub a_max: f32,
}

impl RobotSpecs {
    /// Conventional mid-size robot with the given id.
    #[must_use]
    pub fn standard(id: u32) -> Self {
        Self {
            id,
            generation: 3,
            radius: 0.09,
            height: 0.15,
            mass: 2.5,
            dribbler_width: 0.07,
            shoot_radius: 0.067,
            v_max: 3.5,
            omega_max: 10.0,
            shot_linear_max: 6.5,
            shot_chip_max: 3.0,
            a_max: 3.0,
        }
    }
}

/// Ordered team definition applied by team setup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamSpec {
    pub robots: Vec<RobotSpecs>,
}

/// Requested kick style for a radio command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KickStyle {
    #[default]
    Flat,
    Chip,
}

/// Velocity setpoint in the robot's local frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LocalVelocity {
    pub forward: f32,
    pub left: f32,
    pub angular: f32,
}

/// One robot's radio command.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RobotCommand {
    pub id: u32,
    pub move_command: Option<LocalVelocity>,
    /// Kick speed in m/s; zero or absent disarms.
    pub kick_speed: Option<f32>,
    pub kick_style: KickStyle,
    /// Dribbler surface speed; zero or absent stops the bar.
    pub dribbler_speed: Option<f32>,
}

/// Batch of radio commands for one team, as handed to the radio queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotControl {
    pub robot_commands: Vec<RobotCommand>,
}

/// Synchronous feedback fabricated by a robot that received its command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadioResponse {
    /// Simulated time of delivery in nanoseconds.
    pub time: i64,
    pub is_blue: bool,
    pub id: u32,
    pub generation: u32,
    /// Dribbler barrier sees the ball.
    pub ball_detected: bool,
    pub cap_charged: bool,
}

/// Ball teleport request. Coordinates honor the global flip before applying.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TeleportBall {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub z: Option<f32>,
    pub vx: Option<f32>,
    pub vy: Option<f32>,
    pub vz: Option<f32>,
    /// Move the raw body without touching dribblers.
    pub by_force: Option<bool>,
    /// Clear space at the target before moving (requires both x and y).
    pub teleport_safely: Option<bool>,
}

/// Robot teleport / presence request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeleportRobot {
    pub id: RobotId,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub orientation: Option<f32>,
    pub v_x: Option<f32>,
    pub v_y: Option<f32>,
    pub v_angular: Option<f32>,
    /// Desired membership; absent leaves presence unchanged.
    pub present: Option<bool>,
    pub by_force: Option<bool>,
}

impl TeleportRobot {
    #[must_use]
    pub fn new(id: RobotId) -> Self {
        Self {
            id,
            x: None,
            y: None,
            orientation: None,
            v_x: None,
            v_y: None,
            v_angular: None,
            present: None,
            by_force: None,
        }
    }
}

/// Grouped teleport requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SslControl {
    pub teleport_ball: Option<TeleportBall>,
    pub teleport_robot: Vec<TeleportRobot>,
}

/// Sensor-imperfection knobs, applied incrementally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RealismConfig {
    pub stddev_ball_p: Option<f32>,
    pub stddev_robot_p: Option<f32>,
    pub stddev_robot_phi: Option<f32>,
    pub stddev_ball_area: Option<f32>,
    /// False-ball rate at the dribbler, per robot per second.
    pub dribbler_ball_detections: Option<f32>,
    pub enable_invisible_ball: Option<bool>,
    pub ball_visibility_threshold: Option<f32>,
    /// Manhattan overlap band half-width in meters.
    pub camera_overlap: Option<f32>,
    pub camera_position_error: Option<f32>,
    pub object_position_offset: Option<f32>,
    pub robot_command_loss: Option<f32>,
    pub robot_response_loss: Option<f32>,
    pub missing_ball_detections: Option<f32>,
    pub missing_robot_detections: Option<f32>,
    /// Nanoseconds between assembly and delivery of a vision frame.
    pub vision_delay: Option<i64>,
    pub vision_processing_time: Option<i64>,
    /// When true, dribbling is simulated as frictional contact rather than a
    /// rigid hold.
    pub simulate_dribbling: Option<bool>,
    /// Nanoseconds between radio receive and application.
    pub command_delay: Option<i64>,
}

/// Resolved sensor-imperfection state, updated incrementally from
/// [`RealismConfig`] messages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Realism {
    pub stddev_ball: f32,
    pub stddev_ball_area: f32,
    pub stddev_robot: f32,
    pub stddev_robot_phi: f32,
    pub ball_detections_at_dribbler: f32,
    pub enable_invisible_ball: bool,
    pub ball_visibility_threshold: f32,
    pub camera_overlap: f32,
    pub camera_position_error: f32,
    pub object_position_offset: f32,
    pub robot_command_packet_loss: f32,
    pub robot_reply_packet_loss: f32,
    pub missing_ball_detections: f32,
    pub missing_robot_detections: f32,
    pub dribble_perfect: bool,
    pub command_delay: i64,
}

impl Default for Realism {
    fn default() -> Self {
        Self {
            stddev_ball: 0.0,
            stddev_ball_area: 0.0,
            stddev_robot: 0.0,
            stddev_robot_phi: 0.0,
            ball_detections_at_dribbler: 0.0,
            enable_invisible_ball: true,
            ball_visibility_threshold: 0.4,
            camera_overlap: 0.3,
            camera_position_error: 0.0,
            object_position_offset: 0.0,
            robot_command_packet_loss: 0.0,
            robot_reply_packet_loss: 0.0,
            missing_ball_detections: 0.0,
            missing_robot_detections: 0.0,
            dribble_perfect: false,
            command_delay: 0,
        }
    }
}

impl Realism {
    /// Fold a partial config into the resolved state. Returns true when the
    /// dribble mode changed and must be re-applied to existing robots.
    pub fn apply(&mut self, config: &RealismConfig) -> bool {
        if let Some(value) = config.stddev_ball_p {
            self.stddev_ball = value;
        }
        if let Some(value) = config.stddev_robot_p {
            self.stddev_robot = value;
        }
        if let Some(value) = config.stddev_robot_phi {
            self.stddev_robot_phi = value;
        }
        if let Some(value) = config.stddev_ball_area {
            self.stddev_ball_area = value;
        }
        if let Some(value) = config.dribbler_ball_detections {
            self.ball_detections_at_dribbler = value;
        }
        if let Some(value) = config.enable_invisible_ball {
            self.enable_invisible_ball = value;
        }
        if let Some(value) = config.ball_visibility_threshold {
            self.ball_visibility_threshold = value;
        }
        if let Some(value) = config.camera_overlap {
            self.camera_overlap = value;
        }
        if let Some(value) = config.camera_position_error {
            self.camera_position_error = value;
        }
        if let Some(value) = config.object_position_offset {
            self.object_position_offset = value;
        }
        if let Some(value) = config.robot_command_loss {
            self.robot_command_packet_loss = value;
        }
        if let Some(value) = config.robot_response_loss {
            self.robot_reply_packet_loss = value;
        }
        if let Some(value) = config.missing_ball_detections {
            self.missing_ball_detections = value;
        }
        if let Some(value) = config.missing_robot_detections {
            self.missing_robot_detections = value;
        }
        if let Some(value) = config.command_delay {
            self.command_delay = value;
        }
        let mut dribble_changed = false;
        if let Some(simulate) = config.simulate_dribbling {
            let perfect = !simulate;
            dribble_changed = self.dribble_perfect != perfect;
            self.dribble_perfect = perfect;
        }
        dribble_changed
    }
}

/// Worst-case detection pacing, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VisionWorstCase {
    pub min_ball_detection_time: Option<f32>,
    pub min_robot_detection_time: Option<f32>,
}

/// Simulator-scoped command payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandSimulator {
    pub enable: Option<bool>,
    pub realism_config: Option<RealismConfig>,
    pub ssl_control: Option<SslControl>,
    pub vision_worst_case: Option<VisionWorstCase>,
    pub set_simulator_state: Option<crate::wire::SimulatorState>,
}

/// Transceiver-scoped command payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandTransceiver {
    pub charge: Option<bool>,
}

/// Top-level structured command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub simulator: Option<CommandSimulator>,
    pub transceiver: Option<CommandTransceiver>,
    pub set_team_blue: Option<TeamSpec>,
    pub set_team_yellow: Option<TeamSpec>,
}
