//! Outbound vision payloads: per-camera detection frames, wrapper packets
//! with geometry, and the ground-truth simulator state.
//!
//! Downstream consumers receive these as opaque byte blobs; `encode` is the
//! single place that turns a payload into bytes. Detection coordinates are
//! vision millimeters, ground truth stays in field meters.

use serde::{Deserialize, Serialize};

use crate::geometry::{CameraCalibration, FieldGeometry};
use crate::transform::to_vision;

/// One detected ball inside a camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionBall {
    pub confidence: f32,
    pub area: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub pixel_x: f32,
    pub pixel_y: f32,
}

/// One detected robot inside a camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionRobot {
    pub confidence: f32,
    pub robot_id: u32,
    pub x: f32,
    pub y: f32,
    pub orientation: f32,
    pub pixel_x: f32,
    pub pixel_y: f32,
    pub height: f32,
}

/// Per-camera detection frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionFrame {
    pub frame_number: u32,
    pub camera_id: u32,
    /// Capture timestamp in seconds.
    pub t_capture: f64,
    /// Send timestamp in seconds.
    pub t_sent: f64,
    pub balls: Vec<DetectionBall>,
    pub robots_blue: Vec<DetectionRobot>,
    pub robots_yellow: Vec<DetectionRobot>,
}

/// Rolling/sliding ball model constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallModelStraightTwoPhase {
    pub acc_roll: f64,
    pub acc_slide: f64,
    pub k_switch: f64,
}

/// Chip-kick ball model constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallModelChipFixedLoss {
    pub damping_z: f64,
    pub damping_xy_first_hop: f64,
    pub damping_xy_other_hops: f64,
}

/// Ball model constants advertised with the geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallModels {
    pub straight_two_phase: BallModelStraightTwoPhase,
    pub chip_fixed_loss: BallModelChipFixedLoss,
}

impl Default for BallModels {
    fn default() -> Self {
        Self {
            straight_two_phase: BallModelStraightTwoPhase {
                acc_roll: -0.35,
                acc_slide: -3.9,
                k_switch: 0.69,
            },
            chip_fixed_loss: BallModelChipFixedLoss {
                damping_z: 0.566,
                damping_xy_first_hop: 0.715,
                damping_xy_other_hops: 1.0,
            },
        }
    }
}

/// Field dimensions in vision millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometryFieldSize {
    pub field_length: f32,
    pub field_width: f32,
    pub goal_width: f32,
    pub goal_depth: f32,
    pub boundary_width: f32,
    pub penalty_area_width: f32,
    pub penalty_area_depth: f32,
}

impl From<&FieldGeometry> for GeometryFieldSize {
    fn from(geometry: &FieldGeometry) -> Self {
        Self {
            field_length: to_vision(geometry.field_height),
            field_width: to_vision(geometry.field_width),
            goal_width: to_vision(geometry.goal_width),
            goal_depth: to_vision(geometry.goal_depth),
            boundary_width: to_vision(geometry.boundary_width),
            penalty_area_width: to_vision(geometry.penalty_area_width),
            penalty_area_depth: to_vision(geometry.penalty_area_depth),
        }
    }
}

/// Geometry payload carried by the first wrapper packet of every emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryData {
    pub field: GeometryFieldSize,
    pub calib: Vec<CameraCalibration>,
    pub models: BallModels,
}

/// One serialized unit handed to vision consumers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WrapperPacket {
    pub detection: Option<DetectionFrame>,
    pub geometry: Option<GeometryData>,
}

/// Ground-truth ball state in field meters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BallState {
    pub p_x: f32,
    pub p_y: f32,
    pub p_z: f32,
    pub v_x: f32,
    pub v_y: f32,
    pub v_z: f32,
    pub angular_x: f32,
    pub angular_y: f32,
    pub angular_z: f32,
}

/// Ground-truth robot state in field meters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotState {
    pub id: u32,
    pub p_x: f32,
    pub p_y: f32,
    pub angle: f32,
    pub v_x: f32,
    pub v_y: f32,
    pub omega: f32,
}

/// Ground-truth simulator state emitted alongside every vision packet and
/// accepted back through set-state commands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulatorState {
    /// Simulated time in nanoseconds.
    pub time: i64,
    pub ball: Option<BallState>,
    pub blue_robots: Vec<RobotState>,
    pub yellow_robots: Vec<RobotState>,
}

/// Serialize a payload into its wire blob. A failed encode yields an empty
/// slice; slots are never skipped.
#[must_use]
pub fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_field_size_converts_to_millimeters() {
        let geometry = FieldGeometry::default();
        let size = GeometryFieldSize::from(&geometry);
        assert_eq!(size.field_length, 12_000.0);
        assert_eq!(size.field_width, 9_000.0);
        assert_eq!(size.goal_width, 1_800.0);
    }

    #[test]
    fn ball_model_constants_match_the_advertised_values() {
        let models = BallModels::default();
        assert_eq!(models.straight_two_phase.acc_roll, -0.35);
        assert_eq!(models.straight_two_phase.acc_slide, -3.9);
        assert_eq!(models.straight_two_phase.k_switch, 0.69);
        assert_eq!(models.chip_fixed_loss.damping_z, 0.566);
        assert_eq!(models.chip_fixed_loss.damping_xy_first_hop, 0.715);
        assert_eq!(models.chip_fixed_loss.damping_xy_other_hops, 1.0);
    }

    #[test]
    fn wrapper_packet_encodes_and_decodes() {
        let packet = WrapperPacket {
            detection: Some(DetectionFrame {
                frame_number: 3,
                camera_id: 1,
                t_capture: 1.5,
                t_sent: 1.535,
                ..DetectionFrame::default()
            }),
            geometry: None,
        };
        let bytes = encode(&packet);
        assert!(!bytes.is_empty());
        let decoded: WrapperPacket = serde_json::from_slice(&bytes).expect("decode");
        assert_eq!(decoded, packet);
    }
}
