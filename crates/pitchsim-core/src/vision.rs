//! Per-camera vision assembly and delayed delivery.
//!
//! Every emission yields one wrapper packet per camera (even when the frame
//! is empty, since consumers assume a regular cadence) plus one ground-truth
//! state blob. The first wrapper additionally carries geometry and the
//! calibration set, perturbed by the configured camera position error.

use std::collections::{BTreeMap, VecDeque};

use glam::Vec3;
use pitchsim_physics::DynamicsWorld;

use crate::ball::{BallDetectionParams, Occluder, SimBall};
use crate::control::Realism;
use crate::geometry::{CameraCalibration, FieldGeometry};
use crate::rng::SimRng;
use crate::robot::RobotSlot;
use crate::timing::SingleShotQueue;
use crate::transform::to_vision;
use crate::wire::{
    encode, BallModels, DetectionFrame, GeometryData, GeometryFieldSize, SimulatorState,
    WrapperPacket,
};

/// Fixed direction of the systematic calibration offset.
const CAMERA_ERROR_DIRECTION: Vec3 = Vec3::new(0.3, 0.7, 0.05);

/// A fully assembled emission: one encoded wrapper per camera plus the
/// encoded ground truth, and the partial-mode emit time.
#[derive(Debug, Clone)]
pub struct VisionPacket {
    pub frames: Vec<Vec<u8>>,
    pub truth: Vec<u8>,
    pub emit_time: i64,
}

/// True when `p` falls into camera `camera_id`'s region of the
/// nearest-camera-by-Manhattan-distance partition, widened by the overlap
/// band. At least one camera accepts every point.
#[must_use]
pub fn check_camera_id(camera_id: usize, p: Vec3, cameras: &[Vec3], overlap: f32) -> bool {
    let mut min_distance = f32::MAX;
    let mut own_distance = 0.0;
    for (index, camera) in cameras.iter().enumerate() {
        let distance = (camera.x - p.x).abs() + (camera.y - p.y).abs();
        min_distance = min_distance.min(distance);
        if index == camera_id {
            own_distance = distance;
        }
    }
    own_distance <= min_distance + 2.0 * overlap
}

/// Systematic radial bias applied to detections seen by a camera.
#[must_use]
pub fn position_offset_for_camera(offset_strength: f32, camera: Vec3) -> Vec3 {
    let planar = Vec3::new(camera.x, camera.y, 0.0);
    if offset_strength < 1e-9 {
        return Vec3::ZERO;
    }
    if planar.length() < offset_strength {
        return planar;
    }
    planar.normalize() * offset_strength
}

/// Assembles detection frames and schedules their delayed delivery.
#[derive(Debug)]
pub struct VisionPipeline {
    cameras: Vec<CameraCalibration>,
    camera_positions: Vec<Vec3>,
    frame_numbers: Vec<u32>,
    last_ball_send_time: i64,
    min_ball_detection_time: i64,
    min_robot_detection_time: i64,
    packets: VecDeque<VisionPacket>,
    timers: SingleShotQueue,
}

impl VisionPipeline {
    #[must_use]
    pub fn new(cameras: Vec<CameraCalibration>) -> Self {
        let camera_positions = cameras
            .iter()
            .map(CameraCalibration::world_position)
            .collect();
        let frame_numbers = vec![0; cameras.len()];
        Self {
            cameras,
            camera_positions,
            frame_numbers,
            last_ball_send_time: 0,
            min_ball_detection_time: 0,
            min_robot_detection_time: 0,
            packets: VecDeque::new(),
            timers: SingleShotQueue::new(),
        }
    }

    #[must_use]
    pub fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    #[must_use]
    pub fn camera_positions(&self) -> &[Vec3] {
        &self.camera_positions
    }

    /// Worst-case detection pacing in nanoseconds.
    pub fn set_min_ball_detection_time(&mut self, nanos: i64) {
        self.min_ball_detection_time = nanos;
    }

    pub fn set_min_robot_detection_time(&mut self, nanos: i64) {
        self.min_robot_detection_time = nanos;
    }

    #[must_use]
    pub fn min_robot_detection_time(&self) -> i64 {
        self.min_robot_detection_time
    }

    /// Build one emission. Probabilistic draws happen in a fixed order:
    /// per-camera ball loss, then robot loss and dribbler misdetections in
    /// team/id/camera order, then the ball shuffle per frame.
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        &mut self,
        time: i64,
        vision_delay: i64,
        vision_processing_time: i64,
        realism: &Realism,
        geometry: &FieldGeometry,
        world: &DynamicsWorld,
        ball: &SimBall,
        robots_blue: &mut BTreeMap<u32, RobotSlot>,
        robots_yellow: &mut BTreeMap<u32, RobotSlot>,
        rng: &mut SimRng,
    ) -> VisionPacket {
        let camera_count = self.cameras.len();
        let mut truth = SimulatorState {
            time,
            ball: Some(ball.write_state(world)),
            ..SimulatorState::default()
        };

        let mut frames: Vec<DetectionFrame> = (0..camera_count)
            .map(|camera_id| {
                let frame_number = self.frame_numbers[camera_id];
                self.frame_numbers[camera_id] = frame_number.wrapping_add(1);
                DetectionFrame {
                    frame_number,
                    camera_id: camera_id as u32,
                    t_capture: (time + vision_delay - vision_processing_time) as f64 * 1e-9,
                    t_sent: (time + vision_delay) as f64 * 1e-9,
                    ..DetectionFrame::default()
                }
            })
            .collect();

        let occluders: Vec<Occluder> = robots_blue
            .values()
            .chain(robots_yellow.values())
            .map(|slot| Occluder {
                position: slot.robot.position(world),
                radius: slot.robot.specs().radius,
                height: slot.robot.specs().height,
            })
            .collect();

        let ball_position = ball.position(world);
        if time - self.last_ball_send_time >= self.min_ball_detection_time {
            self.last_ball_send_time = time;
            for camera_id in 0..camera_count {
                if !check_camera_id(
                    camera_id,
                    ball_position,
                    &self.camera_positions,
                    realism.camera_overlap,
                ) {
                    continue;
                }
                if realism.missing_ball_detections > 0.0
                    && rng.uniform_float(0.0, 1.0) <= realism.missing_ball_detections
                {
                    continue;
                }
                let position_offset = position_offset_for_camera(
                    realism.object_position_offset,
                    self.camera_positions[camera_id],
                );
                let params = BallDetectionParams {
                    stddev_p: realism.stddev_ball,
                    stddev_area: realism.stddev_ball_area,
                    camera: self.camera_positions[camera_id],
                    enable_invisible: realism.enable_invisible_ball,
                    visibility_threshold: realism.ball_visibility_threshold,
                    position_offset,
                };
                let visible = ball.update_detection(
                    world,
                    rng,
                    &params,
                    &occluders,
                    &mut frames[camera_id].balls,
                );
                if !visible {
                    frames[camera_id].balls.clear();
                }
            }
        }

        for team_is_blue in [true, false] {
            let team = if team_is_blue {
                &mut *robots_blue
            } else {
                &mut *robots_yellow
            };
            for slot in team.values_mut() {
                let robot = &mut slot.robot;
                if team_is_blue {
                    truth.blue_robots.push(robot.write_state(world));
                } else {
                    truth.yellow_robots.push(robot.write_state(world));
                }

                if time - robot.last_send_time() < self.min_robot_detection_time {
                    continue;
                }
                let time_diff = (time - robot.last_send_time()) as f32 * 1e-9;
                let robot_position = robot.position(world);
                for camera_id in 0..camera_count {
                    if !check_camera_id(
                        camera_id,
                        robot_position,
                        &self.camera_positions,
                        realism.camera_overlap,
                    ) {
                        continue;
                    }
                    if realism.missing_robot_detections > 0.0
                        && rng.uniform_float(0.0, 1.0) <= realism.missing_robot_detections
                    {
                        continue;
                    }
                    let position_offset = position_offset_for_camera(
                        realism.object_position_offset,
                        self.camera_positions[camera_id],
                    );
                    let frame = &mut frames[camera_id];
                    let detections = if team_is_blue {
                        &mut frame.robots_blue
                    } else {
                        &mut frame.robots_yellow
                    };
                    robot.update_detection(
                        world,
                        rng,
                        realism.stddev_robot,
                        realism.stddev_robot_phi,
                        time,
                        position_offset,
                        detections,
                    );

                    // Occasional false ball at the dribbler: the detection
                    // light beam many teams use is red, which vision picks
                    // up as a ball.
                    let detection_probability = time_diff * realism.ball_detections_at_dribbler;
                    if realism.ball_detections_at_dribbler > 0.0
                        && rng.uniform_float(0.0, 1.0) < detection_probability
                    {
                        let corner = robot.dribbler_corner(world, true);
                        let params = BallDetectionParams {
                            stddev_p: realism.stddev_robot,
                            stddev_area: 0.0,
                            camera: self.camera_positions[camera_id],
                            enable_invisible: false,
                            visibility_threshold: 0.0,
                            position_offset,
                        };
                        let _ = ball.add_detection_at(rng, corner, &params, &mut frame.balls);
                    }
                }
            }
        }

        // Tracking downstream may have systematic errors depending on ball
        // order; randomize it.
        for frame in &mut frames {
            if frame.balls.len() > 1 {
                rng.shuffle(&mut frame.balls);
            }
        }

        let mut packets: Vec<WrapperPacket> = frames
            .into_iter()
            .map(|frame| WrapperPacket {
                detection: Some(frame),
                geometry: None,
            })
            .collect();
        if packets.is_empty() {
            packets.push(WrapperPacket::default());
        }
        packets[0].geometry = Some(self.geometry_payload(realism, geometry));

        VisionPacket {
            frames: packets.iter().map(encode).collect(),
            truth: encode(&truth),
            emit_time: 0,
        }
    }

    fn geometry_payload(&self, realism: &Realism, geometry: &FieldGeometry) -> GeometryData {
        let error =
            CAMERA_ERROR_DIRECTION.normalize() * realism.camera_position_error;
        let calib = self
            .cameras
            .iter()
            .map(|calibration| {
                let mut reported = *calibration;
                reported.derived_camera_world_tx += to_vision(error.x);
                reported.derived_camera_world_ty += to_vision(error.y);
                reported.derived_camera_world_tz += to_vision(error.z);
                reported
            })
            .collect();
        GeometryData {
            field: GeometryFieldSize::from(geometry),
            calib,
            models: BallModels::default(),
        }
    }

    /// Queue a packet for partial-mode delivery at its emit time.
    pub fn enqueue(&mut self, packet: VisionPacket) {
        self.packets.push_back(packet);
    }

    /// Queue a packet and arm its single-shot delivery deadline
    /// (free-running mode).
    pub fn enqueue_with_timer(&mut self, packet: VisionPacket, deadline: i64) {
        self.packets.push_back(packet);
        self.timers.arm(deadline);
    }

    /// Dequeue the head packet unconditionally (delivery path).
    pub fn pop_packet(&mut self) -> Option<VisionPacket> {
        self.packets.pop_front()
    }

    /// Partial-mode flush: dequeue the head while its scheduled time is
    /// at or after `now`. Note the comparison direction: consumers rely on
    /// this flush behavior even though it reads inverted.
    pub fn pop_partial_due(&mut self, now: i64) -> Option<VisionPacket> {
        match self.packets.front() {
            Some(head) if head.emit_time >= now => self.packets.pop_front(),
            _ => None,
        }
    }

    /// Fire one due single-shot deadline, if any (free-running mode).
    pub fn pop_due_timer(&mut self, now: i64) -> bool {
        self.timers.pop_due(now).is_some()
    }

    /// Discard every pending packet and armed deadline.
    pub fn reset(&mut self) {
        self.packets.clear();
        self.timers.clear();
    }

    #[must_use]
    pub fn pending_packets(&self) -> usize {
        self.packets.len()
    }

    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }
}
