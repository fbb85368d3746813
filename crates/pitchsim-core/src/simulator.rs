//! The tick orchestrator: owns the physics world, ball, robot maps and
//! queues, dispatches delayed radio commands, steps physics, and emits
//! delayed vision frames with synchronous radio responses.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use glam::{Vec2, Vec3};
use pitchsim_physics::DynamicsWorld;
use thiserror::Error;

use crate::ball::SimBall;
use crate::control::{
    Command, RadioResponse, Realism, RobotControl, RobotSpecs, Team, TeamSpec, TeleportBall,
    TeleportRobot,
};
use crate::errors::{ErrorAggregator, ErrorSource, SimError};
use crate::geometry::{FieldGeometry, SimulatorSetup};
use crate::field::SimField;
use crate::radio::CommandQueue;
use crate::rng::SimRng;
use crate::robot::{RobotSlot, SimRobot};
use crate::timing::SimTimer;
use crate::vision::{VisionPacket, VisionPipeline};
use crate::{world_with_defaults, BALL_RADIUS, MAX_SUBSTEPS, SUB_TIMESTEP};

/// Vision frames are paced to one per 12.5 ms of simulated time.
const STATUS_INTERVAL_NS: i64 = 12_500_000;

/// Robots cleared away from a safe ball teleport give up after this many
/// radial steps.
const MAX_FREE_POSITION_STEPS: u32 = 32;

/// Robots inside this radius of a safe ball teleport lose their speed.
const STOP_ROBOTS_RADIUS: f32 = 1.5;

/// Errors raised while constructing the simulator.
#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("failed to build physics body: {0}")]
    Body(#[from] pitchsim_physics::BodyError),
}

/// Wall-time spent inside one `process` call, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingStatus {
    pub simulator: f32,
}

/// Outbound signal surface. All callbacks run on the tick thread, inside
/// `process` or a timer pump.
pub trait SimulatorSink {
    /// One serialized wrapper packet, per camera.
    fn got_packet(&mut self, data: &[u8], receive_time: i64, sender: &str);
    /// The serialized ground-truth state accompanying an emission.
    fn send_real_data(&mut self, data: &[u8]);
    /// The batch of responses collected while draining due commands.
    fn send_radio_responses(&mut self, responses: &[RadioResponse]);
    /// One non-empty batch of aggregated errors per source.
    fn send_error(&mut self, errors: &[SimError], source: ErrorSource);
    /// Tick timing.
    fn send_status(&mut self, status: &TimingStatus);
}

/// Sink that discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl SimulatorSink for NullSink {
    fn got_packet(&mut self, _data: &[u8], _receive_time: i64, _sender: &str) {}
    fn send_real_data(&mut self, _data: &[u8]) {}
    fn send_radio_responses(&mut self, _responses: &[RadioResponse]) {}
    fn send_error(&mut self, _errors: &[SimError], _source: ErrorSource) {}
    fn send_status(&mut self, _status: &TimingStatus) {}
}

/// Explicit borrow bundle handed to the per-substep callback.
struct TickContext<'a> {
    ball: &'a mut SimBall,
    robots_blue: &'a mut BTreeMap<u32, RobotSlot>,
    robots_yellow: &'a mut BTreeMap<u32, RobotSlot>,
    geometry: &'a FieldGeometry,
    dribble_perfect: bool,
}

/// The simulation core.
pub struct Simulator {
    partial: bool,
    timer: Arc<dyn SimTimer>,
    time: i64,
    last_sent_status_time: i64,
    time_scaling: f64,
    enabled: bool,
    charge: bool,
    vision_delay: i64,
    vision_processing_time: i64,
    trigger_interval: Option<Duration>,
    geometry: FieldGeometry,
    world: DynamicsWorld,
    #[allow(dead_code)]
    field: SimField,
    ball: SimBall,
    robots_blue: BTreeMap<u32, RobotSlot>,
    robots_yellow: BTreeMap<u32, RobotSlot>,
    specs_blue: BTreeMap<u32, RobotSpecs>,
    specs_yellow: BTreeMap<u32, RobotSpecs>,
    flip: bool,
    realism: Realism,
    rng: SimRng,
    radio: CommandQueue,
    vision: VisionPipeline,
    aggregator: ErrorAggregator,
    sink: Box<dyn SimulatorSink>,
}

impl Simulator {
    /// Build a simulator over the given setup. `partial` selects the
    /// manually pumped mode in which vision delivery rides on the next
    /// `process` call instead of single-shot timers.
    pub fn new(
        timer: Arc<dyn SimTimer>,
        setup: &SimulatorSetup,
        partial: bool,
        sink: Box<dyn SimulatorSink>,
    ) -> Result<Self, SimulatorError> {
        let mut world = world_with_defaults();
        let field = SimField::new(&mut world, &setup.geometry)?;
        let ball = SimBall::new(&mut world)?;
        let vision = VisionPipeline::new(setup.camera_setup.clone());
        Ok(Self {
            partial,
            timer,
            time: 0,
            last_sent_status_time: 0,
            time_scaling: 1.0,
            enabled: false,
            charge: false,
            vision_delay: 35_000_000,
            vision_processing_time: 5_000_000,
            trigger_interval: None,
            geometry: setup.geometry,
            world,
            field,
            ball,
            robots_blue: BTreeMap::new(),
            robots_yellow: BTreeMap::new(),
            specs_blue: BTreeMap::new(),
            specs_yellow: BTreeMap::new(),
            flip: false,
            realism: Realism::default(),
            rng: SimRng::default(),
            radio: CommandQueue::new(),
            vision,
            aggregator: ErrorAggregator::new(),
            sink,
        })
    }

    /// Run one tick: flush partial vision, drain due radio commands, step
    /// physics to the external clock, assemble and schedule a vision frame,
    /// and emit timing.
    pub fn process(&mut self) {
        assert_ne!(self.time, 0, "simulator must be enabled before ticking");
        let start_time = self.timer.system_time();
        let current_time = self.timer.current_time();

        // First: deliver vision packets in partial mode.
        if self.partial {
            while let Some(packet) = self.vision.pop_partial_due(current_time) {
                self.emit_vision_packet(&packet);
            }
        }

        // Apply only radio commands the robots have already received by the
        // time this tick advances to.
        let mut responses = Vec::new();
        while let Some(entry) = self.radio.pop_due(current_time, self.realism.command_delay) {
            for command in &entry.control.robot_commands {
                if self.realism.robot_command_packet_loss > 0.0
                    && self.rng.uniform_float(0.0, 1.0) <= self.realism.robot_command_packet_loss
                {
                    continue;
                }
                let team = if entry.is_blue {
                    &mut self.robots_blue
                } else {
                    &mut self.robots_yellow
                };
                let Some(slot) = team.get_mut(&command.id) else {
                    continue;
                };
                let mut response =
                    slot.robot
                        .set_command(command, &self.ball, &self.world, self.charge);
                response.time = current_time;
                response.is_blue = entry.is_blue;
                if self.realism.robot_reply_packet_loss == 0.0
                    || self.rng.uniform_float(0.0, 1.0) > self.realism.robot_reply_packet_loss
                {
                    responses.push(response);
                }
            }
        }
        // Responses ride with command delivery, so they go out immediately.
        self.sink.send_radio_responses(&responses);
        for source in ErrorSource::ALL {
            self.flush_errors(source);
        }

        // Simulate up to the current strategy time.
        let time_delta = (current_time - self.time) as f64 * 1e-9;
        {
            let Self {
                world,
                ball,
                robots_blue,
                robots_yellow,
                geometry,
                realism,
                ..
            } = self;
            let mut ctx = TickContext {
                ball,
                robots_blue,
                robots_yellow,
                geometry,
                dribble_perfect: realism.dribble_perfect,
            };
            world.step_simulation(time_delta as f32, MAX_SUBSTEPS, SUB_TIMESTEP, |world, dt| {
                tick_callback(&mut ctx, world, dt);
            });
        }
        self.time = current_time;

        if self.last_sent_status_time + STATUS_INTERVAL_NS <= self.time {
            let mut packet = self.assemble_vision_packet();
            if self.partial {
                packet.emit_time = self.time + self.vision_delay;
                self.vision.enqueue(packet);
            } else {
                let deadline = self.timer.system_time()
                    + (self.vision_delay as f64 / self.time_scaling) as i64;
                self.vision.enqueue_with_timer(packet, deadline);
            }
            self.last_sent_status_time = self.time;
        }

        let status = TimingStatus {
            simulator: (self.timer.system_time() - start_time) as f32 * 1e-9,
        };
        self.sink.send_status(&status);
    }

    /// Fire due single-shot vision deadlines (free-running mode). The host
    /// pumps this between trigger ticks.
    pub fn poll_timers(&mut self) {
        if self.partial {
            return;
        }
        let now = self.timer.system_time();
        while self.vision.pop_due_timer(now) {
            if let Some(packet) = self.vision.pop_packet() {
                self.emit_vision_packet(&packet);
            }
        }
    }

    /// Enqueue a radio transmission for delayed delivery.
    pub fn handle_radio_commands(
        &mut self,
        control: RobotControl,
        is_blue: bool,
        processing_start: i64,
    ) {
        self.radio.enqueue(control, processing_start, is_blue);
    }

    /// Apply a structured command.
    pub fn handle_command(&mut self, command: &Command) {
        let mut team_or_dribble_changed = false;

        if let Some(sim) = &command.simulator {
            if let Some(enable) = sim.enable {
                self.enabled = enable;
                self.time = self.timer.current_time();
                // Restart or stop the trigger for the new enable state.
                self.set_scaling(self.time_scaling);
            }

            if let Some(config) = &sim.realism_config {
                if self.realism.apply(config) {
                    team_or_dribble_changed = true;
                }
                if let Some(delay) = config.vision_delay {
                    self.vision_delay = delay.max(0);
                }
                if let Some(processing) = config.vision_processing_time {
                    self.vision_processing_time = processing.max(0);
                }
            }

            if let Some(ssl_control) = &sim.ssl_control {
                if let Some(teleport) = &ssl_control.teleport_ball {
                    self.move_ball(teleport);
                }
                for teleport in &ssl_control.teleport_robot {
                    self.move_robot(teleport);
                }
            }

            if let Some(worst_case) = &sim.vision_worst_case {
                if let Some(seconds) = worst_case.min_ball_detection_time {
                    self.vision
                        .set_min_ball_detection_time((f64::from(seconds) * 1e9) as i64);
                }
                if let Some(seconds) = worst_case.min_robot_detection_time {
                    self.vision
                        .set_min_robot_detection_time((f64::from(seconds) * 1e9) as i64);
                }
            }

            if let Some(state) = &sim.set_simulator_state {
                if let Some(ball_state) = &state.ball {
                    self.ball.restore_state(ball_state, &mut self.world);
                }
                for robot_state in &state.blue_robots {
                    if let Some(slot) = self.robots_blue.get_mut(&robot_state.id) {
                        slot.robot.restore_state(robot_state, &mut self.world);
                    }
                }
                for robot_state in &state.yellow_robots {
                    if let Some(slot) = self.robots_yellow.get_mut(&robot_state.id) {
                        slot.robot.restore_state(robot_state, &mut self.world);
                    }
                }
            }
        }

        if let Some(transceiver) = &command.transceiver {
            if let Some(charge) = transceiver.charge {
                self.charge = charge;
            }
        }

        if let Some(team) = &command.set_team_blue {
            team_or_dribble_changed = true;
            self.set_team(true, team);
        }
        if let Some(team) = &command.set_team_yellow {
            team_or_dribble_changed = true;
            self.set_team(false, team);
        }

        if team_or_dribble_changed {
            let perfect = self.realism.dribble_perfect;
            for slot in self
                .robots_blue
                .values_mut()
                .chain(self.robots_yellow.values_mut())
            {
                slot.robot.set_dribble_mode(perfect);
            }
        }
    }

    /// Replace one team's robots, clearing pending vision packets so removed
    /// robots do not reappear through stale frames.
    fn set_team(&mut self, is_blue: bool, team: &TeamSpec) {
        let Self {
            robots_blue,
            robots_yellow,
            specs_blue,
            specs_yellow,
            world,
            vision,
            aggregator,
            geometry,
            realism,
            ..
        } = self;
        let (list, specs_map, side) = if is_blue {
            (robots_blue, specs_blue, 1.0f32)
        } else {
            (robots_yellow, specs_yellow, -1.0f32)
        };

        for (_, slot) in std::mem::take(list) {
            slot.robot.destroy(world);
        }
        vision.reset();

        let x = geometry.field_width / 2.0 - 0.2;
        let mut y = geometry.field_height / 2.0 - 0.2;
        for specs in &team.robots {
            if list.contains_key(&specs.id) {
                tracing::error!(id = specs.id, "two ids for the same color, aborting");
                aggregator.aggregate(
                    SimError::new(
                        "DUPLICATE_ROBOT_ID",
                        format!("duplicate robot id {} in team definition", specs.id),
                    ),
                    ErrorSource::Config,
                );
                continue;
            }
            specs_map.insert(specs.id, *specs);
            match SimRobot::new(world, *specs, Vec2::new(x, side * y), 0.0) {
                Ok(mut robot) => {
                    robot.set_dribble_mode(realism.dribble_perfect);
                    list.insert(
                        specs.id,
                        RobotSlot {
                            robot,
                            generation: specs.generation,
                        },
                    );
                }
                Err(error) => {
                    aggregator.aggregate(
                        SimError::new("INVALID_ROBOT_SPECS", error.to_string()),
                        ErrorSource::Config,
                    );
                }
            }
            y -= 0.3;
        }
    }

    /// Teleport the ball, honoring the global flip and the safe-teleport
    /// protocol.
    pub fn move_ball(&mut self, teleport: &TeleportBall) {
        // Any non-forced ball move releases every dribbler first.
        if !teleport.by_force.unwrap_or(false) {
            for slot in self
                .robots_blue
                .values_mut()
                .chain(self.robots_yellow.values_mut())
            {
                slot.robot.stop_dribbling();
            }
        }

        let mut request = *teleport;
        if self.flip {
            flip_option(&mut request.x);
            flip_option(&mut request.y);
            flip_option(&mut request.vx);
            flip_option(&mut request.vy);
        }

        if request.teleport_safely.unwrap_or(false) {
            let Some((x, y)) = request.x.zip(request.y) else {
                self.aggregator.aggregate(
                    SimError::new(
                        "TELEPORT_SAFELY_PARTIAL",
                        "safe ball teleport requires both coordinates",
                    ),
                    ErrorSource::Config,
                );
                return;
            };
            self.safely_teleport_ball(x, y);
        }

        self.ball.teleport(&request);
    }

    /// Teleport a robot, creating or removing it when `present` asks for a
    /// membership change.
    pub fn move_robot(&mut self, teleport: &TeleportRobot) {
        let is_blue = teleport.id.team == Team::Blue;
        let id = teleport.id.id;
        let is_present = self.team(is_blue).contains_key(&id);

        if let Some(present) = teleport.present {
            if present && !is_present {
                let specs = self.specs(is_blue).get(&id).copied();
                match (specs, teleport.x.zip(teleport.y)) {
                    (None, _) => {
                        self.aggregator.aggregate(
                            SimError::new(
                                "CREATE_UNSPEC_ROBOT",
                                format!("trying to create robot {id}, but no spec was found"),
                            ),
                            ErrorSource::Config,
                        );
                    }
                    (Some(_), None) => {
                        self.aggregator.aggregate(
                            SimError::new(
                                "CREATE_NOPOS_ROBOT",
                                format!("trying to create robot {id} without a position"),
                            ),
                            ErrorSource::Config,
                        );
                    }
                    (Some(specs), Some((x, y))) => {
                        match SimRobot::new(&mut self.world, specs, Vec2::new(x, y), 0.0) {
                            Ok(mut robot) => {
                                robot.set_dribble_mode(self.realism.dribble_perfect);
                                self.team_mut(is_blue).insert(
                                    id,
                                    RobotSlot {
                                        robot,
                                        generation: specs.generation,
                                    },
                                );
                            }
                            Err(error) => {
                                self.aggregator.aggregate(
                                    SimError::new("INVALID_ROBOT_SPECS", error.to_string()),
                                    ErrorSource::Config,
                                );
                            }
                        }
                    }
                }
            } else if !present && is_present {
                if let Some(mut slot) = self.team_mut(is_blue).remove(&id) {
                    slot.robot.stop_dribbling();
                    slot.robot.destroy(&mut self.world);
                }
                return;
            } else if !present && !is_present {
                return;
            }
            // Fall through: a robot that exists and should exist is moved.
        } else if !is_present {
            return;
        }

        // Recheck in case the presence handling above changed the map.
        if !self.team(is_blue).contains_key(&id) {
            return;
        }

        let mut request = *teleport;
        if self.flip {
            flip_option(&mut request.x);
            flip_option(&mut request.y);
            flip_option(&mut request.v_x);
            flip_option(&mut request.v_y);
        }
        let by_force = request.by_force.unwrap_or(false);
        if let Some(slot) = self.team_mut(is_blue).get_mut(&id) {
            if !by_force {
                slot.robot.stop_dribbling();
            }
            slot.robot.teleport(&request);
        }
    }

    /// Clear space around a safe ball target: robots overlapping the ball
    /// are pushed to free positions, nearby ones lose their speed.
    fn safely_teleport_ball(&mut self, x: f32, y: f32) {
        let target = Vec2::new(x, y);
        for is_blue in [true, false] {
            let ids: Vec<u32> = self.team(is_blue).keys().copied().collect();
            for id in ids {
                let Some(slot) = self.team(is_blue).get(&id) else {
                    continue;
                };
                let position = slot.robot.position(&self.world);
                let radius = slot.robot.specs().radius;
                let planar = Vec2::new(position.x, position.y);
                if overlap_check(target, BALL_RADIUS, planar, radius) {
                    self.teleport_robot_to_free_position(is_blue, id);
                } else if overlap_check(target, STOP_ROBOTS_RADIUS, planar, radius) {
                    if let Some(slot) = self.team_mut(is_blue).get_mut(&id) {
                        let mut stop = TeleportRobot::new(crate::control::RobotId {
                            team: if is_blue { Team::Blue } else { Team::Yellow },
                            id,
                        });
                        stop.v_x = Some(0.0);
                        stop.v_y = Some(0.0);
                        slot.robot.teleport(&stop);
                    }
                }
            }
        }
    }

    /// Push a robot radially away from the ball until it overlaps nobody,
    /// bounded against crowded fields.
    fn teleport_robot_to_free_position(&mut self, is_blue: bool, id: u32) {
        let Some(slot) = self.team(is_blue).get(&id) else {
            return;
        };
        let radius = slot.robot.specs().radius;
        let start = slot.robot.position(&self.world);
        let mut position = Vec2::new(start.x, start.y);
        let ball_position = self.ball.position(&self.world);
        let mut direction = position - Vec2::new(ball_position.x, ball_position.y);
        direction = direction.normalize_or_zero();
        if direction == Vec2::ZERO {
            direction = Vec2::X;
        }
        let distance = 2.0 * (BALL_RADIUS + radius);

        let others: Vec<(Vec2, f32)> = self
            .robots_blue
            .iter()
            .map(|(other_id, slot)| (true, other_id, slot))
            .chain(
                self.robots_yellow
                    .iter()
                    .map(|(other_id, slot)| (false, other_id, slot)),
            )
            .filter(|(other_blue, other_id, _)| !(*other_blue == is_blue && **other_id == id))
            .map(|(_, _, slot)| {
                let p = slot.robot.position(&self.world);
                (Vec2::new(p.x, p.y), slot.robot.specs().radius)
            })
            .collect();

        let mut steps = 0;
        loop {
            position += 2.0 * direction * distance;
            let valid = others
                .iter()
                .all(|(other, other_radius)| !overlap_check(position, radius, *other, *other_radius));
            if valid {
                break;
            }
            steps += 1;
            if steps >= MAX_FREE_POSITION_STEPS {
                self.aggregator.aggregate(
                    SimError::new(
                        "TELEPORT_STUCK",
                        format!("no free position found for robot {id}"),
                    ),
                    ErrorSource::Config,
                );
                break;
            }
        }

        if let Some(slot) = self.team_mut(is_blue).get_mut(&id) {
            let mut request = TeleportRobot::new(crate::control::RobotId {
                team: if is_blue { Team::Blue } else { Team::Yellow },
                id,
            });
            request.x = Some(position.x);
            request.y = Some(position.y);
            request.v_x = Some(0.0);
            request.v_y = Some(0.0);
            slot.robot.teleport(&request);
        }
    }

    /// Change the time scale: restart the trigger and drop pending vision
    /// packets whose timings are stale.
    pub fn set_scaling(&mut self, scaling: f64) {
        if scaling <= 0.0 || !self.enabled {
            self.trigger_interval = None;
            self.vision.reset();
        } else {
            let millis = ((5.0 / scaling) as u64).max(1);
            self.trigger_interval = Some(Duration::from_millis(millis));
            // Timings of queued packets would be wrong under the new scale,
            // and a faster scale would fire fresh deadlines before stale
            // ones.
            self.vision.reset();
        }
        self.time_scaling = scaling;
    }

    /// Seed the deterministic random source.
    pub fn seed_prng(&mut self, seed: u32) {
        self.rng.seed(seed);
    }

    /// Mirror all teleport inputs and outputs on x/y.
    pub fn set_flipped(&mut self, flipped: bool) {
        self.flip = flipped;
    }

    fn assemble_vision_packet(&mut self) -> VisionPacket {
        let Self {
            vision,
            time,
            vision_delay,
            vision_processing_time,
            realism,
            geometry,
            world,
            ball,
            robots_blue,
            robots_yellow,
            rng,
            ..
        } = self;
        vision.assemble(
            *time,
            *vision_delay,
            *vision_processing_time,
            realism,
            geometry,
            world,
            ball,
            robots_blue,
            robots_yellow,
            rng,
        )
    }

    fn emit_vision_packet(&mut self, packet: &VisionPacket) {
        let receive_time = self.timer.current_time();
        for frame in &packet.frames {
            self.sink.got_packet(frame, receive_time, "simulator");
        }
        self.sink.send_real_data(&packet.truth);
    }

    fn flush_errors(&mut self, source: ErrorSource) {
        let errors = self.aggregator.get_aggregates(source);
        if !errors.is_empty() {
            self.sink.send_error(&errors, source);
        }
    }

    fn team(&self, is_blue: bool) -> &BTreeMap<u32, RobotSlot> {
        if is_blue {
            &self.robots_blue
        } else {
            &self.robots_yellow
        }
    }

    fn team_mut(&mut self, is_blue: bool) -> &mut BTreeMap<u32, RobotSlot> {
        if is_blue {
            &mut self.robots_blue
        } else {
            &mut self.robots_yellow
        }
    }

    fn specs(&self, is_blue: bool) -> &BTreeMap<u32, RobotSpecs> {
        if is_blue {
            &self.specs_blue
        } else {
            &self.specs_yellow
        }
    }

    // Introspection used by hosts and tests.

    /// Current simulated time in nanoseconds.
    #[must_use]
    pub fn time(&self) -> i64 {
        self.time
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Trigger period for free-running hosts; `None` while stopped.
    #[must_use]
    pub fn trigger_interval(&self) -> Option<Duration> {
        self.trigger_interval
    }

    #[must_use]
    pub fn pending_vision_packets(&self) -> usize {
        self.vision.pending_packets()
    }

    #[must_use]
    pub fn robot_count(&self, team: Team) -> usize {
        self.team(team == Team::Blue).len()
    }

    #[must_use]
    pub fn has_robot(&self, team: Team, id: u32) -> bool {
        self.team(team == Team::Blue).contains_key(&id)
    }

    /// Ball position in field meters.
    #[must_use]
    pub fn ball_position(&self) -> Vec3 {
        self.ball.position(&self.world)
    }

    /// Ball velocity in m/s.
    #[must_use]
    pub fn ball_velocity(&self) -> Vec3 {
        self.ball.velocity(&self.world)
    }

    /// Robot position in field meters, if present.
    #[must_use]
    pub fn robot_position(&self, team: Team, id: u32) -> Option<Vec3> {
        self.team(team == Team::Blue)
            .get(&id)
            .map(|slot| slot.robot.position(&self.world))
    }

    /// Distance between the ball and each robot minus the touching
    /// distance; negative values mean overlap.
    #[must_use]
    pub fn ball_robot_clearances(&self) -> Vec<f32> {
        let ball = self.ball.position(&self.world);
        self.robots_blue
            .values()
            .chain(self.robots_yellow.values())
            .map(|slot| {
                let position = slot.robot.position(&self.world);
                let distance = Vec2::new(position.x - ball.x, position.y - ball.y).length();
                distance - (slot.robot.specs().radius + BALL_RADIUS)
            })
            .collect()
    }
}

/// Per-substep work: force bookkeeping, at-boundary mutations, command and
/// gravity application.
fn tick_callback(ctx: &mut TickContext<'_>, world: &mut DynamicsWorld, time_step: f32) {
    world.clear_forces();

    reset_flipped(world, ctx.robots_blue, ctx.geometry, ctx.dribble_perfect, 1.0);
    reset_flipped(world, ctx.robots_yellow, ctx.geometry, ctx.dribble_perfect, -1.0);

    if ctx.ball.is_invalid(world) {
        if let Ok(fresh) = SimBall::new(world) {
            let old = std::mem::replace(ctx.ball, fresh);
            old.destroy(world);
        }
    }

    ctx.ball.begin(world);
    for slot in ctx.robots_blue.values_mut() {
        slot.robot.begin(world, ctx.ball, time_step);
    }
    for slot in ctx.robots_yellow.values_mut() {
        slot.robot.begin(world, ctx.ball, time_step);
    }

    // Gravity goes to active bodies only after commands were applied.
    world.apply_gravity();
}

/// Replace flipped robots with fresh instances lined up on the reserved
/// border line. The line slot advances for every robot, flipped or not.
fn reset_flipped(
    world: &mut DynamicsWorld,
    robots: &mut BTreeMap<u32, RobotSlot>,
    geometry: &FieldGeometry,
    dribble_perfect: bool,
    side: f32,
) {
    let x = geometry.field_width / 2.0 - 0.2;
    let mut y = geometry.field_height / 2.0 - 0.2;
    for slot in robots.values_mut() {
        if slot.robot.is_flipped(world) {
            let specs = *slot.robot.specs();
            if let Ok(mut fresh) = SimRobot::new(world, specs, Vec2::new(x, side * y), 0.0) {
                fresh.set_dribble_mode(dribble_perfect);
                let old = std::mem::replace(&mut slot.robot, fresh);
                old.destroy(world);
            }
        }
        y -= 0.3;
    }
}

fn overlap_check(p0: Vec2, r0: f32, p1: Vec2, r1: f32) -> bool {
    (p1 - p0).length() <= r0 + r1
}

fn flip_option(value: &mut Option<f32>) {
    if let Some(inner) = value.as_mut() {
        *inner = -*inner;
    }
}
