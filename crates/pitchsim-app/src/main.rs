use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use pitchsim_core::{
    Command, CommandSimulator, ErrorSource, FieldGeometry, RadioResponse, RealismConfig,
    RobotSpecs, ScaledTimer, SimError, Simulator, SimulatorSetup, SimulatorSink, TeamSpec,
    TimingStatus,
};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, info};

fn main() -> Result<()> {
    let cli = AppCli::parse();
    init_tracing();

    let realism_layers = load_realism_layers(&cli.config_layers)?;
    let setup = SimulatorSetup::with_camera_grid(
        FieldGeometry::default(),
        cli.camera_columns,
        cli.camera_rows,
        cli.camera_height,
    );
    info!(
        cameras = setup.camera_setup.len(),
        robots_per_team = cli.robots,
        seed = cli.seed,
        scaling = cli.scaling,
        "Starting pitchsim shell"
    );

    let timer = Arc::new(ScaledTimer::new());
    timer.set_scaling(cli.scaling);
    let sink = CountingSink::default();
    let counters = sink.clone();
    let mut simulator = Simulator::new(timer.clone(), &setup, false, Box::new(sink))
        .context("failed to construct the simulator")?;
    simulator.seed_prng(cli.seed);
    simulator.set_flipped(cli.flip);

    simulator.handle_command(&Command {
        simulator: Some(CommandSimulator {
            enable: Some(true),
            ..CommandSimulator::default()
        }),
        set_team_blue: Some(team_of(cli.robots)),
        set_team_yellow: Some(team_of(cli.robots)),
        ..Command::default()
    });
    // Config layers apply incrementally, so later files win per field.
    for layer in realism_layers {
        simulator.handle_command(&Command {
            simulator: Some(CommandSimulator {
                realism_config: Some(layer),
                ..CommandSimulator::default()
            }),
            ..Command::default()
        });
    }
    simulator.set_scaling(cli.scaling);

    run_loop(&mut simulator, cli.duration_secs)?;

    info!(
        packets = counters.packets.load(Ordering::Relaxed),
        truths = counters.truths.load(Ordering::Relaxed),
        responses = counters.responses.load(Ordering::Relaxed),
        errors = counters.errors.load(Ordering::Relaxed),
        "Run complete"
    );
    Ok(())
}

fn run_loop(simulator: &mut Simulator, duration_secs: f64) -> Result<()> {
    let deadline = Instant::now() + Duration::from_secs_f64(duration_secs);
    while Instant::now() < deadline {
        let interval = simulator
            .trigger_interval()
            .unwrap_or(Duration::from_millis(5));
        thread::sleep(interval);
        simulator.process();
        simulator.poll_timers();
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn team_of(count: u32) -> TeamSpec {
    TeamSpec {
        robots: (0..count).map(RobotSpecs::standard).collect(),
    }
}

fn load_realism_layers(layers: &[PathBuf]) -> Result<Vec<RealismConfig>> {
    layers.iter().map(|path| load_realism(path)).collect()
}

fn load_realism(path: &Path) -> Result<RealismConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config layer {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config layer {}", path.display()))
}

/// Sink counting emissions; payload details go to debug logs.
#[derive(Clone, Default)]
struct CountingSink {
    packets: Arc<AtomicUsize>,
    truths: Arc<AtomicUsize>,
    responses: Arc<AtomicUsize>,
    errors: Arc<AtomicUsize>,
}

impl SimulatorSink for CountingSink {
    fn got_packet(&mut self, data: &[u8], receive_time: i64, sender: &str) {
        self.packets.fetch_add(1, Ordering::Relaxed);
        debug!(bytes = data.len(), receive_time, sender, "vision packet");
    }

    fn send_real_data(&mut self, data: &[u8]) {
        self.truths.fetch_add(1, Ordering::Relaxed);
        debug!(bytes = data.len(), "ground truth");
    }

    fn send_radio_responses(&mut self, responses: &[RadioResponse]) {
        self.responses.fetch_add(responses.len(), Ordering::Relaxed);
        if !responses.is_empty() {
            debug!(count = responses.len(), "radio responses");
        }
    }

    fn send_error(&mut self, errors: &[SimError], source: ErrorSource) {
        self.errors.fetch_add(errors.len(), Ordering::Relaxed);
        for error in errors {
            tracing::warn!(?source, code = %error.code, message = %error.message, "simulation error");
        }
    }

    fn send_status(&mut self, status: &TimingStatus) {
        debug!(simulator_seconds = status.simulator, "tick timing");
    }
}

#[derive(Parser, Debug)]
#[command(name = "pitchsim", version, about = "Headless robot-soccer simulator shell")]
struct AppCli {
    /// Seed for the deterministic random source.
    #[arg(long, env = "PITCHSIM_SEED", default_value_t = 0)]
    seed: u32,
    /// Time scaling factor; the trigger period is 5 ms divided by this.
    #[arg(long, env = "PITCHSIM_SCALING", default_value_t = 1.0)]
    scaling: f64,
    /// Wall-clock run duration in seconds.
    #[arg(long, default_value_t = 5.0)]
    duration_secs: f64,
    /// Robots per team.
    #[arg(long, default_value_t = 6)]
    robots: u32,
    /// Camera grid columns.
    #[arg(long, default_value_t = 2)]
    camera_columns: u32,
    /// Camera grid rows.
    #[arg(long, default_value_t = 2)]
    camera_rows: u32,
    /// Camera mounting height in meters.
    #[arg(long, default_value_t = 4.0)]
    camera_height: f32,
    /// Mirror the field for play on the opposite half.
    #[arg(long)]
    flip: bool,
    /// Layered JSON realism configs applied in order.
    #[arg(
        long = "config",
        value_name = "FILE",
        action = ArgAction::Append,
        env = "PITCHSIM_CONFIG",
        value_delimiter = ';'
    )]
    config_layers: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_parse() {
        let cli = AppCli::parse_from(["pitchsim"]);
        assert_eq!(cli.seed, 0);
        assert_eq!(cli.robots, 6);
        assert_eq!(cli.camera_columns, 2);
        assert!(cli.config_layers.is_empty());
    }

    #[test]
    fn realism_layer_round_trips_from_json() {
        let dir = std::env::temp_dir().join("pitchsim-app-test");
        fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("layer.json");
        fs::write(
            &path,
            r#"{"vision_delay": 10000000, "robot_command_loss": 0.25}"#,
        )
        .expect("write layer");
        let layer = load_realism(&path).expect("parse layer");
        assert_eq!(layer.vision_delay, Some(10_000_000));
        assert_eq!(layer.robot_command_loss, Some(0.25));
        assert!(layer.camera_overlap.is_none());
    }
}
