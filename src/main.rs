use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use serde::Serialize;
use std::fs::File;
use std::path::PathBuf;
use std::process;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pitchmaster_rs::encoder::Capture;
use pitchmaster_rs::motor::max_operating_hz;
use pitchmaster_rs::protocol::Direction;
use pitchmaster_rs::{EmulatedTransport, Rig, RigConfig};

/// Drive the motor and encoder peripherals of the pitch rig.
///
/// The physical bus transport is supplied by the host integration; this tool
/// runs every command against the built-in emulated rig.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON file overriding addresses and timing.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long, global = true)]
    log_file: Option<PathBuf>,
    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,
    /// Busy status replies the emulated peripherals give before a capture is ready.
    #[arg(long, global = true, default_value_t = 2)]
    capture_polls: u32,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the motor.
    Start {
        /// Motor top speed in rpm.
        #[arg(long)]
        max_rpm: f64,
        /// Operating speed in Hz (at most max_rpm / 60).
        #[arg(long)]
        hz: f64,
        /// Ramp multiplier, 0-255.
        #[arg(long, default_value_t = 0)]
        ramp: u32,
        #[arg(long, default_value = "cw")]
        direction: Direction,
    },
    /// Stop the motor.
    Stop,
    /// Send the emergency stop.
    Estop,
    /// Record and download HLFB readings.
    Hlfb {
        #[arg(short, long, default_value_t = 50)]
        samples: u32,
    },
    /// Read the encoder position once.
    Position,
    /// Arm the encoder trigger.
    Arm {
        #[arg(short, long)]
        samples: Option<u32>,
    },
    /// Fetch captured encoder data.
    Read {
        /// Arm with this many samples first.
        #[arg(long)]
        arm: Option<u32>,
        /// Poll until the capture is ready instead of checking once.
        #[arg(long)]
        wait: bool,
    },
    /// Run start, HLFB capture, encoder capture and stop in one session.
    Demo,
}

/// Console output on stderr, plus a plain-text copy in `--log-file` when given.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// whole run.
fn init_tracing(cli: &Cli) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::builder()
        .with_default_directive(cli.verbose.tracing_level_filter().into())
        .from_env_lossy();

    let (file_writer, guard) = match &cli.log_file {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };
    let file_layer = file_writer.map(|writer| fmt::layer().with_writer(writer).with_ansi(false));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false).without_time())
        .with(file_layer)
        .init();

    Ok(guard)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(&cli)?;

    if let Err(e) = run(cli) {
        error!("Command failed: {:#}", e);
        process::exit(1);
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => RigConfig::from_json_file(path).with_context(|| format!("Loading {:?}", path))?,
        None => RigConfig::default(),
    };
    let transport = EmulatedTransport::new()
        .with_addresses(config.motor_address, config.encoder_address)
        .with_hlfb_capture_polls(cli.capture_polls)
        .with_encoder_capture_polls(cli.capture_polls);
    let mut rig = Rig::new(transport, config);

    match cli.command {
        Command::Start {
            max_rpm,
            hz,
            ramp,
            direction,
        } => {
            info!("Operating range: 0 - {:.3} Hz", max_operating_hz(max_rpm));
            let status = rig.motor().start(max_rpm, hz, ramp, direction)?;
            emit(cli.json, "motor", &status)
        }
        Command::Stop => {
            let status = rig.motor().stop()?;
            emit(cli.json, "motor", &status)
        }
        Command::Estop => {
            let status = rig.motor().emergency_stop()?;
            emit(cli.json, "motor", &status)
        }
        Command::Hlfb { samples } => {
            let readings = rig.motor().capture_hlfb(samples)?;
            emit(cli.json, "hlfb", &readings)
        }
        Command::Position => {
            let position = rig.encoder().read_single_sample()?;
            emit(cli.json, "position", &position)
        }
        Command::Arm { samples } => {
            rig.encoder().arm(samples)?;
            emit(cli.json, "armed", &true)
        }
        Command::Read { arm, wait } => {
            if let Some(samples) = arm {
                rig.encoder().arm(Some(samples))?;
            }
            let capture = if wait {
                Capture::Ready(rig.encoder().wait_for_captured_data()?)
            } else {
                rig.encoder().read_captured_data()?
            };
            emit(cli.json, "encoder", &capture)
        }
        Command::Demo => demo(&mut rig, cli.json),
    }
}

fn demo(rig: &mut Rig<EmulatedTransport>, json: bool) -> Result<()> {
    #[derive(Serialize, Debug)]
    struct DemoReport {
        position: Option<u32>,
        hlfb: Vec<f32>,
        encoder: Vec<i32>,
    }

    let position = rig.encoder().read_single_sample()?;
    rig.motor().start(3000.0, 10.0, 20, Direction::Cw)?;
    let hlfb = rig.motor().capture_hlfb(16)?;
    rig.encoder().arm(Some(16))?;
    let encoder = rig.encoder().wait_for_captured_data()?;
    rig.motor().stop()?;

    emit(
        json,
        "demo",
        &DemoReport {
            position,
            hlfb,
            encoder,
        },
    )
}

fn emit<T: Serialize + std::fmt::Debug>(json: bool, label: &str, value: &T) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{label}: {value:?}");
    }
    Ok(())
}
