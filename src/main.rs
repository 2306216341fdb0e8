use std::path::PathBuf;

use clap::Parser;
use crossterm::terminal::disable_raw_mode;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mecanum_chassis_runtime::config::ChassisConfig;
use mecanum_chassis_runtime::io::{
    DeadReckoningImu, KeyboardTeleop, LogSink, StatusIndicator, TelemetrySink, ZenohLink,
};
use mecanum_chassis_runtime::motor::{
    FeetechBus, FeetechMotorBus, MirroredBus, MotorBus, SimulatedBus, WheelActuators,
};
use mecanum_chassis_runtime::runtime::{Collaborators, Runtime};

/// Mecanum chassis control runtime with keyboard teleop
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// JSON config file, missing fields use the built-in defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial port of the motor bus (overrides the config)
    #[arg(long)]
    port: Option<String>,

    /// Run against a simulated motor bus instead of hardware
    #[arg(long)]
    sim: bool,

    /// Log telemetry instead of publishing it over Zenoh
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    if let Err(e) = run(Args::parse()).await {
        let _ = disable_raw_mode();
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut config = match &args.config {
        Some(path) => ChassisConfig::load(path)?,
        None => ChassisConfig::default(),
    };
    if let Some(port) = args.port {
        config.motors.port = port;
    }
    let motor_ids = config.motors.ids;

    // Commanded references are mirrored here for the dead-reckoning heading
    let mirror = SimulatedBus::new(motor_ids);
    let bus: Box<dyn MotorBus> = if args.sim {
        info!("Using simulated motor bus");
        Box::new(mirror.clone())
    } else {
        info!("Opening motor bus on {}", config.motors.port);
        let feetech = FeetechMotorBus::new(FeetechBus::open(&config.motors.port)?, &config.motors);
        Box::new(MirroredBus::new(feetech, mirror.clone()))
    };
    let heading = DeadReckoningImu::new(mirror, motor_ids, &config.geometry);

    let (telemetry, indicator): (Box<dyn TelemetrySink>, Box<dyn StatusIndicator>) =
        if args.offline {
            (Box::new(LogSink), Box::new(LogSink))
        } else {
            let (link, _task) = ZenohLink::open().await?;
            (Box::new(link.clone()), Box::new(link))
        };

    let (input, quit) = KeyboardTeleop::spawn(config.input_timeout())?;

    let mut runtime = Runtime::init(
        config,
        WheelActuators::new(bus, motor_ids),
        Collaborators {
            input: Box::new(input),
            heading: Box::new(heading),
            telemetry,
            indicator,
        },
    )?;

    tokio::select! {
        _ = runtime.run() => {}
        _ = quit => info!("Operator quit"),
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    runtime.cleanup();
    disable_raw_mode()?;
    Ok(())
}
