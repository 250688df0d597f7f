use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use mcareg::common::DEFAULT_SAMPLING_RATE;
use mcareg::{
    extract_registers, read_config, Command, DeviceHandle, DispatchConfig, DispatchMetrics,
    Dispatcher, SimDevice,
};

#[derive(Parser, Debug)]
#[command(name = "mcareg")]
#[command(about = "Register conversion and command dispatch for MCA detector controllers")]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    #[arg(long, global = true, help = "Print Prometheus metrics after the run")]
    metrics: bool,

    #[arg(
        short,
        long,
        global = true,
        help = "Enable verbose logging (shows every command header and transfer)"
    )]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Rebuild user values and registers from a saved settings file
    Extract {
        #[arg(help = "Settings JSON mapping command names to saved fields")]
        settings: PathBuf,

        #[arg(long, default_value_t = DEFAULT_SAMPLING_RATE, help = "ADC sampling rate in Hz")]
        sampling_rate: f64,
    },

    /// Run a command file against a simulated device
    Simulate {
        #[arg(help = "JSON file with one command or a list of commands")]
        commands: PathBuf,

        #[arg(
            long,
            default_value = "0x103",
            value_parser = parse_device_type,
            help = "Device type reported by the simulated device"
        )]
        device_type: u16,

        #[arg(long, default_value = "SIM0001", help = "Serial number of the simulated device")]
        serial: String,

        #[arg(long, default_value_t = DEFAULT_SAMPLING_RATE, help = "ADC sampling rate in Hz")]
        sampling_rate: f64,

        #[arg(long, default_value_t = 100, help = "Delay after flash writes, in milliseconds")]
        flash_settle_ms: u64,
    },
}

/// Parse "0x103" or "259"
fn parse_device_type(s: &str) -> Result<u16, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|e| format!("invalid device type '{s}': {e}"))
}

fn load_commands(path: &Path) -> anyhow::Result<Vec<Command>> {
    let commands = match read_config(path)? {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Command>, _>>()?,
        single => vec![serde_json::from_value(single)?],
    };
    Ok(commands)
}

fn run_extract(settings: &Path, sampling_rate: f64) -> anyhow::Result<()> {
    let settings = read_config(settings)?;
    let mut failed = 0;

    for (command, result) in extract_registers(&settings, sampling_rate)? {
        match result {
            Ok(bank) => {
                println!("Computed registers for {command}:");
                println!("{}", serde_json::to_string(&bank.registers())?);
            }
            Err(_) => failed += 1,
        }
    }

    if failed > 0 {
        tracing::warn!("{} command(s) could not be rebuilt", failed);
    }
    Ok(())
}

fn run_simulate(
    commands: &Path,
    device: DeviceHandle,
    config: DispatchConfig,
    metrics: Option<Arc<DispatchMetrics>>,
) -> anyhow::Result<()> {
    let mut dispatcher = Dispatcher::new(config);
    if let Some(metrics) = metrics {
        dispatcher = dispatcher.with_metrics(metrics);
    }
    let mut devices = vec![device];

    for command in load_commands(commands)? {
        let mut out = Map::new();
        for (serial, result) in dispatcher.process(&command, &mut devices) {
            let value = match result {
                Ok(bank) => serde_json::to_value(&bank)?,
                Err(e) => json!({ "error": e.to_string(), "kind": e.kind() }),
            };
            out.insert(serial, value);
        }
        println!("{}", serde_json::to_string_pretty(&Value::Object(out))?);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup logging based on verbose flag, RUST_LOG takes precedence
    let log_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let metrics = if args.metrics {
        Some(Arc::new(DispatchMetrics::new()?))
    } else {
        None
    };

    match &args.mode {
        Mode::Extract {
            settings,
            sampling_rate,
        } => run_extract(settings, *sampling_rate)?,
        Mode::Simulate {
            commands,
            device_type,
            serial,
            sampling_rate,
            flash_settle_ms,
        } => {
            tracing::info!(
                "Simulating device {} (type 0x{:04X}) at {} Hz",
                serial,
                device_type,
                sampling_rate
            );
            let device = DeviceHandle::new(serial.clone(), *device_type, Box::new(SimDevice::new()))
                .with_sampling_rate(*sampling_rate);
            let config =
                DispatchConfig::new().with_flash_settle(Duration::from_millis(*flash_settle_ms));
            run_simulate(commands, device, config, metrics.clone())?;
        }
    }

    if let Some(metrics) = metrics {
        print!("{}", metrics.encode_text()?);
    }

    Ok(())
}
