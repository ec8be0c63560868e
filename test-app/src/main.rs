// evlink-cli -- bench tool for exercising the supervisory controller
// against a real MCU on a serial port or the in-process simulator.
//
// Usage:
//   evlink-cli --port /dev/ttyUSB0 status
//   evlink-cli --port /dev/ttyUSB0 monitor --duration 30
//   evlink-cli --sim monitor
//   evlink-cli --sim set-limit 40
//   evlink-cli --port /dev/ttyUSB0 estop
//   evlink-cli --config bench.json config --save
//
// Telemetry can be appended to a CSV file with --log-csv (or the
// log_csv config field). RUST_LOG controls diagnostic output.

mod config;
mod datalog;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use evlink::protocol::Inbox;
use evlink::{kind, Controller, SerialTransport, Value};
use evlink_sim::{SimOptions, Simulator};
use evlink_test_harness::channel_pair;

use config::AppConfig;
use datalog::DataLogger;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// evlink bench tool -- drives the controller from the command line.
#[derive(Parser)]
#[command(name = "evlink-cli", version, about)]
struct Cli {
    /// Serial port path (e.g. /dev/ttyUSB0, COM3).
    #[arg(long)]
    port: Option<String>,

    /// Override the configured baud rate.
    #[arg(long)]
    baud: Option<u32>,

    /// Run against the in-process simulator instead of hardware.
    #[arg(long)]
    sim: bool,

    /// Config file path (JSON); missing file means defaults.
    #[arg(long, default_value = "evlink.json")]
    config: PathBuf,

    /// Append telemetry rows to this CSV file.
    #[arg(long)]
    log_csv: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect, wait for telemetry, print one status snapshot.
    Status,

    /// Stream telemetry and fault traffic to stdout (and CSV if configured).
    Monitor {
        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },

    /// Set the MCU's hard current ceiling (confirmed).
    SetMaxCurrent {
        /// Ceiling in amps.
        amps: f64,
    },

    /// Set the MCU's soft current limit (confirmed).
    SetLimit {
        /// Limit in amps.
        amps: f64,
    },

    /// Transmit an emergency stop.
    Estop,

    /// Ask the MCU to clear latched faults (confirmed).
    ResetFaults,

    /// Print the effective configuration.
    Config {
        /// Write the effective configuration back to the config file.
        #[arg(long)]
        save: bool,
    },
}

// ---------------------------------------------------------------------------
// Connection setup
// ---------------------------------------------------------------------------

/// A connected bench: the controller, plus the simulator when running
/// without hardware so it stays alive for the session.
struct Bench {
    controller: Controller,
    simulator: Option<Simulator>,
}

impl Bench {
    async fn shutdown(self) -> Result<()> {
        self.controller
            .shutdown()
            .await
            .context("controller shutdown failed")?;
        if let Some(sim) = self.simulator {
            sim.stop().await;
        }
        Ok(())
    }
}

async fn connect(cli: &Cli, app_config: &AppConfig) -> Result<Bench> {
    let controller_config = app_config.controller_config();

    if cli.sim {
        let (controller_end, sim_end) = channel_pair();
        let simulator = Simulator::spawn(Box::new(sim_end), SimOptions::default());
        let controller = Controller::start(Box::new(controller_end), controller_config);
        println!("Connected to in-process simulator.");
        return Ok(Bench {
            controller,
            simulator: Some(simulator),
        });
    }

    let port = cli
        .port
        .clone()
        .unwrap_or_else(|| app_config.port.clone());
    let baud = cli.baud.unwrap_or(app_config.baud);
    let transport = SerialTransport::open(&port, baud)
        .await
        .with_context(|| format!("failed to open {port} at {baud} baud"))?;
    println!("Connected to {port} at {baud} baud.");
    Ok(Bench {
        controller: Controller::start(Box::new(transport), controller_config),
        simulator: None,
    })
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Wait until the first telemetry frame marks the link connected.
async fn wait_for_telemetry(controller: &Controller, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if controller.is_connected() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

fn print_status(controller: &Controller) {
    let status = controller.status();
    println!();
    println!("Connected: {}", status.connected);
    if status.faults.is_empty() {
        println!("Faults:    none");
    } else {
        println!("Faults:    {}", status.faults.join(", "));
    }
    println!(
        "Config:    overheat>{:.1}C  low-battery<{:.1}%  estop-on-fault={}",
        status.config.overheat_threshold,
        status.config.low_battery_threshold,
        status.config.estop_on_fault
    );
    if status.telemetry.is_empty() {
        println!("Telemetry: (none received)");
        return;
    }
    let mut keys: Vec<&String> = status.telemetry.keys().collect();
    keys.sort();
    print!("Telemetry:");
    for key in keys {
        print!(" {}={}", key, status.telemetry[key]);
    }
    println!();
}

async fn cmd_status(bench: &Bench) -> Result<()> {
    if !wait_for_telemetry(&bench.controller, Duration::from_secs(5)).await {
        println!("No telemetry received within 5 s; is the MCU powered?");
    }
    print_status(&bench.controller);
    Ok(())
}

fn format_telemetry_line(msg: &evlink::Message) -> String {
    let mut line = String::from("DATA ");
    for (key, value) in msg.payload.iter() {
        line.push_str(&format!(" {key}={value}"));
    }
    line
}

async fn cmd_monitor(bench: &Bench, duration: u64, mut logger: Option<DataLogger>) -> Result<()> {
    let mut inbox: Inbox = bench.controller.link().inbox();
    let deadline = (duration > 0).then(|| Instant::now() + Duration::from_secs(duration));

    println!("Monitoring; Ctrl-C to stop.");
    loop {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                break;
            }
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
            maybe = inbox.poll(Duration::from_millis(250)) => {
                let Some(msg) = maybe else { continue };
                match msg.kind.as_str() {
                    kind::DATA => {
                        println!("{}", format_telemetry_line(&msg));
                        if let Some(logger) = logger.as_mut() {
                            logger.log(&msg)?;
                        }
                    }
                    kind::FAULT => {
                        let fault = msg
                            .payload
                            .get("FAULT")
                            .and_then(Value::as_str)
                            .unwrap_or("UNKNOWN");
                        println!("FAULT {fault}");
                    }
                    kind::NACK => {
                        println!("NACK  {:?}", msg.payload);
                    }
                    _ => {}
                }
            }
        }
    }

    print_status(&bench.controller);
    Ok(())
}

async fn cmd_confirmed(label: &str, result: evlink::Result<bool>) -> Result<()> {
    match result {
        Ok(true) => {
            println!("{label}: acknowledged");
            Ok(())
        }
        Ok(false) => {
            println!("{label}: NOT acknowledged (timeout or rejection)");
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("{label} failed")),
    }
}

fn cmd_config(cli: &Cli, app_config: &AppConfig, save: bool) -> Result<()> {
    let text = serde_json::to_string_pretty(app_config).context("failed to render config")?;
    println!("{text}");
    if save {
        app_config.save(&cli.config)?;
        println!("Saved to {}.", cli.config.display());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut app_config = AppConfig::load(&cli.config)?;
    if let Some(path) = &cli.log_csv {
        app_config.log_csv = path.display().to_string();
    }

    // Config inspection needs no connection.
    if let Command::Config { save } = &cli.command {
        return cmd_config(&cli, &app_config, *save);
    }

    let bench = connect(&cli, &app_config).await?;

    let result = match &cli.command {
        Command::Status => cmd_status(&bench).await,
        Command::Monitor { duration } => {
            let logger = if app_config.log_csv.is_empty() {
                None
            } else {
                Some(DataLogger::open(std::path::Path::new(&app_config.log_csv))?)
            };
            cmd_monitor(&bench, *duration, logger).await
        }
        Command::SetMaxCurrent { amps } => {
            cmd_confirmed("SET_MAX_CURRENT", bench.controller.set_max_current(*amps).await).await
        }
        Command::SetLimit { amps } => {
            cmd_confirmed("SET_CURRENT_LIMIT", bench.controller.set_current_limit(*amps).await)
                .await
        }
        Command::Estop => {
            bench
                .controller
                .emergency_stop()
                .await
                .context("emergency stop failed")?;
            println!("Emergency stop transmitted.");
            Ok(())
        }
        Command::ResetFaults => {
            cmd_confirmed("RESET_FAULT", bench.controller.reset_faults().await).await
        }
        Command::Config { .. } => unreachable!("config handled above"),
    };

    bench.shutdown().await?;
    result
}
