//! The simulator task: command handling, telemetry, fault pushes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use evlink_core::error::Error;
use evlink_core::kind;
use evlink_core::message::{Message, Request, Value};
use evlink_core::transport::Transport;
use evlink_protocol::codec;

use crate::physics::DriveState;

/// Simulator tuning.
#[derive(Debug, Clone)]
pub struct SimOptions {
    /// Physics tick period; also bounds command latency.
    pub tick_interval: Duration,
    /// Unsolicited telemetry push period.
    pub telemetry_interval: Duration,
    /// Add measurement noise to telemetry values.
    pub noise: bool,
}

impl Default for SimOptions {
    fn default() -> Self {
        SimOptions {
            tick_interval: Duration::from_millis(100),
            telemetry_interval: Duration::from_secs(1),
            noise: true,
        }
    }
}

/// A running simulated MCU.
///
/// The drive state is shared with the background task; accessors take
/// snapshots, and test hooks mutate it directly to force conditions the
/// physics would take too long to reach.
pub struct Simulator {
    state: Arc<Mutex<DriveState>>,
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Simulator {
    /// Spawn a simulator on the far end of `transport`.
    pub fn spawn(transport: Box<dyn Transport>, options: SimOptions) -> Simulator {
        let state = Arc::new(Mutex::new(DriveState::default()));
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run(
            transport,
            Arc::clone(&state),
            Arc::clone(&running),
            options,
        ));
        info!("simulator started");
        Simulator {
            state,
            running,
            task,
        }
    }

    /// Snapshot of the simulated drive.
    pub fn state(&self) -> DriveState {
        self.state.lock().expect("sim mutex poisoned").clone()
    }

    /// Test hook: force the motor temperature.
    pub fn set_temperature(&self, deg_c: f64) {
        self.state.lock().expect("sim mutex poisoned").temperature = deg_c;
    }

    /// Test hook: force the battery state of charge.
    pub fn set_soc(&self, percent: f64) {
        self.state.lock().expect("sim mutex poisoned").soc = percent;
    }

    /// Test hook: force the torque setpoint.
    pub fn set_torque(&self, percent: f64) {
        self.state.lock().expect("sim mutex poisoned").torque = percent;
    }

    /// Stop the task and wait for it to exit.
    pub async fn stop(self) {
        self.running.store(false, Ordering::Relaxed);
        if self.task.await.is_err() {
            warn!("simulator task panicked");
        }
        info!("simulator stopped");
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn telemetry_frame(state: &DriveState) -> Request {
    Request::new(kind::DATA)
        .with("RPM", round1(state.rpm))
        .with("TEMP", round1(state.temperature))
        .with("CURRENT", round1(state.current))
        .with("VOLTAGE", round2(state.voltage))
        .with("SOC", round1(state.soc))
}

fn ack(command: &str) -> Request {
    Request::new(kind::ACK).with("ACK", command)
}

fn nack(command: &str, reason: &str) -> Request {
    Request::new(kind::NACK)
        .with("CMD", command)
        .with("REASON", reason)
}

/// Apply one command to the drive and produce the replies it earns.
fn handle_command(state: &Mutex<DriveState>, msg: &Message) -> Vec<Request> {
    let mut state = state.lock().expect("sim mutex poisoned");
    debug!(kind = %msg.kind, "simulator received command");

    let set_param = |target: &mut f64, key: &str| -> Option<f64> {
        msg.payload.get(key).and_then(Value::as_f64).map(|v| {
            *target = v;
            v
        })
    };

    match msg.kind.as_str() {
        kind::SET_SPEED => match set_param(&mut state.speed, "SPEED") {
            Some(_) => vec![ack(kind::SET_SPEED)],
            None => vec![nack(kind::SET_SPEED, "MISSING_PARAM")],
        },
        kind::SET_TORQUE => match set_param(&mut state.torque, "TORQUE") {
            Some(_) => vec![ack(kind::SET_TORQUE)],
            None => vec![nack(kind::SET_TORQUE, "MISSING_PARAM")],
        },
        kind::SET_MAX_CURRENT => match set_param(&mut state.max_current, "LIMIT") {
            Some(_) => vec![ack(kind::SET_MAX_CURRENT)],
            None => vec![nack(kind::SET_MAX_CURRENT, "MISSING_PARAM")],
        },
        kind::SET_CURRENT_LIMIT => match set_param(&mut state.current_limit, "LIMIT") {
            Some(_) => vec![ack(kind::SET_CURRENT_LIMIT)],
            None => vec![nack(kind::SET_CURRENT_LIMIT, "MISSING_PARAM")],
        },
        kind::ESTOP => {
            state.halt();
            info!("simulator emergency stop");
            vec![ack(kind::ESTOP)]
        }
        kind::RESET_FAULT => {
            state.faults.clear();
            vec![ack(kind::RESET_FAULT)]
        }
        kind::GET_TELEM => vec![telemetry_frame(&state)],
        kind::GET_TEMP => {
            vec![Request::new(kind::DATA).with("TEMP", round1(state.temperature))]
        }
        kind::GET_STATUS => vec![Request::new(kind::DATA)
            .with("SPEED", state.speed)
            .with("TORQUE", state.torque)
            .with("FAULTS", state.faults.len() as i64)],
        kind::GET_FAULTS => {
            let list = if state.faults.is_empty() {
                "NONE".to_string()
            } else {
                state.faults.join(",")
            };
            vec![Request::new(kind::DATA).with("FAULTS", list.as_str())]
        }
        other => {
            debug!(kind = %other, "unknown command");
            vec![nack(other, "INVALID_COMMAND")]
        }
    }
}

async fn run(
    mut transport: Box<dyn Transport>,
    state: Arc<Mutex<DriveState>>,
    running: Arc<AtomicBool>,
    options: SimOptions,
) {
    let mut rx_buf = String::new();
    let mut chunk = [0u8; 256];
    let mut last_tick = Instant::now();
    let mut last_telemetry = Instant::now();

    'outer: while running.load(Ordering::Relaxed) {
        match transport.receive(&mut chunk, options.tick_interval).await {
            Ok(n) if n > 0 => {
                rx_buf.push_str(&String::from_utf8_lossy(&chunk[..n]));
                for raw in codec::drain_frames(&mut rx_buf) {
                    match codec::decode(&raw) {
                        Ok(msg) => {
                            for reply in handle_command(&state, &msg) {
                                if let Err(e) = transport.send(&codec::encode(&reply)).await {
                                    warn!(error = %e, "simulator send failed");
                                    break 'outer;
                                }
                            }
                        }
                        Err(e) => debug!(error = %e, raw = %raw, "undecodable frame"),
                    }
                }
            }
            Ok(_) => {}
            Err(Error::Timeout) => {}
            Err(e) => {
                warn!(error = %e, "simulator receive failed");
                break;
            }
        }

        if last_tick.elapsed() >= options.tick_interval {
            last_tick = Instant::now();
            let latched = state.lock().expect("sim mutex poisoned").tick(options.noise);
            for fault in latched {
                info!(fault = %fault, "simulator fault latched");
                let frame = Request::new(kind::FAULT).with("FAULT", fault.as_str());
                if let Err(e) = transport.send(&codec::encode(&frame)).await {
                    warn!(error = %e, "simulator fault send failed");
                    break 'outer;
                }
            }
        }

        if last_telemetry.elapsed() >= options.telemetry_interval {
            last_telemetry = Instant::now();
            let frame = telemetry_frame(&state.lock().expect("sim mutex poisoned"));
            if let Err(e) = transport.send(&codec::encode(&frame)).await {
                warn!(error = %e, "simulator telemetry send failed");
                break;
            }
        }
    }

    if let Err(e) = transport.close().await {
        debug!(error = %e, "simulator transport close failed");
    }
}
