//! The supervisory controller: wiring, periodic polling, and commands.
//!
//! [`Controller::start`] assembles the protocol engine over a
//! [`Transport`]: it registers the safety monitor's handlers, spawns the
//! transport loop, starts the periodic telemetry poll, and exposes the
//! command operations and read-only state snapshots that a dashboard or
//! logger consumes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use evlink_core::error::Result;
use evlink_core::kind;
use evlink_core::message::{Request, Value};
use evlink_core::transport::Transport;

use crate::bus::Router;
use crate::command::Commander;
use crate::link::{Link, LinkOptions};
use crate::monitor::SafetyMonitor;
use crate::state::{ControllerConfig, ControllerState, Status};

/// A running supervisory controller for one MCU link.
///
/// Owns the transport loop and the telemetry poll task. State accessors
/// return snapshots; commands go through the acknowledgement
/// coordinator with the configured timeout.
pub struct Controller {
    link: Arc<Link>,
    commander: Commander,
    state: Arc<Mutex<ControllerState>>,
    config: Arc<Mutex<ControllerConfig>>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl Controller {
    /// Start the controller over `transport` with default link tuning.
    pub fn start(transport: Box<dyn Transport>, config: ControllerConfig) -> Self {
        Self::start_with_options(transport, config, LinkOptions::default())
    }

    /// Start with explicit transport-loop tuning.
    pub fn start_with_options(
        transport: Box<dyn Transport>,
        config: ControllerConfig,
        options: LinkOptions,
    ) -> Self {
        let state = Arc::new(Mutex::new(ControllerState::default()));
        let config = Arc::new(Mutex::new(config));
        let monitor = Arc::new(SafetyMonitor::new(
            Arc::clone(&state),
            Arc::clone(&config),
        ));

        let mut router = Router::new();
        {
            let monitor = Arc::clone(&monitor);
            router.subscribe(
                kind::DATA,
                Box::new(move |msg| {
                    monitor.on_telemetry(msg);
                    Ok(None)
                }),
            );
        }
        {
            let monitor = Arc::clone(&monitor);
            router.subscribe(kind::FAULT, Box::new(move |msg| Ok(monitor.on_fault(msg))));
        }
        router.subscribe(
            kind::NACK,
            Box::new(move |msg| {
                monitor.on_nack(msg);
                Ok(None)
            }),
        );

        let link = Arc::new(Link::start(transport, router, options));
        let commander = Commander::new(Arc::clone(&link));

        // Periodic telemetry poll. Fire-and-forget: the request is
        // written and the loop moves on; responses arrive through the
        // normal dispatch path.
        let poll_task = {
            let link = Arc::clone(&link);
            let config = Arc::clone(&config);
            tokio::spawn(async move {
                loop {
                    let interval = config
                        .lock()
                        .expect("config mutex poisoned")
                        .telemetry_interval;
                    tokio::time::sleep(interval).await;
                    if link.send_request(&Request::new(kind::GET_TELEM)).await.is_err() {
                        // Link shut down; nothing left to poll.
                        break;
                    }
                }
            })
        };

        info!("controller started");
        Controller {
            link,
            commander,
            state,
            config,
            poll_task: Mutex::new(Some(poll_task)),
        }
    }

    fn command_timeout(&self) -> Duration {
        self.config
            .lock()
            .expect("config mutex poisoned")
            .command_timeout
    }

    /// Set the MCU's hard current ceiling, confirmed.
    ///
    /// The local configured value is updated only after the MCU
    /// acknowledges; on timeout or rejection it is left unchanged.
    pub async fn set_max_current(&self, amps: f64) -> Result<bool> {
        let req = Request::new(kind::SET_MAX_CURRENT).with("LIMIT", amps);
        let ok = self
            .commander
            .send_and_confirm(&req, self.command_timeout())
            .await?;
        if ok {
            self.config.lock().expect("config mutex poisoned").max_current = amps;
        }
        Ok(ok)
    }

    /// Set the MCU's soft current limit, confirmed.
    pub async fn set_current_limit(&self, amps: f64) -> Result<bool> {
        let req = Request::new(kind::SET_CURRENT_LIMIT).with("LIMIT", amps);
        let ok = self
            .commander
            .send_and_confirm(&req, self.command_timeout())
            .await?;
        if ok {
            self.config
                .lock()
                .expect("config mutex poisoned")
                .current_limit = amps;
        }
        Ok(ok)
    }

    /// Transmit an emergency stop, fire-and-forget.
    pub async fn emergency_stop(&self) -> Result<()> {
        warn!("emergency stop requested");
        self.commander.send(&Request::new(kind::ESTOP)).await
    }

    /// Ask the MCU to clear latched faults; clears the local fault set
    /// only on acknowledgement.
    pub async fn reset_faults(&self) -> Result<bool> {
        let req = Request::new(kind::RESET_FAULT);
        let ok = self
            .commander
            .send_and_confirm(&req, self.command_timeout())
            .await?;
        if ok {
            self.state
                .lock()
                .expect("state mutex poisoned")
                .clear_faults();
            info!("faults reset");
        }
        Ok(ok)
    }

    /// Snapshot of the merged telemetry map.
    pub fn telemetry(&self) -> HashMap<String, Value> {
        self.state
            .lock()
            .expect("state mutex poisoned")
            .telemetry
            .clone()
    }

    /// Snapshot of the active fault names, insertion order.
    pub fn faults(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("state mutex poisoned")
            .faults
            .clone()
    }

    /// Whether any telemetry has arrived from the MCU.
    pub fn is_connected(&self) -> bool {
        self.state.lock().expect("state mutex poisoned").connected
    }

    /// Full point-in-time snapshot for presentation layers.
    pub fn status(&self) -> Status {
        let state = self.state.lock().expect("state mutex poisoned");
        Status {
            connected: state.connected,
            faults: state.faults.clone(),
            telemetry: state.telemetry.clone(),
            config: self.config.lock().expect("config mutex poisoned").clone(),
        }
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> ControllerConfig {
        self.config.lock().expect("config mutex poisoned").clone()
    }

    /// Adjust configuration in place (thresholds, intervals).
    pub fn update_config(&self, f: impl FnOnce(&mut ControllerConfig)) {
        f(&mut self.config.lock().expect("config mutex poisoned"));
    }

    /// Direct access to the underlying link (inbox subscriptions).
    pub fn link(&self) -> &Arc<Link> {
        &self.link
    }

    /// Shut down: best-effort emergency stop, then stop the poll task
    /// and the transport loop.
    ///
    /// The stop transmission is attempted regardless of prior error
    /// state; its failure never blocks the rest of shutdown.
    pub async fn shutdown(&self) -> Result<()> {
        info!("controller shutting down");
        if let Err(e) = self.commander.send(&Request::new(kind::ESTOP)).await {
            warn!(error = %e, "final emergency stop failed");
        }
        if let Some(task) = self
            .poll_task
            .lock()
            .expect("poll task mutex poisoned")
            .take()
        {
            task.abort();
        }
        self.link.stop().await
    }
}
