//! Full-stack tests: a controller wired to the simulated MCU over an
//! in-process loopback, exercising telemetry flow, confirmed commands,
//! and the fault-to-emergency-stop path.

use std::time::Duration;

use tokio::time::Instant;

use evlink::{Controller, ControllerConfig};
use evlink_sim::{SimOptions, Simulator};
use evlink_test_harness::channel_pair;

fn bench() -> (Controller, Simulator) {
    let (controller_end, sim_end) = channel_pair();
    let sim = Simulator::spawn(
        Box::new(sim_end),
        SimOptions {
            tick_interval: Duration::from_millis(20),
            telemetry_interval: Duration::from_millis(50),
            noise: false,
        },
    );
    let config = ControllerConfig {
        telemetry_interval: Duration::from_millis(50),
        command_timeout: Duration::from_millis(500),
        ..Default::default()
    };
    let controller = Controller::start(Box::new(controller_end), config);
    (controller, sim)
}

async fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let until = Instant::now() + deadline;
    while Instant::now() < until {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn telemetry_flows_to_controller_state() {
    let (controller, sim) = bench();

    assert!(
        wait_until(Duration::from_secs(2), || controller.is_connected()).await,
        "controller never saw telemetry"
    );
    let telemetry = controller.telemetry();
    assert!(telemetry.contains_key("RPM"));
    assert!(telemetry.contains_key("TEMP"));
    assert!(telemetry.contains_key("SOC"));

    controller.shutdown().await.unwrap();
    sim.stop().await;
}

#[tokio::test]
async fn confirmed_command_round_trip() {
    let (controller, sim) = bench();

    let ok = controller.set_current_limit(40.0).await.unwrap();
    assert!(ok, "simulator should acknowledge the limit");
    assert_eq!(controller.config().current_limit, 40.0);
    assert_eq!(sim.state().current_limit, 40.0);

    let ok = controller.set_max_current(35.0).await.unwrap();
    assert!(ok);
    assert_eq!(sim.state().max_current, 35.0);

    controller.shutdown().await.unwrap();
    sim.stop().await;
}

#[tokio::test]
async fn mcu_fault_triggers_emergency_stop() {
    let (controller, sim) = bench();

    assert!(wait_until(Duration::from_secs(2), || controller.is_connected()).await);

    // Give the drive a nonzero setpoint so the emergency stop has a
    // visible effect, then push the motor past its own overtemp limit;
    // the next tick latches the fault and emits a FAULT frame.
    sim.set_torque(50.0);
    sim.set_temperature(95.0);

    assert!(
        wait_until(Duration::from_secs(2), || {
            controller.faults().contains(&"OVERTEMP".to_string())
        })
        .await,
        "controller never latched the MCU fault"
    );

    // The controller's reflex estop must reach the simulator and zero
    // the drive.
    assert!(
        wait_until(Duration::from_secs(2), || {
            let state = sim.state();
            state.speed == 0.0 && state.torque == 0.0
        })
        .await,
        "simulator never received the emergency stop"
    );

    controller.shutdown().await.unwrap();
    sim.stop().await;
}

#[tokio::test]
async fn overheat_telemetry_latches_local_fault() {
    let (controller, sim) = bench();

    sim.set_temperature(85.0);

    assert!(
        wait_until(Duration::from_secs(2), || {
            controller.faults().contains(&"OVERHEAT".to_string())
        })
        .await,
        "threshold check never fired on hot telemetry"
    );
    // Only the temperature threshold tripped.
    assert!(!controller.faults().contains(&"LOW_BATTERY".to_string()));

    controller.shutdown().await.unwrap();
    sim.stop().await;
}

#[tokio::test]
async fn reset_faults_clears_both_ends() {
    let (controller, sim) = bench();

    sim.set_soc(5.0);
    assert!(
        wait_until(Duration::from_secs(2), || !controller.faults().is_empty()).await
    );

    // Bring the condition back to normal before resetting, otherwise
    // the fault latches again on the next telemetry frame.
    sim.set_soc(90.0);
    {
        let mut cleared = false;
        for _ in 0..5 {
            if controller.reset_faults().await.unwrap() {
                cleared = true;
                break;
            }
        }
        assert!(cleared, "reset never acknowledged");
    }
    assert!(
        wait_until(Duration::from_secs(1), || sim.state().faults.is_empty()).await
    );

    controller.shutdown().await.unwrap();
    sim.stop().await;
}
