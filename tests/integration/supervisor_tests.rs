//! Supervisor loop: state flow, fault policy, reconnects and health.

use std::sync::Arc;

use pinbridge::app::events::{AppEvent, CycleReport};
use pinbridge::app::ports::BrokerSession;
use pinbridge::app::supervisor::{Flow, LoopState, SupervisorLoop};
use pinbridge::error::{BrokerFault, Error};
use pinbridge::power::PowerMode;

use crate::mock_hw::{
    Call, CallLog, MockBoard, MockBroker, MockSystem, MockTimers, RecordingDelay, RecordingSink,
    config,
};

type Supervisor =
    SupervisorLoop<MockBoard, MockBroker, MockTimers, MockSystem, RecordingDelay, RecordingSink>;

const HEALTH: &str = "esp/a4cf12b3c4d5/health";

fn doc(extra: &str) -> String {
    format!(
        r#"{{
            "sleep_time": 1000,
            "exception_wait": 2,
            "publish_health": false,
            "publish": {{"server": "10.0.0.2", "interval": 20}},
            "device": {{
                "door": {{"pin": 4, "read": {{"function": "read_status", "interval": 1}}, "publish": {{}}}},
                "lamp": {{"pin": 2, "subscribe": {{"function": "write_status"}}, "publish": {{}}}}
            }}{extra}
        }}"#
    )
}

fn rig(extra: &str) -> (Supervisor, Arc<MockBoard>, CallLog) {
    let log = CallLog::default();
    let board = MockBoard::new();
    let sup = SupervisorLoop::new(
        config(&doc(extra)),
        Arc::clone(&board),
        MockBroker::new(log.clone()),
        MockTimers::new(),
        MockSystem::new(log.clone()),
        RecordingDelay::default(),
        RecordingSink::default(),
    );
    (sup, board, log)
}

fn faults_of(sup: &Supervisor) -> Vec<Error> {
    sup.sink()
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::Fault { error, .. } => Some(error.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn first_cycle_connects_builds_and_waits() {
    let (mut sup, _board, _log) = rig("");
    assert_eq!(sup.run_cycle().unwrap(), Flow::Continue);

    assert_eq!(sup.broker().connect_count(), 1);
    assert_eq!(sup.registry().len(), 2);
    assert_eq!(sup.broker().subscriptions(), ["esp/a4cf12b3c4d5/lamp/control"]);
    assert_eq!(sup.state(), LoopState::PowerTransition);
    assert_eq!(sup.cycles(), 1);
    assert_eq!(sup.delay().total_ms(), 1_000);

    let events = &sup.sink().events;
    assert!(events.contains(&AppEvent::BrokerConnected { resubscribed: 0 }));
    assert!(events.contains(&AppEvent::RegistryReady { endpoints: 2 }));
    assert!(events.contains(&AppEvent::Cycle(CycleReport {
        cycle: 1,
        published: 0,
        received: 0
    })));
    assert_eq!(events.last(), Some(&AppEvent::PowerTransition(PowerMode::Wait)));
}

#[test]
fn later_cycles_move_due_data_only() {
    let (mut sup, board, _log) = rig("");
    sup.run_cycle().unwrap();
    let built = sup.registry().constructions();

    board.drive(4, true);
    sup.timers_mut().fire_every(1_000);
    sup.timers_mut().fire_every(1_000);
    sup.timers_mut().fire_every(20_000);
    sup.broker_mut().inject("esp/a4cf12b3c4d5/lamp/control", "1");
    sup.timers_mut().fire_every(10_000);
    sup.run_cycle().unwrap();

    assert_eq!(sup.registry().constructions(), built);
    assert_eq!(
        sup.broker().published_to("esp/a4cf12b3c4d5/door"),
        [r#"{"value":1}"#, r#"{"value":1}"#]
    );
    assert_eq!(sup.broker().published_to("esp/a4cf12b3c4d5/lamp"), [r#"{"value":1}"#]);
    assert!(sup.sink().events.contains(&AppEvent::Cycle(CycleReport {
        cycle: 2,
        published: 2,
        received: 1
    })));
}

#[test]
fn reconnect_resubscribes_without_rebuilding() {
    let (mut sup, _board, _log) = rig("");
    sup.run_cycle().unwrap();
    let built = sup.registry().constructions();

    sup.broker_mut().drop_connection();
    sup.run_cycle().unwrap();

    assert_eq!(sup.broker().connect_count(), 2);
    assert_eq!(sup.registry().constructions(), built);
    assert_eq!(sup.broker().subscriptions().len(), 2);
    assert!(sup.sink().events.contains(&AppEvent::BrokerConnected { resubscribed: 1 }));
}

#[test]
fn client_side_reconnect_still_resubscribes() {
    let (mut sup, _board, _log) = rig("");
    sup.run_cycle().unwrap();

    sup.broker_mut().reconnect_silently();
    sup.run_cycle().unwrap();

    assert_eq!(sup.broker().connect_count(), 1);
    assert_eq!(
        sup.broker().subscriptions(),
        ["esp/a4cf12b3c4d5/lamp/control", "esp/a4cf12b3c4d5/lamp/control"]
    );
    assert!(sup.sink().events.contains(&AppEvent::BrokerConnected { resubscribed: 1 }));

    // Same session: nothing to re-register.
    sup.run_cycle().unwrap();
    assert_eq!(sup.broker().subscriptions().len(), 2);
}

#[test]
fn empty_device_map_is_ready_once() {
    let log = CallLog::default();
    let mut sup: Supervisor = SupervisorLoop::new(
        config(r#"{"sleep_time": 10, "publish_health": false, "publish": {"server": "10.0.0.2"}}"#),
        MockBoard::new(),
        MockBroker::new(log.clone()),
        MockTimers::new(),
        MockSystem::new(log),
        RecordingDelay::default(),
        RecordingSink::default(),
    );
    sup.run_cycle().unwrap();
    sup.run_cycle().unwrap();

    let ready = sup
        .sink()
        .events
        .iter()
        .filter(|e| matches!(e, AppEvent::RegistryReady { .. }))
        .count();
    assert_eq!(ready, 1);
    assert!(sup.registry().is_initialized());
    assert!(sup.registry().is_empty());
}

#[test]
fn light_sleep_wakes_on_edge_endpoint_pins() {
    let log = CallLog::default();
    let mut sup: Supervisor = SupervisorLoop::new(
        config(
            r#"{
                "sleep_type": "sleep",
                "sleep_time": 1000,
                "publish_health": false,
                "publish": {"server": "10.0.0.2"},
                "device": {
                    "fan": {"pin": 5, "read": {"irq": true}, "function_sample": "sample_rpm", "publish": {}},
                    "door": {"pin": 4, "read": {"function": "read_status", "interval": 1}}
                }
            }"#,
        ),
        MockBoard::new(),
        MockBroker::new(log.clone()),
        MockTimers::new(),
        MockSystem::new(log.clone()),
        RecordingDelay::default(),
        RecordingSink::default(),
    );
    sup.run_cycle().unwrap();

    assert_eq!(log.calls().last(), Some(&Call::LightSleep(1_000, vec![5])));
}

#[test]
fn connect_failure_waits_then_resets() {
    let (mut sup, _board, log) = rig("");
    sup.broker_mut().fail_next_connects(3);

    assert_eq!(sup.run_cycle().unwrap(), Flow::Continue);
    assert_eq!(sup.broker().connect_count(), 3);
    assert_eq!(sup.faults(), 1);
    assert_eq!(sup.state(), LoopState::HandleFault);
    assert_eq!(faults_of(&sup), [Error::Broker(BrokerFault::ConnectFailed)]);
    // Two retry pauses, then exception_wait.
    assert_eq!(sup.delay().total_ms(), 2 * 3_000 + 2_000);
    assert_eq!(log.calls().last(), Some(&Call::Restart));

    // The next cycle starts over from the broker connection.
    assert_eq!(sup.run_cycle().unwrap(), Flow::Continue);
    assert_eq!(sup.registry().len(), 2);
}

#[test]
fn raise_surfaces_the_fault() {
    let (mut sup, _board, log) = rig(r#", "exception_raise": true"#);
    sup.broker_mut().fail_next_connects(3);

    assert_eq!(sup.run_cycle(), Err(Error::Broker(BrokerFault::ConnectFailed)));
    assert!(faults_of(&sup).is_empty());
    assert!(!log.calls().contains(&Call::Restart));
}

#[test]
fn exit_ends_the_run() {
    let (mut sup, _board, log) =
        rig(r#", "exception_reset": false, "exception_exit": true"#);
    sup.broker_mut().fail_next_connects(3);

    sup.run().unwrap();

    let events = &sup.sink().events;
    assert!(matches!(events.first(), Some(AppEvent::Started { endpoints: 2, .. })));
    assert_eq!(events.last(), Some(&AppEvent::Exiting));
    assert_eq!(sup.faults(), 1);
    assert!(!log.calls().contains(&Call::Restart));
}

#[test]
fn registry_fault_is_retried_next_cycle() {
    let (mut sup, _board, _log) = rig("");
    sup.broker_mut().connect(true).unwrap();
    sup.broker_mut().fail_next_subscribes(1);

    sup.run_cycle().unwrap();
    assert!(sup.registry().is_empty());
    assert_eq!(faults_of(&sup), [Error::Broker(BrokerFault::SubscribeFailed)]);

    sup.run_cycle().unwrap();
    assert_eq!(sup.registry().len(), 2);
}

#[test]
fn health_is_published_each_cycle() {
    let (mut sup, _board, _log) = rig(r#", "publish_health": true"#);
    sup.run_cycle().unwrap();

    let health = sup.broker().published_to(HEALTH);
    assert_eq!(health.len(), 1);
    let v: serde_json::Value = serde_json::from_str(&health[0]).unwrap();
    assert_eq!(v["id"], "a4cf12b3c4d5");
    assert_eq!(v["name"], "a4cf12b3c4d5");
    assert_eq!(v["uptime_ms"], 12_345);
}

#[test]
fn failed_health_publish_does_not_abort_the_cycle() {
    let (mut sup, _board, _log) = rig(r#", "publish_health": true"#);
    sup.broker_mut().fail_publishes_to(HEALTH);
    sup.run_cycle().unwrap();

    assert_eq!(sup.faults(), 0);
    assert_eq!(sup.cycles(), 1);
    assert!(
        sup.sink()
            .events
            .contains(&AppEvent::HealthSkipped(Error::Broker(BrokerFault::PublishFailed)))
    );
}

#[test]
fn deep_sleep_cycle_disconnects_then_sleeps() {
    let (mut sup, _board, log) = rig(r#", "sleep_type": "deepsleep""#);
    sup.run_cycle().unwrap();

    let calls = log.calls();
    let disconnect = calls.iter().position(|c| *c == Call::Disconnect).unwrap();
    let sleep = calls
        .iter()
        .position(|c| *c == Call::DeepSleep(Some(1_000)))
        .unwrap();
    assert!(disconnect < sleep);
    assert!(sup.timers_mut().periodic.is_empty());
    assert_eq!(
        sup.broker().published_to("esp/a4cf12b3c4d5/door"),
        [r#"{"value":0}"#]
    );
}
