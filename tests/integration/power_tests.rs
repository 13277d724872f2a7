//! Power transitions.

use pinbridge::app::ports::BrokerSession;
use pinbridge::power::{PowerMode, PowerScheduler};

use crate::mock_hw::{Call, CallLog, MockBroker, MockSystem, RecordingDelay, config};

fn run(mode: PowerMode, sleep_ms: u32, broker: &mut MockBroker, log: &CallLog) -> RecordingDelay {
    let mut system = MockSystem::new(log.clone());
    let mut delay = RecordingDelay::default();
    PowerScheduler::new(mode, sleep_ms).enter(broker, &mut system, &mut delay);
    delay
}

#[test]
fn deep_sleep_disconnects_before_powering_down() {
    let log = CallLog::default();
    let mut broker = MockBroker::connected(log.clone());
    run(PowerMode::DeepSleep, 60_000, &mut broker, &log);

    assert_eq!(log.calls(), vec![Call::Disconnect, Call::DeepSleep(Some(60_000))]);
}

#[test]
fn deep_sleep_without_session_skips_disconnect() {
    let log = CallLog::default();
    let mut broker = MockBroker::new(log.clone());
    run(PowerMode::DeepSleep, 0, &mut broker, &log);

    assert_eq!(log.calls(), vec![Call::DeepSleep(None)]);
}

#[test]
fn failed_disconnect_still_sleeps() {
    let log = CallLog::default();
    let mut broker = MockBroker::connected(log.clone());
    broker.fail_disconnect = true;
    run(PowerMode::DeepSleep, 1_000, &mut broker, &log);

    assert_eq!(log.calls().last(), Some(&Call::DeepSleep(Some(1_000))));
}

#[test]
fn wait_blocks_on_the_delay_provider() {
    let log = CallLog::default();
    let mut broker = MockBroker::connected(log.clone());
    let delay = run(PowerMode::Wait, 2_500, &mut broker, &log);

    assert_eq!(delay.total_ms(), 2_500);
    assert!(log.calls().is_empty());
    assert!(broker.is_connected());
}

#[test]
fn idle_and_light_sleep_keep_the_session() {
    let log = CallLog::default();
    let mut broker = MockBroker::connected(log.clone());
    run(PowerMode::Idle, 5_000, &mut broker, &log);
    run(PowerMode::LightSleep, 5_000, &mut broker, &log);

    assert_eq!(log.calls(), vec![Call::Idle, Call::LightSleep(5_000, vec![])]);
}

#[test]
fn light_sleep_wakes_on_edge_pins() {
    let log = CallLog::default();
    let mut broker = MockBroker::connected(log.clone());
    let mut system = MockSystem::new(log.clone());
    let mut scheduler = PowerScheduler::new(PowerMode::LightSleep, 5_000);
    scheduler.set_wake_pins(vec![5, 18]);
    scheduler.enter(&mut broker, &mut system, &mut RecordingDelay::default());

    assert_eq!(log.calls(), vec![Call::LightSleep(5_000, vec![5, 18])]);
}

#[test]
fn mode_follows_sleep_type() {
    let cases = [
        ("wait", PowerMode::Wait),
        ("idle", PowerMode::Idle),
        ("sleep", PowerMode::LightSleep),
        ("deepsleep", PowerMode::DeepSleep),
    ];
    for (sleep_type, mode) in cases {
        let cfg = config(&format!(
            r#"{{"sleep_type": "{sleep_type}", "sleep_time": 100, "publish": {{"server": "h"}}}}"#
        ));
        assert_eq!(PowerScheduler::from_config(&cfg).mode(), mode);
    }
}
