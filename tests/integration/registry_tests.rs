//! Registry population: create-once, all-or-nothing, timer arming.

use std::sync::Arc;

use pinbridge::endpoint::Trigger;
use pinbridge::endpoint::capability::{Capability, CapabilityTable};
use pinbridge::error::{BrokerFault, CapabilityError, Error, HardwareFault};
use pinbridge::registry::{DeviceRegistry, InitContext};

use crate::mock_hw::{CallLog, MockBoard, MockBroker, MockTimers, RecordingDelay, config};

const TWO_ENDPOINTS: &str = r#"{
    "publish": {"server": "10.0.0.2"},
    "device": {
        "door": {
            "pin": 4,
            "read": {"function": "read_status", "interval": 2},
            "publish": {"interval": 20}
        },
        "lamp": {
            "pin": 2,
            "subscribe": {"function": "write_status", "interval": 5},
            "publish": {}
        }
    }
}"#;

struct Rig {
    board: Arc<MockBoard>,
    broker: MockBroker,
    timers: MockTimers,
    delay: RecordingDelay,
}

impl Rig {
    fn new() -> Self {
        Self {
            board: MockBoard::new(),
            broker: MockBroker::connected(CallLog::default()),
            timers: MockTimers::new(),
            delay: RecordingDelay::default(),
        }
    }

    fn init(&mut self, registry: &mut DeviceRegistry<MockBoard>, doc: &str) -> Result<bool, Error> {
        let cfg = config(doc);
        let mut ctx = InitContext {
            broker: &mut self.broker,
            timers: &mut self.timers,
            delay: &mut self.delay,
        };
        registry.ensure_initialized(&cfg, &self.board, &mut ctx)
    }
}

#[test]
fn endpoints_are_built_in_configuration_order() {
    let mut rig = Rig::new();
    let mut reg = DeviceRegistry::new(CapabilityTable::standard());
    assert!(rig.init(&mut reg, TWO_ENDPOINTS).unwrap());

    let names: Vec<&str> = reg.iter().map(|e| e.name()).collect();
    assert_eq!(names, ["door", "lamp"]);
    assert_eq!(reg.get("door").unwrap().trigger(), Trigger::Every { period_ms: 2_000 });
    assert_eq!(reg.get("lamp").unwrap().write_capability(), Some(Capability::WriteStatus));
    assert_eq!(rig.broker.subscriptions(), ["esp/a4cf12b3c4d5/lamp/control"]);
}

#[test]
fn second_call_constructs_nothing() {
    let mut rig = Rig::new();
    let mut reg = DeviceRegistry::new(CapabilityTable::standard());
    rig.init(&mut reg, TWO_ENDPOINTS).unwrap();
    let built = reg.constructions();
    let armed = rig.timers.periodic.len();

    assert!(!rig.init(&mut reg, TWO_ENDPOINTS).unwrap());
    assert_eq!(reg.constructions(), built);
    assert_eq!(rig.timers.periodic.len(), armed);
    assert_eq!(rig.broker.subscriptions().len(), 1);
}

#[test]
fn empty_device_map_initializes_once() {
    let mut rig = Rig::new();
    let mut reg = DeviceRegistry::new(CapabilityTable::standard());
    let doc = r#"{"publish": {"server": "10.0.0.2"}}"#;

    assert!(rig.init(&mut reg, doc).unwrap());
    assert!(reg.is_initialized());
    assert!(!rig.init(&mut reg, doc).unwrap());
    assert_eq!(reg.constructions(), 0);
}

#[test]
fn timers_only_raise_flags() {
    let mut rig = Rig::new();
    let mut reg = DeviceRegistry::new(CapabilityTable::standard());
    rig.init(&mut reg, TWO_ENDPOINTS).unwrap();

    // door: read every 2 s + publish every 20 s; lamp: publish 30 s + subscribe 5 s.
    let mut periods = rig.timers.periods();
    periods.sort_unstable();
    assert_eq!(periods, [2_000, 5_000, 20_000, 30_000]);

    rig.board.drive(4, true);
    rig.timers.fire_every(2_000);
    rig.timers.fire_every(20_000);
    rig.timers.fire_every(5_000);
    assert!(rig.broker.published().is_empty());

    let door = reg.get("door").unwrap();
    assert!(door.take_publish_due());
    assert!(!door.take_publish_due());
    assert!(reg.get("lamp").unwrap().take_subscribe_due());
    assert_eq!(door.harvest().events, 1);
}

#[test]
fn edge_triggered_endpoint_arms_an_interrupt() {
    let mut rig = Rig::new();
    let mut reg = DeviceRegistry::new(CapabilityTable::standard());
    rig.init(
        &mut reg,
        r#"{
            "publish": {"server": "10.0.0.2"},
            "device": {
                "fan": {"pin": 5, "read": {"irq": true}, "function_sample": "sample_rpm", "publish": {}}
            }
        }"#,
    )
    .unwrap();

    assert_eq!(rig.timers.edges.len(), 1);
    assert_eq!(reg.edge_pins(), [5]);
    rig.timers.fire_edge(5);
    rig.timers.fire_edge(5);
    rig.timers.fire_edge(6);
    assert_eq!(reg.get("fan").unwrap().harvest().events, 2);
}

#[test]
fn failing_endpoint_leaves_registry_empty() {
    let mut rig = Rig::new();
    let mut reg = DeviceRegistry::new(CapabilityTable::standard());
    let doc = r#"{
        "publish": {"server": "10.0.0.2"},
        "device": {
            "door": {"pin": 4, "read": {"function": "read_status", "interval": 2}},
            "bad": {"pin": 6, "read": {"function": "read_lux", "interval": 2}}
        }
    }"#;

    assert!(matches!(
        rig.init(&mut reg, doc),
        Err(Error::Capability(CapabilityError::Unknown { .. }))
    ));
    assert!(reg.is_empty());
    assert!(rig.timers.periodic.is_empty());
}

#[test]
fn activation_failure_cancels_armed_timers() {
    let mut rig = Rig::new();
    rig.timers.fail_after(2);
    let mut reg = DeviceRegistry::new(CapabilityTable::standard());

    assert_eq!(
        rig.init(&mut reg, TWO_ENDPOINTS),
        Err(Error::Hardware(HardwareFault::TimerSetupFailed))
    );
    assert!(reg.is_empty());
    assert_eq!(rig.timers.cancelled, 1);
    assert!(rig.timers.periodic.is_empty());
}

#[test]
fn subscribe_failure_then_retry_succeeds() {
    let mut rig = Rig::new();
    rig.broker.fail_next_subscribes(1);
    let mut reg = DeviceRegistry::new(CapabilityTable::standard());

    assert_eq!(
        rig.init(&mut reg, TWO_ENDPOINTS),
        Err(Error::Broker(BrokerFault::SubscribeFailed))
    );
    assert!(reg.is_empty());

    assert!(rig.init(&mut reg, TWO_ENDPOINTS).unwrap());
    assert_eq!(reg.len(), 2);
    assert_eq!(reg.constructions(), 4);
}

#[test]
fn restricted_table_rejects_sensor_functions() {
    let mut rig = Rig::new();
    let mut reg = DeviceRegistry::new(CapabilityTable::only(&[Capability::ReadStatus]));
    let err = rig
        .init(
            &mut reg,
            r#"{
                "publish": {"server": "10.0.0.2"},
                "device": {"climate": {"pin": 15, "read": {"function": "read_dht22", "interval": 5}}}
            }"#,
        )
        .unwrap_err();
    assert!(matches!(err, Error::Capability(CapabilityError::Unknown { .. })));
}

#[test]
fn resubscribe_covers_every_subscribing_endpoint() {
    let mut rig = Rig::new();
    let mut reg = DeviceRegistry::new(CapabilityTable::standard());
    rig.init(&mut reg, TWO_ENDPOINTS).unwrap();
    rig.broker.log.clear();

    assert_eq!(reg.resubscribe(&mut rig.broker).unwrap(), 1);
    assert_eq!(rig.broker.subscriptions(), ["esp/a4cf12b3c4d5/lamp/control"]);
}

#[test]
fn deep_sleep_config_runs_endpoints_once_without_timers() {
    let mut rig = Rig::new();
    let mut reg = DeviceRegistry::new(CapabilityTable::standard());
    rig.board.drive(4, true);
    rig.init(
        &mut reg,
        r#"{
            "sleep_type": "deepsleep",
            "publish": {"server": "10.0.0.2"},
            "device": {"door": {"pin": 4, "read": {"function": "read_status"}, "publish": {}}}
        }"#,
    )
    .unwrap();

    assert!(reg.get("door").unwrap().is_oneshot());
    assert!(rig.timers.periodic.is_empty());
    assert_eq!(
        rig.broker.published_to("esp/a4cf12b3c4d5/door"),
        [r#"{"value":1}"#.to_string()]
    );
}
