//! Publish / subscribe cycles against a mock broker.

use std::sync::Arc;

use pinbridge::bridge::{self, HealthRecord};
use pinbridge::config::{EndpointDefaults, EndpointPublishSpec, EndpointSpec, EndpointSubscribeSpec, ReadSpec};
use pinbridge::endpoint::Endpoint;
use pinbridge::endpoint::capability::CapabilityTable;
use pinbridge::endpoint::reading::Reading;
use pinbridge::error::{BrokerFault, Error};

use crate::mock_hw::{CallLog, DEVICE_ID, MockBoard, MockBroker, RecordingDelay};

const DATA: &str = "esp/a4cf12b3c4d5/door";
const LAMP: &str = "esp/a4cf12b3c4d5/lamp";
const LAMP_CONTROL: &str = "esp/a4cf12b3c4d5/lamp/control";

fn endpoint(spec: &EndpointSpec, board: &Arc<MockBoard>) -> Endpoint<MockBoard> {
    Endpoint::new(
        spec,
        &CapabilityTable::standard(),
        Arc::clone(board),
        &EndpointDefaults::for_device(DEVICE_ID),
    )
    .unwrap()
}

fn door(retain: bool) -> EndpointSpec {
    let mut spec = EndpointSpec::named("door");
    spec.pin = Some(4);
    spec.read = Some(ReadSpec {
        function: Some("read_status".into()),
        irq: true,
        interval: None,
    });
    spec.publish = Some(EndpointPublishSpec {
        retain: Some(retain),
        ..Default::default()
    });
    spec
}

fn lamp(echo: bool, publish: bool) -> EndpointSpec {
    let mut spec = EndpointSpec::named("lamp");
    spec.pin = Some(2);
    spec.subscribe = Some(EndpointSubscribeSpec {
        function: Some("write_status".into()),
        echo,
        ..Default::default()
    });
    if publish {
        spec.publish = Some(Default::default());
    }
    spec
}

fn three_events(board: &MockBoard, ep: &Endpoint<MockBoard>) {
    for level in [true, false, true] {
        board.drive(4, level);
        ep.on_event();
    }
}

#[test]
fn non_retained_publishes_every_reading_in_order() {
    let board = MockBoard::new();
    let ep = endpoint(&door(false), &board);
    let mut broker = MockBroker::connected(CallLog::default());
    three_events(&board, &ep);

    assert_eq!(bridge::publish_cycle(&ep, &mut broker).unwrap(), 3);
    assert_eq!(
        broker.published(),
        vec![
            (DATA.to_string(), r#"{"value":1}"#.to_string(), false),
            (DATA.to_string(), r#"{"value":0}"#.to_string(), false),
            (DATA.to_string(), r#"{"value":1}"#.to_string(), false),
        ]
    );
}

#[test]
fn retained_publishes_only_the_latest() {
    let board = MockBoard::new();
    let ep = endpoint(&door(true), &board);
    let mut broker = MockBroker::connected(CallLog::default());
    board.drive(4, false);
    ep.on_event();
    ep.on_event();
    board.drive(4, true);
    ep.on_event();

    assert_eq!(bridge::publish_cycle(&ep, &mut broker).unwrap(), 1);
    assert_eq!(
        broker.published(),
        vec![(DATA.to_string(), r#"{"value":1}"#.to_string(), true)]
    );
}

#[test]
fn empty_harvest_publishes_nothing() {
    let board = MockBoard::new();
    let ep = endpoint(&door(true), &board);
    let mut broker = MockBroker::connected(CallLog::default());
    assert_eq!(bridge::publish_cycle(&ep, &mut broker).unwrap(), 0);
    assert!(broker.published().is_empty());
}

#[test]
fn publish_failure_propagates() {
    let board = MockBoard::new();
    let ep = endpoint(&door(false), &board);
    let mut broker = MockBroker::connected(CallLog::default());
    broker.fail_publishes_to(DATA);
    three_events(&board, &ep);
    assert_eq!(
        bridge::publish_cycle(&ep, &mut broker),
        Err(Error::Broker(BrokerFault::PublishFailed))
    );
}

#[test]
fn control_write_is_echoed_on_data_topic() {
    let board = MockBoard::new();
    let ep = endpoint(&lamp(true, true), &board);
    let mut broker = MockBroker::connected(CallLog::default());
    broker.inject(LAMP_CONTROL, r#"{"value":"1"}"#);

    let r = bridge::subscribe_cycle(&ep, &mut broker).unwrap();
    assert_eq!(r, Some(Reading::Status { value: "1".into() }));
    assert_eq!(board.level_of(2), Some(true));
    assert_eq!(broker.published_to(LAMP), vec![r#"{"value":"1"}"#.to_string()]);

    // Nothing pending: no write, no publish.
    assert_eq!(bridge::subscribe_cycle(&ep, &mut broker).unwrap(), None);
    assert_eq!(broker.published().len(), 1);
}

#[test]
fn garbage_control_payload_changes_nothing() {
    let board = MockBoard::new();
    let ep = endpoint(&lamp(true, true), &board);
    let mut broker = MockBroker::connected(CallLog::default());
    broker.inject(LAMP_CONTROL, "switch it on please");

    assert_eq!(bridge::subscribe_cycle(&ep, &mut broker).unwrap(), None);
    assert_eq!(board.level_of(2), Some(false));
    assert!(broker.published().is_empty());
}

#[test]
fn without_echo_the_record_waits_for_the_next_publish() {
    let board = MockBoard::new();
    let ep = endpoint(&lamp(false, true), &board);
    let mut broker = MockBroker::connected(CallLog::default());
    broker.inject(LAMP_CONTROL, "0");

    bridge::subscribe_cycle(&ep, &mut broker).unwrap();
    assert!(broker.published().is_empty());

    assert_eq!(bridge::publish_cycle(&ep, &mut broker).unwrap(), 1);
    assert_eq!(broker.published_to(LAMP), vec![r#"{"value":0}"#.to_string()]);
}

#[test]
fn subscribe_only_endpoint_keeps_nothing() {
    let board = MockBoard::new();
    let ep = endpoint(&lamp(true, false), &board);
    let mut broker = MockBroker::connected(CallLog::default());
    broker.inject(LAMP_CONTROL, "1");

    assert!(bridge::subscribe_cycle(&ep, &mut broker).unwrap().is_some());
    assert!(ep.harvest().is_empty());
    assert!(broker.published().is_empty());
}

#[test]
fn poll_on_lost_session_is_a_broker_fault() {
    let board = MockBoard::new();
    let ep = endpoint(&lamp(true, true), &board);
    let mut broker = MockBroker::new(CallLog::default());
    assert_eq!(
        bridge::subscribe_cycle(&ep, &mut broker),
        Err(Error::Broker(BrokerFault::NotConnected))
    );
}

#[test]
fn oneshot_reads_publishes_then_polls() {
    let board = MockBoard::new();
    let mut spec = lamp(true, true);
    spec.read = Some(ReadSpec {
        function: Some("read_status".into()),
        irq: false,
        interval: None,
    });
    spec.oneshot = true;
    let ep = endpoint(&spec, &board);
    let mut broker = MockBroker::connected(CallLog::default());
    broker.inject(LAMP_CONTROL, "1");
    let mut delay = RecordingDelay::default();

    assert_eq!(bridge::run_oneshot(&ep, &mut broker, &mut delay).unwrap(), 1);
    // Read record first, then the echo of the control write.
    assert_eq!(
        broker.published_to(LAMP),
        vec![r#"{"value":0}"#.to_string(), r#"{"value":1}"#.to_string()]
    );
    assert_eq!(delay.calls, 0);
}

#[test]
fn oneshot_read_is_retried() {
    let board = MockBoard::new();
    let mut spec = door(false);
    spec.read = Some(ReadSpec {
        function: Some("read_status".into()),
        irq: false,
        interval: None,
    });
    spec.oneshot = true;
    let ep = endpoint(&spec, &board);
    let mut broker = MockBroker::connected(CallLog::default());
    let mut delay = RecordingDelay::default();
    board.fail_reads(true);

    assert!(bridge::run_oneshot(&ep, &mut broker, &mut delay).is_err());
    assert_eq!(delay.total_ms(), 2 * 3_000);
    assert!(broker.published().is_empty());
}

#[test]
fn health_record_shape() {
    let mut broker = MockBroker::connected(CallLog::default());
    let record = HealthRecord {
        name: "porch".into(),
        id: DEVICE_ID.into(),
        uptime_ms: 5_000,
        mem_free: 1_000,
        mem_alloc: 200,
    };
    bridge::publish_health(&mut broker, &record, "esp/a4cf12b3c4d5/health").unwrap();

    let (topic, payload, retain) = broker.published().remove(0);
    assert_eq!(topic, "esp/a4cf12b3c4d5/health");
    assert!(!retain);
    let v: serde_json::Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(
        v,
        serde_json::json!({
            "name": "porch",
            "id": DEVICE_ID,
            "uptime_ms": 5000,
            "mem_free": 1000,
            "mem_alloc": 200
        })
    );
}
