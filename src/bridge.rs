//! Moves endpoint data to and from the broker.
//!
//! All functions here run on the main loop and may block on the broker
//! session.  Timer callbacks only raise an endpoint's due flags;
//! [`run_due`] picks them up in registry order.

use embedded_hal::delay::DelayNs;
use log::{debug, info};
use serde::Serialize;

use crate::app::ports::{BoardPort, BrokerSession};
use crate::endpoint::reading::Reading;
use crate::endpoint::{Endpoint, PublishBinding};
use crate::error::{Error, Result};
use crate::registry::DeviceRegistry;
use crate::retry::{ATTEMPTS, RETRY_DELAY_MS, with_retry};

/// Device health telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthRecord {
    pub name: String,
    pub id: String,
    pub uptime_ms: u64,
    pub mem_free: u32,
    pub mem_alloc: u32,
}

/// Broker traffic produced by one [`run_due`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub published: usize,
    pub received: usize,
}

/// Harvest `endpoint` and publish the result.  Returns messages sent.
///
/// A retained binding publishes only the most recent reading (retained);
/// otherwise every reading goes out in harvest order.
pub fn publish_cycle<H: BoardPort>(
    endpoint: &Endpoint<H>,
    broker: &mut impl BrokerSession,
) -> Result<usize> {
    let Some(binding) = endpoint.publish() else {
        return Ok(0);
    };
    let harvest = endpoint.harvest();
    let sent = publish_readings(binding, &harvest.readings, broker)?;
    if sent > 0 {
        debug!("'{}': published {} message(s) to {}", endpoint.name(), sent, binding.topic);
    }
    Ok(sent)
}

fn publish_readings(
    binding: &PublishBinding,
    readings: &[Reading],
    broker: &mut impl BrokerSession,
) -> Result<usize> {
    if binding.retain {
        let Some(last) = readings.last() else {
            return Ok(0);
        };
        broker.publish(&binding.topic, &last.to_payload()?, true)?;
        return Ok(1);
    }
    for reading in readings {
        broker.publish(&binding.topic, &reading.to_payload()?, false)?;
    }
    Ok(readings.len())
}

/// Poll the endpoint's control topic once and apply a pending message.
///
/// The record produced by the write is appended to the aggregator only
/// when the endpoint publishes, and is sent right away when `echo` is on.
pub fn subscribe_cycle<H: BoardPort>(
    endpoint: &Endpoint<H>,
    broker: &mut impl BrokerSession,
) -> Result<Option<Reading>> {
    let Some(binding) = endpoint.subscribe() else {
        return Ok(None);
    };
    let Some(message) = broker.poll(&binding.topic)? else {
        return Ok(None);
    };
    debug!("'{}': control message on {}", endpoint.name(), message.topic);

    let Some(reading) = endpoint.write(&message.payload)? else {
        return Ok(None);
    };
    if endpoint.publish().is_some() {
        endpoint.record(reading.clone());
        if binding.echo {
            publish_cycle(endpoint, broker)?;
        }
    }
    Ok(Some(reading))
}

/// Run every publish and subscribe cycle whose timer fired since the last call.
pub fn run_due<H: BoardPort>(
    registry: &DeviceRegistry<H>,
    broker: &mut impl BrokerSession,
) -> Result<CycleStats> {
    let mut stats = CycleStats::default();
    for endpoint in registry.iter() {
        if endpoint.take_publish_due() {
            stats.published += publish_cycle(endpoint, broker)?;
        }
        if endpoint.take_subscribe_due() && subscribe_cycle(endpoint, broker)?.is_some() {
            stats.received += 1;
        }
    }
    Ok(stats)
}

/// Single read → publish → subscribe pass for one-shot endpoints.
pub fn run_oneshot<H: BoardPort>(
    endpoint: &Endpoint<H>,
    broker: &mut impl BrokerSession,
    delay: &mut impl DelayNs,
) -> Result<usize> {
    if endpoint.read_capability().is_some() {
        with_retry(ATTEMPTS, RETRY_DELAY_MS, delay, endpoint.name(), || endpoint.read_now())?;
    }
    let sent = publish_cycle(endpoint, broker)?;
    subscribe_cycle(endpoint, broker)?;
    info!("'{}': one-shot pass done ({} published)", endpoint.name(), sent);
    Ok(sent)
}

/// Publish the health record to `topic`.
pub fn publish_health(
    broker: &mut impl BrokerSession,
    record: &HealthRecord,
    topic: &str,
) -> Result<()> {
    let payload = serde_json::to_vec(record)
        .map_err(|_| Error::Unclassified("health serialisation failed"))?;
    broker.publish(topic, &payload, false)?;
    Ok(())
}
