//! MQTT session adapter behind [`BrokerSession`].
//!
//! Incoming messages are queued by the client's event callback into a
//! bounded inbox; [`BrokerSession::poll`] takes the oldest message for a
//! topic without blocking.
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::mqtt::client::EspMqttClient`.
//! - **other targets**: an in-memory session that records traffic and
//!   lets tests inject control messages.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use log::{info, warn};

use crate::app::ports::{BrokerSession, Message};
use crate::config::PublishConfig;
use crate::error::BrokerFault;

#[cfg(target_os = "espidf")]
use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration, QoS};

/// Messages held before new arrivals are dropped.
pub const INBOX_CAPACITY: usize = 16;

#[cfg(target_os = "espidf")]
const CONNECT_TIMEOUT_MS: u32 = 10_000;

type Inbox = Arc<Mutex<VecDeque<Message>>>;

fn enqueue(inbox: &Inbox, message: Message) {
    if let Ok(mut q) = inbox.lock() {
        if q.len() < INBOX_CAPACITY {
            q.push_back(message);
        } else {
            warn!("mqtt: inbox full, dropping message on {}", message.topic);
        }
    }
}

pub struct MqttAdapter {
    url: String,
    client_id: String,
    keepalive_secs: u16,
    connected: Arc<AtomicBool>,
    sessions: Arc<AtomicU32>,
    inbox: Inbox,
    #[cfg(target_os = "espidf")]
    client: Option<EspMqttClient<'static>>,
    #[cfg(not(target_os = "espidf"))]
    sim: SimSession,
}

#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
struct SimSession {
    published: Vec<Message>,
    subscriptions: Vec<String>,
    failing_connects: u32,
    connects: u32,
}

impl MqttAdapter {
    pub fn new(publish: &PublishConfig, client_id: &str) -> Self {
        Self {
            url: format!("mqtt://{}:{}", publish.server, publish.port),
            client_id: client_id.into(),
            keepalive_secs: publish.keepalive,
            connected: Arc::new(AtomicBool::new(false)),
            sessions: Arc::new(AtomicU32::new(0)),
            inbox: Arc::new(Mutex::new(VecDeque::with_capacity(INBOX_CAPACITY))),
            #[cfg(target_os = "espidf")]
            client: None,
            #[cfg(not(target_os = "espidf"))]
            sim: SimSession::default(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn take_for(&self, topic: &str) -> Result<Option<Message>, BrokerFault> {
        let mut q = self.inbox.lock().map_err(|_| BrokerFault::PollFailed)?;
        Ok(q.iter().position(|m| m.topic == topic).and_then(|i| q.remove(i)))
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF session
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
impl BrokerSession for MqttAdapter {
    fn connect(&mut self, clean_session: bool) -> Result<(), BrokerFault> {
        use esp_idf_hal::delay::FreeRtos;

        self.client = None;
        self.connected.store(false, Ordering::Release);

        let conf = MqttClientConfiguration {
            client_id: Some(&self.client_id),
            keep_alive_interval: (self.keepalive_secs > 0)
                .then(|| core::time::Duration::from_secs(u64::from(self.keepalive_secs))),
            disable_clean_session: !clean_session,
            ..Default::default()
        };

        let connected = Arc::clone(&self.connected);
        let sessions = Arc::clone(&self.sessions);
        let inbox = Arc::clone(&self.inbox);
        let client = EspMqttClient::new_cb(&self.url, &conf, move |event| match event.payload() {
            EventPayload::Connected(_) => {
                // Also fires when the client reconnects by itself.
                sessions.fetch_add(1, Ordering::AcqRel);
                connected.store(true, Ordering::Release);
            }
            EventPayload::Disconnected => connected.store(false, Ordering::Release),
            EventPayload::Received {
                topic: Some(topic),
                data,
                ..
            } => enqueue(
                &inbox,
                Message {
                    topic: topic.into(),
                    payload: data.to_vec(),
                    retain: false,
                },
            ),
            _ => {}
        })
        .map_err(|e| {
            warn!("mqtt: client create failed: {e}");
            BrokerFault::ConnectFailed
        })?;

        let mut waited = 0;
        while !self.connected.load(Ordering::Acquire) {
            if waited >= CONNECT_TIMEOUT_MS {
                warn!("mqtt: no CONNACK from {} within {} ms", self.url, CONNECT_TIMEOUT_MS);
                return Err(BrokerFault::ConnectFailed);
            }
            FreeRtos::delay_ms(50);
            waited += 50;
        }
        self.client = Some(client);
        info!("mqtt: connected to {} as {}", self.url, self.client_id);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client.is_some() && self.connected.load(Ordering::Acquire)
    }

    fn session(&self) -> u32 {
        self.sessions.load(Ordering::Acquire)
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), BrokerFault> {
        let client = self.client.as_mut().ok_or(BrokerFault::NotConnected)?;
        client
            .publish(topic, QoS::AtMostOnce, retain, payload)
            .map(|_| ())
            .map_err(|_| BrokerFault::PublishFailed)
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), BrokerFault> {
        let client = self.client.as_mut().ok_or(BrokerFault::NotConnected)?;
        client
            .subscribe(topic, QoS::AtMostOnce)
            .map(|_| ())
            .map_err(|_| BrokerFault::SubscribeFailed)
    }

    fn poll(&mut self, topic: &str) -> Result<Option<Message>, BrokerFault> {
        if !self.is_connected() {
            return Err(BrokerFault::NotConnected);
        }
        self.take_for(topic)
    }

    fn disconnect(&mut self) -> Result<(), BrokerFault> {
        // Dropping the client sends DISCONNECT and stops its task.
        self.client = None;
        self.connected.store(false, Ordering::Release);
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation session
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl MqttAdapter {
    /// Queue a message as if the broker had delivered it.
    pub fn inject(&self, topic: &str, payload: &[u8]) {
        enqueue(
            &self.inbox,
            Message {
                topic: topic.into(),
                payload: payload.to_vec(),
                retain: false,
            },
        );
    }

    /// Make the next `n` connect attempts fail.
    pub fn fail_next_connects(&mut self, n: u32) {
        self.sim.failing_connects = n;
    }

    pub fn published(&self) -> &[Message] {
        &self.sim.published
    }

    pub fn subscriptions(&self) -> &[String] {
        &self.sim.subscriptions
    }

    pub fn connect_count(&self) -> u32 {
        self.sim.connects
    }
}

#[cfg(not(target_os = "espidf"))]
impl BrokerSession for MqttAdapter {
    fn connect(&mut self, clean_session: bool) -> Result<(), BrokerFault> {
        self.sim.connects += 1;
        if self.sim.failing_connects > 0 {
            self.sim.failing_connects -= 1;
            return Err(BrokerFault::ConnectFailed);
        }
        if clean_session {
            self.sim.subscriptions.clear();
        }
        self.sessions.fetch_add(1, Ordering::AcqRel);
        self.connected.store(true, Ordering::Release);
        info!("mqtt(sim): connected to {} as {}", self.url, self.client_id);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn session(&self) -> u32 {
        self.sessions.load(Ordering::Acquire)
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), BrokerFault> {
        if !self.is_connected() {
            return Err(BrokerFault::NotConnected);
        }
        self.sim.published.push(Message {
            topic: topic.into(),
            payload: payload.to_vec(),
            retain,
        });
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), BrokerFault> {
        if !self.is_connected() {
            return Err(BrokerFault::NotConnected);
        }
        if !self.sim.subscriptions.iter().any(|t| t == topic) {
            self.sim.subscriptions.push(topic.into());
        }
        Ok(())
    }

    fn poll(&mut self, topic: &str) -> Result<Option<Message>, BrokerFault> {
        if !self.is_connected() {
            return Err(BrokerFault::NotConnected);
        }
        self.take_for(topic)
    }

    fn disconnect(&mut self) -> Result<(), BrokerFault> {
        self.connected.store(false, Ordering::Release);
        Ok(())
    }
}
