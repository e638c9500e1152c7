//! ==============================================================================
//! broker.rs - mqtt connection owned by the host
//! ==============================================================================
//!
//! purpose:
//!     opens the one long-lived broker connection at startup, hands out
//!     cheap publish handles, and closes it again on shutdown.
//!
//! lifecycle:
//!
//!     main ── Broker::connect ──► AsyncClient ──► MqttPublisher (BrokerReporter)
//!                 │
//!                 └── tokio::spawn(event loop)   <- the only background task;
//!                                                   reconnects on its own
//!     main ── Broker::shutdown ─► DISCONNECT, wait for it to go out, stop task
//!
//! relationships:
//!     - used by: main.rs (connect / shutdown), report.rs (via Publish)
//!     - uses: rumqttc (session, keep-alive, reconnect)
//!
//! ==============================================================================

use crate::config::BrokerConfig;
use crate::report::{Publish, PublishError};

use anyhow::Result;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;
use tokio::task::JoinHandle;

/// at-least-once, acknowledged by the broker
pub const PUBLISH_QOS: QoS = QoS::AtLeastOnce;

/// publish requests buffered while the event loop catches up
const REQUEST_CAPACITY: usize = 10;

/// pause before the event loop retries a failed connection
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);

/// how long shutdown waits for the disconnect to go out
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub struct Broker {
    client: AsyncClient,
    event_task: JoinHandle<()>,
}

impl Broker {
    /// start the client. the tcp connect happens on the event loop,
    /// so an unreachable broker is logged there and never fails startup.
    pub fn connect(config: &BrokerConfig) -> Self {
        let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_seconds));

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let event_task = tokio::spawn(drive(event_loop));
        tracing::info!("[MQTT] Connecting to {}:{} as {}", config.host, config.port, config.client_id);

        Self { client, event_task }
    }

    pub fn publisher(&self) -> MqttPublisher {
        MqttPublisher {
            client: self.client.clone(),
        }
    }

    /// disconnect cleanly, then stop the event loop
    pub async fn shutdown(self) -> Result<()> {
        let Self { client, mut event_task } = self;

        if let Err(e) = client.disconnect().await {
            tracing::warn!("[MQTT] Disconnect request failed: {}", e);
        }

        match tokio::time::timeout(DRAIN_TIMEOUT, &mut event_task).await {
            Ok(joined) => joined?,
            Err(_) => {
                tracing::warn!("[MQTT] Disconnect not confirmed within {:?}, dropping connection", DRAIN_TIMEOUT);
                event_task.abort();
            }
        }
        tracing::info!("[MQTT] Connection closed");
        Ok(())
    }
}

/// services network i/o until our own DISCONNECT has been sent
async fn drive(mut event_loop: EventLoop) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                tracing::info!("[MQTT] ✓ Connected ({:?})", ack.code);
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                tracing::debug!("[MQTT] PUBACK pkid={}", ack.pkid);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("[MQTT] ⚠ Connection error: {}", e);
                tokio::time::sleep(RECONNECT_PAUSE).await;
            }
        }
    }
}

/// publish handle lent to the broker reporter
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl Publish for MqttPublisher {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        self.client
            .try_publish(topic, PUBLISH_QOS, false, payload)
            .map_err(|e| PublishError::new(e.to_string()))
    }
}
