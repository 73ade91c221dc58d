//! MQTT publisher adapter
//!
//! Broker-backed implementation of [`Publisher`]. A background driver task
//! owns the rumqttc event loop: it announces `online` on the retained status
//! topic after every (re)connect, and the broker's last-will delivers
//! `offline` if the process dies without a graceful shutdown. On graceful
//! shutdown the driver publishes `offline` itself before disconnecting.

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, Incoming, LastWill, MqttOptions, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::publish::{PublishError, Publisher, STATUS_TOPIC};

/// Delay before re-polling after an event loop error
const RECONNECT_DELAY_SECS: u64 = 5;

/// Configuration for the MQTT connection
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// Broker hostname
    pub host: String,

    /// Broker port (usually 1883)
    pub port: u16,

    /// Username, empty for anonymous access
    pub username: String,

    /// Password, empty for anonymous access
    pub password: String,

    /// Client identifier presented to the broker
    pub client_id: String,

    /// Topic prefix all payloads are published under
    pub topic_prefix: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            client_id: "tankflow".to_string(),
            topic_prefix: "tank_data".to_string(),
        }
    }
}

impl MqttConfig {
    /// The reserved liveness topic under this prefix
    pub fn status_topic(&self) -> String {
        format!("{}/{}", self.topic_prefix, STATUS_TOPIC)
    }
}

/// MQTT-backed publisher
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    /// Connect to the broker and spawn the event loop driver
    ///
    /// The driver keeps polling (rumqttc reconnects on its own) until the
    /// shutdown signal, then publishes the retained `offline` status and
    /// disconnects.
    pub fn start(
        config: &MqttConfig,
        mut shutdown: watch::Receiver<bool>,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let status_topic = config.status_topic();

        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(60));
        options.set_last_will(LastWill::new(
            &status_topic,
            "offline",
            QoS::AtLeastOnce,
            true,
        ));
        if !config.username.is_empty() {
            options.set_credentials(&config.username, &config.password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 64);
        let publisher = Arc::new(Self { client: client.clone() });

        info!(
            "Connecting to MQTT broker at {}:{} (prefix: {})",
            config.host, config.port, config.topic_prefix
        );

        let driver = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if let Err(e) =
                            client.try_publish(&status_topic, QoS::AtLeastOnce, true, "offline")
                        {
                            warn!("Failed to queue offline status: {}", e);
                        }
                        let _ = client.disconnect().await;
                        // Keep polling until the connection closes so the
                        // offline status actually flushes to the broker
                        while eventloop.poll().await.is_ok() {}
                        break;
                    },
                    event = eventloop.poll() => match event {
                        Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                            info!("Connected to MQTT broker");
                            if let Err(e) =
                                client.try_publish(&status_topic, QoS::AtLeastOnce, true, "online")
                            {
                                warn!("Failed to publish online status: {}", e);
                            }
                        },
                        Ok(event) => {
                            debug!("MQTT event: {:?}", event);
                        },
                        Err(e) => {
                            warn!(
                                "MQTT connection error: {}. Retrying in {}s...",
                                e, RECONNECT_DELAY_SECS
                            );
                            tokio::time::sleep(Duration::from_secs(RECONNECT_DELAY_SECS)).await;
                        },
                    },
                }
            }

            info!("MQTT driver stopped");
        });

        (publisher, driver)
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    // try_publish never waits for request queue capacity. While the broker is
    // unreachable the event loop drains nothing, so an awaiting publish would
    // park once the queue fills and wedge the sync cycle; a full queue must
    // surface as a failed publish instead.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| PublishError::Connection(format!("{}: {}", topic, e)))
    }

    async fn publish_retained(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, true, payload)
            .map_err(|e| PublishError::Connection(format!("{}: {}", topic, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_fails_fast_when_broker_unreachable() {
        // Nothing listens on this port, so the driver never establishes a
        // session and never drains the request queue
        let config = MqttConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            client_id: "tankflow-test".to_string(),
            ..MqttConfig::default()
        };
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (publisher, driver) = MqttPublisher::start(&config, shutdown_rx);

        // Well past the request queue capacity; once it fills, publishes must
        // fail instead of waiting for a broker that is not there
        let mut saw_error = false;
        for i in 0..256 {
            let result = publisher
                .publish(&format!("tank_data/transaction/{}", i), b"{}".to_vec())
                .await;
            if result.is_err() {
                saw_error = true;
                break;
            }
        }
        assert!(saw_error);

        driver.abort();
    }

    #[test]
    fn test_mqtt_config_default() {
        let config = MqttConfig::default();
        assert_eq!(config.port, 1883);
        assert_eq!(config.status_topic(), "tank_data/status");
    }

    #[test]
    fn test_status_topic_uses_prefix() {
        let config = MqttConfig {
            topic_prefix: "hangar/fuel".to_string(),
            ..MqttConfig::default()
        };
        assert_eq!(config.status_topic(), "hangar/fuel/status");
    }
}
