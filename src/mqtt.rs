//! MQTT listener feeding the ingestion bridge.
//!
//! Connects to the configured broker, subscribes to every topic filter and
//! hands each publish to [`IngestBridge::on_message`]. A dropped connection is
//! re-established after a short pause until shutdown is signalled.
use anyhow::Result;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::sync::watch;
use tokio::time::{sleep, Duration};

use crate::config::Config;
use crate::ingest::IngestBridge;

// ---

const RETRY_DELAY: Duration = Duration::from_secs(2);

pub fn mqtt_options(config: &Config) -> MqttOptions {
    // ---
    let mut options = MqttOptions::new(
        config.mqtt_client_id.clone(),
        config.mqtt.host.clone(),
        config.mqtt.port,
    );
    options.set_keep_alive(config.mqtt_keepalive());
    if let Some(username) = &config.mqtt.username {
        options.set_credentials(
            username.clone(),
            config.mqtt.password.clone().unwrap_or_default(),
        );
    }
    options
}

/// Run the listener until `shutdown` flips to `true`.
pub async fn run_listener(
    config: Config,
    bridge: IngestBridge,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    // ---
    while !*shutdown.borrow() {
        let (client, mut eventloop) = AsyncClient::new(mqtt_options(&config), 32);

        let mut subscribed = true;
        for topic in &config.mqtt_topics {
            if let Err(err) = client.subscribe(topic.clone(), QoS::AtLeastOnce).await {
                tracing::warn!(error = %err, topic = %topic, "failed to subscribe; retrying");
                subscribed = false;
                break;
            }
        }

        if subscribed {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        let _ = client.disconnect().await;
                        tracing::info!("MQTT listener stopped");
                        return Ok(());
                    }
                    event = eventloop.poll() => match event {
                        Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                            tracing::info!(
                                host = %config.mqtt.host,
                                port = config.mqtt.port,
                                topics = %config.mqtt_topics.join(","),
                                "connected to MQTT broker"
                            );
                        }
                        Ok(Event::Incoming(Incoming::Publish(publish))) => {
                            bridge.on_message(&publish.topic, &publish.payload).await;
                        }
                        Ok(_) => {}
                        Err(err) => {
                            tracing::warn!(error = %err, "MQTT connection dropped; reconnecting");
                            break;
                        }
                    },
                }
            }
        }

        tokio::select! {
            changed = shutdown.changed() => {
                // Sender dropped
                if changed.is_err() {
                    break;
                }
            }
            _ = sleep(RETRY_DELAY) => {}
        }
    }

    tracing::info!("MQTT listener stopped");
    Ok(())
}
