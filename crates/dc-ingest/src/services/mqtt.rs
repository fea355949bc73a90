//! MQTT transport: subscribes to the transfer topics and feeds every
//! publish into the reassembly engine.
//!
//! The event loop reconnects on the next poll after an error, so the
//! loop only has to back off and re-subscribe on each ConnAck.

use std::sync::Arc;
use std::time::Duration;

use dc_common::config::MqttConfig;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::task::JoinHandle;

use crate::services::handoff::Handoff;
use crate::transfer::engine::ReassemblyEngine;

/// Map a configured QoS level onto the broker's enum.
pub fn qos(level: u8) -> anyhow::Result<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => anyhow::bail!("Invalid MQTT QoS level {} (expected 0, 1 or 2)", other),
    }
}

pub fn options(config: &MqttConfig) -> MqttOptions {
    let client_id = config
        .client_id
        .clone()
        .unwrap_or_else(|| format!("dc-ingest-{}", uuid::Uuid::new_v4()));

    let mut options = MqttOptions::new(client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    options.set_max_packet_size(config.max_packet_bytes, config.max_packet_bytes);
    if let (Some(user), Some(pass)) = (&config.username, &config.password) {
        options.set_credentials(user, pass);
    }
    options
}

/// Spawn the subscriber loop.
pub fn start<H: Handoff>(
    config: &MqttConfig,
    engine: Arc<ReassemblyEngine<H>>,
) -> anyhow::Result<JoinHandle<()>> {
    let qos = qos(config.qos)?;
    let reconnect_delay = Duration::from_secs(config.reconnect_delay_secs);
    let topics = engine.router().subscriptions();
    let (client, mut eventloop) = AsyncClient::new(options(config), 64);

    tracing::info!(
        host = %config.host,
        port = config.port,
        namespace = %engine.router().namespace(),
        "Starting MQTT subscriber"
    );

    Ok(tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    tracing::info!("MQTT connected");
                    for topic in &topics {
                        match client.subscribe(topic.as_str(), qos).await {
                            Ok(()) => tracing::info!(%topic, ?qos, "MQTT subscribed"),
                            Err(e) => tracing::error!(%topic, error = %e, "MQTT subscribe failed"),
                        }
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    engine.dispatch(&publish.topic, &publish.payload);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        retry_in_secs = reconnect_delay.as_secs(),
                        "MQTT connection error"
                    );
                    tokio::time::sleep(reconnect_delay).await;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_levels() {
        assert_eq!(qos(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(qos(1).unwrap(), QoS::AtLeastOnce);
        assert_eq!(qos(2).unwrap(), QoS::ExactlyOnce);
        assert!(qos(3).is_err());
    }

    #[test]
    fn test_options_use_configured_client_id() {
        let config = MqttConfig {
            client_id: Some("doorcam-1".into()),
            keep_alive_secs: 45,
            ..Default::default()
        };
        let options = options(&config);
        assert_eq!(options.client_id(), "doorcam-1");
        assert_eq!(options.keep_alive(), Duration::from_secs(45));
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
    }

    #[test]
    fn test_options_generate_client_id() {
        let options = options(&MqttConfig::default());
        assert!(options.client_id().starts_with("dc-ingest-"));
    }
}
