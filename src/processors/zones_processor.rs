use crate::config::Config;
use crate::home_assistant::availability::{Availability, AvailabilityMode, AvailabilityState};
use crate::home_assistant::device::Device;
use crate::home_assistant::light::{
    LightDiscoveryPayload, LightStatePayload, ZoneTopics, bridge_availability_topic,
    build_unique_id, discovery_topic,
};
use crate::lights::presets;
use crate::lights::zone::Zone;
use chrono::Utc;
use dashmap::DashSet;
use rumqttc::{AsyncClient, QoS};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::join;
use tracing::{debug, error, trace};

#[derive(Clone)]
pub struct ZonesProcessor {
    pub ha_client: AsyncClient,
    pub published_discovery: Arc<DashSet<String>>,
    controller_id: String,
    controller_name: String,
    controller_host: String,
    discovery_prefix: String,
    topic_base: String,
}

impl ZonesProcessor {
    pub fn new(
        ha_client: AsyncClient,
        config: &Config,
        published_discovery: Arc<DashSet<String>>,
    ) -> Self {
        Self {
            ha_client,
            published_discovery,
            controller_id: config.controller.controller_id.clone(),
            controller_name: config.controller.name.clone(),
            controller_host: config.controller.host.clone(),
            discovery_prefix: config.home_assistant.discovery_prefix.clone(),
            topic_base: config.home_assistant.topic_base.clone(),
        }
    }

    pub fn bridge_availability_topic(&self) -> String {
        bridge_availability_topic(&self.topic_base, &self.controller_id)
    }

    pub fn zone_topics(&self, zone: u8) -> ZoneTopics {
        ZoneTopics::new(&self.topic_base, &self.controller_id, zone)
    }

    pub fn discovery_payload(&self, zone: u8) -> LightDiscoveryPayload {
        let topics = self.zone_topics(zone);
        LightDiscoveryPayload {
            schema: "json".to_string(),
            device: Device {
                identifiers: vec![format!("oelo_{}", self.controller_id)],
                manufacturer: "Oelo".to_string(),
                model: "Oelo Controller".to_string(),
                name: self.controller_name.clone(),
                configuration_url: Some(format!("http://{}", self.controller_host)),
            },
            name: format!("Zone {}", zone),
            unique_id: build_unique_id(&self.controller_id, zone),
            command_topic: topics.command,
            state_topic: topics.state,
            brightness: true,
            supported_color_modes: vec!["rgb".to_string()],
            effect: true,
            effect_list: presets::list_names().into_iter().map(str::to_string).collect(),
            json_attributes_topic: Some(topics.attributes),
            availability: Some(vec![
                Availability::online_offline(&self.bridge_availability_topic()),
                Availability::online_offline(&topics.availability),
            ]),
            // A zone is only available while the bridge is online too.
            availability_mode: Some(AvailabilityMode::All),
        }
    }

    pub fn attributes(zone: &Zone) -> HashMap<String, String> {
        let mut attributes = HashMap::with_capacity(3);
        attributes.insert("zone_number".to_string(), zone.id.to_string());
        attributes.insert("last_updated".to_string(), Utc::now().to_rfc3339());
        if let Some(command) = &zone.last_successful_command {
            attributes.insert("last_command".to_string(), command.to_query());
        }
        attributes
    }

    /// Publishes discovery for `zone` once per MQTT session and subscribes to
    /// its command topics.
    async fn ensure_discovery(&self, zone: u8) -> anyhow::Result<()> {
        let unique_id = build_unique_id(&self.controller_id, zone);
        if !self.published_discovery.insert(unique_id.clone()) {
            return Ok(());
        }
        let topics = self.zone_topics(zone);
        let discovery_payload = serde_json::to_string(&self.discovery_payload(zone))?;
        trace!("{}", discovery_payload);

        let result = async {
            self.ha_client
                .publish(
                    discovery_topic(&self.discovery_prefix, &unique_id),
                    QoS::AtLeastOnce,
                    true,
                    discovery_payload,
                )
                .await?;
            self.ha_client
                .subscribe(&topics.command, QoS::AtLeastOnce)
                .await?;
            self.ha_client
                .subscribe(&topics.control, QoS::AtLeastOnce)
                .await?;
            Ok::<(), anyhow::Error>(())
        }
        .await;
        if result.is_err() {
            // Try again on the next update.
            self.published_discovery.remove(&unique_id);
        }
        result
    }

    pub async fn handle(&self, zone: &Zone) -> anyhow::Result<()> {
        self.ensure_discovery(zone.id).await?;

        let topics = self.zone_topics(zone.id);
        let state = serde_json::to_string(&LightStatePayload::from(zone))?;
        let attributes = serde_json::to_string(&Self::attributes(zone))?;
        debug!("Zone {} state: {}", zone.id, state);

        match join!(
            self.ha_client
                .publish(&topics.state, QoS::AtMostOnce, true, state),
            self.ha_client
                .publish(&topics.attributes, QoS::AtMostOnce, false, attributes),
            self.ha_client.publish(
                &topics.availability,
                QoS::AtLeastOnce,
                true,
                AvailabilityState::from_available(zone.available).as_serde_value(),
            )
        ) {
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                error!("Error publishing to {}: {:?}", topics.state, e);
                Err(anyhow::Error::from(e))
            }
            _ => Ok(()),
        }
    }

    pub async fn publish_bridge_availability(
        &self,
        state: AvailabilityState,
    ) -> anyhow::Result<()> {
        self.ha_client
            .publish(
                self.bridge_availability_topic(),
                QoS::AtLeastOnce,
                true,
                state.as_serde_value(),
            )
            .await?;
        Ok(())
    }
}
