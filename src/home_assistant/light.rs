use crate::home_assistant::availability::{Availability, AvailabilityMode};
use crate::home_assistant::device::Device;
use crate::home_assistant::models::requests::light_command::PowerState;
use crate::lights::encoder::Rgb;
use crate::lights::zone::{Zone, ZoneId};
use serde::{Deserialize, Serialize};

/// Discovery config of a JSON schema MQTT light.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LightDiscoveryPayload {
    pub schema: String,
    pub device: Device,
    pub name: String,
    pub unique_id: String,
    pub command_topic: String,
    pub state_topic: String,
    pub brightness: bool,
    pub supported_color_modes: Vec<String>,
    pub effect: bool,
    pub effect_list: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_attributes_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability: Option<Vec<Availability>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_mode: Option<AvailabilityMode>,
}

/// Retained state of one zone.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LightStatePayload {
    pub state: PowerState,
    pub brightness: u8,
    pub color_mode: String,
    pub color: Rgb,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
}

impl From<&Zone> for LightStatePayload {
    fn from(zone: &Zone) -> Self {
        Self {
            state: if zone.is_on {
                PowerState::On
            } else {
                PowerState::Off
            },
            brightness: zone.brightness,
            color_mode: "rgb".to_string(),
            color: zone.color,
            effect: if zone.is_on {
                zone.active_effect.clone()
            } else {
                None
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneTopics {
    pub command: String,
    pub control: String,
    pub state: String,
    pub attributes: String,
    pub availability: String,
}

impl ZoneTopics {
    pub fn new(topic_base: &str, controller_id: &str, zone: ZoneId) -> Self {
        let prefix = format!("{}/{}/zone/{}", topic_base, controller_id, zone);
        Self {
            command: format!("{}/set", prefix),
            control: format!("{}/control/set", prefix),
            state: format!("{}/state", prefix),
            attributes: format!("{}/attributes", prefix),
            availability: format!("{}/availability", prefix),
        }
    }
}

pub fn bridge_availability_topic(topic_base: &str, controller_id: &str) -> String {
    format!("{}/{}/availability", topic_base, controller_id)
}

pub fn discovery_topic(discovery_prefix: &str, unique_id: &str) -> String {
    format!("{}/light/{}/config", discovery_prefix, unique_id)
}

pub fn build_unique_id(controller_id: &str, zone: ZoneId) -> String {
    format!("{}_zone_{}", controller_id, zone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_payload_hides_effect_when_off() {
        let mut zone = Zone::new(1);
        zone.active_effect = Some("Christmas".to_string());
        let payload = serde_json::to_value(LightStatePayload::from(&zone)).unwrap();
        assert_eq!(
            payload,
            serde_json::json!({
                "state": "OFF",
                "brightness": 255,
                "color_mode": "rgb",
                "color": {"r": 255, "g": 255, "b": 255}
            })
        );
    }

    #[test]
    fn topics_are_scoped_by_controller_and_zone() {
        let topics = ZoneTopics::new("oelo", "porch", 3);
        assert_eq!(topics.command, "oelo/porch/zone/3/set");
        assert_eq!(topics.control, "oelo/porch/zone/3/control/set");
        assert_eq!(topics.availability, "oelo/porch/zone/3/availability");
        assert_eq!(
            discovery_topic("homeassistant", &build_unique_id("porch", 3)),
            "homeassistant/light/porch_zone_3/config"
        );
    }
}
