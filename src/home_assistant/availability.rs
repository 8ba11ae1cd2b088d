use serde::{Deserialize, Serialize};

/// Represents an availability configuration for a Home Assistant entity.
///
/// The entity is considered available while `topic` carries
/// `payload_available`, and unavailable when it carries
/// `payload_not_available`.
///
/// # Example
///
/// ```rust,ignore
/// let availability = Availability {
///     payload_available: Some("online".to_string()),
///     payload_not_available: Some("offline".to_string()),
///     topic: "oelo/oelo_1/zone/1/availability".to_string(),
///     value_template: None,
/// };
/// ```
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Availability {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_available: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_not_available: Option<String>,
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_template: Option<String>,
}

impl Availability {
    pub fn online_offline(topic: &str) -> Self {
        Self {
            payload_available: Some(AvailabilityState::Online.as_serde_value()),
            payload_not_available: Some(AvailabilityState::Offline.as_serde_value()),
            topic: topic.to_string(),
            value_template: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum AvailabilityMode {
    #[serde(rename = "all")]
    All,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityState {
    #[serde(rename = "online")]
    Online,
    #[serde(rename = "offline")]
    Offline,
}

impl AvailabilityState {
    pub fn from_available(available: bool) -> Self {
        if available {
            AvailabilityState::Online
        } else {
            AvailabilityState::Offline
        }
    }

    pub fn as_serde_value(&self) -> String {
        match self {
            AvailabilityState::Online => "online",
            AvailabilityState::Offline => "offline",
        }
        .to_string()
    }
}
