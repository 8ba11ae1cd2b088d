//! The dispatch surface: `turn_on`, `turn_off` and `apply_control`.
//!
//! Each call validates and encodes synchronously, then waits on the
//! debounced dispatcher. Zone state only changes once the controller has
//! confirmed the command.

use crate::debounced_dispatcher::DebouncedDispatcher;
use crate::error::{LightError, LightResult};
use crate::lights::command_store::CommandStore;
use crate::lights::encoder::{
    self, ColorInput, MAX_GAP, MAX_SPEED, PATTERN_TYPE_CUSTOM, Rgb, validate_percent,
};
use crate::lights::presets;
use crate::lights::reconciler::{self, PollOutcome};
use crate::lights::zone::{
    DEFAULT_BRIGHTNESS, DEFAULT_COLOR, TargetState, Transition, Zone, ZoneId,
};
use crate::lights::zone_table::ZoneTable;
use crate::oelo_api::oelo_client::OeloApiTrait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

const UPDATE_CHANNEL_SIZE: usize = 64;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    #[serde(alias = "Preset")]
    Preset,
    #[serde(alias = "Custom")]
    Custom,
}

fn default_custom_pattern_type() -> String {
    PATTERN_TYPE_CUSTOM.to_string()
}

/// Arguments of the `control_lights` service.
///
/// `speed` and `gap` are only overrides when present; custom patterns fall
/// back to speed 1 and gap 0.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ControlRequest {
    pub mode: ControlMode,
    #[serde(default)]
    pub target_zones: Option<Vec<ZoneId>>,
    #[serde(default)]
    pub preset_name: Option<String>,
    #[serde(default = "default_custom_pattern_type")]
    pub custom_pattern_type: String,
    #[serde(default)]
    pub colors: Option<Vec<ColorInput>>,
    #[serde(default)]
    pub speed: Option<i64>,
    #[serde(default)]
    pub gap: Option<i64>,
}

impl ControlRequest {
    pub fn preset(name: &str) -> Self {
        Self {
            mode: ControlMode::Preset,
            target_zones: None,
            preset_name: Some(name.to_string()),
            custom_pattern_type: default_custom_pattern_type(),
            colors: None,
            speed: None,
            gap: None,
        }
    }

    pub fn custom(pattern_type: &str, colors: Vec<ColorInput>) -> Self {
        Self {
            mode: ControlMode::Custom,
            target_zones: None,
            preset_name: None,
            custom_pattern_type: pattern_type.to_string(),
            colors: Some(colors),
            speed: None,
            gap: None,
        }
    }
}

pub struct LightController<T, S>
where
    T: OeloApiTrait + Clone + Send + Sync + 'static,
    S: CommandStore + Send + Sync,
{
    zones: ZoneTable,
    dispatcher: DebouncedDispatcher<T>,
    store: S,
    updates: broadcast::Sender<Zone>,
}

impl<T, S> LightController<T, S>
where
    T: OeloApiTrait + Clone + Send + Sync + 'static,
    S: CommandStore + Send + Sync,
{
    pub fn new(zones: ZoneTable, dispatcher: DebouncedDispatcher<T>, store: S) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_SIZE);
        Self {
            zones,
            dispatcher,
            store,
            updates,
        }
    }

    pub fn zones(&self) -> &ZoneTable {
        &self.zones
    }

    pub fn dispatcher(&self) -> &DebouncedDispatcher<T> {
        &self.dispatcher
    }

    /// Every zone state change, from intents and from polls.
    pub fn subscribe(&self) -> broadcast::Receiver<Zone> {
        self.updates.subscribe()
    }

    fn zone(&self, id: ZoneId) -> LightResult<&Arc<RwLock<Zone>>> {
        self.zones.get(id).ok_or(LightError::UnknownZone(id))
    }

    pub async fn turn_on(
        &self,
        zone: ZoneId,
        rgb: Option<Rgb>,
        effect: Option<&str>,
        brightness: Option<u8>,
    ) -> LightResult<()> {
        let transition = self
            .zone(zone)?
            .read()
            .await
            .plan_turn_on(rgb, effect, brightness)?;
        self.execute(zone, &[zone], transition).await
    }

    pub async fn turn_off(&self, zone: ZoneId) -> LightResult<()> {
        let transition = self.zone(zone)?.read().await.plan_turn_off();
        self.execute(zone, &[zone], transition).await
    }

    /// Applies a preset or custom pattern to `target_zones`, or to `zone`
    /// when no targets are given. The send is debounced on `zone`.
    pub async fn apply_control(&self, zone: ZoneId, request: ControlRequest) -> LightResult<()> {
        self.zone(zone)?;
        let targets = match request.target_zones {
            Some(ref targets) if !targets.is_empty() => targets.clone(),
            _ => vec![zone],
        };
        if let Some(unknown) = targets.iter().find(|id| !self.zones.contains(**id)) {
            return Err(LightError::UnknownZone(*unknown));
        }
        let speed = request
            .speed
            .map(|v| validate_percent("speed", v, MAX_SPEED))
            .transpose()?;
        let gap = request
            .gap
            .map(|v| validate_percent("gap", v, MAX_GAP))
            .transpose()?;

        let (command, effect) = match request.mode {
            ControlMode::Preset => {
                let name = request
                    .preset_name
                    .as_deref()
                    .filter(|name| !name.is_empty())
                    .ok_or(LightError::MissingPresetName)?;
                let definition = presets::get(name)
                    .ok_or_else(|| LightError::PresetNotFound(name.to_string()))?;
                (
                    encoder::build_from_preset(definition, &targets, speed, gap, 1.0),
                    name.to_string(),
                )
            }
            ControlMode::Custom => {
                let colors = request
                    .colors
                    .as_deref()
                    .filter(|colors| !colors.is_empty())
                    .ok_or(LightError::MissingColors)?;
                (
                    encoder::build_from_custom(
                        &request.custom_pattern_type,
                        colors,
                        &targets,
                        speed.unwrap_or(1),
                        gap.unwrap_or(0),
                    )?,
                    request.custom_pattern_type.clone(),
                )
            }
        };

        let color = command.first_color().unwrap_or(DEFAULT_COLOR);
        let transition = Transition::full_brightness(
            command,
            TargetState::On {
                brightness: DEFAULT_BRIGHTNESS,
                color,
                effect: Some(effect),
            },
        );
        self.execute(zone, &targets, transition).await
    }

    /// Applies a poll outcome and announces the zones it changed.
    pub async fn reconcile(&self, outcome: &PollOutcome) {
        for zone in reconciler::reconcile(&self.zones, outcome).await {
            let _ = self.updates.send(zone); // no subscribers is fine
        }
    }

    async fn execute(
        &self,
        dispatch_zone: ZoneId,
        affected: &[ZoneId],
        transition: Transition,
    ) -> LightResult<()> {
        let Some(generation) = self
            .dispatcher
            .dispatch(dispatch_zone, transition.command.clone())
            .await
        else {
            // Superseded sends are routine; real failures were logged by the dispatcher.
            debug!("Zone {}: command was not applied", dispatch_zone);
            return Err(LightError::NotApplied);
        };
        info!("Zone {}: applied {}", dispatch_zone, transition.command);

        for id in affected {
            let Some(zone) = self.zones.get(*id) else {
                continue;
            };
            let updated = {
                let mut zone = zone.write().await;
                zone.apply(generation, &transition).then(|| zone.clone())
            };
            let Some(updated) = updated else {
                continue;
            };
            if matches!(transition.target, TargetState::On { .. })
                && let Err(e) = self.store.save(*id, updated.to_saved()).await
            {
                warn!("Failed to save last command for zone {}: {:?}", id, e);
            }
            let _ = self.updates.send(updated);
        }
        Ok(())
    }
}
