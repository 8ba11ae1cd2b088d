//! Per-zone light state and its transition rules.
//!
//! Explicit intents never flip state on their own: they produce a
//! [`Transition`], which is applied only once the controller confirmed the
//! command. Polled snapshots only ever touch availability and on/off.

use crate::error::{LightError, LightResult};
use crate::lights::command_store::SavedZone;
use crate::lights::encoder::{self, CanonicalCommand, PATTERN_TYPE_OFF, Rgb};
use crate::lights::presets;
use crate::oelo_api::models::zone_record::ZoneRecord;
use tracing::trace;

pub type ZoneId = u8;

pub const DEFAULT_BRIGHTNESS: u8 = 255;
pub const DEFAULT_COLOR: Rgb = Rgb::WHITE;

#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub id: ZoneId,
    pub is_on: bool,
    pub brightness: u8,
    pub color: Rgb,
    pub active_effect: Option<String>,
    pub last_successful_command: Option<CanonicalCommand>,
    pub available: bool,
    // Effect of `last_successful_command` and the same command at full brightness.
    replay_effect: Option<String>,
    replay_base: Option<CanonicalCommand>,
    applied_generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneStatus<'a> {
    Unavailable,
    Off,
    On {
        brightness: u8,
        color: Rgb,
        effect: Option<&'a str>,
    },
}

/// State a zone moves to once its command has been confirmed.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetState {
    On {
        brightness: u8,
        color: Rgb,
        effect: Option<String>,
    },
    Off,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub command: CanonicalCommand,
    /// `command` rendered at full brightness. Later replays scale from it.
    pub base: CanonicalCommand,
    pub target: TargetState,
}

impl Transition {
    /// A transition whose command is already at full brightness.
    pub fn full_brightness(command: CanonicalCommand, target: TargetState) -> Self {
        Self {
            base: command.clone(),
            command,
            target,
        }
    }
}

impl Zone {
    /// A zone is unavailable until the first poll reports it.
    pub fn new(id: ZoneId) -> Self {
        Self {
            id,
            is_on: false,
            brightness: DEFAULT_BRIGHTNESS,
            color: DEFAULT_COLOR,
            active_effect: None,
            last_successful_command: None,
            available: false,
            replay_effect: None,
            replay_base: None,
            applied_generation: 0,
        }
    }

    /// Seeds a zone from what it saved before a restart. On/off and
    /// availability still wait for the first poll.
    pub fn restore(id: ZoneId, saved: &SavedZone) -> anyhow::Result<Self> {
        let last = CanonicalCommand::from_query(&saved.last_command)?;
        let base = match &saved.base_command {
            Some(query) => CanonicalCommand::from_query(query)?,
            None => last.clone(),
        };
        Ok(Self {
            brightness: saved.brightness,
            color: saved.color,
            active_effect: saved.effect.clone(),
            last_successful_command: Some(last),
            replay_effect: saved.effect.clone(),
            replay_base: Some(base),
            ..Self::new(id)
        })
    }

    /// What has to survive a restart, once a command has been confirmed.
    pub fn to_saved(&self) -> Option<SavedZone> {
        let last = self.last_successful_command.as_ref()?;
        Some(SavedZone {
            last_command: last.to_query(),
            base_command: self.replay_base.as_ref().map(CanonicalCommand::to_query),
            brightness: self.brightness,
            color: self.color,
            effect: self.replay_effect.clone(),
        })
    }

    pub fn status(&self) -> ZoneStatus<'_> {
        if !self.available {
            ZoneStatus::Unavailable
        } else if self.is_on {
            ZoneStatus::On {
                brightness: self.brightness,
                color: self.color,
                effect: self.active_effect.as_deref(),
            }
        } else {
            ZoneStatus::Off
        }
    }

    pub fn plan_turn_on(
        &self,
        rgb: Option<Rgb>,
        effect: Option<&str>,
        brightness: Option<u8>,
    ) -> LightResult<Transition> {
        let brightness = match brightness.unwrap_or(self.brightness) {
            0 => DEFAULT_BRIGHTNESS,
            b => b,
        };
        let factor = encoder::brightness_factor(brightness);
        let zones = [self.id];

        if let Some(rgb) = rgb {
            return Ok(Transition {
                command: encoder::solid(rgb, &zones, factor),
                base: encoder::solid(rgb, &zones, 1.0),
                target: TargetState::On {
                    brightness,
                    color: rgb,
                    effect: None,
                },
            });
        }

        if let Some(name) = effect {
            let definition =
                presets::get(name).ok_or_else(|| LightError::PresetNotFound(name.to_string()))?;
            trace!(
                "Zone {}: rendering {} ({}, {:?})",
                self.id, name, definition.pattern_type, definition.direction
            );
            return Ok(Transition {
                command: encoder::build_from_preset(definition, &zones, None, None, factor),
                base: encoder::build_from_preset(definition, &zones, None, None, 1.0),
                target: TargetState::On {
                    brightness,
                    color: definition.colors.first().copied().unwrap_or(self.color),
                    effect: Some(name.to_string()),
                },
            });
        }

        let replayable = self
            .last_successful_command
            .as_ref()
            .filter(|c| !c.is_off())
            .and(self.replay_base.as_ref().or(self.last_successful_command.as_ref()));
        if let Some(base) = replayable {
            let mut base = base.clone();
            base.zones = zones.to_vec();
            return Ok(Transition {
                command: encoder::rescale(&base, factor),
                base,
                target: TargetState::On {
                    brightness,
                    color: self.color,
                    effect: self.replay_effect.clone(),
                },
            });
        }

        Ok(Transition {
            command: encoder::solid(self.color, &zones, factor),
            base: encoder::solid(self.color, &zones, 1.0),
            target: TargetState::On {
                brightness,
                color: self.color,
                effect: None,
            },
        })
    }

    pub fn plan_turn_off(&self) -> Transition {
        Transition::full_brightness(encoder::off(&[self.id]), TargetState::Off)
    }

    /// Applies a confirmed transition.
    ///
    /// Confirmations older than the last applied one are dropped; returns
    /// whether the transition was applied.
    pub fn apply(&mut self, generation: u64, transition: &Transition) -> bool {
        if generation <= self.applied_generation {
            return false;
        }
        self.applied_generation = generation;
        match &transition.target {
            TargetState::On {
                brightness,
                color,
                effect,
            } => {
                self.is_on = true;
                self.brightness = *brightness;
                self.color = *color;
                self.active_effect = effect.clone();
                self.last_successful_command = Some(transition.command.clone());
                self.replay_effect = effect.clone();
                self.replay_base = Some(transition.base.clone());
            }
            TargetState::Off => {
                self.is_on = false;
                self.active_effect = None;
            }
        }
        true
    }

    /// Merges a polled record, or its absence, into this zone.
    pub fn reconcile(&mut self, record: Option<&ZoneRecord>) {
        let Some(record) = record else {
            self.available = false;
            return;
        };
        self.available = true;
        let is_on = record.pattern != PATTERN_TYPE_OFF;
        if !is_on {
            self.active_effect = None;
        }
        self.is_on = is_on;
    }

    /// A failed poll only flips availability; everything else is kept.
    pub fn mark_unavailable(&mut self) {
        self.available = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(num: u8, pattern: &str) -> ZoneRecord {
        ZoneRecord {
            num,
            pattern: pattern.to_string(),
        }
    }

    fn on_zone(id: ZoneId) -> Zone {
        let mut zone = Zone::new(id);
        zone.reconcile(Some(&record(id, "custom")));
        let transition = zone
            .plan_turn_on(Some(Rgb::new(10, 20, 30)), None, Some(100))
            .unwrap();
        assert!(zone.apply(1, &transition));
        zone
    }

    #[test]
    fn starts_unavailable() {
        let zone = Zone::new(1);
        assert_eq!(zone.status(), ZoneStatus::Unavailable);
        assert!(!zone.is_on);
        assert_eq!(zone.color, DEFAULT_COLOR);
    }

    #[test]
    fn planning_does_not_change_state() {
        let zone = Zone::new(2);
        let before = zone.clone();
        let _ = zone.plan_turn_on(Some(Rgb::new(1, 2, 3)), None, None).unwrap();
        let _ = zone.plan_turn_off();
        assert_eq!(zone, before);
    }

    #[test]
    fn color_turn_on_scales_by_brightness() {
        let zone = Zone::new(2);
        let transition = zone
            .plan_turn_on(Some(Rgb::new(200, 100, 0)), Some("Christmas"), Some(128))
            .unwrap();
        assert_eq!(transition.command.pattern_type, "custom");
        assert_eq!(transition.command.zones, vec![2]);
        assert_eq!(transition.command.colors, vec![100, 50, 0]);
        assert_eq!(
            transition.target,
            TargetState::On {
                brightness: 128,
                color: Rgb::new(200, 100, 0),
                effect: None
            }
        );
    }

    #[test]
    fn effect_turn_on_uses_first_preset_color() {
        let zone = Zone::new(1);
        let transition = zone.plan_turn_on(None, Some("Halloween"), None).unwrap();
        assert_eq!(transition.command.colors, vec![255, 100, 0, 128, 0, 128]);
        assert_eq!(
            transition.target,
            TargetState::On {
                brightness: DEFAULT_BRIGHTNESS,
                color: Rgb::new(255, 100, 0),
                effect: Some("Halloween".to_string())
            }
        );
    }

    #[test]
    fn unknown_effect_is_a_validation_error() {
        let zone = Zone::new(1);
        assert_eq!(
            zone.plan_turn_on(None, Some("Disco"), None),
            Err(LightError::PresetNotFound("Disco".to_string()))
        );
    }

    #[test]
    fn bare_turn_on_without_history_uses_default_color() {
        let zone = Zone::new(4);
        let transition = zone.plan_turn_on(None, None, Some(0)).unwrap();
        assert_eq!(transition.command.colors, vec![255, 255, 255]);
    }

    #[test]
    fn bare_turn_on_replays_last_command_at_new_brightness() {
        let mut zone = Zone::new(1);
        zone.reconcile(Some(&record(1, "custom")));
        let christmas = zone.plan_turn_on(None, Some("Christmas"), Some(255)).unwrap();
        assert!(zone.apply(1, &christmas));
        assert!(zone.apply(2, &zone.plan_turn_off()));
        assert_eq!(zone.active_effect, None);

        let replay = zone.plan_turn_on(None, None, Some(51)).unwrap();
        assert_eq!(replay.command.pattern_type, "custom");
        assert_eq!(replay.command.speed, 3);
        assert_eq!(replay.command.colors, vec![51, 0, 0, 0, 51, 0]);
        assert!(zone.apply(3, &replay));
        assert_eq!(zone.active_effect.as_deref(), Some("Christmas"));

        // Rescaling always starts from the full brightness render.
        let back_up = zone.plan_turn_on(None, None, Some(255)).unwrap();
        assert_eq!(back_up.command.colors, vec![255, 0, 0, 0, 255, 0]);
    }

    fn saved(last_command: &str, effect: Option<&str>) -> SavedZone {
        SavedZone {
            last_command: last_command.to_string(),
            base_command: None,
            brightness: 128,
            color: Rgb::new(9, 9, 9),
            effect: effect.map(str::to_string),
        }
    }

    #[test]
    fn replay_targets_only_this_zone() {
        let restored = saved(
            "patternType=chase&zones=1,2,3&colors=9,9,9&speed=5&gap=1",
            Some("chase"),
        );
        let zone = Zone::restore(2, &restored).unwrap();
        let transition = zone.plan_turn_on(None, None, Some(255)).unwrap();
        assert_eq!(transition.command.zones, vec![2]);
        assert_eq!(transition.command.pattern_type, "chase");
        assert_eq!(transition.command.colors, vec![9, 9, 9]);
    }

    #[test]
    fn dimming_to_one_and_back_keeps_the_color() {
        let mut zone = Zone::new(1);
        let bright = zone
            .plan_turn_on(Some(Rgb::new(200, 100, 50)), None, Some(255))
            .unwrap();
        assert!(zone.apply(1, &bright));
        let dim = zone.plan_turn_on(None, None, Some(1)).unwrap();
        assert_eq!(dim.command.colors, vec![1, 0, 0]);
        assert!(zone.apply(2, &dim));

        let back = zone.plan_turn_on(None, None, Some(255)).unwrap();
        assert_eq!(back.command.colors, vec![200, 100, 50]);
        assert!(zone.apply(3, &back));
        assert_eq!((zone.color, zone.brightness), (Rgb::new(200, 100, 50), 255));
        // The dimmed command is what gets remembered as sent.
        let mut remembered = Zone::new(1);
        assert!(remembered.apply(1, &dim));
        assert_eq!(remembered.last_successful_command, Some(dim.command));
    }

    #[test]
    fn effect_replay_rescales_from_full_brightness() {
        let mut zone = Zone::new(3);
        let halloween = zone.plan_turn_on(None, Some("Halloween"), Some(3)).unwrap();
        assert!(zone.apply(1, &halloween));
        let back = zone.plan_turn_on(None, None, Some(255)).unwrap();
        assert_eq!(back.command.colors, vec![255, 100, 0, 128, 0, 128]);
        assert_eq!(
            back.target,
            TargetState::On {
                brightness: 255,
                color: Rgb::new(255, 100, 0),
                effect: Some("Halloween".to_string())
            }
        );
    }

    #[test]
    fn saved_zone_restores_brightness_color_and_effect() {
        let mut zone = Zone::new(5);
        let halloween = zone.plan_turn_on(None, Some("Halloween"), Some(51)).unwrap();
        assert!(zone.apply(1, &halloween));
        let saved = zone.to_saved().unwrap();
        assert_eq!(saved.brightness, 51);
        assert_eq!(saved.effect.as_deref(), Some("Halloween"));

        let mut restored = Zone::restore(5, &saved).unwrap();
        assert!(!restored.available);
        assert_eq!(restored.brightness, 51);
        assert_eq!(restored.color, Rgb::new(255, 100, 0));
        assert_eq!(restored.last_successful_command, zone.last_successful_command);

        restored.reconcile(Some(&record(5, "custom")));
        assert_eq!(
            restored.status(),
            ZoneStatus::On {
                brightness: 51,
                color: Rgb::new(255, 100, 0),
                effect: Some("Halloween")
            }
        );
        // A bare "ON" after the restart replays exactly what was showing.
        let replay = restored.plan_turn_on(None, None, None).unwrap();
        assert_eq!(Some(replay.command), zone.last_successful_command);
    }

    #[test]
    fn unparsable_saved_command_is_an_error() {
        assert!(Zone::restore(1, &saved("zones=1", None)).is_err());
        assert!(Zone::new(1).to_saved().is_none());
    }

    #[test]
    fn stale_confirmations_are_dropped() {
        let mut zone = on_zone(1);
        let newer = zone.plan_turn_off();
        let older = zone.plan_turn_on(Some(Rgb::new(1, 1, 1)), None, None).unwrap();
        assert!(zone.apply(5, &newer));
        assert!(!zone.apply(4, &older));
        assert!(!zone.is_on);
    }

    #[test]
    fn turn_off_keeps_last_command() {
        let mut zone = on_zone(1);
        let last = zone.last_successful_command.clone();
        assert!(zone.apply(2, &zone.plan_turn_off()));
        assert_eq!(zone.status(), ZoneStatus::Off);
        assert_eq!(zone.last_successful_command, last);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut zone = on_zone(3);
        zone.active_effect = Some("Candy Cane".to_string());
        let snapshot = record(3, "off");
        zone.reconcile(Some(&snapshot));
        let once = zone.clone();
        zone.reconcile(Some(&snapshot));
        assert_eq!(zone, once);
        assert!(!zone.is_on);
        assert_eq!(zone.active_effect, None);
    }

    #[test]
    fn poll_failure_preserves_optimistic_fields() {
        let mut zone = on_zone(1);
        zone.mark_unavailable();
        assert!(!zone.available);
        assert!(zone.is_on);
        assert_eq!(zone.brightness, 100);
        assert_eq!(zone.color, Rgb::new(10, 20, 30));

        zone.reconcile(Some(&record(1, "off")));
        assert!(zone.available);
        assert!(!zone.is_on);
        assert_eq!(zone.brightness, 100);
        assert_eq!(zone.color, Rgb::new(10, 20, 30));
    }

    #[test]
    fn missing_record_marks_unavailable_only() {
        let mut zone = on_zone(1);
        zone.reconcile(None);
        assert_eq!(zone.status(), ZoneStatus::Unavailable);
        assert!(zone.is_on);
    }

    #[test]
    fn snapshot_overrides_optimistic_off() {
        let mut zone = Zone::new(6);
        zone.reconcile(Some(&record(6, "march")));
        assert!(zone.is_on);
        assert_eq!(
            zone.status(),
            ZoneStatus::On {
                brightness: DEFAULT_BRIGHTNESS,
                color: DEFAULT_COLOR,
                effect: None
            }
        );
    }
}
