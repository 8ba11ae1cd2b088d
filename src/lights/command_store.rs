use crate::lights::encoder::Rgb;
use crate::lights::zone::{DEFAULT_BRIGHTNESS, DEFAULT_COLOR, ZoneId};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// What a zone keeps across restarts: its last successful command as the
/// opaque `setPattern` query string, plus the light state shown with it.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedZone {
    pub last_command: String,
    /// `last_command` rendered at full brightness.
    pub base_command: Option<String>,
    pub brightness: u8,
    pub color: Rgb,
    pub effect: Option<String>,
}

/// Stored next to `zone_{n}_last_command` under `zone_{n}_state`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct SavedAppearance {
    #[serde(default)]
    base_command: Option<String>,
    brightness: u8,
    color: Rgb,
    #[serde(default)]
    effect: Option<String>,
}

impl Default for SavedAppearance {
    fn default() -> Self {
        Self {
            base_command: None,
            brightness: DEFAULT_BRIGHTNESS,
            color: DEFAULT_COLOR,
            effect: None,
        }
    }
}

pub trait CommandStore {
    fn load(&self) -> impl Future<Output = anyhow::Result<HashMap<ZoneId, SavedZone>>> + Send;
    /// `None` forgets the zone.
    fn save(
        &self,
        zone: ZoneId,
        saved: Option<SavedZone>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ZoneKey {
    LastCommand,
    State,
}

fn zone_key(zone: ZoneId, kind: ZoneKey) -> String {
    match kind {
        ZoneKey::LastCommand => format!("zone_{}_last_command", zone),
        ZoneKey::State => format!("zone_{}_state", zone),
    }
}

fn parse_zone_key(key: &str) -> Option<(ZoneId, ZoneKey)> {
    let rest = key.strip_prefix("zone_")?;
    let (zone, kind) = if let Some(zone) = rest.strip_suffix("_last_command") {
        (zone, ZoneKey::LastCommand)
    } else {
        (rest.strip_suffix("_state")?, ZoneKey::State)
    };
    Some((zone.parse().ok()?, kind))
}

/// JSON object on disk, rewritten as a whole on every save.
#[derive(Clone)]
pub struct JsonFileCommandStore {
    path: PathBuf,
    data: Arc<Mutex<BTreeMap<String, Value>>>,
}

impl JsonFileCommandStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            data: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }
}

impl CommandStore for JsonFileCommandStore {
    async fn load(&self) -> anyhow::Result<HashMap<ZoneId, SavedZone>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No stored commands at {}", self.path.display());
                return Ok(HashMap::new());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Unable to read {}", self.path.display()));
            }
        };
        let stored: BTreeMap<String, Value> = serde_json::from_str(&contents)
            .with_context(|| format!("Unable to deserialize {}", self.path.display()))?;

        let mut commands = HashMap::new();
        let mut appearances = HashMap::new();
        for (key, value) in &stored {
            match parse_zone_key(key) {
                Some((zone, ZoneKey::LastCommand)) => match value.as_str() {
                    Some(command) => {
                        commands.insert(zone, command.to_string());
                    }
                    None => warn!("Ignoring non-string {:?} in {}", key, self.path.display()),
                },
                Some((zone, ZoneKey::State)) => {
                    match serde_json::from_value::<SavedAppearance>(value.clone()) {
                        Ok(appearance) => {
                            appearances.insert(zone, appearance);
                        }
                        Err(e) => warn!("Ignoring {:?} in {}: {}", key, self.path.display(), e),
                    }
                }
                None => warn!("Ignoring unknown key {:?} in {}", key, self.path.display()),
            }
        }
        *self.data.lock().await = stored;

        // Files written before the state key existed restore at the defaults.
        Ok(commands
            .into_iter()
            .map(|(zone, last_command)| {
                let appearance = appearances.remove(&zone).unwrap_or_default();
                let saved = SavedZone {
                    last_command,
                    base_command: appearance.base_command,
                    brightness: appearance.brightness,
                    color: appearance.color,
                    effect: appearance.effect,
                };
                (zone, saved)
            })
            .collect())
    }

    async fn save(&self, zone: ZoneId, saved: Option<SavedZone>) -> anyhow::Result<()> {
        let mut data = self.data.lock().await;
        match saved {
            Some(saved) => {
                let appearance = SavedAppearance {
                    base_command: saved.base_command,
                    brightness: saved.brightness,
                    color: saved.color,
                    effect: saved.effect,
                };
                data.insert(
                    zone_key(zone, ZoneKey::LastCommand),
                    Value::String(saved.last_command),
                );
                data.insert(zone_key(zone, ZoneKey::State), serde_json::to_value(appearance)?);
            }
            None => {
                data.remove(&zone_key(zone, ZoneKey::LastCommand));
                data.remove(&zone_key(zone, ZoneKey::State));
            }
        }
        let contents = serde_json::to_string_pretty(&*data)?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write then rename so a crash never leaves a truncated file behind.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents)
            .await
            .with_context(|| format!("Unable to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Unable to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
#[derive(Clone, Default)]
pub struct MemoryCommandStore {
    data: Arc<std::sync::Mutex<HashMap<ZoneId, SavedZone>>>,
}

#[cfg(test)]
impl MemoryCommandStore {
    pub fn get(&self, zone: ZoneId) -> Option<SavedZone> {
        self.data.lock().unwrap().get(&zone).cloned()
    }
}

#[cfg(test)]
impl CommandStore for MemoryCommandStore {
    async fn load(&self) -> anyhow::Result<HashMap<ZoneId, SavedZone>> {
        Ok(self.data.lock().unwrap().clone())
    }

    async fn save(&self, zone: ZoneId, saved: Option<SavedZone>) -> anyhow::Result<()> {
        let mut data = self.data.lock().unwrap();
        match saved {
            Some(saved) => data.insert(zone, saved),
            None => data.remove(&zone),
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saved(last_command: &str) -> SavedZone {
        SavedZone {
            last_command: last_command.to_string(),
            base_command: Some(format!("{}&full", last_command)),
            brightness: 40,
            color: Rgb::new(1, 2, 3),
            effect: Some("Christmas".to_string()),
        }
    }

    #[test]
    fn zone_keys_round_trip() {
        assert_eq!(zone_key(4, ZoneKey::LastCommand), "zone_4_last_command");
        assert_eq!(zone_key(4, ZoneKey::State), "zone_4_state");
        assert_eq!(parse_zone_key("zone_4_last_command"), Some((4, ZoneKey::LastCommand)));
        assert_eq!(parse_zone_key("zone_12_state"), Some((12, ZoneKey::State)));
        assert_eq!(parse_zone_key("zone_x_last_command"), None);
        assert_eq!(parse_zone_key("version"), None);
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCommandStore::new(dir.path().join("nope.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn saved_zones_survive_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("commands.json");

        let store = JsonFileCommandStore::new(&path);
        store.save(1, Some(saved("patternType=off"))).await.unwrap();
        store.save(2, Some(saved("patternType=custom"))).await.unwrap();
        store.save(1, None).await.unwrap();

        let reopened = JsonFileCommandStore::new(&path);
        let loaded = reopened.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get(&2), Some(&saved("patternType=custom")));

        // Keys written by one instance are kept by the next one.
        reopened.save(3, Some(saved("patternType=chase"))).await.unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("zone_2_last_command"));
        assert!(raw.contains("zone_3_state"));
        assert!(!raw.contains("zone_1_state"));
    }

    #[tokio::test]
    async fn command_without_state_restores_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.json");
        std::fs::write(
            &path,
            r#"{"zone_2_last_command": "patternType=custom", "zone_5_state": {"brightness": 1, "color": {"r": 0, "g": 0, "b": 0}}}"#,
        )
        .unwrap();

        let loaded = JsonFileCommandStore::new(&path).load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        let zone = &loaded[&2];
        assert_eq!(zone.last_command, "patternType=custom");
        assert_eq!((zone.brightness, zone.color), (DEFAULT_BRIGHTNESS, DEFAULT_COLOR));
        assert_eq!((zone.base_command.as_deref(), zone.effect.as_deref()), (None, None));
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.json");
        std::fs::write(&path, "[1, 2").unwrap();
        assert!(JsonFileCommandStore::new(&path).load().await.is_err());
    }
}
