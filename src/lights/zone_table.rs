use crate::lights::zone::{Zone, ZoneId};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Fixed set of zones, each behind its own lock.
#[derive(Clone, Default)]
pub struct ZoneTable {
    zones: Arc<BTreeMap<ZoneId, Arc<RwLock<Zone>>>>,
}

impl ZoneTable {
    pub fn new(zones: impl IntoIterator<Item = Zone>) -> Self {
        Self {
            zones: Arc::new(
                zones
                    .into_iter()
                    .map(|zone| (zone.id, Arc::new(RwLock::new(zone))))
                    .collect(),
            ),
        }
    }

    pub fn get(&self, id: ZoneId) -> Option<&Arc<RwLock<Zone>>> {
        self.zones.get(&id)
    }

    pub fn contains(&self, id: ZoneId) -> bool {
        self.zones.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ZoneId, &Arc<RwLock<Zone>>)> {
        self.zones.iter().map(|(id, zone)| (*id, zone))
    }

    pub async fn snapshot(&self, id: ZoneId) -> Option<Zone> {
        match self.zones.get(&id) {
            Some(zone) => Some(zone.read().await.clone()),
            None => None,
        }
    }

    pub async fn snapshot_all(&self) -> Vec<Zone> {
        let mut zones = Vec::with_capacity(self.zones.len());
        for zone in self.zones.values() {
            zones.push(zone.read().await.clone());
        }
        zones
    }
}
