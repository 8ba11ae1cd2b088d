use crate::lights::zone::Zone;
use crate::lights::zone_table::ZoneTable;
use crate::oelo_api::models::zone_record::ZoneRecord;
use crate::oelo_api::oelo_client::OeloApiTrait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Transient failure of a `getController` poll.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("Timeout communicating with Oelo controller")]
    Timeout,
    #[error("Error communicating with Oelo controller: {0}")]
    Transport(String),
}

pub type PollOutcome = Result<Vec<ZoneRecord>, PollError>;

/// Fetches one snapshot. Never retries; the polling loop owns the cadence.
pub async fn fetch_snapshot<T: OeloApiTrait>(api: &T, timeout: Duration) -> PollOutcome {
    match tokio::time::timeout(timeout, api.get_controller()).await {
        Ok(Ok(records)) => Ok(records),
        Ok(Err(e)) => Err(PollError::Transport(format!("{:#}", e))),
        Err(_) => Err(PollError::Timeout),
    }
}

/// Applies a poll outcome to every zone and returns the zones that changed.
///
/// Calling it twice with the same outcome changes nothing the second time.
pub async fn reconcile(zones: &ZoneTable, outcome: &PollOutcome) -> Vec<Zone> {
    if let Err(e) = outcome {
        warn!("Poll failed, marking zones unavailable: {}", e);
    }

    let mut changed = Vec::new();
    for (id, zone) in zones.iter() {
        let mut zone = zone.write().await;
        let before = zone.clone();
        match outcome {
            Ok(records) => zone.reconcile(records.iter().find(|r| r.num == id)),
            Err(_) => zone.mark_unavailable(),
        }
        if *zone != before {
            debug!("Zone {} reconciled: {:?}", id, zone.status());
            changed.push(zone.clone());
        }
    }
    changed
}
