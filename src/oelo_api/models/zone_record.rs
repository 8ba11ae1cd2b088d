use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// One entry of the `getController` response.
///
/// The controller reports more fields per zone; only these two are used.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ZoneRecord {
    pub num: u8,
    #[serde(default)]
    pub pattern: String,
}

/// Parses a `getController` body. Anything other than a JSON list is an error;
/// list entries without a usable `num` are skipped.
pub fn parse_controller_response(body: &str) -> anyhow::Result<Vec<ZoneRecord>> {
    let value: serde_json::Value = serde_json::from_str(body)
        .with_context(|| format!("Unable to deserialize response. Body was: \"{}\"", body))?;
    let serde_json::Value::Array(items) = value else {
        bail!("Controller did not return a list. Body was: \"{}\"", body);
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<ZoneRecord>(item) {
            Ok(record) => Some(record),
            Err(e) => {
                trace!("Skipping zone record: {}", e);
                None
            }
        })
        .collect())
}
