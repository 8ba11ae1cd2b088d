use crate::lights::encoder::CanonicalCommand;
use crate::oelo_api::models::zone_record::{ZoneRecord, parse_controller_response};
use anyhow::Context;
use std::time::Duration;
use tracing::debug;

/// HTTP client for the controller's plaintext API.
///
/// The inner `reqwest::Client` is a shared connection pool, so clones are cheap
/// and can be used from every zone and the poller at once.
#[derive(Clone)]
pub struct OeloClient {
    client: reqwest::Client,
    base_url: String,
}

impl OeloClient {
    pub fn new(host: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host.trim_end_matches('/'))
        };
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .context("Unable to build HTTP client")?,
            base_url,
        })
    }

    pub fn set_pattern_url(&self, command: &CanonicalCommand) -> String {
        format!("{}/setPattern?{}", self.base_url, command.to_query())
    }
}

impl OeloApiTrait for OeloClient {
    async fn set_pattern(&self, command: &CanonicalCommand) -> anyhow::Result<()> {
        let url = self.set_pattern_url(command);
        debug!("GET {}", url);
        self.client
            .get(&url)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn get_controller(&self) -> anyhow::Result<Vec<ZoneRecord>> {
        let url = format!("{}/getController", self.base_url);
        let response = self.client.get(url).send().await?.error_for_status()?;
        let contents = response.text().await?;
        parse_controller_response(&contents)
    }
}

pub trait OeloApiTrait {
    fn set_pattern(
        &self,
        command: &CanonicalCommand,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
    fn get_controller(&self) -> impl Future<Output = anyhow::Result<Vec<ZoneRecord>>> + Send;
}
