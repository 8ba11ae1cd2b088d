use crate::lights::encoder::CanonicalCommand;
use crate::oelo_api::models::zone_record::ZoneRecord;
use crate::oelo_api::oelo_client::OeloApiTrait;
use anyhow::anyhow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory controller used by tests. Records every `setPattern` call when it
/// starts, before any configured delay.
#[derive(Clone, Default)]
pub struct FakeOeloClient {
    sent: Arc<Mutex<Vec<CanonicalCommand>>>,
    failing: Arc<AtomicBool>,
    delay: Arc<Mutex<Duration>>,
    snapshot: Arc<Mutex<Option<Vec<ZoneRecord>>>>,
}

impl FakeOeloClient {
    pub fn sent(&self) -> Vec<CanonicalCommand> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// `None` makes `get_controller` fail.
    pub fn set_snapshot(&self, snapshot: Option<Vec<ZoneRecord>>) {
        *self.snapshot.lock().unwrap() = snapshot;
    }
}

impl OeloApiTrait for FakeOeloClient {
    async fn set_pattern(&self, command: &CanonicalCommand) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(command.clone());
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("connection refused"));
        }
        Ok(())
    }

    async fn get_controller(&self) -> anyhow::Result<Vec<ZoneRecord>> {
        self.snapshot
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("connection refused"))
    }
}
