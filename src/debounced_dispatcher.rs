use crate::lights::encoder::CanonicalCommand;
use crate::lights::zone::ZoneId;
use crate::oelo_api::oelo_client::OeloApiTrait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The one command a zone is waiting to send, or is sending.
struct PendingSend {
    generation: u64,
    task: JoinHandle<()>,
    reply: oneshot::Sender<Option<u64>>,
}

type Slot = Arc<Mutex<Option<PendingSend>>>;

/// Per-zone debouncing sender on top of the controller API.
///
/// Each zone holds at most one pending command. A new command for the zone
/// aborts the previous one, whether it is still waiting out the debounce
/// window or already in flight, and resolves the previous caller with failure.
#[derive(Clone)]
pub struct DebouncedDispatcher<T>
where
    T: OeloApiTrait + Clone + Send + Sync + 'static,
{
    api: T,
    slots: Arc<DashMap<ZoneId, Slot>>,
    generation: Arc<AtomicU64>,
    debounce: Duration,
    request_timeout: Duration,
}

impl<T> DebouncedDispatcher<T>
where
    T: OeloApiTrait + Clone + Send + Sync + 'static,
{
    pub fn new(api: T, debounce: Duration, request_timeout: Duration) -> Self {
        Self {
            api,
            slots: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
            debounce,
            request_timeout,
        }
    }

    pub fn api(&self) -> &T {
        &self.api
    }

    /// Sends `command` for `zone` once the debounce window passes.
    ///
    /// Resolves `true` only when the controller accepted this exact command.
    pub async fn send(&self, zone: ZoneId, command: CanonicalCommand) -> bool {
        self.dispatch(zone, command).await.is_some()
    }

    /// Like [`send`](Self::send), but returns the generation of the accepted
    /// command. Generations increase across all zones.
    pub async fn dispatch(&self, zone: ZoneId, command: CanonicalCommand) -> Option<u64> {
        let slot = self.slot(zone);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = slot.lock().await;
            if let Some(previous) = pending.take() {
                previous.task.abort();
                debug!(
                    "Zone {}: command {} superseded before it was confirmed",
                    zone, previous.generation
                );
                let _ = previous.reply.send(None); // ignore if caller went away
            }

            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            trace!("Zone {}: queued command {}: {}", zone, generation, command);
            let task = tokio::spawn(Self::debounce_and_send(
                self.api.clone(),
                slot.clone(),
                zone,
                generation,
                command,
                self.debounce,
                self.request_timeout,
            ));
            *pending = Some(PendingSend {
                generation,
                task,
                reply: tx,
            });
        }
        rx.await.ok().flatten()
    }

    /// Drops every pending command, resolving their callers with failure.
    pub async fn cancel_all(&self) {
        let slots: Vec<Slot> = self
            .slots
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for slot in slots {
            if let Some(previous) = slot.lock().await.take() {
                previous.task.abort();
                let _ = previous.reply.send(None);
            }
        }
    }

    fn slot(&self, zone: ZoneId) -> Slot {
        self.slots.entry(zone).or_default().clone()
    }

    async fn debounce_and_send(
        api: T,
        slot: Slot,
        zone: ZoneId,
        generation: u64,
        command: CanonicalCommand,
        debounce: Duration,
        request_timeout: Duration,
    ) {
        tokio::time::sleep(debounce).await;

        let result = match tokio::time::timeout(request_timeout, api.set_pattern(&command)).await {
            Ok(Ok(())) => Some(generation),
            Ok(Err(e)) => {
                warn!("Error sending command to zone {}: {:?}", zone, e);
                None
            }
            Err(_) => {
                warn!("Timeout sending command to zone {}", zone);
                None
            }
        };

        let mut pending = slot.lock().await;
        match pending.take_if(|p| p.generation == generation) {
            Some(current) => {
                let _ = current.reply.send(result);
            }
            None => debug!(
                "Zone {}: discarding response for superseded command {}",
                zone, generation
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lights::encoder::{self, Rgb};
    use crate::oelo_api::fake_client::FakeOeloClient;

    fn dispatcher(api: &FakeOeloClient) -> DebouncedDispatcher<FakeOeloClient> {
        DebouncedDispatcher::new(api.clone(), DEFAULT_DEBOUNCE, DEFAULT_REQUEST_TIMEOUT)
    }

    fn color(zone: ZoneId, level: u8) -> CanonicalCommand {
        encoder::solid(Rgb::new(level, level, level), &[zone], 1.0)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_into_last_command() {
        let api = FakeOeloClient::default();
        let dispatcher = dispatcher(&api);

        let (first, second, third, fourth) = tokio::join!(
            dispatcher.send(1, color(1, 10)),
            dispatcher.send(1, color(1, 20)),
            dispatcher.send(1, color(1, 30)),
            dispatcher.send(1, color(1, 40)),
        );

        assert_eq!((first, second, third, fourth), (false, false, false, true));
        assert_eq!(api.sent(), vec![color(1, 40)]);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_sent_before_the_window_closes() {
        let api = FakeOeloClient::default();
        let dispatcher = dispatcher(&api);

        let background = dispatcher.clone();
        let handle = tokio::spawn(async move { background.send(2, color(2, 1)).await });
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(api.sent().is_empty());

        assert!(handle.await.unwrap());
        assert_eq!(api.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zones_do_not_supersede_each_other() {
        let api = FakeOeloClient::default();
        let dispatcher = dispatcher(&api);

        let (one, two) = tokio::join!(
            dispatcher.send(1, color(1, 1)),
            dispatcher.send(2, color(2, 2)),
        );

        assert!(one && two);
        let mut sent = api.sent();
        sent.sort_by_key(|c| c.zones.clone());
        assert_eq!(sent, vec![color(1, 1), color(2, 2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_resolves_false() {
        let api = FakeOeloClient::default();
        api.set_failing(true);
        let dispatcher = dispatcher(&api);

        assert!(!dispatcher.send(1, color(1, 5)).await);
        assert_eq!(api.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_controller_times_out() {
        let api = FakeOeloClient::default();
        api.set_delay(Duration::from_secs(30));
        let dispatcher = dispatcher(&api);

        let started = tokio::time::Instant::now();
        assert!(!dispatcher.send(1, color(1, 5)).await);
        assert_eq!(started.elapsed(), DEFAULT_DEBOUNCE + DEFAULT_REQUEST_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_command_is_superseded() {
        let api = FakeOeloClient::default();
        api.set_delay(Duration::from_secs(5));
        let dispatcher = dispatcher(&api);

        let background = dispatcher.clone();
        let stale = tokio::spawn(async move { background.send(3, color(3, 1)).await });
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(api.sent().len(), 1, "first command should be in flight");

        assert!(dispatcher.send(3, color(3, 2)).await);
        assert!(!stale.await.unwrap());
        assert_eq!(api.sent(), vec![color(3, 1), color(3, 2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn generations_increase_across_sends() {
        let api = FakeOeloClient::default();
        let dispatcher = dispatcher(&api);

        let first = dispatcher.dispatch(1, color(1, 1)).await.unwrap();
        let second = dispatcher.dispatch(2, color(2, 1)).await.unwrap();
        let third = dispatcher.dispatch(1, color(1, 2)).await.unwrap();
        assert!(first < second && second < third);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_fails_pending_callers() {
        let api = FakeOeloClient::default();
        let dispatcher = dispatcher(&api);

        let background = dispatcher.clone();
        let pending = tokio::spawn(async move { background.send(1, color(1, 1)).await });
        tokio::task::yield_now().await;
        dispatcher.cancel_all().await;

        assert!(!pending.await.unwrap());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(api.sent().is_empty());
    }
}
