mod config;
mod debounced_dispatcher;
mod error;
mod home_assistant;
mod lights;
pub mod oelo_api;
mod processors;

use tracing::{debug, error, info, trace, warn};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt};

use crate::config::Config;
use crate::debounced_dispatcher::DebouncedDispatcher;
use crate::home_assistant::availability::AvailabilityState;
use crate::home_assistant::light::bridge_availability_topic;
use crate::home_assistant::models::requests::light_command::LightCommand;
use crate::lights::command_store::{CommandStore, JsonFileCommandStore};
use crate::lights::controller::{ControlRequest, LightController};
use crate::lights::reconciler::fetch_snapshot;
use crate::lights::zone::{Zone, ZoneId};
use crate::lights::zone_table::ZoneTable;
use crate::oelo_api::oelo_client::OeloClient;
use crate::processors::zones_processor::ZonesProcessor;
use dashmap::DashSet;
use processors::ha_processor::HaProcessor;
use rumqttc::{AsyncClient, Event, LastWill, MqttOptions, Packet, QoS};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::util::SubscriberInitExt;

const MQTT_CHANNEL_SIZE: usize = 64;

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load_or_create_example("config.toml")?;

    // Directory for logs
    let log_dir = &config.logging.directory;

    // One file per level
    let debug_file = rolling::daily(log_dir, &config.logging.debug_file);
    let info_file = rolling::daily(log_dir, &config.logging.info_file);
    let warn_file = rolling::daily(log_dir, &config.logging.warn_file);
    let error_file = rolling::daily(log_dir, &config.logging.error_file);

    let debug_layer = fmt::layer()
        .with_writer(debug_file)
        .with_ansi(false)
        .with_filter(EnvFilter::new("debug"));

    let info_layer = fmt::layer()
        .with_writer(info_file)
        .with_ansi(false)
        .with_filter(tracing_subscriber::filter::LevelFilter::INFO);

    let warn_layer = fmt::layer()
        .with_writer(warn_file)
        .with_ansi(false)
        .with_filter(tracing_subscriber::filter::LevelFilter::WARN);

    let error_layer = fmt::layer()
        .with_writer(error_file)
        .with_ansi(false)
        .with_filter(tracing_subscriber::filter::LevelFilter::ERROR);

    let console_layer = fmt::layer()
        .pretty()
        .with_filter(EnvFilter::new(&config.logging.console_level));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(debug_layer)
        .with(info_layer)
        .with(warn_layer)
        .with(error_layer)
        .init();

    let oelo_client =
        OeloClient::new(&config.controller.host, config.intervals.request_timeout())?;

    let store = JsonFileCommandStore::new(&config.storage.last_commands_path);
    let restored = store.load().await.unwrap_or_else(|e| {
        warn!("Unable to load stored commands, starting fresh: {:?}", e);
        HashMap::new()
    });
    let zones = ZoneTable::new((1..=config.controller.num_zones).map(|id| {
        restored
            .get(&id)
            .and_then(|saved| {
                Zone::restore(id, saved)
                    .inspect_err(|e| warn!("Ignoring stored state for zone {}: {:?}", id, e))
                    .ok()
            })
            .unwrap_or_else(|| Zone::new(id))
    }));

    let dispatcher = DebouncedDispatcher::new(
        oelo_client,
        config.intervals.debounce(),
        config.intervals.request_timeout(),
    );
    let controller = Arc::new(LightController::new(zones, dispatcher, store));

    let mut ha_options = MqttOptions::new(
        &config.home_assistant.client_id,
        &config.home_assistant.mqtt_host,
        config.home_assistant.mqtt_port,
    );
    ha_options.set_credentials(
        &config.home_assistant.mqtt_username,
        &config.home_assistant.mqtt_password,
    );
    ha_options.set_keep_alive(Duration::from_secs(
        config.intervals.mqtt_keep_alive_seconds,
    ));
    let published_discovery = Arc::new(DashSet::new());
    ha_options.set_last_will(LastWill::new(
        bridge_availability_topic(
            &config.home_assistant.topic_base,
            &config.controller.controller_id,
        ),
        AvailabilityState::Offline.as_serde_value(),
        QoS::AtLeastOnce,
        true,
    ));
    let (ha_client, mut ha_eventloop) = AsyncClient::new(ha_options, MQTT_CHANNEL_SIZE);

    let zones_processor =
        ZonesProcessor::new(ha_client.clone(), &config, published_discovery.clone());
    let ha_processor = HaProcessor {
        controller: controller.clone(),
    };

    // State publisher
    let mut updates = controller.subscribe();
    let local_zones_processor = zones_processor.clone();
    let local_controller = controller.clone();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(zone) => {
                    if let Err(e) = local_zones_processor.handle(&zone).await {
                        error!("Error occurred while publishing zone {}: {:?}", zone.id, e);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Missed {} zone updates, republishing all zones", skipped);
                    publish_all(&local_zones_processor, local_controller.zones()).await;
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Run HA event loop in background
    let topic_base = config.home_assistant.topic_base.clone();
    let controller_id = config.controller.controller_id.clone();
    let reconnect_delay = Duration::from_secs(config.intervals.reconnect_delay_seconds);
    let local_zones_processor = zones_processor.clone();
    let local_controller = controller.clone();
    tokio::spawn(async move {
        loop {
            match ha_eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected to Home Assistant MQTT broker");
                    local_zones_processor.published_discovery.clear();
                    let processor = local_zones_processor.clone();
                    let zones = local_controller.zones().clone();
                    tokio::spawn(async move {
                        if let Err(e) = processor
                            .publish_bridge_availability(AvailabilityState::Online)
                            .await
                        {
                            error!("Error occurred while publishing availability: {:?}", e);
                        }
                        publish_all(&processor, &zones).await;
                    });
                }
                Ok(Event::Incoming(Packet::Publish(p))) => {
                    let payload = String::from_utf8_lossy(&p.payload).to_string();
                    match command_topic_parser(&p.topic, &payload, &topic_base, &controller_id) {
                        None => {
                            warn!("Failed to parse topic: {:?}", p.topic);
                        }
                        Some(cmd) => {
                            // Each command waits out its debounce window on its own task.
                            let processor = ha_processor.clone();
                            tokio::spawn(async move { processor.handle(cmd).await });
                        }
                    }
                }
                Ok(e) => {
                    trace!("{:?}", e)
                }
                Err(e) => {
                    error!(
                        "HA event loop failed: {:?}. Forcing rediscovery and resubscriptions",
                        e
                    );
                    local_zones_processor.published_discovery.clear();
                    tokio::time::sleep(reconnect_delay).await;
                }
            }
        }
    });

    // Poll the controller
    let poll_interval = config.intervals.poll();
    let request_timeout = config.intervals.request_timeout();
    let local_controller = controller.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(poll_interval);
        loop {
            let _ = tick.tick().await;
            let outcome =
                fetch_snapshot(local_controller.dispatcher().api(), request_timeout).await;
            debug!("Poll outcome: {:?}", outcome);
            local_controller.reconcile(&outcome).await;
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    controller.dispatcher().cancel_all().await;
    if let Err(e) = zones_processor
        .publish_bridge_availability(AvailabilityState::Offline)
        .await
    {
        error!("Error occurred while publishing availability: {:?}", e);
    }
    // Give the event loop a moment to flush the offline message.
    tokio::time::sleep(Duration::from_millis(500)).await;
    Ok(())
}

async fn publish_all(processor: &ZonesProcessor, zones: &ZoneTable) {
    for zone in zones.snapshot_all().await {
        if let Err(e) = processor.handle(&zone).await {
            error!("Error occurred while publishing zone {}: {:?}", zone.id, e);
        }
    }
}

#[derive(Debug, Clone)]
pub enum MqttCommand {
    SetLight {
        zone: ZoneId,
        command: LightCommand,
    },
    ControlLights {
        zone: ZoneId,
        request: ControlRequest,
    },
}

/// Parses `{topic_base}/{controller_id}/zone/{n}/set` and
/// `{topic_base}/{controller_id}/zone/{n}/control/set`.
pub fn command_topic_parser(
    topic: &str,
    payload: &str,
    topic_base: &str,
    controller_id: &str,
) -> Option<MqttCommand> {
    if payload.is_empty() {
        error!("Empty payload for topic: {:?}", topic);
        return None;
    }

    let rest = topic
        .strip_prefix(topic_base)?
        .strip_prefix('/')?
        .strip_prefix(controller_id)?
        .strip_prefix("/zone/")?;
    let mut parts: Vec<&str> = rest.split('/').collect();
    parts.resize(3, "");

    match (parts[0], parts[1], parts[2]) {
        (zone_num, "set", "") => {
            let zone = zone_num.parse::<ZoneId>().ok()?;
            match serde_json::from_str::<LightCommand>(payload) {
                Ok(command) => Some(MqttCommand::SetLight { zone, command }),
                Err(e) => {
                    error!(
                        "Unable to deserialize payload: {:?} for topic: {:?}: {}",
                        payload, topic, e
                    );
                    None
                }
            }
        }
        (zone_num, "control", "set") => {
            let zone = zone_num.parse::<ZoneId>().ok()?;
            match serde_json::from_str::<ControlRequest>(payload) {
                Ok(request) => Some(MqttCommand::ControlLights { zone, request }),
                Err(e) => {
                    error!(
                        "Unable to deserialize payload: {:?} for topic: {:?}: {}",
                        payload, topic, e
                    );
                    None
                }
            }
        }
        _ => None,
    }
}
