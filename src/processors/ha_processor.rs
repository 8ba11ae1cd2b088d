use crate::MqttCommand;
use crate::error::LightResult;
use crate::home_assistant::models::requests::light_command::{LightCommand, PowerState};
use crate::lights::command_store::CommandStore;
use crate::lights::controller::LightController;
use crate::oelo_api::oelo_client::OeloApiTrait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Turns Home Assistant commands into controller intents.
pub struct HaProcessor<T, S>
where
    T: OeloApiTrait + Clone + Send + Sync + 'static,
    S: CommandStore + Send + Sync,
{
    pub controller: Arc<LightController<T, S>>,
}

impl<T, S> Clone for HaProcessor<T, S>
where
    T: OeloApiTrait + Clone + Send + Sync + 'static,
    S: CommandStore + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
        }
    }
}

impl<T, S> HaProcessor<T, S>
where
    T: OeloApiTrait + Clone + Send + Sync + 'static,
    S: CommandStore + Send + Sync,
{
    pub async fn handle_light_command(
        &self,
        zone: u8,
        command: LightCommand,
    ) -> LightResult<()> {
        match command.state {
            PowerState::On => {
                self.controller
                    .turn_on(zone, command.color, command.effect.as_deref(), command.brightness)
                    .await
            }
            PowerState::Off => self.controller.turn_off(zone).await,
        }
    }

    pub async fn process_ha_command(&self, cmd: MqttCommand) -> LightResult<()> {
        debug!("Processing {:?}", cmd);
        match cmd {
            MqttCommand::SetLight { zone, command } => {
                self.handle_light_command(zone, command).await
            }
            MqttCommand::ControlLights { zone, request } => {
                self.controller.apply_control(zone, request).await
            }
        }
    }

    /// Runs a command to completion and logs how it ended.
    pub async fn handle(&self, cmd: MqttCommand) {
        match self.process_ha_command(cmd).await {
            Ok(()) => {}
            Err(e) if e.is_routine() => debug!("Command not applied: {}", e),
            Err(e) => warn!("Command rejected: {}", e),
        }
    }
}
