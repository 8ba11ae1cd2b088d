use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    pub controller: ControllerConfig,
    pub home_assistant: HomeAssistantConfig,
    pub intervals: IntervalConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub directory: String,
    pub debug_file: String,
    pub info_file: String,
    pub warn_file: String,
    pub error_file: String,
    pub console_level: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ControllerConfig {
    /// IP address or hostname of the Oelo controller.
    pub host: String,
    /// Used in MQTT topics and unique ids.
    pub controller_id: String,
    pub name: String,
    pub num_zones: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HomeAssistantConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: String,
    pub mqtt_password: String,
    pub client_id: String,
    pub discovery_prefix: String,
    pub topic_base: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IntervalConfig {
    pub poll_seconds: u64,
    pub debounce_millis: u64,
    pub request_timeout_seconds: u64,
    pub reconnect_delay_seconds: u64,
    pub mqtt_keep_alive_seconds: u64,
}

impl IntervalConfig {
    pub fn poll(&self) -> Duration {
        Duration::from_secs(self.poll_seconds)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_millis)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    pub last_commands_path: String,
}

impl Config {
    /// Loads `path`, or writes an example there when no file exists yet.
    ///
    /// An existing file that fails to parse or validate is never touched.
    pub fn load_or_create_example(path: &str) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content).with_context(|| format!("Invalid {}", path)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                println!("Config file not found. Creating example {}...", path);
                Self::save_example(path)?;
                println!("Please edit {} with your settings and restart the application.", path);
                bail!("{} did not exist, an example was written", path)
            }
            Err(e) => Err(e).with_context(|| format!("Unable to read {}", path)),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(!self.controller.host.trim().is_empty(), "controller.host is empty");
        ensure!(self.controller.num_zones > 0, "controller.num_zones must be at least 1");
        ensure!(self.intervals.poll_seconds > 0, "intervals.poll_seconds must be at least 1");
        ensure!(
            self.intervals.request_timeout_seconds > 0,
            "intervals.request_timeout_seconds must be at least 1"
        );
        Ok(())
    }

    pub fn example() -> Self {
        Config {
            logging: LoggingConfig {
                directory: "./logs".to_string(),
                debug_file: "log_debug.log".to_string(),
                info_file: "log_info.log".to_string(),
                warn_file: "log_warn.log".to_string(),
                error_file: "log_error.log".to_string(),
                console_level: "info".to_string(),
            },
            controller: ControllerConfig {
                host: "192.168.1.50".to_string(),
                controller_id: "oelo_1".to_string(),
                name: "Oelo Lights".to_string(),
                num_zones: 6,
            },
            home_assistant: HomeAssistantConfig {
                mqtt_host: "192.168.1.40".to_string(),
                mqtt_port: 1883,
                mqtt_username: "homeassistant".to_string(),
                mqtt_password: "REPLACE_WITH_YOUR_HOMEASSISTANT_MQTT_PASSWORD".to_string(),
                client_id: "oelo-bridge".to_string(),
                discovery_prefix: "homeassistant".to_string(),
                topic_base: "oelo".to_string(),
            },
            intervals: IntervalConfig {
                poll_seconds: 30,
                debounce_millis: 1000,
                request_timeout_seconds: 10,
                reconnect_delay_seconds: 5,
                mqtt_keep_alive_seconds: 30,
            },
            storage: StorageConfig {
                last_commands_path: "./data/last_commands.json".to_string(),
            },
        }
    }

    pub fn save_example(path: &str) -> Result<()> {
        let toml_content = toml::to_string_pretty(&Self::example())?;
        fs::write(path, toml_content)?;
        Ok(())
    }
}
