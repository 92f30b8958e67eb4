use serde::Deserialize;
use serde_inline_default::serde_inline_default;
use std::error::Error;
use std::time::Duration;

/// Contains the configuration for communicating with the MQTT broker
#[serde_inline_default]
#[derive(Deserialize, Debug, Clone)]
pub struct Mqtt {
    /// Hostname or IP address. Default: localhost
    #[serde_inline_default(String::from("localhost"))]
    pub host: String,

    /// Port of the connection to the broker. Default: 1883
    #[serde_inline_default(1883)]
    pub port: u16,

    /// Username for the connection to the broker. Default: empty
    #[serde(default)]
    pub user: String,

    /// Password for the connection to the broker. Default: empty
    #[serde(default)]
    pub password: String,

    /// Prefix for the discovery topics read by Home Assistant. Default: homeassistant
    ///
    /// This must match the configuration of the MQTT integration in Home Assistant
    ///
    /// See <https://www.home-assistant.io/integrations/mqtt#discovery-options>
    #[serde_inline_default(String::from("homeassistant"))]
    #[serde(rename = "discovery-prefix")]
    pub discovery_prefix: String,
}

/// Configuration of one plugin instance
///
/// Keys other than the ones below are kept in `settings` and only read by the plugin.
#[derive(Deserialize, Debug, Clone)]
pub struct PluginConfig {
    /// Name of the plugin in the registration table
    pub plugin: String,

    /// Identifier of the entity, unique within the device
    pub id: String,

    /// Display name of the entity. Defaults to the plugin's own name, if any
    pub name: Option<String>,

    /// Overrides the device polling interval, in seconds
    #[serde(rename = "polling-interval")]
    pub polling_interval: Option<u64>,

    /// Plugin specific settings
    #[serde(flatten)]
    pub settings: toml::Table,
}

impl PluginConfig {
    /// Creates a plugin configuration with no name, interval or settings
    pub fn new(plugin: &str, id: &str) -> PluginConfig {
        PluginConfig {
            plugin: plugin.to_string(),
            id: id.to_string(),
            name: None,
            polling_interval: None,
            settings: Default::default(),
        }
    }

    /// Returns the string setting `key`, if present
    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(|v| v.as_str())
    }
}

/// Contains all the configuration for `mqttdevice`
#[serde_inline_default]
#[derive(Deserialize, Debug, Clone)]
pub struct Configuration {
    /// Contains the configuration for communicating with the MQTT broker
    pub mqtt: Mqtt,

    /// Display name of the device. Default: the hostname, title cased
    #[serde(rename = "device-name")]
    pub device_name: Option<String>,

    /// Delay between each report in seconds. Default: 60 seconds
    #[serde_inline_default(60)]
    #[serde(rename = "polling-interval")]
    pub polling_interval: u64,

    /// Plugins to load, in order
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,

    /// Sets the verbosity of the logs.
    ///   * 1 => Error
    ///  * 2 => Warning
    ///  * 3 => Info
    ///  * 4 => Debug
    ///  * 5 => Trace
    #[serde_inline_default(2)]
    #[serde(rename = "log-verbosity")]
    pub log_verbosity: usize,
}

impl Configuration {
    /// Load the configuration from a file
    ///
    /// ## Example
    ///
    /// ```
    /// use mqttdevice::Configuration;
    ///
    /// let config = Configuration::load("conf/mqttdevice.toml").expect("Cannot load configuration");
    ///
    /// assert_eq!(config.mqtt.host, "localhost");
    /// ```
    pub fn load(path: &str) -> Result<Configuration, Box<dyn Error>> {
        Self::parse(std::fs::read_to_string(path)?.as_str())
    }

    /// Parses the configuration from a TOML string
    ///
    /// Polling intervals must be at least one second.
    pub fn parse(content: &str) -> Result<Configuration, Box<dyn Error>> {
        let config: Configuration = toml::from_str(content)?;

        if config.polling_interval == 0 {
            return Err("polling-interval must be at least 1 second".into());
        }
        if let Some(plugin) = config
            .plugins
            .iter()
            .find(|plugin| plugin.polling_interval == Some(0))
        {
            return Err(format!(
                "polling-interval of plugin {} must be at least 1 second",
                plugin.id
            )
            .into());
        }

        Ok(config)
    }

    /// Default delay between two reports
    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval)
    }
}
