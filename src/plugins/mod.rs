//! Built-in collectors
//!
//! Each plugin exposes a `setup` function that creates its entities from a [`PluginConfig`]
//! and registers them into the device. The configuration refers to plugins by name, through
//! the table below.

use crate::configuration::PluginConfig;
use crate::device::Device;
use crate::error::Error;

pub mod availability;
pub mod command;
pub mod pactl;
pub mod uptime;
pub mod webcam;

/// Creates the entities of a plugin and registers them into the device
pub type Factory = fn(&mut Device, &PluginConfig) -> Result<(), Error>;

static PLUGINS: [(&str, Factory); 5] = [
    ("availability", availability::setup),
    ("command", command::setup),
    ("pactl", pactl::setup),
    ("uptime", uptime::setup),
    ("webcam", webcam::setup),
];

/// Returns the factory of the plugin `name`
///
/// ```
/// use mqttdevice::plugins;
///
/// assert!(plugins::factory("uptime").is_ok());
/// assert!(plugins::factory("teleport").is_err());
/// ```
pub fn factory(name: &str) -> Result<Factory, Error> {
    PLUGINS
        .iter()
        .find(|(plugin, _)| *plugin == name)
        .map(|(_, factory)| *factory)
        .ok_or_else(|| Error::UnknownPlugin(name.to_string()))
}

/// Names of the available plugins
pub fn names() -> impl Iterator<Item = &'static str> {
    PLUGINS.iter().map(|(name, _)| *name)
}

/// Configuration of one of several entities created by the same plugin, `<id>_<suffix>`
fn derive_config(config: &PluginConfig, suffix: &str, name: String) -> PluginConfig {
    PluginConfig {
        id: format!("{}_{suffix}", config.id),
        name: Some(name),
        ..config.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        let names: Vec<&str> = names().collect();
        assert_eq!(names, ["availability", "command", "pactl", "uptime", "webcam"]);
        for name in names {
            assert!(factory(name).is_ok());
        }
    }

    #[test]
    fn test_unknown_plugin_lists_names() {
        let err = factory("teleport").expect_err("no such plugin");
        assert_eq!(
            err.to_string(),
            "no such plugin teleport, available plugins: availability, command, pactl, uptime, webcam"
        );
    }

    #[test]
    fn test_derive_config() {
        let mut config = PluginConfig::new("webcam", "webcam");
        config.polling_interval = Some(5);

        let derived = derive_config(&config, "0", String::from("Webcam /dev/video0"));
        assert_eq!(derived.id, "webcam_0");
        assert_eq!(derived.name.as_deref(), Some("Webcam /dev/video0"));
        assert_eq!(derived.polling_interval, Some(5));
    }
}
