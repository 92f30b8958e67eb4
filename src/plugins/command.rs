use crate::configuration::PluginConfig;
use crate::device::Device;
use crate::entity::{Capability, Entity, MessageHandler};
use crate::error::{CollectorResult, Error};
use crate::home_assistant::{Domain, EntityClass};
use crate::session::Message;
use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::process::Command;
use tokio::task;

const CLASS: EntityClass = EntityClass::new(Domain::Button);

/// Runs a shell command each time the button is pressed
struct ShellCommand {
    identifier: String,
    command: String,
}

#[async_trait]
impl MessageHandler for ShellCommand {
    async fn on_message(&self, _message: &Message) -> CollectorResult<()> {
        info!("{}: running `{}`", self.identifier, self.command);
        let mut child = Command::new("sh").arg("-c").arg(&self.command).spawn()?;

        let identifier = self.identifier.clone();
        let command = self.command.clone();
        task::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => debug!("{identifier}: `{command}` finished"),
                Ok(status) => warn!("{identifier}: `{command}` failed: {status}"),
                Err(e) => warn!("{identifier}: cannot wait for `{command}`: {e}"),
            }
        });

        Ok(())
    }
}

/// Creates a button running the `command` setting
pub fn setup(device: &mut Device, config: &PluginConfig) -> Result<(), Error> {
    let Some(command) = config.setting_str("command") else {
        return Err(Error::InvalidPluginConfig {
            plugin: config.plugin.clone(),
            reason: String::from("missing `command`"),
        });
    };

    let handler = ShellCommand {
        identifier: Entity::identifier_of(device, config),
        command: command.to_string(),
    };
    let entity = Entity::new(device, config, CLASS, Capability::Message(Box::new(handler)));
    device.register(entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::Configuration;

    fn device() -> Device {
        let config = Configuration::parse("device-name = \"host1\"\n[mqtt]\n")
            .expect("invalid configuration");
        Device::new(&config).expect("cannot create device")
    }

    #[test]
    fn test_missing_command() {
        let mut device = device();

        let result = setup(&mut device, &PluginConfig::new("command", "lock"));
        assert!(matches!(result, Err(Error::InvalidPluginConfig { .. })));
        assert!(device.registry().is_empty());
    }

    #[test]
    fn test_button() {
        let mut device = device();
        let mut config = PluginConfig::new("command", "lock");
        config
            .settings
            .insert(String::from("command"), toml::Value::String(String::from("true")));

        setup(&mut device, &config).expect("cannot create the button");

        let entity = device
            .registry()
            .get("host1_lock")
            .expect("button not registered");
        assert_eq!(entity.domain(), Domain::Button);
        assert!(matches!(entity.capability(), Capability::Message(_)));
    }

    #[tokio::test]
    async fn test_run_command() {
        let handler = ShellCommand {
            identifier: String::from("host1_lock"),
            command: String::from("exit 0"),
        };
        let message = Message {
            topic: String::from("mqttdevice/host1_lock/set"),
            payload: b"PRESS".to_vec(),
        };

        assert!(handler.on_message(&message).await.is_ok());
    }
}
