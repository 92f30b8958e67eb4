use super::derive_config;
use crate::configuration::PluginConfig;
use crate::device::Device;
use crate::entity::{Capability, Entity, State, StateProvider};
use crate::error::{CollectorError, CollectorResult, Error};
use crate::home_assistant::{ATTRIBUTES_TEMPLATE, DiscoveryPayload, Domain, EntityClass};
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;

const CLASS: EntityClass = EntityClass::new(Domain::BinarySensor).with_device_class("sound");

const PACTL: &str = "pactl";
const LIST_SOURCES: [&str; 4] = ["-f", "json", "list", "sources"];

/// On while the PulseAudio source records, the source description is sent as metadata
struct Source {
    index: u64,
}

#[async_trait]
impl StateProvider for Source {
    async fn get_state(&self) -> CollectorResult<State> {
        let output = tokio::process::Command::new(PACTL)
            .args(LIST_SOURCES)
            .output()
            .await?;
        let sources = parse_sources(&output.stdout)?;

        let source = find_source(sources, self.index)
            .ok_or_else(|| CollectorError::Unavailable(format!("source {}", self.index)))?;
        let running = source.get("state").and_then(Value::as_str) == Some("RUNNING");

        Ok(State::new(running).with_metadata(source))
    }

    fn extend_discovery(&self, payload: &mut DiscoveryPayload, state_topic: &str) {
        payload.extend("json_attributes_topic", state_topic);
        payload.extend("json_attributes_template", ATTRIBUTES_TEMPLATE);
    }
}

/// Parses the output of `pactl -f json list sources`
fn parse_sources(stdout: &[u8]) -> CollectorResult<Vec<Value>> {
    serde_json::from_slice(stdout).map_err(|e| CollectorError::Parse(e.to_string()))
}

fn find_source(sources: Vec<Value>, index: u64) -> Option<Value> {
    sources
        .into_iter()
        .find(|source| source.get("index").and_then(Value::as_u64) == Some(index))
}

/// Lists the sources once, at startup
fn list_sources() -> CollectorResult<Vec<Value>> {
    let output = std::process::Command::new(PACTL)
        .args(LIST_SOURCES)
        .output()?;
    if !output.status.success() {
        return Err(CollectorError::Command {
            command: format!("{PACTL} {}", LIST_SOURCES.join(" ")),
            reason: output.status.to_string(),
        });
    }
    parse_sources(&output.stdout)
}

/// Creates one entity per source: `<id>_<source name>`, named after the source description
pub fn setup(device: &mut Device, config: &PluginConfig) -> Result<(), Error> {
    let sources = list_sources().unwrap_or_else(|e| {
        warn!("{}: cannot list audio sources: {e}", device.name());
        Vec::new()
    });

    for source in sources {
        let (Some(index), Some(name)) = (
            source.get("index").and_then(Value::as_u64),
            source.get("name").and_then(Value::as_str),
        ) else {
            continue;
        };
        let description = source
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or(name);
        debug!("{}: found audio source {index}: {name}", device.name());

        let config = derive_config(config, name, description.to_string());
        let entity = Entity::new(
            device,
            &config,
            CLASS,
            Capability::State(Box::new(Source { index })),
        );
        device.register(entity)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCES: &str = r#"[
        {"index": 0, "state": "SUSPENDED", "name": "alsa_output.monitor", "description": "Monitor of Speakers"},
        {"index": 3, "state": "RUNNING", "name": "alsa_input.usb-mic", "description": "USB Microphone"}
    ]"#;

    #[test]
    fn test_find_source() -> CollectorResult<()> {
        let sources = parse_sources(SOURCES.as_bytes())?;
        assert_eq!(sources.len(), 2);

        let mic = find_source(sources.clone(), 3).expect("source 3 not found");
        assert_eq!(mic["description"], "USB Microphone");
        assert_eq!(mic["state"], "RUNNING");

        assert!(find_source(sources, 7).is_none());
        Ok(())
    }

    #[test]
    fn test_invalid_output() {
        assert!(matches!(
            parse_sources(b"Connection failure"),
            Err(CollectorError::Parse(_))
        ));
    }
}
