use super::derive_config;
use crate::configuration::PluginConfig;
use crate::device::Device;
use crate::entity::{Capability, Entity, State, StateProvider};
use crate::error::{CollectorResult, Error};
use crate::home_assistant::{ATTRIBUTES_TEMPLATE, DiscoveryPayload, Domain, EntityClass};
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::json;
use std::path::Path;
use tokio::process::Command;

const CLASS: EntityClass = EntityClass::new(Domain::BinarySensor).with_device_class("running");

const VIDEO_DEVICES: &str = "/dev";

/// On while a process holds the video device open
struct Webcam {
    device_path: String,
}

#[async_trait]
impl StateProvider for Webcam {
    async fn get_state(&self) -> CollectorResult<State> {
        // -w suppresses the warnings
        let output = Command::new("lsof")
            .arg("-w")
            .arg(&self.device_path)
            .output()
            .await?;

        let state = match parse_lsof(&String::from_utf8_lossy(&output.stdout)) {
            Some(process) => State::new(true).with_metadata(json!({ "process": process })),
            None => State::new(false).with_metadata(json!({})),
        };
        Ok(state)
    }

    fn extend_discovery(&self, payload: &mut DiscoveryPayload, state_topic: &str) {
        payload.extend("json_attributes_topic", state_topic);
        payload.extend("json_attributes_template", ATTRIBUTES_TEMPLATE);
    }
}

/// Name of the first process listed by `lsof`, the first line being the header
fn parse_lsof(output: &str) -> Option<String> {
    output
        .trim()
        .lines()
        .nth(1)
        .and_then(|line| line.split_whitespace().next())
        .map(String::from)
}

/// Video devices of `dir`, as `(suffix, path)` sorted by path
fn video_devices(dir: &Path) -> std::io::Result<Vec<(String, String)>> {
    let mut devices: Vec<(String, String)> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            let suffix = name.strip_prefix("video")?.to_string();
            Some((suffix, entry.path().display().to_string()))
        })
        .collect();
    devices.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(devices)
}

/// Creates one entity per video device, `<id>_<device number>`
pub fn setup(device: &mut Device, config: &PluginConfig) -> Result<(), Error> {
    let devices = video_devices(Path::new(VIDEO_DEVICES)).unwrap_or_else(|e| {
        warn!("{}: cannot list {VIDEO_DEVICES}: {e}", device.name());
        Vec::new()
    });

    for (suffix, path) in devices {
        debug!("{}: found video device {path}", device.name());
        let config = derive_config(config, &suffix, format!("Webcam {path}"));
        let webcam = Webcam { device_path: path };
        let entity = Entity::new(device, &config, CLASS, Capability::State(Box::new(webcam)));
        device.register(entity)?;
    }
    Ok(())
}
