use crate::configuration::PluginConfig;
use crate::device::Device;
use crate::entity::{Capability, Entity, State, StateProvider};
use crate::error::{CollectorResult, Error};
use crate::home_assistant::{Domain, EntityClass};
use async_trait::async_trait;
use sysinfo::System;

const CLASS: EntityClass = EntityClass::new(Domain::Sensor)
    .with_device_class("duration")
    .with_unit("s")
    .with_default_name("Uptime");

/// Reports the host uptime in seconds
struct Uptime;

#[async_trait]
impl StateProvider for Uptime {
    async fn get_state(&self) -> CollectorResult<State> {
        Ok(State::new(System::uptime()))
    }
}

pub fn setup(device: &mut Device, config: &PluginConfig) -> Result<(), Error> {
    let entity = Entity::new(device, config, CLASS, Capability::State(Box::new(Uptime)));
    device.register(entity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_uptime() {
        let state = Uptime.get_state().await.expect("cannot read uptime");

        assert!(state.value.as_u64().is_some_and(|uptime| uptime > 0));
        assert_eq!(state.metadata, None);
    }
}
