use crate::configuration::PluginConfig;
use crate::device::Device;
use crate::entity::{Capability, Entity, State, StateProvider};
use crate::error::{CollectorResult, Error};
use crate::home_assistant::{Domain, EntityClass};
use async_trait::async_trait;

const CLASS: EntityClass = EntityClass::new(Domain::BinarySensor).with_device_class("connectivity");

/// Always on while the entity is connected
struct Available;

#[async_trait]
impl StateProvider for Available {
    async fn get_state(&self) -> CollectorResult<State> {
        Ok(State::new(true))
    }
}

pub fn setup(device: &mut Device, config: &PluginConfig) -> Result<(), Error> {
    let entity = Entity::new(device, config, CLASS, Capability::State(Box::new(Available)));
    device.register(entity)
}
