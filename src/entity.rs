use crate::configuration::PluginConfig;
use crate::device::{Device, DeviceIdentity};
use crate::error::{CollectorResult, Error};
use crate::home_assistant::{
    self, DiscoveryPayload, Domain, EntityClass, command_topic, discovery_topic, state_topic,
};
use crate::lifecycle::{Lifecycle, Shutdown};
use crate::session::{Connection, Message, Session};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Key of the state document holding the collector metadata
pub const METADATA_KEY: &str = "metadata";

/// Value read by a collector, with optional metadata published alongside
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub value: Value,
    pub metadata: Option<Value>,
}

impl State {
    pub fn new(value: impl Into<Value>) -> State {
        State {
            value: value.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: impl Into<Value>) -> State {
        self.metadata = Some(metadata.into());
        self
    }
}

/// Collector that periodically reports a state
#[async_trait]
pub trait StateProvider: Send + Sync {
    /// Reads the current state
    async fn get_state(&self) -> CollectorResult<State>;

    /// Converts the state to its wire representation, after the domain formatting
    fn format_state(&self, state: Value) -> Value {
        state
    }

    /// Adds collector specific fields to the discovery document
    fn extend_discovery(&self, _payload: &mut DiscoveryPayload, _state_topic: &str) {}
}

/// Collector that reacts to commands sent by Home Assistant
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_message(&self, message: &Message) -> CollectorResult<()>;

    /// Adds collector specific fields to the discovery document
    fn extend_discovery(&self, _payload: &mut DiscoveryPayload) {}
}

/// What an entity does once announced
pub enum Capability {
    /// Publishes the state every polling interval
    State(Box<dyn StateProvider>),

    /// Subscribes to the command topic and handles every message
    Message(Box<dyn MessageHandler>),
}

/// Publishable unit of a device
pub struct Entity {
    id: String,
    name: Option<String>,
    class: EntityClass,
    identifier: String,
    discovery_prefix: String,
    polling_interval: Duration,
    device: Arc<DeviceIdentity>,
    session: Session,
    capability: Capability,
}

impl Entity {
    /// Creates an entity of `device`, it still has to be registered with [`Device::register`]
    pub fn new(
        device: &Device,
        config: &PluginConfig,
        class: EntityClass,
        capability: Capability,
    ) -> Entity {
        let identity = device.identity().clone();
        let id = config.id.to_lowercase();
        let identifier = Self::identifier_of(device, config);

        Entity {
            name: config
                .name
                .clone()
                .or_else(|| class.default_name.map(String::from)),
            class,
            discovery_prefix: device.discovery_prefix().to_string(),
            polling_interval: config
                .polling_interval
                .map(Duration::from_secs)
                .unwrap_or(device.polling_interval()),
            session: Session::new(&identifier, device.mqtt()),
            device: identity,
            identifier,
            id,
            capability,
        }
    }

    /// Identifier the entity configured by `config` has in `device`
    pub fn identifier_of(device: &Device, config: &PluginConfig) -> String {
        format!("{}_{}", device.name(), config.id.to_lowercase())
    }

    /// Identifier within the device, lower cased
    pub fn id(&self) -> &str {
        &self.id
    }

    /// `<device-name>_<id>`, unique among all the entities
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn domain(&self) -> Domain {
        self.class.domain
    }

    pub fn class(&self) -> &EntityClass {
        &self.class
    }

    pub fn polling_interval(&self) -> Duration {
        self.polling_interval
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    /// `<prefix>/<domain>/<device-name>/<id>/config`
    pub fn discovery_topic(&self) -> String {
        discovery_topic(
            &self.discovery_prefix,
            self.class.domain,
            &self.device.name,
            &self.id,
        )
    }

    /// `mqttdevice/<identifier>/<device-class or state>`
    pub fn state_topic(&self) -> String {
        state_topic(&self.identifier, self.class.state_key())
    }

    /// `mqttdevice/<identifier>/set`
    pub fn set_topic(&self) -> String {
        command_topic(&self.identifier)
    }

    /// Builds the discovery document of this entity
    pub fn get_discovery_payload(&self) -> DiscoveryPayload {
        let mut payload = DiscoveryPayload::new(
            &self.id,
            &self.identifier,
            &self.device.availability_topic(),
            self.device.metadata(),
        );
        payload.name = self.name.clone();
        payload.device_class = self.class.device_class.map(String::from);
        payload.unit_of_measurement = self.class.unit_of_measurement.map(String::from);

        match &self.capability {
            Capability::State(provider) => {
                let state_topic = self.state_topic();
                payload.extend("state_topic", state_topic.as_str());
                payload.extend(
                    "value_template",
                    home_assistant::value_template(self.class.state_key()),
                );
                provider.extend_discovery(&mut payload, &state_topic);
            }
            Capability::Message(handler) => {
                payload.extend("command_topic", self.set_topic());
                handler.extend_discovery(&mut payload);
            }
        }

        payload
    }

    /// Publishes the discovery document, retained
    pub async fn publish_discovery(&self, connection: &Connection) -> Result<(), Error> {
        let payload = serde_json::to_string(&self.get_discovery_payload())?;
        connection
            .publish(&self.discovery_topic(), &payload, true)
            .await?;
        info!("{}: published discovery", self.identifier);
        Ok(())
    }

    /// Formats a state for the wire: domain coercion first, then the collector's own
    pub fn format_state(&self, state: Value) -> Value {
        let state = self.class.domain.format_state(state);
        match &self.capability {
            Capability::State(provider) => provider.format_state(state),
            Capability::Message(_) => state,
        }
    }

    /// Reads the state and builds the state document
    ///
    /// Returns `None` for entities that have no state.
    pub async fn state_payload(&self) -> Option<CollectorResult<Value>> {
        let Capability::State(provider) = &self.capability else {
            return None;
        };

        let state = match provider.get_state().await {
            Ok(state) => state,
            Err(e) => return Some(Err(e)),
        };

        let mut payload = Map::new();
        payload.insert(
            self.class.state_key().to_string(),
            self.format_state(state.value),
        );
        if let Some(metadata) = state.metadata {
            payload.insert(METADATA_KEY.to_string(), metadata);
        }
        Some(Ok(Value::Object(payload)))
    }

    /// Publishes the current state, retained
    ///
    /// A collector failure is returned as [`Error::Collector`] and nothing is published.
    pub async fn publish_state(&self, connection: &Connection) -> Result<(), Error> {
        let Some(payload) = self.state_payload().await else {
            return Ok(());
        };
        let payload = payload?.to_string();

        connection
            .publish(&self.state_topic(), &payload, true)
            .await?;
        debug!("{}: published state {payload}", self.identifier);
        Ok(())
    }

    /// Publishes the state, skipping this tick if the collector fails
    async fn report(&self, connection: &Connection) -> Result<(), Error> {
        match self.publish_state(connection).await {
            Err(Error::Collector(e)) => {
                warn!("{}: cannot read state: {e}", self.identifier);
                Ok(())
            }
            result => result,
        }
    }

    async fn poll_states(
        &self,
        connection: &mut Connection,
        shutdown: &mut Shutdown,
    ) -> Result<(), Error> {
        self.report(connection).await?;

        loop {
            tokio::select! {
                _ = sleep(self.polling_interval) => self.report(connection).await?,
                e = connection.closed() => return Err(e),
                _ = shutdown.changed() => return Ok(()),
            }
        }
    }

    async fn handle_messages(
        &self,
        handler: &dyn MessageHandler,
        connection: &mut Connection,
        shutdown: &mut Shutdown,
    ) -> Result<(), Error> {
        loop {
            tokio::select! {
                message = connection.messages().recv() => {
                    let Some(message) = message else {
                        return Err(Error::ConnectionClosed);
                    };
                    info!(
                        "{}: received command {} on {}",
                        self.identifier,
                        message.payload_str().unwrap_or("<binary>"),
                        message.topic
                    );
                    if let Err(e) = handler.on_message(&message).await {
                        warn!("{}: cannot handle command: {e}", self.identifier);
                    }
                }
                _ = shutdown.changed() => return Ok(()),
            }
        }
    }
}

#[async_trait]
impl Lifecycle for Entity {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn session(&self) -> &Session {
        &self.session
    }

    async fn announce(&mut self, connection: &Connection) -> Result<(), Error> {
        self.publish_discovery(connection).await?;
        if let Capability::Message(_) = self.capability {
            connection.subscribe(&self.set_topic()).await?;
        }
        Ok(())
    }

    async fn steady_state(
        &mut self,
        connection: &mut Connection,
        shutdown: &mut Shutdown,
    ) -> Result<(), Error> {
        match &self.capability {
            Capability::State(_) => self.poll_states(connection, shutdown).await,
            Capability::Message(handler) => {
                self.handle_messages(handler.as_ref(), connection, shutdown)
                    .await
            }
        }
    }

    async fn on_disconnect(&mut self, connection: &Connection) -> Result<(), Error> {
        self.report(connection).await
    }
}
