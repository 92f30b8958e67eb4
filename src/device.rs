use crate::configuration::{Configuration, Mqtt};
use crate::entity::Entity;
use crate::error::Error;
use crate::home_assistant::{DeviceMetadata, availability_topic, is_topic_level};
use crate::lifecycle::{Lifecycle, Shutdown};
use crate::plugins;
use crate::registry::Registry;
use crate::session::{Connection, Session};
use crate::status::AvailabilityMessage;
use async_trait::async_trait;
use convert_case::{Case, Casing};
use log::{debug, info};
use rumqttc::QoS;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Networks, System};
use tokio::time::sleep;

/// Identity of the host, shared read-only by the device and its entities
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceIdentity {
    /// Name used in topics and identifiers, snake cased
    pub name: String,

    /// Name shown in Home Assistant
    pub display_name: String,

    /// Identifiers of the physical device
    pub ids: Vec<String>,
}

impl DeviceIdentity {
    /// Creates an identity from its display name
    ///
    /// The name keeps the ASCII letters and digits of the display name, words being separated
    /// by spaces, hyphens or underscores.
    ///
    /// ```
    /// use mqttdevice::DeviceIdentity;
    ///
    /// let identity = DeviceIdentity::new("Living Room PC", vec!["living-room-pc".to_string()]);
    /// assert_eq!(identity.name, "living_room_pc");
    /// assert_eq!(identity.availability_topic(), "mqttdevice/living_room_pc/availability");
    /// ```
    pub fn new(display_name: &str, ids: Vec<String>) -> DeviceIdentity {
        DeviceIdentity {
            name: Self::snake_case(display_name),
            display_name: display_name.to_string(),
            ids,
        }
    }

    fn snake_case(display_name: &str) -> String {
        let words: String = display_name
            .chars()
            .filter_map(|c| match c {
                '-' | '_' => Some(' '),
                c if c.is_whitespace() || c.is_ascii_alphanumeric() => Some(c),
                _ => None,
            })
            .collect();
        words.from_case(Case::Title).to_case(Case::Snake)
    }

    /// Identity of this host, named `device_name` if set, else after the hostname
    pub fn from_host(device_name: Option<&str>) -> DeviceIdentity {
        let hostname = System::host_name().unwrap_or_else(|| String::from("localhost"));
        let display_name = match device_name {
            Some(name) => name.to_string(),
            None => Self::title(&hostname),
        };

        let mut ids = vec![hostname];
        ids.extend(Self::mac_address());

        Self::new(&display_name, ids)
    }

    /// Title cased short hostname, `my-laptop.local` becomes `My Laptop`
    fn title(hostname: &str) -> String {
        let short = hostname.split('.').next().unwrap_or(hostname);
        short.from_case(Case::Kebab).to_case(Case::Title)
    }

    /// MAC address of the first interface that has one, by interface name
    fn mac_address() -> Option<String> {
        let networks = Networks::new_with_refreshed_list();
        let mut interfaces: Vec<_> = networks
            .iter()
            .filter(|(_, data)| !data.mac_address().is_unspecified())
            .collect();
        interfaces.sort_by(|a, b| a.0.cmp(b.0));
        interfaces
            .first()
            .map(|(_, data)| data.mac_address().to_string())
    }

    /// `mqttdevice/<device-name>/availability`
    pub fn availability_topic(&self) -> String {
        availability_topic(&self.name)
    }

    /// Device block of the discovery documents
    pub fn metadata(&self) -> DeviceMetadata {
        DeviceMetadata {
            ids: self.ids.clone(),
            name: self.display_name.clone(),
        }
    }
}

/// Root of the published entities, reports the availability of all of them
pub struct Device {
    identity: Arc<DeviceIdentity>,
    mqtt: Mqtt,
    polling_interval: Duration,
    session: Session,
    registry: Registry,
}

impl Device {
    /// Creates the device and the entities of every configured plugin
    ///
    /// Fails on the first misconfigured plugin: the device never partially starts.
    pub fn new(config: &Configuration) -> Result<Device, Error> {
        let identity = DeviceIdentity::from_host(config.device_name.as_deref());
        if !is_topic_level(&identity.name) {
            return Err(Error::InvalidName(identity.display_name));
        }
        info!("{}: starting device {}", identity.name, identity.display_name);

        let mut device = Device {
            session: Session::new(&identity.name, &config.mqtt),
            identity: Arc::new(identity),
            mqtt: config.mqtt.clone(),
            polling_interval: config.polling_interval(),
            registry: Registry::default(),
        };

        // Carried by every connection of the device, so the will is in place before anything is announced
        let availability_topic = device.availability_topic();
        device.session.set_last_will(
            &availability_topic,
            &AvailabilityMessage::offline().to_string(),
            QoS::AtMostOnce,
            true,
        )?;

        for plugin in &config.plugins {
            let setup = plugins::factory(&plugin.plugin)?;
            setup(&mut device, plugin)?;
        }

        Ok(device)
    }

    pub fn identity(&self) -> &Arc<DeviceIdentity> {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn mqtt(&self) -> &Mqtt {
        &self.mqtt
    }

    pub fn discovery_prefix(&self) -> &str {
        &self.mqtt.discovery_prefix
    }

    /// Default polling interval of the entities, and period of the availability reports
    pub fn polling_interval(&self) -> Duration {
        self.polling_interval
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn availability_topic(&self) -> String {
        self.identity.availability_topic()
    }

    /// Registers an entity, failing if another one has the same identifier
    /// or if its id cannot be used in topics
    pub fn register(&mut self, entity: Entity) -> Result<(), Error> {
        if !is_topic_level(entity.id()) {
            return Err(Error::InvalidName(entity.id().to_string()));
        }
        let entity = self.registry.insert(entity)?;
        info!("{}: registered entity {}", self.identity.name, entity.identifier());
        Ok(())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Takes the registered entities out, to run each of them in its own task
    pub fn take_entities(&mut self) -> Registry {
        std::mem::take(&mut self.registry)
    }

    async fn publish_availability(
        &self,
        connection: &Connection,
        message: AvailabilityMessage,
    ) -> Result<(), Error> {
        connection
            .publish(&self.availability_topic(), &message.to_string(), true)
            .await?;
        debug!("{}: published availability {message}", self.identity.name);
        Ok(())
    }
}

#[async_trait]
impl Lifecycle for Device {
    fn identifier(&self) -> &str {
        &self.identity.name
    }

    fn session(&self) -> &Session {
        &self.session
    }

    async fn announce(&mut self, connection: &Connection) -> Result<(), Error> {
        self.publish_availability(connection, AvailabilityMessage::online())
            .await
    }

    async fn steady_state(
        &mut self,
        connection: &mut Connection,
        shutdown: &mut Shutdown,
    ) -> Result<(), Error> {
        loop {
            tokio::select! {
                _ = sleep(self.polling_interval) => {
                    self.publish_availability(connection, AvailabilityMessage::online()).await?
                }
                e = connection.closed() => return Err(e),
                _ = shutdown.changed() => return Ok(()),
            }
        }
    }

    /// A clean disconnection does not trigger the last will
    async fn on_disconnect(&mut self, connection: &Connection) -> Result<(), Error> {
        self.publish_availability(connection, AvailabilityMessage::offline())
            .await
    }
}
