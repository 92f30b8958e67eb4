//! # mqttdevice
//!
//! `mqttdevice` publishes host sensors and commands to Home Assistant, through MQTT discovery.
//!
//! A [`Device`] holds the entities created by the configured plugins. The device and each
//! entity own a broker connection and run in their own task.

pub use self::configuration::Configuration;
pub use self::configuration::Mqtt;
pub use self::configuration::PluginConfig;
pub use self::daemon::Daemon;
pub use self::device::Device;
pub use self::device::DeviceIdentity;
pub use self::entity::Capability;
pub use self::entity::Entity;
pub use self::entity::MessageHandler;
pub use self::entity::State;
pub use self::entity::StateProvider;
pub use self::error::CollectorError;
pub use self::error::Error;
pub use self::home_assistant::DiscoveryPayload;
pub use self::home_assistant::Domain;
pub use self::home_assistant::EntityClass;
pub use self::registry::Registry;
pub use self::session::Connection;
pub use self::session::Message;
pub use self::session::Session;
pub use self::status::AvailabilityMessage;

/// Contains the reconnection backoff
pub mod backoff;
/// Contains the configuration stuff
pub mod configuration;
/// Contains the daemon code
pub mod daemon;
/// Contains the device and its identity
pub mod device;
/// Contains the entities and the collector traits
pub mod entity;
/// Contains the error types
pub mod error;
/// Contains Home Assistant discovery data and topics
pub mod home_assistant;
/// Contains the connection lifecycle shared by the device and the entities
pub mod lifecycle;
pub mod plugins;
/// Contains the entity registry
pub mod registry;
/// Contains the broker connection wrapper
pub mod session;
/// Contains the availability that is sent to MQTT
pub mod status;
