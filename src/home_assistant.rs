use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Namespace of the state, command and availability topics
pub const TOPIC_NAMESPACE: &str = "mqttdevice";

/// Key of the state document when the entity has no device class
pub const DEFAULT_STATE_KEY: &str = "state";

/// Exposes the state metadata as entity attributes
pub const ATTRIBUTES_TEMPLATE: &str = "{{ value_json.metadata | tojson }}";

/// Home Assistant discovery categories supported by the entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumIter, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Domain {
    /// Two-state sensor, reported as `ON` or `OFF`
    BinarySensor,

    /// Stateless entity that receives commands
    Button,

    /// Sensor reporting a value
    Sensor,
}

impl Domain {
    /// Coerces a state into the representation expected by this domain
    ///
    /// ```
    /// use mqttdevice::Domain;
    /// use serde_json::json;
    ///
    /// assert_eq!(Domain::BinarySensor.format_state(json!(true)), json!("ON"));
    /// assert_eq!(Domain::Sensor.format_state(json!(true)), json!(true));
    /// ```
    pub fn format_state(&self, state: Value) -> Value {
        match (self, state) {
            (Domain::BinarySensor, Value::Bool(on)) => Value::from(if on { "ON" } else { "OFF" }),
            (_, state) => state,
        }
    }
}

/// Static classification of an entity, provided by the collector that creates it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityClass {
    /// Discovery category
    pub domain: Domain,

    /// Device class helps Home Assistant to know how to interpret the reported values.
    ///
    /// See <https://www.home-assistant.io/integrations/sensor#device-class> for possible values here
    pub device_class: Option<&'static str>,

    /// Unit used in the report
    pub unit_of_measurement: Option<&'static str>,

    /// Name used when the configuration does not give one
    pub default_name: Option<&'static str>,
}

impl EntityClass {
    /// Creates a class with no device class, unit or default name
    pub const fn new(domain: Domain) -> EntityClass {
        EntityClass {
            domain,
            device_class: None,
            unit_of_measurement: None,
            default_name: None,
        }
    }

    pub const fn with_device_class(mut self, device_class: &'static str) -> EntityClass {
        self.device_class = Some(device_class);
        self
    }

    pub const fn with_unit(mut self, unit: &'static str) -> EntityClass {
        self.unit_of_measurement = Some(unit);
        self
    }

    pub const fn with_default_name(mut self, name: &'static str) -> EntityClass {
        self.default_name = Some(name);
        self
    }

    /// Key of the state document: the device class, or `state`
    pub fn state_key(&self) -> &'static str {
        self.device_class.unwrap_or(DEFAULT_STATE_KEY)
    }
}

/// Discovery topic of an entity
///
/// ```
/// use mqttdevice::home_assistant::discovery_topic;
/// use mqttdevice::Domain;
///
/// assert_eq!(
///     discovery_topic("homeassistant", Domain::BinarySensor, "host1", "available"),
///     "homeassistant/binary_sensor/host1/available/config"
/// );
/// ```
pub fn discovery_topic(prefix: &str, domain: Domain, device: &str, id: &str) -> String {
    format!("{prefix}/{domain}/{device}/{id}/config")
}

/// Topic where the device publishes its availability
pub fn availability_topic(device: &str) -> String {
    format!("{TOPIC_NAMESPACE}/{device}/availability")
}

/// Topic where an entity publishes its state
pub fn state_topic(identifier: &str, state_key: &str) -> String {
    format!("{TOPIC_NAMESPACE}/{identifier}/{state_key}")
}

/// Topic where an entity receives its commands
pub fn command_topic(identifier: &str) -> String {
    format!("{TOPIC_NAMESPACE}/{identifier}/set")
}

/// Returns `true` if `level` fits in a single topic level: not empty, no separator and no wildcard
///
/// ```
/// use mqttdevice::home_assistant::is_topic_level;
///
/// assert!(is_topic_level("living_room_pc"));
/// assert!(!is_topic_level("pc+1"));
/// assert!(!is_topic_level("office/pc"));
/// ```
pub fn is_topic_level(level: &str) -> bool {
    !level.is_empty() && !level.contains(['/', '+', '#'])
}

/// Template extracting `key` from a JSON payload
pub fn value_template(key: &str) -> String {
    format!("{{{{ value_json.{key} }}}}")
}

/// Device sent to Home Assistant
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeviceMetadata {
    /// Identifiers of the device: the hostname and the MAC address, when found
    pub ids: Vec<String>,

    /// Display name of the device
    pub name: String,
}

/// Describes the origin of the messages, in this case `mqttdevice`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Origin {
    /// Name of the origin, always `mqttdevice`
    pub name: String,

    /// Version of `mqttdevice`
    pub sw_version: String,

    /// URL of `mqttdevice`
    pub url: String,
}

impl Default for Origin {
    fn default() -> Self {
        Origin {
            name: env!("CARGO_PKG_NAME").to_string(),
            sw_version: env!("CARGO_PKG_VERSION").to_string(),
            url: env!("CARGO_PKG_HOMEPAGE").to_string(),
        }
    }
}

/// Availability source of an entity
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Availability {
    pub topic: String,
    pub value_template: String,
}

/// Discovery document of a single entity
///
/// See <https://www.home-assistant.io/integrations/mqtt/#single-component-discovery-payload>
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DiscoveryPayload {
    /// Availability is device scoped: every entity points at the device topic
    pub availability: Vec<Availability>,

    pub availability_mode: String,

    /// Identifier of the entity within the device
    pub unique_id: String,

    /// `<device-name>_<entity-id>`, Home Assistant derives the entity ID from it
    pub object_id: String,

    pub dev: DeviceMetadata,

    pub o: Origin,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,

    /// Fields added by the entity kind and the collector
    #[serde(flatten)]
    extensions: Map<String, Value>,
}

/// Keys owned by the base document
const BASE_KEYS: [&str; 9] = [
    "availability",
    "availability_mode",
    "unique_id",
    "object_id",
    "dev",
    "o",
    "name",
    "device_class",
    "unit_of_measurement",
];

impl DiscoveryPayload {
    /// Creates the base document shared by all entities
    pub fn new(
        unique_id: &str,
        object_id: &str,
        availability_topic: &str,
        dev: DeviceMetadata,
    ) -> DiscoveryPayload {
        DiscoveryPayload {
            availability: vec![Availability {
                topic: availability_topic.to_string(),
                value_template: value_template(DEFAULT_STATE_KEY),
            }],
            availability_mode: String::from("latest"),
            unique_id: unique_id.to_string(),
            object_id: object_id.to_string(),
            dev,
            o: Origin::default(),
            name: None,
            device_class: None,
            unit_of_measurement: None,
            extensions: Map::new(),
        }
    }

    /// Adds a field to the document
    ///
    /// Keys already present are never overridden: returns `false` and leaves the document untouched.
    ///
    /// ```
    /// use mqttdevice::home_assistant::{DeviceMetadata, DiscoveryPayload};
    ///
    /// let dev = DeviceMetadata { ids: vec!["host1".into()], name: "Host1".into() };
    /// let mut payload = DiscoveryPayload::new("uptime", "host1_uptime", "mqttdevice/host1/availability", dev);
    ///
    /// assert!(payload.extend("state_topic", "mqttdevice/host1_uptime/state"));
    /// assert!(!payload.extend("state_topic", "elsewhere"));
    /// assert!(!payload.extend("unique_id", "other"));
    /// ```
    pub fn extend(&mut self, key: &str, value: impl Into<Value>) -> bool {
        if BASE_KEYS.contains(&key) || self.extensions.contains_key(key) {
            return false;
        }
        self.extensions.insert(key.to_string(), value.into());
        true
    }

    /// Returns an added field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extensions.get(key)
    }
}

impl fmt::Display for DiscoveryPayload {
    /// Formats the document in JSON format
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let Ok(payload) = serde_json::to_string(&self) else {
            return Err(fmt::Error);
        };
        write!(f, "{payload}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    fn metadata() -> DeviceMetadata {
        DeviceMetadata {
            ids: vec!["host1".to_string(), "00:11:22:33:44:55".to_string()],
            name: "Host1".to_string(),
        }
    }

    #[test]
    fn test_domain_names() {
        assert_eq!(Domain::BinarySensor.as_ref(), "binary_sensor");
        assert_eq!(Domain::Button.to_string(), "button");
        assert_eq!(Domain::from_str("sensor"), Ok(Domain::Sensor));
    }

    #[test]
    fn test_topics_are_distinct() {
        let ids = ["available", "uptime", "state", "set", "config"];
        let mut topics = HashSet::new();

        for id in ids {
            for domain in Domain::iter() {
                assert!(topics.insert(discovery_topic("homeassistant", domain, "host1", id)));
                assert!(topics.insert(discovery_topic(TOPIC_NAMESPACE, domain, "host1", id)));
            }
            let identifier = format!("host1_{id}");
            assert!(topics.insert(state_topic(&identifier, DEFAULT_STATE_KEY)));
            assert!(topics.insert(state_topic(&identifier, "duration")));
            assert!(topics.insert(command_topic(&identifier)));
        }
        assert!(topics.insert(availability_topic("host1")));
    }

    #[test]
    fn test_topic_levels() {
        for level in ["host1", "host1_webcam_0", "alsa_input.usb-mic"] {
            assert!(is_topic_level(level), "{level} must be accepted");
        }
        for level in ["", "a/b", "pc+1", "#"] {
            assert!(!is_topic_level(level), "{level} must be refused");
        }
    }

    #[test]
    fn test_base_document() {
        let payload = DiscoveryPayload::new(
            "available",
            "host1_available",
            "mqttdevice/host1/availability",
            metadata(),
        );
        let json: Value = serde_json::from_str(&payload.to_string()).expect("invalid JSON");

        assert_eq!(json["unique_id"], "available");
        assert_eq!(json["object_id"], "host1_available");
        assert_eq!(json["availability_mode"], "latest");
        assert_eq!(json["availability"][0]["topic"], "mqttdevice/host1/availability");
        assert_eq!(json["availability"][0]["value_template"], "{{ value_json.state }}");
        assert_eq!(json["dev"]["name"], "Host1");
        assert_eq!(json["o"]["name"], "mqttdevice");

        for key in ["name", "device_class", "unit_of_measurement"] {
            assert!(json.get(key).is_none(), "{key} should be absent");
        }
    }

    #[test]
    fn test_round_trip() {
        let mut payload = DiscoveryPayload::new(
            "uptime",
            "host1_uptime",
            "mqttdevice/host1/availability",
            metadata(),
        );
        payload.name = Some("Uptime".to_string());
        payload.device_class = Some("duration".to_string());
        payload.unit_of_measurement = Some("s".to_string());
        payload.extend("state_topic", "mqttdevice/host1_uptime/duration");
        payload.extend("value_template", value_template("duration"));

        let parsed: DiscoveryPayload =
            serde_json::from_str(&payload.to_string()).expect("invalid JSON");

        assert_eq!(parsed, payload);
        assert_eq!(
            parsed.get("value_template"),
            Some(&Value::from("{{ value_json.duration }}"))
        );
    }
}
