use async_trait::async_trait;
use minijinja::Environment;
use mqttdevice::error::CollectorResult;
use mqttdevice::{
    AvailabilityMessage, Capability, Configuration, Daemon, Device, DiscoveryPayload, Domain,
    Entity, EntityClass, PluginConfig, State, StateProvider,
};
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;
use std::time::Duration;

struct Fixed(f64);

#[async_trait]
impl StateProvider for Fixed {
    async fn get_state(&self) -> CollectorResult<State> {
        Ok(State::new(self.0))
    }
}

fn configuration(port: u16) -> Result<Configuration, Box<dyn Error>> {
    Configuration::parse(&format!(
        r#"
        device-name = "host1"
        polling-interval = 1

        [mqtt]
        host = "127.0.0.1"
        port = {port}

        [[plugins]]
        plugin = "availability"
        id = "available"

        [[plugins]]
        plugin = "command"
        id = "lock"
        command = "true"
        "#
    ))
}

fn render(template: &str, payload: &str) -> Result<String, Box<dyn Error>> {
    let payload: Value = serde_json::from_str(payload)?;
    let mut env = Environment::new();
    env.add_template("template", template)?;
    Ok(env
        .get_template("template")?
        .render(minijinja::context! { value_json => payload })?)
}

#[test]
fn test_discovery() -> Result<(), Box<dyn Error>> {
    let config = configuration(1883)?;
    let device = Device::new(&config)?;

    let entity = device
        .registry()
        .get("host1_available")
        .expect("availability entity not registered");
    assert_eq!(
        entity.discovery_topic(),
        "homeassistant/binary_sensor/host1/available/config"
    );

    let json: HashMap<String, Value> =
        serde_json::from_str(&entity.get_discovery_payload().to_string())?;
    assert_eq!(json["unique_id"], "available");
    assert_eq!(json["object_id"], "host1_available");
    assert_eq!(json["device_class"], "connectivity");
    assert_eq!(json["dev"]["name"], "host1");
    assert_eq!(json["o"]["name"], "mqttdevice");
    assert_eq!(json["availability_mode"], "latest");

    let availability = &json["availability"][0];
    assert_eq!(availability["topic"], device.availability_topic());
    let template = availability["value_template"]
        .as_str()
        .expect("no availability template");
    assert_eq!(
        render(template, &AvailabilityMessage::online().to_string())?,
        "online"
    );
    assert_eq!(
        render(template, &AvailabilityMessage::offline().to_string())?,
        "offline"
    );

    let button = device
        .registry()
        .get("host1_lock")
        .expect("command entity not registered");
    let json: HashMap<String, Value> =
        serde_json::from_str(&button.get_discovery_payload().to_string())?;
    assert_eq!(json["command_topic"], "mqttdevice/host1_lock/set");
    assert!(!json.contains_key("state_topic"));
    assert!(!json.contains_key("device_class"));

    Ok(())
}

#[test]
fn test_optional_keys() -> Result<(), Box<dyn Error>> {
    let device = Device::new(&configuration(1883)?)?;

    let classes = [
        EntityClass::new(Domain::Sensor),
        EntityClass::new(Domain::Sensor).with_device_class("duration"),
        EntityClass::new(Domain::Sensor).with_unit("s"),
        EntityClass::new(Domain::Sensor)
            .with_device_class("duration")
            .with_unit("s")
            .with_default_name("Uptime"),
    ];

    for class in classes {
        let entity = Entity::new(
            &device,
            &PluginConfig::new("uptime", "uptime"),
            class,
            Capability::State(Box::new(Fixed(1.0))),
        );
        let json: HashMap<String, Value> =
            serde_json::from_str(&entity.get_discovery_payload().to_string())?;

        for key in ["unique_id", "object_id", "availability", "dev", "state_topic", "value_template"] {
            assert!(json.contains_key(key), "{key} is missing");
        }
        assert_eq!(json.contains_key("device_class"), class.device_class.is_some());
        assert_eq!(json.contains_key("unit_of_measurement"), class.unit_of_measurement.is_some());
        assert_eq!(json.contains_key("name"), class.default_name.is_some());
    }

    Ok(())
}

#[tokio::test]
async fn test_state_publication() -> Result<(), Box<dyn Error>> {
    let device = Device::new(&configuration(1883)?)?;
    let entity = Entity::new(
        &device,
        &PluginConfig::new("uptime", "uptime"),
        EntityClass::new(Domain::Sensor)
            .with_device_class("duration")
            .with_unit("s"),
        Capability::State(Box::new(Fixed(42.5))),
    );

    assert_eq!(entity.state_topic(), "mqttdevice/host1_uptime/duration");

    let payload = entity
        .state_payload()
        .await
        .expect("entity has a state")?;
    let json: HashMap<String, Value> = serde_json::from_str(&payload.to_string())?;
    assert_eq!(json.len(), 1);
    assert_eq!(json["duration"], 42.5);

    let discovery = entity.get_discovery_payload();
    let template = discovery
        .get("value_template")
        .and_then(Value::as_str)
        .expect("no value template");
    assert_eq!(render(template, &payload.to_string())?, "42.5");

    Ok(())
}

#[test]
fn test_discovery_round_trip() -> Result<(), Box<dyn Error>> {
    let device = Device::new(&configuration(1883)?)?;

    for entity in device.registry().iter() {
        let payload = entity.get_discovery_payload();
        let parsed: DiscoveryPayload = serde_json::from_str(&payload.to_string())?;
        assert_eq!(parsed, payload);
    }

    Ok(())
}

/// Without a broker, every task keeps retrying on its own and still stops on request
#[tokio::test]
async fn test_stops_without_broker() -> Result<(), Box<dyn Error>> {
    let daemon = Daemon::new(&configuration(1)?)?;

    let stopped = tokio::time::timeout(
        Duration::from_secs(10),
        daemon.run_until(tokio::time::sleep(Duration::from_millis(500))),
    )
    .await;

    assert!(stopped.is_ok(), "the daemon did not stop");
    Ok(())
}
