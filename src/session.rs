use crate::configuration::Mqtt;
use crate::error::Error;
use log::{debug, trace};
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle};
use tokio::time::timeout;

/// Capacity of the request queue between the client and its event loop
const REQUEST_CAPACITY: usize = 10;

const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// How long a clean disconnect may take before the event loop is abandoned
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Message received on a subscribed topic
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl Message {
    /// Payload as UTF-8, if it is valid
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

impl From<rumqttc::Publish> for Message {
    fn from(publish: rumqttc::Publish) -> Self {
        Message {
            topic: publish.topic,
            payload: publish.payload.to_vec(),
        }
    }
}

/// Connection settings of one participant, device or entity
///
/// Each participant owns its session, so each one has its own broker connection.
pub struct Session {
    options: MqttOptions,
}

impl Session {
    /// Creates a session for the client `client_id`
    ///
    /// ```
    /// use mqttdevice::{Configuration, Session};
    ///
    /// let config = Configuration::load("conf/mqttdevice.toml").expect("Cannot load configuration");
    /// let session = Session::new("host1_uptime", &config.mqtt);
    ///
    /// assert_eq!(session.client_id(), "host1_uptime");
    /// ```
    pub fn new(client_id: &str, config: &Mqtt) -> Session {
        let mut options = MqttOptions::new(client_id, &config.host, config.port);
        options.set_keep_alive(KEEP_ALIVE);
        if !config.user.is_empty() {
            options.set_credentials(&config.user, &config.password);
        }

        Session { options }
    }

    pub fn client_id(&self) -> String {
        self.options.client_id()
    }

    /// Returns the last will, if one is registered
    pub fn last_will(&self) -> Option<LastWill> {
        self.options.last_will()
    }

    /// Registers the message the broker publishes if this session disconnects uncleanly
    ///
    /// A session has at most one last will: a second call fails with [`Error::WillAlreadySet`].
    pub fn set_last_will(
        &mut self,
        topic: &str,
        payload: &str,
        qos: QoS,
        retain: bool,
    ) -> Result<(), Error> {
        if self.options.last_will().is_some() {
            return Err(Error::WillAlreadySet(self.client_id()));
        }
        self.options
            .set_last_will(LastWill::new(topic, payload, qos, retain));
        Ok(())
    }

    /// Opens a connection and waits for the broker to acknowledge it
    ///
    /// The connection is closed when the returned [`Connection`] is dropped.
    pub async fn connect(&self) -> Result<Connection, Error> {
        let client_id = self.client_id();
        debug!("{client_id}: connecting to {:?}", self.options.broker_address());

        let (client, mut event_loop) = AsyncClient::new(self.options.clone(), REQUEST_CAPACITY);
        loop {
            match event_loop.poll().await? {
                Event::Incoming(Packet::ConnAck(ack)) => {
                    debug!("{client_id}: connected ({:?})", ack.code);
                    break;
                }
                event => trace!("{client_id}: MQTT notification received: {event:?}"),
            }
        }

        let (sender, messages) = mpsc::unbounded_channel();
        let event_loop = task::spawn(Self::forward(client_id.clone(), event_loop, sender));

        Ok(Connection {
            client,
            client_id,
            messages,
            event_loop: Some(event_loop),
        })
    }

    /// Drives the event loop and forwards the received messages until the connection ends
    async fn forward(
        client_id: String,
        mut event_loop: EventLoop,
        sender: mpsc::UnboundedSender<Message>,
    ) {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    trace!("{client_id}: message received on {}", publish.topic);
                    // Nobody listens once the connection is being dropped
                    let _ = sender.send(publish.into());
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    debug!("{client_id}: disconnected");
                    break;
                }
                Ok(event) => trace!("{client_id}: MQTT notification received: {event:?}"),
                Err(e) => {
                    debug!("{client_id}: event loop stopped: {e}");
                    break;
                }
            }
        }
    }
}

/// Live broker connection
pub struct Connection {
    client: AsyncClient,
    client_id: String,
    messages: mpsc::UnboundedReceiver<Message>,
    event_loop: Option<JoinHandle<()>>,
}

impl Connection {
    /// Publishes a serialized document to `topic`
    pub async fn publish(&self, topic: &str, data: &str, retain: bool) -> Result<(), Error> {
        debug!("{}: publishing to topic {topic} : {data}", self.client_id);
        self.client
            .publish(topic, QoS::AtMostOnce, retain, data)
            .await?;
        Ok(())
    }

    /// Subscribes to `topic`, matching messages are then yielded by [`Connection::messages`]
    pub async fn subscribe(&self, topic: &str) -> Result<(), Error> {
        debug!("{}: subscribing to topic {topic}", self.client_id);
        self.client.subscribe(topic, QoS::AtMostOnce).await?;
        Ok(())
    }

    /// Stream of the messages received on this connection
    ///
    /// `recv()` waits for the next message and returns `None` once the connection has ended.
    pub fn messages(&mut self) -> &mut mpsc::UnboundedReceiver<Message> {
        &mut self.messages
    }

    /// Waits until the connection ends
    pub async fn closed(&mut self) -> Error {
        while self.messages.recv().await.is_some() {}
        Error::ConnectionClosed
    }

    /// Disconnects cleanly, the broker does not publish the last will
    pub async fn disconnect(mut self) {
        if let Err(e) = self.client.disconnect().await {
            debug!("{}: cannot request disconnection: {e}", self.client_id);
        }
        if let Some(event_loop) = self.event_loop.take()
            && timeout(DISCONNECT_TIMEOUT, event_loop).await.is_err()
        {
            debug!("{}: disconnection timed out", self.client_id);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // The event loop task keeps running until the disconnection is sent
        let _ = self.client.try_disconnect();
    }
}

#[cfg(test)]
impl Connection {
    /// Connection queueing its requests instead of sending them to a broker
    ///
    /// Dropping the returned sender closes the connection.
    pub(crate) fn queued(
        client_id: &str,
    ) -> (
        Connection,
        flume::Receiver<rumqttc::Request>,
        mpsc::UnboundedSender<Message>,
    ) {
        let (requests, queue) = flume::unbounded();
        let (sender, messages) = mpsc::unbounded_channel();
        let connection = Connection {
            client: AsyncClient::from_senders(requests),
            client_id: client_id.to_string(),
            messages,
            event_loop: None,
        };
        (connection, queue, sender)
    }
}

/// Topics and payloads of the queued publications, subscriptions have an empty payload
#[cfg(test)]
pub(crate) fn published(queue: &flume::Receiver<rumqttc::Request>) -> Vec<(String, String)> {
    queue
        .try_iter()
        .filter_map(|request| match request {
            rumqttc::Request::Publish(publish) => Some((
                publish.topic,
                String::from_utf8_lossy(&publish.payload).into_owned(),
            )),
            rumqttc::Request::Subscribe(subscribe) => subscribe
                .filters
                .into_iter()
                .next()
                .map(|filter| (filter.path, String::new())),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Mqtt {
        Mqtt {
            host: String::from("127.0.0.1"),
            port: 1,
            user: String::new(),
            password: String::new(),
            discovery_prefix: String::from("homeassistant"),
        }
    }

    #[test]
    fn test_last_will_once() {
        let mut session = Session::new("host1", &config());
        assert!(session.last_will().is_none());

        session
            .set_last_will("mqttdevice/host1/availability", r#"{"state":"offline"}"#, QoS::AtMostOnce, true)
            .expect("first last will must be accepted");

        let will = session.last_will().expect("last will not registered");
        assert_eq!(will.topic, "mqttdevice/host1/availability");
        assert!(will.retain);

        let err = session
            .set_last_will("other", "payload", QoS::AtMostOnce, false)
            .expect_err("second last will must be refused");
        assert!(matches!(err, Error::WillAlreadySet(ref id) if id == "host1"));
        assert!(err.is_fatal());

        // The first will is kept
        assert_eq!(session.last_will().map(|w| w.topic), Some(will.topic));
    }

    #[test]
    fn test_message_payload() {
        let message = Message {
            topic: String::from("mqttdevice/host1_lock/set"),
            payload: b"PRESS".to_vec(),
        };
        assert_eq!(message.payload_str(), Some("PRESS"));

        let invalid = Message {
            topic: message.topic.clone(),
            payload: vec![0xff, 0xfe],
        };
        assert_eq!(invalid.payload_str(), None);
    }

    #[tokio::test]
    async fn test_queued_requests() {
        let (connection, queue, _messages) = Connection::queued("host1");

        connection
            .publish("mqttdevice/host1/availability", r#"{"state":"online"}"#, true)
            .await
            .expect("cannot publish");
        connection
            .subscribe("mqttdevice/host1_lock/set")
            .await
            .expect("cannot subscribe");

        assert_eq!(
            published(&queue),
            [
                (
                    String::from("mqttdevice/host1/availability"),
                    String::from(r#"{"state":"online"}"#)
                ),
                (String::from("mqttdevice/host1_lock/set"), String::new()),
            ]
        );

        let err = connection
            .publish("mqttdevice/pc+1/availability", "{}", true)
            .await
            .expect_err("wildcards are not valid in a published topic");
        assert!(matches!(err, Error::Client(_)));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let session = Session::new("host1", &config());

        let result = session.connect().await;
        assert!(matches!(result, Err(Error::Connection(_))));
    }
}
