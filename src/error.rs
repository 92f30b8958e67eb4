use thiserror::Error;

/// Errors raised by the device, its entities and their sessions
#[derive(Debug, Error)]
pub enum Error {
    /// A session already carries a last will. This is a programming error.
    #[error("a last will is already set on session {0}")]
    WillAlreadySet(String),

    /// Two entities of the same device resolve to the same identifier
    #[error("duplicate entity identifier {0}")]
    DuplicateEntity(String),

    /// The configuration references a plugin that does not exist
    #[error("no such plugin {0}, available plugins: {available}", available = crate::plugins::names().collect::<Vec<_>>().join(", "))]
    UnknownPlugin(String),

    /// A device name or entity id cannot be used as an MQTT topic level
    #[error("{0:?} cannot be used in MQTT topics")]
    InvalidName(String),

    /// A plugin is missing one of its settings or has an invalid one
    #[error("invalid configuration for plugin {plugin}: {reason}")]
    InvalidPluginConfig { plugin: String, reason: String },

    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("MQTT connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    /// The event loop of a connection stopped
    #[error("MQTT connection closed")]
    ConnectionClosed,

    #[error("cannot serialize payload: {0}")]
    Json(#[from] serde_json::Error),

    /// A collector failed to read its state
    #[error(transparent)]
    Collector(#[from] CollectorError),
}

impl Error {
    /// Returns `true` for startup misconfiguration that must abort the process
    ///
    /// ```
    /// use mqttdevice::Error;
    ///
    /// assert!(Error::DuplicateEntity("host_uptime".into()).is_fatal());
    /// assert!(!Error::ConnectionClosed.is_fatal());
    /// ```
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::WillAlreadySet(_)
                | Error::DuplicateEntity(_)
                | Error::UnknownPlugin(_)
                | Error::InvalidName(_)
                | Error::InvalidPluginConfig { .. }
        )
    }
}

/// Errors raised by a collector while reading a state or handling a command
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An external command exited with a failure
    #[error("command `{command}` failed: {reason}")]
    Command { command: String, reason: String },

    #[error("cannot parse collector output: {0}")]
    Parse(String),

    /// The observed resource disappeared or cannot be read right now
    #[error("{0} is unavailable")]
    Unavailable(String),
}

/// Result of a collector operation
pub type CollectorResult<T> = Result<T, CollectorError>;
