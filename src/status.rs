use serde::Serialize;
use std::fmt;

/// Availability message of the device
///
/// Every entity reads its availability from this message, through `{{ value_json.state }}`.
#[derive(Serialize, Debug, PartialEq)]
pub struct AvailabilityMessage {
    pub state: &'static str,
}

impl fmt::Display for AvailabilityMessage {
    /// Formats the message to a JSON string
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let Ok(str) = serde_json::to_string(&self) else {
            return Err(fmt::Error);
        };
        write!(f, "{str}")
    }
}

impl AvailabilityMessage {
    /// Produces the status while the device is connected
    pub fn online() -> AvailabilityMessage {
        AvailabilityMessage { state: "online" }
    }

    /// Produces the status when we're disconnecting, also used as the last will
    pub fn offline() -> AvailabilityMessage {
        AvailabilityMessage { state: "offline" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payloads() {
        assert_eq!(AvailabilityMessage::online().to_string(), r#"{"state":"online"}"#);
        assert_eq!(AvailabilityMessage::offline().to_string(), r#"{"state":"offline"}"#);
    }
}
