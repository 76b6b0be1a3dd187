//! Outbound trade action messages.

use crate::strategy::TradeAction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trade action message as published to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: Uuid,
    pub ticker: String,
    pub quantity: u64,
    /// Action name, `Buy` or `Sell`
    pub action: String,
    pub timestamp: DateTime<Utc>,
}

impl OutboundMessage {
    pub fn new(ticker: impl Into<String>, quantity: u64, action: TradeAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticker: ticker.into(),
            quantity,
            action: action.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// JSON body sent to the broker.
    pub fn to_body(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Result of draining the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Messages confirmed by the broker
    pub published: usize,
    /// Failed publish attempts that were retried
    pub retries: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_json_shape() {
        let message = OutboundMessage::new("IBM", 25, TradeAction::Sell);
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["ticker"], "IBM");
        assert_eq!(json["quantity"], 25);
        assert_eq!(json["action"], "Sell");
        assert_eq!(json["id"], message.id.to_string());

        let timestamp = json["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(timestamp).is_ok());
    }
}
