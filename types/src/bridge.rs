//! Bridge wire messages.
//!
//! Inbound bridge payloads are JSON objects discriminated by a `type` field.
//! Only the variants below are understood; anything else fails to decode and
//! the handler reports it as unrecognized.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeMessage {
    #[serde(rename = "PLEASE_PROVISION")]
    PleaseProvision(ProvisionRequest),
}

/// Request to create a client for an external address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    pub nickname: String,
    pub address: String,
    #[serde(default)]
    pub power_flags: Vec<String>,
}

impl BridgeMessage {
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeMessage::PleaseProvision(_) => "PLEASE_PROVISION",
        }
    }
}
