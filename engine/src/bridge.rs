//! Bridge channel routing.
//!
//! A [`BridgeManager`] sits in front of the host's bridge device. Outbound
//! messages go straight to the device; inbound messages are routed by channel
//! name to the one handler registered for it.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use thiserror::Error;

use crate::vats::{BridgeDevice, VatError};

/// Future returned by bridge handlers.
pub type BridgeFut<'a> = Pin<Box<dyn Future<Output = Result<Value, BridgeError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("channel '{channel}' already has a handler")]
    DuplicateHandler { channel: String },
    #[error("no handler for channel '{channel}'")]
    NoHandler { channel: String },
    #[error("unrecognized bridge request: {0}")]
    Unrecognized(#[from] serde_json::Error),
    #[error(transparent)]
    Device(#[from] VatError),
}

/// Receives inbound messages for one channel.
pub trait BridgeHandler: Send + Sync {
    fn from_bridge<'a>(&'a self, source_id: &'a str, message: Value) -> BridgeFut<'a>;
}

#[derive(Clone)]
pub struct BridgeManager {
    device: Arc<dyn BridgeDevice>,
    handlers: Arc<Mutex<BTreeMap<String, Arc<dyn BridgeHandler>>>>,
}

impl BridgeManager {
    pub fn new(device: Arc<dyn BridgeDevice>) -> Self {
        Self {
            device,
            handlers: Arc::default(),
        }
    }

    pub fn register(
        &self,
        channel: &str,
        handler: Arc<dyn BridgeHandler>,
    ) -> Result<(), BridgeError> {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        if handlers.contains_key(channel) {
            return Err(BridgeError::DuplicateHandler {
                channel: channel.to_string(),
            });
        }
        handlers.insert(channel.to_string(), handler);
        tracing::debug!(channel, "bridge handler registered");
        Ok(())
    }

    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub async fn to_bridge(&self, channel: &str, message: Value) -> Result<Value, BridgeError> {
        Ok(self.device.call_outbound(channel, message).await?)
    }

    /// Deliver an inbound message to the handler registered for `source_id`.
    pub async fn from_bridge(&self, source_id: &str, message: Value) -> Result<Value, BridgeError> {
        let handler = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source_id)
            .cloned()
            .ok_or_else(|| BridgeError::NoHandler {
                channel: source_id.to_string(),
            })?;
        handler.from_bridge(source_id, message).await
    }
}

impl std::fmt::Debug for BridgeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeManager")
            .field("channels", &self.channels())
            .finish_non_exhaustive()
    }
}
