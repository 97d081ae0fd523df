//! Interfaces of the external services a bootstrap run wires together.
//!
//! Nothing here is implemented by the engine. The host supplies vat roots and
//! devices as resources in the power tree, and vats loaded by name come back
//! from the vat admin service as [`Capability`] values holding one of these
//! trait objects. [`crate::loopback`] has in-process stand-ins.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use keystone_types::Capability;
use serde_json::Value;
use thiserror::Error;

use crate::bridge::BridgeManager;
use crate::client::ClientFacet;
use crate::error::BehaviorError;

/// Future returned by every collaborator call.
pub type VatFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, VatError>> + Send + 'a>>;

/// Comms index the provisioning service is reachable on.
pub const PROVISIONER_INDEX: u32 = 1;

/// A collaborator call failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("vat '{vat}' failed: {message}")]
pub struct VatError {
    pub vat: String,
    pub message: String,
}

impl VatError {
    pub fn new(vat: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            vat: vat.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// Vat admin
// ============================================================================

pub trait VatAdminVat: Send + Sync {
    fn create_vat_admin_service(
        &self,
        device: Capability,
    ) -> VatFut<'_, Arc<dyn VatAdminService>>;
}

pub trait VatAdminService: Send + Sync {
    /// Create a vat from a named bundle and return its root object.
    fn create_vat_by_name<'a>(&'a self, name: &'a str) -> VatFut<'a, Capability>;
}

/// The `loadVat` capability: creates vats by bundle name.
#[derive(Clone)]
pub struct VatLoader {
    svc: Arc<dyn VatAdminService>,
}

impl VatLoader {
    pub fn new(svc: Arc<dyn VatAdminService>) -> Self {
        Self { svc }
    }

    pub async fn load(&self, name: &str) -> Result<Capability, VatError> {
        tracing::info!(bundle = name, "createVatByName");
        self.svc.create_vat_by_name(name).await
    }

    /// Load a vat and downcast its root.
    pub async fn load_as<T: Any + Clone>(&self, name: &str) -> Result<T, BehaviorError> {
        let root = self.load(name).await?;
        Ok(root.downcast::<T>()?)
    }
}

impl std::fmt::Debug for VatLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VatLoader").finish_non_exhaustive()
    }
}

// ============================================================================
// Zoe
// ============================================================================

/// Parameters of the fee currency Zoe mints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeIssuerConfig {
    pub name: String,
    pub decimal_places: u8,
}

impl Default for FeeIssuerConfig {
    fn default() -> Self {
        Self {
            name: "RUN".to_string(),
            decimal_places: 6,
        }
    }
}

pub struct ZoeKit {
    pub zoe_service: Arc<dyn ZoeService>,
    pub fee_mint_access: Capability,
}

pub trait ZoeVat: Send + Sync {
    fn build_zoe(
        &self,
        vat_admin_svc: Arc<dyn VatAdminService>,
        fee_issuer: FeeIssuerConfig,
    ) -> VatFut<'_, ZoeKit>;
}

pub trait ZoeService: Send + Sync {
    fn fee_issuer(&self) -> VatFut<'_, Arc<dyn Issuer>>;

    /// An empty purse of the fee currency.
    fn make_fee_purse(&self) -> VatFut<'_, Capability>;
}

pub trait Issuer: Send + Sync {
    fn allegation(&self) -> &str;
    fn brand(&self) -> VatFut<'_, Capability>;
}

// ============================================================================
// Board, bank, timer
// ============================================================================

pub trait BoardVat: Send + Sync {
    fn get_board(&self) -> VatFut<'_, Capability>;
}

pub trait BankVat: Send + Sync {
    fn make_bank_manager(
        &self,
        bridge_manager: Option<BridgeManager>,
    ) -> VatFut<'_, Arc<dyn BankManager>>;
}

pub trait BankManager: Send + Sync {
    fn bank_for_address(&self, address: &str) -> Capability;
}

pub trait TimerVat: Send + Sync {
    fn create_timer_service(&self, device: Capability) -> VatFut<'_, Capability>;
}

// ============================================================================
// Comms and devices
// ============================================================================

pub trait CommsVat: Send + Sync {
    /// Open a transport to a remote address.
    fn add_remote<'a>(&'a self, address: &'a str) -> VatFut<'a, ()>;

    /// Expose `provider` to `address` at a well-known index.
    fn add_egress<'a>(
        &'a self,
        address: &'a str,
        index: u32,
        provider: ClientFacet,
    ) -> VatFut<'a, ()>;
}

pub trait BridgeDevice: Send + Sync {
    fn call_outbound<'a>(&'a self, channel: &'a str, message: Value) -> VatFut<'a, Value>;
}
