//! In-process stand-ins for every external collaborator.
//!
//! [`Loopback::install`] fills a [`PowerTree`] with vat roots and devices so a
//! full manifest can run without a real host. The stand-ins keep just enough
//! state for callers to check what was asked of them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};

use keystone_types::Capability;
use serde_json::Value;

use crate::attenuate::PowerTree;
use crate::bridge::BridgeManager;
use crate::client::ClientFacet;
use crate::vats::{
    BankManager, BankVat, BoardVat, BridgeDevice, CommsVat, FeeIssuerConfig, Issuer, TimerVat,
    VatAdminService, VatAdminVat, VatError, VatFut, ZoeKit, ZoeService, ZoeVat,
};

/// A device handle. Devices are opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device(pub &'static str);

// ============================================================================
// Vat admin
// ============================================================================

/// Vat admin root: hands out a service over a fixed set of named vats.
pub struct LoopbackVatAdmin {
    service: Arc<LoopbackVatAdminService>,
}

impl LoopbackVatAdmin {
    pub fn new(service: Arc<LoopbackVatAdminService>) -> Self {
        Self { service }
    }
}

impl VatAdminVat for LoopbackVatAdmin {
    fn create_vat_admin_service(
        &self,
        _device: Capability,
    ) -> VatFut<'_, Arc<dyn VatAdminService>> {
        let service: Arc<dyn VatAdminService> = self.service.clone();
        Box::pin(async move { Ok(service) })
    }
}

#[derive(Default)]
pub struct LoopbackVatAdminService {
    roots: BTreeMap<String, Capability>,
    created: Mutex<Vec<String>>,
}

impl LoopbackVatAdminService {
    /// A service that can create `zoe`, `board` and `bank`.
    #[must_use]
    pub fn standard() -> Self {
        let zoe: Arc<dyn ZoeVat> = Arc::new(LoopbackZoe);
        let board: Arc<dyn BoardVat> = Arc::new(LoopbackBoard);
        let bank: Arc<dyn BankVat> = Arc::new(LoopbackBank);
        Self::default()
            .with_vat("zoe", Capability::new(zoe))
            .with_vat("board", Capability::new(board))
            .with_vat("bank", Capability::new(bank))
    }

    pub fn with_vat(mut self, name: &str, root: Capability) -> Self {
        self.roots.insert(name.to_string(), root);
        self
    }

    /// Bundle names created so far, in order.
    #[must_use]
    pub fn created(&self) -> Vec<String> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl VatAdminService for LoopbackVatAdminService {
    fn create_vat_by_name<'a>(&'a self, name: &'a str) -> VatFut<'a, Capability> {
        Box::pin(async move {
            let root = self
                .roots
                .get(name)
                .cloned()
                .ok_or_else(|| VatError::new("vatAdmin", format!("no bundle named '{name}'")))?;
            self.created
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(name.to_string());
            Ok(root)
        })
    }
}

// ============================================================================
// Zoe
// ============================================================================

/// Brand of a loopback issuer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Brand {
    pub name: String,
    pub decimal_places: u8,
}

pub struct LoopbackIssuer {
    name: String,
    brand: Capability,
}

impl Issuer for LoopbackIssuer {
    fn allegation(&self) -> &str {
        &self.name
    }

    fn brand(&self) -> VatFut<'_, Capability> {
        let brand = self.brand.clone();
        Box::pin(async move { Ok(brand) })
    }
}

pub struct LoopbackZoe;

impl ZoeVat for LoopbackZoe {
    fn build_zoe(
        &self,
        _vat_admin_svc: Arc<dyn VatAdminService>,
        fee_issuer: FeeIssuerConfig,
    ) -> VatFut<'_, ZoeKit> {
        Box::pin(async move {
            let brand = Capability::new(Brand {
                name: fee_issuer.name.clone(),
                decimal_places: fee_issuer.decimal_places,
            });
            let issuer: Arc<dyn Issuer> = Arc::new(LoopbackIssuer {
                name: fee_issuer.name,
                brand,
            });
            Ok(ZoeKit {
                zoe_service: Arc::new(LoopbackZoeService { fee_issuer: issuer }),
                fee_mint_access: Capability::new(Device("feeMintAccess")),
            })
        })
    }
}

/// A purse of the fee currency. Loopback purses are always empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeePurse {
    pub allegation: String,
}

pub struct LoopbackZoeService {
    fee_issuer: Arc<dyn Issuer>,
}

impl ZoeService for LoopbackZoeService {
    fn fee_issuer(&self) -> VatFut<'_, Arc<dyn Issuer>> {
        let issuer = Arc::clone(&self.fee_issuer);
        Box::pin(async move { Ok(issuer) })
    }

    fn make_fee_purse(&self) -> VatFut<'_, Capability> {
        let purse = FeePurse {
            allegation: self.fee_issuer.allegation().to_string(),
        };
        Box::pin(async move { Ok(Capability::new(purse)) })
    }
}

// ============================================================================
// Board, bank, timer
// ============================================================================

/// The board handed out by [`LoopbackBoard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Board;

pub struct LoopbackBoard;

impl BoardVat for LoopbackBoard {
    fn get_board(&self) -> VatFut<'_, Capability> {
        Box::pin(async { Ok(Capability::new(Board)) })
    }
}

pub struct LoopbackBank;

impl BankVat for LoopbackBank {
    fn make_bank_manager(
        &self,
        bridge_manager: Option<BridgeManager>,
    ) -> VatFut<'_, Arc<dyn BankManager>> {
        Box::pin(async move {
            let manager: Arc<dyn BankManager> = Arc::new(LoopbackBankManager {
                bridged: bridge_manager.is_some(),
                banks: Mutex::default(),
            });
            Ok(manager)
        })
    }
}

/// One address's bank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bank {
    pub address: String,
    pub bridged: bool,
}

pub struct LoopbackBankManager {
    bridged: bool,
    banks: Mutex<BTreeMap<String, Capability>>,
}

impl BankManager for LoopbackBankManager {
    fn bank_for_address(&self, address: &str) -> Capability {
        self.banks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(address.to_string())
            .or_insert_with(|| {
                Capability::new(Bank {
                    address: address.to_string(),
                    bridged: self.bridged,
                })
            })
            .clone()
    }
}

/// Timer service created from a timer device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerService {
    pub device: Device,
}

pub struct LoopbackTimer;

impl TimerVat for LoopbackTimer {
    fn create_timer_service(&self, device: Capability) -> VatFut<'_, Capability> {
        Box::pin(async move {
            let device = device
                .downcast::<Device>()
                .map_err(|err| VatError::new("timer", err.to_string()))?;
            Ok(Capability::new(TimerService { device }))
        })
    }
}

// ============================================================================
// Comms and bridge
// ============================================================================

#[derive(Default)]
pub struct LoopbackComms {
    remotes: Mutex<BTreeSet<String>>,
    egresses: Mutex<BTreeMap<(String, u32), ClientFacet>>,
}

impl LoopbackComms {
    #[must_use]
    pub fn remotes(&self) -> Vec<String> {
        self.remotes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn egress(&self, address: &str, index: u32) -> Option<ClientFacet> {
        self.egresses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(address.to_string(), index))
            .cloned()
    }
}

impl CommsVat for LoopbackComms {
    fn add_remote<'a>(&'a self, address: &'a str) -> VatFut<'a, ()> {
        Box::pin(async move {
            let added = self
                .remotes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(address.to_string());
            if added {
                Ok(())
            } else {
                Err(VatError::new("comms", format!("remote '{address}' already exists")))
            }
        })
    }

    fn add_egress<'a>(
        &'a self,
        address: &'a str,
        index: u32,
        provider: ClientFacet,
    ) -> VatFut<'a, ()> {
        Box::pin(async move {
            self.egresses
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert((address.to_string(), index), provider);
            Ok(())
        })
    }
}

/// Bridge device that records outbound calls and answers `null`.
#[derive(Default)]
pub struct LoopbackBridge {
    sent: Mutex<Vec<(String, Value)>>,
}

impl LoopbackBridge {
    #[must_use]
    pub fn sent(&self) -> Vec<(String, Value)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl BridgeDevice for LoopbackBridge {
    fn call_outbound<'a>(&'a self, channel: &'a str, message: Value) -> VatFut<'a, Value> {
        Box::pin(async move {
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((channel.to_string(), message));
            Ok(Value::Null)
        })
    }
}

// ============================================================================
// Host
// ============================================================================

/// A complete set of stand-ins.
pub struct Loopback {
    pub vat_admin_service: Arc<LoopbackVatAdminService>,
    pub comms: Arc<LoopbackComms>,
    pub bridge: Option<Arc<LoopbackBridge>>,
}

impl Loopback {
    /// Stand-ins including a bridge device.
    #[must_use]
    pub fn new() -> Self {
        Self {
            vat_admin_service: Arc::new(LoopbackVatAdminService::standard()),
            comms: Arc::default(),
            bridge: Some(Arc::default()),
        }
    }

    /// Stand-ins for a host with no bridge device.
    #[must_use]
    pub fn without_bridge() -> Self {
        Self {
            bridge: None,
            ..Self::new()
        }
    }

    /// Supply vat roots under `vats` and devices under `devices`.
    pub fn install(&self, tree: &PowerTree) {
        let vat_admin: Arc<dyn VatAdminVat> =
            Arc::new(LoopbackVatAdmin::new(Arc::clone(&self.vat_admin_service)));
        let timer: Arc<dyn TimerVat> = Arc::new(LoopbackTimer);
        let comms: Arc<dyn CommsVat> = self.comms.clone();

        let vats = tree.namespace("vats");
        vats.insert_resource("vatAdmin", Capability::new(vat_admin));
        vats.insert_resource("timer", Capability::new(timer));
        vats.insert_resource("comms", Capability::new(comms));

        let devices = tree.namespace("devices");
        devices.insert_resource("vatAdmin", Capability::new(Device("vatAdmin")));
        devices.insert_resource("timer", Capability::new(Device("timer")));
        if let Some(bridge) = &self.bridge {
            let bridge: Arc<dyn BridgeDevice> = bridge.clone();
            devices.insert_resource("bridge", Capability::new(bridge));
        }
    }
}

impl Default for Loopback {
    fn default() -> Self {
        Self::new()
    }
}
