//! Chain plumbing: the client manager, timer, bridge, provisioning and faucet.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use keystone_types::{BridgeMessage, Bundle, Capability};
use serde_json::Value;

use super::{assign_home, supplied, supplied_as};
use crate::attenuate::Powers;
use crate::bridge::{BridgeFut, BridgeHandler, BridgeManager};
use crate::client::{self, ClientCreator, ClientFacet, property_maker};
use crate::error::BehaviorError;
use crate::vats::{BridgeDevice, CommsVat, PROVISIONER_INDEX, TimerVat, VatError};

pub async fn make_client_manager(powers: Powers) -> Result<(), BehaviorError> {
    let (manager, creator) = client::make_client_manager();
    powers
        .produce("clientCreator")?
        .resolve(Capability::new(creator))?;
    powers.produce("client")?.resolve(Capability::new(manager))?;
    Ok(())
}

pub async fn start_timer_service(powers: Powers) -> Result<(), BehaviorError> {
    let timer_vat = supplied_as::<Arc<dyn TimerVat>>(powers.namespace("vats")?, "timer")?;
    let device = supplied(powers.namespace("devices")?, "timer")?;
    let service = timer_vat.create_timer_service(device).await?;
    powers.produce("chainTimerService")?.resolve(service)?;
    Ok(())
}

/// Resolves `bridgeManager` to `None` when the host has no bridge device.
pub async fn make_bridge_manager(powers: Powers) -> Result<(), BehaviorError> {
    let device = powers
        .namespace("devices")?
        .resource_as::<Arc<dyn BridgeDevice>>("bridge")?;
    let manager = device.map(BridgeManager::new);
    if manager.is_none() {
        tracing::warn!("Running without a bridge device; this is not an actual chain.");
    }
    powers
        .produce("bridgeManager")?
        .resolve(Capability::new(manager))?;
    Ok(())
}

pub async fn make_provisioner(powers: Powers) -> Result<(), BehaviorError> {
    let creator = powers.consume_as::<ClientCreator>("clientCreator").await?;
    let comms = supplied_as::<Arc<dyn CommsVat>>(powers.namespace("vats")?, "comms")?;
    powers
        .produce("provisioning")?
        .resolve(Capability::new(Provisioner::new(creator, comms)))?;
    Ok(())
}

pub async fn bridge_provisioner(powers: Powers) -> Result<(), BehaviorError> {
    let Some(bridge) = powers
        .consume_as::<Option<BridgeManager>>("bridgeManager")
        .await?
    else {
        return Ok(());
    };
    let provisioner = powers.consume_as::<Provisioner>("provisioning").await?;
    bridge.register("provision", Arc::new(ProvisioningHandler::new(provisioner)))?;
    Ok(())
}

pub async fn connect_chain_faucet(powers: Powers) -> Result<(), BehaviorError> {
    let faucet = Capability::new(Faucet::default());
    assign_home(
        &powers,
        &["faucet"],
        property_maker(move |_| Bundle::new().with("faucet", faucet.clone())),
    )
    .await
}

/// No free lunch on chain: tapping yields nothing.
///
/// The simulated chain's faucet also hands out a fee purse.
#[derive(Debug, Clone, Default)]
pub struct Faucet {
    fee_purse: Option<Capability>,
}

impl Faucet {
    #[must_use]
    pub fn with_fee_purse(fee_purse: Capability) -> Self {
        Self {
            fee_purse: Some(fee_purse),
        }
    }

    #[must_use]
    pub fn tap_faucet(&self) -> Vec<Capability> {
        Vec::new()
    }

    #[must_use]
    pub fn fee_purse(&self) -> Option<&Capability> {
        self.fee_purse.as_ref()
    }
}

// ============================================================================
// Provisioning
// ============================================================================

/// Creates a client facet per external address and exposes it over comms.
#[derive(Clone)]
pub struct Provisioner {
    creator: ClientCreator,
    comms: Arc<dyn CommsVat>,
    provisioned: Arc<Mutex<BTreeMap<String, ClientFacet>>>,
}

impl Provisioner {
    pub fn new(creator: ClientCreator, comms: Arc<dyn CommsVat>) -> Self {
        Self {
            creator,
            comms,
            provisioned: Arc::default(),
        }
    }

    pub async fn please_provision(
        &self,
        nickname: &str,
        address: &str,
        power_flags: &[String],
    ) -> Result<ClientFacet, BehaviorError> {
        let facet = {
            let mut provisioned = self
                .provisioned
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if provisioned.contains_key(address) {
                return Err(BehaviorError::AlreadyProvisioned {
                    address: address.to_string(),
                });
            }
            let facet = self
                .creator
                .create_client_facet(nickname, address, power_flags);
            provisioned.insert(address.to_string(), facet.clone());
            facet
        };

        if let Err(err) = self.connect(address, facet.clone()).await {
            self.provisioned
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(address);
            return Err(err.into());
        }
        tracing::info!(nickname, address, "provisioned");
        Ok(facet)
    }

    async fn connect(&self, address: &str, facet: ClientFacet) -> Result<(), VatError> {
        self.comms.add_remote(address).await?;
        self.comms
            .add_egress(address, PROVISIONER_INDEX, facet)
            .await
    }

    #[must_use]
    pub fn facet(&self, address: &str) -> Option<ClientFacet> {
        self.provisioned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
    }

    #[must_use]
    pub fn provisioned(&self) -> Vec<String> {
        self.provisioned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("provisioned", &self.provisioned())
            .finish_non_exhaustive()
    }
}

/// Bridge handler for the `provision` channel.
///
/// A request that fails to provision is logged and answered with `null`; an
/// undecodable request is an error to the bridge.
pub struct ProvisioningHandler {
    provisioner: Provisioner,
}

impl ProvisioningHandler {
    pub fn new(provisioner: Provisioner) -> Self {
        Self { provisioner }
    }
}

impl BridgeHandler for ProvisioningHandler {
    fn from_bridge<'a>(&'a self, _source_id: &'a str, message: Value) -> BridgeFut<'a> {
        Box::pin(async move {
            match BridgeMessage::from_json(message)? {
                BridgeMessage::PleaseProvision(request) => {
                    match self
                        .provisioner
                        .please_provision(
                            &request.nickname,
                            &request.address,
                            &request.power_flags,
                        )
                        .await
                    {
                        Ok(_) => Ok(Value::Bool(true)),
                        Err(err) => {
                            tracing::error!(
                                nickname = %request.nickname,
                                address = %request.address,
                                error = %err,
                                "Error provisioning"
                            );
                            Ok(Value::Null)
                        }
                    }
                }
            }
        })
    }
}
