//! Built-in bootstrap behaviors and the manifests that run them.
//!
//! Values these behaviors put in the promise space, by name:
//!
//! | name | type |
//! |------|------|
//! | `vatAdminSvc` | `Arc<dyn VatAdminService>` |
//! | `loadVat` | [`VatLoader`](crate::vats::VatLoader) |
//! | `client` | [`ClientManager`] |
//! | `clientCreator` | [`ClientCreator`](crate::client::ClientCreator) |
//! | `agoricNames`, `namesByAddress` | [`NameHub`](crate::names::NameHub) |
//! | `agoricNamesAdmin`, `namesByAddressAdmin` | [`NameAdmin`](crate::names::NameAdmin) |
//! | `nameAdmins` | [`NameAdmins`](crate::names::NameAdmins) |
//! | `zoe` | `Arc<dyn ZoeService>` |
//! | `bankManager` | `Arc<dyn BankManager>` |
//! | `bridgeManager` | `Option<BridgeManager>` |
//! | `provisioning` | [`Provisioner`] |
//! | `feeMintAccess`, `board`, `chainTimerService` | opaque |

mod basic;
mod chain;
mod sim;

pub use basic::{
    build_zoe, make_address_name_hubs, make_board, make_client_banks, make_vats_from_bundles,
};
pub use chain::{
    Faucet, Provisioner, ProvisioningHandler, bridge_provisioner, connect_chain_faucet,
    make_bridge_manager, make_client_manager, make_provisioner, start_timer_service,
};
pub use sim::{connect_faucet, grant_run_behaviors, install_sim_egress};

use std::any::Any;

use keystone_types::{Capability, Manifest, ManifestError, Role};
use serde_json::Value;

use crate::attenuate::{PowerTree, Powers};
use crate::client::{ClientManager, PropertyMaker};
use crate::error::{BehaviorError, BootstrapError};
use crate::sequencer::{BehaviorRegistry, behavior_fn};

const CHAIN_MANIFEST: &str = include_str!("../../manifests/chain.toml");
const SIM_CHAIN_MANIFEST: &str = include_str!("../../manifests/sim-chain.toml");

/// Namespace the host's run parameters are exposed under.
pub const PARAMETERS: &str = "parameters";

/// The manifest a role runs.
pub fn manifest_for(role: Role) -> Result<Manifest, ManifestError> {
    let chain = Manifest::from_toml(CHAIN_MANIFEST)?;
    match role {
        Role::Chain => Ok(chain),
        Role::SimChain => Ok(chain
            .without("connectChainFaucet")
            .extended(Manifest::from_toml(SIM_CHAIN_MANIFEST)?)),
    }
}

/// Every behavior a role's manifest may name.
///
/// Simulation behaviors are registered for [`Role::SimChain`] only.
pub fn builtin_registry(role: Role) -> Result<BehaviorRegistry, BootstrapError> {
    let mut registry = BehaviorRegistry::new();
    registry.register(behavior_fn("makeVatsFromBundles", make_vats_from_bundles))?;
    registry.register(behavior_fn("buildZoe", build_zoe))?;
    registry.register(behavior_fn("makeBoard", make_board))?;
    registry.register(behavior_fn("makeAddressNameHubs", make_address_name_hubs))?;
    registry.register(behavior_fn("makeClientBanks", make_client_banks))?;
    registry.register(behavior_fn("makeClientManager", make_client_manager))?;
    registry.register(behavior_fn("startTimerService", start_timer_service))?;
    registry.register(behavior_fn("makeBridgeManager", make_bridge_manager))?;
    registry.register(behavior_fn("makeProvisioner", make_provisioner))?;
    registry.register(behavior_fn("bridgeProvisioner", bridge_provisioner))?;
    registry.register(behavior_fn("connectChainFaucet", connect_chain_faucet))?;
    if role == Role::SimChain {
        registry.register(behavior_fn("installSimEgress", install_sim_egress))?;
        registry.register(behavior_fn("connectFaucet", connect_faucet))?;
        registry.register(behavior_fn("grantRunBehaviors", grant_run_behaviors))?;
    }
    Ok(registry)
}

/// Expose run parameters to behaviors as the `parameters` namespace.
pub fn install_parameters(
    tree: &PowerTree,
    parameters: impl IntoIterator<Item = (String, Value)>,
) {
    let namespace = tree.namespace(PARAMETERS);
    for (name, value) in parameters {
        namespace.insert_resource(&name, Capability::new(value));
    }
}

/// A granted resource the behavior cannot do without.
fn supplied(powers: &Powers, name: &str) -> Result<Capability, BehaviorError> {
    powers
        .resource(name)?
        .ok_or_else(|| BehaviorError::MissingResource {
            name: name.to_string(),
        })
}

fn supplied_as<T: Any + Clone>(powers: &Powers, name: &str) -> Result<T, BehaviorError> {
    Ok(supplied(powers, name)?.downcast::<T>()?)
}

/// Add `maker` to every client bundle.
///
/// Each key the maker contributes must be declared under `home.produce`.
async fn assign_home(
    powers: &Powers,
    keys: &[&str],
    maker: PropertyMaker,
) -> Result<(), BehaviorError> {
    let home = powers.namespace("home")?;
    for key in keys {
        home.produce(key)?;
    }
    let client = powers.consume_as::<ClientManager>("client").await?;
    client.assign_bundle([maker]);
    Ok(())
}
