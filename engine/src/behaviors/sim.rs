//! Behaviors for the simulated chain only. Never registered for production.

use std::sync::Arc;

use futures_util::future::try_join_all;
use keystone_types::{Bundle, Capability};

use super::{Faucet, PARAMETERS, assign_home, supplied_as};
use crate::attenuate::Powers;
use crate::client::{ClientCreator, property_maker};
use crate::error::BehaviorError;
use crate::sequencer::{BehaviorRunner, RUN_BEHAVIORS};
use crate::vats::{CommsVat, PROVISIONER_INDEX, ZoeService};

const HARDCODED_CLIENT_ADDRESSES: &str = "hardcoded_client_addresses";

/// Power flag given to every hardcoded simulation client.
pub const ALL_THE_POWERS: &str = "agoric.ALL_THE_POWERS";

/// Provision a client for each hardcoded address and hand it to comms.
pub async fn install_sim_egress(powers: Powers) -> Result<(), BehaviorError> {
    let addresses = hardcoded_addresses(powers.namespace(PARAMETERS)?)?;
    let comms = supplied_as::<Arc<dyn CommsVat>>(powers.namespace("vats")?, "comms")?;
    let creator = powers.consume_as::<ClientCreator>("clientCreator").await?;
    let flags = [ALL_THE_POWERS.to_string()];

    try_join_all(addresses.iter().enumerate().map(|(i, address)| {
        let facet = creator.create_client_facet(&format!("solo{i}"), address, &flags);
        let comms = Arc::clone(&comms);
        async move {
            comms.add_remote(address).await?;
            comms.add_egress(address, PROVISIONER_INDEX, facet).await
        }
    }))
    .await?;
    Ok(())
}

fn hardcoded_addresses(parameters: &Powers) -> Result<Vec<String>, BehaviorError> {
    let Some(raw) = parameters.resource_as::<serde_json::Value>(HARDCODED_CLIENT_ADDRESSES)?
    else {
        return Ok(Vec::new());
    };
    serde_json::from_value(raw).map_err(|err| BehaviorError::InvalidParameter {
        name: HARDCODED_CLIENT_ADDRESSES.to_string(),
        message: err.to_string(),
    })
}

/// Give every client a faucet holding a fresh fee purse.
///
/// Runs in place of `connectChainFaucet`.
pub async fn connect_faucet(powers: Powers) -> Result<(), BehaviorError> {
    let zoe = powers.consume_as::<Arc<dyn ZoeService>>("zoe").await?;
    let faucet = Capability::new(Faucet::with_fee_purse(zoe.make_fee_purse().await?));
    assign_home(
        &powers,
        &["faucet"],
        property_maker(move |_| Bundle::new().with("faucet", faucet.clone())),
    )
    .await
}

/// Give every client a `behaviors` runner for further manifests.
pub async fn grant_run_behaviors(powers: Powers) -> Result<(), BehaviorError> {
    let behaviors = Capability::new(supplied_as::<BehaviorRunner>(&powers, RUN_BEHAVIORS)?);
    assign_home(
        &powers,
        &["behaviors"],
        property_maker(move |_| Bundle::new().with("behaviors", behaviors.clone())),
    )
    .await
}
