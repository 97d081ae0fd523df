//! Behaviors that create the core services: vats, Zoe, the board, name hubs
//! and banks.

use std::sync::Arc;

use keystone_types::{Bundle, Capability};

use super::{assign_home, supplied, supplied_as};
use crate::attenuate::Powers;
use crate::bridge::BridgeManager;
use crate::client::property_maker;
use crate::error::BehaviorError;
use crate::names::{AddressNames, NameAdmins, RootNames, make_root_names};
use crate::vats::{
    BankVat, BoardVat, FeeIssuerConfig, VatAdminService, VatAdminVat, VatLoader, ZoeVat,
};

pub async fn make_vats_from_bundles(powers: Powers) -> Result<(), BehaviorError> {
    let vat_admin = supplied_as::<Arc<dyn VatAdminVat>>(powers.namespace("vats")?, "vatAdmin")?;
    let device = supplied(powers.namespace("devices")?, "vatAdmin")?;

    let svc = vat_admin.create_vat_admin_service(device).await?;
    powers
        .produce("vatAdminSvc")?
        .resolve(Capability::new(Arc::clone(&svc)))?;
    powers
        .produce("loadVat")?
        .resolve(Capability::new(VatLoader::new(svc)))?;
    Ok(())
}

pub async fn build_zoe(powers: Powers) -> Result<(), BehaviorError> {
    let vat_admin_svc = powers
        .consume_as::<Arc<dyn VatAdminService>>("vatAdminSvc")
        .await?;
    let load_vat = powers.consume_as::<VatLoader>("loadVat").await?;
    let zoe_vat = load_vat.load_as::<Arc<dyn ZoeVat>>("zoe").await?;

    let fee = FeeIssuerConfig::default();
    let kit = zoe_vat.build_zoe(vat_admin_svc, fee.clone()).await?;
    let zoe = kit.zoe_service;
    powers
        .produce("zoe")?
        .resolve(Capability::new(Arc::clone(&zoe)))?;

    let run_issuer = zoe.fee_issuer().await?;
    let run_brand = run_issuer.brand().await?;
    let issuer = Capability::new(run_issuer);
    powers.produce("feeMintAccess")?.resolve(kit.fee_mint_access)?;

    powers
        .namespace("issuer")?
        .produce(&fee.name)?
        .resolve(issuer.clone())?;
    powers
        .namespace("brand")?
        .produce(&fee.name)?
        .resolve(run_brand.clone())?;

    let name_admins = powers.consume_as::<NameAdmins>("nameAdmins").await?;
    name_admins.get("issuer")?.update(&fee.name, issuer);
    name_admins.get("brand")?.update(&fee.name, run_brand);

    let zoe = Capability::new(zoe);
    assign_home(
        &powers,
        &["zoe"],
        property_maker(move |_| Bundle::new().with("zoe", zoe.clone())),
    )
    .await
}

pub async fn make_board(powers: Powers) -> Result<(), BehaviorError> {
    let load_vat = powers.consume_as::<VatLoader>("loadVat").await?;
    let board = load_vat
        .load_as::<Arc<dyn BoardVat>>("board")
        .await?
        .get_board()
        .await?;
    powers.produce("board")?.resolve(board.clone())?;
    assign_home(
        &powers,
        &["board"],
        property_maker(move |_| Bundle::new().with("board", board.clone())),
    )
    .await
}

pub async fn make_address_name_hubs(powers: Powers) -> Result<(), BehaviorError> {
    let RootNames {
        agoric_names,
        agoric_names_admin,
        name_admins,
    } = make_root_names();
    let by_address = AddressNames::new();

    powers
        .produce("nameAdmins")?
        .resolve(Capability::new(name_admins))?;
    powers
        .produce("agoricNames")?
        .resolve(Capability::new(agoric_names.clone()))?;
    powers
        .produce("agoricNamesAdmin")?
        .resolve(Capability::new(agoric_names_admin))?;
    powers
        .produce("namesByAddress")?
        .resolve(Capability::new(by_address.hub().clone()))?;
    powers
        .produce("namesByAddressAdmin")?
        .resolve(Capability::new(by_address.admin().clone()))?;

    let agoric_names = Capability::new(agoric_names);
    let names_by_address = Capability::new(by_address.hub().clone());
    assign_home(
        &powers,
        &["agoricNames", "namesByAddress", "myAddressNameAdmin"],
        property_maker(move |address| {
            Bundle::new()
                .with("agoricNames", agoric_names.clone())
                .with("namesByAddress", names_by_address.clone())
                .with(
                    "myAddressNameAdmin",
                    Capability::new(by_address.for_address(address)),
                )
        }),
    )
    .await
}

pub async fn make_client_banks(powers: Powers) -> Result<(), BehaviorError> {
    let load_vat = powers.consume_as::<VatLoader>("loadVat").await?;
    let bridge = powers
        .consume_as::<Option<BridgeManager>>("bridgeManager")
        .await?;
    let manager = load_vat
        .load_as::<Arc<dyn BankVat>>("bank")
        .await?
        .make_bank_manager(bridge)
        .await?;
    powers
        .produce("bankManager")?
        .resolve(Capability::new(Arc::clone(&manager)))?;
    assign_home(
        &powers,
        &["bank"],
        property_maker(move |address| {
            Bundle::new().with("bank", manager.bank_for_address(address))
        }),
    )
    .await
}
