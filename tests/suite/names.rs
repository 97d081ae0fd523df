//! Name hubs as published by a chain bootstrap

use std::sync::Arc;

use keystone_engine::loopback::Brand;
use keystone_engine::names::{MyAddressNameAdmin, NameAdmins};
use keystone_engine::vats::Issuer;
use keystone_engine::{Capability, ClientCreator, NameHub, NameHubError, Role};

use crate::common::{bootstrapped, settled_in};

#[tokio::test]
async fn run_issuer_and_brand_are_published_by_name() {
    let host = bootstrapped(Role::Chain).await;
    let agoric_names = host.settled::<NameHub>("agoricNames");

    let brand = agoric_names
        .lookup("brand", "RUN")
        .unwrap()
        .downcast::<Brand>()
        .unwrap();
    assert_eq!(brand.name, "RUN");
    assert_eq!(brand.decimal_places, 6);

    let issuer = agoric_names
        .lookup("issuer", "RUN")
        .unwrap()
        .downcast::<Arc<dyn Issuer>>()
        .unwrap();
    assert_eq!(issuer.allegation(), "RUN");
}

#[tokio::test]
async fn name_hub_and_namespaces_agree() {
    let host = bootstrapped(Role::Chain).await;
    let agoric_names = host.settled::<NameHub>("agoricNames");

    let issuer_space = host.tree().namespace("issuer");
    let from_space = issuer_space.space().consume("RUN").peek().unwrap().unwrap();
    assert!(from_space.same(&agoric_names.lookup("issuer", "RUN").unwrap()));

    let brand = settled_in::<Brand>(host.tree().namespace("brand").space(), "RUN");
    assert_eq!(brand.name, "RUN");
}

#[tokio::test]
async fn root_kinds_are_all_present() {
    let host = bootstrapped(Role::Chain).await;
    let agoric_names = host.settled::<NameHub>("agoricNames");
    assert_eq!(
        agoric_names.keys(),
        vec!["brand", "installation", "instance", "issuer", "uiConfig"]
    );

    let admins = host.settled::<NameAdmins>("nameAdmins");
    admins
        .get("installation")
        .unwrap()
        .update("amm", Capability::new("amm-installation"));
    assert!(agoric_names.has("installation", "amm"));
    assert!(matches!(
        admins.get("governance"),
        Err(NameHubError::UnknownKind { .. })
    ));
}

#[tokio::test]
async fn missing_names_report_their_path() {
    let host = bootstrapped(Role::Chain).await;
    let agoric_names = host.settled::<NameHub>("agoricNames");
    let err = agoric_names.lookup("issuer", "BLD").unwrap_err();
    assert_eq!(
        err,
        NameHubError::NotFound {
            path: vec!["issuer".to_string(), "BLD".to_string()],
        }
    );
    assert_eq!(err.to_string(), "name 'issuer.BLD' not found");
}

#[tokio::test]
async fn my_address_admin_writes_under_names_by_address() {
    let host = bootstrapped(Role::Chain).await;
    let creator = host.settled::<ClientCreator>("clientCreator");
    let names_by_address = host.settled::<NameHub>("namesByAddress");

    let bundle = creator.create_user_bundle("alice", "agoric1alice", &[]);
    let my_admin = bundle
        .get_as::<MyAddressNameAdmin>("myAddressNameAdmin")
        .unwrap();
    assert_eq!(my_admin.my_address(), "agoric1alice");

    my_admin.update("depositFacet", Capability::new(7_u32));
    let deposit = names_by_address
        .lookup("agoric1alice", "depositFacet")
        .unwrap()
        .downcast::<u32>()
        .unwrap();
    assert_eq!(deposit, 7);

    // A second bundle for the same address shares the hub.
    let again = creator
        .create_user_bundle("alice", "agoric1alice", &[])
        .get_as::<MyAddressNameAdmin>("myAddressNameAdmin")
        .unwrap();
    again.delete("depositFacet").unwrap();
    assert!(!names_by_address.has("agoric1alice", "depositFacet"));
}
