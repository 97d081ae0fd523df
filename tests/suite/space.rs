//! The promise space as seen from outside a run

use futures_util::FutureExt;
use keystone_engine::loopback::Loopback;
use keystone_engine::{PowerTree, Role, SpaceError, builtin_registry, run_behaviors};
use keystone_space::PromiseSpace;
use keystone_types::Capability;

use crate::common::{bootstrapped, manifest_without};

#[tokio::test]
async fn completed_chain_run_settles_every_root_name() {
    let host = bootstrapped(Role::Chain).await;
    let space = host.tree().space();
    assert!(space.pending_names().is_empty());
    assert_eq!(
        space.settled_names(),
        vec![
            "agoricNames",
            "agoricNamesAdmin",
            "bankManager",
            "board",
            "bridgeManager",
            "chainTimerService",
            "client",
            "clientCreator",
            "feeMintAccess",
            "loadVat",
            "nameAdmins",
            "namesByAddress",
            "namesByAddressAdmin",
            "provisioning",
            "vatAdminSvc",
            "zoe",
        ]
    );
}

#[test]
fn missing_producer_leaves_its_consumers_waiting() {
    let tree = PowerTree::new();
    Loopback::new().install(&tree);
    let registry = builtin_registry(Role::Chain).unwrap();
    let manifest = manifest_without(Role::Chain, "makeVatsFromBundles");

    let mut run = Box::pin(run_behaviors(&registry, &tree, &manifest));
    assert!((&mut run).now_or_never().is_none());

    let pending = tree.space().pending_names();
    assert!(pending.contains(&"loadVat".to_string()));
    assert!(pending.contains(&"vatAdminSvc".to_string()));
    assert!(pending.contains(&"zoe".to_string()));
    // Behaviors that need nothing from the vat loader still finish.
    let settled = tree.space().settled_names();
    assert!(settled.contains(&"client".to_string()));
    assert!(settled.contains(&"agoricNames".to_string()));
}

#[tokio::test]
async fn late_consumer_gets_the_settled_value() {
    let host = bootstrapped(Role::Chain).await;
    let first = host.tree().space().consume("board").await.unwrap();
    let second = host.tree().space().consume("board").await.unwrap();
    assert!(first.same(&second));
}

#[tokio::test]
async fn produced_names_cannot_be_produced_again() {
    let host = bootstrapped(Role::Chain).await;
    let err = host
        .tree()
        .space()
        .produce("zoe")
        .resolve(Capability::new(0_u8))
        .unwrap_err();
    assert_eq!(
        err,
        SpaceError::DoubleResolution {
            name: "zoe".to_string()
        }
    );
}

#[tokio::test]
async fn rejection_fails_every_consumer() {
    let space = PromiseSpace::new();
    let early = space.consume("priceAuthority");
    space.produce("priceAuthority").reject("oracle offline").unwrap();

    let err = early.await.unwrap_err();
    assert!(matches!(err, SpaceError::Rejected { ref reason, .. } if reason == "oracle offline"));
    assert!(space.consume("priceAuthority").await.is_err());
}
