//! Attenuated views built from the shipped manifests

use keystone_engine::loopback::Loopback;
use keystone_engine::{
    BehaviorError, BootstrapError, Capability, Manifest, Permit, PowerTree, Powers, Role,
    Sequencer, attenuate, behavior_fn, builtin_registry, manifest_for,
};
use keystone_types::AccessKind;

fn chain_view(behavior: &str) -> (PowerTree, Powers) {
    let tree = PowerTree::new();
    Loopback::new().install(&tree);
    let manifest = manifest_for(Role::Chain).unwrap();
    let powers = attenuate(behavior, manifest.get(behavior).unwrap(), &tree);
    (tree, powers)
}

#[test]
fn build_zoe_sees_exactly_its_permit() {
    let (_tree, powers) = chain_view("buildZoe");
    assert_eq!(
        powers.consume_keys().collect::<Vec<_>>(),
        vec!["client", "loadVat", "nameAdmins", "vatAdminSvc"]
    );
    assert_eq!(
        powers.produce_keys().collect::<Vec<_>>(),
        vec!["feeMintAccess", "zoe"]
    );
    assert_eq!(
        powers.namespace_keys().collect::<Vec<_>>(),
        vec!["brand", "home", "issuer"]
    );

    let err = powers.produce("board").unwrap_err();
    assert_eq!(err.access, AccessKind::Produce);
    assert_eq!(err.behavior, "buildZoe");
    assert!(powers.namespace("devices").is_err());
}

#[test]
fn violations_inside_namespaces_carry_the_path() {
    let (_tree, powers) = chain_view("makeBoard");
    let err = powers
        .namespace("home")
        .unwrap()
        .produce("bank")
        .unwrap_err();
    assert_eq!(err.qualified_name(), "home.bank");
    assert_eq!(
        err.to_string(),
        "behavior 'makeBoard' is not permitted to produce 'home.bank'"
    );
}

#[test]
fn granted_resources_come_from_the_host() {
    let (_tree, powers) = chain_view("startTimerService");
    let devices = powers.namespace("devices").unwrap();
    assert!(devices.resource("timer").unwrap().is_some());
    assert_eq!(
        devices.resource("vatAdmin").unwrap_err().access,
        AccessKind::Resource
    );
}

#[test]
fn missing_bridge_device_is_granted_but_absent() {
    let tree = PowerTree::new();
    Loopback::without_bridge().install(&tree);
    let manifest = manifest_for(Role::Chain).unwrap();
    let powers = attenuate("makeBridgeManager", manifest.get("makeBridgeManager").unwrap(), &tree);
    assert!(powers
        .namespace("devices")
        .unwrap()
        .resource("bridge")
        .unwrap()
        .is_none());
}

#[test]
fn views_share_the_host_space() {
    let (tree, powers) = chain_view("makeBoard");
    powers
        .produce("board")
        .unwrap()
        .resolve(Capability::new("board"))
        .unwrap();
    assert_eq!(tree.space().settled_names(), vec!["board"]);
}

#[tokio::test]
async fn undeclared_home_key_fails_the_behavior() {
    // makeBoard's real body with a permit that omits home.produce.board.
    let registry = builtin_registry(Role::Chain).unwrap();
    let tree = PowerTree::new();
    Loopback::new().install(&tree);
    let sequencer = Sequencer::new(registry, tree);

    let mut manifest = Manifest::new();
    for (name, permit) in manifest_for(Role::Chain).unwrap().iter() {
        let permit = if name == "makeBoard" {
            Permit::new()
                .consume("loadVat")
                .consume("client")
                .produce("board")
        } else {
            permit.clone()
        };
        manifest = manifest.with(name, permit);
    }

    let err = sequencer.run(&manifest).await.unwrap_err();
    assert_eq!(err.behavior(), Some("makeBoard"));
    assert!(matches!(
        err,
        BootstrapError::BehaviorFailed {
            source: BehaviorError::Permit(ref violation),
            ..
        } if violation.access == AccessKind::Namespace && violation.name == "home"
    ));
}

#[tokio::test]
async fn behaviors_cannot_reach_ungranted_resources() {
    let mut registry = builtin_registry(Role::Chain).unwrap();
    registry
        .register(behavior_fn("peek", |powers: Powers| async move {
            powers.namespace("vats")?.resource("comms")?;
            Ok(())
        }))
        .unwrap();
    let tree = PowerTree::new();
    Loopback::new().install(&tree);
    let sequencer = Sequencer::new(registry, tree);

    let manifest = Manifest::new().with(
        "peek",
        Permit::new().namespace("vats", Permit::new().grant("timer")),
    );
    let err = sequencer.run(&manifest).await.unwrap_err();
    assert!(matches!(
        err,
        BootstrapError::BehaviorFailed {
            source: BehaviorError::Permit(ref violation),
            ..
        } if violation.qualified_name() == "vats.comms"
    ));
}
