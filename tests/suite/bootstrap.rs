//! Full runs of the built-in manifests against loopback collaborators

use std::sync::Arc;
use std::time::Duration;

use keystone_engine::loopback::{Bank, Loopback};
use keystone_engine::vats::{BankManager, PROVISIONER_INDEX};
use keystone_engine::{
    BehaviorError, BehaviorRunner, BootstrapError, BridgeManager, Manifest, Permit, PowerTree,
    Powers, RUN_BEHAVIORS, Role, Sequencer, behavior_fn, builtin_registry, manifest_for,
};
use serde_json::json;

use crate::common::{Host, bootstrapped, manifest_without};

#[tokio::test]
async fn chain_runs_every_behavior_once() {
    let host = Host::new(Role::Chain, Loopback::new());
    let report = host.run().await.unwrap();

    let mut completed: Vec<&str> = report.completed().collect();
    completed.sort_unstable();
    let manifest = manifest_for(Role::Chain).unwrap();
    let expected: Vec<&str> = manifest.behavior_names().collect();
    assert_eq!(completed, expected);
    assert_eq!(report.behaviors.len(), 11);

    assert!(host.tree().space().pending_names().is_empty());
}

#[tokio::test]
async fn chain_loads_each_vat_bundle_once() {
    let host = bootstrapped(Role::Chain).await;
    let mut created = host.loopback.vat_admin_service.created();
    created.sort_unstable();
    assert_eq!(created, vec!["bank", "board", "zoe"]);
}

#[tokio::test]
async fn chain_connects_no_remotes_on_its_own() {
    let host = bootstrapped(Role::Chain).await;
    assert!(host.loopback.comms.remotes().is_empty());
    let bridge = host.loopback.bridge.as_ref().unwrap();
    assert!(bridge.sent().is_empty());
}

#[tokio::test]
async fn chain_without_bridge_still_completes() {
    let host = Host::new(Role::Chain, Loopback::without_bridge());
    host.run().await.unwrap();

    assert!(host.settled::<Option<BridgeManager>>("bridgeManager").is_none());
    let manager = host.settled::<Arc<dyn BankManager>>("bankManager");
    let bank = manager
        .bank_for_address("agoric1alice")
        .downcast::<Bank>()
        .unwrap();
    assert!(!bank.bridged);
}

#[tokio::test]
async fn banks_see_the_bridge_when_there_is_one() {
    let host = bootstrapped(Role::Chain).await;
    let manager = host.settled::<Arc<dyn BankManager>>("bankManager");
    let bank = manager
        .bank_for_address("agoric1alice")
        .downcast::<Bank>()
        .unwrap();
    assert!(bank.bridged);
    assert_eq!(bank.address, "agoric1alice");
}

#[tokio::test]
async fn sim_chain_egresses_each_hardcoded_address() {
    let host = Host::with_parameters(
        Role::SimChain,
        Loopback::new(),
        vec![(
            "hardcoded_client_addresses",
            json!(["agoric1alice", "agoric1bob"]),
        )],
    );
    let report = host.run().await.unwrap();
    assert_eq!(report.behaviors.len(), 13);

    assert_eq!(
        host.loopback.comms.remotes(),
        vec!["agoric1alice".to_string(), "agoric1bob".to_string()]
    );
    let alice = host
        .loopback
        .comms
        .egress("agoric1alice", PROVISIONER_INDEX)
        .unwrap();
    assert_eq!(alice.nickname(), "solo0");
    assert_eq!(alice.power_flags(), ["agoric.ALL_THE_POWERS".to_string()]);
    let bob = host
        .loopback
        .comms
        .egress("agoric1bob", PROVISIONER_INDEX)
        .unwrap();
    assert_eq!(bob.nickname(), "solo1");
}

#[tokio::test]
async fn sim_chain_without_addresses_egresses_nothing() {
    let host = bootstrapped(Role::SimChain).await;
    assert!(host.loopback.comms.remotes().is_empty());
}

#[tokio::test]
async fn malformed_addresses_fail_sim_egress() {
    let host = Host::with_parameters(
        Role::SimChain,
        Loopback::new(),
        vec![("hardcoded_client_addresses", json!("agoric1alice"))],
    );
    let err = host.run().await.unwrap_err();
    assert_eq!(err.behavior(), Some("installSimEgress"));
    assert!(matches!(
        err,
        BootstrapError::BehaviorFailed {
            source: BehaviorError::InvalidParameter { ref name, .. },
            ..
        } if name == "hardcoded_client_addresses"
    ));
}

#[tokio::test]
async fn unknown_behavior_fails_before_any_vat_is_created() {
    let host = Host::new(Role::Chain, Loopback::new());
    let manifest = manifest_for(Role::Chain)
        .unwrap()
        .with("mintGold", Permit::new());

    let err = host.sequencer.run(&manifest).await.unwrap_err();
    assert!(matches!(err, BootstrapError::UnknownBehavior { ref name } if name == "mintGold"));
    assert_eq!(err.to_string(), "Unknown behavior: mintGold");
    assert!(host.loopback.vat_admin_service.created().is_empty());
}

#[tokio::test]
async fn sim_behaviors_are_unknown_to_the_chain_role() {
    let host = Host::new(Role::Chain, Loopback::new());
    let err = host
        .sequencer
        .run(&manifest_for(Role::SimChain).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapError::UnknownBehavior { .. }));
}

#[tokio::test]
async fn nested_run_failure_fails_the_outer_behavior() {
    let mut registry = builtin_registry(Role::Chain).unwrap();
    registry
        .register(behavior_fn("runAgain", |powers: Powers| async move {
            let runner = powers
                .resource_as::<BehaviorRunner>(RUN_BEHAVIORS)?
                .ok_or_else(|| BehaviorError::MissingResource {
                    name: RUN_BEHAVIORS.to_string(),
                })?;
            runner
                .run(Manifest::new().with("noSuchBehavior", Permit::new()))
                .await?;
            Ok(())
        }))
        .unwrap();
    let sequencer = Sequencer::new(registry, PowerTree::new());

    let err = sequencer
        .run(&Manifest::new().with("runAgain", Permit::new().grant(RUN_BEHAVIORS)))
        .await
        .unwrap_err();
    assert_eq!(err.behavior(), Some("runAgain"));
    let BootstrapError::BehaviorFailed {
        source: BehaviorError::NestedRun(inner),
        ..
    } = &err
    else {
        panic!("expected a nested run failure, got {err:?}");
    };
    assert!(matches!(
        **inner,
        BootstrapError::UnknownBehavior { ref name } if name == "noSuchBehavior"
    ));
}

#[tokio::test]
async fn watchdog_names_what_a_stalled_run_waits_on() {
    let host = Host::new(Role::Chain, Loopback::new());
    let manifest = manifest_without(Role::Chain, "makeVatsFromBundles");

    let err = host
        .sequencer
        .run_within(&manifest, Duration::from_millis(50))
        .await
        .unwrap_err();
    let BootstrapError::TimedOut { ref pending, .. } = err else {
        panic!("expected a timeout, got {err:?}");
    };
    assert!(pending.contains(&"loadVat".to_string()));
    assert!(pending.contains(&"vatAdminSvc".to_string()));
    assert!(!pending.contains(&"client".to_string()));
    assert!(err.to_string().contains("still waiting on:"));
    assert_eq!(err.behavior(), None);
}

#[tokio::test]
async fn watchdog_passes_a_run_that_finishes() {
    let host = Host::new(Role::Chain, Loopback::new());
    let report = host
        .sequencer
        .run_within(&manifest_for(Role::Chain).unwrap(), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(report.behaviors.len(), 11);
}
