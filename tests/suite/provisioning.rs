//! Provisioning clients through the bridge after bootstrap

use keystone_engine::behaviors::Provisioner;
use keystone_engine::loopback::Loopback;
use keystone_engine::vats::PROVISIONER_INDEX;
use keystone_engine::{BehaviorError, BridgeError, BridgeManager, Role};
use serde_json::{Value, json};

use crate::common::{Host, bootstrapped, sorted_keys};

fn provision(nickname: &str, address: &str) -> Value {
    json!({
        "type": "PLEASE_PROVISION",
        "nickname": nickname,
        "address": address,
        "powerFlags": ["agoric.vattp"],
    })
}

fn bridge_of(host: &Host) -> BridgeManager {
    host.settled::<Option<BridgeManager>>("bridgeManager")
        .expect("bridge device was supplied")
}

#[tokio::test]
async fn bridge_registers_the_provision_channel() {
    let host = bootstrapped(Role::Chain).await;
    assert_eq!(bridge_of(&host).channels(), vec!["provision".to_string()]);
}

#[tokio::test]
async fn please_provision_over_the_bridge_creates_a_client() {
    let host = bootstrapped(Role::Chain).await;
    let bridge = bridge_of(&host);

    let reply = bridge
        .from_bridge("provision", provision("carol", "agoric1carol"))
        .await
        .unwrap();
    assert_eq!(reply, Value::Bool(true));

    assert_eq!(host.loopback.comms.remotes(), vec!["agoric1carol".to_string()]);
    let facet = host
        .loopback
        .comms
        .egress("agoric1carol", PROVISIONER_INDEX)
        .unwrap();
    assert_eq!(facet.nickname(), "carol");
    assert_eq!(facet.power_flags(), ["agoric.vattp".to_string()]);
    assert_eq!(
        sorted_keys(&facet.bundle()),
        vec![
            "agoricNames",
            "bank",
            "board",
            "faucet",
            "myAddressNameAdmin",
            "namesByAddress",
            "zoe",
        ]
    );
}

#[tokio::test]
async fn provisioning_an_address_twice_answers_null() {
    let host = bootstrapped(Role::Chain).await;
    let bridge = bridge_of(&host);

    let first = bridge
        .from_bridge("provision", provision("carol", "agoric1carol"))
        .await
        .unwrap();
    let second = bridge
        .from_bridge("provision", provision("carol again", "agoric1carol"))
        .await
        .unwrap();
    assert_eq!(first, Value::Bool(true));
    assert_eq!(second, Value::Null);

    let provisioner = host.settled::<Provisioner>("provisioning");
    assert_eq!(provisioner.provisioned(), vec!["agoric1carol".to_string()]);
    assert_eq!(provisioner.facet("agoric1carol").unwrap().nickname(), "carol");
}

#[tokio::test]
async fn undecodable_request_is_an_error() {
    let host = bootstrapped(Role::Chain).await;
    let err = bridge_of(&host)
        .from_bridge("provision", json!({ "type": "PLEASE_DANCE" }))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Unrecognized(_)));
    assert!(host.loopback.comms.remotes().is_empty());
}

#[tokio::test]
async fn unregistered_channel_is_an_error() {
    let host = bootstrapped(Role::Chain).await;
    let err = bridge_of(&host)
        .from_bridge("bank", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::NoHandler { ref channel } if channel == "bank"));
}

#[tokio::test]
async fn direct_provisioning_rejects_known_addresses() {
    let host = bootstrapped(Role::Chain).await;
    let provisioner = host.settled::<Provisioner>("provisioning");

    provisioner
        .please_provision("dave", "agoric1dave", &[])
        .await
        .unwrap();
    let err = provisioner
        .please_provision("dave", "agoric1dave", &[])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BehaviorError::AlreadyProvisioned { ref address } if address == "agoric1dave"
    ));
}

#[tokio::test]
async fn failed_connection_is_rolled_back() {
    let host = Host::with_parameters(
        Role::SimChain,
        Loopback::new(),
        vec![("hardcoded_client_addresses", json!(["agoric1erin"]))],
    );
    host.run().await.unwrap();
    let provisioner = host.settled::<Provisioner>("provisioning");

    // The sim egress already opened a remote for this address.
    let err = provisioner
        .please_provision("erin", "agoric1erin", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, BehaviorError::Vat(_)));
    assert!(provisioner.provisioned().is_empty());
}

#[tokio::test]
async fn outbound_calls_reach_the_device() {
    let host = bootstrapped(Role::Chain).await;
    let reply = bridge_of(&host)
        .to_bridge("bank", json!({ "type": "VBANK_GET_BALANCE" }))
        .await
        .unwrap();
    assert_eq!(reply, Value::Null);

    let sent = host.loopback.bridge.as_ref().unwrap().sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "bank");
}
