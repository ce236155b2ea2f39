//! Value and provider flows across simulated networks.

#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    peer_id, shutdown_all, sim_config, spawn_chain, spawn_node, spawn_node_with_validator,
    NetworkRegistry, RejectAll,
};
use rhizome::DhtError;

/// PutValue at one end of a 32-node chain, GetValue at the other.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn put_and_get_across_a_chain() {
    let registry = Arc::new(NetworkRegistry::default());
    let nodes = spawn_chain(&registry, 32, sim_config(32, 1)).await;

    nodes[0]
        .put_value(b"K".to_vec(), b"V".to_vec())
        .await
        .expect("put should reach at least one replica");

    let value = nodes[31].get_value(b"K").await.expect("value should be found");
    assert_eq!(value, b"V");

    shutdown_all(&nodes).await;
}

/// AddProvider at node 5, FindProviders at node 20: the handler surfaces
/// node 5's info.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn provider_records_travel_the_network() {
    let registry = Arc::new(NetworkRegistry::default());
    let nodes = spawn_chain(&registry, 32, sim_config(32, 1)).await;

    nodes[5]
        .provide(b"K".to_vec(), true)
        .await
        .expect("provide should announce");

    let providers = nodes[20]
        .find_providers(b"K", 1)
        .await
        .expect("provider should be found");
    assert_eq!(providers.len(), 1);
    assert_eq!(providers[0].id, peer_id(5));
    assert!(!providers[0].addrs.is_empty());

    // A node outside the announcement radius has to ask the network.
    let outsider = spawn_node(&registry, 99, sim_config(32, 1));
    outsider.add_peer(&common::peer_info(20), false, false).await;
    let via_network = outsider.find_providers(b"K", 1).await.unwrap();
    assert_eq!(via_network[0].id, peer_id(5));

    outsider.shutdown().await;
    shutdown_all(&nodes).await;
}

/// A local-only provide is served from the provider table without any
/// network traffic.
#[tokio::test]
async fn local_provide_serves_without_dialing() {
    let registry = Arc::new(NetworkRegistry::default());
    let node = spawn_node(&registry, 0, sim_config(20, 3));

    node.provide(b"K".to_vec(), false).await.unwrap();

    let before = registry.dial_count();
    let providers = node.find_providers(b"K", 1).await.unwrap();
    assert_eq!(providers[0].id, node.self_peer());
    assert_eq!(registry.dial_count(), before);

    node.shutdown().await;
}

/// Records age out: after `max_record_age` the local read misses and the
/// network walk finds nothing either.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn values_expire_everywhere() {
    let registry = Arc::new(NetworkRegistry::default());
    let mut config = sim_config(4, 1);
    config.max_record_age = Duration::from_millis(300);

    let a = spawn_node(&registry, 0, config.clone());
    let b = spawn_node(&registry, 1, config.clone());
    a.add_peer(&common::peer_info(1), false, false).await;
    b.add_peer(&common::peer_info(0), false, false).await;

    a.put_value(b"K".to_vec(), b"V".to_vec()).await.unwrap();
    assert_eq!(a.get_value(b"K").await.unwrap(), b"V");

    tokio::time::sleep(Duration::from_millis(400)).await;

    let before = registry.dial_count();
    let result = a.get_value(b"K").await;
    assert_eq!(result, Err(DhtError::NotFound));
    // The expired local record forced a network lookup.
    assert!(registry.dial_count() > before);

    a.shutdown().await;
    b.shutdown().await;
}

/// An inbound PutValue the validator refuses leaves the store untouched
/// and is never acknowledged, so the sender sees zero acks.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rejected_put_value_is_dropped_without_ack() {
    let registry = Arc::new(NetworkRegistry::default());
    let config = sim_config(4, 1);

    let sender = spawn_node(&registry, 0, config.clone());
    let rejecting = spawn_node_with_validator(&registry, 1, config.clone(), Arc::new(RejectAll));
    sender.add_peer(&common::peer_info(1), false, false).await;
    rejecting.add_peer(&common::peer_info(0), false, false).await;

    let result = sender.put_value(b"K".to_vec(), b"V".to_vec()).await;
    assert_eq!(result, Err(DhtError::Timeout), "no replica ever acked");

    assert_eq!(sender.stats().await.stored_values, 1, "local store is gated by our own validator");
    assert_eq!(rejecting.stats().await.stored_values, 0, "rejected record must not land");

    sender.shutdown().await;
    rejecting.shutdown().await;
}

/// GetValue fix-up: peers that answered with no record receive the
/// selected one afterwards.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn get_value_repairs_stale_replicas() {
    let registry = Arc::new(NetworkRegistry::default());
    let config = sim_config(4, 1);

    // `holder` has the value, `stale` does not; `reader` knows both.
    let reader = spawn_node(&registry, 0, config.clone());
    let stale = spawn_node(&registry, 1, config.clone());
    let holder = spawn_node(&registry, 2, config.clone());
    for (node, peers) in [(&reader, [1u32, 2]), (&stale, [0, 2]), (&holder, [0, 1])] {
        for p in peers {
            node.add_peer(&common::peer_info(p), false, false).await;
        }
    }

    // Seed the value while the other nodes are unreachable, so only the
    // holder ends up with a replica.
    registry.set_failure(peer_id(0), true);
    registry.set_failure(peer_id(1), true);
    let _ = holder.put_value(b"K".to_vec(), b"V".to_vec()).await;
    registry.set_failure(peer_id(0), false);
    registry.set_failure(peer_id(1), false);
    assert_eq!(stale.stats().await.stored_values, 0);

    let value = reader.get_value(b"K").await.unwrap();
    assert_eq!(value, b"V");

    // The fix-up ran before the result was delivered.
    assert_eq!(stale.stats().await.stored_values, 1, "stale replica was not repaired");

    shutdown_all(&[reader, stale, holder]).await;
}
