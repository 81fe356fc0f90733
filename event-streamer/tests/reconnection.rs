/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

mod common;

use common::{deliver, event, params, record_deliveries, start_node, Backends, WORKSPACE};
use event_streamer::backend::SubscriberCache;
use event_streamer::SubscriberUpdate;
use serde_json::json;

fn reuse(socket_id: &str) -> SubscriberUpdate {
    SubscriberUpdate {
        socket_id: Some(socket_id.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn socket_reuse_requires_prior_registration_by_the_same_session() {
    let backends = Backends::new();
    let node = start_node(&backends, "node-a").await;
    let (ingress, mut deliveries) = record_deliveries(&node);

    node.subscribe(WORKSPACE, params("alice", "session-1", "old", json!(null)))
        .await
        .expect("subscribed");
    let mut reconnected = node
        .subscribe(WORKSPACE, params("alice", "session-1", "new", json!(null)))
        .await
        .expect("subscribed");
    let mut intruder = node
        .subscribe(WORKSPACE, params("mallory", "session-2", "foreign", json!(null)))
        .await
        .expect("subscribed");

    assert!(!node.update_local_subscriber(&mut intruder, reuse("old")).await);
    assert_eq!(intruder.socket_id(), "foreign");

    assert!(!node.update_local_subscriber(&mut reconnected, reuse("never-seen")).await);
    assert_eq!(reconnected.socket_id(), "new");

    assert!(node.update_local_subscriber(&mut reconnected, reuse("old")).await);
    assert_eq!(reconnected.socket_id(), "old");
    assert!(node.subscriber(WORKSPACE, "new").await.is_none());
    assert_eq!(node.metrics().await.subscribers, 2);

    let sockets = deliver(&ingress, &mut deliveries, event("evt-1", "task.updated")).await;
    assert_eq!(sockets, vec!["foreign", "old"]);

    let cached = backends
        .cache
        .get_all_workspace_subscribers(WORKSPACE)
        .await
        .expect("cache readable");
    assert!(cached.contains_key("old"));
    assert!(!cached.contains_key("new"));
}

#[tokio::test]
async fn superseded_connection_cannot_remove_the_reused_socket() {
    let backends = Backends::new();
    let node = start_node(&backends, "node-a").await;
    let (ingress, mut deliveries) = record_deliveries(&node);

    let mut stale = node
        .subscribe(WORKSPACE, params("alice", "session-1", "old", json!(null)))
        .await
        .expect("subscribed");
    let mut reconnected = node
        .subscribe(WORKSPACE, params("alice", "session-1", "new", json!(null)))
        .await
        .expect("subscribed");
    assert!(node.update_local_subscriber(&mut reconnected, reuse("old")).await);

    assert!(!stale.unsubscribe().await);
    let update = SubscriberUpdate {
        filters: Some(json!({"types": ["never"]})),
        ..Default::default()
    };
    assert!(!node.update_local_subscriber(&mut stale, update).await);
    assert_eq!(
        deliver(&ingress, &mut deliveries, event("evt-1", "task.updated")).await,
        vec!["old"]
    );
    let cached = backends
        .cache
        .get_all_workspace_subscribers(WORKSPACE)
        .await
        .expect("cache readable");
    assert!(cached.contains_key("old"));

    assert!(reconnected.unsubscribe().await);
    assert!(deliver(&ingress, &mut deliveries, event("evt-2", "task.updated"))
        .await
        .is_empty());
}

#[tokio::test]
async fn socket_registered_in_another_workspace_cannot_be_reused() {
    let backends = Backends::new();
    let node = start_node(&backends, "node-a").await;

    node.subscribe("ws-2", params("alice", "session-1", "elsewhere", json!(null)))
        .await
        .expect("subscribed");
    let mut handle = node
        .subscribe(WORKSPACE, params("alice", "session-1", "s1", json!(null)))
        .await
        .expect("subscribed");

    assert!(!node.update_local_subscriber(&mut handle, reuse("elsewhere")).await);
    assert_eq!(handle.socket_id(), "s1");
}

#[tokio::test]
async fn filter_updates_replace_the_previous_query() {
    let backends = Backends::new();
    let node = start_node(&backends, "node-a").await;
    let (ingress, mut deliveries) = record_deliveries(&node);
    let mut handle = node
        .subscribe(
            WORKSPACE,
            params("alice", "session-1", "s1", json!({"types": ["a"]})),
        )
        .await
        .expect("subscribed");

    let update = SubscriberUpdate {
        filters: Some(json!({"types": ["b"]})),
        ..Default::default()
    };
    assert!(node.update_local_subscriber(&mut handle, update).await);

    assert!(deliver(&ingress, &mut deliveries, event("evt-1", "a"))
        .await
        .is_empty());
    assert_eq!(
        deliver(&ingress, &mut deliveries, event("evt-2", "b")).await,
        vec!["s1"]
    );

    let invalid = SubscriberUpdate {
        filters: Some(json!({"appInstanceDepth": "deep"})),
        ..Default::default()
    };
    assert!(!node.update_local_subscriber(&mut handle, invalid).await);
    assert_eq!(
        deliver(&ingress, &mut deliveries, event("evt-3", "b")).await,
        vec!["s1"]
    );
}

#[tokio::test]
async fn updates_after_unsubscribe_are_rejected() {
    let backends = Backends::new();
    let node = start_node(&backends, "node-a").await;
    let mut handle = node
        .subscribe(WORKSPACE, params("alice", "session-1", "s1", json!(null)))
        .await
        .expect("subscribed");
    assert!(handle.unsubscribe().await);

    let update = SubscriberUpdate {
        filters: Some(json!({"types": ["b"]})),
        ..Default::default()
    };
    assert!(!node.update_local_subscriber(&mut handle, update).await);
    assert_eq!(node.metrics().await.subscribers, 0);
}
