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

//! Cross-node subscriber synchronization through the broker and the cache.
//!
//! Every node consumes `subscriber.joined` / `subscriber.left` without partition grouping.
//! The cache holds a TTL'd copy of every record so (re)starting nodes and the
//! unknown-socket recovery path can rebuild state that the broker stream missed.

use crate::api::{Subscriber, SubscriberRecord};
use crate::backend::{BrokerEventType, BrokerHandler, BrokerMessage, DeliveryOptions};
use crate::error::Result;
use crate::observability::{events, fields};
use crate::runtime::background::log_failure;
use crate::subscriptions::SubscriptionsInner;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

const COMPONENT: &str = "subscriber_sync";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubscriberJoined {
    pub(crate) subscriber: SubscriberRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) previous_socket_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubscriberLeft {
    pub(crate) workspace_id: String,
    pub(crate) socket_id: String,
}

/// Applies peer subscriber changes to the local registry.
pub(crate) struct SubscriberSyncListener {
    subscriptions: Weak<SubscriptionsInner>,
}

impl SubscriberSyncListener {
    pub(crate) fn new(subscriptions: Weak<SubscriptionsInner>) -> Self {
        Self { subscriptions }
    }
}

#[async_trait]
impl BrokerHandler for SubscriberSyncListener {
    async fn on_message(&self, message: BrokerMessage) {
        let Some(inner) = self.subscriptions.upgrade() else {
            return;
        };
        if message.source.node_id.as_deref() == Some(inner.node.id()) {
            trace!(
                event = events::SYNC_MESSAGE_RECEIVED,
                component = COMPONENT,
                broker_event = %message.event_type,
                "skipping own sync message"
            );
            return;
        }

        let applied = match message.event_type {
            BrokerEventType::SubscriberJoined => {
                match serde_json::from_value::<SubscriberJoined>(message.payload) {
                    Ok(joined) => apply_joined(&inner, joined).await,
                    Err(err) => Err(err.into()),
                }
            }
            BrokerEventType::SubscriberLeft => {
                match serde_json::from_value::<SubscriberLeft>(message.payload) {
                    Ok(left) => {
                        apply_left(&inner, left).await;
                        Ok(())
                    }
                    Err(err) => Err(err.into()),
                }
            }
            _ => Ok(()),
        };

        if let Err(err) = applied {
            warn!(
                event = events::SYNC_MESSAGE_INVALID,
                component = COMPONENT,
                broker_event = %message.event_type,
                source_node = ?message.source.node_id,
                err = %err,
                "dropping unusable sync message"
            );
        }
    }
}

async fn apply_joined(inner: &SubscriptionsInner, joined: SubscriberJoined) -> Result<()> {
    let permissions = inner.access.permissions(&joined.subscriber.permission_rules);
    let subscriber = Subscriber::from_record(joined.subscriber, permissions, false);
    debug!(
        event = events::SYNC_MESSAGE_RECEIVED,
        component = COMPONENT,
        subscriber = %fields::format_subscriber_key(&subscriber),
        target_topic = %subscriber.target_topic,
        previous_socket_id = ?joined.previous_socket_id,
        "applying peer subscriber"
    );
    inner
        .registry
        .lock()
        .await
        .replace_subscriber(joined.previous_socket_id.as_deref(), subscriber)?;
    Ok(())
}

async fn apply_left(inner: &SubscriptionsInner, left: SubscriberLeft) {
    let mut registry = inner.registry.lock().await;
    let owned_here = registry
        .get(&left.workspace_id, &left.socket_id)
        .is_some_and(|subscriber| subscriber.local);
    if owned_here {
        // the local connection is authoritative for its own socket
        return;
    }
    if registry
        .unset_subscriber(&left.workspace_id, &left.socket_id)
        .is_some()
    {
        debug!(
            event = events::SUBSCRIBER_REMOVED,
            component = COMPONENT,
            workspace_id = %left.workspace_id,
            socket_id = %left.socket_id,
            "peer subscriber left"
        );
    }
}

/// Persists a local subscriber and tells every peer about it.
pub(crate) async fn announce_joined(
    inner: &SubscriptionsInner,
    subscriber: &Subscriber,
    previous_socket_id: Option<&str>,
) {
    let workspace_id = subscriber.workspace_id.as_str();
    if let Some(previous) = previous_socket_id {
        log_failure(
            "unregister_subscriber",
            inner.cache.unregister_subscriber(workspace_id, previous).await,
        );
    }
    store_subscriber(inner, subscriber).await;

    let joined = SubscriberJoined {
        subscriber: subscriber.record(),
        previous_socket_id: previous_socket_id.map(str::to_string),
    };
    let sent = match serde_json::to_value(&joined) {
        Ok(payload) => {
            inner
                .broker
                .send(
                    BrokerEventType::SubscriberJoined,
                    payload,
                    inner.node.message_source(Some(workspace_id)),
                    DeliveryOptions::default(),
                )
                .await
        }
        Err(err) => Err(err.into()),
    };
    if let Err(err) = sent {
        warn!(
            event = events::SYNC_ANNOUNCE_FAILED,
            component = COMPONENT,
            subscriber = %fields::format_subscriber_key(subscriber),
            err = %err,
            "subscriber announcement failed; peers catch up on the next refresh"
        );
    }
}

/// Removes a subscriber from the cache and tells every peer it left. A failed cache
/// delete does not hold back the broadcast.
pub(crate) async fn announce_left(
    inner: Arc<SubscriptionsInner>,
    workspace_id: String,
    socket_id: String,
) -> Result<()> {
    log_failure(
        "unregister_subscriber",
        inner
            .cache
            .unregister_subscriber(&workspace_id, &socket_id)
            .await,
    );
    let payload = serde_json::to_value(SubscriberLeft {
        workspace_id: workspace_id.clone(),
        socket_id,
    })?;
    inner
        .broker
        .send(
            BrokerEventType::SubscriberLeft,
            payload,
            inner.node.message_source(Some(&workspace_id)),
            DeliveryOptions::default(),
        )
        .await
}

/// Writes the socket registration and the subscriber record independently.
async fn store_subscriber(inner: &SubscriptionsInner, subscriber: &Subscriber) {
    let ttl = inner.config.subscriber_ttl();
    log_failure(
        "register_socket_id",
        inner
            .cache
            .register_socket_id(
                &subscriber.workspace_id,
                &subscriber.session_id,
                &subscriber.socket_id,
                ttl,
            )
            .await,
    );
    let stored = match serde_json::to_string(&subscriber.record()) {
        Ok(encoded) => {
            inner
                .cache
                .register_subscriber(&subscriber.workspace_id, &subscriber.socket_id, encoded, ttl)
                .await
        }
        Err(err) => Err(err.into()),
    };
    log_failure("register_subscriber", stored);
}

/// Rebuilds a workspace's remote subscribers from the cache.
///
/// Records owned by nodes that are no longer alive are skipped, and entries already
/// present are never overwritten. Records pointing at this node but absent locally
/// belong to connections that no longer exist and are deleted.
pub(crate) async fn rehydrate_workspace(
    inner: &SubscriptionsInner,
    workspace_id: &str,
) -> Result<usize> {
    let stored = inner.cache.get_all_workspace_subscribers(workspace_id).await?;
    let live_topics = inner.node.live_target_topics().await;
    let own_topic = inner.node.target_topic();

    let mut records = Vec::with_capacity(stored.len());
    for (socket_id, raw) in stored {
        match serde_json::from_str::<SubscriberRecord>(&raw) {
            Ok(record) => records.push(record),
            Err(err) => debug!(
                event = events::SUBSCRIBER_RESTORE_SKIPPED,
                component = COMPONENT,
                workspace_id,
                socket_id = %socket_id,
                err = %err,
                reason = "unreadable_record",
                "skipping cached subscriber"
            ),
        }
    }

    let mut restored = 0;
    let mut orphaned = Vec::new();
    {
        let mut registry = inner.registry.lock().await;
        for record in records {
            if registry.contains(&record.workspace_id, &record.socket_id) {
                continue;
            }
            if record.target_topic == own_topic {
                orphaned.push(record.socket_id);
                continue;
            }
            if !live_topics.contains(&record.target_topic) {
                debug!(
                    event = events::SUBSCRIBER_RESTORE_SKIPPED,
                    component = COMPONENT,
                    workspace_id,
                    socket_id = %record.socket_id,
                    target_topic = %record.target_topic,
                    reason = "stale_target_topic",
                    "skipping cached subscriber"
                );
                continue;
            }

            let permissions = inner.access.permissions(&record.permission_rules);
            let subscriber = Subscriber::from_record(record, permissions, false).into_restored();
            if registry.restore_subscriber(subscriber)? {
                restored += 1;
            }
        }
    }

    for socket_id in orphaned {
        log_failure(
            "unregister_subscriber",
            inner.cache.unregister_subscriber(workspace_id, &socket_id).await,
        );
    }

    if restored > 0 {
        info!(
            event = events::SUBSCRIBER_RESTORED,
            component = COMPONENT,
            workspace_id,
            restored,
            "restored subscribers from cache"
        );
    }
    Ok(restored)
}

pub(crate) async fn rehydrate_all(inner: &SubscriptionsInner) -> usize {
    let workspaces = match inner.cache.list_workspaces().await {
        Ok(workspaces) => workspaces,
        Err(err) => {
            warn!(
                event = events::SYNC_REHYDRATE_FAILED,
                component = COMPONENT,
                err = %err,
                "unable to list cached workspaces"
            );
            return 0;
        }
    };

    let mut restored = 0;
    for workspace_id in &workspaces {
        match rehydrate_workspace(inner, workspace_id).await {
            Ok(count) => restored += count,
            Err(err) => warn!(
                event = events::SYNC_REHYDRATE_FAILED,
                component = COMPONENT,
                workspace_id = %workspace_id,
                err = %err,
                "workspace rehydration failed"
            ),
        }
    }
    info!(
        event = events::SYNC_REHYDRATE_DONE,
        component = COMPONENT,
        workspaces = workspaces.len(),
        restored,
        "rehydration finished"
    );
    restored
}

/// Re-registers every local subscriber, refreshing cache TTLs. With `broadcast`, peers
/// are told again as well.
pub(crate) async fn refresh_local_subscribers(inner: &SubscriptionsInner, broadcast: bool) {
    let local = inner.registry.lock().await.local_subscribers();
    for subscriber in &local {
        if broadcast {
            announce_joined(inner, subscriber, None).await;
        } else {
            store_subscriber(inner, subscriber).await;
        }
    }
    debug!(
        event = events::SYNC_REFRESH_DONE,
        component = COMPONENT,
        subscribers = local.len(),
        broadcast,
        "local subscribers re-registered"
    );
}

pub(crate) fn spawn_refresh_loop(
    subscriptions: Weak<SubscriptionsInner>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(inner) = subscriptions.upgrade() else {
                break;
            };
            refresh_local_subscribers(&inner, false).await;
        }
    })
}
