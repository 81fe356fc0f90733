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

use crate::api::{
    SubscribeParams, Subscriber, SubscriberHandle, SubscriberRecord, SubscriberUpdate,
    SubscriptionMetrics,
};
use crate::backend::{
    AccessManager, AccessRequest, Broker, BrokerEventType, BrokerHandler, PermissionRule,
    SubjectType, SubscribeOptions, SubscriberCache,
};
use crate::cluster::{ClusterListener, ClusterNode, ClusterNodeRecord};
use crate::config::StreamerConfig;
use crate::control_plane::registry::SubscriberRegistry;
use crate::control_plane::subscriber_sync::{
    announce_joined, announce_left, refresh_local_subscribers, rehydrate_all,
    spawn_refresh_loop, SubscriberSyncListener,
};
use crate::data_plane::push_queue::{self, EventIngress};
use crate::error::{Result, StreamerError};
use crate::observability::{events, fields};
use crate::routing::recovery::SocketRecovery;
use crate::runtime::background::{log_failure, spawn_logged};
use crate::runtime::worker_runtime::spawn_dispatch_loop;
use async_trait::async_trait;
use futures::future::join_all;
use query_engine::{Event, QueryOptions};
use std::fmt::{Debug, Formatter};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const COMPONENT: &str = "subscriptions";
const SYNC_EVENTS: &[BrokerEventType] = &[
    BrokerEventType::SubscriberJoined,
    BrokerEventType::SubscriberLeft,
];

pub(crate) struct SubscriptionsInner {
    pub(crate) config: StreamerConfig,
    pub(crate) node: Arc<ClusterNode>,
    pub(crate) broker: Arc<dyn Broker>,
    pub(crate) cache: Arc<dyn SubscriberCache>,
    pub(crate) access: Arc<dyn AccessManager>,
    pub(crate) registry: Mutex<SubscriberRegistry>,
    pub(crate) recovery: SocketRecovery,
    sync_listener: Mutex<Option<Arc<dyn BrokerHandler>>>,
    started: AtomicBool,
    next_connection: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SubscriptionsInner {
    /// Local removal completes before returning; cache and broker cleanup run detached.
    ///
    /// With `connection`, the entry is removed only while it still belongs to that
    /// connection.
    pub(crate) async fn unregister_subscriber(
        self: &Arc<Self>,
        workspace_id: &str,
        socket_id: &str,
        connection: Option<u64>,
    ) -> bool {
        let removed = {
            let mut registry = self.registry.lock().await;
            let owned = connection.map_or(true, |connection| {
                registry
                    .get(workspace_id, socket_id)
                    .is_some_and(|current| current.local && current.connection() == connection)
            });
            if !owned {
                debug!(
                    event = events::SUBSCRIBER_REMOVED,
                    component = COMPONENT,
                    workspace_id,
                    socket_id,
                    "socket id now belongs to another connection; nothing removed"
                );
                return false;
            }
            registry.unset_subscriber(workspace_id, socket_id)
        };
        let Some(removed) = removed else {
            return false;
        };

        info!(
            event = events::SUBSCRIBER_REMOVED,
            component = COMPONENT,
            subscriber = %fields::format_subscriber_key(&removed),
            "subscriber removed"
        );
        if removed.local {
            spawn_logged(
                "announce_subscriber_left",
                announce_left(self.clone(), workspace_id.to_string(), socket_id.to_string()),
            );
        }
        true
    }
}

/// Purges subscribers of departed peers and re-announces after a rejoin.
struct RegistryClusterListener {
    subscriptions: Weak<SubscriptionsInner>,
}

#[async_trait]
impl ClusterListener for RegistryClusterListener {
    async fn on_node_left(&self, node: &ClusterNodeRecord) {
        let Some(inner) = self.subscriptions.upgrade() else {
            return;
        };
        let purged = inner
            .registry
            .lock()
            .await
            .purge_target_topic(&node.target_topic);
        if !purged.is_empty() {
            info!(
                event = events::SUBSCRIBERS_PURGED,
                component = COMPONENT,
                peer_id = %node.id,
                target_topic = %node.target_topic,
                purged = purged.len(),
                "purged subscribers of departed node"
            );
        }
    }

    async fn on_rejoined(&self) {
        if let Some(inner) = self.subscriptions.upgrade() {
            refresh_local_subscribers(&inner, true).await;
        }
    }
}

/// The subscriber registry and delivery entry point of one streamer process.
///
/// Owns the per-workspace subscriber indexes and query engines, keeps them in sync with
/// peer nodes through the broker and the cache, and resolves the recipients of every
/// event pushed into the [`EventIngress`] returned by [`Subscriptions::start`].
pub struct Subscriptions {
    inner: Arc<SubscriptionsInner>,
}

impl Debug for Subscriptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriptions")
            .field("node", &self.inner.node)
            .finish_non_exhaustive()
    }
}

impl Subscriptions {
    /// Validates the configuration, joins the cluster and rehydrates remote subscribers
    /// from the cache. Configuration errors and broker subscription failures are fatal.
    pub async fn new(
        config: StreamerConfig,
        broker: Arc<dyn Broker>,
        cache: Arc<dyn SubscriberCache>,
        access: Arc<dyn AccessManager>,
    ) -> Result<Self> {
        config.validate()?;
        let memo_capacity = NonZeroUsize::new(config.recovery_memo_capacity).ok_or_else(|| {
            StreamerError::Config("recovery_memo_capacity must be greater than zero".to_string())
        })?;
        let node = ClusterNode::new(&config, broker.clone(), cache.clone())?;

        let inner = Arc::new(SubscriptionsInner {
            recovery: SocketRecovery::new(memo_capacity, config.recovery_timeout()),
            config,
            node,
            broker,
            cache,
            access,
            registry: Mutex::new(SubscriberRegistry::new()),
            sync_listener: Mutex::new(None),
            started: AtomicBool::new(false),
            next_connection: AtomicU64::new(1),
            tasks: Mutex::new(Vec::new()),
        });
        let weak = Arc::downgrade(&inner);

        inner
            .node
            .add_listener(Arc::new(RegistryClusterListener {
                subscriptions: weak.clone(),
            }))
            .await;
        let sync_listener: Arc<dyn BrokerHandler> =
            Arc::new(SubscriberSyncListener::new(weak.clone()));
        inner
            .broker
            .on(SYNC_EVENTS, sync_listener.clone(), SubscribeOptions::fan_out())
            .await?;
        *inner.sync_listener.lock().await = Some(sync_listener);
        inner.node.start().await?;
        rehydrate_all(&inner).await;

        let refresh = spawn_refresh_loop(weak, inner.config.subscriber_refresh_interval());
        inner.tasks.lock().await.push(refresh);

        Ok(Self { inner })
    }

    pub fn node(&self) -> &Arc<ClusterNode> {
        &self.inner.node
    }

    pub fn config(&self) -> &StreamerConfig {
        &self.inner.config
    }

    /// Registers a local connection and announces it to the cluster.
    pub async fn subscribe(
        &self,
        workspace_id: &str,
        params: SubscribeParams,
    ) -> Result<SubscriberHandle> {
        let filters = QueryOptions::from_value(params.filters)?;
        let resolved = self
            .inner
            .access
            .resolve(&AccessRequest {
                workspace_id: workspace_id.to_string(),
                user_id: params.user_id,
                api_key: params.api_key,
                auth_data: params.auth_data,
            })
            .await?;

        let rules = PermissionRule::narrow(resolved.rules, SubjectType::Event);
        let permissions = self.inner.access.permissions(&rules);
        let record = SubscriberRecord {
            workspace_id: workspace_id.to_string(),
            user_id: resolved.user_id,
            session_id: params.session_id,
            socket_id: params.socket_id,
            filters,
            permission_rules: rules,
            target_topic: params
                .target_topic
                .unwrap_or_else(|| self.inner.node.target_topic().to_string()),
        };
        let connection = self.inner.next_connection.fetch_add(1, Ordering::Relaxed);
        let subscriber =
            Subscriber::from_record(record, permissions, true).with_connection(connection);

        let replaced = self
            .inner
            .registry
            .lock()
            .await
            .set_subscriber(subscriber.clone())?;
        info!(
            event = events::SUBSCRIBER_ADDED,
            component = COMPONENT,
            subscriber = %fields::format_subscriber_key(&subscriber),
            user_id = %subscriber.user_id,
            replaced = replaced.is_some(),
            "subscriber added"
        );

        announce_joined(&self.inner, &subscriber, None).await;
        Ok(SubscriberHandle::new(
            workspace_id,
            &subscriber.session_id,
            &subscriber.socket_id,
            connection,
            Arc::downgrade(&self.inner),
        ))
    }

    /// Attaches the delivery callback. Must be called once, inside a tokio runtime.
    ///
    /// The callback runs exactly once per pushed event, in push order, with the
    /// subscribers whose filters match and whose permissions allow reading it.
    pub fn start<F>(&self, callback: F) -> Result<EventIngress>
    where
        F: Fn(&Event, &[Arc<Subscriber>]) + Send + Sync + 'static,
    {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(StreamerError::AlreadyStarted);
        }
        let (ingress, receiver) = push_queue::channel(self.inner.config.push_queue_capacity);
        spawn_dispatch_loop(Arc::downgrade(&self.inner), receiver, Box::new(callback));
        Ok(ingress)
    }

    /// Changes a local subscriber's filters and/or socket id.
    ///
    /// A socket id change is honored only when the new id was registered earlier by the
    /// same session in the same workspace. On success `handle` follows the new id.
    pub async fn update_local_subscriber(
        &self,
        handle: &mut SubscriberHandle,
        update: SubscriberUpdate,
    ) -> bool {
        let workspace_id = handle.workspace_id().to_string();
        let filters = match update.filters.map(QueryOptions::from_value).transpose() {
            Ok(filters) => filters,
            Err(err) => return reject_update(handle, "invalid_filters", Some(err.to_string())),
        };

        let new_socket_id = update
            .socket_id
            .filter(|socket_id| socket_id != handle.socket_id());
        if let Some(socket_id) = &new_socket_id {
            match self
                .inner
                .cache
                .is_known_socket_id(&workspace_id, handle.session_id(), socket_id)
                .await
            {
                Ok(true) => {}
                Ok(false) => return reject_update(handle, "unknown_socket_id", None),
                Err(err) => {
                    return reject_update(handle, "socket_lookup_failed", Some(err.to_string()))
                }
            }
        }

        let updated = {
            let mut registry = self.inner.registry.lock().await;
            let Some(current) = registry.get(&workspace_id, handle.socket_id()) else {
                return reject_update(handle, "not_subscribed", None);
            };
            if !current.local {
                return reject_update(handle, "not_local", None);
            }
            if current.connection() != handle.connection() {
                return reject_update(handle, "superseded", None);
            }

            let mut next = Subscriber::clone(&current);
            if let Some(filters) = filters {
                next.filters = filters;
            }
            if let Some(socket_id) = &new_socket_id {
                next.socket_id = socket_id.clone();
            }
            if let Err(err) = registry.replace_subscriber(Some(handle.socket_id()), next.clone()) {
                return reject_update(handle, "invalid_filters", Some(err.to_string()));
            }
            next
        };

        let previous_socket_id =
            new_socket_id.map(|socket_id| std::mem::replace(&mut handle.socket_id, socket_id));
        if let Some(previous) = &previous_socket_id {
            info!(
                event = events::SUBSCRIBER_RENAMED,
                component = COMPONENT,
                subscriber = %fields::format_subscriber_key(&updated),
                previous_socket_id = %previous,
                "subscriber moved to reused socket id"
            );
        } else {
            debug!(
                event = events::SUBSCRIBER_ADDED,
                component = COMPONENT,
                subscriber = %fields::format_subscriber_key(&updated),
                "subscriber filters updated"
            );
        }

        announce_joined(&self.inner, &updated, previous_socket_id.as_deref()).await;
        true
    }

    /// Removes a subscriber. No local delivery reaches it after this returns.
    pub async fn unregister_subscriber(&self, workspace_id: &str, socket_id: &str) -> bool {
        self.inner
            .unregister_subscriber(workspace_id, socket_id, None)
            .await
    }

    pub async fn subscriber(&self, workspace_id: &str, socket_id: &str) -> Option<Arc<Subscriber>> {
        self.inner.registry.lock().await.get(workspace_id, socket_id)
    }

    /// Socket ids of a user's live connections within a workspace.
    pub async fn user_sockets(&self, workspace_id: &str, user_id: &str) -> Vec<String> {
        self.inner
            .registry
            .lock()
            .await
            .user_sockets(workspace_id, user_id)
    }

    /// Number of subscribers owned by the node delivering on `target_topic`.
    pub async fn target_topic_subscribers(&self, target_topic: &str) -> usize {
        self.inner
            .registry
            .lock()
            .await
            .target_topic_count(target_topic)
    }

    pub async fn metrics(&self) -> SubscriptionMetrics {
        self.inner.registry.lock().await.metrics()
    }

    /// Leaves the cluster and removes this node's subscribers locally and from the cache.
    pub async fn shutdown(&self) {
        for task in self.inner.tasks.lock().await.drain(..) {
            task.abort();
        }
        if let Some(listener) = self.inner.sync_listener.lock().await.take() {
            log_failure("unsubscribe", self.inner.broker.off(SYNC_EVENTS, &listener).await);
        }
        self.inner.node.leave().await;

        let local = {
            let mut registry = self.inner.registry.lock().await;
            let local = registry.local_subscribers();
            for subscriber in &local {
                registry.unset_subscriber(&subscriber.workspace_id, &subscriber.socket_id);
            }
            local
        };

        let removals = local.iter().map(|subscriber| {
            self.inner
                .cache
                .unregister_subscriber(&subscriber.workspace_id, &subscriber.socket_id)
        });
        for result in join_all(removals).await {
            log_failure("unregister_subscriber", result);
        }

        info!(
            event = events::SUBSCRIBERS_PURGED,
            component = COMPONENT,
            node_id = %self.inner.node.id(),
            purged = local.len(),
            "local subscribers removed on shutdown"
        );
    }
}

fn reject_update(handle: &SubscriberHandle, reason: &'static str, detail: Option<String>) -> bool {
    warn!(
        event = events::SUBSCRIBER_UPDATE_REJECTED,
        component = COMPONENT,
        workspace_id = %handle.workspace_id(),
        socket_id = %handle.socket_id(),
        reason,
        detail = ?detail,
        "subscriber update rejected"
    );
    false
}
