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

use crate::backend::{
    Broker, BrokerEventType, BrokerHandler, DeliveryOptions, MessageSource, SubscribeOptions,
    SubscriberCache,
};
use crate::cluster::membership::{InactivitySweepListener, MembershipListener};
use crate::cluster::state::{ClusterNodeRecord, ClusterNodeState, NodeLifecycle};
use crate::config::StreamerConfig;
use crate::error::{Result, StreamerError};
use crate::observability::events;
use crate::runtime::background::log_failure;
use crate::runtime::retry::retry_with_backoff;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

const COMPONENT: &str = "cluster_node";

/// Receives membership changes that affect routing state.
#[async_trait]
pub trait ClusterListener: Send + Sync {
    /// A peer left or was evicted; its subscribers are no longer reachable.
    async fn on_node_left(&self, node: &ClusterNodeRecord);

    /// This node was evicted and has announced itself again.
    async fn on_rejoined(&self);
}

/// This process's membership in the streamer cluster.
///
/// Every node tracks every peer's last heartbeat. Inactivity sweeps run in a grouped
/// broker handler, so exactly one node evicts a silent peer and broadcasts its departure.
pub struct ClusterNode {
    id: String,
    target_topic: String,
    heartbeat_interval: Duration,
    inactivity_threshold: Duration,
    node_ttl: Duration,
    discovery_retries: u32,
    discovery_backoff: Duration,
    broker: Arc<dyn Broker>,
    cache: Arc<dyn SubscriberCache>,
    lifecycle: Mutex<NodeLifecycle>,
    peers: Mutex<HashMap<String, ClusterNodeState>>,
    listeners: Mutex<Vec<Arc<dyn ClusterListener>>>,
    handlers: Mutex<Vec<(&'static [BrokerEventType], Arc<dyn BrokerHandler>)>>,
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
}

const MEMBERSHIP_EVENTS: &[BrokerEventType] = &[
    BrokerEventType::ClusterNodeJoined,
    BrokerEventType::ClusterNodePing,
    BrokerEventType::ClusterNodeLeft,
];
const SWEEP_EVENTS: &[BrokerEventType] = &[BrokerEventType::ClusterNodePing];

impl Debug for ClusterNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterNode")
            .field("id", &self.id)
            .field("target_topic", &self.target_topic)
            .finish_non_exhaustive()
    }
}

impl ClusterNode {
    pub fn new(
        config: &StreamerConfig,
        broker: Arc<dyn Broker>,
        cache: Arc<dyn SubscriberCache>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let id = config.resolve_node_id();
        Ok(Arc::new(Self {
            target_topic: config.target_topic_for(&id),
            id,
            heartbeat_interval: config.heartbeat_interval(),
            inactivity_threshold: config.inactivity_threshold(),
            node_ttl: config.cluster_node_ttl(),
            discovery_retries: config.discovery_max_retries,
            discovery_backoff: config.discovery_backoff(),
            broker,
            cache,
            lifecycle: Mutex::new(NodeLifecycle::Starting),
            peers: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            handlers: Mutex::new(Vec::new()),
            heartbeat_task: Mutex::new(None),
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target_topic(&self) -> &str {
        &self.target_topic
    }

    pub fn record(&self) -> ClusterNodeRecord {
        ClusterNodeRecord {
            id: self.id.clone(),
            target_topic: self.target_topic.clone(),
        }
    }

    pub(crate) fn message_source(&self, workspace_id: Option<&str>) -> MessageSource {
        MessageSource {
            node_id: Some(self.id.clone()),
            workspace_id: workspace_id.map(str::to_string),
        }
    }

    pub async fn lifecycle(&self) -> NodeLifecycle {
        *self.lifecycle.lock().await
    }

    pub async fn add_listener(&self, listener: Arc<dyn ClusterListener>) {
        self.listeners.lock().await.push(listener);
    }

    /// Known peers, ordered by id. Never includes this node.
    pub async fn peers(&self) -> Vec<ClusterNodeState> {
        let mut peers: Vec<ClusterNodeState> = self.peers.lock().await.values().cloned().collect();
        peers.sort_by(|left, right| left.id.cmp(&right.id));
        peers
    }

    /// Delivery topics of every node currently believed alive, this one included.
    pub async fn live_target_topics(&self) -> HashSet<String> {
        let mut topics: HashSet<String> = self
            .peers
            .lock()
            .await
            .values()
            .map(|peer| peer.target_topic.clone())
            .collect();
        topics.insert(self.target_topic.clone());
        topics
    }

    /// Discovers peers, subscribes to membership traffic, announces this node and
    /// starts heartbeating. Discovery failures are retried, then tolerated.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.lifecycle().await != NodeLifecycle::Starting {
            return Err(StreamerError::AlreadyStarted);
        }

        let node = self.as_ref();
        let discovered = match retry_with_backoff(
            "discover_cluster_nodes",
            self.discovery_retries,
            self.discovery_backoff,
            move || node.discover_peers(),
        )
        .await
        {
            Ok(discovered) => discovered,
            Err(err) => {
                warn!(
                    event = events::CLUSTER_DISCOVERY_FAILED,
                    component = COMPONENT,
                    node_id = %self.id,
                    err = %err,
                    "peer discovery failed; relying on broker announcements"
                );
                0
            }
        };

        let weak = Arc::downgrade(self);
        let membership: Arc<dyn BrokerHandler> = Arc::new(MembershipListener::new(weak.clone()));
        let sweep: Arc<dyn BrokerHandler> = Arc::new(InactivitySweepListener::new(weak));
        self.broker
            .on(MEMBERSHIP_EVENTS, membership.clone(), SubscribeOptions::fan_out())
            .await?;
        self.handlers
            .lock()
            .await
            .push((MEMBERSHIP_EVENTS, membership));
        self.broker
            .on(SWEEP_EVENTS, sweep.clone(), SubscribeOptions::grouped())
            .await?;
        self.handlers.lock().await.push((SWEEP_EVENTS, sweep));

        *self.lifecycle.lock().await = NodeLifecycle::Active;
        self.announce(BrokerEventType::ClusterNodeJoined).await;
        *self.heartbeat_task.lock().await = Some(self.spawn_heartbeat());

        info!(
            event = events::CLUSTER_NODE_STARTED,
            component = COMPONENT,
            node_id = %self.id,
            target_topic = %self.target_topic,
            peers = discovered,
            "cluster node started"
        );
        Ok(())
    }

    /// Broadcasts departure and stops heartbeating. Idempotent.
    pub async fn leave(&self) {
        let previous = std::mem::replace(&mut *self.lifecycle.lock().await, NodeLifecycle::Left);
        if previous == NodeLifecycle::Left {
            return;
        }
        if let Some(task) = self.heartbeat_task.lock().await.take() {
            task.abort();
        }
        let handlers: Vec<_> = self.handlers.lock().await.drain(..).collect();
        for (event_types, handler) in &handlers {
            log_failure("unsubscribe", self.broker.off(event_types, handler).await);
        }
        if previous == NodeLifecycle::Starting {
            return;
        }

        log_failure(
            "unregister_cluster_node",
            self.cache.unregister_cluster_node(&self.id).await,
        );
        log_failure(
            "broadcast_node_left",
            self.send_record(BrokerEventType::ClusterNodeLeft, &self.record())
                .await,
        );
        info!(
            event = events::CLUSTER_NODE_LEFT,
            component = COMPONENT,
            node_id = %self.id,
            "cluster node left"
        );
    }

    /// Evicts every peer silent for longer than the inactivity threshold at `now`.
    pub async fn sweep_inactive_peers(&self, now: Instant) -> Vec<ClusterNodeState> {
        if self.lifecycle().await != NodeLifecycle::Active {
            return Vec::new();
        }

        let evicted: Vec<ClusterNodeState> = {
            let mut peers = self.peers.lock().await;
            let silent: Vec<String> = peers
                .values()
                .filter(|peer| peer.is_silent_since(now, self.inactivity_threshold))
                .map(|peer| peer.id.clone())
                .collect();
            silent.iter().filter_map(|id| peers.remove(id)).collect()
        };

        for peer in &evicted {
            warn!(
                event = events::CLUSTER_PEER_INACTIVE,
                component = COMPONENT,
                node_id = %self.id,
                peer_id = %peer.id,
                silent_ms = now.saturating_duration_since(peer.last_active_at).as_millis() as u64,
                "evicting silent peer"
            );
            log_failure(
                "unregister_cluster_node",
                self.cache.unregister_cluster_node(&peer.id).await,
            );
            log_failure(
                "broadcast_node_left",
                self.send_record(BrokerEventType::ClusterNodeLeft, &peer.record())
                    .await,
            );
        }
        evicted
    }

    pub(crate) async fn upsert_peer(&self, record: ClusterNodeRecord) {
        if record.id == self.id {
            return;
        }
        let now = Instant::now();
        let mut peers = self.peers.lock().await;
        match peers.get_mut(&record.id) {
            Some(peer) => {
                trace!(
                    event = events::CLUSTER_PEER_UPSERTED,
                    component = COMPONENT,
                    peer_id = %record.id,
                    "peer heartbeat"
                );
                peer.last_active_at = now;
                peer.target_topic = record.target_topic;
            }
            None => {
                debug!(
                    event = events::CLUSTER_PEER_UPSERTED,
                    component = COMPONENT,
                    node_id = %self.id,
                    peer_id = %record.id,
                    target_topic = %record.target_topic,
                    "peer joined"
                );
                peers.insert(record.id.clone(), ClusterNodeState::from_record(record, now));
            }
        }
    }

    pub(crate) async fn remove_peer(&self, record: ClusterNodeRecord) {
        if record.id == self.id {
            self.mark_evicted().await;
            return;
        }

        let known = self.peers.lock().await.remove(&record.id).is_some();
        info!(
            event = events::CLUSTER_PEER_LEFT,
            component = COMPONENT,
            node_id = %self.id,
            peer_id = %record.id,
            known,
            "peer left"
        );

        for listener in self.listeners_snapshot().await {
            listener.on_node_left(&record).await;
        }
    }

    async fn mark_evicted(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if *lifecycle == NodeLifecycle::Active {
            *lifecycle = NodeLifecycle::Inactive;
            warn!(
                event = events::CLUSTER_SELF_EVICTED,
                component = COMPONENT,
                node_id = %self.id,
                "evicted by a peer; rejoining on next heartbeat"
            );
        }
    }

    /// One heartbeat round. Returns `false` once the node has left.
    pub(crate) async fn heartbeat(&self) -> bool {
        let rejoining = {
            let mut lifecycle = self.lifecycle.lock().await;
            match *lifecycle {
                NodeLifecycle::Active => false,
                NodeLifecycle::Inactive => {
                    *lifecycle = NodeLifecycle::Active;
                    true
                }
                NodeLifecycle::Starting => return true,
                NodeLifecycle::Left => return false,
            }
        };

        let event_type = if rejoining {
            BrokerEventType::ClusterNodeJoined
        } else {
            BrokerEventType::ClusterNodePing
        };
        self.announce(event_type).await;

        if rejoining {
            info!(
                event = events::CLUSTER_REJOINED,
                component = COMPONENT,
                node_id = %self.id,
                "rejoined cluster"
            );
            for listener in self.listeners_snapshot().await {
                listener.on_rejoined().await;
            }
        }
        true
    }

    async fn discover_peers(&self) -> Result<usize> {
        let nodes = self.cache.get_cluster_nodes().await?;
        let now = Instant::now();
        let mut peers = self.peers.lock().await;
        let mut discovered = 0;
        for (node_id, raw) in nodes {
            if node_id == self.id {
                continue;
            }
            match serde_json::from_str::<ClusterNodeRecord>(&raw) {
                Ok(record) => {
                    peers.insert(record.id.clone(), ClusterNodeState::from_record(record, now));
                    discovered += 1;
                }
                Err(err) => debug!(
                    event = events::CLUSTER_DISCOVERY_FAILED,
                    component = COMPONENT,
                    peer_id = %node_id,
                    err = %err,
                    "skipping unreadable node record"
                ),
            }
        }
        Ok(discovered)
    }

    async fn announce(&self, event_type: BrokerEventType) {
        let record = self.record();
        let registered = match serde_json::to_string(&record) {
            Ok(encoded) => {
                self.cache
                    .register_cluster_node(&self.id, encoded, self.node_ttl)
                    .await
            }
            Err(err) => Err(err.into()),
        };
        let sent = self.send_record(event_type, &record).await;

        for (operation, result) in [("register_cluster_node", registered), ("broadcast", sent)] {
            if let Err(err) = result {
                warn!(
                    event = events::CLUSTER_HEARTBEAT_FAILED,
                    component = COMPONENT,
                    node_id = %self.id,
                    broker_event = %event_type,
                    operation,
                    err = %err,
                    "membership announcement failed"
                );
            }
        }
    }

    async fn send_record(
        &self,
        event_type: BrokerEventType,
        record: &ClusterNodeRecord,
    ) -> Result<()> {
        let payload = serde_json::to_value(record)?;
        self.broker
            .send(
                event_type,
                payload,
                self.message_source(None),
                DeliveryOptions::default(),
            )
            .await
    }

    async fn listeners_snapshot(&self) -> Vec<Arc<dyn ClusterListener>> {
        self.listeners.lock().await.clone()
    }

    fn spawn_heartbeat(self: &Arc<Self>) -> JoinHandle<()> {
        let node = Arc::downgrade(self);
        let period = self.heartbeat_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(node) = node.upgrade() else {
                    break;
                };
                if !node.heartbeat().await {
                    break;
                }
            }
        })
    }
}
