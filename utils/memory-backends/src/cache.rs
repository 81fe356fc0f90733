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

use async_trait::async_trait;
use event_streamer::backend::SubscriberCache;
use event_streamer::{Result, StreamerError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Default)]
struct CacheState {
    /// workspace -> socket -> encoded subscriber
    subscribers: HashMap<String, HashMap<String, Expiring<String>>>,
    /// (workspace, session) -> socket ids
    sockets: HashMap<(String, String), HashMap<String, Expiring<()>>>,
    nodes: HashMap<String, Expiring<String>>,
}

impl CacheState {
    fn prune(&mut self, now: Instant) {
        self.subscribers.retain(|_, records| {
            records.retain(|_, record| record.is_live(now));
            !records.is_empty()
        });
        self.sockets.retain(|_, sockets| {
            sockets.retain(|_, socket| socket.is_live(now));
            !sockets.is_empty()
        });
        self.nodes.retain(|_, node| node.is_live(now));
    }
}

/// TTL'd cache kept in process memory. Expiry follows the tokio clock, so paused-time
/// tests can age entries deterministically.
#[derive(Default)]
pub struct MemoryCache {
    state: Mutex<CacheState>,
    offline: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails, like an unreachable cache server.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self, operation: &'static str) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StreamerError::cache(operation, "cache is offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriberCache for MemoryCache {
    async fn register_subscriber(
        &self,
        workspace_id: &str,
        socket_id: &str,
        record: String,
        ttl: Duration,
    ) -> Result<()> {
        self.ensure_online("register_subscriber")?;
        self.state
            .lock()
            .await
            .subscribers
            .entry(workspace_id.to_string())
            .or_default()
            .insert(socket_id.to_string(), Expiring::new(record, ttl));
        Ok(())
    }

    async fn unregister_subscriber(&self, workspace_id: &str, socket_id: &str) -> Result<()> {
        self.ensure_online("unregister_subscriber")?;
        let mut state = self.state.lock().await;
        if let Some(records) = state.subscribers.get_mut(workspace_id) {
            records.remove(socket_id);
            if records.is_empty() {
                state.subscribers.remove(workspace_id);
            }
        }
        Ok(())
    }

    async fn get_all_workspace_subscribers(
        &self,
        workspace_id: &str,
    ) -> Result<HashMap<String, String>> {
        self.ensure_online("get_all_workspace_subscribers")?;
        let mut state = self.state.lock().await;
        state.prune(Instant::now());
        Ok(state
            .subscribers
            .get(workspace_id)
            .map(|records| {
                records
                    .iter()
                    .map(|(socket_id, record)| (socket_id.clone(), record.value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_workspaces(&self) -> Result<Vec<String>> {
        self.ensure_online("list_workspaces")?;
        let mut state = self.state.lock().await;
        state.prune(Instant::now());
        let mut workspaces: Vec<String> = state.subscribers.keys().cloned().collect();
        workspaces.sort();
        Ok(workspaces)
    }

    async fn register_socket_id(
        &self,
        workspace_id: &str,
        session_id: &str,
        socket_id: &str,
        ttl: Duration,
    ) -> Result<()> {
        self.ensure_online("register_socket_id")?;
        self.state
            .lock()
            .await
            .sockets
            .entry((workspace_id.to_string(), session_id.to_string()))
            .or_default()
            .insert(socket_id.to_string(), Expiring::new((), ttl));
        Ok(())
    }

    async fn is_known_socket_id(
        &self,
        workspace_id: &str,
        session_id: &str,
        socket_id: &str,
    ) -> Result<bool> {
        self.ensure_online("is_known_socket_id")?;
        let mut state = self.state.lock().await;
        state.prune(Instant::now());
        Ok(state
            .sockets
            .get(&(workspace_id.to_string(), session_id.to_string()))
            .is_some_and(|sockets| sockets.contains_key(socket_id)))
    }

    async fn register_cluster_node(
        &self,
        node_id: &str,
        record: String,
        ttl: Duration,
    ) -> Result<()> {
        self.ensure_online("register_cluster_node")?;
        self.state
            .lock()
            .await
            .nodes
            .insert(node_id.to_string(), Expiring::new(record, ttl));
        Ok(())
    }

    async fn unregister_cluster_node(&self, node_id: &str) -> Result<()> {
        self.ensure_online("unregister_cluster_node")?;
        self.state.lock().await.nodes.remove(node_id);
        Ok(())
    }

    async fn get_cluster_nodes(&self) -> Result<HashMap<String, String>> {
        self.ensure_online("get_cluster_nodes")?;
        let mut state = self.state.lock().await;
        state.prune(Instant::now());
        Ok(state
            .nodes
            .iter()
            .map(|(node_id, node)| (node_id.clone(), node.value.clone()))
            .collect())
    }
}
