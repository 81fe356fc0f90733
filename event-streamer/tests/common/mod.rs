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

#![allow(dead_code)]

use async_trait::async_trait;
use event_streamer::backend::{BrokerEventType, BrokerHandler, BrokerMessage};
use event_streamer::{EventIngress, StreamerConfig, SubscribeParams, Subscriptions};
use memory_backends::{MemoryBroker, MemoryCache, RuleAccessManager};
use query_engine::Event;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing_subscriber::EnvFilter;

pub const WORKSPACE: &str = "ws-1";
pub const HEARTBEAT_MS: u64 = 1_000;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Collaborators shared by every node of one simulated cluster.
pub struct Backends {
    pub broker: Arc<MemoryBroker>,
    pub cache: Arc<MemoryCache>,
    pub access: Arc<RuleAccessManager>,
}

impl Backends {
    pub fn new() -> Self {
        Self {
            broker: Arc::new(MemoryBroker::new()),
            cache: Arc::new(MemoryCache::new()),
            access: Arc::new(RuleAccessManager::allow_all()),
        }
    }

    /// Same cache and access manager, separate broker.
    pub fn with_separate_broker(&self) -> Self {
        Self {
            broker: Arc::new(MemoryBroker::new()),
            cache: self.cache.clone(),
            access: self.access.clone(),
        }
    }
}

pub fn config(node_id: &str) -> StreamerConfig {
    StreamerConfig {
        node_id: Some(node_id.to_string()),
        heartbeat_interval_ms: HEARTBEAT_MS,
        ..Default::default()
    }
}

pub async fn start_node(backends: &Backends, node_id: &str) -> Subscriptions {
    init_tracing();
    Subscriptions::new(
        config(node_id),
        backends.broker.clone(),
        backends.cache.clone(),
        backends.access.clone(),
    )
    .await
    .expect("node starts")
}

pub fn params(user_id: &str, session_id: &str, socket_id: &str, filters: Value) -> SubscribeParams {
    SubscribeParams {
        user_id: user_id.to_string(),
        session_id: session_id.to_string(),
        socket_id: socket_id.to_string(),
        filters,
        ..Default::default()
    }
}

pub fn event(id: &str, event_type: &str) -> Event {
    let mut event = Event::new(event_type, WORKSPACE);
    event.id = id.to_string();
    event
}

pub fn event_from(id: &str, event_type: &str, session_id: &str, socket_id: &str) -> Event {
    let mut event = event(id, event_type);
    event.source.session_id = Some(session_id.to_string());
    event.source.socket_id = Some(socket_id.to_string());
    event
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub event_id: String,
    pub sockets: Vec<String>,
}

/// Starts delivery and records every callback invocation.
pub fn record_deliveries(node: &Subscriptions) -> (EventIngress, UnboundedReceiver<Delivery>) {
    let (sender, receiver) = unbounded_channel();
    let ingress = node
        .start(move |event, subscribers| {
            let mut sockets: Vec<String> = subscribers
                .iter()
                .map(|subscriber| subscriber.socket_id.clone())
                .collect();
            sockets.sort();
            let _ = sender.send(Delivery {
                event_id: event.id.clone(),
                sockets,
            });
        })
        .expect("delivery starts");
    (ingress, receiver)
}

/// Dispatches one event and returns the sockets it reached.
pub async fn deliver(
    ingress: &EventIngress,
    deliveries: &mut UnboundedReceiver<Delivery>,
    event: Event,
) -> Vec<String> {
    let event_id = event.id.clone();
    ingress.dispatch(event).await.expect("dispatched");
    let delivery = deliveries.recv().await.expect("callback ran");
    assert_eq!(delivery.event_id, event_id);
    delivery.sockets
}

/// Polls `check` until it holds; detached cluster cleanup needs a few scheduler turns.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

/// Counts broker messages of one type whose payload names `node_id`.
pub struct NodeMessageCounter {
    event_type: BrokerEventType,
    node_id: String,
    seen: AtomicUsize,
}

impl NodeMessageCounter {
    pub fn new(event_type: BrokerEventType, node_id: &str) -> Self {
        Self {
            event_type,
            node_id: node_id.to_string(),
            seen: AtomicUsize::new(0),
        }
    }

    pub fn count(&self) -> usize {
        self.seen.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerHandler for NodeMessageCounter {
    async fn on_message(&self, message: BrokerMessage) {
        if message.event_type == self.event_type
            && message.payload["id"].as_str() == Some(self.node_id.as_str())
        {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }
    }
}
