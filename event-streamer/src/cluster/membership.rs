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

//! Broker handlers feeding membership traffic into a [`ClusterNode`].

use crate::backend::{BrokerEventType, BrokerHandler, BrokerMessage};
use crate::cluster::node::ClusterNode;
use crate::cluster::state::ClusterNodeRecord;
use crate::observability::events;
use async_trait::async_trait;
use std::sync::Weak;
use tokio::time::Instant;
use tracing::warn;

const COMPONENT: &str = "cluster_membership";

/// Fan-out handler: every node tracks joins, pings and departures.
pub(crate) struct MembershipListener {
    node: Weak<ClusterNode>,
}

impl MembershipListener {
    pub(crate) fn new(node: Weak<ClusterNode>) -> Self {
        Self { node }
    }
}

#[async_trait]
impl BrokerHandler for MembershipListener {
    async fn on_message(&self, message: BrokerMessage) {
        let Some(node) = self.node.upgrade() else {
            return;
        };
        let record = match serde_json::from_value::<ClusterNodeRecord>(message.payload) {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    event = events::SYNC_MESSAGE_INVALID,
                    component = COMPONENT,
                    broker_event = %message.event_type,
                    err = %err,
                    "dropping unreadable membership message"
                );
                return;
            }
        };

        match message.event_type {
            BrokerEventType::ClusterNodeJoined | BrokerEventType::ClusterNodePing => {
                node.upsert_peer(record).await
            }
            BrokerEventType::ClusterNodeLeft => node.remove_peer(record).await,
            BrokerEventType::SubscriberJoined | BrokerEventType::SubscriberLeft => {}
        }
    }
}

/// Grouped handler: exactly one node reacts to each ping by sweeping silent peers.
pub(crate) struct InactivitySweepListener {
    node: Weak<ClusterNode>,
}

impl InactivitySweepListener {
    pub(crate) fn new(node: Weak<ClusterNode>) -> Self {
        Self { node }
    }
}

#[async_trait]
impl BrokerHandler for InactivitySweepListener {
    async fn on_message(&self, _message: BrokerMessage) {
        if let Some(node) = self.node.upgrade() {
            node.sweep_inactive_peers(Instant::now()).await;
        }
    }
}
