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

//! At-least-once pub/sub transport between streamer nodes.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use strum::{AsRefStr, Display, EnumIter, EnumString};

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
pub enum BrokerEventType {
    #[strum(serialize = "subscriber.joined")]
    #[serde(rename = "subscriber.joined")]
    SubscriberJoined,
    #[strum(serialize = "subscriber.left")]
    #[serde(rename = "subscriber.left")]
    SubscriberLeft,
    #[strum(serialize = "cluster.node.joined")]
    #[serde(rename = "cluster.node.joined")]
    ClusterNodeJoined,
    #[strum(serialize = "cluster.node.ping")]
    #[serde(rename = "cluster.node.ping")]
    ClusterNodePing,
    #[strum(serialize = "cluster.node.left")]
    #[serde(rename = "cluster.node.left")]
    ClusterNodeLeft,
}

/// Sender attribution stamped on every message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSource {
    pub node_id: Option<String>,
    pub workspace_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrokerMessage {
    pub event_type: BrokerEventType,
    pub payload: Value,
    pub source: MessageSource,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// `false`: every registered handler sees every message.
    /// `true`: handlers form a consumer group and one of them receives each message.
    pub group_partitions: bool,
}

impl SubscribeOptions {
    pub fn fan_out() -> Self {
        Self {
            group_partitions: false,
        }
    }

    pub fn grouped() -> Self {
        Self {
            group_partitions: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeliveryOptions {
    /// Partition selector for grouped consumers; `None` uses the default partition.
    pub partition_key: Option<String>,
}

#[async_trait]
pub trait BrokerHandler: Send + Sync {
    async fn on_message(&self, message: BrokerMessage);
}

#[async_trait]
pub trait Broker: Send + Sync {
    async fn on(
        &self,
        event_types: &[BrokerEventType],
        handler: Arc<dyn BrokerHandler>,
        options: SubscribeOptions,
    ) -> Result<()>;

    /// Removes a handler previously registered with [`Broker::on`].
    async fn off(
        &self,
        event_types: &[BrokerEventType],
        handler: &Arc<dyn BrokerHandler>,
    ) -> Result<()>;

    async fn send(
        &self,
        event_type: BrokerEventType,
        payload: Value,
        source: MessageSource,
        options: DeliveryOptions,
    ) -> Result<()>;
}
