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

use crate::backend::{Action, PermissionRule, Permissions, SubjectType};
use query_engine::{Event, QueryOptions};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Parameters the transport layer passes to `subscribe()` for a new connection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubscribeParams {
    pub user_id: String,
    pub session_id: String,
    pub socket_id: String,
    pub api_key: Option<String>,
    pub auth_data: Option<Value>,
    /// Delivery topic of the owning node; defaults to this node's topic.
    pub target_topic: Option<String>,
    /// Raw subscription options as sent by the client.
    pub filters: Value,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubscriberUpdate {
    pub filters: Option<Value>,
    pub socket_id: Option<String>,
}

/// Serializable form of a subscriber, shared through the cache and the broker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberRecord {
    pub workspace_id: String,
    pub user_id: String,
    pub session_id: String,
    pub socket_id: String,
    #[serde(default)]
    pub filters: QueryOptions,
    #[serde(default)]
    pub permission_rules: Vec<PermissionRule>,
    pub target_topic: String,
}

/// One live connection within a workspace.
#[derive(Clone)]
pub struct Subscriber {
    pub workspace_id: String,
    pub user_id: String,
    pub session_id: String,
    pub socket_id: String,
    pub filters: QueryOptions,
    pub permission_rules: Vec<PermissionRule>,
    pub target_topic: String,
    /// The connection terminates on this process.
    pub local: bool,
    restored: bool,
    /// Identifies the local connection that created this entry; zero for peer entries.
    connection: u64,
    permissions: Arc<dyn Permissions>,
}

impl Subscriber {
    pub fn from_record(
        record: SubscriberRecord,
        permissions: Arc<dyn Permissions>,
        local: bool,
    ) -> Self {
        Self {
            workspace_id: record.workspace_id,
            user_id: record.user_id,
            session_id: record.session_id,
            socket_id: record.socket_id,
            filters: record.filters,
            permission_rules: record.permission_rules,
            target_topic: record.target_topic,
            local,
            restored: false,
            connection: 0,
            permissions,
        }
    }

    /// Marks an entry rebuilt from the cache rather than from a live sync message.
    pub(crate) fn into_restored(mut self) -> Self {
        self.restored = true;
        self
    }

    pub(crate) fn with_connection(mut self, connection: u64) -> Self {
        self.connection = connection;
        self
    }

    pub(crate) fn connection(&self) -> u64 {
        self.connection
    }

    pub fn is_restored(&self) -> bool {
        self.restored
    }

    pub fn record(&self) -> SubscriberRecord {
        SubscriberRecord {
            workspace_id: self.workspace_id.clone(),
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
            socket_id: self.socket_id.clone(),
            filters: self.filters.clone(),
            permission_rules: self.permission_rules.clone(),
            target_topic: self.target_topic.clone(),
        }
    }

    pub fn can_read(&self, event: &Event) -> bool {
        self.permissions.can(Action::Read, SubjectType::Event, event)
    }
}

impl Debug for Subscriber {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("workspace_id", &self.workspace_id)
            .field("user_id", &self.user_id)
            .field("session_id", &self.session_id)
            .field("socket_id", &self.socket_id)
            .field("target_topic", &self.target_topic)
            .field("local", &self.local)
            .field("restored", &self.restored)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubscriptionMetrics {
    pub workspaces: usize,
    pub subscribers: usize,
}
