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

//! Shared key/value, set and hash store used for bootstrap and recovery.
//!
//! Values are opaque strings; the core owns their encoding. Nothing on the matching
//! path reads from the cache except the bounded unknown-socket recovery.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

#[async_trait]
pub trait SubscriberCache: Send + Sync {
    /// Stores one subscriber record in the workspace hash, refreshing its TTL.
    async fn register_subscriber(
        &self,
        workspace_id: &str,
        socket_id: &str,
        record: String,
        ttl: Duration,
    ) -> Result<()>;

    async fn unregister_subscriber(&self, workspace_id: &str, socket_id: &str) -> Result<()>;

    /// All live records of a workspace keyed by socket id.
    async fn get_all_workspace_subscribers(
        &self,
        workspace_id: &str,
    ) -> Result<HashMap<String, String>>;

    async fn list_workspaces(&self) -> Result<Vec<String>>;

    /// Records that `socket_id` was opened by `session_id` within the workspace.
    async fn register_socket_id(
        &self,
        workspace_id: &str,
        session_id: &str,
        socket_id: &str,
        ttl: Duration,
    ) -> Result<()>;

    async fn is_known_socket_id(
        &self,
        workspace_id: &str,
        session_id: &str,
        socket_id: &str,
    ) -> Result<bool>;

    async fn register_cluster_node(&self, node_id: &str, record: String, ttl: Duration)
        -> Result<()>;

    async fn unregister_cluster_node(&self, node_id: &str) -> Result<()>;

    async fn get_cluster_nodes(&self) -> Result<HashMap<String, String>>;
}
