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

//! Stable event names attached to tracing records.

pub const SUBSCRIBER_ADDED: &str = "subscriber_added";
pub const SUBSCRIBER_REMOVED: &str = "subscriber_removed";
pub const SUBSCRIBER_RENAMED: &str = "subscriber_renamed";
pub const SUBSCRIBER_RESTORED: &str = "subscriber_restored";
pub const SUBSCRIBER_RESTORE_SKIPPED: &str = "subscriber_restore_skipped";
pub const SUBSCRIBER_UPDATE_REJECTED: &str = "subscriber_update_rejected";
pub const SUBSCRIBERS_PURGED: &str = "subscribers_purged";

pub const SYNC_MESSAGE_RECEIVED: &str = "sync_message_received";
pub const SYNC_MESSAGE_INVALID: &str = "sync_message_invalid";
pub const SYNC_ANNOUNCE_FAILED: &str = "sync_announce_failed";
pub const SYNC_REHYDRATE_DONE: &str = "sync_rehydrate_done";
pub const SYNC_REHYDRATE_FAILED: &str = "sync_rehydrate_failed";
pub const SYNC_REFRESH_DONE: &str = "sync_refresh_done";

pub const DELIVERY_STARTED: &str = "delivery_started";
pub const DELIVERY_STOPPED: &str = "delivery_stopped";
pub const DELIVERY_DISPATCHED: &str = "delivery_dispatched";
pub const DELIVERY_PERMISSION_DENIED: &str = "delivery_permission_denied";
pub const DELIVERY_RECOVERY_ATTEMPT: &str = "delivery_recovery_attempt";
pub const DELIVERY_RECOVERY_FAILED: &str = "delivery_recovery_failed";
pub const DELIVERY_ENQUEUE_FAILED: &str = "delivery_enqueue_failed";

pub const CLUSTER_NODE_STARTED: &str = "cluster_node_started";
pub const CLUSTER_PEER_UPSERTED: &str = "cluster_peer_upserted";
pub const CLUSTER_PEER_LEFT: &str = "cluster_peer_left";
pub const CLUSTER_PEER_INACTIVE: &str = "cluster_peer_inactive";
pub const CLUSTER_HEARTBEAT_FAILED: &str = "cluster_heartbeat_failed";
pub const CLUSTER_DISCOVERY_FAILED: &str = "cluster_discovery_failed";
pub const CLUSTER_SELF_EVICTED: &str = "cluster_self_evicted";
pub const CLUSTER_REJOINED: &str = "cluster_rejoined";
pub const CLUSTER_NODE_LEFT: &str = "cluster_node_left";

pub const BACKGROUND_TASK_FAILED: &str = "background_task_failed";
pub const RETRY_SCHEDULED: &str = "retry_scheduled";
