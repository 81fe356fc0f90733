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

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use tokio::time::Instant;

/// Wire and cache form of a node's identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNodeRecord {
    pub id: String,
    pub target_topic: String,
}

/// A peer as seen by this process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterNodeState {
    pub id: String,
    pub target_topic: String,
    pub last_active_at: Instant,
}

impl ClusterNodeState {
    pub fn from_record(record: ClusterNodeRecord, last_active_at: Instant) -> Self {
        Self {
            id: record.id,
            target_topic: record.target_topic,
            last_active_at,
        }
    }

    pub fn record(&self) -> ClusterNodeRecord {
        ClusterNodeRecord {
            id: self.id.clone(),
            target_topic: self.target_topic.clone(),
        }
    }

    pub fn is_silent_since(&self, now: Instant, threshold: std::time::Duration) -> bool {
        now.saturating_duration_since(self.last_active_at) > threshold
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum NodeLifecycle {
    Starting,
    Active,
    /// Evicted by a peer; heartbeats announce a rejoin.
    Inactive,
    Left,
}

#[cfg(test)]
mod tests {
    use super::{ClusterNodeRecord, ClusterNodeState};
    use std::time::Duration;
    use tokio::time::Instant;

    #[test]
    fn record_uses_camel_case_on_the_wire() {
        let record = ClusterNodeRecord {
            id: "node-a".to_string(),
            target_topic: "streamer-node.node-a".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&record).expect("serializable"),
            serde_json::json!({"id": "node-a", "targetTopic": "streamer-node.node-a"})
        );
    }

    #[test]
    fn silence_is_strictly_longer_than_the_threshold() {
        let start = Instant::now();
        let state = ClusterNodeState {
            id: "node-a".to_string(),
            target_topic: "t".to_string(),
            last_active_at: start,
        };
        let threshold = Duration::from_secs(3);

        assert!(!state.is_silent_since(start + threshold, threshold));
        assert!(state.is_silent_since(start + threshold + Duration::from_millis(1), threshold));
    }
}
