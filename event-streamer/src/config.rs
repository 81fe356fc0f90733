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

//! Process configuration, loaded from JSON5.

use crate::error::{Result, StreamerError};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamerConfig {
    /// Stable instance identifier; a random one is generated when absent.
    pub node_id: Option<String>,
    pub target_topic_prefix: String,
    pub heartbeat_interval_ms: u64,
    /// Peers silent for `inactivity_multiplier * heartbeat_interval` are declared gone.
    pub inactivity_multiplier: u32,
    pub cluster_node_ttl_secs: u64,
    pub subscriber_ttl_secs: u64,
    pub subscriber_refresh_interval_secs: u64,
    pub push_queue_capacity: usize,
    pub recovery_timeout_ms: u64,
    pub recovery_memo_capacity: usize,
    pub discovery_max_retries: u32,
    pub discovery_backoff_ms: u64,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            target_topic_prefix: "streamer-node".to_string(),
            heartbeat_interval_ms: 5_000,
            inactivity_multiplier: 3,
            cluster_node_ttl_secs: 60,
            subscriber_ttl_secs: 86_400,
            subscriber_refresh_interval_secs: 300,
            push_queue_capacity: 1_024,
            recovery_timeout_ms: 2_000,
            recovery_memo_capacity: 4_096,
            discovery_max_retries: 3,
            discovery_backoff_ms: 200,
        }
    }
}

impl StreamerConfig {
    pub fn from_json5_str(text: &str) -> Result<Self> {
        let config: Self =
            json5::from_str(text).map_err(|err| StreamerError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json5_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(config_path = %path.display(), "loading streamer configuration");
        let text = fs::read_to_string(path).map_err(|err| {
            StreamerError::Config(format!("unable to read {}: {err}", path.display()))
        })?;
        Self::from_json5_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        let non_zero = [
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("cluster_node_ttl_secs", self.cluster_node_ttl_secs),
            ("subscriber_ttl_secs", self.subscriber_ttl_secs),
            (
                "subscriber_refresh_interval_secs",
                self.subscriber_refresh_interval_secs,
            ),
            ("push_queue_capacity", self.push_queue_capacity as u64),
            ("recovery_timeout_ms", self.recovery_timeout_ms),
            ("recovery_memo_capacity", self.recovery_memo_capacity as u64),
        ];
        if let Some((name, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(StreamerError::Config(format!("{name} must be greater than zero")));
        }
        if self.inactivity_multiplier < 1 {
            return Err(StreamerError::Config(
                "inactivity_multiplier must be at least 1".to_string(),
            ));
        }
        if self.heartbeat_interval() >= self.cluster_node_ttl() {
            return Err(StreamerError::Config(
                "heartbeat_interval_ms must be shorter than cluster_node_ttl_secs".to_string(),
            ));
        }
        if self.subscriber_refresh_interval_secs >= self.subscriber_ttl_secs {
            return Err(StreamerError::Config(
                "subscriber_refresh_interval_secs must be shorter than subscriber_ttl_secs"
                    .to_string(),
            ));
        }
        if self.target_topic_prefix.trim().is_empty() {
            return Err(StreamerError::Config(
                "target_topic_prefix must not be empty".to_string(),
            ));
        }
        if let Some(node_id) = &self.node_id {
            if node_id.trim().is_empty() {
                return Err(StreamerError::Config("node_id must not be blank".to_string()));
            }
        }
        Ok(())
    }

    /// The configured node id, or a fresh random one.
    pub fn resolve_node_id(&self) -> String {
        self.node_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }

    pub fn target_topic_for(&self, node_id: &str) -> String {
        format!("{}.{node_id}", self.target_topic_prefix)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn inactivity_threshold(&self) -> Duration {
        self.heartbeat_interval() * self.inactivity_multiplier
    }

    pub fn cluster_node_ttl(&self) -> Duration {
        Duration::from_secs(self.cluster_node_ttl_secs)
    }

    pub fn subscriber_ttl(&self) -> Duration {
        Duration::from_secs(self.subscriber_ttl_secs)
    }

    pub fn subscriber_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.subscriber_refresh_interval_secs)
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    pub fn discovery_backoff(&self) -> Duration {
        Duration::from_millis(self.discovery_backoff_ms)
    }
}
