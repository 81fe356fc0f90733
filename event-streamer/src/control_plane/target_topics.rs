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

//! Reverse index from a node's delivery topic to the subscribers it owns.

use std::collections::{HashMap, HashSet};

#[derive(Default)]
pub(crate) struct TargetTopics {
    topics: HashMap<String, HashMap<String, HashSet<String>>>,
}

impl TargetTopics {
    pub(crate) fn insert(&mut self, target_topic: &str, workspace_id: &str, socket_id: &str) {
        self.topics
            .entry(target_topic.to_string())
            .or_default()
            .entry(workspace_id.to_string())
            .or_default()
            .insert(socket_id.to_string());
    }

    pub(crate) fn remove(&mut self, target_topic: &str, workspace_id: &str, socket_id: &str) {
        let Some(workspaces) = self.topics.get_mut(target_topic) else {
            return;
        };
        if let Some(sockets) = workspaces.get_mut(workspace_id) {
            sockets.remove(socket_id);
            if sockets.is_empty() {
                workspaces.remove(workspace_id);
            }
        }
        if workspaces.is_empty() {
            self.topics.remove(target_topic);
        }
    }

    /// Detaches every `(workspace, socket)` pair owned by the topic.
    pub(crate) fn take(&mut self, target_topic: &str) -> Vec<(String, String)> {
        self.topics
            .remove(target_topic)
            .into_iter()
            .flat_map(|workspaces| workspaces.into_iter())
            .flat_map(|(workspace_id, sockets)| {
                sockets
                    .into_iter()
                    .map(move |socket_id| (workspace_id.clone(), socket_id))
            })
            .collect()
    }

    pub(crate) fn count(&self, target_topic: &str) -> usize {
        self.topics
            .get(target_topic)
            .map(|workspaces| workspaces.values().map(HashSet::len).sum())
            .unwrap_or(0)
    }
}
