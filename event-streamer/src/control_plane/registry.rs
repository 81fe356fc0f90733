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

//! Subscriber registry: per-workspace subscriber indexes, query engines and the
//! target-topic reverse index, mutated together under one lock.

use crate::api::{Subscriber, SubscriptionMetrics};
use crate::control_plane::target_topics::TargetTopics;
use crate::control_plane::workspace_subscribers::WorkspaceSubscribers;
use query_engine::{Event, QueryEngine, QueryError};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct WorkspaceState {
    subscribers: WorkspaceSubscribers,
    engine: QueryEngine,
}

#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    workspaces: HashMap<String, WorkspaceState>,
    target_topics: TargetTopics,
}

impl SubscriberRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the subscriber stored under its socket id.
    pub(crate) fn set_subscriber(
        &mut self,
        subscriber: Subscriber,
    ) -> Result<Option<Arc<Subscriber>>, QueryError> {
        let workspace_id = subscriber.workspace_id.clone();
        let socket_id = subscriber.socket_id.clone();
        let workspace = self.workspaces.entry(workspace_id.clone()).or_default();

        if let Err(err) = workspace.engine.save_query(&socket_id, &subscriber.filters) {
            if workspace.subscribers.is_empty() {
                self.workspaces.remove(&workspace_id);
            }
            return Err(err);
        }

        let target_topic = subscriber.target_topic.clone();
        let previous = workspace.subscribers.insert(Arc::new(subscriber));
        if let Some(previous) = &previous {
            if previous.target_topic != target_topic {
                self.target_topics
                    .remove(&previous.target_topic, &workspace_id, &socket_id);
            }
        }
        self.target_topics
            .insert(&target_topic, &workspace_id, &socket_id);
        Ok(previous)
    }

    /// Moves a subscriber to a new socket id, or just replaces it when
    /// `previous_socket_id` is absent or unchanged. Any stale holder of the new
    /// socket id is replaced.
    pub(crate) fn replace_subscriber(
        &mut self,
        previous_socket_id: Option<&str>,
        subscriber: Subscriber,
    ) -> Result<Option<Arc<Subscriber>>, QueryError> {
        let renamed_from = previous_socket_id
            .filter(|previous| *previous != subscriber.socket_id)
            .and_then(|previous| self.unset_subscriber(&subscriber.workspace_id, previous));
        let replaced = self.set_subscriber(subscriber)?;
        Ok(renamed_from.or(replaced))
    }

    /// Inserts only when no entry exists for the socket id.
    pub(crate) fn restore_subscriber(&mut self, subscriber: Subscriber) -> Result<bool, QueryError> {
        if self.contains(&subscriber.workspace_id, &subscriber.socket_id) {
            return Ok(false);
        }
        self.set_subscriber(subscriber)?;
        Ok(true)
    }

    pub(crate) fn unset_subscriber(
        &mut self,
        workspace_id: &str,
        socket_id: &str,
    ) -> Option<Arc<Subscriber>> {
        let workspace = self.workspaces.get_mut(workspace_id)?;
        let removed = workspace.subscribers.remove(socket_id)?;
        workspace.engine.remove_query(socket_id);
        if workspace.subscribers.is_empty() {
            self.workspaces.remove(workspace_id);
        }
        self.target_topics
            .remove(&removed.target_topic, workspace_id, socket_id);
        Some(removed)
    }

    /// Removes every subscriber whose connection terminates on `target_topic`.
    pub(crate) fn purge_target_topic(&mut self, target_topic: &str) -> Vec<Arc<Subscriber>> {
        self.target_topics
            .take(target_topic)
            .into_iter()
            .filter_map(|(workspace_id, socket_id)| {
                self.unset_subscriber(&workspace_id, &socket_id)
            })
            .collect()
    }

    pub(crate) fn get(&self, workspace_id: &str, socket_id: &str) -> Option<Arc<Subscriber>> {
        self.workspaces
            .get(workspace_id)
            .and_then(|workspace| workspace.subscribers.get(socket_id))
            .cloned()
    }

    pub(crate) fn contains(&self, workspace_id: &str, socket_id: &str) -> bool {
        self.workspaces
            .get(workspace_id)
            .is_some_and(|workspace| workspace.subscribers.contains(socket_id))
    }

    /// Subscribers in the event's workspace whose stored query matches it.
    pub(crate) fn matching_subscribers(&self, event: &Event) -> Vec<Arc<Subscriber>> {
        let Some(workspace) = self.workspaces.get(event.workspace_id()) else {
            return Vec::new();
        };
        workspace
            .engine
            .matches(event)
            .iter()
            .filter_map(|socket_id| workspace.subscribers.get(socket_id).cloned())
            .collect()
    }

    pub(crate) fn user_sockets(&self, workspace_id: &str, user_id: &str) -> Vec<String> {
        self.workspaces
            .get(workspace_id)
            .map(|workspace| workspace.subscribers.user_sockets(user_id))
            .unwrap_or_default()
    }

    pub(crate) fn local_subscribers(&self) -> Vec<Arc<Subscriber>> {
        self.workspaces
            .values()
            .flat_map(|workspace| workspace.subscribers.iter())
            .filter(|subscriber| subscriber.local)
            .cloned()
            .collect()
    }

    pub(crate) fn target_topic_count(&self, target_topic: &str) -> usize {
        self.target_topics.count(target_topic)
    }

    pub(crate) fn metrics(&self) -> SubscriptionMetrics {
        SubscriptionMetrics {
            workspaces: self.workspaces.len(),
            subscribers: self
                .workspaces
                .values()
                .map(|workspace| workspace.subscribers.len())
                .sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SubscriberRegistry;
    use crate::api::{Subscriber, SubscriberRecord, SubscriptionMetrics};
    use crate::backend::{Action, Permissions, SubjectType};
    use query_engine::{Event, QueryOptions};
    use serde_json::json;
    use std::sync::Arc;

    struct AllowAll;

    impl Permissions for AllowAll {
        fn can(&self, _action: Action, _subject: SubjectType, _resource: &Event) -> bool {
            true
        }
    }

    fn subscriber(socket_id: &str, topic: &str, filters: serde_json::Value) -> Subscriber {
        let record = SubscriberRecord {
            workspace_id: "ws-1".to_string(),
            user_id: "alice".to_string(),
            session_id: "session-1".to_string(),
            socket_id: socket_id.to_string(),
            filters: QueryOptions::from_value(filters).expect("valid filters"),
            permission_rules: Vec::new(),
            target_topic: topic.to_string(),
        };
        Subscriber::from_record(record, Arc::new(AllowAll), topic == "node.a")
    }

    fn matching_sockets(registry: &SubscriberRegistry, event: &Event) -> Vec<String> {
        let mut sockets: Vec<String> = registry
            .matching_subscribers(event)
            .iter()
            .map(|subscriber| subscriber.socket_id.clone())
            .collect();
        sockets.sort();
        sockets
    }

    #[test]
    fn set_replaces_query_and_unset_removes_everything() {
        let mut registry = SubscriberRegistry::new();
        registry
            .set_subscriber(subscriber("s1", "node.a", json!({"types": ["a"]})))
            .expect("saved");
        let event_a = Event::new("a", "ws-1");
        let event_b = Event::new("b", "ws-1");
        assert_eq!(matching_sockets(&registry, &event_a), vec!["s1"]);

        let previous = registry
            .set_subscriber(subscriber("s1", "node.a", json!({"types": ["b"]})))
            .expect("saved");
        assert!(previous.is_some());
        assert!(matching_sockets(&registry, &event_a).is_empty());
        assert_eq!(matching_sockets(&registry, &event_b), vec!["s1"]);

        assert!(registry.unset_subscriber("ws-1", "s1").is_some());
        assert!(registry.unset_subscriber("ws-1", "s1").is_none());
        assert!(matching_sockets(&registry, &event_b).is_empty());
        assert_eq!(registry.metrics(), SubscriptionMetrics::default());
        assert_eq!(registry.target_topic_count("node.a"), 0);
    }

    #[test]
    fn restore_never_overwrites_a_live_entry() {
        let mut registry = SubscriberRegistry::new();
        registry
            .set_subscriber(subscriber("s1", "node.b", json!({"types": ["live"]})))
            .expect("saved");

        let restored = registry
            .restore_subscriber(subscriber("s1", "node.b", json!({"types": ["stale"]})))
            .expect("restore");
        assert!(!restored);
        assert_eq!(
            matching_sockets(&registry, &Event::new("live", "ws-1")),
            vec!["s1"]
        );

        assert!(registry
            .restore_subscriber(subscriber("s2", "node.b", json!(null)))
            .expect("restore"));
        assert_eq!(registry.metrics().subscribers, 2);
    }

    #[test]
    fn replace_moves_the_entry_to_the_new_socket() {
        let mut registry = SubscriberRegistry::new();
        registry
            .set_subscriber(subscriber("old", "node.a", json!(null)))
            .expect("saved");
        registry
            .set_subscriber(subscriber("new", "node.a", json!(null)))
            .expect("saved");

        registry
            .replace_subscriber(Some("new"), subscriber("old", "node.a", json!(null)))
            .expect("renamed");

        assert!(registry.contains("ws-1", "old"));
        assert!(!registry.contains("ws-1", "new"));
        assert_eq!(registry.metrics().subscribers, 1);
        assert_eq!(registry.target_topic_count("node.a"), 1);
        assert_eq!(registry.user_sockets("ws-1", "alice"), vec!["old"]);
    }

    #[test]
    fn purge_removes_only_the_departed_topic() {
        let mut registry = SubscriberRegistry::new();
        registry
            .set_subscriber(subscriber("s1", "node.a", json!(null)))
            .expect("saved");
        registry
            .set_subscriber(subscriber("s2", "node.b", json!(null)))
            .expect("saved");
        registry
            .set_subscriber(subscriber("s3", "node.b", json!(null)))
            .expect("saved");

        let purged = registry.purge_target_topic("node.b");
        assert_eq!(purged.len(), 2);
        assert_eq!(
            matching_sockets(&registry, &Event::new("any", "ws-1")),
            vec!["s1"]
        );
        assert_eq!(registry.local_subscribers().len(), 1);
        assert!(registry.purge_target_topic("node.b").is_empty());
    }

    #[test]
    fn moving_a_subscriber_between_topics_updates_the_reverse_index() {
        let mut registry = SubscriberRegistry::new();
        registry
            .set_subscriber(subscriber("s1", "node.b", json!(null)))
            .expect("saved");
        registry
            .set_subscriber(subscriber("s1", "node.c", json!(null)))
            .expect("saved");

        assert_eq!(registry.target_topic_count("node.b"), 0);
        assert_eq!(registry.target_topic_count("node.c"), 1);
    }
}
