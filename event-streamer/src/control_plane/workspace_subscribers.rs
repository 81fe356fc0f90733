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

//! Per-workspace subscriber index keyed by socket id, with a secondary user index.

use crate::api::Subscriber;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Default)]
pub(crate) struct WorkspaceSubscribers {
    by_socket: HashMap<String, Arc<Subscriber>>,
    by_user: HashMap<String, HashSet<String>>,
}

impl WorkspaceSubscribers {
    /// Returns the entry previously stored under the same socket id.
    pub(crate) fn insert(&mut self, subscriber: Arc<Subscriber>) -> Option<Arc<Subscriber>> {
        let socket_id = subscriber.socket_id.clone();
        self.by_user
            .entry(subscriber.user_id.clone())
            .or_default()
            .insert(socket_id.clone());

        let previous = self.by_socket.insert(socket_id.clone(), subscriber.clone());
        if let Some(previous) = &previous {
            if previous.user_id != subscriber.user_id {
                self.forget_user_socket(&previous.user_id, &socket_id);
            }
        }
        previous
    }

    pub(crate) fn remove(&mut self, socket_id: &str) -> Option<Arc<Subscriber>> {
        let removed = self.by_socket.remove(socket_id)?;
        self.forget_user_socket(&removed.user_id, socket_id);
        Some(removed)
    }

    pub(crate) fn get(&self, socket_id: &str) -> Option<&Arc<Subscriber>> {
        self.by_socket.get(socket_id)
    }

    pub(crate) fn contains(&self, socket_id: &str) -> bool {
        self.by_socket.contains_key(socket_id)
    }

    pub(crate) fn user_sockets(&self, user_id: &str) -> Vec<String> {
        let mut sockets: Vec<String> = self
            .by_user
            .get(user_id)
            .map(|sockets| sockets.iter().cloned().collect())
            .unwrap_or_default();
        sockets.sort();
        sockets
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<Subscriber>> {
        self.by_socket.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_socket.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_socket.is_empty()
    }

    fn forget_user_socket(&mut self, user_id: &str, socket_id: &str) {
        if let Some(sockets) = self.by_user.get_mut(user_id) {
            sockets.remove(socket_id);
            if sockets.is_empty() {
                self.by_user.remove(user_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::WorkspaceSubscribers;
    use crate::api::{Subscriber, SubscriberRecord};
    use crate::backend::{Action, Permissions, SubjectType};
    use query_engine::Event;
    use std::sync::Arc;

    struct AllowAll;

    impl Permissions for AllowAll {
        fn can(&self, _action: Action, _subject: SubjectType, _resource: &Event) -> bool {
            true
        }
    }

    fn subscriber(user_id: &str, socket_id: &str) -> Arc<Subscriber> {
        let record = SubscriberRecord {
            workspace_id: "ws-1".to_string(),
            user_id: user_id.to_string(),
            session_id: "session-1".to_string(),
            socket_id: socket_id.to_string(),
            filters: Default::default(),
            permission_rules: Vec::new(),
            target_topic: "streamer-node.a".to_string(),
        };
        Arc::new(Subscriber::from_record(record, Arc::new(AllowAll), true))
    }

    #[test]
    fn user_index_follows_socket_index() {
        let mut subscribers = WorkspaceSubscribers::default();
        subscribers.insert(subscriber("alice", "s1"));
        subscribers.insert(subscriber("alice", "s2"));
        subscribers.insert(subscriber("bob", "s3"));

        assert_eq!(subscribers.user_sockets("alice"), vec!["s1", "s2"]);

        subscribers.remove("s1");
        assert_eq!(subscribers.user_sockets("alice"), vec!["s2"]);

        // the same socket now belongs to another user
        let previous = subscribers.insert(subscriber("bob", "s2"));
        assert_eq!(previous.map(|p| p.user_id.clone()), Some("alice".to_string()));
        assert!(subscribers.user_sockets("alice").is_empty());
        assert_eq!(subscribers.user_sockets("bob"), vec!["s2", "s3"]);
        assert_eq!(subscribers.len(), 2);
    }
}
