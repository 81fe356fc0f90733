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

//! Resolves the subscribers that receive one event.

use crate::api::Subscriber;
use crate::observability::{events, fields};
use crate::routing::recovery::recover_unknown_socket;
use crate::subscriptions::SubscriptionsInner;
use query_engine::Event;
use std::sync::Arc;
use tracing::trace;

const COMPONENT: &str = "delivery_resolution";

pub(crate) async fn resolve_recipients(
    inner: &SubscriptionsInner,
    event: &Event,
) -> Vec<Arc<Subscriber>> {
    if let Some(socket_id) = event.source.socket_id.as_deref() {
        let known = inner
            .registry
            .lock()
            .await
            .contains(event.workspace_id(), socket_id);
        if !known {
            recover_unknown_socket(inner, event.workspace_id(), socket_id).await;
        }
    }

    let candidates = inner.registry.lock().await.matching_subscribers(event);
    filter_readable(candidates, event)
}

pub(crate) fn filter_readable(
    candidates: Vec<Arc<Subscriber>>,
    event: &Event,
) -> Vec<Arc<Subscriber>> {
    candidates
        .into_iter()
        .filter(|subscriber| {
            let permitted = subscriber.can_read(event);
            if !permitted {
                trace!(
                    event = events::DELIVERY_PERMISSION_DENIED,
                    component = COMPONENT,
                    subscriber = %fields::format_subscriber_key(subscriber),
                    event_ref = %fields::format_event_ref(event),
                    "subscriber may not read event"
                );
            }
            permitted
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::filter_readable;
    use crate::api::{Subscriber, SubscriberRecord};
    use crate::backend::{Action, Permissions, SubjectType};
    use query_engine::Event;
    use std::sync::Arc;

    struct ReadTypes(&'static [&'static str]);

    impl Permissions for ReadTypes {
        fn can(&self, action: Action, subject: SubjectType, resource: &Event) -> bool {
            action == Action::Read
                && subject == SubjectType::Event
                && self.0.contains(&resource.event_type.as_str())
        }
    }

    fn subscriber(socket_id: &str, readable: &'static [&'static str]) -> Arc<Subscriber> {
        let record = SubscriberRecord {
            workspace_id: "ws-1".to_string(),
            user_id: "alice".to_string(),
            session_id: "session-1".to_string(),
            socket_id: socket_id.to_string(),
            filters: Default::default(),
            permission_rules: Vec::new(),
            target_topic: "streamer-node.a".to_string(),
        };
        Arc::new(Subscriber::from_record(
            record,
            Arc::new(ReadTypes(readable)),
            true,
        ))
    }

    #[test]
    fn denied_subscribers_are_skipped_silently() {
        let event = Event::new("invoice.paid", "ws-1");
        let candidates = vec![
            subscriber("s1", &["invoice.paid"]),
            subscriber("s2", &["task.created"]),
        ];

        let readable = filter_readable(candidates, &event);

        assert_eq!(readable.len(), 1);
        assert_eq!(readable[0].socket_id, "s1");
    }
}
