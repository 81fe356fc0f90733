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

//! Field formatters for tracing records.

use crate::api::Subscriber;
use query_engine::Event;

pub fn format_subscriber_key(subscriber: &Subscriber) -> String {
    format!("{}/{}", subscriber.workspace_id, subscriber.socket_id)
}

pub fn format_event_ref(event: &Event) -> String {
    format!("{}#{}@{}", event.event_type, event.id, event.workspace_id())
}

pub fn format_source_socket(event: &Event) -> String {
    event
        .source
        .socket_id
        .clone()
        .unwrap_or_else(|| "none".to_string())
}

#[cfg(test)]
mod tests {
    use super::{format_event_ref, format_source_socket};
    use query_engine::Event;

    #[test]
    fn event_reference_includes_type_id_and_workspace() {
        let mut event = Event::new("task.updated", "ws-1");
        event.id = "evt-9".to_string();

        assert_eq!(format_event_ref(&event), "task.updated#evt-9@ws-1");
        assert_eq!(format_source_socket(&event), "none");
    }
}
