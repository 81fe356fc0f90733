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

//! The single processing loop: one delivery pass per queued event, in arrival order.

use crate::api::Subscriber;
use crate::data_plane::push_queue::QueuedEvent;
use crate::observability::{events, fields};
use crate::routing::delivery_resolution::resolve_recipients;
use crate::subscriptions::SubscriptionsInner;
use query_engine::Event;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::Receiver;
use tracing::{debug, info};

const COMPONENT: &str = "dispatch_worker";

/// Receives each event with the subscribers permitted to see it, possibly none.
pub(crate) type DeliveryCallback = Box<dyn Fn(&Event, &[Arc<Subscriber>]) + Send + Sync>;

pub(crate) async fn dispatch_loop(
    subscriptions: Weak<SubscriptionsInner>,
    mut receiver: Receiver<QueuedEvent>,
    callback: DeliveryCallback,
) {
    info!(
        event = events::DELIVERY_STARTED,
        component = COMPONENT,
        "delivery loop started"
    );

    while let Some(QueuedEvent { event, processed }) = receiver.recv().await {
        let Some(inner) = subscriptions.upgrade() else {
            break;
        };
        let recipients = resolve_recipients(&inner, &event).await;
        drop(inner);

        debug!(
            event = events::DELIVERY_DISPATCHED,
            component = COMPONENT,
            event_ref = %fields::format_event_ref(&event),
            source_socket = %fields::format_source_socket(&event),
            recipients = recipients.len(),
            "delivering event"
        );
        callback(&event, &recipients);

        if let Some(processed) = processed {
            let _ = processed.send(recipients.len());
        }
    }

    info!(
        event = events::DELIVERY_STOPPED,
        component = COMPONENT,
        "delivery loop stopped"
    );
}
