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

//! Bounded ingestion queue between the event pipeline and the delivery loop.

use crate::error::{Result, StreamerError};
use crate::observability::{events, fields};
use query_engine::Event;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

const COMPONENT: &str = "push_queue";

pub(crate) struct QueuedEvent {
    pub(crate) event: Event,
    /// Completed with the recipient count once the callback has run.
    pub(crate) processed: Option<oneshot::Sender<usize>>,
}

/// Producer side of the delivery queue, returned by `Subscriptions::start`.
///
/// Events are delivered in the order they are pushed. Cloning shares the same queue.
#[derive(Clone, Debug)]
pub struct EventIngress {
    sender: mpsc::Sender<QueuedEvent>,
}

pub(crate) fn channel(capacity: usize) -> (EventIngress, mpsc::Receiver<QueuedEvent>) {
    let (sender, receiver) = mpsc::channel(capacity);
    (EventIngress { sender }, receiver)
}

impl EventIngress {
    /// Enqueues one event, waiting for queue capacity but not for delivery.
    pub async fn push(&self, event: Event) -> Result<()> {
        self.enqueue(event, None).await
    }

    /// Enqueues several events, preserving their order.
    pub async fn push_all<I>(&self, events: I) -> Result<()>
    where
        I: IntoIterator<Item = Event>,
    {
        for event in events {
            self.enqueue(event, None).await?;
        }
        Ok(())
    }

    /// Enqueues one event and waits until the delivery callback has run for it.
    /// Returns how many subscribers it was delivered to.
    pub async fn dispatch(&self, event: Event) -> Result<usize> {
        let (processed, done) = oneshot::channel();
        self.enqueue(event, Some(processed)).await?;
        done.await.map_err(|_| StreamerError::Closed)
    }

    async fn enqueue(&self, event: Event, processed: Option<oneshot::Sender<usize>>) -> Result<()> {
        let event_ref = fields::format_event_ref(&event);
        self.sender
            .send(QueuedEvent { event, processed })
            .await
            .map_err(|_| {
                warn!(
                    event = events::DELIVERY_ENQUEUE_FAILED,
                    component = COMPONENT,
                    event_ref = %event_ref,
                    "delivery loop is gone"
                );
                StreamerError::Closed
            })
    }
}

#[cfg(test)]
mod tests {
    use super::channel;
    use crate::error::StreamerError;
    use query_engine::Event;

    #[tokio::test]
    async fn push_preserves_order() {
        let (ingress, mut receiver) = channel(4);
        ingress
            .push_all(["a", "b", "c"].map(|event_type| Event::new(event_type, "ws-1")))
            .await
            .expect("queued");

        for expected in ["a", "b", "c"] {
            let queued = receiver.recv().await.expect("queued event");
            assert_eq!(queued.event.event_type, expected);
            assert!(queued.processed.is_none());
        }
    }

    #[tokio::test]
    async fn closed_queue_is_reported() {
        let (ingress, receiver) = channel(1);
        drop(receiver);

        let result = ingress.push(Event::new("a", "ws-1")).await;
        assert!(matches!(result, Err(StreamerError::Closed)));
    }
}
