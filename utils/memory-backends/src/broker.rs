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

use async_trait::async_trait;
use event_streamer::backend::{
    Broker, BrokerEventType, BrokerHandler, BrokerMessage, DeliveryOptions, MessageSource,
    SubscribeOptions,
};
use event_streamer::{Result, StreamerError};
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::trace;

type HandlerTable = Mutex<HashMap<BrokerEventType, Vec<Arc<dyn BrokerHandler>>>>;

/// Broker delivering every message before `send` returns.
///
/// Fan-out handlers all receive a message, then one member of the event type's consumer
/// group does: the member picked by hashing the partition key, or the earliest
/// registered one when no key is given.
#[derive(Default)]
pub struct MemoryBroker {
    fan_out: HandlerTable,
    groups: HandlerTable,
    offline: AtomicBool,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails, like a broker connection that dropped.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self, operation: &'static str) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StreamerError::broker(operation, "broker is offline"));
        }
        Ok(())
    }

    async fn group_consumer(
        &self,
        event_type: BrokerEventType,
        partition_key: Option<&str>,
    ) -> Option<Arc<dyn BrokerHandler>> {
        let groups = self.groups.lock().await;
        let members = groups.get(&event_type).filter(|members| !members.is_empty())?;
        let index = match partition_key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() % members.len() as u64) as usize
            }
            None => 0,
        };
        members.get(index).cloned()
    }
}

fn same_handler(left: &Arc<dyn BrokerHandler>, right: &Arc<dyn BrokerHandler>) -> bool {
    Arc::as_ptr(left) as *const () == Arc::as_ptr(right) as *const ()
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn on(
        &self,
        event_types: &[BrokerEventType],
        handler: Arc<dyn BrokerHandler>,
        options: SubscribeOptions,
    ) -> Result<()> {
        self.ensure_online("on")?;
        let table = if options.group_partitions {
            &self.groups
        } else {
            &self.fan_out
        };
        let mut table = table.lock().await;
        for event_type in event_types {
            table.entry(*event_type).or_default().push(handler.clone());
        }
        Ok(())
    }

    async fn off(
        &self,
        event_types: &[BrokerEventType],
        handler: &Arc<dyn BrokerHandler>,
    ) -> Result<()> {
        for table in [&self.fan_out, &self.groups] {
            let mut table = table.lock().await;
            for event_type in event_types {
                if let Some(handlers) = table.get_mut(event_type) {
                    handlers.retain(|registered| !same_handler(registered, handler));
                }
            }
        }
        Ok(())
    }

    async fn send(
        &self,
        event_type: BrokerEventType,
        payload: Value,
        source: MessageSource,
        options: DeliveryOptions,
    ) -> Result<()> {
        self.ensure_online("send")?;
        let message = BrokerMessage {
            event_type,
            payload,
            source,
        };

        let fan_out = self
            .fan_out
            .lock()
            .await
            .get(&event_type)
            .cloned()
            .unwrap_or_default();
        trace!(
            broker_event = %event_type,
            handlers = fan_out.len(),
            "memory broker delivering"
        );
        for handler in fan_out {
            handler.on_message(message.clone()).await;
        }

        if let Some(consumer) = self
            .group_consumer(event_type, options.partition_key.as_deref())
            .await
        {
            consumer.on_message(message).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryBroker;
    use async_trait::async_trait;
    use event_streamer::backend::{
        Broker, BrokerEventType, BrokerHandler, BrokerMessage, DeliveryOptions, MessageSource,
        SubscribeOptions,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counter(AtomicUsize);

    #[async_trait]
    impl BrokerHandler for Counter {
        async fn on_message(&self, _message: BrokerMessage) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Counter {
        fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    async fn ping(broker: &MemoryBroker) {
        broker
            .send(
                BrokerEventType::ClusterNodePing,
                json!({}),
                MessageSource::default(),
                DeliveryOptions::default(),
            )
            .await
            .expect("sent");
    }

    #[tokio::test]
    async fn fan_out_reaches_everyone_and_groups_reach_one() {
        let broker = MemoryBroker::new();
        let fan_out = [Arc::new(Counter::default()), Arc::new(Counter::default())];
        let grouped = [Arc::new(Counter::default()), Arc::new(Counter::default())];
        for counter in &fan_out {
            broker
                .on(
                    &[BrokerEventType::ClusterNodePing],
                    counter.clone(),
                    SubscribeOptions::fan_out(),
                )
                .await
                .expect("registered");
        }
        for counter in &grouped {
            broker
                .on(
                    &[BrokerEventType::ClusterNodePing],
                    counter.clone(),
                    SubscribeOptions::grouped(),
                )
                .await
                .expect("registered");
        }

        ping(&broker).await;
        ping(&broker).await;

        assert_eq!(fan_out[0].count(), 2);
        assert_eq!(fan_out[1].count(), 2);
        assert_eq!(grouped[0].count() + grouped[1].count(), 2);
        assert_eq!(grouped[0].count(), 2);
    }

    #[tokio::test]
    async fn removed_group_member_hands_over_to_the_next() {
        let broker = MemoryBroker::new();
        let first = Arc::new(Counter::default());
        let second = Arc::new(Counter::default());
        let first_handler: Arc<dyn BrokerHandler> = first.clone();
        let second_handler: Arc<dyn BrokerHandler> = second.clone();
        for handler in [first_handler.clone(), second_handler] {
            broker
                .on(
                    &[BrokerEventType::ClusterNodePing],
                    handler,
                    SubscribeOptions::grouped(),
                )
                .await
                .expect("registered");
        }

        broker
            .off(&[BrokerEventType::ClusterNodePing], &first_handler)
            .await
            .expect("removed");
        ping(&broker).await;

        assert_eq!(first.count(), 0);
        assert_eq!(second.count(), 1);
    }

    #[tokio::test]
    async fn offline_broker_rejects_sends() {
        let broker = MemoryBroker::new();
        broker.set_offline(true);

        let result = broker
            .send(
                BrokerEventType::SubscriberLeft,
                json!({}),
                MessageSource::default(),
                DeliveryOptions::default(),
            )
            .await;
        assert!(result.is_err());
    }
}
