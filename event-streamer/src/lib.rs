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

//! # event-streamer
//!
//! `event-streamer` is the routing core of a real-time event distribution service. It
//! keeps, per workspace, the live subscribers of one process together with a
//! [`query_engine::QueryEngine`] holding their filters, mirrors subscriber changes to the
//! other nodes of the cluster, and resolves the recipients of every ingested event.
//!
//! Transports are out of scope: a WebSocket layer calls [`Subscriptions::subscribe`] on
//! connect and [`Subscriptions::unregister_subscriber`] on disconnect, and fans out
//! whatever the delivery callback passed to [`Subscriptions::start`] receives.
//!
//! ## Quick start
//!
//! ```
//! use event_streamer::{StreamerConfig, SubscribeParams, Subscriptions};
//! use memory_backends::{MemoryBroker, MemoryCache, RuleAccessManager};
//! use query_engine::Event;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let subscriptions = Subscriptions::new(
//!     StreamerConfig::default(),
//!     Arc::new(MemoryBroker::new()),
//!     Arc::new(MemoryCache::new()),
//!     Arc::new(RuleAccessManager::allow_all()),
//! )
//! .await
//! .unwrap();
//!
//! let ingress = subscriptions
//!     .start(|event, subscribers| {
//!         for subscriber in subscribers {
//!             println!("{} -> {}", event.event_type, subscriber.socket_id);
//!         }
//!     })
//!     .unwrap();
//!
//! let handle = subscriptions
//!     .subscribe(
//!         "workspace-1",
//!         SubscribeParams {
//!             user_id: "user-1".to_string(),
//!             session_id: "session-1".to_string(),
//!             socket_id: "socket-1".to_string(),
//!             filters: json!({"types": ["task.created"]}),
//!             ..Default::default()
//!         },
//!     )
//!     .await
//!     .unwrap();
//!
//! let delivered = ingress
//!     .dispatch(Event::new("task.created", "workspace-1"))
//!     .await
//!     .unwrap();
//! assert_eq!(delivered, 1);
//!
//! assert!(handle.unsubscribe().await);
//! let delivered = ingress
//!     .dispatch(Event::new("task.created", "workspace-1"))
//!     .await
//!     .unwrap();
//! assert_eq!(delivered, 0);
//!
//! subscriptions.shutdown().await;
//! # });
//! ```
//!
//! ## Internal architecture map
//!
//! - API facade: `Subscriptions`, subscriber types and handles
//! - Control plane: the subscriber registry and cross-node subscriber sync
//! - Routing: query matching, permission filtering and unknown-socket recovery
//! - Data plane: the ingestion queue and the single delivery loop
//! - Cluster: peer discovery, heartbeats and inactivity eviction
//! - Runtime: background tasks, retries and worker spawning
//!
//! ## Observability model
//!
//! The workspace uses `tracing` for logs/events.
//! Library code emits events/spans and does not initialize a global subscriber.
//! Binaries and tests are responsible for one-time `tracing_subscriber`
//! initialization at process boundaries.

mod api;
pub use api::{
    SubscribeParams, Subscriber, SubscriberHandle, SubscriberRecord, SubscriberUpdate,
    SubscriptionMetrics,
};

pub mod backend;
pub mod cluster;

mod config;
pub use config::StreamerConfig;

mod control_plane;
mod data_plane;
pub use data_plane::push_queue::EventIngress;

mod error;
pub use error::{Result, StreamerError};

#[doc(hidden)]
pub mod observability;
mod routing;
mod runtime;

mod subscriptions;
pub use subscriptions::Subscriptions;
