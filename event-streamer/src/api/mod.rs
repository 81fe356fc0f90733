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

//! API facade layer.
//!
//! Types the transport layer exchanges with [`crate::Subscriptions`]: subscription
//! parameters, the per-connection [`Subscriber`] and the [`SubscriberHandle`] returned
//! by `subscribe()`.

mod handle;
mod subscriber;

pub use handle::SubscriberHandle;
pub use subscriber::{
    SubscribeParams, Subscriber, SubscriberRecord, SubscriberUpdate, SubscriptionMetrics,
};
