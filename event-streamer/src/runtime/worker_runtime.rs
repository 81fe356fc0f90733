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

//! Runtime boundary for the delivery worker.

use crate::data_plane::dispatch_worker::{dispatch_loop, DeliveryCallback};
use crate::data_plane::push_queue::QueuedEvent;
use crate::subscriptions::SubscriptionsInner;
use std::sync::Weak;
use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;

/// Runs the delivery loop on the current tokio runtime until the queue closes or the
/// owning `Subscriptions` is dropped.
pub(crate) fn spawn_dispatch_loop(
    subscriptions: Weak<SubscriptionsInner>,
    receiver: Receiver<QueuedEvent>,
    callback: DeliveryCallback,
) -> JoinHandle<()> {
    tokio::spawn(dispatch_loop(subscriptions, receiver, callback))
}
