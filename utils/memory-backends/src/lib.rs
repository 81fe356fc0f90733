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

//! In-process implementations of the event-streamer collaborator traits.
//!
//! Several `Subscriptions` instances sharing one [`MemoryBroker`] and one [`MemoryCache`]
//! behave like the nodes of a cluster, which is how the integration tests exercise
//! cross-node synchronization and membership. Single-process deployments can use them
//! directly.

mod access;
mod broker;
mod cache;

pub use access::{RuleAccessManager, RulePermissions};
pub use broker::MemoryBroker;
pub use cache::MemoryCache;
