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

//! Collaborator boundaries: the broker, the shared cache and the access manager.
//!
//! The routing core only ever talks to these traits. Production deployments plug in
//! networked implementations; `memory-backends` provides in-process ones.

pub mod access;
pub mod broker;
pub mod cache;

pub use access::{
    AccessManager, AccessRequest, Action, PermissionRule, Permissions, ResolvedAccess,
    SubjectType,
};
pub use broker::{
    Broker, BrokerEventType, BrokerHandler, BrokerMessage, DeliveryOptions, MessageSource,
    SubscribeOptions,
};
pub use cache::SubscriberCache;
