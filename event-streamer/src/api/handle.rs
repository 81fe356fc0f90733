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

use crate::subscriptions::SubscriptionsInner;
use std::sync::Weak;

/// Returned by `subscribe()`; identifies one connection's subscription.
///
/// The socket id follows successful `update_local_subscriber` renames.
#[derive(Debug)]
pub struct SubscriberHandle {
    workspace_id: String,
    session_id: String,
    pub(crate) socket_id: String,
    connection: u64,
    subscriptions: Weak<SubscriptionsInner>,
}

impl SubscriberHandle {
    pub(crate) fn new(
        workspace_id: &str,
        session_id: &str,
        socket_id: &str,
        connection: u64,
        subscriptions: Weak<SubscriptionsInner>,
    ) -> Self {
        Self {
            workspace_id: workspace_id.to_string(),
            session_id: session_id.to_string(),
            socket_id: socket_id.to_string(),
            connection,
            subscriptions,
        }
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn socket_id(&self) -> &str {
        &self.socket_id
    }

    pub(crate) fn connection(&self) -> u64 {
        self.connection
    }

    /// Stops local delivery before returning; cluster cleanup continues in the background.
    ///
    /// Returns `false` when another connection has since taken over this socket id; that
    /// connection's subscription is left in place.
    pub async fn unsubscribe(&self) -> bool {
        match self.subscriptions.upgrade() {
            Some(subscriptions) => {
                subscriptions
                    .unregister_subscriber(
                        &self.workspace_id,
                        &self.socket_id,
                        Some(self.connection),
                    )
                    .await
            }
            None => false,
        }
    }
}
