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

//! Bounded, memoised recovery of sockets missing from the local registry.

use crate::control_plane::subscriber_sync::rehydrate_workspace;
use crate::observability::events;
use crate::subscriptions::SubscriptionsInner;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const COMPONENT: &str = "recovery";

/// Remembers which `(workspace, socket)` pairs were already looked up.
pub(crate) struct SocketRecovery {
    attempted: Mutex<LruCache<(String, String), ()>>,
    timeout: Duration,
}

impl SocketRecovery {
    pub(crate) fn new(capacity: NonZeroUsize, timeout: Duration) -> Self {
        Self {
            attempted: Mutex::new(LruCache::new(capacity)),
            timeout,
        }
    }

    /// `true` the first time a pair is seen, until it is evicted from the memo.
    pub(crate) async fn first_attempt(&self, workspace_id: &str, socket_id: &str) -> bool {
        let key = (workspace_id.to_string(), socket_id.to_string());
        let mut attempted = self.attempted.lock().await;
        if attempted.get(&key).is_some() {
            return false;
        }
        attempted.put(key, ());
        true
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Rehydrates the workspace once for an unknown socket. Returns whether the socket is
/// known afterwards.
pub(crate) async fn recover_unknown_socket(
    inner: &SubscriptionsInner,
    workspace_id: &str,
    socket_id: &str,
) -> bool {
    if !inner.recovery.first_attempt(workspace_id, socket_id).await {
        return false;
    }

    debug!(
        event = events::DELIVERY_RECOVERY_ATTEMPT,
        component = COMPONENT,
        workspace_id,
        socket_id,
        "unknown source socket; consulting cache"
    );
    let timeout = inner.recovery.timeout();
    match tokio::time::timeout(timeout, rehydrate_workspace(inner, workspace_id)).await {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => warn!(
            event = events::DELIVERY_RECOVERY_FAILED,
            component = COMPONENT,
            workspace_id,
            socket_id,
            err = %err,
            "cache recovery failed"
        ),
        Err(_) => warn!(
            event = events::DELIVERY_RECOVERY_FAILED,
            component = COMPONENT,
            workspace_id,
            socket_id,
            timeout_ms = timeout.as_millis() as u64,
            "cache recovery timed out"
        ),
    }

    let recovered = inner.registry.lock().await.contains(workspace_id, socket_id);
    if !recovered {
        warn!(
            event = events::DELIVERY_RECOVERY_FAILED,
            component = COMPONENT,
            workspace_id,
            socket_id,
            "socket still unknown after recovery"
        );
    }
    recovered
}

#[cfg(test)]
mod tests {
    use super::SocketRecovery;
    use std::num::NonZeroUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn each_pair_is_attempted_once_until_evicted() {
        let capacity = NonZeroUsize::new(2).expect("non-zero");
        let recovery = SocketRecovery::new(capacity, Duration::from_millis(10));

        assert!(recovery.first_attempt("ws-1", "s1").await);
        assert!(!recovery.first_attempt("ws-1", "s1").await);
        assert!(recovery.first_attempt("ws-1", "s2").await);
        assert!(recovery.first_attempt("ws-2", "s1").await);

        // capacity 2: ("ws-1", "s1") was least recently used
        assert!(recovery.first_attempt("ws-1", "s1").await);
    }
}
