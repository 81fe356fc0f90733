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

//! Bounded exponential backoff for collaborator calls.

use crate::error::Result;
use crate::observability::events;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

const COMPONENT: &str = "retry";

/// Runs `attempt` up to `max_retries + 1` times, doubling the pause after each failure.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    operation: &'static str,
    max_retries: u32,
    initial_backoff: Duration,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut retries = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if retries < max_retries => {
                retries += 1;
                debug!(
                    event = events::RETRY_SCHEDULED,
                    component = COMPONENT,
                    operation,
                    retry = retries,
                    backoff_ms = backoff.as_millis() as u64,
                    err = %err,
                    "retrying after failure"
                );
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::retry_with_backoff;
    use crate::error::StreamerError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let started = Instant::now();

        let value = retry_with_backoff("test", 3, Duration::from_millis(100), || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(StreamerError::cache("get", "unavailable"))
            } else {
                Ok(7)
            }
        })
        .await
        .expect("third attempt succeeds");

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_retry_budget() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<(), _> =
            retry_with_backoff("test", 2, Duration::from_millis(10), || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StreamerError::cache("get", "unavailable"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
