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

//! Fire-and-forget helpers whose failures are logged and never surfaced.

use crate::error::Result;
use crate::observability::events;
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::warn;

const COMPONENT: &str = "background";

pub(crate) fn log_failure(task: &'static str, result: Result<()>) {
    if let Err(err) = result {
        warn!(
            event = events::BACKGROUND_TASK_FAILED,
            component = COMPONENT,
            task,
            err = %err,
            "background task failed"
        );
    }
}

pub(crate) fn spawn_logged<F>(task: &'static str, future: F) -> JoinHandle<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move { log_failure(task, future.await) })
}

#[cfg(test)]
mod tests {
    use super::spawn_logged;
    use crate::error::StreamerError;

    #[tokio::test]
    async fn failures_do_not_escape_the_task() {
        let handle = spawn_logged("test", async { Err(StreamerError::Closed) });
        assert!(handle.await.is_ok());
    }
}
