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

use query_engine::QueryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamerError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cache operation `{operation}` failed: {reason}")]
    Cache {
        operation: &'static str,
        reason: String,
    },

    #[error("broker operation `{operation}` failed: {reason}")]
    Broker {
        operation: &'static str,
        reason: String,
    },

    #[error("access resolution failed: {0}")]
    Access(String),

    #[error("invalid subscription filter: {0}")]
    Filter(#[from] QueryError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("event delivery is already started")]
    AlreadyStarted,

    #[error("event ingestion is closed")]
    Closed,
}

impl StreamerError {
    pub fn cache(operation: &'static str, reason: impl ToString) -> Self {
        StreamerError::Cache {
            operation,
            reason: reason.to_string(),
        }
    }

    pub fn broker(operation: &'static str, reason: impl ToString) -> Self {
        StreamerError::Broker {
            operation,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StreamerError>;
