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

use crate::processor::QueryType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("invalid query options: {0}")]
    InvalidOptions(#[from] serde_json::Error),

    #[error("{processor} processor cannot store {params} parameters")]
    ParamsMismatch {
        processor: QueryType,
        params: QueryType,
    },
}
