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

//! Per-dimension query processors.
//!
//! Each processor indexes one filter dimension and answers which registered query ids
//! match an event without looking at any other processor. [`QueryProcessor`] is the
//! dispatch table the engine iterates over.

use crate::error::QueryError;
use crate::event::Event;
use crate::options::QueryParams;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

pub(crate) mod app_instance_depth;
pub(crate) mod payload;
pub(crate) mod text;
pub(crate) mod types;

pub use app_instance_depth::AppInstanceDepthQueryProcessor;
pub use payload::{MatchMethod, PayloadQueryProcessor};
pub use text::TextQueryProcessor;
pub use types::TypesQueryProcessor;

/// Identifier of one logical query; the owning connection's socket id.
pub type QueryId = String;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum QueryType {
    Text,
    Types,
    AppInstanceDepth,
    PayloadQuery,
}

#[derive(Debug)]
pub enum QueryProcessor {
    Text(TextQueryProcessor),
    Types(TypesQueryProcessor),
    AppInstanceDepth(AppInstanceDepthQueryProcessor),
    PayloadQuery(PayloadQueryProcessor),
}

impl QueryProcessor {
    pub fn new(query_type: QueryType) -> Self {
        match query_type {
            QueryType::Text => QueryProcessor::Text(TextQueryProcessor::default()),
            QueryType::Types => QueryProcessor::Types(TypesQueryProcessor::default()),
            QueryType::AppInstanceDepth => {
                QueryProcessor::AppInstanceDepth(AppInstanceDepthQueryProcessor::default())
            }
            QueryType::PayloadQuery => {
                QueryProcessor::PayloadQuery(PayloadQueryProcessor::default())
            }
        }
    }

    pub fn query_type(&self) -> QueryType {
        match self {
            QueryProcessor::Text(_) => QueryType::Text,
            QueryProcessor::Types(_) => QueryType::Types,
            QueryProcessor::AppInstanceDepth(_) => QueryType::AppInstanceDepth,
            QueryProcessor::PayloadQuery(_) => QueryType::PayloadQuery,
        }
    }

    /// Stores `params` under `id`, replacing anything previously stored for it.
    pub fn save_query(&mut self, id: &str, params: &QueryParams) -> Result<(), QueryError> {
        match (self, params) {
            (QueryProcessor::Text(processor), QueryParams::Text(text)) => {
                processor.save_query(id, text)
            }
            (QueryProcessor::Types(processor), QueryParams::Types(types)) => {
                processor.save_query(id, types)
            }
            (QueryProcessor::AppInstanceDepth(processor), QueryParams::AppInstanceDepth(depth)) => {
                processor.save_query(id, *depth)
            }
            (QueryProcessor::PayloadQuery(processor), QueryParams::PayloadQuery(terms)) => {
                processor.save_query(id, terms)
            }
            (processor, params) => {
                return Err(QueryError::ParamsMismatch {
                    processor: processor.query_type(),
                    params: params.query_type(),
                })
            }
        }
        Ok(())
    }

    pub fn remove_query(&mut self, id: &str) -> bool {
        match self {
            QueryProcessor::Text(processor) => processor.remove_query(id),
            QueryProcessor::Types(processor) => processor.remove_query(id),
            QueryProcessor::AppInstanceDepth(processor) => processor.remove_query(id),
            QueryProcessor::PayloadQuery(processor) => processor.remove_query(id),
        }
    }

    /// Distinct query ids whose filter for this dimension accepts `event`.
    pub fn matches(&self, event: &Event) -> Vec<QueryId> {
        match self {
            QueryProcessor::Text(processor) => processor.matches(event),
            QueryProcessor::Types(processor) => processor.matches(event),
            QueryProcessor::AppInstanceDepth(processor) => processor.matches(event),
            QueryProcessor::PayloadQuery(processor) => processor.matches(event),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            QueryProcessor::Text(processor) => processor.is_empty(),
            QueryProcessor::Types(processor) => processor.is_empty(),
            QueryProcessor::AppInstanceDepth(processor) => processor.is_empty(),
            QueryProcessor::PayloadQuery(processor) => processor.is_empty(),
        }
    }
}
