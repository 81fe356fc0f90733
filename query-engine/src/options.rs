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

//! Subscription filter options as sent by clients.

use crate::error::QueryError;
use crate::processor::QueryType;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One alternative conjunction of `field: value` constraints.
pub type OrTerm = Map<String, Value>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_instance_depth: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "one_or_many_terms"
    )]
    pub payload_query: Option<Vec<OrTerm>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(OrTerm),
    Many(Vec<OrTerm>),
}

fn one_or_many_terms<'de, D>(deserializer: D) -> Result<Option<Vec<OrTerm>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<OneOrMany>::deserialize(deserializer)?.map(|terms| match terms {
            OneOrMany::One(term) => vec![term],
            OneOrMany::Many(terms) => terms,
        }),
    )
}

/// Parameters for a single processor, tagged by the dimension they belong to.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryParams {
    Text(String),
    Types(Vec<String>),
    AppInstanceDepth(u32),
    PayloadQuery(Vec<OrTerm>),
}

impl QueryParams {
    pub fn query_type(&self) -> QueryType {
        match self {
            QueryParams::Text(_) => QueryType::Text,
            QueryParams::Types(_) => QueryType::Types,
            QueryParams::AppInstanceDepth(_) => QueryType::AppInstanceDepth,
            QueryParams::PayloadQuery(_) => QueryType::PayloadQuery,
        }
    }

    /// The filter used when a client declares no dimension at all.
    pub fn match_all() -> Self {
        QueryParams::PayloadQuery(vec![OrTerm::new()])
    }
}

impl QueryOptions {
    pub fn from_value(value: Value) -> Result<Self, QueryError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Dimensions declared by these options.
    ///
    /// Empty text, an empty type list and an empty OR-term list count as undeclared.
    pub fn declared_params(&self) -> Vec<QueryParams> {
        let mut params = Vec::new();

        if let Some(text) = self.text.as_ref().filter(|text| !text.is_empty()) {
            params.push(QueryParams::Text(text.clone()));
        }
        if let Some(types) = self.types.as_ref().filter(|types| !types.is_empty()) {
            params.push(QueryParams::Types(types.clone()));
        }
        if let Some(depth) = self.app_instance_depth {
            params.push(QueryParams::AppInstanceDepth(depth));
        }
        if let Some(terms) = self.payload_query.as_ref().filter(|terms| !terms.is_empty()) {
            params.push(QueryParams::PayloadQuery(terms.clone()));
        }

        params
    }
}

#[cfg(test)]
mod tests {
    use super::{QueryOptions, QueryParams};
    use serde_json::json;

    #[test]
    fn payload_query_accepts_single_object_or_list() {
        let single = QueryOptions::from_value(json!({ "payloadQuery": { "a": "x" } }))
            .expect("single term parses");
        let many = QueryOptions::from_value(json!({ "payloadQuery": [{ "a": "x" }, {}] }))
            .expect("term list parses");

        assert_eq!(single.payload_query.map(|terms| terms.len()), Some(1));
        assert_eq!(many.payload_query.map(|terms| terms.len()), Some(2));
    }

    #[test]
    fn empty_dimensions_are_not_declared() {
        let options = QueryOptions::from_value(json!({
            "text": "",
            "types": [],
            "payloadQuery": [],
            "appInstanceDepth": 1
        }))
        .expect("options parse");

        assert_eq!(
            options.declared_params(),
            vec![QueryParams::AppInstanceDepth(1)]
        );
    }

    #[test]
    fn malformed_options_are_rejected() {
        assert!(QueryOptions::from_value(json!({ "appInstanceDepth": "deep" })).is_err());
        assert_eq!(
            QueryOptions::from_value(serde_json::Value::Null).expect("null is no filter"),
            QueryOptions::default()
        );
    }
}
