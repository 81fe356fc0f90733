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

//! Multi-dimension query engine: AND across processors.

use crate::error::QueryError;
use crate::event::Event;
use crate::options::{QueryOptions, QueryParams};
use crate::processor::{QueryId, QueryProcessor, QueryType};
use std::collections::HashMap;
use strum::IntoEnumIterator;
use tracing::trace;

/// Owns one processor per [`QueryType`] and the dimensions each query uses.
#[derive(Debug)]
pub struct QueryEngine {
    processors: HashMap<QueryType, QueryProcessor>,
    registrations: HashMap<QueryId, Vec<QueryType>>,
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryEngine {
    pub fn new() -> Self {
        Self {
            processors: QueryType::iter()
                .map(|query_type| (query_type, QueryProcessor::new(query_type)))
                .collect(),
            registrations: HashMap::new(),
        }
    }

    /// Registers `options` under `id`, replacing any previous registration.
    ///
    /// Options that declare no dimension receive every event.
    pub fn save_query(&mut self, id: &str, options: &QueryOptions) -> Result<(), QueryError> {
        let mut params = options.declared_params();
        if params.is_empty() {
            params.push(QueryParams::match_all());
        }
        let query_types: Vec<QueryType> = params.iter().map(QueryParams::query_type).collect();

        if let Some(previous) = self.registrations.remove(id) {
            for stale in previous
                .iter()
                .filter(|query_type| !query_types.contains(query_type))
            {
                if let Some(processor) = self.processors.get_mut(stale) {
                    processor.remove_query(id);
                }
            }
        }

        for param in &params {
            if let Some(processor) = self.processors.get_mut(&param.query_type()) {
                processor.save_query(id, param)?;
            }
        }

        trace!(query_id = id, dimensions = ?query_types, "saved query");
        self.registrations.insert(id.to_string(), query_types);
        Ok(())
    }

    pub fn remove_query(&mut self, id: &str) -> bool {
        let Some(query_types) = self.registrations.remove(id) else {
            return false;
        };
        for query_type in &query_types {
            if let Some(processor) = self.processors.get_mut(query_type) {
                processor.remove_query(id);
            }
        }
        true
    }

    /// Ids of queries whose every registered dimension accepts `event`.
    pub fn matches(&self, event: &Event) -> Vec<QueryId> {
        let mut tallies: HashMap<QueryId, usize> = HashMap::new();

        for processor in self.processors.values() {
            if processor.is_empty() {
                continue;
            }
            for id in processor.matches(event) {
                *tallies.entry(id).or_default() += 1;
            }
        }

        tallies
            .into_iter()
            .filter(|(id, tally)| {
                self.registrations
                    .get(id)
                    .map_or(false, |query_types| query_types.len() == *tally)
            })
            .map(|(id, _)| id)
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.registrations.contains_key(id)
    }

    pub fn dimensions(&self, id: &str) -> Option<&[QueryType]> {
        self.registrations.get(id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::QueryEngine;
    use crate::event::Event;
    use crate::options::QueryOptions;
    use crate::processor::QueryType;
    use serde_json::json;

    fn options(value: serde_json::Value) -> QueryOptions {
        QueryOptions::from_value(value).expect("valid options")
    }

    fn sorted(mut ids: Vec<String>) -> Vec<String> {
        ids.sort();
        ids
    }

    #[test]
    fn no_dimension_means_receive_everything() {
        let mut engine = QueryEngine::new();
        engine
            .save_query("all", &QueryOptions::default())
            .expect("saved");

        assert_eq!(
            engine.dimensions("all"),
            Some(&[QueryType::PayloadQuery][..])
        );
        assert_eq!(engine.matches(&Event::new("anything", "ws-1")), vec!["all"]);
    }

    #[test]
    fn dimensions_are_combined_with_and() {
        let mut engine = QueryEngine::new();
        engine
            .save_query(
                "q",
                &options(json!({
                    "types": ["task.updated"],
                    "appInstanceDepth": 1,
                    "payloadQuery": { "payload.status": "done" }
                })),
            )
            .expect("saved");

        let mut event = Event::new("task.updated", "ws-1");
        event.payload = json!({ "status": "done" });
        event.source.app_instance_depth = Some(1);
        assert_eq!(engine.matches(&event), vec!["q"]);

        event.source.app_instance_depth = Some(2);
        assert!(engine.matches(&event).is_empty());

        event.source.app_instance_depth = None;
        event.event_type = "task.created".to_string();
        assert!(engine.matches(&event).is_empty());
    }

    #[test]
    fn resave_clears_dimensions_no_longer_declared() {
        let mut engine = QueryEngine::new();
        engine
            .save_query("q", &options(json!({ "text": "needle" })))
            .expect("saved");
        engine
            .save_query("q", &options(json!({ "types": ["task.updated"] })))
            .expect("resaved");

        let mut needle_only = Event::new("task.created", "ws-1");
        needle_only.payload = json!({ "note": "needle" });
        assert!(engine.matches(&needle_only).is_empty());

        assert_eq!(
            engine.matches(&Event::new("task.updated", "ws-1")),
            vec!["q"]
        );
        assert_eq!(engine.dimensions("q"), Some(&[QueryType::Types][..]));
    }

    #[test]
    fn remove_query_forgets_every_dimension() {
        let mut engine = QueryEngine::new();
        engine
            .save_query("a", &options(json!({ "text": "x", "appInstanceDepth": 0 })))
            .expect("saved");
        engine.save_query("b", &QueryOptions::default()).expect("saved");

        assert!(engine.remove_query("a"));
        assert!(!engine.remove_query("a"));
        assert_eq!(engine.len(), 1);

        let mut event = Event::new("x", "ws-1");
        event.payload = json!("x");
        assert_eq!(sorted(engine.matches(&event)), vec!["b"]);
    }

    #[test]
    fn wildcard_query_matches_alongside_selective_ones() {
        let mut engine = QueryEngine::new();
        engine
            .save_query("wild", &options(json!({ "payloadQuery": [{ "payload.a": 1 }, {}] })))
            .expect("saved");
        engine
            .save_query("picky", &options(json!({ "payloadQuery": { "payload.a": 2 } })))
            .expect("saved");

        let mut event = Event::new("x", "ws-1");
        event.payload = json!({ "a": 2 });
        assert_eq!(sorted(engine.matches(&event)), vec!["picky", "wild"]);

        event.payload = json!({ "a": 3 });
        assert_eq!(engine.matches(&event), vec!["wild"]);
    }
}
