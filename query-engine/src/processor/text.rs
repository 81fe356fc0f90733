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

//! Free-text search over the encoded event.

use crate::event::Event;
use crate::processor::QueryId;
use std::collections::HashMap;

/// Linear in the number of text queries; free text filters are rare.
#[derive(Debug, Default)]
pub struct TextQueryProcessor {
    queries: HashMap<QueryId, String>,
}

impl TextQueryProcessor {
    pub fn save_query(&mut self, id: &str, text: &str) {
        self.queries.insert(id.to_string(), text.to_string());
    }

    pub fn remove_query(&mut self, id: &str) -> bool {
        self.queries.remove(id).is_some()
    }

    pub fn matches(&self, event: &Event) -> Vec<QueryId> {
        if self.queries.is_empty() {
            return Vec::new();
        }

        let haystack = event.search_text();
        self.queries
            .iter()
            .filter(|(_, needle)| haystack.contains(needle.as_str()))
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::TextQueryProcessor;
    use crate::event::Event;
    use serde_json::json;

    #[test]
    fn matches_substrings_anywhere_in_the_event() {
        let mut processor = TextQueryProcessor::default();
        processor.save_query("by-payload", "invoice-42");
        processor.save_query("by-type", "order.created");
        processor.save_query("absent", "refund");

        let mut event = Event::new("order.created", "ws-1");
        event.payload = json!({ "reference": "invoice-42" });

        let mut matched = processor.matches(&event);
        matched.sort();
        assert_eq!(matched, vec!["by-payload".to_string(), "by-type".to_string()]);
    }

    #[test]
    fn resave_replaces_previous_text() {
        let mut processor = TextQueryProcessor::default();
        processor.save_query("q", "alpha");
        processor.save_query("q", "beta");

        let mut event = Event::new("x", "ws-1");
        event.payload = json!({ "name": "alpha" });
        assert!(processor.matches(&event).is_empty());

        assert!(processor.remove_query("q"));
        assert!(!processor.remove_query("q"));
        assert!(processor.is_empty());
    }
}
