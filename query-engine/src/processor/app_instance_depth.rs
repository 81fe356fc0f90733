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

//! Application nesting-depth ceiling per query.

use crate::event::Event;
use crate::processor::QueryId;

/// `(query, max_depth)` pairs kept sorted by descending `max_depth`.
#[derive(Debug, Default)]
pub struct AppInstanceDepthQueryProcessor {
    thresholds: Vec<(QueryId, u32)>,
}

impl AppInstanceDepthQueryProcessor {
    pub fn save_query(&mut self, id: &str, max_depth: u32) {
        self.remove_query(id);
        let position = self
            .thresholds
            .partition_point(|(_, threshold)| *threshold >= max_depth);
        self.thresholds.insert(position, (id.to_string(), max_depth));
    }

    pub fn remove_query(&mut self, id: &str) -> bool {
        match self.thresholds.iter().position(|(query_id, _)| query_id == id) {
            Some(position) => {
                self.thresholds.remove(position);
                true
            }
            None => false,
        }
    }

    /// Events without a depth come from the platform root and pass every ceiling.
    pub fn matches(&self, event: &Event) -> Vec<QueryId> {
        match event.source.app_instance_depth {
            None => self.thresholds.iter().map(|(id, _)| id.clone()).collect(),
            Some(depth) => self
                .thresholds
                .iter()
                .take_while(|(_, threshold)| *threshold >= depth)
                .map(|(id, _)| id.clone())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }
}
