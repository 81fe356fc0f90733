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

//! Event-type lists, expressed as a payload constraint on the `type` field.

use crate::event::Event;
use crate::options::OrTerm;
use crate::processor::payload::PayloadQueryProcessor;
use crate::processor::QueryId;
use serde_json::Value;

const TYPE_FIELD: &str = "type";

#[derive(Debug, Default)]
pub struct TypesQueryProcessor {
    inner: PayloadQueryProcessor,
}

impl TypesQueryProcessor {
    pub fn save_query(&mut self, id: &str, types: &[String]) {
        let mut term = OrTerm::new();
        term.insert(
            TYPE_FIELD.to_string(),
            Value::Array(types.iter().cloned().map(Value::String).collect()),
        );
        self.inner.save_query(id, &[term]);
    }

    pub fn remove_query(&mut self, id: &str) -> bool {
        self.inner.remove_query(id)
    }

    pub fn matches(&self, event: &Event) -> Vec<QueryId> {
        self.inner.matches(event)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
