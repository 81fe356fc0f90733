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

//! # query-engine
//!
//! Indexed matching of platform events against many live subscription filters.
//!
//! A filter ([`QueryOptions`]) may constrain several dimensions: free text, event types,
//! the application nesting depth and structured payload predicates. The
//! [`QueryEngine`] splits each filter across one processor per dimension and reports a
//! query as matching only when every dimension it declared matches.
//!
//! ```
//! use query_engine::{Event, QueryEngine, QueryOptions};
//! use serde_json::json;
//!
//! let mut engine = QueryEngine::new();
//! let options = QueryOptions::from_value(json!({
//!     "types": ["task.*"],
//!     "payloadQuery": [{ "payload.status": "done" }, { "payload.priority": "high" }]
//! }))
//! .unwrap();
//! engine.save_query("socket-1", &options).unwrap();
//!
//! let mut event = Event::new("task.updated", "workspace-1");
//! event.payload = json!({ "priority": "high" });
//! assert_eq!(engine.matches(&event), vec!["socket-1".to_string()]);
//! ```

mod engine;
mod error;
mod event;
mod options;
pub mod processor;

pub use engine::QueryEngine;
pub use error::QueryError;
pub use event::{
    Event, EventSource, EventTarget, FieldPath, FieldRef, ScalarKey, SourceField, TargetField,
};
pub use options::{OrTerm, QueryOptions, QueryParams};
pub use processor::{QueryId, QueryType};
