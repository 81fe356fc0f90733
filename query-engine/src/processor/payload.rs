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

//! Structured payload predicates with an inverted field index.
//!
//! A query is a list of OR-terms. Each non-empty OR-term becomes a sub-query
//! `{id}_{index}` and each of its `field: value` constraints is filed under
//! `field -> match method -> value`. At match time every indexed field is read once
//! from the event; a sub-query is fulfilled when all of its fields matched, and a query
//! matches when any of its sub-queries is fulfilled. An empty OR-term matches anything.

use crate::event::{Event, FieldPath, FieldRef, ScalarKey};
use crate::options::OrTerm;
use crate::processor::QueryId;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};
use tracing::{debug, trace};

const SESSION_ID_FIELD: &str = "source.sessionId";
const SOCKET_ID_FIELD: &str = "source.socketId";
const WILDCARD: &str = "*";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatchMethod {
    Exact,
    StartsWith,
    EndsWith,
    Wildcard,
    Empty,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct SubQueryId {
    query_id: QueryId,
    term: usize,
}

impl Display for SubQueryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.query_id, self.term)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Constraint {
    Empty,
    Wildcard,
    Exact(ScalarKey),
    StartsWith(String),
    EndsWith(String),
}

impl Constraint {
    /// Infers the match method from the declared value; arrays fan out per element.
    fn infer(value: &Value) -> Vec<Constraint> {
        match value {
            Value::Null => vec![Constraint::Empty],
            Value::String(text) if text.is_empty() => vec![Constraint::Empty],
            Value::String(text) if text == WILDCARD => vec![Constraint::Wildcard],
            Value::String(text) => {
                if let Some(suffix) = text.strip_prefix('*') {
                    vec![Constraint::EndsWith(suffix.to_string())]
                } else if let Some(prefix) = text.strip_suffix('*') {
                    vec![Constraint::StartsWith(prefix.to_string())]
                } else {
                    vec![Constraint::Exact(ScalarKey::Str(text.clone()))]
                }
            }
            Value::Array(items) => items.iter().flat_map(Constraint::infer).collect(),
            Value::Number(_) | Value::Bool(_) => ScalarKey::from_value(value)
                .map(Constraint::Exact)
                .into_iter()
                .collect(),
            Value::Object(_) => Vec::new(),
        }
    }

    fn method(&self) -> MatchMethod {
        match self {
            Constraint::Empty => MatchMethod::Empty,
            Constraint::Wildcard => MatchMethod::Wildcard,
            Constraint::Exact(_) => MatchMethod::Exact,
            Constraint::StartsWith(_) => MatchMethod::StartsWith,
            Constraint::EndsWith(_) => MatchMethod::EndsWith,
        }
    }
}

/// Sub-queries registered under one `(field, method, value)` slot.
#[derive(Debug, Default)]
struct FieldMatch {
    query_ids: HashSet<SubQueryId>,
}

impl FieldMatch {
    fn insert(&mut self, sub_query: &SubQueryId) {
        self.query_ids.insert(sub_query.clone());
    }

    /// Returns `true` when the slot became empty.
    fn remove(&mut self, sub_query: &SubQueryId) -> bool {
        self.query_ids.remove(sub_query);
        self.query_ids.is_empty()
    }
}

fn remove_keyed<K: Eq + std::hash::Hash>(
    slots: &mut HashMap<K, FieldMatch>,
    key: &K,
    sub_query: &SubQueryId,
) {
    if slots.get_mut(key).map_or(false, |slot| slot.remove(sub_query)) {
        slots.remove(key);
    }
}

#[derive(Debug)]
struct FieldIndex {
    path: FieldPath,
    empty: FieldMatch,
    wildcard: FieldMatch,
    exact: HashMap<ScalarKey, FieldMatch>,
    starts_with: HashMap<String, FieldMatch>,
    ends_with: HashMap<String, FieldMatch>,
}

impl FieldIndex {
    fn new(path: FieldPath) -> Self {
        Self {
            path,
            empty: FieldMatch::default(),
            wildcard: FieldMatch::default(),
            exact: HashMap::new(),
            starts_with: HashMap::new(),
            ends_with: HashMap::new(),
        }
    }

    fn insert(&mut self, constraint: &Constraint, sub_query: &SubQueryId) {
        match constraint {
            Constraint::Empty => self.empty.insert(sub_query),
            Constraint::Wildcard => self.wildcard.insert(sub_query),
            Constraint::Exact(key) => self.exact.entry(key.clone()).or_default().insert(sub_query),
            Constraint::StartsWith(prefix) => self
                .starts_with
                .entry(prefix.clone())
                .or_default()
                .insert(sub_query),
            Constraint::EndsWith(suffix) => self
                .ends_with
                .entry(suffix.clone())
                .or_default()
                .insert(sub_query),
        }
    }

    fn remove(&mut self, constraint: &Constraint, sub_query: &SubQueryId) {
        match constraint {
            Constraint::Empty => {
                self.empty.remove(sub_query);
            }
            Constraint::Wildcard => {
                self.wildcard.remove(sub_query);
            }
            Constraint::Exact(key) => remove_keyed(&mut self.exact, key, sub_query),
            Constraint::StartsWith(prefix) => remove_keyed(&mut self.starts_with, prefix, sub_query),
            Constraint::EndsWith(suffix) => remove_keyed(&mut self.ends_with, suffix, sub_query),
        }
    }

    fn is_empty(&self) -> bool {
        self.empty.query_ids.is_empty()
            && self.wildcard.query_ids.is_empty()
            && self.exact.is_empty()
            && self.starts_with.is_empty()
            && self.ends_with.is_empty()
    }

    /// Collects every sub-query this field's value satisfies.
    fn collect_matches<'a>(&'a self, value: Option<FieldRef<'_>>, out: &mut HashSet<&'a SubQueryId>) {
        let truthy = value.as_ref().map_or(false, FieldRef::is_truthy);
        if truthy {
            out.extend(self.wildcard.query_ids.iter());
        } else {
            out.extend(self.empty.query_ids.iter());
        }

        let Some(value) = value else {
            return;
        };

        if let Some(slot) = value.key().and_then(|key| self.exact.get(&key)) {
            out.extend(slot.query_ids.iter());
        }

        if let Some(text) = value.as_str() {
            for (prefix, slot) in &self.starts_with {
                if text.starts_with(prefix.as_str()) {
                    out.extend(slot.query_ids.iter());
                }
            }
            for (suffix, slot) in &self.ends_with {
                if text.ends_with(suffix.as_str()) {
                    out.extend(slot.query_ids.iter());
                }
            }
        }
    }
}

#[derive(Debug)]
struct SubQuery {
    field_count: usize,
    /// Session-scoped term: the emitting socket does not hear its own event.
    suppress_echo: bool,
}

#[derive(Debug)]
struct IndexEntry {
    field: String,
    constraint: Constraint,
    sub_query: SubQueryId,
}

#[derive(Debug, Default)]
struct Registration {
    sub_queries: Vec<SubQueryId>,
    entries: Vec<IndexEntry>,
}

#[derive(Debug, Default)]
pub struct PayloadQueryProcessor {
    fields: HashMap<String, FieldIndex>,
    sub_queries: HashMap<SubQueryId, SubQuery>,
    registrations: HashMap<QueryId, Registration>,
    wildcard_queries: HashSet<QueryId>,
}

impl PayloadQueryProcessor {
    pub fn save_query(&mut self, id: &str, or_terms: &[OrTerm]) {
        self.remove_query(id);

        if or_terms.iter().any(OrTerm::is_empty) {
            self.wildcard_queries.insert(id.to_string());
            return;
        }

        let mut registration = Registration::default();

        for (term_index, term) in or_terms.iter().enumerate() {
            let sub_query = SubQueryId {
                query_id: id.to_string(),
                term: term_index,
            };

            self.sub_queries.insert(
                sub_query.clone(),
                SubQuery {
                    field_count: term.len(),
                    suppress_echo: term.contains_key(SESSION_ID_FIELD)
                        && !term.contains_key(SOCKET_ID_FIELD),
                },
            );

            for (field, value) in term {
                let constraints = Constraint::infer(value);
                if constraints.is_empty() {
                    debug!(
                        sub_query = %sub_query,
                        field = field.as_str(),
                        "constraint has no matchable value; term can never be fulfilled"
                    );
                }

                let index = self
                    .fields
                    .entry(field.clone())
                    .or_insert_with(|| FieldIndex::new(FieldPath::parse(field)));

                for constraint in constraints {
                    trace!(
                        sub_query = %sub_query,
                        field = field.as_str(),
                        method = ?constraint.method(),
                        "indexing constraint"
                    );
                    index.insert(&constraint, &sub_query);
                    registration.entries.push(IndexEntry {
                        field: field.clone(),
                        constraint,
                        sub_query: sub_query.clone(),
                    });
                }
            }

            registration.sub_queries.push(sub_query);
        }

        self.registrations.insert(id.to_string(), registration);
    }

    pub fn remove_query(&mut self, id: &str) -> bool {
        let was_wildcard = self.wildcard_queries.remove(id);

        let Some(registration) = self.registrations.remove(id) else {
            return was_wildcard;
        };

        for entry in &registration.entries {
            if let Some(index) = self.fields.get_mut(&entry.field) {
                index.remove(&entry.constraint, &entry.sub_query);
                if index.is_empty() {
                    self.fields.remove(&entry.field);
                }
            }
        }
        for sub_query in &registration.sub_queries {
            self.sub_queries.remove(sub_query);
        }

        true
    }

    pub fn matches(&self, event: &Event) -> Vec<QueryId> {
        let mut tallies: HashMap<&SubQueryId, usize> = HashMap::new();
        let mut field_matches: HashSet<&SubQueryId> = HashSet::new();

        for index in self.fields.values() {
            index.collect_matches(event.field(&index.path), &mut field_matches);
            for sub_query in field_matches.drain() {
                *tallies.entry(sub_query).or_default() += 1;
            }
        }

        let echo_socket = event.echo_socket();
        let mut matched: HashSet<&QueryId> = self.wildcard_queries.iter().collect();

        for (sub_query, tally) in tallies {
            let Some(meta) = self.sub_queries.get(sub_query) else {
                continue;
            };
            if tally != meta.field_count {
                continue;
            }
            if meta.suppress_echo && echo_socket == Some(sub_query.query_id.as_str()) {
                continue;
            }
            matched.insert(&sub_query.query_id);
        }

        matched.into_iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty() && self.wildcard_queries.is_empty()
    }

    /// Number of registered `(method, value)` slots for `field`, for diagnostics.
    pub fn indexed_slots(&self, field: &str, method: MatchMethod) -> usize {
        let Some(index) = self.fields.get(field) else {
            return 0;
        };
        match method {
            MatchMethod::Exact => index.exact.len(),
            MatchMethod::StartsWith => index.starts_with.len(),
            MatchMethod::EndsWith => index.ends_with.len(),
            MatchMethod::Wildcard => usize::from(!index.wildcard.query_ids.is_empty()),
            MatchMethod::Empty => usize::from(!index.empty.query_ids.is_empty()),
        }
    }
}
