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

//! Workspace-scoped identity and permission resolution.
//!
//! Rule evaluation belongs to the access manager; the core only stores the serialized
//! rules alongside each subscriber and asks `can(...)` per delivered event.

use crate::error::Result;
use async_trait::async_trait;
use query_engine::Event;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use strum::{AsRefStr, Display, EnumString};

const ALL_SUBJECTS: &str = "all";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "camelCase")]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
    Manage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
pub enum SubjectType {
    Event,
    Workspace,
    User,
}

/// One serializable permission rule as produced by the access manager.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionRule {
    #[serde(deserialize_with = "one_or_many")]
    pub action: Vec<String>,
    #[serde(deserialize_with = "one_or_many")]
    pub subject: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub inverted: bool,
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

impl PermissionRule {
    pub fn applies_to(&self, subject: SubjectType) -> bool {
        self.subject
            .iter()
            .any(|name| name == subject.as_ref() || name == ALL_SUBJECTS)
    }

    /// Keeps only the rules that can affect `subject`.
    pub fn narrow(rules: Vec<PermissionRule>, subject: SubjectType) -> Vec<PermissionRule> {
        rules
            .into_iter()
            .filter(|rule| rule.applies_to(subject))
            .collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AccessRequest {
    pub workspace_id: String,
    pub user_id: String,
    pub api_key: Option<String>,
    pub auth_data: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedAccess {
    /// Workspace-scoped user identity.
    pub user_id: String,
    pub rules: Vec<PermissionRule>,
}

pub trait Permissions: Send + Sync {
    fn can(&self, action: Action, subject: SubjectType, resource: &Event) -> bool;
}

#[async_trait]
pub trait AccessManager: Send + Sync {
    async fn resolve(&self, request: &AccessRequest) -> Result<ResolvedAccess>;

    /// Rebuilds an evaluator from serialized rules, e.g. for a peer's subscriber.
    fn permissions(&self, rules: &[PermissionRule]) -> Arc<dyn Permissions>;
}

#[cfg(test)]
mod tests {
    use super::{PermissionRule, SubjectType};
    use serde_json::json;

    #[test]
    fn narrowing_keeps_event_and_all_subject_rules() {
        let rules: Vec<PermissionRule> = serde_json::from_value(json!([
            { "action": "read", "subject": "Event" },
            { "action": ["read", "update"], "subject": ["Workspace"] },
            { "action": "manage", "subject": "all" },
            { "action": "read", "subject": "Event", "inverted": true,
              "conditions": { "payload.secret": true } }
        ]))
        .expect("rules parse");

        let narrowed = PermissionRule::narrow(rules, SubjectType::Event);

        assert_eq!(narrowed.len(), 3);
        assert!(narrowed
            .iter()
            .all(|rule| rule.applies_to(SubjectType::Event)));
        assert!(narrowed[2].inverted);
    }
}
