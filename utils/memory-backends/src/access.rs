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

use async_trait::async_trait;
use event_streamer::backend::{
    AccessManager, AccessRequest, Action, PermissionRule, Permissions, ResolvedAccess,
    SubjectType,
};
use event_streamer::{Result, StreamerError};
use query_engine::{Event, FieldPath, FieldRef, ScalarKey};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const MANAGE: &str = "manage";

/// Rule-list evaluator: the last rule matching the action, subject and conditions
/// decides, and an `inverted` rule denies. No matching rule denies.
#[derive(Clone, Debug, Default)]
pub struct RulePermissions {
    rules: Vec<PermissionRule>,
}

impl RulePermissions {
    pub fn new(rules: Vec<PermissionRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[PermissionRule] {
        &self.rules
    }
}

impl Permissions for RulePermissions {
    fn can(&self, action: Action, subject: SubjectType, resource: &Event) -> bool {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule_matches(rule, action, subject, resource))
            .is_some_and(|rule| !rule.inverted)
    }
}

fn rule_matches(
    rule: &PermissionRule,
    action: Action,
    subject: SubjectType,
    resource: &Event,
) -> bool {
    let action_matches = rule
        .action
        .iter()
        .any(|name| name == action.as_ref() || name == MANAGE);
    action_matches
        && rule.applies_to(subject)
        && rule.conditions.as_ref().map_or(true, |conditions| {
            conditions
                .iter()
                .all(|(path, expected)| condition_holds(resource, path, expected))
        })
}

/// Equality against the field at `path`; an array lists acceptable values.
fn condition_holds(resource: &Event, path: &str, expected: &Value) -> bool {
    let field = resource.field(&FieldPath::parse(path));
    match expected {
        Value::Array(options) => options
            .iter()
            .any(|option| field_equals(field.as_ref(), option)),
        _ => field_equals(field.as_ref(), expected),
    }
}

fn field_equals(field: Option<&FieldRef<'_>>, expected: &Value) -> bool {
    match (field.and_then(FieldRef::key), ScalarKey::from_value(expected)) {
        (Some(actual), Some(expected)) => actual == expected,
        (None, None) => {
            expected.is_null() && field.map_or(true, |field| matches!(field, FieldRef::Json(Value::Null)))
        }
        _ => false,
    }
}

/// Access manager backed by per-user rule lists held in memory.
///
/// Users without an explicit grant receive the default rules.
#[derive(Debug, Default)]
pub struct RuleAccessManager {
    grants: RwLock<HashMap<(String, String), Vec<PermissionRule>>>,
    default_rules: Vec<PermissionRule>,
}

impl RuleAccessManager {
    pub fn new(default_rules: Vec<PermissionRule>) -> Self {
        Self {
            grants: RwLock::new(HashMap::new()),
            default_rules,
        }
    }

    /// Every user may do everything.
    pub fn allow_all() -> Self {
        Self::new(vec![PermissionRule {
            action: vec![MANAGE.to_string()],
            subject: vec!["all".to_string()],
            ..Default::default()
        }])
    }

    /// Users without a grant may do nothing.
    pub fn deny_all() -> Self {
        Self::new(Vec::new())
    }

    pub async fn grant(&self, workspace_id: &str, user_id: &str, rules: Vec<PermissionRule>) {
        self.grants
            .write()
            .await
            .insert((workspace_id.to_string(), user_id.to_string()), rules);
    }
}

#[async_trait]
impl AccessManager for RuleAccessManager {
    async fn resolve(&self, request: &AccessRequest) -> Result<ResolvedAccess> {
        if request.user_id.is_empty() {
            return Err(StreamerError::Access(format!(
                "no user identity for workspace {}",
                request.workspace_id
            )));
        }
        let rules = self
            .grants
            .read()
            .await
            .get(&(request.workspace_id.clone(), request.user_id.clone()))
            .cloned()
            .unwrap_or_else(|| self.default_rules.clone());
        Ok(ResolvedAccess {
            user_id: request.user_id.clone(),
            rules,
        })
    }

    fn permissions(&self, rules: &[PermissionRule]) -> Arc<dyn Permissions> {
        Arc::new(RulePermissions::new(rules.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::{RuleAccessManager, RulePermissions};
    use event_streamer::backend::{
        AccessManager, AccessRequest, Action, PermissionRule, Permissions, SubjectType,
    };
    use query_engine::Event;
    use serde_json::json;

    fn rules(value: serde_json::Value) -> Vec<PermissionRule> {
        serde_json::from_value(value).expect("valid rules")
    }

    fn event(event_type: &str, project: &str) -> Event {
        let mut event = Event::new(event_type, "ws-1");
        event.payload = json!({"project": project});
        event
    }

    #[test]
    fn last_matching_rule_wins() {
        let permissions = RulePermissions::new(rules(json!([
            {"action": "read", "subject": "Event"},
            {"action": "read", "subject": "Event", "inverted": true,
             "conditions": {"payload.project": "secret"}}
        ])));

        assert!(permissions.can(Action::Read, SubjectType::Event, &event("a", "public")));
        assert!(!permissions.can(Action::Read, SubjectType::Event, &event("a", "secret")));
        assert!(!permissions.can(Action::Delete, SubjectType::Event, &event("a", "public")));
    }

    #[test]
    fn conditions_accept_value_lists_and_top_level_fields() {
        let permissions = RulePermissions::new(rules(json!([
            {"action": ["read"], "subject": ["Event"],
             "conditions": {"type": ["task.created", "task.updated"], "payload.project": "p1"}}
        ])));

        assert!(permissions.can(Action::Read, SubjectType::Event, &event("task.updated", "p1")));
        assert!(!permissions.can(Action::Read, SubjectType::Event, &event("task.deleted", "p1")));
        assert!(!permissions.can(Action::Read, SubjectType::Event, &event("task.created", "p2")));
    }

    #[test]
    fn manage_on_all_covers_everything() {
        let permissions = RulePermissions::new(rules(json!([
            {"action": "manage", "subject": "all"}
        ])));

        assert!(permissions.can(Action::Read, SubjectType::Event, &event("a", "p")));
        assert!(permissions.can(Action::Update, SubjectType::Workspace, &event("a", "p")));
    }

    #[tokio::test]
    async fn grants_override_default_rules() {
        let access = RuleAccessManager::deny_all();
        access
            .grant(
                "ws-1",
                "alice",
                rules(json!([{"action": "read", "subject": "Event"}])),
            )
            .await;

        let alice = access
            .resolve(&AccessRequest {
                workspace_id: "ws-1".to_string(),
                user_id: "alice".to_string(),
                ..Default::default()
            })
            .await
            .expect("resolved");
        let bob = access
            .resolve(&AccessRequest {
                workspace_id: "ws-1".to_string(),
                user_id: "bob".to_string(),
                ..Default::default()
            })
            .await
            .expect("resolved");

        assert_eq!(alice.rules.len(), 1);
        assert!(bob.rules.is_empty());
        assert!(access
            .permissions(&alice.rules)
            .can(Action::Read, SubjectType::Event, &event("a", "p")));
        assert!(!access
            .permissions(&bob.rules)
            .can(Action::Read, SubjectType::Event, &event("a", "p")));
    }

    #[tokio::test]
    async fn anonymous_requests_are_rejected() {
        let access = RuleAccessManager::allow_all();
        assert!(access.resolve(&AccessRequest::default()).await.is_err());
    }
}
