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

//! Routed event model and the typed dot-path accessor used by matchers.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt::{Display, Formatter};

/// One platform event as it flows through the routing core.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: EventSource,
    #[serde(default)]
    pub target: EventTarget,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(default)]
    pub workspace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_instance_depth: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_socket: Option<bool>,
}

impl Event {
    pub fn new(event_type: &str, workspace_id: &str) -> Self {
        Self {
            event_type: event_type.to_string(),
            source: EventSource {
                workspace_id: workspace_id.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn workspace_id(&self) -> &str {
        &self.source.workspace_id
    }

    /// Resolves a parsed dot-path against this event.
    pub fn field(&self, path: &FieldPath) -> Option<FieldRef<'_>> {
        match path {
            FieldPath::Type => Some(FieldRef::borrowed(&self.event_type)),
            FieldPath::Id => Some(FieldRef::borrowed(&self.id)),
            FieldPath::CreatedAt => self.created_at.map(|created_at| {
                FieldRef::Str(Cow::Owned(
                    created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                ))
            }),
            FieldPath::Source(field) => match field {
                SourceField::WorkspaceId => Some(FieldRef::borrowed(&self.source.workspace_id)),
                SourceField::UserId => self.source.user_id.as_deref().map(FieldRef::borrowed),
                SourceField::SessionId => {
                    self.source.session_id.as_deref().map(FieldRef::borrowed)
                }
                SourceField::SocketId => self.source.socket_id.as_deref().map(FieldRef::borrowed),
                SourceField::AppInstanceDepth => self
                    .source
                    .app_instance_depth
                    .map(|depth| FieldRef::Uint(u64::from(depth))),
            },
            FieldPath::Target(field) => match field {
                TargetField::UserTopic => self.target.user_topic.as_deref().map(FieldRef::borrowed),
                TargetField::CurrentSocket => self.target.current_socket.map(FieldRef::Bool),
            },
            FieldPath::Payload(segments) => {
                let mut current = &self.payload;
                for segment in segments {
                    current = match current {
                        Value::Object(map) => map.get(segment)?,
                        Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                        _ => return None,
                    };
                }
                Some(FieldRef::Json(current))
            }
            FieldPath::Unknown(_) => None,
        }
    }

    /// Socket that must not hear its own emission under session-scoped filters.
    ///
    /// `None` when the event has no source socket or explicitly opts out with
    /// `target.currentSocket == false`.
    pub fn echo_socket(&self) -> Option<&str> {
        if self.target.current_socket == Some(false) {
            return None;
        }
        self.source.socket_id.as_deref()
    }

    /// Canonical JSON encoding used for free-text search.
    pub fn search_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceField {
    WorkspaceId,
    UserId,
    SessionId,
    SocketId,
    AppInstanceDepth,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetField {
    UserTopic,
    CurrentSocket,
}

/// A dot-path into an [`Event`], parsed once when a filter is registered.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldPath {
    Type,
    Id,
    CreatedAt,
    Source(SourceField),
    Target(TargetField),
    Payload(Vec<String>),
    Unknown(String),
}

impl FieldPath {
    pub fn parse(path: &str) -> Self {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };

        match (head, rest) {
            ("type", None) => FieldPath::Type,
            ("id", None) => FieldPath::Id,
            ("createdAt", None) => FieldPath::CreatedAt,
            ("source", Some(field)) => match field {
                "workspaceId" => FieldPath::Source(SourceField::WorkspaceId),
                "userId" => FieldPath::Source(SourceField::UserId),
                "sessionId" => FieldPath::Source(SourceField::SessionId),
                "socketId" => FieldPath::Source(SourceField::SocketId),
                "appInstanceDepth" => FieldPath::Source(SourceField::AppInstanceDepth),
                _ => FieldPath::Unknown(path.to_string()),
            },
            ("target", Some(field)) => match field {
                "userTopic" => FieldPath::Target(TargetField::UserTopic),
                "currentSocket" => FieldPath::Target(TargetField::CurrentSocket),
                _ => FieldPath::Unknown(path.to_string()),
            },
            ("payload", None) => FieldPath::Payload(Vec::new()),
            ("payload", Some(rest)) => {
                FieldPath::Payload(rest.split('.').map(str::to_string).collect())
            }
            _ => FieldPath::Unknown(path.to_string()),
        }
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        FieldPath::parse(path)
    }
}

/// Borrowed view of one event field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldRef<'a> {
    Str(Cow<'a, str>),
    Uint(u64),
    Bool(bool),
    Json(&'a Value),
}

impl<'a> FieldRef<'a> {
    fn borrowed(value: &'a str) -> Self {
        FieldRef::Str(Cow::Borrowed(value))
    }

    /// Javascript-style truthiness: empty strings, zero, `false` and `null` are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            FieldRef::Str(value) => !value.is_empty(),
            FieldRef::Uint(value) => *value != 0,
            FieldRef::Bool(value) => *value,
            FieldRef::Json(value) => match value {
                Value::Null => false,
                Value::Bool(value) => *value,
                Value::Number(number) => number.as_f64().map_or(false, |n| n != 0.0 && !n.is_nan()),
                Value::String(value) => !value.is_empty(),
                Value::Array(_) | Value::Object(_) => true,
            },
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldRef::Str(value) => Some(value.as_ref()),
            FieldRef::Json(Value::String(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn key(&self) -> Option<ScalarKey> {
        match self {
            FieldRef::Str(value) => Some(ScalarKey::Str(value.to_string())),
            FieldRef::Uint(value) => Some(ScalarKey::number(*value as f64)),
            FieldRef::Bool(value) => Some(ScalarKey::Bool(*value)),
            FieldRef::Json(value) => ScalarKey::from_value(value),
        }
    }
}

/// Hashable scalar used by exact-match buckets.
///
/// Numbers compare as `f64` so `1` and `1.0` share a key; strings and numbers never do.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKey {
    Str(String),
    Number(u64),
    Bool(bool),
}

impl ScalarKey {
    pub fn number(value: f64) -> Self {
        let value = if value == 0.0 { 0.0 } else { value };
        ScalarKey::Number(value.to_bits())
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(value) => Some(ScalarKey::Str(value.clone())),
            Value::Number(number) => number.as_f64().map(ScalarKey::number),
            Value::Bool(value) => Some(ScalarKey::Bool(*value)),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

impl Display for ScalarKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarKey::Str(value) => write!(f, "{value:?}"),
            ScalarKey::Number(bits) => write!(f, "{}", f64::from_bits(*bits)),
            ScalarKey::Bool(value) => write!(f, "{value}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Event, FieldPath, FieldRef, ScalarKey, SourceField};
    use serde_json::json;

    fn sample_event() -> Event {
        serde_json::from_value(json!({
            "type": "task.updated",
            "id": "evt-1",
            "source": {
                "workspaceId": "ws-1",
                "sessionId": "session-a",
                "socketId": "socket-1",
                "appInstanceDepth": 2
            },
            "target": { "currentSocket": false },
            "payload": {
                "task": { "status": "done", "tags": ["a", "b"] },
                "count": 0
            }
        }))
        .expect("valid event json")
    }

    #[test]
    fn parse_recognises_known_paths() {
        assert_eq!(FieldPath::parse("type"), FieldPath::Type);
        assert_eq!(
            FieldPath::parse("source.sessionId"),
            FieldPath::Source(SourceField::SessionId)
        );
        assert_eq!(
            FieldPath::parse("payload.task.status"),
            FieldPath::Payload(vec!["task".to_string(), "status".to_string()])
        );
        assert!(matches!(
            FieldPath::parse("source.nope"),
            FieldPath::Unknown(_)
        ));
    }

    #[test]
    fn field_walks_payload_objects_and_arrays() {
        let event = sample_event();

        let status = event.field(&FieldPath::parse("payload.task.status"));
        assert_eq!(status.as_ref().and_then(FieldRef::as_str), Some("done"));

        let tag = event.field(&FieldPath::parse("payload.task.tags.1"));
        assert_eq!(tag.as_ref().and_then(FieldRef::as_str), Some("b"));

        assert!(event.field(&FieldPath::parse("payload.task.missing")).is_none());
    }

    #[test]
    fn truthiness_follows_javascript_rules() {
        let event = sample_event();

        let count = event
            .field(&FieldPath::parse("payload.count"))
            .expect("count present");
        assert!(!count.is_truthy());

        let depth = event
            .field(&FieldPath::parse("source.appInstanceDepth"))
            .expect("depth present");
        assert!(depth.is_truthy());
        assert_eq!(depth.key(), Some(ScalarKey::number(2.0)));
    }

    #[test]
    fn echo_socket_respects_current_socket_opt_out() {
        let mut event = sample_event();
        assert_eq!(event.echo_socket(), None);

        event.target.current_socket = None;
        assert_eq!(event.echo_socket(), Some("socket-1"));
    }
}
