//! Notification payload model and its JSON wire form.
//!
//! The wire form accepts either the legacy single `action` object or the
//! `actions` list; both are normalized into one list at decode time.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::dispatch::{DEFAULT_ACTION_ID, DISMISS_ACTION_ID};

/// Upper bound on the number of keys reported back to a caller whose
/// payload failed to decode.
const MAX_REPORTED_KEYS: usize = 64;
const MAX_KEY_DEPTH: usize = 4;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("notification title must not be empty")]
    EmptyTitle,

    #[error("action {id:?} of type \"open\" requires a \"location\"")]
    MissingLocation { id: String },

    #[error("action {id:?} of type \"exec\" requires an \"exec\" command")]
    MissingCommand { id: String },

    #[error("action {id:?} has unsupported type {kind:?} (expected \"open\" or \"exec\")")]
    UnsupportedActionType { id: String, kind: String },

    #[error("action id {0:?} is used more than once")]
    DuplicateActionId(String),

    #[error("action id {0:?} is reserved for body taps and dismissals")]
    ReservedActionId(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InterruptionLevel {
    Passive,
    #[default]
    Active,
    TimeSensitive,
    Critical,
}

impl InterruptionLevel {
    /// Lenient mapping: anything unrecognized is `Active`.
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "passive" => Self::Passive,
            "timeSensitive" => Self::TimeSensitive,
            "critical" => Self::Critical,
            _ => Self::Active,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passive => "passive",
            Self::Active => "active",
            Self::TimeSensitive => "timeSensitive",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Open { location: String },
    Exec { command: String, args: Vec<String> },
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Open { .. } => "open",
            ActionKind::Exec { .. } => "exec",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDescriptor {
    pub id: String,
    pub label: String,
    pub kind: ActionKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    pub title: String,
    pub message: String,
    pub subtitle: Option<String>,
    pub group: Option<String>,
    pub sound: Option<String>,
    pub interruption_level: InterruptionLevel,
    pub actions: Vec<ActionDescriptor>,
}

impl NotificationPayload {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            subtitle: None,
            group: None,
            sound: None,
            interruption_level: InterruptionLevel::default(),
            actions: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireRequest {
    notification: WirePayload,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePayload {
    title: String,
    #[serde(alias = "body")]
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sound: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    interruption_level: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    action: Option<WireAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    actions: Option<Vec<WireAction>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireAction {
    id: String,
    label: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    args: Option<Vec<String>>,
}

impl TryFrom<WireAction> for ActionDescriptor {
    type Error = PayloadError;

    fn try_from(wire: WireAction) -> Result<Self, Self::Error> {
        let kind = match wire.kind.as_str() {
            "open" => ActionKind::Open {
                location: wire
                    .location
                    .filter(|location| !location.trim().is_empty())
                    .ok_or_else(|| PayloadError::MissingLocation {
                        id: wire.id.clone(),
                    })?,
            },
            "exec" => ActionKind::Exec {
                command: wire
                    .exec
                    .filter(|command| !command.trim().is_empty())
                    .ok_or_else(|| PayloadError::MissingCommand {
                        id: wire.id.clone(),
                    })?,
                args: wire.args.unwrap_or_default(),
            },
            other => {
                return Err(PayloadError::UnsupportedActionType {
                    id: wire.id,
                    kind: other.to_string(),
                })
            }
        };

        Ok(ActionDescriptor {
            id: wire.id,
            label: wire.label,
            kind,
        })
    }
}

impl From<&ActionDescriptor> for WireAction {
    fn from(action: &ActionDescriptor) -> Self {
        let (location, exec, args) = match &action.kind {
            ActionKind::Open { location } => (Some(location.clone()), None, None),
            ActionKind::Exec { command, args } => (None, Some(command.clone()), Some(args.clone())),
        };
        WireAction {
            id: action.id.clone(),
            label: action.label.clone(),
            kind: action.kind.name().to_string(),
            location,
            exec,
            args,
        }
    }
}

impl TryFrom<WirePayload> for NotificationPayload {
    type Error = PayloadError;

    fn try_from(wire: WirePayload) -> Result<Self, Self::Error> {
        if wire.title.trim().is_empty() {
            return Err(PayloadError::EmptyTitle);
        }

        let wire_actions = match (wire.actions, wire.action) {
            (Some(list), _) => list,
            (None, Some(single)) => vec![single],
            (None, None) => Vec::new(),
        };

        // Every listed action is validated, including those past the
        // presentation limit that the manager later drops.
        let mut seen = HashSet::new();
        let mut actions = Vec::with_capacity(wire_actions.len());
        for wire_action in wire_actions {
            let action = ActionDescriptor::try_from(wire_action)?;
            if action.id == DEFAULT_ACTION_ID || action.id == DISMISS_ACTION_ID {
                return Err(PayloadError::ReservedActionId(action.id));
            }
            if !seen.insert(action.id.clone()) {
                return Err(PayloadError::DuplicateActionId(action.id));
            }
            actions.push(action);
        }

        let interruption_level = wire
            .interruption_level
            .as_ref()
            .and_then(Value::as_str)
            .map(InterruptionLevel::from_wire)
            .unwrap_or_default();

        Ok(NotificationPayload {
            title: wire.title,
            message: wire.message,
            subtitle: wire.subtitle,
            group: wire.group,
            sound: wire.sound,
            interruption_level,
            actions,
        })
    }
}

impl From<&NotificationPayload> for WirePayload {
    fn from(payload: &NotificationPayload) -> Self {
        WirePayload {
            title: payload.title.clone(),
            message: payload.message.clone(),
            subtitle: payload.subtitle.clone(),
            group: payload.group.clone(),
            sound: payload.sound.clone(),
            interruption_level: Some(Value::String(
                payload.interruption_level.as_str().to_string(),
            )),
            action: None,
            actions: if payload.actions.is_empty() {
                None
            } else {
                Some(payload.actions.iter().map(WireAction::from).collect())
            },
        }
    }
}

/// Decode a `{"notification": {...}}` request body.
pub fn decode_request(body: &[u8]) -> Result<NotificationPayload, PayloadError> {
    let wire: WireRequest = serde_json::from_slice(body)?;
    NotificationPayload::try_from(wire.notification)
}

/// Encode a payload in the request shape accepted by [`decode_request`].
pub fn encode_request(payload: &NotificationPayload) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&WireRequest {
        notification: WirePayload::from(payload),
    })
}

/// Key paths present in `body`, best effort.
///
/// Used to help a caller spot a misspelled field without echoing the whole
/// payload back. Returns an empty list when the body is not a JSON object.
pub fn observed_keys(body: &[u8]) -> Vec<String> {
    let Ok(Value::Object(root)) = serde_json::from_slice::<Value>(body) else {
        return Vec::new();
    };
    let mut keys = Vec::new();
    collect_keys("", &root, 0, &mut keys);
    keys
}

fn collect_keys(prefix: &str, map: &Map<String, Value>, depth: usize, keys: &mut Vec<String>) {
    for (key, value) in map {
        if keys.len() >= MAX_REPORTED_KEYS {
            return;
        }
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        keys.push(path.clone());

        if depth + 1 >= MAX_KEY_DEPTH {
            continue;
        }
        match value {
            Value::Object(nested) => collect_keys(&path, nested, depth + 1, keys),
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    if let Value::Object(nested) = item {
                        collect_keys(&format!("{path}[{index}]"), nested, depth + 1, keys);
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_action(id: &str) -> ActionDescriptor {
        ActionDescriptor {
            id: id.to_string(),
            label: format!("Open {id}"),
            kind: ActionKind::Open {
                location: format!("file:///tmp/{id}.log"),
            },
        }
    }

    #[test]
    fn minimal_payload_uses_defaults() {
        let payload = decode_request(br#"{"notification":{"title":"T","message":"M"}}"#)
            .expect("decode");
        assert_eq!(payload, NotificationPayload::new("T", "M"));
        assert_eq!(payload.interruption_level, InterruptionLevel::Active);
        assert!(payload.actions.is_empty());
    }

    #[test]
    fn body_is_accepted_as_message_alias() {
        let payload = decode_request(br#"{"notification":{"title":"T","body":"B"}}"#)
            .expect("decode");
        assert_eq!(payload.message, "B");
    }

    #[test]
    fn fully_populated_payload_survives_encode_decode() {
        let payload = NotificationPayload {
            title: "Deploy".to_string(),
            message: "Finished".to_string(),
            subtitle: Some("prod".to_string()),
            group: Some("deploys".to_string()),
            sound: Some("/System/Library/Sounds/Basso.aiff".to_string()),
            interruption_level: InterruptionLevel::TimeSensitive,
            actions: vec![
                open_action("logs"),
                ActionDescriptor {
                    id: "rerun".to_string(),
                    label: "Re-run".to_string(),
                    kind: ActionKind::Exec {
                        command: "/bin/bash".to_string(),
                        args: vec!["-c".to_string(), "make deploy".to_string()],
                    },
                },
            ],
        };

        let encoded = encode_request(&payload).expect("encode");
        assert_eq!(decode_request(&encoded).expect("decode"), payload);
    }

    #[test]
    fn legacy_single_action_is_normalized_into_list() {
        let body = br#"{"notification":{"title":"T","message":"M",
            "action":{"id":"open_action","label":"Open","type":"open","location":"/tmp/x.log"}}}"#;
        let payload = decode_request(body).expect("decode");
        assert_eq!(payload.actions.len(), 1);
        assert_eq!(
            payload.actions[0].kind,
            ActionKind::Open {
                location: "/tmp/x.log".to_string()
            }
        );
    }

    #[test]
    fn actions_list_wins_over_single_action() {
        let body = br#"{"notification":{"title":"T","message":"M",
            "action":{"id":"a","label":"A","type":"open","location":"/a"},
            "actions":[{"id":"b","label":"B","type":"open","location":"/b"}]}}"#;
        let payload = decode_request(body).expect("decode");
        let ids: Vec<_> = payload.actions.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["b"]);
    }

    #[test]
    fn exec_action_without_args_gets_empty_list() {
        let body = br#"{"notification":{"title":"T","message":"M",
            "action":{"id":"x","label":"Run","type":"exec","exec":"/usr/bin/true"}}}"#;
        let payload = decode_request(body).expect("decode");
        assert_eq!(
            payload.actions[0].kind,
            ActionKind::Exec {
                command: "/usr/bin/true".to_string(),
                args: Vec::new()
            }
        );
    }

    #[test]
    fn interruption_level_is_lenient() {
        for (raw, expected) in [
            (r#""passive""#, InterruptionLevel::Passive),
            (r#""timeSensitive""#, InterruptionLevel::TimeSensitive),
            (r#""critical""#, InterruptionLevel::Critical),
            (r#""urgent""#, InterruptionLevel::Active),
            (r#""Critical""#, InterruptionLevel::Active),
            ("42", InterruptionLevel::Active),
            ("null", InterruptionLevel::Active),
        ] {
            let body = format!(
                r#"{{"notification":{{"title":"T","message":"M","interruptionLevel":{raw}}}}}"#
            );
            let payload = decode_request(body.as_bytes()).expect("decode");
            assert_eq!(payload.interruption_level, expected, "level {raw}");
        }
    }

    #[test]
    fn missing_message_is_a_decode_error() {
        let err = decode_request(br#"{"notification":{"title":"T"}}"#).expect_err("missing");
        assert!(matches!(err, PayloadError::Json(_)));
        assert!(err.to_string().contains("message"));
    }

    #[test]
    fn blank_title_is_rejected() {
        let err = decode_request(br#"{"notification":{"title":"  ","message":"M"}}"#)
            .expect_err("blank");
        assert!(matches!(err, PayloadError::EmptyTitle));
    }

    #[test]
    fn open_without_location_is_rejected() {
        let body = br#"{"notification":{"title":"T","message":"M",
            "action":{"id":"o","label":"Open","type":"open"}}}"#;
        assert!(matches!(
            decode_request(body),
            Err(PayloadError::MissingLocation { id }) if id == "o"
        ));
    }

    #[test]
    fn exec_without_command_is_rejected() {
        let body = br#"{"notification":{"title":"T","message":"M",
            "actions":[{"id":"e","label":"Run","type":"exec","args":["-c","ls"]}]}}"#;
        assert!(matches!(
            decode_request(body),
            Err(PayloadError::MissingCommand { id }) if id == "e"
        ));
    }

    #[test]
    fn unknown_action_type_is_rejected() {
        let body = br#"{"notification":{"title":"T","message":"M",
            "actions":[{"id":"m","label":"Mail","type":"mailto"}]}}"#;
        assert!(matches!(
            decode_request(body),
            Err(PayloadError::UnsupportedActionType { kind, .. }) if kind == "mailto"
        ));
    }

    #[test]
    fn duplicate_action_ids_are_rejected() {
        let body = br#"{"notification":{"title":"T","message":"M","actions":[
            {"id":"d","label":"One","type":"open","location":"/1"},
            {"id":"d","label":"Two","type":"open","location":"/2"}]}}"#;
        assert!(matches!(
            decode_request(body),
            Err(PayloadError::DuplicateActionId(id)) if id == "d"
        ));
    }

    #[test]
    fn duplicate_past_the_action_limit_is_still_rejected() {
        let mut actions: Vec<_> = (0..4)
            .map(|i| format!(r#"{{"id":"a{i}","label":"L","type":"open","location":"/{i}"}}"#))
            .collect();
        actions.push(r#"{"id":"a0","label":"Again","type":"open","location":"/x"}"#.to_string());
        let body = format!(
            r#"{{"notification":{{"title":"T","message":"M","actions":[{}]}}}}"#,
            actions.join(",")
        );
        assert!(matches!(
            decode_request(body.as_bytes()),
            Err(PayloadError::DuplicateActionId(id)) if id == "a0"
        ));
    }

    #[test]
    fn reserved_action_ids_are_rejected() {
        for id in [DEFAULT_ACTION_ID, DISMISS_ACTION_ID] {
            let body = format!(
                r#"{{"notification":{{"title":"T","message":"M","action":{{"id":"{id}","label":"Dismiss log","type":"open","location":"/tmp/x"}}}}}}"#
            );
            assert!(matches!(
                decode_request(body.as_bytes()),
                Err(PayloadError::ReservedActionId(reserved)) if reserved == id
            ));
        }
    }

    #[test]
    fn decode_keeps_more_than_four_actions() {
        let actions: Vec<_> = (0..5)
            .map(|i| format!(r#"{{"id":"a{i}","label":"L","type":"open","location":"/{i}"}}"#))
            .collect();
        let body = format!(
            r#"{{"notification":{{"title":"T","message":"M","actions":[{}]}}}}"#,
            actions.join(",")
        );
        assert_eq!(decode_request(body.as_bytes()).expect("decode").actions.len(), 5);
    }

    #[test]
    fn observed_keys_reports_nested_paths() {
        let body = br#"{"notification":{"titel":"T","message":"M",
            "actions":[{"id":"a","lable":"x"}]},"extra":1}"#;
        let keys = observed_keys(body);
        for expected in [
            "extra",
            "notification",
            "notification.titel",
            "notification.message",
            "notification.actions",
            "notification.actions[0].id",
            "notification.actions[0].lable",
        ] {
            assert!(keys.iter().any(|k| k == expected), "missing {expected} in {keys:?}");
        }
    }

    #[test]
    fn observed_keys_is_empty_for_non_objects() {
        assert!(observed_keys(b"not json").is_empty());
        assert!(observed_keys(b"[1,2,3]").is_empty());
    }
}
