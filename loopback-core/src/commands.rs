//! Commands sent by content scripts
//!
//! A message body carries a `cmd` field. Messages from senders without a
//! proper tab and unknown commands are dropped; parsing never fails.

use crate::frames::{FrameId, TabId, TAB_ID_NONE, TOP_FRAME};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Who sent a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSender {
    #[serde(default)]
    pub tab_id: Option<TabId>,
    #[serde(default)]
    pub frame_id: Option<FrameId>,
}

impl MessageSender {
    pub fn tab(tab_id: TabId, frame_id: FrameId) -> Self {
        Self {
            tab_id: Some(tab_id),
            frame_id: Some(frame_id),
        }
    }

    /// The sender tab, if it is a real one
    fn proper_tab(&self) -> Option<TabId> {
        self.tab_id.filter(|&id| id != TAB_ID_NONE)
    }
}

/// Action the host browser must carry out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HostAction {
    InsertCss {
        tab_id: TabId,
        frame_id: FrameId,
        code: String,
    },
    RemoveTab {
        tab_id: TabId,
    },
}

/// Cross-origin request to perform on behalf of a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XhrDetails {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub payload: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    Action(HostAction),
    Relay(XhrDetails),
}

/// Interpret a message body
pub fn parse_command(sender: &MessageSender, body: &Value) -> Option<HostCommand> {
    let cmd = body.get("cmd").and_then(Value::as_str)?;

    match cmd {
        "inject css" => {
            let tab_id = sender.proper_tab()?;
            Some(HostCommand::Action(HostAction::InsertCss {
                tab_id,
                frame_id: sender.frame_id.unwrap_or(TOP_FRAME),
                code: body.get("data").map(stringify).unwrap_or_default(),
            }))
        }
        "remove tab" => {
            let tab_id = sender.proper_tab()?;
            Some(HostCommand::Action(HostAction::RemoveTab { tab_id }))
        }
        "xhr" => parse_xhr(body.get("details")?).map(HostCommand::Relay),
        other => {
            debug!("Ignoring unknown command {:?}", other);
            None
        }
    }
}

fn parse_xhr(details: &Value) -> Option<XhrDetails> {
    let details = details.as_object()?;
    let url = details.get("url").map(stringify)?;
    let method = details
        .get("method")
        .map(stringify)
        .unwrap_or_else(|| "GET".to_string());

    // Header values of any JSON type are sent as their string form
    let headers = details
        .get("headers")
        .and_then(Value::as_object)
        .map(|map| map.iter().map(|(k, v)| (k.clone(), stringify(v))).collect())
        .unwrap_or_default();

    let payload = details
        .get("payload")
        .filter(|v| is_truthy(v))
        .map(stringify);

    Some(XhrDetails {
        method,
        url,
        headers,
        payload,
    })
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inject_css_defaults_to_top_frame() {
        let sender = MessageSender {
            tab_id: Some(7),
            frame_id: None,
        };
        let cmd = parse_command(&sender, &json!({"cmd": "inject css", "data": "#ad { display: none; }"}));
        assert_eq!(
            cmd,
            Some(HostCommand::Action(HostAction::InsertCss {
                tab_id: 7,
                frame_id: TOP_FRAME,
                code: "#ad { display: none; }".into(),
            }))
        );
    }

    #[test]
    fn test_tab_commands_need_a_proper_tab() {
        let body = json!({"cmd": "remove tab"});
        assert!(parse_command(&MessageSender::default(), &body).is_none());
        assert!(parse_command(&MessageSender::tab(TAB_ID_NONE, 0), &body).is_none());
        assert_eq!(
            parse_command(&MessageSender::tab(3, 2), &body),
            Some(HostCommand::Action(HostAction::RemoveTab { tab_id: 3 }))
        );
    }

    #[test]
    fn test_xhr_from_background_is_allowed() {
        let body = json!({
            "cmd": "xhr",
            "details": {
                "method": "POST",
                "url": "https://api.example.com/v1",
                "headers": {"X-Count": 3, "Accept": "text/plain"},
                "payload": "a=1"
            }
        });
        let Some(HostCommand::Relay(details)) = parse_command(&MessageSender::default(), &body) else {
            panic!("expected relay command");
        };
        assert_eq!(details.method, "POST");
        assert_eq!(details.headers.get("X-Count").map(String::as_str), Some("3"));
        assert_eq!(details.payload.as_deref(), Some("a=1"));
    }

    #[test]
    fn test_xhr_empty_payload_is_none() {
        let body = json!({"cmd": "xhr", "details": {"url": "https://a.example/", "payload": ""}});
        let Some(HostCommand::Relay(details)) = parse_command(&MessageSender::default(), &body) else {
            panic!("expected relay command");
        };
        assert_eq!(details.method, "GET");
        assert!(details.payload.is_none());
    }

    #[test]
    fn test_invalid_messages_ignored() {
        let sender = MessageSender::tab(1, 0);
        assert!(parse_command(&sender, &json!({"cmd": "xhr", "details": "nope"})).is_none());
        assert!(parse_command(&sender, &json!({"cmd": "reboot"})).is_none());
        assert!(parse_command(&sender, &json!({"data": "x"})).is_none());
        assert!(parse_command(&sender, &json!(42)).is_none());
    }

    #[test]
    fn test_action_serialization() {
        let json = serde_json::to_value(HostAction::RemoveTab { tab_id: 9 }).unwrap();
        assert_eq!(json, json!({"action": "remove_tab", "tab_id": 9}));
    }
}
