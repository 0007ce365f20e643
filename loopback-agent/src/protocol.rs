//! Host protocol: newline-delimited JSON, one message per line

use loopback_core::{
    Decision, FrameEntry, FrameId, HostAction, MessageSender, RequestDetails, TabId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lines read from the host browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    Inventory {
        tab_id: TabId,
        #[serde(default)]
        frame_id: FrameId,
        url: String,
    },
    FrameInventory {
        tab_id: TabId,
        frames: Vec<FrameEntry>,
    },
    NavigationCommitted {
        tab_id: TabId,
        #[serde(default)]
        frame_id: FrameId,
        url: String,
    },
    TabClosed {
        tab_id: TabId,
    },
    Request {
        details: RequestDetails,
    },
    Message {
        #[serde(default)]
        message_id: Option<String>,
        #[serde(default)]
        sender: MessageSender,
        body: Value,
    },
}

/// Lines written back to the host browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    /// Startup finished, rules are installed
    Ready { rules: usize },
    Decision {
        request_id: String,
        decision: Decision,
    },
    Action(HostAction),
    /// Relay result; `body` is `None` when the request failed
    Reply {
        message_id: String,
        body: Option<String>,
    },
    Error { message: String },
}

impl Outbound {
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopback_core::ResourceType;
    use serde_json::json;

    #[test]
    fn test_parse_request_line() {
        let line = r#"{"type":"request","details":{"request_id":"42","tab_id":3,"frame_id":1,"url":"https://a.example/ads/script.js","type":"script"}}"#;
        let Inbound::Request { details } = serde_json::from_str(line).unwrap() else {
            panic!("expected request");
        };
        assert_eq!(details.resource_type, ResourceType::Script);
        assert_eq!(details.frame_id, 1);
        assert_eq!(details.method, "GET");
    }

    #[test]
    fn test_navigation_defaults_to_top_frame() {
        let line = r#"{"type":"navigation_committed","tab_id":3,"url":"https://a.example/"}"#;
        assert_eq!(
            serde_json::from_str::<Inbound>(line).unwrap(),
            Inbound::NavigationCommitted {
                tab_id: 3,
                frame_id: 0,
                url: "https://a.example/".into(),
            }
        );
    }

    #[test]
    fn test_outbound_shapes() {
        let decision = Outbound::Decision {
            request_id: "7".into(),
            decision: Decision::redirect("data:,x"),
        };
        assert_eq!(
            serde_json::to_value(&decision).unwrap(),
            json!({"type": "decision", "request_id": "7", "decision": {"kind": "redirect", "redirect_url": "data:,x"}})
        );

        let action = Outbound::Action(HostAction::InsertCss {
            tab_id: 1,
            frame_id: 0,
            code: "a{}".into(),
        });
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            json!({"type": "action", "action": "insert_css", "tab_id": 1, "frame_id": 0, "code": "a{}"})
        );

        let line = Outbound::Error { message: "bad".into() }.to_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }
}
