use super::{EventErr, Message, MessageId, RealmId, UserId};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::TryFrom;

/// A change the persistence tier has committed and now wants delivered.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    NewMessage {
        message: MessageRef,
        users: Vec<UserId>,
        #[serde(default)]
        realm_id: Option<RealmId>,
        #[serde(default)]
        stream_name: Option<String>,
    },
    PointerUpdate {
        user: UserId,
        new_pointer: MessageId,
    },
    Subscription {
        user: UserId,
        op: SubscriptionOp,
        stream_name: String,
    },
}

/// Either just the id of a new message, or the full message body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MessageRef {
    Id(MessageId),
    Full(Box<Message>),
}

impl MessageRef {
    pub fn id(&self) -> MessageId {
        match self {
            Self::Id(id) => *id,
            Self::Full(message) => message.id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionOp {
    Add,
    Remove,
}

impl Notice {
    const KNOWN_TYPES: [&'static str; 3] = ["new_message", "pointer_update", "subscription"];
}

impl TryFrom<Value> for Notice {
    type Error = EventErr;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(EventErr::MissingType)?
            .to_string();
        if Self::KNOWN_TYPES.contains(&kind.as_str()) {
            Ok(serde_json::from_value(value)?)
        } else {
            Err(EventErr::UnknownNotificationType(kind))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn new_message_with_full_body() -> TestResult {
        let input: Value = serde_json::from_str(include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/test_data/new_message_001.json"
        )))?;
        match Notice::try_from(input)? {
            Notice::NewMessage {
                message,
                users,
                realm_id,
                stream_name,
            } => {
                assert_eq!(message.id(), 42);
                assert_eq!(users, vec![UserId(1), UserId(2), UserId(5)]);
                assert_eq!(realm_id, Some(RealmId(3)));
                assert_eq!(stream_name.as_deref(), Some("Verona"));
                match message {
                    MessageRef::Full(msg) => {
                        assert_eq!(msg.sending_client.as_deref(), Some("website"));
                        assert_eq!(msg.extra["display_recipient"], "Verona");
                    }
                    MessageRef::Id(_) => panic!("expected a full message body"),
                }
            }
            other => panic!("parsed as {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn new_message_with_bare_id() -> TestResult {
        let notice = Notice::try_from(json!({
            "type": "new_message", "message": 17, "users": [4]
        }))?;
        assert_eq!(
            notice,
            Notice::NewMessage {
                message: MessageRef::Id(17),
                users: vec![UserId(4)],
                realm_id: None,
                stream_name: None,
            }
        );
        Ok(())
    }

    #[test]
    fn pointer_update() -> TestResult {
        let notice = Notice::try_from(json!({
            "type": "pointer_update", "user": 9, "new_pointer": 1200
        }))?;
        assert_eq!(
            notice,
            Notice::PointerUpdate {
                user: UserId(9),
                new_pointer: 1200
            }
        );
        Ok(())
    }

    #[test]
    fn unknown_type_is_rejected_by_name() {
        let err = Notice::try_from(json!({"type": "presence", "user": 9}))
            .expect_err("presence is not a notification type");
        assert!(matches!(err, EventErr::UnknownNotificationType(ref t) if t == "presence"));

        let err = Notice::try_from(json!({"user": 9})).expect_err("no type");
        assert!(matches!(err, EventErr::MissingType));
    }

    #[test]
    fn known_type_with_bad_fields_is_a_parse_error() {
        let err = Notice::try_from(json!({"type": "pointer_update", "user": "nine"}))
            .expect_err("user must be numeric");
        assert!(matches!(err, EventErr::Serde(_)));
    }
}
