use super::{MessageId, UserId};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A committed chat message, as handed over by the persistence tier.
///
/// Only the fields the broker itself looks at are typed; anything else the persistence
/// tier includes is kept in `extra` and passed through to clients untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    #[serde(default)]
    pub sender_id: Option<UserId>,
    #[serde(default)]
    pub sending_client: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub rendered_content: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// A message the broker only knows the id of.
    pub fn bare(id: MessageId) -> Self {
        Self {
            id,
            sender_id: None,
            sending_client: None,
            subject: None,
            content: String::new(),
            rendered_content: None,
            timestamp: None,
            extra: Map::new(),
        }
    }

    /// The JSON a client receives for this message.
    ///
    /// With `apply_markdown`, `content` carries the rendered HTML (when the persistence
    /// tier supplied one); otherwise it carries the raw markdown source.
    pub fn to_client_json(&self, apply_markdown: bool) -> Value {
        let mut obj = self.extra.clone();
        obj.insert("id".into(), Value::from(self.id));
        if let Some(sender) = self.sender_id {
            obj.insert("sender_id".into(), Value::from(*sender));
        }
        if let Some(client) = &self.sending_client {
            obj.insert("sending_client".into(), Value::from(client.as_str()));
        }
        if let Some(subject) = &self.subject {
            obj.insert("subject".into(), Value::from(subject.as_str()));
        }
        if let Some(timestamp) = self.timestamp {
            obj.insert("timestamp".into(), Value::from(timestamp));
        }
        let (content, content_type) = match (&self.rendered_content, apply_markdown) {
            (Some(html), true) => (html.as_str(), "text/html"),
            _ => (self.content.as_str(), "text/x-markdown"),
        };
        obj.insert("content".into(), Value::from(content));
        obj.insert("content_type".into(), Value::from(content_type));
        Value::Object(obj)
    }

    /// Whether this message was sent by the client application named `client_name`.
    ///
    /// Names match exactly, ignoring ASCII case.
    pub fn sent_by_client(&self, client_name: &str) -> bool {
        self.sending_client
            .as_deref()
            .map_or(false, |sender| sender.eq_ignore_ascii_case(client_name))
    }
}
