use std::fmt;

#[derive(Debug)]
pub enum EventErr {
    UnknownNotificationType(String),
    MissingType,
    UnknownEventType(String, String),
    Serde(serde_json::Error),
}

impl std::error::Error for EventErr {}

impl fmt::Display for EventErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use EventErr::*;
        match self {
            UnknownNotificationType(t) => write!(f, "unknown notification type `{}`", t),
            MissingType => write!(f, "notification is missing its `type` field"),
            UnknownEventType(t, allowed) => {
                write!(f, "unknown event type `{}`; must be one of {}", t, allowed)
            }
            Serde(inner) => write!(f, "malformed notification: {}", inner),
        }
    }
}

impl From<serde_json::Error> for EventErr {
    fn from(error: serde_json::Error) -> Self {
        Self::Serde(error)
    }
}
