use crate::event::{RealmId, UserId};

use std::fmt;

/// What a client can wait on: everything delivered to one user, or everything sent to
/// one stream of a realm.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    User(UserId),
    Stream(RealmId, String),
}

impl Key {
    /// Stream names are case-insensitive, so the key holds the lowercased name.
    pub fn stream(realm: RealmId, name: &str) -> Self {
        Self::Stream(realm, name.to_lowercase())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::User(user) => write!(f, "user:{}", user),
            Self::Stream(realm, name) => write!(f, "stream:{}:{}", realm, name),
        }
    }
}
