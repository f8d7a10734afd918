use super::RequestErr;
use crate::event::{RealmId, UserId};

use warp::filters::BoxedFilter;
use warp::Filter as WarpFilter;

/// Who is asking, as vouched for by the authenticating front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub realm_id: RealmId,
}

impl Identity {
    pub fn new(user_id: i64, realm_id: i64) -> Self {
        Self {
            user_id: UserId(user_id),
            realm_id: RealmId(realm_id),
        }
    }

    pub(crate) fn from_headers(user: Option<&str>, realm: Option<&str>) -> Result<Self, RequestErr> {
        let user_id = user
            .ok_or_else(|| RequestErr::Unauthenticated("missing X-User-Id header".into()))?
            .trim()
            .parse()
            .map_err(|_| RequestErr::Unauthenticated("X-User-Id is not a user id".into()))?;
        let realm_id = match realm {
            Some(realm) => realm
                .trim()
                .parse()
                .map_err(|_| RequestErr::Unauthenticated("X-Realm-Id is not a realm id".into()))?,
            None => 0,
        };
        Ok(Self::new(user_id, realm_id))
    }

    pub(crate) fn from_header() -> BoxedFilter<(Self,)> {
        warp::header::optional::<String>("x-user-id")
            .and(warp::header::optional::<String>("x-realm-id"))
            .and_then(|user: Option<String>, realm: Option<String>| async move {
                Self::from_headers(user.as_deref(), realm.as_deref()).map_err(warp::reject::custom)
            })
            .boxed()
    }
}
