//! Validate query params with type checking
use super::RequestErr;
use crate::event::{EventType, MessageId};
use crate::response::ClientOptions;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::convert::TryFrom;
use warp::filters::BoxedFilter;
use warp::Filter as WarpFilter;

fn yes() -> bool {
    true
}

/// Parameters of `/json/get_updates`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct UpdatesQuery {
    pub last: Option<MessageId>,
    pub client_pointer: Option<MessageId>,
    #[serde(default)]
    pub dont_block: bool,
    pub stream_name: Option<String>,
    pub client_server_generation: Option<u64>,
    pub queue_id: Option<String>,
    pub mirror: Option<String>,
    #[serde(default = "yes")]
    pub apply_markdown: bool,
}

impl Default for UpdatesQuery {
    fn default() -> Self {
        Self {
            last: None,
            client_pointer: None,
            dont_block: false,
            stream_name: None,
            client_server_generation: None,
            queue_id: None,
            mirror: None,
            apply_markdown: true,
        }
    }
}

/// Parameters of `/api/v1/events`.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct EventsQuery {
    #[serde(default)]
    pub queue_id: String,
    pub last_event_id: Option<i64>,
    #[serde(default)]
    pub dont_block: bool,
}

/// Parameters of `/api/v1/register`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RegisterQuery {
    #[serde(default = "yes")]
    pub apply_markdown: bool,
    pub event_types: Option<String>,
    pub client_name: Option<String>,
}

impl TryFrom<RegisterQuery> for ClientOptions {
    type Error = RequestErr;

    fn try_from(q: RegisterQuery) -> Result<Self, Self::Error> {
        Ok(Self {
            apply_markdown: q.apply_markdown,
            event_types: q.event_types.as_deref().map(EventType::parse_list).transpose()?,
            client_name: q.client_name.filter(|name| !name.is_empty()),
        })
    }
}

/// Read `T` from the query string of a GET or the urlencoded body of a POST.
pub(crate) fn params<T>() -> BoxedFilter<(T,)>
where
    T: DeserializeOwned + Send + 'static,
{
    let from_query = warp::get().and(warp::query::<T>());
    let from_form = warp::post()
        .and(warp::body::content_length_limit(16 * 1024))
        .and(warp::body::form::<T>());
    from_query.or(from_form).unify().boxed()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn register_parses_event_types() -> Result<(), RequestErr> {
        let options = ClientOptions::try_from(RegisterQuery {
            apply_markdown: false,
            event_types: Some("message,pointer".into()),
            client_name: Some("website".into()),
        })?;
        assert_eq!(
            options.event_types,
            Some(vec![EventType::Message, EventType::Pointer])
        );
        assert!(!options.apply_markdown);
        assert_eq!(options.client_name.as_deref(), Some("website"));
        Ok(())
    }

    #[test]
    fn register_rejects_unknown_event_types() {
        let q = RegisterQuery {
            apply_markdown: true,
            event_types: Some("message,typing".into()),
            client_name: None,
        };
        assert!(matches!(
            ClientOptions::try_from(q),
            Err(RequestErr::Event(_))
        ));
    }
}
