use crate::event::EventErr;
use crate::response::BrokerErr;

use std::fmt;
use warp::http::StatusCode;

/// Why a request was turned away.  Every variant becomes a JSON error reply in
/// `Handler::err`.
#[derive(Debug)]
pub enum RequestErr {
    Unauthenticated(String),
    BadSecret,
    Event(EventErr),
    Broker(BrokerErr),
}

impl RequestErr {
    pub fn status(&self) -> StatusCode {
        use RequestErr::*;
        match self {
            Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            BadSecret => StatusCode::FORBIDDEN,
            Event(_) => StatusCode::BAD_REQUEST,
            Broker(BrokerErr::StaleCursor { .. }) | Broker(BrokerErr::BadQueueId(_)) => {
                StatusCode::BAD_REQUEST
            }
            Broker(BrokerErr::QueueOwner(_)) => StatusCode::FORBIDDEN,
            Broker(BrokerErr::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        use RequestErr::*;
        match self {
            Unauthenticated(_) => "UNAUTHORIZED",
            BadSecret => "BAD_SECRET",
            Event(_) => "BAD_REQUEST",
            Broker(BrokerErr::StaleCursor { .. }) => "STALE_CURSOR",
            Broker(BrokerErr::BadQueueId(_)) | Broker(BrokerErr::QueueOwner(_)) => {
                "BAD_EVENT_QUEUE_ID"
            }
            Broker(BrokerErr::Store(_)) => "STORE_UNAVAILABLE",
        }
    }
}

impl warp::reject::Reject for RequestErr {}
impl std::error::Error for RequestErr {}

impl fmt::Display for RequestErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use RequestErr::*;
        match self {
            Unauthenticated(why) => write!(f, "not authenticated: {}", why),
            BadSecret => write!(f, "missing or incorrect shared secret"),
            Event(e) => write!(f, "{}", e),
            Broker(e) => write!(f, "{}", e),
        }
    }
}

impl From<EventErr> for RequestErr {
    fn from(e: EventErr) -> Self {
        Self::Event(e)
    }
}
impl From<BrokerErr> for RequestErr {
    fn from(e: BrokerErr) -> Self {
        Self::Broker(e)
    }
}
