//! Parse client requests with warp filters and hand them to the broker
mod err;
mod identity;
mod query;

pub use err::RequestErr;
pub use identity::Identity;
pub use query::{EventsQuery, RegisterQuery, UpdatesQuery};

use crate::config;
use crate::event::Notice;
use crate::response::{long_poll, ClientOptions, IngestGate, SharedBroker};

use serde::Serialize;
use serde_json::{json, Value};
use std::convert::{Infallible, TryFrom};
use warp::http::StatusCode;
use warp::reject::Rejection;
use warp::{path, Filter, Reply};

#[derive(Debug, Clone)]
pub struct Handler {
    broker: SharedBroker,
    secret: Option<String>,
    gate: IngestGate,
}

impl Handler {
    pub fn new(broker: SharedBroker, cfg: &config::Broker) -> Self {
        Self {
            broker,
            secret: (*cfg.shared_secret).clone(),
            gate: IngestGate::default(),
        }
    }

    /// Every route the broker serves, with errors rendered as JSON.
    pub fn routes(&self) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
        self.get_updates()
            .or(self.events())
            .or(self.register())
            .or(self.notify())
            .or(self.status())
            .recover(Self::err)
    }

    pub fn get_updates(&self) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        let broker = self.broker.clone();
        path!("json" / "get_updates")
            .and(Identity::from_header())
            .and(query::params::<UpdatesQuery>())
            .and_then(move |who: Identity, q: UpdatesQuery| {
                let broker = broker.clone();
                async move {
                    log::info!("Incoming get_updates request from user {}", who.user_id);
                    long_poll::get_updates(broker, who, q)
                        .await
                        .map(|updates| warp::reply::json(&updates))
                        .map_err(|e| warp::reject::custom(RequestErr::from(e)))
                }
            })
    }

    pub fn events(&self) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        let broker = self.broker.clone();
        path!("api" / "v1" / "events")
            .and(warp::get())
            .and(Identity::from_header())
            .and(warp::query::<EventsQuery>())
            .and_then(move |who: Identity, q: EventsQuery| {
                let broker = broker.clone();
                async move {
                    log::info!("Incoming events request for queue {}", q.queue_id);
                    long_poll::get_events(broker, who, q)
                        .await
                        .map(|events| warp::reply::json(&events))
                        .map_err(|e| warp::reject::custom(RequestErr::from(e)))
                }
            })
    }

    pub fn register(&self) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        let broker = self.broker.clone();
        path!("api" / "v1" / "register")
            .and(Identity::from_header())
            .and(query::params::<RegisterQuery>())
            .and_then(move |who: Identity, q: RegisterQuery| {
                let broker = broker.clone();
                async move {
                    let options = ClientOptions::try_from(q).map_err(warp::reject::custom)?;
                    let registration = long_poll::register(&broker, who, options);
                    log::info!(
                        "Registered queue {} for user {}",
                        registration.queue_id,
                        who.user_id
                    );
                    Ok::<_, Rejection>(warp::reply::json(&registration))
                }
            })
    }

    /// Notices from the persistence tier.
    pub fn notify(&self) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        let (broker, gate, secret) = (self.broker.clone(), self.gate.clone(), self.secret.clone());
        path!("notify")
            .and(warp::post())
            .and(bearer_token())
            .and(warp::body::content_length_limit(1024 * 1024))
            .and(warp::body::json::<Value>())
            .and_then(move |token: Option<String>, body: Value| {
                let (broker, gate, secret) = (broker.clone(), gate.clone(), secret.clone());
                async move {
                    if secret.is_some() && token != secret {
                        log::warn!("Rejected notice with a bad shared secret");
                        return Err(warp::reject::custom(RequestErr::BadSecret));
                    }
                    let notice = Notice::try_from(body).map_err(|e| {
                        log::warn!("Rejected notice: {}", e);
                        warp::reject::custom(RequestErr::from(e))
                    })?;
                    long_poll::ingest(&broker, &gate, notice).await;
                    Ok(warp::reply::json(&json!({"result": "success"})))
                }
            })
    }

    #[cfg(feature = "stub_status")]
    pub fn status(&self) -> impl Filter<Extract = (String,), Error = Rejection> + Clone {
        use crate::response::Broker;
        let broker = self.broker.clone();
        let health = path!("api" / "v1" / "health").map(|| "OK".to_string());
        let status = path!("api" / "v1" / "status")
            .map(move || broker.lock().unwrap_or_else(Broker::recover).count());
        warp::get().and(health.or(status).unify())
    }

    #[cfg(not(feature = "stub_status"))]
    pub fn status(&self) -> impl Filter<Extract = (String,), Error = Rejection> + Clone {
        warp::get().and(path!("api" / "v1" / "health").map(|| "OK".to_string()))
    }

    pub async fn err(r: Rejection) -> Result<impl Reply, Infallible> {
        let (status, reply) = if let Some(e) = r.find::<RequestErr>() {
            let retryable = matches!(e, RequestErr::Broker(inner) if inner.is_retryable());
            (e.status(), ErrReply::new(e.code(), e).retryable(retryable))
        } else if r.is_not_found() {
            (StatusCode::NOT_FOUND, ErrReply::new("NOT_FOUND", "no such endpoint"))
        } else if let Some(e) = r.find::<warp::reject::MethodNotAllowed>() {
            (StatusCode::METHOD_NOT_ALLOWED, ErrReply::new("BAD_REQUEST", e))
        } else if let Some(e) = r.find::<warp::reject::InvalidQuery>() {
            (StatusCode::BAD_REQUEST, ErrReply::new("BAD_REQUEST", e))
        } else if let Some(e) = r.find::<warp::filters::body::BodyDeserializeError>() {
            (StatusCode::BAD_REQUEST, ErrReply::new("BAD_REQUEST", e))
        } else {
            log::error!("Unhandled rejection: {:?}", r);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrReply::new("INTERNAL_ERROR", "internal server error"),
            )
        };
        Ok(warp::reply::with_status(warp::reply::json(&reply), status))
    }
}

#[derive(Serialize)]
struct ErrReply {
    result: &'static str,
    code: &'static str,
    msg: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    retryable: bool,
}

impl ErrReply {
    fn new(code: &'static str, msg: impl std::fmt::Display) -> Self {
        Self {
            result: "error",
            code,
            msg: msg.to_string(),
            retryable: false,
        }
    }

    fn retryable(self, retryable: bool) -> Self {
        Self { retryable, ..self }
    }
}

/// The token from an `Authorization: Bearer <token>` header, if there is one.
fn bearer_token() -> impl Filter<Extract = (Option<String>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").map(|auth: Option<String>| {
        auth.and_then(|auth| auth.split(' ').nth(1).map(String::from))
    })
}
