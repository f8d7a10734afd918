//! Real-time event delivery for a team chat server
//!
//! The broker sits beside the chat server's persistence tier.  After the persistence tier
//! commits a message (or a pointer move, or a subscription change) it posts a notice to
//! the broker, which wakes every client long-polling for it.
//!
//! # Notes on data flow
//! * **Client Request → Warp**:
//! Warp filters for valid requests and parses them into an `Identity` (from headers set by
//! the authenticating front end) plus typed query parameters.
//!
//! * **Warp → long-poll handler**:
//! The long-poll handler checks the broker's in-memory tables under its lock.  If there's
//! already something newer than the client's cursor, it replies at once; otherwise it
//! parks the request by registering a one-shot `Handler` and waits on it, with the lock
//! released.  Cold caches are filled from the persistence tier on tokio's blocking pool.
//!
//! * **Persistence tier → Broker**:
//! `POST /notify` applies a `Notice`: message ids are recorded for each recipient and
//! stream, events are queued for registered clients, and every parked request waiting
//! on an affected key is woken exactly once.
//!
//! * **Idle queue collector**:
//! A background task periodically reclaims clients that haven't polled for a while.

pub mod config;
pub mod err;
pub mod event;
pub mod request;
pub mod response;
