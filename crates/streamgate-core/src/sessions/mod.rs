//! Live push-event sessions
//!
//! A [`SessionRegistry`] holds every open stream by id and fans events out
//! to them. Each stream is driven by a [`SessionController`], which sends
//! the `connected` greeting, emits heartbeats, enforces the absolute
//! lifetime, and tears the session down exactly once.

mod frame;
mod lifecycle;
mod registry;
mod sink;

pub use frame::{
    CONNECTED_EVENT, SESSION_EXPIRED_EVENT, event_frame, heartbeat_frame, is_valid_event_name,
};
pub use lifecycle::{CloseReason, LifecycleConfig, SessionController, SessionState};
pub use registry::{BroadcastReport, DEFAULT_WRITE_TIMEOUT, Session, SessionRegistry};
pub use sink::{ChannelSink, EventSink};
