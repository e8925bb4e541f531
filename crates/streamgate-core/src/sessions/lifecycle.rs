use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::frame::{CONNECTED_EVENT, SESSION_EXPIRED_EVENT, event_frame, heartbeat_frame};
use super::registry::{Session, SessionRegistry};
use super::sink::EventSink;
use crate::auth::Identity;
use crate::error::SessionError;

/// Per-session timings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleConfig {
    pub heartbeat_interval: Duration,
    /// Absolute lifetime, independent of activity
    pub max_lifetime: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            max_lifetime: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
}

/// What ended a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The client went away
    PeerClosed,
    TransportError,
    HeartbeatFailed,
    /// A write exceeded the registry's write timeout
    Timeout,
    /// Removed from the registry by someone else
    Evicted,
    /// Hit the absolute lifetime
    Expired,
}

struct Status {
    state: SessionState,
    reason: Option<CloseReason>,
}

struct Tasks {
    heartbeat: JoinHandle<()>,
    expiry: JoinHandle<()>,
}

impl Tasks {
    fn abort(self) {
        self.heartbeat.abort();
        self.expiry.abort();
    }
}

/// Drives one session from `Connecting` through `Open` to `Closed`.
///
/// The controller owns the heartbeat and lifetime tasks. Whichever trigger
/// fires first closes the session; every later trigger is a no-op.
pub struct SessionController {
    session: Arc<Session>,
    registry: SessionRegistry,
    status: Mutex<Status>,
    tasks: Mutex<Option<Tasks>>,
}

impl SessionController {
    /// Greet the client, register the session and start its timers.
    ///
    /// If the `connected` frame cannot be written the sink is closed and
    /// the session is never registered.
    pub async fn open(
        registry: SessionRegistry,
        sink: Arc<dyn EventSink>,
        identity: Option<&Identity>,
        config: LifecycleConfig,
    ) -> Result<Arc<Self>, SessionError> {
        let session = Arc::new(Session::new(Uuid::new_v4().to_string(), sink));
        let controller = Arc::new(Self {
            session,
            registry,
            status: Mutex::new(Status {
                state: SessionState::Connecting,
                reason: None,
            }),
            tasks: Mutex::new(None),
        });

        let greeting = event_frame(CONNECTED_EVENT, &connected_payload(&controller.session, identity));
        if let Err(e) = controller.registry.deliver(&controller.session, &greeting).await {
            tracing::warn!(session_id = %controller.session.id, error = %e, "Failed to open session");
            controller.mark_closed(CloseReason::TransportError);
            controller.session.sink.close();
            return Err(e);
        }

        controller.registry.connect(controller.session.clone());
        {
            let mut status = controller.status();
            if status.state == SessionState::Connecting {
                status.state = SessionState::Open;
            }
        }

        let weak = Arc::downgrade(&controller);
        let tasks = Tasks {
            heartbeat: tokio::spawn(run_heartbeat(
                weak.clone(),
                config.heartbeat_interval,
                controller.session.eviction(),
            )),
            expiry: tokio::spawn(run_expiry(weak, config.max_lifetime)),
        };
        {
            let mut slot = controller.tasks();
            if controller.state() == SessionState::Closed {
                tasks.abort();
            } else {
                *slot = Some(tasks);
            }
        }

        tracing::info!(
            session_id = %controller.session.id,
            user_id = identity.map(|i| i.user_id.as_str()),
            "Session opened"
        );
        Ok(controller)
    }

    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.session.created_at
    }

    pub fn state(&self) -> SessionState {
        self.status().state
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.status().reason
    }

    /// The client disconnected.
    pub fn on_peer_close(&self) -> bool {
        self.close(CloseReason::PeerClosed)
    }

    /// The connection failed underneath the session.
    ///
    /// For transports that surface socket errors. Over HTTP the connection
    /// only ever shows up as a dropped body, see [`Self::on_peer_close`].
    pub fn on_transport_error(&self, error: &SessionError) -> bool {
        tracing::debug!(session_id = %self.session.id, error = %error, "Stream transport error");
        self.close(CloseReason::TransportError)
    }

    /// Lifetime reached: tell the client, then close.
    pub async fn expire(&self) -> bool {
        if self.state() == SessionState::Closed {
            return false;
        }

        let payload = json!({
            "sessionId": self.session.id,
            "reason": "max session lifetime reached",
        });
        if let Err(e) = self
            .registry
            .deliver(&self.session, &event_frame(SESSION_EXPIRED_EVENT, &payload))
            .await
        {
            tracing::debug!(session_id = %self.session.id, error = %e, "Could not send expiry notice");
        }

        self.close(CloseReason::Expired)
    }

    /// Tear the session down. Only the first call has any effect; it
    /// returns `true`.
    pub fn close(&self, reason: CloseReason) -> bool {
        if !self.mark_closed(reason) {
            return false;
        }

        if let Some(tasks) = self.tasks().take() {
            tasks.abort();
        }
        self.registry.disconnect(&self.session.id);
        self.session.sink.close();

        let lifetime = Utc::now() - self.session.created_at;
        tracing::info!(
            session_id = %self.session.id,
            reason = ?reason,
            lifetime_secs = lifetime.num_seconds(),
            "Session closed"
        );
        true
    }

    fn mark_closed(&self, reason: CloseReason) -> bool {
        let mut status = self.status();
        if status.state == SessionState::Closed {
            return false;
        }
        status.state = SessionState::Closed;
        status.reason = Some(reason);
        true
    }

    fn status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tasks(&self) -> MutexGuard<'_, Option<Tasks>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("session_id", &self.session.id)
            .field("state", &self.state())
            .field("close_reason", &self.close_reason())
            .finish()
    }
}

fn connected_payload(session: &Session, identity: Option<&Identity>) -> Value {
    let user = identity.map(|identity| {
        json!({
            "userId": identity.user_id,
            "userName": identity.user_name,
            "clientId": identity.client_id,
            "grantType": identity.grant_type,
        })
    });
    json!({
        "sessionId": session.id,
        "createdAt": session.created_at.to_rfc3339(),
        "user": user,
    })
}

async fn run_heartbeat(
    controller: Weak<SessionController>,
    interval: Duration,
    eviction: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    loop {
        tokio::select! {
            _ = eviction.cancelled() => {
                if let Some(controller) = controller.upgrade() {
                    controller.close(CloseReason::Evicted);
                }
                return;
            }
            _ = ticker.tick() => {
                let Some(controller) = controller.upgrade() else {
                    return;
                };
                let frame = heartbeat_frame(Utc::now().timestamp_millis());
                if let Err(e) = controller.registry.deliver(&controller.session, &frame).await {
                    tracing::warn!(session_id = %controller.session.id, error = %e, "Heartbeat failed");
                    let reason = match e {
                        SessionError::WriteTimeout(_) => CloseReason::Timeout,
                        _ => CloseReason::HeartbeatFailed,
                    };
                    controller.close(reason);
                    return;
                }
            }
        }
    }
}

async fn run_expiry(controller: Weak<SessionController>, lifetime: Duration) {
    tokio::time::sleep(lifetime).await;
    if let Some(controller) = controller.upgrade() {
        tracing::debug!(session_id = %controller.session.id, "Session lifetime reached");
        controller.expire().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingSink;

    const SETTLE: Duration = Duration::from_millis(10);

    fn config(heartbeat_secs: u64, lifetime_secs: u64) -> LifecycleConfig {
        LifecycleConfig {
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
            max_lifetime: Duration::from_secs(lifetime_secs),
        }
    }

    fn heartbeats(frames: &[String]) -> usize {
        frames.iter().filter(|f| f.starts_with(":heartbeat ")).count()
    }

    fn data_of(frame: &str) -> Value {
        let data = frame
            .lines()
            .find_map(|line| line.strip_prefix("data: "))
            .unwrap();
        serde_json::from_str(data).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_greets_and_registers() {
        let registry = SessionRegistry::new();
        let sink = RecordingSink::new();
        let identity = Identity {
            user_id: "user-1".to_string(),
            user_name: Some("jdoe".to_string()),
            email: None,
            client_id: "sb-myapp!t1".to_string(),
            scopes: vec![],
            grant_type: "authorization_code".to_string(),
        };

        let controller = SessionController::open(
            registry.clone(),
            sink.clone(),
            Some(&identity),
            LifecycleConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(controller.state(), SessionState::Open);
        assert_eq!(registry.list_ids(), vec![controller.session_id().to_string()]);
        assert!(Uuid::parse_str(controller.session_id()).is_ok());

        let frames = sink.frames();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with("event: connected\n"));
        let data = data_of(&frames[0]);
        assert_eq!(data["sessionId"], controller.session_id());
        assert_eq!(data["user"]["userId"], "user-1");
        assert_eq!(data["user"]["clientId"], "sb-myapp!t1");
        assert!(DateTime::parse_from_rfc3339(data["createdAt"].as_str().unwrap()).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_anonymous_session_has_null_user() {
        let sink = RecordingSink::new();
        let _controller =
            SessionController::open(SessionRegistry::new(), sink.clone(), None, config(30, 3600))
                .await
                .unwrap();

        assert!(data_of(&sink.frames()[0])["user"].is_null());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_greeting_never_registers() {
        let registry = SessionRegistry::new();
        let sink = RecordingSink::failing();

        let result =
            SessionController::open(registry.clone(), sink.clone(), None, config(30, 3600)).await;

        assert!(matches!(result, Err(SessionError::Transport(_))));
        assert_eq!(registry.count(), 0);
        assert_eq!(sink.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_cadence() {
        let sink = RecordingSink::new();
        let _controller =
            SessionController::open(SessionRegistry::new(), sink.clone(), None, config(30, 3600))
                .await
                .unwrap();

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(heartbeats(&sink.frames()), 0);

        tokio::time::sleep(Duration::from_secs(66)).await;
        assert_eq!(heartbeats(&sink.frames()), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_closes_exactly_once() {
        let registry = SessionRegistry::new();
        let sink = RecordingSink::new();
        let controller =
            SessionController::open(registry.clone(), sink.clone(), None, config(30, 100))
                .await
                .unwrap();

        tokio::time::sleep(Duration::from_secs(100) + SETTLE).await;

        assert_eq!(controller.state(), SessionState::Closed);
        assert_eq!(controller.close_reason(), Some(CloseReason::Expired));
        assert_eq!(registry.count(), 0);
        assert_eq!(sink.close_count(), 1);

        let frames = sink.frames();
        assert_eq!(heartbeats(&frames), 3);
        let last = frames.last().unwrap();
        assert!(last.starts_with("event: session-expired\n"));
        assert_eq!(data_of(last)["sessionId"], controller.session_id());

        // Later triggers are no-ops and the timers are gone
        assert!(!controller.on_peer_close());
        assert!(!controller.expire().await);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(sink.frames().len(), frames.len());
        assert_eq!(sink.close_count(), 1);
        assert_eq!(controller.close_reason(), Some(CloseReason::Expired));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_ignores_failed_notice() {
        let registry = SessionRegistry::new();
        // Greeting and three heartbeats succeed, the expiry notice fails
        let sink = RecordingSink::failing_after(4);
        let controller =
            SessionController::open(registry.clone(), sink.clone(), None, config(30, 100))
                .await
                .unwrap();

        tokio::time::sleep(Duration::from_secs(100) + SETTLE).await;

        assert_eq!(controller.close_reason(), Some(CloseReason::Expired));
        assert_eq!(registry.count(), 0);
        assert_eq!(sink.close_count(), 1);
        let frames = sink.frames();
        assert_eq!(frames.len(), 4);
        assert!(!frames.iter().any(|f| f.starts_with("event: session-expired")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_gives_up_on_stalled_notice() {
        let registry = SessionRegistry::with_write_timeout(Duration::from_secs(5));
        let sink = RecordingSink::stalled_after(4);
        let controller =
            SessionController::open(registry.clone(), sink.clone(), None, config(30, 100))
                .await
                .unwrap();

        tokio::time::sleep(Duration::from_secs(100) + SETTLE).await;
        assert_eq!(controller.state(), SessionState::Open);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(controller.state(), SessionState::Closed);
        assert_eq!(controller.close_reason(), Some(CloseReason::Expired));
        assert_eq!(registry.count(), 0);
        assert_eq!(sink.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_close_stops_timers() {
        let registry = SessionRegistry::new();
        let sink = RecordingSink::new();
        let controller =
            SessionController::open(registry.clone(), sink.clone(), None, config(30, 100))
                .await
                .unwrap();

        assert!(controller.on_peer_close());
        assert_eq!(registry.count(), 0);

        tokio::time::sleep(Duration::from_secs(200)).await;
        assert_eq!(sink.frames().len(), 1);
        assert_eq!(sink.close_count(), 1);
        assert_eq!(controller.close_reason(), Some(CloseReason::PeerClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_failure_closes() {
        let registry = SessionRegistry::new();
        let sink = RecordingSink::failing_after(1);
        let controller =
            SessionController::open(registry.clone(), sink.clone(), None, config(30, 3600))
                .await
                .unwrap();

        tokio::time::sleep(Duration::from_secs(30) + SETTLE).await;

        assert_eq!(controller.close_reason(), Some(CloseReason::HeartbeatFailed));
        assert_eq!(registry.count(), 0);
        assert_eq!(sink.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_heartbeat_times_out() {
        let registry = SessionRegistry::with_write_timeout(Duration::from_secs(5));
        let sink = RecordingSink::stalled_after(1);
        let controller =
            SessionController::open(registry.clone(), sink.clone(), None, config(30, 3600))
                .await
                .unwrap();

        tokio::time::sleep(Duration::from_secs(35) + SETTLE).await;

        assert_eq!(controller.close_reason(), Some(CloseReason::Timeout));
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_eviction_tears_down() {
        let registry = SessionRegistry::new();
        let sink = RecordingSink::new();
        let controller =
            SessionController::open(registry.clone(), sink.clone(), None, config(30, 3600))
                .await
                .unwrap();

        assert!(registry.disconnect(controller.session_id()));
        tokio::time::sleep(SETTLE).await;

        assert_eq!(controller.state(), SessionState::Closed);
        assert_eq!(controller.close_reason(), Some(CloseReason::Evicted));
        assert_eq!(sink.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_send_evicts_controller() {
        let registry = SessionRegistry::new();
        let sink = RecordingSink::failing_after(1);
        let controller =
            SessionController::open(registry.clone(), sink.clone(), None, config(30, 3600))
                .await
                .unwrap();

        assert!(!registry.send_to(controller.session_id(), "update", &json!({})).await);
        tokio::time::sleep(SETTLE).await;

        assert_eq!(controller.close_reason(), Some(CloseReason::Evicted));
        assert_eq!(sink.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_closes() {
        let sink = RecordingSink::new();
        let controller =
            SessionController::open(SessionRegistry::new(), sink.clone(), None, config(30, 3600))
                .await
                .unwrap();

        let err = SessionError::Transport("broken pipe".to_string());
        assert!(controller.on_transport_error(&err));
        assert!(!controller.on_transport_error(&err));
        assert_eq!(controller.close_reason(), Some(CloseReason::TransportError));
    }
}
