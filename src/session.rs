//! Connection resilience wrapper for one upstream live session.
//!
//! [`LiveSession`] is a thin handle over a background supervisor task that
//! owns a [`LiveSource`] and keeps it connected: failed attempts and dropped
//! connections are retried with exponential backoff, jitter, and
//! error-class-specific growth, while terminal conditions (caller
//! disconnect, upstream stream end, retry exhaustion) stop the loop and
//! surface a single `Disconnected` event.
//!
//! Reconnections are silent to the owner — `Connected` is emitted once, on
//! the initial success. The owner never observes a flapping link, only the
//! content events that flow while one is up.
//!
//! # Example
//!
//! ```rust,ignore
//! let source = connect_provider_somehow();
//! let config = SessionConfig::new("kayzedra");
//! let (mut session, mut events) = LiveSession::start(source, config);
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SessionEvent::Connected(room) => { /* … */ }
//!         SessionEvent::Content(content) => { /* feed the game engine */ }
//!         SessionEvent::Disconnected { reason } => break,
//!     }
//! }
//! session.disconnect().await;
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::error::FailureKind;
use crate::event::SessionEvent;
use crate::source::{LiveEvent, LiveSource};

// ── Connection gauge ────────────────────────────────────────────────

/// Process-wide count of active upstream connections.
///
/// Owned by whatever supervisor creates sessions and passed into
/// [`LiveSession::start_with`]; each session increments it when a connection
/// is established and decrements it when that connection drops, atomically
/// relative to the transitions themselves.
#[derive(Debug, Clone, Default)]
pub struct ConnectionGauge(Arc<AtomicUsize>);

impl ConnectionGauge {
    /// Create a gauge starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently active upstream connections.
    pub fn active(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    fn incr(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    fn decr(&self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// Internal state shared between the handle and the supervisor task.
struct SessionStats {
    connected: AtomicBool,
    /// Set by [`SessionHandle::disconnect`]; checked by the supervisor after
    /// every in-flight attempt resolves, before the result is exposed.
    disconnected: AtomicBool,
    reconnect_count: AtomicU32,
    next_wait_ms: AtomicU64,
    /// Epoch ms of the most recent successful connect; 0 = never connected.
    last_connected_ms: AtomicU64,
}

impl SessionStats {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            reconnect_count: AtomicU32::new(0),
            next_wait_ms: AtomicU64::new(0),
            last_connected_ms: AtomicU64::new(0),
        }
    }
}

/// Point-in-time health summary of a session, from [`SessionHandle::info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Whether an upstream connection is currently live.
    pub is_connected: bool,
    /// Reconnect attempts made since the backoff state was last reset.
    pub reconnect_count: u32,
    /// Configured attempt budget.
    pub max_attempts: u32,
    /// The most recently computed reconnect wait, in milliseconds.
    pub next_wait_ms: u64,
    /// Epoch ms of the most recent successful connect, if any.
    pub last_connected_at_ms: Option<u64>,
}

// ── Session handle ──────────────────────────────────────────────────

/// Facade for starting a supervised live session.
pub struct LiveSession;

impl LiveSession {
    /// Start supervising `source` with the system clock and a private
    /// connection gauge.
    #[must_use = "the event receiver must be used to receive session events"]
    pub fn start(
        source: impl LiveSource,
        config: SessionConfig,
    ) -> (SessionHandle, mpsc::Receiver<SessionEvent>) {
        Self::start_with(
            source,
            config,
            Arc::new(SystemClock),
            ConnectionGauge::new(),
        )
    }

    /// Start supervising `source` with an explicit clock and gauge.
    ///
    /// The clock is injected so tests can simulate time passage; the gauge
    /// lets a process-level supervisor observe its total active connections.
    #[must_use = "the event receiver must be used to receive session events"]
    pub fn start_with(
        source: impl LiveSource,
        config: SessionConfig,
        clock: Arc<dyn Clock>,
        gauge: ConnectionGauge,
    ) -> (SessionHandle, mpsc::Receiver<SessionEvent>) {
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let stats = Arc::new(SessionStats::new());
        let session_id = Uuid::new_v4();
        let identity = config.identity.clone();
        let disconnect_timeout = config.disconnect_timeout;
        let max_attempts = config.max_reconnect_attempts;

        let task = tokio::spawn(supervise(
            source,
            config,
            clock,
            gauge.clone(),
            Arc::clone(&stats),
            event_tx,
            shutdown_rx,
            session_id,
        ));

        let handle = SessionHandle {
            stats,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            disconnect_timeout,
            identity,
            session_id,
            gauge,
            max_attempts,
        };
        (handle, event_rx)
    }
}

/// Handle to a supervised live session.
pub struct SessionHandle {
    stats: Arc<SessionStats>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    disconnect_timeout: Duration,
    identity: String,
    session_id: Uuid,
    gauge: ConnectionGauge,
    max_attempts: u32,
}

impl SessionHandle {
    /// The stream identity this session supervises.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Unique id of this session instance (used in log correlation).
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Whether an upstream connection is currently live.
    pub fn is_connected(&self) -> bool {
        self.stats.connected.load(Ordering::Acquire)
    }

    /// The gauge counting this session among the active connections.
    pub fn gauge(&self) -> &ConnectionGauge {
        &self.gauge
    }

    /// Point-in-time health summary.
    pub fn info(&self) -> SessionInfo {
        let last = self.stats.last_connected_ms.load(Ordering::Acquire);
        SessionInfo {
            is_connected: self.is_connected(),
            reconnect_count: self.stats.reconnect_count.load(Ordering::Acquire),
            max_attempts: self.max_attempts,
            next_wait_ms: self.stats.next_wait_ms.load(Ordering::Acquire),
            last_connected_at_ms: (last != 0).then_some(last),
        }
    }

    /// Disconnect the session, permanently disabling reconnection.
    ///
    /// Idempotent. Guarantees that no `Connected` event is emitted after this
    /// call returns, even if a connection attempt was already in flight: the
    /// supervisor re-checks the disconnect flag the moment an attempt
    /// resolves and tears the new connection down instead of exposing it.
    pub async fn disconnect(&mut self) {
        debug!(
            identity = %self.identity,
            session = %self.session_id,
            "client disconnect requested"
        );
        self.stats.disconnected.store(true, Ordering::Release);

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the supervisor with a timeout. If it doesn't exit in time,
        // abort it so the task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.disconnect_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session supervisor terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session supervisor did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session supervisor aborted: {join_err}");
                    }
                }
            }
        }

        self.stats.connected.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("identity", &self.identity)
            .field("session_id", &self.session_id)
            .field("connected", &self.is_connected())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        // `Drop` is synchronous, so the only safe action is to abort the
        // supervisor task; its future is dropped immediately.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Supervisor ──────────────────────────────────────────────────────

/// Why the event pump stopped.
enum PumpOutcome {
    /// The owner requested disconnection.
    OwnerDisconnect,
    /// The upstream stream ended; the room is gone for good.
    StreamEnded,
    /// The connection dropped; carries the failure class and reason.
    Dropped(FailureKind, String),
}

/// Background supervisor: connect → pump → (reconnect | stop) loop.
///
/// A single task owns the source, so at most one connection attempt is in
/// flight and at most one reconnect timer is pending at any time. All waits
/// are non-blocking sleeps raced against the shutdown signal.
#[allow(clippy::too_many_arguments)]
async fn supervise(
    mut source: impl LiveSource,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    gauge: ConnectionGauge,
    stats: Arc<SessionStats>,
    event_tx: mpsc::Sender<SessionEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
    session_id: Uuid,
) {
    let identity = config.identity.clone();
    debug!(identity, session = %session_id, "session supervisor started");

    let mut is_reconnect = false;
    let mut reconnect_enabled = true;
    let mut backoff_ms = config.initial_backoff.as_millis() as u64;
    let stability_ms = config.stability_threshold.as_millis() as u64;
    // Time of the previous successful connect; a drop after more than the
    // stability threshold counts as a stable connection having ended.
    let mut last_connected_ms: Option<u64> = None;

    loop {
        debug!(
            identity,
            attempt = stats.reconnect_count.load(Ordering::Acquire),
            is_reconnect,
            "connecting to upstream"
        );

        let connect_result = tokio::select! {
            res = source.connect() => res,
            _ = &mut shutdown_rx => {
                debug!(identity, "disconnect requested during connection attempt");
                source.disconnect().await;
                return;
            }
        };

        let failure: (FailureKind, String) = match connect_result {
            Ok(room) => {
                gauge.incr();
                stats.connected.store(true, Ordering::Release);
                let now = clock.now_ms();
                let was_stable =
                    last_connected_ms.is_some_and(|t| now.saturating_sub(t) > stability_ms);
                last_connected_ms = Some(now);
                stats.last_connected_ms.store(now, Ordering::Release);

                if was_stable || !is_reconnect {
                    stats.reconnect_count.store(0, Ordering::Release);
                    backoff_ms = config.initial_backoff.as_millis() as u64;
                } else {
                    debug!(identity, "quick reconnection, keeping backoff state");
                }

                // The owner may have disconnected while the attempt was in
                // flight; tear down instead of exposing the connection.
                if stats.disconnected.load(Ordering::Acquire) {
                    debug!(identity, "connected after disconnect request, tearing down");
                    source.disconnect().await;
                    gauge.decr();
                    stats.connected.store(false, Ordering::Release);
                    return;
                }

                if is_reconnect {
                    info!(identity, room_id = %room.room_id, "reconnected to live room");
                } else {
                    info!(identity, room_id = %room.room_id, "connected to live room");
                    emit_event(&event_tx, SessionEvent::Connected(room)).await;
                }

                let outcome = pump_events(&mut source, &event_tx, &mut shutdown_rx).await;
                gauge.decr();
                stats.connected.store(false, Ordering::Release);

                match outcome {
                    PumpOutcome::OwnerDisconnect => {
                        debug!(identity, "client connection disconnected");
                        source.disconnect().await;
                        return;
                    }
                    PumpOutcome::StreamEnded => {
                        info!(identity, "stream ended, giving up connection");
                        reconnect_enabled = false;
                        source.disconnect().await;
                        emit_disconnected(&event_tx, &stats, "stream ended".into()).await;
                        return;
                    }
                    PumpOutcome::Dropped(kind, reason) => {
                        warn!(identity, ?kind, reason, "upstream connection dropped");
                        (kind, reason)
                    }
                }
            }
            Err(err) => {
                if !is_reconnect {
                    // Initial attempt: fail fast, the owner decides what next.
                    warn!(identity, error = %err, "initial connection failed");
                    emit_disconnected(&event_tx, &stats, err.to_string()).await;
                    return;
                }
                warn!(identity, error = %err, "reconnect attempt failed");
                (err.failure_kind(), err.to_string())
            }
        };

        // scheduleReconnect: no-op once disabled, terminal at the cap,
        // otherwise wait and try again.
        let (kind, reason) = failure;
        if !reconnect_enabled || stats.disconnected.load(Ordering::Acquire) {
            return;
        }

        let attempts = stats.reconnect_count.load(Ordering::Acquire);
        if attempts >= config.max_reconnect_attempts {
            warn!(identity, attempts, "giving up, max reconnect attempts exceeded");
            emit_disconnected(&event_tx, &stats, format!("connection lost: {reason}")).await;
            return;
        }

        let jitter_ms = random_jitter_ms(config.max_jitter);
        let wait_ms = compute_wait(&config, kind, backoff_ms, jitter_ms);
        stats.next_wait_ms.store(wait_ms, Ordering::Release);
        info!(
            identity,
            session = %session_id,
            attempt = attempts + 1,
            max_attempts = config.max_reconnect_attempts,
            wait_ms,
            reason,
            "scheduling reconnect"
        );

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(wait_ms)) => {}
            _ = &mut shutdown_rx => {
                debug!(identity, "disconnect requested, cancelling pending reconnect");
                return;
            }
        }
        if stats.disconnected.load(Ordering::Acquire) {
            return;
        }

        stats.reconnect_count.fetch_add(1, Ordering::AcqRel);
        backoff_ms = grow_backoff(&config, kind, backoff_ms);
        is_reconnect = true;
    }
}

/// Forward upstream events to the owner until the connection stops.
async fn pump_events(
    source: &mut impl LiveSource,
    event_tx: &mpsc::Sender<SessionEvent>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> PumpOutcome {
    loop {
        tokio::select! {
            _ = &mut *shutdown_rx => {
                return PumpOutcome::OwnerDisconnect;
            }
            event = source.next_event() => {
                match event {
                    Some(LiveEvent::Content(content)) => {
                        emit_event(event_tx, SessionEvent::Content(content)).await;
                    }
                    Some(LiveEvent::StreamEnded) => {
                        return PumpOutcome::StreamEnded;
                    }
                    Some(LiveEvent::Error(err)) => {
                        return PumpOutcome::Dropped(err.failure_kind(), err.to_string());
                    }
                    None => {
                        return PumpOutcome::Dropped(
                            FailureKind::ConnectionClosed,
                            "connection closed".into(),
                        );
                    }
                }
            }
        }
    }
}

// ── Backoff arithmetic ──────────────────────────────────────────────

/// Wait before the next reconnect attempt: `min(backoff + jitter, ceiling)`,
/// plus the fixed penalty for unclassified failures.
fn compute_wait(config: &SessionConfig, kind: FailureKind, backoff_ms: u64, jitter_ms: u64) -> u64 {
    let ceiling = config.backoff_ceiling.as_millis() as u64;
    let base = (backoff_ms + jitter_ms).min(ceiling);
    if kind == FailureKind::Unknown {
        base + config.unknown_error_delay.as_millis() as u64
    } else {
        base
    }
}

/// Grow the backoff interval after a failed attempt. Resets use the gentler
/// multiplier and lower ceiling; everything else the standard policy.
fn grow_backoff(config: &SessionConfig, kind: FailureKind, backoff_ms: u64) -> u64 {
    let (multiplier, ceiling) = match kind {
        FailureKind::Reset => (
            config.reset_backoff_multiplier,
            config.reset_backoff_ceiling.as_millis() as u64,
        ),
        _ => (
            config.backoff_multiplier,
            config.backoff_ceiling.as_millis() as u64,
        ),
    };
    ((backoff_ms as f64 * multiplier) as u64).min(ceiling)
}

/// Random jitter in `0..=max`, preventing thundering-herd reconnects.
fn random_jitter_ms(max_jitter: Duration) -> u64 {
    let max = max_jitter.as_millis() as u64;
    if max == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=max)
    }
}

// ── Event emission ──────────────────────────────────────────────────

/// Emit an event to the owner. If the channel is full, log a warning and
/// drop the event to avoid blocking the supervisor.
async fn emit_event(event_tx: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "session event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("session event channel closed, receiver dropped");
        }
    }
}

/// Emit the terminal `Disconnected` event.
///
/// Uses `send().await` instead of `try_send` because `Disconnected` is
/// always the last event on the channel and must never be silently dropped.
async fn emit_disconnected(
    event_tx: &mpsc::Sender<SessionEvent>,
    stats: &SessionStats,
    reason: String,
) {
    stats.connected.store(false, Ordering::Release);
    if event_tx
        .send(SessionEvent::Disconnected { reason })
        .await
        .is_err()
    {
        debug!("session event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn config() -> SessionConfig {
        SessionConfig::new("roomhost")
    }

    #[test]
    fn wait_caps_at_ceiling() {
        let cfg = config();
        let wait = compute_wait(&cfg, FailureKind::ConnectionClosed, 29_500, 900);
        assert_eq!(wait, 30_000);
    }

    #[test]
    fn wait_adds_jitter_below_ceiling() {
        let cfg = config();
        assert_eq!(compute_wait(&cfg, FailureKind::Timeout, 1_000, 300), 1_300);
    }

    #[test]
    fn unknown_failures_pay_a_fixed_penalty() {
        let cfg = config();
        assert_eq!(compute_wait(&cfg, FailureKind::Unknown, 1_000, 0), 6_000);
    }

    #[test]
    fn reset_backoff_grows_gently_and_caps_low() {
        let cfg = config();
        let mut backoff = 1_000;
        backoff = grow_backoff(&cfg, FailureKind::Reset, backoff);
        assert_eq!(backoff, 1_500);
        backoff = grow_backoff(&cfg, FailureKind::Reset, backoff);
        assert_eq!(backoff, 2_250);
        // Far along, the reset policy caps at its own lower ceiling.
        assert_eq!(grow_backoff(&cfg, FailureKind::Reset, 50_000), 10_000);
    }

    #[test]
    fn standard_backoff_doubles_and_caps_at_ceiling() {
        let cfg = config();
        assert_eq!(grow_backoff(&cfg, FailureKind::Timeout, 1_000), 2_000);
        assert_eq!(grow_backoff(&cfg, FailureKind::Dns, 2_000), 4_000);
        assert_eq!(grow_backoff(&cfg, FailureKind::Unknown, 20_000), 30_000);
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        assert_eq!(random_jitter_ms(Duration::ZERO), 0);
    }

    #[test]
    fn jitter_stays_within_bound() {
        for _ in 0..100 {
            assert!(random_jitter_ms(Duration::from_millis(50)) <= 50);
        }
    }

    #[test]
    fn gauge_counts_up_and_down() {
        let gauge = ConnectionGauge::new();
        assert_eq!(gauge.active(), 0);
        gauge.incr();
        gauge.incr();
        assert_eq!(gauge.active(), 2);
        gauge.decr();
        assert_eq!(gauge.active(), 1);
    }
}
