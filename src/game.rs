//! Game state engine: the FEEDING/BOSS state machine and its broadcast tick.
//!
//! [`GameEngine::start`] spawns a background task that owns the state and
//! returns a [`GameHandle`] plus a [`broadcast::Receiver`] of
//! [`Broadcast`]s. All mutations — coin contributions, boss hits, resets and
//! the wall-clock tick — are applied sequentially by that single task, so no
//! locking discipline is needed beyond the command channel ordering.
//!
//! The tick runs at a fixed rate regardless of event volume and always emits
//! a snapshot, even when nothing changed: consumers can distinguish "still
//! alive" from "silently stalled".

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::{GameConfig, LevelConfig};
use crate::error::{ArenaError, Result};
use crate::event::{Broadcast, GameSnapshot, GifterTotal, Phase};

/// Capacity of the broadcast channel shared by all subscribers.
const BROADCAST_CHANNEL_CAPACITY: usize = 256;

/// Timeout for the graceful engine shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Core state machine ──────────────────────────────────────────────

/// Outcome of a coin contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinOutcome {
    /// Coins were credited to the feed meter.
    Accepted,
    /// Coins were credited and crossed the threshold, starting a boss
    /// encounter in the same operation.
    BossStarted,
    /// Feeding is paused during an active boss encounter; nothing changed.
    Paused,
    /// The amount was negative or not finite; nothing changed.
    Rejected,
}

/// The synchronous state machine behind [`GameHandle`].
///
/// Owned by the engine task; kept free of channels and timers so every
/// transition is unit-testable with a [`ManualClock`](crate::clock::ManualClock).
struct GameCore {
    config: GameConfig,
    clock: Arc<dyn Clock>,
    level_idx: usize,
    phase: Phase,
    feed: f64,
    boss_hp: i64,
    boss_ends_at_ms: u64,
    gifters: HashMap<String, f64>,
}

impl GameCore {
    fn new(config: GameConfig, clock: Arc<dyn Clock>) -> Self {
        let mut core = Self {
            config,
            clock,
            level_idx: 0,
            phase: Phase::Feeding,
            feed: 0.0,
            boss_hp: 0,
            boss_ends_at_ms: 0,
            gifters: HashMap::new(),
        };
        core.reset();
        core
    }

    /// Configuration of the current level. The index is clamped on every
    /// advance, so the fallback to the last entry is unreachable in practice.
    fn level(&self) -> &LevelConfig {
        static LAST_RESORT: LevelConfig = LevelConfig {
            level: 1,
            feed_required: f64::MAX,
            boss_hp: 1,
            boss_time: Duration::from_secs(30),
        };
        self.config
            .levels
            .get(self.level_idx)
            .or_else(|| self.config.levels.last())
            .unwrap_or(&LAST_RESORT)
    }

    fn reset(&mut self) {
        self.level_idx = 0;
        self.phase = Phase::Feeding;
        self.feed = 0.0;
        self.boss_hp = 0;
        self.boss_ends_at_ms = 0;
        self.gifters.clear();
    }

    /// Credit `coins` from `user` toward the feed meter and evaluate the
    /// boss-start transition. Returns the outcome plus the effect to emit.
    fn add_coins(&mut self, user: &str, coins: f64) -> (CoinOutcome, Option<Broadcast>) {
        if self.phase == Phase::Boss {
            debug!(user, coins, "feeding paused, boss battle in progress");
            return (CoinOutcome::Paused, None);
        }
        if !coins.is_finite() || coins < 0.0 {
            warn!(user, coins, "ignoring invalid coin amount");
            return (CoinOutcome::Rejected, None);
        }

        debug!(
            user,
            coins,
            feed = self.feed,
            "adding coins to feed meter"
        );
        self.feed += coins;
        *self.gifters.entry(user.to_string()).or_insert(0.0) += coins;

        let level = *self.level();
        if self.feed >= level.feed_required {
            self.phase = Phase::Boss;
            self.boss_hp = level.boss_hp;
            self.boss_ends_at_ms = self.clock.now_ms() + level.boss_time.as_millis() as u64;
            debug!(
                level = level.level,
                boss_hp = self.boss_hp,
                "feed threshold crossed, boss encounter started"
            );
            return (
                CoinOutcome::BossStarted,
                Some(Broadcast::BossStart { level: level.level }),
            );
        }
        (CoinOutcome::Accepted, None)
    }

    /// Register a hit from `user` and evaluate the victory transition.
    /// No-op outside a boss encounter.
    fn boss_hit(&mut self, user: &str) -> Vec<Broadcast> {
        if self.phase != Phase::Boss {
            debug!(user, "boss hit outside boss phase ignored");
            return Vec::new();
        }
        self.boss_hp -= self.config.boss_hit_damage;
        let mut effects = vec![Broadcast::BossHit {
            user: user.to_string(),
        }];
        if self.boss_hp <= 0 {
            let level = self.level().level;
            debug!(user, level, "boss defeated");
            effects.push(Broadcast::BossDefeat { level });
            self.level_idx = (self.level_idx + 1).min(self.config.levels.len().saturating_sub(1));
            self.feed = 0.0;
            self.boss_hp = 0;
            self.boss_ends_at_ms = 0;
            self.phase = Phase::Feeding;
        }
        effects
    }

    /// Evaluate the boss-timeout transition, then emit the current snapshot
    /// unconditionally.
    fn tick(&mut self) -> Vec<Broadcast> {
        let mut out = Vec::with_capacity(2);
        if self.phase == Phase::Boss && self.clock.now_ms() > self.boss_ends_at_ms {
            let level = self.level().level;
            debug!(level, boss_hp = self.boss_hp, "boss encounter timed out");
            out.push(Broadcast::BossFail { level });
            self.phase = Phase::Feeding;
            self.feed = 0.0;
            self.boss_hp = 0;
            self.boss_ends_at_ms = 0;
        }
        out.push(Broadcast::State(self.snapshot()));
        out
    }

    fn snapshot(&self) -> GameSnapshot {
        let mut top: Vec<GifterTotal> = self
            .gifters
            .iter()
            .map(|(user, &coins)| GifterTotal {
                user: user.clone(),
                coins,
            })
            .collect();
        top.sort_by(|a, b| b.coins.partial_cmp(&a.coins).unwrap_or(std::cmp::Ordering::Equal));
        top.truncate(self.config.top_gifters_limit);
        GameSnapshot {
            level_idx: self.level_idx,
            phase: self.phase,
            feed: self.feed,
            boss_hp: self.boss_hp,
            boss_ends_at_ms: self.boss_ends_at_ms,
            top_gifters: top,
        }
    }
}

// ── Engine handle ───────────────────────────────────────────────────

/// Commands from the handle to the engine task.
enum Command {
    AddCoins { user: String, coins: f64 },
    BossHit { user: String },
    Reset,
    GetState(oneshot::Sender<GameSnapshot>),
}

/// Facade for starting a game engine.
pub struct GameEngine;

impl GameEngine {
    /// Start the engine task and return a handle plus a broadcast receiver.
    ///
    /// The task ticks at `config.tick_interval` and pushes a
    /// [`Broadcast::State`] snapshot on every tick, interleaved with effect
    /// notifications as they happen. Additional receivers can be created
    /// with [`GameHandle::subscribe`].
    #[must_use = "the broadcast receiver must be used to observe game state"]
    pub fn start(
        config: GameConfig,
        clock: Arc<dyn Clock>,
    ) -> (GameHandle, broadcast::Receiver<Broadcast>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        let (broadcast_tx, broadcast_rx) = broadcast::channel(BROADCAST_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let tick_interval = config.tick_interval;
        let core = GameCore::new(config, clock);
        let task = tokio::spawn(engine_loop(
            core,
            cmd_rx,
            broadcast_tx.clone(),
            tick_interval,
            shutdown_rx,
        ));

        let handle = GameHandle {
            cmd_tx,
            broadcast_tx,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
        };
        (handle, broadcast_rx)
    }
}

/// Handle to a running game engine.
///
/// All mutating methods queue a command to the engine task and return
/// immediately once it is queued (no round-trip await).
pub struct GameHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    broadcast_tx: broadcast::Sender<Broadcast>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl GameHandle {
    /// Credit coins from a contributor toward the feed meter.
    ///
    /// Ignored (by design) while a boss encounter is active.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::EngineClosed`] if the engine task has exited.
    pub fn add_coins(&self, user: impl Into<String>, coins: f64) -> Result<()> {
        self.send(Command::AddCoins {
            user: user.into(),
            coins,
        })
    }

    /// Register a boss hit attributed to a contributor.
    ///
    /// Ignored (by design) outside a boss encounter.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::EngineClosed`] if the engine task has exited.
    pub fn boss_hit(&self, user: impl Into<String>) -> Result<()> {
        self.send(Command::BossHit { user: user.into() })
    }

    /// Return the engine to its initial state, emptying contributor totals.
    ///
    /// Used when the upstream session identity changes so stale progress
    /// does not leak across rooms.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::EngineClosed`] if the engine task has exited.
    pub fn reset(&self) -> Result<()> {
        self.send(Command::Reset)
    }

    /// Fetch an immutable snapshot of the current state.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::EngineClosed`] if the engine task has exited.
    pub async fn state(&self) -> Result<GameSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::GetState(tx))?;
        rx.await.map_err(|_| ArenaError::EngineClosed)
    }

    /// Create an additional broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Broadcast> {
        self.broadcast_tx.subscribe()
    }

    /// Shut down the engine, stopping the tick and the background task.
    pub async fn shutdown(&mut self) {
        debug!("GameHandle: shutdown requested");
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(DEFAULT_SHUTDOWN_TIMEOUT, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("engine task terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("engine task did not exit within timeout; aborting");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("engine task aborted: {join_err}");
                    }
                }
            }
        }
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx.send(cmd).map_err(|_| ArenaError::EngineClosed)
    }
}

impl std::fmt::Debug for GameHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameHandle")
            .field("has_task", &self.task.is_some())
            .field("subscribers", &self.broadcast_tx.receiver_count())
            .finish()
    }
}

impl Drop for GameHandle {
    fn drop(&mut self) {
        // No executor context to drive a graceful shutdown from Drop;
        // aborting drops the engine loop future immediately.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Engine loop ─────────────────────────────────────────────────────

/// Background task: applies commands and drives the fixed-rate tick.
async fn engine_loop(
    mut core: GameCore,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    broadcast_tx: broadcast::Sender<Broadcast>,
    tick_interval: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!("engine loop started");
    let mut ticker = tokio::time::interval(tick_interval);
    // Late ticks fire as soon as possible but never coalesce away.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::AddCoins { user, coins }) => {
                        let (_outcome, effect) = core.add_coins(&user, coins);
                        if let Some(effect) = effect {
                            emit(&broadcast_tx, effect);
                        }
                    }
                    Some(Command::BossHit { user }) => {
                        for effect in core.boss_hit(&user) {
                            emit(&broadcast_tx, effect);
                        }
                    }
                    Some(Command::Reset) => {
                        debug!("game state reset");
                        core.reset();
                    }
                    Some(Command::GetState(reply)) => {
                        let _ = reply.send(core.snapshot());
                    }
                    None => {
                        debug!("command channel closed, stopping engine loop");
                        break;
                    }
                }
            }

            _ = &mut shutdown_rx => {
                debug!("engine shutdown signal received");
                break;
            }

            _ = ticker.tick() => {
                for event in core.tick() {
                    emit(&broadcast_tx, event);
                }
            }
        }
    }

    debug!("engine loop exited");
}

/// Push a broadcast, ignoring the no-subscribers case.
fn emit(tx: &broadcast::Sender<Broadcast>, event: Broadcast) {
    let _ = tx.send(event);
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::default_levels;

    fn core_with_clock() -> (GameCore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        (GameCore::new(GameConfig::default(), clock.clone()), clock)
    }

    #[test]
    fn initial_state_is_feeding_at_level_zero() {
        let (core, _) = core_with_clock();
        let snap = core.snapshot();
        assert_eq!(snap.level_idx, 0);
        assert_eq!(snap.phase, Phase::Feeding);
        assert_eq!(snap.feed, 0.0);
        assert_eq!(snap.boss_hp, 0);
        assert!(snap.top_gifters.is_empty());
    }

    #[test]
    fn feed_accumulates_sum_of_applied_amounts() {
        let (mut core, _) = core_with_clock();
        assert_eq!(core.add_coins("a", 100.0).0, CoinOutcome::Accepted);
        assert_eq!(core.add_coins("b", 250.5).0, CoinOutcome::Accepted);
        assert_eq!(core.snapshot().feed, 350.5);
    }

    #[test]
    fn threshold_crossing_starts_boss_in_same_operation() {
        // Level 1: feedRequired=1000, bossHp=300, bossTime=30s.
        let (mut core, clock) = core_with_clock();
        assert_eq!(core.add_coins("a", 400.0).0, CoinOutcome::Accepted);
        assert_eq!(core.add_coins("b", 400.0).0, CoinOutcome::Accepted);
        let (outcome, effect) = core.add_coins("c", 300.0);
        assert_eq!(outcome, CoinOutcome::BossStarted);
        assert_eq!(effect, Some(Broadcast::BossStart { level: 1 }));

        let snap = core.snapshot();
        assert_eq!(snap.phase, Phase::Boss);
        assert_eq!(snap.feed, 1_100.0);
        assert_eq!(snap.boss_hp, 300);
        assert_eq!(snap.boss_ends_at_ms, clock.now_ms() + 30_000);
    }

    #[test]
    fn coins_are_rejected_during_boss_phase() {
        let (mut core, _) = core_with_clock();
        core.add_coins("a", 1_000.0);
        assert_eq!(core.snapshot().phase, Phase::Boss);

        let before = core.snapshot();
        let (outcome, effect) = core.add_coins("a", 500.0);
        assert_eq!(outcome, CoinOutcome::Paused);
        assert!(effect.is_none());
        let after = core.snapshot();
        assert_eq!(after.feed, before.feed);
        assert_eq!(after.top_gifters, before.top_gifters);
    }

    #[test]
    fn negative_and_non_finite_amounts_are_rejected() {
        let (mut core, _) = core_with_clock();
        assert_eq!(core.add_coins("a", -5.0).0, CoinOutcome::Rejected);
        assert_eq!(core.add_coins("a", f64::NAN).0, CoinOutcome::Rejected);
        assert_eq!(core.add_coins("a", f64::INFINITY).0, CoinOutcome::Rejected);
        assert_eq!(core.snapshot().feed, 0.0);
        assert!(core.snapshot().top_gifters.is_empty());
    }

    #[test]
    fn boss_hits_decrease_hp_and_victory_advances_level() {
        let levels = vec![
            LevelConfig {
                level: 1,
                feed_required: 10.0,
                boss_hp: 2,
                boss_time: Duration::from_secs(30),
            },
            LevelConfig {
                level: 2,
                feed_required: 50.0,
                boss_hp: 10,
                boss_time: Duration::from_secs(45),
            },
        ];
        let clock = Arc::new(ManualClock::new(0));
        let mut core = GameCore::new(GameConfig::default().with_levels(levels), clock);

        core.add_coins("a", 10.0);
        assert_eq!(core.snapshot().phase, Phase::Boss);
        assert_eq!(core.snapshot().boss_hp, 2);

        let fx = core.boss_hit("x");
        assert_eq!(fx, vec![Broadcast::BossHit { user: "x".into() }]);
        assert_eq!(core.snapshot().boss_hp, 1);

        let fx = core.boss_hit("y");
        assert_eq!(
            fx,
            vec![
                Broadcast::BossHit { user: "y".into() },
                Broadcast::BossDefeat { level: 1 },
            ]
        );
        let snap = core.snapshot();
        assert_eq!(snap.phase, Phase::Feeding);
        assert_eq!(snap.level_idx, 1);
        assert_eq!(snap.feed, 0.0);
        assert_eq!(snap.boss_hp, 0);
    }

    #[test]
    fn level_index_clamps_at_last_level() {
        let levels = vec![LevelConfig {
            level: 1,
            feed_required: 10.0,
            boss_hp: 1,
            boss_time: Duration::from_secs(30),
        }];
        let clock = Arc::new(ManualClock::new(0));
        let mut core = GameCore::new(GameConfig::default().with_levels(levels), clock);

        for _ in 0..3 {
            core.add_coins("a", 10.0);
            core.boss_hit("a");
            assert_eq!(core.snapshot().level_idx, 0);
            assert_eq!(core.snapshot().phase, Phase::Feeding);
        }
    }

    #[test]
    fn boss_hit_outside_boss_phase_is_noop() {
        let (mut core, _) = core_with_clock();
        assert!(core.boss_hit("a").is_empty());
        assert_eq!(core.snapshot().phase, Phase::Feeding);
    }

    #[test]
    fn tick_times_out_boss_without_advancing_level() {
        let (mut core, clock) = core_with_clock();
        core.add_coins("a", 1_000.0);
        assert_eq!(core.snapshot().phase, Phase::Boss);
        // Boss HP still well above zero (150 of 300 left after some hits).
        for _ in 0..150 {
            core.boss_hit("a");
        }
        assert_eq!(core.snapshot().boss_hp, 150);

        clock.advance_ms(30_001);
        let events = core.tick();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Broadcast::BossFail { level: 1 });
        assert!(matches!(events[1], Broadcast::State(_)));

        let snap = core.snapshot();
        assert_eq!(snap.phase, Phase::Feeding);
        assert_eq!(snap.level_idx, 0);
        assert_eq!(snap.feed, 0.0);
    }

    #[test]
    fn tick_before_deadline_keeps_boss_active() {
        let (mut core, clock) = core_with_clock();
        core.add_coins("a", 1_000.0);
        clock.advance_ms(29_999);
        let events = core.tick();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Broadcast::State(_)));
        assert_eq!(core.snapshot().phase, Phase::Boss);
    }

    #[test]
    fn tick_always_emits_snapshot_when_idle() {
        let (mut core, _) = core_with_clock();
        for _ in 0..5 {
            let events = core.tick();
            assert_eq!(events.len(), 1);
            assert!(matches!(events[0], Broadcast::State(_)));
        }
    }

    #[test]
    fn reset_restores_initial_state() {
        let (mut core, clock) = core_with_clock();
        core.add_coins("a", 1_000.0);
        core.boss_hit("b");
        clock.advance_ms(5_000);
        core.reset();

        let snap = core.snapshot();
        assert_eq!(snap.level_idx, 0);
        assert_eq!(snap.phase, Phase::Feeding);
        assert_eq!(snap.feed, 0.0);
        assert_eq!(snap.boss_hp, 0);
        assert_eq!(snap.boss_ends_at_ms, 0);
        assert!(snap.top_gifters.is_empty());
    }

    #[test]
    fn top_gifters_sorted_descending_and_capped() {
        let mut config = GameConfig::default();
        config.top_gifters_limit = 2;
        let clock = Arc::new(ManualClock::new(0));
        let mut core = GameCore::new(config, clock);

        core.add_coins("small", 10.0);
        core.add_coins("big", 300.0);
        core.add_coins("mid", 100.0);

        let top = core.snapshot().top_gifters;
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].user, "big");
        assert_eq!(top[1].user, "mid");
    }

    #[test]
    fn contributor_totals_accumulate_across_calls() {
        let (mut core, _) = core_with_clock();
        core.add_coins("a", 100.0);
        core.add_coins("a", 50.0);
        let top = core.snapshot().top_gifters;
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].coins, 150.0);
    }

    #[test]
    fn default_level_table_drives_boss_parameters() {
        let levels = default_levels();
        let clock = Arc::new(ManualClock::new(0));
        let mut core = GameCore::new(GameConfig::default(), clock);
        core.add_coins("a", levels[0].feed_required);
        assert_eq!(core.snapshot().boss_hp, levels[0].boss_hp);
    }
}
