//! Static configuration for sessions and game modes.
//!
//! Everything here is fixed for the process lifetime: per-level thresholds,
//! the like-to-coin conversion rate, the broadcast tick rate, and the
//! reconnection parameters. Nothing is negotiated at runtime.

use std::time::Duration;

// ── Session defaults ────────────────────────────────────────────────

/// Default maximum number of reconnect attempts before giving up.
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Default floor of the reconnect backoff interval.
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Default ceiling of the reconnect backoff interval (and of the final wait).
const DEFAULT_BACKOFF_CEILING: Duration = Duration::from_secs(30);

/// Default ceiling of the gentler backoff used for connection resets.
const DEFAULT_RESET_BACKOFF_CEILING: Duration = Duration::from_secs(10);

/// Default length a connection must survive to be judged stable.
const DEFAULT_STABILITY_THRESHOLD: Duration = Duration::from_secs(30);

/// Default upper bound of the random jitter added to each wait.
const DEFAULT_MAX_JITTER: Duration = Duration::from_secs(1);

/// Default extra delay applied before retrying an unclassified error.
const DEFAULT_UNKNOWN_ERROR_DELAY: Duration = Duration::from_secs(5);

/// Default capacity of the bounded session event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful disconnect.
const DEFAULT_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for a [`LiveSession`](crate::session::LiveSession).
///
/// The only required field is `identity` — the opaque name of the remote
/// stream/room to supervise. All reconnection parameters default to the
/// values above.
///
/// # Example
///
/// ```
/// use stream_arena::config::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig::new("kayzedra")
///     .with_max_reconnect_attempts(5)
///     .with_initial_backoff(Duration::from_millis(500));
/// assert_eq!(config.identity, "kayzedra");
/// assert_eq!(config.max_reconnect_attempts, 5);
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Opaque name of the remote stream/room. Immutable for the session's
    /// lifetime.
    pub identity: String,
    /// Maximum number of reconnect attempts before a terminal disconnect.
    pub max_reconnect_attempts: u32,
    /// Backoff floor — the wait before the first reconnect attempt.
    pub initial_backoff: Duration,
    /// Backoff ceiling for the standard growth policy, and the hard cap on
    /// any computed wait (jitter included).
    pub backoff_ceiling: Duration,
    /// Backoff ceiling for the gentler reset-error growth policy.
    pub reset_backoff_ceiling: Duration,
    /// Multiplier applied to the backoff after a connection-reset failure.
    pub reset_backoff_multiplier: f64,
    /// Multiplier applied to the backoff after any other failure.
    pub backoff_multiplier: f64,
    /// How long a connection must survive for its eventual drop to restart
    /// backoff from the floor.
    pub stability_threshold: Duration,
    /// Upper bound of the random jitter added to each computed wait.
    pub max_jitter: Duration,
    /// Fixed extra delay inserted before retrying an unclassified error.
    pub unknown_error_delay: Duration,
    /// Capacity of the bounded session event channel.
    ///
    /// When the consumer cannot keep up with content events, events are
    /// dropped (with a warning logged) to avoid blocking the supervisor.
    /// The terminal `Disconnected` event is always delivered regardless.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful disconnect before the supervisor task is
    /// aborted.
    pub disconnect_timeout: Duration,
}

impl SessionConfig {
    /// Create a session configuration for the given stream identity with
    /// default reconnection parameters.
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            backoff_ceiling: DEFAULT_BACKOFF_CEILING,
            reset_backoff_ceiling: DEFAULT_RESET_BACKOFF_CEILING,
            reset_backoff_multiplier: 1.5,
            backoff_multiplier: 2.0,
            stability_threshold: DEFAULT_STABILITY_THRESHOLD,
            max_jitter: DEFAULT_MAX_JITTER,
            unknown_error_delay: DEFAULT_UNKNOWN_ERROR_DELAY,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            disconnect_timeout: DEFAULT_DISCONNECT_TIMEOUT,
        }
    }

    /// Set the maximum number of reconnect attempts.
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Set the backoff floor.
    #[must_use]
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Set the backoff ceiling (standard policy and overall wait cap).
    #[must_use]
    pub fn with_backoff_ceiling(mut self, ceiling: Duration) -> Self {
        self.backoff_ceiling = ceiling;
        self
    }

    /// Set the stability threshold.
    #[must_use]
    pub fn with_stability_threshold(mut self, threshold: Duration) -> Self {
        self.stability_threshold = threshold;
        self
    }

    /// Set the upper bound of the random reconnect jitter.
    ///
    /// A zero jitter makes reconnect timing fully deterministic, which is
    /// useful in tests.
    #[must_use]
    pub fn with_max_jitter(mut self, jitter: Duration) -> Self {
        self.max_jitter = jitter;
        self
    }

    /// Set the extra delay applied before retrying unclassified errors.
    #[must_use]
    pub fn with_unknown_error_delay(mut self, delay: Duration) -> Self {
        self.unknown_error_delay = delay;
        self
    }

    /// Set the capacity of the bounded session event channel.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful disconnect.
    #[must_use]
    pub fn with_disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }
}

// ── Level configuration ─────────────────────────────────────────────

/// Configuration of a single game level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelConfig {
    /// 1-based level number, used in effect notifications.
    pub level: u32,
    /// Feed meter threshold that triggers the boss encounter.
    pub feed_required: f64,
    /// Hit points of the boss at this level.
    pub boss_hp: i64,
    /// How long contributors have to defeat the boss.
    pub boss_time: Duration,
}

/// The default three-level progression.
pub fn default_levels() -> Vec<LevelConfig> {
    vec![
        LevelConfig {
            level: 1,
            feed_required: 1_000.0,
            boss_hp: 300,
            boss_time: Duration::from_secs(30),
        },
        LevelConfig {
            level: 2,
            feed_required: 5_000.0,
            boss_hp: 1_000,
            boss_time: Duration::from_secs(45),
        },
        LevelConfig {
            level: 3,
            feed_required: 15_000.0,
            boss_hp: 3_000,
            boss_time: Duration::from_secs(60),
        },
    ]
}

// ── Game configuration ──────────────────────────────────────────────

/// Default coin value of a single like.
pub const DEFAULT_COINS_PER_LIKE: f64 = 0.2;

/// Default broadcast tick interval (10 snapshots per second).
const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Default chat phrase that registers a boss hit.
const DEFAULT_BOSS_TRIGGER_PHRASE: &str = "defeat the boss";

/// Default number of top contributors included in each snapshot.
const DEFAULT_TOP_GIFTERS_LIMIT: usize = 10;

/// Configuration for a [`GameEngine`](crate::game::GameEngine).
///
/// # Example
///
/// ```
/// use stream_arena::config::GameConfig;
///
/// let config = GameConfig::default();
/// assert_eq!(config.levels.len(), 3);
/// assert_eq!(config.coins_per_like, 0.2);
/// ```
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Ordered level progression. Must be non-empty; the engine holds at the
    /// last entry once reached.
    pub levels: Vec<LevelConfig>,
    /// Coin value credited per like.
    pub coins_per_like: f64,
    /// Fixed broadcast tick interval.
    pub tick_interval: Duration,
    /// Hit points removed per boss hit.
    pub boss_hit_damage: i64,
    /// Chat phrase (matched case-insensitively) that registers a boss hit.
    pub boss_trigger_phrase: String,
    /// Number of top contributors included in each snapshot.
    pub top_gifters_limit: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            levels: default_levels(),
            coins_per_like: DEFAULT_COINS_PER_LIKE,
            tick_interval: DEFAULT_TICK_INTERVAL,
            boss_hit_damage: 1,
            boss_trigger_phrase: DEFAULT_BOSS_TRIGGER_PHRASE.to_string(),
            top_gifters_limit: DEFAULT_TOP_GIFTERS_LIMIT,
        }
    }
}

impl GameConfig {
    /// Replace the level progression.
    ///
    /// Empty level lists are rejected by keeping the existing levels.
    #[must_use]
    pub fn with_levels(mut self, levels: Vec<LevelConfig>) -> Self {
        if !levels.is_empty() {
            self.levels = levels;
        }
        self
    }

    /// Set the broadcast tick interval.
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the hit points removed per boss hit.
    #[must_use]
    pub fn with_boss_hit_damage(mut self, damage: i64) -> Self {
        self.boss_hit_damage = damage;
        self
    }

    /// Set the chat phrase that registers a boss hit.
    #[must_use]
    pub fn with_boss_trigger_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.boss_trigger_phrase = phrase.into();
        self
    }
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

    #[test]
    fn session_config_defaults() {
        let config = SessionConfig::new("roomhost");
        assert_eq!(config.identity, "roomhost");
        assert_eq!(config.max_reconnect_attempts, 10);
        assert_eq!(config.initial_backoff, Duration::from_secs(1));
        assert_eq!(config.backoff_ceiling, Duration::from_secs(30));
        assert_eq!(config.reset_backoff_ceiling, Duration::from_secs(10));
        assert_eq!(config.stability_threshold, Duration::from_secs(30));
        assert_eq!(config.event_channel_capacity, 256);
    }

    #[test]
    fn event_channel_capacity_is_clamped_to_one() {
        let config = SessionConfig::new("roomhost").with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[test]
    fn default_levels_match_progression() {
        let levels = default_levels();
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0].feed_required, 1_000.0);
        assert_eq!(levels[0].boss_hp, 300);
        assert_eq!(levels[0].boss_time, Duration::from_secs(30));
        assert_eq!(levels[2].level, 3);
    }

    #[test]
    fn game_config_rejects_empty_levels() {
        let config = GameConfig::default().with_levels(vec![]);
        assert_eq!(config.levels.len(), 3);
    }

    #[test]
    fn game_config_builders() {
        let config = GameConfig::default()
            .with_tick_interval(Duration::from_millis(50))
            .with_boss_hit_damage(5)
            .with_boss_trigger_phrase("hit it");
        assert_eq!(config.tick_interval, Duration::from_millis(50));
        assert_eq!(config.boss_hit_damage, 5);
        assert_eq!(config.boss_trigger_phrase, "hit it");
    }
}
