//! # Stream Arena
//!
//! Server core for live-stream interactive overlays: a resilient connection
//! wrapper around an upstream live-data provider, and a tick-driven game
//! state engine broadcasting snapshots to UI consumers.
//!
//! ## Features
//!
//! - **Source-agnostic** — implement the [`LiveSource`] trait for any live
//!   event provider
//! - **Self-healing** — exponential backoff with jitter, error-class-specific
//!   growth, and a stability window that resets backoff after healthy runs
//! - **Event-driven** — session lifecycle and content events arrive on a
//!   channel; game snapshots and effects fan out on a broadcast channel
//! - **Deterministic time** — deadlines and stability windows go through an
//!   injectable [`Clock`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! let (session, mut events) = LiveSession::start(source, SessionConfig::new("kayzedra"));
//! let (game, snapshots) = GameEngine::start(GameConfig::default(), Arc::new(SystemClock));
//!
//! let relay = EventRelay::new(GiftTable::builtin(), &GameConfig::default());
//! relay.run(&game, &mut events).await?;
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod game;
pub mod gifts;
pub mod relay;
pub mod session;
pub mod source;

// Re-export primary types for ergonomic imports.
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{GameConfig, LevelConfig, SessionConfig};
pub use error::{ArenaError, FailureKind};
pub use event::{Broadcast, GameSnapshot, Phase, SessionEvent};
pub use game::{GameEngine, GameHandle};
pub use gifts::GiftTable;
pub use relay::EventRelay;
pub use session::{ConnectionGauge, LiveSession, SessionHandle, SessionInfo};
pub use source::{ContentEvent, LiveEvent, LiveSource, RoomInfo};
