//! Translation of live-stream events into game engine calls.
//!
//! The session wrapper and the game engine do not know about each other;
//! [`EventRelay`] is the owning process's glue between them. Likes and gifts
//! become coin contributions, chat comments containing the trigger phrase
//! become boss hits, and a fresh room connection resets the engine so stale
//! progress never leaks across sessions.

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::GameConfig;
use crate::error::Result;
use crate::event::SessionEvent;
use crate::game::GameHandle;
use crate::gifts::GiftTable;
use crate::source::ContentEvent;

/// What a single session event was translated into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RelayAction {
    /// Coins were credited to the feed meter.
    CoinsAdded(f64),
    /// A boss hit was registered.
    BossHit,
    /// The engine was reset for a new room.
    Reset,
    /// The session ended; the relay loop stops.
    Stopped,
    /// The event has no gameplay effect.
    Ignored,
}

/// Maps [`SessionEvent`]s onto a [`GameHandle`].
#[derive(Debug, Clone)]
pub struct EventRelay {
    gifts: GiftTable,
    coins_per_like: f64,
    /// Lowercased trigger phrase; comments are matched case-insensitively.
    trigger_phrase: String,
}

impl EventRelay {
    /// Create a relay using the given gift table and game configuration.
    pub fn new(gifts: GiftTable, config: &GameConfig) -> Self {
        Self {
            gifts,
            coins_per_like: config.coins_per_like,
            trigger_phrase: config.boss_trigger_phrase.to_lowercase(),
        }
    }

    /// Translate one session event into an engine call.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::EngineClosed`](crate::error::ArenaError::EngineClosed)
    /// if the engine task has exited.
    pub fn apply(&self, game: &GameHandle, event: &SessionEvent) -> Result<RelayAction> {
        match event {
            SessionEvent::Connected(room) => {
                info!(room_id = %room.room_id, "new room connected, resetting game state");
                game.reset()?;
                Ok(RelayAction::Reset)
            }
            SessionEvent::Disconnected { reason } => {
                info!(reason, "session ended, stopping relay");
                Ok(RelayAction::Stopped)
            }
            SessionEvent::Content(content) => self.apply_content(game, content),
        }
    }

    fn apply_content(&self, game: &GameHandle, content: &ContentEvent) -> Result<RelayAction> {
        match content {
            ContentEvent::Like { user, count } => {
                let coins = f64::from(*count) * self.coins_per_like;
                game.add_coins(user.clone(), coins)?;
                Ok(RelayAction::CoinsAdded(coins))
            }
            ContentEvent::Gift {
                user,
                gift_name,
                repeat_count,
            } => {
                let coins = self.gifts.gift_coins(gift_name, *repeat_count);
                if coins == 0.0 {
                    debug!(user, gift_name, "unknown gift, no coins credited");
                    return Ok(RelayAction::Ignored);
                }
                game.add_coins(user.clone(), coins)?;
                Ok(RelayAction::CoinsAdded(coins))
            }
            ContentEvent::Comment { user, text } => {
                if text.to_lowercase().contains(&self.trigger_phrase) {
                    game.boss_hit(user.clone())?;
                    Ok(RelayAction::BossHit)
                } else {
                    Ok(RelayAction::Ignored)
                }
            }
            ContentEvent::Follow { .. } | ContentEvent::Share { .. } => Ok(RelayAction::Ignored),
        }
    }

    /// Drive the relay until the session ends or the event channel closes.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::EngineClosed`](crate::error::ArenaError::EngineClosed)
    /// if the engine task exits while events are still flowing.
    pub async fn run(
        &self,
        game: &GameHandle,
        events: &mut mpsc::Receiver<SessionEvent>,
    ) -> Result<()> {
        while let Some(event) = events.recv().await {
            if self.apply(game, &event)? == RelayAction::Stopped {
                return Ok(());
            }
        }
        debug!("session event channel closed, stopping relay");
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
