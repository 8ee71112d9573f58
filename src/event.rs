//! Outbound event types emitted by the session wrapper and game engine.
//!
//! Every serializable type in this module produces JSON compatible with the
//! original browser overlay's socket.io event surface: effect events carry
//! their `fx:*` names, the periodic snapshot is tagged `state:update`, and
//! snapshot fields keep their camelCase names (`levelIdx`, `bossHp`,
//! `bossEnds`, `topGifters`).

use serde::{Deserialize, Serialize};

use crate::source::RoomInfo;

// ── Session events ──────────────────────────────────────────────────

/// Events emitted by a [`LiveSession`](crate::session::LiveSession) to its
/// owner.
///
/// `Connected` is emitted at most once, on the initial successful
/// connection — reconnections are an internal recovery detail and stay
/// silent. `Disconnected` is terminal and always delivered, even under
/// backpressure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The initial upstream connection succeeded.
    Connected(RoomInfo),
    /// The session ended and will not recover: the caller disconnected, the
    /// stream ended, the initial attempt failed, or retries were exhausted.
    Disconnected {
        /// Human-readable reason for the terminal disconnect.
        reason: String,
    },
    /// A content event from the live stream.
    Content(crate::source::ContentEvent),
}

// ── Game phase ──────────────────────────────────────────────────────

/// Coarse state of the game-state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Accumulating contributions toward the level's feed threshold.
    #[default]
    Feeding,
    /// Resolving a timed boss encounter.
    Boss,
}

// ── Snapshot ────────────────────────────────────────────────────────

/// One contributor's cumulative coin total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GifterTotal {
    /// Contributor identity.
    pub user: String,
    /// Cumulative coins contributed.
    pub coins: f64,
}

/// Immutable read model of the game state, broadcast on every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    /// Zero-based index into the level progression.
    pub level_idx: usize,
    /// Current phase.
    pub phase: Phase,
    /// Feed accumulated toward the current level's threshold.
    pub feed: f64,
    /// Remaining boss hit points (0 outside a boss encounter).
    pub boss_hp: i64,
    /// Epoch-millisecond deadline of the active boss encounter
    /// (0 outside a boss encounter).
    #[serde(rename = "bossEnds")]
    pub boss_ends_at_ms: u64,
    /// Top contributors, sorted by cumulative coins descending.
    pub top_gifters: Vec<GifterTotal>,
}

// ── Broadcast events ────────────────────────────────────────────────

/// Everything the game engine pushes to its broadcast subscribers: the
/// periodic state snapshot plus one-shot effect notifications.
///
/// Effects are fire-and-forget and carry only attribution/level data — they
/// are not part of the durable state. `level` fields use the 1-based level
/// number shown to viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Broadcast {
    /// Periodic full-state snapshot.
    #[serde(rename = "state:update")]
    State(GameSnapshot),
    /// A contributor landed a hit on the boss.
    #[serde(rename = "fx:bossHit")]
    BossHit {
        /// Contributor credited with the hit.
        user: String,
    },
    /// The feed threshold was crossed and a boss encounter began.
    #[serde(rename = "fx:bossStart")]
    BossStart { level: u32 },
    /// The boss was defeated before the deadline.
    #[serde(rename = "fx:bossDefeat")]
    BossDefeat { level: u32 },
    /// The boss encounter expired undefeated.
    #[serde(rename = "fx:bossFail")]
    BossFail { level: u32 },
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

    fn snapshot() -> GameSnapshot {
        GameSnapshot {
            level_idx: 1,
            phase: Phase::Boss,
            feed: 0.0,
            boss_hp: 850,
            boss_ends_at_ms: 1_700_000_045_000,
            top_gifters: vec![GifterTotal {
                user: "nova".into(),
                coins: 1200.0,
            }],
        }
    }

    #[test]
    fn snapshot_uses_overlay_field_names() {
        let json = serde_json::to_value(snapshot()).unwrap();
        assert_eq!(json["levelIdx"], 1);
        assert_eq!(json["phase"], "BOSS");
        assert_eq!(json["bossHp"], 850);
        assert_eq!(json["bossEnds"], 1_700_000_045_000_u64);
        assert_eq!(json["topGifters"][0]["user"], "nova");
    }

    #[test]
    fn phase_serializes_screaming() {
        assert_eq!(serde_json::to_string(&Phase::Feeding).unwrap(), "\"FEEDING\"");
        assert_eq!(serde_json::to_string(&Phase::Boss).unwrap(), "\"BOSS\"");
    }

    #[test]
    fn effects_carry_overlay_event_names() {
        let json = serde_json::to_value(Broadcast::BossHit {
            user: "nova".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "fx:bossHit");
        assert_eq!(json["data"]["user"], "nova");

        let json = serde_json::to_value(Broadcast::BossStart { level: 2 }).unwrap();
        assert_eq!(json["type"], "fx:bossStart");
        assert_eq!(json["data"]["level"], 2);

        let json = serde_json::to_value(Broadcast::BossDefeat { level: 1 }).unwrap();
        assert_eq!(json["type"], "fx:bossDefeat");

        let json = serde_json::to_value(Broadcast::BossFail { level: 1 }).unwrap();
        assert_eq!(json["type"], "fx:bossFail");
    }

    #[test]
    fn state_update_round_trips() {
        let broadcast = Broadcast::State(snapshot());
        let json = serde_json::to_string(&broadcast).unwrap();
        assert!(json.contains("\"type\":\"state:update\""));
        let back: Broadcast = serde_json::from_str(&json).unwrap();
        assert_eq!(back, broadcast);
    }
}
