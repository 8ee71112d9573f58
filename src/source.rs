//! Abstraction over the upstream live-stream data provider.
//!
//! The [`LiveSource`] trait is the seam between this crate and whatever
//! service actually delivers live events (the original system used a TikTok
//! Live connector). A source knows how to establish one connection to one
//! remote room and yield its events; everything above it — reconnection,
//! backoff, stability tracking — is handled by
//! [`LiveSession`](crate::session::LiveSession).
//!
//! # Connection Setup
//!
//! Credential and endpoint plumbing is intentionally NOT part of this trait —
//! different providers have fundamentally different session options.
//! Construct a source bound to its room externally, then hand it to
//! `LiveSession::start`, which will call [`connect`](LiveSource::connect)
//! (repeatedly, across reconnect attempts).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ArenaError, Result};

// ── Inbound events ──────────────────────────────────────────────────

/// Details of a successfully joined live room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    /// Provider-assigned identifier of the live room.
    pub room_id: String,
}

/// A viewer-generated content event from the live stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentEvent {
    /// A batch of likes.
    Like {
        /// Viewer who sent the likes.
        user: String,
        /// Number of likes in this batch.
        count: u32,
    },
    /// A gift, possibly repeated (combo streaks).
    Gift {
        /// Viewer who sent the gift.
        user: String,
        /// Provider gift name, looked up in the gift table.
        gift_name: String,
        /// How many times the gift was repeated.
        repeat_count: u32,
    },
    /// A free-text chat comment.
    Comment { user: String, text: String },
    /// The viewer followed the host.
    Follow { user: String },
    /// The viewer shared the stream.
    Share { user: String },
}

/// An event yielded by a connected [`LiveSource`].
#[derive(Debug)]
pub enum LiveEvent {
    /// A viewer-generated content event.
    Content(ContentEvent),
    /// The host ended the stream. Terminal: the room is gone and no amount
    /// of retrying helps.
    StreamEnded,
    /// The connection failed with a classified error. The source is
    /// considered dropped after yielding this.
    Error(ArenaError),
}

// ── LiveSource trait ────────────────────────────────────────────────

/// One connection to one remote live room.
///
/// # Object Safety
///
/// This trait is object-safe, so `Box<dyn LiveSource>` works for dynamic
/// dispatch. `LiveSession::start` accepts `impl LiveSource` (monomorphized)
/// for the common case.
///
/// # Cancel Safety
///
/// [`next_event`](LiveSource::next_event) **MUST** be cancel-safe because the
/// session supervisor races it against its shutdown signal inside
/// `tokio::select!`. Channel-backed implementations are naturally cancel-safe.
#[async_trait]
pub trait LiveSource: Send + 'static {
    /// Attempt to establish the upstream connection.
    ///
    /// Called once per attempt; the session supervisor handles retries, so
    /// implementations should fail fast rather than loop internally.
    ///
    /// # Errors
    ///
    /// Returns the connection failure, which the supervisor classifies via
    /// [`ArenaError::failure_kind`] to tune its backoff.
    async fn connect(&mut self) -> Result<RoomInfo>;

    /// Receive the next event from the connected stream.
    ///
    /// Returns:
    /// - `Some(event)` — a content, stream-end, or error event
    /// - `None` — the connection dropped without a classified error
    ///
    /// # Cancel Safety
    ///
    /// This method **MUST** be cancel-safe (see [trait documentation](LiveSource)).
    async fn next_event(&mut self) -> Option<LiveEvent>;

    /// Tear down the connection.
    ///
    /// Must be idempotent: the supervisor may call it on an already-dropped
    /// connection during shutdown.
    async fn disconnect(&mut self);
}
