#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    dead_code
)]
//! Shared test utilities for stream-arena integration tests.
//!
//! Provides a scripted [`MockSource`] that replays connection outcomes and
//! live events in order, together with counters recording how often the
//! session supervisor called `connect`/`disconnect`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use stream_arena::clock::ManualClock;
use stream_arena::source::{ContentEvent, LiveEvent, LiveSource, RoomInfo};
use stream_arena::{ArenaError, SessionConfig};

// ── Script ──────────────────────────────────────────────────────────

/// One step of a scripted source lifecycle, consumed in order.
///
/// `ConnectOk`/`ConnectErr` are consumed by `connect()`, `Event`/`Drop` by
/// `next_event()`. `AdvanceClock` is transparent: either method applies it
/// and moves on to the next step.
pub enum Script {
    /// `connect()` succeeds with this room id.
    ConnectOk(&'static str),
    /// `connect()` fails with this error.
    ConnectErr(ArenaError),
    /// `next_event()` yields this event.
    Event(LiveEvent),
    /// `next_event()` returns `None` — the connection dropped.
    Drop,
    /// Advance the shared manual clock before the next step.
    AdvanceClock(u64),
}

// ── MockSource ──────────────────────────────────────────────────────

/// A scripted [`LiveSource`] for integration testing.
///
/// Once the script is exhausted (or the next step belongs to the other
/// method), calls hang forever so the supervisor stays parked until the test
/// disconnects — mirroring a healthy but quiet live stream.
pub struct MockSource {
    script: VecDeque<Script>,
    clock: Option<Arc<ManualClock>>,
    connects: Arc<AtomicU32>,
    disconnects: Arc<AtomicU32>,
}

/// Counters shared with a [`MockSource`].
#[derive(Clone)]
pub struct SourceCounters {
    pub connects: Arc<AtomicU32>,
    pub disconnects: Arc<AtomicU32>,
}

impl SourceCounters {
    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::Acquire)
    }

    pub fn disconnects(&self) -> u32 {
        self.disconnects.load(Ordering::Acquire)
    }
}

impl MockSource {
    pub fn new(script: Vec<Script>) -> (Self, SourceCounters) {
        Self::with_clock(script, None)
    }

    pub fn with_clock(
        script: Vec<Script>,
        clock: Option<Arc<ManualClock>>,
    ) -> (Self, SourceCounters) {
        let connects = Arc::new(AtomicU32::new(0));
        let disconnects = Arc::new(AtomicU32::new(0));
        let source = Self {
            script: VecDeque::from(script),
            clock,
            connects: Arc::clone(&connects),
            disconnects: Arc::clone(&disconnects),
        };
        (
            source,
            SourceCounters {
                connects,
                disconnects,
            },
        )
    }

    fn apply_clock_steps(&mut self) {
        while let Some(Script::AdvanceClock(ms)) = self.script.front() {
            let ms = *ms;
            self.script.pop_front();
            if let Some(clock) = &self.clock {
                clock.advance_ms(ms);
            }
        }
    }
}

#[async_trait]
impl LiveSource for MockSource {
    async fn connect(&mut self) -> Result<RoomInfo, ArenaError> {
        self.apply_clock_steps();
        match self.script.pop_front() {
            Some(Script::ConnectOk(room_id)) => {
                self.connects.fetch_add(1, Ordering::AcqRel);
                Ok(RoomInfo {
                    room_id: room_id.into(),
                })
            }
            Some(Script::ConnectErr(err)) => {
                self.connects.fetch_add(1, Ordering::AcqRel);
                Err(err)
            }
            // Script exhausted or next step belongs to next_event():
            // park until the supervisor is shut down.
            other => {
                if let Some(step) = other {
                    self.script.push_front(step);
                }
                std::future::pending().await
            }
        }
    }

    async fn next_event(&mut self) -> Option<LiveEvent> {
        self.apply_clock_steps();
        match self.script.pop_front() {
            Some(Script::Event(event)) => Some(event),
            Some(Script::Drop) => None,
            // Script exhausted or next step belongs to connect():
            // park until the connection is torn down.
            other => {
                if let Some(step) = other {
                    self.script.push_front(step);
                }
                std::future::pending().await
            }
        }
    }

    async fn disconnect(&mut self) {
        self.disconnects.fetch_add(1, Ordering::AcqRel);
    }
}

// ── Event helpers ───────────────────────────────────────────────────

pub fn like(user: &str, count: u32) -> LiveEvent {
    LiveEvent::Content(ContentEvent::Like {
        user: user.into(),
        count,
    })
}

pub fn gift(user: &str, gift_name: &str, repeat_count: u32) -> LiveEvent {
    LiveEvent::Content(ContentEvent::Gift {
        user: user.into(),
        gift_name: gift_name.into(),
        repeat_count,
    })
}

pub fn comment(user: &str, text: &str) -> LiveEvent {
    LiveEvent::Content(ContentEvent::Comment {
        user: user.into(),
        text: text.into(),
    })
}

/// A session config with deterministic timing: zero jitter, short waits.
pub fn fast_config() -> SessionConfig {
    SessionConfig::new("roomhost")
        .with_max_jitter(std::time::Duration::ZERO)
        .with_initial_backoff(std::time::Duration::from_millis(100))
}
