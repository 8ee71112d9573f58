#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Integration tests for the game engine task: the broadcast tick, effect
//! interleaving, and handle lifecycle. Pure state-machine transitions are
//! covered by the unit tests inside `src/game.rs`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use stream_arena::clock::ManualClock;
use stream_arena::{Broadcast, GameConfig, GameEngine, GameHandle, Phase};

fn start() -> (GameHandle, broadcast::Receiver<Broadcast>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let (game, rx) = GameEngine::start(GameConfig::default(), clock.clone());
    (game, rx, clock)
}

/// Receive the next broadcast or give up after a (virtual) minute.
async fn recv_or_timeout(rx: &mut broadcast::Receiver<Broadcast>) -> Broadcast {
    tokio::time::timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("timed out waiting for a broadcast")
        .expect("broadcast channel closed")
}

/// Receive broadcasts until one matches `pred`, skipping periodic snapshots.
async fn recv_until(
    rx: &mut broadcast::Receiver<Broadcast>,
    pred: impl Fn(&Broadcast) -> bool,
) -> Broadcast {
    loop {
        let event = recv_or_timeout(rx).await;
        if pred(&event) {
            return event;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn tick_broadcasts_snapshots_at_a_fixed_cadence() {
    let (mut game, mut rx, _clock) = start();
    let started = tokio::time::Instant::now();

    // The first tick fires immediately; three more at 100ms intervals.
    for _ in 0..4 {
        let event = recv_or_timeout(&mut rx).await;
        assert!(matches!(event, Broadcast::State(_)), "idle ticks only carry snapshots");
    }
    assert!(started.elapsed() >= Duration::from_millis(300));

    game.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn snapshots_keep_flowing_when_nothing_changes() {
    let (mut game, mut rx, _clock) = start();

    let mut last_feed = None;
    for _ in 0..5 {
        if let Broadcast::State(snap) = recv_or_timeout(&mut rx).await {
            assert_eq!(snap.phase, Phase::Feeding);
            // Identical content every tick; liveness, not change, is the signal.
            if let Some(prev) = last_feed {
                assert_eq!(snap.feed, prev);
            }
            last_feed = Some(snap.feed);
        }
    }

    game.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn threshold_crossing_broadcasts_boss_start() {
    let (mut game, mut rx, _clock) = start();

    game.add_coins("nova", 1_200.0).unwrap();
    let event = recv_until(&mut rx, |e| !matches!(e, Broadcast::State(_))).await;
    assert_eq!(event, Broadcast::BossStart { level: 1 });

    // Subsequent snapshots reflect the boss phase.
    let event = recv_until(&mut rx, |e| matches!(e, Broadcast::State(_))).await;
    if let Broadcast::State(snap) = event {
        assert_eq!(snap.phase, Phase::Boss);
        assert_eq!(snap.boss_hp, 300);
    }

    game.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn boss_hits_broadcast_attribution() {
    let (mut game, mut rx, _clock) = start();

    game.add_coins("nova", 1_000.0).unwrap();
    recv_until(&mut rx, |e| matches!(e, Broadcast::BossStart { .. })).await;

    game.boss_hit("vega").unwrap();
    let event = recv_until(&mut rx, |e| matches!(e, Broadcast::BossHit { .. })).await;
    assert_eq!(
        event,
        Broadcast::BossHit {
            user: "vega".into()
        }
    );

    game.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn boss_timeout_broadcasts_fail_on_the_next_tick() {
    let (mut game, mut rx, clock) = start();

    game.add_coins("nova", 1_000.0).unwrap();
    recv_until(&mut rx, |e| matches!(e, Broadcast::BossStart { .. })).await;

    // Past the 30s level-1 deadline; the next tick detects the expiry.
    clock.advance_ms(30_001);
    let event = recv_until(&mut rx, |e| !matches!(e, Broadcast::State(_))).await;
    assert_eq!(event, Broadcast::BossFail { level: 1 });

    let snap = game.state().await.unwrap();
    assert_eq!(snap.phase, Phase::Feeding);
    assert_eq!(snap.level_idx, 0, "a timeout never advances the level");
    assert_eq!(snap.feed, 0.0);

    game.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn state_query_reflects_queued_mutations() {
    let (mut game, _rx, _clock) = start();

    game.add_coins("nova", 100.0).unwrap();
    game.add_coins("vega", 250.0).unwrap();

    // state() is answered by the same task, after the queued commands.
    let snap = game.state().await.unwrap();
    assert_eq!(snap.feed, 350.0);
    assert_eq!(snap.top_gifters.len(), 2);
    assert_eq!(snap.top_gifters[0].user, "vega");

    game.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reset_clears_progress_between_rooms() {
    let (mut game, _rx, _clock) = start();

    game.add_coins("nova", 600.0).unwrap();
    game.reset().unwrap();

    let snap = game.state().await.unwrap();
    assert_eq!(snap.feed, 0.0);
    assert!(snap.top_gifters.is_empty());

    game.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn additional_subscribers_see_the_same_effects() {
    let (mut game, mut rx_a, _clock) = start();
    let mut rx_b = game.subscribe();

    game.add_coins("nova", 1_000.0).unwrap();

    let a = recv_until(&mut rx_a, |e| matches!(e, Broadcast::BossStart { .. })).await;
    let b = recv_until(&mut rx_b, |e| matches!(e, Broadcast::BossStart { .. })).await;
    assert_eq!(a, b);

    game.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn commands_fail_cleanly_after_shutdown() {
    let (mut game, _rx, _clock) = start();
    game.shutdown().await;

    assert!(game.add_coins("nova", 10.0).is_err());
    assert!(game.boss_hit("nova").is_err());
    assert!(game.reset().is_err());
    assert!(game.state().await.is_err());
}
