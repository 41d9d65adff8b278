//! Integration tests for the venue actor, its timer loop, and file
//! persistence across restarts.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use quorum::prelude::*;

// =========================================================================
// Helper
// =========================================================================

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
}

fn p(name: &str) -> ParticipantId {
    ParticipantId::new(name)
}

const CONFIG: &str = r#"{
    "ready_timeout_secs": 60,
    "idle_threshold_secs": 7200,
    "areas": [{ "name": "table", "capacity": 1 }],
    "activities": [
        { "name": "pool", "area": "table", "team_size": 1 },
        { "name": "lunch", "team_size": 0 }
    ]
}"#;

struct Running {
    quorum: Quorum,
    announcer: Arc<RecordingAnnouncer>,
}

fn start_with(config: &str, store: Arc<dyn GameStore>) -> Running {
    let announcer = Arc::new(RecordingAnnouncer::new());
    let quorum = Quorum::builder()
        .config(parse_config(config).unwrap())
        .clock(Arc::new(TokioClock::starting_at(at(9, 0))))
        .store(store)
        .announcer(announcer.clone())
        .start()
        .unwrap();
    Running { quorum, announcer }
}

fn start() -> Running {
    start_with(CONFIG, Arc::new(MemoryStore::new()))
}

// =========================================================================
// Commands
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_register_until_roll() {
    let running = start();
    let venue = running.quorum.handle();

    venue.register("pool", Slot::Now, &p("amy")).await.unwrap();
    let views = venue.views(Some("pool")).await.unwrap();
    assert_eq!(views[0].to_string(), "Game for now -- amy +1");

    venue.register("pool", Slot::Now, &p("bo")).await.unwrap();
    let commenced = venue.take_commenced().await.unwrap();
    assert_eq!(commenced.len(), 1);
    assert!(running
        .announcer
        .announcements()
        .contains(&"Game for now -- amy v bo. **ROLL**".to_string()));

    running.quorum.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_refused_request_reaches_caller() {
    let running = start();
    let venue = running.quorum.handle();

    venue.register("pool", Slot::Now, &p("amy")).await.unwrap();
    let err = venue.register("pool", Slot::Now, &p("amy")).await.unwrap_err();
    assert_eq!(
        err.as_action(),
        Some(&ActionError::AlreadyRegistered(Slot::Now))
    );

    let err = venue.unregister("darts", Slot::Now, &p("amy")).await.unwrap_err();
    assert_eq!(err.to_string(), "Unknown activity 'darts'");
}

#[tokio::test(start_paused = true)]
async fn test_area_busy_round_trip() {
    let running = start();
    let venue = running.quorum.handle();

    venue
        .set_area_busy("table", &p("dan"), Some("repairs".into()))
        .await
        .unwrap();
    venue.register("pool", Slot::Now, &p("amy")).await.unwrap();
    venue.register("pool", Slot::Now, &p("bo")).await.unwrap();

    let areas = venue.areas().await.unwrap();
    let table = areas.iter().find(|a| a.name == "table").unwrap();
    assert_eq!(table.to_string(), "Area table: 0 rolling of 1, 1 queued, busy (dan: repairs)");

    venue.clear_area_busy("table").await.unwrap();
    assert_eq!(venue.take_commenced().await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_handle_fails_after_shutdown() {
    let running = start();
    let venue = running.quorum.handle();
    running.quorum.shutdown().await.unwrap();

    let err = venue.register("pool", Slot::Now, &p("amy")).await.unwrap_err();
    assert!(matches!(err, QuorumError::Unavailable));
}

// =========================================================================
// Timers
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_scheduled_game_rolls_on_time() {
    let running = start();
    let venue = running.quorum.handle();

    venue.register("pool", Slot::At(at(9, 30)), &p("amy")).await.unwrap();
    venue.register("pool", Slot::At(at(9, 30)), &p("bo")).await.unwrap();
    let next = venue.get_next_game("pool").await.unwrap().unwrap();
    assert_eq!(next.state, GameState::WaitingForTime);

    tokio::time::sleep(Duration::from_secs(29 * 60)).await;
    assert!(venue.take_commenced().await.unwrap().is_empty());

    tokio::time::sleep(Duration::from_secs(2 * 60)).await;
    let commenced = venue.take_commenced().await.unwrap();
    assert_eq!(commenced.len(), 1);
    assert_eq!(commenced[0].slot, Slot::At(at(9, 30)));
}

#[tokio::test(start_paused = true)]
async fn test_idle_player_dropped_after_timeout() {
    let config = CONFIG.replace("7200", "300");
    let running = start_with(&config, Arc::new(MemoryStore::new()));
    let venue = running.quorum.handle();

    venue.register("pool", Slot::Now, &p("amy")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(400)).await;
    venue.register("pool", Slot::Now, &p("bo")).await.unwrap();

    let next = venue.get_next_game("pool").await.unwrap().unwrap();
    assert_eq!(next.state, GameState::PlayerCheck);
    assert_eq!(next.not_ready, vec![p("amy")]);
    assert_eq!(running.announcer.notices(&p("amy")).len(), 1);

    tokio::time::sleep(Duration::from_secs(61)).await;
    let next = venue.get_next_game("pool").await.unwrap().unwrap();
    assert_eq!(next.state, GameState::NotQuorate);
    assert_eq!(next.participants, vec![p("bo")]);
}

// =========================================================================
// Persistence
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_games_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("games.json");

    let running = start_with(CONFIG, Arc::new(FileStore::json(&path).unwrap()));
    let venue = running.quorum.handle();
    venue.register("lunch", Slot::Now, &p("amy")).await.unwrap();
    venue.register("lunch", Slot::Now, &p("bo")).await.unwrap();
    running.quorum.shutdown().await.unwrap();

    let restarted = start_with(CONFIG, Arc::new(FileStore::json(&path).unwrap()));
    let views = restarted.quorum.handle().views(None).await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].activity, "lunch");
    assert_eq!(views[0].participants, vec![p("amy"), p("bo")]);

    let saved: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(saved.as_array().map(Vec::len), Some(1));
}
