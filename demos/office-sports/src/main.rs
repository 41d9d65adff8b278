use std::time::Duration;

use chrono::Timelike;
use quorum::prelude::*;

// ---------------------------------------------------------------------------
// Scripted afternoon at the office
// ---------------------------------------------------------------------------

const CONFIG_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/venue.json");

#[tokio::main]
async fn main() -> Result<(), QuorumError> {
    init_tracing("info,quorum::announce=info");

    let config = load_config(CONFIG_PATH)?;
    let quorum = Quorum::builder().config(config).start()?;
    let venue = quorum.handle();
    let who = ParticipantId::new;

    // Pool fills up and takes the table straight away.
    venue.register("pool", Slot::Now, &who("amy")).await?;
    venue.register("pool", Slot::Now, &who("bo")).await?;

    // Foosball fills up too but has to queue for the table.
    for name in ["cat", "dan", "eve", "fox"] {
        venue.register("foosball", Slot::Now, &who(name)).await?;
    }
    venue
        .set_hold("foosball", Slot::Now, &who("dan"), Some("finishing a call".into()))
        .await?;

    // Lunch has no team size; the first ready mark starts it.
    venue.register("lunch", Slot::Now, &who("gus")).await?;
    venue.register("lunch", Slot::Now, &who("hal")).await?;
    venue.set_ready_mark("lunch", Slot::Now, &who("gus"), true).await?;

    // Someone books a later game on the hour.
    let later = SystemClock
        .now()
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .map(|t| t + chrono::Duration::hours(1));
    if let Some(later) = later {
        venue.register("pool", Slot::At(later), &who("ivy")).await?;
    }

    tokio::time::sleep(Duration::from_millis(50)).await;

    for game in venue.views(None).await? {
        println!("{:>9}: {game}", game.activity);
    }
    for area in venue.areas().await? {
        println!("{area}");
    }
    for started in venue.take_commenced().await? {
        tracing::info!(
            activity = %started.activity,
            slot = %started.slot,
            players = started.participants.len(),
            "commenced"
        );
    }

    venue.clear_hold("foosball", Slot::Now, &who("dan")).await?;
    if let Some(next) = venue.get_next_game("foosball").await? {
        println!("next foosball: {next}");
    }

    quorum.shutdown().await
}
