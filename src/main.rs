use std::sync::Arc;

use tracing::{info, warn};

use roombook::calendar::{first_of_month, format_full_date, parse_iso_date};
use roombook::compactor::compact_if_due;
use roombook::config::Config;
use roombook::engine::BookingEngine;
use roombook::store::Store;

/// Replays the store, prints each room's month view as JSON lines, and
/// compacts the WAL if enough appends have accumulated.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    roombook::observability::init(config.metrics_port)?;

    let month = match std::env::var("ROOMBOOK_MONTH") {
        Ok(s) => parse_iso_date(&format!("{s}-01"))?,
        Err(_) => chrono::Local::now().date_naive(),
    };

    std::fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(Store::open(config.wal_path())?);
    let engine = BookingEngine::new(store.clone(), &config)?;

    let rooms = store.rooms();
    info!("roombook store at {}", config.wal_path().display());
    info!("  rooms: {}", rooms.len());
    info!("  bookings: {}", store.booking_count());
    info!("  hours: {}", engine.hours().window());
    info!("  overlapping pending on confirm: {}", engine.sibling_policy());
    info!("  month: {}", format_full_date(first_of_month(month), config.locale));

    for room in rooms.iter().filter(|r| r.active) {
        let overview = engine.month_overview(room.id, month).await?;
        println!("{}", serde_json::to_string(&overview)?);
    }

    match compact_if_due(&store, config.compact_threshold).await {
        Ok(true) => info!("WAL compacted"),
        Ok(false) => {}
        Err(e) => warn!("WAL compaction failed: {e}"),
    }
    Ok(())
}
