use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, warn};

use studiobook::calendar::MemoryCalendar;
use studiobook::config::{load_catalog, Config};
use studiobook::engine::{Scheduler, SlotQuery};
use studiobook::limits::COMPACT_THRESHOLD;
use studiobook::store::{BookingStore, WalStore};

const USAGE: &str = "usage: studiobook <YYYY-MM-DD> [duration-minutes]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    studiobook::observability::init(config.metrics_port)?;

    let mut args = std::env::args().skip(1);
    let Some(day) = args.next() else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };
    let day: NaiveDate = day.parse()?;
    let duration: Option<u32> = args.next().map(|d| d.parse()).transpose()?;

    std::fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(WalStore::open(&config.store_path())?);
    info!("  data_dir: {}", config.data_dir.display());
    info!("  timezone: {}", config.tz);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    if let Some(path) = &config.catalog {
        let services = load_catalog(path)?;
        info!("seeding {} services from {}", services.len(), path.display());
        for service in services {
            store.upsert_service(service).await?;
        }
    }
    if store.compact_if_needed(COMPACT_THRESHOLD).await? {
        info!("store log compacted");
    }

    // Stand-in for the hosted calendar: shows the full working grid.
    let scheduler = Scheduler::new(Arc::new(MemoryCalendar::new()), store, config);
    let services = scheduler.services().await?;
    if services.is_empty() {
        warn!("no active services; point STUDIO_CATALOG at a JSON catalog");
    }

    for service in services {
        let query = SlotQuery {
            service_id: service.id,
            day,
            duration_minutes: duration.map(|d| service.round_duration(d)),
            rest_of_day: false,
        };
        let availability = scheduler.available_slots(&query).await?;
        let marker = if availability.verified { "" } else { " [unverified]" };
        println!("{} (#{}){marker}", service.name, service.id);
        if availability.slots.is_empty() {
            println!("  no free slots");
        }
        for slot in &availability.slots {
            println!("  {}-{}", slot.start.format("%H:%M"), slot.end.format("%H:%M"));
        }
    }
    Ok(())
}
