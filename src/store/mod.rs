mod log;

pub use log::RecordLog;

use std::io;
use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};
use ulid::Ulid;

use crate::model::*;

#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    NotFound(Ulid),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "store I/O error: {e}"),
            StoreError::NotFound(id) => write!(f, "record not found: {id}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::Io(e)
    }
}

/// Durable record of services, clients, bookings and admins.
///
/// The calendar decides availability; this store only keeps what was booked
/// for reporting and lookup.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn upsert_service(&self, service: Service) -> Result<(), StoreError>;
    async fn get_service(&self, id: ServiceId) -> Result<Option<Service>, StoreError>;
    async fn list_services(&self, active_only: bool) -> Result<Vec<Service>, StoreError>;

    async fn upsert_client(&self, client: Client) -> Result<(), StoreError>;
    async fn get_client(&self, id: Ulid) -> Result<Option<Client>, StoreError>;
    async fn find_client(&self, platform: Platform, user_id: i64) -> Result<Option<Client>, StoreError>;

    async fn create_booking(&self, booking: Booking) -> Result<(), StoreError>;
    async fn get_booking(&self, id: Ulid) -> Result<Option<Booking>, StoreError>;
    async fn set_booking_status(&self, id: Ulid, status: BookingStatus) -> Result<(), StoreError>;
    async fn bookings_for_client(&self, client_id: Ulid) -> Result<Vec<Booking>, StoreError>;

    async fn upsert_admin(&self, admin: Admin) -> Result<(), StoreError>;
    async fn list_admins(&self) -> Result<Vec<Admin>, StoreError>;
}

type AdminKey = (Option<i64>, Option<i64>);

/// Log-backed store: every mutation is appended to a `RecordLog`, state is
/// rebuilt by replaying it at open.
pub struct WalStore {
    log: Mutex<RecordLog>,
    services: DashMap<ServiceId, Service>,
    clients: DashMap<Ulid, Client>,
    bookings: DashMap<Ulid, Booking>,
    admins: DashMap<AdminKey, Admin>,
}

impl WalStore {
    pub fn open(path: &Path) -> io::Result<Self> {
        let records = RecordLog::replay(path)?;
        let store = Self {
            log: Mutex::new(RecordLog::new(path)),
            services: DashMap::new(),
            clients: DashMap::new(),
            bookings: DashMap::new(),
            admins: DashMap::new(),
        };
        for record in &records {
            store.apply(record);
        }
        info!(
            "store {}: replayed {} records ({} services, {} clients, {} bookings)",
            path.display(),
            records.len(),
            store.services.len(),
            store.clients.len(),
            store.bookings.len()
        );
        Ok(store)
    }

    fn apply(&self, record: &Record) {
        match record {
            Record::ServiceUpserted(service) => {
                self.services.insert(service.id, service.clone());
            }
            Record::ClientUpserted(client) => {
                self.clients.insert(client.id, client.clone());
            }
            Record::BookingCreated(booking) => {
                self.bookings.insert(booking.id, booking.clone());
            }
            Record::BookingStatusChanged { id, status } => {
                if let Some(mut booking) = self.bookings.get_mut(id) {
                    booking.status = *status;
                }
            }
            Record::AdminUpserted(admin) => {
                self.admins.insert((admin.telegram_id, admin.vk_id), admin.clone());
            }
        }
    }

    /// Log-append + apply in one call.
    async fn persist(&self, record: Record) -> Result<(), StoreError> {
        let mut log = self.log.lock().await;
        log.append(&record)?;
        self.apply(&record);
        Ok(())
    }

    /// Rewrite the log as one record per live entity.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let mut log = self.log.lock().await;
        let mut records = Vec::new();
        records.extend(self.services.iter().map(|e| Record::ServiceUpserted(e.value().clone())));
        records.extend(self.clients.iter().map(|e| Record::ClientUpserted(e.value().clone())));
        records.extend(self.bookings.iter().map(|e| Record::BookingCreated(e.value().clone())));
        records.extend(self.admins.iter().map(|e| Record::AdminUpserted(e.value().clone())));
        let before = log.appends_since_compact();
        log.compact(&records)?;
        debug!("compacted {}: {before} appends -> {} records", log.path().display(), records.len());
        Ok(())
    }

    /// Compact once `threshold` appends have accumulated. Returns whether it ran.
    pub async fn compact_if_needed(&self, threshold: u64) -> Result<bool, StoreError> {
        if self.log.lock().await.appends_since_compact() < threshold {
            return Ok(false);
        }
        self.compact().await?;
        Ok(true)
    }
}

#[async_trait]
impl BookingStore for WalStore {
    async fn upsert_service(&self, service: Service) -> Result<(), StoreError> {
        self.persist(Record::ServiceUpserted(service)).await
    }

    async fn get_service(&self, id: ServiceId) -> Result<Option<Service>, StoreError> {
        Ok(self.services.get(&id).map(|e| e.value().clone()))
    }

    async fn list_services(&self, active_only: bool) -> Result<Vec<Service>, StoreError> {
        let mut services: Vec<Service> = self
            .services
            .iter()
            .filter(|e| !active_only || e.value().is_active)
            .map(|e| e.value().clone())
            .collect();
        services.sort_by_key(|s| s.id);
        Ok(services)
    }

    async fn upsert_client(&self, client: Client) -> Result<(), StoreError> {
        self.persist(Record::ClientUpserted(client)).await
    }

    async fn get_client(&self, id: Ulid) -> Result<Option<Client>, StoreError> {
        Ok(self.clients.get(&id).map(|e| e.value().clone()))
    }

    async fn find_client(&self, platform: Platform, user_id: i64) -> Result<Option<Client>, StoreError> {
        Ok(self
            .clients
            .iter()
            .find(|e| e.value().platform_id(platform) == Some(user_id))
            .map(|e| e.value().clone()))
    }

    async fn create_booking(&self, booking: Booking) -> Result<(), StoreError> {
        self.persist(Record::BookingCreated(booking)).await
    }

    async fn get_booking(&self, id: Ulid) -> Result<Option<Booking>, StoreError> {
        Ok(self.bookings.get(&id).map(|e| e.value().clone()))
    }

    async fn set_booking_status(&self, id: Ulid, status: BookingStatus) -> Result<(), StoreError> {
        if !self.bookings.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        self.persist(Record::BookingStatusChanged { id, status }).await
    }

    async fn bookings_for_client(&self, client_id: Ulid) -> Result<Vec<Booking>, StoreError> {
        let mut bookings: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|e| e.value().client_id == client_id)
            .map(|e| e.value().clone())
            .collect();
        bookings.sort_by_key(|b| b.start);
        Ok(bookings)
    }

    async fn upsert_admin(&self, admin: Admin) -> Result<(), StoreError> {
        self.persist(Record::AdminUpserted(admin)).await
    }

    async fn list_admins(&self) -> Result<Vec<Admin>, StoreError> {
        Ok(self.admins.iter().map(|e| e.value().clone()).collect())
    }
}
