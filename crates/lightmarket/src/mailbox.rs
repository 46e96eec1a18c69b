//! Fallback delivery mailbox.
//!
//! When the browser session is not subscribed at the moment a payment event
//! fires, the notification is parked here and consumed by the status-poll
//! endpoint. At most one live entry exists per payment id (a later write
//! overwrites an earlier one), reads are destructive, and unread entries
//! self-expire after a fixed TTL.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::notify::NotificationPayload;

/// Lifetime of an unread mailbox entry.
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// Clock abstraction so expiry can be driven deterministically in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Trait for mailbox storage backends.
///
/// Implementations must be thread-safe (`Send + Sync`). Distinct payment
/// ids never contend; same-key races resolve as last-write-wins on `put`
/// and return-if-present on `take_once`.
pub trait MailboxStore: Send + Sync {
    /// Park a notification, replacing any existing entry for the payment id.
    /// Returns the generation number identifying this write.
    fn put(&self, payment_id: &str, payload: NotificationPayload) -> u64;

    /// Remove and return the entry if one is present and within its TTL.
    /// A second immediate call for the same key returns `None`.
    fn take_once(&self, payment_id: &str) -> Option<NotificationPayload>;

    /// Remove the entry only if `generation` still identifies it, so a
    /// timer for a consumed or overwritten entry is a no-op. Returns
    /// whether an entry was removed.
    fn expire(&self, payment_id: &str, generation: u64) -> bool;

    /// Drop every entry past its TTL. Returns the number removed.
    fn purge_expired(&self) -> usize;
}

struct Entry {
    payload: NotificationPayload,
    inserted_at: Instant,
    generation: u64,
}

/// In-memory mailbox backed by DashMap. Entries are lost on restart — an
/// accepted limitation of the single-instance design.
pub struct InMemoryMailbox {
    entries: DashMap<String, Entry>,
    generation: AtomicU64,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl InMemoryMailbox {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            generation: AtomicU64::new(0),
            ttl,
            clock,
        }
    }
}

impl MailboxStore for InMemoryMailbox {
    fn put(&self, payment_id: &str, payload: NotificationPayload) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        self.entries.insert(
            payment_id.to_string(),
            Entry {
                payload,
                inserted_at: self.clock.now(),
                generation,
            },
        );
        generation
    }

    fn take_once(&self, payment_id: &str) -> Option<NotificationPayload> {
        let (_, entry) = self.entries.remove(payment_id)?;
        // An entry that outlived its TTL without being swept is unreachable.
        if self.clock.now().duration_since(entry.inserted_at) >= self.ttl {
            return None;
        }
        Some(entry.payload)
    }

    fn expire(&self, payment_id: &str, generation: u64) -> bool {
        self.entries
            .remove_if(payment_id, |_, entry| entry.generation == generation)
            .is_some()
    }

    fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.duration_since(entry.inserted_at) < ttl);
        before - self.entries.len()
    }
}

/// Durable mailbox backed by SQLite. Survives restarts while keeping the
/// same one-shot-read and TTL semantics as the in-memory store.
pub struct SqliteMailbox {
    conn: Mutex<rusqlite::Connection>,
    generation: AtomicU64,
    ttl: Duration,
}

impl SqliteMailbox {
    /// Open (or create) a SQLite mailbox database at the given path.
    pub fn open(path: &str, ttl: Duration) -> Result<Self, rusqlite::Error> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS mailbox (
                payment_id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                generation INTEGER NOT NULL,
                inserted_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_mailbox_inserted_at ON mailbox(inserted_at);
            PRAGMA journal_mode=WAL;",
        )?;

        // Resume the generation sequence past anything already on disk so a
        // restart cannot reuse a live entry's generation.
        let max_generation: i64 =
            conn.query_row("SELECT COALESCE(MAX(generation), 0) FROM mailbox", [], |row| {
                row.get(0)
            })?;

        Ok(Self {
            conn: Mutex::new(conn),
            generation: AtomicU64::new(max_generation.max(0) as u64),
            ttl,
        })
    }

    fn lock(&self) -> MutexGuard<'_, rusqlite::Connection> {
        match self.conn.lock() {
            Ok(conn) => conn,
            Err(poisoned) => {
                tracing::error!("mailbox mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// Current unix timestamp. On clock error the maximum is used so entries
/// err on the side of surviving until the sweeper's next look.
fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or_else(|_| {
            tracing::error!("system clock before UNIX epoch");
            i64::MAX
        })
}

impl MailboxStore for SqliteMailbox {
    fn put(&self, payment_id: &str, payload: NotificationPayload) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let json = match serde_json::to_string(&payload) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize mailbox payload");
                return generation;
            }
        };
        let conn = self.lock();
        if let Err(e) = conn.execute(
            "INSERT OR REPLACE INTO mailbox (payment_id, payload, generation, inserted_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![payment_id, json, generation as i64, unix_now()],
        ) {
            tracing::warn!(error = %e, "failed to park mailbox entry — poll fallback unavailable for this payment");
        }
        generation
    }

    fn take_once(&self, payment_id: &str) -> Option<NotificationPayload> {
        let conn = self.lock();
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT payload, inserted_at FROM mailbox WHERE payment_id = ?1",
                [payment_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok();
        let (json, inserted_at) = row?;

        if let Err(e) = conn.execute("DELETE FROM mailbox WHERE payment_id = ?1", [payment_id]) {
            tracing::warn!(error = %e, "failed to consume mailbox entry");
        }

        if unix_now().saturating_sub(inserted_at) >= self.ttl.as_secs() as i64 {
            return None;
        }

        match serde_json::from_str(&json) {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::warn!(error = %e, "dropping corrupt mailbox payload");
                None
            }
        }
    }

    fn expire(&self, payment_id: &str, generation: u64) -> bool {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM mailbox WHERE payment_id = ?1 AND generation = ?2",
            rusqlite::params![payment_id, generation as i64],
        )
        .map(|removed| removed > 0)
        .unwrap_or(false)
    }

    fn purge_expired(&self) -> usize {
        let conn = self.lock();
        let cutoff = unix_now().saturating_sub(self.ttl.as_secs() as i64);
        conn.execute(
            "DELETE FROM mailbox WHERE inserted_at < ?1",
            rusqlite::params![cutoff],
        )
        .unwrap_or(0)
    }
}

/// Schedule the TTL expiry task for a freshly written entry.
///
/// The generation check makes a timer that outlives its entry a no-op, so a
/// consumed or overwritten entry is never clobbered by a stale timer.
pub fn schedule_expiry(
    store: Arc<dyn MailboxStore>,
    payment_id: String,
    generation: u64,
    ttl: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(ttl).await;
        if store.expire(&payment_id, generation) {
            tracing::debug!(payment_id = %payment_id, "expired unread mailbox entry");
        }
    });
}

/// Background sweep for entries whose expiry task never ran — a durable
/// store outliving the process that wrote it, or a task lost to shutdown.
pub fn start_mailbox_sweeper(store: Arc<dyn MailboxStore>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                tracing::info!(purged, "purged expired mailbox entries");
            }
        }
    });
}
