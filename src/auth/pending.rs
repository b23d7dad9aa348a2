//! Logins that passed the password check and await a one-time code.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct PendingAuthentication {
    pub owner: String,
    pub issued_at: DateTime<Utc>,
    /// Set once a code completed this login. The entry stays until it
    /// expires so a replay can be told apart from an unknown id.
    pub completed: bool,
}

impl PendingAuthentication {
    fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.issued_at > ttl
    }
}

#[derive(Debug)]
pub enum PendingLookup {
    Active(PendingAuthentication),
    Completed,
    Expired,
    Missing,
}

pub struct PendingStore {
    ttl: Duration,
    entries: Mutex<HashMap<Uuid, PendingAuthentication>>,
}

impl PendingStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Start a pending login for `owner`, replacing any earlier one.
    pub async fn begin(&self, owner: &str, now: DateTime<Utc>) -> Uuid {
        let id = Uuid::new_v4();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| {
            (entry.completed || entry.owner != owner) && !entry.is_expired(now, self.ttl)
        });
        entries.insert(
            id,
            PendingAuthentication {
                owner: owner.to_string(),
                issued_at: now,
                completed: false,
            },
        );
        id
    }

    /// Look up a pending login. Expired entries are removed on sight.
    pub async fn lookup(&self, id: Uuid, now: DateTime<Utc>) -> PendingLookup {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get(&id).cloned() else {
            return PendingLookup::Missing;
        };
        if entry.is_expired(now, self.ttl) {
            entries.remove(&id);
            PendingLookup::Expired
        } else if entry.completed {
            PendingLookup::Completed
        } else {
            PendingLookup::Active(entry)
        }
    }

    /// Mark a login as completed. False if it was already completed or gone.
    pub async fn complete(&self, id: Uuid) -> bool {
        match self.entries.lock().await.get_mut(&id) {
            Some(entry) if !entry.completed => {
                entry.completed = true;
                true
            }
            _ => false,
        }
    }

    pub async fn discard(&self, id: Uuid) -> Option<PendingAuthentication> {
        self.entries.lock().await.remove(&id)
    }
}
