//! In-memory storage for issued verification codes.

use crate::clock::Clock;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// A code waiting to be verified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationEntry {
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl VerificationEntry {
    /// An entry stays valid up to and including its expiry instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Email -> pending code. At most one entry per email; keys are used verbatim.
#[derive(Debug)]
pub struct CodeStore {
    entries: DashMap<String, VerificationEntry>,
    clock: Arc<dyn Clock>,
}

impl CodeStore {
    /// Create an empty store reading time from `clock`
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Current time according to the store's clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Insert or replace the entry for `email`
    pub fn put(&self, email: &str, entry: VerificationEntry) {
        if self.entries.insert(email.to_string(), entry).is_some() {
            debug!("Replaced pending code for email: {}", email);
        } else {
            debug!("Stored code for email: {}", email);
        }
    }

    pub fn get(&self, email: &str) -> Option<VerificationEntry> {
        self.entries.get(email).map(|entry| entry.value().clone())
    }

    /// Remove the entry for `email`, if any
    pub fn delete(&self, email: &str) {
        if self.entries.remove(email).is_some() {
            debug!("Removed code for email: {}", email);
        }
    }

    /// Remove the entry only if it still holds `code`.
    ///
    /// Returns true when this call consumed the entry; a concurrent caller
    /// racing on the same code sees false.
    pub fn remove_if_code(&self, email: &str, code: &str) -> bool {
        self.entries
            .remove_if(email, |_, entry| entry.code == code)
            .is_some()
    }

    /// Drop every entry past its expiry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.now();
        let before = self.entries.len();

        self.entries.retain(|_, entry| !entry.is_expired_at(now));

        let removed = before.saturating_sub(self.entries.len());
        info!(
            "Cleanup completed: {} expired codes removed, {} pending",
            removed,
            self.entries.len()
        );
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get statistics about current state
    pub fn stats(&self) -> StoreStats {
        let now = self.now();
        let expired = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_expired_at(now))
            .count();

        StoreStats {
            pending_codes: self.entries.len().saturating_sub(expired),
            expired_codes: expired,
        }
    }
}

/// Statistics about the current state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub pending_codes: usize,
    pub expired_codes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone};

    fn setup() -> (Arc<ManualClock>, CodeStore) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ));
        let store = CodeStore::new(clock.clone());
        (clock, store)
    }

    fn entry(store: &CodeStore, code: &str, ttl_minutes: i64) -> VerificationEntry {
        let now = store.now();
        VerificationEntry {
            code: code.to_string(),
            created_at: now,
            expires_at: now + Duration::minutes(ttl_minutes),
        }
    }

    #[test]
    fn test_put_get_delete() {
        let (_clock, store) = setup();
        let email = "test@example.com";

        assert!(store.get(email).is_none());

        store.put(email, entry(&store, "123456", 10));
        assert_eq!(store.get(email).unwrap().code, "123456");
        assert_eq!(store.len(), 1);

        store.delete(email);
        assert!(store.get(email).is_none());
        assert!(store.is_empty());

        // Deleting again is a no-op
        store.delete(email);
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_overwrites() {
        let (_clock, store) = setup();
        let email = "test@example.com";

        store.put(email, entry(&store, "111111", 10));
        store.put(email, entry(&store, "222222", 10));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(email).unwrap().code, "222222");
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let (_clock, store) = setup();

        store.put("User@Example.com", entry(&store, "111111", 10));
        assert!(store.get("user@example.com").is_none());
        assert!(store.get("User@Example.com").is_some());
    }

    #[test]
    fn test_get_does_not_mutate() {
        let (_clock, store) = setup();
        store.put("a@b.com", entry(&store, "123456", 10));

        let first = store.get("a@b.com");
        let second = store.get("a@b.com");
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_expiry_boundary() {
        let (clock, store) = setup();
        let e = entry(&store, "123456", 10);

        clock.advance(Duration::minutes(10));
        assert!(!e.is_expired_at(store.now()));

        clock.advance(Duration::seconds(1));
        assert!(e.is_expired_at(store.now()));
    }

    #[test]
    fn test_remove_if_code() {
        let (_clock, store) = setup();
        store.put("a@b.com", entry(&store, "123456", 10));

        assert!(!store.remove_if_code("a@b.com", "654321"));
        assert_eq!(store.len(), 1);

        assert!(store.remove_if_code("a@b.com", "123456"));
        assert!(store.is_empty());

        assert!(!store.remove_if_code("a@b.com", "123456"));
    }

    #[test]
    fn test_purge_expired() {
        let (clock, store) = setup();

        store.put("old@example.com", entry(&store, "111111", 10));
        clock.advance(Duration::minutes(5));
        store.put("new@example.com", entry(&store, "222222", 10));

        assert_eq!(store.purge_expired(), 0);
        assert_eq!(store.len(), 2);

        clock.advance(Duration::minutes(6));
        assert_eq!(
            store.stats(),
            StoreStats {
                pending_codes: 1,
                expired_codes: 1
            }
        );

        assert_eq!(store.purge_expired(), 1);
        assert!(store.get("old@example.com").is_none());
        assert!(store.get("new@example.com").is_some());
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let (_clock, store) = setup();
        let store = Arc::new(store);
        let mut handles = vec![];

        // Spawn multiple threads writing distinct emails
        for i in 0..8 {
            let store_clone = Arc::clone(&store);
            let handle = thread::spawn(move || {
                let email = format!("test{}@example.com", i);
                for round in 0..50 {
                    let e = entry(&store_clone, &format!("{:06}", 100_000 + round), 10);
                    store_clone.put(&email, e);
                    assert!(store_clone.get(&email).is_some());
                }
                email
            });
            handles.push(handle);
        }

        let emails: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // One entry per email, holding the last code written
        assert_eq!(store.len(), 8);
        for email in emails {
            assert_eq!(store.get(&email).unwrap().code, "100049");
        }
    }

    #[test]
    fn test_concurrent_consumption_succeeds_once() {
        use std::thread;

        let (_clock, store) = setup();
        let store = Arc::new(store);
        store.put("a@b.com", entry(&store, "123456", 10));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store_clone = Arc::clone(&store);
                thread::spawn(move || store_clone.remove_if_code("a@b.com", "123456"))
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }
}
