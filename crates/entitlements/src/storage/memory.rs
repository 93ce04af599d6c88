//! In-memory record store.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::user::UserId;

use super::RecordStore;

/// A [`RecordStore`] backed by a `HashMap`. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: HashMap<UserId, (String, DateTime<Utc>)>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn load_raw(&self, user: &UserId) -> Result<Option<String>> {
        Ok(self.records.get(user).map(|(record, _)| record.clone()))
    }

    fn save_raw(&mut self, user: &UserId, record: &str, updated_at: DateTime<Utc>) -> Result<()> {
        self.records
            .insert(user.clone(), (record.to_string(), updated_at));
        Ok(())
    }

    fn insert_if_absent(
        &mut self,
        user: &UserId,
        record: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        match self.records.entry(user.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert((record.to_string(), updated_at));
                Ok(true)
            }
        }
    }

    fn list_users(&self) -> Result<Vec<UserId>> {
        let mut entries: Vec<(&UserId, &DateTime<Utc>)> = self
            .records
            .iter()
            .map(|(user, (_, updated_at))| (user, updated_at))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        Ok(entries.into_iter().map(|(user, _)| user.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_memory_store_round_trip() {
        let mut store = MemoryStore::new();
        let alice = UserId::new("alice").unwrap();
        let bob = UserId::new("bob").unwrap();
        assert!(store.load_raw(&alice).unwrap().is_none());

        store.save_raw(&alice, "{}", Utc::now()).unwrap();
        assert_eq!(store.load_raw(&alice).unwrap().as_deref(), Some("{}"));

        assert!(!store.insert_if_absent(&alice, "[]", Utc::now()).unwrap());
        assert_eq!(store.load_raw(&alice).unwrap().as_deref(), Some("{}"));

        assert!(store.insert_if_absent(&bob, "[]", Utc::now()).unwrap());
        assert_eq!(store.load_raw(&bob).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_memory_store_lists_most_recent_first() {
        let mut store = MemoryStore::new();
        let now = Utc::now();
        let a = UserId::new("a").unwrap();
        let b = UserId::new("b").unwrap();
        store.save_raw(&a, "{}", now - Duration::hours(1)).unwrap();
        store.save_raw(&b, "{}", now).unwrap();

        assert_eq!(store.list_users().unwrap(), vec![b, a]);
    }
}
