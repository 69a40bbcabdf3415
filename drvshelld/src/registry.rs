//! Driver registry: maps `(driver-name, slot)` identities to live
//! [`crate::client::Client`] records via the external Pearson hash.
//!
//! Buckets are plain `Vec`s, not a `HashMap` -- collisions within a
//! bucket are resolved by linear scan on exact identity: a two-level
//! lookup, hash bucket then exact match.

use crate::client::Client;
use drvsh_proto::hash;
use tracing::{debug, warn};

/// One entry in the registry: identity plus its client state machine.
pub struct Record {
    pub name: String,
    pub slot: u32,
    pub client: Client,
}

const BUCKETS: usize = 256;

pub struct Registry {
    buckets: Vec<Vec<Record>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            buckets: (0..BUCKETS).map(|_| Vec::new()).collect(),
        }
    }

    fn bucket_index(name: &str, slot: u32) -> usize {
        hash::hash_key(name, slot) as usize
    }

    pub fn lookup(&self, name: &str, slot: u32) -> Option<&Record> {
        self.buckets[Self::bucket_index(name, slot)]
            .iter()
            .find(|r| r.name == name && r.slot == slot)
    }

    pub fn lookup_mut(&mut self, name: &str, slot: u32) -> Option<&mut Record> {
        self.buckets[Self::bucket_index(name, slot)]
            .iter_mut()
            .find(|r| r.name == name && r.slot == slot)
    }

    /// Inserts a fresh record. A duplicate `(name, slot)` is a caller
    /// bug, not a recoverable condition -- the directory supervisor
    /// must never observe the same identity twice without an
    /// intervening removal.
    pub fn insert(&mut self, name: String, slot: u32, client: Client) {
        let idx = Self::bucket_index(&name, slot);
        let bucket = &mut self.buckets[idx];

        if bucket.iter().any(|r| r.name == name && r.slot == slot) {
            panic!("duplicate driver: {name} at slot {slot}");
        }

        debug!(driver = %name, slot, "registered endpoint");
        bucket.push(Record { name, slot, client });
    }

    pub fn remove(&mut self, name: &str, slot: u32) -> Option<Record> {
        let idx = Self::bucket_index(name, slot);
        let bucket = &mut self.buckets[idx];

        match bucket.iter().position(|r| r.name == name && r.slot == slot) {
            Some(pos) => {
                debug!(driver = %name, slot, "removed endpoint");
                Some(bucket.remove(pos))
            }
            None => {
                warn!(driver = %name, slot, "delete event for unknown endpoint");
                None
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.buckets.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Record> {
        self.buckets.iter_mut().flatten()
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disconnected_client() -> Client {
        Client::new_disconnected()
    }

    #[test]
    fn insert_and_lookup() {
        let mut reg = Registry::new();

        reg.insert("thermo".into(), 3, disconnected_client());

        let rec = reg.lookup("thermo", 3).expect("record should exist");
        assert_eq!(rec.name, "thermo");
        assert_eq!(rec.slot, 3);
    }

    #[test]
    fn lookup_missing_returns_none() {
        let reg = Registry::new();
        assert!(reg.lookup("thermo", 3).is_none());
    }

    #[test]
    #[should_panic(expected = "duplicate driver")]
    fn duplicate_insert_panics() {
        let mut reg = Registry::new();

        reg.insert("thermo".into(), 3, disconnected_client());
        reg.insert("thermo".into(), 3, disconnected_client());
    }

    #[test]
    fn remove_drops_record() {
        let mut reg = Registry::new();

        reg.insert("thermo".into(), 3, disconnected_client());
        assert!(reg.remove("thermo", 3).is_some());
        assert!(reg.lookup("thermo", 3).is_none());
    }

    #[test]
    fn remove_unknown_returns_none() {
        let mut reg = Registry::new();
        assert!(reg.remove("thermo", 3).is_none());
    }

    #[test]
    fn distinguishes_same_name_different_slot() {
        let mut reg = Registry::new();

        reg.insert("thermo".into(), 3, disconnected_client());
        reg.insert("thermo".into(), 4, disconnected_client());

        assert_eq!(reg.len(), 2);
        assert!(reg.lookup("thermo", 3).is_some());
        assert!(reg.lookup("thermo", 4).is_some());
    }

    #[test]
    fn len_and_is_empty() {
        let mut reg = Registry::new();
        assert!(reg.is_empty());

        reg.insert("thermo".into(), 3, disconnected_client());
        assert_eq!(reg.len(), 1);
        assert!(!reg.is_empty());
    }
}
