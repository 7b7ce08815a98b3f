//! Value Tables with Change Notification

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;
use tokio::sync::broadcast;
use tracing::debug;

/// Buffered events per subscriber before it starts lagging
const EVENT_CAPACITY: usize = 1024;

/// Notification emitted around every table mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableEvent<K> {
    /// `key` is about to be inserted or modified
    AboutToChange { key: K, version: u64 },
    /// `key` now holds its new value
    Changed { key: K, version: u64 },
    /// Every entry was removed
    Reset { version: u64 },
}

/// Map from composite key to latest record.
///
/// The dispatch loop is the only writer. Readers either borrow the table
/// between dispatch passes or subscribe to [`TableEvent`]s and refresh only
/// the keys that changed.
#[derive(Debug)]
pub struct ValueTable<K, V> {
    name: &'static str,
    entries: HashMap<K, V>,
    version: u64,
    events: broadcast::Sender<TableEvent<K>>,
}

impl<K, V> ValueTable<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty table
    pub fn new(name: &'static str) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            name,
            entries: HashMap::new(),
            version: 0,
            events,
        }
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<TableEvent<K>> {
        self.events.subscribe()
    }

    /// Insert `key` with `insert()` or modify the existing record with `update`
    pub fn upsert<I, U>(&mut self, key: K, insert: I, update: U) -> &V
    where
        I: FnOnce() -> V,
        U: FnOnce(&mut V),
    {
        let notify = self.events.receiver_count() > 0;
        if notify {
            let _ = self.events.send(TableEvent::AboutToChange {
                key: key.clone(),
                version: self.version,
            });
        }
        self.version += 1;

        let value = match self.entries.entry(key.clone()) {
            Entry::Occupied(entry) => {
                let value = entry.into_mut();
                update(value);
                value
            }
            Entry::Vacant(entry) => entry.insert(insert()),
        };

        if notify {
            let _ = self.events.send(TableEvent::Changed {
                key,
                version: self.version,
            });
        }
        value
    }

    /// Remove every entry (session reset)
    pub fn clear(&mut self) {
        debug!("Resetting {} table ({} entries)", self.name, self.entries.len());
        self.entries.clear();
        self.version += 1;
        let _ = self.events.send(TableEvent::Reset {
            version: self.version,
        });
    }

    /// Latest record for `key`
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Iterate over all records
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mutation counter, bumped on every change
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Table name used in logs
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Copy of every record
    pub fn snapshot(&self) -> Vec<(K, V)>
    where
        V: Clone,
    {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
