//! Diagnostic Trouble Code Sets

use crate::table::ValueTable;
use std::fmt;
use std::time::Instant;

/// Which diagnostic message a code was reported in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DtcCategory {
    /// Currently active (DM1)
    Active,
    /// Previously active (DM2)
    Previous,
    /// Captured with a freeze frame (DM4)
    FreezeFrame,
}

/// Composite SPN + FMI key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DtcKey {
    pub spn: u32,
    pub fmi: u8,
}

impl fmt::Display for DtcKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SPN {} FMI {}", self.spn, self.fmi)
    }
}

/// One reported code as decoded from a diagnostic message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtcUpdate {
    pub key: DtcKey,
    pub source: u8,
    pub occurrence_count: u8,
    pub conversion_method: bool,
    /// Freeze frame parameters (DM4 only)
    pub snapshot: Vec<u8>,
}

/// Latest state of one code
#[derive(Debug, Clone, PartialEq)]
pub struct DtcRecord {
    pub key: DtcKey,
    /// Last reporting controller
    pub source: u8,
    /// Occurrence count as reported by the controller
    pub occurrence_count: u8,
    pub conversion_method: bool,
    pub first_seen: Instant,
    pub last_seen: Instant,
    /// Number of messages that reported this code
    pub reports: u64,
    pub snapshot: Vec<u8>,
}

/// One table per category; cleared only on session reset
#[derive(Debug)]
pub struct DtcSets {
    active: ValueTable<DtcKey, DtcRecord>,
    previous: ValueTable<DtcKey, DtcRecord>,
    freeze_frame: ValueTable<DtcKey, DtcRecord>,
}

impl DtcSets {
    pub fn new() -> Self {
        Self {
            active: ValueTable::new("active DTC"),
            previous: ValueTable::new("previous DTC"),
            freeze_frame: ValueTable::new("freeze frame DTC"),
        }
    }

    /// Record a reported code
    pub fn record(&mut self, category: DtcCategory, update: DtcUpdate, at: Instant) -> &DtcRecord {
        let DtcUpdate {
            key,
            source,
            occurrence_count,
            conversion_method,
            snapshot,
        } = update;
        let insert_snapshot = snapshot.clone();
        self.table_mut(category).upsert(
            key,
            || DtcRecord {
                key,
                source,
                occurrence_count,
                conversion_method,
                first_seen: at,
                last_seen: at,
                reports: 1,
                snapshot: insert_snapshot,
            },
            |record| {
                record.source = source;
                record.occurrence_count = occurrence_count;
                record.conversion_method = conversion_method;
                record.last_seen = record.last_seen.max(at);
                record.reports += 1;
                if !snapshot.is_empty() {
                    record.snapshot = snapshot;
                }
            },
        )
    }

    /// Table for a category
    pub fn table(&self, category: DtcCategory) -> &ValueTable<DtcKey, DtcRecord> {
        match category {
            DtcCategory::Active => &self.active,
            DtcCategory::Previous => &self.previous,
            DtcCategory::FreezeFrame => &self.freeze_frame,
        }
    }

    fn table_mut(&mut self, category: DtcCategory) -> &mut ValueTable<DtcKey, DtcRecord> {
        match category {
            DtcCategory::Active => &mut self.active,
            DtcCategory::Previous => &mut self.previous,
            DtcCategory::FreezeFrame => &mut self.freeze_frame,
        }
    }

    /// Clear every category
    pub fn clear(&mut self) {
        self.active.clear();
        self.previous.clear();
        self.freeze_frame.clear();
    }
}

impl Default for DtcSets {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn update(spn: u32, fmi: u8, oc: u8) -> DtcUpdate {
        DtcUpdate {
            key: DtcKey { spn, fmi },
            source: 0,
            occurrence_count: oc,
            conversion_method: false,
            snapshot: Vec::new(),
        }
    }

    #[test]
    fn test_repeat_reports_keep_first_seen() {
        let mut sets = DtcSets::new();
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(1);
        sets.record(DtcCategory::Active, update(100, 1, 1), t0);
        let record = sets.record(DtcCategory::Active, update(100, 1, 2), t1);

        assert_eq!(record.first_seen, t0);
        assert_eq!(record.last_seen, t1);
        assert_eq!(record.occurrence_count, 2);
        assert_eq!(record.reports, 2);
        assert!(sets.table(DtcCategory::Previous).is_empty());
    }

    #[test]
    fn test_categories_are_independent_until_reset() {
        let mut sets = DtcSets::new();
        let now = Instant::now();
        sets.record(DtcCategory::Active, update(100, 1, 1), now);
        sets.record(DtcCategory::Previous, update(100, 1, 1), now);
        sets.record(DtcCategory::Previous, update(110, 3, 1), now);
        assert_eq!(sets.table(DtcCategory::Active).len(), 1);
        assert_eq!(sets.table(DtcCategory::Previous).len(), 2);

        sets.clear();
        assert!(sets.table(DtcCategory::Previous).is_empty());
    }
}
