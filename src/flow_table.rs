use thiserror::Error;

use crate::bits::test_bit;
use crate::openflow0x04::{field_match, FlowMatch, FlowMod};

/// Capacity of the single flow table.
pub const MAX_FLOWS: usize = 128;

/// An installed forwarding rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowEntry {
    pub pattern: FlowMatch,
    pub priority: u16,
    pub cookie: u64,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub flags: u16,
    pub table_id: u8,
}

impl FlowEntry {
    const EMPTY: FlowEntry = FlowEntry {
        pattern: FlowMatch {
            wildcards: 0,
            in_port: 0,
            eth_src: [0; 6],
            eth_dst: [0; 6],
            eth_type: 0,
        },
        priority: 0,
        cookie: 0,
        idle_timeout: 0,
        hard_timeout: 0,
        flags: 0,
        table_id: 0,
    };

    pub fn from_flow_mod(fm: &FlowMod) -> FlowEntry {
        FlowEntry {
            pattern: fm.pattern,
            priority: fm.priority,
            cookie: fm.cookie,
            idle_timeout: fm.idle_timeout,
            hard_timeout: fm.hard_timeout,
            flags: fm.flags,
            table_id: 0, // single table
        }
    }

    /// Whether the controller asked for a FLOW_REMOVED when this entry dies.
    pub fn wants_removal_notice(&self) -> bool {
        test_bit(0, self.flags as u64)
    }
}

/// Per-flow bookkeeping, paired index-for-index with `FlowEntry`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowCounters {
    /// Switch uptime when the flow was installed.
    pub duration: u32,
    /// Switch uptime of the most recent data-plane hit.
    pub last_match: u32,
    pub packet_count: u64,
    pub byte_count: u64,
    pub active: bool,
}

/// The table is at capacity; surfaced to the controller as
/// FLOW_MOD_FAILED/TABLE_FULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("flow table full ({MAX_FLOWS} entries)")]
pub struct TableFull;

/// An entry evicted by `delete` whose flags requested a removal notification.
#[derive(Debug, Clone, Copy)]
pub struct RemovedFlow {
    pub entry: FlowEntry,
    pub counters: FlowCounters,
}

/// Fixed-capacity flow store.
///
/// Entries and counters sit in parallel arenas; index `i` in both arrays
/// always describes one logical flow, and only indices `[0, active_count)`
/// are live. Deletion compacts by moving the last live pair into the vacated
/// slot, so order is insignificant.
pub struct FlowTable {
    entries: [FlowEntry; MAX_FLOWS],
    counters: [FlowCounters; MAX_FLOWS],
    active_count: usize,
}

impl Default for FlowTable {
    fn default() -> FlowTable {
        FlowTable::new()
    }
}

impl FlowTable {
    pub fn new() -> FlowTable {
        FlowTable {
            entries: [FlowEntry::EMPTY; MAX_FLOWS],
            counters: [FlowCounters::default(); MAX_FLOWS],
            active_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.active_count
    }

    /// The data-plane "flow miss" predicate: a frame arriving while the table
    /// is empty punts to the controller.
    pub fn is_empty(&self) -> bool {
        self.active_count == 0
    }

    /// Append `entry` and initialize its counters. Rejects at capacity with
    /// the table untouched.
    pub fn add(&mut self, entry: FlowEntry, now: u32) -> Result<usize, TableFull> {
        if self.active_count == MAX_FLOWS {
            return Err(TableFull);
        }
        let idx = self.active_count;
        self.entries[idx] = entry;
        self.counters[idx] = FlowCounters {
            duration: now,
            last_match: now,
            packet_count: 0,
            byte_count: 0,
            active: true,
        };
        self.active_count += 1;
        Ok(idx)
    }

    /// Remove every live entry matched by `pattern`, compacting from the end.
    ///
    /// Returns the number removed plus the removed pairs that had asked for a
    /// removal notification, in eviction order. The slot just refilled by the
    /// moved tail entry is re-examined before the scan advances, since it now
    /// holds a different (possibly also-matching) flow.
    pub fn delete(&mut self, pattern: &FlowMatch) -> (usize, Vec<RemovedFlow>) {
        let mut removed = 0;
        let mut notices = vec![];
        let mut q = 0;
        while q < self.active_count {
            if field_match(pattern, &self.entries[q].pattern) {
                if self.entries[q].wants_removal_notice() {
                    notices.push(RemovedFlow {
                        entry: self.entries[q],
                        counters: self.counters[q],
                    });
                }
                let last = self.active_count - 1;
                self.entries[q] = self.entries[last];
                self.counters[q] = self.counters[last];
                self.entries[last] = FlowEntry::EMPTY;
                self.counters[last] = FlowCounters::default();
                self.active_count -= 1;
                removed += 1;
                // do not advance: slot q now holds the moved entry
            } else {
                q += 1;
            }
        }
        (removed, notices)
    }

    /// The live entry/counters pair at `idx`, if within the active range.
    pub fn entry(&self, idx: usize) -> Option<(&FlowEntry, &FlowCounters)> {
        if idx < self.active_count {
            Some((&self.entries[idx], &self.counters[idx]))
        } else {
            None
        }
    }

    /// Record a data-plane hit against the live flow at `idx`.
    pub fn note_match(&mut self, idx: usize, frame_len: u64, now: u32) {
        if idx < self.active_count {
            let c = &mut self.counters[idx];
            c.last_match = now;
            c.packet_count += 1;
            c.byte_count += frame_len;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openflow0x04::OFPFF_SEND_FLOW_REM;

    fn entry_for_port(port: u32, flags: u16) -> FlowEntry {
        FlowEntry {
            pattern: FlowMatch {
                wildcards: FlowMatch::WC_ETH_SRC
                    | FlowMatch::WC_ETH_DST
                    | FlowMatch::WC_ETH_TYPE,
                in_port: port,
                ..Default::default()
            },
            priority: 1,
            cookie: u64::from(port),
            idle_timeout: 0,
            hard_timeout: 0,
            flags,
            table_id: 0,
        }
    }

    fn port_pattern(port: u32) -> FlowMatch {
        FlowMatch {
            wildcards: FlowMatch::WC_ETH_SRC | FlowMatch::WC_ETH_DST | FlowMatch::WC_ETH_TYPE,
            in_port: port,
            ..Default::default()
        }
    }

    #[test]
    fn fill_to_capacity_then_reject() {
        let mut table = FlowTable::new();
        for i in 0..MAX_FLOWS {
            assert_eq!(table.add(entry_for_port(i as u32, 0), 5), Ok(i));
        }
        assert_eq!(table.add(entry_for_port(999, 0), 5), Err(TableFull));
        assert_eq!(table.len(), MAX_FLOWS);
    }

    #[test]
    fn add_initializes_counters() {
        let mut table = FlowTable::new();
        let idx = table.add(entry_for_port(1, 0), 42).unwrap();
        let (_, counters) = table.entry(idx).unwrap();
        assert!(counters.active);
        assert_eq!(counters.duration, 42);
        assert_eq!(counters.last_match, 42);
        assert_eq!(counters.packet_count, 0);
    }

    #[test]
    fn delete_single_match_keeps_pairing() {
        let mut table = FlowTable::new();
        for port in 1..=3 {
            table.add(entry_for_port(port, 0), port).unwrap();
        }
        let (removed, notices) = table.delete(&port_pattern(2));
        assert_eq!(removed, 1);
        assert!(notices.is_empty());
        assert_eq!(table.len(), 2);
        // every surviving pair still describes one logical flow
        for idx in 0..table.len() {
            let (entry, counters) = table.entry(idx).unwrap();
            assert!(counters.active);
            assert_eq!(u64::from(entry.pattern.in_port), entry.cookie);
            assert_eq!(counters.duration, entry.pattern.in_port);
        }
    }

    #[test]
    fn delete_match_all_empties_table() {
        let mut table = FlowTable::new();
        for port in 1..=40 {
            table.add(entry_for_port(port, 0), 0).unwrap();
        }
        let (removed, _) = table.delete(&FlowMatch::match_all());
        assert_eq!(removed, 40);
        assert!(table.is_empty());
    }

    #[test]
    fn delete_reexamines_backfilled_slot() {
        let mut table = FlowTable::new();
        // matching entries at both ends so compaction moves a matching tail
        // entry into the vacated head slot
        table.add(entry_for_port(7, 0), 0).unwrap();
        table.add(entry_for_port(1, 0), 0).unwrap();
        table.add(entry_for_port(7, 0), 0).unwrap();
        let (removed, _) = table.delete(&port_pattern(7));
        assert_eq!(removed, 2);
        assert_eq!(table.len(), 1);
        assert_eq!(table.entry(0).unwrap().0.pattern.in_port, 1);
    }

    #[test]
    fn delete_from_empty_table_is_noop() {
        let mut table = FlowTable::new();
        let (removed, notices) = table.delete(&FlowMatch::match_all());
        assert_eq!(removed, 0);
        assert!(notices.is_empty());
    }

    #[test]
    fn delete_collects_notify_flagged_entries() {
        let mut table = FlowTable::new();
        table.add(entry_for_port(1, OFPFF_SEND_FLOW_REM), 0).unwrap();
        table.add(entry_for_port(2, 0), 0).unwrap();
        let (removed, notices) = table.delete(&FlowMatch::match_all());
        assert_eq!(removed, 2);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].entry.pattern.in_port, 1);
    }

    #[test]
    fn note_match_updates_counters() {
        let mut table = FlowTable::new();
        let idx = table.add(entry_for_port(1, 0), 10).unwrap();
        table.note_match(idx, 64, 20);
        table.note_match(idx, 1500, 30);
        let (_, counters) = table.entry(idx).unwrap();
        assert_eq!(counters.packet_count, 2);
        assert_eq!(counters.byte_count, 1564);
        assert_eq!(counters.last_match, 30);
        assert_eq!(counters.duration, 10);
    }
}
