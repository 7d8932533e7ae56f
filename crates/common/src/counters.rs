//! Project-wide numeric suffix allocation.
//!
//! Every placeholder and synthesized interface name is `<Stem><n>` with `n`
//! unique per stem across the whole project. Workers share one
//! [`NameCounters`]; every allocation is logged with the allocating file's
//! topological rank so the suffixes can later be renumbered into an order
//! that does not depend on which worker finished first.
//!
//! A file that reuses an interface someone else registered records the
//! reuse, so the surviving name is ordered by its earliest user rather than
//! by whichever file got to register it.

use std::collections::BTreeMap;
use std::sync::Mutex;

/// One suffix handed out during this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub stem: String,
    pub number: u32,
    /// Topological rank of the file that allocated it.
    pub rank: usize,
    /// Position among the allocations of that file.
    pub ordinal: usize,
}

#[derive(Debug, Default)]
struct CounterState {
    next: BTreeMap<String, u32>,
    /// Highest suffix per stem that existed before this run.
    preexisting: BTreeMap<String, u32>,
    per_rank: BTreeMap<usize, usize>,
    log: Vec<Allocation>,
    /// Allocated name -> the registered name it was folded into.
    reused: BTreeMap<String, String>,
}

/// Thread-safe suffix allocator.
#[derive(Debug, Default)]
pub struct NameCounters {
    state: Mutex<CounterState>,
}

impl NameCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks suffixes of names that already exist (e.g. loaded from the
    /// registry) as taken.
    pub fn seed<'a>(&self, names: impl IntoIterator<Item = &'a str>) {
        let mut state = self.lock();
        for name in names {
            if let Some((stem, number, _)) = crate::numbered_parts(name) {
                let taken = state.preexisting.entry(stem.to_string()).or_insert(0);
                *taken = (*taken).max(number);
                let next = state.next.entry(stem.to_string()).or_insert(1);
                *next = (*next).max(number + 1);
            }
        }
    }

    /// Hands out the next suffix for `stem` on behalf of the file at `rank`.
    pub fn allocate(&self, stem: &str, rank: usize) -> u32 {
        let mut state = self.lock();
        let next = state.next.entry(stem.to_string()).or_insert(1);
        let number = *next;
        *next += 1;
        let ordinal = state.per_rank.entry(rank).or_insert(0);
        let current = *ordinal;
        *ordinal += 1;
        state.log.push(Allocation {
            stem: stem.to_string(),
            number,
            rank,
            ordinal: current,
        });
        number
    }

    /// Snapshot of the allocation log.
    pub fn allocations(&self) -> Vec<Allocation> {
        self.lock().log.clone()
    }

    /// Records that the interface allocated as `name` was dropped in favour
    /// of the already registered `existing`.
    pub fn record_reuse(&self, name: &str, existing: &str) {
        if name != existing {
            self.lock()
                .reused
                .insert(name.to_string(), existing.to_string());
        }
    }

    /// Rename map numbering the `survivors` allocated during this run.
    ///
    /// Each survivor is ordered by the smallest (rank, ordinal) among its own
    /// allocation and every allocation reused into it. Per stem, numbering
    /// is compact and restarts right after the highest pre-existing suffix.
    /// Survivors not allocated this run keep their names. Identity entries
    /// are omitted.
    pub fn renumbering<'a>(
        &self,
        survivors: impl IntoIterator<Item = &'a str>,
    ) -> BTreeMap<String, String> {
        let state = self.lock();
        let allocated: BTreeMap<String, &Allocation> = state
            .log
            .iter()
            .map(|a| (format!("{}{}", a.stem, a.number), a))
            .collect();

        let mut first_use: BTreeMap<String, (usize, usize)> = allocated
            .iter()
            .map(|(name, a)| (name.clone(), (a.rank, a.ordinal)))
            .collect();
        for name in state.reused.keys() {
            let Some(a) = allocated.get(name) else {
                continue;
            };
            let target = state.canonical(name);
            if let Some(key) = first_use.get_mut(target) {
                *key = (*key).min((a.rank, a.ordinal));
            }
        }

        let mut by_stem: BTreeMap<&str, Vec<((usize, usize), &str)>> = BTreeMap::new();
        for name in survivors {
            if let (Some(a), Some(key)) = (allocated.get(name), first_use.get(name)) {
                by_stem.entry(&a.stem).or_default().push((*key, name));
            }
        }
        let mut map = BTreeMap::new();
        for (stem, mut names) in by_stem {
            names.sort();
            names.dedup();
            let base = state.preexisting.get(stem).copied().unwrap_or(0);
            for (i, (_, name)) in names.into_iter().enumerate() {
                let renamed = format!("{stem}{}", base + 1 + i as u32);
                if renamed != name {
                    map.insert(name.to_string(), renamed);
                }
            }
        }
        map
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CounterState> {
        // Counters stay consistent across a panicking holder.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CounterState {
    /// End of the reuse chain starting at `name`.
    fn canonical<'s>(&'s self, mut name: &'s str) -> &'s str {
        for _ in 0..=self.reused.len() {
            match self.reused.get(name) {
                Some(next) => name = next,
                None => break,
            }
        }
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_is_unique_per_stem() {
        let counters = NameCounters::new();
        assert_eq!(counters.allocate("Content", 0), 1);
        assert_eq!(counters.allocate("Content", 0), 2);
        assert_eq!(counters.allocate("Role", 0), 1);
    }

    #[test]
    fn test_seed_skips_existing_suffixes() {
        let counters = NameCounters::new();
        counters.seed(["Content4", "Content2", "Message"]);
        assert_eq!(counters.allocate("Content", 0), 5);
        assert_eq!(counters.allocate("Message", 0), 1);
    }

    #[test]
    fn test_renumbering_orders_by_rank() {
        let counters = NameCounters::new();
        // rank 1 finished first, rank 0 second
        assert_eq!(counters.allocate("Content", 1), 1);
        assert_eq!(counters.allocate("Content", 0), 2);
        assert_eq!(counters.allocate("Content", 0), 3);

        let map = counters.renumbering(["Content1", "Content2", "Content3"]);
        assert_eq!(map.get("Content2").map(String::as_str), Some("Content1"));
        assert_eq!(map.get("Content3").map(String::as_str), Some("Content2"));
        assert_eq!(map.get("Content1").map(String::as_str), Some("Content3"));
    }

    #[test]
    fn test_renumbering_respects_preexisting() {
        let counters = NameCounters::new();
        counters.seed(["Content7"]);
        assert_eq!(counters.allocate("Content", 0), 8);
        assert!(counters.renumbering(["Content7", "Content8"]).is_empty());
    }

    #[test]
    fn test_renumbering_is_compact_over_survivors() {
        let counters = NameCounters::new();
        assert_eq!(counters.allocate("Content", 0), 1);
        assert_eq!(counters.allocate("Content", 0), 2);
        assert_eq!(counters.allocate("Content", 1), 3);

        // Content1 never became an interface.
        let map = counters.renumbering(["Content2", "Content3"]);
        assert_eq!(map.get("Content2").map(String::as_str), Some("Content1"));
        assert_eq!(map.get("Content3").map(String::as_str), Some("Content2"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_reuse_orders_survivor_by_earliest_user() {
        // rank 1 registers first; rank 0 later reuses it.
        let late = NameCounters::new();
        assert_eq!(late.allocate("P", 1), 1);
        assert_eq!(late.allocate("Q", 1), 1);
        assert_eq!(late.allocate("P", 0), 2);
        late.record_reuse("P2", "P1");

        // rank 0 registers first; rank 1 later reuses it.
        let early = NameCounters::new();
        assert_eq!(early.allocate("P", 0), 1);
        assert_eq!(early.allocate("P", 1), 2);
        assert_eq!(early.allocate("Q", 1), 1);
        early.record_reuse("P2", "P1");

        assert!(late.renumbering(["P1", "Q1"]).is_empty());
        assert!(early.renumbering(["P1", "Q1"]).is_empty());
    }

    #[test]
    fn test_reuse_chain_reaches_survivor() {
        let counters = NameCounters::new();
        assert_eq!(counters.allocate("P", 2), 1);
        assert_eq!(counters.allocate("P", 1), 2);
        assert_eq!(counters.allocate("P", 0), 3);
        assert_eq!(counters.allocate("P", 3), 4);
        counters.record_reuse("P3", "P2");
        counters.record_reuse("P2", "P1");

        // P1 inherits rank 0 through the chain and goes before P4.
        let map = counters.renumbering(["P4", "P1"]);
        assert_eq!(map.get("P4").map(String::as_str), Some("P2"));
        assert_eq!(map.len(), 1);
    }
}
