//! Page-granularity two-phase locking with deadlock detection.

use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::{Condvar, Mutex};

use crate::common::{DbError, PageId, Result, TransactionId};

/// Lock modes for a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Per-page lock state.
///
/// Invariant: `mode == Exclusive` implies exactly one holder; a page with
/// no holders has no entry in the table at all.
#[derive(Debug)]
struct LockState {
    mode: LockMode,
    holders: Vec<TransactionId>,
}

/// The waits-for graph, kept as two adjacency maps keyed by transaction id
/// so no references between transactions are ever stored. An edge T -> U
/// means T is waiting for a lock U holds.
#[derive(Debug, Default)]
struct WaitsForGraph {
    edges_out: HashMap<TransactionId, HashSet<TransactionId>>,
    edges_in: HashMap<TransactionId, HashSet<TransactionId>>,
}

impl WaitsForGraph {
    fn add_edge(&mut self, from: TransactionId, to: TransactionId) {
        if from == to {
            return;
        }
        self.edges_out.entry(from).or_default().insert(to);
        self.edges_in.entry(to).or_default().insert(from);
    }

    /// Removes every edge leaving `tid` (it stopped waiting).
    fn remove_out_edges(&mut self, tid: TransactionId) {
        if let Some(targets) = self.edges_out.remove(&tid) {
            for to in targets {
                if let Some(sources) = self.edges_in.get_mut(&to) {
                    sources.remove(&tid);
                }
            }
        }
    }

    /// Removes every edge pointing at `tid` (it released something).
    fn remove_in_edges(&mut self, tid: TransactionId) {
        if let Some(sources) = self.edges_in.remove(&tid) {
            for from in sources {
                if let Some(targets) = self.edges_out.get_mut(&from) {
                    targets.remove(&tid);
                }
            }
        }
    }

    /// Finds the designated deadlock victim, if any cycle exists.
    ///
    /// Transactions not on a cycle are eliminated by repeatedly removing
    /// zero-in-degree nodes; of the residue, the transaction with the
    /// largest id (the youngest) is the victim.
    fn victim(&self) -> Option<TransactionId> {
        let mut degrees: HashMap<TransactionId, usize> = HashMap::new();
        let mut queue: VecDeque<TransactionId> = VecDeque::new();
        for (&tid, sources) in &self.edges_in {
            degrees.insert(tid, sources.len());
            if sources.is_empty() {
                queue.push_back(tid);
            }
        }

        let mut visited = 0;
        while let Some(current) = queue.pop_front() {
            visited += 1;
            if let Some(targets) = self.edges_out.get(&current) {
                for to in targets {
                    if let Some(degree) = degrees.get_mut(to) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(*to);
                        }
                    }
                }
            }
        }
        if visited == degrees.len() {
            return None;
        }

        degrees
            .iter()
            .filter(|(_, &degree)| degree != 0)
            .map(|(&tid, _)| tid)
            .max()
    }
}

/// The lock manager: shared/exclusive page locks acquired incrementally
/// and released only at transaction completion (strict 2PL).
///
/// Blocked acquisitions wait on a condition variable and re-check the
/// grant condition on every wakeup. Before each wait the blocked
/// transaction records waits-for edges to every current holder and runs
/// cycle detection; the youngest transaction on a cycle aborts.
#[derive(Debug, Default)]
pub struct LockManager {
    table: Mutex<HashMap<PageId, LockState>>,
    cond: Condvar,
    graph: Mutex<WaitsForGraph>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until `tid` holds `pid` at `mode` or better. Re-acquisition
    /// is idempotent; a sole shared holder requesting exclusive upgrades in
    /// place. Fails with `Abort` only when `tid` is chosen as a deadlock
    /// victim.
    pub fn acquire(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> Result<()> {
        let mut table = self.table.lock();
        loop {
            let state = table.entry(pid).or_insert_with(|| LockState {
                mode: LockMode::Shared,
                holders: Vec::new(),
            });

            let granted = match mode {
                LockMode::Shared => {
                    if state.holders.is_empty() {
                        state.mode = LockMode::Shared;
                        state.holders.push(tid);
                        true
                    } else if state.holders.contains(&tid) {
                        // Already holds S or X; either satisfies a shared
                        // request.
                        true
                    } else if state.mode == LockMode::Shared {
                        state.holders.push(tid);
                        true
                    } else {
                        false
                    }
                }
                LockMode::Exclusive => {
                    if state.holders.is_empty() {
                        state.mode = LockMode::Exclusive;
                        state.holders.push(tid);
                        true
                    } else if state.holders.len() == 1 && state.holders[0] == tid {
                        // Sole holder: grant or upgrade in place.
                        state.mode = LockMode::Exclusive;
                        true
                    } else {
                        false
                    }
                }
            };

            if granted {
                let mut graph = self.graph.lock();
                graph.remove_out_edges(tid);
                return Ok(());
            }

            // Record the wait and look for deadlocks before sleeping.
            let holders: Vec<TransactionId> = state
                .holders
                .iter()
                .copied()
                .filter(|&h| h != tid)
                .collect();
            {
                let mut graph = self.graph.lock();
                for holder in holders {
                    graph.add_edge(tid, holder);
                }
                match graph.victim() {
                    Some(victim) if victim == tid => {
                        graph.remove_out_edges(tid);
                        drop(graph);
                        // Other waiters may have been blocked behind this
                        // request; let them re-check.
                        self.cond.notify_all();
                        return Err(DbError::Abort);
                    }
                    Some(_) => {
                        // A cycle exists but another transaction is the
                        // victim. Wake everyone so the victim, asleep in
                        // its own acquire, re-runs detection.
                        self.cond.notify_all();
                    }
                    None => {}
                }
            }

            self.cond.wait(&mut table);
        }
    }

    /// Removes `tid` from the holders of `pid`. The mode is never
    /// downgraded.
    ///
    /// # Panics
    /// Panics (in debug builds) if `tid` does not hold the page; releasing
    /// an unheld lock is a contract violation.
    pub fn release(&self, tid: TransactionId, pid: PageId) {
        let mut table = self.table.lock();
        let held = match table.get_mut(&pid) {
            Some(state) => {
                let before = state.holders.len();
                state.holders.retain(|&h| h != tid);
                let removed = state.holders.len() < before;
                if state.holders.is_empty() {
                    table.remove(&pid);
                }
                removed
            }
            None => false,
        };
        debug_assert!(held, "{tid} released {pid} without holding it");

        let mut graph = self.graph.lock();
        graph.remove_in_edges(tid);
        drop(graph);
        drop(table);
        self.cond.notify_all();
    }

    /// Returns true iff `tid` holds `pid` at `mode` or better.
    pub fn holds_lock(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> bool {
        let table = self.table.lock();
        match table.get(&pid) {
            Some(state) if state.holders.contains(&tid) => {
                mode == LockMode::Shared || state.mode == LockMode::Exclusive
            }
            _ => false,
        }
    }

    /// Returns every page `tid` currently locks, paired with the lock mode.
    /// Commit uses the mode to decide between flushing and releasing.
    pub fn locked_pages(&self, tid: TransactionId) -> Vec<(PageId, LockMode)> {
        let table = self.table.lock();
        table
            .iter()
            .filter(|(_, state)| state.holders.contains(&tid))
            .map(|(&pid, state)| (pid, state.mode))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn pid(n: u32) -> PageId {
        PageId::new(1, n)
    }

    #[test]
    fn test_shared_lock_join() {
        let lm = LockManager::new();
        let (t1, t2) = (TransactionId::new(), TransactionId::new());
        lm.acquire(t1, pid(0), LockMode::Shared).unwrap();
        lm.acquire(t2, pid(0), LockMode::Shared).unwrap();
        assert!(lm.holds_lock(t1, pid(0), LockMode::Shared));
        assert!(lm.holds_lock(t2, pid(0), LockMode::Shared));
        assert!(!lm.holds_lock(t1, pid(0), LockMode::Exclusive));
    }

    #[test]
    fn test_reacquire_is_idempotent() {
        let lm = LockManager::new();
        let t1 = TransactionId::new();
        lm.acquire(t1, pid(0), LockMode::Exclusive).unwrap();
        lm.acquire(t1, pid(0), LockMode::Exclusive).unwrap();
        lm.acquire(t1, pid(0), LockMode::Shared).unwrap();
        assert!(lm.holds_lock(t1, pid(0), LockMode::Exclusive));
        assert_eq!(lm.locked_pages(t1).len(), 1);
    }

    #[test]
    fn test_sole_holder_upgrades_in_place() {
        let lm = LockManager::new();
        let t1 = TransactionId::new();
        lm.acquire(t1, pid(0), LockMode::Shared).unwrap();
        lm.acquire(t1, pid(0), LockMode::Exclusive).unwrap();
        assert!(lm.holds_lock(t1, pid(0), LockMode::Exclusive));
    }

    #[test]
    fn test_release_allows_waiter_through() {
        let lm = Arc::new(LockManager::new());
        let (t1, t2) = (TransactionId::new(), TransactionId::new());
        lm.acquire(t1, pid(0), LockMode::Exclusive).unwrap();

        let lm2 = lm.clone();
        let waiter = thread::spawn(move || lm2.acquire(t2, pid(0), LockMode::Exclusive));

        thread::sleep(Duration::from_millis(50));
        lm.release(t1, pid(0));
        waiter.join().unwrap().unwrap();
        assert!(lm.holds_lock(t2, pid(0), LockMode::Exclusive));
    }

    #[test]
    fn test_state_invariants() {
        let lm = LockManager::new();
        let (t1, t2) = (TransactionId::new(), TransactionId::new());
        lm.acquire(t1, pid(0), LockMode::Shared).unwrap();
        lm.acquire(t2, pid(0), LockMode::Shared).unwrap();
        lm.acquire(t1, pid(1), LockMode::Exclusive).unwrap();

        let pages = lm.locked_pages(t1);
        assert_eq!(pages.len(), 2);
        let mode_of = |p: PageId| pages.iter().find(|(q, _)| *q == p).map(|(_, m)| *m);
        assert_eq!(mode_of(pid(0)), Some(LockMode::Shared));
        assert_eq!(mode_of(pid(1)), Some(LockMode::Exclusive));

        lm.release(t1, pid(0));
        lm.release(t2, pid(0));
        lm.release(t1, pid(1));
        assert!(lm.locked_pages(t1).is_empty());
        assert!(lm.locked_pages(t2).is_empty());
    }

    #[test]
    fn test_cross_lock_deadlock_aborts_exactly_one() {
        let lm = Arc::new(LockManager::new());
        let (t1, t2) = (TransactionId::new(), TransactionId::new());
        lm.acquire(t1, pid(0), LockMode::Exclusive).unwrap();
        lm.acquire(t2, pid(1), LockMode::Exclusive).unwrap();

        let lm1 = lm.clone();
        let h1 = thread::spawn(move || {
            let res = lm1.acquire(t1, pid(1), LockMode::Exclusive);
            if res.is_err() {
                lm1.release(t1, pid(0));
            }
            res
        });
        let lm2 = lm.clone();
        let h2 = thread::spawn(move || {
            let res = lm2.acquire(t2, pid(0), LockMode::Exclusive);
            if res.is_err() {
                lm2.release(t2, pid(1));
            }
            res
        });

        let r1 = h1.join().unwrap();
        let r2 = h2.join().unwrap();
        assert!(
            r1.is_err() ^ r2.is_err(),
            "exactly one transaction must abort, got {r1:?} / {r2:?}"
        );
    }

    #[test]
    fn test_upgrade_deadlock_resolves() {
        // Both transactions hold S and race to upgrade; one must abort.
        let lm = Arc::new(LockManager::new());
        let (t1, t2) = (TransactionId::new(), TransactionId::new());
        lm.acquire(t1, pid(0), LockMode::Shared).unwrap();
        lm.acquire(t2, pid(0), LockMode::Shared).unwrap();

        let spawn_upgrade = |lm: Arc<LockManager>, tid: TransactionId| {
            thread::spawn(move || {
                let res = lm.acquire(tid, pid(0), LockMode::Exclusive);
                if res.is_err() {
                    lm.release(tid, pid(0));
                }
                res
            })
        };
        let h1 = spawn_upgrade(lm.clone(), t1);
        let h2 = spawn_upgrade(lm.clone(), t2);
        let r1 = h1.join().unwrap();
        let r2 = h2.join().unwrap();
        assert!(r1.is_err() ^ r2.is_err());
    }
}
