//! The farm facade: the bridge between pool sessions and mining devices.
//!
//! The session layer neither knows nor cares how many GPUs exist. It sees
//! one object that accepts work packages and produces solutions. Work
//! replacement is atomic (a `watch` channel: miners always observe the
//! latest package, never an intermediate), and solution submission is safe
//! from any miner thread.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::pool::work::{Solution, WorkPackage};

/// What the pool manager needs from a farm.
pub trait FarmFacade: Send + Sync {
    /// Replace the current work package. Unconditional: stopping work in
    /// progress on the previous package is the farm's problem.
    fn set_work(&self, work: WorkPackage);

    /// Drop the current package; miners idle until new work arrives.
    fn clear_work(&self);

    fn record_accepted(&self, stale: bool);
    fn record_rejected(&self, stale: bool);

    /// Aggregate hashrate in H/s, as last reported by the miners.
    fn hashrate(&self) -> f64;
}

/// Solution accounting, updated from the manager's event handler and read
/// by the status line.
#[derive(Default)]
pub struct SolutionStats {
    accepted: AtomicU64,
    accepted_stale: AtomicU64,
    rejected: AtomicU64,
    rejected_stale: AtomicU64,
}

impl SolutionStats {
    fn accept(&self, stale: bool) {
        if stale {
            self.accepted_stale.fetch_add(1, Ordering::Relaxed);
        } else {
            self.accepted.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn reject(&self, stale: bool) {
        if stale {
            self.rejected_stale.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed) + self.accepted_stale.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed) + self.rejected_stale.load(Ordering::Relaxed)
    }
}

impl fmt::Display for SolutionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "A{}+{}:R{}+{}",
            self.accepted.load(Ordering::Relaxed),
            self.accepted_stale.load(Ordering::Relaxed),
            self.rejected.load(Ordering::Relaxed),
            self.rejected_stale.load(Ordering::Relaxed),
        )
    }
}

/// The concrete farm.
///
/// Miners subscribe to work with [`Farm::subscribe_work`] and hand found
/// nonces to [`Farm::found_solution`]; the manager consumes them from the
/// receiver returned by [`Farm::new`].
pub struct Farm {
    work_tx: watch::Sender<Option<WorkPackage>>,
    solution_tx: mpsc::UnboundedSender<Solution>,
    hashrate_bits: AtomicU64,
    stats: SolutionStats,
}

impl Farm {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Solution>) {
        let (work_tx, _) = watch::channel(None);
        let (solution_tx, solution_rx) = mpsc::unbounded_channel();

        let farm = Arc::new(Self {
            work_tx,
            solution_tx,
            hashrate_bits: AtomicU64::new(0),
            stats: SolutionStats::default(),
        });
        (farm, solution_rx)
    }

    /// A receiver that always holds the latest work package (or `None`
    /// while disconnected).
    pub fn subscribe_work(&self) -> watch::Receiver<Option<WorkPackage>> {
        self.work_tx.subscribe()
    }

    pub fn current_work(&self) -> Option<WorkPackage> {
        self.work_tx.borrow().clone()
    }

    /// Thread-safe entry point for miners that found a nonce.
    ///
    /// Solutions for a package the farm has already moved past are flagged
    /// stale here; they are still submitted.
    pub fn found_solution(&self, mut solution: Solution) {
        let superseded = match self.work_tx.borrow().as_ref() {
            Some(current) => current.header != solution.work.header,
            None => true,
        };
        solution.stale = solution.stale || superseded;

        if self.solution_tx.send(solution).is_err() {
            debug!("solution dropped: no manager attached");
        }
    }

    /// Miners report their aggregate hashrate here, in H/s.
    pub fn set_hashrate(&self, rate: f64) {
        self.hashrate_bits.store(rate.to_bits(), Ordering::Relaxed);
    }

    pub fn solution_stats(&self) -> &SolutionStats {
        &self.stats
    }
}

impl FarmFacade for Farm {
    fn set_work(&self, work: WorkPackage) {
        self.work_tx.send_replace(Some(work));
    }

    fn clear_work(&self) {
        self.work_tx.send_replace(None);
    }

    fn record_accepted(&self, stale: bool) {
        self.stats.accept(stale);
    }

    fn record_rejected(&self, stale: bool) {
        self.stats.reject(stale);
    }

    fn hashrate(&self) -> f64 {
        f64::from_bits(self.hashrate_bits.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::work::H256;

    fn package(tag: u8) -> WorkPackage {
        WorkPackage {
            header: H256([tag; 32]),
            job: format!("job-{tag}"),
            job_len: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_work_replacement_is_total() {
        let (farm, _solutions) = Farm::new();
        let rx = farm.subscribe_work();

        farm.set_work(package(1));
        farm.set_work(package(2));

        // A late subscriber (or slow miner) only ever sees the latest.
        assert_eq!(rx.borrow().as_ref().unwrap().header, H256([2; 32]));
        assert_eq!(farm.current_work().unwrap().job, "job-2");

        farm.clear_work();
        assert!(farm.current_work().is_none());
    }

    #[test]
    fn test_solution_for_superseded_work_marked_stale() {
        let (farm, mut solutions) = Farm::new();

        farm.set_work(package(1));
        farm.set_work(package(2));

        // Nonce found against the old package
        farm.found_solution(Solution {
            nonce: 42,
            mix_hash: H256::ZERO,
            work: package(1),
            stale: false,
        });
        assert!(solutions.try_recv().unwrap().stale);

        // Nonce against the current package stays fresh
        farm.found_solution(Solution {
            nonce: 43,
            mix_hash: H256::ZERO,
            work: package(2),
            stale: false,
        });
        assert!(!solutions.try_recv().unwrap().stale);
    }

    #[test]
    fn test_stats_counters_and_display() {
        let (farm, _solutions) = Farm::new();

        farm.record_accepted(false);
        farm.record_accepted(false);
        farm.record_accepted(true);
        farm.record_rejected(false);

        let stats = farm.solution_stats();
        assert_eq!(stats.accepted(), 3);
        assert_eq!(stats.rejected(), 1);
        assert_eq!(stats.to_string(), "A2+1:R1+0");
    }

    #[test]
    fn test_hashrate_roundtrip() {
        let (farm, _solutions) = Farm::new();
        farm.set_hashrate(31.5e6);
        assert_eq!(farm.hashrate(), 31.5e6);
    }
}
