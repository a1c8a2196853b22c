//! Parallel exploration
//!
//! Backward revisits root independent subtrees: nothing a subtree explores
//! depends on its siblings. The pool keeps a bounded queue of such
//! subtrees; a worker that is about to descend into one offers it to the
//! queue first and only explores it itself when the queue is full.
//!
//! ```text
//!   worker 0 ──offer──▶ ┌────────────────────┐ ◀──pop── worker 1
//!   worker 2 ──offer──▶ │ VecDeque<Execution │ ◀──pop── worker 3
//!                       │ State> (≤ 2 × N)   │
//!                       └────────────────────┘
//! ```
//!
//! Each queued state is a deep copy; workers share no graph. The search
//! ends when the queue is empty and no worker is busy.

use crate::domain::config::CheckerConfig;
use crate::domain::error::CheckerError;
use crate::domain::report::{Outcome, VerificationResult};
use crate::domain::revisit::{ExecutionState, Explorer, Interpreter, SubtreeSink};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

struct Queue {
    states: VecDeque<ExecutionState>,
    active: usize,
}

/// State shared by all workers of one search
struct Shared {
    queue: Mutex<Queue>,
    ready: Condvar,
    halt: AtomicBool,
    outcomes: DashMap<Outcome, usize>,
    capacity: usize,
}

impl Shared {
    /// Next subtree, or `None` once the search is over
    fn take(&self) -> Option<ExecutionState> {
        let mut queue = self.queue.lock();
        loop {
            if self.should_halt() {
                return None;
            }
            if let Some(state) = queue.states.pop_front() {
                queue.active += 1;
                return Some(state);
            }
            if queue.active == 0 {
                return None;
            }
            self.ready.wait(&mut queue);
        }
    }

    fn done(&self) {
        self.queue.lock().active -= 1;
        self.ready.notify_all();
    }
}

impl SubtreeSink for Shared {
    fn offer(&self, state: ExecutionState) -> Option<ExecutionState> {
        let mut queue = self.queue.lock();
        if self.should_halt() || queue.states.len() >= self.capacity {
            return Some(state);
        }
        queue.states.push_back(state);
        drop(queue);
        self.ready.notify_one();
        None
    }

    fn should_halt(&self) -> bool {
        self.halt.load(Ordering::Acquire)
    }

    fn signal_halt(&self) {
        self.halt.store(true, Ordering::Release);
        self.ready.notify_all();
    }
}

/// Fixed set of exploration workers
#[derive(Debug, Clone)]
pub struct WorkerPool {
    config: CheckerConfig,
}

impl WorkerPool {
    /// Pool sized by `config.workers`
    pub const fn new(config: CheckerConfig) -> Self {
        Self { config }
    }

    /// Number of worker threads
    pub fn workers(&self) -> usize {
        self.config.workers.max(1)
    }

    /// Explore the whole program; `make` builds one interpreter per worker
    ///
    /// Results are merged across workers. The first error from any worker
    /// stops the others and is returned.
    pub fn run<F, I>(&self, make: F) -> Result<VerificationResult, CheckerError>
    where
        F: Fn() -> I + Sync,
        I: Interpreter,
    {
        let workers = self.workers();
        if workers == 1 {
            return Explorer::new(self.config.clone()).run(&mut make());
        }

        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                states: VecDeque::from([ExecutionState::new(
                    self.config.model,
                    self.config.coherence,
                )]),
                active: 0,
            }),
            ready: Condvar::new(),
            halt: AtomicBool::new(false),
            outcomes: DashMap::new(),
            capacity: workers * 2,
        });
        info!(workers, "parallel exploration started");

        let results: Vec<Result<VerificationResult, CheckerError>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|id| {
                    let shared = Arc::clone(&shared);
                    let make = &make;
                    let config = &self.config;
                    s.spawn(move || worker(id, config, &shared, make))
                })
                .collect();

            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(result) => result,
                    Err(e) => std::panic::resume_unwind(e),
                })
                .collect()
        });

        let mut merged = VerificationResult::default();
        for result in results {
            merged.merge(result?);
        }
        merged.outcomes = shared
            .outcomes
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        info!(
            complete = merged.stats.complete,
            findings = merged.findings.len(),
            "parallel exploration finished"
        );
        Ok(merged)
    }
}

fn worker<F, I>(
    id: usize,
    config: &CheckerConfig,
    shared: &Arc<Shared>,
    make: &F,
) -> Result<VerificationResult, CheckerError>
where
    F: Fn() -> I,
    I: Interpreter,
{
    let mut local = VerificationResult::default();
    let sink: Arc<dyn SubtreeSink> = Arc::clone(shared) as Arc<dyn SubtreeSink>;
    let mut subtrees = 0usize;
    while let Some(state) = shared.take() {
        subtrees += 1;
        let mut interp = make();
        let run = Explorer::from_state(config.clone(), state)
            .with_sink(Arc::clone(&sink))
            .run(&mut interp);
        shared.done();
        match run {
            Ok(mut result) => {
                for (outcome, n) in std::mem::take(&mut result.outcomes) {
                    *shared.outcomes.entry(outcome).or_default() += n;
                }
                local.merge(result);
            }
            Err(e) => {
                shared.signal_halt();
                return Err(e);
            }
        }
    }
    debug!(worker = id, subtrees, "worker finished");
    Ok(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{CoherenceKind, MemoryModel};

    fn shared(capacity: usize) -> Shared {
        Shared {
            queue: Mutex::new(Queue {
                states: VecDeque::new(),
                active: 0,
            }),
            ready: Condvar::new(),
            halt: AtomicBool::new(false),
            outcomes: DashMap::new(),
            capacity,
        }
    }

    fn state() -> ExecutionState {
        ExecutionState::new(MemoryModel::Rc11, CoherenceKind::DerivedOrder)
    }

    #[test]
    fn test_offer_respects_capacity() {
        let s = shared(1);
        assert!(s.offer(state()).is_none());
        assert!(s.offer(state()).is_some(), "queue is full");
        assert!(s.take().is_some());
        s.done();
        assert!(s.take().is_none(), "empty queue and no busy worker");
    }

    #[test]
    fn test_halt_refuses_offers() {
        let s = shared(4);
        s.signal_halt();
        assert!(s.should_halt());
        assert!(s.offer(state()).is_some());
        assert!(s.take().is_none());
    }

    #[test]
    fn test_workers_at_least_one() {
        let pool = WorkerPool::new(CheckerConfig {
            workers: 0,
            ..CheckerConfig::default()
        });
        assert_eq!(pool.workers(), 1);
    }
}
