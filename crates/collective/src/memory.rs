//! In-memory collective for multi-process tests.
//!
//! [`MemoryCollective::group`] creates one handle per rank. Handles are moved
//! onto separate OS threads, each standing in for one process. A round
//! completes when every rank has called `all_gather`; the last arrival builds
//! the rank-ordered result and wakes the others.

use crate::{Collective, CollectiveError, Gathered};
use gridkernel_types::Rank;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use tracing::{debug, warn};

struct Round {
    /// Incremented each time a round completes.
    generation: u64,
    contributions: Vec<Option<Vec<u8>>>,
    arrived: usize,
    /// Result of the most recently completed round.
    result: Option<Arc<Result<Gathered, CollectiveError>>>,
    aborted: Option<String>,
}

struct Shared {
    size: usize,
    round: Mutex<Round>,
    completed: Condvar,
}

/// One rank's handle onto an in-memory collective group.
#[derive(Clone)]
pub struct MemoryCollective {
    rank: Rank,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for MemoryCollective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCollective")
            .field("rank", &self.rank)
            .field("size", &self.shared.size)
            .finish()
    }
}

impl MemoryCollective {
    /// Create handles for ranks `0..size`.
    pub fn group(size: usize) -> Vec<MemoryCollective> {
        let shared = Arc::new(Shared {
            size,
            round: Mutex::new(Round {
                generation: 0,
                contributions: vec![None; size],
                arrived: 0,
                result: None,
                aborted: None,
            }),
            completed: Condvar::new(),
        });
        (0..size)
            .map(|r| MemoryCollective {
                rank: Rank(r),
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    pub fn is_aborted(&self) -> bool {
        self.shared.round.lock().aborted.is_some()
    }
}

impl Collective for MemoryCollective {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn num_processes(&self) -> usize {
        self.shared.size
    }

    fn all_gather(&self, local: &[u8]) -> Result<Gathered, CollectiveError> {
        let mut round = self.shared.round.lock();
        if let Some(reason) = &round.aborted {
            return Err(CollectiveError::Aborted(reason.clone()));
        }
        if round.contributions[self.rank.0].is_some() {
            return Err(CollectiveError::Aborted(format!(
                "rank {} entered the same round twice",
                self.rank
            )));
        }

        round.contributions[self.rank.0] = Some(local.to_vec());
        round.arrived += 1;

        if round.arrived == self.shared.size {
            let parts: Vec<Vec<u8>> = round
                .contributions
                .iter_mut()
                .map(|c| c.take().unwrap_or_default())
                .collect();
            let result = Arc::new(Gathered::from_contributions(&parts));
            round.arrived = 0;
            round.generation += 1;
            round.result = Some(Arc::clone(&result));
            debug!(
                generation = round.generation,
                bytes = parts.iter().map(Vec::len).sum::<usize>(),
                "All-gather round completed"
            );
            self.shared.completed.notify_all();
            return (*result).clone();
        }

        let generation = round.generation;
        while round.generation == generation && round.aborted.is_none() {
            self.shared.completed.wait(&mut round);
        }
        if round.generation == generation {
            if let Some(reason) = &round.aborted {
                return Err(CollectiveError::Aborted(reason.clone()));
            }
        }

        match &round.result {
            Some(result) => (**result).clone(),
            None => Err(CollectiveError::Aborted(
                "round completed without a result".to_string(),
            )),
        }
    }

    fn abort(&self, reason: &str) {
        let mut round = self.shared.round.lock();
        if round.aborted.is_none() {
            warn!(rank = %self.rank, reason, "Collective group aborted");
            round.aborted = Some(reason.to_string());
        }
        self.shared.completed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn run_group<R: Send>(
        size: usize,
        f: impl Fn(MemoryCollective) -> R + Send + Sync,
    ) -> Vec<R> {
        let handles = MemoryCollective::group(size);
        thread::scope(|s| {
            let f = &f;
            let joins: Vec<_> = handles
                .into_iter()
                .map(|h| s.spawn(move || f(h)))
                .collect();
            joins.into_iter().map(|j| j.join().unwrap()).collect()
        })
    }

    #[test]
    fn test_every_rank_sees_rank_ordered_buffer() {
        let results = run_group(3, |c| {
            let payload = vec![c.rank().0 as u8; c.rank().0 + 1];
            c.all_gather(&payload).unwrap()
        });

        for gathered in &results {
            assert_eq!(gathered.buffer(), &[0, 1, 1, 2, 2, 2]);
            assert_eq!(gathered.displacements(), &[0, 1, 3]);
        }
    }

    #[test]
    fn test_empty_contributions_do_not_stall() {
        let results = run_group(4, |c| {
            let payload = if c.rank().0 % 2 == 0 { vec![] } else { vec![9] };
            c.all_gather(&payload).unwrap()
        });

        for gathered in &results {
            assert_eq!(gathered.num_contributions(), 4);
            assert_eq!(gathered.contribution(Rank(0)), Some(&[][..]));
            assert_eq!(gathered.contribution(Rank(1)), Some(&[9u8][..]));
        }
    }

    #[test]
    fn test_consecutive_rounds() {
        let results = run_group(3, |c| {
            (0u8..20)
                .map(|i| {
                    let g = c.all_gather(&[i, c.rank().0 as u8]).unwrap();
                    g.buffer().to_vec()
                })
                .collect::<Vec<_>>()
        });

        for rounds in &results {
            for (i, buffer) in rounds.iter().enumerate() {
                let i = i as u8;
                assert_eq!(buffer, &vec![i, 0, i, 1, i, 2]);
            }
        }
    }

    #[test]
    fn test_any_true() {
        let results = run_group(3, |c| c.any_true(c.rank() == Rank(2)).unwrap());
        assert_eq!(results, vec![true, true, true]);

        let results = run_group(2, |c| c.any_true(false).unwrap());
        assert_eq!(results, vec![false, false]);
    }

    #[test]
    fn test_abort_releases_waiters() {
        let results = run_group(2, |c| {
            if c.rank() == Rank(1) {
                c.abort("protocol violation");
                Err(CollectiveError::Aborted("aborted locally".to_string()))
            } else {
                c.all_gather(b"x")
            }
        });

        assert!(matches!(results[0], Err(CollectiveError::Aborted(_))));
        assert!(results.iter().all(Result::is_err));
    }
}
