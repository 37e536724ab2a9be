//! Bounded fan-out over a static list of parameters.
//!
//! Two flavours:
//! - [`run_parallel`] for blocking/CPU work on a dedicated rayon pool of
//!   `max_workers` threads; successes keep input order.
//! - [`run_concurrent`] for async I/O via `buffer_unordered(max_workers)`;
//!   successes arrive in completion order.
//!
//! With [`FailurePolicy::Skip`] failed tasks are logged and collected next to
//! the successes. With [`FailurePolicy::Abort`] the first failure ends the
//! batch and is returned as [`BatchError::TaskFailed`].

use std::fmt::Display;
use std::future::Future;

use futures::stream::{self, StreamExt};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{BatchError, BatchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Keep going and report failures alongside successes.
    #[default]
    Skip,
    /// Stop at the first failure.
    Abort,
}

/// A failed task and the position of its parameters in the input.
#[derive(Debug)]
pub struct BatchFailure<E> {
    pub index: usize,
    pub error: E,
}

#[derive(Debug)]
pub struct BatchOutcome<T, E> {
    pub successes: Vec<T>,
    pub failures: Vec<BatchFailure<E>>,
}

impl<T, E> Default for BatchOutcome<T, E> {
    fn default() -> Self {
        Self {
            successes: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T, E> BatchOutcome<T, E> {
    /// Total number of tasks that ran to completion or failure.
    pub fn len(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

impl<T, E> BatchOutcome<Vec<T>, E> {
    /// Concatenate per-task result lists.
    pub fn concat(self) -> Vec<T> {
        self.successes.into_iter().flatten().collect()
    }
}

fn check_workers(max_workers: usize) -> BatchResult<()> {
    if max_workers == 0 {
        Err(BatchError::NoWorkers)
    } else {
        Ok(())
    }
}

/// Run `f` over `params` on a rayon pool limited to `max_workers` threads.
pub fn run_parallel<P, T, E, F>(
    params: Vec<P>,
    max_workers: usize,
    f: F,
    policy: FailurePolicy,
) -> BatchResult<BatchOutcome<T, E>>
where
    P: Send,
    T: Send,
    E: Send + Display,
    F: Fn(P) -> Result<T, E> + Sync + Send,
{
    check_workers(max_workers)?;
    if params.is_empty() {
        return Ok(BatchOutcome::default());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(max_workers)
        .thread_name(|i| format!("batch-worker-{}", i))
        .build()
        .map_err(|e| BatchError::Pool(e.to_string()))?;

    let total = params.len();
    debug!(tasks = total, max_workers, ?policy, "Starting parallel batch");

    match policy {
        FailurePolicy::Abort => {
            let successes = pool.install(|| {
                params
                    .into_par_iter()
                    .enumerate()
                    .map(|(index, p)| {
                        f(p).map_err(|e| BatchError::TaskFailed {
                            index,
                            message: e.to_string(),
                        })
                    })
                    .collect::<Result<Vec<T>, BatchError>>()
            })?;
            Ok(BatchOutcome {
                successes,
                failures: Vec::new(),
            })
        }
        FailurePolicy::Skip => {
            let results: Vec<(usize, Result<T, E>)> = pool.install(|| {
                params
                    .into_par_iter()
                    .enumerate()
                    .map(|(index, p)| (index, f(p)))
                    .collect()
            });

            let mut outcome = BatchOutcome::default();
            for (index, result) in results {
                match result {
                    Ok(v) => outcome.successes.push(v),
                    Err(error) => {
                        warn!(index, error = %error, "Batch task failed, skipping");
                        outcome.failures.push(BatchFailure { index, error });
                    }
                }
            }
            debug!(
                success = outcome.successes.len(),
                failed = outcome.failures.len(),
                "Parallel batch complete"
            );
            Ok(outcome)
        }
    }
}

/// Drive `f(param)` futures with at most `max_workers` in flight.
pub async fn run_concurrent<P, T, E, F, Fut>(
    params: Vec<P>,
    max_workers: usize,
    f: F,
    policy: FailurePolicy,
) -> BatchResult<BatchOutcome<T, E>>
where
    F: Fn(P) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    check_workers(max_workers)?;
    let total = params.len();
    debug!(tasks = total, max_workers, ?policy, "Starting concurrent batch");

    let mut results = stream::iter(params.into_iter().enumerate())
        .map(|(index, p)| {
            let fut = f(p);
            async move { (index, fut.await) }
        })
        .buffer_unordered(max_workers);

    let mut outcome = BatchOutcome::default();
    while let Some((index, result)) = results.next().await {
        match result {
            Ok(v) => outcome.successes.push(v),
            Err(error) => match policy {
                FailurePolicy::Skip => {
                    warn!(index, error = %error, "Batch task failed, skipping");
                    outcome.failures.push(BatchFailure { index, error });
                }
                FailurePolicy::Abort => {
                    // Dropping the stream cancels the tasks still in flight.
                    return Err(BatchError::TaskFailed {
                        index,
                        message: error.to_string(),
                    });
                }
            },
        }
    }

    debug!(
        success = outcome.successes.len(),
        failed = outcome.failures.len(),
        "Concurrent batch complete"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn even_only(n: u32) -> Result<u32, String> {
        if n % 2 == 0 {
            Ok(n * 10)
        } else {
            Err(format!("{} is odd", n))
        }
    }

    #[test]
    fn test_parallel_skip_counts() {
        let outcome = run_parallel((0..10).collect(), 3, even_only, FailurePolicy::Skip).unwrap();
        assert_eq!(outcome.successes, vec![0, 20, 40, 60, 80]);
        assert_eq!(outcome.failures.len(), 5);
        assert_eq!(outcome.len(), 10);
        assert!(outcome.failures.iter().all(|f| f.index % 2 == 1));
    }

    #[test]
    fn test_parallel_abort() {
        let err = run_parallel(vec![2, 4, 5, 6], 2, even_only, FailurePolicy::Abort).unwrap_err();
        assert!(matches!(err, BatchError::TaskFailed { index: 2, .. }));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = run_parallel(vec![1], 0, even_only, FailurePolicy::Skip).unwrap_err();
        assert!(matches!(err, BatchError::NoWorkers));
    }

    #[test]
    fn test_empty_input() {
        let outcome = run_parallel(Vec::<u32>::new(), 4, even_only, FailurePolicy::Abort).unwrap();
        assert!(outcome.is_empty());
    }

    #[test]
    fn test_concat() {
        let outcome = run_parallel(
            vec![1usize, 2, 3],
            2,
            |n| Ok::<_, String>(vec![n; n]),
            FailurePolicy::Skip,
        )
        .unwrap();
        assert_eq!(outcome.concat(), vec![1, 2, 2, 3, 3, 3]);
    }

    #[tokio::test]
    async fn test_concurrent_skip_counts() {
        let outcome = run_concurrent(
            (0..20).collect(),
            4,
            |n| async move { even_only(n) },
            FailurePolicy::Skip,
        )
        .await
        .unwrap();
        assert_eq!(outcome.successes.len(), 10);
        assert_eq!(outcome.failures.len(), 10);
        let mut got = outcome.successes.clone();
        got.sort_unstable();
        assert_eq!(got, (0..20).step_by(2).map(|n| n * 10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_concurrent_abort() {
        let err = run_concurrent(
            vec![0, 1, 2],
            1,
            |n| async move { even_only(n) },
            FailurePolicy::Abort,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BatchError::TaskFailed { index: 1, .. }));
    }
}
