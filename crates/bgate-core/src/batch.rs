//! Bounded-concurrency fan-out for independent gateway calls.
//!
//! Up to `concurrency` logical workers pull the next unclaimed item from a
//! shared queue; each awaits one call fully before pulling the next. Workers
//! are interleaved on the caller's task, not spawned, so nothing here needs
//! `'static` data. `output[i]` always belongs to `input[i]`.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

fn next_item<T>(work: &Mutex<VecDeque<(usize, T)>>) -> Option<(usize, T)> {
    work.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .pop_front()
}

/// Propagate mode: the first failure rejects the whole run.
///
/// After a failure no new items are claimed, but items already in flight run to
/// completion (their results are discarded). When several items fail, the error
/// of the lowest input index is returned.
pub async fn run_bounded<T, R, E, F, Fut>(
    items: Vec<T>,
    concurrency: usize,
    worker: F,
) -> Result<Vec<R>, E>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let count = items.len();
    if count == 0 {
        return Ok(Vec::new());
    }
    let num_workers = concurrency.max(1).min(count);
    let work: Mutex<VecDeque<(usize, T)>> = Mutex::new(items.into_iter().enumerate().collect());
    let failed = AtomicBool::new(false);

    let (work, failed, worker) = (&work, &failed, &worker);
    let slots = (0..num_workers).map(|_| async move {
        let mut done: Vec<(usize, R)> = Vec::new();
        while !failed.load(Ordering::Acquire) {
            let Some((index, item)) = next_item(work) else {
                break;
            };
            match worker(item).await {
                Ok(r) => done.push((index, r)),
                Err(e) => {
                    failed.store(true, Ordering::Release);
                    return Err((index, e));
                }
            }
        }
        Ok(done)
    });
    let finished = futures::future::join_all(slots).await;

    let mut results: Vec<Option<R>> = (0..count).map(|_| None).collect();
    let mut first_error: Option<(usize, E)> = None;
    for slot in finished {
        match slot {
            Ok(done) => {
                for (index, r) in done {
                    results[index] = Some(r);
                }
            }
            Err((index, e)) => {
                if first_error.as_ref().map_or(true, |(i, _)| index < *i) {
                    first_error = Some((index, e));
                }
            }
        }
    }
    if let Some((index, e)) = first_error {
        tracing::debug!(index, "batch stopped on failed item");
        return Err(e);
    }
    Ok(results.into_iter().flatten().collect())
}

/// Collect mode: every item runs; each slot of the output holds that item's
/// own `Ok` or `Err`, so a batch can finish with partial success.
pub async fn run_collect<T, R, E, F, Fut>(
    items: Vec<T>,
    concurrency: usize,
    worker: F,
) -> Vec<Result<R, E>>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let worker = &worker;
    let outcome = run_bounded(items, concurrency, move |item| async move {
        Ok::<_, Infallible>(worker(item).await)
    })
    .await;
    match outcome {
        Ok(results) => results,
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct InFlight {
        now: AtomicUsize,
        peak: AtomicUsize,
    }

    impl InFlight {
        fn new() -> Self {
            Self {
                now: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        fn enter(&self) {
            let n = self.now.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(n, Ordering::SeqCst);
        }

        fn leave(&self) {
            self.now.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn results_follow_input_order_and_ceiling_holds() {
        let gauge = InFlight::new();
        let items: Vec<u64> = (0..12).collect();
        let out = run_bounded(items, 3, |n| {
            let gauge = &gauge;
            async move {
                gauge.enter();
                // Later items finish first.
                tokio::time::sleep(Duration::from_millis(40 - n * 3)).await;
                gauge.leave();
                Ok::<_, ()>(n * n)
            }
        })
        .await
        .unwrap();
        assert_eq!(out, (0..12).map(|n| n * n).collect::<Vec<_>>());
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn ceiling_never_exceeds_item_count() {
        let gauge = InFlight::new();
        let out = run_bounded(vec!["a", "b"], 16, |s| {
            let gauge = &gauge;
            async move {
                gauge.enter();
                tokio::time::sleep(Duration::from_millis(10)).await;
                gauge.leave();
                Ok::<_, ()>(s.to_uppercase())
            }
        })
        .await
        .unwrap();
        assert_eq!(out, vec!["A", "B"]);
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_concurrency_still_makes_progress() {
        let out = run_bounded(vec![1, 2, 3], 0, |n| async move { Ok::<_, ()>(n + 1) })
            .await
            .unwrap();
        assert_eq!(out, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn empty_input() {
        let out: Vec<i32> = run_bounded(Vec::<i32>::new(), 4, |n| async move { Ok::<_, ()>(n) })
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn propagate_rejects_and_stops_claiming() {
        let started = AtomicUsize::new(0);
        let err = run_bounded((0..20).collect::<Vec<u32>>(), 2, |n| {
            let started = &started;
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                if n == 3 {
                    Err(format!("item {n} failed"))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap_err();
        assert_eq!(err, "item 3 failed");
        assert!(started.load(Ordering::SeqCst) < 20);
    }

    #[tokio::test]
    async fn in_flight_items_finish_after_failure() {
        let finished = AtomicUsize::new(0);
        let res = run_bounded(vec![0u64, 1], 2, |n| {
            let finished = &finished;
            async move {
                if n == 0 {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    return Err("boom");
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(n)
            }
        })
        .await;
        assert_eq!(res, Err("boom"));
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn collect_keeps_partial_success_in_order() {
        let out = run_collect(vec![1, 2, 3, 4, 5], 2, |n| async move {
            tokio::time::sleep(Duration::from_millis((6 - n) * 3)).await;
            if n % 2 == 0 {
                Err(format!("even {n}"))
            } else {
                Ok(n * 10)
            }
        })
        .await;
        assert_eq!(
            out,
            vec![
                Ok(10),
                Err("even 2".to_string()),
                Ok(30),
                Err("even 4".to_string()),
                Ok(50)
            ]
        );
    }
}
