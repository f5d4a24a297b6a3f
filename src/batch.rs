//! Sequential, failure-isolating batch execution.
//!
//! Every multi-item step of the pipeline (scraping pages, publishing records,
//! enhancing articles) runs through [`run_batch`]. Items are processed one at
//! a time: the browser session is shared and target sites get one request at
//! a time. A failing item, whether it returns an error or panics, becomes a
//! [`BatchFailure`] and the loop moves on.

use crate::models::{BatchFailure, BatchOutcome};
use futures::FutureExt;
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{debug, error, info};

/// Run `op` over every item in order and collect the results.
///
/// `key` names an item for the failure list (usually its URL or id). The
/// returned counts always add up to `items.len()`, and both lists keep
/// input order.
pub async fn run_batch<I, T, E, K, F, Fut>(
    label: &str,
    items: Vec<I>,
    key: K,
    mut op: F,
) -> BatchOutcome<T>
where
    K: Fn(&I) -> String,
    F: FnMut(I) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let t0 = Instant::now();
    let mut outcome = BatchOutcome::default();

    for (index, item) in items.into_iter().enumerate() {
        let id = key(&item);
        debug!(batch = label, index, %id, "Processing item");

        match AssertUnwindSafe(op(item)).catch_unwind().await {
            Ok(Ok(value)) => outcome.succeeded.push(value),
            Ok(Err(e)) => {
                error!(batch = label, index, %id, error = %e, "Item failed; continuing");
                outcome.failed.push(BatchFailure {
                    id,
                    error: e.to_string(),
                });
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(batch = label, index, %id, panic = %message, "Item panicked; continuing");
                outcome.failed.push(BatchFailure {
                    id,
                    error: format!("panicked: {message}"),
                });
            }
        }
    }

    info!(
        batch = label,
        total = outcome.total(),
        succeeded = outcome.succeeded.len(),
        failed = outcome.failed.len(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Batch complete"
    );
    outcome
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn urls(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("https://example.com/{i}")).collect()
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_batch() {
        let outcome = run_batch("test", urls(5), |u| u.clone(), |url| async move {
            if url.ends_with("/2") || url.ends_with("/4") {
                Err(format!("could not load {url}"))
            } else {
                Ok(url.len())
            }
        })
        .await;

        assert_eq!(outcome.succeeded.len(), 3);
        assert_eq!(outcome.failed.len(), 2);
        assert_eq!(outcome.failed[0].id, "https://example.com/2");
        assert_eq!(outcome.failed[1].id, "https://example.com/4");
        assert!(outcome.failed.iter().all(|f| !f.error.is_empty()));
    }

    #[tokio::test]
    async fn test_counts_reconcile_and_ids_are_disjoint() {
        for n in 0..8 {
            let input = urls(n);
            let outcome = run_batch("test", input.clone(), |u| u.clone(), |url| async move {
                let last: usize = url.rsplit('/').next().unwrap().parse().unwrap();
                if last % 3 == 0 { Err("divisible by three") } else { Ok(url) }
            })
            .await;

            assert_eq!(outcome.total(), n);
            let ok: HashSet<_> = outcome.succeeded.iter().cloned().collect();
            let bad: HashSet<_> = outcome.failed.iter().map(|f| f.id.clone()).collect();
            assert!(ok.is_disjoint(&bad));
            assert_eq!(ok.len() + bad.len(), n);
        }
    }

    #[tokio::test]
    async fn test_order_is_preserved_within_lists() {
        let outcome = run_batch("test", vec![5, 1, 4, 2, 3], |i| i.to_string(), |i| async move {
            if i % 2 == 0 { Err("even") } else { Ok(i) }
        })
        .await;
        assert_eq!(outcome.succeeded, vec![5, 1, 3]);
        let failed: Vec<_> = outcome.failed.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(failed, vec!["4", "2"]);
    }

    #[tokio::test]
    async fn test_panicking_item_becomes_failure() {
        let outcome = run_batch("test", vec![1, 2, 3], |i| i.to_string(), |i| async move {
            if i == 2 {
                panic!("selector exploded");
            }
            Ok::<_, String>(i)
        })
        .await;
        assert_eq!(outcome.succeeded, vec![1, 3]);
        assert_eq!(outcome.failed.len(), 1);
        assert!(outcome.failed[0].error.contains("selector exploded"));
    }

    #[tokio::test]
    async fn test_items_run_sequentially() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let outcome = run_batch("test", urls(4), |u| u.clone(), |_url| {
            let in_flight = in_flight.clone();
            let max_seen = max_seen.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, String>(())
            }
        })
        .await;
        assert_eq!(outcome.succeeded.len(), 4);
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
