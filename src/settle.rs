//! Settle-all: run a batch of fallible futures concurrently and keep every
//! outcome.

use std::future::Future;

use futures::future::join_all;

/// Polls every future to completion and returns their results in input
/// order. A failure never cancels or short-circuits the other members.
pub async fn settle_all<I, F, T, E>(tasks: I) -> Vec<Result<T, E>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    join_all(tasks).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn keeps_results_in_input_order() {
        let results = settle_all((0..3).map(|idx| async move {
            tokio::time::sleep(Duration::from_millis(30 - idx * 10)).await;
            if idx == 1 { Err(idx) } else { Ok(idx) }
        }))
        .await;
        assert_eq!(results, vec![Ok(0), Err(1), Ok(2)]);
    }

    #[tokio::test]
    async fn early_failure_does_not_stop_later_tasks() {
        let finished = Mutex::new(Vec::new());
        let results = settle_all([0_u8, 1].map(|idx| {
            let finished = &finished;
            async move {
                if idx == 0 {
                    return Err("boom");
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
                if let Ok(mut guard) = finished.lock() {
                    guard.push(idx);
                }
                Ok(idx)
            }
        }))
        .await;

        assert_eq!(results, vec![Err("boom"), Ok(1)]);
        assert_eq!(*finished.lock().expect("lock"), vec![1]);
    }

    #[tokio::test]
    async fn empty_batch_settles_immediately() {
        let results: Vec<Result<(), ()>> =
            settle_all(Vec::<std::future::Ready<Result<(), ()>>>::new()).await;
        assert!(results.is_empty());
    }
}
