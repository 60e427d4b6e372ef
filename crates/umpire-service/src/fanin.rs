//! ---
//! umpire_section: "03-service-orchestration"
//! umpire_subsection: "module"
//! umpire_type: "source"
//! umpire_scope: "code"
//! umpire_description: "Service contract, registry, and process supervision."
//! umpire_version: "v0.0.0-prealpha"
//! umpire_owner: "tbd"
//! ---
use std::future::Future;

use futures::future::join_all;

use crate::error::{Result, ServiceError};

/// Await every operation, then fail if any of them failed.
///
/// No operation is abandoned when an earlier one fails. A single failure is
/// returned as is; several are wrapped in [`ServiceError::Aggregate`] in
/// submission order.
pub async fn concentrate<I, F, T>(operations: I) -> Result<Vec<T>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T>>,
{
    let mut values = Vec::new();
    let mut failures = Vec::new();
    for outcome in join_all(operations).await {
        match outcome {
            Ok(value) => values.push(value),
            Err(err) => failures.push(err),
        }
    }
    merge_failures(failures).map(|()| values)
}

pub(crate) fn merge_failures(mut failures: Vec<ServiceError>) -> Result<()> {
    match failures.len() {
        0 => Ok(()),
        1 => Err(failures.remove(0)),
        _ => Err(ServiceError::Aggregate { failures }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn failed(service: &str) -> ServiceError {
        ServiceError::Failed {
            service: service.to_owned(),
            reason: "boom".to_owned(),
        }
    }

    #[tokio::test]
    async fn all_successes_are_collected_in_order() {
        let values = concentrate((0..3).map(|i| async move { Ok::<_, ServiceError>(i) }))
            .await
            .expect("all succeed");
        assert_eq!(values, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn waits_for_slow_operations_after_a_failure() {
        let finished = Arc::new(AtomicUsize::new(0));
        let ops = (0..3).map(|i| {
            let finished = finished.clone();
            async move {
                if i == 0 {
                    return Err(failed("first"));
                }
                tokio::time::sleep(Duration::from_millis(20 * i as u64)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let err = concentrate(ops).await.unwrap_err();
        assert_eq!(finished.load(Ordering::SeqCst), 2);
        assert!(matches!(err, ServiceError::Failed { service, .. } if service == "first"));
    }

    #[tokio::test]
    async fn several_failures_keep_the_first() {
        let ops = ["a", "b"].map(|name| async move { Err::<(), _>(failed(name)) });
        let err = concentrate(ops).await.unwrap_err();
        assert!(matches!(err.first(), ServiceError::Failed { service, .. } if service == "a"));
        assert!(err.to_string().starts_with("2 operations failed"));
    }
}
