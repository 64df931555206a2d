//! Read-modify-write of status subresources.
//!
//! Status changes are expressed as a mutation of the latest stored status.
//! When a write loses a version race the object is fetched again and the
//! mutation reapplied, so concurrent writers never overwrite each other's
//! fields with stale copies.

use arc_core::HasStatus;

use crate::error::Result;
use crate::metrics::ControllerMetrics;
use crate::store::{Store, StoreExt};

/// Applies `mutate` to the status of `current` and persists the result.
///
/// Skips the write when the mutation changes nothing. Retries on version
/// conflicts up to `attempts` writes in total, re-fetching the object each
/// time.
///
/// # Errors
///
/// Returns the last conflict once `attempts` is exhausted, or any other
/// store error immediately.
pub async fn patch_status<S, R, F>(
    store: &S,
    mut current: R,
    attempts: u32,
    metrics: &ControllerMetrics,
    mutate: F,
) -> Result<R>
where
    S: Store + ?Sized,
    R: HasStatus,
    F: Fn(&mut R::Status) + Send + Sync,
{
    let mut attempt = 1;
    loop {
        let mut next = current.clone();
        mutate(next.status_mut());
        if next.status() == current.status() {
            return Ok(current);
        }

        match store.update_status(&next).await {
            Ok(updated) => return Ok(updated),
            Err(err) if err.is_conflict() && attempt < attempts => {
                attempt += 1;
                metrics.record_status_conflict(R::KIND);
                tracing::debug!(
                    kind = R::KIND,
                    key = %current.key(),
                    attempt,
                    "status write conflicted, retrying on latest version"
                );
                current = store.get::<R>(&current.key()).await?;
            }
            Err(err) => return Err(err.into()),
        }
    }
}
