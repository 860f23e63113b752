use std::sync::{Arc, Mutex};

use async_recursion::async_recursion;
use drover_execution::error::{ExecutionError, ExecutionResult};
use drover_execution::WorkerPool;
use futures::future::join_all;
use log::debug;

/// Returns the largest `r` such that `r * r <= n`.
fn integer_sqrt(n: u64) -> u64 {
    let mut root = (n as f64).sqrt() as u64;
    while root.checked_mul(root).is_none_or(|x| x > n) {
        root -= 1;
    }
    while (root + 1).checked_mul(root + 1).is_some_and(|x| x <= n) {
        root += 1;
    }
    root
}

/// Returns the primes below `n` in ascending order.
///
/// The seed primes up to `sqrt(n)` are computed recursively. Then the
/// multiples of every seed prime are requested from the pool concurrently,
/// one task per seed prime, and struck from a local sieve of size `n`.
#[async_recursion]
pub async fn primes_below(n: u64, pool: &Arc<WorkerPool>) -> ExecutionResult<Vec<u64>> {
    if n <= 2 {
        return Ok(vec![]);
    }
    let size = usize::try_from(n)
        .map_err(|_| ExecutionError::InternalError(format!("sieve too large: {n}")))?;
    let seeds = primes_below(integer_sqrt(n) + 1, pool).await?;
    debug!("sieving below {n} with {} seed primes", seeds.len());

    let composites = Arc::new(Mutex::new(Vec::with_capacity(seeds.len())));
    let tasks = seeds
        .into_iter()
        .map(|prime| {
            let pool = Arc::clone(pool);
            let composites = Arc::clone(&composites);
            tokio::spawn(async move {
                let values = pool
                    .acquire(|client| async move { client.multiples(prime, n).await })
                    .await?;
                composites.lock()?.push(values);
                Ok::<_, ExecutionError>(())
            })
        })
        .collect::<Vec<_>>();
    for result in join_all(tasks).await {
        result??;
    }

    let composites: Vec<Vec<u64>> = std::mem::take(&mut *composites.lock()?);
    let mut sieve = vec![true; size];
    for value in composites.into_iter().flatten() {
        if let Some(flag) = usize::try_from(value).ok().and_then(|x| sieve.get_mut(x)) {
            *flag = false;
        }
    }
    Ok(sieve
        .into_iter()
        .enumerate()
        .skip(2)
        .filter(|(_, is_prime)| *is_prime)
        .map(|(i, _)| i as u64)
        .collect())
}
