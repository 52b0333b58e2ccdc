#![forbid(unsafe_code)]

// Dispatches the client population under the configured launch policy.
// Whatever the strategy, batch N fully resolves before batch N+1 begins and
// one client's failure never stops its siblings.

use crate::config::LaunchPolicy;
use crate::population::ClientConfig;
use crate::report::JoinAttemptResult;
use futures_util::future::join_all;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

/// Runs `launch` for every client in `population` according to `policy` and
/// returns one result per client, in population order. `launch` must be
/// infallible in the Rust sense: per-client failures come back inside the
/// `JoinAttemptResult`, never as panics or errors.
pub async fn dispatch<F, Fut>(
    policy: &LaunchPolicy,
    population: Vec<ClientConfig>,
    launch: F,
) -> Vec<JoinAttemptResult>
where
    F: Fn(ClientConfig) -> Fut,
    Fut: Future<Output = JoinAttemptResult>,
{
    match *policy {
        LaunchPolicy::Sequential { client_delay } => {
            sequential(population, launch, client_delay).await
        }
        LaunchPolicy::Batched {
            batch_size,
            client_delay,
            batch_delay,
        } => batched(population, launch, batch_size, client_delay, batch_delay).await,
        LaunchPolicy::Parallel { batch_size } => parallel(population, launch, batch_size).await,
    }
}

async fn sequential<F, Fut>(
    population: Vec<ClientConfig>,
    launch: F,
    client_delay: Duration,
) -> Vec<JoinAttemptResult>
where
    F: Fn(ClientConfig) -> Fut,
    Fut: Future<Output = JoinAttemptResult>,
{
    let total = population.len();
    let mut results = Vec::with_capacity(total);
    for (i, client) in population.into_iter().enumerate() {
        results.push(launch(client).await);
        if i + 1 < total {
            sleep(client_delay).await;
        }
    }
    results
}

async fn batched<F, Fut>(
    population: Vec<ClientConfig>,
    launch: F,
    batch_size: usize,
    client_delay: Duration,
    batch_delay: Duration,
) -> Vec<JoinAttemptResult>
where
    F: Fn(ClientConfig) -> Fut,
    Fut: Future<Output = JoinAttemptResult>,
{
    let batch_size = batch_size.max(1);
    let total = population.len();
    let batch_count = total.div_ceil(batch_size);
    let mut results = Vec::with_capacity(total);

    for (batch_idx, batch) in population.chunks(batch_size).enumerate() {
        let members = batch.len();
        for (i, client) in batch.iter().cloned().enumerate() {
            results.push(launch(client).await);
            if i + 1 < members {
                sleep(client_delay).await;
            }
        }
        info!(
            batch = batch_idx + 1,
            of = batch_count,
            members,
            "batch launched"
        );
        if batch_idx + 1 < batch_count {
            sleep(batch_delay).await;
        }
    }
    results
}

async fn parallel<F, Fut>(
    population: Vec<ClientConfig>,
    launch: F,
    batch_size: usize,
) -> Vec<JoinAttemptResult>
where
    F: Fn(ClientConfig) -> Fut,
    Fut: Future<Output = JoinAttemptResult>,
{
    let batch_size = batch_size.max(1);
    let total = population.len();
    let batch_count = total.div_ceil(batch_size);
    let mut results = Vec::with_capacity(total);

    for (batch_idx, batch) in population.chunks(batch_size).enumerate() {
        let members = batch.len();
        // Natural completion time paces the run; no inter-batch delay.
        let outcomes = join_all(batch.iter().cloned().map(&launch)).await;
        results.extend(outcomes);
        info!(
            batch = batch_idx + 1,
            of = batch_count,
            members,
            "batch resolved"
        );
    }
    results
}
