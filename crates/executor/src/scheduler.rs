use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::context::Context;
use crate::error::Error;

/// What happened to one unit of work.
#[derive(Debug)]
pub enum Outcome<T> {
    Done(T),
    /// The unit panicked; the error is already reported at its path.
    Panicked,
    /// The unit never started because the operation was cancelled.
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Outcome::Done(value) => Some(value),
            Outcome::Panicked | Outcome::Cancelled => None,
        }
    }
}

/// Runs independent units of work, each with its own context.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scheduler {
    limit: Option<usize>,
}

impl Scheduler {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            limit: limit.filter(|limit| *limit > 0),
        }
    }

    pub fn unbounded() -> Self {
        Self { limit: None }
    }

    /// Run every unit exactly once and wait for all of them.
    ///
    /// A single unit runs on the calling task. Otherwise every unit but the
    /// last is spawned and the last runs inline. With a limit lower than the
    /// number of units, a permit is acquired before each unit starts; a unit
    /// still waiting when the operation is cancelled is reported as
    /// cancelled and never started.
    pub async fn run<T, F, Fut>(&self, units: Vec<(Context, F)>) -> Vec<Outcome<T>>
    where
        T: Send + 'static,
        F: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let count = units.len();
        if count <= 1 {
            let mut outcomes = Vec::with_capacity(count);
            for (ctx, f) in units {
                let outcome = if ctx.is_cancelled() {
                    cancelled(&ctx)
                } else {
                    run_unit(ctx, f).await
                };
                outcomes.push(outcome);
            }
            return outcomes;
        }

        let semaphore = self
            .limit
            .filter(|limit| *limit < count)
            .map(|limit| Arc::new(Semaphore::new(limit)));
        let mut outcomes: Vec<Option<Outcome<T>>> = (0..count).map(|_| None).collect();
        let mut handles = Vec::with_capacity(count - 1);

        for (idx, (ctx, f)) in units.into_iter().enumerate() {
            let permit = match &semaphore {
                Some(semaphore) => match acquire(semaphore, &ctx).await {
                    Some(permit) => Some(permit),
                    None => {
                        outcomes[idx] = Some(cancelled(&ctx));
                        continue;
                    }
                },
                None if ctx.is_cancelled() => {
                    outcomes[idx] = Some(cancelled(&ctx));
                    continue;
                }
                None => None,
            };

            if idx == count - 1 {
                outcomes[idx] = Some(run_unit(ctx, f).await);
                drop(permit);
            } else {
                let handle = tokio::spawn(async move {
                    let outcome = run_unit(ctx, f).await;
                    drop(permit);
                    outcome
                });
                handles.push((idx, handle));
            }
        }

        for (idx, handle) in handles {
            outcomes[idx] = Some(match handle.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(error = %err, "worker task failed");
                    Outcome::Panicked
                }
            });
        }

        outcomes
            .into_iter()
            .map(|outcome| outcome.unwrap_or(Outcome::Cancelled))
            .collect()
    }

    /// Run units one after another in order, as root mutation fields require.
    pub async fn run_serial<T, F, Fut>(&self, units: Vec<(Context, F)>) -> Vec<Outcome<T>>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = T>,
    {
        let mut outcomes = Vec::with_capacity(units.len());
        for (ctx, f) in units {
            let outcome = if ctx.is_cancelled() {
                cancelled(&ctx)
            } else {
                run_unit(ctx, f).await
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}

async fn acquire(semaphore: &Arc<Semaphore>, ctx: &Context) -> Option<OwnedSemaphorePermit> {
    tokio::select! {
        biased;
        _ = ctx.cancellation_token().cancelled() => None,
        permit = semaphore.clone().acquire_owned() => permit.ok(),
    }
}

fn cancelled<T>(ctx: &Context) -> Outcome<T> {
    ctx.add_error(Error::cancelled());
    Outcome::Cancelled
}

async fn run_unit<T, F, Fut>(ctx: Context, f: F) -> Outcome<T>
where
    F: FnOnce(Context) -> Fut,
    Fut: Future<Output = T>,
{
    let unit_ctx = ctx.clone();
    match AssertUnwindSafe(async move { f(ctx).await })
        .catch_unwind()
        .await
    {
        Ok(value) => Outcome::Done(value),
        Err(payload) => {
            let err = unit_ctx.recover(payload);
            unit_ctx.add_error(err);
            Outcome::Panicked
        }
    }
}
