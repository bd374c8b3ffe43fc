//! Ordered "first success wins" fallback chains
//!
//! Credential and token discovery is expressed as a list of named strategies.
//! The list is tried once, in order; the first strategy that yields a value
//! wins and the names of everything attempted are kept for error reporting.

use futures::future::BoxFuture;
use tracing::debug;

/// A named synchronous strategy
pub struct Strategy<'a, T> {
    source: String,
    run: Box<dyn FnOnce() -> Option<T> + Send + 'a>,
}

impl<'a, T> Strategy<'a, T> {
    pub fn new(source: impl Into<String>, run: impl FnOnce() -> Option<T> + Send + 'a) -> Self {
        Self {
            source: source.into(),
            run: Box::new(run),
        }
    }

    /// Strategy that simply offers an already-known value
    pub fn value(source: impl Into<String>, value: Option<T>) -> Self
    where
        T: Send + 'a,
    {
        Self::new(source, move || value)
    }
}

/// A named asynchronous strategy
pub struct AsyncStrategy<'a, T> {
    source: String,
    run: BoxFuture<'a, Option<T>>,
}

impl<'a, T> AsyncStrategy<'a, T> {
    pub fn new(source: impl Into<String>, run: BoxFuture<'a, Option<T>>) -> Self {
        Self {
            source: source.into(),
            run,
        }
    }
}

/// Value produced by a fallback chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found<T> {
    pub value: T,
    pub source: String,
}

/// Names of every strategy that was tried without success
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Exhausted {
    pub attempted: Vec<String>,
}

/// Try each strategy in order, stopping at the first that yields a value
pub fn first_success<T>(strategies: Vec<Strategy<'_, T>>) -> Result<Found<T>, Exhausted> {
    let mut attempted = Vec::with_capacity(strategies.len());
    for strategy in strategies {
        match (strategy.run)() {
            Some(value) => {
                debug!(source = %strategy.source, "fallback resolved");
                return Ok(Found {
                    value,
                    source: strategy.source,
                });
            }
            None => {
                debug!(source = %strategy.source, "fallback source yielded nothing");
                attempted.push(strategy.source);
            }
        }
    }
    Err(Exhausted { attempted })
}

/// Async flavour of [`first_success`]; later futures are never polled once one succeeds
pub async fn first_success_async<T>(
    strategies: Vec<AsyncStrategy<'_, T>>,
) -> Result<Found<T>, Exhausted> {
    let mut attempted = Vec::with_capacity(strategies.len());
    for strategy in strategies {
        match strategy.run.await {
            Some(value) => {
                debug!(source = %strategy.source, "fallback resolved");
                return Ok(Found {
                    value,
                    source: strategy.source,
                });
            }
            None => {
                debug!(source = %strategy.source, "fallback source yielded nothing");
                attempted.push(strategy.source);
            }
        }
    }
    Err(Exhausted { attempted })
}
