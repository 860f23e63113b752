use std::future::Future;
use std::time::Duration;

use drover_common::config;
use log::{debug, warn};

#[derive(Debug, Clone)]
pub enum RetryStrategy {
    Fixed {
        max_count: usize,
        delay: Duration,
    },
    ExponentialBackoff {
        max_count: usize,
        initial_delay: Duration,
        max_delay: Duration,
        factor: u32,
    },
}

/// The result of a retried operation.
///
/// `attempts` counts every invocation of the operation, so an operation
/// that never succeeds under a strategy with `max_count` retries reports
/// `max_count + 1` attempts.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Succeeded { value: T, attempts: usize },
    Exhausted { error: E, attempts: usize },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn attempts(&self) -> usize {
        match self {
            Self::Succeeded { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Succeeded { value, .. } => Ok(value),
            Self::Exhausted { error, .. } => Err(error),
        }
    }
}

struct ExponentialBackoffDelay {
    delay: Duration,
    max_delay: Duration,
    factor: u32,
}

impl Iterator for ExponentialBackoffDelay {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        let delay = self.delay;
        self.delay = std::cmp::min(delay * self.factor, self.max_delay);
        Some(delay)
    }
}

impl RetryStrategy {
    pub async fn run<F, Fut, T, E>(&self, mut f: F) -> RetryOutcome<T, E>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let mut delay = self.delay();
        let mut attempts = 0;
        loop {
            attempts += 1;
            match f().await {
                Ok(value) => return RetryOutcome::Succeeded { value, attempts },
                Err(error) => {
                    if let Some(delay) = delay.next() {
                        warn!("retryable operation failed (attempt {attempts}): {error}");
                        tokio::time::sleep(delay).await;
                    } else {
                        debug!("giving up after {attempts} attempts");
                        return RetryOutcome::Exhausted { error, attempts };
                    }
                }
            }
        }
    }

    fn delay(&self) -> Box<dyn Iterator<Item = Duration> + Send> {
        match self {
            Self::ExponentialBackoff {
                max_count,
                initial_delay,
                max_delay,
                factor,
            } => Box::new(
                ExponentialBackoffDelay {
                    delay: *initial_delay,
                    max_delay: *max_delay,
                    factor: *factor,
                }
                .take(*max_count),
            ),
            Self::Fixed { max_count, delay } => Box::new(std::iter::repeat_n(*delay, *max_count)),
        }
    }
}

impl From<&config::RetryStrategy> for RetryStrategy {
    fn from(config: &config::RetryStrategy) -> Self {
        match config {
            config::RetryStrategy::Fixed(config::FixedRetryStrategy {
                max_count,
                delay_ms,
            }) => Self::Fixed {
                max_count: *max_count,
                delay: Duration::from_millis(*delay_ms),
            },
            config::RetryStrategy::ExponentialBackoff(
                config::ExponentialBackoffRetryStrategy {
                    max_count,
                    initial_delay_ms,
                    max_delay_ms,
                    factor,
                },
            ) => Self::ExponentialBackoff {
                max_count: *max_count,
                initial_delay: Duration::from_millis(*initial_delay_ms),
                max_delay: Duration::from_millis(*max_delay_ms),
                factor: *factor,
            },
        }
    }
}
