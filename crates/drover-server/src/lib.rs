mod builder;
mod retry;

pub use builder::{ServerBuilder, ServerBuilderOptions};
pub use retry::{RetryOutcome, RetryStrategy};
