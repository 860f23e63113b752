//! A Sieve of Eratosthenes that computes the composites of each seed prime on pooled workers.

mod job;
mod sieve;

pub use job::{PrimesJob, PrimesReport};
pub use sieve::primes_below;
