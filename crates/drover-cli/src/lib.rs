mod primes;
mod runner;
mod worker;

pub use runner::main;
