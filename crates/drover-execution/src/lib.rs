//! Workers reachable over gRPC, the leased pool of connected workers,
//! and the orchestration that provisions hosts around a pool.

pub mod error;
mod id;
mod orchestrator;
mod pool;
#[cfg(test)]
mod testing;
mod worker;

pub use id::WorkerId;
pub use orchestrator::{Orchestrator, OrchestratorOptions};
pub use pool::{WorkerPool, WorkerPoolOptions};
pub use worker::{run_worker, serve_worker, WorkerClient, WorkerServer};
