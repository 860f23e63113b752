mod client;
mod entrypoint;
mod server;

pub use client::WorkerClient;
pub use entrypoint::{run_worker, serve_worker};
pub use server::WorkerServer;

#[allow(clippy::all)]
pub(crate) mod rpc {
    #[derive(Clone, Copy, PartialEq, prost::Message)]
    pub struct MultiplesRequest {
        #[prost(uint64, tag = "1")]
        pub prime: u64,
        /// The exclusive upper bound of the multiples.
        #[prost(uint64, tag = "2")]
        pub maximum: u64,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct MultiplesResponse {
        #[prost(uint64, repeated, tag = "1")]
        pub values: Vec<u64>,
    }

    #[derive(Clone, Copy, PartialEq, prost::Message)]
    pub struct StopWorkerRequest {}

    #[derive(Clone, Copy, PartialEq, prost::Message)]
    pub struct StopWorkerResponse {}

    include!(concat!(env!("OUT_DIR"), "/drover.worker.WorkerService.rs"));
}
