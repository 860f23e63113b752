use std::sync::PoisonError;

use drover_deploy::error::DeployError;
use thiserror::Error;
use tokio::task::JoinError;

pub type ExecutionResult<T> = Result<T, ExecutionError>;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("configuration error: {0}")]
    ConfigurationError(String),
    #[error("connection error: {0}")]
    ConnectionError(String),
    #[error("the worker pool is empty")]
    EmptyPoolError,
    #[error(transparent)]
    DeployError(#[from] DeployError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("error in Tonic transport: {0}")]
    TonicTransportError(#[from] tonic::transport::Error),
    #[error("error in Tonic status: {0}")]
    TonicStatusError(#[from] tonic::Status),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl ExecutionError {
    pub fn configuration(message: impl Into<String>) -> Self {
        ExecutionError::ConfigurationError(message.into())
    }

    pub fn connection(message: impl Into<String>) -> Self {
        ExecutionError::ConnectionError(message.into())
    }
}

impl From<JoinError> for ExecutionError {
    fn from(error: JoinError) -> Self {
        ExecutionError::InternalError(error.to_string())
    }
}

impl<T> From<PoisonError<T>> for ExecutionError {
    fn from(error: PoisonError<T>) -> Self {
        ExecutionError::InternalError(error.to_string())
    }
}

impl From<ExecutionError> for tonic::Status {
    fn from(e: ExecutionError) -> tonic::Status {
        match e {
            ExecutionError::TonicStatusError(e) => e,
            ExecutionError::ConfigurationError(x) => tonic::Status::invalid_argument(x),
            x => tonic::Status::internal(x.to_string()),
        }
    }
}
