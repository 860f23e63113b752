use thiserror::Error;

pub type DeployResult<T> = Result<T, DeployError>;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("configuration error: {0}")]
    ConfigurationError(String),
    #[error("{tool} is not installed on {host}")]
    MissingToolError { host: String, tool: String },
    #[error("remote command failed on {host}: {message}")]
    RemoteCommandError { host: String, message: String },
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl DeployError {
    pub fn configuration(message: impl Into<String>) -> Self {
        DeployError::ConfigurationError(message.into())
    }

    pub fn missing_tool(host: impl ToString, tool: impl Into<String>) -> Self {
        DeployError::MissingToolError {
            host: host.to_string(),
            tool: tool.into(),
        }
    }

    pub fn remote_command(host: impl ToString, message: impl Into<String>) -> Self {
        DeployError::RemoteCommandError {
            host: host.to_string(),
            message: message.into(),
        }
    }
}

impl From<tokio::task::JoinError> for DeployError {
    fn from(error: tokio::task::JoinError) -> Self {
        DeployError::InternalError(error.to_string())
    }
}
