//! The command-execution and file-transfer transport under [`crate::RemoteHost`].

mod openssh;

use std::path::Path;
use std::sync::Arc;

pub use openssh::{OpenSshOptions, OpenSshTransport, OpenSshTransportFactory};

use crate::error::DeployResult;
use crate::host::HostDescriptor;

/// The captured result of a command that ran on a remote host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// The exit code of the remote command, or `None` if it was killed by a signal.
    pub exit_code: Option<i32>,
    /// Standard output followed by standard error.
    pub output: String,
}

impl CommandOutput {
    pub fn new(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            output: output.into(),
        }
    }

    pub fn success(output: impl Into<String>) -> Self {
        Self::new(0, output)
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Whether the shell could not find the program the command tried to run.
    ///
    /// POSIX shells exit with 127 in that case. The message is only checked
    /// for a failed command whose shell reported another status, where
    /// `bash` prints `command not found` and `dash` prints `<name>: not found`.
    pub fn is_command_not_found(&self) -> bool {
        match self.exit_code {
            Some(127) => true,
            Some(0) => false,
            _ => self.output.contains("command not found") || self.output.contains(": not found"),
        }
    }
}

#[async_trait::async_trait]
pub trait RemoteTransport: Send + Sync + 'static {
    /// Establishes the connection. Calling it on a connected transport is a no-op.
    async fn connect(&self) -> DeployResult<()>;

    /// Runs a shell command line and captures its output.
    /// An error means the transport failed, not that the command exited with non-zero status.
    async fn exec(&self, command: &str, input: Option<&str>) -> DeployResult<CommandOutput>;

    /// Copies a local file or directory tree to the remote path.
    async fn upload(&self, local: &Path, remote: &str) -> DeployResult<()>;

    /// Copies a remote file or directory tree to the local path.
    async fn download(&self, remote: &str, local: &Path) -> DeployResult<()>;

    async fn disconnect(&self) -> DeployResult<()>;
}

pub trait TransportFactory: Send + Sync + 'static {
    fn create(&self, host: &HostDescriptor) -> Arc<dyn RemoteTransport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_not_found() {
        assert!(CommandOutput::new(127, "").is_command_not_found());
        assert!(CommandOutput::new(1, "bash: rpm: command not found").is_command_not_found());
        assert!(!CommandOutput::success("dpkg-query: package 'foo': not found").is_command_not_found());
        assert!(!CommandOutput::new(2, "No such file or directory").is_command_not_found());
    }
}
