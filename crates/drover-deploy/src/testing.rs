//! A scripted [`RemoteTransport`] for exercising provisioning without a remote machine.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{DeployError, DeployResult};
use crate::host::HostDescriptor;
use crate::transport::{CommandOutput, RemoteTransport, TransportFactory};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect,
    Exec {
        command: String,
        input: Option<String>,
    },
    Upload {
        local: PathBuf,
        remote: String,
    },
    Download {
        remote: String,
        local: PathBuf,
    },
    Disconnect,
}

/// A transport that answers commands from a list of rules and records every call.
///
/// A rule matches when the command contains its pattern.
/// The first matching rule wins, and unmatched commands succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    rules: Vec<(String, CommandOutput)>,
    connect_error: Option<String>,
    panic_pattern: Option<String>,
    transfer_error: Option<String>,
    calls: Mutex<Vec<TransportCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, pattern: impl Into<String>, output: CommandOutput) -> Self {
        self.rules.push((pattern.into(), output));
        self
    }

    pub fn fail_connect(mut self, message: impl Into<String>) -> Self {
        self.connect_error = Some(message.into());
        self
    }

    /// Panics on a command that contains the pattern, after the command is recorded.
    pub fn panic_on(mut self, pattern: impl Into<String>) -> Self {
        self.panic_pattern = Some(pattern.into());
        self
    }

    /// Makes every upload and download report an error after it is recorded.
    pub fn fail_transfers(mut self, message: impl Into<String>) -> Self {
        self.transfer_error = Some(message.into());
        self
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The command lines passed to [`RemoteTransport::exec`], in order.
    pub fn commands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|x| match x {
                TransportCall::Exec { command, .. } => Some(command),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: TransportCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn transfer_result(&self) -> DeployResult<()> {
        match &self.transfer_error {
            Some(message) => Err(DeployError::remote_command("scripted", message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl RemoteTransport for ScriptedTransport {
    async fn connect(&self) -> DeployResult<()> {
        self.record(TransportCall::Connect);
        match &self.connect_error {
            Some(message) => Err(DeployError::remote_command("scripted", message.clone())),
            None => Ok(()),
        }
    }

    async fn exec(&self, command: &str, input: Option<&str>) -> DeployResult<CommandOutput> {
        self.record(TransportCall::Exec {
            command: command.to_string(),
            input: input.map(|x| x.to_string()),
        });
        if let Some(pattern) = &self.panic_pattern {
            if command.contains(pattern.as_str()) {
                panic!("scripted panic: {command}");
            }
        }
        let output = self
            .rules
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::success(""));
        Ok(output)
    }

    async fn upload(&self, local: &Path, remote: &str) -> DeployResult<()> {
        self.record(TransportCall::Upload {
            local: local.to_path_buf(),
            remote: remote.to_string(),
        });
        self.transfer_result()
    }

    async fn download(&self, remote: &str, local: &Path) -> DeployResult<()> {
        self.record(TransportCall::Download {
            remote: remote.to_string(),
            local: local.to_path_buf(),
        });
        self.transfer_result()
    }

    async fn disconnect(&self) -> DeployResult<()> {
        self.record(TransportCall::Disconnect);
        Ok(())
    }
}

type ScriptFn = dyn Fn(&HostDescriptor) -> ScriptedTransport + Send + Sync;

/// Creates a [`ScriptedTransport`] per host and keeps them for inspection.
pub struct ScriptedTransportFactory {
    script: Box<ScriptFn>,
    created: Mutex<Vec<(HostDescriptor, Arc<ScriptedTransport>)>>,
}

impl ScriptedTransportFactory {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&HostDescriptor) -> ScriptedTransport + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            created: Mutex::new(vec![]),
        }
    }

    pub fn transports(&self) -> Vec<(HostDescriptor, Arc<ScriptedTransport>)> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TransportFactory for ScriptedTransportFactory {
    fn create(&self, host: &HostDescriptor) -> Arc<dyn RemoteTransport> {
        let transport = Arc::new((self.script)(host));
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((host.clone(), Arc::clone(&transport)));
        transport
    }
}
