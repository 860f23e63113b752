use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use futures::FutureExt;
use log::{debug, warn};
use tokio::sync::{Mutex, MutexGuard};

use crate::digest::{local_digest, parse_digest, remote_digest_command};
use crate::error::{DeployError, DeployResult};
use crate::host::HostDescriptor;
use crate::transport::{CommandOutput, RemoteTransport};

/// Serializes connection establishment across hosts.
///
/// Clones share the same lock. Create one per orchestration and hand a
/// clone to every [`RemoteHost`].
#[derive(Debug, Clone, Default)]
pub struct HandshakeLock(Arc<Mutex<()>>);

impl HandshakeLock {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock(&self) -> MutexGuard<'_, ()> {
        self.0.lock().await
    }
}

#[derive(Default)]
struct SessionState {
    connected: bool,
    /// The `source` commands for the profile files found on the host,
    /// computed on first use within a session.
    pre_commands: Option<Vec<String>>,
}

struct RemoteHostInner {
    descriptor: HostDescriptor,
    transport: Arc<dyn RemoteTransport>,
    handshake: HandshakeLock,
    state: Mutex<SessionState>,
}

/// A session to a remote machine.
///
/// Clones share the same connection. Every operation connects on demand,
/// and the connection stays open until [`RemoteHost::disconnect`].
#[derive(Clone)]
pub struct RemoteHost {
    inner: Arc<RemoteHostInner>,
}

impl RemoteHost {
    pub fn new(
        descriptor: HostDescriptor,
        transport: Arc<dyn RemoteTransport>,
        handshake: HandshakeLock,
    ) -> Self {
        Self {
            inner: Arc::new(RemoteHostInner {
                descriptor,
                transport,
                handshake,
                state: Mutex::new(SessionState::default()),
            }),
        }
    }

    pub fn descriptor(&self) -> &HostDescriptor {
        &self.inner.descriptor
    }

    pub async fn connect(&self) -> DeployResult<()> {
        let mut state = self.inner.state.lock().await;
        if state.connected {
            return Ok(());
        }
        let _handshake = self.inner.handshake.lock().await;
        debug!("{}: connect", self.inner.descriptor);
        self.inner.transport.connect().await?;
        state.connected = true;
        Ok(())
    }

    pub async fn disconnect(&self) -> DeployResult<()> {
        let mut state = self.inner.state.lock().await;
        if !state.connected {
            return Ok(());
        }
        debug!("{}: disconnect", self.inner.descriptor);
        *state = SessionState::default();
        self.inner.transport.disconnect().await
    }

    /// Connects, runs `f`, and disconnects whether `f` succeeds, fails, or panics.
    pub async fn with_session<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(RemoteHost) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<DeployError>,
    {
        self.connect().await?;
        let result = AssertUnwindSafe(f(self.clone())).catch_unwind().await;
        if let Err(e) = self.disconnect().await {
            warn!("{}: failed to disconnect: {e}", self.inner.descriptor);
        }
        match result {
            Ok(x) => x,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    /// Runs a command after sourcing the profile files that exist on the host.
    ///
    /// A non-zero exit status of the command is part of the returned output.
    /// An error means the command could not be run at all.
    pub async fn run(&self, command: &str, source_files: &[String]) -> DeployResult<CommandOutput> {
        self.execute(command, None, source_files).await
    }

    /// Runs a command as [`RemoteHost::run`] does, feeding `input` to its standard input.
    pub async fn run_with_input(
        &self,
        command: &str,
        input: &str,
        source_files: &[String],
    ) -> DeployResult<CommandOutput> {
        self.execute(command, Some(input), source_files).await
    }

    /// Runs a command as the superuser.
    /// The host secret, if any, is sent to `sudo` on standard input.
    pub async fn sudo(&self, command: &str, source_files: &[String]) -> DeployResult<CommandOutput> {
        match self.inner.descriptor.secret() {
            Some(secret) => {
                let input = format!("{secret}\n");
                self.execute(&format!("sudo -S -p '' {command}"), Some(&input), source_files)
                    .await
            }
            None => {
                self.execute(&format!("sudo -n {command}"), None, source_files)
                    .await
            }
        }
    }

    async fn execute(
        &self,
        command: &str,
        input: Option<&str>,
        source_files: &[String],
    ) -> DeployResult<CommandOutput> {
        self.connect().await?;
        let mut commands = self.pre_commands(source_files).await?;
        commands.push(command.to_string());
        let line = commands.join(" && ");
        debug!("{}: run {line}", self.inner.descriptor);
        let output = self.inner.transport.exec(&line, input).await?;
        debug!(
            "{}: exit code {:?}: {}",
            self.inner.descriptor,
            output.exit_code,
            output.output.trim_end()
        );
        Ok(output)
    }

    async fn pre_commands(&self, source_files: &[String]) -> DeployResult<Vec<String>> {
        let mut state = self.inner.state.lock().await;
        if let Some(commands) = &state.pre_commands {
            return Ok(commands.clone());
        }
        let mut commands = vec![];
        for file in source_files {
            let output = self.inner.transport.exec(&format!("ls {file}"), None).await?;
            if output.is_success() {
                commands.push(format!(". {file}"));
            } else {
                debug!("{}: not sourcing missing {file}", self.inner.descriptor);
            }
        }
        state.pre_commands = Some(commands.clone());
        Ok(commands)
    }

    /// Copies a local file or directory tree to the host.
    ///
    /// A transfer error is ignored when the remote tree has the same
    /// content digest as the local one.
    pub async fn upload(&self, local: &Path, remote: &str) -> DeployResult<()> {
        self.connect().await?;
        debug!(
            "{}: upload {} to {remote}",
            self.inner.descriptor,
            local.display()
        );
        match self.inner.transport.upload(local, remote).await {
            Ok(()) => Ok(()),
            Err(e) => self.accept_if_same_files(e, local, remote).await,
        }
    }

    /// Copies a remote file or directory tree from the host,
    /// with the same digest check as [`RemoteHost::upload`].
    pub async fn download(&self, remote: &str, local: &Path) -> DeployResult<()> {
        self.connect().await?;
        debug!(
            "{}: download {remote} to {}",
            self.inner.descriptor,
            local.display()
        );
        match self.inner.transport.download(remote, local).await {
            Ok(()) => Ok(()),
            Err(e) => self.accept_if_same_files(e, local, remote).await,
        }
    }

    async fn accept_if_same_files(
        &self,
        error: DeployError,
        local: &Path,
        remote: &str,
    ) -> DeployResult<()> {
        if self.same_files(local, remote).await {
            warn!(
                "{}: transfer reported an error but the files match: {error}",
                self.inner.descriptor
            );
            Ok(())
        } else {
            Err(error)
        }
    }

    async fn same_files(&self, local: &Path, remote: &str) -> bool {
        let local = match local_digest(local).await {
            Ok(x) => x,
            Err(e) => {
                debug!("{}: no local digest: {e}", self.inner.descriptor);
                return false;
            }
        };
        let remote = match self
            .inner
            .transport
            .exec(&remote_digest_command(remote), None)
            .await
        {
            Ok(output) if output.is_success() => parse_digest(&output.output),
            Ok(_) => None,
            Err(e) => {
                debug!("{}: no remote digest: {e}", self.inner.descriptor);
                None
            }
        };
        debug!(
            "{}: local digest {local}, remote digest {remote:?}",
            self.inner.descriptor
        );
        remote.is_some_and(|x| x == local)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::testing::{ScriptedTransport, TransportCall};

    /// A transport whose handshake takes a while and counts the handshakes in flight.
    struct SlowHandshake {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl RemoteTransport for SlowHandshake {
        async fn connect(&self) -> DeployResult<()> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }

        async fn exec(&self, _: &str, _: Option<&str>) -> DeployResult<CommandOutput> {
            Ok(CommandOutput::success(""))
        }

        async fn upload(&self, _: &Path, _: &str) -> DeployResult<()> {
            Ok(())
        }

        async fn download(&self, _: &str, _: &Path) -> DeployResult<()> {
            Ok(())
        }

        async fn disconnect(&self) -> DeployResult<()> {
            Ok(())
        }
    }

    fn remote_host(transport: ScriptedTransport) -> (RemoteHost, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        let host = RemoteHost::new(
            HostDescriptor::new("me", "localhost", 9000),
            transport.clone(),
            HandshakeLock::new(),
        );
        (host, transport)
    }

    #[tokio::test]
    async fn test_run_sources_existing_profiles_once() -> DeployResult<()> {
        let (host, transport) = remote_host(
            ScriptedTransport::new().on("ls ~/.bashrc", CommandOutput::new(2, "No such file")),
        );
        let sources = vec!["~/.profile".to_string(), "~/.bashrc".to_string()];
        let output = host.run("uname", &sources).await?;
        assert!(output.is_success());
        host.run("whoami", &sources).await?;
        assert_eq!(
            transport.commands(),
            vec![
                "ls ~/.profile",
                "ls ~/.bashrc",
                ". ~/.profile && uname",
                ". ~/.profile && whoami",
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_output() -> DeployResult<()> {
        let (host, _) = remote_host(ScriptedTransport::new().on("false", CommandOutput::new(1, "")));
        let output = host.run("false", &[]).await?;
        assert_eq!(output.exit_code, Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_with_session_disconnects_on_error() {
        let (host, transport) = remote_host(ScriptedTransport::new());
        let result = host
            .with_session(|host| async move {
                host.run("true", &[]).await?;
                Err::<(), _>(DeployError::InternalError("boom".to_string()))
            })
            .await;
        assert!(matches!(result, Err(DeployError::InternalError(_))));
        let calls = transport.calls();
        assert_eq!(calls.first(), Some(&TransportCall::Connect));
        assert_eq!(calls.last(), Some(&TransportCall::Disconnect));
        assert_eq!(
            calls.iter().filter(|x| **x == TransportCall::Connect).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_connect_failure_skips_session() {
        let (host, transport) = remote_host(ScriptedTransport::new().fail_connect("refused"));
        let result = host
            .with_session(|_| async { Ok::<_, DeployError>(()) })
            .await;
        assert!(matches!(result, Err(DeployError::RemoteCommandError { .. })));
        assert_eq!(transport.calls(), vec![TransportCall::Connect]);
    }

    #[tokio::test]
    async fn test_sudo_with_secret_uses_stdin() -> DeployResult<()> {
        let transport = Arc::new(ScriptedTransport::new());
        let host = RemoteHost::new(
            HostDescriptor::new("me", "localhost", 9000).with_secret("sekret"),
            transport.clone(),
            HandshakeLock::new(),
        );
        host.sudo("apt-get update", &[]).await?;
        assert!(transport.calls().contains(&TransportCall::Exec {
            command: "sudo -S -p '' apt-get update".to_string(),
            input: Some("sekret\n".to_string()),
        }));
        Ok(())
    }

    #[tokio::test]
    async fn test_sudo_without_secret_is_non_interactive() -> DeployResult<()> {
        let (host, transport) = remote_host(ScriptedTransport::new());
        host.sudo("true", &[]).await?;
        assert_eq!(transport.commands(), vec!["sudo -n true"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_upload_error_accepted_when_digests_match() -> DeployResult<()> {
        let dir = std::env::temp_dir().join(format!("drover-upload-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("data.txt"), "hello")?;
        let digest = local_digest(&dir).await?;

        let (host, _) = remote_host(
            ScriptedTransport::new()
                .fail_transfers("connection reset")
                .on("md5sum", CommandOutput::success(format!("{digest}  -\n"))),
        );
        let matched = host.upload(&dir, "~/.drover/x/data").await;

        let (host, _) = remote_host(
            ScriptedTransport::new().fail_transfers("connection reset").on(
                "md5sum",
                CommandOutput::success("00000000000000000000000000000000  -\n"),
            ),
        );
        let mismatched = host.upload(&dir, "~/.drover/x/data").await;
        fs::remove_dir_all(&dir)?;

        assert!(matched.is_ok());
        assert!(matches!(
            mismatched,
            Err(DeployError::RemoteCommandError { message, .. }) if message == "connection reset"
        ));
        Ok(())
    }

    async fn peak_handshakes(handshake: impl Fn() -> HandshakeLock) -> DeployResult<usize> {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let tasks = (0..4)
            .map(|i| {
                let host = RemoteHost::new(
                    HostDescriptor::new("me", format!("node{i}"), 9000),
                    Arc::new(SlowHandshake {
                        active: Arc::clone(&active),
                        peak: Arc::clone(&peak),
                    }),
                    handshake(),
                );
                tokio::spawn(async move { host.connect().await })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            task.await
                .map_err(|e| DeployError::InternalError(e.to_string()))??;
        }
        Ok(peak.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_shared_handshake_lock_serializes_connections() -> DeployResult<()> {
        let shared = HandshakeLock::new();
        assert_eq!(peak_handshakes(|| shared.clone()).await?, 1);
        assert!(peak_handshakes(HandshakeLock::new).await? > 1);
        Ok(())
    }
}
