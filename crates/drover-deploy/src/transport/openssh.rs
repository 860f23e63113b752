use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;

use drover_common::config::SshConfig;
use log::debug;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{DeployError, DeployResult};
use crate::host::HostDescriptor;
use crate::transport::{CommandOutput, RemoteTransport, TransportFactory};

/// The exit code `ssh` uses for its own failures (as opposed to the remote command's).
const SSH_FAILURE_EXIT_CODE: i32 = 255;

#[derive(Debug, Clone)]
pub struct OpenSshOptions {
    pub program: String,
    pub copy_program: String,
    pub password_program: String,
    pub port: u16,
    pub identity_files: Vec<String>,
    pub options: Vec<String>,
    pub control_dir: PathBuf,
}

impl OpenSshOptions {
    pub fn new(config: &SshConfig) -> Self {
        Self {
            program: config.program.clone(),
            copy_program: config.copy_program.clone(),
            password_program: config.password_program.clone(),
            port: config.port,
            identity_files: config.identity_files.clone(),
            options: config.options.clone(),
            control_dir: config
                .control_dir
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
        }
    }
}

/// Runs commands through the OpenSSH client.
///
/// [`RemoteTransport::connect`] starts a control master in the background
/// and every later `ssh` or `scp` invocation is multiplexed over its socket,
/// so the authenticated connection is reused until
/// [`RemoteTransport::disconnect`] asks the master to exit.
pub struct OpenSshTransport {
    host: HostDescriptor,
    options: Arc<OpenSshOptions>,
    control_path: PathBuf,
}

impl OpenSshTransport {
    pub fn new(host: HostDescriptor, options: Arc<OpenSshOptions>) -> Self {
        let control_path = options
            .control_dir
            .join(format!("drover-{}.sock", uuid::Uuid::new_v4().simple()));
        Self {
            host,
            options,
            control_path,
        }
    }

    fn common_args(&self, port_flag: &str) -> Vec<String> {
        let mut args = vec![
            port_flag.to_string(),
            self.options.port.to_string(),
            "-o".to_string(),
            format!("ControlPath={}", self.control_path.display()),
        ];
        for file in &self.options.identity_files {
            args.push("-i".to_string());
            args.push(file.clone());
        }
        for option in &self.options.options {
            args.push("-o".to_string());
            args.push(option.clone());
        }
        args
    }

    fn connect_args(&self) -> Vec<String> {
        let mut args = ["-M", "-N", "-f", "-o", "ControlMaster=yes", "-o", "ControlPersist=yes"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        args.extend(self.common_args("-p"));
        args.push("--".to_string());
        args.push(self.host.destination());
        args
    }

    fn exec_args(&self, command: &str) -> Vec<String> {
        let mut args = vec!["-o".to_string(), "ControlMaster=no".to_string()];
        args.extend(self.common_args("-p"));
        args.push("--".to_string());
        args.push(self.host.destination());
        args.push(command.to_string());
        args
    }

    fn copy_args(&self, source: String, target: String) -> Vec<String> {
        let mut args = vec!["-r".to_string(), "-q".to_string()];
        args.extend(self.common_args("-P"));
        args.push(source);
        args.push(target);
        args
    }

    fn disconnect_args(&self) -> Vec<String> {
        let mut args = vec!["-O".to_string(), "exit".to_string()];
        args.extend(self.common_args("-p"));
        args.push("--".to_string());
        args.push(self.host.destination());
        args
    }

    fn remote_target(&self, path: &str) -> String {
        format!("{}:{}", self.host.destination(), copy_path(path))
    }

    fn command(&self, program: &str, args: Vec<String>) -> Command {
        let mut command = match self.host.secret() {
            Some(secret) => {
                let mut command = Command::new(&self.options.password_program);
                command.arg("-e").arg(program).env("SSHPASS", secret);
                command
            }
            None => Command::new(program),
        };
        command.args(args).kill_on_drop(true);
        command
    }

    async fn output(&self, mut command: Command, input: Option<&str>) -> DeployResult<Output> {
        command
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = command
            .spawn()
            .map_err(|e| DeployError::remote_command(&self.host, e.to_string()))?;
        if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
            stdin.write_all(input.as_bytes()).await?;
        }
        Ok(child.wait_with_output().await?)
    }

    async fn copy(&self, source: String, target: String) -> DeployResult<()> {
        debug!("{}: copy {source} to {target}", self.host);
        let args = self.copy_args(source, target);
        let output = self
            .output(self.command(&self.options.copy_program, args), None)
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(DeployError::remote_command(
                &self.host,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}

/// Converts a path for `scp`, which resolves relative paths against the
/// remote home directory but does not expand `~` on every server version.
fn copy_path(path: &str) -> &str {
    match path {
        "~" => ".",
        _ => path.strip_prefix("~/").unwrap_or(path),
    }
}

#[async_trait::async_trait]
impl RemoteTransport for OpenSshTransport {
    async fn connect(&self) -> DeployResult<()> {
        debug!("{}: connecting", self.host);
        let output = self
            .output(self.command(&self.options.program, self.connect_args()), None)
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(DeployError::remote_command(
                &self.host,
                format!(
                    "failed to connect: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ))
        }
    }

    async fn exec(&self, command: &str, input: Option<&str>) -> DeployResult<CommandOutput> {
        let output = self
            .output(
                self.command(&self.options.program, self.exec_args(command)),
                input,
            )
            .await?;
        let exit_code = output.status.code();
        if exit_code == Some(SSH_FAILURE_EXIT_CODE) {
            return Err(DeployError::remote_command(
                &self.host,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(CommandOutput {
            exit_code,
            output: text,
        })
    }

    async fn upload(&self, local: &Path, remote: &str) -> DeployResult<()> {
        self.copy(local.display().to_string(), self.remote_target(remote))
            .await
    }

    async fn download(&self, remote: &str, local: &Path) -> DeployResult<()> {
        self.copy(self.remote_target(remote), local.display().to_string())
            .await
    }

    async fn disconnect(&self) -> DeployResult<()> {
        debug!("{}: disconnecting", self.host);
        let output = self
            .output(
                self.command(&self.options.program, self.disconnect_args()),
                None,
            )
            .await?;
        if !output.status.success() {
            debug!(
                "{}: control master did not exit cleanly: {}",
                self.host,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        // The socket is normally removed by the master itself.
        let _ = tokio::fs::remove_file(&self.control_path).await;
        Ok(())
    }
}

pub struct OpenSshTransportFactory {
    options: Arc<OpenSshOptions>,
}

impl OpenSshTransportFactory {
    pub fn new(options: OpenSshOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }
}

impl TransportFactory for OpenSshTransportFactory {
    fn create(&self, host: &HostDescriptor) -> Arc<dyn RemoteTransport> {
        Arc::new(OpenSshTransport::new(
            host.clone(),
            Arc::clone(&self.options),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> Arc<OpenSshOptions> {
        Arc::new(OpenSshOptions {
            program: "ssh".to_string(),
            copy_program: "scp".to_string(),
            password_program: "sshpass".to_string(),
            port: 2222,
            identity_files: vec!["~/.ssh/id_ed25519".to_string()],
            options: vec!["StrictHostKeyChecking=accept-new".to_string()],
            control_dir: PathBuf::from("/tmp"),
        })
    }

    fn transport(host: HostDescriptor) -> OpenSshTransport {
        OpenSshTransport::new(host, options())
    }

    #[test]
    fn test_exec_args() {
        let transport = transport(HostDescriptor::new("me", "example.com", 9000));
        let args = transport.exec_args("uname -a");
        let control = format!("ControlPath={}", transport.control_path.display());
        assert!(control.starts_with("ControlPath=/tmp/drover-"));
        assert_eq!(
            args,
            vec![
                "-o",
                "ControlMaster=no",
                "-p",
                "2222",
                "-o",
                control.as_str(),
                "-i",
                "~/.ssh/id_ed25519",
                "-o",
                "StrictHostKeyChecking=accept-new",
                "--",
                "me@example.com",
                "uname -a",
            ]
        );
    }

    #[test]
    fn test_connect_args_start_a_control_master() {
        let transport = transport(HostDescriptor::new("me", "example.com", 9000));
        let args = transport.connect_args();
        assert_eq!(&args[..3], ["-M", "-N", "-f"]);
        assert!(args.contains(&"ControlPersist=yes".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("me@example.com"));
    }

    #[test]
    fn test_copy_args_use_upper_case_port_flag() {
        let transport = transport(HostDescriptor::new("me", "example.com", 9000));
        let args = transport.copy_args(
            "payload".to_string(),
            transport.remote_target("~/.drover/abc/payload"),
        );
        assert_eq!(&args[..4], ["-r", "-q", "-P", "2222"]);
        assert_eq!(
            &args[args.len() - 2..],
            ["payload", "me@example.com:.drover/abc/payload"]
        );
    }

    #[test]
    fn test_copy_path() {
        assert_eq!(copy_path("~/.drover/abc"), ".drover/abc");
        assert_eq!(copy_path("~"), ".");
        assert_eq!(copy_path("/opt/drover"), "/opt/drover");
    }

    #[test]
    fn test_password_uses_sshpass_environment() {
        let transport =
            transport(HostDescriptor::new("me", "example.com", 9000).with_secret("sekret"));
        let command = transport.command("ssh", vec!["-V".to_string()]);
        let command = command.as_std();
        assert_eq!(command.get_program(), "sshpass");
        let args = command.get_args().collect::<Vec<_>>();
        assert_eq!(args, ["-e", "ssh", "-V"]);
        assert!(!args.iter().any(|x| *x == "sekret"));
        assert!(command
            .get_envs()
            .any(|(k, v)| k == "SSHPASS" && v == Some("sekret".as_ref())));
    }
}
