use std::path::Path;
use std::sync::Arc;

use drover_common::config::DeployConfig;
use log::{debug, error, info, warn};

use crate::controller::{controller_name, controller_script};
use crate::error::{DeployError, DeployResult};
use crate::host::ProvisionedHost;
use crate::session::RemoteHost;
use crate::transport::CommandOutput;

#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// The name of the directory under the remote home directory,
    /// without the leading dot.
    pub app_name: String,
    pub dirs: Vec<String>,
    pub packages: Vec<String>,
    pub run: Option<String>,
    pub source_files: Vec<String>,
    /// The command that checks whether a package is installed,
    /// with `{package}` replaced by the package name.
    pub package_query: String,
    pub script_runtime: String,
    pub leave_files: bool,
}

impl DeployOptions {
    pub fn new(config: &DeployConfig) -> Self {
        Self {
            app_name: config.app_name.clone(),
            dirs: config.dirs.clone(),
            packages: config.packages.clone(),
            run: config.run.clone(),
            source_files: config.source_files.clone(),
            package_query: config.package_query.clone(),
            script_runtime: config.script_runtime.clone(),
            leave_files: config.leave_files,
        }
    }
}

/// Provisions a worker daemon on a host and removes it again.
#[derive(Debug, Clone)]
pub struct Deployer {
    options: Arc<DeployOptions>,
}

impl Deployer {
    pub fn new(options: DeployOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }

    pub fn options(&self) -> &DeployOptions {
        &self.options
    }

    async fn run(&self, host: &RemoteHost, command: &str) -> DeployResult<CommandOutput> {
        host.run(command, &self.options.source_files).await
    }

    /// Sets up the host and starts the worker.
    pub async fn startup(&self, host: &RemoteHost, target: &mut ProvisionedHost) -> DeployResult<()> {
        debug!("setting up {}", host.descriptor());
        self.check_dependencies(host, &self.options.packages).await?;
        self.create_working_directory(host, target).await?;
        self.upload_payload(host, target, &self.options.dirs).await?;
        if let Some(run) = &self.options.run {
            self.write_controller(host, target, run).await?;
        }
        self.start(host, target).await
    }

    /// Stops the worker and removes the working directory.
    /// Cleanup is attempted even if the worker could not be stopped.
    pub async fn teardown(&self, host: &RemoteHost, target: &mut ProvisionedHost) -> DeployResult<()> {
        debug!("cleaning up {}", host.descriptor());
        let stopped = self.stop(host, target).await;
        if let Err(e) = &stopped {
            error!("failed to stop the worker on {}: {e}", host.descriptor());
        }
        self.cleanup(host, target).await?;
        stopped
    }

    /// Checks that the packages are installed and returns the missing ones.
    ///
    /// A missing package manager is an error. Missing packages are only reported.
    pub async fn check_dependencies(
        &self,
        host: &RemoteHost,
        packages: &[String],
    ) -> DeployResult<Vec<String>> {
        let mut missing = vec![];
        for package in packages {
            let query = self.options.package_query.replace("{package}", package);
            let output = self.run(host, &query).await?;
            if output.is_command_not_found() {
                let tool = query.split_whitespace().next().unwrap_or_default();
                return Err(DeployError::missing_tool(host.descriptor(), tool));
            }
            if !output.is_success() {
                missing.push(package.clone());
            }
        }
        if !missing.is_empty() {
            warn!(
                "the following packages are not installed on {}: {}",
                host.descriptor(),
                missing.join(", ")
            );
        }
        Ok(missing)
    }

    /// Creates `~/.{app}/{uuid}` on the host.
    pub async fn create_working_directory(
        &self,
        host: &RemoteHost,
        target: &mut ProvisionedHost,
    ) -> DeployResult<String> {
        let dir = format!("~/.{}/{}", self.options.app_name, uuid::Uuid::new_v4());
        let output = self.run(host, &format!("mkdir -p {dir}")).await?;
        if !output.is_success() {
            return Err(DeployError::remote_command(
                host.descriptor(),
                format!("cannot create {dir}: {}", output.output.trim()),
            ));
        }
        debug!("{}: working directory {dir}", host.descriptor());
        target.working_directory = Some(dir.clone());
        Ok(dir)
    }

    /// Uploads each local directory into the working directory under its base name.
    pub async fn upload_payload(
        &self,
        host: &RemoteHost,
        target: &ProvisionedHost,
        dirs: &[String],
    ) -> DeployResult<()> {
        let working_directory = require_working_directory(host, target)?;
        for dir in dirs {
            let path = Path::new(dir);
            let is_dir = tokio::fs::metadata(path)
                .await
                .map(|x| x.is_dir())
                .unwrap_or(false);
            let name = path.file_name().and_then(|x| x.to_str());
            match (is_dir, name) {
                (true, Some(name)) => {
                    host.upload(path, &format!("{working_directory}/{name}"))
                        .await?;
                }
                _ => error!("{dir:?} is not a directory"),
            }
        }
        Ok(())
    }

    /// Writes the controller script for `run` into the working directory
    /// and returns its file name.
    pub async fn write_controller(
        &self,
        host: &RemoteHost,
        target: &mut ProvisionedHost,
        run: &str,
    ) -> DeployResult<String> {
        let working_directory = require_working_directory(host, target)?;
        let name = controller_name(run)?;
        let script = controller_script(run)?;
        let path = format!("{working_directory}/{name}");
        let output = host
            .run_with_input(
                &format!("cat > {path} && chmod +x {path}"),
                &script,
                &self.options.source_files,
            )
            .await?;
        if !output.is_success() {
            return Err(DeployError::remote_command(
                host.descriptor(),
                format!("cannot write {path}: {}", output.output.trim()),
            ));
        }
        target.controller = Some(name.clone());
        Ok(name)
    }

    fn controller_command(&self, target: &ProvisionedHost, action: &str) -> Option<String> {
        let dir = target.working_directory.as_deref()?;
        let controller = target.controller.as_deref()?;
        Some(format!(
            "cd {dir} && {} {controller} {action}",
            self.options.script_runtime
        ))
    }

    pub async fn start(&self, host: &RemoteHost, target: &ProvisionedHost) -> DeployResult<()> {
        let Some(command) = self.controller_command(target, "start") else {
            debug!("{}: no controller to start", host.descriptor());
            return Ok(());
        };
        let descriptor = host.descriptor();
        let command = format!("{command} -- {} {}", descriptor.machine(), descriptor.port());
        let output = self.run(host, &command).await?;
        if output.is_command_not_found() {
            return Err(DeployError::missing_tool(
                descriptor,
                &self.options.script_runtime,
            ));
        }
        if !output.is_success() {
            return Err(DeployError::remote_command(
                descriptor,
                format!("cannot start the worker: {}", output.output.trim()),
            ));
        }
        info!("started the worker on {descriptor}");
        Ok(())
    }

    pub async fn stop(&self, host: &RemoteHost, target: &ProvisionedHost) -> DeployResult<()> {
        let Some(command) = self.controller_command(target, "stop") else {
            return Ok(());
        };
        let output = self.run(host, &command).await?;
        if output.is_command_not_found() {
            return Err(DeployError::missing_tool(
                host.descriptor(),
                &self.options.script_runtime,
            ));
        }
        if output.is_success() {
            info!("stopped the worker on {}", host.descriptor());
        } else {
            warn!(
                "the worker on {} did not stop cleanly: {}",
                host.descriptor(),
                output.output.trim()
            );
        }
        Ok(())
    }

    /// Removes the working directory. Calling it again is a no-op.
    pub async fn cleanup(&self, host: &RemoteHost, target: &mut ProvisionedHost) -> DeployResult<()> {
        let Some(dir) = target.working_directory.as_deref() else {
            return Ok(());
        };
        if dir.trim().is_empty() || dir.contains(['*', '?']) {
            warn!("{}: refusing to remove {dir:?}", host.descriptor());
        } else if self.options.leave_files {
            info!("{}: leaving {dir} in place", host.descriptor());
        } else {
            let output = self.run(host, &format!("rm -rf {dir}")).await?;
            if !output.is_success() {
                return Err(DeployError::remote_command(
                    host.descriptor(),
                    format!("cannot remove {dir}: {}", output.output.trim()),
                ));
            }
        }
        target.working_directory = None;
        target.controller = None;
        Ok(())
    }
}

fn require_working_directory<'a>(
    host: &RemoteHost,
    target: &'a ProvisionedHost,
) -> DeployResult<&'a str> {
    target.working_directory.as_deref().ok_or_else(|| {
        DeployError::InternalError(format!("no working directory on {}", host.descriptor()))
    })
}
