use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use drover_common::config::AppConfig;
use drover_common::runtime::RuntimeManager;
use drover_deploy::transport::{OpenSshOptions, OpenSshTransportFactory};
use drover_execution::OrchestratorOptions;
use drover_sieve::PrimesJob;
use drover_telemetry::telemetry::{init_telemetry, shutdown_telemetry, ResourceOptions};
use log::LevelFilter;

#[derive(Args)]
pub struct PrimesArgs {
    /// The number to find all the primes below
    pub maximum: u64,
    /// Comma separated hosts, each as {user{:password}@}machine{:port}
    #[arg(short = 'H', long, value_delimiter = ',')]
    pub hosts: Vec<String>,
    /// The port assigned to the first host without a port, incremented for each such host
    #[arg(short, long)]
    pub port: Option<u16>,
    /// The script that starts a worker, relative to the working directory on the host.
    /// Without a script and directories, the hosts run this executable as the worker.
    #[arg(short, long)]
    pub run: Option<String>,
    /// Comma separated local directories to upload to each host
    #[arg(short, long, value_delimiter = ',')]
    pub dirs: Vec<String>,
    /// Comma separated packages that should be installed on each host
    #[arg(short = 'g', long, value_delimiter = ',')]
    pub packages: Vec<String>,
    /// Leave the working directory on each host after the job
    #[arg(long)]
    pub leave: bool,
}

impl PrimesArgs {
    fn apply(&self, config: &mut AppConfig) {
        let deploy = &mut config.deploy;
        if !self.hosts.is_empty() {
            deploy.hosts = self.hosts.clone();
        }
        if let Some(port) = self.port {
            deploy.port = port;
        }
        if let Some(run) = &self.run {
            deploy.run = Some(run.clone());
        }
        if !self.dirs.is_empty() {
            deploy.dirs = self.dirs.clone();
        }
        if !self.packages.is_empty() {
            deploy.packages = self.packages.clone();
        }
        deploy.leave_files |= self.leave;
    }
}

/// A payload whose worker script runs this executable.
/// The directory is removed on drop.
struct LocalPayload {
    root: PathBuf,
}

impl LocalPayload {
    const RUN: &'static str = "bin/worker.sh";

    fn create() -> std::io::Result<Self> {
        let program = std::env::current_exe()?;
        let root = std::env::temp_dir().join(format!("drover-payload-{}", std::process::id()));
        let payload = Self { root };
        std::fs::create_dir_all(payload.bin())?;
        let script = payload.root.join(Self::RUN);
        std::fs::write(
            &script,
            format!("#!/bin/sh\nexec '{}' worker \"$@\"\n", program.display()),
        )?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;
        }
        Ok(payload)
    }

    fn bin(&self) -> PathBuf {
        self.root.join("bin")
    }

    fn apply(&self, config: &mut AppConfig) {
        config.deploy.run = Some(Self::RUN.to_string());
        config.deploy.dirs = vec![self.bin().display().to_string()];
    }
}

impl Drop for LocalPayload {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

pub fn run_primes(args: PrimesArgs, level: Option<LevelFilter>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load()?;
    args.apply(&mut config);
    let payload = if config.deploy.run.is_none() && config.deploy.dirs.is_empty() {
        let payload = LocalPayload::create()?;
        payload.apply(&mut config);
        Some(payload)
    } else {
        None
    };
    let runtime = RuntimeManager::try_new(&config.runtime)?;

    runtime.handle().primary().block_on(async {
        let resource = ResourceOptions {
            kind: "driver",
            level,
        };
        init_telemetry(&config.telemetry, resource)
    })?;

    let factory = Arc::new(OpenSshTransportFactory::new(OpenSshOptions::new(
        &config.ssh,
    )));
    let job = PrimesJob::new(args.maximum, OrchestratorOptions::new(&config), factory);
    let result = runtime.handle().primary().block_on(job.execute());

    shutdown_telemetry();
    drop(payload);

    result?;
    Ok(())
}
