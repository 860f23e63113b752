use clap::Args;
use drover_common::config::AppConfig;
use drover_common::runtime::RuntimeManager;
use drover_telemetry::telemetry::{init_telemetry, shutdown_telemetry, ResourceOptions};
use log::LevelFilter;

#[derive(Args)]
pub struct WorkerArgs {
    /// The host name or address to listen on
    pub machine: Option<String>,
    /// The port to listen on
    pub port: Option<u16>,
}

pub fn run_worker(args: WorkerArgs, level: Option<LevelFilter>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load()?;
    if let Some(machine) = args.machine {
        config.worker.host = machine;
    }
    if let Some(port) = args.port {
        config.worker.port = port;
    }
    let runtime = RuntimeManager::try_new(&config.runtime)?;

    runtime.handle().primary().block_on(async {
        let resource = ResourceOptions {
            kind: "worker",
            level,
        };
        init_telemetry(&config.telemetry, resource)
    })?;

    let result = runtime
        .handle()
        .primary()
        .block_on(drover_execution::run_worker(&config.worker));

    shutdown_telemetry();

    result?;
    Ok(())
}
