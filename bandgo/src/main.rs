use anyhow::Context;
use bandgo::config::{Args, Config};
use bandgo::counters::SystemCounters;
use bandgo::sampler::Sampler;
use bandgo::supervisor::Supervisor;
use bandgo::terminal::LiveRegion;
use bandgo::tls::insecure_client_config;
use bandgo::worker::Worker;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use mimalloc::MiMalloc;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> ExitCode {
    let args = Args::parse();
    let config = match Config::try_from(args) {
        Ok(config) => Arc::new(config),
        Err(e) => Args::command()
            .error(ErrorKind::ValueValidation, format!("{e:#}"))
            .exit(),
    };
    init_logging();
    println!(
        "bandgo - Make your bandwidth GO away! - {}",
        env!("CARGO_PKG_VERSION")
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    let res = rt.block_on(run(config));
    // in-flight requests are abandoned, not drained
    rt.shutdown_background();
    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "bandgo stopped");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

async fn run(config: Arc<Config>) -> anyhow::Result<()> {
    let workers = config.effective_workers();
    let tls = insecure_client_config()?;
    let shutdown = CancellationToken::new();

    let sampler = Sampler::new(SystemCounters::new(), workers);
    let target = config.target.to_string();
    let sampler_shutdown = shutdown.clone();
    let sampler_task = tokio::spawn(async move {
        let mut region = LiveRegion::stdout();
        sampler.run(&target, &mut region, sampler_shutdown).await
    });

    info!(
        workers,
        target = %config.target,
        custom_ips = config.custom_ips.len(),
        "Starting workers"
    );
    let supervisor = Supervisor::new(workers);
    let worker_config = Arc::clone(&config);
    tokio::select! {
        () = supervisor.run(move |slot| {
            Worker::new(slot, Arc::clone(&worker_config), Arc::clone(&tls)).run()
        }) => {
            warn!("Every worker stopped");
        }
        res = tokio::signal::ctrl_c() => {
            match res {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
        }
    }

    shutdown.cancel();
    sampler_task.await.context("Traffic sampler panicked")?
}
