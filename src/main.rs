//! gridgen server entry point

use anyhow::Context;
use clap::Parser;
use gridgen::api::{self, AppState};
use gridgen::bus::ProgressBus;
use gridgen::config::{GpuConfig, ServerConfig};
use gridgen::coordinator::TaskCoordinator;
use gridgen::scheduler::Scheduler;
use gridgen::task::TaskStore;
use gridgen::worker::{WorkerApi, WorkerSupervisor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "gridgen", version, about = "Multi-GPU image-generation orchestrator")]
struct Cli {
    /// HTTP/WebSocket bind address
    #[arg(long, env = "GRIDGEN_LISTEN", default_value = "127.0.0.1:8188")]
    listen: String,

    /// GPU table document
    #[arg(long, env = "GRIDGEN_GPU_CONFIG", default_value = "gpu_config.json")]
    gpu_config: PathBuf,

    /// Generated image output root
    #[arg(long, env = "GRIDGEN_OUTPUTS", default_value = "outputs")]
    outputs: PathBuf,

    /// Model root; checkpoints/loras/vae live underneath
    #[arg(long, env = "GRIDGEN_MODELS_ROOT", default_value = "models")]
    models_root: PathBuf,

    /// Style definition directory
    #[arg(long, env = "GRIDGEN_STYLES_DIR", default_value = "sdxl_styles")]
    styles: PathBuf,

    /// Preset directory
    #[arg(long, env = "GRIDGEN_PRESETS_DIR", default_value = "presets")]
    presets: PathBuf,

    /// Worker launch command, split on whitespace
    #[arg(long, env = "GRIDGEN_WORKER_CMD", default_value = "python worker.py")]
    worker_cmd: String,

    /// First worker port; slot i is assigned base + i
    #[arg(long, env = "GRIDGEN_WORKER_BASE_PORT", default_value_t = 7865)]
    worker_base_port: u16,

    /// Wall-clock cap per sub-task, in seconds
    #[arg(long, env = "GRIDGEN_SUBTASK_TIMEOUT_SECS", default_value_t = 1800)]
    sub_task_timeout_secs: u64,

    /// User-editable flat config document
    #[arg(long, env = "GRIDGEN_CONFIG", default_value = "config.txt")]
    config_file: PathBuf,

    /// Companion tutorial file the editor schema is discovered from
    #[arg(
        long,
        env = "GRIDGEN_CONFIG_TUTORIAL",
        default_value = "config_modification_tutorial.txt"
    )]
    config_tutorial: PathBuf,
}

impl Cli {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            listen_addr: self.listen,
            outputs_dir: self.outputs,
            models_dir: self.models_root.join("checkpoints"),
            loras_dir: self.models_root.join("loras"),
            vaes_dir: self.models_root.join("vae"),
            styles_dir: self.styles,
            presets_dir: self.presets,
            gpu_config_path: self.gpu_config,
            editor_config_path: self.config_file,
            editor_tutorial_path: self.config_tutorial,
            worker_command: self.worker_cmd.split_whitespace().map(String::from).collect(),
            worker_base_port: self.worker_base_port,
            sub_task_timeout: Duration::from_secs(self.sub_task_timeout_secs),
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Arc::new(cli.into_config());
    config.validate().context("invalid server configuration")?;

    let gpu_config =
        GpuConfig::load(&config.gpu_config_path).context("failed to load GPU config")?;
    info!(
        multi_gpu = gpu_config.enabled,
        distribute = gpu_config.distribute,
        gpus = gpu_config.gpus.len(),
        "GPU table loaded"
    );

    let scheduler = Arc::new(Scheduler::new(&gpu_config, config.worker_base_port));
    let supervisor = Arc::new(WorkerSupervisor::new(Arc::clone(&config)));
    for device in supervisor.spawn_all(&scheduler.slots()) {
        scheduler.mark_busy(device, true);
    }

    // Probe readiness in the background so the HTTP surface is up while
    // workers load their models. Slots whose worker never answers are fenced
    // off as busy so the scheduler stops assigning to them.
    {
        let supervisor = Arc::clone(&supervisor);
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            for device in supervisor.probe_all_ready().await {
                scheduler.mark_busy(device, true);
            }
        });
    }

    let bus = Arc::new(ProgressBus::new());
    let store = Arc::new(TaskStore::new());
    let workers: Arc<dyn WorkerApi> = Arc::clone(&supervisor) as Arc<dyn WorkerApi>;
    let coordinator = Arc::new(TaskCoordinator::new(
        Arc::clone(&scheduler),
        workers,
        Arc::clone(&bus),
        store,
        config.poll_interval,
        config.sub_task_timeout,
    ));

    let state = Arc::new(AppState::new(
        Arc::clone(&config),
        scheduler,
        coordinator,
        bus,
    ));
    let app = api::router(state);

    info!(listen = %config.listen_addr, "starting server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    let shutdown_supervisor = Arc::clone(&supervisor);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutdown signal received, terminating workers");
            shutdown_supervisor.shutdown().await;
        })
        .await
        .context("server error")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
