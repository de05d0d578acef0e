//! Worker supervisor
//!
//! Owns one long-lived inference worker process per GPU slot and exposes the
//! typed RPC surface (`health`, `generate`, `progress`, `stop`) to the rest
//! of the system. The task coordinator reaches workers only through the
//! [`WorkerApi`] trait so it can be driven by a mock in tests.

pub mod rpc;

use crate::args::CONTRACT_VERSION;
use crate::config::ServerConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::scheduler::GpuSlot;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Value};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

/// Environment variable naming the physical GPU for a worker
pub const ENV_GPU_VISIBILITY: &str = "CUDA_VISIBLE_DEVICES";
/// Environment variable carrying the slot's advisory port
pub const ENV_WORKER_PORT: &str = "GRIDGEN_WORKER_PORT";
/// Environment variable selecting the stdio RPC transport in the worker
pub const ENV_RPC_MODE: &str = "GRIDGEN_RPC_MODE";

/// Progress frame reported by a worker for one sub-task
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressReport {
    /// Completion percentage, 0 to 100
    #[serde(default)]
    pub percentage: i64,
    /// Human-readable stage description
    #[serde(default, rename = "statusText")]
    pub status_text: String,
    /// Whether the sub-task has terminated inside the worker
    #[serde(default)]
    pub finished: bool,
    /// Latest intermediate preview, base64
    #[serde(default)]
    pub preview: Option<String>,
    /// Output image paths produced so far
    #[serde(default)]
    pub results: Vec<String>,
    /// Inference-side failure, when one occurred
    #[serde(default)]
    pub error: Option<String>,
}

/// The worker surface the task coordinator depends on
#[async_trait]
pub trait WorkerApi: Send + Sync {
    /// Submit a sub-task to the worker on `device`. Returns once the worker
    /// accepted (not completed) the work.
    async fn generate(&self, device: u32, task_id: &str, args: Vec<Value>)
        -> OrchestratorResult<()>;

    /// Poll the progress of a previously accepted sub-task
    async fn progress(&self, device: u32, task_id: &str) -> OrchestratorResult<ProgressReport>;

    /// Ask the worker to cancel its currently running sub-task, best-effort
    async fn stop(&self, device: u32) -> OrchestratorResult<bool>;

    /// Whether the worker process for `device` is attached and running
    fn is_alive(&self, device: u32) -> bool;
}

struct WorkerHandle {
    device: u32,
    ready: AtomicBool,
    rpc: rpc::RpcClient,
    child: Mutex<Child>,
}

/// Supervisor owning every worker process
pub struct WorkerSupervisor {
    config: Arc<ServerConfig>,
    workers: Arc<DashMap<u32, Arc<WorkerHandle>>>,
}

impl WorkerSupervisor {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self {
            config,
            workers: Arc::new(DashMap::new()),
        }
    }

    /// Spawn one worker per slot. Failures are logged and returned so the
    /// caller can fence the affected slots; readiness is established
    /// separately by [`Self::probe_ready`].
    pub fn spawn_all(&self, slots: &[GpuSlot]) -> Vec<u32> {
        let mut failed = Vec::new();
        for slot in slots {
            if let Err(e) = self.spawn_slot(slot) {
                tracing::error!(device = slot.device, error = %e, "failed to spawn worker");
                failed.push(slot.device);
            }
        }
        failed
    }

    fn spawn_slot(&self, slot: &GpuSlot) -> OrchestratorResult<()> {
        let command = &self.config.worker_command;
        let (program, args) = command
            .split_first()
            .ok_or_else(|| OrchestratorError::Config("worker command is empty".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .env(ENV_GPU_VISIBILITY, slot.device.to_string())
            .env(ENV_WORKER_PORT, slot.port.to_string())
            .env(ENV_RPC_MODE, "stdio")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| OrchestratorError::WorkerStartup {
                device: slot.device,
                reason: format!("spawn failed: {}", e),
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (Some(stdin), Some(stdout), Some(stderr)) = (stdin, stdout, stderr) else {
            return Err(OrchestratorError::WorkerStartup {
                device: slot.device,
                reason: "worker stdio streams were not captured".to_string(),
            });
        };

        let handle = Arc::new(WorkerHandle {
            device: slot.device,
            ready: AtomicBool::new(false),
            rpc: rpc::RpcClient::new(slot.device, stdin, stdout, stderr),
            child: Mutex::new(child),
        });
        self.workers.insert(slot.device, Arc::clone(&handle));
        tracing::info!(device = slot.device, port = slot.port, "worker spawned");

        // Remove the record once the process goes away so later calls fail
        // fast with a worker-exited error.
        let workers = Arc::clone(&self.workers);
        tokio::spawn(async move {
            handle.rpc.wait_closed().await;
            workers.remove(&handle.device);
            tracing::warn!(device = handle.device, "worker removed from table");
        });

        Ok(())
    }

    /// Probe a worker until it answers `health` or the budget is exhausted.
    pub async fn probe_ready(&self, device: u32) -> OrchestratorResult<()> {
        for attempt in 1..=self.config.startup_probe_attempts {
            let Some(handle) = self.workers.get(&device).map(|h| Arc::clone(&h)) else {
                return Err(OrchestratorError::WorkerStartup {
                    device,
                    reason: "worker exited during startup".to_string(),
                });
            };
            // The cooldown doubles as the per-probe timeout, keeping the
            // whole budget near attempts x cooldown.
            match handle
                .rpc
                .call("health", json!({}), self.config.startup_probe_cooldown)
                .await
            {
                Ok(result) if result.get("status").and_then(Value::as_str) == Some("ok") => {
                    handle.ready.store(true, Ordering::Release);
                    tracing::info!(device, attempt, "worker ready");
                    return Ok(());
                }
                Ok(other) => {
                    tracing::debug!(device, attempt, response = %other, "health probe: unexpected response");
                }
                Err(e) => {
                    tracing::debug!(device, attempt, error = %e, "health probe failed");
                }
            }
            tokio::time::sleep(self.config.startup_probe_cooldown).await;
        }
        Err(OrchestratorError::WorkerStartup {
            device,
            reason: format!(
                "health probe failed after {} attempts",
                self.config.startup_probe_attempts
            ),
        })
    }

    /// Probe every spawned worker, returning the devices that never became
    /// ready. The server keeps running either way; the caller decides how to
    /// fence unusable slots.
    pub async fn probe_all_ready(&self) -> Vec<u32> {
        let devices: Vec<u32> = self.workers.iter().map(|entry| *entry.key()).collect();
        let mut failed = Vec::new();
        for device in devices {
            if let Err(e) = self.probe_ready(device).await {
                tracing::error!(device, error = %e, "worker never became ready");
                failed.push(device);
            }
        }
        failed
    }

    /// Whether a worker is attached and has passed its readiness probe
    pub fn is_ready(&self, device: u32) -> bool {
        self.workers
            .get(&device)
            .map(|h| h.ready.load(Ordering::Acquire) && h.rpc.is_alive())
            .unwrap_or(false)
    }

    /// Kill every worker and clear the table. In-flight tasks observe
    /// worker-exited errors and finalize as errors.
    pub async fn shutdown(&self) {
        let handles: Vec<Arc<WorkerHandle>> = self
            .workers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.workers.clear();
        for handle in handles {
            let mut child = handle.child.lock().await;
            if let Err(e) = child.start_kill() {
                tracing::debug!(device = handle.device, error = %e, "worker kill failed (already exited?)");
            }
        }
        tracing::info!("worker table cleared");
    }

    fn handle(&self, device: u32) -> OrchestratorResult<Arc<WorkerHandle>> {
        self.workers
            .get(&device)
            .map(|h| Arc::clone(&h))
            .ok_or(OrchestratorError::WorkerExited(device))
    }
}

#[async_trait]
impl WorkerApi for WorkerSupervisor {
    async fn generate(
        &self,
        device: u32,
        task_id: &str,
        args: Vec<Value>,
    ) -> OrchestratorResult<()> {
        let handle = self.handle(device)?;
        let params = json!({
            "task_id": task_id,
            "fooocus_args": args,
            "fooocus_args_contract_version": CONTRACT_VERSION,
        });
        handle
            .rpc
            .call("generate", params, self.config.generate_timeout)
            .await?;
        Ok(())
    }

    async fn progress(&self, device: u32, task_id: &str) -> OrchestratorResult<ProgressReport> {
        let handle = self.handle(device)?;
        let result = handle
            .rpc
            .call("progress", json!({ "task_id": task_id }), self.config.rpc_timeout)
            .await?;
        serde_json::from_value(result).map_err(|e| {
            OrchestratorError::RpcTransport(format!("malformed progress response: {}", e))
        })
    }

    async fn stop(&self, device: u32) -> OrchestratorResult<bool> {
        let handle = self.handle(device)?;
        let result = handle
            .rpc
            .call("stop", json!({}), self.config.rpc_timeout)
            .await?;
        Ok(result
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    fn is_alive(&self, device: u32) -> bool {
        self.workers
            .get(&device)
            .map(|h| h.rpc.is_alive())
            .unwrap_or(false)
    }
}
