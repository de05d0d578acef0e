//! Shared test harness: a scripted worker and a wired coordinator stack

#![allow(dead_code)]

use async_trait::async_trait;
use gridgen::bus::{ProgressBus, ProgressUpdate};
use gridgen::config::{GpuConfig, GpuDeviceConfig};
use gridgen::coordinator::TaskCoordinator;
use gridgen::error::{OrchestratorError, OrchestratorResult};
use gridgen::scheduler::Scheduler;
use gridgen::task::TaskStore;
use gridgen::worker::{ProgressReport, WorkerApi};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const POLL: Duration = Duration::from_millis(10);
pub const SUB_TASK_CAP: Duration = Duration::from_secs(5);

pub fn report(percentage: i64, text: &str) -> ProgressReport {
    ProgressReport {
        percentage,
        status_text: text.to_string(),
        ..Default::default()
    }
}

pub fn finished_report(percentage: i64, results: &[&str]) -> ProgressReport {
    ProgressReport {
        percentage,
        finished: true,
        results: results.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

pub fn failed_report(percentage: i64, error: &str) -> ProgressReport {
    ProgressReport {
        percentage,
        finished: true,
        error: Some(error.to_string()),
        ..Default::default()
    }
}

/// Scripted worker: each progress poll pops the device's next frame, the
/// final frame repeats. Stop swaps the script for a canceled frame.
#[derive(Default)]
pub struct MockWorker {
    scripts: Mutex<HashMap<u32, VecDeque<ProgressReport>>>,
    generate_calls: Mutex<Vec<(u32, String, Vec<Value>)>>,
    stop_calls: Mutex<Vec<u32>>,
    refuse_generate: Mutex<HashSet<u32>>,
    generate_delays: Mutex<HashMap<u32, Duration>>,
    dead: Mutex<HashSet<u32>>,
}

impl MockWorker {
    pub fn script(&self, device: u32, frames: Vec<ProgressReport>) {
        self.scripts.lock().insert(device, frames.into());
    }

    pub fn refuse(&self, device: u32) {
        self.refuse_generate.lock().insert(device);
    }

    /// Make the device's generate acceptance take this long
    pub fn delay_generate(&self, device: u32, delay: Duration) {
        self.generate_delays.lock().insert(device, delay);
    }

    pub fn kill(&self, device: u32) {
        self.dead.lock().insert(device);
    }

    pub fn generate_calls(&self) -> Vec<(u32, String, Vec<Value>)> {
        self.generate_calls.lock().clone()
    }

    pub fn stop_calls(&self) -> Vec<u32> {
        self.stop_calls.lock().clone()
    }
}

#[async_trait]
impl WorkerApi for MockWorker {
    async fn generate(
        &self,
        device: u32,
        task_id: &str,
        args: Vec<Value>,
    ) -> OrchestratorResult<()> {
        let delay = self.generate_delays.lock().get(&device).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.dead.lock().contains(&device) {
            return Err(OrchestratorError::WorkerExited(device));
        }
        if self.refuse_generate.lock().contains(&device) {
            return Err(OrchestratorError::Inference("queue rejected".to_string()));
        }
        self.generate_calls
            .lock()
            .push((device, task_id.to_string(), args));
        Ok(())
    }

    async fn progress(&self, device: u32, _task_id: &str) -> OrchestratorResult<ProgressReport> {
        if self.dead.lock().contains(&device) {
            return Err(OrchestratorError::WorkerExited(device));
        }
        let mut scripts = self.scripts.lock();
        let frames = scripts
            .get_mut(&device)
            .ok_or_else(|| OrchestratorError::RpcTransport("no script".to_string()))?;
        match frames.len() {
            0 => Ok(finished_report(100, &[])),
            1 => Ok(frames[0].clone()),
            _ => Ok(frames.pop_front().unwrap_or_default()),
        }
    }

    async fn stop(&self, device: u32) -> OrchestratorResult<bool> {
        self.stop_calls.lock().push(device);
        let mut canceled = report(0, "canceled");
        canceled.finished = true;
        self.scripts
            .lock()
            .insert(device, VecDeque::from([canceled]));
        Ok(true)
    }

    fn is_alive(&self, device: u32) -> bool {
        !self.dead.lock().contains(&device)
    }
}

pub struct Harness {
    pub coordinator: Arc<TaskCoordinator>,
    pub scheduler: Arc<Scheduler>,
    pub worker: Arc<MockWorker>,
    pub bus: Arc<ProgressBus>,
}

pub fn gpu_config(weights: &[u32]) -> GpuConfig {
    GpuConfig {
        enabled: true,
        distribute: true,
        gpus: weights
            .iter()
            .enumerate()
            .map(|(i, w)| GpuDeviceConfig {
                device: i as u32,
                name: None,
                weight: *w,
            })
            .collect(),
    }
}

pub fn harness(weights: &[u32]) -> Harness {
    harness_with_cap(weights, SUB_TASK_CAP)
}

pub fn harness_with_cap(weights: &[u32], sub_task_cap: Duration) -> Harness {
    let scheduler = Arc::new(Scheduler::new(&gpu_config(weights), 7865));
    let worker = Arc::new(MockWorker::default());
    let bus = Arc::new(ProgressBus::new());
    let coordinator = Arc::new(TaskCoordinator::new(
        Arc::clone(&scheduler),
        Arc::clone(&worker) as Arc<dyn WorkerApi>,
        Arc::clone(&bus),
        Arc::new(TaskStore::new()),
        POLL,
        sub_task_cap,
    ));
    Harness {
        coordinator,
        scheduler,
        worker,
        bus,
    }
}

/// Receive updates until the terminal one arrives; returns everything seen.
pub async fn collect_until_terminal(
    rx: &mut mpsc::Receiver<ProgressUpdate>,
    task_id: &str,
) -> Vec<ProgressUpdate> {
    let mut seen = Vec::new();
    loop {
        let update = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a progress update")
            .expect("progress bus closed");
        if update.task_id != task_id {
            continue;
        }
        let terminal = update.finished;
        seen.push(update);
        if terminal {
            return seen;
        }
    }
}
