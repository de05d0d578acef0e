//! Task and sub-task records
//!
//! A task is created on submission, mutated only by its coordinator loop,
//! retained in memory, and never persisted. Readers take snapshots. One
//! sub-task exists per GPU assignment; its `sub_id` is the handle the worker
//! knows the work by.

use crate::worker::ProgressReport;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, not yet dispatched
    Pending,
    /// Sub-tasks dispatched, polling in progress
    Running,
    /// Terminated with at least one produced image
    Finished,
    /// Terminated with nothing produced
    Error,
    /// Terminated by a cancel request
    Canceled,
}

impl TaskStatus {
    /// Whether the state is terminal
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Finished | TaskStatus::Error | TaskStatus::Canceled
        )
    }
}

/// One GPU's share of a task
#[derive(Debug)]
pub struct SubTask {
    /// Position in the assignment list
    pub index: usize,
    /// Device the sub-task was assigned to
    pub device: u32,
    /// Images assigned to this sub-task
    pub image_count: u32,
    /// Worker-facing handle, `"{task_id}_{index}"`
    pub sub_id: String,
    /// Latest observed percentage
    pub percentage: i64,
    /// Latest observed status text
    pub status_text: String,
    /// Latest observed preview
    pub preview: Option<String>,
    /// Output paths reported so far
    pub results: Vec<String>,
    /// Whether the sub-task reached a terminal state
    pub finished: bool,
    /// Failure reason, when it failed
    pub error: Option<String>,
    /// Whether the worker accepted the generate call
    pub accepted: bool,
    /// Whether a stop RPC was already issued for this sub-task
    pub stop_sent: bool,
    /// Wall-clock deadline, armed at generate acceptance
    pub deadline: Option<Instant>,
}

impl SubTask {
    pub fn new(task_id: &str, index: usize, device: u32, image_count: u32) -> Self {
        Self {
            index,
            device,
            image_count,
            sub_id: format!("{}_{}", task_id, index),
            percentage: 0,
            status_text: String::new(),
            preview: None,
            results: Vec::new(),
            finished: false,
            error: None,
            accepted: false,
            stop_sent: false,
            deadline: None,
        }
    }

    /// Mark terminal with a failure reason
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.finished = true;
        self.error = Some(reason.into());
    }
}

/// In-memory task record, exclusively mutated by its coordinator loop
#[derive(Debug)]
pub struct TaskRecord {
    pub id: String,
    pub total_images: u32,
    pub created_at: DateTime<Utc>,
    pub status: TaskStatus,
    pub percentage: i64,
    pub status_text: String,
    pub preview: Option<String>,
    pub results: Vec<String>,
    pub errors: Vec<String>,
    pub sub_tasks: Vec<SubTask>,
    pub cancel_requested: bool,
    pub terminal_published: bool,
}

impl TaskRecord {
    pub fn new(id: String, total_images: u32) -> Self {
        Self {
            id,
            total_images,
            created_at: Utc::now(),
            status: TaskStatus::Pending,
            percentage: 0,
            status_text: String::new(),
            preview: None,
            results: Vec::new(),
            errors: Vec::new(),
            sub_tasks: Vec::new(),
            cancel_requested: false,
            terminal_published: false,
        }
    }

    /// Fold one progress frame into the record. The parent percentage is the
    /// monotonic maximum of everything observed so far; status text adopts
    /// the latest non-empty report; preview the latest non-null.
    pub fn observe(&mut self, index: usize, report: &ProgressReport) {
        let Some(sub) = self.sub_tasks.get_mut(index) else {
            return;
        };
        sub.percentage = report.percentage.clamp(0, 100);
        if !report.status_text.is_empty() {
            sub.status_text = report.status_text.clone();
            self.status_text = report.status_text.clone();
        }
        if let Some(preview) = &report.preview {
            sub.preview = Some(preview.clone());
            self.preview = Some(preview.clone());
        }
        sub.results = report.results.clone();
        if let Some(error) = report.error.as_deref().filter(|e| !e.is_empty()) {
            if sub.error.is_none() {
                sub.error = Some(error.to_string());
                self.errors.push(error.to_string());
            }
        }
        if report.finished {
            sub.finished = true;
        }
        self.percentage = self.percentage.max(sub.percentage);
    }

    /// Whether every sub-task reached a terminal state
    pub fn all_sub_tasks_done(&self) -> bool {
        self.sub_tasks.iter().all(|sub| sub.finished)
    }

    /// Results of successful sub-tasks, concatenated in assignment order.
    /// Canceled sub-tasks count as successful for whatever they produced;
    /// failed ones do not contribute.
    pub fn collect_results(&self) -> Vec<String> {
        self.sub_tasks
            .iter()
            .filter(|sub| sub.finished && sub.error.is_none())
            .flat_map(|sub| sub.results.iter().cloned())
            .collect()
    }

    /// Devices of the assignment list, with their image counts
    pub fn assignments(&self) -> Vec<(u32, u32)> {
        self.sub_tasks
            .iter()
            .map(|sub| (sub.device, sub.image_count))
            .collect()
    }
}

/// GPU share as exposed in snapshots and the generate response
#[derive(Debug, Clone, Serialize)]
pub struct GpuShare {
    pub device: u32,
    pub images: u32,
}

/// Read-only view of a task, safe to hand to the HTTP layer
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub status: TaskStatus,
    pub percentage: i64,
    #[serde(rename = "statusText")]
    pub status_text: String,
    pub preview: Option<String>,
    pub results: Vec<String>,
    pub total_images: u32,
    pub created_at: DateTime<Utc>,
    pub gpus: Vec<GpuShare>,
    pub errors: Vec<String>,
}

impl TaskSnapshot {
    pub fn of(record: &TaskRecord) -> Self {
        Self {
            task_id: record.id.clone(),
            status: record.status,
            percentage: record.percentage,
            status_text: record.status_text.clone(),
            preview: record.preview.clone(),
            results: record.results.clone(),
            total_images: record.total_images,
            created_at: record.created_at,
            gpus: record
                .sub_tasks
                .iter()
                .map(|sub| GpuShare {
                    device: sub.device,
                    images: sub.image_count,
                })
                .collect(),
            errors: record.errors.clone(),
        }
    }
}

/// Shared handle to a task record
pub type SharedTask = Arc<RwLock<TaskRecord>>;

/// In-memory task table. Records are mutated by their coordinator loop only;
/// everyone else snapshots.
pub struct TaskStore {
    tasks: DashMap<String, SharedTask>,
    next_seq: AtomicU64,
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Allocate a process-unique, monotonically increasing task id
    pub fn allocate_id(&self) -> String {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", Utc::now().timestamp_millis(), seq)
    }

    /// Insert a fresh record and return its shared handle
    pub fn insert(&self, record: TaskRecord) -> SharedTask {
        let id = record.id.clone();
        let shared: SharedTask = Arc::new(RwLock::new(record));
        self.tasks.insert(id, Arc::clone(&shared));
        shared
    }

    pub fn get(&self, id: &str) -> Option<SharedTask> {
        self.tasks.get(id).map(|entry| Arc::clone(&entry))
    }

    /// Snapshot a task for the HTTP layer
    pub fn snapshot(&self, id: &str) -> Option<TaskSnapshot> {
        self.get(id).map(|task| TaskSnapshot::of(&task.read()))
    }

    /// Handles of every task not yet terminal
    pub fn in_flight(&self) -> Vec<SharedTask> {
        self.tasks
            .iter()
            .filter(|entry| !entry.value().read().status.is_terminal())
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}
