//! Task coordinator
//!
//! One concurrent state machine per submission. The coordinator splits the
//! request across GPU slots, dispatches a sub-task to each worker, polls
//! them for progress on a fixed tick, aggregates into the parent record, and
//! finalizes exactly once. All mutation of a task record happens on its own
//! driver loop, which is what enforces the monotonic-percentage and
//! exactly-once-terminal rules without cross-task locking.

use crate::args::{self, GenerationRequest};
use crate::bus::{ProgressBus, ProgressUpdate};
use crate::error::{is_retryable, OrchestratorError, OrchestratorResult};
use crate::scheduler::Scheduler;
use crate::task::{GpuShare, SharedTask, SubTask, TaskRecord, TaskStatus, TaskStore};
use crate::worker::WorkerApi;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Seeds are drawn from `[0, 2^31)` so they survive every downstream
/// integer representation.
const SEED_LIMIT: i64 = 1 << 31;

/// Accepted submission, echoed in the generate response
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub task_id: String,
    pub total_images: u32,
    pub gpus: Vec<GpuShare>,
}

/// Per-request orchestration over scheduler, workers, and the progress bus
pub struct TaskCoordinator {
    scheduler: Arc<Scheduler>,
    workers: Arc<dyn WorkerApi>,
    bus: Arc<ProgressBus>,
    store: Arc<TaskStore>,
    poll_interval: Duration,
    sub_task_timeout: Duration,
}

impl TaskCoordinator {
    pub fn new(
        scheduler: Arc<Scheduler>,
        workers: Arc<dyn WorkerApi>,
        bus: Arc<ProgressBus>,
        store: Arc<TaskStore>,
        poll_interval: Duration,
        sub_task_timeout: Duration,
    ) -> Self {
        Self {
            scheduler,
            workers,
            bus,
            store,
            poll_interval,
            sub_task_timeout,
        }
    }

    /// Task table, for snapshot reads
    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Accept a submission: validate, assign slots, resolve the seed, and
    /// hand the task to its driver loop. Returns once the task is running.
    pub async fn submit(
        self: &Arc<Self>,
        request: GenerationRequest,
    ) -> OrchestratorResult<SubmitOutcome> {
        // Reject a bad vector before touching any scheduler or worker state.
        args::resolve(&request)?;

        let total = request.image_number();
        let task_id = self.store.allocate_id();
        let mut record = TaskRecord::new(task_id.clone(), total);

        let assignments = self.scheduler.distribute(total);
        if assignments.is_empty() {
            let reason = "no GPU slots available".to_string();
            record.status = TaskStatus::Error;
            record.status_text = reason.clone();
            record.errors.push(reason.clone());
            record.terminal_published = true;
            self.store.insert(record);
            self.bus.publish(ProgressUpdate::new(
                task_id,
                0,
                reason.clone(),
                true,
                None,
                Vec::new(),
            ));
            return Err(OrchestratorError::NoResource(reason));
        }

        let base_seed = match (request.seed_random(), request.image_seed()) {
            (false, Some(seed)) => seed,
            _ => rand::thread_rng().gen_range(0..SEED_LIMIT),
        };

        for (index, assignment) in assignments.iter().enumerate() {
            self.scheduler.mark_busy(assignment.slot.device, true);
            record.sub_tasks.push(SubTask::new(
                &task_id,
                index,
                assignment.slot.device,
                assignment.image_count,
            ));
        }
        record.status = TaskStatus::Running;
        record.percentage = 5;
        record.status_text = format!("Distributing to {} GPU(s)", assignments.len());

        let gpus: Vec<GpuShare> = record
            .sub_tasks
            .iter()
            .map(|sub| GpuShare {
                device: sub.device,
                images: sub.image_count,
            })
            .collect();

        let task = self.store.insert(record);
        self.publish_progress(&task);

        let this = Arc::clone(self);
        let driver_task = Arc::clone(&task);
        tokio::spawn(async move {
            this.dispatch(&driver_task, &request, base_seed).await;
            this.poll_until_done(&driver_task).await;
            this.finalize(&driver_task);
        });

        let task_id = task.read().id.clone();
        tracing::info!(task_id = %task_id, total, gpus = gpus.len(), "task started");
        let outcome = Ok(SubmitOutcome {
            task_id,
            total_images: total,
            gpus,
        });
        outcome
    }

    /// Dispatch one generate call per sub-task, threading the seed so no two
    /// sub-tasks of one submission overlap: sub-task i starts at
    /// `base + Σ image counts of the sub-tasks before it`.
    async fn dispatch(&self, task: &SharedTask, request: &GenerationRequest, base_seed: i64) {
        let plan: Vec<(usize, u32, u32, String)> = task
            .read()
            .sub_tasks
            .iter()
            .map(|sub| (sub.index, sub.device, sub.image_count, sub.sub_id.clone()))
            .collect();

        let mut seed = base_seed;
        for (index, device, image_count, sub_id) in plan {
            // A cancel that lands mid-dispatch must not grow the fan-out.
            if task.read().cancel_requested {
                self.cancel_undispatched(task);
                break;
            }

            let sub_seed = seed;
            seed += image_count as i64;

            let mut vector = match args::resolve(request) {
                Ok(vector) => vector,
                Err(e) => {
                    let mut record = task.write();
                    record.sub_tasks[index].fail(e.to_string());
                    record.errors.push(e.to_string());
                    continue;
                }
            };
            args::apply_fan_out(&mut vector, image_count, sub_seed);

            match self.workers.generate(device, &sub_id, vector).await {
                Ok(()) => {
                    {
                        let mut record = task.write();
                        record.sub_tasks[index].accepted = true;
                        record.sub_tasks[index].deadline =
                            Some(Instant::now() + self.sub_task_timeout);
                    }
                    tracing::debug!(%sub_id, device, image_count, seed = sub_seed, "sub-task accepted");
                    // A cancel may have raced this acceptance and already
                    // issued its stops; re-check so this sub-task gets one.
                    if task.read().cancel_requested {
                        self.stop_open_sub_tasks(task).await;
                        self.cancel_undispatched(task);
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(%sub_id, device, error = %e, "generate refused");
                    {
                        let mut record = task.write();
                        let reason = format!("device {}: {}", device, e);
                        record.sub_tasks[index].fail(reason.clone());
                        record.errors.push(reason);
                    }
                    // A refused sibling invalidates the fan-out: stop the
                    // sub-tasks that were already accepted, same as a
                    // cancel, and dispatch nothing further.
                    self.stop_open_sub_tasks(task).await;
                    self.cancel_undispatched(task);
                    break;
                }
            }
        }
    }

    /// Mark every sub-task that never reached a worker as terminal so the
    /// polling loop does not wait on it. No stop is owed for these.
    fn cancel_undispatched(&self, task: &SharedTask) {
        let mut record = task.write();
        for sub in record
            .sub_tasks
            .iter_mut()
            .filter(|sub| !sub.accepted && !sub.finished)
        {
            sub.finished = true;
            sub.status_text = "canceled".to_string();
        }
    }

    /// Poll every open sub-task each tick until all of them terminate.
    /// Transient transport failures retry on the next tick; a worker exit or
    /// an exceeded wall-clock cap terminates the sub-task.
    async fn poll_until_done(&self, task: &SharedTask) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        while !task.read().all_sub_tasks_done() {
            interval.tick().await;

            let open: Vec<(usize, u32, String, Option<Instant>, bool)> = task
                .read()
                .sub_tasks
                .iter()
                .filter(|sub| !sub.finished)
                .map(|sub| {
                    (
                        sub.index,
                        sub.device,
                        sub.sub_id.clone(),
                        sub.deadline,
                        sub.stop_sent,
                    )
                })
                .collect();

            for (index, device, sub_id, deadline, stop_sent) in open {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    if !stop_sent {
                        task.write().sub_tasks[index].stop_sent = true;
                        if let Err(e) = self.workers.stop(device).await {
                            tracing::debug!(device, error = %e, "stop after timeout failed");
                        }
                    }
                    let mut record = task.write();
                    let reason = format!("device {}: sub-task exceeded its time cap", device);
                    record.sub_tasks[index].fail(reason.clone());
                    record.errors.push(reason);
                    continue;
                }

                if !self.workers.is_alive(device) {
                    let mut record = task.write();
                    let reason = format!("device {}: worker exited", device);
                    record.sub_tasks[index].fail(reason.clone());
                    record.errors.push(reason);
                    continue;
                }

                match self.workers.progress(device, &sub_id).await {
                    Ok(report) => task.write().observe(index, &report),
                    Err(OrchestratorError::WorkerExited(_)) => {
                        let mut record = task.write();
                        let reason = format!("device {}: worker exited", device);
                        record.sub_tasks[index].fail(reason.clone());
                        record.errors.push(reason);
                    }
                    Err(e) if is_retryable(&e) => {
                        tracing::debug!(%sub_id, device, error = %e, "progress poll failed, retrying next tick");
                    }
                    Err(e) => {
                        tracing::debug!(%sub_id, device, error = %e, "unexpected progress response, retrying next tick");
                    }
                }
            }

            self.publish_progress(task);
        }
    }

    /// Close out the task: fold results, choose the terminal state, release
    /// every assigned slot, and publish the single terminal update.
    fn finalize(&self, task: &SharedTask) {
        let update = {
            let mut record = task.write();
            if record.terminal_published {
                return;
            }
            record.terminal_published = true;

            record.results = record.collect_results();
            let produced = record.results.len();
            record.preview = None;
            record.status = if record.cancel_requested {
                TaskStatus::Canceled
            } else if produced > 0 {
                TaskStatus::Finished
            } else {
                TaskStatus::Error
            };
            match record.status {
                TaskStatus::Canceled => {
                    record.status_text =
                        format!("Canceled ({}/{} images)", produced, record.total_images);
                }
                TaskStatus::Finished => {
                    record.percentage = 100;
                    record.status_text =
                        format!("Finished ({}/{} images)", produced, record.total_images);
                }
                _ => {
                    record.percentage = 100;
                    record.status_text = record
                        .errors
                        .first()
                        .cloned()
                        .unwrap_or_else(|| format!("Finished (0/{} images)", record.total_images));
                }
            }

            for (device, _) in record.assignments() {
                self.scheduler.mark_busy(device, false);
            }

            tracing::info!(
                task_id = %record.id,
                status = ?record.status,
                produced,
                requested = record.total_images,
                "task finalized"
            );
            ProgressUpdate::new(
                record.id.clone(),
                record.percentage,
                record.status_text.clone(),
                true,
                None,
                record.results.clone(),
            )
        };
        self.bus.publish(update);
    }

    /// Publish a non-terminal aggregate update for the task
    fn publish_progress(&self, task: &SharedTask) {
        let update = {
            let record = task.read();
            if record.terminal_published {
                return;
            }
            ProgressUpdate::new(
                record.id.clone(),
                record.percentage,
                record.status_text.clone(),
                false,
                record.preview.clone(),
                record.results.clone(),
            )
        };
        self.bus.publish(update);
    }

    /// Issue at most one stop per worker that still owns an open, accepted
    /// sub-task of this task. Idempotent: repeated calls find `stop_sent`
    /// already set and do nothing.
    async fn stop_open_sub_tasks(&self, task: &SharedTask) {
        let targets: Vec<u32> = {
            let mut record = task.write();
            record
                .sub_tasks
                .iter_mut()
                .filter(|sub| !sub.finished && sub.accepted && !sub.stop_sent)
                .map(|sub| {
                    sub.stop_sent = true;
                    sub.device
                })
                .collect()
        };
        for device in targets {
            match self.workers.stop(device).await {
                Ok(success) => tracing::debug!(device, success, "stop requested"),
                Err(e) => tracing::warn!(device, error = %e, "stop request failed"),
            }
        }
    }

    /// Cancel one task, best-effort. Returns false when the task was already
    /// terminal (nothing to do).
    pub async fn cancel(&self, task: &SharedTask) -> bool {
        {
            let mut record = task.write();
            if record.status.is_terminal() || record.terminal_published {
                return false;
            }
            record.cancel_requested = true;
        }
        self.stop_open_sub_tasks(task).await;
        true
    }

    /// Cancel every in-flight task. Returns how many tasks a cancel was
    /// requested for.
    pub async fn stop_all(&self) -> usize {
        let tasks = self.store.in_flight();
        let mut requested = 0;
        for task in &tasks {
            if self.cancel(task).await {
                requested += 1;
            }
        }
        tracing::info!(requested, "global stop requested");
        requested
    }
}
