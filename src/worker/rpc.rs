//! Line-delimited JSON-RPC 2.0 client over a worker's stdio
//!
//! One writer, one reader. Requests are serialized to the child's stdin
//! behind an async mutex; a single reader task drains stdout, routing lines
//! that carry a numeric `id` to the matching pending call and forwarding
//! everything else as worker log output. stderr is forwarded line by line.
//!
//! Process exit is observed as stdout EOF: every outstanding call completes
//! with a worker-exited error, and all later calls fail fast.

use crate::error::{OrchestratorError, OrchestratorResult};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::{oneshot, watch, Mutex};

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

type PendingMap = Arc<DashMap<u64, oneshot::Sender<OrchestratorResult<Value>>>>;

/// JSON-RPC client bound to one worker process
pub struct RpcClient {
    device: u32,
    stdin: Mutex<ChildStdin>,
    pending: PendingMap,
    next_id: AtomicU64,
    alive: Arc<AtomicBool>,
    closed_rx: watch::Receiver<bool>,
}

impl RpcClient {
    /// Take ownership of the child's stdio streams and start the reader
    /// tasks.
    pub fn new(device: u32, stdin: ChildStdin, stdout: ChildStdout, stderr: ChildStderr) -> Self {
        let pending: PendingMap = Arc::new(DashMap::new());
        let alive = Arc::new(AtomicBool::new(true));
        let (closed_tx, closed_rx) = watch::channel(false);

        tokio::spawn(read_stdout(
            device,
            stdout,
            Arc::clone(&pending),
            Arc::clone(&alive),
            closed_tx,
        ));
        tokio::spawn(read_stderr(device, stderr));

        Self {
            device,
            stdin: Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(0),
            alive,
            closed_rx,
        }
    }

    /// Whether the worker process is still attached
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Resolve once the worker's stdout closes (process exit)
    pub async fn wait_closed(&self) {
        let mut rx = self.closed_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Issue a request and await its response within the timeout.
    ///
    /// A timeout abandons the pending entry and is reported as a transport
    /// error; a worker exit fails the call immediately; a JSON-RPC `error`
    /// response surfaces the worker's message.
    pub async fn call(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> OrchestratorResult<Value> {
        if !self.is_alive() {
            return Err(OrchestratorError::WorkerExited(self.device));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        let mut line = serde_json::to_vec(&request)
            .map_err(|e| OrchestratorError::Internal(format!("encode RPC request: {}", e)))?;
        line.push(b'\n');

        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = stdin.write_all(&line).await {
                self.pending.remove(&id);
                tracing::warn!(device = self.device, error = %e, "worker stdin write failed");
                return Err(OrchestratorError::WorkerExited(self.device));
            }
            if let Err(e) = stdin.flush().await {
                self.pending.remove(&id);
                tracing::warn!(device = self.device, error = %e, "worker stdin flush failed");
                return Err(OrchestratorError::WorkerExited(self.device));
            }
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(OrchestratorError::WorkerExited(self.device)),
            Err(_) => {
                self.pending.remove(&id);
                Err(OrchestratorError::RpcTransport(format!(
                    "{} timed out after {:?} on device {}",
                    method, timeout, self.device
                )))
            }
        }
    }
}

/// Drain the worker's stdout, routing responses and forwarding logs.
async fn read_stdout(
    device: u32,
    stdout: ChildStdout,
    pending: PendingMap,
    alive: Arc<AtomicBool>,
    closed_tx: watch::Sender<bool>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => dispatch_line(device, &line, &pending),
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(device, error = %e, "worker stdout read error");
                break;
            }
        }
    }

    alive.store(false, Ordering::Release);
    let outstanding: Vec<u64> = pending.iter().map(|entry| *entry.key()).collect();
    for id in outstanding {
        if let Some((_, tx)) = pending.remove(&id) {
            let _ = tx.send(Err(OrchestratorError::WorkerExited(device)));
        }
    }
    let _ = closed_tx.send(true);
    tracing::info!(device, "worker stdout closed");
}

/// Route one stdout line. Lines that are not JSON objects, or that lack a
/// numeric `id`, are worker log output.
fn dispatch_line(device: u32, line: &str, pending: &PendingMap) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }

    let parsed: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(_) => {
            tracing::info!(device, "worker: {}", trimmed);
            return;
        }
    };

    let id = match parsed.get("id").and_then(Value::as_u64) {
        Some(id) => id,
        None => {
            tracing::info!(device, "worker: {}", trimmed);
            return;
        }
    };

    let Some((_, tx)) = pending.remove(&id) else {
        tracing::debug!(device, id, "response for unknown or abandoned call");
        return;
    };

    let outcome = if let Some(error) = parsed.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unspecified worker error")
            .to_string();
        Err(OrchestratorError::Inference(message))
    } else if let Some(result) = parsed.get("result") {
        Ok(result.clone())
    } else {
        Err(OrchestratorError::RpcTransport(format!(
            "response {} carries neither result nor error",
            id
        )))
    };
    let _ = tx.send(outcome);
}

async fn read_stderr(device: u32, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if !line.trim().is_empty() {
            tracing::warn!(device, "worker stderr: {}", line);
        }
    }
}
