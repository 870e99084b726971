//! The run service — owns the FIFO queue, the single worker, the registry,
//! and the ledger gate. An explicit, injectable object with start/shutdown
//! lifecycle; tests instantiate isolated copies.

use std::process::Stdio;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use reelpilot_core::{ReelPilotError, Result, RunRequest, RunStatus};
use reelpilot_ledger::SpendLedger;

use crate::registry::{RunRecord, RunRegistry};
use crate::runlog::{RunLog, RunLogEntry};

/// One dequeued unit of work.
struct QueuedRun {
    id: String,
    account: String,
    program: String,
    args: Vec<String>,
    dry_run: bool,
}

#[derive(Clone)]
struct WorkerCtx {
    registry: Arc<RunRegistry>,
    ledger: Arc<SpendLedger>,
    run_log: Arc<RunLog>,
    cost_estimate: f64,
}

/// Queue + worker + registry behind one handle.
///
/// `submit` never blocks its caller; the worker caps concurrently-running
/// generation subprocesses at 1. `submit_detached` runs outside both the
/// queue and the ledger gate: same tracking, no serialization.
pub struct RunService {
    registry: Arc<RunRegistry>,
    ledger: Arc<SpendLedger>,
    run_log: Arc<RunLog>,
    pipeline_bin: String,
    cost_estimate: f64,
    tx: Mutex<Option<UnboundedSender<QueuedRun>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RunService {
    pub fn new(
        pipeline_bin: String,
        cost_estimate: f64,
        registry: Arc<RunRegistry>,
        ledger: Arc<SpendLedger>,
        run_log: Arc<RunLog>,
    ) -> Self {
        Self {
            registry,
            ledger,
            run_log,
            pipeline_bin,
            cost_estimate,
            tx: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> Arc<RunRegistry> {
        self.registry.clone()
    }

    /// Spawn the single background worker. Calling twice is a no-op.
    pub fn start(&self) {
        let mut tx_slot = self.tx.lock().unwrap();
        if tx_slot.is_some() {
            return;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *tx_slot = Some(tx);
        let ctx = WorkerCtx {
            registry: self.registry.clone(),
            ledger: self.ledger.clone(),
            run_log: self.run_log.clone(),
            cost_estimate: self.cost_estimate,
        };
        *self.worker.lock().unwrap() = Some(tokio::spawn(worker_loop(rx, ctx)));
    }

    /// Close the queue and wait for the worker to drain it.
    pub async fn shutdown(&self) {
        let tx = self.tx.lock().unwrap().take();
        drop(tx);
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        tracing::info!("Run service shut down");
    }

    /// Queue a pipeline run for sequential execution. Returns immediately
    /// with the Queued record snapshot.
    pub fn submit(&self, request: &RunRequest) -> Result<RunRecord> {
        let id = self.registry.create(&request.account, false);
        let snapshot = self
            .registry
            .get(&id)
            .ok_or_else(|| ReelPilotError::UnknownRun(id.clone()))?;
        if let Err(e) = self.enqueue(QueuedRun {
            id: id.clone(),
            account: request.account.clone(),
            program: self.pipeline_bin.clone(),
            args: build_args(request),
            dry_run: request.dry_run,
        }) {
            self.registry
                .append_output(&id, &format!("not accepted: {e}\n"));
            self.registry.set_status(&id, RunStatus::Failed);
            return Err(e);
        }
        tracing::info!("Queued run {id} for {}", request.account);
        Ok(snapshot)
    }

    fn enqueue(&self, run: QueuedRun) -> Result<()> {
        let tx = self.tx.lock().unwrap();
        let sender = tx
            .as_ref()
            .ok_or_else(|| ReelPilotError::Process("run queue not started".into()))?;
        sender
            .send(run)
            .map_err(|_| ReelPilotError::Process("run queue closed".into()))
    }

    /// Fire-and-forget: a dedicated task per request, tracked in the same
    /// registry but with no cross-run serialization and no ledger gate.
    pub fn submit_detached(&self, request: &RunRequest) -> Result<RunRecord> {
        let id = self.registry.create(&request.account, true);
        let snapshot = self
            .registry
            .get(&id)
            .ok_or_else(|| ReelPilotError::UnknownRun(id.clone()))?;
        let registry = self.registry.clone();
        let run_log = self.run_log.clone();
        let program = self.pipeline_bin.clone();
        let args = build_args(request);
        let account = request.account.clone();
        tracing::info!("Spawning detached run {id} for {account}");
        tokio::spawn(async move {
            registry.set_status(&id, RunStatus::Running);
            let status = run_subprocess(&registry, &id, &program, &args).await;
            registry.set_status(&id, status);
            log_outcome(&run_log, &account, &id, status);
        });
        Ok(snapshot)
    }
}

/// Argument vector for the pipeline executable, derived from request flags.
fn build_args(request: &RunRequest) -> Vec<String> {
    let mut args = vec!["--account".to_string(), request.account.clone()];
    if request.dry_run {
        args.push("--dry-run".into());
    }
    if request.skip_upload {
        args.push("--no-upload".into());
    }
    if request.skip_secondary {
        args.push("--no-reaction".into());
    }
    if let Some(text) = &request.hook_text {
        args.push("--hook-text".into());
        args.push(text.clone());
    }
    if let Some(text) = &request.reaction_text {
        args.push("--reaction-text".into());
        args.push(text.clone());
    }
    args
}

/// Process queued runs one at a time, in arrival order, each to full
/// subprocess exit. Panics are caught per run so one bad request never
/// kills the queue.
async fn worker_loop(mut rx: UnboundedReceiver<QueuedRun>, ctx: WorkerCtx) {
    tracing::info!("Run worker started");
    while let Some(run) = rx.recv().await {
        let id = run.id.clone();
        let account = run.account.clone();
        if let Err(e) = tokio::spawn(execute_queued(ctx.clone(), run)).await {
            tracing::error!("Run {id} execution panicked: {e}");
            ctx.registry
                .append_output(&id, &format!("internal error: {e}\n"));
            ctx.registry.set_status(&id, RunStatus::Failed);
            log_outcome(&ctx.run_log, &account, &id, RunStatus::Failed);
        }
    }
    tracing::info!("Run worker stopped");
}

async fn execute_queued(ctx: WorkerCtx, run: QueuedRun) {
    // Admission control — consult the ledger right before the costly step.
    if !run.dry_run && !ctx.ledger.admit(ctx.cost_estimate) {
        let spent = ctx.ledger.spent_today();
        tracing::warn!(
            "Run {} capped out: ${:.2} spent of ${:.2} cap",
            run.id,
            spent,
            ctx.ledger.cap()
        );
        ctx.registry.append_output(
            &run.id,
            &format!(
                "daily spend cap reached (${:.2} spent, ${:.2} cap)\n",
                spent,
                ctx.ledger.cap()
            ),
        );
        ctx.registry.set_status(&run.id, RunStatus::Skipped);
        log_outcome(&ctx.run_log, &run.account, &run.id, RunStatus::Skipped);
        return;
    }

    ctx.registry.set_status(&run.id, RunStatus::Running);
    let status = run_subprocess(&ctx.registry, &run.id, &run.program, &run.args).await;
    if status == RunStatus::Completed && !run.dry_run {
        // Record what the run cost right after it finishes
        if let Err(e) = ctx.ledger.record(ctx.cost_estimate) {
            tracing::warn!("Failed to record spend for run {}: {e}", run.id);
        }
    }
    ctx.registry.set_status(&run.id, status);
    log_outcome(&ctx.run_log, &run.account, &run.id, status);
}

/// Launch the pipeline and stream combined stdout+stderr into the record
/// as it arrives. Returns Completed on exit 0, Failed otherwise; launch
/// errors are captured into the output, never propagated.
async fn run_subprocess(
    registry: &Arc<RunRegistry>,
    id: &str,
    program: &str,
    args: &[String],
) -> RunStatus {
    let mut child = match tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            registry.append_output(id, &format!("failed to launch {program}: {e}\n"));
            return RunStatus::Failed;
        }
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (wait, _, _) = tokio::join!(
        child.wait(),
        stream_output(stdout, registry.clone(), id.to_string()),
        stream_output(stderr, registry.clone(), id.to_string()),
    );

    match wait {
        Ok(status) if status.success() => RunStatus::Completed,
        Ok(status) => {
            registry.append_output(id, &format!("process exited with {status}\n"));
            RunStatus::Failed
        }
        Err(e) => {
            registry.append_output(id, &format!("failed to wait on {program}: {e}\n"));
            RunStatus::Failed
        }
    }
}

async fn stream_output<R>(reader: Option<R>, registry: Arc<RunRegistry>, id: String)
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        registry.append_output(&id, &format!("{line}\n"));
    }
}

fn log_outcome(run_log: &RunLog, account: &str, run_id: &str, status: RunStatus) {
    let entry = RunLogEntry {
        timestamp: Utc::now(),
        account: account.to_string(),
        run_id: run_id.to_string(),
        status,
    };
    if let Err(e) = run_log.append(&entry) {
        tracing::warn!("Failed to append run log: {e}");
    }
}
