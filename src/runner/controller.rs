//! Processing mode state machine
//!
//! `Idle → Running → {Completed, Failed, Cancelled} → Idle`. One run at a
//! time per controller; a start request while running is rejected with
//! [`SheetError::Busy`]. The whole pipeline (read, engine, materialize,
//! commit) runs on a single worker thread and reports through the
//! progress channel, with [`ProgressEvent::Finished`] as the last message.

use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use uuid::Uuid;

use crate::core::grouping::{group_by_date, GroupOptions};
use crate::core::lookup::{join, JoinOptions, LookupIndex};
use crate::error::{SheetError, SheetResult};
use crate::excel::naming::{ensure_not_input, validate_input};
use crate::excel::{
    detect_date_column, materializer_for, ExcelImporter, OutputMode, StyleConfig, StyleScope,
};

use super::context::{CancelToken, ProgressEvent, ProgressSink, RunContext, DEFAULT_BATCH_SIZE};

//==============================================================================
// Requests
//==============================================================================

/// Split the first sheet of `input` into one sheet per date
#[derive(Debug, Clone, PartialEq)]
pub struct GroupJob {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Date column; auto-detected from the header when `None`
    pub key_column: Option<String>,
    pub options: GroupOptions,
    /// Also copy the untouched source sheet into the output
    pub keep_original: bool,
}

/// Multi-value VLOOKUP of `primary` against `reference`
#[derive(Debug, Clone, PartialEq)]
pub struct LookupJob {
    pub primary: PathBuf,
    pub reference: PathBuf,
    pub output: PathBuf,
    /// Column of `primary` holding the (possibly multi-value) keys
    pub lookup_column: String,
    /// Key column of `reference`
    pub search_column: String,
    /// Value column of `reference`
    pub result_column: String,
    pub join: JoinOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    Group(GroupJob),
    Lookup(LookupJob),
}

impl Job {
    pub fn tool(&self) -> Tool {
        match self {
            Job::Group(_) => Tool::Group,
            Job::Lookup(_) => Tool::Lookup,
        }
    }
}

/// Everything a worker needs for one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub job: Job,
    pub mode: OutputMode,
    pub style: StyleConfig,
    pub batch_size: usize,
}

impl RunRequest {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            mode: OutputMode::default(),
            style: StyleConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

//==============================================================================
// Results
//==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Group,
    Lookup,
}

/// Terminal state of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed(String),
    Cancelled,
}

impl RunStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }
}

/// Final report of a run. Counters may be partial for cancelled or failed runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub tool: Tool,
    pub status: RunStatus,
    /// Set only when the run completed
    pub output: Option<PathBuf>,
    pub rows_scanned: usize,
    pub invalid_rows: usize,
    pub merged_rows: usize,
    pub groups: usize,
    pub matched: usize,
    pub not_found: usize,
    pub sheets: usize,
    pub elapsed_ms: u64,
}

impl RunSummary {
    fn new(run_id: &str, tool: Tool) -> Self {
        Self {
            run_id: run_id.to_string(),
            tool,
            status: RunStatus::Cancelled,
            output: None,
            rows_scanned: 0,
            invalid_rows: 0,
            merged_rows: 0,
            groups: 0,
            matched: 0,
            not_found: 0,
            sheets: 0,
            elapsed_ms: 0,
        }
    }
}

//==============================================================================
// Controller
//==============================================================================

/// Owns the `Running` flag. Clones share it.
#[derive(Debug, Clone, Default)]
pub struct RunController {
    running: Arc<AtomicBool>,
}

/// Clears the running flag when dropped, including during a worker panic
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl RunController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start a run on a background worker
    pub fn start(&self, request: RunRequest) -> SheetResult<RunHandle> {
        self.start_with(request, CancelToken::new())
    }

    /// Start a run that observes an existing cancel token
    pub fn start_with(&self, request: RunRequest, cancel: CancelToken) -> SheetResult<RunHandle> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SheetError::Busy);
        }
        let guard = RunningGuard(Arc::clone(&self.running));

        let run_id = Uuid::new_v4().to_string();
        let tool = request.job.tool();
        let (tx, rx) = channel();
        let ctx = RunContext::new(cancel.clone(), ProgressSink::new(tx), request.batch_size);

        let worker_id = run_id.clone();
        let worker = thread::Builder::new()
            .name(format!("sheetkit-{}", tool_label(tool)))
            .spawn(move || {
                let span = tracing::info_span!("run", run_id = %worker_id, tool = tool_label(tool));
                let _enter = span.enter();

                supervise(&worker_id, tool, &ctx, guard, || execute(&worker_id, &request, &ctx))
            })?;

        Ok(RunHandle {
            run_id,
            tool,
            cancel,
            events: rx,
            worker,
        })
    }
}

/// Run `work` to a summary, then release the flag and send `Finished`.
///
/// A panic inside `work` becomes a `Failed` summary, so `Finished` is sent
/// on every exit path.
fn supervise(
    run_id: &str,
    tool: Tool,
    ctx: &RunContext,
    guard: RunningGuard,
    work: impl FnOnce() -> RunSummary,
) -> RunSummary {
    let summary = panic::catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!(run_id = %run_id, %message, "worker panicked");
        let mut summary = RunSummary::new(run_id, tool);
        summary.status = RunStatus::Failed(format!("worker panicked: {message}"));
        summary
    });
    // Idle again before anyone sees Finished
    drop(guard);
    ctx.progress.send(ProgressEvent::Finished(summary.clone()));
    summary
}

fn tool_label(tool: Tool) -> &'static str {
    match tool {
        Tool::Group => "group",
        Tool::Lookup => "lookup",
    }
}

/// Caller's side of a running job
pub struct RunHandle {
    run_id: String,
    tool: Tool,
    cancel: CancelToken,
    events: Receiver<ProgressEvent>,
    worker: JoinHandle<RunSummary>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Ask the worker to stop at its next batch boundary
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Progress channel. Iterating it blocks until the worker exits.
    pub fn events(&self) -> &Receiver<ProgressEvent> {
        &self.events
    }

    /// Drain whatever is queued without blocking
    pub fn try_events(&self) -> Vec<ProgressEvent> {
        self.events.try_iter().collect()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the worker. A worker that died anyway is reported as `Failed`.
    pub fn join(self) -> RunSummary {
        let RunHandle {
            run_id, tool, worker, ..
        } = self;
        worker.join().unwrap_or_else(|_| {
            tracing::error!(run_id = %run_id, "worker panicked");
            let mut summary = RunSummary::new(&run_id, tool);
            summary.status = RunStatus::Failed("worker panicked".to_string());
            summary
        })
    }
}

//==============================================================================
// Pipeline
//==============================================================================

fn execute(run_id: &str, request: &RunRequest, ctx: &RunContext) -> RunSummary {
    let started = Instant::now();
    let mut summary = RunSummary::new(run_id, request.job.tool());

    let result = match &request.job {
        Job::Group(job) => run_group(job, request, ctx, &mut summary),
        Job::Lookup(job) => run_lookup(job, request, ctx, &mut summary),
    };

    match result {
        Ok(path) => {
            tracing::info!(output = %path.display(), "run completed");
            summary.status = RunStatus::Completed;
            summary.output = Some(path);
        }
        Err(e) if !e.is_fatal() => {
            tracing::info!("run cancelled, output discarded");
            summary.status = RunStatus::Cancelled;
        }
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            summary.status = RunStatus::Failed(e.to_string());
        }
    }
    summary.elapsed_ms = started.elapsed().as_millis() as u64;
    summary
}

fn run_group(
    job: &GroupJob,
    request: &RunRequest,
    ctx: &RunContext,
    summary: &mut RunSummary,
) -> SheetResult<PathBuf> {
    ctx.check_cancelled()?;
    ctx.progress.stage("validating input");
    validate_input(&job.input)?;
    ensure_not_input(&job.output, &[&job.input])?;

    ctx.progress.stage(format!("reading {}", job.input.display()));
    let source = ExcelImporter::new(&job.input).read_first_sheet()?;

    let key_column = match &job.key_column {
        Some(column) => column.clone(),
        None => detect_date_column(&source.table.header)
            .map(str::to_string)
            .ok_or_else(|| {
                SheetError::InvalidInput(format!(
                    "no date column detected in [{}]; pass one explicitly",
                    source.table.header.join(", ")
                ))
            })?,
    };

    ctx.progress.stage(format!("grouping by '{}'", key_column));
    let grouped = group_by_date(&source.table, &key_column, &job.options, ctx)?;
    summary.rows_scanned = grouped.rows_scanned;
    summary.invalid_rows = grouped.invalid_rows;
    summary.merged_rows = grouped.merged_rows;
    summary.groups = grouped.groups.len();
    if grouped.groups.is_empty() {
        return Err(SheetError::InvalidInput(format!(
            "no row has a valid date in column '{}'",
            key_column
        )));
    }

    ctx.progress.stage("writing sheets");
    let mut materializer = materializer_for(request.mode, &request.style);
    if job.keep_original {
        materializer.add_sheet(&source.name, &source.table, &StyleScope::None)?;
    }
    for group in &grouped.groups {
        ctx.check_cancelled()?;
        materializer.add_sheet(&group.sheet_name, &group.table, &StyleScope::All)?;
    }
    summary.sheets = materializer.sheet_count();

    ctx.check_cancelled()?;
    ctx.progress.stage(format!("saving {}", job.output.display()));
    materializer.commit(&job.output)?;
    Ok(job.output.clone())
}

fn run_lookup(
    job: &LookupJob,
    request: &RunRequest,
    ctx: &RunContext,
    summary: &mut RunSummary,
) -> SheetResult<PathBuf> {
    ctx.check_cancelled()?;
    ctx.progress.stage("validating input");
    validate_input(&job.primary)?;
    validate_input(&job.reference)?;
    ensure_not_input(&job.output, &[&job.primary, &job.reference])?;

    ctx.progress.stage(format!("reading {}", job.primary.display()));
    let primary = ExcelImporter::new(&job.primary).read_first_sheet()?;
    ctx.progress.stage(format!("reading {}", job.reference.display()));
    let reference = ExcelImporter::new(&job.reference).read_first_sheet()?;

    ctx.check_cancelled()?;
    ctx.progress.stage("building lookup index");
    let index = LookupIndex::build(&reference.table, &job.search_column, &job.result_column)?;
    tracing::debug!(keys = index.len(), "lookup index built");

    ctx.progress.stage(format!("looking up '{}'", job.lookup_column));
    let joined = join(&primary.table, &job.lookup_column, &index, &job.join, ctx)?;
    summary.rows_scanned = joined.rows_scanned;
    summary.matched = joined.counts.matched;
    summary.not_found = joined.counts.not_found;

    ctx.progress.stage("writing sheet");
    let mut materializer = materializer_for(request.mode, &request.style);
    let scope = StyleScope::Columns(vec![joined.result_column]);
    materializer.add_sheet(&primary.name, &joined.table, &scope)?;
    summary.sheets = materializer.sheet_count();

    ctx.check_cancelled()?;
    ctx.progress.stage(format!("saving {}", job.output.display()));
    materializer.commit(&job.output)?;
    Ok(job.output.clone())
}
