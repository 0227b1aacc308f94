//! Cancellation and progress plumbing shared by the engines and the worker

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::error::{SheetError, SheetResult};

use super::controller::RunSummary;

/// Rows processed between cancellation checks and progress events
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Cooperative cancellation flag shared between the caller and the worker
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Messages flowing from the worker to whoever is watching the run
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A pipeline stage started (reading, grouping, saving...)
    Stage(String),
    /// Rows scanned so far out of `total`
    Rows { done: usize, total: usize },
    /// Terminal event; always the last one sent for a run
    Finished(RunSummary),
}

/// Sending half of the progress channel. A dropped receiver is not an error.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<Sender<ProgressEvent>>,
}

impl ProgressSink {
    pub fn new(tx: Sender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops every event
    pub fn discard() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn stage(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(stage = %message);
        self.send(ProgressEvent::Stage(message));
    }
}

/// What an engine needs to report progress and honor cancellation
#[derive(Debug, Clone)]
pub struct RunContext {
    pub cancel: CancelToken,
    pub progress: ProgressSink,
    pub batch_size: usize,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::detached()
    }
}

impl RunContext {
    pub fn new(cancel: CancelToken, progress: ProgressSink, batch_size: usize) -> Self {
        Self {
            cancel,
            progress,
            batch_size: batch_size.max(1),
        }
    }

    /// Context for direct library calls: never cancelled, no listener
    pub fn detached() -> Self {
        Self::new(CancelToken::new(), ProgressSink::discard(), DEFAULT_BATCH_SIZE)
    }

    /// Fail with `Cancelled` once the token has fired
    pub fn check_cancelled(&self) -> SheetResult<()> {
        if self.cancel.is_cancelled() {
            return Err(SheetError::Cancelled);
        }
        Ok(())
    }

    /// Called before scanning row `done`; on batch boundaries emits progress
    /// and checks for cancellation
    pub fn checkpoint(&self, done: usize, total: usize) -> SheetResult<()> {
        if done % self.batch_size == 0 {
            self.check_cancelled()?;
            if done > 0 {
                self.progress.send(ProgressEvent::Rows { done, total });
            }
        }
        Ok(())
    }

    /// Final progress event once a scan completes
    pub fn finish_scan(&self, total: usize) {
        self.progress.send(ProgressEvent::Rows { done: total, total });
    }
}
