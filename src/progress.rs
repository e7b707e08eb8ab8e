// src/progress.rs
/// Lightweight progress reporting used by the page-fetch pool.
/// Frontends implement this to surface status; the CLI logs through tracing.
pub trait Progress {
    /// Called at the start with the total number of items (if known).
    fn begin(&mut self, _total: usize) {}

    /// Free-form status line for human eyes.
    fn log(&mut self, _msg: &str) {}

    /// One unit of work (a page, a profile) was merged.
    fn item_done(&mut self, _label: &str) {}

    /// One unit of work failed after its retries.
    fn item_failed(&mut self, _label: &str, _reason: &str) {}

    /// Called at the end, successful or not.
    fn finish(&mut self) {}
}

/// A no-op progress sink.
pub struct NullProgress;
impl Progress for NullProgress {}

/// Reports through `tracing`, tagged with the task name.
pub struct LogProgress {
    task: String,
    done: usize,
    failed: usize,
    total: usize,
}

impl LogProgress {
    pub fn new(task: &str) -> Self {
        Self { task: s!(task), done: 0, failed: 0, total: 0 }
    }
}

impl Progress for LogProgress {
    fn begin(&mut self, total: usize) {
        self.total = total;
        tracing::info!(task = %self.task, total, "starting");
    }
    fn log(&mut self, msg: &str) {
        tracing::info!(task = %self.task, "{msg}");
    }
    fn item_done(&mut self, label: &str) {
        self.done += 1;
        tracing::debug!(task = %self.task, item = label, done = self.done, total = self.total, "fetched");
    }
    fn item_failed(&mut self, label: &str, reason: &str) {
        self.failed += 1;
        tracing::warn!(task = %self.task, item = label, reason, "failed");
    }
    fn finish(&mut self) {
        tracing::info!(task = %self.task, done = self.done, failed = self.failed, total = self.total, "finished");
    }
}
