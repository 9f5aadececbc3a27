use crate::filter::LevelFilter;
use crate::queue::BoundedQueue;
use crate::record::{LogEntry, Severity};
use crate::scope::LogContext;
use std::sync::Arc;

/// Explicit producer handle for code that threads a [`LogContext`] through
/// its call chain instead of relying on `tracing` spans.
///
/// Every method is synchronous, O(1) with respect to the queue and
/// infallible: filtered-out calls return immediately and a full queue
/// evicts its oldest entry.
#[derive(Clone)]
pub struct Logger {
    queue: Arc<BoundedQueue>,
    filter: Arc<LevelFilter>,
    category: Arc<str>,
}

impl Logger {
    pub fn new(queue: Arc<BoundedQueue>, filter: Arc<LevelFilter>, category: impl Into<String>) -> Self {
        let category: String = category.into();
        Self {
            queue,
            filter,
            category: Arc::from(category),
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn is_enabled(&self, level: Severity) -> bool {
        self.filter.enabled(&self.category, level)
    }

    pub fn log(&self, ctx: &LogContext, level: Severity, message: impl Into<String>) {
        self.log_entry(ctx, LogEntry::new(level, message));
    }

    /// Log with an attached error; its display chain becomes the exception
    /// text.
    pub fn log_error(&self, ctx: &LogContext, level: Severity, message: impl Into<String>, error: &dyn std::error::Error) {
        self.log_entry(ctx, LogEntry::new(level, message).with_exception(error_chain(error)));
    }

    pub fn information(&self, ctx: &LogContext, message: impl Into<String>) {
        self.log(ctx, Severity::Information, message);
    }

    pub fn warning(&self, ctx: &LogContext, message: impl Into<String>) {
        self.log(ctx, Severity::Warning, message);
    }

    pub fn error(&self, ctx: &LogContext, message: impl Into<String>) {
        self.log(ctx, Severity::Error, message);
    }

    fn log_entry(&self, ctx: &LogContext, mut entry: LogEntry) {
        if !self.is_enabled(entry.log_level) {
            return;
        }
        ctx.enrich(&mut entry);
        self.queue.enqueue(entry);
    }
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str("\n  caused by: ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{Scope, USER_ID_KEY};

    fn logger(queue: &Arc<BoundedQueue>, category: &str) -> Logger {
        Logger::new(Arc::clone(queue), Arc::new(LevelFilter::default()), category)
    }

    #[test]
    fn enqueues_enriched_entry() {
        let queue = Arc::new(BoundedQueue::new(16));
        let ctx = LogContext::new().with_scope(Scope::new().with(USER_ID_KEY, "u9"));

        logger(&queue, "orders").information(&ctx, "placed");

        let entries = queue.drain(16);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].user_id.as_deref(), Some("u9"));
        assert!(!entries[0].trace_id.is_empty());
    }

    #[test]
    fn filtered_calls_do_not_reach_queue() {
        let queue = Arc::new(BoundedQueue::new(16));
        logger(&queue, "orders").log(&LogContext::new(), Severity::Debug, "noise");
        logger(&queue, "hyper::client").information(&LogContext::new(), "noise");
        assert!(queue.is_empty());
    }

    #[test]
    fn logging_after_close_is_silent() {
        let queue = Arc::new(BoundedQueue::new(16));
        queue.close();
        logger(&queue, "orders").error(&LogContext::new(), "too late");
        assert_eq!(queue.rejected(), 1);
    }

    #[test]
    fn error_chain_includes_sources() {
        let queue = Arc::new(BoundedQueue::new(16));
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        logger(&queue, "orders").log_error(&LogContext::new(), Severity::Error, "write failed", &io);

        let entry = queue.drain(1).remove(0);
        assert_eq!(entry.exception.as_deref(), Some("disk full"));
    }
}
