use crate::filter::LevelFilter;
use crate::queue::BoundedQueue;
use crate::record::{LogEntry, Severity};
use crate::scope::{apply_scope_fields, merge_scopes, Scope};
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Supplies the ambient distributed-trace id for the current call, if any
/// (for example the id of an active OpenTelemetry span).
pub type TraceIdSource = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// `tracing_subscriber` layer that turns events into [`LogEntry`]s and
/// hands them to the shipping queue.
///
/// Span fields act as scopes: the fields of every span in the event's
/// span stack, root first, are merged into the entry, followed by the
/// event's own fields. `on_event` never blocks on I/O; when the queue is
/// full its oldest entry is evicted.
#[derive(Clone)]
pub struct ShipperLayer {
    queue: Arc<BoundedQueue>,
    filter: Arc<LevelFilter>,
    trace_id_source: Option<TraceIdSource>,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Events that passed the filter and were handed to the queue.
    pub enqueued_events: Arc<AtomicU64>,
}

/// Scope stored in a span's extensions.
#[derive(Debug, Clone, Default)]
struct SpanScope(Scope);

impl ShipperLayer {
    pub fn new(queue: Arc<BoundedQueue>, filter: Arc<LevelFilter>) -> Self {
        Self {
            queue,
            filter,
            trace_id_source: None,
            total_events: Arc::new(AtomicU64::new(0)),
            enqueued_events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Use `source` to look up the ambient distributed-trace id. It takes
    /// precedence over any `TraceId` span field.
    pub fn with_trace_id_source<F>(mut self, source: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        self.trace_id_source = Some(Arc::new(source));
        self
    }
}

impl<S> Layer<S> for ShipperLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };

        let mut scope = Scope::new();
        attrs.record(&mut ScopeVisitor { scope: &mut scope });
        span.extensions_mut().insert(SpanScope(scope));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };

        let mut extensions = span.extensions_mut();
        if let Some(SpanScope(scope)) = extensions.get_mut::<SpanScope>() {
            values.record(&mut ScopeVisitor { scope });
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let meta = event.metadata();
        let level = Severity::from(meta.level());
        if !self.filter.enabled(meta.target(), level) {
            return;
        }

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let mut scopes: Vec<Scope> = Vec::new();
        if let Some(stack) = ctx.event_scope(event) {
            for span in stack.from_root() {
                if let Some(SpanScope(scope)) = span.extensions().get::<SpanScope>() {
                    scopes.push(scope.clone());
                }
            }
        }
        scopes.push(visitor.fields);

        let mut entry = LogEntry::new(level, visitor.message.unwrap_or_default());
        entry.exception = visitor.exception;

        let ambient = self.trace_id_source.as_ref().and_then(|source| source());
        apply_scope_fields(&mut entry, ambient.as_deref(), merge_scopes(&scopes));

        self.queue.enqueue(entry);
        self.enqueued_events.fetch_add(1, Ordering::Relaxed);
    }
}

struct ScopeVisitor<'a> {
    scope: &'a mut Scope,
}

impl<'a> Visit for ScopeVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.scope.insert(field.name(), value);
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.scope.insert(field.name(), value);
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.scope.insert(field.name(), value);
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.scope.insert(field.name(), value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.scope.insert(field.name(), value);
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.scope.insert(field.name(), format!("{:?}", value));
    }
}

/// Splits an event's fields into message, exception text and the rest.
#[derive(Default)]
struct EventVisitor {
    message: Option<String>,
    exception: Option<String>,
    fields: Scope,
}

impl EventVisitor {
    fn is_exception(field: &Field) -> bool {
        matches!(field.name(), "exception" | "error")
    }
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            _ if Self::is_exception(field) => self.exception = Some(value.to_string()),
            name => self.fields.insert(name, value),
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name(), value);
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name(), value);
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name(), value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name(), value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        let mut text = value.to_string();
        let mut source = value.source();
        while let Some(cause) = source {
            text.push_str("\n  caused by: ");
            text.push_str(&cause.to_string());
            source = cause.source();
        }
        if Self::is_exception(field) {
            self.exception = Some(text);
        } else {
            self.fields.insert(field.name(), text);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = Some(format!("{:?}", value)),
            _ if Self::is_exception(field) => self.exception = Some(format!("{:?}", value)),
            name => self.fields.insert(name, format!("{:?}", value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    // Events under this crate's own target are never shipped.
    const APP: &str = "orders_app";

    fn capture<F: FnOnce()>(layer: ShipperLayer, f: F) {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, f);
    }

    fn layer(queue: &Arc<BoundedQueue>) -> ShipperLayer {
        ShipperLayer::new(Arc::clone(queue), Arc::new(LevelFilter::default()))
    }

    #[test]
    fn span_fields_become_scope_properties() {
        let queue = Arc::new(BoundedQueue::new(16));

        capture(layer(&queue), || {
            let outer = tracing::info_span!("request", TraceId = "t-outer", UserId = "u-outer", Method = "POST");
            let _outer = outer.enter();
            let inner = tracing::info_span!("handler", TraceId = "t-inner", UserId = "u-inner", StatusCode = 201u64);
            let _inner = inner.enter();
            tracing::info!(target: APP, Elapsed = 12.5, "created");
        });

        let entries = queue.drain(16);
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.message, "created");
        assert_eq!(entry.log_level, Severity::Information);
        assert_eq!(entry.trace_id, "t-outer");
        assert_eq!(entry.user_id.as_deref(), Some("u-inner"));
        assert_eq!(entry.method.as_deref(), Some("POST"));
        assert_eq!(entry.status_code, Some(201));
        assert_eq!(entry.elapsed_milliseconds, Some(12.5));
    }

    #[test]
    fn recorded_span_fields_update_scope() {
        let queue = Arc::new(BoundedQueue::new(16));

        capture(layer(&queue), || {
            let span = tracing::info_span!("request", UserId = tracing::field::Empty);
            let _guard = span.enter();
            span.record("UserId", "late-user");
            tracing::warn!(target: APP, "after login");
        });

        let entry = queue.drain(1).remove(0);
        assert_eq!(entry.user_id.as_deref(), Some("late-user"));
    }

    #[test]
    fn error_field_becomes_exception() {
        let queue = Arc::new(BoundedQueue::new(16));
        let io = std::io::Error::new(std::io::ErrorKind::Other, "connection reset");

        capture(layer(&queue), || {
            tracing::error!(target: APP, error = &io as &(dyn Error + 'static), "upstream failed");
        });

        let entry = queue.drain(1).remove(0);
        assert_eq!(entry.exception.as_deref(), Some("connection reset"));
        assert_eq!(entry.message, "upstream failed");
    }

    #[test]
    fn ambient_trace_id_source_wins() {
        let queue = Arc::new(BoundedQueue::new(16));
        let layer = layer(&queue).with_trace_id_source(|| Some("activity-1".to_string()));

        capture(layer, || {
            let span = tracing::info_span!("request", TraceId = "scope-trace");
            let _guard = span.enter();
            tracing::info!(target: APP, "hello");
        });

        assert_eq!(queue.drain(1)[0].trace_id, "activity-1");
    }

    #[test]
    fn filtered_events_are_counted_but_not_queued() {
        let queue = Arc::new(BoundedQueue::new(16));
        let layer = layer(&queue);
        let total = Arc::clone(&layer.total_events);
        let enqueued = Arc::clone(&layer.enqueued_events);

        capture(layer, || {
            tracing::debug!(target: APP, "too quiet");
            tracing::info!(target: "hyper::client", "framework noise");
            tracing::info!(target: "tracing_log_shipper::dispatcher", "own diagnostics");
            tracing::info!(target: APP, "kept");
        });

        assert_eq!(total.load(Ordering::Relaxed), 4);
        assert_eq!(enqueued.load(Ordering::Relaxed), 1);
        assert_eq!(queue.drain(16)[0].message, "kept");
    }
}
