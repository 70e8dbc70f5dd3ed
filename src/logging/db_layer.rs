//! A `tracing_subscriber` layer that mirrors every record into the log
//! store.
//!
//! The well-known fields `project`, `delivery_id` and `pipe_id` are lifted
//! into dedicated columns; all remaining fields are serialized into the
//! `data` JSON object. Fields recorded on enclosing spans propagate to the
//! events emitted inside them, with event fields winning on collision.
//!
//! Events are handed to a writer task over an unbounded channel so emission
//! never awaits the connection pool.

use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::db::{LogEntry, LogStore};

pub struct DbLayer {
    tx: mpsc::UnboundedSender<LogEntry>,
}

impl DbLayer {
    pub fn new(store: LogStore) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<LogEntry>();
        tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                if !store.is_open() {
                    break;
                }
                if let Err(err) = store.append(&entry).await {
                    // Can't log through tracing from inside the sink.
                    eprintln!("log store write failed: {err}");
                }
            }
        });
        Self { tx }
    }
}

fn level_to_int(level: &Level) -> i64 {
    if *level == Level::ERROR {
        crate::db::LEVEL_ERROR
    } else if *level == Level::WARN {
        crate::db::LEVEL_WARN
    } else if *level == Level::INFO {
        crate::db::LEVEL_INFO
    } else {
        // TRACE folds into debug
        crate::db::LEVEL_DEBUG
    }
}

/// Fields recorded on a span, kept in the registry's span extensions.
struct SpanFields(BTreeMap<String, Value>);

#[derive(Default)]
struct JsonVisitor {
    message: Option<String>,
    fields: BTreeMap<String, Value>,
}

impl Visit for JsonVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        } else {
            self.fields
                .insert(field.name().to_string(), Value::String(format!("{value:?}")));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields
                .insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.fields
            .insert(field.name().to_string(), Value::String(value.to_string()));
    }
}

fn take_string(fields: &mut BTreeMap<String, Value>, key: &str) -> Option<String> {
    match fields.remove(key)? {
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

impl<S> Layer<S> for DbLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn enabled(&self, _metadata: &tracing::Metadata<'_>, _ctx: Context<'_, S>) -> bool {
        !self.tx.is_closed()
    }

    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: Context<'_, S>,
    ) {
        let Some(span) = ctx.span(id) else { return };
        let mut visitor = JsonVisitor::default();
        attrs.record(&mut visitor);
        span.extensions_mut().insert(SpanFields(visitor.fields));
    }

    fn on_record(
        &self,
        id: &tracing::span::Id,
        values: &tracing::span::Record<'_>,
        ctx: Context<'_, S>,
    ) {
        let Some(span) = ctx.span(id) else { return };
        let mut visitor = JsonVisitor::default();
        values.record(&mut visitor);
        let mut extensions = span.extensions_mut();
        if extensions.get_mut::<SpanFields>().is_none() {
            extensions.insert(SpanFields(BTreeMap::new()));
        }
        if let Some(SpanFields(fields)) = extensions.get_mut::<SpanFields>() {
            fields.extend(visitor.fields);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        if self.tx.is_closed() {
            return;
        }

        // Span fields first, root to leaf, so event fields win on collision.
        let mut fields = BTreeMap::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(SpanFields(span_fields)) = span.extensions().get::<SpanFields>() {
                    fields.extend(span_fields.clone());
                }
            }
        }

        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        fields.extend(visitor.fields);

        let entry = LogEntry {
            id: 0,
            level: level_to_int(event.metadata().level()),
            project: take_string(&mut fields, "project"),
            delivery_id: take_string(&mut fields, "delivery_id"),
            pipe_id: take_string(&mut fields, "pipe_id"),
            message: visitor.message.unwrap_or_default(),
            data: Value::Object(fields.into_iter().collect()).to_string(),
            ts: chrono::Utc::now().timestamp(),
        };
        let _ = self.tx.send(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::EntryQuery;
    use std::time::Duration;
    use tracing_subscriber::layer::SubscriberExt;

    async fn wait_for_entries(store: &LogStore, count: usize) -> Vec<LogEntry> {
        for _ in 0..100 {
            let rows = store
                .get_entries(&EntryQuery::default())
                .await
                .expect("query");
            if rows.len() >= count {
                return rows;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("log store never received {count} entries");
    }

    #[tokio::test]
    async fn events_land_in_the_store_with_extracted_columns() {
        let store = LogStore::open_memory().await;
        let subscriber = tracing_subscriber::registry().with(DbLayer::new(store.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(project = "site", delivery_id = "d-9", attempt = 2, "dispatched");
        });

        let rows = wait_for_entries(&store, 1).await;
        let row = &rows[0];
        assert_eq!(row.message, "dispatched");
        assert_eq!(row.project.as_deref(), Some("site"));
        assert_eq!(row.delivery_id.as_deref(), Some("d-9"));
        assert_eq!(row.pipe_id, None);
        assert_eq!(row.level, crate::db::LEVEL_INFO);

        let data: serde_json::Value = serde_json::from_str(&row.data).expect("data is JSON");
        assert_eq!(data["attempt"], 2);
        assert!(data.get("project").is_none());
    }

    #[tokio::test]
    async fn span_fields_propagate_to_events() {
        let store = LogStore::open_memory().await;
        let subscriber = tracing_subscriber::registry().with(DbLayer::new(store.clone()));

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("delivery", project = "site", delivery_id = "d-1");
            let _guard = span.enter();
            let inner = tracing::info_span!("pipeline", pipe_id = "pipe-7");
            let _inner = inner.enter();
            tracing::warn!("slow action");
        });

        let rows = wait_for_entries(&store, 1).await;
        let row = &rows[0];
        assert_eq!(row.project.as_deref(), Some("site"));
        assert_eq!(row.delivery_id.as_deref(), Some("d-1"));
        assert_eq!(row.pipe_id.as_deref(), Some("pipe-7"));
        assert_eq!(row.level, crate::db::LEVEL_WARN);
    }

    #[tokio::test]
    async fn event_fields_override_span_fields() {
        let store = LogStore::open_memory().await;
        let subscriber = tracing_subscriber::registry().with(DbLayer::new(store.clone()));

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("delivery", project = "span-project");
            let _guard = span.enter();
            tracing::info!(project = "event-project", "msg");
        });

        let rows = wait_for_entries(&store, 1).await;
        assert_eq!(rows[0].project.as_deref(), Some("event-project"));
    }
}
