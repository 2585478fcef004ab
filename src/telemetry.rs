use crate::error::Result;
use chrono::{SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fmt::{self as stdfmt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::sync::OnceLock;
use tracing::field::{Field, Visit};
use tracing::Event;
use tracing::Subscriber;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::fmt::{
    self as fmt_subscriber, format::Writer, FmtContext, FormatEvent, FormatFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

const SERVICE_NAME: &str = "workload-operator";

pub fn init_tracing() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("workload_operator=info,info"));

    let stdout = std::io::stdout;
    let stderr = std::io::stderr;

    let writer = stdout
        .with_max_level(tracing::Level::INFO)
        .or_else(stderr.with_min_level(tracing::Level::WARN));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(false)
        .with_ansi(false)
        .event_format(KeyValueFormatter::new())
        .fmt_fields(fmt_subscriber::format::DefaultFields::new())
        .with_writer(writer)
        .try_init()
        .map_err(|err| crate::err!("failed to initialise tracing subscriber: {err}"))
}

struct KeyValueFormatter {
    service_name: &'static str,
}

impl KeyValueFormatter {
    const fn new() -> Self {
        Self {
            service_name: SERVICE_NAME,
        }
    }
}

impl<S, N> FormatEvent<S, N> for KeyValueFormatter
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> stdfmt::Result {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let pid = std::process::id().to_string();
        let metadata = event.metadata();
        let component = metadata.target();

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let message = visitor
            .message
            .take()
            .unwrap_or_else(|| metadata.name().to_string());

        let mut fields = visitor.fields;
        fields.sort_by(|(lhs, _), (rhs, _)| field_rank(lhs).cmp(&field_rank(rhs)).then(lhs.cmp(rhs)));

        let span_path = current_span_path(ctx);

        let mut line = String::new();
        push_field(&mut line, "ts", &timestamp);
        push_field(&mut line, "level", metadata.level().as_str());
        push_field(&mut line, "service", self.service_name);
        push_field(&mut line, "component", component);
        push_field(&mut line, "pid", &pid);

        if let Some(span_path) = span_path {
            push_field(&mut line, "span", &span_path);
        }

        push_field(&mut line, "msg", &message);

        for (key, value) in fields {
            push_field(&mut line, &key, &value);
        }

        writer.write_str(&line)?;
        writer.write_char('\n')
    }
}

/// Relation identity fields lead so log lines for one relation line up.
const LEADING_FIELDS: [&str; 5] = ["event", "relation", "source", "revision", "state_to"];

fn field_rank(name: &str) -> usize {
    LEADING_FIELDS
        .iter()
        .position(|leading| *leading == name)
        .unwrap_or(LEADING_FIELDS.len())
}

fn current_span_path<S, N>(ctx: &FmtContext<'_, S, N>) -> Option<String>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    let span = ctx.lookup_current()?;
    let names: Vec<&str> = span.scope().from_root().map(|s| s.name()).collect();
    if names.is_empty() {
        None
    } else {
        Some(names.join("."))
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Vec<(String, String)>,
}

impl FieldVisitor {
    fn record_field(&mut self, field: &Field, value: String) {
        if field.name().is_empty() {
            return;
        }
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_field(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn stdfmt::Debug) {
        self.record_field(field, format!("{value:?}"));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_field(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_field(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_field(field, value.to_string());
    }
}

#[derive(Default)]
pub struct RuntimeCounters {
    passes: AtomicU64,
    cancelled_passes: AtomicU64,
    coalesced_events: AtomicU64,
    applies: AtomicU64,
    apply_failures: AtomicU64,
    applies_skipped: AtomicU64,
    status_publishes: AtomicU64,
    schema_rejections: SchemaRejectionRegistry,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeCountersSnapshot {
    pub passes: u64,
    pub cancelled_passes: u64,
    pub coalesced_events: u64,
    pub applies: u64,
    pub apply_failures: u64,
    pub applies_skipped: u64,
    pub status_publishes: u64,
    pub schema_rejections: Vec<SchemaRejectionSnapshot>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaRejectionSnapshot {
    pub relation: String,
    pub total: u64,
}

static RUNTIME_COUNTERS: OnceLock<RuntimeCounters> = OnceLock::new();

pub fn runtime_counters() -> &'static RuntimeCounters {
    RUNTIME_COUNTERS.get_or_init(RuntimeCounters::default)
}

impl RuntimeCounters {
    pub fn inc_passes(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cancelled_passes(&self) {
        self.cancelled_passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_coalesced_events(&self, count: u64) {
        self.coalesced_events.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_applies(&self) {
        self.applies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_apply_failures(&self) {
        self.apply_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_applies_skipped(&self) {
        self.applies_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_status_publishes(&self) {
        self.status_publishes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_schema_rejection(&self, relation: &str) {
        self.schema_rejections.record(relation);
    }

    pub fn snapshot(&self) -> RuntimeCountersSnapshot {
        RuntimeCountersSnapshot {
            passes: self.passes.load(Ordering::Relaxed),
            cancelled_passes: self.cancelled_passes.load(Ordering::Relaxed),
            coalesced_events: self.coalesced_events.load(Ordering::Relaxed),
            applies: self.applies.load(Ordering::Relaxed),
            apply_failures: self.apply_failures.load(Ordering::Relaxed),
            applies_skipped: self.applies_skipped.load(Ordering::Relaxed),
            status_publishes: self.status_publishes.load(Ordering::Relaxed),
            schema_rejections: self.schema_rejections.snapshot(),
        }
    }
}

#[derive(Default)]
struct SchemaRejectionRegistry {
    inner: Mutex<BTreeMap<String, u64>>,
}

impl SchemaRejectionRegistry {
    fn record(&self, relation: &str) {
        let mut guard = self
            .inner
            .lock()
            .expect("schema rejection registry poisoned");
        let counter = guard.entry(relation.to_string()).or_insert(0);
        *counter = counter.saturating_add(1);
    }

    fn snapshot(&self) -> Vec<SchemaRejectionSnapshot> {
        let guard = self
            .inner
            .lock()
            .expect("schema rejection registry poisoned");
        guard
            .iter()
            .map(|(relation, total)| SchemaRejectionSnapshot {
                relation: relation.clone(),
                total: *total,
            })
            .collect()
    }
}

fn encode_field_value(value: &str) -> String {
    let needs_quotes = value.chars().any(|c| {
        c.is_whitespace()
            || matches!(
                c,
                '"' | '\\' | '=' | '[' | ']' | '{' | '}' | ',' | '\n' | '\r' | '\t'
            )
    });

    if !needs_quotes {
        return value.to_string();
    }

    let mut encoded = String::with_capacity(value.len() + 2);
    encoded.push('"');
    for ch in value.chars() {
        match ch {
            '"' => encoded.push_str("\\\""),
            '\\' => encoded.push_str("\\\\"),
            '\n' => encoded.push_str("\\n"),
            '\r' => encoded.push_str("\\r"),
            '\t' => encoded.push_str("\\t"),
            _ => encoded.push(ch),
        }
    }
    encoded.push('"');
    encoded
}

fn push_field(buffer: &mut String, key: &str, value: &str) {
    if !buffer.is_empty() {
        buffer.push(' ');
    }
    buffer.push_str(key);
    buffer.push('=');
    buffer.push_str(&encode_field_value(value));
}
