//! Prometheus metrics
//!
//! Zero-dependency Prometheus text format exporter using only `std::sync::atomic`,
//! `parking_lot`, and `axum`. Counters, gauges and labelled counters live in a
//! global registry; [`STD_METRICS`] holds the handles the session and the
//! WebSocket layer update.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

// ---------------------------------------------------------------------------
// Atomic helpers
// ---------------------------------------------------------------------------

/// A simple atomic counter backed by `AtomicU64`.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge that stores an `f64` via bit-casting into `AtomicU64`.
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn set(&self, val: f64) {
        self.0.store(val.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn inc(&self) {
        self.add(1.0);
    }

    pub fn dec(&self) {
        self.add(-1.0);
    }

    fn add(&self, delta: f64) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some((f64::from_bits(current) + delta).to_bits())
            });
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

#[derive(Debug)]
enum MetricData {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
    CounterVec {
        label_names: Vec<String>,
        entries: RwLock<HashMap<Vec<String>, Arc<Counter>>>,
    },
}

#[derive(Debug)]
struct MetricDescriptor {
    name: String,
    help: String,
    metric_type: MetricType,
    data: MetricData,
}

/// Metrics registry.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    metrics: RwLock<Vec<MetricDescriptor>>,
}

/// The global singleton metrics registry.
pub static METRICS: LazyLock<MetricsRegistry> = LazyLock::new(MetricsRegistry::default);

impl MetricsRegistry {
    pub fn register_counter(&self, name: &str, help: &str) -> Arc<Counter> {
        let counter = Arc::new(Counter::default());
        self.push(name, help, MetricType::Counter, MetricData::Counter(Arc::clone(&counter)));
        counter
    }

    pub fn register_gauge(&self, name: &str, help: &str) -> Arc<Gauge> {
        let gauge = Arc::new(Gauge::default());
        self.push(name, help, MetricType::Gauge, MetricData::Gauge(Arc::clone(&gauge)));
        gauge
    }

    pub fn register_counter_vec(
        &self,
        name: &str,
        help: &str,
        label_names: &[&str],
    ) -> CounterVecHandle {
        self.push(
            name,
            help,
            MetricType::Counter,
            MetricData::CounterVec {
                label_names: label_names.iter().map(|s| s.to_string()).collect(),
                entries: RwLock::new(HashMap::new()),
            },
        );
        CounterVecHandle {
            name: name.to_string(),
        }
    }

    fn push(&self, name: &str, help: &str, metric_type: MetricType, data: MetricData) {
        self.metrics.write().push(MetricDescriptor {
            name: name.to_string(),
            help: help.to_string(),
            metric_type,
            data,
        });
    }

    /// Get or create the counter for `label_values` and increment it.
    pub fn counter_vec_inc(&self, name: &str, label_values: &[&str]) {
        let metrics = self.metrics.read();
        let Some(desc) = metrics.iter().find(|desc| desc.name == name) else {
            return;
        };
        let MetricData::CounterVec { entries, .. } = &desc.data else {
            return;
        };
        let key: Vec<String> = label_values.iter().map(|s| s.to_string()).collect();
        // Fast path: read lock
        if let Some(counter) = entries.read().get(&key) {
            counter.inc();
            return;
        }
        entries
            .write()
            .entry(key)
            .or_insert_with(|| Arc::new(Counter::default()))
            .inc();
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let metrics = self.metrics.read();
        let mut out = String::with_capacity(1024);

        for desc in metrics.iter() {
            let _ = writeln!(out, "# HELP {} {}", desc.name, desc.help);
            let _ = writeln!(out, "# TYPE {} {}", desc.name, desc.metric_type.as_str());

            match &desc.data {
                MetricData::Counter(counter) => {
                    let _ = writeln!(out, "{} {}", desc.name, counter.get());
                }
                MetricData::Gauge(gauge) => {
                    let _ = write_f64(&mut out, &desc.name, gauge.get());
                }
                MetricData::CounterVec {
                    label_names,
                    entries,
                } => {
                    let map = entries.read();
                    let mut sorted: Vec<_> = map.iter().collect();
                    sorted.sort_by(|a, b| a.0.cmp(b.0));
                    for (label_values, counter) in sorted {
                        let labels = format_labels(label_names, label_values);
                        let _ = writeln!(out, "{}{} {}", desc.name, labels, counter.get());
                    }
                }
            }
        }

        out
    }
}

/// Format a gauge value, rendering integers without decimal.
fn write_f64(out: &mut String, name: &str, val: f64) -> std::fmt::Result {
    if val == val.floor() && val.is_finite() {
        writeln!(out, "{} {}", name, val as i64)
    } else {
        writeln!(out, "{} {}", name, val)
    }
}

fn format_labels(names: &[String], values: &[String]) -> String {
    let mut buf = String::from("{");
    for (i, (name, value)) in names.iter().zip(values.iter()).enumerate() {
        if i > 0 {
            buf.push(',');
        }
        let _ = write!(buf, "{}=\"{}\"", name, escape_label_value(value));
    }
    buf.push('}');
    buf
}

fn escape_label_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Handle for a counter_vec metric, allowing labeled increments.
#[derive(Debug, Clone)]
pub struct CounterVecHandle {
    name: String,
}

impl CounterVecHandle {
    pub fn inc(&self, label_values: &[&str]) {
        METRICS.counter_vec_inc(&self.name, label_values);
    }
}

// ---------------------------------------------------------------------------
// Standard metrics
// ---------------------------------------------------------------------------

/// Metric handles used across the application.
pub struct StandardMetrics {
    pub ws_connections_active: Arc<Gauge>,
    pub students_connected: Arc<Gauge>,
    pub polls_created_total: Arc<Counter>,
    pub polls_rejected_total: Arc<Counter>,
    pub polls_closed_total: CounterVecHandle,
    pub answers_accepted_total: Arc<Counter>,
    pub answers_ignored_total: Arc<Counter>,
}

/// Global standard metrics, lazily initialized.
pub static STD_METRICS: LazyLock<StandardMetrics> = LazyLock::new(init_standard_metrics);

/// Register all standard application metrics.
pub fn init_standard_metrics() -> StandardMetrics {
    StandardMetrics {
        ws_connections_active: METRICS.register_gauge(
            "classpoll_ws_connections_active",
            "Number of open WebSocket connections",
        ),
        students_connected: METRICS
            .register_gauge("classpoll_students_connected", "Students in the roster"),
        polls_created_total: METRICS
            .register_counter("classpoll_polls_created_total", "Polls opened"),
        polls_rejected_total: METRICS.register_counter(
            "classpoll_polls_rejected_total",
            "Poll creation requests rejected",
        ),
        polls_closed_total: METRICS.register_counter_vec(
            "classpoll_polls_closed_total",
            "Polls closed, by reason",
            &["reason"],
        ),
        answers_accepted_total: METRICS
            .register_counter("classpoll_answers_accepted_total", "Answers recorded"),
        answers_ignored_total: METRICS.register_counter(
            "classpoll_answers_ignored_total",
            "Answers dropped without being recorded",
        ),
    }
}

/// Axum handler that returns all metrics in Prometheus text exposition format.
pub async fn metrics_handler() -> Response {
    // Touch the standard set so an idle server still exposes every family
    let _ = &*STD_METRICS;
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        METRICS.render(),
    )
        .into_response()
}
