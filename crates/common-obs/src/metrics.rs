use once_cell::sync::{Lazy, OnceCell};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

const DEFAULT_BUCKETS: &[f64] = &[0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0];

pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

static REGISTRY: OnceCell<Registry> = OnceCell::new();
static SERVICE_NAME: OnceCell<&'static str> = OnceCell::new();
static PROCESS_START: OnceCell<Instant> = OnceCell::new();

pub(crate) fn init(service: &str) {
    if SERVICE_NAME.get().is_some() {
        return;
    }

    let leaked = Box::leak(service.to_string().into_boxed_str());
    SERVICE_NAME.set(leaked).ok();
    PROCESS_START.get_or_init(Instant::now);

    http_requests_total().ensure(&[leaked, "/metrics", "200"]);
    handler_latency_seconds().ensure(&[leaked, "/metrics"]);
}

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::default)
}

#[derive(Default)]
struct Registry {
    families: RwLock<Vec<MetricFamily>>,
}

enum MetricFamily {
    Counter(Arc<CounterVecInner>),
    Histogram(Arc<HistogramVecInner>),
}

impl Registry {
    fn register_counter(&self, counter: Arc<CounterVecInner>) {
        let mut guard = self.families.write().expect("lock poisoned");
        let exists = guard
            .iter()
            .any(|family| matches!(family, MetricFamily::Counter(existing) if existing.name == counter.name));
        if !exists {
            guard.push(MetricFamily::Counter(counter));
        }
    }

    fn register_histogram(&self, histogram: Arc<HistogramVecInner>) {
        let mut guard = self.families.write().expect("lock poisoned");
        let exists = guard.iter().any(
            |family| matches!(family, MetricFamily::Histogram(existing) if existing.name == histogram.name),
        );
        if !exists {
            guard.push(MetricFamily::Histogram(histogram));
        }
    }

    fn encode(&self) -> String {
        let mut output = String::new();
        let guard = self.families.read().expect("lock poisoned");
        for family in guard.iter() {
            match family {
                MetricFamily::Counter(counter) => {
                    writeln!(output, "# HELP {} {}", counter.name, counter.help)
                        .expect("write metrics");
                    writeln!(output, "# TYPE {} counter", counter.name).expect("write metrics");

                    let mut samples = counter.collect();
                    samples.sort_by(|a, b| a.0.cmp(&b.0));
                    for (labels, value) in samples {
                        write!(output, "{}", counter.name).expect("write metrics");
                        write_labels(&mut output, counter.label_names, &labels);
                        writeln!(output, " {}", value).expect("write metrics");
                    }
                }
                MetricFamily::Histogram(histogram) => {
                    writeln!(output, "# HELP {} {}", histogram.name, histogram.help)
                        .expect("write metrics");
                    writeln!(output, "# TYPE {} histogram", histogram.name).expect("write metrics");

                    let mut samples = histogram.collect();
                    samples.sort_by(|a, b| a.0.cmp(&b.0));
                    for (labels, snapshot) in samples {
                        let mut cumulative = 0;
                        for (idx, bound) in histogram.buckets.iter().enumerate() {
                            cumulative += snapshot.counts.get(idx).copied().unwrap_or(0);
                            write!(output, "{}_bucket", histogram.name).expect("write metrics");
                            let mut label_names = histogram.label_names.to_vec();
                            label_names.push("le");
                            let mut label_values = labels.clone();
                            label_values.push(format_float(*bound));
                            write_labels(&mut output, &label_names, &label_values);
                            writeln!(output, " {}", cumulative).expect("write metrics");
                        }

                        cumulative += snapshot
                            .counts
                            .get(histogram.buckets.len())
                            .copied()
                            .unwrap_or(0);
                        write!(output, "{}_bucket", histogram.name).expect("write metrics");
                        let mut label_names = histogram.label_names.to_vec();
                        label_names.push("le");
                        let mut label_values = labels.clone();
                        label_values.push("+Inf".to_string());
                        write_labels(&mut output, &label_names, &label_values);
                        writeln!(output, " {}", cumulative).expect("write metrics");

                        write!(output, "{}_sum", histogram.name).expect("write metrics");
                        write_labels(&mut output, histogram.label_names, &labels);
                        writeln!(output, " {}", format_float(snapshot.sum)).expect("write metrics");

                        write!(output, "{}_count", histogram.name).expect("write metrics");
                        write_labels(&mut output, histogram.label_names, &labels);
                        writeln!(output, " {}", snapshot.count).expect("write metrics");
                    }
                }
            }
        }

        output
    }
}

#[derive(Default)]
struct CounterValue {
    value: std::sync::atomic::AtomicU64,
}

impl CounterValue {
    fn increment(&self, amount: u64) {
        self.value
            .fetch_add(amount, std::sync::atomic::Ordering::Relaxed);
    }

    fn get(&self) -> u64 {
        self.value.load(std::sync::atomic::Ordering::Relaxed)
    }
}

struct CounterVecInner {
    name: &'static str,
    help: &'static str,
    label_names: &'static [&'static str],
    values: Mutex<HashMap<Vec<String>, Arc<CounterValue>>>,
}

impl CounterVecInner {
    fn get_or_create(&self, label_values: &[&str]) -> Arc<CounterValue> {
        assert_eq!(
            self.label_names.len(),
            label_values.len(),
            "label value count mismatch",
        );
        let mut guard = self.values.lock().expect("lock poisoned");
        let key: Vec<String> = label_values.iter().map(|value| value.to_string()).collect();
        Arc::clone(
            guard
                .entry(key)
                .or_insert_with(|| Arc::new(CounterValue::default())),
        )
    }

    fn collect(&self) -> Vec<(Vec<String>, u64)> {
        let guard = self.values.lock().expect("lock poisoned");
        guard
            .iter()
            .map(|(labels, value)| (labels.clone(), value.get()))
            .collect()
    }
}

#[derive(Clone)]
pub struct CounterVec {
    inner: Arc<CounterVecInner>,
}

impl CounterVec {
    pub fn with_label_values(&self, labels: &[&str]) -> Counter {
        Counter {
            inner: self.inner.get_or_create(labels),
        }
    }

    pub fn inc(&self, labels: &[&str], amount: u64) {
        self.with_label_values(labels).inc(amount);
    }

    pub fn ensure(&self, labels: &[&str]) {
        let _ = self.inner.get_or_create(labels);
    }
}

#[derive(Clone)]
pub struct Counter {
    inner: Arc<CounterValue>,
}

impl Counter {
    pub fn inc(&self, amount: u64) {
        self.inner.increment(amount);
    }
}

struct HistogramVecInner {
    name: &'static str,
    help: &'static str,
    label_names: &'static [&'static str],
    buckets: &'static [f64],
    values: Mutex<HashMap<Vec<String>, Arc<HistogramValue>>>,
}

impl HistogramVecInner {
    fn get_or_create(&self, label_values: &[&str]) -> Arc<HistogramValue> {
        assert_eq!(
            self.label_names.len(),
            label_values.len(),
            "label value count mismatch",
        );
        let mut guard = self.values.lock().expect("lock poisoned");
        let key: Vec<String> = label_values.iter().map(|value| value.to_string()).collect();
        Arc::clone(
            guard
                .entry(key)
                .or_insert_with(|| HistogramValue::new(self.buckets.len())),
        )
    }

    fn collect(&self) -> Vec<(Vec<String>, HistogramSnapshot)> {
        let guard = self.values.lock().expect("lock poisoned");
        guard
            .iter()
            .map(|(labels, value)| (labels.clone(), value.snapshot()))
            .collect()
    }
}

#[derive(Clone)]
pub struct HistogramVec {
    inner: Arc<HistogramVecInner>,
}

impl HistogramVec {
    pub fn with_label_values(&self, labels: &[&str]) -> Histogram {
        Histogram {
            inner: self.inner.get_or_create(labels),
            buckets: self.inner.buckets,
        }
    }

    pub fn observe(&self, labels: &[&str], value: f64) {
        self.with_label_values(labels).observe(value);
    }

    pub fn ensure(&self, labels: &[&str]) {
        let _ = self.inner.get_or_create(labels);
    }
}

#[derive(Clone)]
pub struct Histogram {
    inner: Arc<HistogramValue>,
    buckets: &'static [f64],
}

impl Histogram {
    pub fn observe(&self, value: f64) {
        self.inner.observe(self.buckets, value);
    }
}

#[derive(Clone)]
struct HistogramSnapshot {
    counts: Vec<u64>,
    sum: f64,
    count: u64,
}

struct HistogramValue {
    state: Mutex<HistogramState>,
}

struct HistogramState {
    counts: Vec<u64>,
    sum: f64,
    count: u64,
}

impl HistogramValue {
    fn new(bucket_count: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(HistogramState {
                counts: vec![0; bucket_count + 1],
                sum: 0.0,
                count: 0,
            }),
        })
    }

    fn observe(&self, buckets: &[f64], value: f64) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.count += 1;
        state.sum += value;

        let mut idx = buckets.len();
        for (i, bound) in buckets.iter().enumerate() {
            if value <= *bound {
                idx = i;
                break;
            }
        }

        if let Some(slot) = state.counts.get_mut(idx) {
            *slot += 1;
        }
    }

    fn snapshot(&self) -> HistogramSnapshot {
        let state = self.state.lock().expect("lock poisoned");
        HistogramSnapshot {
            counts: state.counts.clone(),
            sum: state.sum,
            count: state.count,
        }
    }
}

fn write_labels(output: &mut String, names: &[&str], values: &[String]) {
    if names.is_empty() {
        return;
    }

    output.push('{');
    for (idx, (name, value)) in names.iter().zip(values.iter()).enumerate() {
        if idx > 0 {
            output.push(',');
        }
        let escaped = escape_label_value(value);
        write!(output, r#"{}="{}""#, name, escaped).expect("write metrics");
    }
    output.push('}');
}

fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn format_float(value: f64) -> String {
    let mut formatted = format!("{value:.6}");
    while formatted.contains('.') && formatted.ends_with('0') {
        formatted.pop();
    }
    if formatted.ends_with('.') {
        formatted.push('0');
    }
    formatted
}

pub fn register_counter(
    name: &'static str,
    help: &'static str,
    label_names: &'static [&'static str],
) -> CounterVec {
    let inner = Arc::new(CounterVecInner {
        name,
        help,
        label_names,
        values: Mutex::new(HashMap::new()),
    });
    registry().register_counter(inner.clone());
    CounterVec { inner }
}

pub fn register_histogram(
    name: &'static str,
    help: &'static str,
    label_names: &'static [&'static str],
) -> HistogramVec {
    let inner = Arc::new(HistogramVecInner {
        name,
        help,
        label_names,
        buckets: DEFAULT_BUCKETS,
        values: Mutex::new(HashMap::new()),
    });
    registry().register_histogram(inner.clone());
    HistogramVec { inner }
}

/// Render every registered family in Prometheus text format, prefixed with
/// the process uptime gauge.
pub fn encode_prometheus() -> String {
    let mut output = String::new();
    if let (Some(service), Some(start)) = (SERVICE_NAME.get(), PROCESS_START.get()) {
        let uptime = start.elapsed().as_secs_f64();
        writeln!(output, "# HELP process_uptime_seconds Process uptime in seconds")
            .expect("write metrics");
        writeln!(output, "# TYPE process_uptime_seconds gauge").expect("write metrics");
        writeln!(
            output,
            r#"process_uptime_seconds{{service="{}"}} {}"#,
            service,
            format_float(uptime)
        )
        .expect("write metrics");
    }
    output.push_str(&registry().encode());
    output
}

static HTTP_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter(
        "http_requests_total",
        "Total HTTP requests received",
        &["service", "route", "code"],
    )
});

static HANDLER_LATENCY_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram(
        "handler_latency_seconds",
        "HTTP handler latency in seconds",
        &["service", "route"],
    )
});

static UPSTREAM_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter(
        "upstream_requests_total",
        "Total requests forwarded to an upstream service",
        &["service", "endpoint", "code"],
    )
});

static AUTH_ATTEMPTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter(
        "auth_attempts_total",
        "Total credential verification attempts",
        &["service", "outcome"],
    )
});

pub fn http_requests_total() -> &'static CounterVec {
    &HTTP_REQUESTS_TOTAL
}

pub fn handler_latency_seconds() -> &'static HistogramVec {
    &HANDLER_LATENCY_SECONDS
}

pub fn upstream_requests_total() -> &'static CounterVec {
    &UPSTREAM_REQUESTS_TOTAL
}

pub fn auth_attempts_total() -> &'static CounterVec {
    &AUTH_ATTEMPTS_TOTAL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_per_label_set() {
        let counter = register_counter("test_requests_total", "test counter", &["route"]);
        counter.inc(&["/a"], 1);
        counter.inc(&["/a"], 2);
        counter.inc(&["/b"], 1);

        let encoded = registry().encode();
        assert!(encoded.contains(r#"test_requests_total{route="/a"} 3"#));
        assert!(encoded.contains(r#"test_requests_total{route="/b"} 1"#));
    }

    #[test]
    fn histogram_buckets_are_cumulative() {
        let histogram = register_histogram("test_latency_seconds", "test histogram", &["route"]);
        histogram.observe(&["/a"], 0.003);
        histogram.observe(&["/a"], 0.2);

        let encoded = registry().encode();
        assert!(encoded.contains(r#"test_latency_seconds_bucket{route="/a",le="0.005"} 1"#));
        assert!(encoded.contains(r#"test_latency_seconds_bucket{route="/a",le="+Inf"} 2"#));
        assert!(encoded.contains(r#"test_latency_seconds_count{route="/a"} 2"#));
    }

    #[test]
    fn label_values_are_escaped() {
        assert_eq!(escape_label_value(r#"a"b"#), r#"a\"b"#);
        assert_eq!(escape_label_value("a\nb"), r"a\nb");
    }
}
