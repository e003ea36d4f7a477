//! Context probe: samples ambient state at a probe point and reports it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use ctxprobe_protocol::{Phase, ProbeRecord, RequestContext};
use parking_lot::Mutex;
use tracing::info;

/// Destination for probe records.
pub trait ProbeSink: Send + Sync {
    fn emit(&self, record: &ProbeRecord);
}

impl<S: ProbeSink + ?Sized> ProbeSink for Arc<S> {
    fn emit(&self, record: &ProbeRecord) {
        (**self).emit(record)
    }
}

/// Writes each record as one `info!` line under `ctxprobe::probe`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProbeSink for TracingSink {
    fn emit(&self, record: &ProbeRecord) {
        info!(target: "ctxprobe::probe", request_id = %record.request_id, "{record}");
    }
}

/// Keeps every record in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<ProbeRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records so far.
    pub fn records(&self) -> Vec<ProbeRecord> {
        self.records.lock().clone()
    }

    /// Records taken for one request, in order.
    pub fn for_request(&self, request_id: &str) -> Vec<ProbeRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.request_id == request_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl ProbeSink for MemorySink {
    fn emit(&self, record: &ProbeRecord) {
        self.records.lock().push(record.clone());
    }
}

/// Forwards every record to each inner sink.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ProbeSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl ProbeSink + 'static) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }
}

impl ProbeSink for FanoutSink {
    fn emit(&self, record: &ProbeRecord) {
        for sink in &self.sinks {
            sink.emit(record);
        }
    }
}

/// Samples the worker thread, the task-scoped request context, and the
/// ambient runtime handle, then emits the result.
///
/// Cheap to clone; every filter and endpoint holds its own copy.
#[derive(Clone)]
pub struct ContextProbe {
    sink: Arc<dyn ProbeSink>,
}

impl ContextProbe {
    pub fn new(sink: impl ProbeSink + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    /// Probe that logs through `tracing`.
    pub fn tracing() -> Self {
        Self::new(TracingSink)
    }

    /// Take one observation for `ctx` and emit it. Never fails.
    pub fn probe(&self, ctx: &RequestContext, phase: Phase) -> ProbeRecord {
        let record = ProbeRecord {
            worker_id: current_worker_id(),
            request_id: ctx.request_id.clone(),
            request_context_present: ctx.is_current(),
            continuation_context_present: tokio::runtime::Handle::try_current().is_ok(),
            phase,
            at: Utc::now(),
        };
        self.sink.emit(&record);
        record
    }
}

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static WORKER_ID: u64 = NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed);
}

/// Process-unique number of the current thread, assigned on its first probe.
pub fn current_worker_id() -> String {
    WORKER_ID.with(|id| id.to_string())
}
