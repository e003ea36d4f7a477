//! Probe records: one observation of ambient state at a probe point.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Where in request handling a probe was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Inside a filter, before the artificial delay.
    BeforeSuspend,
    /// Inside a filter, after the artificial delay resumed.
    AfterSuspend,
    /// Inside the endpoint itself.
    AtEndpoint,
}

impl Phase {
    /// Label used in diagnostic lines.
    pub fn label(&self) -> &'static str {
        match self {
            Self::BeforeSuspend => "before await",
            Self::AfterSuspend => "after await",
            Self::AtEndpoint => "at action",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single probe observation. Created per probe call and handed to a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeRecord {
    /// Numeric id of the OS thread the probe ran on.
    pub worker_id: String,
    /// Request the probe was taken for.
    pub request_id: String,
    pub request_context_present: bool,
    pub continuation_context_present: bool,
    pub phase: Phase,
    pub at: DateTime<Utc>,
}

impl fmt::Display for ProbeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}; request-context-present: {}; continuation-context-present: {}",
            self.worker_id,
            self.phase.label(),
            self.request_context_present,
            self.continuation_context_present,
        )
    }
}
