//! Human-readable state tables for debug tooling.

use crate::scheduler::{Scheduler, NANOS_PER_MILLI};
use ccre_env::TimeSource;
use serde::Serialize;
use std::fmt;

/// A titled list of rows plus a one-line summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntrospectionTable {
    pub title: String,
    pub rows: Vec<String>,
    pub summary: String,
    /// Suggested refresh interval for live viewers
    pub refresh_millis: u64,
}

impl fmt::Display for IntrospectionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        for row in &self.rows {
            writeln!(f, "  {}", row)?;
        }
        write!(f, "{}", self.summary)
    }
}

/// Something that can describe its current state as a table.
pub trait Introspect {
    fn introspect(&self) -> IntrospectionTable;
}

/// One row per queued job, `"{deadline_ms}: {tag}"`, in firing order.
impl<T: TimeSource> Introspect for Scheduler<T> {
    fn introspect(&self) -> IntrospectionTable {
        let rows = self
            .snapshot()
            .into_iter()
            .map(|job| format!("{:>10} ms: {}", job.deadline_nanos / NANOS_PER_MILLI, job.tag))
            .collect();
        let summary = match self.active_tag() {
            Some(tag) => format!("{} queued, running '{}'", self.pending(), tag),
            None => format!("{} queued", self.pending()),
        };
        IntrospectionTable {
            title: "Scheduler queue".to_string(),
            rows,
            summary,
            refresh_millis: 1000,
        }
    }
}
