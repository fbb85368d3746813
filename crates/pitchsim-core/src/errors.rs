//! Per-source aggregation of simulation error reports.
//!
//! Nothing in the tick path throws; offending operations are skipped and a
//! coded report is queued here, then drained and emitted in one batch per
//! source after each tick's radio responses.

use serde::{Deserialize, Serialize};

/// Origin of an aggregated error report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSource {
    Blue,
    Yellow,
    Config,
}

impl ErrorSource {
    pub const ALL: [ErrorSource; 3] = [ErrorSource::Blue, ErrorSource::Yellow, ErrorSource::Config];
}

/// A coded, human-readable error report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimError {
    pub code: String,
    pub message: String,
}

impl SimError {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Deduplicates and batches error reports per source.
#[derive(Debug, Default)]
pub struct ErrorAggregator {
    blue: Vec<SimError>,
    yellow: Vec<SimError>,
    config: Vec<SimError>,
}

impl ErrorAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error; an identical report already pending for the same
    /// source is dropped.
    pub fn aggregate(&mut self, error: SimError, source: ErrorSource) {
        let bucket = self.bucket_mut(source);
        if !bucket.contains(&error) {
            bucket.push(error);
        }
    }

    /// Drain the pending reports for one source.
    #[must_use]
    pub fn get_aggregates(&mut self, source: ErrorSource) -> Vec<SimError> {
        std::mem::take(self.bucket_mut(source))
    }

    #[must_use]
    pub fn is_empty(&self, source: ErrorSource) -> bool {
        match source {
            ErrorSource::Blue => self.blue.is_empty(),
            ErrorSource::Yellow => self.yellow.is_empty(),
            ErrorSource::Config => self.config.is_empty(),
        }
    }

    fn bucket_mut(&mut self, source: ErrorSource) -> &mut Vec<SimError> {
        match source {
            ErrorSource::Blue => &mut self.blue,
            ErrorSource::Yellow => &mut self.yellow,
            ErrorSource::Config => &mut self.config,
        }
    }
}
