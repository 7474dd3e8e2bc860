//! Progress reporting to the caller.
//!
//! The installer emits [`ProgressEvent`]s synchronously into a caller
//! supplied [`ProgressSink`]. Percentages never decrease during a run; a
//! failure is reported once with [`FAILED_PERCENT`].

use std::fmt;

/// Percentage carried by the failure event.
pub const FAILED_PERCENT: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub step: String,
    /// 0-100, or [`FAILED_PERCENT`].
    pub percent: i32,
    pub detail: Option<String>,
}

impl ProgressEvent {
    pub fn is_failure(&self) -> bool {
        self.percent < 0
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_failure() {
            write!(f, "[FAIL] {}", self.step)?;
        } else {
            write!(f, "[{:>3}%] {}", self.percent, self.step)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, ": {}", detail)?;
        }
        Ok(())
    }
}

pub trait ProgressSink {
    fn emit(&mut self, event: ProgressEvent);
}

impl<F: FnMut(ProgressEvent)> ProgressSink for F {
    fn emit(&mut self, event: ProgressEvent) {
        self(event)
    }
}

/// Wraps a sink and keeps reported percentages monotonic.
pub struct ProgressTracker<'a> {
    sink: &'a mut dyn ProgressSink,
    last: i32,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(sink: &'a mut dyn ProgressSink) -> Self {
        Self { sink, last: 0 }
    }

    /// Report a checkpoint. Values below the last one are raised to it.
    pub fn report(&mut self, step: &str, percent: u8, detail: Option<String>) {
        let percent = i32::from(percent.min(100)).max(self.last);
        self.last = percent;
        tracing::info!("[{:>3}%] {}", percent, step);
        self.sink.emit(ProgressEvent {
            step: step.to_string(),
            percent,
            detail,
        });
    }

    pub fn fail(&mut self, step: &str, message: String) {
        self.sink.emit(ProgressEvent {
            step: step.to_string(),
            percent: FAILED_PERCENT,
            detail: Some(message),
        });
    }

    pub fn last_percent(&self) -> i32 {
        self.last
    }
}
