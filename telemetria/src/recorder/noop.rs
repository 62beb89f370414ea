use crate::{Metric, Recorder, RecorderError};

/// A no-op recorder.
///
/// Every write succeeds without doing anything. Useful for disabling telemetry without branching at the call sites, and
/// as a stand-in during tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoRecorder;

impl NoRecorder {
    /// Returns the same recorder: there is no precision to change.
    #[must_use]
    pub fn with_precision(self, _precision: &str) -> Self {
        self
    }
}

impl Recorder for NoRecorder {
    fn write_one(&self, _metric: &Metric) -> Result<(), RecorderError> {
        Ok(())
    }

    fn write_many(&self, _metrics: &[Metric]) -> Result<(), RecorderError> {
        Ok(())
    }
}
