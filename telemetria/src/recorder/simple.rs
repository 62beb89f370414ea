use std::{fmt, sync::Arc};

use chrono::Utc;
use tracing::{debug, trace};

use crate::{
    transport::{BatchPoints, BatchPointsConfig, Point, TimeSeriesWriter},
    Metric, Recorder, RecorderError,
};

/// Precision applied to recorders built by the factory.
pub const DEFAULT_PRECISION: &str = "ns";

/// A recorder that writes every call straight through to a time-series writer.
///
/// It uses the defaults of the underlying writer and only allows configuring the precision. Cloning a `SimpleRecorder`,
/// or calling [`with_precision`](SimpleRecorder::with_precision), shares the same writer rather than opening a new
/// connection.
#[derive(Clone)]
pub struct SimpleRecorder {
    writer: Arc<dyn TimeSeriesWriter>,
    database: String,
    precision: String,
}

impl SimpleRecorder {
    /// Creates a new `SimpleRecorder` writing to `database` through `writer`, with nanosecond precision.
    pub fn new<D>(writer: Arc<dyn TimeSeriesWriter>, database: D) -> Self
    where
        D: Into<String>,
    {
        SimpleRecorder { writer, database: database.into(), precision: DEFAULT_PRECISION.to_owned() }
    }

    /// Returns a new recorder with the given precision token, sharing this recorder's writer.
    ///
    /// The token is not validated here: an unrecognized token makes every subsequent write fail with
    /// [`RecorderError::BatchConstruction`].
    #[must_use]
    pub fn with_precision<P>(&self, precision: P) -> Self
    where
        P: Into<String>,
    {
        SimpleRecorder {
            writer: Arc::clone(&self.writer),
            database: self.database.clone(),
            precision: precision.into(),
        }
    }

    /// Returns the target database.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Returns the precision token.
    pub fn precision(&self) -> &str {
        &self.precision
    }

    /// Returns the underlying writer.
    pub fn writer(&self) -> &Arc<dyn TimeSeriesWriter> {
        &self.writer
    }

    /// Returns the transport ID of the underlying writer.
    pub fn transport_id(&self) -> &'static str {
        self.writer.transport_id()
    }

    fn build_batch(&self, metrics: &[Metric]) -> Result<BatchPoints, RecorderError> {
        let config = BatchPointsConfig::new(self.database.as_str()).with_precision(self.precision.as_str());
        let mut batch = BatchPoints::new(config).map_err(RecorderError::BatchConstruction)?;

        for metric in metrics {
            let point = Point::new(&metric.name, &metric.tags, &metric.fields, Utc::now())
                .map_err(|source| RecorderError::PointConstruction { metric: metric.name.clone(), source })?;
            batch.add_point(point);
        }

        Ok(batch)
    }
}

impl fmt::Debug for SimpleRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleRecorder")
            .field("transport", &self.writer.transport_id())
            .field("database", &self.database)
            .field("precision", &self.precision)
            .finish()
    }
}

impl Recorder for SimpleRecorder {
    fn write_one(&self, metric: &Metric) -> Result<(), RecorderError> {
        self.write_many(std::slice::from_ref(metric))
    }

    fn write_many(&self, metrics: &[Metric]) -> Result<(), RecorderError> {
        // The whole batch is converted before anything touches the network, so a bad metric never leaves a partial
        // write behind.
        let batch = self.build_batch(metrics)?;

        trace!(
            transport = self.writer.transport_id(),
            database = %self.database,
            points = batch.points().len(),
            "Writing batch."
        );

        self.writer.write(&batch).map_err(|e| {
            debug!(transport = self.writer.transport_id(), error = %e, "Failed to write batch.");
            RecorderError::Write(e)
        })
    }
}
