use super::{Point, Precision, TransportError};

/// Configuration for a [`BatchPoints`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchPointsConfig {
    /// Database (or bucket) the batch is written to.
    pub database: String,

    /// Precision token, such as `ns`, `us`, `ms` or `s`. An empty token means nanoseconds.
    pub precision: String,

    /// Optional retention policy to write into.
    pub retention_policy: Option<String>,
}

impl BatchPointsConfig {
    /// Creates a new `BatchPointsConfig` for the given database, with nanosecond precision.
    pub fn new<D>(database: D) -> Self
    where
        D: Into<String>,
    {
        BatchPointsConfig { database: database.into(), ..Default::default() }
    }

    /// Sets the precision token.
    #[must_use]
    pub fn with_precision<P>(mut self, precision: P) -> Self
    where
        P: Into<String>,
    {
        self.precision = precision.into();
        self
    }

    /// Sets the retention policy.
    #[must_use]
    pub fn with_retention_policy<R>(mut self, retention_policy: R) -> Self
    where
        R: Into<String>,
    {
        self.retention_policy = Some(retention_policy.into());
        self
    }
}

/// A group of points written to one database with one precision.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchPoints {
    database: String,
    precision: Precision,
    retention_policy: Option<String>,
    points: Vec<Point>,
}

impl BatchPoints {
    /// Creates an empty batch from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidPrecision`] if the precision token is not recognized.
    pub fn new(config: BatchPointsConfig) -> Result<Self, TransportError> {
        let precision = config.precision.parse::<Precision>()?;
        Ok(BatchPoints {
            database: config.database,
            precision,
            retention_policy: config.retention_policy,
            points: Vec::new(),
        })
    }

    /// Adds a point to the batch.
    pub fn add_point(&mut self, point: Point) {
        self.points.push(point);
    }

    /// Returns the points in insertion order.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Returns the target database.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Returns the timestamp precision.
    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Returns the retention policy, if any.
    pub fn retention_policy(&self) -> Option<&str> {
        self.retention_policy.as_deref()
    }

    /// Returns `true` if the batch holds no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Encodes every point as newline-terminated line protocol.
    pub fn to_line_protocol(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for point in &self.points {
            point.write_line(&mut buf, self.precision);
            buf.push(b'\n');
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::{BatchPoints, BatchPointsConfig};
    use crate::transport::{Point, Precision};
    use crate::Metric;

    #[test]
    fn rejects_unknown_precision() {
        let config = BatchPointsConfig::new("test").with_precision("fortnight");
        assert!(BatchPoints::new(config).is_err());
    }

    #[test]
    fn default_precision_is_nanoseconds() {
        let batch = BatchPoints::new(BatchPointsConfig::new("test")).unwrap();
        assert_eq!(batch.precision(), Precision::Nanoseconds);
        assert_eq!(batch.database(), "test");
        assert!(batch.is_empty());
    }

    #[test]
    fn encodes_newline_terminated_lines() {
        let time = DateTime::<Utc>::from_timestamp(10, 0).unwrap();
        let config = BatchPointsConfig::new("test").with_precision("s").with_retention_policy("week");
        let mut batch = BatchPoints::new(config).unwrap();

        for i in 0..2 {
            let metric = Metric::new("m").with_field("v", i);
            batch.add_point(Point::new(&metric.name, &metric.tags, &metric.fields, time).unwrap());
        }

        assert_eq!(batch.retention_policy(), Some("week"));
        assert_eq!(batch.to_line_protocol(), b"m v=0i 10\nm v=1i 10\n");
    }
}
