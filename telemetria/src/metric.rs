use std::collections::BTreeMap;

/// A single field value.
///
/// Field values are the actual data of a metric. In InfluxDB, each field becomes a column of the measurement.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// A string value.
    String(String),

    /// A 64-bit floating-point value.
    Float(f64),

    /// A signed 64-bit integer value.
    Integer(i64),

    /// A boolean value.
    Boolean(bool),
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_owned())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<f32> for FieldValue {
    fn from(value: f32) -> Self {
        FieldValue::Float(f64::from(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(i64::from(value))
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Integer(i64::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

/// A recordable data point identified by a name and a set of fields.
///
/// Metrics can also be decorated with tags: key/value pairs that the time-series store indexes, which makes them the
/// right place for anything you intend to search or group by.
///
/// A `Metric` is not validated when it is built. An empty name or an empty set of fields is only rejected when a
/// [`Recorder`](crate::Recorder) converts it into a point during a write.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metric {
    /// The metric name. In InfluxDB this is the measurement.
    pub name: String,

    /// The field values of the metric, keyed by field name.
    pub fields: BTreeMap<String, FieldValue>,

    /// Optional, indexed metadata for the metric.
    pub tags: BTreeMap<String, String>,
}

impl Metric {
    /// Creates a new `Metric` with the given name and no fields or tags.
    pub fn new<N>(name: N) -> Self
    where
        N: Into<String>,
    {
        Metric { name: name.into(), fields: BTreeMap::new(), tags: BTreeMap::new() }
    }

    /// Adds a field to the metric, replacing any existing field with the same key.
    #[must_use]
    pub fn with_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Adds a tag to the metric, replacing any existing tag with the same key.
    #[must_use]
    pub fn with_tag<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.tags.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldValue, Metric};

    #[test]
    fn builder_replaces_duplicate_keys() {
        let metric = Metric::new("things")
            .with_field("value", 1)
            .with_field("value", 2.5)
            .with_tag("host", "a")
            .with_tag("host", "b");

        assert_eq!(metric.fields.len(), 1);
        assert_eq!(metric.fields["value"], FieldValue::Float(2.5));
        assert_eq!(metric.tags["host"], "b");
    }

    #[test]
    fn field_value_conversions() {
        assert_eq!(FieldValue::from("1"), FieldValue::String("1".to_owned()));
        assert_eq!(FieldValue::from(7i32), FieldValue::Integer(7));
        assert_eq!(FieldValue::from(7u32), FieldValue::Integer(7));
        assert_eq!(FieldValue::from(true), FieldValue::Boolean(true));
        assert_eq!(FieldValue::from(0.5f32), FieldValue::Float(0.5));
    }
}
