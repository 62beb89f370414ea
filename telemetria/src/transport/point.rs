use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::{Precision, TransportError};
use crate::FieldValue;

/// Maximum length, in bytes, of a series key (measurement, tags and a field key).
pub const MAX_KEY_LENGTH: usize = 65535;

// Separator InfluxDB places between the series key and a field key when computing key sizes.
const FIELD_KEY_SEPARATOR_LEN: usize = 4;

const MEASUREMENT_ESCAPES: &[u8] = b", ";
const KEY_ESCAPES: &[u8] = b",= ";
const STRING_FIELD_ESCAPES: &[u8] = b"\"\\";

/// A single row, ready to be encoded in line protocol.
#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    name: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp_nanos: i64,
}

impl Point {
    /// Creates a new `Point`.
    ///
    /// Tags with an empty key or value are dropped, as the write endpoint would ignore them anyway.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidPoint`] if the name is empty, if there are no fields, if a field key is empty,
    /// if a float field is NaN or infinite, if the timestamp cannot be represented in nanoseconds, or if the series key
    /// for any field would exceed [`MAX_KEY_LENGTH`].
    pub fn new(
        name: &str,
        tags: &BTreeMap<String, String>,
        fields: &BTreeMap<String, FieldValue>,
        time: DateTime<Utc>,
    ) -> Result<Self, TransportError> {
        if name.is_empty() {
            return Err(invalid_point("measurement name must not be empty"));
        }

        if fields.is_empty() {
            return Err(invalid_point("point without fields is unsupported"));
        }

        for (key, value) in fields {
            if key.is_empty() {
                return Err(invalid_point("all fields must have non-empty names"));
            }

            if let FieldValue::Float(v) = value {
                if v.is_nan() {
                    return Err(invalid_point(format!("NaN is an unsupported value for field {key}")));
                }
                if v.is_infinite() {
                    return Err(invalid_point(format!("invalid number for field {key}")));
                }
            }
        }

        let timestamp_nanos = time
            .timestamp_nanos_opt()
            .ok_or_else(|| invalid_point(format!("time {time} is outside the supported range")))?;

        let tags = tags
            .iter()
            .filter(|(k, v)| !k.is_empty() && !v.is_empty())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<BTreeMap<_, _>>();

        let point = Point { name: name.to_owned(), tags, fields: fields.clone(), timestamp_nanos };

        let mut key_buf = Vec::new();
        point.write_series_key(&mut key_buf);
        for field_key in point.fields.keys() {
            let key_size = key_buf.len() + FIELD_KEY_SEPARATOR_LEN + field_key.len();
            if key_size > MAX_KEY_LENGTH {
                return Err(invalid_point(format!(
                    "max key length exceeded: {key_size} > {MAX_KEY_LENGTH}"
                )));
            }
        }

        Ok(point)
    }

    /// Returns the measurement name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tags of the point, sorted by key.
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Returns the fields of the point, sorted by key.
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Returns the timestamp of the point, in nanoseconds since the Unix epoch.
    pub fn timestamp_nanos(&self) -> i64 {
        self.timestamp_nanos
    }

    /// Returns the encoded length of the point, excluding the trailing newline.
    pub fn encoded_len(&self, precision: Precision) -> usize {
        let mut buf = Vec::new();
        self.write_line(&mut buf, precision);
        buf.len()
    }

    /// Encodes the point as a line-protocol string without a trailing newline.
    pub fn to_line(&self, precision: Precision) -> String {
        let mut buf = Vec::new();
        self.write_line(&mut buf, precision);
        // Every piece written is either valid UTF-8 taken from a `String` or ASCII.
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Appends the point in line protocol, without a trailing newline, to `buf`.
    pub fn write_line(&self, buf: &mut Vec<u8>, precision: Precision) {
        self.write_series_key(buf);

        let mut int_writer = itoa::Buffer::new();
        let mut float_writer = ryu::Buffer::new();

        buf.push(b' ');
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i != 0 {
                buf.push(b',');
            }
            write_escaped(buf, key, KEY_ESCAPES);
            buf.push(b'=');

            match value {
                FieldValue::String(s) => {
                    buf.push(b'"');
                    write_escaped(buf, s, STRING_FIELD_ESCAPES);
                    buf.push(b'"');
                }
                FieldValue::Float(v) => buf.extend_from_slice(float_writer.format(*v).as_bytes()),
                FieldValue::Integer(v) => {
                    buf.extend_from_slice(int_writer.format(*v).as_bytes());
                    buf.push(b'i');
                }
                FieldValue::Boolean(v) => {
                    buf.extend_from_slice(if *v { b"true".as_slice() } else { b"false".as_slice() });
                }
            }
        }

        buf.push(b' ');
        let timestamp = precision.convert_nanos(self.timestamp_nanos);
        buf.extend_from_slice(int_writer.format(timestamp).as_bytes());
    }

    fn write_series_key(&self, buf: &mut Vec<u8>) {
        write_escaped(buf, &self.name, MEASUREMENT_ESCAPES);
        for (key, value) in &self.tags {
            buf.push(b',');
            write_escaped(buf, key, KEY_ESCAPES);
            buf.push(b'=');
            write_escaped(buf, value, KEY_ESCAPES);
        }
    }
}

fn write_escaped(buf: &mut Vec<u8>, s: &str, escapes: &[u8]) {
    for b in s.bytes() {
        if escapes.contains(&b) {
            buf.push(b'\\');
        }
        buf.push(b);
    }
}

fn invalid_point<R: Into<String>>(reason: R) -> TransportError {
    TransportError::InvalidPoint { reason: reason.into() }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{DateTime, Utc};
    use proptest::prelude::*;

    use super::{Point, MAX_KEY_LENGTH};
    use crate::{transport::Precision, FieldValue, Metric};

    fn fixed_time() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap()
    }

    fn point_from(metric: &Metric) -> Point {
        Point::new(&metric.name, &metric.tags, &metric.fields, fixed_time()).unwrap()
    }

    #[test]
    fn encode_sorted_tags_and_fields() {
        let metric = Metric::new("things")
            .with_tag("three", "four")
            .with_tag("one", "two")
            .with_field("field_one", "1")
            .with_field("field_2", "2");

        let point = point_from(&metric);
        assert_eq!(
            point.to_line(Precision::Nanoseconds),
            "things,one=two,three=four field_2=\"2\",field_one=\"1\" 1700000000123456789"
        );
    }

    #[test]
    fn encode_value_types() {
        let metric = Metric::new("cpu")
            .with_field("b", true)
            .with_field("f", 0.5)
            .with_field("i", -42)
            .with_field("whole", 3.0)
            .with_field("s", "ok");

        let point = point_from(&metric);
        assert_eq!(
            point.to_line(Precision::Seconds),
            "cpu b=true,f=0.5,i=-42i,s=\"ok\",whole=3.0 1700000000"
        );
    }

    #[test]
    fn encode_escapes() {
        let metric = Metric::new("disk usage,total")
            .with_tag("mount point", "/var,lib=x")
            .with_field("free space", "say \"hi\" \\o/");

        let point = point_from(&metric);
        assert_eq!(
            point.to_line(Precision::Milliseconds),
            "disk\\ usage\\,total,mount\\ point=/var\\,lib\\=x free\\ space=\"say \\\"hi\\\" \\\\o/\" 1700000000123"
        );
    }

    #[test]
    fn empty_tags_are_dropped() {
        let metric = Metric::new("m").with_tag("", "x").with_tag("y", "").with_tag("z", "1").with_field("v", 1);

        let point = point_from(&metric);
        assert_eq!(point.tags().len(), 1);
        assert_eq!(point.to_line(Precision::Seconds), "m,z=1 v=1i 1700000000");
    }

    #[test]
    fn invalid_points() {
        let fields = BTreeMap::from([("v".to_owned(), FieldValue::Integer(1))]);
        let tags = BTreeMap::new();

        assert!(Point::new("", &tags, &fields, fixed_time()).is_err());
        assert!(Point::new("m", &tags, &BTreeMap::new(), fixed_time()).is_err());

        let empty_key = BTreeMap::from([(String::new(), FieldValue::Integer(1))]);
        assert!(Point::new("m", &tags, &empty_key, fixed_time()).is_err());

        let nan = BTreeMap::from([("v".to_owned(), FieldValue::Float(f64::NAN))]);
        assert!(Point::new("m", &tags, &nan, fixed_time()).is_err());

        let inf = BTreeMap::from([("v".to_owned(), FieldValue::Float(f64::INFINITY))]);
        assert!(Point::new("m", &tags, &inf, fixed_time()).is_err());

        let long_name = "m".repeat(MAX_KEY_LENGTH);
        assert!(Point::new(&long_name, &tags, &fields, fixed_time()).is_err());
    }

    #[test]
    fn encoded_len_matches_line() {
        let metric = Metric::new("m").with_tag("a", "b").with_field("v", 1.25);
        let point = point_from(&metric);
        assert_eq!(point.encoded_len(Precision::Nanoseconds), point.to_line(Precision::Nanoseconds).len());
    }

    proptest! {
        #[test]
        fn line_has_exactly_two_unescaped_spaces(
            name in "[a-z ,=]{1,12}",
            tag_key in "[a-z ,=]{1,8}",
            tag_value in "[a-z ,=]{1,8}",
            field_key in "[a-z ,=]{1,8}",
            value in any::<i64>(),
        ) {
            let metric = Metric::new(name).with_tag(tag_key, tag_value).with_field(field_key, value);
            let line = point_from(&metric).to_line(Precision::Nanoseconds);

            let bytes = line.as_bytes();
            let unescaped_spaces = bytes
                .iter()
                .enumerate()
                .filter(|(i, b)| **b == b' ' && (*i == 0 || bytes[i - 1] != b'\\'))
                .count();
            prop_assert_eq!(unescaped_spaces, 2);
            prop_assert!(line.ends_with(" 1700000000123456789"));
        }
    }
}
