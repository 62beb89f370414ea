use std::{fmt, str::FromStr};

use super::TransportError;

/// Timestamp resolution used when encoding points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Precision {
    /// Nanosecond resolution.
    #[default]
    Nanoseconds,

    /// Microsecond resolution.
    Microseconds,

    /// Millisecond resolution.
    Milliseconds,

    /// Second resolution.
    Seconds,

    /// Minute resolution.
    Minutes,

    /// Hour resolution.
    Hours,
}

impl Precision {
    /// Returns the value of the `precision` query parameter understood by the InfluxDB write endpoint.
    pub const fn query_value(self) -> &'static str {
        match self {
            Self::Nanoseconds => "ns",
            Self::Microseconds => "u",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
            Self::Minutes => "m",
            Self::Hours => "h",
        }
    }

    /// Returns the number of nanoseconds in one unit of this precision.
    pub const fn nanos_multiplier(self) -> i64 {
        match self {
            Self::Nanoseconds => 1,
            Self::Microseconds => 1_000,
            Self::Milliseconds => 1_000_000,
            Self::Seconds => 1_000_000_000,
            Self::Minutes => 60 * 1_000_000_000,
            Self::Hours => 3_600 * 1_000_000_000,
        }
    }

    /// Converts a nanosecond timestamp into this precision, truncating towards zero.
    pub const fn convert_nanos(self, timestamp_nanos: i64) -> i64 {
        timestamp_nanos / self.nanos_multiplier()
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.query_value())
    }
}

impl FromStr for Precision {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "" | "ns" | "nanosecond" | "nanoseconds" => Ok(Precision::Nanoseconds),
            "u" | "us" | "µs" | "μs" | "microsecond" | "microseconds" => Ok(Precision::Microseconds),
            "ms" | "millisecond" | "milliseconds" => Ok(Precision::Milliseconds),
            "s" | "second" | "seconds" => Ok(Precision::Seconds),
            "m" | "minute" | "minutes" => Ok(Precision::Minutes),
            "h" | "hour" | "hours" => Ok(Precision::Hours),
            _ => Err(TransportError::InvalidPrecision { token: s.to_owned() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Precision;

    #[test]
    fn parse_tokens() {
        let cases = [
            ("", Precision::Nanoseconds),
            ("ns", Precision::Nanoseconds),
            ("us", Precision::Microseconds),
            ("u", Precision::Microseconds),
            ("µs", Precision::Microseconds),
            ("ms", Precision::Milliseconds),
            ("MS", Precision::Milliseconds),
            ("s", Precision::Seconds),
            ("seconds", Precision::Seconds),
            ("m", Precision::Minutes),
            ("h", Precision::Hours),
        ];

        for (token, expected) in cases {
            assert_eq!(token.parse::<Precision>().unwrap(), expected, "token {token:?}");
        }
    }

    #[test]
    fn parse_invalid_token() {
        assert!("fortnight".parse::<Precision>().is_err());
        assert!("1s".parse::<Precision>().is_err());
        assert!("n".parse::<Precision>().is_err());
    }

    #[test]
    fn convert_truncates() {
        let ts = 1_700_000_000_123_456_789;
        assert_eq!(Precision::Nanoseconds.convert_nanos(ts), ts);
        assert_eq!(Precision::Microseconds.convert_nanos(ts), 1_700_000_000_123_456);
        assert_eq!(Precision::Milliseconds.convert_nanos(ts), 1_700_000_000_123);
        assert_eq!(Precision::Seconds.convert_nanos(ts), 1_700_000_000);
        assert_eq!(Precision::Minutes.convert_nanos(ts), 28_333_333);
        assert_eq!(Precision::Hours.convert_nanos(ts), 472_222);
    }
}
