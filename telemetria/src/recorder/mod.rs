use std::sync::Arc;

use tracing::debug;

mod address;
use self::address::RecorderAddress;

mod noop;
pub use self::noop::NoRecorder;

mod simple;
pub use self::simple::{SimpleRecorder, DEFAULT_PRECISION};

use crate::{
    transport::{HttpConfig, HttpWriter, TimeSeriesWriter, UdpConfig, UdpWriter},
    Metric, RecorderError,
};

/// A trait for submitting metrics to a persistent time-series store.
///
/// Implementations are configured to write to one specific endpoint, database and precision.
pub trait Recorder {
    /// Sends a single metric to the recorder endpoint.
    ///
    /// This is equivalent to calling [`write_many`](Recorder::write_many) with a single-element slice.
    ///
    /// # Errors
    ///
    /// See [`write_many`](Recorder::write_many).
    fn write_one(&self, metric: &Metric) -> Result<(), RecorderError>;

    /// Sends a batch of metrics to the recorder endpoint in a single transport call.
    ///
    /// Each metric is timestamped when it is converted into a point. If any metric cannot be converted, nothing is
    /// written. Failed writes are not retried.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::BatchConstruction`] if the precision is invalid, [`RecorderError::PointConstruction`]
    /// for the first metric that cannot be converted, and [`RecorderError::Write`] if the transport fails.
    fn write_many(&self, metrics: &[Metric]) -> Result<(), RecorderError>;
}

// Blanket implementations.
macro_rules! impl_recorder {
    ($inner_ty:ident, $ptr_ty:ty) => {
        impl<$inner_ty> $crate::Recorder for $ptr_ty
        where
            $inner_ty: $crate::Recorder + ?Sized,
        {
            fn write_one(&self, metric: &$crate::Metric) -> Result<(), $crate::RecorderError> {
                std::ops::Deref::deref(self).write_one(metric)
            }

            fn write_many(&self, metrics: &[$crate::Metric]) -> Result<(), $crate::RecorderError> {
                std::ops::Deref::deref(self).write_many(metrics)
            }
        }
    };
}

impl_recorder!(T, &T);
impl_recorder!(T, std::boxed::Box<T>);
impl_recorder!(T, std::sync::Arc<T>);

/// Either an active recorder or a disabled one.
///
/// This is what [`new_recorder`] returns. Call sites can hold an `AnyRecorder` and write unconditionally: when telemetry
/// is disabled, writes are no-ops.
#[derive(Clone, Debug)]
pub enum AnyRecorder {
    /// Writes through to a transport.
    Simple(SimpleRecorder),

    /// Discards everything.
    Disabled(NoRecorder),
}

impl AnyRecorder {
    /// Creates a disabled recorder.
    pub const fn disabled() -> Self {
        AnyRecorder::Disabled(NoRecorder)
    }

    /// Returns `true` if this recorder discards every write.
    pub const fn is_disabled(&self) -> bool {
        matches!(self, AnyRecorder::Disabled(_))
    }

    /// Returns a new recorder with the given precision token.
    ///
    /// Active recorders share their transport with the returned value. Disabled recorders are returned unchanged.
    #[must_use]
    pub fn with_precision(&self, precision: &str) -> Self {
        match self {
            AnyRecorder::Simple(recorder) => AnyRecorder::Simple(recorder.with_precision(precision)),
            AnyRecorder::Disabled(recorder) => AnyRecorder::Disabled(recorder.with_precision(precision)),
        }
    }

    /// Returns the active recorder, if this is not a disabled one.
    pub fn as_simple(&self) -> Option<&SimpleRecorder> {
        match self {
            AnyRecorder::Simple(recorder) => Some(recorder),
            AnyRecorder::Disabled(_) => None,
        }
    }
}

impl From<SimpleRecorder> for AnyRecorder {
    fn from(recorder: SimpleRecorder) -> Self {
        AnyRecorder::Simple(recorder)
    }
}

impl From<NoRecorder> for AnyRecorder {
    fn from(recorder: NoRecorder) -> Self {
        AnyRecorder::Disabled(recorder)
    }
}

impl Recorder for AnyRecorder {
    fn write_one(&self, metric: &Metric) -> Result<(), RecorderError> {
        match self {
            AnyRecorder::Simple(recorder) => recorder.write_one(metric),
            AnyRecorder::Disabled(recorder) => recorder.write_one(metric),
        }
    }

    fn write_many(&self, metrics: &[Metric]) -> Result<(), RecorderError> {
        match self {
            AnyRecorder::Simple(recorder) => recorder.write_many(metrics),
            AnyRecorder::Disabled(recorder) => recorder.write_many(metrics),
        }
    }
}

/// Creates a recorder that writes to the time-series store at the given address.
///
/// Supported addresses:
///
/// - `http://[user[:password]@]host[:port]/database` (or `https://`) writes through the HTTP API, authenticating with
///   basic auth when credentials are present.
/// - `udp://host:port/database` writes datagrams to a UDP listener.
///
/// The database is the URL path without its leading `/`; it may be empty. Recorders start with nanosecond precision.
///
/// # Errors
///
/// Returns [`RecorderError::AddressParse`] if the address is not a valid URL, [`RecorderError::UnsupportedScheme`] if
/// the scheme is not `http`, `https` or `udp` (a `udp` address without a port is also an address error), and
/// [`RecorderError::TransportConstruction`] if the transport cannot be created.
pub fn new_recorder(address: &str) -> Result<AnyRecorder, RecorderError> {
    let parsed = RecorderAddress::try_from(address)?;
    let transport = parsed.transport_id();

    let (writer, database): (Arc<dyn TimeSeriesWriter>, String) = match parsed {
        RecorderAddress::Http { endpoint, username, password, database } => {
            let mut config = HttpConfig::new(endpoint);
            if let Some(username) = username {
                config = config.with_credentials(username, password);
            }
            let writer = HttpWriter::new(config)
                .map_err(|source| RecorderError::TransportConstruction { transport, source })?;
            (Arc::new(writer), database)
        }
        RecorderAddress::Udp { target, database } => {
            let writer = UdpWriter::new(UdpConfig::new(target))
                .map_err(|source| RecorderError::TransportConstruction { transport, source })?;
            (Arc::new(writer), database)
        }
    };

    debug!(transport, %database, "Created recorder.");

    Ok(AnyRecorder::Simple(SimpleRecorder::new(writer, database)))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::{new_recorder, AnyRecorder, NoRecorder, Recorder, SimpleRecorder};
    use crate::{
        transport::{BatchPoints, TimeSeriesWriter, TransportError},
        FieldValue, Metric, RecorderError,
    };

    /// Captures every batch handed to it, optionally failing writes.
    #[derive(Default)]
    struct CapturingWriter {
        batches: Mutex<Vec<BatchPoints>>,
        fail: bool,
    }

    impl CapturingWriter {
        fn failing() -> Self {
            CapturingWriter { batches: Mutex::default(), fail: true }
        }

        fn batches(&self) -> Vec<BatchPoints> {
            self.batches.lock().unwrap().clone()
        }
    }

    impl TimeSeriesWriter for CapturingWriter {
        fn write(&self, batch: &BatchPoints) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::Status { status: 500, body: "boom".to_owned() });
            }
            self.batches.lock().unwrap().push(batch.clone());
            Ok(())
        }

        fn transport_id(&self) -> &'static str {
            "capture"
        }
    }

    fn things() -> Metric {
        Metric::new("things")
            .with_tag("one", "two")
            .with_tag("three", "four")
            .with_field("field_one", "1")
            .with_field("field_2", "2")
    }

    // Strips the trailing timestamp, which differs between writes.
    fn lines_without_timestamps(batch: &BatchPoints) -> Vec<String> {
        batch
            .points()
            .iter()
            .map(|p| {
                let line = p.to_line(batch.precision());
                line.rsplit_once(' ').map(|(head, _)| head.to_owned()).unwrap_or(line)
            })
            .collect()
    }

    #[test]
    fn blanket_implementations() {
        fn is_recorder<T: Recorder>(_recorder: T) {}

        is_recorder(NoRecorder);
        is_recorder(&NoRecorder);
        is_recorder(Box::new(NoRecorder));
        is_recorder(Arc::new(NoRecorder));
        is_recorder(AnyRecorder::disabled());
        is_recorder(Box::new(AnyRecorder::disabled()) as Box<dyn Recorder>);
    }

    #[test]
    fn http_recorder_from_address() {
        let recorder = new_recorder("http://localhost:8086/test").unwrap();
        let simple = recorder.as_simple().expect("expected an active recorder");
        assert_eq!(simple.transport_id(), "http");
        assert_eq!(simple.database(), "test");
        assert_eq!(simple.precision(), "ns");
    }

    #[test]
    fn http_recorder_without_path() {
        let recorder = new_recorder("http://localhost").unwrap();
        let simple = recorder.as_simple().unwrap();
        assert_eq!(simple.transport_id(), "http");
        assert_eq!(simple.database(), "");
    }

    #[test]
    fn udp_recorder_from_address() {
        let recorder = new_recorder("udp://localhost:8089").unwrap();
        let simple = recorder.as_simple().unwrap();
        assert_eq!(simple.transport_id(), "udp");
        assert_eq!(simple.database(), "");
        assert_eq!(simple.precision(), "ns");
    }

    #[test]
    fn invalid_addresses() {
        assert!(matches!(new_recorder("localhost"), Err(RecorderError::AddressParse { .. })));
        assert!(matches!(new_recorder(""), Err(RecorderError::AddressParse { .. })));
        assert!(matches!(
            new_recorder("tcp://localhost:8086/test"),
            Err(RecorderError::UnsupportedScheme { .. })
        ));
        assert!(matches!(new_recorder("udp://localhost/test"), Err(RecorderError::AddressParse { .. })));
    }

    #[test]
    fn unresolvable_udp_host_fails_transport_construction() {
        // `.invalid` is reserved and never resolves.
        let result = new_recorder("udp://telemetria.invalid:8089/test");
        match result {
            Err(RecorderError::TransportConstruction { transport, .. }) => assert_eq!(transport, "udp"),
            other => panic!("expected a transport construction error, got {other:?}"),
        }
    }

    #[test]
    fn write_one_matches_write_many() {
        let writer = Arc::new(CapturingWriter::default());
        let recorder = SimpleRecorder::new(writer.clone(), "test");

        recorder.write_one(&things()).unwrap();
        recorder.write_many(&[things()]).unwrap();

        let batches = writer.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].database(), batches[1].database());
        assert_eq!(batches[0].precision(), batches[1].precision());
        assert_eq!(lines_without_timestamps(&batches[0]), lines_without_timestamps(&batches[1]));
        assert_eq!(
            lines_without_timestamps(&batches[0]),
            vec!["things,one=two,three=four field_2=\"2\",field_one=\"1\"".to_owned()]
        );
    }

    #[test]
    fn write_many_is_one_transport_call() {
        let writer = Arc::new(CapturingWriter::default());
        let recorder = SimpleRecorder::new(writer.clone(), "test");

        let metrics = (0..3).map(|i| Metric::new("m").with_field("v", i)).collect::<Vec<_>>();
        recorder.write_many(&metrics).unwrap();

        let batches = writer.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].points().len(), 3);
        assert_eq!(batches[0].points()[2].fields()["v"], FieldValue::Integer(2));
    }

    #[test]
    fn invalid_metric_aborts_the_batch() {
        let writer = Arc::new(CapturingWriter::default());
        let recorder = SimpleRecorder::new(writer.clone(), "test");

        let metrics = vec![things(), Metric::new("empty"), things()];
        match recorder.write_many(&metrics) {
            Err(RecorderError::PointConstruction { metric, .. }) => assert_eq!(metric, "empty"),
            other => panic!("expected point construction error, got {other:?}"),
        }
        assert!(writer.batches().is_empty());
    }

    #[test]
    fn invalid_precision_fails_batch_construction() {
        let writer = Arc::new(CapturingWriter::default());
        let recorder = SimpleRecorder::new(writer.clone(), "test").with_precision("fortnight");

        assert!(matches!(recorder.write_one(&things()), Err(RecorderError::BatchConstruction(_))));
        assert!(writer.batches().is_empty());
    }

    #[test]
    fn transport_failure_is_a_write_error() {
        let recorder = SimpleRecorder::new(Arc::new(CapturingWriter::failing()), "test");
        assert!(matches!(recorder.write_one(&things()), Err(RecorderError::Write(_))));
    }

    #[test]
    fn with_precision_returns_new_value() {
        let writer: Arc<dyn TimeSeriesWriter> = Arc::new(CapturingWriter::default());
        let original = SimpleRecorder::new(writer, "test");
        let changed = original.with_precision("s");

        assert_eq!(original.precision(), "ns");
        assert_eq!(changed.precision(), "s");
        assert_eq!(changed.database(), "test");
        assert!(Arc::ptr_eq(original.writer(), changed.writer()));

        let any = AnyRecorder::from(original);
        let any_changed = any.with_precision("ms");
        assert_eq!(any.as_simple().unwrap().precision(), "ns");
        assert_eq!(any_changed.as_simple().unwrap().precision(), "ms");
    }

    #[test]
    fn precision_applies_to_written_timestamps() {
        let writer = Arc::new(CapturingWriter::default());
        let recorder = SimpleRecorder::new(writer.clone(), "test").with_precision("s");
        recorder.write_one(&things()).unwrap();

        let batches = writer.batches();
        let line = batches[0].points()[0].to_line(batches[0].precision());
        let timestamp = line.rsplit_once(' ').unwrap().1;
        // Seconds since the epoch are 10 digits until the year 2286.
        assert_eq!(timestamp.len(), 10);
    }

    #[test]
    fn disabled_recorder_accepts_anything() {
        let recorder = AnyRecorder::disabled();
        assert!(recorder.is_disabled());
        assert!(recorder.write_one(&Metric::default()).is_ok());
        assert!(recorder.write_many(&[Metric::new(""), Metric::default()]).is_ok());
        assert!(recorder.write_many(&[]).is_ok());
        assert!(recorder.with_precision("not a precision").is_disabled());
        assert_eq!(NoRecorder.with_precision("s"), NoRecorder);
    }
}
