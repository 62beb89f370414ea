use std::{
    fmt, io,
    net::UdpSocket,
    panic::RefUnwindSafe,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use cadence::{prelude::*, MetricBuilder, MetricSink};
use rand::{distr::StandardUniform, Rng as _};
use tracing::{debug, trace};

use crate::{Event, TelemetryError};

/// A metric sink shared between the cadence client and the payloads formatted by [`StatsdClient`] itself.
#[derive(Clone)]
pub(crate) struct SharedSink(Arc<dyn MetricSink + Send + Sync + RefUnwindSafe>);

impl SharedSink {
    pub(crate) fn new(sink: Arc<dyn MetricSink + Send + Sync + RefUnwindSafe>) -> Self {
        SharedSink(sink)
    }
}

impl MetricSink for SharedSink {
    fn emit(&self, metric: &str) -> io::Result<usize> {
        self.0.emit(metric)
    }

    fn flush(&self) -> io::Result<()> {
        self.0.flush()
    }
}

/// A DogStatsD client.
///
/// Counters, gauges, histograms and distributions are built with [`cadence`]. Sets with string members, timings (which
/// keep sub-millisecond precision) and events are formatted by the client and written to the same sink.
///
/// Every method takes a list of tags in `key:value` (or bare `value`) form and a sample rate. A sample rate below 1 sends
/// the metric with that probability and annotates it with the rate; a rate of 0 or less drops it entirely. Tags
/// configured on the builder are sent after the per-call tags.
///
/// Once [`close`](StatsdClient::close) has been called, every send fails with [`TelemetryError::Closed`].
pub struct StatsdClient {
    inner: cadence::StatsdClient,
    sink: SharedSink,
    socket: Option<UdpSocket>,
    prefix: String,
    tags: Vec<String>,
    closed: AtomicBool,
}

impl StatsdClient {
    pub(crate) fn new(sink: SharedSink, socket: Option<UdpSocket>, namespace: &str, tags: Vec<String>) -> Self {
        let namespace = namespace.trim_end_matches('.');
        let prefix = if namespace.is_empty() { String::new() } else { format!("{namespace}.") };

        StatsdClient {
            inner: cadence::StatsdClient::from_sink(namespace, sink.clone()),
            sink,
            socket,
            prefix,
            tags,
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the namespace prepended to metric names, including its trailing `.` separator.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the tags sent with every metric.
    pub fn global_tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns `true` if the client has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Measures the value of a metric at a particular time.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is closed or the metric cannot be written to the sink.
    pub fn gauge(&self, name: &str, value: f64, tags: &[String], rate: f64) -> Result<(), TelemetryError> {
        self.submit(self.inner.gauge_with_tags(name, value), tags, rate)
    }

    /// Tracks how many times something happened.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is closed or the metric cannot be written to the sink.
    pub fn count(&self, name: &str, value: i64, tags: &[String], rate: f64) -> Result<(), TelemetryError> {
        self.submit(self.inner.count_with_tags(name, value), tags, rate)
    }

    /// Tracks the statistical distribution of a set of values on each host.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is closed or the metric cannot be written to the sink.
    pub fn histogram(&self, name: &str, value: f64, tags: &[String], rate: f64) -> Result<(), TelemetryError> {
        self.submit(self.inner.histogram_with_tags(name, value), tags, rate)
    }

    /// Tracks the statistical distribution of a set of values across all hosts.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is closed or the metric cannot be written to the sink.
    pub fn distribution(&self, name: &str, value: f64, tags: &[String], rate: f64) -> Result<(), TelemetryError> {
        self.submit(self.inner.distribution_with_tags(name, value), tags, rate)
    }

    /// Increments a counter by one.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is closed or the metric cannot be written to the sink.
    pub fn incr(&self, name: &str, tags: &[String], rate: f64) -> Result<(), TelemetryError> {
        self.submit(self.inner.incr_with_tags(name), tags, rate)
    }

    /// Decrements a counter by one.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is closed or the metric cannot be written to the sink.
    pub fn decr(&self, name: &str, tags: &[String], rate: f64) -> Result<(), TelemetryError> {
        self.submit(self.inner.decr_with_tags(name), tags, rate)
    }

    /// Sends a timing, in milliseconds with sub-millisecond precision.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is closed or the payload cannot be written to the sink.
    #[allow(clippy::cast_precision_loss)]
    pub fn timing(&self, name: &str, value: Duration, tags: &[String], rate: f64) -> Result<(), TelemetryError> {
        self.time_in_milliseconds(name, value.as_nanos() as f64 / 1_000_000.0, tags, rate)
    }

    /// Counts the number of unique members of a group.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is closed or the payload cannot be written to the sink.
    pub fn set(&self, name: &str, value: &str, tags: &[String], rate: f64) -> Result<(), TelemetryError> {
        self.submit_raw(name, value, "s", tags, rate)
    }

    /// Sends a timing expressed in (possibly fractional) milliseconds.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is closed or the payload cannot be written to the sink.
    pub fn time_in_milliseconds(&self, name: &str, value: f64, tags: &[String], rate: f64) -> Result<(), TelemetryError> {
        let mut buf = ryu::Buffer::new();
        let formatted = buf.format(value);
        let formatted = formatted.strip_suffix(".0").unwrap_or(formatted);
        self.submit_raw(name, formatted, "ms", tags, rate)
    }

    /// Sends an event.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is closed, the event is invalid, or the payload cannot be written to the sink.
    pub fn event(&self, event: &Event) -> Result<(), TelemetryError> {
        self.ensure_open()?;
        let payload = event.encode(&self.tags)?;
        self.emit(&payload)
    }

    /// Sends an event with the given title and text and default attributes.
    ///
    /// # Errors
    ///
    /// See [`event`](StatsdClient::event).
    pub fn simple_event(&self, title: &str, text: &str) -> Result<(), TelemetryError> {
        self.event(&Event::new(title, text))
    }

    /// Sends any buffered payloads.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is closed or the sink fails to flush.
    pub fn flush(&self) -> Result<(), TelemetryError> {
        self.ensure_open()?;
        self.sink.flush().map_err(TelemetryError::Io)
    }

    /// Flushes buffered payloads and closes the client.
    ///
    /// Closing an already closed client does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails. The client is closed regardless.
    pub fn close(&self) -> Result<(), TelemetryError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        debug!(namespace = %self.prefix, "Closing statsd client.");
        self.sink.flush().map_err(TelemetryError::Io)
    }

    /// Changes the write timeout of the underlying socket.
    ///
    /// Clients built with a custom sink have no socket, and ignore this setting.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is closed or the timeout is zero.
    pub fn set_write_timeout(&self, timeout: Duration) -> Result<(), TelemetryError> {
        self.ensure_open()?;
        match &self.socket {
            Some(socket) => socket.set_write_timeout(Some(timeout)).map_err(TelemetryError::Io),
            None => {
                trace!("Ignoring write timeout for client without a socket.");
                Ok(())
            }
        }
    }

    fn ensure_open(&self) -> Result<(), TelemetryError> {
        if self.is_closed() {
            Err(TelemetryError::Closed)
        } else {
            Ok(())
        }
    }

    fn submit<'a, T>(
        &'a self,
        mut builder: MetricBuilder<'a, 'a, T>,
        tags: &'a [String],
        rate: f64,
    ) -> Result<(), TelemetryError>
    where
        T: cadence::Metric + From<String>,
    {
        self.ensure_open()?;
        if !should_send(rate) {
            return Ok(());
        }

        for tag in tags.iter().chain(self.tags.iter()) {
            builder = builder.with_tag_value(tag);
        }
        if rate < 1.0 {
            builder = builder.with_sampling_rate(rate);
        }

        builder.try_send().map(|_| ()).map_err(TelemetryError::Metric)
    }

    fn submit_raw(&self, name: &str, value: &str, kind: &str, tags: &[String], rate: f64) -> Result<(), TelemetryError> {
        self.ensure_open()?;
        if !should_send(rate) {
            return Ok(());
        }

        let mut payload = String::with_capacity(self.prefix.len() + name.len() + value.len() + 16);
        payload.push_str(&self.prefix);
        payload.push_str(name);
        payload.push(':');
        payload.push_str(value);
        payload.push('|');
        payload.push_str(kind);
        if rate < 1.0 {
            payload.push_str("|@");
            payload.push_str(ryu::Buffer::new().format(rate));
        }
        push_tags(&mut payload, tags.iter().chain(self.tags.iter()));

        self.emit(&payload)
    }

    fn emit(&self, payload: &str) -> Result<(), TelemetryError> {
        self.sink.emit(payload).map(|_| ()).map_err(TelemetryError::Io)
    }
}

impl fmt::Debug for StatsdClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsdClient")
            .field("prefix", &self.prefix)
            .field("tags", &self.tags)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Appends `|#tag1,tag2` to the payload, if there are any tags.
pub(crate) fn push_tags<'a, I>(payload: &mut String, tags: I)
where
    I: IntoIterator<Item = &'a String>,
{
    let mut first = true;
    for tag in tags {
        payload.push_str(if first { "|#" } else { "," });
        payload.push_str(tag);
        first = false;
    }
}

fn should_send(rate: f64) -> bool {
    if rate <= 0.0 {
        false
    } else if rate >= 1.0 {
        true
    } else {
        let sample: f64 = rand::rng().sample(StandardUniform);
        sample <= rate
    }
}
