//! Telemetry helpers that send through the client held by a [`ClientContext`].
//!
//! Every helper panics if the context holds no client; see [`ClientContext::client`].

use std::time::{Duration, Instant};

use tracing::error;

use crate::{options::Telemetry, ClientContext, Event, TelemetryError, TelemetryOption};

/// Measures the value of a metric at a particular time.
///
/// # Errors
///
/// Returns the error reported by the client.
pub fn gauge(ctx: &ClientContext, name: &str, value: f64, options: &[TelemetryOption]) -> Result<(), TelemetryError> {
    let t = Telemetry::from_options(options);
    ctx.client().gauge(name, value, &t.tags, t.rate)
}

/// Tracks how many times something happened.
///
/// # Errors
///
/// Returns the error reported by the client.
pub fn count(ctx: &ClientContext, name: &str, value: i64, options: &[TelemetryOption]) -> Result<(), TelemetryError> {
    let t = Telemetry::from_options(options);
    ctx.client().count(name, value, &t.tags, t.rate)
}

/// Tracks the statistical distribution of a set of values on each host.
///
/// # Errors
///
/// Returns the error reported by the client.
pub fn histogram(
    ctx: &ClientContext,
    name: &str,
    value: f64,
    options: &[TelemetryOption],
) -> Result<(), TelemetryError> {
    let t = Telemetry::from_options(options);
    ctx.client().histogram(name, value, &t.tags, t.rate)
}

/// Tracks the statistical distribution of a set of values across all hosts.
///
/// # Errors
///
/// Returns the error reported by the client.
pub fn distribution(
    ctx: &ClientContext,
    name: &str,
    value: f64,
    options: &[TelemetryOption],
) -> Result<(), TelemetryError> {
    let t = Telemetry::from_options(options);
    ctx.client().distribution(name, value, &t.tags, t.rate)
}

/// Decrements a counter by one.
///
/// # Errors
///
/// Returns the error reported by the client.
pub fn decr(ctx: &ClientContext, name: &str, options: &[TelemetryOption]) -> Result<(), TelemetryError> {
    let t = Telemetry::from_options(options);
    ctx.client().decr(name, &t.tags, t.rate)
}

/// Increments a counter by one.
///
/// # Errors
///
/// Returns the error reported by the client.
pub fn incr(ctx: &ClientContext, name: &str, options: &[TelemetryOption]) -> Result<(), TelemetryError> {
    let t = Telemetry::from_options(options);
    ctx.client().incr(name, &t.tags, t.rate)
}

/// Counts the number of unique members of a group.
///
/// # Errors
///
/// Returns the error reported by the client.
pub fn set(ctx: &ClientContext, name: &str, value: &str, options: &[TelemetryOption]) -> Result<(), TelemetryError> {
    let t = Telemetry::from_options(options);
    ctx.client().set(name, value, &t.tags, t.rate)
}

/// Sends a timing.
///
/// # Errors
///
/// Returns the error reported by the client.
pub fn timing(
    ctx: &ClientContext,
    name: &str,
    value: Duration,
    options: &[TelemetryOption],
) -> Result<(), TelemetryError> {
    let t = Telemetry::from_options(options);
    ctx.client().timing(name, value, &t.tags, t.rate)
}

/// Starts a timer, returning a closure that sends the elapsed time when called.
///
/// The client is resolved when the timer starts, so this panics right away if the context holds no client. Errors from
/// the final send are logged rather than returned.
pub fn timing_defer(ctx: &ClientContext, name: &str, options: &[TelemetryOption]) -> impl FnOnce() {
    let client = ctx.client().clone();
    let name = name.to_owned();
    let t = Telemetry::from_options(options);
    let start = Instant::now();

    move || {
        if let Err(e) = client.timing(&name, start.elapsed(), &t.tags, t.rate) {
            error!(error = %e, metric = %name, "Failed to send deferred timing.");
        }
    }
}

/// Sends a timing expressed in (possibly fractional) milliseconds.
///
/// # Errors
///
/// Returns the error reported by the client.
pub fn time_in_milliseconds(
    ctx: &ClientContext,
    name: &str,
    value: f64,
    options: &[TelemetryOption],
) -> Result<(), TelemetryError> {
    let t = Telemetry::from_options(options);
    ctx.client().time_in_milliseconds(name, value, &t.tags, t.rate)
}

/// Sends an event.
///
/// # Errors
///
/// Returns the error reported by the client.
pub fn event(ctx: &ClientContext, event: &Event) -> Result<(), TelemetryError> {
    ctx.client().event(event)
}

/// Sends an event with the given title and text.
///
/// # Errors
///
/// Returns the error reported by the client.
pub fn simple_event(ctx: &ClientContext, title: &str, text: &str) -> Result<(), TelemetryError> {
    ctx.client().simple_event(title, text)
}

/// Closes the client.
///
/// # Errors
///
/// Returns the error reported by the client.
pub fn close(ctx: &ClientContext) -> Result<(), TelemetryError> {
    ctx.client().close()
}

/// Sends any buffered payloads.
///
/// # Errors
///
/// Returns the error reported by the client.
pub fn flush(ctx: &ClientContext) -> Result<(), TelemetryError> {
    ctx.client().flush()
}

/// Changes the write timeout of the client's socket.
///
/// # Errors
///
/// Returns the error reported by the client.
pub fn set_write_timeout(ctx: &ClientContext, timeout: Duration) -> Result<(), TelemetryError> {
    ctx.client().set_write_timeout(timeout)
}
