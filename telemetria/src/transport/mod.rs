//! InfluxDB write client.
//!
//! Points are encoded in [line protocol][lp] and submitted in batches through a [`TimeSeriesWriter`]. Two writers are
//! provided: [`HttpWriter`], which posts to the `/write` endpoint, and [`UdpWriter`], which packs points into
//! datagrams for an InfluxDB UDP listener (or Telegraf's `socket_listener`).
//!
//! [lp]: https://docs.influxdata.com/influxdb/v1/write_protocols/line_protocol_reference/

use std::{io, time::Duration};

use thiserror::Error;

mod batch;
pub use self::batch::{BatchPoints, BatchPointsConfig};

mod http;
pub use self::http::{HttpConfig, HttpWriter};

mod point;
pub use self::point::{Point, MAX_KEY_LENGTH};

mod precision;
pub use self::precision::Precision;

mod udp;
pub use self::udp::{UdpConfig, UdpWriter, DEFAULT_UDP_PAYLOAD_SIZE};

/// Errors reported by the InfluxDB write client.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The precision token is not recognized.
    #[error("invalid precision '{token}'")]
    InvalidPrecision {
        /// The rejected token.
        token: String,
    },

    /// A point could not be built from the given name, tags and fields.
    #[error("invalid point: {reason}")]
    InvalidPoint {
        /// Why the point was rejected.
        reason: String,
    },

    /// The writer address uses a scheme this writer cannot handle.
    #[error("unsupported protocol scheme in '{addr}', address must start with http:// or https://")]
    UnsupportedScheme {
        /// The rejected address.
        addr: String,
    },

    /// The writer address could not be turned into a request target.
    #[error("invalid address '{addr}': {reason}")]
    InvalidAddress {
        /// The rejected address.
        addr: String,

        /// Details about the failure.
        reason: String,
    },

    /// The runtime driving the HTTP client, or the thread it runs on, could not be created.
    #[error("failed to start runtime for HTTP writer")]
    Runtime(#[source] io::Error),

    /// The thread driving the HTTP client is no longer running.
    #[error("HTTP writer worker has stopped")]
    WorkerStopped,

    /// The TLS configuration could not be loaded.
    #[error("failed to load TLS root certificates")]
    Tls(#[source] io::Error),

    /// The HTTP request failed before a response was received.
    #[error("HTTP request failed")]
    Http(#[source] hyper_util::client::legacy::Error),

    /// The server answered with a non-success status code.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: u16,

        /// The response body, or a placeholder if it could not be read.
        body: String,
    },

    /// The request did not complete in time.
    #[error("request timed out after {timeout:?}")]
    Timeout {
        /// The configured timeout.
        timeout: Duration,
    },

    /// A socket operation failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A transport capable of persisting a batch of points.
///
/// Implementations must be safe to share across threads: a single writer is typically shared by every recorder cloned
/// from the one the factory built.
pub trait TimeSeriesWriter: Send + Sync {
    /// Writes the batch, blocking until the transport reports success or failure.
    ///
    /// # Errors
    ///
    /// Returns the failure reported by the underlying transport.
    fn write(&self, batch: &BatchPoints) -> Result<(), TransportError>;

    /// Returns a short identifier for the transport, such as `http` or `udp`.
    fn transport_id(&self) -> &'static str;
}

macro_rules! impl_writer {
    ($inner_ty:ident, $ptr_ty:ty) => {
        impl<$inner_ty> $crate::transport::TimeSeriesWriter for $ptr_ty
        where
            $inner_ty: $crate::transport::TimeSeriesWriter + ?Sized,
        {
            fn write(
                &self,
                batch: &$crate::transport::BatchPoints,
            ) -> Result<(), $crate::transport::TransportError> {
                std::ops::Deref::deref(self).write(batch)
            }

            fn transport_id(&self) -> &'static str {
                std::ops::Deref::deref(self).transport_id()
            }
        }
    };
}

impl_writer!(T, &T);
impl_writer!(T, std::boxed::Box<T>);
impl_writer!(T, std::sync::Arc<T>);
