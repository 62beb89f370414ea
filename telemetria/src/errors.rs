use thiserror::Error;

use crate::transport::TransportError;

/// Errors that could occur while building a recorder or writing metrics through it.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// The address could not be parsed as a URL.
    #[error("could not parse address '{address}'")]
    AddressParse {
        /// The rejected address.
        address: String,

        /// The parse failure.
        #[source]
        source: url::ParseError,
    },

    /// The address scheme does not map to any known transport.
    #[error("no transport available for address '{address}'")]
    UnsupportedScheme {
        /// The rejected address.
        address: String,
    },

    /// The transport client could not be created.
    #[error("could not create {transport} transport")]
    TransportConstruction {
        /// The transport that was being created, such as `http` or `udp`.
        transport: &'static str,

        /// The underlying failure.
        #[source]
        source: TransportError,
    },

    /// The transport rejected the batch configuration, such as an unknown precision.
    #[error("could not create batch")]
    BatchConstruction(#[source] TransportError),

    /// A metric could not be converted into a point. Nothing was written.
    #[error("could not convert metric '{metric}' into a point")]
    PointConstruction {
        /// Name of the offending metric.
        metric: String,

        /// The underlying failure.
        #[source]
        source: TransportError,
    },

    /// The transport failed to write the batch.
    #[error("could not write metrics")]
    Write(#[source] TransportError),
}
