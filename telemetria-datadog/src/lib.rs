//! A request-scoped [DogStatsD][dsd] client with semantic telemetry helpers, built on [`cadence`].
//!
//! [dsd]: https://docs.datadoghq.com/developers/dogstatsd/
//!
//! # Usage
//!
//! A client is built once, stored in a [`ClientContext`], and the context is passed along to wherever telemetry is sent:
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use telemetria_datadog::{self as dd, with_rate, with_tag, ClientContext, StatsdClientBuilder};
//!
//! // Sends to `DD_AGENT_HOST:DD_DOGSTATSD_PORT`, or `127.0.0.1:8125` if unset.
//! let builder = StatsdClientBuilder::from_env()?.with_tag("service", "checkout");
//! let ctx = dd::new(&ClientContext::default(), "shop", builder)?;
//!
//! dd::incr(&ctx, "orders", &[with_tag("region", "eu")])?;
//! dd::gauge(&ctx, "cart.size", 3.0, &[with_rate(0.5)])?;
//! dd::timing(&ctx, "checkout.duration", Duration::from_millis(85), &[])?;
//!
//! let done = dd::timing_defer(&ctx, "checkout.payment", &[]);
//! // ... do the work ...
//! done();
//!
//! dd::close(&ctx)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Missing clients
//!
//! Every helper panics when the context holds no client: a missing client means the context was never set up, which is
//! a programming error rather than a runtime condition. Use [`ClientContext::try_client`] to check beforehand.
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

use thiserror::Error;

mod builder;
pub use self::builder::{BuildError, StatsdClientBuilder, AGENT_HOST_ENV_VAR, AGENT_PORT_ENV_VAR};

mod client;
pub use self::client::StatsdClient;

mod context;
pub use self::context::{create_client, new, ClientContext};

mod event;
pub use self::event::{AlertType, Event, Priority};

mod functions;
pub use self::functions::*;

mod options;
pub use self::options::{with_rate, with_tag, with_tags, with_tags_list, TelemetryOption, DEFAULT_RATE};

/// Errors that could occur while sending telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The metric could not be built or sent.
    #[error(transparent)]
    Metric(#[from] cadence::MetricError),

    /// The sink failed to write or flush.
    #[error("failed to write to metric sink")]
    Io(#[source] std::io::Error),

    /// The event is missing a required attribute.
    #[error("invalid event: {reason}")]
    InvalidEvent {
        /// What is missing.
        reason: &'static str,
    },

    /// The client has been closed.
    #[error("statsd client is closed")]
    Closed,
}
