use std::{
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs as _, UdpSocket},
    panic::RefUnwindSafe,
    sync::Arc,
    time::Duration,
};

use cadence::{BufferedUdpMetricSink, MetricError, MetricSink, UdpMetricSink};
use thiserror::Error;
use tracing::debug;

use crate::client::{SharedSink, StatsdClient};

const DEFAULT_AGENT_HOST: &str = "127.0.0.1";
const DEFAULT_AGENT_PORT: u16 = 8125;

/// Environment variable naming the host of the DogStatsD agent.
pub const AGENT_HOST_ENV_VAR: &str = "DD_AGENT_HOST";

/// Environment variable naming the port of the DogStatsD agent.
pub const AGENT_PORT_ENV_VAR: &str = "DD_DOGSTATSD_PORT";

/// Errors that could occur while building a statsd client.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Failed to parse or resolve the remote address.
    #[error("invalid remote address: {reason}")]
    InvalidRemoteAddress {
        /// Details about the parsing failure.
        reason: String,
    },

    /// Failed to create the local socket.
    #[error("failed to create socket for statsd client")]
    Socket(#[source] std::io::Error),

    /// Failed to create the metric sink.
    #[error("failed to create metric sink")]
    Sink(#[source] MetricError),
}

/// Builder for a [`StatsdClient`].
pub struct StatsdClientBuilder {
    remote_addr: Vec<SocketAddr>,
    namespace: String,
    tags: Vec<String>,
    sink: Option<SharedSink>,
    buffered: bool,
    write_timeout: Option<Duration>,
}

impl StatsdClientBuilder {
    /// Creates a builder pointed at the agent named by the `DD_AGENT_HOST` and `DD_DOGSTATSD_PORT` environment
    /// variables.
    ///
    /// Either variable falls back to its default (`127.0.0.1` and `8125`, respectively) when unset or empty.
    ///
    /// # Errors
    ///
    /// If the port is not a valid number, or the resulting address cannot be resolved, an error will be returned.
    pub fn from_env() -> Result<Self, BuildError> {
        let host = std::env::var(AGENT_HOST_ENV_VAR).ok().filter(|h| !h.is_empty());
        let port = std::env::var(AGENT_PORT_ENV_VAR).ok().filter(|p| !p.is_empty());

        let port = match port {
            Some(port) => port.parse::<u16>().map_err(|e| BuildError::InvalidRemoteAddress {
                reason: format!("invalid port '{port}' in {AGENT_PORT_ENV_VAR}: {e}"),
            })?,
            None => DEFAULT_AGENT_PORT,
        };
        let host = host.as_deref().unwrap_or(DEFAULT_AGENT_HOST);

        let addr = if host.contains(':') { format!("[{host}]:{port}") } else { format!("{host}:{port}") };
        Self::default().with_remote_address(addr)
    }

    /// Set the remote address to send metrics to, in the format of `<host>:<port>`.
    ///
    /// Defaults to `127.0.0.1:8125`.
    ///
    /// # Errors
    ///
    /// If the given address cannot be resolved, an error will be returned indicating the reason.
    pub fn with_remote_address<A>(mut self, addr: A) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        let addr = addr.as_ref();
        let resolved = addr
            .to_socket_addrs()
            .map_err(|e| BuildError::InvalidRemoteAddress { reason: format!("{addr}: {e}") })?
            .collect::<Vec<_>>();
        if resolved.is_empty() {
            return Err(BuildError::InvalidRemoteAddress { reason: format!("{addr}: no addresses found") });
        }

        self.remote_addr = resolved;
        Ok(self)
    }

    /// Set the namespace prepended to every metric name.
    ///
    /// A `.` separator is added between the namespace and the metric name when the namespace does not already end with
    /// one. Events are not namespaced.
    ///
    /// Defaults to no namespace.
    #[must_use]
    pub fn with_namespace<N>(mut self, namespace: N) -> Self
    where
        N: Into<String>,
    {
        self.namespace = namespace.into();
        self
    }

    /// Add a tag sent with every metric and event.
    ///
    /// Defaults to no tags.
    #[must_use]
    pub fn with_tag<K, V>(mut self, key: K, value: V) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.tags.push(format!("{}:{}", key.as_ref(), value.as_ref()));
        self
    }

    /// Send metrics through a custom sink instead of a UDP socket.
    ///
    /// When set, the remote address, buffering and write timeout settings are ignored.
    #[must_use]
    pub fn with_sink<S>(mut self, sink: S) -> Self
    where
        S: MetricSink + Send + Sync + RefUnwindSafe + 'static,
    {
        self.sink = Some(SharedSink::new(Arc::new(sink)));
        self
    }

    /// Buffer metrics in memory and send them in batched payloads.
    ///
    /// Buffered metrics are sent when the buffer fills up, or when the client is flushed or closed.
    ///
    /// Defaults to `true`.
    #[must_use]
    pub fn with_buffering(mut self, buffered: bool) -> Self {
        self.buffered = buffered;
        self
    }

    /// Set the write timeout of the underlying socket.
    ///
    /// Defaults to no timeout.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// If the socket cannot be created or configured, or the sink cannot be created, an error will be returned.
    pub fn build(self) -> Result<StatsdClient, BuildError> {
        if let Some(sink) = self.sink {
            debug!(namespace = %self.namespace, "Created statsd client with custom sink.");
            return Ok(StatsdClient::new(sink, None, &self.namespace, self.tags));
        }

        let first_addr = self.remote_addr.first().copied().ok_or_else(|| BuildError::InvalidRemoteAddress {
            reason: "no remote address configured".to_owned(),
        })?;
        let bound = if first_addr.is_ipv4() {
            UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = bound.map_err(BuildError::Socket)?;
        socket.set_write_timeout(self.write_timeout).map_err(BuildError::Socket)?;

        // The client keeps a handle to the socket so the write timeout can be changed later.
        let control = socket.try_clone().map_err(BuildError::Socket)?;

        let sink = if self.buffered {
            SharedSink::new(Arc::new(
                BufferedUdpMetricSink::from(&self.remote_addr[..], socket).map_err(BuildError::Sink)?,
            ))
        } else {
            SharedSink::new(Arc::new(UdpMetricSink::from(&self.remote_addr[..], socket).map_err(BuildError::Sink)?))
        };

        debug!(
            remote_addr = %first_addr,
            namespace = %self.namespace,
            buffered = self.buffered,
            "Created statsd client."
        );

        Ok(StatsdClient::new(sink, Some(control), &self.namespace, self.tags))
    }
}

impl Default for StatsdClientBuilder {
    fn default() -> Self {
        StatsdClientBuilder {
            remote_addr: vec![SocketAddr::from(([127, 0, 0, 1], DEFAULT_AGENT_PORT))],
            namespace: String::new(),
            tags: Vec::new(),
            sink: None,
            buffered: true,
            write_timeout: None,
        }
    }
}
