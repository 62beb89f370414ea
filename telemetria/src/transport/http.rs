use std::{thread, time::Duration};

use base64::{prelude::BASE64_STANDARD, Engine as _};
use crossbeam_channel::{Receiver, Sender};
use http_body_util::{BodyExt as _, Collected, Full};
use hyper::{
    body::{Bytes, Incoming},
    header::{HeaderValue, InvalidHeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT},
    Method, Request, Response, Uri,
};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::{TokioExecutor, TokioTimer},
};
use tokio::runtime::{self, Runtime};
use tracing::{debug, trace};
use url::{form_urlencoded, Url};

use super::{BatchPoints, TimeSeriesWriter, TransportError};

const DEFAULT_USER_AGENT: &str = concat!("telemetria/", env!("CARGO_PKG_VERSION"));
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const WORKER_THREAD_NAME: &str = "telemetria-http-writer";

/// Configuration for an [`HttpWriter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpConfig {
    /// Base address of the server, such as `http://localhost:8086`. Any path is ignored.
    pub addr: String,

    /// Username for basic authentication. Authentication is only sent when this is set.
    pub username: Option<String>,

    /// Password for basic authentication.
    pub password: Option<String>,

    /// Value of the `User-Agent` header.
    pub user_agent: String,

    /// Timeout for a single write request. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl HttpConfig {
    /// Creates a new `HttpConfig` targeting the given address with default settings.
    pub fn new<A>(addr: A) -> Self
    where
        A: Into<String>,
    {
        HttpConfig {
            addr: addr.into(),
            username: None,
            password: None,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            timeout: None,
        }
    }

    /// Sets the credentials used for basic authentication.
    #[must_use]
    pub fn with_credentials<U>(mut self, username: U, password: Option<String>) -> Self
    where
        U: Into<String>,
    {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    /// Sets the `User-Agent` header value.
    #[must_use]
    pub fn with_user_agent<A>(mut self, user_agent: A) -> Self
    where
        A: Into<String>,
    {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

enum HttpClient {
    Plain(Client<HttpConnector, Full<Bytes>>),
    Tls(Client<HttpsConnector<HttpConnector>, Full<Bytes>>),
}

impl HttpClient {
    async fn request(
        &self,
        req: Request<Full<Bytes>>,
    ) -> Result<Response<Incoming>, hyper_util::client::legacy::Error> {
        match self {
            HttpClient::Plain(client) => client.request(req).await,
            HttpClient::Tls(client) => client.request(req).await,
        }
    }
}

/// A request handed to the worker thread, along with where to send the outcome.
struct Job {
    request: Request<Full<Bytes>>,
    reply: Sender<Result<(), TransportError>>,
}

/// Writes batches to the InfluxDB `/write` HTTP endpoint.
///
/// Writes are blocking. Requests are driven by a single-threaded runtime that lives on a dedicated worker thread, so the
/// writer can be created, used and dropped from anywhere, including from within an asynchronous runtime (where a write
/// still blocks the calling thread until the request completes). Dropping the writer stops the worker thread once any
/// pending request has finished.
pub struct HttpWriter {
    base_addr: String,
    jobs: Sender<Job>,
    auth: Option<HeaderValue>,
    user_agent: HeaderValue,
}

impl HttpWriter {
    /// Creates a new `HttpWriter`.
    ///
    /// No connection is made until the first write.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not a valid `http://` or `https://` URL, if the header values are invalid, if
    /// the runtime or its worker thread cannot be created, or if TLS root certificates cannot be loaded for an
    /// `https://` address.
    pub fn new(config: HttpConfig) -> Result<Self, TransportError> {
        let url = Url::parse(&config.addr).map_err(|e| TransportError::InvalidAddress {
            addr: config.addr.clone(),
            reason: e.to_string(),
        })?;

        let tls = match url.scheme() {
            "http" => false,
            "https" => true,
            _ => return Err(TransportError::UnsupportedScheme { addr: config.addr }),
        };

        let host = url.host_str().ok_or_else(|| TransportError::InvalidAddress {
            addr: config.addr.clone(),
            reason: "missing host".to_owned(),
        })?;
        let base_addr = match url.port() {
            Some(port) => format!("{}://{host}:{port}", url.scheme()),
            None => format!("{}://{host}", url.scheme()),
        };

        let auth = match config.username.as_deref() {
            Some(username) => Some(basic_auth(username, config.password.as_deref()).map_err(|e| {
                TransportError::InvalidAddress { addr: base_addr.clone(), reason: format!("invalid credentials: {e}") }
            })?),
            None => None,
        };
        let user_agent = HeaderValue::from_str(&config.user_agent).map_err(|e| {
            TransportError::InvalidAddress { addr: config.addr.clone(), reason: format!("invalid user agent: {e}") }
        })?;

        let runtime =
            runtime::Builder::new_current_thread().enable_all().build().map_err(TransportError::Runtime)?;

        let mut builder = Client::builder(TokioExecutor::new());
        builder.pool_idle_timeout(POOL_IDLE_TIMEOUT).pool_timer(TokioTimer::new());

        let client = if tls {
            let https = hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(TransportError::Tls)?
                .https_only()
                .enable_http1()
                .build();
            HttpClient::Tls(builder.build(https))
        } else {
            HttpClient::Plain(builder.build_http())
        };

        let (jobs, pending) = crossbeam_channel::unbounded::<Job>();
        let timeout = config.timeout;
        thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_owned())
            .spawn(move || run_worker(&runtime, &client, &pending, timeout))
            .map_err(TransportError::Runtime)?;

        debug!(%base_addr, tls, authenticated = auth.is_some(), "Created HTTP writer.");

        Ok(HttpWriter { base_addr, jobs, auth, user_agent })
    }

    /// Returns the base address requests are sent to, in the form of `scheme://host[:port]`.
    pub fn base_addr(&self) -> &str {
        &self.base_addr
    }

    fn write_uri(&self, batch: &BatchPoints) -> Result<Uri, TransportError> {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("db", batch.database());
        if let Some(rp) = batch.retention_policy() {
            query.append_pair("rp", rp);
        }
        query.append_pair("precision", batch.precision().query_value());

        let uri = format!("{}/write?{}", self.base_addr, query.finish());
        uri.parse::<Uri>()
            .map_err(|e| TransportError::InvalidAddress { addr: uri.clone(), reason: e.to_string() })
    }
}

impl TimeSeriesWriter for HttpWriter {
    fn write(&self, batch: &BatchPoints) -> Result<(), TransportError> {
        if batch.is_empty() {
            return Ok(());
        }

        let uri = self.write_uri(batch)?;
        let body = batch.to_line_protocol();
        let body_len = body.len();

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))
            .header(USER_AGENT, self.user_agent.clone());
        if let Some(auth) = &self.auth {
            builder = builder.header(AUTHORIZATION, auth.clone());
        }
        let request = builder.body(Full::new(Bytes::from(body))).map_err(|e| TransportError::InvalidAddress {
            addr: self.base_addr.clone(),
            reason: e.to_string(),
        })?;

        let (reply, outcome) = crossbeam_channel::bounded(1);
        self.jobs.send(Job { request, reply }).map_err(|_| TransportError::WorkerStopped)?;
        let result = outcome.recv().unwrap_or(Err(TransportError::WorkerStopped));

        match &result {
            Ok(()) => trace!(points = batch.points().len(), bytes = body_len, "Wrote batch over HTTP."),
            Err(e) => debug!(error = %e, base_addr = %self.base_addr, "Failed to write batch over HTTP."),
        }

        result
    }

    fn transport_id(&self) -> &'static str {
        "http"
    }
}

// Runs until every sender is gone, which happens when the writer is dropped.
fn run_worker(runtime: &Runtime, client: &HttpClient, pending: &Receiver<Job>, timeout: Option<Duration>) {
    while let Ok(Job { request, reply }) = pending.recv() {
        let result = runtime.block_on(async {
            match timeout {
                Some(timeout) => tokio::time::timeout(timeout, send(client, request))
                    .await
                    .map_err(|_| TransportError::Timeout { timeout })?,
                None => send(client, request).await,
            }
        });

        // The caller only goes away if it panicked while waiting; nothing left to report to.
        let _ = reply.send(result);
    }

    trace!("HTTP writer worker stopping.");
}

async fn send(client: &HttpClient, request: Request<Full<Bytes>>) -> Result<(), TransportError> {
    let response = client.request(request).await.map_err(TransportError::Http)?;

    let status = response.status();
    if status.as_u16() == 200 || status.as_u16() == 204 {
        return Ok(());
    }

    let body = response
        .into_body()
        .collect()
        .await
        .map(Collected::to_bytes)
        .map_err(|_| ())
        .and_then(|b| String::from_utf8(b[..].to_vec()).map_err(|_| ()))
        .unwrap_or_else(|()| String::from("<failed to read response body>"));

    Err(TransportError::Status { status: status.as_u16(), body })
}

fn basic_auth(username: &str, password: Option<&str>) -> Result<HeaderValue, InvalidHeaderValue> {
    let credentials = format!("{username}:{}", password.unwrap_or_default());
    let encoded = format!("Basic {}", BASE64_STANDARD.encode(credentials));

    let mut header = HeaderValue::try_from(encoded)?;
    header.set_sensitive(true);
    Ok(header)
}

#[cfg(test)]
mod tests {
    use base64::{prelude::BASE64_STANDARD, Engine as _};

    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::{basic_auth, HttpConfig, HttpWriter};
    use crate::{
        transport::{BatchPoints, BatchPointsConfig, Point, TransportError},
        FieldValue,
    };

    const BASIC: &str = "Basic ";

    fn decode(header: &hyper::header::HeaderValue) -> Vec<u8> {
        BASE64_STANDARD.decode(&header.as_bytes()[BASIC.len()..]).unwrap()
    }

    #[test]
    fn basic_auth_header() {
        let header = basic_auth("metrics", None).unwrap();
        assert_eq!(decode(&header), b"metrics:");
        assert!(header.is_sensitive());

        let header = basic_auth("metrics", Some("123!_@ABC")).unwrap();
        assert_eq!(decode(&header), b"metrics:123!_@ABC");
        assert!(header.is_sensitive());

        // Non-ASCII credentials are still encoded into a valid header.
        let header = basic_auth("mötrics", Some("pä\nss")).unwrap();
        assert_eq!(decode(&header), "mötrics:pä\nss".as_bytes());
    }

    #[test]
    fn rejects_non_http_scheme() {
        assert!(HttpWriter::new(HttpConfig::new("udp://localhost:8089")).is_err());
        assert!(HttpWriter::new(HttpConfig::new("localhost:8086")).is_err());
    }

    #[test]
    fn base_addr_drops_path() {
        let writer = HttpWriter::new(HttpConfig::new("http://localhost:8086/ignored")).unwrap();
        assert_eq!(writer.base_addr(), "http://localhost:8086");

        let writer = HttpWriter::new(HttpConfig::new("http://localhost")).unwrap();
        assert_eq!(writer.base_addr(), "http://localhost");
    }

    #[test]
    fn write_uri_carries_database_and_precision() {
        let writer = HttpWriter::new(HttpConfig::new("http://localhost:8086")).unwrap();

        let batch = BatchPoints::new(BatchPointsConfig::new("my db").with_precision("us")).unwrap();
        let uri = writer.write_uri(&batch).unwrap();
        assert_eq!(uri.to_string(), "http://localhost:8086/write?db=my+db&precision=u");

        let batch =
            BatchPoints::new(BatchPointsConfig::new("test").with_retention_policy("week")).unwrap();
        let uri = writer.write_uri(&batch).unwrap();
        assert_eq!(uri.to_string(), "http://localhost:8086/write?db=test&rp=week&precision=ns");
    }

    #[test]
    fn empty_batch_is_not_sent() {
        // Nothing listens on this port; an attempted request would fail.
        let writer = HttpWriter::new(HttpConfig::new("http://127.0.0.1:9")).unwrap();
        let batch = BatchPoints::new(BatchPointsConfig::new("test")).unwrap();
        assert!(crate::transport::TimeSeriesWriter::write(&writer, &batch).is_ok());
    }

    #[test]
    fn usable_inside_async_runtime() {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let writer = HttpWriter::new(HttpConfig::new("http://127.0.0.1:9")).unwrap();

            let mut batch = BatchPoints::new(BatchPointsConfig::new("test")).unwrap();
            let fields = BTreeMap::from([("v".to_owned(), FieldValue::Integer(1))]);
            batch.add_point(Point::new("m", &BTreeMap::new(), &fields, Utc::now()).unwrap());

            let result = crate::transport::TimeSeriesWriter::write(&writer, &batch);
            assert!(matches!(result, Err(TransportError::Http(_))), "unexpected result: {result:?}");

            drop(writer);
        });
    }

    #[test]
    fn invalid_user_agent_is_rejected() {
        let config = HttpConfig::new("http://localhost:8086").with_user_agent("bad\nagent");
        assert!(matches!(HttpWriter::new(config), Err(TransportError::InvalidAddress { .. })));
    }
}
