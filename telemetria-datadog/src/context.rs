use std::sync::Arc;

use crate::{BuildError, StatsdClient, StatsdClientBuilder};

/// A request-scoped handle carrying a statsd client.
///
/// Contexts are cheap to clone and are passed explicitly to the telemetry helpers. A context without a client is a
/// setup error: [`client`](ClientContext::client) panics on it, while [`try_client`](ClientContext::try_client) lets
/// callers check first.
#[derive(Clone, Debug, Default)]
pub struct ClientContext {
    client: Option<Arc<StatsdClient>>,
}

impl ClientContext {
    /// Creates a context holding the given client.
    pub fn with_client(client: StatsdClient) -> Self {
        ClientContext { client: Some(Arc::new(client)) }
    }

    /// Returns a new context holding the given client, leaving this one untouched.
    #[must_use]
    pub fn set_client(&self, client: Arc<StatsdClient>) -> Self {
        ClientContext { client: Some(client) }
    }

    /// Returns the client, if any.
    pub fn try_client(&self) -> Option<&Arc<StatsdClient>> {
        self.client.as_ref()
    }

    /// Returns the client.
    ///
    /// # Panics
    ///
    /// Panics if the context holds no client. Contexts must be set up with [`new`](crate::new),
    /// [`with_client`](ClientContext::with_client) or [`set_client`](ClientContext::set_client) before they are used
    /// to send telemetry.
    pub fn client(&self) -> &Arc<StatsdClient> {
        match &self.client {
            Some(client) => client,
            None => panic!("no statsd client found in context"),
        }
    }
}

/// Builds a client with the given namespace and returns a context derived from `ctx` that holds it.
///
/// # Errors
///
/// If the client cannot be built, an error will be returned.
pub fn new(ctx: &ClientContext, namespace: &str, builder: StatsdClientBuilder) -> Result<ClientContext, BuildError> {
    let client = create_client(namespace, builder)?;
    Ok(ctx.set_client(Arc::new(client)))
}

/// Builds a client with the given namespace.
///
/// The namespace overrides any namespace already configured on the builder.
///
/// # Errors
///
/// If the client cannot be built, an error will be returned.
pub fn create_client(namespace: &str, builder: StatsdClientBuilder) -> Result<StatsdClient, BuildError> {
    builder.with_namespace(namespace).build()
}
