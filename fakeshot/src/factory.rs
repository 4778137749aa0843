// Copyright 2024 Oxide Computer Company

//! Routes requests to one of several per-client fake transports

use crate::error::FakeError;
use crate::transport::OperationId;
use crate::transport::Transport;
use crate::Body;

use async_trait::async_trait;
use debug_ignore::DebugIgnore;
use indexmap::IndexMap;
use slog::Logger;
use std::fmt;
use std::sync::Arc;
use std::sync::OnceLock;

type TransportInit = Box<dyn Fn() -> Arc<dyn Transport> + Send + Sync>;

/// A registered client's transport, or the means to create it.
enum ClientSlot {
    Ready(Arc<dyn Transport>),
    Lazy {
        transport: OnceLock<Arc<dyn Transport>>,
        init: DebugIgnore<TransportInit>,
    },
}

impl fmt::Debug for ClientSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientSlot::Ready(_) => f.write_str("Ready"),
            ClientSlot::Lazy { transport, .. } => f
                .debug_struct("Lazy")
                .field("initialized", &transport.get().is_some())
                .finish(),
        }
    }
}

impl ClientSlot {
    fn is_initialized(&self) -> bool {
        match self {
            ClientSlot::Ready(_) => true,
            ClientSlot::Lazy { transport, .. } => transport.get().is_some(),
        }
    }

    fn transport(&self) -> &Arc<dyn Transport> {
        match self {
            ClientSlot::Ready(transport) => transport,
            ClientSlot::Lazy { transport, init } => {
                transport.get_or_init(|| (init.0)())
            }
        }
    }
}

/// A transport for a whole service, made of one fake per client.
///
/// Requests are routed by the client part of their [`OperationId`] (the text
/// before the first `.`), so a factory holding fakes for `WidgetClient` and
/// `GadgetClient` can stand in for the transport shared by both clients.
///
/// ```ignore
/// let factory = ServerFactory::new(log.clone())
///     .client("WidgetClient", widget_server)
///     .client_with("GadgetClient", || Arc::new(build_gadget_server()));
/// ```
#[derive(Debug)]
pub struct ServerFactory {
    clients: IndexMap<String, ClientSlot>,
    log: Logger,
}

impl ServerFactory {
    pub fn new(log: Logger) -> Self {
        ServerFactory { clients: IndexMap::new(), log }
    }

    /// Registers the transport for the client named `name`, replacing any
    /// earlier registration.
    pub fn client<T: Transport + 'static>(
        mut self,
        name: &str,
        transport: T,
    ) -> Self {
        self.clients
            .insert(name.to_string(), ClientSlot::Ready(Arc::new(transport)));
        self
    }

    /// Registers a function that creates the transport for the client named
    /// `name`.  It is called once, on the first request for that client, and
    /// the result is reused.
    pub fn client_with<F>(mut self, name: &str, init: F) -> Self
    where
        F: Fn() -> Arc<dyn Transport> + Send + Sync + 'static,
    {
        let slot = ClientSlot::Lazy {
            transport: OnceLock::new(),
            init: DebugIgnore(Box::new(init)),
        };
        self.clients.insert(name.to_string(), slot);
        self
    }

    /// Returns the names of the registered clients, in registration order.
    pub fn client_names(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }

    /// Finds the transport for the client that `operation` belongs to.  An
    /// id without a client part is looked up whole.
    fn route(
        &self,
        operation: &OperationId,
    ) -> Result<&Arc<dyn Transport>, FakeError> {
        let name = operation.client_name().unwrap_or(operation.as_str());
        let slot = self
            .clients
            .get(name)
            .ok_or_else(|| FakeError::UnhandledClient(name.to_string()))?;
        if !slot.is_initialized() {
            debug!(self.log, "initializing client transport"; "client" => name);
        }
        Ok(slot.transport())
    }
}

#[async_trait]
impl Transport for ServerFactory {
    async fn send(
        &self,
        request: http::Request<Body>,
    ) -> Result<http::Response<Body>, FakeError> {
        let operation = request
            .extensions()
            .get::<OperationId>()
            .cloned()
            .ok_or(FakeError::MissingOperationId)?;
        let transport = self.route(&operation)?;
        trace!(self.log, "routing request";
            "operation_id" => operation.as_str());
        transport.send(request).await
    }
}
