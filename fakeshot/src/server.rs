// Copyright 2024 Oxide Computer Company
//! Generic server-wide state and facilities

use crate::config::ConfigFakeServer;
use crate::config::DispatchMode;
use crate::error::FakeError;
use crate::handler::RequestInfo;
use crate::interceptor::Interceptor;
use crate::interceptor::NoInterception;
use crate::registry::FakeApi;
use crate::registry::OperationRegistry;
use crate::transport::OperationId;
use crate::transport::Transport;
use crate::Body;

use async_trait::async_trait;
use debug_ignore::DebugIgnore;
use slog::Logger;
use std::future::Future;
use std::panic;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Handler-accessible context associated with a server.
///
/// Automatically implemented for all Send + Sync types.
pub trait ServerContext: Send + Sync + 'static {}

impl<T: 'static> ServerContext for T where T: Send + Sync {}

/// Stores shared state used by a fake server.
#[derive(Debug)]
pub struct FakeState<C: ServerContext> {
    /// caller-specific state
    pub private: C,
    /// static server configuration parameters
    pub config: ConfigFakeServer,
    /// the operations this server implements
    pub registry: OperationRegistry<C>,
    /// server-wide log handle
    pub log: Logger,
    /// consulted before any operation is dispatched
    pub(crate) interceptor: DebugIgnore<Arc<dyn Interceptor>>,
}

/// Builds a [`FakeServer`] from the operations it implements.
pub struct ServerBuilder<C: ServerContext> {
    api: FakeApi<C>,
    private: C,
    log: Logger,
    config: ConfigFakeServer,
    interceptor: Arc<dyn Interceptor>,
}

impl<C: ServerContext> ServerBuilder<C> {
    /// Start configuring a new fake server.
    ///
    /// - `api`: the operations the server implements
    /// - `private`: context available to handlers via
    ///   [`crate::RequestContext::context`]
    /// - `log`: a logger for the server to use
    pub fn new(api: FakeApi<C>, private: C, log: Logger) -> Self {
        ServerBuilder {
            api,
            private,
            log,
            config: ConfigFakeServer::default(),
            interceptor: Arc::new(NoInterception),
        }
    }

    pub fn config(mut self, config: ConfigFakeServer) -> Self {
        self.config = config;
        self
    }

    /// Installs an interceptor, which sees every request first.
    pub fn interceptor<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
        self.interceptor = Arc::new(interceptor);
        self
    }

    pub fn build(self) -> FakeServer<C> {
        let registry = self.api.into_registry();
        debug!(self.log, "fake server built";
            "operations" => registry.len(),
            "dispatch_mode" => ?self.config.dispatch_mode,
        );
        FakeServer {
            app_state: Arc::new(FakeState {
                private: self.private,
                config: self.config,
                registry,
                log: self.log,
                interceptor: DebugIgnore(self.interceptor),
            }),
        }
    }
}

/// A fake implementation of one service client's transport.
///
/// Requests go through [`FakeServer::dispatch`], or through the
/// [`Transport`] impl, which does the same thing.
#[derive(Debug)]
pub struct FakeServer<C: ServerContext> {
    app_state: Arc<FakeState<C>>,
}

impl<C: ServerContext> Clone for FakeServer<C> {
    fn clone(&self) -> Self {
        FakeServer { app_state: Arc::clone(&self.app_state) }
    }
}

impl<C: ServerContext> FakeServer<C> {
    pub fn app_private(&self) -> &C {
        &self.app_state.private
    }

    pub fn log(&self) -> &Logger {
        &self.app_state.log
    }

    /// Routes `request` to the operation named by its [`OperationId`]
    /// extension and returns that operation's response.
    pub async fn dispatch(
        &self,
        request: http::Request<Body>,
    ) -> Result<http::Response<Body>, FakeError> {
        let server = &self.app_state;
        let operation = request
            .extensions()
            .get::<OperationId>()
            .cloned()
            .ok_or(FakeError::MissingOperationId)?;
        let cancel = request
            .extensions()
            .get::<CancellationToken>()
            .cloned()
            .unwrap_or_default();

        let request_id = generate_request_id();
        let mut request_log = server.log.new(o!(
            "operation_id" => operation.to_string(),
            "req_id" => request_id.clone(),
            "method" => request.method().as_str().to_string(),
            "uri" => format!("{}", request.uri()),
        ));
        // If we have been asked to include any headers from the request in
        // the log messages, do so here.  slog only allows one level of keys,
        // so each header becomes its own "hdr_" property.
        for name in server.config.log_headers.iter() {
            let v = request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok().map(str::to_string));
            if let Some(v) = v {
                let k =
                    format!("hdr_{}", name.to_lowercase().replace('-', "_"));
                request_log = request_log.new(o!(k => v));
            }
        }
        trace!(request_log, "incoming request");

        if cancel.is_cancelled() {
            info!(request_log, "request cancelled before dispatch");
            return Err(FakeError::Cancelled);
        }

        let work = dispatch_operation(
            Arc::clone(server),
            operation.clone(),
            request,
            request_id,
            request_log.new(o!()),
            cancel.clone(),
        );
        let result = match server.config.dispatch_mode {
            DispatchMode::Inline => {
                // The cancellation branch comes first so that a request
                // cancelled while the work is also ready still reports
                // `Cancelled`.
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(FakeError::Cancelled),
                    result = work => result,
                }
            }
            DispatchMode::Detached => {
                run_detached(work, &operation, &cancel, &request_log).await
            }
        };

        match &result {
            Ok(response) => {
                info!(request_log, "request completed";
                    "response_code" => response.status().as_str(),
                );
            }
            Err(FakeError::Cancelled) => {
                info!(request_log, "request cancelled");
            }
            Err(error) => {
                info!(request_log, "request failed";
                    "error_kind" => ?error.kind(),
                    "error_message" => error.to_string(),
                );
            }
        }
        result
    }
}

/// Runs `work` on its own task, returning `Cancelled` as soon as `cancel`
/// fires.
async fn run_detached<F>(
    work: F,
    operation: &OperationId,
    cancel: &CancellationToken,
    request_log: &Logger,
) -> Result<http::Response<Body>, FakeError>
where
    F: Future<Output = Result<http::Response<Body>, FakeError>>
        + Send
        + 'static,
{
    let (tx, rx) = oneshot::channel();
    let worker_log = request_log.new(o!());
    let dispatch_task = tokio::spawn(async move {
        let result = work.await;
        // If this send fails, the caller stopped waiting because the request
        // was cancelled.  Log such a result.
        if let Err(result) = tx.send(result) {
            match result {
                Ok(r) => warn!(
                    worker_log, "dispatch completed after request was cancelled";
                    "response_code" => r.status().as_str(),
                ),
                Err(error) => warn!(
                    worker_log, "dispatch completed after request was cancelled";
                    "error_message" => error.to_string(),
                ),
            }
        }
    });

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FakeError::Cancelled),
        received = rx => match received {
            Ok(result) => result,
            Err(_) => {
                // The sender was dropped without a result, which means the
                // task panicked or was aborted.  Propagate a panic just as
                // it would have surfaced in inline mode.
                match dispatch_task.await {
                    Err(join_error) if join_error.is_panic() => {
                        error!(request_log,
                            "handler panicked; propagating panic");
                        panic::resume_unwind(join_error.into_panic())
                    }
                    _ => Err(FakeError::WorkerLost {
                        operation: operation.clone(),
                    }),
                }
            }
        },
    }
}

/// The part of dispatch that runs after the operation id is known: the
/// interceptor, then the registry, then the operation itself.
async fn dispatch_operation<C: ServerContext>(
    server: Arc<FakeState<C>>,
    operation: OperationId,
    request: http::Request<Body>,
    request_id: String,
    request_log: Logger,
    cancel: CancellationToken,
) -> Result<http::Response<Body>, FakeError> {
    let info = RequestInfo::new(&request);
    if let Some(result) = server.interceptor.intercept(&operation, &info) {
        debug!(request_log, "request intercepted");
        return result;
    }

    let Some(entry) = server.registry.lookup(operation.as_str()) else {
        return Err(FakeError::UnhandledApi(operation));
    };
    entry.dispatch(&server, request, request_id, request_log, cancel).await
}

#[async_trait]
impl<C: ServerContext> Transport for FakeServer<C> {
    async fn send(
        &self,
        request: http::Request<Body>,
    ) -> Result<http::Response<Body>, FakeError> {
        self.dispatch(request).await
    }
}

fn generate_request_id() -> String {
    format!("{}", Uuid::new_v4())
}
