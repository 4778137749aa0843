// Copyright 2024 Oxide Computer Company

//! Interface for implementing fake operation handler functions.
//!
//! A handler function is an `async fn` that takes a [`RequestContext`]
//! followed by up to three shared extractors ([`crate::Path`],
//! [`crate::Query`], [`crate::Header`]) and optionally one exclusive
//! extractor ([`crate::TypedBody`], [`crate::UntypedBody`]), and returns
//! `Result<R, ErrorResponder>` where `R` is one of the success responders in
//! [`crate::responder`]:
//!
//! ```ignore
//! async fn get_widget(
//!     rqctx: RequestContext<WidgetStore>,
//!     path: Path<WidgetPath>,
//! ) -> Result<Responder<Widget>, ErrorResponder>
//! ```
//!
//! As in any trait-object based dispatcher, we need a way to invoke handlers
//! with different signatures through one interface.  The pieces are:
//!
//! * [`FakeHandlerFunc`] is implemented (by a macro below) for every
//!   function whose signature matches the shape above.  Its
//!   `handle_request()` takes the already-extracted argument tuple.
//! * [`RouteHandler`] has no type parameters other than the server context.
//!   Its `handle_request()` runs the extractors for the argument tuple, calls
//!   the `FakeHandlerFunc`, and turns the responder into a
//!   [`HandlerOutput`].
//! * [`FakeRouteHandler`] is the one implementation of `RouteHandler`.  It
//!   carries the function's parameter and response types as `PhantomData` so
//!   that the compiler can tie them to the function.

use crate::error::FakeError;
use crate::extractor::RequestExtractor;
use crate::path_pattern::VariableSet;
use crate::responder::ErrorResponder;
use crate::responder::HandlerOutput;
use crate::responder::HandlerResponse;
use crate::server::FakeState;
use crate::server::ServerContext;
use crate::transport::OperationId;
use crate::Body;

use async_trait::async_trait;
use slog::Logger;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Handle for various interfaces useful during request processing.
#[derive(Debug)]
pub struct RequestContext<Context: ServerContext> {
    /// shared server state
    pub server: Arc<FakeState<Context>>,
    /// the operation being dispatched
    pub operation_id: OperationId,
    /// variables captured by the operation's path pattern
    pub path_variables: VariableSet,
    /// unique id assigned to this request
    pub request_id: String,
    /// logger for this specific request
    pub log: Logger,
    /// basic request information (method, URI, etc.)
    pub request: RequestInfo,
    /// fires when the caller gives up on this request
    pub cancel: CancellationToken,
}

impl<Context: ServerContext> RequestContext<Context> {
    /// Returns the server context state.
    pub fn context(&self) -> &Context {
        &self.server.private
    }

    /// Returns the maximum request body size that body extractors accept.
    pub fn request_body_max_bytes(&self) -> usize {
        self.server.config.request_body_max_bytes
    }
}

// This is deliberately as close to compatible with `http::Request` as
// reasonable.
#[derive(Clone, Debug)]
pub struct RequestInfo {
    method: http::Method,
    uri: http::Uri,
    version: http::Version,
    headers: http::HeaderMap<http::HeaderValue>,
}

impl RequestInfo {
    pub fn new<B>(request: &http::Request<B>) -> Self {
        RequestInfo {
            method: request.method().clone(),
            uri: request.uri().clone(),
            version: request.version(),
            headers: request.headers().clone(),
        }
    }

    pub fn method(&self) -> &http::Method {
        &self.method
    }

    pub fn uri(&self) -> &http::Uri {
        &self.uri
    }

    pub fn version(&self) -> http::Version {
        self.version
    }

    pub fn headers(&self) -> &http::HeaderMap<http::HeaderValue> {
        &self.headers
    }

    /// Returns `scheme://authority` when the request URI is absolute, and
    /// the empty string otherwise.
    pub(crate) fn origin(&self) -> String {
        match (self.uri.scheme_str(), self.uri.authority()) {
            (Some(scheme), Some(authority)) => {
                format!("{}://{}", scheme, authority)
            }
            _ => String::new(),
        }
    }
}

/// `FakeHandlerFunc` is a trait providing a single function, `handle_request()`,
/// which takes a request context and the extracted arguments, invokes the
/// underlying handler function, and produces its responder.
///
/// See the module-level documentation for how this fits with `RouteHandler`.
#[async_trait]
pub trait FakeHandlerFunc<Context, FuncParams, ResponseType>:
    Send + Sync + 'static
where
    Context: ServerContext,
    FuncParams: RequestExtractor,
    ResponseType: HandlerResponse + Send + Sync + 'static,
{
    async fn handle_request(
        &self,
        rqctx: RequestContext<Context>,
        p: FuncParams,
    ) -> Result<ResponseType, ErrorResponder>;
}

// Defines an impl of `FakeHandlerFunc` for functions taking a request context
// and the given extractor types.  The macro parameters are `tt` rather than
// `literal` and `ident` to stay clear of dtolnay/async-trait#46.
macro_rules! impl_FakeHandlerFunc_for_func_with_params {
    ($(($i:tt, $T:tt)),*) => {

    #[async_trait]
    impl<Context, FuncType, FutureType, ResponseType, $($T,)*>
        FakeHandlerFunc<Context, ($($T,)*), ResponseType> for FuncType
    where
        Context: ServerContext,
        FuncType: Fn(RequestContext<Context>, $($T,)*)
            -> FutureType + Send + Sync + 'static,
        FutureType: Future<Output = Result<ResponseType, ErrorResponder>>
            + Send + 'static,
        ResponseType: HandlerResponse + Send + Sync + 'static,
        ($($T,)*): RequestExtractor,
        $($T: Send + Sync + 'static,)*
    {
        async fn handle_request(
            &self,
            rqctx: RequestContext<Context>,
            _param_tuple: ($($T,)*)
        ) -> Result<ResponseType, ErrorResponder>
        {
            (self)(rqctx, $(_param_tuple.$i,)*).await
        }
    }
}}

impl_FakeHandlerFunc_for_func_with_params!();
impl_FakeHandlerFunc_for_func_with_params!((0, T0));
impl_FakeHandlerFunc_for_func_with_params!((0, T1), (1, T2));
impl_FakeHandlerFunc_for_func_with_params!((0, T1), (1, T2), (2, T3));
impl_FakeHandlerFunc_for_func_with_params!(
    (0, T1),
    (1, T2),
    (2, T3),
    (3, T4)
);

/// `RouteHandler` abstracts a `FakeHandlerFunc<FuncParams, ResponseType>` in
/// a way that allows callers to invoke the handler without knowing the
/// handler's function signature.
#[async_trait]
pub trait RouteHandler<Context: ServerContext>: Debug + Send + Sync {
    /// Returns a description of this handler.  This might be a function
    /// name, for example.  This is not guaranteed to be unique.
    fn label(&self) -> &str;

    /// Extracts the handler's arguments from the request, invokes it, and
    /// renders its responder.
    async fn handle_request(
        &self,
        rqctx: RequestContext<Context>,
        request: http::Request<Body>,
    ) -> Result<HandlerOutput, FakeError>;
}

/// `FakeRouteHandler` is the only type that implements `RouteHandler`.
pub struct FakeRouteHandler<Context, HandlerType, FuncParams, ResponseType>
where
    Context: ServerContext,
    HandlerType: FakeHandlerFunc<Context, FuncParams, ResponseType>,
    FuncParams: RequestExtractor,
    ResponseType: HandlerResponse + Send + Sync + 'static,
{
    /// the actual FakeHandlerFunc used to implement this operation
    handler: HandlerType,

    /// debugging label for the handler
    label: String,

    /// `FuncParams` and `ResponseType` appear only in the bound on
    /// `HandlerType`.  PhantomData keeps them constrained.
    phantom: PhantomData<fn() -> (FuncParams, ResponseType, Context)>,
}

impl<Context, HandlerType, FuncParams, ResponseType> Debug
    for FakeRouteHandler<Context, HandlerType, FuncParams, ResponseType>
where
    Context: ServerContext,
    HandlerType: FakeHandlerFunc<Context, FuncParams, ResponseType>,
    FuncParams: RequestExtractor,
    ResponseType: HandlerResponse + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "handler: {}", self.label)
    }
}

#[async_trait]
impl<Context, HandlerType, FuncParams, ResponseType> RouteHandler<Context>
    for FakeRouteHandler<Context, HandlerType, FuncParams, ResponseType>
where
    Context: ServerContext,
    HandlerType: FakeHandlerFunc<Context, FuncParams, ResponseType>,
    FuncParams: RequestExtractor + 'static,
    ResponseType: HandlerResponse + Send + Sync + 'static,
{
    fn label(&self) -> &str {
        &self.label
    }

    async fn handle_request(
        &self,
        rqctx: RequestContext<Context>,
        request: http::Request<Body>,
    ) -> Result<HandlerOutput, FakeError> {
        let operation = rqctx.operation_id.clone();
        // `FuncParams` is the tuple of extractor types the handler takes.
        // Extraction fails as a whole, before the handler runs, if any one
        // parameter is malformed.
        let funcparams = RequestExtractor::from_request(&rqctx, request)
            .await
            .map_err(|source| FakeError::Decode {
                operation: operation.clone(),
                source,
            })?;
        let response = self
            .handler
            .handle_request(rqctx, funcparams)
            .await
            .map_err(|error| FakeError::Response { operation, error })?;
        Ok(response.into_output())
    }
}

impl<Context, HandlerType, FuncParams, ResponseType>
    FakeRouteHandler<Context, HandlerType, FuncParams, ResponseType>
where
    Context: ServerContext,
    HandlerType: FakeHandlerFunc<Context, FuncParams, ResponseType>,
    FuncParams: RequestExtractor + 'static,
    ResponseType: HandlerResponse + Send + Sync + 'static,
{
    /// Given a function matching one of the supported handler function
    /// signatures, return a RouteHandler that can be used to respond to
    /// requests using this function.
    pub fn new_with_name(
        handler: HandlerType,
        label: &str,
    ) -> Arc<dyn RouteHandler<Context>> {
        Arc::new(FakeRouteHandler {
            label: label.to_string(),
            handler,
            phantom: PhantomData,
        })
    }
}
