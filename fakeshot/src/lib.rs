// Copyright 2024 Oxide Computer Company

//! Fakeshot provides in-memory fake transports for testing HTTP API clients.
//!
//! A service client written against the [`Transport`] trait sends its
//! requests through whatever transport it is given.  In production that is a
//! real HTTP stack.  Under test it can be a [`FakeServer`]: a table of the
//! client's operations, each bound to a handler function written by the test,
//! with no network in between.  The fake server:
//!
//! * routes each request by the logical operation it invokes, which the
//!   client attaches to the request as an [`OperationId`] extension;
//! * decodes the request's path, query, header and body parameters into the
//!   types the handler asks for, reporting the offending field when a value
//!   is malformed;
//! * invokes the handler, and checks the status code it chose against the
//!   status codes the operation is declared to return;
//! * renders the handler's payload as the response the client reads back.
//!
//! ## Usage
//!
//! The handler for an operation is an async function taking a
//! [`RequestContext`] and any number of extractors ([`Path`], [`Query`],
//! [`Header`], and last, [`TypedBody`] or [`UntypedBody`]), returning a
//! success responder or an [`ErrorResponder`]:
//!
//! ```
//! use fakeshot::ErrorResponder;
//! use fakeshot::ErrorStatusCode;
//! use fakeshot::FakeApi;
//! use fakeshot::FakeOperation;
//! use fakeshot::Path;
//! use fakeshot::RequestContext;
//! use fakeshot::RequestExt;
//! use fakeshot::Responder;
//! use fakeshot::ServerBuilder;
//! use http::StatusCode;
//! use serde::Deserialize;
//! use serde::Serialize;
//!
//! #[derive(Deserialize)]
//! struct WidgetPath {
//!     #[serde(rename = "widgetName")]
//!     widget_name: String,
//! }
//!
//! #[derive(Serialize)]
//! struct Widget {
//!     name: String,
//! }
//!
//! async fn get_widget(
//!     _rqctx: RequestContext<()>,
//!     path: Path<WidgetPath>,
//! ) -> Result<Responder<Widget>, ErrorResponder> {
//!     let path = path.into_inner();
//!     if path.widget_name == "missing" {
//!         return Err(ErrorResponder::new(
//!             ErrorStatusCode::NOT_FOUND,
//!             "WidgetNotFound",
//!         ));
//!     }
//!     Ok(Responder::ok(Widget { name: path.widget_name }))
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut api = FakeApi::new();
//! api.register(
//!     FakeOperation::new("WidgetClient.GetWidget")
//!         .path("/widgets/{widgetName}")
//!         .success([StatusCode::OK])
//!         .handler(get_widget),
//! )
//! .unwrap();
//!
//! let log = slog::Logger::root(slog::Discard, slog::o!());
//! let server = ServerBuilder::new(api, (), log).build();
//!
//! let request = http::Request::get("https://fake.example/widgets/w1")
//!     .body(fakeshot::Body::empty())
//!     .unwrap()
//!     .with_operation("WidgetClient.GetWidget");
//! let response = server.dispatch(request).await.unwrap();
//! assert_eq!(response.status(), StatusCode::OK);
//! # }
//! ```
//!
//! ## Failures
//!
//! Failures are reported as [`FakeError`], classified by
//! [`FakeError::kind`].  Mistakes in setting up the fake (an operation with no
//! handler, a request without an operation id) are distinct from malformed
//! requests, and both are distinct from a handler breaking its operation's
//! status code contract.  None of these are retriable.  An
//! [`ErrorResponder`] returned by a handler is delivered as
//! [`FakeError::Response`] and is retriable exactly when its status would be
//! for a real service.
//!
//! ## Cancellation
//!
//! A request carrying a `CancellationToken` (see
//! [`RequestExt::with_cancellation`]) fails with [`FakeError::Cancelled`] as
//! soon as the token fires.  [`ConfigFakeServer::dispatch_mode`] selects
//! whether the handler keeps running in the background
//! ([`DispatchMode::Detached`]) or is dropped ([`DispatchMode::Inline`]).
//!
//! ## Multi-step responses
//!
//! [`PagerResponder`] and [`PollerResponder`] answer one request per step:
//! the handler runs once and follow-up requests for the same resource (the
//! next-page links and poll locations the responders hand out) are served
//! the remaining steps.

#[macro_use]
extern crate slog;

mod body;
mod config;
pub mod encoding;
mod error;
mod error_status_code;
mod extractor;
mod factory;
mod from_map;
mod handler;
mod interceptor;
mod logging;
pub mod path_pattern;
mod registry;
pub mod responder;
mod server;
mod tracker;
mod transport;

pub mod test_util;

pub use body::Body;
pub use config::ConfigFakeServer;
pub use config::DispatchMode;
pub use encoding::Base64Bytes;
pub use encoding::Delimited;
pub use encoding::HttpDate;
pub use error::ErrorKind;
pub use error::FakeError;
pub use error::StatusCodes;
pub use error_status_code::ErrorStatusCode;
pub use error_status_code::InvalidErrorStatusCode;
pub use error_status_code::NotAnError;
pub use extractor::ExclusiveExtractor;
pub use extractor::ExtractorError;
pub use extractor::Header;
pub use extractor::ParameterLocation;
pub use extractor::Path;
pub use extractor::Query;
pub use extractor::RequestExtractor;
pub use extractor::SharedExtractor;
pub use extractor::TypedBody;
pub use extractor::UntypedBody;
pub use factory::ServerFactory;
pub use handler::FakeHandlerFunc;
pub use handler::RequestContext;
pub use handler::RequestInfo;
pub use interceptor::Interceptor;
pub use interceptor::NoInterception;
pub use logging::ConfigLogging;
pub use logging::ConfigLoggingIfExists;
pub use logging::ConfigLoggingLevel;
pub use path_pattern::PathPattern;
pub use path_pattern::PathPatternError;
pub use path_pattern::PathSegment;
pub use registry::FakeApi;
pub use registry::FakeOperation;
pub use registry::Operation;
pub use registry::OperationRegistry;
pub use registry::RegisterError;
pub use responder::Empty;
pub use responder::ErrorResponder;
pub use responder::FreeformBody;
pub use responder::PagerResponder;
pub use responder::PollerResponder;
pub use responder::Responder;
pub use server::FakeServer;
pub use server::FakeState;
pub use server::ServerBuilder;
pub use server::ServerContext;
pub use transport::OperationId;
pub use transport::RequestExt;
pub use transport::Transport;

// Re-export so that consumers name the same token type the server reads.
pub use tokio_util::sync::CancellationToken;
