// Copyright 2024 Oxide Computer Company

//! Hook for answering requests before they reach an operation's handler

use crate::error::FakeError;
use crate::handler::RequestInfo;
use crate::transport::OperationId;
use crate::Body;

/// Consulted first for every request that carries an operation id.
///
/// Returning `Some(result)` answers the request with `result` as-is, and
/// neither the registry nor any handler is consulted.  Returning `None`
/// lets dispatch continue normally.  Tests use this to simulate failures
/// that happen below the service, such as a dropped connection:
///
/// ```ignore
/// let interceptor = |operation: &OperationId,
///                    _: &RequestInfo|
///  -> Option<Result<http::Response<Body>, FakeError>> {
///     (operation.method_name() == "GetWidget")
///         .then(|| Err(FakeError::transport("connection reset")))
/// };
/// ```
pub trait Interceptor: Send + Sync {
    fn intercept(
        &self,
        operation: &OperationId,
        request: &RequestInfo,
    ) -> Option<Result<http::Response<Body>, FakeError>>;
}

/// The default interceptor, which never intercepts.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoInterception;

impl Interceptor for NoInterception {
    fn intercept(
        &self,
        _operation: &OperationId,
        _request: &RequestInfo,
    ) -> Option<Result<http::Response<Body>, FakeError>> {
        None
    }
}

impl<F> Interceptor for F
where
    F: Fn(
            &OperationId,
            &RequestInfo,
        ) -> Option<Result<http::Response<Body>, FakeError>>
        + Send
        + Sync,
{
    fn intercept(
        &self,
        operation: &OperationId,
        request: &RequestInfo,
    ) -> Option<Result<http::Response<Body>, FakeError>> {
        (self)(operation, request)
    }
}
