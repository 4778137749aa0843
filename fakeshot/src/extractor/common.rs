// Copyright 2024 Oxide Computer Company

use super::ExtractorError;
use crate::body::Body;
use crate::handler::RequestContext;
use crate::server::ServerContext;

use async_trait::async_trait;

/// Extractors that require exclusive access to the underlying request
///
/// These extractors consume the body of the request.  There may be at most
/// one of these associated with any handler, and it must come last.
#[async_trait]
pub trait ExclusiveExtractor: Send + Sync + Sized {
    /// Construct an instance of this type from a `RequestContext`.
    async fn from_request<Context: ServerContext>(
        rqctx: &RequestContext<Context>,
        request: http::Request<Body>,
    ) -> Result<Self, ExtractorError>;
}

/// Extractors that do _not_ require exclusive access to the underlying
/// request
///
/// These extractors look at properties of the request that are known up
/// front, like the path variables, query string and headers.  There may be
/// any number of these associated with any handler.
#[async_trait]
pub trait SharedExtractor: Send + Sync + Sized {
    /// Construct an instance of this type from a `RequestContext`.
    async fn from_request<Context: ServerContext>(
        rqctx: &RequestContext<Context>,
    ) -> Result<Self, ExtractorError>;
}

// A `SharedExtractor` can always be treated like an `ExclusiveExtractor`.
#[async_trait]
impl<S: SharedExtractor> ExclusiveExtractor for S {
    async fn from_request<Context: ServerContext>(
        rqctx: &RequestContext<Context>,
        _request: http::Request<Body>,
    ) -> Result<Self, ExtractorError> {
        <S as SharedExtractor>::from_request(rqctx).await
    }
}

/// Top-level extractor for a given request
///
/// Handler functions take different numbers of extractor arguments.  This
/// trait is implemented for the supported _tuples_ of argument types (zero or
/// more `SharedExtractor`s followed by at most one `ExclusiveExtractor`) so
/// that every handler can be invoked the same way.  It is only implemented on
/// tuples and only used to kick off extraction from the top level.
#[async_trait]
pub trait RequestExtractor: Send + Sync + Sized {
    /// Construct an instance of this type from a `RequestContext`.
    async fn from_request<Context: ServerContext>(
        rqctx: &RequestContext<Context>,
        request: http::Request<Body>,
    ) -> Result<Self, ExtractorError>;
}

// Impl for zero-element tuple (used for handlers with no extractors)
#[async_trait]
impl RequestExtractor for () {
    async fn from_request<Context: ServerContext>(
        _rqctx: &RequestContext<Context>,
        _request: http::Request<Body>,
    ) -> Result<Self, ExtractorError> {
        Ok(())
    }
}

// Impl for one-element tuple with an exclusive extractor
#[async_trait]
impl<X: ExclusiveExtractor + 'static> RequestExtractor for (X,) {
    async fn from_request<Context: ServerContext>(
        rqctx: &RequestContext<Context>,
        request: http::Request<Body>,
    ) -> Result<Self, ExtractorError> {
        Ok((X::from_request(rqctx, request).await?,))
    }
}

/// Defines implementations of `RequestExtractor` for tuples of one or more
/// `SharedExtractor` followed by an `ExclusiveExtractor`
///
/// `impl_rqextractor_for_tuple!(S1, S2)` defines an impl of
/// `RequestExtractor` for tuple `(S1, S2, X)` where `S1: SharedExtractor`,
/// `S2: SharedExtractor`, and `X: ExclusiveExtractor`.  Since every
/// `SharedExtractor` is also an `ExclusiveExtractor`, this covers
/// `(S1, S2, S3)` as well.
macro_rules! impl_rqextractor_for_tuple {
    ($( $S:ident),+) => {

    #[async_trait]
    impl< X: ExclusiveExtractor + 'static, $($S: SharedExtractor + 'static,)+ >
        RequestExtractor
        for ($($S,)+ X)
    {
        async fn from_request<Context: ServerContext>(
            rqctx: &RequestContext<Context>,
            request: http::Request<Body>
        ) -> Result<( $($S,)+ X ), ExtractorError>
        {
            futures::try_join!(
                $($S::from_request(rqctx),)+
                X::from_request(rqctx, request)
            )
        }
    }
}}

impl_rqextractor_for_tuple!(S1);
impl_rqextractor_for_tuple!(S1, S2);
impl_rqextractor_for_tuple!(S1, S2, S3);
