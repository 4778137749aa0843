// Copyright 2024 Oxide Computer Company

//! The seam between client code and whatever sends its requests
//!
//! Client code that wants to be testable against a fake is written against
//! [`Transport`].  In production that is an adapter around a real HTTP
//! client; under test it is a [`crate::FakeServer`] or a
//! [`crate::ServerFactory`].  Either way the client attaches the logical
//! operation being invoked to the request as an [`OperationId`] extension,
//! and optionally a [`CancellationToken`], with [`RequestExt`].

use crate::body::Body;
use crate::error::FakeError;
use async_trait::async_trait;
use std::borrow::Borrow;
use std::borrow::Cow;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Names one client method, such as `"WidgetClient.GetWidget"`.
///
/// The text before the first `.` names the client, which is how
/// [`crate::ServerFactory`] picks a server; the rest names the method.
#[derive(Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub struct OperationId(Cow<'static, str>);

impl OperationId {
    pub const fn from_static(id: &'static str) -> Self {
        OperationId(Cow::Borrowed(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the client part of the id, if the id has one.
    pub fn client_name(&self) -> Option<&str> {
        self.0.split_once('.').map(|(client, _)| client)
    }

    /// Returns the method part of the id, or the whole id if there is no
    /// client part.
    pub fn method_name(&self) -> &str {
        match self.0.split_once('.') {
            Some((_, method)) => method,
            None => &self.0,
        }
    }
}

// Hashes like `str` so that maps keyed by `OperationId` can be queried with a
// plain `&str`.
impl Hash for OperationId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state)
    }
}

impl Borrow<str> for OperationId {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for OperationId {
    fn from(id: &'static str) -> Self {
        OperationId::from_static(id)
    }
}

impl From<String> for OperationId {
    fn from(id: String) -> Self {
        OperationId(Cow::Owned(id))
    }
}

/// Sends a request and produces its response.
///
/// This is the seam at which a fake replaces the real network.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: http::Request<Body>,
    ) -> Result<http::Response<Body>, FakeError>;
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    async fn send(
        &self,
        request: http::Request<Body>,
    ) -> Result<http::Response<Body>, FakeError> {
        (**self).send(request).await
    }
}

/// Attaches dispatch metadata to an outgoing request.
pub trait RequestExt {
    /// Records the operation this request invokes.
    fn with_operation<O: Into<OperationId>>(self, operation: O) -> Self;

    /// Records a token that cancels the request when fired.
    fn with_cancellation(self, token: CancellationToken) -> Self;

    fn operation_id(&self) -> Option<&OperationId>;
}

impl<B> RequestExt for http::Request<B> {
    fn with_operation<O: Into<OperationId>>(mut self, operation: O) -> Self {
        self.extensions_mut().insert(operation.into());
        self
    }

    fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.extensions_mut().insert(token);
        self
    }

    fn operation_id(&self) -> Option<&OperationId> {
        self.extensions().get::<OperationId>()
    }
}
