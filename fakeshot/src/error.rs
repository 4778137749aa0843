// Copyright 2024 Oxide Computer Company

//! Errors produced while dispatching a request to a fake server
//!
//! Error handling in a fake transport
//! ----------------------------------
//!
//! A fake server stands in for a real transport, so every failure it reports
//! comes back to the client code under test as a transport-level error.
//! Nearly all of those failures are deterministic: they describe a mistake in
//! the way the test set up the fake (a missing handler, a request that was not
//! built through the client pipeline) or a disagreement between the handler
//! and the operation it implements (a status code the operation never
//! returns).  Retrying them would only repeat the same failure, so
//! [`FakeError::is_retriable()`] reports `false` for all of them.
//!
//! Two kinds of error are different:
//!
//! * [`FakeError::Response`] carries an error response that a handler chose
//!   to return via [`crate::ErrorResponder`].  Whether that is retriable
//!   depends on its status code, exactly as it would for a real service.
//! * [`FakeError::Transport`] is what an [`crate::Interceptor`] returns to
//!   simulate a low-level failure such as a connection reset.  These are
//!   always retriable.
//!
//! Cancellation is reported as [`FakeError::Cancelled`] and is never wrapped.
//!
//! Every error that happens after the operation id is known names that
//! operation, so that a failing test's output identifies the handler at
//! fault.

use crate::extractor::ExtractorError;
use crate::responder::ErrorResponder;
use crate::transport::OperationId;
use http::StatusCode;
use std::fmt;

/// An error produced by [`crate::FakeServer`] or [`crate::ServerFactory`]
/// while dispatching a request.
#[derive(Debug, thiserror::Error)]
pub enum FakeError {
    /// The request did not carry an [`OperationId`] extension.
    #[error(
        "unable to dispatch request, missing operation id in request \
         extensions"
    )]
    MissingOperationId,

    /// No operation with this id was registered with the server.
    #[error("unhandled API {0}")]
    UnhandledApi(OperationId),

    /// No client with this name was registered with the factory.
    #[error("unhandled client {0}")]
    UnhandledClient(String),

    /// The operation was registered without a handler.
    #[error("fake for method {} not implemented", .0.method_name())]
    NotImplemented(OperationId),

    /// A pager or poller responder ran out of steps, or was never given a
    /// terminal response.
    #[error("{operation}: {message}")]
    Sequence { operation: OperationId, message: String },

    /// The request path did not match the operation's path pattern.
    #[error("{operation}: failed to parse path {path}")]
    PathMismatch { operation: OperationId, path: String },

    /// A path, query, header or body parameter could not be decoded.
    #[error("{operation}: {source}")]
    Decode {
        operation: OperationId,
        #[source]
        source: ExtractorError,
    },

    /// The handler returned a status code that the operation does not
    /// declare.
    #[error(
        "{operation}: unexpected status code {status}. acceptable values \
         are {acceptable}"
    )]
    UnexpectedStatus {
        operation: OperationId,
        status: StatusCode,
        acceptable: StatusCodes,
    },

    /// The handler's response headers or payload could not be rendered.
    #[error("{operation}: failed to serialize response: {message}")]
    Serialization { operation: OperationId, message: String },

    /// The handler returned an error response.
    #[error("{operation}: {error}")]
    Response {
        operation: OperationId,
        #[source]
        error: ErrorResponder,
    },

    /// A simulated transport failure, typically produced by an interceptor.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The request's cancellation token fired before dispatch completed.
    #[error("request cancelled")]
    Cancelled,

    /// A detached dispatch task went away without reporting a result.
    #[error("{operation}: dispatch task exited without a result")]
    WorkerLost { operation: OperationId },
}

/// Broad classification of a [`FakeError`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The fake was set up incorrectly, or the request was not built through
    /// the client pipeline.
    Configuration,
    /// The request carried a malformed parameter or body.
    Decode,
    /// The handler violated the operation's status code contract.
    ContractViolation,
    /// The handler's response headers or payload could not be rendered.
    Serialization,
    /// The handler chose to return an error response.
    Response,
    /// A simulated transport failure.
    Transport,
    /// The request was cancelled.
    Cancelled,
}

impl FakeError {
    /// Builds the error an interceptor returns to simulate a transport
    /// failure.
    pub fn transport<S: Into<String>>(message: S) -> Self {
        FakeError::Transport(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FakeError::MissingOperationId
            | FakeError::UnhandledApi(_)
            | FakeError::UnhandledClient(_)
            | FakeError::NotImplemented(_)
            | FakeError::Sequence { .. }
            | FakeError::WorkerLost { .. } => ErrorKind::Configuration,
            FakeError::PathMismatch { .. } | FakeError::Decode { .. } => {
                ErrorKind::Decode
            }
            FakeError::UnexpectedStatus { .. } => ErrorKind::ContractViolation,
            FakeError::Serialization { .. } => ErrorKind::Serialization,
            FakeError::Response { .. } => ErrorKind::Response,
            FakeError::Transport(_) => ErrorKind::Transport,
            FakeError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Returns whether a generic retry policy may retry the request.
    pub fn is_retriable(&self) -> bool {
        match self {
            FakeError::Response { error, .. } => {
                error.status_code().is_retriable()
            }
            FakeError::Transport(_) => true,
            _ => false,
        }
    }

    /// Returns the operation this error concerns, when it is known.
    pub fn operation(&self) -> Option<&OperationId> {
        match self {
            FakeError::UnhandledApi(operation)
            | FakeError::NotImplemented(operation)
            | FakeError::Sequence { operation, .. }
            | FakeError::PathMismatch { operation, .. }
            | FakeError::Decode { operation, .. }
            | FakeError::UnexpectedStatus { operation, .. }
            | FakeError::Serialization { operation, .. }
            | FakeError::Response { operation, .. }
            | FakeError::WorkerLost { operation } => Some(operation),
            FakeError::MissingOperationId
            | FakeError::UnhandledClient(_)
            | FakeError::Transport(_)
            | FakeError::Cancelled => None,
        }
    }

    /// Returns the handler's error response, if this error carries one.
    pub fn error_response(&self) -> Option<&ErrorResponder> {
        match self {
            FakeError::Response { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// The set of success status codes an operation accepts.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StatusCodes(Vec<StatusCode>);

impl StatusCodes {
    pub fn new<I>(codes: I) -> Self
    where
        I: IntoIterator<Item = StatusCode>,
    {
        let mut codes: Vec<StatusCode> = codes.into_iter().collect();
        codes.sort();
        codes.dedup();
        StatusCodes(codes)
    }

    pub fn contains(&self, status: StatusCode) -> bool {
        self.0.contains(&status)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StatusCode> {
        self.0.iter()
    }

    /// Returns a copy of this set with `extra` added.
    pub(crate) fn with(&self, extra: &[StatusCode]) -> StatusCodes {
        StatusCodes::new(self.0.iter().chain(extra.iter()).copied())
    }
}

impl fmt::Display for StatusCodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for status in &self.0 {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{}", status.as_u16())?;
        }
        Ok(())
    }
}
