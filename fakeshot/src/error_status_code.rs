// Copyright 2024 Oxide Computer Company

//! A newtype around [`http::StatusCode`] limited to the ranges that represent
//! errors, used by [`crate::ErrorResponder`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// An HTTP 4xx (client error) or 5xx (server error) status code.
///
/// Construct one from any [`http::StatusCode`] with `TryFrom`, which fails
/// for statuses outside those ranges, or use one of the constants such as
/// [`ErrorStatusCode::NOT_FOUND`].
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u16", into = "u16")]
pub struct ErrorStatusCode(http::StatusCode);

macro_rules! error_status_code_constants {
    ( $($(#[$docs:meta])* $name:ident;)+ ) => {
        $(
            $(#[$docs])*
            pub const $name: Self = Self(http::StatusCode::$name);
        )+
    }
}

impl ErrorStatusCode {
    error_status_code_constants! {
        /// 400 Bad Request
        BAD_REQUEST;
        /// 401 Unauthorized
        UNAUTHORIZED;
        /// 403 Forbidden
        FORBIDDEN;
        /// 404 Not Found
        NOT_FOUND;
        /// 408 Request Timeout
        REQUEST_TIMEOUT;
        /// 409 Conflict
        CONFLICT;
        /// 412 Precondition Failed
        PRECONDITION_FAILED;
        /// 429 Too Many Requests
        TOO_MANY_REQUESTS;
        /// 500 Internal Server Error
        INTERNAL_SERVER_ERROR;
        /// 501 Not Implemented
        NOT_IMPLEMENTED;
        /// 502 Bad Gateway
        BAD_GATEWAY;
        /// 503 Service Unavailable
        SERVICE_UNAVAILABLE;
        /// 504 Gateway Timeout
        GATEWAY_TIMEOUT;
    }

    /// Converts an [`http::StatusCode`] into an error status code, failing
    /// if it is not a 4xx or 5xx status.
    pub fn from_status(status: http::StatusCode) -> Result<Self, NotAnError> {
        if status.is_client_error() || status.is_server_error() {
            Ok(Self(status))
        } else {
            Err(NotAnError(status))
        }
    }

    /// Converts a `u16` into an error status code.
    pub fn from_u16(code: u16) -> Result<Self, InvalidErrorStatusCode> {
        let status = http::StatusCode::from_u16(code)?;
        Ok(Self::from_status(status)?)
    }

    /// Returns the underlying [`http::StatusCode`].
    pub fn as_status(&self) -> http::StatusCode {
        self.0
    }

    pub fn as_u16(&self) -> u16 {
        self.0.as_u16()
    }

    /// Returns `true` for a 4xx status.
    pub fn is_client_error(&self) -> bool {
        self.0.is_client_error()
    }

    /// Returns `true` for the statuses that a typical client retry policy
    /// treats as transient: 408, 429, 500, 502, 503 and 504.
    pub fn is_retriable(&self) -> bool {
        matches!(self.as_u16(), 408 | 429 | 500 | 502 | 503 | 504)
    }
}

impl fmt::Debug for ErrorStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

/// Formats the status code, *including* the canonical reason.
impl fmt::Display for ErrorStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl PartialEq<http::StatusCode> for ErrorStatusCode {
    fn eq(&self, other: &http::StatusCode) -> bool {
        self.0 == *other
    }
}

impl From<ErrorStatusCode> for http::StatusCode {
    fn from(status: ErrorStatusCode) -> http::StatusCode {
        status.0
    }
}

impl From<ErrorStatusCode> for u16 {
    fn from(status: ErrorStatusCode) -> u16 {
        status.as_u16()
    }
}

impl TryFrom<http::StatusCode> for ErrorStatusCode {
    type Error = NotAnError;

    fn try_from(value: http::StatusCode) -> Result<Self, Self::Error> {
        Self::from_status(value)
    }
}

impl TryFrom<u16> for ErrorStatusCode {
    type Error = InvalidErrorStatusCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::from_u16(value)
    }
}

/// The status code passed to [`ErrorStatusCode::from_status`] was not a 4xx
/// or 5xx status.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("status code {0} is not a 4xx or 5xx error")]
pub struct NotAnError(http::StatusCode);

#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum InvalidErrorStatusCode {
    #[error(transparent)]
    NotAnError(#[from] NotAnError),
    #[error("invalid status code")]
    InvalidStatus,
}

impl From<http::status::InvalidStatusCode> for InvalidErrorStatusCode {
    fn from(_: http::status::InvalidStatusCode) -> Self {
        Self::InvalidStatus
    }
}
