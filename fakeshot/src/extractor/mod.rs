// Copyright 2024 Oxide Computer Company

//! Extractors: traits and impls
//!
//! A handler function names the parameters it wants decoded by taking
//! extractors as arguments after its [`crate::RequestContext`]:
//!
//! * [`Path<P>`] decodes the variables captured by the operation's path
//!   pattern.
//! * [`Query<Q>`] decodes the query string.
//! * [`Header<H>`] decodes request headers, matching names without regard
//!   to case.
//! * [`TypedBody<B>`] decodes a JSON request body.  [`UntypedBody`] hands
//!   over the raw bytes.
//!
//! Optional parameters are `Option` fields, and are `None` when absent.  A
//! value that is present but malformed fails extraction with an
//! [`ExtractorError`] naming the offending field, and the handler is not
//! called.

mod common;
pub use common::ExclusiveExtractor;
pub use common::RequestExtractor;
pub use common::SharedExtractor;

mod body;
pub use body::TypedBody;
pub use body::UntypedBody;

mod header;
pub use header::Header;

mod path;
pub use path::Path;

mod query;
pub use query::Query;

use std::fmt;

/// Where a parameter came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
}

impl fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParameterLocation::Path => "path",
            ParameterLocation::Query => "query",
            ParameterLocation::Header => "header",
        })
    }
}

/// Errors returned by extractors.
///
/// Because extractors can be combined (a tuple of types which are extractors
/// is itself an extractor), all extractors return this one type.
#[derive(Debug, thiserror::Error)]
pub enum ExtractorError {
    /// A path, query or header parameter was missing or malformed.
    #[error("invalid {location} parameter \"{field}\": {message}")]
    Parameter { location: ParameterLocation, field: String, message: String },
    /// The JSON body did not match the expected type.
    #[error("unable to parse JSON body: {field}: {message}")]
    Body { field: String, message: String },
    #[error("expected content type \"application/json\", got \"{0}\"")]
    ContentType(String),
    #[error("request body exceeded maximum size of {limit} bytes")]
    BodyTooLarge { limit: usize },
    #[error("error reading request body: {0}")]
    BodyRead(String),
}

impl ExtractorError {
    /// Builds a parameter error from a deserialization error that recorded
    /// the path of the field it failed on.
    pub(crate) fn parameter<E: fmt::Display>(
        location: ParameterLocation,
        error: serde_path_to_error::Error<E>,
    ) -> ExtractorError {
        ExtractorError::Parameter {
            location,
            field: error.path().to_string(),
            message: error.inner().to_string(),
        }
    }
}
