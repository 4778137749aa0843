// Copyright 2024 Oxide Computer Company

//! Path parameter extractor

use super::ExtractorError;
use super::ParameterLocation;
use super::SharedExtractor;
use crate::from_map::from_map;
use crate::from_map::KeyMatching;
use crate::handler::RequestContext;
use crate::server::ServerContext;
use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// `Path<PathType>` deserializes an instance of `PathType` from the variables
/// captured by the operation's path pattern.  Fields are matched to
/// parameters by the names used in the path template (`{api-version}` needs
/// `#[serde(rename = "api-version")]`).  Values are already percent-decoded.
/// Literal parameters have no captured value.
#[derive(Debug)]
pub struct Path<PathType: Send + Sync> {
    inner: PathType,
}

impl<PathType: Send + Sync> Path<PathType> {
    pub fn into_inner(self) -> PathType {
        self.inner
    }
}

#[async_trait]
impl<PathType> SharedExtractor for Path<PathType>
where
    PathType: DeserializeOwned + Send + Sync + 'static,
{
    async fn from_request<Context: ServerContext>(
        rqctx: &RequestContext<Context>,
    ) -> Result<Path<PathType>, ExtractorError> {
        from_map(&rqctx.path_variables, KeyMatching::Exact)
            .map(|inner| Path { inner })
            .map_err(|e| ExtractorError::parameter(ParameterLocation::Path, e))
    }
}
