// Copyright 2024 Oxide Computer Company

//! Header extractor

use super::ExtractorError;
use super::ParameterLocation;
use super::SharedExtractor;
use crate::from_map::from_map;
use crate::from_map::KeyMatching;
use crate::handler::RequestContext;
use crate::server::ServerContext;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

/// `Header<HeaderType>` deserializes an instance of `HeaderType` from the
/// request's headers.  Field names (after any `#[serde(rename)]`) match
/// header names without regard to case.  When a header is repeated, only
/// its first value is used.  An empty value counts as absent for `Option`
/// fields, and a value that is not valid UTF-8 is rejected.  RFC1123 dates
/// decode through [`crate::HttpDate`].
#[derive(Debug)]
pub struct Header<HeaderType: DeserializeOwned + Send + Sync> {
    inner: HeaderType,
}

impl<HeaderType: DeserializeOwned + Send + Sync> Header<HeaderType> {
    pub fn into_inner(self) -> HeaderType {
        self.inner
    }
}

#[async_trait]
impl<HeaderType> SharedExtractor for Header<HeaderType>
where
    HeaderType: DeserializeOwned + Send + Sync + 'static,
{
    async fn from_request<Context: ServerContext>(
        rqctx: &RequestContext<Context>,
    ) -> Result<Header<HeaderType>, ExtractorError> {
        let mut headers = BTreeMap::new();
        for (name, value) in rqctx.request.headers() {
            headers
                .entry(name.as_str().to_string())
                .or_insert(value.as_bytes());
        }
        from_map(&headers, KeyMatching::CaseInsensitive)
            .map(|inner| Header { inner })
            .map_err(|e| {
                ExtractorError::parameter(ParameterLocation::Header, e)
            })
    }
}
