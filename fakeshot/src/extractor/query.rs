// Copyright 2024 Oxide Computer Company

//! Querystring extractor

use super::ExtractorError;
use super::ParameterLocation;
use super::SharedExtractor;
use crate::from_map::from_map;
use crate::from_map::KeyMatching;
use crate::handler::RequestContext;
use crate::handler::RequestInfo;
use crate::server::ServerContext;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

/// `Query<QueryType>` deserializes an instance of `QueryType` from the
/// request's query string.  Use `Option` fields for optional parameters, and
/// [`crate::Delimited`] for comma-separated lists.  As with headers, a
/// repeated parameter keeps its first value and an empty value counts as
/// absent for `Option` fields.
#[derive(Debug)]
pub struct Query<QueryType: DeserializeOwned + Send + Sync> {
    inner: QueryType,
}

impl<QueryType: DeserializeOwned + Send + Sync> Query<QueryType> {
    pub fn into_inner(self) -> QueryType {
        self.inner
    }
}

/// Given a request, pull out the query string and attempt to deserialize it
/// as an instance of `QueryType`.
fn http_request_load_query<QueryType>(
    request: &RequestInfo,
) -> Result<Query<QueryType>, ExtractorError>
where
    QueryType: DeserializeOwned + Send + Sync,
{
    let raw_query_string = request.uri().query().unwrap_or("");
    let mut params = BTreeMap::new();
    for (name, value) in form_urlencoded::parse(raw_query_string.as_bytes()) {
        params.entry(name.into_owned()).or_insert_with(|| value.into_owned());
    }
    from_map(&params, KeyMatching::Exact)
        .map(|inner| Query { inner })
        .map_err(|e| ExtractorError::parameter(ParameterLocation::Query, e))
}

#[async_trait]
impl<QueryType> SharedExtractor for Query<QueryType>
where
    QueryType: DeserializeOwned + Send + Sync + 'static,
{
    async fn from_request<Context: ServerContext>(
        rqctx: &RequestContext<Context>,
    ) -> Result<Query<QueryType>, ExtractorError> {
        http_request_load_query(&rqctx.request)
    }
}
