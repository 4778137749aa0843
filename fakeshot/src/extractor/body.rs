// Copyright 2024 Oxide Computer Company

//! Body extractors

use super::ExclusiveExtractor;
use super::ExtractorError;
use crate::body::Body;
use crate::body::CollectError;
use crate::handler::RequestContext;
use crate::server::ServerContext;
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;

/// `TypedBody<BodyType>` deserializes an instance of `BodyType` from a JSON
/// request body.  A body that does not match `BodyType` fails with an error
/// naming the offending field.  An empty body is read as JSON `null`, so an
/// `Option<T>` body may be omitted entirely.
#[derive(Debug)]
pub struct TypedBody<BodyType: DeserializeOwned + Send + Sync> {
    inner: BodyType,
}

impl<BodyType: DeserializeOwned + Send + Sync> TypedBody<BodyType> {
    pub fn into_inner(self) -> BodyType {
        self.inner
    }
}

async fn read_body<Context: ServerContext>(
    rqctx: &RequestContext<Context>,
    request: http::Request<Body>,
) -> Result<Bytes, ExtractorError> {
    let limit = rqctx.request_body_max_bytes();
    request.into_body().collect_bounded(limit).await.map_err(|e| match e {
        CollectError::TooLarge { limit } => {
            ExtractorError::BodyTooLarge { limit }
        }
        CollectError::Read(error) => {
            ExtractorError::BodyRead(error.to_string())
        }
    })
}

/// Accepts `application/json`, any `+json` media type, or no content type at
/// all.
fn check_json_content_type(
    request: &http::Request<Body>,
) -> Result<(), ExtractorError> {
    let Some(value) = request.headers().get(http::header::CONTENT_TYPE) else {
        return Ok(());
    };
    let raw = String::from_utf8_lossy(value.as_bytes()).into_owned();
    let mime = raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    if mime == "application/json" || mime.ends_with("+json") {
        Ok(())
    } else {
        Err(ExtractorError::ContentType(raw))
    }
}

fn parse_json<BodyType: DeserializeOwned>(
    bytes: &[u8],
) -> Result<BodyType, ExtractorError> {
    let bytes: &[u8] = if bytes.is_empty() { b"null" } else { bytes };
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    let value = serde_path_to_error::deserialize(&mut deserializer).map_err(
        |e| ExtractorError::Body {
            field: e.path().to_string(),
            message: e.inner().to_string(),
        },
    )?;
    deserializer.end().map_err(|e| ExtractorError::Body {
        field: ".".to_string(),
        message: e.to_string(),
    })?;
    Ok(value)
}

#[async_trait]
impl<BodyType> ExclusiveExtractor for TypedBody<BodyType>
where
    BodyType: DeserializeOwned + Send + Sync + 'static,
{
    async fn from_request<Context: ServerContext>(
        rqctx: &RequestContext<Context>,
        request: http::Request<Body>,
    ) -> Result<TypedBody<BodyType>, ExtractorError> {
        check_json_content_type(&request)?;
        let bytes = read_body(rqctx, request).await?;
        Ok(TypedBody { inner: parse_json(&bytes)? })
    }
}

/// `UntypedBody` hands the raw request body to the handler.
#[derive(Debug)]
pub struct UntypedBody {
    content: Bytes,
}

impl UntypedBody {
    pub fn as_bytes(&self) -> &[u8] {
        &self.content
    }

    pub fn as_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.content)
    }

    pub fn into_bytes(self) -> Bytes {
        self.content
    }
}

#[async_trait]
impl ExclusiveExtractor for UntypedBody {
    async fn from_request<Context: ServerContext>(
        rqctx: &RequestContext<Context>,
        request: http::Request<Body>,
    ) -> Result<UntypedBody, ExtractorError> {
        Ok(UntypedBody { content: read_body(rqctx, request).await? })
    }
}
