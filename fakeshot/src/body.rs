// Copyright 2024 Oxide Computer Company

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::BufMut;
use bytes::BytesMut;
use http_body_util::combinators::BoxBody;
use http_body_util::BodyExt;
use hyper::body::{Body as HttpBody, Bytes, Frame};

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A body type for both the requests a fake receives and the responses it
/// produces.
#[derive(Debug)]
pub struct Body {
    inner: BoxBody<Bytes, BoxError>,
}

/// Why [`Body::collect_bounded`] failed.
#[derive(Debug)]
pub(crate) enum CollectError {
    TooLarge { limit: usize },
    Read(BoxError),
}

impl Body {
    /// Create an empty body.
    pub fn empty() -> Self {
        let inner = http_body_util::Empty::new()
            .map_err(|never| match never {})
            .boxed();
        Body { inner }
    }

    /// Create a body with content from a specific buffer.
    pub fn with_content(buf: impl Into<Bytes>) -> Self {
        let inner = http_body_util::Full::new(buf.into())
            .map_err(|never| match never {})
            .boxed();
        Body { inner }
    }

    /// Wrap any body as a fakeshot Body.
    pub fn wrap<B>(under: B) -> Self
    where
        B: HttpBody<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        let inner = under.map_err(Into::into).boxed();
        Body { inner }
    }

    /// Reads the whole body into memory.
    pub async fn into_bytes(self) -> Result<Bytes, BoxError> {
        Ok(self.inner.collect().await?.to_bytes())
    }

    /// Reads the whole body into memory, failing as soon as it grows past
    /// `limit` bytes.
    pub(crate) async fn collect_bounded(
        mut self,
        limit: usize,
    ) -> Result<Bytes, CollectError> {
        let mut buf = BytesMut::new();
        while let Some(frame) = self.frame().await {
            let frame = frame.map_err(CollectError::Read)?;
            if let Ok(data) = frame.into_data() {
                if buf.len() + data.len() > limit {
                    return Err(CollectError::TooLarge { limit });
                }
                buf.put(data);
            }
        }
        Ok(buf.freeze())
    }
}

impl Default for Body {
    fn default() -> Body {
        Body::empty()
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Body {
        Body::with_content(b)
    }
}

impl From<Vec<u8>> for Body {
    fn from(s: Vec<u8>) -> Body {
        Body::with_content(s)
    }
}

impl From<String> for Body {
    fn from(s: String) -> Body {
        Body::with_content(s)
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Body {
        Body::with_content(s)
    }
}

impl HttpBody for Body {
    type Data = Bytes;
    type Error = BoxError;

    #[inline]
    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.inner).poll_frame(cx)
    }

    #[inline]
    fn size_hint(&self) -> hyper::body::SizeHint {
        self.inner.size_hint()
    }

    #[inline]
    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }
}
