// Copyright 2024 Oxide Computer Company

//! Responders returned by fake handler functions
//!
//! A handler returns `Ok` with one of the success responders below, or `Err`
//! with an [`ErrorResponder`]:
//!
//! * [`Responder<T>`] describes a single response: a status code, optional
//!   headers and a body.
//! * [`PagerResponder<T>`] describes the pages of a paged list operation.
//! * [`PollerResponder<T>`] describes the steps of a long-running operation,
//!   ending in a terminal response or error.
//!
//! The status codes of success responders are checked against the
//! operation's declared success codes before the response is rendered, so a
//! response with an unexpected status is reported as such even when its
//! headers or body could not have been rendered.  Pager and poller responders
//! are multi-step: the handler runs once, and later requests for the same
//! resource path are answered from the remaining steps.

use crate::error_status_code::ErrorStatusCode;
use crate::handler::RequestInfo;
use crate::tracker::sanitize_path;
use crate::Body;

use bytes::Bytes;
use http::header::HeaderName;
use http::header::HeaderValue;
use http::HeaderMap;
use http::StatusCode;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

pub(crate) const CONTENT_TYPE_JSON: &str = "application/json";
pub(crate) const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";

/// Adapter trait for the payload of a success response.
///
/// Any `Serialize` type is rendered as JSON.  [`Empty`] renders no body at
/// all, and [`FreeformBody`] renders raw bytes.
pub trait ResponseBody: Send + Sync + 'static {
    /// Renders the payload as a content type and bytes, or `None` for an
    /// empty body.
    fn encode(&self) -> Result<Option<(&'static str, Bytes)>, String>;

    /// Returns whether this payload produces a body.
    fn has_content(&self) -> bool {
        true
    }
}

impl<T> ResponseBody for T
where
    T: Serialize + Send + Sync + 'static,
{
    fn encode(&self) -> Result<Option<(&'static str, Bytes)>, String> {
        let serialized = serde_json::to_vec(self).map_err(|e| e.to_string())?;
        Ok(Some((CONTENT_TYPE_JSON, Bytes::from(serialized))))
    }
}

/// The payload of a response that has no body, such as a `204 No Content`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Empty;

impl ResponseBody for Empty {
    fn encode(&self) -> Result<Option<(&'static str, Bytes)>, String> {
        Ok(None)
    }

    fn has_content(&self) -> bool {
        false
    }
}

/// A payload sent as-is, as `application/octet-stream`.
#[derive(Clone, Debug)]
pub struct FreeformBody(pub Bytes);

impl From<Bytes> for FreeformBody {
    fn from(bytes: Bytes) -> Self {
        FreeformBody(bytes)
    }
}

impl ResponseBody for FreeformBody {
    fn encode(&self) -> Result<Option<(&'static str, Bytes)>, String> {
        Ok(Some((CONTENT_TYPE_OCTET_STREAM, self.0.clone())))
    }
}

/// A fully rendered response, before it is turned into an
/// `http::Response<Body>`.
#[derive(Clone, Debug)]
pub struct ResponseContent {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ResponseContent {
    fn render<T: ResponseBody>(
        status: StatusCode,
        mut headers: HeaderMap,
        body: &T,
    ) -> Result<ResponseContent, String> {
        let body = match body.encode()? {
            Some((content_type, bytes)) => {
                headers.insert(
                    http::header::CONTENT_TYPE,
                    HeaderValue::from_static(content_type),
                );
                bytes
            }
            None => Bytes::new(),
        };
        Ok(ResponseContent { status, headers, body })
    }

    pub fn into_response(self) -> http::Response<Body> {
        let mut response = http::Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// A response whose status is known but whose headers and body are rendered
/// only once that status has been accepted.
pub struct PendingResponse {
    status: StatusCode,
    render: Box<dyn FnOnce() -> Result<ResponseContent, String> + Send>,
}

impl PendingResponse {
    fn new<T: ResponseBody>(
        status: StatusCode,
        headers: Result<HeaderMap, String>,
        body: T,
    ) -> Self {
        PendingResponse {
            status,
            render: Box::new(move || {
                ResponseContent::render(status, headers?, &body)
            }),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Renders the headers and body.  Fails if a header added to the
    /// responder was invalid or the body could not be encoded.
    pub fn render(self) -> Result<ResponseContent, String> {
        (self.render)()
    }
}

impl fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// What a handler produced.
#[derive(Debug)]
pub enum HandlerOutput {
    /// A single response.
    Response(PendingResponse),
    /// A multi-step response.  Its first step answers this request and the
    /// rest are served to follow-up requests.
    Sequence(Box<dyn ResponseSequence>),
}

/// Types that a handler function can return on success.
pub trait HandlerResponse {
    fn into_output(self) -> HandlerOutput;
}

/// Why a [`ResponseSequence`] could not produce its next step.
#[derive(Debug)]
pub enum StepError {
    /// The step is an error response.
    Responder(ErrorResponder),
    /// Every step has already been served.
    Exhausted,
    /// A poller was never given a terminal response or error.
    Incomplete,
}

/// A multi-step response being served across several requests.
pub trait ResponseSequence: fmt::Debug + Send {
    /// Produces the next step as the answer to `request`.
    fn next(
        &mut self,
        request: &RequestInfo,
    ) -> Result<PendingResponse, StepError>;

    /// Returns whether any steps remain.
    fn more(&self) -> bool;

    /// Success codes accepted in addition to the operation's own.
    fn implicit_success_codes(&self) -> Vec<StatusCode> {
        Vec::new()
    }
}

/// Headers added with `header()` that could not be converted are reported
/// when the response is rendered, so that building a responder never
/// fails.
#[derive(Clone, Debug, Default)]
struct ResponseHeaders {
    headers: HeaderMap,
    error: Option<String>,
}

impl ResponseHeaders {
    fn insert<K, V>(&mut self, name: K, value: V)
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: fmt::Display,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: fmt::Display,
    {
        if self.error.is_some() {
            return;
        }
        let name = match HeaderName::try_from(name) {
            Ok(name) => name,
            Err(e) => {
                self.error = Some(format!("invalid header name: {}", e));
                return;
            }
        };
        match HeaderValue::try_from(value) {
            Ok(value) => {
                self.headers.append(name, value);
            }
            Err(e) => {
                self.error = Some(format!(
                    "invalid value for header \"{}\": {}",
                    name, e
                ));
            }
        }
    }

    fn into_map(self) -> Result<HeaderMap, String> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.headers),
        }
    }
}

/// A single success response.
#[derive(Debug)]
pub struct Responder<T: ResponseBody> {
    status: StatusCode,
    headers: ResponseHeaders,
    body: T,
}

impl<T: ResponseBody> Responder<T> {
    pub fn new(status: StatusCode, body: T) -> Self {
        Responder { status, headers: ResponseHeaders::default(), body }
    }

    /// A `200 OK` response.
    pub fn ok(body: T) -> Self {
        Responder::new(StatusCode::OK, body)
    }

    /// Adds a response header.  An invalid name or value fails the
    /// operation when the response is rendered, after its status has been
    /// checked.
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: fmt::Display,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: fmt::Display,
    {
        self.headers.insert(name, value);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &T {
        &self.body
    }
}

impl Responder<Empty> {
    /// A `204 No Content` response.
    pub fn no_content() -> Self {
        Responder::new(StatusCode::NO_CONTENT, Empty)
    }
}

impl<T: ResponseBody> HandlerResponse for Responder<T> {
    fn into_output(self) -> HandlerOutput {
        HandlerOutput::Response(PendingResponse::new(
            self.status,
            self.headers.into_map(),
            self.body,
        ))
    }
}

/// An error response returned by a handler.
///
/// Unlike a failure of the fake itself, this is a response the handler chose
/// to send, such as a `404` for a resource that does not exist.  It is
/// delivered to the client as [`crate::FakeError::Response`].
#[derive(Clone, Debug)]
pub struct ErrorResponder {
    status_code: ErrorStatusCode,
    error_code: Option<String>,
    message: String,
    headers: HeaderMap,
}

impl ErrorResponder {
    /// An error response with the given status and service error code.
    pub fn new<S: Into<String>>(status_code: ErrorStatusCode, code: S) -> Self {
        let code = code.into();
        ErrorResponder {
            status_code,
            message: code.clone(),
            error_code: Some(code),
            headers: HeaderMap::new(),
        }
    }

    /// An error response with only a status code.
    pub fn from_status(status_code: ErrorStatusCode) -> Self {
        ErrorResponder {
            status_code,
            error_code: None,
            message: status_code
                .as_status()
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string(),
            headers: HeaderMap::new(),
        }
    }

    pub fn with_message<S: Into<String>>(mut self, message: S) -> Self {
        self.message = message.into();
        self
    }

    /// Adds a header to the error response.  Unlike [`Responder::header`],
    /// this takes already-validated header types.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn status_code(&self) -> ErrorStatusCode {
        self.status_code
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error_code.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Renders this error as a JSON response body of the form
    /// `{ "request_id", "error_code", "message" }`.
    pub fn into_response(self, request_id: &str) -> http::Response<Body> {
        let body = ErrorBody {
            request_id,
            error_code: self.error_code.as_deref(),
            message: &self.message,
        };
        // Serializing a struct of strings cannot fail.
        let bytes = serde_json::to_vec(&body).unwrap_or_default();
        let mut headers = self.headers;
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static(CONTENT_TYPE_JSON),
        );
        ResponseContent {
            status: self.status_code.as_status(),
            headers,
            body: Bytes::from(bytes),
        }
        .into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    request_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<&'a str>,
    message: &'a str,
}

impl fmt::Display for ErrorResponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_code {
            Some(code) if *code != self.message => write!(
                f,
                "error response {} ({}): {}",
                self.status_code.as_u16(),
                code,
                self.message
            ),
            _ => write!(
                f,
                "error response {}: {}",
                self.status_code.as_u16(),
                self.message
            ),
        }
    }
}

impl std::error::Error for ErrorResponder {}

type NextLinkInjector<T> = Box<dyn Fn(&mut T, String) + Send + Sync>;

#[derive(Debug)]
enum PagerStep<T> {
    Page { status: StatusCode, body: T },
    Error(ErrorResponder),
}

/// The pages of a paged list operation, served one per request.
///
/// ```ignore
/// PagerResponder::new()
///     .add_page(StatusCode::OK, WidgetList { value: first, next_link: None })
///     .add_page(StatusCode::OK, WidgetList { value: rest, next_link: None })
///     .inject_next_links(|page, link| page.next_link = Some(link))
/// ```
pub struct PagerResponder<T: ResponseBody> {
    steps: VecDeque<PagerStep<T>>,
    inject: Option<NextLinkInjector<T>>,
    served: usize,
}

impl<T: ResponseBody> Default for PagerResponder<T> {
    fn default() -> Self {
        PagerResponder { steps: VecDeque::new(), inject: None, served: 0 }
    }
}

impl<T: ResponseBody + fmt::Debug> fmt::Debug for PagerResponder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagerResponder")
            .field("steps", &self.steps)
            .field("inject", &self.inject.is_some())
            .field("served", &self.served)
            .finish()
    }
}

impl<T: ResponseBody> PagerResponder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_page(mut self, status: StatusCode, body: T) -> Self {
        self.steps.push_back(PagerStep::Page { status, body });
        self
    }

    pub fn add_error(mut self, error: ErrorResponder) -> Self {
        self.steps.push_back(PagerStep::Error(error));
        self
    }

    /// Sets the next link of every page but the last.  `inject` receives the
    /// page and the link to store in it.
    pub fn inject_next_links<F>(mut self, inject: F) -> Self
    where
        F: Fn(&mut T, String) + Send + Sync + 'static,
    {
        self.inject = Some(Box::new(inject));
        self
    }
}

impl<T: ResponseBody + fmt::Debug> ResponseSequence for PagerResponder<T> {
    fn next(
        &mut self,
        request: &RequestInfo,
    ) -> Result<PendingResponse, StepError> {
        let step = self.steps.pop_front().ok_or(StepError::Exhausted)?;
        self.served += 1;
        match step {
            PagerStep::Error(error) => Err(StepError::Responder(error)),
            PagerStep::Page { status, mut body } => {
                if let Some(inject) = &self.inject {
                    if self.more() {
                        let link = format!(
                            "{}{}/fake/page/{}",
                            request.origin(),
                            sanitize_path(request.uri().path()),
                            self.served + 1
                        );
                        inject(&mut body, link);
                    }
                }
                Ok(PendingResponse::new(status, Ok(HeaderMap::new()), body))
            }
        }
    }

    fn more(&self) -> bool {
        !self.steps.is_empty()
    }
}

impl<T: ResponseBody + fmt::Debug> HandlerResponse for PagerResponder<T> {
    fn into_output(self) -> HandlerOutput {
        HandlerOutput::Sequence(Box::new(self))
    }
}

#[derive(Debug)]
enum PollerStep {
    Status(StatusCode),
    Error(ErrorResponder),
}

#[derive(Debug)]
enum PollerTerminal<T> {
    Response { status: StatusCode, body: T },
    Error(ErrorResponder),
}

/// The steps of a long-running operation, served one per request.
///
/// Non-terminal steps answer with their status code and a `Location` header
/// that the client polls.  The terminal step answers with the final
/// response or error.  Poller operations accept `200 OK` as a success code,
/// and `204 No Content` when the terminal payload is [`Empty`], whether or
/// not the operation declares them.
#[derive(Debug)]
pub struct PollerResponder<T: ResponseBody> {
    steps: VecDeque<PollerStep>,
    terminal: Option<PollerTerminal<T>>,
    done: bool,
}

impl<T: ResponseBody> Default for PollerResponder<T> {
    fn default() -> Self {
        PollerResponder { steps: VecDeque::new(), terminal: None, done: false }
    }
}

impl<T: ResponseBody> PollerResponder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an in-progress step answered with `status`.
    pub fn add_non_terminal_response(mut self, status: StatusCode) -> Self {
        self.steps.push_back(PollerStep::Status(status));
        self
    }

    /// Adds an in-progress step answered with an error.  Clients may retry
    /// past it.
    pub fn add_non_terminal_error(mut self, error: ErrorResponder) -> Self {
        self.steps.push_back(PollerStep::Error(error));
        self
    }

    pub fn set_terminal_response(mut self, status: StatusCode, body: T) -> Self {
        self.terminal = Some(PollerTerminal::Response { status, body });
        self
    }

    pub fn set_terminal_error(mut self, error: ErrorResponder) -> Self {
        self.terminal = Some(PollerTerminal::Error(error));
        self
    }
}

impl<T: ResponseBody + fmt::Debug> ResponseSequence for PollerResponder<T> {
    fn next(
        &mut self,
        request: &RequestInfo,
    ) -> Result<PendingResponse, StepError> {
        if self.done {
            return Err(StepError::Exhausted);
        }
        if self.terminal.is_none() {
            return Err(StepError::Incomplete);
        }
        match self.steps.pop_front() {
            Some(PollerStep::Status(status)) => {
                let location = format!(
                    "{}{}/fake/status",
                    request.origin(),
                    sanitize_path(request.uri().path())
                );
                let headers = HeaderValue::try_from(location)
                    .map(|location| {
                        let mut headers = HeaderMap::new();
                        headers.insert(http::header::LOCATION, location);
                        headers
                    })
                    .map_err(|e| e.to_string());
                Ok(PendingResponse::new(status, headers, Empty))
            }
            Some(PollerStep::Error(error)) => Err(StepError::Responder(error)),
            None => {
                self.done = true;
                match self.terminal.take() {
                    Some(PollerTerminal::Response { status, body }) => {
                        let headers = Ok(HeaderMap::new());
                        Ok(PendingResponse::new(status, headers, body))
                    }
                    Some(PollerTerminal::Error(error)) => {
                        Err(StepError::Responder(error))
                    }
                    None => Err(StepError::Incomplete),
                }
            }
        }
    }

    fn more(&self) -> bool {
        !self.done
    }

    fn implicit_success_codes(&self) -> Vec<StatusCode> {
        match &self.terminal {
            Some(PollerTerminal::Response { body, .. })
                if !body.has_content() =>
            {
                vec![StatusCode::OK, StatusCode::NO_CONTENT]
            }
            _ => vec![StatusCode::OK],
        }
    }
}

impl<T: ResponseBody + fmt::Debug> HandlerResponse for PollerResponder<T> {
    fn into_output(self) -> HandlerOutput {
        HandlerOutput::Sequence(Box::new(self))
    }
}
