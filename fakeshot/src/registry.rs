// Copyright 2024 Oxide Computer Company

//! Describes the operations a fake server implements

use crate::error::FakeError;
use crate::error::StatusCodes;
use crate::extractor::ExtractorError;
use crate::extractor::ParameterLocation;
use crate::extractor::RequestExtractor;
use crate::handler::FakeHandlerFunc;
use crate::handler::FakeRouteHandler;
use crate::handler::RequestContext;
use crate::handler::RequestInfo;
use crate::handler::RouteHandler;
use crate::path_pattern::PathMatchError;
use crate::path_pattern::PathPattern;
use crate::path_pattern::PathPatternError;
use crate::path_pattern::VariableSet;
use crate::responder::HandlerOutput;
use crate::responder::HandlerResponse;
use crate::responder::PendingResponse;
use crate::responder::ResponseContent;
use crate::responder::ResponseSequence;
use crate::responder::StepError;
use crate::server::FakeState;
use crate::server::ServerContext;
use crate::tracker::Tracker;
use crate::transport::OperationId;
use crate::Body;

use http::StatusCode;
use indexmap::IndexMap;
use slog::Logger;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Errors returned by [`FakeApi::register`].
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("operation {0} is already registered")]
    Duplicate(OperationId),
    #[error("operation {0} declares no success status codes")]
    NoSuccessCodes(OperationId),
    #[error("operation {operation}: {source}")]
    Path {
        operation: OperationId,
        #[source]
        source: PathPatternError,
    },
}

#[derive(Debug)]
enum PathSpec {
    None,
    Template(String),
    Regex(String),
}

/// Describes one operation: its id, the path it is served at, the success
/// status codes it may return, and the handler that implements it.
///
/// ```ignore
/// FakeOperation::new("WidgetClient.GetWidget")
///     .path("/widgets/{widgetName}")
///     .literal("api-version", "2023-01-01")
///     .success([StatusCode::OK])
///     .handler(get_widget)
/// ```
///
/// An operation registered without a handler fails every request with
/// [`FakeError::NotImplemented`].
pub struct FakeOperation<Context: ServerContext> {
    id: OperationId,
    path: PathSpec,
    literals: Vec<(String, String)>,
    success: StatusCodes,
    handler: Option<Arc<dyn RouteHandler<Context>>>,
}

impl<Context: ServerContext> FakeOperation<Context> {
    pub fn new<O: Into<OperationId>>(id: O) -> Self {
        FakeOperation {
            id: id.into(),
            path: PathSpec::None,
            literals: Vec::new(),
            success: StatusCodes::default(),
            handler: None,
        }
    }

    /// Sets the path template, e.g. `/widgets/{widgetName}`.  A placeholder
    /// is a variable unless a value is supplied for it with `literal()`.
    pub fn path(mut self, template: &str) -> Self {
        self.path = PathSpec::Template(template.to_string());
        self
    }

    /// Fixes the value of a path placeholder.  The value is matched as
    /// escaped text and never captured.
    pub fn literal(mut self, name: &str, value: &str) -> Self {
        self.literals.push((name.to_string(), value.to_string()));
        self
    }

    /// Sets the path pattern directly as a regular expression with one named
    /// capture group per variable.
    pub fn path_regex(mut self, source: &str) -> Self {
        self.path = PathSpec::Regex(source.to_string());
        self
    }

    /// Declares the success status codes this operation may return.
    pub fn success<I>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = StatusCode>,
    {
        self.success = StatusCodes::new(codes);
        self
    }

    pub fn handler<HandlerType, FuncParams, ResponseType>(
        mut self,
        handler: HandlerType,
    ) -> Self
    where
        HandlerType: FakeHandlerFunc<Context, FuncParams, ResponseType>,
        FuncParams: RequestExtractor + 'static,
        ResponseType: HandlerResponse + Send + Sync + 'static,
    {
        self.handler = Some(FakeRouteHandler::new_with_name(
            handler,
            std::any::type_name::<HandlerType>(),
        ));
        self
    }

    fn compile(&self) -> Result<Option<PathPattern>, PathPatternError> {
        match &self.path {
            PathSpec::None | PathSpec::Regex(_) => {
                if let Some((name, _)) = self.literals.first() {
                    return Err(PathPatternError::UnknownLiteral(name.clone()));
                }
                match &self.path {
                    PathSpec::Regex(source) => {
                        PathPattern::from_regex(source).map(Some)
                    }
                    _ => Ok(None),
                }
            }
            PathSpec::Template(template) => {
                let literals: Vec<(&str, &str)> = self
                    .literals
                    .iter()
                    .map(|(name, value)| (name.as_str(), value.as_str()))
                    .collect();
                PathPattern::new(template, &literals).map(Some)
            }
        }
    }
}

/// The set of operations a fake server implements, before the server is
/// built.
pub struct FakeApi<Context: ServerContext> {
    operations: IndexMap<OperationId, Operation<Context>>,
}

impl<Context: ServerContext> Default for FakeApi<Context> {
    fn default() -> Self {
        FakeApi { operations: IndexMap::new() }
    }
}

impl<Context: ServerContext> FakeApi<Context> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an operation.  Fails if the id is already registered, if no
    /// success codes were declared, or if the path does not compile.
    pub fn register(
        &mut self,
        operation: FakeOperation<Context>,
    ) -> Result<(), RegisterError> {
        if self.operations.contains_key(&operation.id) {
            return Err(RegisterError::Duplicate(operation.id));
        }
        if operation.success.is_empty() {
            return Err(RegisterError::NoSuccessCodes(operation.id));
        }
        let pattern = operation.compile().map_err(|source| {
            RegisterError::Path { operation: operation.id.clone(), source }
        })?;
        self.operations.insert(
            operation.id.clone(),
            Operation {
                id: operation.id,
                pattern,
                success: operation.success,
                handler: operation.handler,
                tracker: Tracker::default(),
            },
        );
        Ok(())
    }

    /// Returns the ids of the registered operations, in registration order.
    pub fn operation_ids(&self) -> impl Iterator<Item = &OperationId> {
        self.operations.keys()
    }

    pub(crate) fn into_registry(self) -> OperationRegistry<Context> {
        OperationRegistry { operations: self.operations }
    }
}

/// The operations of a running fake server.  Fixed once the server is built.
#[derive(Debug)]
pub struct OperationRegistry<Context: ServerContext> {
    operations: IndexMap<OperationId, Operation<Context>>,
}

impl<Context: ServerContext> OperationRegistry<Context> {
    pub fn lookup(&self, id: &str) -> Option<&Operation<Context>> {
        self.operations.get(id)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// A registered operation.
#[derive(Debug)]
pub struct Operation<Context: ServerContext> {
    id: OperationId,
    pattern: Option<PathPattern>,
    success: StatusCodes,
    handler: Option<Arc<dyn RouteHandler<Context>>>,
    tracker: Tracker,
}

impl<Context: ServerContext> Operation<Context> {
    pub fn id(&self) -> &OperationId {
        &self.id
    }

    pub fn pattern(&self) -> Option<&PathPattern> {
        self.pattern.as_ref()
    }

    pub fn success_codes(&self) -> &StatusCodes {
        &self.success
    }

    /// Runs the operation's handler (or the next step of a response it
    /// started earlier) and checks the result against the operation's
    /// success codes.
    pub(crate) async fn dispatch(
        &self,
        server: &Arc<FakeState<Context>>,
        request: http::Request<Body>,
        request_id: String,
        log: Logger,
        cancel: CancellationToken,
    ) -> Result<http::Response<Body>, FakeError> {
        let Some(handler) = &self.handler else {
            return Err(FakeError::NotImplemented(self.id.clone()));
        };

        let info = RequestInfo::new(&request);
        let path = info.uri().path().to_string();

        if let Some(sequence) = self.tracker.take(&path) {
            debug!(log, "serving next step of in-progress response";
                "path" => &path);
            return self.next_step(sequence, &info, &path);
        }

        let path_variables = match &self.pattern {
            None => VariableSet::new(),
            Some(pattern) => {
                pattern.match_path(&path).map_err(|e| self.path_error(e, &path))?
            }
        };

        trace!(log, "invoking handler"; "handler" => handler.label());
        let rqctx = RequestContext {
            server: Arc::clone(server),
            operation_id: self.id.clone(),
            path_variables,
            request_id,
            log,
            request: info.clone(),
            cancel,
        };
        match handler.handle_request(rqctx, request).await? {
            HandlerOutput::Response(pending) => {
                self.check_status(pending.status(), &self.success)?;
                Ok(self.render(pending)?.into_response())
            }
            HandlerOutput::Sequence(sequence) => {
                self.next_step(sequence, &info, &path)
            }
        }
    }

    /// Serves one step of a multi-step response.  The sequence goes back
    /// into the tracker while it has more steps, unless the step broke the
    /// operation's contract.  An error response is a step like any other.
    fn next_step(
        &self,
        mut sequence: Box<dyn ResponseSequence>,
        info: &RequestInfo,
        path: &str,
    ) -> Result<http::Response<Body>, FakeError> {
        let acceptable =
            self.success.with(&sequence.implicit_success_codes());
        let pending = match sequence.next(info) {
            Ok(pending) => pending,
            Err(error @ StepError::Responder(_)) => {
                if sequence.more() {
                    self.tracker.insert(path, sequence);
                }
                return Err(self.step_error(error));
            }
            Err(error) => return Err(self.step_error(error)),
        };
        self.check_status(pending.status(), &acceptable)?;
        let content = self.render(pending)?;
        if sequence.more() {
            self.tracker.insert(path, sequence);
        }
        Ok(content.into_response())
    }

    fn check_status(
        &self,
        status: StatusCode,
        acceptable: &StatusCodes,
    ) -> Result<(), FakeError> {
        if acceptable.contains(status) {
            Ok(())
        } else {
            Err(FakeError::UnexpectedStatus {
                operation: self.id.clone(),
                status,
                acceptable: acceptable.clone(),
            })
        }
    }

    fn render(
        &self,
        pending: PendingResponse,
    ) -> Result<ResponseContent, FakeError> {
        pending.render().map_err(|message| FakeError::Serialization {
            operation: self.id.clone(),
            message,
        })
    }

    fn path_error(&self, error: PathMatchError, path: &str) -> FakeError {
        match error {
            PathMatchError::NoMatch => FakeError::PathMismatch {
                operation: self.id.clone(),
                path: path.to_string(),
            },
            PathMatchError::Decode { name, message } => FakeError::Decode {
                operation: self.id.clone(),
                source: ExtractorError::Parameter {
                    location: ParameterLocation::Path,
                    field: name,
                    message,
                },
            },
        }
    }

    fn step_error(&self, error: StepError) -> FakeError {
        let operation = self.id.clone();
        match error {
            StepError::Responder(error) => {
                FakeError::Response { operation, error }
            }
            StepError::Exhausted => FakeError::Sequence {
                operation,
                message: String::from("no more responses"),
            },
            StepError::Incomplete => FakeError::Sequence {
                operation,
                message: String::from(
                    "poller has no terminal response or error",
                ),
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::FakeApi;
    use super::FakeOperation;
    use super::RegisterError;
    use crate::path_pattern::PathPatternError;
    use crate::ErrorResponder;
    use crate::RequestContext;
    use crate::Responder;
    use http::StatusCode;

    async fn noop(
        _rqctx: RequestContext<()>,
    ) -> Result<Responder<u32>, ErrorResponder> {
        Ok(Responder::ok(0))
    }

    #[test]
    fn test_register() {
        let mut api = FakeApi::<()>::new();
        api.register(
            FakeOperation::new("WidgetClient.Get")
                .path("/widgets/{name}")
                .success([StatusCode::OK])
                .handler(noop),
        )
        .unwrap();
        api.register(
            FakeOperation::new("WidgetClient.Delete")
                .success([StatusCode::OK, StatusCode::NO_CONTENT]),
        )
        .unwrap();

        let error = api
            .register(
                FakeOperation::new("WidgetClient.Get")
                    .success([StatusCode::OK]),
            )
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "operation WidgetClient.Get is already registered"
        );
        let ids: Vec<&str> =
            api.operation_ids().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["WidgetClient.Get", "WidgetClient.Delete"]);

        let registry = api.into_registry();
        let operation = registry.lookup("WidgetClient.Get").unwrap();
        assert_eq!(
            operation.pattern().unwrap().variable_names(),
            vec!["name"]
        );
        assert!(registry.lookup("WidgetClient.List").is_none());
    }

    #[test]
    fn test_register_errors() {
        let mut api = FakeApi::<()>::new();
        assert!(matches!(
            api.register(FakeOperation::new("WidgetClient.Get")),
            Err(RegisterError::NoSuccessCodes(_))
        ));
        assert!(matches!(
            api.register(
                FakeOperation::new("WidgetClient.Get")
                    .path("/widgets/{name")
                    .success([StatusCode::OK])
            ),
            Err(RegisterError::Path {
                source: PathPatternError::UnterminatedPlaceholder(_),
                ..
            })
        ));
        assert!(matches!(
            api.register(
                FakeOperation::new("WidgetClient.Get")
                    .path_regex("/widgets/(?P<name>[^/]+)$")
                    .literal("api-version", "2023-01-01")
                    .success([StatusCode::OK])
            ),
            Err(RegisterError::Path {
                source: PathPatternError::UnknownLiteral(_),
                ..
            })
        ));
        assert_eq!(api.operation_ids().count(), 0);
    }
}
