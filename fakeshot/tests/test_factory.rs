// Copyright 2024 Oxide Computer Company

//! Test cases for routing requests across several fake clients.

use fakeshot::test_util::read_json;
use fakeshot::test_util::request_for;
use fakeshot::Body;
use fakeshot::ErrorKind;
use fakeshot::ErrorResponder;
use fakeshot::FakeApi;
use fakeshot::FakeError;
use fakeshot::FakeOperation;
use fakeshot::FakeServer;
use fakeshot::RequestContext;
use fakeshot::Responder;
use fakeshot::ServerBuilder;
use fakeshot::ServerFactory;
use fakeshot::Transport;
use http::StatusCode;
use slog::Logger;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[macro_use]
extern crate slog;

mod common;

async fn widget_name(
    _rqctx: RequestContext<()>,
) -> Result<Responder<&'static str>, ErrorResponder> {
    Ok(Responder::ok("widget"))
}

async fn gadget_name(
    _rqctx: RequestContext<()>,
) -> Result<Responder<&'static str>, ErrorResponder> {
    Ok(Responder::ok("gadget"))
}

fn widget_server(log: &Logger) -> FakeServer<()> {
    let mut api = FakeApi::new();
    api.register(
        FakeOperation::new("WidgetClient.Name")
            .success([StatusCode::OK])
            .handler(widget_name),
    )
    .unwrap();
    ServerBuilder::new(api, (), log.new(o!("client" => "WidgetClient")))
        .build()
}

fn gadget_server(log: &Logger) -> FakeServer<()> {
    let mut api = FakeApi::new();
    api.register(
        FakeOperation::new("GadgetClient.Name")
            .success([StatusCode::OK])
            .handler(gadget_name),
    )
    .unwrap();
    ServerBuilder::new(api, (), log.new(o!("client" => "GadgetClient")))
        .build()
}

#[tokio::test]
async fn test_factory_routing() {
    let logctx = common::create_log_context("factory_routing");
    let log = logctx.log.new(o!());
    let initialized = Arc::new(AtomicUsize::new(0));

    let lazy_log = log.clone();
    let lazy_count = Arc::clone(&initialized);
    let factory = ServerFactory::new(log.clone())
        .client("WidgetClient", widget_server(&log))
        .client_with("GadgetClient", move || {
            lazy_count.fetch_add(1, Ordering::SeqCst);
            Arc::new(gadget_server(&lazy_log))
        });
    let names: Vec<&str> = factory.client_names().collect();
    assert_eq!(names, vec!["WidgetClient", "GadgetClient"]);

    let response = factory
        .send(request_for("WidgetClient.Name", "GET", "/name"))
        .await
        .unwrap();
    assert_eq!(read_json::<String>(response).await, "widget");
    assert_eq!(initialized.load(Ordering::SeqCst), 0);

    for _ in 0..3 {
        let response = factory
            .send(request_for("GadgetClient.Name", "GET", "/name"))
            .await
            .unwrap();
        assert_eq!(read_json::<String>(response).await, "gadget");
    }
    assert_eq!(initialized.load(Ordering::SeqCst), 1);

    drop(factory);
    logctx.cleanup_successful();
}

#[tokio::test]
async fn test_factory_errors() {
    let logctx = common::create_log_context("factory_errors");
    let log = logctx.log.new(o!());
    let factory =
        ServerFactory::new(log.clone()).client("WidgetClient", widget_server(&log));

    let error = factory
        .send(request_for("ThingClient.Name", "GET", "/name"))
        .await
        .unwrap_err();
    assert_eq!(error.to_string(), "unhandled client ThingClient");
    assert_eq!(error.kind(), ErrorKind::Configuration);
    assert!(!error.is_retriable());

    // An id without a client part is looked up whole.
    let error = factory
        .send(request_for("Name", "GET", "/name"))
        .await
        .unwrap_err();
    assert_eq!(error.to_string(), "unhandled client Name");

    // The client is known but the operation is not.
    let error = factory
        .send(request_for("WidgetClient.Rename", "GET", "/name"))
        .await
        .unwrap_err();
    assert_eq!(error.to_string(), "unhandled API WidgetClient.Rename");

    let request = http::Request::get("/name").body(Body::empty()).unwrap();
    let error = factory.send(request).await.unwrap_err();
    assert!(matches!(error, FakeError::MissingOperationId));

    drop(factory);
    logctx.cleanup_successful();
}

#[tokio::test]
async fn test_factory_as_shared_transport() {
    let logctx = common::create_log_context("factory_as_shared_transport");
    let log = logctx.log.new(o!());
    let transport: Arc<dyn Transport> = Arc::new(
        ServerFactory::new(log.clone())
            .client("WidgetClient", widget_server(&log))
            .client("GadgetClient", gadget_server(&log)),
    );

    let handles: Vec<_> = ["WidgetClient.Name", "GadgetClient.Name"]
        .into_iter()
        .map(|operation| {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move {
                let response = transport
                    .send(request_for(operation, "GET", "/name"))
                    .await
                    .unwrap();
                read_json::<String>(response).await
            })
        })
        .collect();
    let mut names = Vec::new();
    for handle in handles {
        names.push(handle.await.unwrap());
    }
    assert_eq!(names, vec!["widget", "gadget"]);

    drop(transport);
    logctx.cleanup_successful();
}
