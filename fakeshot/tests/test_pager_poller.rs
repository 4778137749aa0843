// Copyright 2024 Oxide Computer Company

//! Test cases for pager and poller responses served over several requests.

use fakeshot::test_util::read_json;
use fakeshot::test_util::request_for;
use fakeshot::Empty;
use fakeshot::ErrorKind;
use fakeshot::ErrorResponder;
use fakeshot::ErrorStatusCode;
use fakeshot::FakeApi;
use fakeshot::FakeError;
use fakeshot::FakeOperation;
use fakeshot::PagerResponder;
use fakeshot::PollerResponder;
use fakeshot::RequestContext;
use http::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

#[macro_use]
extern crate slog;

mod common;

#[derive(Default)]
struct Calls(AtomicUsize);

impl Calls {
    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct WidgetPage {
    value: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_link: Option<String>,
}

fn page(names: &[&str]) -> WidgetPage {
    WidgetPage {
        value: names.iter().map(|n| n.to_string()).collect(),
        next_link: None,
    }
}

#[derive(Debug, Deserialize, PartialEq, Serialize)]
struct Widget {
    name: String,
    state: String,
}

async fn list_widgets(
    rqctx: RequestContext<Calls>,
) -> Result<PagerResponder<WidgetPage>, ErrorResponder> {
    rqctx.context().bump();
    Ok(PagerResponder::new()
        .add_page(StatusCode::OK, page(&["w1", "w2"]))
        .add_page(StatusCode::OK, page(&["w3"]))
        .add_page(StatusCode::OK, page(&["w4"]))
        .inject_next_links(|page, link| page.next_link = Some(link)))
}

async fn list_gadgets(
    rqctx: RequestContext<Calls>,
) -> Result<PagerResponder<WidgetPage>, ErrorResponder> {
    rqctx.context().bump();
    Ok(PagerResponder::new()
        .add_page(StatusCode::OK, page(&["g1"]))
        .add_error(ErrorResponder::from_status(
            ErrorStatusCode::SERVICE_UNAVAILABLE,
        ))
        .add_page(StatusCode::OK, page(&["g2"])))
}

async fn list_parts(
    rqctx: RequestContext<Calls>,
) -> Result<PagerResponder<WidgetPage>, ErrorResponder> {
    rqctx.context().bump();
    Ok(PagerResponder::new()
        .add_page(StatusCode::OK, page(&["p1"]))
        .add_page(StatusCode::PARTIAL_CONTENT, page(&["p2"]))
        .add_page(StatusCode::OK, page(&["p3"])))
}

async fn create_widget(
    rqctx: RequestContext<Calls>,
) -> Result<PollerResponder<Widget>, ErrorResponder> {
    rqctx.context().bump();
    Ok(PollerResponder::new()
        .add_non_terminal_response(StatusCode::CREATED)
        .add_non_terminal_response(StatusCode::CREATED)
        .set_terminal_response(StatusCode::OK, Widget {
            name: "w1".to_string(),
            state: "Succeeded".to_string(),
        }))
}

async fn delete_widget(
    rqctx: RequestContext<Calls>,
) -> Result<PollerResponder<Empty>, ErrorResponder> {
    rqctx.context().bump();
    Ok(PollerResponder::new()
        .add_non_terminal_response(StatusCode::ACCEPTED)
        .add_non_terminal_error(ErrorResponder::from_status(
            ErrorStatusCode::SERVICE_UNAVAILABLE,
        ))
        .set_terminal_response(StatusCode::NO_CONTENT, Empty))
}

async fn restart_widget(
    rqctx: RequestContext<Calls>,
) -> Result<PollerResponder<Widget>, ErrorResponder> {
    rqctx.context().bump();
    Ok(PollerResponder::new()
        .add_non_terminal_response(StatusCode::ACCEPTED)
        .set_terminal_error(ErrorResponder::new(
            ErrorStatusCode::CONFLICT,
            "WidgetBusy",
        )))
}

async fn resize_widget(
    rqctx: RequestContext<Calls>,
) -> Result<PollerResponder<Widget>, ErrorResponder> {
    rqctx.context().bump();
    Ok(PollerResponder::new().add_non_terminal_response(StatusCode::ACCEPTED))
}

fn register_all(api: &mut FakeApi<Calls>) {
    api.register(
        FakeOperation::new("WidgetClient.NewListPager")
            .path("/widgets")
            .success([StatusCode::OK])
            .handler(list_widgets),
    )
    .unwrap();
    api.register(
        FakeOperation::new("WidgetClient.NewListGadgetsPager")
            .path("/gadgets")
            .success([StatusCode::OK])
            .handler(list_gadgets),
    )
    .unwrap();
    api.register(
        FakeOperation::new("WidgetClient.NewListPartsPager")
            .path("/parts")
            .success([StatusCode::OK])
            .handler(list_parts),
    )
    .unwrap();
    api.register(
        FakeOperation::new("WidgetClient.BeginCreate")
            .path("/widgets/{widgetName}")
            .success([StatusCode::CREATED])
            .handler(create_widget),
    )
    .unwrap();
    api.register(
        FakeOperation::new("WidgetClient.BeginDelete")
            .path("/widgets/{widgetName}")
            .success([StatusCode::ACCEPTED])
            .handler(delete_widget),
    )
    .unwrap();
    api.register(
        FakeOperation::new("WidgetClient.BeginRestart")
            .path("/widgets/{widgetName}/restart")
            .success([StatusCode::ACCEPTED])
            .handler(restart_widget),
    )
    .unwrap();
    api.register(
        FakeOperation::new("WidgetClient.BeginResize")
            .path("/widgets/{widgetName}/resize")
            .success([StatusCode::ACCEPTED])
            .handler(resize_widget),
    )
    .unwrap();
}

fn api() -> FakeApi<Calls> {
    let mut api = FakeApi::new();
    register_all(&mut api);
    api
}

#[tokio::test]
async fn test_pager_next_links() {
    let testctx = common::test_setup("pager_next_links", api(), Calls::default());
    let server = &testctx.server;
    let op = "WidgetClient.NewListPager";

    let first: WidgetPage = read_json(
        server
            .dispatch(request_for(op, "GET", "https://fake.example/widgets"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(first.value, vec!["w1", "w2"]);
    let next = first.next_link.unwrap();
    assert_eq!(next, "https://fake.example/widgets/fake/page/2");

    let second: WidgetPage = read_json(
        server.dispatch(request_for(op, "GET", &next)).await.unwrap(),
    )
    .await;
    assert_eq!(second.value, vec!["w3"]);
    let next = second.next_link.unwrap();
    assert_eq!(next, "https://fake.example/widgets/fake/page/3");

    let third: WidgetPage = read_json(
        server.dispatch(request_for(op, "GET", &next)).await.unwrap(),
    )
    .await;
    assert_eq!(third, page(&["w4"]));
    assert_eq!(server.app_private().get(), 1);

    // The pager is finished, so the next request starts a new one.
    let again: WidgetPage = read_json(
        server
            .dispatch(request_for(op, "GET", "https://fake.example/widgets"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(again.value, vec!["w1", "w2"]);
    assert_eq!(server.app_private().get(), 2);
    testctx.teardown();
}

#[tokio::test]
async fn test_pager_error_page() {
    let testctx = common::test_setup("pager_error_page", api(), Calls::default());
    let server = &testctx.server;
    let op = "WidgetClient.NewListGadgetsPager";

    let response =
        server.dispatch(request_for(op, "GET", "/gadgets")).await.unwrap();
    assert_eq!(read_json::<WidgetPage>(response).await, page(&["g1"]));

    let error = server
        .dispatch(request_for(op, "GET", "/gadgets/fake/page/2"))
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Response);
    assert!(error.is_retriable());

    // A retry gets the page after the error.
    let response = server
        .dispatch(request_for(op, "GET", "/gadgets/fake/page/2"))
        .await
        .unwrap();
    assert_eq!(read_json::<WidgetPage>(response).await, page(&["g2"]));
    assert_eq!(server.app_private().get(), 1);
    testctx.teardown();
}

#[tokio::test]
async fn test_pager_unexpected_status() {
    let testctx =
        common::test_setup("pager_unexpected_status", api(), Calls::default());
    let server = &testctx.server;
    let op = "WidgetClient.NewListPartsPager";

    server.dispatch(request_for(op, "GET", "/parts")).await.unwrap();
    let error = server
        .dispatch(request_for(op, "GET", "/parts/fake/page/2"))
        .await
        .unwrap_err();
    assert_eq!(
        error.to_string(),
        "WidgetClient.NewListPartsPager: unexpected status code 206 Partial \
         Content. acceptable values are 200"
    );
    assert_eq!(error.kind(), ErrorKind::ContractViolation);

    // The pager was dropped, so this runs the handler again.
    let response =
        server.dispatch(request_for(op, "GET", "/parts")).await.unwrap();
    assert_eq!(read_json::<WidgetPage>(response).await, page(&["p1"]));
    assert_eq!(server.app_private().get(), 2);
    testctx.teardown();
}

#[tokio::test]
async fn test_poller() {
    let testctx = common::test_setup("poller", api(), Calls::default());
    let server = &testctx.server;
    let op = "WidgetClient.BeginCreate";

    let response = server
        .dispatch(request_for(op, "PUT", "https://fake.example/widgets/w1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let location = response.headers()["location"].to_str().unwrap().to_string();
    assert_eq!(location, "https://fake.example/widgets/w1/fake/status");

    let response =
        server.dispatch(request_for(op, "GET", &location)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["location"], location.as_str());

    // 200 is not declared by the operation but is accepted for the final
    // poll.
    let response =
        server.dispatch(request_for(op, "GET", &location)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json::<Widget>(response).await, Widget {
        name: "w1".to_string(),
        state: "Succeeded".to_string(),
    });
    assert_eq!(server.app_private().get(), 1);

    // Finished pollers are forgotten.
    let response = server
        .dispatch(request_for(op, "PUT", "https://fake.example/widgets/w1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(server.app_private().get(), 2);
    testctx.teardown();
}

#[tokio::test]
async fn test_poller_per_resource() {
    let testctx =
        common::test_setup("poller_per_resource", api(), Calls::default());
    let server = &testctx.server;
    let op = "WidgetClient.BeginCreate";

    server.dispatch(request_for(op, "PUT", "/widgets/w1")).await.unwrap();
    server.dispatch(request_for(op, "PUT", "/widgets/w2")).await.unwrap();
    assert_eq!(server.app_private().get(), 2);

    for name in ["w1", "w2"] {
        let uri = format!("/widgets/{}/fake/status", name);
        let response =
            server.dispatch(request_for(op, "GET", &uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let response =
            server.dispatch(request_for(op, "GET", &uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(server.app_private().get(), 2);
    testctx.teardown();
}

#[tokio::test]
async fn test_poller_empty_terminal() {
    let testctx =
        common::test_setup("poller_empty_terminal", api(), Calls::default());
    let server = &testctx.server;
    let op = "WidgetClient.BeginDelete";

    let response =
        server.dispatch(request_for(op, "DELETE", "/widgets/w1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let error = server
        .dispatch(request_for(op, "GET", "/widgets/w1/fake/status"))
        .await
        .unwrap_err();
    assert!(error.is_retriable());

    let response = server
        .dispatch(request_for(op, "GET", "/widgets/w1/fake/status"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(response.headers().get("content-type").is_none());
    assert_eq!(server.app_private().get(), 1);
    testctx.teardown();
}

#[tokio::test]
async fn test_poller_terminal_error() {
    let testctx =
        common::test_setup("poller_terminal_error", api(), Calls::default());
    let server = &testctx.server;
    let op = "WidgetClient.BeginRestart";

    let response = server
        .dispatch(request_for(op, "POST", "/widgets/w1/restart"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let error = server
        .dispatch(request_for(op, "GET", "/widgets/w1/restart/fake/status"))
        .await
        .unwrap_err();
    assert_eq!(
        error.error_response().map(|e| e.status_code()),
        Some(ErrorStatusCode::CONFLICT)
    );
    assert!(!error.is_retriable());

    // The terminal error ends the poller.
    server
        .dispatch(request_for(op, "POST", "/widgets/w1/restart"))
        .await
        .unwrap();
    assert_eq!(server.app_private().get(), 2);
    testctx.teardown();
}

#[tokio::test]
async fn test_poller_without_terminal() {
    let testctx =
        common::test_setup("poller_without_terminal", api(), Calls::default());
    let server = &testctx.server;
    let op = "WidgetClient.BeginResize";

    for expected_calls in 1..=2 {
        let error = server
            .dispatch(request_for(op, "POST", "/widgets/w1/resize"))
            .await
            .unwrap_err();
        assert!(matches!(error, FakeError::Sequence { .. }));
        assert_eq!(
            error.to_string(),
            "WidgetClient.BeginResize: poller has no terminal response or \
             error"
        );
        assert_eq!(error.kind(), ErrorKind::Configuration);
        assert_eq!(server.app_private().get(), expected_calls);
    }
    testctx.teardown();
}
