// Copyright 2024 Oxide Computer Company
/*!
 * Example use of fakeshot: a small service client exercised against a fake.
 */

use fakeshot::ConfigLogging;
use fakeshot::ConfigLoggingLevel;
use fakeshot::ErrorResponder;
use fakeshot::ErrorStatusCode;
use fakeshot::FakeApi;
use fakeshot::FakeError;
use fakeshot::FakeOperation;
use fakeshot::PagerResponder;
use fakeshot::Path;
use fakeshot::PollerResponder;
use fakeshot::RequestContext;
use fakeshot::RequestExt;
use fakeshot::Responder;
use fakeshot::ServerBuilder;
use fakeshot::Transport;
use fakeshot::TypedBody;
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

#[macro_use]
extern crate slog;

#[tokio::main]
async fn main() -> Result<(), String> {
    let config_logging =
        ConfigLogging::StderrTerminal { level: ConfigLoggingLevel::Info };
    let log = config_logging
        .to_logger("example-widget-client")
        .map_err(|error| format!("failed to create logger: {}", error))?;

    /*
     * Describe the operations the fake implements.  Each one is registered
     * under the id the client attaches to its requests.
     */
    let mut api = FakeApi::new();
    api.register(
        FakeOperation::new("WidgetClient.Get")
            .path("/widgets/{widgetName}")
            .success([StatusCode::OK])
            .handler(fake_get_widget),
    )
    .map_err(|error| error.to_string())?;
    api.register(
        FakeOperation::new("WidgetClient.BeginCreate")
            .path("/widgets/{widgetName}")
            .success([StatusCode::CREATED])
            .handler(fake_begin_create),
    )
    .map_err(|error| error.to_string())?;
    api.register(
        FakeOperation::new("WidgetClient.NewListPager")
            .path("/widgets")
            .success([StatusCode::OK])
            .handler(fake_list_widgets),
    )
    .map_err(|error| error.to_string())?;

    let server =
        ServerBuilder::new(api, WidgetStore::default(), log.clone()).build();

    /*
     * The client only knows about `Transport`, so it cannot tell the fake
     * apart from a real service.
     */
    let client = WidgetClient::new("https://widgets.example", Arc::new(server));

    let created = client
        .create_widget("w1", &WidgetProperties { color: "blue".to_string() })
        .await
        .map_err(|error| error.to_string())?;
    info!(log, "created widget"; "name" => &created.name);

    client
        .create_widget("w2", &WidgetProperties { color: "red".to_string() })
        .await
        .map_err(|error| error.to_string())?;

    let widget =
        client.get_widget("w1").await.map_err(|error| error.to_string())?;
    info!(log, "fetched widget";
        "name" => &widget.name,
        "color" => &widget.properties.color,
    );

    let names = client.list_widgets().await.map_err(|e| e.to_string())?;
    info!(log, "listed widgets"; "names" => names.join(","));

    match client.get_widget("nope").await {
        Err(error) => {
            info!(log, "lookup failed as expected";
                "error" => error.to_string(),
                "retriable" => error.is_retriable(),
            );
        }
        Ok(_) => return Err(String::from("found a widget that was not made")),
    }

    Ok(())
}

/*
 * The client side.  This is the shape of a generated service client: each
 * method builds a request, tags it with its operation id, and sends it
 * through whatever transport it was given.
 */

#[derive(Clone, Debug, Deserialize, Serialize)]
struct WidgetProperties {
    color: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct Widget {
    name: String,
    properties: WidgetProperties,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct WidgetListPage {
    value: Vec<Widget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_link: Option<String>,
}

struct WidgetClient {
    endpoint: String,
    transport: Arc<dyn Transport>,
}

impl WidgetClient {
    fn new(endpoint: &str, transport: Arc<dyn Transport>) -> Self {
        WidgetClient { endpoint: endpoint.to_string(), transport }
    }

    async fn send(
        &self,
        operation: &'static str,
        method: http::Method,
        uri: String,
        body: Option<Vec<u8>>,
    ) -> Result<http::Response<fakeshot::Body>, FakeError> {
        let mut builder = http::Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header(http::header::CONTENT_TYPE, "application/json");
        }
        let request = builder
            .body(body.map(fakeshot::Body::from).unwrap_or_default())
            .map_err(|error| FakeError::transport(error.to_string()))?
            .with_operation(operation);
        self.transport.send(request).await
    }

    async fn get_widget(&self, name: &str) -> Result<Widget, FakeError> {
        let uri = format!("{}/widgets/{}", self.endpoint, name);
        let response =
            self.send("WidgetClient.Get", http::Method::GET, uri, None).await?;
        read_body(response).await
    }

    /// Starts creating a widget and polls until the operation finishes.
    async fn create_widget(
        &self,
        name: &str,
        properties: &WidgetProperties,
    ) -> Result<Widget, FakeError> {
        let operation = "WidgetClient.BeginCreate";
        let body = serde_json::to_vec(properties)
            .map_err(|error| FakeError::transport(error.to_string()))?;
        let uri = format!("{}/widgets/{}", self.endpoint, name);
        let mut response =
            self.send(operation, http::Method::PUT, uri, Some(body)).await?;
        while let Some(location) = response
            .headers()
            .get(http::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
        {
            response =
                self.send(operation, http::Method::GET, location, None).await?;
        }
        read_body(response).await
    }

    /// Lists every widget, following next links page by page.
    async fn list_widgets(&self) -> Result<Vec<String>, FakeError> {
        let mut names = Vec::new();
        let mut next = Some(format!("{}/widgets", self.endpoint));
        while let Some(uri) = next {
            let response = self
                .send("WidgetClient.NewListPager", http::Method::GET, uri, None)
                .await?;
            let page: WidgetListPage = read_body(response).await?;
            names.extend(page.value.into_iter().map(|widget| widget.name));
            next = page.next_link;
        }
        Ok(names)
    }
}

async fn read_body<T: DeserializeOwned>(
    response: http::Response<fakeshot::Body>,
) -> Result<T, FakeError> {
    let bytes = response
        .into_body()
        .into_bytes()
        .await
        .map_err(|error| FakeError::transport(error.to_string()))?;
    serde_json::from_slice(&bytes)
        .map_err(|error| FakeError::transport(error.to_string()))
}

/*
 * The fake side: handlers for the operations above, backed by an in-memory
 * store.
 */

#[derive(Default)]
struct WidgetStore {
    widgets: Mutex<BTreeMap<String, Widget>>,
}

#[derive(Deserialize)]
struct WidgetPath {
    #[serde(rename = "widgetName")]
    widget_name: String,
}

async fn fake_get_widget(
    rqctx: RequestContext<WidgetStore>,
    path: Path<WidgetPath>,
) -> Result<Responder<Widget>, ErrorResponder> {
    let name = path.into_inner().widget_name;
    let widgets = rqctx.context().widgets.lock().unwrap();
    match widgets.get(&name) {
        Some(widget) => Ok(Responder::ok(widget.clone())),
        None => Err(ErrorResponder::new(
            ErrorStatusCode::NOT_FOUND,
            "WidgetNotFound",
        )
        .with_message(format!("widget {:?} does not exist", name))),
    }
}

async fn fake_begin_create(
    rqctx: RequestContext<WidgetStore>,
    path: Path<WidgetPath>,
    body: TypedBody<WidgetProperties>,
) -> Result<PollerResponder<Widget>, ErrorResponder> {
    let widget = Widget {
        name: path.into_inner().widget_name,
        properties: body.into_inner(),
    };
    rqctx
        .context()
        .widgets
        .lock()
        .unwrap()
        .insert(widget.name.clone(), widget.clone());
    Ok(PollerResponder::new()
        .add_non_terminal_response(StatusCode::CREATED)
        .set_terminal_response(StatusCode::OK, widget))
}

async fn fake_list_widgets(
    rqctx: RequestContext<WidgetStore>,
) -> Result<PagerResponder<WidgetListPage>, ErrorResponder> {
    let widgets = rqctx.context().widgets.lock().unwrap();
    let pager = widgets.values().fold(PagerResponder::new(), |pager, widget| {
        pager.add_page(StatusCode::OK, WidgetListPage {
            value: vec![widget.clone()],
            next_link: None,
        })
    });
    Ok(pager.inject_next_links(|page, link| page.next_link = Some(link)))
}
