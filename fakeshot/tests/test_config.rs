// Copyright 2024 Oxide Computer Company

//! Tests for configuration loaded from TOML.

use fakeshot::test_util::read_bunyan_log;
use fakeshot::test_util::read_config;
use fakeshot::ConfigFakeServer;
use fakeshot::ConfigLogging;
use fakeshot::ConfigLoggingIfExists;
use fakeshot::ConfigLoggingLevel;
use fakeshot::DispatchMode;
use fakeshot::ErrorResponder;
use fakeshot::FakeApi;
use fakeshot::FakeOperation;
use fakeshot::RequestContext;
use fakeshot::RequestExt;
use fakeshot::Responder;
use fakeshot::ServerBuilder;
use http::StatusCode;
use serde::Deserialize;

#[macro_use]
extern crate slog;

/// The layout of a test suite's configuration file.
#[derive(Debug, Deserialize)]
struct SuiteConfig {
    server: ConfigFakeServer,
    logging: ConfigLogging,
}

async fn ping(
    _rqctx: RequestContext<()>,
) -> Result<Responder<&'static str>, ErrorResponder> {
    Ok(Responder::ok("pong"))
}

#[test]
fn test_config_defaults() {
    let config: ConfigFakeServer = read_config("defaults", "").unwrap();
    assert_eq!(config, ConfigFakeServer::default());
    assert_eq!(config.request_body_max_bytes, 1024 * 1024);
    assert_eq!(config.dispatch_mode, DispatchMode::Detached);
    assert!(config.log_headers.is_empty());
}

#[test]
fn test_config_bad_values() {
    let error = read_config::<ConfigFakeServer>(
        "bad_body_size",
        "request_body_max_bytes = \"lots\"",
    )
    .unwrap_err();
    assert!(error.message().starts_with("invalid type: string \"lots\""));

    let error = read_config::<ConfigFakeServer>(
        "bad_log_headers",
        "log_headers = \"x-ms-client-request-id\"",
    )
    .unwrap_err();
    assert!(error.message().starts_with("invalid type: string"));
}

#[tokio::test]
async fn test_config_file_logging() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("fake.log");
    let contents = format!(
        r#"
        [server]
        request_body_max_bytes = 1024
        dispatch_mode = "inline"
        log_headers = ["x-ms-client-request-id"]

        [logging]
        mode = "file"
        level = "info"
        path = {:?}
        if_exists = "fail"
        "#,
        log_path.to_str().unwrap()
    );
    let config: SuiteConfig =
        read_config("file_logging", &contents).unwrap();
    assert_eq!(config.server.request_body_max_bytes, 1024);
    assert_eq!(config.server.dispatch_mode, DispatchMode::Inline);

    let log = config.logging.to_logger("test-config").unwrap();
    let mut api = FakeApi::new();
    api.register(
        FakeOperation::new("WidgetClient.Ping")
            .success([StatusCode::OK])
            .handler(ping),
    )
    .unwrap();
    let server = ServerBuilder::new(api, (), log).config(config.server).build();

    let request = http::Request::get("/ping")
        .header("x-ms-client-request-id", "req-42")
        .body(fakeshot::Body::empty())
        .unwrap()
        .with_operation("WidgetClient.Ping");
    let response = server.dispatch(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Dropping the last logger flushes the log.
    drop(server);

    let records = read_bunyan_log(&log_path);
    let completed: Vec<_> = records
        .iter()
        .filter(|record| record.msg == "request completed")
        .collect();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].name, "test-config");
    assert_eq!(completed[0].v, 0);

    // Request properties travel on every record for the request.
    let raw = std::fs::read_to_string(&log_path).unwrap();
    let line = raw
        .lines()
        .find(|line| line.contains("request completed"))
        .unwrap();
    let record: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(record["operation_id"], "WidgetClient.Ping");
    assert_eq!(record["hdr_x_ms_client_request_id"], "req-42");
    assert_eq!(record["response_code"], "200");
    assert!(record["req_id"].is_string());
}

#[test]
fn test_config_file_if_exists() {
    let dir = tempfile::tempdir().unwrap();
    let path =
        camino::Utf8PathBuf::try_from(dir.path().join("fake.log")).unwrap();
    let file_logging = |level, if_exists| ConfigLogging::File {
        level,
        path: path.clone(),
        if_exists,
    };

    // Each logger is dropped before the file is read, which flushes it.
    {
        let log = file_logging(
            ConfigLoggingLevel::Warn,
            ConfigLoggingIfExists::Fail,
        )
        .to_logger("test-config")
        .unwrap();
        debug!(log, "first_debug");
        warn!(log, "first_warn");
    }
    {
        let log = file_logging(
            ConfigLoggingLevel::Warn,
            ConfigLoggingIfExists::Append,
        )
        .to_logger("test-config")
        .unwrap();
        error!(log, "second_error");
    }
    let records = read_bunyan_log(path.as_std_path());
    let messages: Vec<&str> = records.iter().map(|r| r.msg.as_str()).collect();
    assert_eq!(messages, vec!["first_warn", "second_error"]);
    let expected_hostname = hostname::get().unwrap().into_string().unwrap();
    for record in &records {
        assert_eq!(record.hostname, expected_hostname);
        assert_eq!(record.pid, std::process::id());
    }

    {
        let log = file_logging(
            ConfigLoggingLevel::Trace,
            ConfigLoggingIfExists::Truncate,
        )
        .to_logger("test-config")
        .unwrap();
        debug!(log, "third_debug");
    }
    let records = read_bunyan_log(path.as_std_path());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].msg, "third_debug");
}
