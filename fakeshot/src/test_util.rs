// Copyright 2024 Oxide Computer Company

//! Automated testing facilities.  These are intended for use both by this
//! crate and consumers of it.

use crate::logging::ConfigLogging;
use crate::transport::RequestExt;
use crate::Body;

use camino::Utf8PathBuf;
use chrono::DateTime;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use slog::Logger;
use std::fmt::Debug;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

/// Builds a request for `operation` with an empty body.
pub fn request_for(
    operation: &'static str,
    method: &str,
    uri: &str,
) -> http::Request<Body> {
    http::Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
        .with_operation(operation)
}

/// Builds a request for `operation` whose body is `body` serialized as JSON.
pub fn json_request_for<T: Serialize>(
    operation: &'static str,
    method: &str,
    uri: &str,
    body: &T,
) -> http::Request<Body> {
    http::Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
        .with_operation(operation)
}

/// Reads a response body and parses it as JSON.
pub async fn read_json<T: DeserializeOwned>(
    response: http::Response<Body>,
) -> T {
    let bytes = response.into_body().into_bytes().await.unwrap();
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        panic!(
            "failed to parse response body as JSON: {}: {:?}",
            e,
            String::from_utf8_lossy(&bytes)
        )
    })
}

/// Reads a response body as a UTF-8 string.
pub async fn read_string(response: http::Response<Body>) -> String {
    let bytes = response.into_body().into_bytes().await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Used to generate a unique filename for each test's log file.
static TEST_SUITE_LOGGER_ID: AtomicU32 = AtomicU32::new(0);

/// A `LogContext` represents a logger for a particular test.
///
/// Test suites typically configure logging with `mode = "file"` and the path
/// set to the sentinel `"UNUSED"`; each test then gets its own log file in a
/// temporary directory:
///
/// ```
/// use fakeshot::ConfigLogging;
/// use fakeshot::ConfigLoggingIfExists;
/// use fakeshot::ConfigLoggingLevel;
/// use fakeshot::test_util::LogContext;
///
/// let logctx = LogContext::new("my_test", &ConfigLogging::File {
///     level: ConfigLoggingLevel::Debug,
///     path: "UNUSED".into(),
///     if_exists: ConfigLoggingIfExists::Fail,
/// });
/// slog::info!(logctx.log, "the test is going great");
/// logctx.cleanup_successful();
/// ```
///
/// If the test fails before calling `cleanup_successful()`, the log file is
/// kept.  `cleanup_successful()` is not invoked on drop, since that would
/// remove the file even when the test failed.
pub struct LogContext {
    /// general-purpose logger
    pub log: Logger,
    log_path: Option<Utf8PathBuf>,
}

impl LogContext {
    /// Sets up a LogContext.  If `initial_config_logging` specifies a
    /// file-based log, the requested path _must_ be the string `"UNUSED"`,
    /// and it is replaced with a file name in a temporary directory
    /// containing `test_name`.
    pub fn new(
        test_name: &str,
        initial_config_logging: &ConfigLogging,
    ) -> LogContext {
        let (log_path, log_config) = match initial_config_logging {
            ConfigLogging::File { level, path: dummy_path, if_exists } => {
                assert_eq!(
                    dummy_path, "UNUSED",
                    "for test suite logging configuration, when mode = \
                     \"file\" is used, the path MUST be the sentinel string \
                     \"UNUSED\".  It will be replaced with a unique path for \
                     each test."
                );
                let new_path = Utf8PathBuf::try_from(log_file_for_test(
                    test_name,
                ))
                .unwrap();
                eprintln!("log file: {:?}", new_path);
                (
                    Some(new_path.clone()),
                    ConfigLogging::File {
                        level: level.clone(),
                        path: new_path,
                        if_exists: if_exists.clone(),
                    },
                )
            }
            other_config => (None, other_config.clone()),
        };

        let log = log_config.to_logger(test_name).unwrap();
        LogContext { log, log_path }
    }

    /// Returns the path of this test's log file, if it logs to one.
    pub fn log_path(&self) -> Option<&Utf8PathBuf> {
        self.log_path.as_ref()
    }

    /// Removes the log file, if this was a file-based logger.
    pub fn cleanup_successful(self) {
        if let Some(ref log_path) = self.log_path {
            fs::remove_file(log_path).unwrap();
        }
    }
}

/// Returns a unique path name in a temporary directory that includes the
/// given `test_name`.
pub fn log_file_for_test(test_name: &str) -> PathBuf {
    let arg0 = {
        let arg0path = std::env::args().next().unwrap();
        Path::new(&arg0path).file_name().unwrap().to_str().unwrap().to_string()
    };

    let mut pathbuf = std::env::temp_dir();
    let id = TEST_SUITE_LOGGER_ID.fetch_add(1, Ordering::SeqCst);
    let pid = std::process::id();
    pathbuf.push(format!("{}-{}.{}.{}.log", arg0, test_name, pid, id));
    pathbuf
}

/// Load an object of type `T` (usually a hunk of configuration) from the
/// string `contents`.  `label` is used as an identifying string in a log
/// message.  It should be unique for each test.
pub fn read_config<T: DeserializeOwned + Debug>(
    label: &str,
    contents: &str,
) -> Result<T, toml::de::Error> {
    let result = toml::from_str(contents);
    eprintln!("config \"{}\": {:?}", label, result);
    result
}

/// Represents a Bunyan log record.  This form does not support any
/// non-standard fields.
#[derive(Deserialize)]
pub struct BunyanLogRecord {
    pub time: DateTime<Utc>,
    pub name: String,
    pub hostname: String,
    pub pid: u32,
    pub msg: String,
    pub v: usize,
}

/// Read a file containing a Bunyan-format log, returning an array of records.
pub fn read_bunyan_log(logpath: &Path) -> Vec<BunyanLogRecord> {
    let log_contents = fs::read_to_string(logpath).unwrap();
    log_contents
        .split('\n')
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str::<BunyanLogRecord>(line).unwrap())
        .collect()
}
