// Copyright 2024 Oxide Computer Company
/*!
 * Configuration for a fake server
 */

use serde::Deserialize;
use serde::Serialize;

/**
 * Configuration for a fake server.
 *
 * This type implements [`serde::Deserialize`] and [`serde::Serialize`] and it
 * can be composed with the consumer's test configuration (whatever format
 * that's in).  For example:
 *
 * ```
 * use fakeshot::ConfigFakeServer;
 * use fakeshot::DispatchMode;
 * use serde::Deserialize;
 *
 * #[derive(Deserialize)]
 * struct MyTestConfig {
 *     widget_fake: ConfigFakeServer,
 *     /* ... (other test-specific config) */
 * }
 *
 * fn main() -> Result<(), String> {
 *     let my_config: MyTestConfig = toml::from_str(
 *         r##"
 *             [widget_fake]
 *             request_body_max_bytes = 4096
 *             dispatch_mode = "inline"
 *             log_headers = ["x-ms-client-request-id"]
 *         "##
 *     ).map_err(|error| format!("parsing config: {}", error))?;
 *
 *     let fake_config: &ConfigFakeServer = &my_config.widget_fake;
 *     assert_eq!(fake_config.dispatch_mode, DispatchMode::Inline);
 *     Ok(())
 * }
 * ```
 */
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ConfigFakeServer {
    /** maximum allowed size of a request body, defaults to 1 MiB */
    pub request_body_max_bytes: usize,
    /** how handlers are run relative to the caller */
    pub dispatch_mode: DispatchMode,
    /** request headers whose values are added to each request's log */
    pub log_headers: Vec<String>,
}

/**
 * Describes how a fake server runs each dispatch relative to the caller's
 * task.
 */
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchMode {
    /**
     * The dispatch runs on its own task.  If the request is cancelled, the
     * caller gets `Cancelled` right away and the task runs to completion in
     * the background; its result is discarded.  A panicking handler panics
     * the caller.
     */
    #[default]
    Detached,
    /**
     * The dispatch runs on the caller's task.  If the request is cancelled,
     * the dispatch future is dropped wherever it was.
     */
    Inline,
}

impl Default for ConfigFakeServer {
    fn default() -> Self {
        ConfigFakeServer {
            request_body_max_bytes: 1024 * 1024,
            dispatch_mode: DispatchMode::default(),
            log_headers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::ConfigFakeServer;
    use super::DispatchMode;

    #[test]
    fn test_config_defaults() {
        let config: ConfigFakeServer = toml::from_str("").unwrap();
        assert_eq!(config, ConfigFakeServer::default());
        assert_eq!(config.request_body_max_bytes, 1048576);
        assert_eq!(config.dispatch_mode, DispatchMode::Detached);
        assert!(config.log_headers.is_empty());
    }

    #[test]
    fn test_config_bad_mode() {
        let error = toml::from_str::<ConfigFakeServer>(
            "dispatch_mode = \"eventually\"",
        )
        .unwrap_err();
        assert!(error.message().starts_with("unknown variant `eventually`"));
    }
}
