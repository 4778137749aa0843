// Copyright 2024 Oxide Computer Company

//! Common facilities for automated testing.

use fakeshot::test_util::LogContext;
use fakeshot::ConfigFakeServer;
use fakeshot::ConfigLogging;
use fakeshot::ConfigLoggingIfExists;
use fakeshot::ConfigLoggingLevel;
use fakeshot::FakeApi;
use fakeshot::FakeServer;
use fakeshot::ServerBuilder;
use fakeshot::ServerContext;

pub fn create_log_context(test_name: &str) -> LogContext {
    let log_config = ConfigLogging::File {
        level: ConfigLoggingLevel::Debug,
        path: "UNUSED".into(),
        if_exists: ConfigLoggingIfExists::Fail,
    };
    LogContext::new(test_name, &log_config)
}

/// A fake server along with the log context its test owns.
pub struct TestContext<C: ServerContext> {
    pub server: FakeServer<C>,
    pub logctx: LogContext,
}

impl<C: ServerContext> TestContext<C> {
    pub fn teardown(self) {
        drop(self.server);
        self.logctx.cleanup_successful();
    }
}

pub fn test_setup_with_config<C: ServerContext>(
    test_name: &str,
    api: FakeApi<C>,
    private: C,
    config: ConfigFakeServer,
) -> TestContext<C> {
    let logctx = create_log_context(test_name);
    let log = logctx.log.new(o!());
    let server = ServerBuilder::new(api, private, log).config(config).build();
    TestContext { server, logctx }
}

pub fn test_setup<C: ServerContext>(
    test_name: &str,
    api: FakeApi<C>,
    private: C,
) -> TestContext<C> {
    test_setup_with_config(test_name, api, private, Default::default())
}
