// Copyright 2024 Oxide Computer Company
//! Facilities for configuring logging and creating loggers, all using slog.
//!
//! A fake server only needs a [`slog::Logger`].  These helpers exist because
//! test suites commonly want the same handful of setups: a readable log on
//! the terminal while debugging, bunyan on stderr for CI, or a bunyan file
//! per test (see [`crate::test_util::LogContext`]).

use camino::Utf8PathBuf;
use serde::Deserialize;
use serde::Serialize;
use slog::Drain;
use slog::Level;
use slog::Logger;
use std::fs::OpenOptions;
use std::io::LineWriter;
use std::io::Write;
use std::{io, path::Path};

/// Represents the logging configuration for a test suite.  This is expected
/// to be a block in a TOML config file, although that's not required.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "mode")]
pub enum ConfigLogging {
    /// Pretty-printed output to stderr, assumed to support terminal escapes.
    StderrTerminal { level: ConfigLoggingLevel },
    /// Bunyan-formatted output to stderr.
    StderrJson { level: ConfigLoggingLevel },
    /// Bunyan-formatted output to a specified file.
    File {
        level: ConfigLoggingLevel,
        path: Utf8PathBuf,
        if_exists: ConfigLoggingIfExists,
    },
}

/// Log messages have a level that's used for filtering in the usual way.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLoggingLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl From<&ConfigLoggingLevel> for Level {
    fn from(config_level: &ConfigLoggingLevel) -> Level {
        match config_level {
            ConfigLoggingLevel::Trace => Level::Trace,
            ConfigLoggingLevel::Debug => Level::Debug,
            ConfigLoggingLevel::Info => Level::Info,
            ConfigLoggingLevel::Warn => Level::Warning,
            ConfigLoggingLevel::Error => Level::Error,
            ConfigLoggingLevel::Critical => Level::Critical,
        }
    }
}

/// Specifies the behavior when logging to a file that already exists.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLoggingIfExists {
    /// Fail to create the log
    Fail,
    /// Truncate the existing file
    Truncate,
    /// Append to the existing file
    Append,
}

impl ConfigLogging {
    /// Create a root logger based on the requested configuration.
    pub fn to_logger<S: AsRef<str>>(
        &self,
        log_name: S,
    ) -> Result<Logger, io::Error> {
        match self {
            ConfigLogging::StderrTerminal { level } => {
                let decorator = slog_term::TermDecorator::new().build();
                let drain =
                    slog_term::FullFormat::new(decorator).build().fuse();
                Ok(async_root_logger(level, drain))
            }

            ConfigLogging::StderrJson { level } => {
                let drain = slog_bunyan::with_name(
                    leak_log_name(log_name.as_ref()),
                    io::stderr(),
                )
                .build()
                .fuse();
                Ok(async_root_logger(level, drain))
            }

            ConfigLogging::File { level, path, if_exists } => {
                let mut open_options = std::fs::OpenOptions::new();
                open_options.write(true);
                open_options.create(true);

                match if_exists {
                    ConfigLoggingIfExists::Fail => {
                        open_options.create_new(true);
                    }
                    ConfigLoggingIfExists::Append => {
                        open_options.append(true);
                    }
                    ConfigLoggingIfExists::Truncate => {
                        open_options.truncate(true);
                    }
                }

                let drain = log_drain_for_file(
                    &open_options,
                    Path::new(path),
                    log_name.as_ref(),
                )?;
                let logger = async_root_logger(level, drain);

                // Tell whoever is watching stderr where the log went.  A
                // failure to write this note is not worth failing over, so
                // record it in the log itself.
                if let Err(err) = writeln!(
                    io::stderr(),
                    "note: configured to log to \"{path}\"",
                ) {
                    slog::warn!(
                        logger,
                        "failed to report log path on stderr";
                        "err" => %err,
                    );
                }

                Ok(logger)
            }
        }
    }
}

fn async_root_logger<T>(level: &ConfigLoggingLevel, drain: T) -> slog::Logger
where
    T: slog::Drain + Send + 'static,
    <T as slog::Drain>::Err: std::fmt::Debug,
{
    let level_drain = slog::LevelFilter(drain, Level::from(level)).fuse();
    let async_drain =
        slog_async::Async::new(level_drain).chan_size(1024).build().fuse();
    slog::Logger::root(async_drain, o!())
}

// The bunyan drain requires a `&'static str` name, and we want names
// generated at runtime (e.g., from the test name), so the name is leaked.
// Loggers are created a handful of times per process.
fn leak_log_name(log_name: &str) -> &'static str {
    Box::leak(log_name.to_string().into_boxed_str())
}

fn log_drain_for_file(
    open_options: &OpenOptions,
    path: &Path,
    log_name: &str,
) -> Result<slog::Fuse<slog_json::Json<LineWriter<std::fs::File>>>, io::Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Buffer writes to the file around newlines to minimize syscalls.
    let file = LineWriter::new(open_options.open(path)?);
    Ok(slog_bunyan::with_name(leak_log_name(log_name), file).build().fuse())
}

#[cfg(test)]
mod test {
    use crate::test_util::read_config;
    use crate::ConfigLogging;
    use crate::ConfigLoggingLevel;
    use std::fs;
    use std::io;

    /// Builds a `mode = "file"` config.  Windows paths need to have \ turned
    /// into \\.
    fn file_config(path: &std::path::Path, if_exists: &str) -> String {
        format!(
            r#"
            mode = "file"
            level = "warn"
            if_exists = "{}"
            path = "{}"
            "#,
            if_exists,
            path.display().to_string().escape_default()
        )
    }

    #[test]
    fn test_config_bad_log_mode() {
        let bad_config = r##" mode = "bonkers" "##;
        let error = read_config::<ConfigLogging>("bad_log_mode", bad_config)
            .unwrap_err()
            .to_string();
        assert!(error.contains(
            "unknown variant `bonkers`, expected one of `stderr-terminal`, \
             `stderr-json`, `file`"
        ));
    }

    #[test]
    fn test_config_bad_level() {
        let error = read_config::<ConfigLogging>(
            "bad_terminal_no_level",
            r##" mode = "stderr-json" "##,
        )
        .unwrap_err();
        assert_eq!(error.message(), "missing field `level`");

        let error = read_config::<ConfigLogging>(
            "bad_terminal_bad_level",
            r##"
            mode = "stderr-terminal"
            level = "everything"
            "##,
        )
        .unwrap_err();
        assert_eq!(
            error.message(),
            "unknown variant `everything`, expected one of `trace`, `debug`, \
             `info`, `warn`, `error`, `critical`"
        );
    }

    #[test]
    fn test_config_stderr() {
        let config = read_config::<ConfigLogging>(
            "stderr-json",
            r##"
            mode = "stderr-json"
            level = "warn"
            "##,
        )
        .unwrap();
        assert_eq!(config, ConfigLogging::StderrJson {
            level: ConfigLoggingLevel::Warn
        });
        config.to_logger("test-logger").unwrap();

        let config = read_config::<ConfigLogging>(
            "stderr-terminal",
            r##"
            mode = "stderr-terminal"
            level = "warn"
            "##,
        )
        .unwrap();
        config.to_logger("test-logger").unwrap();
    }

    #[test]
    fn test_config_bad_file_path() {
        let dir = tempfile::tempdir().unwrap();

        // A path that is a directory cannot be opened as a log file.
        let path = dir.path().join("log_file_as_dir");
        fs::create_dir(&path).unwrap();
        let config: ConfigLogging =
            read_config("bad_file_path_type", &file_config(&path, "append"))
                .unwrap();
        let error = config.to_logger("test-logger").unwrap_err();
        if cfg!(windows) {
            assert_eq!(error.kind(), io::ErrorKind::PermissionDenied);
        } else {
            assert_eq!(error.raw_os_error(), Some(libc::EISDIR));
        }

        // With if_exists = "fail", an existing file is an error.
        let path = dir.path().join("log.out");
        fs::write(&path, "").unwrap();
        let config: ConfigLogging =
            read_config("bad_file_path_exists", &file_config(&path, "fail"))
                .unwrap();
        let error = config.to_logger("test-logger").unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::AlreadyExists);
    }
}
