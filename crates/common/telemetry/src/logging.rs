// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{env, io::IsTerminal, sync::Once};

use bon::Builder;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Deserializer, Serialize, de};
use smart_default::SmartDefault;
use snafu::{ResultExt, Snafu};
use tracing::Subscriber;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, filter, fmt::MakeWriter, layer::SubscriberExt,
    registry::LookupSpan,
};

/// Deserializes a string value, using `Default::default()` if the string is
/// empty.
///
/// # Errors
/// Returns an error if deserialization fails.
pub fn empty_string_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let s = String::deserialize(deserializer)?;
    if s.is_empty() {
        Ok(T::default())
    } else {
        T::deserialize(de::value::StrDeserializer::new(&s)).map_err(|e: de::value::Error| {
            de::Error::custom(format!("invalid value, expect empty string, err: {e}"))
        })
    }
}

/// The default directory name for log files when file logging is enabled.
pub const DEFAULT_LOGGING_DIR: &str = "logs";

/// Default log level filter when neither `level` nor `RUST_LOG` is set.
const DEFAULT_LOG_TARGETS: &str = "info";

#[derive(Debug, Snafu)]
pub enum LoggingError {
    #[snafu(display("Failed to create rolling log appender in '{dir}'"))]
    Appender {
        dir:    String,
        source: tracing_appender::rolling::InitError,
    },

    #[snafu(display("Invalid log level filter '{level}'"))]
    InvalidLevel {
        level:  String,
        source: filter::ParseError,
    },

    #[snafu(display("Failed to bridge `log` records into tracing"))]
    LogBridge { source: tracing_log::log::SetLoggerError },

    #[snafu(display("Failed to install the global tracing subscriber"))]
    SetGlobal {
        source: tracing::subscriber::SetGlobalDefaultError,
    },
}

/// Configuration options for the logging system.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault, Builder)]
#[serde(default)]
pub struct LoggingOptions {
    /// Directory for hourly rotated log files. Empty means stdout only.
    #[default = ""]
    #[builder(default)]
    pub dir: String,

    /// Level filter such as `info` or `info,redqueue_server=debug`. Falls
    /// back to `RUST_LOG`, then to `info`.
    pub level: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_default")]
    #[builder(default)]
    pub log_format: LogFormat,

    /// Maximum number of rotated files kept per log kind.
    #[default = 720]
    #[builder(default = 720)]
    pub max_log_files: usize,

    #[default = true]
    #[builder(default = true)]
    pub append_stdout: bool,
}

/// Available log output formats.
#[derive(
    Clone,
    Debug,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Default,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, for log aggregation.
    Json,

    /// Human-readable lines.
    ///
    /// ```text
    /// 2024-01-01T12:00:00.123Z  INFO redqueue_app: Server started
    /// ```
    #[default]
    Text,
}

/// Initialize logging specifically designed for unit tests.
///
/// Logs go to files under `UNITTEST_LOG_DIR` (default
/// `/tmp/__unittest_logs`) at `UNITTEST_LOG_LEVEL` (default `debug`). Safe to
/// call from every test; only the first call does anything.
pub fn init_default_ut_logging() {
    static GLOBAL_UT_LOG_GUARD: OnceCell<Vec<WorkerGuard>> = OnceCell::new();

    GLOBAL_UT_LOG_GUARD.get_or_init(|| {
        let dir =
            env::var("UNITTEST_LOG_DIR").unwrap_or_else(|_| "/tmp/__unittest_logs".to_string());
        let level = env::var("UNITTEST_LOG_LEVEL")
            .unwrap_or_else(|_| "debug,reqwest=warn,hyper=warn,h2=info".to_string());
        let opts = LoggingOptions {
            dir: dir.clone(),
            level: Some(level),
            ..Default::default()
        };
        let guards = init_global_logging("unittest", &opts).unwrap_or_default();
        tracing::info!("logs dir = {}", dir);
        guards
    });
}

/// Installs the global tracing subscriber.
///
/// Sets up a stdout layer (if `append_stdout`), plus an hourly rolling file
/// layer and an error-only file layer named after `app_name` when `dir` is
/// set. Every writer is non-blocking; the returned guards must be kept alive
/// for buffered lines to reach their destination.
///
/// Only the first call installs anything, later calls return no guards.
///
/// # Errors
/// Fails if a log directory cannot be used, the level filter does not parse,
/// or another global subscriber or logger is already installed.
pub fn init_global_logging(
    app_name: &str,
    opts: &LoggingOptions,
) -> Result<Vec<WorkerGuard>, LoggingError> {
    static START: Once = Once::new();
    let mut result = Ok(Vec::new());
    START.call_once(|| result = install(app_name, opts));
    result
}

fn parse_targets(level: &str) -> Result<filter::Targets, LoggingError> {
    level
        .parse::<filter::Targets>()
        .context(InvalidLevelSnafu { level })
}

#[allow(clippy::print_stdout)]
fn install(app_name: &str, opts: &LoggingOptions) -> Result<Vec<WorkerGuard>, LoggingError> {
    let mut guards = vec![];

    let level = opts
        .level
        .clone()
        .or_else(|| env::var(EnvFilter::DEFAULT_ENV).ok())
        .unwrap_or_else(|| DEFAULT_LOG_TARGETS.to_string());
    let targets = parse_targets(&level)?;

    let stdout_logging_layer = if opts.append_stdout {
        let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
        guards.push(guard);
        Some(fmt_layer(
            writer,
            opts.log_format,
            std::io::stdout().is_terminal(),
        ))
    } else {
        None
    };

    let (file_logging_layer, err_file_logging_layer) = if opts.dir.is_empty() {
        (None, None)
    } else {
        let (writer, guard) = tracing_appender::non_blocking(rolling_appender(
            &opts.dir,
            app_name,
            opts.max_log_files,
        )?);
        guards.push(guard);
        let file_layer = fmt_layer(writer, opts.log_format, false);

        let (writer, guard) = tracing_appender::non_blocking(rolling_appender(
            &opts.dir,
            &format!("{app_name}-err"),
            opts.max_log_files,
        )?);
        guards.push(guard);
        let err_layer = fmt_layer(writer, opts.log_format, false)
            .with_filter(filter::LevelFilter::ERROR)
            .boxed();

        (Some(file_layer), Some(err_layer))
    };

    LogTracer::init().context(LogBridgeSnafu)?;

    let subscriber = Registry::default()
        .with(targets)
        .with(stdout_logging_layer)
        .with(file_logging_layer)
        .with(err_file_logging_layer);
    tracing::subscriber::set_global_default(subscriber).context(SetGlobalSnafu)?;
    Ok(guards)
}

fn rolling_appender(
    dir: &str,
    prefix: &str,
    max_log_files: usize,
) -> Result<RollingFileAppender, LoggingError> {
    RollingFileAppender::builder()
        .rotation(Rotation::HOURLY)
        .filename_prefix(prefix)
        .max_log_files(max_log_files)
        .build(dir)
        .context(AppenderSnafu { dir })
}

fn fmt_layer<S, W>(writer: W, format: LogFormat, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => tracing_subscriber::fmt::Layer::new()
            .json()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::Layer::new()
            .with_writer(writer)
            .with_ansi(ansi)
            .boxed(),
    }
}
