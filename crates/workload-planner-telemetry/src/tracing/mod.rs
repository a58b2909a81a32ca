//! This module contains functionality to initialise tracing Subscribers for
//! console output and rolling file output.
//!
//! To get started, see [`Tracing`].

use std::path::PathBuf;

#[cfg_attr(feature = "clap", cfg(doc))]
use clap;
use snafu::{ResultExt as _, Snafu};
use tracing::{level_filters::LevelFilter, subscriber::SetGlobalDefaultError};
use tracing_appender::rolling::{InitError, RollingFileAppender};
use tracing_subscriber::{EnvFilter, Layer, Registry, filter::Directive, layer::SubscriberExt};

use crate::tracing::settings::*;

pub mod settings;

type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors which can be encountered when initialising [`Tracing`].
#[derive(Debug, Snafu)]
pub enum Error {
    /// Indicates that [`Tracing`] failed to install the rolling file appender.
    #[snafu(display("failed to initialize rolling file appender"))]
    InitRollingFileAppender {
        #[allow(missing_docs)]
        source: InitError,
    },

    /// Indicates that [`Tracing`] failed to set the global default subscriber.
    #[snafu(display("unable to set the global default subscriber"))]
    SetGlobalDefaultSubscriber {
        #[allow(missing_docs)]
        source: SetGlobalDefaultError,
    },
}

/// Easily initialize a set of pre-configured [`Subscriber`][1] layers.
///
/// # Usage
///
/// The configured subscribers are installed as the global default by [`Tracing::init`]. Keep the returned value
/// around for as long as the program runs.
///
/// ```
/// # use workload_planner_telemetry::tracing::{Tracing, Error};
/// fn main() -> Result<(), Error> {
///     let _tracing_guard = Tracing::builder()
///         .service_name("test")
///         .build()
///         .init()?;
///
///     tracing::info!("log a message");
///     Ok(())
/// }
/// ```
///
/// ## Pre-configured Tracing Instance
///
/// Binaries should use [`Tracing::pre_configured`], which reads [`TelemetryOptions`] (usually straight from the
/// command line, see the `clap` feature).
///
/// ## Builders
///
/// Subscribers can be configured with the [`SettingsBuilder`] or, for basic configuration, with tuples of the
/// environment variable, the default level and (optionally) whether the subscriber is enabled.
///
/// ```
/// use workload_planner_telemetry::tracing::{Tracing, settings::Settings};
/// use tracing_subscriber::filter::LevelFilter;
///
/// let log_to_file = false;
///
/// let tracing = Tracing::builder()
///     .service_name("test")
///     .with_console_output(("TEST_CONSOLE", LevelFilter::INFO))
///     .with_file_output(log_to_file.then(|| {
///         Settings::builder()
///             .with_environment_variable("TEST_FILE")
///             .with_default_level(LevelFilter::DEBUG)
///             .file_log_settings_builder("/tmp/logs", "planner.log")
///             .build()
///     }))
///     .build();
/// ```
///
/// ## Environment Variables and CLI Arguments
///
/// ### Console logs
///
/// - `CONSOLE_LOG_DISABLED` (`--console-log-disabled`): Disables console logs when set to `true`.
/// - `CONSOLE_LOG_FORMAT` (`--console-log-format`): `plain` (default) or `json`.
/// - `CONSOLE_LOG_LEVEL`: Set the log level for the console logs.
///
/// ### File logs
///
/// - `FILE_LOG_DIRECTORY` (`--file-log-directory`): Enable the file logs and set the file log directory.
/// - `FILE_LOG_ROTATION_PERIOD` (`--file-log-rotation-period`): Set the rotation period of log files
/// - `FILE_LOG_MAX_FILES` (`--file-log-max-files`): Number of rotated log files to keep
/// - `FILE_LOG_LEVEL`: Set the log level for file logs
///
/// [1]: tracing::Subscriber
pub struct Tracing {
    service_name: &'static str,
    console_log_settings: ConsoleLogSettings,
    file_log_settings: FileLogSettings,
}

impl Tracing {
    /// The environment variable used to set the console log level filter.
    pub const CONSOLE_LOG_LEVEL: &str = "CONSOLE_LOG_LEVEL";
    /// The environment variable used to set the rolling file log level filter.
    pub const FILE_LOG_LEVEL: &str = "FILE_LOG_LEVEL";
    /// The filename used for the rolling file logs.
    pub const FILE_LOG_SUFFIX: &str = "tracing-rs.json";

    /// Creates and returns a [`TracingBuilder`].
    pub fn builder() -> TracingBuilder<builder_state::PreServiceName> {
        TracingBuilder::default()
    }

    /// Creates an returns a pre-configured [`Tracing`] instance which can be initialized by
    /// calling [`Tracing::init()`].
    ///
    /// ### Default Levels
    ///
    /// - Console logs: INFO
    /// - File logs: INFO
    ///
    /// ### Default Values
    ///
    /// - If `file_log_rotation_period` is [`None`], this function will use a default value of
    ///   [`RotationPeriod::Never`].
    pub fn pre_configured(service_name: &'static str, options: TelemetryOptions) -> Self {
        let TelemetryOptions {
            console_log_disabled,
            console_log_format,
            file_log_directory,
            file_log_rotation_period,
            file_log_max_files,
        } = options;

        let file_log_rotation_period = file_log_rotation_period.unwrap_or_default();

        Self::builder()
            .service_name(service_name)
            .with_console_output((!console_log_disabled).then(|| {
                Settings::builder()
                    .with_environment_variable(Self::CONSOLE_LOG_LEVEL)
                    .with_default_level(LevelFilter::INFO)
                    .console_log_settings_builder()
                    .with_log_format(console_log_format.unwrap_or_default().into())
                    .build()
            }))
            .with_file_output(file_log_directory.map(|log_directory| {
                let builder = Settings::builder()
                    .with_environment_variable(Self::FILE_LOG_LEVEL)
                    .with_default_level(LevelFilter::INFO)
                    .file_log_settings_builder(log_directory, Self::FILE_LOG_SUFFIX)
                    .with_rotation_period(file_log_rotation_period);
                let builder = match file_log_max_files {
                    Some(max_log_files) => builder.with_max_files(max_log_files),
                    None => builder,
                };
                builder.build()
            }))
            .build()
    }

    /// Initialize the configured tracing subscribers and install them as the global default.
    pub fn init(self) -> Result<Tracing> {
        let mut layers: Vec<Box<dyn Layer<Registry> + Sync + Send>> = Vec::new();

        if let ConsoleLogSettings::Enabled {
            common_settings,
            log_format,
        } = &self.console_log_settings
        {
            let env_filter_layer = env_filter_builder(
                common_settings.environment_variable,
                common_settings.default_level,
            );
            let console_output_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            layers.push(match log_format {
                Format::Plain => console_output_layer.with_filter(env_filter_layer).boxed(),
                Format::Json => console_output_layer
                    .json()
                    .with_filter(env_filter_layer)
                    .boxed(),
            });
        }

        if let FileLogSettings::Enabled {
            common_settings,
            file_log_dir,
            rotation_period,
            filename_suffix,
            max_log_files,
        } = &self.file_log_settings
        {
            let env_filter_layer = env_filter_builder(
                common_settings.environment_variable,
                common_settings.default_level,
            );

            let file_appender = RollingFileAppender::builder()
                .rotation(rotation_period.clone())
                .filename_prefix(self.service_name.to_string())
                .filename_suffix(filename_suffix);

            let file_appender = if let Some(max_log_files) = max_log_files {
                file_appender.max_log_files(*max_log_files)
            } else {
                file_appender
            };

            let file_appender = file_appender
                .build(file_log_dir)
                .context(InitRollingFileAppenderSnafu)?;

            layers.push(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(file_appender)
                    .with_filter(env_filter_layer)
                    .boxed(),
            );
        }

        if !layers.is_empty() {
            tracing::subscriber::set_global_default(tracing_subscriber::registry().with(layers))
                .context(SetGlobalDefaultSubscriberSnafu)?;
        }

        Ok(self)
    }
}

/// This trait is only used for the typestate builder and cannot be implemented
/// outside of this crate.
///
/// The only reason it has pub visibility is because it needs to be at least as
/// visible as the types that use it.
#[doc(hidden)]
pub trait BuilderState: private::Sealed {}

#[doc(hidden)]
mod private {
    use super::*;

    pub trait Sealed {}

    impl Sealed for builder_state::PreServiceName {}
    impl Sealed for builder_state::Config {}
}

/// This module holds the possible states that the builder is in.
#[doc(hidden)]
mod builder_state {
    /// The initial state, before the service name is set.
    #[derive(Default)]
    pub struct PreServiceName;

    /// The state that allows you to configure the supported [`Subscriber`][1]
    /// [`Layer`][2].
    ///
    /// [1]: tracing::Subscriber
    /// [2]: tracing_subscriber::layer::Layer
    #[derive(Default)]
    pub struct Config;
}

#[doc(hidden)]
impl BuilderState for builder_state::PreServiceName {}

#[doc(hidden)]
impl BuilderState for builder_state::Config {}

/// Makes it easy to build a valid [`Tracing`] instance.
#[derive(Default)]
pub struct TracingBuilder<S: BuilderState> {
    service_name: Option<&'static str>,
    console_log_settings: ConsoleLogSettings,
    file_log_settings: FileLogSettings,

    /// Allow the generic to be used (needed for impls).
    _marker: std::marker::PhantomData<S>,
}

impl TracingBuilder<builder_state::PreServiceName> {
    /// Set the service name, used as the prefix of log file names.
    pub fn service_name(self, service_name: &'static str) -> TracingBuilder<builder_state::Config> {
        TracingBuilder {
            service_name: Some(service_name),
            ..Default::default()
        }
    }
}

impl TracingBuilder<builder_state::Config> {
    /// Enable the console output tracing subscriber and set the default
    /// [`LevelFilter`] which is overridable through the given environment
    /// variable.
    pub fn with_console_output(
        self,
        console_log_settings: impl Into<ConsoleLogSettings>,
    ) -> TracingBuilder<builder_state::Config> {
        TracingBuilder {
            console_log_settings: console_log_settings.into(),
            ..self
        }
    }

    /// Enable the file output tracing subscriber and set the default
    /// [`LevelFilter`] which is overridable through the given environment
    /// variable.
    pub fn with_file_output(
        self,
        file_log_settings: impl Into<FileLogSettings>,
    ) -> TracingBuilder<builder_state::Config> {
        TracingBuilder {
            file_log_settings: file_log_settings.into(),
            ..self
        }
    }

    /// Consumes self and returns a valid [`Tracing`] instance.
    ///
    /// Once built, you can call [`Tracing::init`] to enable the configured
    /// tracing subscribers.
    pub fn build(self) -> Tracing {
        Tracing {
            service_name: self
                .service_name
                .expect("service_name must be configured at this point"),
            console_log_settings: self.console_log_settings,
            file_log_settings: self.file_log_settings,
        }
    }
}

/// Create an [`EnvFilter`] configured with the given environment variable and default [`Directive`].
fn env_filter_builder(env_var: &str, default_directive: impl Into<Directive>) -> EnvFilter {
    EnvFilter::builder()
        .with_env_var(env_var)
        .with_default_directive(default_directive.into())
        .from_env_lossy()
}

/// Contains options which can be passed to [`Tracing::pre_configured()`].
///
/// Additionally, this struct can be used as CLI arguments. This functionality is only
/// available if the feature `clap` is enabled.
///
#[cfg_attr(
    feature = "clap",
    doc = r#"
```
# use workload_planner_telemetry::tracing::TelemetryOptions;
use clap::Parser;

#[derive(Parser)]
struct Cli {
    #[arg(short, long)]
    inventory: String,

    #[clap(flatten)]
    telemetry_arguments: TelemetryOptions,
}
```
"#
)]
#[cfg_attr(feature = "clap", derive(clap::Args))]
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TelemetryOptions {
    /// Disable console logs.
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub console_log_disabled: bool,

    /// Format of console log events.
    #[cfg_attr(feature = "clap", arg(long, env, value_name = "FORMAT"))]
    pub console_log_format: Option<ConsoleLogFormat>,

    /// Enable logging to files located in the specified DIRECTORY.
    #[cfg_attr(
        feature = "clap",
        arg(long, env, value_name = "DIRECTORY", group = "file_log")
    )]
    pub file_log_directory: Option<PathBuf>,

    /// Time PERIOD after which log files are rolled over.
    #[cfg_attr(
        feature = "clap",
        arg(long, env, value_name = "PERIOD", requires = "file_log")
    )]
    pub file_log_rotation_period: Option<RotationPeriod>,

    /// Maximum number of rolled over log files to keep.
    #[cfg_attr(
        feature = "clap",
        arg(long, env, value_name = "COUNT", requires = "file_log")
    )]
    pub file_log_max_files: Option<usize>,
}

/// Supported periods when the log file is rolled over.
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[derive(Clone, Debug, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "PascalCase")]
#[allow(missing_docs)]
pub enum RotationPeriod {
    Minutely,
    Hourly,
    Daily,

    #[default]
    Never,
}

impl From<RotationPeriod> for Rotation {
    fn from(value: RotationPeriod) -> Self {
        match value {
            RotationPeriod::Minutely => Self::MINUTELY,
            RotationPeriod::Hourly => Self::HOURLY,
            RotationPeriod::Daily => Self::DAILY,
            RotationPeriod::Never => Self::NEVER,
        }
    }
}

/// Console log formats selectable from the command line.
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
#[allow(missing_docs)]
pub enum ConsoleLogFormat {
    #[default]
    Plain,
    Json,
}

impl From<ConsoleLogFormat> for Format {
    fn from(value: ConsoleLogFormat) -> Self {
        match value {
            ConsoleLogFormat::Plain => Self::Plain,
            ConsoleLogFormat::Json => Self::Json,
        }
    }
}

#[cfg(test)]
mod test {
    use std::{fs, path::PathBuf};

    use rstest::rstest;
    use settings::Settings;
    use tracing::level_filters::LevelFilter;
    use tracing_appender::rolling::Rotation;

    use super::*;

    #[test]
    fn builder_basic_construction() {
        let trace_guard = Tracing::builder().service_name("test").build();

        assert_eq!(trace_guard.service_name, "test");
        assert!(trace_guard.console_log_settings.is_disabled());
        assert!(trace_guard.file_log_settings.is_disabled());
    }

    #[test]
    fn builder_with_console_output() {
        let trace_guard = Tracing::builder()
            .service_name("test")
            .with_console_output(
                Settings::builder()
                    .with_environment_variable("ABC_A")
                    .with_default_level(LevelFilter::TRACE)
                    .build(),
            )
            .with_console_output(
                Settings::builder()
                    .with_environment_variable("ABC_B")
                    .with_default_level(LevelFilter::DEBUG)
                    .build(),
            )
            .build();

        assert_eq!(
            trace_guard.console_log_settings,
            ConsoleLogSettings::Enabled {
                common_settings: Settings {
                    environment_variable: "ABC_B",
                    default_level: LevelFilter::DEBUG
                },
                log_format: Format::Plain
            }
        );
        assert!(trace_guard.file_log_settings.is_disabled());
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn builder_with_console_output_triple(#[case] enabled: bool) {
        let trace_guard = Tracing::builder()
            .service_name("test")
            .with_console_output(("ABC_A", LevelFilter::TRACE, enabled))
            .build();

        let expected = if enabled {
            ConsoleLogSettings::Enabled {
                common_settings: Settings {
                    environment_variable: "ABC_A",
                    default_level: LevelFilter::TRACE,
                },
                log_format: Format::Plain,
            }
        } else {
            ConsoleLogSettings::Disabled
        };

        assert_eq!(trace_guard.console_log_settings, expected);
    }

    #[test]
    fn builder_with_all() {
        let trace_guard = Tracing::builder()
            .service_name("test")
            .with_console_output(
                Settings::builder()
                    .with_environment_variable("ABC_CONSOLE")
                    .with_default_level(LevelFilter::INFO)
                    .console_log_settings_builder()
                    .with_log_format(Format::Json)
                    .build(),
            )
            .with_file_output(
                Settings::builder()
                    .with_environment_variable("ABC_FILE")
                    .with_default_level(LevelFilter::INFO)
                    .file_log_settings_builder(PathBuf::from("/abc_file_dir"), "tracing-rs.json")
                    .build(),
            )
            .build();

        assert_eq!(
            trace_guard.console_log_settings,
            ConsoleLogSettings::Enabled {
                common_settings: Settings {
                    environment_variable: "ABC_CONSOLE",
                    default_level: LevelFilter::INFO
                },
                log_format: Format::Json
            }
        );
        assert_eq!(trace_guard.file_log_settings, FileLogSettings::Enabled {
            common_settings: Settings {
                environment_variable: "ABC_FILE",
                default_level: LevelFilter::INFO
            },
            file_log_dir: PathBuf::from("/abc_file_dir"),
            rotation_period: Rotation::NEVER,
            filename_suffix: "tracing-rs.json".to_owned(),
            max_log_files: None,
        });
    }

    #[test]
    fn pre_configured() {
        let tracing = Tracing::pre_configured("test", TelemetryOptions {
            console_log_disabled: true,
            console_log_format: None,
            file_log_directory: Some(PathBuf::from("/logs")),
            file_log_rotation_period: Some(RotationPeriod::Daily),
            file_log_max_files: Some(3),
        });

        assert!(tracing.console_log_settings.is_disabled());
        assert_eq!(tracing.file_log_settings, FileLogSettings::Enabled {
            common_settings: Settings {
                environment_variable: Tracing::FILE_LOG_LEVEL,
                default_level: LevelFilter::INFO
            },
            file_log_dir: PathBuf::from("/logs"),
            rotation_period: Rotation::DAILY,
            filename_suffix: Tracing::FILE_LOG_SUFFIX.to_owned(),
            max_log_files: Some(3),
        });
    }

    #[rstest]
    #[case("Hourly", RotationPeriod::Hourly)]
    #[case("Never", RotationPeriod::Never)]
    fn parse_rotation_period(#[case] input: &str, #[case] expected: RotationPeriod) {
        assert_eq!(input.parse::<RotationPeriod>().unwrap(), expected);
    }

    // The only test installing a global subscriber, keep it that way
    #[test]
    fn file_output_is_written() {
        let log_dir = tempfile::tempdir().unwrap();
        let _tracing_guard = Tracing::builder()
            .service_name("planner-test")
            .with_file_output(
                Settings::builder()
                    .with_environment_variable("PLANNER_TEST_FILE_LOG")
                    .with_default_level(LevelFilter::INFO)
                    .file_log_settings_builder(log_dir.path(), Tracing::FILE_LOG_SUFFIX)
                    .build(),
            )
            .build()
            .init()
            .unwrap();

        tracing::info!(hosts = 2, "generated deployment plan");

        let contents = fs::read_dir(log_dir.path())
            .unwrap()
            .map(|entry| fs::read_to_string(entry.unwrap().path()).unwrap())
            .collect::<String>();
        assert!(contents.contains("generated deployment plan"), "{contents}");
    }
}
