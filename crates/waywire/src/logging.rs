use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Environment variable holding filter directives that replace `--log-level`.
pub const LOG_ENV: &str = "WAYWIRE_LOG";

const OWN_TARGETS: [&str; 4] = [
    "waywire",
    "waywire_transport",
    "waywire_frame",
    "waywire_relay",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// `level` for the waywire crates, at most `warn` for everything else.
fn default_directives(level: LogLevel) -> String {
    let mut directives = level.min(LogLevel::Warn).as_str().to_string();
    for target in OWN_TARGETS {
        directives.push(',');
        directives.push_str(target);
        directives.push('=');
        directives.push_str(level.as_str());
    }
    directives
}

/// Directives from the environment when they parse, the level otherwise.
fn filter_directives(level: LogLevel, env: Option<&str>) -> String {
    match env.map(str::trim).filter(|d| !d.is_empty()) {
        Some(custom) if EnvFilter::try_new(custom).is_ok() => custom.to_string(),
        _ => default_directives(level),
    }
}

/// Logs go to stderr so observed traffic on stdout stays machine readable.
/// Relay sessions log inside a `session` span; JSON output carries it as
/// `span.id`.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let env = std::env::var(LOG_ENV).ok();
    let filter = EnvFilter::new(filter_directives(level, env.as_deref()));

    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(true);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .try_init();
        }
    }
}
