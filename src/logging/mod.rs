use crate::cli::TracingFormat;
use crate::config::Config;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` wins, otherwise dependencies stay at `warn`
/// and this crate logs at the configured level.
fn build_filter(config: &Config) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let base_level = &config.log_level;
        EnvFilter::new(format!("warn,quickeval={base_level}"))
    })
}

/// Configure and initialize logging for the application.
///
/// Logs go to stderr so they never interleave with the interactive prompts
/// on stdout.
pub fn setup_logging(config: &Config, tracing_format: TracingFormat) {
    let filter = build_filter(config);

    match tracing_format {
        TracingFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_target(true)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        TracingFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_target(true)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }
}
