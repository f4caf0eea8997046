use clap::Parser;
use quickeval::app::App;
use quickeval::cli::Args;
use quickeval::config::Config;
use quickeval::logging::setup_logging;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config and setup logging before anything else so startup logs are never dropped
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::FAILURE;
        }
    };
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT_SHORT"),
        portal = config.portal_url.as_str(),
        "starting quickeval"
    );

    let app = match App::new(args, &config) {
        Ok(app) => app,
        Err(e) => {
            error!(error = format!("{e:#}"), "Failed to initialize application");
            return ExitCode::FAILURE;
        }
    };
    app.run().await
}
