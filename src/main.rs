// Entrypoint for the CLI application.
// - Keeps `main` small: set up logging, build the API client and hand it
//   to the prompt sequence.
// - Any failure propagates here and ends the process with a non-zero code.

use gh_raw_uploader::{api::ApiClient, ui::run_interactive};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    // Quiet by default so log lines don't interleave with the prompts;
    // RUST_LOG=gh_raw_uploader=debug shows each request.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Hosts come from GITHUB_API_URL / GITHUB_RAW_URL or default to github.com.
    let api = ApiClient::from_env()?;

    run_interactive(&api, api.config())?;
    Ok(())
}
