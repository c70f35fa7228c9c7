//! Serves the lead intake API.

use lead_intake::{config::EnvSource, AppState, Settings};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// The address to listen on if `ADDRESS` isn't set.
const DEFAULT_ADDRESS: &str = "127.0.0.1:8787";

/// # Errors
///
/// See implementation.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loaded here too so `RUST_LOG` and `LOG_FORMAT` can come from `.env`.
    _ = dotenvy::dotenv();

    init_tracing(dotenvy::var("LOG_FORMAT").is_ok_and(|format| format == "json"));

    let settings = Settings::resolve(&EnvSource)?;
    settings.log_summary();

    let address = dotenvy::var("ADDRESS").unwrap_or_else(|_| DEFAULT_ADDRESS.into());
    let listener = TcpListener::bind(&address).await?;

    tracing::info!("listening on http://{address}");

    axum::serve(listener, lead_intake::router(AppState::new(settings))).await?;

    Ok(())
}

/// Installs the global tracing subscriber, filtered by `RUST_LOG` (default `info`).
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().compact())
            .init();
    }
}
