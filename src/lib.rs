//! The lead intake service behind the site's contact form.
//!
//! A submission is accepted only after it passes a honeypot check, has a name and phone number, and
//! clears Cloudflare Turnstile. Accepted submissions are emailed to the business through Postmark.
//! Nothing is stored.

pub mod api;
pub mod config;
mod cors;
pub mod email;
mod response;

use std::sync::Arc;

pub use api::routes::router;
pub use config::Settings;

/// The state shared by every request handler.
#[derive(Clone, Debug)]
pub struct AppState {
    /// The settings resolved at startup.
    pub settings: Arc<Settings>,

    /// The HTTP client used for every outbound call.
    pub http: reqwest::Client,
}

impl AppState {
    /// Constructs the shared state with a new HTTP client.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
            http: reqwest::Client::new(),
        }
    }
}
