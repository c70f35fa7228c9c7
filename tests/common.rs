//! Common code for integration tests

#![allow(dead_code, reason = "each test crate uses a different subset of these helpers")]

use std::{
    collections::HashMap,
    io::{self, Write},
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::Error;
use axum::{
    body::{self, Body},
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use httpmock::MockServer;
use lead_intake::{AppState, Settings};
use serde_json::Value;
use tower::ServiceExt;
use tracing::{subscriber::DefaultGuard, Level};

/// The site origin the service treats as its own by default.
pub const SITE_ORIGIN: &str = "https://hazardcleanup.ca";

/// The path the mock bot verification service answers on.
pub const SITEVERIFY_PATH: &str = "/turnstile/v0/siteverify";

/// The path the mock email provider answers on.
pub const EMAIL_PATH: &str = "/email";

/// Starts a mock server standing in for both the bot verification service and the email provider.
pub async fn start_services() -> MockServer {
    MockServer::start_async().await
}

/// Configuration with every required key set, pointing outbound calls at `services`.
pub fn configuration(services: &MockServer) -> HashMap<String, String> {
    [
        ("TURNSTILE_SECRET_KEY", "turnstile-secret"),
        ("POSTMARK_SERVER_TOKEN", "server-token"),
        ("EMAIL_FROM", "website@hazardcleanup.ca"),
        ("EMAIL_TO", "help@hazardcleanup.ca"),
        ("TURNSTILE_VERIFY_URL", &services.url(SITEVERIFY_PATH)),
        ("POSTMARK_API_URL", &services.url(EMAIL_PATH)),
        ("OUTBOUND_TIMEOUT_SECS", "5"),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_owned(), value.to_owned()))
    .collect()
}

/// Builds the service's router from configuration.
pub fn router(configuration: &HashMap<String, String>) -> Result<Router, Error> {
    let settings = Settings::resolve(configuration)?;

    Ok(lead_intake::router(AppState::new(settings)))
}

/// A `POST /api/contact` request from the site with a JSON body.
pub fn submission(json: &str) -> Request<Body> {
    contact_request(Method::POST, Some(SITE_ORIGIN), Body::from(json.to_owned()))
}

/// A request to the contact endpoint.
pub fn contact_request(method: Method, origin: Option<&str>, body: Body) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri("/api/contact")
        .header("content-type", "application/json");

    if let Some(origin) = origin {
        builder = builder.header("origin", origin);
    }

    builder.body(body).expect("request should be valid")
}

/// A response, read in full.
#[derive(Debug)]
pub struct Reply {
    /// The response's status.
    pub status: StatusCode,

    /// The response's headers.
    pub headers: HeaderMap,

    /// The response's body.
    pub body: Vec<u8>,
}

impl Reply {
    /// Parses the body as JSON.
    pub fn json(&self) -> Result<Value, Error> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Gets a header's value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// Sends a request through the router and reads the whole response.
pub async fn send(router: Router, request: Request<Body>) -> Result<Reply, Error> {
    let response = router.oneshot(request).await?;
    let status = response.status();
    let headers = response.headers().clone();
    let body = body::to_bytes(response.into_body(), usize::MAX).await?;

    Ok(Reply {
        status,
        headers,
        body: body.to_vec(),
    })
}

/// Log output captured from the current thread, as plain text.
#[derive(Clone, Default, Debug)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Captures every `INFO` or more severe event on the current thread until the guard is dropped.
    ///
    /// Only events emitted on the calling thread are seen, so use a current-thread runtime.
    pub fn start() -> (Self, DefaultGuard) {
        let logs = Self::default();
        let writer = logs.clone();

        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        (logs, tracing::subscriber::set_default(subscriber))
    }

    /// Gets everything logged so far.
    pub fn contents(&self) -> String {
        let buffer = self.0.lock().unwrap_or_else(PoisonError::into_inner);

        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(bytes);

        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
