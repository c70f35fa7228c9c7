//! See [`Turnstile::verify`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// A client for Cloudflare Turnstile's server-side token validation.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Turnstile<'a> {
    /// The shared HTTP client.
    pub(crate) http: &'a reqwest::Client,

    /// The `siteverify` endpoint.
    pub(crate) url: &'a Url,

    /// The secret key shared with Turnstile.
    pub(crate) secret: &'a str,

    /// How long the request may take.
    pub(crate) timeout: Duration,
}

/// The form body of a `siteverify` request.
#[derive(Serialize, Debug)]
struct SiteverifyRequest<'a> {
    /// The secret key shared with Turnstile.
    secret: &'a str,

    /// The token the widget issued to the page.
    response: &'a str,

    /// The submitter's IP address, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    remoteip: Option<&'a str>,
}

/// Turnstile's verdict on a token.
#[derive(Deserialize, Clone, PartialEq, Eq, Debug)]
pub(crate) struct Verdict {
    /// Whether the token is valid.
    pub(crate) success: bool,

    /// Why the token was rejected, if it was.
    #[serde(default, rename = "error-codes")]
    pub(crate) error_codes: Vec<String>,
}

impl Turnstile<'_> {
    /// Exchanges a Turnstile token for a verdict on whether a person submitted it.
    ///
    /// # Errors
    ///
    /// Returns an error if the verification request fails, times out, returns an error status, or
    /// its response can't be parsed.
    pub(crate) async fn verify(
        &self,
        token: &str,
        remote_ip: Option<&str>,
    ) -> Result<Verdict, reqwest::Error> {
        self.http
            .post(self.url.clone())
            .timeout(self.timeout)
            .form(&SiteverifyRequest {
                secret: self.secret,
                response: token,
                remoteip: remote_ip,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}
