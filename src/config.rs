//! Service configuration, resolved once at startup from a [`ConfigSource`].
//!
//! Required keys:
//!
//! - `TURNSTILE_SECRET_KEY` - the secret shared with the bot verification service
//! - `POSTMARK_SERVER_TOKEN` - the email provider's server token
//! - `EMAIL_FROM` - the mailbox leads are sent from (must be a verified sender)
//! - `EMAIL_TO` - the mailbox leads are delivered to
//!
//! A missing required key doesn't stop the service from starting. Instead, submissions are answered
//! with `server_misconfigured` until it's fixed, so the site's form fails visibly rather than the
//! whole endpoint disappearing.
//!
//! Optional keys: `POSTMARK_MESSAGE_STREAM`, `STRICT_CONTACT`, `SITE_DOMAIN`, `SITE_TIME_ZONE`,
//! `TURNSTILE_VERIFY_URL`, `POSTMARK_API_URL` and `OUTBOUND_TIMEOUT_SECS`.

use std::{
    collections::HashMap,
    fmt::{self, Debug, Formatter},
    hash::BuildHasher,
    time::Duration,
};

use chrono_tz::Tz;
use lettre::message::Mailbox;
use thiserror::Error;
use url::Url;

/// Where the bot verification service lives unless overridden.
pub const DEFAULT_TURNSTILE_VERIFY_URL: &str =
    "https://challenges.cloudflare.com/turnstile/v0/siteverify";

/// Where the email provider's single-message endpoint lives unless overridden.
pub const DEFAULT_POSTMARK_API_URL: &str = "https://api.postmarkapp.com/email";

/// The message stream leads are sent through unless overridden.
pub const DEFAULT_MESSAGE_STREAM: &str = "outbound";

/// The site's domain unless overridden. Origins on it or its subdomains are echoed in CORS headers.
pub const DEFAULT_SITE_DOMAIN: &str = "hazardcleanup.ca";

/// The time zone submission timestamps are rendered in unless overridden.
pub const DEFAULT_TIME_ZONE: Tz = Tz::America__Toronto;

/// How long each outbound call may take unless overridden.
pub const DEFAULT_OUTBOUND_TIMEOUT: Duration = Duration::from_secs(10);

/// The keys that must be present for a submission to be processed.
const REQUIRED_KEYS: [&str; 4] = [
    "TURNSTILE_SECRET_KEY",
    "POSTMARK_SERVER_TOKEN",
    "EMAIL_FROM",
    "EMAIL_TO",
];

/// A capability to look up configuration values by key.
///
/// Empty values are treated the same as absent ones.
pub trait ConfigSource {
    /// Gets the value for a key, if it's set.
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads configuration from the process environment, after loading a `.env` file if one exists.
#[derive(Clone, Copy, Default, Debug)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        dotenvy::var(key).ok()
    }
}

impl<S: BuildHasher> ConfigSource for HashMap<String, String, S> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// The options that change how submissions are handled.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ContactOptions {
    /// Whether a delivery failure is reported to the submitter instead of only being logged.
    pub strict_delivery: bool,

    /// The site's domain. Origins on it or its subdomains are echoed in CORS headers.
    pub allowed_origin_suffix: String,

    /// The email provider's message stream leads are sent through.
    pub message_stream: String,
}

impl Default for ContactOptions {
    fn default() -> Self {
        Self {
            strict_delivery: false,
            allowed_origin_suffix: DEFAULT_SITE_DOMAIN.into(),
            message_stream: DEFAULT_MESSAGE_STREAM.into(),
        }
    }
}

/// The secrets and mailboxes needed to process a submission.
#[derive(Clone)]
pub struct Credentials {
    /// The secret shared with the bot verification service.
    pub turnstile_secret: String,

    /// The email provider's server token.
    pub postmark_token: String,

    /// The mailbox leads are sent from.
    pub from: Mailbox,

    /// The mailbox leads are delivered to.
    pub to: Mailbox,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("turnstile_secret", &"***")
            .field("postmark_token", &"***")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

/// The required keys that were missing or unusable when [`Credentials`] were resolved.
#[derive(Error, Clone, PartialEq, Eq, Debug)]
#[error("missing or invalid configuration: {}", .0.join(", "))]
pub struct MissingCredentials(pub Vec<&'static str>);

/// Everything the service needs to handle requests.
#[derive(Clone, Debug)]
pub struct Settings {
    /// The options that change how submissions are handled.
    pub options: ContactOptions,

    /// The resolved credentials, or which required keys were missing.
    pub credentials: Result<Credentials, MissingCredentials>,

    /// The time zone submission timestamps are rendered in.
    pub time_zone: Tz,

    /// The bot verification service's endpoint.
    pub turnstile_verify_url: Url,

    /// The email provider's single-message endpoint.
    pub postmark_api_url: Url,

    /// How long each outbound call may take.
    pub outbound_timeout: Duration,
}

/// An error resolving [`Settings`] from an optional key with an unusable value.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// `SITE_TIME_ZONE` isn't an IANA time zone name.
    #[error("`SITE_TIME_ZONE` isn't a known time zone: {0}")]
    TimeZone(String),

    /// `OUTBOUND_TIMEOUT_SECS` isn't a positive whole number.
    #[error("`OUTBOUND_TIMEOUT_SECS` should be a positive whole number, got {0:?}")]
    Timeout(String),

    /// An endpoint override isn't a valid absolute URL.
    #[error("`{key}` isn't a valid URL: {source}")]
    Url {
        /// The key holding the URL.
        key: &'static str,

        /// Why the URL couldn't be parsed.
        source: url::ParseError,
    },
}

impl Settings {
    /// Resolves settings from a configuration source.
    ///
    /// # Errors
    ///
    /// Returns an error if an optional key is set to an unusable value. Missing required keys
    /// aren't an error here; see [`Settings::credentials`].
    pub fn resolve<S: ConfigSource + ?Sized>(source: &S) -> Result<Self, Error> {
        let get = |key: &str| source.get(key).filter(|value| !value.is_empty());

        let options = ContactOptions {
            strict_delivery: get("STRICT_CONTACT").is_some_and(|value| is_truthy(&value)),
            allowed_origin_suffix: get("SITE_DOMAIN")
                .unwrap_or_else(|| DEFAULT_SITE_DOMAIN.into()),
            message_stream: get("POSTMARK_MESSAGE_STREAM")
                .unwrap_or_else(|| DEFAULT_MESSAGE_STREAM.into()),
        };

        let time_zone = match get("SITE_TIME_ZONE") {
            Some(name) => name.parse::<Tz>().map_err(|_| Error::TimeZone(name))?,
            None => DEFAULT_TIME_ZONE,
        };

        let outbound_timeout = match get("OUTBOUND_TIMEOUT_SECS") {
            Some(value) => match value.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(Error::Timeout(value)),
            },
            None => DEFAULT_OUTBOUND_TIMEOUT,
        };

        let url = |key: &'static str, default: &str| {
            let value = get(key);
            Url::parse(value.as_deref().unwrap_or(default))
                .map_err(|source| Error::Url { key, source })
        };

        Ok(Self {
            options,
            credentials: resolve_credentials(&get),
            time_zone,
            turnstile_verify_url: url("TURNSTILE_VERIFY_URL", DEFAULT_TURNSTILE_VERIFY_URL)?,
            postmark_api_url: url("POSTMARK_API_URL", DEFAULT_POSTMARK_API_URL)?,
            outbound_timeout,
        })
    }

    /// Returns whether every required key was resolved.
    pub fn is_configured(&self) -> bool {
        self.credentials.is_ok()
    }

    /// Logs a summary of the settings without any secret values.
    pub fn log_summary(&self) {
        tracing::info!(
            strict_delivery = self.options.strict_delivery,
            site_domain = %self.options.allowed_origin_suffix,
            message_stream = %self.options.message_stream,
            time_zone = %self.time_zone,
            outbound_timeout_secs = self.outbound_timeout.as_secs(),
            "configuration loaded",
        );

        match &self.credentials {
            Ok(credentials) => {
                tracing::info!(from = %credentials.from, to = %credentials.to, "leads will be emailed");
            }
            Err(missing) => {
                tracing::error!(
                    missing = ?missing.0,
                    "submissions will be refused until required configuration is set",
                );
            }
        }
    }
}

/// Resolves the required keys, collecting every one that's missing or (for mailboxes) unparseable.
fn resolve_credentials<F>(get: &F) -> Result<Credentials, MissingCredentials>
where
    F: Fn(&str) -> Option<String>,
{
    let [turnstile_key, postmark_key, from_key, to_key] = REQUIRED_KEYS;
    let mut missing = Vec::new();

    let turnstile_secret = get(turnstile_key);
    let postmark_token = get(postmark_key);
    let from = get(from_key).and_then(|value| value.parse::<Mailbox>().ok());
    let to = get(to_key).and_then(|value| value.parse::<Mailbox>().ok());

    for (key, present) in [
        (turnstile_key, turnstile_secret.is_some()),
        (postmark_key, postmark_token.is_some()),
        (from_key, from.is_some()),
        (to_key, to.is_some()),
    ] {
        if !present {
            missing.push(key);
        }
    }

    match (turnstile_secret, postmark_token, from, to) {
        (Some(turnstile_secret), Some(postmark_token), Some(from), Some(to)) => Ok(Credentials {
            turnstile_secret,
            postmark_token,
            from,
            to,
        }),
        _ => Err(MissingCredentials(missing)),
    }
}

/// Returns whether a flag value means "enabled".
fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}
