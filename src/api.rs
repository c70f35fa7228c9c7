//! The HTTP API the site's contact form posts to.

pub(crate) mod captcha;
pub mod routes;
pub mod validation;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// The body of every JSON response from the API.
#[derive(Serialize, Clone, PartialEq, Debug)]
pub struct Reply {
    /// Whether the request succeeded, as far as the submitter is concerned.
    pub ok: bool,

    /// The error code, if the request failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,

    /// Diagnostic details, for errors that have them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl Reply {
    /// A successful reply.
    pub const OK: Self = Self {
        ok: true,
        error: None,
        details: None,
    };
}

/// An API error. Each variant has a stable code the site's script can match on.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The request body isn't a JSON object of strings.
    #[error("request body isn't valid JSON")]
    InvalidJson,

    /// The name or phone number is missing.
    #[error("name and phone number are required")]
    MissingFields,

    /// The bot verification service judged the submitter to be a bot.
    #[error("bot verification failed")]
    TurnstileFailed,

    /// The bot verification service couldn't be reached or gave an unreadable answer.
    #[error("bot verification couldn't be completed")]
    TurnstileError,

    /// Required configuration is missing, so submissions can't be processed.
    #[error("server is missing required configuration")]
    ServerMisconfigured,

    /// The email provider refused the lead. Only surfaced in strict mode.
    #[error("email provider rejected the message")]
    PostmarkRejected {
        /// The email provider's explanation.
        details: Value,
    },

    /// The email provider couldn't be reached. Only surfaced in strict mode.
    #[error("email provider couldn't be reached")]
    PostmarkFetchError,

    /// The lead email couldn't be rendered.
    #[error("lead email couldn't be rendered: {0}")]
    Render(#[from] askama::Error),

    /// There's no API route at the requested path.
    #[error("route not found")]
    RouteNotFound,
}

impl Error {
    /// Gets the error's code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidJson => "invalid_json",
            Self::MissingFields => "missing_fields",
            Self::TurnstileFailed => "turnstile_failed",
            Self::TurnstileError => "turnstile_error",
            Self::ServerMisconfigured => "server_misconfigured",
            Self::PostmarkRejected { .. } => "postmark_rejected",
            Self::PostmarkFetchError => "postmark_fetch_error",
            Self::Render(_) => "server_error",
            Self::RouteNotFound => "not_found",
        }
    }

    /// Gets the HTTP status code corresponding to the error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidJson
            | Self::MissingFields
            | Self::TurnstileFailed
            | Self::TurnstileError => StatusCode::BAD_REQUEST,
            Self::ServerMisconfigured | Self::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::PostmarkRejected { .. } | Self::PostmarkFetchError => StatusCode::BAD_GATEWAY,
            Self::RouteNotFound => StatusCode::NOT_FOUND,
        }
    }

    /// Converts the error into the JSON body sent to the client.
    pub fn into_reply(self) -> Reply {
        let code = self.code();

        let details = match self {
            Self::PostmarkRejected { details } => Some(details),
            _ => None,
        };

        Reply {
            ok: false,
            error: Some(code),
            details,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.status(), Json(self.into_reply())).into_response()
    }
}
