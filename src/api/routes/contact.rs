//! The contact form endpoint, which turns a submission into a lead email.
//!
//! Each step either passes the submission on or ends the request, and nothing reaches a paid
//! third-party service without clearing every cheaper check first.

use axum::{
    body::{self, Body},
    extract::{Request, State},
    http::{header::ALLOW, HeaderMap, Method, StatusCode},
};
use axum_macros::debug_handler;
use chrono::Utc;

use crate::{
    api::{
        self,
        captcha::Turnstile,
        validation::{Lead, LeadSubmission},
        Reply,
    },
    cors::{self, AllowedOrigin},
    email::{Delivery, LeadDetails, OutboundEmail, Postmark},
    response::Response,
    AppState,
};

/// The largest request body that will be read. Real submissions are far smaller.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// The header Cloudflare puts the connecting client's IP address in. Cloudflare overwrites any
/// value the client sends, unlike `X-Forwarded-For`, which is appended to.
const CF_CONNECTING_IP: &str = "cf-connecting-ip";

/// Handles every request to the contact endpoint: CORS preflights, submissions, and anything else.
#[debug_handler]
pub(crate) async fn handle(State(state): State<AppState>, request: Request) -> Response {
    let allowed_origin = AllowedOrigin::for_request(
        request.headers(),
        &state.settings.options.allowed_origin_suffix,
    );

    let mut response = Response::new();
    allowed_origin.apply(&mut response);

    match *request.method() {
        Method::POST => {}
        Method::OPTIONS => {
            cors::preflight(&mut response);
            response.status(StatusCode::NO_CONTENT);

            return response;
        }
        _ => {
            response.header_valid(ALLOW, cors::ALLOWED_METHODS);

            return response.plain_error(StatusCode::METHOD_NOT_ALLOWED);
        }
    }

    cors::advertise(&mut response);

    match submit(&state, request).await {
        Ok(()) => response.json(StatusCode::OK, &Reply::OK),
        Err(error) => response.json(error.status(), &error.into_reply()),
    }
}

/// Runs a submission through every check and sends the lead email.
///
/// A honeypot hit counts as success, so bots can't tell they were caught.
///
/// # Errors
///
/// See [`api::Error`]. Delivery failures are only returned in strict mode.
async fn submit(state: &AppState, request: Request) -> Result<(), api::Error> {
    let (parts, body) = request.into_parts();
    let remote_ip = client_ip(&parts.headers);

    let submission = read_submission(body).await.inspect_err(|_| {
        tracing::warn!(remote_ip, "refused submission that isn't a JSON object of strings");
    })?;

    if submission.is_bot() {
        tracing::info!(remote_ip, "discarded submission that filled in the honeypot");
        return Ok(());
    }

    let turnstile_token = submission.turnstile_token().to_owned();
    let lead = Lead::try_from(submission).inspect_err(|_| {
        tracing::warn!(remote_ip, "refused submission without a name and phone number");
    })?;

    let settings = &state.settings;

    let credentials = settings.credentials.as_ref().map_err(|missing| {
        tracing::error!(missing = ?missing.0, "refused submission: {missing}");
        api::Error::ServerMisconfigured
    })?;

    if turnstile_token.is_empty() {
        tracing::warn!(remote_ip, "refused submission without a bot verification token");
        return Err(api::Error::TurnstileFailed);
    }

    let turnstile = Turnstile {
        http: &state.http,
        url: &settings.turnstile_verify_url,
        secret: &credentials.turnstile_secret,
        timeout: settings.outbound_timeout,
    };

    match turnstile.verify(&turnstile_token, remote_ip).await {
        Ok(verdict) if verdict.success => {}
        Ok(verdict) => {
            tracing::warn!(
                remote_ip,
                error_codes = ?verdict.error_codes,
                "bot verification rejected submission",
            );
            return Err(api::Error::TurnstileFailed);
        }
        Err(error) => {
            tracing::error!(remote_ip, %error, "bot verification request failed");
            return Err(api::Error::TurnstileError);
        }
    }

    let details = LeadDetails::new(&lead, remote_ip, Utc::now(), settings.time_zone);
    let email = OutboundEmail::for_lead(
        &lead,
        &details,
        &credentials.from,
        &credentials.to,
        &settings.options.message_stream,
    )
    .inspect_err(|error| tracing::error!(%error, "lead email couldn't be rendered"))?;

    let postmark = Postmark {
        http: &state.http,
        url: &settings.postmark_api_url,
        token: &credentials.postmark_token,
        timeout: settings.outbound_timeout,
    };

    let strict = settings.options.strict_delivery;

    // These log lines are the only record of a lead that wasn't delivered, so they carry the lead.
    match postmark.send(&email).await {
        Ok(Delivery::Accepted { message_id }) => {
            tracing::info!(message_id, "lead email accepted");
        }
        Ok(Delivery::Rejected { status, details }) => {
            tracing::error!(
                %status,
                %details,
                name = lead.name.as_str(),
                phone = lead.phone.as_str(),
                "lead email rejected",
            );

            if strict {
                return Err(api::Error::PostmarkRejected { details });
            }
        }
        Err(error) => {
            tracing::error!(
                %error,
                name = lead.name.as_str(),
                phone = lead.phone.as_str(),
                "lead email request failed",
            );

            if strict {
                return Err(api::Error::PostmarkFetchError);
            }
        }
    }

    Ok(())
}

/// Reads and parses the request body.
///
/// # Errors
///
/// Returns [`api::Error::InvalidJson`] if the body is too large, can't be read, or isn't a valid
/// submission.
async fn read_submission(body: Body) -> Result<LeadSubmission, api::Error> {
    let bytes = body::to_bytes(body, MAX_BODY_BYTES).await.map_err(|error| {
        tracing::debug!(%error, "couldn't read submission body");
        api::Error::InvalidJson
    })?;

    LeadSubmission::parse(&bytes)
}

/// Gets the submitter's IP address as reported by Cloudflare, if the request came through it.
fn client_ip(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(CF_CONNECTING_IP)
        .and_then(|ip| ip.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
}
