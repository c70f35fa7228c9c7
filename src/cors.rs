//! Cross-origin headers for the contact endpoint.
//!
//! The form is posted from the marketing site's own pages, so its origin (or any subdomain of it,
//! like a preview deployment) is echoed back. Every other origin gets the wildcard, which still lets
//! anonymous requests through but never grants credentials.

use axum::http::{
    header::{
        ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
        ACCESS_CONTROL_MAX_AGE, ORIGIN, VARY,
    },
    HeaderMap, HeaderValue,
};
use url::Url;

use crate::response::Response;

/// The methods the contact endpoint accepts.
pub(crate) const ALLOWED_METHODS: &str = "POST, OPTIONS";

/// The request headers a browser may send with a cross-origin submission.
const ALLOWED_HEADERS: &str = "content-type";

/// How long, in seconds, a browser may cache a preflight response.
const PREFLIGHT_MAX_AGE: &str = "86400";

/// The value of `Access-Control-Allow-Origin` for one request.
#[derive(Clone, PartialEq, Eq, Debug)]
pub(crate) enum AllowedOrigin {
    /// The request's origin is the site's own, so it's echoed back.
    Echo(HeaderValue),

    /// Any other (or a missing or malformed) origin.
    Any,
}

impl AllowedOrigin {
    /// Determines the allowed origin for a request from its `Origin` header, matching its hostname
    /// against `site_domain` exactly or as a parent domain.
    pub(crate) fn for_request(headers: &HeaderMap, site_domain: &str) -> Self {
        let Some(origin) = headers.get(ORIGIN) else {
            return Self::Any;
        };

        let host = origin
            .to_str()
            .ok()
            .and_then(|origin| Url::parse(origin).ok())
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase));

        match host {
            Some(host) if is_within_domain(&host, site_domain) => Self::Echo(origin.clone()),
            _ => Self::Any,
        }
    }

    /// Sets `Access-Control-Allow-Origin` (and `Vary` when the origin is echoed) on a response.
    pub(crate) fn apply(&self, response: &mut Response) {
        match self {
            Self::Echo(origin) => {
                response
                    .header(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone())
                    .header_valid(VARY, "origin");
            }
            Self::Any => {
                response.header_valid(ACCESS_CONTROL_ALLOW_ORIGIN, "*");
            }
        }
    }
}

/// Sets the headers advertising which methods and request headers are accepted.
pub(crate) fn advertise(response: &mut Response) {
    response
        .header_valid(ACCESS_CONTROL_ALLOW_METHODS, ALLOWED_METHODS)
        .header_valid(ACCESS_CONTROL_ALLOW_HEADERS, ALLOWED_HEADERS);
}

/// Sets the headers of a response to a preflight request.
pub(crate) fn preflight(response: &mut Response) {
    advertise(response);
    response.header_valid(ACCESS_CONTROL_MAX_AGE, PREFLIGHT_MAX_AGE);
}

/// Returns whether `host` is `domain` or one of its subdomains, ignoring ASCII case.
fn is_within_domain(host: &str, domain: &str) -> bool {
    let domain = domain.trim_start_matches('.');

    if domain.is_empty() {
        return false;
    }

    if host.eq_ignore_ascii_case(domain) {
        return true;
    }

    host.len() > domain.len()
        && host
            .get(host.len() - domain.len()..)
            .is_some_and(|suffix| suffix.eq_ignore_ascii_case(domain))
        && host.as_bytes()[host.len() - domain.len() - 1] == b'.'
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE: &str = "hazardcleanup.ca";

    fn origin_of(origin: &str) -> AllowedOrigin {
        let mut headers = HeaderMap::new();
        headers.insert(ORIGIN, HeaderValue::from_str(origin).expect("origin should be valid"));

        AllowedOrigin::for_request(&headers, SITE)
    }

    #[test]
    fn site_origins_echoed() {
        let allowed = [
            "https://hazardcleanup.ca",
            "https://www.hazardcleanup.ca",
            "https://preview.www.hazardcleanup.ca:8443",
            "http://HazardCleanup.CA",
        ];

        for origin in allowed {
            assert_eq!(
                origin_of(origin),
                AllowedOrigin::Echo(HeaderValue::from_str(origin).expect("origin should be valid")),
                "{origin} should be echoed",
            );
        }
    }

    #[test]
    fn foreign_origins_get_wildcard() {
        let foreign = [
            "https://evil.example",
            "https://nothazardcleanup.ca",
            "https://hazardcleanup.ca.evil.example",
            "null",
            "not a url",
        ];

        for origin in foreign {
            assert_eq!(origin_of(origin), AllowedOrigin::Any, "{origin} shouldn't be echoed");
        }
    }

    #[test]
    fn missing_origin_gets_wildcard() {
        assert_eq!(
            AllowedOrigin::for_request(&HeaderMap::new(), SITE),
            AllowedOrigin::Any,
            "a request without an origin shouldn't be echoed",
        );
    }

    #[test]
    fn empty_domain_matches_nothing() {
        assert!(!is_within_domain("hazardcleanup.ca", ""), "empty domain should match nothing");
        assert!(!is_within_domain("ca", "."), "a lone dot should match nothing");
    }
}
