//! Parsing and validation of contact form submissions.

use std::str::FromStr;

use derive_more::derive::{AsRef, Deref, Display};
use idna::uts46::{self, Uts46};
use lettre::Address;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::api;

/// The most characters of a description that are passed on in a lead email.
pub const DESCRIPTION_MAX_CHARS: usize = 4000;

/// A contact form submission as posted by the site's form.
///
/// Every field is optional at this stage so an incomplete submission can be rejected with
/// `missing_fields` rather than `invalid_json`. Absent and `null` fields are treated as empty.
/// The honeypot may hold any JSON value, since bots fill it in with whatever they like.
#[derive(Deserialize, Default, Clone, PartialEq, Eq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LeadSubmission {
    /// The submitter's name.
    #[serde(default)]
    pub name: Option<String>,

    /// The submitter's phone number.
    #[serde(default)]
    pub phone: Option<String>,

    /// The submitter's email address.
    #[serde(default)]
    pub email: Option<String>,

    /// The kind of service requested.
    #[serde(default)]
    pub service: Option<String>,

    /// Details about the request.
    #[serde(default)]
    pub description: Option<String>,

    /// A field hidden from people. Anything filling it in is a bot.
    #[serde(default)]
    pub website: Option<Value>,

    /// The bot verification token issued to the page.
    #[serde(default)]
    pub turnstile_token: Option<String>,
}

impl LeadSubmission {
    /// Parses a request body, which must be a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`api::Error::InvalidJson`] if the body isn't a JSON object or a known field isn't a
    /// string or `null`. A filled-in honeypot is never an error, whatever else the body holds, so
    /// bots always look successful.
    pub fn parse(body: &[u8]) -> Result<Self, api::Error> {
        let Ok(Value::Object(mut object)) = serde_json::from_slice(body) else {
            return Err(api::Error::InvalidJson);
        };

        if object.get("website").is_some_and(is_filled_in) {
            return Ok(Self {
                website: object.remove("website"),
                ..Self::default()
            });
        }

        serde_json::from_value(Value::Object(object)).map_err(|_| api::Error::InvalidJson)
    }

    /// Returns whether the honeypot field was filled in.
    pub fn is_bot(&self) -> bool {
        self.website.as_ref().is_some_and(is_filled_in)
    }

    /// Gets the bot verification token, or an empty string if none was submitted.
    pub fn turnstile_token(&self) -> &str {
        self.turnstile_token.as_deref().unwrap_or_default()
    }
}

/// A submission that has every required field.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Lead {
    /// The submitter's name, trimmed.
    pub name: RequiredText,

    /// The submitter's phone number, trimmed.
    pub phone: RequiredText,

    /// The submitter's email address as typed, trimmed, if any was given.
    pub email: Option<String>,

    /// The submitter's email address, if it's one replies can be sent to.
    pub reply_to: Option<ReplyAddress>,

    /// The kind of service requested, trimmed, if any was given.
    pub service: Option<String>,

    /// Details about the request, if any were given.
    pub description: Option<String>,
}

impl TryFrom<LeadSubmission> for Lead {
    type Error = api::Error;

    fn try_from(submission: LeadSubmission) -> Result<Self, Self::Error> {
        let name = RequiredText::try_from(submission.name.unwrap_or_default());
        let phone = RequiredText::try_from(submission.phone.unwrap_or_default());

        let (Ok(name), Ok(phone)) = (name, phone) else {
            return Err(api::Error::MissingFields);
        };

        let email = non_blank(submission.email);
        let reply_to = email.as_deref().and_then(|email| email.parse().ok());

        Ok(Self {
            name,
            phone,
            email,
            reply_to,
            service: non_blank(submission.service),
            description: submission
                .description
                .filter(|description| !description.trim().is_empty()),
        })
    }
}

/// Returns whether a form value counts as filled in: anything but `null`, `false`, zero, or an empty
/// string.
fn is_filled_in(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(value) => *value,
        Value::Number(number) => number.as_f64().is_some_and(|number| number != 0.0),
        Value::String(string) => !string.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Trims an optional string, discarding it if nothing is left.
fn non_blank(text: Option<String>) -> Option<String> {
    text.map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
}

/// Returns the longest prefix of `text` with at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// A [`String`] newtype that guarantees it's trimmed and nonempty.
#[derive(Deref, AsRef, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[as_ref(forward)]
pub struct RequiredText(String);

/// An error constructing a [`RequiredText`].
#[derive(Error, Clone, Copy, PartialEq, Eq, Debug)]
#[error("text is empty or only whitespace")]
pub struct BlankTextError;

impl TryFrom<String> for RequiredText {
    type Error = BlankTextError;

    fn try_from(string: String) -> Result<Self, Self::Error> {
        let trimmed = string.trim();

        if trimmed.is_empty() {
            return Err(BlankTextError);
        }

        if trimmed.len() == string.len() {
            Ok(Self(string))
        } else {
            Ok(Self(trimmed.to_owned()))
        }
    }
}

/// An email address a reply can be sent to. Requires a domain name rather than an IP address, and
/// normalizes the domain name (for non-ASCII characters).
#[derive(Deref, AsRef, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[as_ref(forward)]
pub struct ReplyAddress(Address);

impl ReplyAddress {
    /// The maximum length of a [`ReplyAddress`].
    ///
    /// As per RFC 3696 erratum 1690, the theoretical maximum is 254.
    pub const MAX_LENGTH: usize = 254;

    /// Gets a reference to the email address string.
    pub fn as_str(&self) -> &str {
        self.as_ref()
    }
}

/// An error constructing a [`ReplyAddress`].
#[derive(Error, Copy, Clone, PartialEq, Eq, Debug)]
#[non_exhaustive]
pub enum ReplyAddressError {
    /// The email address was invalid.
    #[error("invalid email address")]
    Invalid,

    /// The domain part was an IP address rather than a domain name.
    #[error("IP addresses not allowed in email address")]
    IpAddr,
}

impl FromStr for ReplyAddress {
    type Err = ReplyAddressError;

    fn from_str(str: &str) -> Result<Self, Self::Err> {
        if str.len() > Self::MAX_LENGTH {
            return Err(ReplyAddressError::Invalid);
        }

        let Some((user, domain)) = str.rsplit_once('@') else {
            return Err(ReplyAddressError::Invalid);
        };

        if domain.starts_with('[') {
            return Err(ReplyAddressError::IpAddr);
        }

        let (domain, domain_result) = Uts46::new().to_user_interface(
            domain.as_bytes(),
            uts46::AsciiDenyList::URL,
            uts46::Hyphens::Allow,
            |_, _, _| true,
        );

        if domain_result.is_err() {
            return Err(ReplyAddressError::Invalid);
        }

        Address::new(user, domain.to_lowercase())
            .map(Self)
            .map_err(|_| ReplyAddressError::Invalid)
    }
}
