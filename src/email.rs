//! Composing lead emails and delivering them through Postmark.

use std::time::Duration;

use askama::Template;
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use lettre::message::Mailbox;
use reqwest::{header::ACCEPT, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use url::Url;

use crate::api::validation::{truncate_chars, Lead, DESCRIPTION_MAX_CHARS};

/// The header Postmark reads the server token from.
const SERVER_TOKEN_HEADER: &str = "X-Postmark-Server-Token";

/// Shown in place of an email address the submitter didn't give.
const NO_EMAIL: &str = "Not provided";

/// Shown in place of a service the submitter didn't choose.
const NO_SERVICE: &str = "Not specified";

/// Shown in place of a description the submitter didn't write.
const NO_DESCRIPTION: &str = "No additional details provided";

/// Shown in place of an IP address that isn't known.
const NO_IP: &str = "n/a";

/// The values shown in a lead email, with placeholders for anything missing.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LeadDetails<'a> {
    /// The submitter's name.
    pub name: &'a str,

    /// The submitter's phone number.
    pub phone: &'a str,

    /// The submitter's email address.
    pub email: &'a str,

    /// The kind of service requested.
    pub service: &'a str,

    /// Details about the request, truncated to [`DESCRIPTION_MAX_CHARS`].
    pub description: &'a str,

    /// The submitter's IP address.
    pub ip: &'a str,

    /// When the lead was submitted, in the site's local time.
    pub submitted: String,
}

impl<'a> LeadDetails<'a> {
    /// Gathers the values to show for a lead.
    pub fn new(
        lead: &'a Lead,
        ip: Option<&'a str>,
        submitted_at: DateTime<Utc>,
        time_zone: Tz,
    ) -> Self {
        Self {
            name: lead.name.as_str(),
            phone: lead.phone.as_str(),
            email: lead.email.as_deref().unwrap_or(NO_EMAIL),
            service: lead.service.as_deref().unwrap_or(NO_SERVICE),
            description: lead
                .description
                .as_deref()
                .map_or(NO_DESCRIPTION, |description| {
                    truncate_chars(description, DESCRIPTION_MAX_CHARS)
                }),
            ip: ip.unwrap_or(NO_IP),
            submitted: local_timestamp(submitted_at, time_zone),
        }
    }

    /// Gets the lead email's subject line.
    pub fn subject(&self) -> String {
        format!("Emergency Cleanup Request - {}", self.name)
    }
}

/// The plain text body of a lead email.
#[derive(Template)]
#[template(path = "email/lead.txt")]
struct TextBody<'a> {
    /// The values to show.
    lead: &'a LeadDetails<'a>,
}

/// The HTML body of a lead email.
#[derive(Template)]
#[template(path = "email/lead.html")]
struct HtmlBody<'a> {
    /// The values to show.
    lead: &'a LeadDetails<'a>,
}

/// Renders a timestamp the way people in the site's time zone write it, e.g.
/// `2024-07-01, 2:05:09 p.m. EDT`.
pub fn local_timestamp(at: DateTime<Utc>, time_zone: Tz) -> String {
    let local = at.with_timezone(&time_zone);
    let (is_pm, hour) = local.hour12();
    let meridiem = if is_pm { "p.m." } else { "a.m." };

    format!(
        "{}, {hour}:{:02}:{:02} {meridiem} {}",
        local.format("%Y-%m-%d"),
        local.minute(),
        local.second(),
        local.format("%Z"),
    )
}

/// Custom data attached to a message, shown in Postmark's activity feed.
#[derive(Serialize, Clone, PartialEq, Eq, Debug)]
pub struct Metadata {
    /// The kind of service requested.
    pub service: String,
}

/// A single email in the shape Postmark's `/email` endpoint expects.
#[derive(Serialize, Clone, PartialEq, Eq, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct OutboundEmail {
    /// The sender's mailbox.
    pub from: String,

    /// The recipient's mailbox.
    pub to: String,

    /// The subject line.
    pub subject: String,

    /// The plain text body.
    pub text_body: String,

    /// The HTML body.
    pub html_body: String,

    /// The message stream to send through.
    pub message_stream: String,

    /// Where replies go, if not to the sender.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,

    /// Custom data attached to the message.
    pub metadata: Metadata,
}

impl OutboundEmail {
    /// Composes the email announcing a lead.
    ///
    /// # Errors
    ///
    /// Returns an error if a body template fails to render.
    pub fn for_lead(
        lead: &Lead,
        details: &LeadDetails<'_>,
        from: &Mailbox,
        to: &Mailbox,
        message_stream: &str,
    ) -> askama::Result<Self> {
        Ok(Self {
            from: from.to_string(),
            to: to.to_string(),
            subject: details.subject(),
            text_body: TextBody { lead: details }.render()?,
            html_body: HtmlBody { lead: details }.render()?,
            message_stream: message_stream.to_owned(),
            reply_to: lead.reply_to.as_ref().map(ToString::to_string),
            metadata: Metadata {
                service: lead.service.clone().unwrap_or_else(|| "unknown".into()),
            },
        })
    }
}

/// What Postmark made of a message.
#[derive(Clone, PartialEq, Debug)]
pub enum Delivery {
    /// Postmark accepted the message for delivery.
    Accepted {
        /// Postmark's ID for the message.
        message_id: Option<String>,
    },

    /// Postmark refused the message.
    Rejected {
        /// The HTTP status of Postmark's response.
        status: StatusCode,

        /// Postmark's response body, which explains the refusal.
        details: Value,
    },
}

/// A client for Postmark's single-message endpoint.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Postmark<'a> {
    /// The shared HTTP client.
    pub(crate) http: &'a reqwest::Client,

    /// The `/email` endpoint.
    pub(crate) url: &'a Url,

    /// The server token.
    pub(crate) token: &'a str,

    /// How long the request may take.
    pub(crate) timeout: Duration,
}

impl Postmark<'_> {
    /// Sends an email. A message only counts as accepted if the response is successful *and* its
    /// `ErrorCode` is zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or times out, or its response body can't be read.
    pub(crate) async fn send(&self, email: &OutboundEmail) -> Result<Delivery, reqwest::Error> {
        let response = self
            .http
            .post(self.url.clone())
            .timeout(self.timeout)
            .header(ACCEPT, "application/json")
            .header(SERVER_TOKEN_HEADER, self.token)
            .json(email)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        Ok(classify(status, &text))
    }
}

/// Decides whether a Postmark response means the message was accepted.
fn classify(status: StatusCode, text: &str) -> Delivery {
    let details = if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(text).unwrap_or_else(|_| json!({ "raw": text }))
    };

    let accepted =
        status.is_success() && details.get("ErrorCode").and_then(Value::as_i64) == Some(0);

    if accepted {
        Delivery::Accepted {
            message_id: details
                .get("MessageID")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned),
        }
    } else {
        Delivery::Rejected { status, details }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::api::validation::LeadSubmission;

    fn lead(json: &str) -> Lead {
        let submission =
            LeadSubmission::parse(json.as_bytes()).expect("submission should parse");
        Lead::try_from(submission).expect("lead should be valid")
    }

    fn summer_afternoon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 18, 5, 9)
            .single()
            .expect("timestamp should be valid")
    }

    fn mailbox(address: &str) -> Mailbox {
        address.parse().expect("mailbox should be valid")
    }

    #[test]
    fn timestamps_rendered_locally() {
        assert_eq!(
            local_timestamp(summer_afternoon(), Tz::America__Toronto),
            "2024-07-01, 2:05:09 p.m. EDT",
        );

        let winter_midnight = Utc
            .with_ymd_and_hms(2024, 1, 15, 5, 0, 0)
            .single()
            .expect("timestamp should be valid");
        assert_eq!(
            local_timestamp(winter_midnight, Tz::America__Toronto),
            "2024-01-15, 12:00:00 a.m. EST",
        );
    }

    #[test]
    fn placeholders_fill_missing_values() {
        let lead = lead(r#"{"name": "Jane Doe", "phone": "555-1234"}"#);
        let details = LeadDetails::new(&lead, None, summer_afternoon(), Tz::America__Toronto);

        assert_eq!(details.email, "Not provided");
        assert_eq!(details.service, "Not specified");
        assert_eq!(details.description, "No additional details provided");
        assert_eq!(details.ip, "n/a");
        assert_eq!(details.subject(), "Emergency Cleanup Request - Jane Doe");
    }

    #[test]
    fn long_descriptions_truncated() {
        let description = "a".repeat(DESCRIPTION_MAX_CHARS + 500);
        let lead = lead(&format!(
            r#"{{"name": "Jane", "phone": "555-1234", "description": "{description}"}}"#
        ));
        let details = LeadDetails::new(&lead, None, summer_afternoon(), Tz::America__Toronto);

        assert_eq!(details.description.chars().count(), DESCRIPTION_MAX_CHARS);
    }

    #[test]
    fn email_composed() -> anyhow::Result<()> {
        let lead = lead(
            r#"{
                "name": "Jane Doe",
                "phone": "555-1234",
                "email": "jane@example.com",
                "service": "flood cleanup",
                "description": "basement <flooded> & wet"
            }"#,
        );
        let details = LeadDetails::new(
            &lead,
            Some("203.0.113.7"),
            summer_afternoon(),
            Tz::America__Toronto,
        );

        let email = OutboundEmail::for_lead(
            &lead,
            &details,
            &mailbox("website@hazardcleanup.ca"),
            &mailbox("help@hazardcleanup.ca"),
            "outbound",
        )?;

        assert_eq!(email.subject, "Emergency Cleanup Request - Jane Doe");
        assert_eq!(email.reply_to.as_deref(), Some("jane@example.com"));
        assert_eq!(email.metadata.service, "flood cleanup");
        assert_eq!(email.message_stream, "outbound");

        for expected in [
            "Name: Jane Doe",
            "Phone: 555-1234",
            "Email: jane@example.com",
            "Service: flood cleanup",
            "basement <flooded> & wet",
            "IP: 203.0.113.7",
            "Submitted: 2024-07-01, 2:05:09 p.m. EDT",
        ] {
            assert!(email.text_body.contains(expected), "text body should contain {expected:?}");
        }

        assert!(email.html_body.contains("tel:555-1234"), "HTML body should link the phone");
        assert!(
            email.html_body.contains("basement &lt;flooded&gt; &amp; wet"),
            "HTML body should escape submitted text",
        );

        Ok(())
    }

    #[test]
    fn email_serialized_for_postmark() -> anyhow::Result<()> {
        let lead = lead(r#"{"name": "Jane", "phone": "555-1234"}"#);
        let details = LeadDetails::new(&lead, None, summer_afternoon(), Tz::America__Toronto);
        let email = OutboundEmail::for_lead(
            &lead,
            &details,
            &mailbox("Website <website@hazardcleanup.ca>"),
            &mailbox("help@hazardcleanup.ca"),
            "leads",
        )?;

        let value = serde_json::to_value(&email)?;

        assert_eq!(value["From"], "Website <website@hazardcleanup.ca>");
        assert_eq!(value["To"], "help@hazardcleanup.ca");
        assert_eq!(value["MessageStream"], "leads");
        assert_eq!(value["Metadata"], json!({ "service": "unknown" }));
        assert!(value.get("ReplyTo").is_none(), "ReplyTo should be omitted without an email");
        assert!(value["TextBody"].is_string(), "TextBody should be present");
        assert!(value["HtmlBody"].is_string(), "HtmlBody should be present");

        Ok(())
    }

    #[test]
    fn postmark_responses_classified() {
        assert_eq!(
            classify(
                StatusCode::OK,
                r#"{"ErrorCode": 0, "Message": "OK", "MessageID": "b7bc2f4a"}"#,
            ),
            Delivery::Accepted {
                message_id: Some("b7bc2f4a".into()),
            },
        );

        assert_eq!(
            classify(StatusCode::OK, r#"{"ErrorCode": 406, "Message": "Inactive"}"#),
            Delivery::Rejected {
                status: StatusCode::OK,
                details: json!({ "ErrorCode": 406, "Message": "Inactive" }),
            },
        );

        assert_eq!(
            classify(StatusCode::UNPROCESSABLE_ENTITY, "not json"),
            Delivery::Rejected {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                details: json!({ "raw": "not json" }),
            },
        );

        assert_eq!(
            classify(StatusCode::OK, ""),
            Delivery::Rejected {
                status: StatusCode::OK,
                details: Value::Null,
            },
        );
    }
}
